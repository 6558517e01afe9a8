//! configuration tree storage
//!
//! [ConfigTree] owns every section of a tree in an arena and hands out [SectionId]s. Sections only know the id of
//! their parent, the tree is the sole owner. Reading goes through borrowed handles ([Section], [Attribute]), writing
//! goes through `&mut ConfigTree` and ids.
//!
//! Deleted sections stay in the arena (marked dead) so ids handed out earlier never point at a different section.
//!
//! Structural mutation is not synchronized. Callers must not mutate a tree while other threads read it; concurrent
//! reads (navigation, variable evaluation) are fine.
use crate::macros::{BuiltinMacros, MacroRunner};
use crate::node::{Attribute, ConfigNode, Node, Section};
use crate::util::{is_strict_name, names_eq, normalize_name};
use crate::vars::{EnvVarResolver, ProcessEnvResolver};
use crate::{Error, Result};
use std::sync::Arc;

/// Index of a section inside its [ConfigTree]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionId(pub(crate) usize);

/// Owned identity of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKey {
    Section(SectionId),
    /// section and position of the attribute within it
    Attribute(SectionId, usize),
}

/// How names of new sections and attributes are checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameMode {
    /// accept anything
    #[default]
    Lax,
    /// replace characters outside the strict charset (see [crate::util::normalize_name])
    Normalize,
    /// reject names outside the strict charset
    Strict,
}

impl NameMode {
    fn apply(self, name: &str) -> String {
        match self {
            NameMode::Normalize => normalize_name(name).into_owned(),
            NameMode::Lax | NameMode::Strict => name.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SectionData {
    pub(crate) name: String,
    pub(crate) value: Option<String>,
    pub(crate) parent: Option<SectionId>,
    pub(crate) attributes: Vec<AttrData>,
    pub(crate) children: Vec<SectionId>,
    pub(crate) modified: bool,
    alive: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct AttrData {
    pub(crate) name: String,
    pub(crate) value: Option<String>,
}

#[derive(Clone)]
pub struct ConfigTree {
    sections: Vec<SectionData>,
    read_only: bool,
    name_mode: NameMode,
    env: Arc<dyn EnvVarResolver>,
    macros: Arc<dyn MacroRunner>,
}

const ROOT: SectionId = SectionId(0);

impl ConfigTree {
    /// Empty tree with a root of the given name
    pub fn new(root_name: &str) -> Self {
        Self {
            sections: vec![SectionData::new(root_name.to_string(), None, None)],
            read_only: false,
            name_mode: NameMode::Lax,
            env: Arc::new(ProcessEnvResolver),
            macros: Arc::new(BuiltinMacros),
        }
    }

    /// Empty tree whose names (including the root name) are checked with `name_mode`
    pub fn with_name_mode(root_name: &str, name_mode: NameMode) -> Result<Self> {
        let mut tree = Self::new(root_name);
        tree.name_mode = name_mode;
        let root_name = tree.check_name(root_name)?;
        tree.sections[ROOT.0].name = root_name;
        Ok(tree)
    }

    /// Builder style variant of [ConfigTree::set_env_resolver]
    pub fn with_env_resolver(mut self, resolver: Arc<dyn EnvVarResolver>) -> Self {
        self.env = resolver;
        self
    }

    /// Builder style variant of [ConfigTree::set_macro_runner]
    pub fn with_macro_runner(mut self, runner: Arc<dyn MacroRunner>) -> Self {
        self.macros = runner;
        self
    }

    pub fn root(&self) -> Section<'_> {
        Section::new(self, Some(ROOT))
    }

    pub fn root_id(&self) -> SectionId {
        ROOT
    }

    /// Handle for `id`, the non-existent sentinel when the section was deleted
    pub fn section(&self, id: SectionId) -> Section<'_> {
        Section::new(self, self.data(id).map(|_| id))
    }

    pub fn attribute(&self, section: SectionId, index: usize) -> Attribute<'_> {
        let exists = self
            .data(section)
            .is_some_and(|data| index < data.attributes.len());
        Attribute::new(self, exists.then_some((section, index)))
    }

    pub fn node(&self, key: NodeKey) -> Node<'_> {
        match key {
            NodeKey::Section(id) => Node::Section(self.section(id)),
            NodeKey::Attribute(id, index) => Node::Attribute(self.attribute(id, index)),
        }
    }

    pub(crate) fn data(&self, id: SectionId) -> Option<&SectionData> {
        self.sections.get(id.0).filter(|data| data.alive)
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// A read-only tree rejects every structural or value mutation
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn name_mode(&self) -> NameMode {
        self.name_mode
    }

    /// Only affects names added from now on
    pub fn set_name_mode(&mut self, name_mode: NameMode) {
        self.name_mode = name_mode;
    }

    pub fn env_resolver(&self) -> &dyn EnvVarResolver {
        self.env.as_ref()
    }

    /// Resolver consulted for `$(~NAME)` markers
    pub fn set_env_resolver(&mut self, resolver: Arc<dyn EnvVarResolver>) {
        self.env = resolver;
    }

    pub fn macro_runner(&self) -> &dyn MacroRunner {
        self.macros.as_ref()
    }

    /// Runner consulted for `$(...::macro)` markers
    pub fn set_macro_runner(&mut self, runner: Arc<dyn MacroRunner>) {
        self.macros = runner;
    }

    /// True when anything in the tree changed since creation or the last [ConfigTree::reset_modified]
    pub fn is_modified(&self) -> bool {
        self.sections[ROOT.0].modified
    }

    pub fn reset_modified(&mut self) {
        for section in &mut self.sections {
            section.modified = false;
        }
    }

    /// Tree with the same settings (resolvers, name mode) but a new empty root
    pub fn empty_like(&self, root_name: &str) -> Self {
        Self {
            sections: vec![SectionData::new(root_name.to_string(), None, None)],
            read_only: false,
            name_mode: self.name_mode,
            env: self.env.clone(),
            macros: self.macros.clone(),
        }
    }

    /// Deep copy of `source` as a standalone tree with its own root
    pub fn from_section(source: Section<'_>) -> Self {
        let mut tree = source.tree().empty_like(source.name());
        tree.sections[ROOT.0].value = source.verbatim_value().map(str::to_string);
        tree.sections[ROOT.0].attributes = source
            .attributes()
            .map(|attr| AttrData {
                name: attr.name().to_string(),
                value: attr.verbatim_value().map(str::to_string),
            })
            .collect();
        for child in source.children() {
            // names were accepted by the source tree already
            tree.copy_unchecked(ROOT, None, child, NameMode::Lax);
        }
        tree.reset_modified();
        tree
    }
}

// mutation
impl ConfigTree {
    fn writable(&self, operation: &'static str) -> Result<()> {
        if self.read_only {
            return Err(Error::ReadOnly { operation });
        }
        Ok(())
    }

    fn live(&self, id: SectionId, operation: &'static str) -> Result<()> {
        self.writable(operation)?;
        match self.data(id) {
            Some(_) => Ok(()),
            None => Err(Error::MissingNode { operation }),
        }
    }

    fn live_attribute(&self, id: SectionId, index: usize, operation: &'static str) -> Result<()> {
        self.live(id, operation)?;
        if index >= self.sections[id.0].attributes.len() {
            return Err(Error::MissingNode { operation });
        }
        Ok(())
    }

    fn check_name(&self, name: &str) -> Result<String> {
        if self.name_mode == NameMode::Strict && !is_strict_name(name) {
            return Err(Error::InvalidName {
                name: name.to_string(),
                reason: "name is outside of the strict name charset",
            });
        }
        Ok(self.name_mode.apply(name))
    }

    /// Every name below (and including) `source` passes [ConfigTree::check_name]
    fn check_names(&self, source: Section<'_>) -> Result<()> {
        self.check_name(source.name())?;
        for attr in source.attributes() {
            self.check_name(attr.name())?;
        }
        source
            .children()
            .try_for_each(|child| self.check_names(child))
    }

    /// Mark a section and all of its ancestors as modified
    fn touch(&mut self, id: SectionId) {
        let mut current = Some(id);
        while let Some(id) = current {
            let section = &mut self.sections[id.0];
            section.modified = true;
            current = section.parent;
        }
    }

    fn alloc(&mut self, data: SectionData) -> SectionId {
        let id = SectionId(self.sections.len());
        self.sections.push(data);
        id
    }

    /// Append a child section
    pub fn add_child(
        &mut self,
        parent: SectionId,
        name: &str,
        value: Option<&str>,
    ) -> Result<SectionId> {
        self.live(parent, "add section")?;
        let name = self.check_name(name)?;
        let id = self.alloc(SectionData::new(
            name,
            value.map(str::to_string),
            Some(parent),
        ));
        self.sections[parent.0].children.push(id);
        self.touch(id);
        Ok(id)
    }

    /// Append an attribute, duplicates are allowed. Returns the index of the new attribute.
    pub fn add_attribute(
        &mut self,
        section: SectionId,
        name: &str,
        value: Option<&str>,
    ) -> Result<usize> {
        self.live(section, "add attribute")?;
        let name = self.check_name(name)?;
        let attributes = &mut self.sections[section.0].attributes;
        attributes.push(AttrData {
            name,
            value: value.map(str::to_string),
        });
        let index = attributes.len() - 1;
        self.touch(section);
        Ok(index)
    }

    /// Set the value of the first attribute called `name`, adding it when missing
    pub fn set_attribute(
        &mut self,
        section: SectionId,
        name: &str,
        value: Option<&str>,
    ) -> Result<usize> {
        self.live(section, "set attribute")?;
        let existing = self.sections[section.0]
            .attributes
            .iter()
            .position(|attr| names_eq(&attr.name, name));

        match existing {
            Some(index) => {
                self.set_attribute_value(section, index, value)?;
                Ok(index)
            }
            None => self.add_attribute(section, name, value),
        }
    }

    pub fn set_value(&mut self, section: SectionId, value: Option<&str>) -> Result<()> {
        self.live(section, "set value")?;
        self.sections[section.0].value = value.map(str::to_string);
        self.touch(section);
        Ok(())
    }

    pub fn set_attribute_value(
        &mut self,
        section: SectionId,
        index: usize,
        value: Option<&str>,
    ) -> Result<()> {
        self.live_attribute(section, index, "set attribute value")?;
        self.sections[section.0].attributes[index].value = value.map(str::to_string);
        self.touch(section);
        Ok(())
    }

    /// Set the value of whatever node `key` points to
    pub fn set_node_value(&mut self, key: NodeKey, value: Option<&str>) -> Result<()> {
        match key {
            NodeKey::Section(id) => self.set_value(id, value),
            NodeKey::Attribute(id, index) => self.set_attribute_value(id, index, value),
        }
    }

    pub fn rename(&mut self, section: SectionId, name: &str) -> Result<()> {
        self.live(section, "rename section")?;
        let name = self.check_name(name)?;
        self.sections[section.0].name = name;
        self.touch(section);
        Ok(())
    }

    pub fn rename_attribute(&mut self, section: SectionId, index: usize, name: &str) -> Result<()> {
        self.live_attribute(section, index, "rename attribute")?;
        let name = self.check_name(name)?;
        self.sections[section.0].attributes[index].name = name;
        self.touch(section);
        Ok(())
    }

    /// Remove a section (and everything below it) from its parent
    ///
    /// The root can not be detached, deleting it empties it instead.
    pub fn delete(&mut self, section: SectionId) -> Result<()> {
        self.live(section, "delete section")?;
        let Some(parent) = self.sections[section.0].parent else {
            self.clear_children(section)?;
            self.clear_attributes(section)?;
            return self.set_value(section, None);
        };

        self.sections[parent.0]
            .children
            .retain(|child| *child != section);
        self.kill(section);
        self.touch(parent);
        Ok(())
    }

    fn kill(&mut self, section: SectionId) {
        let mut pending = vec![section];
        while let Some(id) = pending.pop() {
            let data = &mut self.sections[id.0];
            data.alive = false;
            pending.append(&mut data.children);
        }
    }

    pub fn delete_attribute(&mut self, section: SectionId, index: usize) -> Result<()> {
        self.live_attribute(section, index, "delete attribute")?;
        self.sections[section.0].attributes.remove(index);
        self.touch(section);
        Ok(())
    }

    pub fn clear_attributes(&mut self, section: SectionId) -> Result<()> {
        self.live(section, "clear attributes")?;
        self.sections[section.0].attributes.clear();
        self.touch(section);
        Ok(())
    }

    pub fn clear_children(&mut self, section: SectionId) -> Result<()> {
        self.live(section, "clear sections")?;
        let children = std::mem::take(&mut self.sections[section.0].children);
        for child in children {
            self.kill(child);
        }
        self.touch(section);
        Ok(())
    }

    /// Deep copy `source` (usually from another tree) as the last child of `parent`
    pub fn append_copy(&mut self, parent: SectionId, source: Section<'_>) -> Result<SectionId> {
        self.live(parent, "copy section")?;
        self.copy_subtree(parent, None, source)
    }

    /// Deep copy `source` as child of `parent` at `position`
    pub fn insert_copy(
        &mut self,
        parent: SectionId,
        position: usize,
        source: Section<'_>,
    ) -> Result<SectionId> {
        self.live(parent, "copy section")?;
        self.copy_subtree(parent, Some(position), source)
    }

    fn copy_subtree(
        &mut self,
        parent: SectionId,
        position: Option<usize>,
        source: Section<'_>,
    ) -> Result<SectionId> {
        if self.name_mode == NameMode::Strict {
            self.check_names(source)?;
        }
        let id = self.copy_unchecked(parent, position, source, self.name_mode);
        self.touch(id);
        Ok(id)
    }

    /// Copy without rejecting names, `names` only decides whether they are normalized
    fn copy_unchecked(
        &mut self,
        parent: SectionId,
        position: Option<usize>,
        source: Section<'_>,
        names: NameMode,
    ) -> SectionId {
        let mut data = SectionData::new(
            names.apply(source.name()),
            source.verbatim_value().map(str::to_string),
            Some(parent),
        );
        data.attributes = source
            .attributes()
            .map(|attr| AttrData {
                name: names.apply(attr.name()),
                value: attr.verbatim_value().map(str::to_string),
            })
            .collect();
        data.modified = true;

        let id = self.alloc(data);
        let siblings = &mut self.sections[parent.0].children;
        match position {
            Some(position) if position < siblings.len() => siblings.insert(position, id),
            _ => siblings.push(id),
        }

        for child in source.children() {
            self.copy_unchecked(id, None, child, names);
        }
        id
    }
}

impl SectionData {
    fn new(name: String, value: Option<String>, parent: Option<SectionId>) -> Self {
        Self {
            name,
            value,
            parent,
            attributes: Vec::new(),
            children: Vec::new(),
            modified: false,
            alive: true,
        }
    }
}

impl std::fmt::Debug for ConfigTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigTree")
            .field("read_only", &self.read_only)
            .field("name_mode", &self.name_mode)
            .field("root", &format_args!("{}", self.root().to_compact_string()))
            .finish()
    }
}
