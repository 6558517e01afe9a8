//! read handles into a [ConfigTree]
//!
//! A handle that does not point at a live node is the non-existent sentinel. It answers every lookup with another
//! sentinel, so `tree.root().child("a").attr("b").value()` needs no checks along the way.
use crate::path::{self, PathExpr};
use crate::tree::{AttrData, ConfigTree, NodeKey, SectionData, SectionId};
use crate::util::names_eq;
use crate::value::FromValue;
use crate::{vars, Error, Result};
use std::str::FromStr;

/// Behavior shared by sections, attributes and navigation results
pub trait ConfigNode<'t> {
    /// False for the non-existent sentinel
    fn exists(&self) -> bool;

    /// Empty for the sentinel
    fn name(&self) -> &'t str;

    /// Raw value with `$(...)` markers left alone. Never fails.
    fn verbatim_value(&self) -> Option<&'t str>;

    /// Value with all variables evaluated, empty when there is none
    fn value(&self) -> Result<String>;

    /// Absolute path that navigates back to this node
    fn path(&self) -> String;

    fn key(&self) -> Option<NodeKey>;

    fn has_value(&self) -> bool {
        self.verbatim_value().is_some()
    }

    /// Evaluated value converted to `T`
    fn value_as<T: FromValue>(&self) -> Result<T> {
        let value = self.value()?;
        match self.exists().then(|| T::from_value(&value)).flatten() {
            Some(converted) => Ok(converted),
            None => Err(Error::Coercion {
                path: self.path(),
                value,
                target: T::TYPE_NAME,
            }),
        }
    }

    /// Evaluated value converted to `T`, `default` when missing or not convertible
    ///
    /// Evaluation errors (recursion, required references) are still returned.
    fn value_as_or<T: FromValue>(&self, default: T) -> Result<T> {
        if !self.exists() {
            return Ok(default);
        }
        Ok(T::from_value(&self.value()?).unwrap_or(default))
    }

    /// Evaluated value parsed with [FromStr], meant for enums
    fn value_as_enum<T: FromStr>(&self) -> Result<T> {
        let value = self.value()?;
        value.trim().parse().map_err(|_| Error::Coercion {
            path: self.path(),
            value,
            target: std::any::type_name::<T>(),
        })
    }
}

#[derive(Clone, Copy)]
pub struct Section<'t> {
    tree: &'t ConfigTree,
    id: Option<SectionId>,
}

impl<'t> Section<'t> {
    pub(crate) fn new(tree: &'t ConfigTree, id: Option<SectionId>) -> Self {
        Self { tree, id }
    }

    /// The non-existent sentinel
    pub fn missing(tree: &'t ConfigTree) -> Self {
        Self { tree, id: None }
    }

    pub fn tree(&self) -> &'t ConfigTree {
        self.tree
    }

    pub fn id(&self) -> Option<SectionId> {
        self.id
    }

    fn data(&self) -> Option<&'t SectionData> {
        self.id.and_then(|id| self.tree.data(id))
    }

    pub fn is_root(&self) -> bool {
        self.data().is_some_and(|data| data.parent.is_none())
    }

    pub fn is_modified(&self) -> bool {
        self.data().is_some_and(|data| data.modified)
    }

    pub fn parent(&self) -> Section<'t> {
        Section::new(self.tree, self.data().and_then(|data| data.parent))
    }

    /// First child called `name` (case-insensitive)
    pub fn child(&self, name: &str) -> Section<'t> {
        self.children()
            .find(|child| names_eq(child.name(), name))
            .unwrap_or(Section::missing(self.tree))
    }

    pub fn child_at(&self, index: usize) -> Section<'t> {
        let id = self.data().and_then(|data| data.children.get(index)).copied();
        Section::new(self.tree, id)
    }

    /// First child called `name` whose attribute `attribute` evaluates to `value`
    ///
    /// Attributes that fail to evaluate are compared by their verbatim value.
    pub fn child_by_attr(&self, name: &str, attribute: &str, value: &str) -> Section<'t> {
        self.children_named(name)
            .find(|child| {
                path::attr_matches(child.attr(attribute), value, &mut vars::evaluate_node)
            })
            .unwrap_or(Section::missing(self.tree))
    }

    pub fn children(&self) -> impl Iterator<Item = Section<'t>> + 't {
        let tree = self.tree;
        self.data()
            .into_iter()
            .flat_map(|data| data.children.iter())
            .map(move |id| Section::new(tree, Some(*id)))
    }

    pub fn children_named<'a>(&self, name: &'a str) -> impl Iterator<Item = Section<'t>> + 'a
    where
        't: 'a,
    {
        self.children()
            .filter(move |child| names_eq(child.name(), name))
    }

    pub fn child_count(&self) -> usize {
        self.data().map_or(0, |data| data.children.len())
    }

    /// First attribute called `name` (case-insensitive)
    pub fn attr(&self, name: &str) -> Attribute<'t> {
        let at = self.id.zip(self.data()).and_then(|(id, data)| {
            data.attributes
                .iter()
                .position(|attr| names_eq(&attr.name, name))
                .map(|index| (id, index))
        });
        Attribute::new(self.tree, at)
    }

    pub fn attr_at(&self, index: usize) -> Attribute<'t> {
        let at = self
            .id
            .zip(self.data())
            .filter(|(_, data)| index < data.attributes.len())
            .map(|(id, _)| (id, index));
        Attribute::new(self.tree, at)
    }

    pub fn attributes(&self) -> impl Iterator<Item = Attribute<'t>> + 't {
        let tree = self.tree;
        let id = self.id;
        let count = self.attr_count();
        (0..count).map(move |index| Attribute::new(tree, id.map(|id| (id, index))))
    }

    pub fn attr_count(&self) -> usize {
        self.data().map_or(0, |data| data.attributes.len())
    }

    /// Navigate `path` starting at this section, see [crate::path]
    pub fn navigate(&self, path: &str) -> Result<Node<'t>> {
        PathExpr::parse(path)?.navigate(Node::Section(*self))
    }

    /// Like [Section::navigate] but the result has to be a section
    pub fn navigate_section(&self, path: &str) -> Result<Section<'t>> {
        match self.navigate(path)? {
            Node::Section(section) => Ok(section),
            Node::Attribute(attribute) => Err(Error::NotSectionNode {
                path: path.to_string(),
                attribute: attribute.name().to_string(),
            }),
        }
    }

    /// Evaluate `$(...)` markers in `text` with this section as scope
    pub fn evaluate(&self, text: &str) -> Result<String> {
        vars::evaluate_vars(Node::Section(*self), text)
    }

    /// Value of the attribute `name` parsed as a boolean flag, false when missing
    pub fn flag(&self, name: &str) -> bool {
        self.attr(name).value_as_or(false).unwrap_or(false)
    }

    /// Structural equality: names (case-insensitive), verbatim values, attribute and child order
    pub fn same_content(&self, other: &Section<'_>) -> bool {
        if self.exists() != other.exists() {
            return false;
        }

        names_eq(self.name(), other.name())
            && self.verbatim_value() == other.verbatim_value()
            && self.attr_count() == other.attr_count()
            && self.attributes().zip(other.attributes()).all(|(a, b)| {
                names_eq(a.name(), b.name()) && a.verbatim_value() == b.verbatim_value()
            })
            && self.child_count() == other.child_count()
            && self
                .children()
                .zip(other.children())
                .all(|(a, b)| a.same_content(&b))
    }

    /// Standalone deep copy with this section as root
    pub fn to_tree(&self) -> ConfigTree {
        ConfigTree::from_section(*self)
    }

    /// Single line laconic rendering
    pub fn to_compact_string(&self) -> String {
        crate::format::laconic::write(*self, &crate::format::WriteOptions::compact())
    }
}

impl<'t> ConfigNode<'t> for Section<'t> {
    fn exists(&self) -> bool {
        self.data().is_some()
    }

    fn name(&self) -> &'t str {
        self.data().map_or("", |data| data.name.as_str())
    }

    fn verbatim_value(&self) -> Option<&'t str> {
        self.data().and_then(|data| data.value.as_deref())
    }

    fn value(&self) -> Result<String> {
        vars::evaluate_node(Node::Section(*self))
    }

    fn path(&self) -> String {
        let Some(data) = self.data() else {
            return String::new();
        };

        if data.parent.is_none() {
            return "/".to_string();
        }

        let mut segments = vec![];
        let mut current = *self;
        while !current.is_root() && current.exists() {
            segments.push(current.name());
            current = current.parent();
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }

    fn key(&self) -> Option<NodeKey> {
        self.data().and(self.id).map(NodeKey::Section)
    }
}

impl std::fmt::Display for Section<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&crate::format::laconic::write(
            *self,
            &crate::format::WriteOptions::pretty(),
        ))
    }
}

impl std::fmt::Debug for Section<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.exists() {
            return f.write_str("Section(<non-existent>)");
        }
        write!(f, "Section({})", self.to_compact_string())
    }
}

#[derive(Clone, Copy)]
pub struct Attribute<'t> {
    tree: &'t ConfigTree,
    at: Option<(SectionId, usize)>,
}

impl<'t> Attribute<'t> {
    pub(crate) fn new(tree: &'t ConfigTree, at: Option<(SectionId, usize)>) -> Self {
        Self { tree, at }
    }

    pub fn missing(tree: &'t ConfigTree) -> Self {
        Self { tree, at: None }
    }

    pub fn tree(&self) -> &'t ConfigTree {
        self.tree
    }

    fn data(&self) -> Option<&'t AttrData> {
        let (id, index) = self.at?;
        self.tree.data(id)?.attributes.get(index)
    }

    /// Owning section
    pub fn section(&self) -> Section<'t> {
        Section::new(self.tree, self.data().and(self.at).map(|(id, _)| id))
    }

    /// Position within the owning section
    pub fn index(&self) -> Option<usize> {
        self.data().and(self.at).map(|(_, index)| index)
    }
}

impl<'t> ConfigNode<'t> for Attribute<'t> {
    fn exists(&self) -> bool {
        self.data().is_some()
    }

    fn name(&self) -> &'t str {
        self.data().map_or("", |data| data.name.as_str())
    }

    fn verbatim_value(&self) -> Option<&'t str> {
        self.data().and_then(|data| data.value.as_deref())
    }

    fn value(&self) -> Result<String> {
        vars::evaluate_node(Node::Attribute(*self))
    }

    fn path(&self) -> String {
        if !self.exists() {
            return String::new();
        }

        let section = self.section().path();
        let separator = if section.ends_with('/') { "" } else { "/" };
        format!("{section}{separator}${}", self.name())
    }

    fn key(&self) -> Option<NodeKey> {
        self.data()
            .and(self.at)
            .map(|(id, index)| NodeKey::Attribute(id, index))
    }
}

impl std::fmt::Debug for Attribute<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.data() {
            Some(data) => write!(f, "Attribute({}={:?})", data.name, data.value),
            None => f.write_str("Attribute(<non-existent>)"),
        }
    }
}

/// Navigation result
#[derive(Clone, Copy, Debug)]
pub enum Node<'t> {
    Section(Section<'t>),
    Attribute(Attribute<'t>),
}

impl<'t> Node<'t> {
    /// The section itself, the sentinel for attributes
    pub fn as_section(&self) -> Section<'t> {
        match self {
            Node::Section(section) => *section,
            Node::Attribute(attribute) => Section::missing(attribute.tree()),
        }
    }

    /// The attribute itself, the sentinel for sections
    pub fn as_attribute(&self) -> Attribute<'t> {
        match self {
            Node::Attribute(attribute) => *attribute,
            Node::Section(section) => Attribute::missing(section.tree()),
        }
    }

    pub fn tree(&self) -> &'t ConfigTree {
        match self {
            Node::Section(section) => section.tree(),
            Node::Attribute(attribute) => attribute.tree(),
        }
    }

    /// Parent section of a section, owning section of an attribute
    pub fn parent(&self) -> Section<'t> {
        match self {
            Node::Section(section) => section.parent(),
            Node::Attribute(attribute) => attribute.section(),
        }
    }
}

impl<'t> ConfigNode<'t> for Node<'t> {
    fn exists(&self) -> bool {
        match self {
            Node::Section(section) => section.exists(),
            Node::Attribute(attribute) => attribute.exists(),
        }
    }

    fn name(&self) -> &'t str {
        match self {
            Node::Section(section) => section.name(),
            Node::Attribute(attribute) => attribute.name(),
        }
    }

    fn verbatim_value(&self) -> Option<&'t str> {
        match self {
            Node::Section(section) => section.verbatim_value(),
            Node::Attribute(attribute) => attribute.verbatim_value(),
        }
    }

    fn value(&self) -> Result<String> {
        vars::evaluate_node(*self)
    }

    fn path(&self) -> String {
        match self {
            Node::Section(section) => section.path(),
            Node::Attribute(attribute) => attribute.path(),
        }
    }

    fn key(&self) -> Option<NodeKey> {
        match self {
            Node::Section(section) => section.key(),
            Node::Attribute(attribute) => attribute.key(),
        }
    }
}
