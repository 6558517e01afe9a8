//! JSON mapping
//!
//! | tree                           | JSON                                                  |
//! |--------------------------------|-------------------------------------------------------|
//! | section                        | object member holding an object                       |
//! | attribute                      | object member holding a string (`null` without value) |
//! | value of a section             | member `-section-value` inside its object             |
//! | siblings sharing a name        | one member holding an array                           |
//!
//! Reading accepts numbers and booleans as attribute values and keeps their JSON text. A document whose single
//! member holds an object is read as that root, any other object becomes the body of a root called `root`.
use super::{ReadOptions, Style, WriteOptions};
use crate::node::{ConfigNode, Section};
use crate::tree::{ConfigTree, SectionId};
use crate::{Error, Result};
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Reserved member name for the value of a section
pub const SECTION_VALUE: &str = "-section-value";

const FORMAT: &str = "json";

pub fn parse(text: &str, options: &ReadOptions) -> Result<ConfigTree> {
    let document: Value = serde_json::from_str(text)
        .map_err(|err| Error::parse(FORMAT, (err.line(), err.column()), err.to_string()))?;

    let Value::Object(members) = document else {
        return Err(Error::parse(
            FORMAT,
            (1, 1),
            "top-level value must be an object",
        ));
    };

    let (root_name, body) = match (&options.implicit_root, members.len()) {
        (Some(root_name), _) => (root_name.clone(), members),
        (None, 1) if members.values().all(Value::is_object) => {
            let Some((name, Value::Object(body))) = members.into_iter().next() else {
                return Err(Error::parse(FORMAT, (1, 1), "root object expected"));
            };
            (name, body)
        }
        (None, _) => ("root".to_string(), members),
    };

    let mut tree = options.new_tree(&root_name)?;
    let root = tree.root_id();
    fill(&mut tree, root, body)?;
    tree.reset_modified();
    Ok(tree)
}

fn fill(tree: &mut ConfigTree, section: SectionId, members: Map<String, Value>) -> Result<()> {
    for (name, value) in members {
        if name == SECTION_VALUE {
            tree.set_value(section, scalar(&name, &value)?.as_deref())?;
            continue;
        }

        match value {
            Value::Array(items) => {
                for item in items {
                    member(tree, section, &name, item)?;
                }
            }
            value => member(tree, section, &name, value)?,
        }
    }
    Ok(())
}

fn member(tree: &mut ConfigTree, section: SectionId, name: &str, value: Value) -> Result<()> {
    match value {
        Value::Object(body) => {
            let child = tree.add_child(section, name, None)?;
            fill(tree, child, body)
        }
        value => {
            let value = scalar(name, &value)?;
            tree.add_attribute(section, name, value.as_deref())?;
            Ok(())
        }
    }
}

fn scalar(name: &str, value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text.clone())),
        Value::Bool(flag) => Ok(Some(flag.to_string())),
        Value::Number(number) => Ok(Some(number.to_string())),
        Value::Array(_) | Value::Object(_) => Err(Error::parse(
            FORMAT,
            (1, 1),
            format!("member '{name}' must hold a scalar value here"),
        )),
    }
}

pub fn write(section: Section<'_>, options: &WriteOptions) -> Result<String> {
    if !section.exists() {
        return Ok(String::new());
    }

    let projection = Rooted::new(section, options.omit_root);
    Ok(match options.style {
        Style::Pretty => serde_json::to_string_pretty(&projection)?,
        Style::Compact => serde_json::to_string(&projection)?,
    })
}

/// Serializes a section as `{"name": {...}}`, or only its body when the root is omitted
#[derive(derive_new::new)]
pub struct Rooted<'t> {
    section: Section<'t>,
    omit_root: bool,
}

impl Serialize for Rooted<'_> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if self.omit_root {
            return self.section.serialize(serializer);
        }

        let mut ser = serializer.serialize_map(Some(1))?;
        ser.serialize_entry(self.section.name(), &self.section)?;
        ser.end()
    }
}

#[derive(Clone, Copy)]
enum Member<'t> {
    Attribute(Option<&'t str>),
    Section(Section<'t>),
}

impl Serialize for Member<'_> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Member::Attribute(Some(value)) => serializer.serialize_str(value),
            Member::Attribute(None) => serializer.serialize_none(),
            Member::Section(section) => section.serialize(serializer),
        }
    }
}

struct Group<'a, 't>(&'a [Member<'t>]);

impl Serialize for Group<'_, '_> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if let [single] = self.0 {
            return single.serialize(serializer);
        }

        let mut ser = serializer.serialize_seq(Some(self.0.len()))?;
        for member in self.0 {
            ser.serialize_element(member)?;
        }
        ser.end()
    }
}

impl Serialize for Section<'_> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut groups: IndexMap<&str, Vec<Member<'_>>> = IndexMap::new();
        for attribute in self.attributes() {
            groups
                .entry(attribute.name())
                .or_default()
                .push(Member::Attribute(attribute.verbatim_value()));
        }
        for child in self.children() {
            groups
                .entry(child.name())
                .or_default()
                .push(Member::Section(child));
        }

        let value = self.verbatim_value();
        let len = groups.len() + usize::from(value.is_some());
        let mut ser = serializer.serialize_map(Some(len))?;
        if let Some(value) = value {
            ser.serialize_entry(SECTION_VALUE, value)?;
        }
        for (name, members) in &groups {
            ser.serialize_entry(name, &Group(members))?;
        }
        ser.end()
    }
}
