//! text formats
//!
//! Every format reads text into a fresh (unmodified) [ConfigTree] and writes a section with everything below it.
//! Values are written verbatim, variables are never evaluated while writing.
pub mod json;
pub mod laconic;
pub mod xml;

use crate::node::Section;
use crate::tree::{ConfigTree, NameMode};
use crate::Result;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Laconic,
    Xml,
    Json,
}

impl Format {
    pub const ALL: [Format; 3] = [Format::Laconic, Format::Xml, Format::Json];

    pub fn name(&self) -> &'static str {
        match self {
            Format::Laconic => "laconic",
            Format::Xml => "xml",
            Format::Json => "json",
        }
    }

    /// File extensions (lowercase, without dot) recognized for this format
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Format::Laconic => &["laconf", "lac", "laconic"],
            Format::Xml => &["xml"],
            Format::Json => &["json"],
        }
    }

    pub fn from_extension(extension: &str) -> Option<Format> {
        let extension = extension.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|format| format.extensions().contains(&extension.as_str()))
    }

    pub fn from_path(path: &Path) -> Option<Format> {
        path.extension()
            .and_then(|extension| extension.to_str())
            .and_then(Self::from_extension)
    }

    pub fn read(&self, text: &str, options: &ReadOptions) -> Result<ConfigTree> {
        match self {
            Format::Laconic => laconic::parse(text, options),
            Format::Xml => xml::parse(text, options),
            Format::Json => json::parse(text, options),
        }
    }

    /// Like [Format::read] but malformed input yields `None`
    pub fn read_or_none(&self, text: &str, options: &ReadOptions) -> Option<ConfigTree> {
        match self.read(text, options) {
            Ok(tree) => Some(tree),
            Err(err) => {
                tracing::debug!(format = self.name(), %err, "ignoring malformed content");
                None
            }
        }
    }

    pub fn write(&self, section: Section<'_>, options: &WriteOptions) -> Result<String> {
        match self {
            Format::Laconic => Ok(laconic::write(section, options)),
            Format::Xml => Ok(xml::write(section, options)),
            Format::Json => json::write(section, options),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.name().eq_ignore_ascii_case(s))
            .or_else(|| Self::from_extension(s))
            .ok_or_else(|| format!("unknown format '{s}'"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Parse the text as the body of a root with this name
    pub implicit_root: Option<String>,
    /// Reject names outside the strict charset instead of accepting them as they are
    pub strict_names: bool,
}

impl ReadOptions {
    pub(crate) fn new_tree(&self, root_name: &str) -> Result<ConfigTree> {
        if self.strict_names {
            ConfigTree::with_name_mode(root_name, NameMode::Strict)
        } else {
            Ok(ConfigTree::new(root_name))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Style {
    /// one node per line, nested content indented
    #[default]
    Pretty,
    /// everything on one line
    Compact,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    pub style: Style,
    /// Write only the content of the section, not the section itself
    pub omit_root: bool,
}

impl WriteOptions {
    pub fn pretty() -> Self {
        Self {
            style: Style::Pretty,
            omit_root: false,
        }
    }

    pub fn compact() -> Self {
        Self {
            style: Style::Compact,
            omit_root: false,
        }
    }

    pub fn omit_root(mut self, omit_root: bool) -> Self {
        self.omit_root = omit_root;
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ConfigNode;

    #[test]
    fn format_lookup() {
        assert_eq!(Format::from_extension("LACONF"), Some(Format::Laconic));
        assert_eq!(Format::from_path(Path::new("a/b.xml")), Some(Format::Xml));
        assert_eq!(Format::from_path(Path::new("a/b")), None);
        assert_eq!("JSON".parse::<Format>(), Ok(Format::Json));
        assert!("toml".parse::<Format>().is_err());
    }

    #[test]
    fn read_or_none_swallows_parse_errors() {
        let options = ReadOptions::default();
        assert!(Format::Laconic.read_or_none("root{", &options).is_none());
        assert!(Format::Xml.read_or_none("<root>", &options).is_none());
        assert!(Format::Json.read_or_none("{", &options).is_none());

        let tree = Format::Json.read_or_none(r#"{"root": {"a": 1}}"#, &options).unwrap();
        assert_eq!(tree.root().attr("a").value().unwrap(), "1");
    }

    #[test]
    fn parsed_trees_are_unmodified() {
        let options = ReadOptions::default();
        for (format, text) in [
            (Format::Laconic, "root{ a=1 b{} }"),
            (Format::Xml, r#"<root a="1"><b/></root>"#),
            (Format::Json, r#"{"root": {"a": 1, "b": {}}}"#),
        ] {
            let tree = format.read(text, &options).unwrap();
            assert!(!tree.is_modified(), "{format}");
            assert_eq!(tree.root().child_count(), 1, "{format}");
        }
    }

    #[test]
    fn strict_names_reject_odd_names() {
        let options = ReadOptions {
            strict_names: true,
            ..Default::default()
        };
        assert!(Format::Laconic.read("root{ 'a b'=1 }", &options).is_err());
        assert!(Format::Laconic.read("root{ a-b=1 }", &options).is_ok());
    }
}
