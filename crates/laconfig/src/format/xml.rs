//! XML mapping
//!
//! Elements are sections, XML attributes are attributes. Text and CDATA inside an element are concatenated into the
//! section value. Plain text is trimmed at the edges of the value, CDATA is kept as written. The writer puts values
//! with leading or trailing whitespace into CDATA so they read back unchanged. Comments, processing instructions, declarations and doctypes are skipped.
//!
//! With [ReadOptions::implicit_root] the text is read as a fragment: every top-level element becomes a child of the
//! implicit root.
//!
//! Written names are normalized to valid XML names, attributes without value are written as empty strings.
use super::{ReadOptions, Style, WriteOptions};
use crate::node::{ConfigNode, Section};
use crate::tree::{ConfigTree, SectionId};
use crate::util::{line_col, normalize_name};
use crate::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

const FORMAT: &str = "xml";

pub fn parse(text: &str, options: &ReadOptions) -> Result<ConfigTree> {
    let mut builder = Builder {
        text,
        tree: None,
        stack: vec![],
        fragment: options.implicit_root.is_some(),
    };

    if let Some(root_name) = &options.implicit_root {
        let tree = options.new_tree(root_name)?;
        builder.stack.push((tree.root_id(), vec![]));
        builder.tree = Some(tree);
    }

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text_start = false;
    reader.config_mut().trim_text_end = false;

    loop {
        let at = reader.buffer_position() as usize;
        match reader.read_event() {
            Ok(Event::Start(element)) => builder.open(&element, at, options)?,
            Ok(Event::Empty(element)) => {
                builder.open(&element, at, options)?;
                builder.close()?;
            }
            Ok(Event::End(_)) => builder.close()?,
            Ok(Event::Text(content)) => {
                let content = content
                    .unescape()
                    .map_err(|err| builder.error(at, format!("invalid text content: {err}")))?;
                builder.text(&content, false, at)?;
            }
            Ok(Event::CData(content)) => {
                builder.text(&String::from_utf8_lossy(content.as_ref()), true, at)?;
            }
            Ok(Event::Comment(_) | Event::PI(_)) => {}
            Ok(Event::Decl(_) | Event::DocType(_)) => {}
            Ok(Event::Eof) => break,
            Err(err) => {
                let at = reader.error_position() as usize;
                return Err(builder.error(at, err.to_string()));
            }
        }
    }

    builder.finish(text.len())
}

struct Builder<'a> {
    text: &'a str,
    tree: Option<ConfigTree>,
    /// open sections with the text collected so far, flagged when it came from CDATA
    stack: Vec<(SectionId, Vec<(String, bool)>)>,
    fragment: bool,
}

impl Builder<'_> {
    fn error(&self, at: usize, message: impl Into<String>) -> Error {
        Error::parse(FORMAT, line_col(self.text, at), message)
    }

    fn open(&mut self, element: &BytesStart<'_>, at: usize, options: &ReadOptions) -> Result<()> {
        let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();

        let parent = self.stack.last().map(|(id, _)| *id);
        if self.tree.is_some() && parent.is_none() {
            return Err(self.error(at, "only one root element is allowed"));
        }
        if self.tree.is_none() {
            self.tree = Some(options.new_tree(&name)?);
        }

        let text = self.text;
        let Some(tree) = self.tree.as_mut() else {
            return Ok(());
        };
        let id = match parent {
            Some(parent) => tree.add_child(parent, &name, None)?,
            None => tree.root_id(),
        };

        for attribute in element.attributes() {
            let attribute =
                attribute.map_err(|err| Error::parse(FORMAT, line_col(text, at), err.to_string()))?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute
                .unescape_value()
                .map_err(|err| Error::parse(FORMAT, line_col(text, at), err.to_string()))?;
            tree.add_attribute(id, &key, Some(&value))?;
        }

        self.stack.push((id, vec![]));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some((id, parts)) = self.stack.pop() else {
            return Ok(());
        };

        let value = joined_value(&parts);
        if let (Some(tree), false) = (self.tree.as_mut(), value.is_empty()) {
            tree.set_value(id, Some(&value))?;
        }
        Ok(())
    }

    fn text(&mut self, content: &str, cdata: bool, at: usize) -> Result<()> {
        let top_level = self.stack.len() == usize::from(self.fragment);
        match self.stack.last_mut() {
            Some((_, parts)) if !top_level => parts.push((content.to_string(), cdata)),
            _ if content.trim().is_empty() => {}
            _ => return Err(self.error(at, "text outside of the root element")),
        }
        Ok(())
    }

    fn finish(mut self, end: usize) -> Result<ConfigTree> {
        if self.stack.len() > usize::from(self.fragment) {
            return Err(self.error(
                end,
                "unexpected end of input, closing tag expected",
            ));
        }
        if self.fragment {
            self.close()?;
        }

        let Some(mut tree) = self.tree else {
            return Err(self.error(end, "no root element found"));
        };
        tree.reset_modified();
        Ok(tree)
    }
}

/// Concatenated parts, whitespace-only plain text at the edges dropped and the outer plain text trimmed
fn joined_value(parts: &[(String, bool)]) -> String {
    let kept = |(text, cdata): &(String, bool)| *cdata || !text.trim().is_empty();
    let (Some(first), Some(last)) = (parts.iter().position(kept), parts.iter().rposition(kept))
    else {
        return String::new();
    };

    let mut value = String::new();
    for (index, (text, cdata)) in parts.iter().enumerate().take(last + 1).skip(first) {
        let mut piece = text.as_str();
        if !cdata && index == first {
            piece = piece.trim_start();
        }
        if !cdata && index == last {
            piece = piece.trim_end();
        }
        value.push_str(piece);
    }
    value
}

pub fn write(section: Section<'_>, options: &WriteOptions) -> String {
    let mut writer = Writer::new(options.style);
    if !section.exists() {
        return writer.out;
    }

    if options.omit_root {
        for child in section.children() {
            writer.element(child, 0);
        }
    } else {
        writer.element(section, 0);
    }
    writer.out
}

#[derive(derive_new::new)]
struct Writer {
    #[new(default)]
    out: String,
    style: Style,
}

impl Writer {
    fn line(&mut self, indent: usize) {
        if self.style == Style::Pretty && !self.out.is_empty() {
            self.out.push('\n');
            self.out.push_str(&"  ".repeat(indent));
        }
    }

    fn element(&mut self, section: Section<'_>, indent: usize) {
        let name = normalize_name(section.name());
        self.line(indent);
        self.out.push('<');
        self.out.push_str(&name);

        for attribute in section.attributes() {
            self.out.push(' ');
            self.out.push_str(&normalize_name(attribute.name()));
            self.out.push_str("=\"");
            let value = attribute.verbatim_value().unwrap_or_default();
            self.out.push_str(&escape_attribute(value));
            self.out.push('"');
        }

        let value = section.verbatim_value().filter(|value| !value.is_empty());
        if value.is_none() && section.child_count() == 0 {
            self.out.push_str("/>");
            return;
        }

        self.out.push('>');
        match value {
            Some(value) if value.trim() != value => {
                self.out.push_str("<![CDATA[");
                self.out.push_str(&value.replace("]]>", "]]]]><![CDATA[>"));
                self.out.push_str("]]>");
            }
            Some(value) => self.out.push_str(&quick_xml::escape::escape(value)),
            None => {}
        }

        if section.child_count() > 0 {
            for child in section.children() {
                self.element(child, indent + 1);
            }
            self.line(indent);
        }

        self.out.push_str("</");
        self.out.push_str(&name);
        self.out.push('>');
    }
}

/// Escaped attribute value, line breaks and tabs as character references so readers do not normalize them away
fn escape_attribute(value: &str) -> String {
    quick_xml::escape::escape(value)
        .replace('\n', "&#10;")
        .replace('\r', "&#13;")
        .replace('\t', "&#9;")
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn read(text: &str) -> ConfigTree {
        parse(text, &ReadOptions::default()).unwrap()
    }

    #[test]
    fn elements_attributes_and_text() {
        let tree = read(
            r#"<?xml version="1.0"?>
            <!-- leading comment -->
            <root env="prod &amp; test">
              <db host="localhost" port="5432"/>
              <greeting>
                hello <![CDATA[<world>]]>
              </greeting>
              <empty>   </empty>
            </root>"#,
        );
        let root = tree.root();

        assert_eq!(root.name(), "root");
        assert_eq!(root.attr("env").verbatim_value(), Some("prod & test"));
        assert_eq!(root.verbatim_value(), None);
        assert_eq!(root.child("db").attr("port").verbatim_value(), Some("5432"));
        assert_eq!(
            root.child("greeting").verbatim_value(),
            Some("hello <world>")
        );
        assert_eq!(root.child("empty").verbatim_value(), None);
        assert!(!tree.is_modified());
    }

    #[test]
    fn fragments_with_implicit_root() {
        let options = ReadOptions {
            implicit_root: Some("root".to_string()),
            ..Default::default()
        };
        let tree = parse("<a x='1'/><b>text</b>", &options).unwrap();
        assert_eq!(tree.root().name(), "root");
        assert_eq!(tree.root().child_count(), 2);
        assert_eq!(tree.root().child("b").verbatim_value(), Some("text"));
    }

    #[test]
    fn malformed_documents() {
        let options = ReadOptions::default();
        for text in ["", "<a>", "<a></b>", "<a/><b/>", "text", "<a x=1/>"] {
            assert!(
                matches!(parse(text, &options), Err(Error::Parse { .. })),
                "{text:?} should not parse"
            );
        }
    }

    #[test]
    fn written_output() {
        let tree = crate::laconic!(
            r#"root{ a="x<y" flag sub="v&w"{ deeper{ y=1 } } 'odd name'{} }"#
        );
        insta::assert_snapshot!(write(tree.root(), &WriteOptions::pretty()), @r###"
        <root a="x&lt;y" flag="">
          <sub>v&amp;w
            <deeper y="1"/>
          </sub>
          <odd-name/>
        </root>
        "###);
        assert_eq!(
            write(tree.root().child("sub"), &WriteOptions::compact()),
            r#"<sub>v&amp;w<deeper y="1"/></sub>"#
        );
    }

    #[test]
    fn padded_values_use_cdata() {
        let tree = crate::laconic!(r#"root{ a="  padded  "{} b=" ]]> "{} c="
"{ d{} } }"#);
        let written = write(tree.root(), &WriteOptions::compact());
        assert_eq!(
            written,
            "<root><a><![CDATA[  padded  ]]></a><b><![CDATA[ ]]]]><![CDATA[> ]]></b><c><![CDATA[\n]]><d/></c></root>"
        );

        let again = read(&written);
        assert_eq!(again.root().child("a").verbatim_value(), Some("  padded  "));
        assert_eq!(again.root().child("b").verbatim_value(), Some(" ]]> "));
        assert!(again.root().same_content(&tree.root()));

        let mixed = read("<a>\n  x <![CDATA[ y ]]>\n</a>");
        assert_eq!(mixed.root().verbatim_value(), Some("x  y "));
    }

    #[test]
    fn written_text_reads_back() {
        let text = r#"root{ a="quote \" and '" lines="1\n2\t3" b{ c=1 d=v{} } }"#;
        let tree = crate::laconic!(text);
        let again = read(&write(tree.root(), &WriteOptions::pretty()));
        assert!(again.root().same_content(&tree.root()));
    }
}
