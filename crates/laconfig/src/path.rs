//! path navigation
//!
//! A path is a list of `/` separated segments, absolute when it starts with `/`:
//!
//! | segment            | selects                                                   |
//! |--------------------|-----------------------------------------------------------|
//! | `name`             | first child section called `name`                         |
//! | `name[2]`          | third child section called `name`                         |
//! | `name[attr=value]` | first child `name` whose attribute `attr` equals `value`  |
//! | `[2]`              | third child section                                       |
//! | `[attr=value]`     | first child of any name whose `attr` equals `value`       |
//! | `$name`            | attribute `name` of the current section                   |
//! | `$[1]`             | second attribute of the current section                   |
//! | `..`               | parent (owning section of an attribute)                   |
//! | `.`                | current node                                              |
//!
//! A leading `!` makes the whole path required: failing to resolve raises [Error::NavigationRequired] instead of
//! returning the non-existent sentinel. `!` in front of a single segment makes only that segment required.
//! Alternatives are separated by `|` and tried left to right, the first existing node wins.
//! A leading `@` asks for the verbatim value when the path is used inside a variable.
//!
//! `[attr=value]` compares against the evaluated value of `attr`, or its verbatim value when evaluation fails.
use crate::node::{Attribute, ConfigNode, Node, Section};
use crate::util::names_eq;
use crate::{Error, Result};

/// Evaluates attributes compared by `[attr=value]` selectors
pub(crate) type ValueOf<'v> = dyn FnMut(Node<'_>) -> Result<String> + 'v;

#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    source: String,
    required: bool,
    verbatim: bool,
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, PartialEq)]
struct Alternative {
    absolute: bool,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
struct Segment {
    required: bool,
    kind: SegmentKind,
}

#[derive(Debug, Clone, PartialEq)]
enum SegmentKind {
    Current,
    Parent,
    /// empty name matches any child
    Child {
        name: String,
        selector: Selector,
    },
    Attribute(String),
    AttributeAt(usize),
}

#[derive(Debug, Clone, PartialEq)]
enum Selector {
    First,
    Index(usize),
    Matching { attribute: String, value: String },
}

impl PathExpr {
    pub fn parse(path: &str) -> Result<Self> {
        let mut expr = PathExpr {
            source: path.to_string(),
            required: false,
            verbatim: false,
            alternatives: vec![],
        };

        for alternative in split_top_level(path, '|') {
            let mut rest = alternative.trim();
            loop {
                if let Some(stripped) = rest.strip_prefix('!') {
                    expr.required = true;
                    rest = stripped.trim_start();
                } else if let Some(stripped) = rest.strip_prefix('@') {
                    expr.verbatim = true;
                    rest = stripped.trim_start();
                } else {
                    break;
                }
            }

            let absolute = rest.starts_with('/');
            let segments = split_top_level(rest, '/')
                .into_iter()
                .map(str::trim)
                .filter(|segment| !segment.is_empty())
                .map(|segment| expr.parse_segment(segment))
                .collect::<Result<Vec<_>>>()?;

            expr.alternatives.push(Alternative { absolute, segments });
        }

        Ok(expr)
    }

    fn syntax_error(&self, message: impl Into<String>) -> Error {
        Error::NavigationSyntax {
            path: self.source.clone(),
            message: message.into(),
        }
    }

    fn parse_segment(&self, segment: &str) -> Result<Segment> {
        let (required, segment) = match segment.strip_prefix('!') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, segment),
        };

        let kind = match segment {
            "." => SegmentKind::Current,
            ".." => SegmentKind::Parent,
            _ => {
                if let Some(attribute) = segment.strip_prefix('$') {
                    self.parse_attribute(attribute.trim())?
                } else {
                    self.parse_child(segment)?
                }
            }
        };

        Ok(Segment { required, kind })
    }

    fn parse_attribute(&self, attribute: &str) -> Result<SegmentKind> {
        if attribute.is_empty() {
            return Err(self.syntax_error("attribute name expected after '$'"));
        }

        if attribute.starts_with('[') {
            return match self.parse_brackets(attribute)? {
                Selector::Index(index) => Ok(SegmentKind::AttributeAt(index)),
                _ => Err(self.syntax_error("attribute indexer must be a number")),
            };
        }

        if attribute.contains(['[', ']']) {
            return Err(self.syntax_error(format!(
                "unexpected indexer in attribute '{attribute}'"
            )));
        }

        Ok(SegmentKind::Attribute(attribute.to_string()))
    }

    fn parse_child(&self, segment: &str) -> Result<SegmentKind> {
        let Some(open) = segment.find('[') else {
            if segment.contains(']') {
                return Err(self.syntax_error(format!("unbalanced ']' in '{segment}'")));
            }
            return Ok(SegmentKind::Child {
                name: segment.to_string(),
                selector: Selector::First,
            });
        };

        Ok(SegmentKind::Child {
            name: segment[..open].trim().to_string(),
            selector: self.parse_brackets(&segment[open..])?,
        })
    }

    /// `text` starts with `[`
    fn parse_brackets(&self, text: &str) -> Result<Selector> {
        let Some(inner) = text
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        else {
            return Err(self.syntax_error(format!("indexer '{text}' is not closed")));
        };

        if inner.contains(['[', ']']) && !is_quoted_value(inner) {
            let message = format!("nested brackets in indexer '{text}'");
            return Err(self.syntax_error(message));
        }

        let inner = inner.trim();
        if inner.is_empty() {
            return Err(self.syntax_error("empty indexer"));
        }

        if let Some((attribute, value)) = inner.split_once('=') {
            let attribute = attribute.trim();
            if attribute.is_empty() {
                let message = format!("attribute name missing in '{text}'");
                return Err(self.syntax_error(message));
            }
            return Ok(Selector::Matching {
                attribute: attribute.to_string(),
                value: unquote(value.trim()).to_string(),
            });
        }

        inner
            .parse()
            .map(Selector::Index)
            .map_err(|_| {
                self.syntax_error(format!(
                    "indexer '{text}' is neither a number nor attr=value"
                ))
            })
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_verbatim(&self) -> bool {
        self.verbatim
    }

    /// Resolve against `start`, see module docs for the required/optional rules
    pub fn navigate<'t>(&self, start: Node<'t>) -> Result<Node<'t>> {
        self.navigate_with(start, &mut crate::vars::evaluate_node)
    }

    pub(crate) fn navigate_with<'t>(
        &self,
        start: Node<'t>,
        value_of: &mut ValueOf<'_>,
    ) -> Result<Node<'t>> {
        let missing = Node::Section(Section::missing(start.tree()));

        for alternative in &self.alternatives {
            let node = self.navigate_alternative(alternative, start, value_of)?;
            if node.exists() {
                return Ok(node);
            }
        }

        if self.required {
            return Err(Error::NavigationRequired {
                path: self.source.clone(),
            });
        }

        Ok(missing)
    }

    fn navigate_alternative<'t>(
        &self,
        alternative: &Alternative,
        start: Node<'t>,
        value_of: &mut ValueOf<'_>,
    ) -> Result<Node<'t>> {
        let tree = start.tree();
        let mut current = if alternative.absolute {
            Node::Section(tree.root())
        } else {
            start
        };

        for segment in &alternative.segments {
            current = match &segment.kind {
                SegmentKind::Current => current,
                SegmentKind::Parent => Node::Section(current.parent()),
                kind => {
                    let Node::Section(section) = current else {
                        return Err(Error::NotSectionNode {
                            path: self.source.clone(),
                            attribute: current.name().to_string(),
                        });
                    };
                    select(section, kind, value_of)
                }
            };

            if !current.exists() {
                if segment.required {
                    return Err(Error::NavigationRequired {
                        path: self.source.clone(),
                    });
                }
                return Ok(Node::Section(Section::missing(tree)));
            }
        }

        Ok(current)
    }
}

fn select<'t>(section: Section<'t>, kind: &SegmentKind, value_of: &mut ValueOf<'_>) -> Node<'t> {
    match kind {
        SegmentKind::Attribute(name) => Node::Attribute(section.attr(name)),
        SegmentKind::AttributeAt(index) => Node::Attribute(section.attr_at(*index)),
        SegmentKind::Child { name, selector } => {
            let mut candidates = section
                .children()
                .filter(|child| name.is_empty() || names_eq(child.name(), name));

            let found = match selector {
                Selector::First => candidates.next(),
                Selector::Index(index) => candidates.nth(*index),
                Selector::Matching { attribute, value } => {
                    candidates.find(|child| attr_matches(child.attr(attribute), value, value_of))
                }
            };

            Node::Section(found.unwrap_or(Section::missing(section.tree())))
        }
        SegmentKind::Current | SegmentKind::Parent => Node::Section(section),
    }
}

pub(crate) fn attr_matches(
    attr: Attribute<'_>,
    expected: &str,
    value_of: &mut ValueOf<'_>,
) -> bool {
    if !attr.exists() {
        return false;
    }
    match value_of(Node::Attribute(attr)) {
        Ok(actual) => actual == expected,
        Err(_) => attr.verbatim_value() == Some(expected),
    }
}

fn is_quoted_value(inner: &str) -> bool {
    inner
        .split_once('=')
        .map(|(_, value)| unquote(value.trim()).len() + 2 == value.trim().len())
        .unwrap_or(false)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Split on `separator` outside of brackets and quotes
pub(crate) fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = vec![];
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (at, c) in text.char_indices() {
        match (quote, c) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, c) if c == separator && depth == 0 => {
                parts.push(&text[start..at]);
                start = at + c.len_utf8();
            }
            _ => {}
        }
    }

    parts.push(&text[start..]);
    parts
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::laconic;
    use pretty_assertions::assert_eq;

    fn sample() -> crate::ConfigTree {
        laconic!(
            r#"
            root
            {
              vars
              {
                many
                {
                  a{ age=16 name=young }
                  a{ age=18 name=adult }
                  b=section-value{ }
                }
                x=1
              }
              empty{}
            }
            "#
        )
    }

    #[test]
    fn select_by_attribute_value() {
        let tree = sample();
        let adult = tree.root().navigate("/vars/many/a[age=18]").unwrap();
        assert_eq!(adult.as_section().attr("name").value().unwrap(), "adult");

        let quoted = tree.root().navigate(r#"/vars/many/a[ name = "young" ]"#).unwrap();
        assert_eq!(quoted.as_section().attr("age").value().unwrap(), "16");

        let any_name = tree.root().navigate("/vars/many/[name=adult]").unwrap();
        assert_eq!(any_name.path(), "/vars/many/a");
    }

    #[test]
    fn select_by_evaluated_value() {
        let tree = laconic!(
            r#"
            root
            {
              n=18
              many
              {
                a{ age=$(/$n) name=first }
                a{ age=$(/$n) name=second }
                b{ key='$(/many/b[key=x]/$name)' name=self }
              }
            }
            "#
        );
        let root = tree.root();

        assert_eq!(
            root.navigate("/many/a[age=18]/$name").unwrap().value().unwrap(),
            "first"
        );
        assert!(!root.navigate("/many/a[age=19]").unwrap().exists());
        let adult = root.child("many").child_by_attr("a", "age", "18");
        assert_eq!(adult.attr("name").value().unwrap(), "first");

        // the selector inside `key` meets `key` again and compares its verbatim text
        assert!(!root.navigate("/many/b[key=x]").unwrap().exists());
    }

    #[test]
    fn select_by_index() {
        let tree = sample();
        let root = tree.root();
        let age = root.navigate("vars/many/a[1]/$age").unwrap();
        assert_eq!(age.value().unwrap(), "18");
        let third = root.navigate("vars/many/[2]").unwrap();
        assert_eq!(third.value().unwrap(), "section-value");
        assert_eq!(root.navigate("vars/$[0]").unwrap().value().unwrap(), "1");
        assert!(!root.navigate("vars/many/a[2]").unwrap().exists());
    }

    #[test]
    fn relative_and_parent() {
        let tree = sample();
        let many = tree.root().navigate_section("vars/many").unwrap();

        assert_eq!(many.navigate("../$x").unwrap().value().unwrap(), "1");
        assert_eq!(many.navigate("./a/../../$x").unwrap().value().unwrap(), "1");
        assert_eq!(many.navigate("/").unwrap().path(), "/");

        let x = tree.root().navigate("vars/$x").unwrap();
        assert_eq!(x.as_section().exists(), false);
        let up = PathExpr::parse("../many").unwrap();
        assert_eq!(up.navigate(x).unwrap().path(), "/vars/many");
    }

    #[test]
    fn missing_intermediate_segment() {
        let tree = sample();
        let root = tree.root();

        assert!(!root.navigate("/GGG/b/c").unwrap().exists());
        assert!(matches!(
            root.navigate("!/GGG/b/c"),
            Err(Error::NavigationRequired { path }) if path == "!/GGG/b/c"
        ));
        assert!(matches!(
            root.navigate("/vars/!GGG/c"),
            Err(Error::NavigationRequired { .. })
        ));
        assert!(!root.navigate("/GGG/!b").unwrap().exists());
    }

    #[test]
    fn alternatives() {
        let tree = sample();
        let root = tree.root();

        let node = root.navigate("/nope/$x | /vars/$missing | /vars/$x").unwrap();
        assert_eq!(node.path(), "/vars/$x");
        assert!(!root.navigate("/nope|/also-nope").unwrap().exists());
        assert!(root.navigate("!/nope|/also-nope").is_err());
        assert!(root.navigate("!/nope|/vars").is_ok());
    }

    #[test]
    fn flags() {
        let expr = PathExpr::parse("!@/vars/$x").unwrap();
        assert!(expr.is_required());
        assert!(expr.is_verbatim());

        let expr = PathExpr::parse("vars/$x").unwrap();
        assert!(!expr.is_required());
        assert!(!expr.is_verbatim());
    }

    #[test]
    fn syntax_errors() {
        for path in ["a[1", "a]", "a[]", "a[x]", "a[=1]", "$", "$[x]", "$a[1]", "a[b[1]]"] {
            assert!(
                matches!(PathExpr::parse(path), Err(Error::NavigationSyntax { .. })),
                "{path} should not parse"
            );
        }
    }

    #[test]
    fn attribute_of_attribute() {
        let tree = sample();
        assert!(matches!(
            tree.root().navigate("/vars/$x/$y"),
            Err(Error::NotSectionNode { attribute, .. }) if attribute == "x"
        ));
        assert!(matches!(
            tree.root().navigate("/vars/$x/child"),
            Err(Error::NotSectionNode { .. })
        ));
    }

    #[test]
    fn top_level_split() {
        assert_eq!(
            split_top_level("a/b[c='x/y']/d", '/'),
            vec!["a", "b[c='x/y']", "d"]
        );
        assert_eq!(split_top_level("a|b", '|'), vec!["a", "b"]);
        assert_eq!(split_top_level("", '/'), vec![""]);
    }
}
