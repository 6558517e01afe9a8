//! Laconic: the brace based configuration syntax
//!
//! ```text
//! // single line comments
//! /* block
//!    comments */
//! root=optional-root-value
//! {
//!   flag                          // attribute without value
//!   name=value                    // attribute
//!   "quoted name"="tab\tescaped"  // \n \r \t \\ \" \' \0 \uXXXX
//!   raw=$"C:\no\escapes ""here""" // verbatim string, doubled quote for a quote
//!   section{ }                    // section
//!   section=value{ }              // section with a value
//!   url=$(/a/$b)                  // variables never need quoting
//! }
//! ```
//!
//! Bare tokens end at whitespace or one of `{ } = " '`. A `$( ... )` marker inside a bare token is kept whole.
//! Comments start only where a token could start.
use super::{ReadOptions, Style, WriteOptions};
use crate::node::{ConfigNode, Section};
use crate::tree::{ConfigTree, SectionId};
use crate::util::line_col;
use crate::vars::marker_end;
use crate::{Error, Result};
use std::borrow::Cow;

const FORMAT: &str = "laconic";

pub fn parse(text: &str, options: &ReadOptions) -> Result<ConfigTree> {
    let mut parser = Parser {
        lexer: Lexer::new(text),
    };

    let mut tree = match &options.implicit_root {
        Some(root_name) => {
            let mut tree = options.new_tree(root_name)?;
            let root = tree.root_id();
            parser.body(&mut tree, root, 1)?;
            tree
        }
        None => parser.root(options)?,
    };

    tree.reset_modified();
    Ok(tree)
}

#[derive(Debug, PartialEq)]
enum Token {
    Open,
    Close,
    Equals,
    Word(String),
}

impl Token {
    fn describe(&self) -> Cow<'static, str> {
        match self {
            Token::Open => "'{'".into(),
            Token::Close => "'}'".into(),
            Token::Equals => "'='".into(),
            Token::Word(word) => format!("'{word}'").into(),
        }
    }
}

struct Lexer<'a> {
    text: &'a str,
    pos: usize,
    peeked: Option<Option<(Token, usize)>>,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            peeked: None,
        }
    }

    fn error(&self, at: usize, message: impl Into<String>) -> Error {
        Error::parse(FORMAT, line_col(self.text, at), message)
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn peek(&mut self) -> Result<Option<&Token>> {
        if self.peeked.is_none() {
            self.peeked = Some(self.scan()?);
        }
        Ok(self
            .peeked
            .as_ref()
            .and_then(|peeked| peeked.as_ref())
            .map(|(token, _)| token))
    }

    fn next(&mut self) -> Result<Option<(Token, usize)>> {
        match self.peeked.take() {
            Some(peeked) => Ok(peeked),
            None => self.scan(),
        }
    }

    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            let rest = self.rest();
            let trimmed = rest.trim_start();
            self.pos += rest.len() - trimmed.len();

            if trimmed.starts_with("//") {
                self.pos += trimmed.find('\n').unwrap_or(trimmed.len());
            } else if let Some(comment) = trimmed.strip_prefix("/*") {
                let Some(end) = comment.find("*/") else {
                    return Err(self.error(self.pos, "unterminated comment"));
                };
                self.pos += end + 4;
            } else {
                return Ok(());
            }
        }
    }

    fn scan(&mut self) -> Result<Option<(Token, usize)>> {
        self.skip_trivia()?;
        let at = self.pos;
        let rest = self.rest();

        let Some(first) = rest.chars().next() else {
            return Ok(None);
        };

        let token = match first {
            '{' => {
                self.pos += 1;
                Token::Open
            }
            '}' => {
                self.pos += 1;
                Token::Close
            }
            '=' => {
                self.pos += 1;
                Token::Equals
            }
            '"' | '\'' => Token::Word(self.quoted(first)?),
            '$' if rest[1..].starts_with(['"', '\'']) => {
                self.pos += 1;
                Token::Word(self.verbatim()?)
            }
            _ => {
                let len = bare_len(rest);
                self.pos += len;
                Token::Word(rest[..len].to_string())
            }
        };

        Ok(Some((token, at)))
    }

    /// `"..."` / `'...'` with backslash escapes
    fn quoted(&mut self, quote: char) -> Result<String> {
        let start = self.pos;
        let mut out = String::new();
        let mut chars = self.rest().char_indices().skip(1);

        while let Some((offset, c)) = chars.next() {
            match c {
                c if c == quote => {
                    self.pos += offset + 1;
                    return Ok(out);
                }
                '\\' => {
                    let Some((escape_at, escape)) = chars.next() else {
                        break;
                    };
                    let unescaped = match escape {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        '0' => '\0',
                        '\\' | '"' | '\'' => escape,
                        'u' => {
                            let hex: String = chars.by_ref().take(4).map(|(_, c)| c).collect();
                            u32::from_str_radix(&hex, 16)
                                .ok()
                                .filter(|_| hex.len() == 4)
                                .and_then(char::from_u32)
                                .ok_or_else(|| {
                                    self.error(
                                        start + escape_at,
                                        format!("invalid unicode escape '\\u{hex}'"),
                                    )
                                })?
                        }
                        other => {
                            return Err(self.error(
                                start + escape_at,
                                format!("unknown escape '\\{other}'"),
                            ))
                        }
                    };
                    out.push(unescaped);
                }
                c => out.push(c),
            }
        }

        Err(self.error(start, "unterminated string"))
    }

    /// `$"..."` / `$'...'`, the `$` is already consumed
    fn verbatim(&mut self) -> Result<String> {
        let start = self.pos;
        let rest = self.rest();
        let Some(quote) = rest.chars().next() else {
            return Err(self.error(start, "unterminated string"));
        };

        let mut out = String::new();
        let mut chars = rest.char_indices().skip(1).peekable();
        while let Some((offset, c)) = chars.next() {
            if c != quote {
                out.push(c);
                continue;
            }
            if chars.next_if(|(_, next)| *next == quote).is_some() {
                out.push(quote);
                continue;
            }
            self.pos += offset + 1;
            return Ok(out);
        }

        Err(self.error(start - 1, "unterminated string"))
    }
}

fn is_bare_stop(c: char) -> bool {
    c.is_whitespace() || matches!(c, '{' | '}' | '=' | '"' | '\'')
}

/// Byte length of the bare token at the start of `text`
fn bare_len(text: &str) -> usize {
    let mut pos = 0;
    while let Some(c) = text[pos..].chars().next() {
        if text[pos..].starts_with("$(") {
            if let Some(end) = marker_end(&text[pos + 2..]) {
                pos += 2 + end + 1;
                continue;
            }
        }
        if is_bare_stop(c) {
            break;
        }
        pos += c.len_utf8();
    }
    pos
}

struct Parser<'a> {
    lexer: Lexer<'a>,
}

impl Parser<'_> {
    fn expect_word(&mut self, what: &str) -> Result<String> {
        match self.lexer.next()? {
            Some((Token::Word(word), _)) => Ok(word),
            Some((token, at)) => {
                let message = format!("{what} expected, found {}", token.describe());
                Err(self.lexer.error(at, message))
            }
            None => {
                let message = format!("{what} expected, found end of input");
                Err(self.lexer.error(self.lexer.pos, message))
            }
        }
    }

    fn optional_value(&mut self) -> Result<Option<String>> {
        if self.lexer.peek()? != Some(&Token::Equals) {
            return Ok(None);
        }
        self.lexer.next()?;
        self.expect_word("value").map(Some)
    }

    fn root(&mut self, options: &ReadOptions) -> Result<ConfigTree> {
        let name = self.expect_word("root section")?;
        let value = self.optional_value()?;

        match self.lexer.next()? {
            Some((Token::Open, _)) => {}
            Some((token, at)) => {
                let found = token.describe();
                let message = format!("'{{' expected after root name, found {found}");
                return Err(self.lexer.error(at, message));
            }
            None => {
                let message = "'{' expected after root name, found end of input";
                return Err(self.lexer.error(self.lexer.pos, message));
            }
        }

        let mut tree = options.new_tree(&name)?;
        let root = tree.root_id();
        if value.is_some() {
            tree.set_value(root, value.as_deref())?;
        }
        self.body(&mut tree, root, 0)?;

        if let Some((token, at)) = self.lexer.next()? {
            return Err(self.lexer.error(
                at,
                format!("unexpected {} after the root section", token.describe()),
            ));
        }

        Ok(tree)
    }

    /// Parses items into `section` until its closing brace (`floor` 0) or end of input (`floor` 1)
    fn body(&mut self, tree: &mut ConfigTree, section: SectionId, floor: usize) -> Result<()> {
        let mut stack = vec![section];

        loop {
            let Some((token, at)) = self.lexer.next()? else {
                if floor == 1 && stack.len() == 1 {
                    return Ok(());
                }
                let end = self.lexer.pos;
                return Err(self.lexer.error(end, "'}' expected, found end of input"));
            };

            match token {
                Token::Close if stack.len() == floor => {
                    return Err(self.lexer.error(at, "unexpected '}'"));
                }
                Token::Close => {
                    stack.pop();
                    if stack.is_empty() {
                        return Ok(());
                    }
                }
                Token::Word(name) => {
                    let current = stack[stack.len() - 1];
                    let value = self.optional_value()?;
                    if self.lexer.peek()? == Some(&Token::Open) {
                        self.lexer.next()?;
                        let child = tree.add_child(current, &name, value.as_deref())?;
                        stack.push(child);
                    } else {
                        tree.add_attribute(current, &name, value.as_deref())?;
                    }
                }
                token => {
                    return Err(self
                        .lexer
                        .error(at, format!("unexpected {}", token.describe())));
                }
            }
        }
    }
}

pub fn write(section: Section<'_>, options: &WriteOptions) -> String {
    let mut writer = Writer::new(options.style);

    if !section.exists() {
        return writer.out;
    }

    if options.omit_root {
        writer.body(section, 0);
    } else {
        writer.section(section, 0);
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
    fn separate(&mut self, indent: usize) {
        if self.out.is_empty() || self.out.ends_with('{') && self.style == Style::Compact {
            return;
        }
        match self.style {
            Style::Pretty => {
                self.out.push('\n');
                self.out.push_str(&"  ".repeat(indent));
            }
            Style::Compact => self.out.push(' '),
        }
    }

    fn item(&mut self, name: &str, value: Option<&str>) {
        self.out.push_str(&token(name));
        if let Some(value) = value {
            self.out.push('=');
            self.out.push_str(&token(value));
        }
    }

    fn section(&mut self, section: Section<'_>, indent: usize) {
        self.item(section.name(), section.verbatim_value());

        if section.attr_count() == 0 && section.child_count() == 0 {
            self.out.push_str("{}");
            return;
        }

        match self.style {
            Style::Pretty => {
                self.out.push('\n');
                self.out.push_str(&"  ".repeat(indent));
                self.out.push('{');
                self.body(section, indent + 1);
                self.out.push('\n');
                self.out.push_str(&"  ".repeat(indent));
                self.out.push('}');
            }
            Style::Compact => {
                self.out.push('{');
                self.body(section, indent + 1);
                self.out.push('}');
            }
        }
    }

    fn body(&mut self, section: Section<'_>, indent: usize) {
        for attribute in section.attributes() {
            self.separate(indent);
            self.item(attribute.name(), attribute.verbatim_value());
        }
        for child in section.children() {
            self.separate(indent);
            self.section(child, indent);
        }
    }
}

/// `text` as a bare token when it lexes back as itself, quoted otherwise
fn token(text: &str) -> Cow<'_, str> {
    let bare = !text.is_empty()
        && bare_len(text) == text.len()
        && !text.starts_with("//")
        && !text.starts_with("/*")
        && !text.starts_with("$\"")
        && !text.starts_with("$'")
        && !text.contains(|c: char| c.is_control());

    if bare {
        return Cow::Borrowed(text);
    }

    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            '\0' => quoted.push_str("\\0"),
            c if c.is_control() => quoted.push_str(&format!("\\u{:04x}", c as u32)),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    Cow::Owned(quoted)
}
