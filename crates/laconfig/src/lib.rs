//! # laconfig - hierarchical configuration
//!
//! For CLI usage see `laconfig --help`.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `laconfig` works internally.
//!
//! ### Terms
//!
//! - a configuration is a `tree` of `sections`
//! - ...with exactly one `root` section
//! - every section has a `name`, an optional `value`, ordered `attributes` and ordered child `sections`
//! - an `attribute` is a name with an optional value
//! - names are compared case-insensitively, duplicates are allowed and the first match wins
//!
//! This is a valid configuration in Laconic syntax:
//! ```text
//! // single line comments work like this
//! /* multi-line
//! comments also work */
//! app=my-service
//! {
//!   log-level=debug
//!
//!   db { host=localhost port=5432 }
//!   db { name=reporting host=$(/db/$host) }
//! }
//! ```
//!
//! The same tree can be read from and written to XML and JSON, see [format].
//!
//! ### Storage
//!
//! A [ConfigTree] owns all of its sections (an arena addressed by [SectionId]). Reading goes through the borrowed
//! handles [Section] and [Attribute]. A handle for something that does not exist is a sentinel that answers every
//! lookup with another sentinel, so long lookup chains never have to check for presence.
//!
//! Mutation goes through `&mut ConfigTree` and marks the touched section and all of its ancestors as modified.
//!
//! ### Navigation
//!
//! Paths like `/db[name=reporting]/$host` address sections and attributes, see [path].
//!
//! ### Evaluation
//!
//! Values may reference other values with `$(path)`, environment variables with `$(~NAME)` and post-process them
//! with macros `$(path::as-int dflt=1)`. [ConfigNode::value] evaluates, [ConfigNode::verbatim_value] does not.
//! Evaluation keeps the chain of values it is resolving on a stack local to the call and reports cycles as
//! [Error::RecursiveVariable], see [vars].
//!
//! ### Cascading
//!
//! A tree can be overridden by another one ([merge]). Loading several documents ([documents::ConfigDocuments]) and
//! cascading them applies them in order: the first document is the base, every later one overrides the result.
//! Sections control how they are overridden with the `_override` attribute.
//!
//! ### Scripts
//!
//! A tree can carry `_if`/`_else`/`_loop`/`_set`/`_call`/`_block` sections which [script::ScriptRunner] executes to
//! build a new tree.
//!
//! ### Output
//!
//! Any section can be written with [format::Format::write]. Values are written verbatim, evaluation is up to the
//! reader.
//!
pub mod documents;
mod error;
pub mod format;
pub mod include;
pub mod macros;
pub mod merge;
mod node;
pub mod path;
pub mod script;
mod tree;
pub mod util;
pub mod value;
pub mod vars;
mod visit;

pub use error::{Error, Result};
pub use node::{Attribute, ConfigNode, Node, Section};
pub use tree::{ConfigTree, NameMode, NodeKey, SectionId};
pub use value::FromValue;

/// Build configuration from literal Laconic text
///
/// One argument parses a single [ConfigTree]. `source => text` pairs build [documents::ConfigDocuments] where
/// `source` names each document.
///
/// Panics when the text does not parse, meant for tests and examples.
///
/// ```
/// use laconfig::{laconic, ConfigNode};
///
/// let tree = laconic!("app{ port=8080 }");
/// assert_eq!(tree.root().attr("port").value_as::<u16>().unwrap(), 8080);
///
/// let documents = laconic! {
///     "base.laconf" => "app{ port=8080 }",
///     "local.laconf" => "app{ port=9090 }",
/// };
/// assert_eq!(documents.len(), 2);
/// ```
#[macro_export]
macro_rules! laconic {
    ($($source:expr => $text:expr),+ $(,)?) => {{
        let mut documents = $crate::documents::ConfigDocuments::default();
        $(
            documents
                .add_text($source, $crate::format::Format::Laconic, $text)
                .expect("laconic text must parse");
        )+
        documents
    }};
    ($text:expr) => {
        $crate::format::Format::Laconic
            .read($text, &$crate::format::ReadOptions::default())
            .expect("laconic text must parse")
    };
}
