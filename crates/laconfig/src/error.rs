//! errors raised by the configuration engine
//!
//! Every failure is thrown at the point of detection. Nothing in the engine logs and swallows an [Error].

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Malformed source text
    #[error("{format} parse error at line {line}, column {column}: {message}")]
    Parse {
        format: &'static str,
        line: usize,
        column: usize,
        message: String,
    },

    /// A `!` marked (or otherwise mandatory) path did not resolve
    #[error("required path '{path}' could not be resolved")]
    NavigationRequired { path: String },

    /// Malformed path expression
    #[error("syntax error in path '{path}': {message}")]
    NavigationSyntax { path: String, message: String },

    /// Path tried to continue below an attribute
    #[error("path '{path}' continues below attribute '{attribute}' which is not a section node")]
    NotSectionNode { path: String, attribute: String },

    /// Variable resolution revisited a node that is still being resolved
    #[error("recursive vars detected: {cycle}")]
    RecursiveVariable { cycle: String },

    /// Mutation of a read-only tree
    #[error("configuration is read-only, can not {operation}")]
    ReadOnly { operation: &'static str },

    /// Mutation addressed a section that was deleted or never existed
    #[error("can not {operation}: section does not exist")]
    MissingNode { operation: &'static str },

    /// Name rejected by the active name mode
    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// `_override=fail` hit or an unknown override directive
    #[error("override of '{path}' failed: {message}")]
    Override { path: String, message: String },

    /// Misuse of a script construct
    #[error("script construct '{construct}' at '{path}' failed: {message}")]
    Script {
        construct: String,
        path: String,
        message: String,
    },

    /// `_include` that could not be resolved or spliced
    #[error("include at '{path}' failed: {message}")]
    Include { path: String, message: String },

    /// Unknown macro or a macro that could not produce its value
    #[error("macro '{name}' failed: {message}")]
    Macro { name: String, message: String },

    /// Value could not be converted to the requested type
    #[error("value {value:?} at '{path}' can not be converted to {target}")]
    Coercion {
        path: String,
        value: String,
        target: &'static str,
    },

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn parse(
        format: &'static str,
        (line, column): (usize, usize),
        message: impl Into<String>,
    ) -> Self {
        Error::Parse {
            format,
            line,
            column,
            message: message.into(),
        }
    }

    pub(crate) fn script(
        construct: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Script {
            construct: construct.into(),
            path: path.into(),
            message: message.into(),
        }
    }

    /// True for a recursion detected by the variable evaluator
    pub fn is_recursive_variable(&self) -> bool {
        matches!(self, Error::RecursiveVariable { .. })
    }

    /// True for a required path that did not resolve
    pub fn is_navigation_required(&self) -> bool {
        matches!(self, Error::NavigationRequired { .. })
    }
}
