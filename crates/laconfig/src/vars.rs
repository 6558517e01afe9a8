//! variable evaluation
//!
//! Values may embed markers that are replaced when the value is read:
//!
//! ```text
//! $( [!] [@] path | ~ENV_NAME | <empty> [ ::macro arg=value ... ] )
//! ```
//!
//! - `path` is a [crate::path] expression, relative paths start at the node holding the value
//! - `~NAME` reads from the tree's [EnvVarResolver]
//! - `!` makes the reference required, otherwise an unresolved reference becomes the empty string
//! - `@` inserts the referenced value verbatim (its own markers are not evaluated)
//! - `::macro` passes the referenced value through the tree's [crate::macros::MacroRunner]
//! - `$(###)` inserts a literal `$(`
//!
//! Referenced values are evaluated recursively. The nodes currently being evaluated are kept on a stack that lives
//! only as long as one top-level evaluation, revisiting one of them fails with [Error::RecursiveVariable].
use crate::format::{laconic, ReadOptions};
use crate::macros::MacroRunner;
use crate::node::{ConfigNode, Node};
use crate::path::PathExpr;
use crate::tree::{ConfigTree, NodeKey};
use crate::{Error, Result};
use std::collections::HashMap;

const MARKER: &str = "$(";
const ESCAPE: &str = "###";

/// Source of `$(~NAME)` values
pub trait EnvVarResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<String>;
}

/// Reads the process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvResolver;

impl EnvVarResolver for ProcessEnvResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvVarResolver for HashMap<String, String> {
    fn resolve(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Adapter for closures
pub struct EnvFn<F>(pub F);

impl<F> EnvVarResolver for EnvFn<F>
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn resolve(&self, name: &str) -> Option<String> {
        (self.0)(name)
    }
}

/// Evaluated value of `node`, empty for non-existent nodes and nodes without value
pub fn evaluate_node(node: Node<'_>) -> Result<String> {
    Evaluator::for_tree(node.tree()).node_value(node)
}

/// Evaluate the markers in `text`, relative paths start at `scope`
pub fn evaluate_vars(scope: Node<'_>, text: &str) -> Result<String> {
    Evaluator::for_tree(scope.tree()).expand(scope, text)
}

/// Evaluate the markers in `text` without a tree: only `~NAME` references (and macros) resolve
pub fn evaluate_env_vars(text: &str, resolver: &dyn EnvVarResolver) -> Result<String> {
    let empty = ConfigTree::new("vars");
    let mut evaluator = Evaluator::for_tree(&empty);
    evaluator.env = resolver;
    evaluator.expand(Node::Section(empty.root()), text)
}

struct Evaluator<'e> {
    env: &'e dyn EnvVarResolver,
    macros: &'e dyn MacroRunner,
    /// nodes whose value is being evaluated, innermost last
    stack: Vec<NodeKey>,
}

impl<'e> Evaluator<'e> {
    fn for_tree(tree: &'e ConfigTree) -> Self {
        Self {
            env: tree.env_resolver(),
            macros: tree.macro_runner(),
            stack: vec![],
        }
    }

    fn node_value(&mut self, node: Node<'_>) -> Result<String> {
        let (Some(raw), Some(key)) = (node.verbatim_value(), node.key()) else {
            return Ok(String::new());
        };

        if !raw.contains(MARKER) {
            return Ok(raw.to_string());
        }

        if let Some(at) = self.stack.iter().position(|entry| *entry == key) {
            let tree = node.tree();
            let cycle = self.stack[at..]
                .iter()
                .chain(std::iter::once(&key))
                .map(|entry| tree.node(*entry).path())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(Error::RecursiveVariable { cycle });
        }

        self.stack.push(key);
        let result = self.expand(node, raw);
        self.stack.pop();
        result
    }

    fn expand(&mut self, scope: Node<'_>, text: &str) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find(MARKER) {
            out.push_str(&rest[..start]);
            let after = &rest[start + MARKER.len()..];

            let Some(end) = marker_end(after) else {
                // unterminated marker stays literal text
                out.push_str(&rest[start..]);
                return Ok(out);
            };

            let inner = &after[..end];
            rest = &after[end + 1..];

            if inner.trim() == ESCAPE {
                out.push_str(MARKER);
                continue;
            }

            out.push_str(&self.marker(scope, inner)?);
        }

        out.push_str(rest);
        Ok(out)
    }

    fn marker(&mut self, scope: Node<'_>, inner: &str) -> Result<String> {
        let (reference, macro_call) = match find_top_level(inner, "::") {
            Some(at) => (inner[..at].trim(), Some(inner[at + 2..].trim())),
            None => (inner.trim(), None),
        };

        let value = self.reference(scope, reference)?;

        let Some(macro_call) = macro_call else {
            return Ok(value.unwrap_or_default());
        };

        let (name, args) = macro_call
            .split_once(char::is_whitespace)
            .unwrap_or((macro_call, ""));
        let args = laconic::parse(
            args,
            &ReadOptions {
                implicit_root: Some("args".to_string()),
                ..Default::default()
            },
        )?;

        self.macros.run(name, value.as_deref(), args.root())
    }

    /// `None` when unresolved and not required
    fn reference(&mut self, scope: Node<'_>, reference: &str) -> Result<Option<String>> {
        if reference.is_empty() {
            return Ok(None);
        }

        let env_name = reference
            .strip_prefix('!')
            .map(str::trim_start)
            .unwrap_or(reference)
            .strip_prefix('~');
        if let Some(name) = env_name {
            let name = name.trim();
            return match self.env.resolve(name) {
                Some(value) => Ok(Some(value)),
                None if reference.starts_with('!') => Err(Error::NavigationRequired {
                    path: reference.to_string(),
                }),
                None => {
                    tracing::trace!(name, "environment variable not set");
                    Ok(None)
                }
            };
        }

        let path = PathExpr::parse(reference)?;
        // selectors evaluate with this stack so a selector reaching back into its own value is caught
        let node = path.navigate_with(scope, &mut |node: Node<'_>| self.node_value(node))?;
        if !node.exists() {
            tracing::trace!(reference, from = %scope.path(), "unresolved reference");
            return Ok(None);
        }

        if path.is_verbatim() {
            return Ok(Some(node.verbatim_value().unwrap_or_default().to_string()));
        }

        self.node_value(node).map(Some)
    }
}

/// Index of the `)` closing a marker whose `$(` was already consumed
pub(crate) fn marker_end(text: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut quote: Option<char> = None;

    for (at, c) in text.char_indices() {
        match (quote, c) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth == 0 {
                    return Some(at);
                }
            }
            _ => {}
        }
    }

    None
}

fn find_top_level(text: &str, needle: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    for (at, c) in text.char_indices() {
        match (quote, c) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            (None, _) if depth == 0 && text[at..].starts_with(needle) => return Some(at),
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::laconic;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn relative_and_absolute_references() {
        let tree = laconic!(
            r#"
            root
            {
              host=example.org
              service
              {
                port=8080
                url="http://$(/$host):$(../$port)/x"
                relative=$(../$url)
              }
            }
            "#
        );
        let service = tree.root().child("service");

        let url = service.attr("url").value().unwrap();
        assert_eq!(url, "http://example.org:8080/x");
        assert_eq!(service.attr("relative").value().unwrap(), url);
        assert_eq!(
            service.attr("url").verbatim_value().unwrap(),
            "http://$(/$host):$(../$port)/x"
        );
    }

    #[test]
    fn optional_required_and_verbatim() {
        let tree = laconic!(
            r#"
            root
            {
              a=1
              b="$(/$a)+1"
              optional="[$(/$nope)]"
              required="$(!/$nope)"
              verbatim="$(@/$b)"
            }
            "#
        );
        let root = tree.root();

        assert_eq!(root.attr("optional").value().unwrap(), "[]");
        let err = root.attr("required").value().unwrap_err();
        assert!(err.is_navigation_required());
        assert_eq!(root.attr("verbatim").value().unwrap(), "$(/$a)+1");
        assert_eq!(root.attr("b").value().unwrap(), "1+1");
    }

    #[test]
    fn recursion_is_detected_and_tree_stays_usable() {
        let tree = laconic!(
            r#"
            root
            {
              vars
              {
                var1=val1{}
                var2=$(../var1){}
                var3=$(../var4){}
                var4=$(../var3){}
              }
            }
            "#
        );
        let vars = tree.root().child("vars");

        assert_eq!(vars.child("var3").verbatim_value(), Some("$(../var4)"));
        let err = vars.child("var3").value().unwrap_err();
        assert!(err.is_recursive_variable());
        assert_eq!(
            err.to_string(),
            "recursive vars detected: /vars/var3 -> /vars/var4 -> /vars/var3"
        );
        let err = vars.child("var4").value().unwrap_err();
        assert!(err.is_recursive_variable());
        assert_eq!(vars.child("var1").value().unwrap(), "val1");
        assert_eq!(vars.child("var2").value().unwrap(), "val1");
    }

    #[test]
    fn self_reference() {
        let tree = laconic!("root{ a=$(/$a) }");
        let err = tree.root().attr("a").value().unwrap_err();
        assert!(err.is_recursive_variable());
    }

    #[test]
    fn environment_variables() {
        let env: HashMap<String, String> =
            [("HOME_DIR".to_string(), "/home/me".to_string())].into();
        let text = r#"root{ home="$(~HOME_DIR)/x" none="[$(~NOPE)]" must="$(!~NOPE)" }"#;
        let mut tree = laconic!(text);
        tree.set_env_resolver(Arc::new(env));
        let root = tree.root();

        assert_eq!(root.attr("home").value().unwrap(), "/home/me/x");
        assert_eq!(root.attr("none").value().unwrap(), "[]");
        let err = root.attr("must").value().unwrap_err();
        assert!(err.is_navigation_required());
    }

    #[test]
    fn env_only_evaluation() {
        let resolver = EnvFn(|name: &str| (name == "USER").then(|| "dev".to_string()));
        let greeting = evaluate_env_vars("hi $(~USER)!", &resolver).unwrap();
        assert_eq!(greeting, "hi dev!");
        assert_eq!(evaluate_env_vars("$(/a/b)", &resolver).unwrap(), "");
        assert!(evaluate_env_vars("$(!/a/b)", &resolver).is_err());
    }

    #[test]
    fn escapes_and_unterminated_markers() {
        let tree = laconic!("root{ a=1 }");
        let scope = Node::Section(tree.root());

        assert_eq!(evaluate_vars(scope, "$(###)$a)").unwrap(), "$($a)");
        assert_eq!(evaluate_vars(scope, "cost: $(").unwrap(), "cost: $(");
        let half_closed = evaluate_vars(scope, "$($a) and $($a").unwrap();
        assert_eq!(half_closed, "1 and $($a");
        assert_eq!(evaluate_vars(scope, "no markers").unwrap(), "no markers");
    }

    #[test]
    fn macros() {
        let tree = laconic!(r#"root{ n=0x20 s=abc }"#);
        let scope = Node::Section(tree.root());

        assert_eq!(evaluate_vars(scope, "$($n::as-int)").unwrap(), "32");
        assert_eq!(evaluate_vars(scope, "$($s::as-int dflt=7)").unwrap(), "7");
        let missing = evaluate_vars(scope, "$($missing::as-string dflt='x y')").unwrap();
        assert_eq!(missing, "x y");
        let year = evaluate_vars(scope, r#"$(::as-datetime dflt="2024-01-02" fmt="%Y")"#);
        assert_eq!(year.unwrap(), "2024");
        assert!(evaluate_vars(scope, "$($n::nope)").is_err());
    }

    #[test]
    fn helpers() {
        assert_eq!(marker_end("a(b)c) tail"), Some(5));
        assert_eq!(marker_end("a\")\") x"), Some(4));
        assert_eq!(marker_end("never"), None);
        assert_eq!(find_top_level("a[x='::']::m", "::"), Some(9));
    }
}
