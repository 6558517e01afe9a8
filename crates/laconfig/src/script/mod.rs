//! configuration scripts
//!
//! [ScriptRunner] builds a result tree from a source section. Ordinary sections are copied, sections with reserved
//! names are executed instead:
//!
//! ```text
//! root
//! {
//!   i=0
//!   _loop=$(/$i)<10
//!   {
//!     section_$(/$i) {}
//!     _set { path=/$i to=$(/$i)+1 }
//!   }
//!   _if=$(/$i)==10 { done{} }
//!   _else { failed{} }
//!   _call=/proc {}
//!   _block { inlined{} }
//!   proc { script-only=true from-proc{} }
//! }
//! ```
//!
//! Conditions, `_set` paths and values and section names containing markers are evaluated against the result tree
//! as it is at that moment. In conditions and `_set` values every operand holding a marker is expanded on its own,
//! the expanded text is never parsed as expression. `_call` paths point into the source tree. Sections with `script-only=true` are never
//! copied, they only serve as procedures for `_call`.
//!
//! Expressions are described in [expr].
pub mod expr;

use crate::node::{ConfigNode, Section};
use crate::tree::{ConfigTree, SectionId};
use crate::util::names_eq;
use crate::{Error, Result};
use std::time::{Duration, Instant};

pub const IF: &str = "_if";
pub const ELSE: &str = "_else";
pub const LOOP: &str = "_loop";
pub const SET: &str = "_set";
pub const CALL: &str = "_call";
pub const BLOCK: &str = "_block";
/// Attribute excluding a section from the result
pub const SCRIPT_ONLY: &str = "script-only";

#[derive(Debug, Clone)]
pub struct ScriptRunner {
    timeout: Duration,
    max_call_depth: usize,
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_call_depth: 64,
        }
    }
}

impl ScriptRunner {
    /// Wall clock limit for a single `_loop`, checked before every iteration
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Maximum nesting of `_call`
    pub fn max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }

    /// Run `source` into a new tree with the same settings as the source tree
    #[tracing::instrument(level = "debug", skip_all, fields(source = %source.path()))]
    pub fn run(&self, source: Section<'_>) -> Result<ConfigTree> {
        let mut result = source.tree().empty_like(source.name());
        let root = result.root_id();
        self.execute(source, &mut result, root)?;
        Ok(result)
    }

    /// Run `source` into the section `target` of `dest`
    ///
    /// Value and attributes of `source` are copied onto `target`, its children are executed.
    pub fn execute(
        &self,
        source: Section<'_>,
        dest: &mut ConfigTree,
        target: SectionId,
    ) -> Result<()> {
        if !dest.section(target).exists() {
            return Err(Error::MissingNode {
                operation: "run script",
            });
        }

        if let Some(value) = source.verbatim_value() {
            dest.set_value(target, Some(value))?;
        }
        for attribute in source.attributes() {
            dest.add_attribute(target, attribute.name(), attribute.verbatim_value())?;
        }

        Run {
            runner: self,
            dest,
            depth: 0,
        }
        .body(source, target)
    }
}

struct Run<'r> {
    runner: &'r ScriptRunner,
    dest: &'r mut ConfigTree,
    depth: usize,
}

fn expr_error(construct: Section<'_>, err: expr::ExprError) -> Error {
    Error::script(construct.name(), construct.path(), err.to_string())
}

/// Expression errors get their construct attached once evaluation is over
enum Failure {
    Expr(expr::ExprError),
    Expand(Error),
}

impl From<expr::ExprError> for Failure {
    fn from(err: expr::ExprError) -> Self {
        Failure::Expr(err)
    }
}

impl Run<'_> {
    /// Execute the children of `source` into `target`
    fn body(&mut self, source: Section<'_>, target: SectionId) -> Result<()> {
        let mut after_if = None;

        for child in source.children() {
            let previous_if = after_if.take();
            let name = child.name();

            if names_eq(name, IF) {
                after_if = Some(self.branch(child, target)?);
            } else if names_eq(name, ELSE) {
                match previous_if {
                    None => return Err(Error::script(ELSE, child.path(), "is not after IF")),
                    Some(false) => self.body(child, target)?,
                    Some(true) => {}
                }
            } else if names_eq(name, LOOP) {
                self.repeat(child, target)?;
            } else if names_eq(name, SET) {
                self.set(child, target)?;
            } else if names_eq(name, CALL) {
                self.call(child, target)?;
            } else if names_eq(name, BLOCK) {
                self.body(child, target)?;
            } else {
                self.emit(child, target)?;
            }
        }

        Ok(())
    }

    /// Evaluate `text` with markers resolved against `target`
    fn expression(
        &self,
        construct: Section<'_>,
        target: SectionId,
        text: &str,
    ) -> Result<expr::Value> {
        let scope = self.dest.section(target);
        let mut expand = |operand: &str| scope.evaluate(operand).map_err(Failure::Expand);
        let result = expr::evaluate_with::<Failure>(text, &mut expand);
        result.map_err(|failure| match failure {
            Failure::Expr(err) => expr_error(construct, err),
            Failure::Expand(err) => err,
        })
    }

    fn condition(&self, construct: Section<'_>, target: SectionId) -> Result<bool> {
        let text = construct.verbatim_value().unwrap_or_default();
        self.expression(construct, target, text)?
            .truthy()
            .map_err(|err| expr_error(construct, err))
    }

    /// `_if`, returns whether the body ran
    fn branch(&mut self, construct: Section<'_>, target: SectionId) -> Result<bool> {
        let taken = self.condition(construct, target)?;
        if taken {
            self.body(construct, target)?;
        }
        Ok(taken)
    }

    fn repeat(&mut self, construct: Section<'_>, target: SectionId) -> Result<()> {
        let started = Instant::now();
        let mut iterations = 0usize;

        loop {
            if started.elapsed() > self.runner.timeout {
                return Err(Error::script(
                    LOOP,
                    construct.path(),
                    format!(
                        "exceeded allowed timeout of {:?} after {iterations} iterations",
                        self.runner.timeout
                    ),
                ));
            }
            if !self.condition(construct, target)? {
                break;
            }
            self.body(construct, target)?;
            iterations += 1;
        }

        tracing::trace!(path = %construct.path(), iterations, "loop finished");
        Ok(())
    }

    fn set(&mut self, construct: Section<'_>, target: SectionId) -> Result<()> {
        let Some(path) = construct.attr("path").verbatim_value() else {
            let message = "attribute 'path' is required";
            return Err(Error::script(SET, construct.path(), message));
        };

        let value = match construct.attr("to").verbatim_value() {
            Some(to) => Some(self.expression(construct, target, to)?.to_string()),
            None => None,
        };

        let scope = self.dest.section(target);
        let path = scope.evaluate(path)?;
        let Some(key) = scope.navigate(&path)?.key() else {
            return Err(Error::script(
                SET,
                construct.path(),
                format!("path '{path}' points to a node which does not exist"),
            ));
        };

        tracing::trace!(%path, ?value, "set");
        self.dest.set_node_value(key, value.as_deref())
    }

    fn call(&mut self, construct: Section<'_>, target: SectionId) -> Result<()> {
        let path = construct.verbatim_value().unwrap_or_default().trim();
        if self.depth >= self.runner.max_call_depth {
            return Err(Error::script(
                CALL,
                construct.path(),
                format!("exceeded maximum call depth of {}", self.runner.max_call_depth),
            ));
        }

        let procedure = construct.parent().navigate_section(path)?;
        if !procedure.exists() {
            return Err(Error::script(
                CALL,
                construct.path(),
                format!("called procedure '{path}' which does not exist"),
            ));
        }

        tracing::trace!(procedure = %procedure.path(), depth = self.depth, "call");
        self.depth += 1;
        let result = self.body(procedure, target);
        self.depth -= 1;
        result
    }

    /// Copy an ordinary section and execute what is inside it
    fn emit(&mut self, source: Section<'_>, target: SectionId) -> Result<()> {
        if source.flag(SCRIPT_ONLY) {
            return Ok(());
        }

        let name = if source.name().contains("$(") {
            self.dest.section(target).evaluate(source.name())?
        } else {
            source.name().to_string()
        };

        let id = self.dest.add_child(target, &name, source.verbatim_value())?;
        for attribute in source.attributes() {
            self.dest
                .add_attribute(id, attribute.name(), attribute.verbatim_value())?;
        }
        self.body(source, id)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::laconic;
    use pretty_assertions::assert_eq;

    fn run(text: &str) -> Result<ConfigTree> {
        let source = laconic!(text);
        ScriptRunner::default().run(source.root())
    }

    fn run_compact(text: &str) -> String {
        run(text).unwrap().root().to_compact_string()
    }

    #[test]
    fn loop_generates_sections() {
        let script = "root{ i=0 _loop=$(/$i)<10 { section_$(/$i){} _set{path=/$i to=$(/$i)+1} } }";
        let result = run(script).unwrap();
        let root = result.root();

        assert_eq!(root.child_count(), 10);
        assert_eq!(root.child_at(0).name(), "section_0");
        assert_eq!(root.child_at(9).name(), "section_9");
        assert!(!root.child_at(10).exists());
        assert_eq!(root.attr("i").value().unwrap(), "10");
    }

    #[test]
    fn loop_with_float_steps() {
        let script = "root{ x=0 _loop='$(/$x)<=1'{ step=$(/$x){} _set{path=/$x to=$(/$x)+0.25} } }";
        let result = run(script).unwrap();
        let steps: Vec<_> = result
            .root()
            .children()
            .map(|step| step.verbatim_value().unwrap().to_string())
            .collect();

        // values are copied verbatim, evaluated on read
        assert_eq!(steps, vec!["$(/$x)"; 5]);
        assert_eq!(result.root().attr("x").value().unwrap(), "1.25");
    }

    #[test]
    fn loop_with_tenth_steps() {
        let script = "root{ x=0 _loop='$(/$x)<=1'{ s_$(/$x){} _set{path=/$x to=$(/$x)+0.2} } }";
        let result = run(script).unwrap();
        let names: Vec<_> = result
            .root()
            .children()
            .map(|step| step.name().to_string())
            .collect();

        assert_eq!(names, ["s_0", "s_0.2", "s_0.4", "s_0.6", "s_0.8", "s_1"]);
        assert_eq!(result.root().attr("x").value().unwrap(), "1.2");
    }

    #[test]
    fn operands_are_not_reparsed() {
        let script = "root{ svc=my-service out{} _set{path=/out to=$(/$svc)+_x} }";
        let expected = "root{svc=my-service out=my-service_x{}}";
        assert_eq!(run_compact(script), expected);
        assert_eq!(
            run_compact(r#"root{ a="x y" b=a-b _if='$(/$a)!=$(/$b)'{ differ{} } }"#),
            r#"root{a="x y" b=a-b differ{}}"#
        );
        assert_eq!(
            run_compact("root{ n=-2 _set{path=/$n to=$(/$n)*3} }"),
            "root{n=-6}"
        );
    }

    #[test]
    fn required_reference_in_expression() {
        let err = run("root{ a{} _set{path=/a to='$(!/$missing)+1'} }").unwrap_err();
        assert!(err.is_navigation_required(), "{err}");
    }

    #[test]
    fn set_with_ternary() {
        let script =
            "root{ var1{} var2=175.4{} var3=true{} _set{path=/var1 to=(?$(/var2)>10;15;-10)+100} }";
        let result = run(script).unwrap();
        assert_eq!(result.root().child("var1").value().unwrap(), "115");

        let script = concat!(
            "root{ var1{} var2=175.4{} var3=true{} ",
            "_set{path=/var1 to='((?$(/var3);$(/var2);-10)+100)+kozel'} }"
        );
        let result = run(script).unwrap();
        assert_eq!(result.root().child("var1").value().unwrap(), "275.4kozel");
    }

    #[test]
    fn if_else() {
        let script = concat!(
            "root{ flag=true _if=$(/$flag){ yes{} } _else{ no{} } ",
            "_if=false{ a{} } _else{ b{} } }"
        );
        assert_eq!(run_compact(script), "root{flag=true yes{} b{}}");
        assert_eq!(
            run_compact("root{ a=1{ b=2 _if='$(/a)==1'{ c{} } } }"),
            "root{a=1{b=2 c{}}}"
        );
    }

    #[test]
    fn else_must_follow_if() {
        for script in [
            "root{ a{} _else{} }",
            "root{ _if=true{} a{} _else{} }",
            "root{ _if=true{} _else{} _else{} }",
        ] {
            let err = run(script).unwrap_err();
            assert!(
                matches!(
                    &err,
                    Error::Script { construct, message, .. }
                        if construct == ELSE && message == "is not after IF"
                ),
                "{script}: {err}"
            );
        }
    }

    #[test]
    fn set_requires_existing_target() {
        let err = run("root{ _set{path=/nope to=1} }").unwrap_err();
        assert!(matches!(
            &err,
            Error::Script { construct, .. } if construct == SET
        ));
        assert!(
            err.to_string().contains("which does not exist"),
            "{err}"
        );
    }

    #[test]
    fn loop_timeout() {
        let source = laconic!("root{ _loop=true{} }");
        let err = ScriptRunner::default()
            .timeout(Duration::from_millis(20))
            .run(source.root())
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("exceeded allowed timeout"), "{message}");
    }

    #[test]
    fn calls_and_blocks() {
        assert_eq!(
            run_compact(
                "root{
                  n=1
                  proc{ script-only=true item_$(/$n){} _set{path=/$n to=$(/$n)+1} }
                  _call=/proc{}
                  _call=/proc{}
                  _block{ inlined{} }
                }"
            ),
            "root{n=3 item_1{} item_2{} inlined{}}"
        );
    }

    #[test]
    fn call_errors() {
        let source = laconic!("root{ rec{ script-only=true _call=/rec{} } _call=/rec{} }");
        let err = ScriptRunner::default()
            .max_call_depth(8)
            .run(source.root())
            .unwrap_err();
        assert!(err.to_string().contains("maximum call depth of 8"), "{err}");

        let err = run("root{ _call=/missing{} }").unwrap_err();
        assert!(err.to_string().contains("which does not exist"), "{err}");
    }

    #[test]
    fn expression_errors_name_the_construct() {
        let err = run("root{ a=1 _set{path=/$a to=1/0} }").unwrap_err();
        assert!(
            matches!(
                &err,
                Error::Script { construct, path, message }
                    if construct == "_set" && path == "/_set" && message == "division by zero"
            )
        );
    }

    #[test]
    fn execute_into_existing_tree() {
        let source = laconic!("script=v{ x=1 made{} }");
        let mut dest = laconic!("app{ out{ keep=1 } }");
        let out = dest.root().child("out").id().unwrap();

        ScriptRunner::default()
            .execute(source.root(), &mut dest, out)
            .unwrap();
        assert_eq!(
            dest.root().to_compact_string(),
            "app{out=v{keep=1 x=1 made{}}}"
        );
    }
}
