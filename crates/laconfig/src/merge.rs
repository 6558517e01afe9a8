//! overriding one tree with another
//!
//! [ConfigTree::override_by] applies a patch section onto a section of the tree in place, [merge] does the same on a
//! copy. Each section decides how it gets overridden with a directive attribute (`_override` by default):
//!
//! | directive            | effect                                                                                 |
//! |----------------------|----------------------------------------------------------------------------------------|
//! | none / `merge`       | attributes and value are overridden, patch children are matched and merged or appended |
//! | `attributes`         | only attributes are overridden, children stay untouched                                |
//! | `replace`            | value, attributes and children are replaced by the patch                               |
//! | `sections`           | only children are merged, a `_clear` child in the patch drops the existing ones first  |
//! | `stop`               | the section stays as it is                                                             |
//! | `fail`               | overriding the section is an error                                                     |
//!
//! `stop` and `fail` on the base section protect it from whatever the patch says. Otherwise the patch's directive
//! wins over the base's. The directive attribute itself is never copied onto an existing section.
//!
//! Children are matched by name plus the match attribute (`name` by default): a patch child carrying the match
//! attribute merges into the first same-named child with an equal value, a patch child without it merges into the
//! first same-named child without it (unless [NodeOverrideRules::append_sections_without_match_attr] is set).
//! Unmatched children are appended as copies.
use crate::node::{ConfigNode, Section};
use crate::tree::{ConfigTree, SectionId};
use crate::util::names_eq;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct NodeOverrideRules {
    pub override_attr: String,
    pub match_attr: String,
    pub clear_marker: String,
    pub append_sections_without_match_attr: bool,
}

impl Default for NodeOverrideRules {
    fn default() -> Self {
        Self {
            override_attr: "_override".to_string(),
            match_attr: "name".to_string(),
            clear_marker: "_clear".to_string(),
            append_sections_without_match_attr: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Merge,
    Attributes,
    Replace,
    Sections,
    Stop,
    Fail,
}

impl std::str::FromStr for Directive {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "merge" | "default" => Ok(Directive::Merge),
            "attributes" => Ok(Directive::Attributes),
            "replace" => Ok(Directive::Replace),
            "sections" => Ok(Directive::Sections),
            "stop" => Ok(Directive::Stop),
            "fail" => Ok(Directive::Fail),
            _ => Err(()),
        }
    }
}

/// Copy of `base` overridden by `patch`
pub fn merge(
    base: Section<'_>,
    patch: Section<'_>,
    rules: &NodeOverrideRules,
) -> Result<ConfigTree> {
    let mut tree = base.to_tree();
    let root = tree.root_id();
    tree.override_by(root, patch, rules)?;
    Ok(tree)
}

impl ConfigTree {
    /// Override the section `target` with `patch` (usually the root of another tree)
    #[tracing::instrument(level = "debug", skip_all, fields(target = %self.section(target).path()))]
    pub fn override_by(
        &mut self,
        target: SectionId,
        patch: Section<'_>,
        rules: &NodeOverrideRules,
    ) -> Result<()> {
        if !self.section(target).exists() {
            return Err(Error::MissingNode {
                operation: "override section",
            });
        }
        if !patch.exists() {
            return Ok(());
        }

        Merger { tree: self, rules }.section(target, patch)
    }
}

struct Merger<'a> {
    tree: &'a mut ConfigTree,
    rules: &'a NodeOverrideRules,
}

impl Merger<'_> {
    fn directive_of(
        &self,
        section: Section<'_>,
        path: impl Fn() -> String,
    ) -> Result<Option<Directive>> {
        let Some(raw) = section.attr(&self.rules.override_attr).verbatim_value() else {
            return Ok(None);
        };

        raw.parse().map(Some).map_err(|_| Error::Override {
            path: path(),
            message: format!("unknown override directive '{raw}'"),
        })
    }

    fn directive(&self, target: SectionId, patch: Section<'_>) -> Result<Directive> {
        let base = self.tree.section(target);
        let path = || base.path();
        let base_directive = self.directive_of(base, path)?;
        if let Some(protected @ (Directive::Stop | Directive::Fail)) = base_directive {
            return Ok(protected);
        }

        let patch_directive = self.directive_of(patch, path)?;
        let directive = patch_directive.or(base_directive);
        Ok(directive.unwrap_or(Directive::Merge))
    }

    fn section(&mut self, target: SectionId, patch: Section<'_>) -> Result<()> {
        let directive = self.directive(target, patch)?;
        tracing::trace!(path = %self.tree.section(target).path(), ?directive, "override section");

        match directive {
            Directive::Stop => Ok(()),
            Directive::Fail => Err(Error::Override {
                path: self.tree.section(target).path(),
                message: "override not allowed".to_string(),
            }),
            Directive::Replace => self.replace(target, patch),
            Directive::Attributes => self.attributes(target, patch),
            Directive::Sections => {
                if patch.child(&self.rules.clear_marker).exists() {
                    self.tree.clear_children(target)?;
                }
                self.children(target, patch)
            }
            Directive::Merge => {
                if let Some(value) = patch.verbatim_value() {
                    self.tree.set_value(target, Some(value))?;
                }
                self.attributes(target, patch)?;
                self.children(target, patch)
            }
        }
    }

    fn is_directive(&self, name: &str) -> bool {
        names_eq(name, &self.rules.override_attr)
    }

    fn is_clear_marker(&self, name: &str) -> bool {
        names_eq(name, &self.rules.clear_marker)
    }

    fn attributes(&mut self, target: SectionId, patch: Section<'_>) -> Result<()> {
        for attribute in patch.attributes() {
            if self.is_directive(attribute.name()) {
                continue;
            }
            self.tree
                .set_attribute(target, attribute.name(), attribute.verbatim_value())?;
        }
        Ok(())
    }

    fn replace(&mut self, target: SectionId, patch: Section<'_>) -> Result<()> {
        self.tree.clear_children(target)?;
        self.tree.clear_attributes(target)?;
        self.tree.set_value(target, patch.verbatim_value())?;

        for attribute in patch.attributes() {
            if self.is_directive(attribute.name()) {
                continue;
            }
            self.tree
                .add_attribute(target, attribute.name(), attribute.verbatim_value())?;
        }
        for child in patch.children() {
            if self.is_clear_marker(child.name()) {
                continue;
            }
            self.tree.append_copy(target, child)?;
        }
        Ok(())
    }

    fn children(&mut self, target: SectionId, patch: Section<'_>) -> Result<()> {
        for child in patch.children() {
            if self.is_clear_marker(child.name()) {
                continue;
            }

            match self.find_match(target, child) {
                Some(existing) => self.section(existing, child)?,
                None => {
                    self.tree.append_copy(target, child)?;
                }
            }
        }
        Ok(())
    }

    fn find_match(&self, target: SectionId, patch: Section<'_>) -> Option<SectionId> {
        let match_attr = self.rules.match_attr.as_str();
        let wanted = patch.attr(match_attr);
        let mut candidates = self.tree.section(target).children_named(patch.name());

        let found = if wanted.exists() {
            candidates.find(|candidate| {
                let own = candidate.attr(match_attr);
                own.exists() && own.verbatim_value() == wanted.verbatim_value()
            })
        } else if self.rules.append_sections_without_match_attr {
            None
        } else {
            candidates.find(|candidate| !candidate.attr(match_attr).exists())
        };

        found.and_then(|section| section.id())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::laconic;
    use pretty_assertions::assert_eq;

    fn merged(base: &str, patch: &str, rules: &NodeOverrideRules) -> Result<String> {
        let base = laconic!(base);
        let patch = laconic!(patch);
        Ok(merge(base.root(), patch.root(), rules)?
            .root()
            .to_compact_string())
    }

    fn merged_default(base: &str, patch: &str) -> String {
        merged(base, patch, &NodeOverrideRules::default()).unwrap()
    }

    #[test]
    fn attributes_and_values_are_overridden() {
        assert_eq!(
            merged_default("r{ a=1 b=2 s=old{ x=1 } }", "r{ b=3 c=4 s=new{ y=2 } }"),
            "r{a=1 b=3 c=4 s=new{x=1 y=2}}"
        );
    }

    #[test]
    fn matching_by_name_attribute() {
        let result = merged_default(
            "r{ a{} c{} }",
            "r{ b{ z=134 } c{ name=id1 y=456 } c{ name=id2 z=789 } c{ gg=123 } }",
        );
        assert_eq!(
            result,
            "r{a{} c{gg=123} b{z=134} c{name=id1 y=456} c{name=id2 z=789}}"
        );

        let tree = laconic!(&result);
        assert_eq!(tree.root().child_count(), 5);
        assert_eq!(
            tree.root().navigate("c[name=id2]/$z").unwrap().value().unwrap(),
            "789"
        );
    }

    #[test]
    fn unmatched_sections_collapse_or_append() {
        let base = "r{ c{ n=0 } }";
        let patch = "r{ c{ n=1 } c{ n=2 } c{ n=3 } }";

        assert_eq!(merged_default(base, patch), "r{c{n=3}}");

        let append = NodeOverrideRules {
            append_sections_without_match_attr: true,
            ..Default::default()
        };
        assert_eq!(
            merged(base, patch, &append).unwrap(),
            "r{c{n=0} c{n=1} c{n=2} c{n=3}}"
        );
    }

    #[test]
    fn repeated_merges_are_stable() {
        let base = laconic!("r{ c{ name=a } c{ name=b } }");
        let patch = laconic!("r{ c{ name=b v=1 } c{ name=c } }");
        let rules = NodeOverrideRules::default();

        let once = merge(base.root(), patch.root(), &rules).unwrap();
        let twice = merge(once.root(), patch.root(), &rules).unwrap();
        assert_eq!(
            twice.root().to_compact_string(),
            "r{c{name=a} c{name=b v=1} c{name=c}}"
        );
        assert!(once.root().same_content(&twice.root()));
    }

    #[test]
    fn attributes_directive() {
        assert_eq!(
            merged_default(
                "r{ s{ a=1 keep{} } }",
                "r{ s{ _override=attributes a=2 ignored{} } }"
            ),
            "r{s{a=2 keep{}}}"
        );
    }

    #[test]
    fn replace_directive() {
        assert_eq!(
            merged_default(
                "r{ s=v{ a=1 b=2 old{} } }",
                "r{ s{ _override=replace c=3 new{ x=1 } } }"
            ),
            "r{s{c=3 new{x=1}}}"
        );
    }

    #[test]
    fn sections_directive() {
        assert_eq!(
            merged_default(
                "r{ s{ a=1 old{} } }",
                "r{ s{ _override=sections a=2 new{} } }"
            ),
            "r{s{a=1 old{} new{}}}"
        );
        assert_eq!(
            merged_default(
                "r{ s{ a=1 old{} } }",
                "r{ s{ _override=sections _clear{} new{} } }"
            ),
            "r{s{a=1 new{}}}"
        );
    }

    #[test]
    fn stop_keeps_base() {
        assert_eq!(
            merged_default(
                "r{ s=v{ _override=stop a=1 } }",
                "r{ s=w{ _override=replace a=2 b=3 x{} } }"
            ),
            "r{s=v{_override=stop a=1}}"
        );
        assert_eq!(
            merged_default("r{ s{ a=1 } }", "r{ s{ _override=stop a=2 } }"),
            "r{s{a=1}}"
        );
    }

    #[test]
    fn fail_protects_sections() {
        let err = merged(
            "r{ guarded{ _override=fail a=1 } }",
            "r{ guarded{ a=2 } }",
            &NodeOverrideRules::default(),
        )
        .unwrap_err();
        assert!(matches!(&err, Error::Override { path, .. } if path == "/guarded"));
        assert!(err.to_string().contains("override not allowed"));

        // untouched sections do not trigger
        assert!(merged(
            "r{ guarded{ _override=fail } other{} }",
            "r{ other{ a=1 } }",
            &NodeOverrideRules::default()
        )
        .is_ok());
    }

    #[test]
    fn unknown_directive() {
        assert!(matches!(
            merged(
                "r{ s{} }",
                "r{ s{ _override=sideways } }",
                &NodeOverrideRules::default()
            ),
            Err(Error::Override { .. })
        ));
    }

    #[test]
    fn in_place_override_marks_modified() {
        let mut base = laconic!("r{ a=1 }");
        let patch = laconic!("r{ a=2 }");
        let root = base.root_id();

        base.override_by(root, patch.root(), &NodeOverrideRules::default())
            .unwrap();
        assert!(base.is_modified());
        assert_eq!(base.root().attr("a").value().unwrap(), "2");
    }
}
