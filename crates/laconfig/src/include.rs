//! splicing content into a tree
//!
//! Every `_include` section is replaced by the root of a tree supplied by a [NodeContentProvider]. The spliced
//! section takes the name of the include's `name` attribute, or keeps the name of the provided root.
//!
//! ```text
//! app
//! {
//!   _include { name=db file=db.laconf }
//! }
//! ```
//!
//! Provided content may contain further includes, they are processed in rounds up to [MAX_INCLUDE_DEPTH].
use crate::format::{Format, ReadOptions};
use crate::node::{ConfigNode, Section};
use crate::tree::{ConfigTree, SectionId};
use crate::visit::{VisitSections, Walk};
use crate::{Error, Result};
use std::path::PathBuf;

pub const INCLUDE: &str = "_include";
pub const MAX_INCLUDE_DEPTH: usize = 16;

/// Supplies the content of an `_include` section, `None` drops the include
pub trait NodeContentProvider {
    fn provide(&self, include: Section<'_>) -> Result<Option<ConfigTree>>;
}

// blanket impl for Fn
impl<F> NodeContentProvider for F
where
    F: Fn(Section<'_>) -> Result<Option<ConfigTree>>,
{
    fn provide(&self, include: Section<'_>) -> Result<Option<ConfigTree>> {
        self(include)
    }
}

/// Reads the file named by the include's `file` attribute, relative to `base_dir`
///
/// The format follows from the file extension. With `optional=true` a missing file drops the include.
#[derive(Debug, Clone, derive_new::new)]
pub struct FileIncludeProvider {
    base_dir: PathBuf,
    #[new(default)]
    options: ReadOptions,
}

impl FileIncludeProvider {
    pub fn with_options(mut self, options: ReadOptions) -> Self {
        self.options = options;
        self
    }
}

impl NodeContentProvider for FileIncludeProvider {
    fn provide(&self, include: Section<'_>) -> Result<Option<ConfigTree>> {
        let file = include.attr("file").value()?;
        if file.trim().is_empty() {
            return Err(Error::Include {
                path: include.path(),
                message: "attribute 'file' is required".to_string(),
            });
        }

        let path = self.base_dir.join(file.trim());
        let Some(format) = Format::from_path(&path) else {
            return Err(Error::Include {
                path: include.path(),
                message: format!("unknown format of '{}'", path.display()),
            });
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound && include.flag("optional") => {
                tracing::debug!(path = %path.display(), "optional include not found");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        tracing::debug!(path = %path.display(), %format, "including");
        format.read(&text, &self.options).map(Some)
    }
}

impl ConfigTree {
    /// Replace all `_include` sections, returns how many were processed
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn process_includes(&mut self, provider: &dyn NodeContentProvider) -> Result<usize> {
        let mut processed = 0;
        let mut round = 0;

        loop {
            let pending = self.pending_includes();
            let Some(first) = pending.first() else {
                return Ok(processed);
            };
            if round >= MAX_INCLUDE_DEPTH {
                return Err(Error::Include {
                    path: self.section(*first).path(),
                    message: format!("includes nested deeper than {MAX_INCLUDE_DEPTH} levels"),
                });
            }

            for include in pending {
                self.splice(include, provider)?;
                processed += 1;
            }
            round += 1;
        }
    }

    fn pending_includes(&self) -> Vec<SectionId> {
        let mut found = vec![];
        self.root().visit_sections(&mut |section: Section<'_>| {
            if section.name().eq_ignore_ascii_case(INCLUDE) && !section.is_root() {
                found.extend(section.id());
                Walk::Skip
            } else {
                Walk::Continue
            }
        });
        found
    }

    fn splice(&mut self, include: SectionId, provider: &dyn NodeContentProvider) -> Result<()> {
        let section = self.section(include);
        let parent = section.parent();
        let (Some(parent_id), Some(position)) = (
            parent.id(),
            parent.children().position(|child| child.id() == Some(include)),
        ) else {
            return Err(Error::MissingNode {
                operation: "process include",
            });
        };
        let name = section.attr("name").value()?;

        if let Some(content) = provider.provide(section)? {
            let spliced = self.insert_copy(parent_id, position, content.root())?;
            if !name.is_empty() {
                self.rename(spliced, &name)?;
            }
        }
        self.delete(include)
    }
}
