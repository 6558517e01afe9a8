//! collection of configuration documents ([ConfigTree] and path to source file)
//!
//! [ConfigDocuments] keeps the documents in the order they were added and defines a numeric index for each. Once
//! added those indices are stable (removal is not possible).
//!
//! Cascading folds all documents into one tree: the first document is the base, every later document overrides the
//! result (see [crate::merge]).
use crate::format::{Format, ReadOptions};
use crate::include::FileIncludeProvider;
use crate::merge::NodeOverrideRules;
use crate::tree::ConfigTree;
use std::path::{Path, PathBuf};

pub type Source = Option<PathBuf>;
pub type SourceTree<'a> = (usize, &'a Source, &'a ConfigTree);

#[derive(Default, Debug)]
pub struct ConfigDocuments {
    sources: Vec<Source>,
    trees: Vec<ConfigTree>,
    options: ReadOptions,
}

impl ConfigDocuments {
    /// Options used for every document read from now on
    pub fn with_options(mut self, options: ReadOptions) -> Self {
        self.options = options;
        self
    }

    /// Adds a document, returns its index
    pub fn insert(&mut self, tree: ConfigTree, path: impl Into<Option<PathBuf>>) -> usize {
        self.sources.push(path.into());
        self.trees.push(tree);
        self.trees.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<SourceTree<'_>> {
        Some((index, self.sources.get(index)?, self.trees.get(index)?))
    }

    pub fn iter(&self) -> impl Iterator<Item = SourceTree<'_>> {
        self.sources
            .iter()
            .zip(&self.trees)
            .enumerate()
            .map(|(index, (source, tree))| (index, source, tree))
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Fold all documents into one tree, an empty collection gives an empty tree called `root`
    #[tracing::instrument(level = "debug", skip_all, fields(documents = self.len()))]
    pub fn cascade(&self, rules: &NodeOverrideRules) -> crate::Result<ConfigTree> {
        let mut documents = self.iter();
        let Some((_, _, base)) = documents.next() else {
            return Ok(ConfigTree::new("root"));
        };

        let mut result = base.clone();
        let root = result.root_id();
        for (index, source, tree) in documents {
            tracing::debug!(index, source = ?source, "applying override");
            result.override_by(root, tree.root(), rules)?;
        }
        Ok(result)
    }
}

impl ConfigDocuments {
    /// Parse `text` as a document named `source`
    pub fn add_text(
        &mut self,
        source: impl Into<PathBuf>,
        format: Format,
        text: &str,
    ) -> Result<usize, LoadError> {
        let source = source.into();
        let tree = format
            .read(text, &self.options)
            .map_err(|error| LoadError::ParseFailed {
                source_name: source.display().to_string(),
                error,
            })?;
        Ok(self.insert(tree, source))
    }

    /// Load a file, includes are resolved relative to its directory
    pub fn load_file(&mut self, file_path: &Path) -> Result<usize, LoadError> {
        let file_path = file_path.canonicalize()?;
        tracing::info!(path=%file_path.display(), "loading file");

        let Some(format) = Format::from_path(&file_path) else {
            return Err(LoadError::UnknownFormat(file_path));
        };

        let file_contents = std::fs::read_to_string(&file_path)?;
        let parse_failed = |error| LoadError::ParseFailed {
            source_name: file_path.display().to_string(),
            error,
        };
        let mut tree = format
            .read(&file_contents, &self.options)
            .map_err(parse_failed)?;

        let base_dir = file_path.parent().unwrap_or(Path::new("")).to_path_buf();
        let provider = FileIncludeProvider::new(base_dir).with_options(self.options.clone());
        tree.process_includes(&provider).map_err(parse_failed)?;
        tree.reset_modified();

        Ok(self.insert(tree, Some(file_path)))
    }

    /// Load every file with a known format extension, in file name order
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn load_directory(&mut self, dir_path: &Path) -> Result<usize, LoadError> {
        let mut files = vec![];
        for dir_entry in std::fs::read_dir(dir_path)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }

            let file_path = dir_entry.path();
            if Format::from_path(&file_path).is_some() {
                files.push(file_path);
            }
        }

        if files.is_empty() {
            return Err(LoadError::NoFilesFound(dir_path.to_path_buf()));
        }

        files.sort();
        for file_path in &files {
            self.load_file(file_path)?;
        }
        Ok(files.len())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("No configuration files found in {0}")]
    NoFilesFound(PathBuf),
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Unknown configuration format of {0}")]
    UnknownFormat(PathBuf),
    #[error("Unable to load {source_name}")]
    ParseFailed {
        source_name: String,
        #[source]
        error: crate::Error,
    },
}

impl From<ConfigTree> for ConfigDocuments {
    fn from(value: ConfigTree) -> Self {
        let mut documents = ConfigDocuments::default();
        documents.insert(value, None);
        documents
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::{laconic, ConfigNode};
    use pretty_assertions::assert_eq;

    #[test]
    fn indices_and_sources() {
        let documents = laconic! {
            "one.laconf" => "app{ a=1 }",
            "two.laconf" => "app{ b=2 }",
        };

        assert_eq!(documents.len(), 2);
        let (index, source, tree) = documents.get(1).unwrap();
        assert_eq!(index, 1);
        assert_eq!(source.as_deref(), Some(Path::new("two.laconf")));
        assert_eq!(tree.root().attr("b").value().unwrap(), "2");
        assert!(documents.get(2).is_none());
        assert_eq!(documents.iter().count(), 2);
    }

    #[test]
    fn cascade_applies_documents_in_order() {
        let documents = laconic! {
            "base.laconf" => "app{ port=80 log=info db{ host=a } }",
            "env.laconf" => "app{ port=8080 db{ host=b } }",
            "local.laconf" => "app{ log=debug }",
        };

        let tree = documents.cascade(&NodeOverrideRules::default()).unwrap();
        assert_eq!(
            tree.root().to_compact_string(),
            "app{port=8080 log=debug db{host=b}}"
        );
        let (_, _, base) = documents.get(0).unwrap();
        assert_eq!(base.root().attr("log").verbatim_value(), Some("info"));
    }

    #[test]
    fn cascade_of_nothing() {
        let tree = ConfigDocuments::default()
            .cascade(&NodeOverrideRules::default())
            .unwrap();
        assert_eq!(tree.root().to_compact_string(), "root{}");
    }

    #[test]
    fn parse_errors_name_the_source() {
        let mut documents = ConfigDocuments::default();
        let err = documents
            .add_text("broken.laconf", Format::Laconic, "app{")
            .unwrap_err();
        assert_eq!(err.to_string(), "Unable to load broken.laconf");
        assert!(matches!(
            err,
            LoadError::ParseFailed {
                error: crate::Error::Parse { .. },
                ..
            }
        ));
        assert!(documents.is_empty());
    }

    #[test]
    fn directories_load_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, text: &str| std::fs::write(dir.path().join(name), text);
        std::fs::create_dir(dir.path().join("parts")).unwrap();
        write("20-override.json", r#"{"app": {"port": 9}}"#).unwrap();
        let base = "app{ port=1 _include{ file=parts/db.xml } }";
        write("10-base.laconf", base).unwrap();
        write("notes.txt", "ignored").unwrap();
        write("parts/db.xml", r#"<db host="x"/>"#).unwrap();

        let mut documents = ConfigDocuments::default();
        assert_eq!(documents.load_directory(dir.path()).unwrap(), 2);
        let (_, source, first) = documents.get(0).unwrap();
        assert!(source.as_ref().unwrap().ends_with("10-base.laconf"));
        assert!(!first.is_modified());

        let tree = documents.cascade(&NodeOverrideRules::default()).unwrap();
        assert_eq!(tree.root().to_compact_string(), "app{port=9 db{host=x}}");
    }

    #[test]
    fn empty_directories_fail() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ConfigDocuments::default().load_directory(dir.path()),
            Err(LoadError::NoFilesFound(_))
        ));
    }
}
