//! Filesystem paths as seen by clients of the distributed filesystem.
//!
//! A path is a `/`-delimited sequence of components. The root directory is the
//! single string `/`. The colon is reserved for application use and may not
//! appear anywhere in a path.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a string or component cannot form a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path must start with '/': {0:?}")]
    NotAbsolute(String),
    #[error("path contains ':': {0:?}")]
    Colon(String),
    #[error("path component must not be empty")]
    EmptyComponent,
    #[error("path component must not contain '/': {0:?}")]
    Separator(String),
}

/// An immutable absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    components: Vec<String>,
}

impl Path {
    /// The root directory.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a path string. Empty components (`//`, trailing `/`) are dropped.
    pub fn parse(s: &str) -> Result<Self, PathError> {
        if !s.starts_with('/') {
            return Err(PathError::NotAbsolute(s.to_string()));
        }
        if s.contains(':') {
            return Err(PathError::Colon(s.to_string()));
        }

        let components = s
            .split('/')
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self { components })
    }

    /// Create a new path by appending one component.
    pub fn join(&self, component: &str) -> Result<Self, PathError> {
        if component.is_empty() {
            return Err(PathError::EmptyComponent);
        }
        if component.contains('/') {
            return Err(PathError::Separator(component.to_string()));
        }
        if component.contains(':') {
            return Err(PathError::Colon(component.to_string()));
        }

        let mut components = self.components.clone();
        components.push(component.to_string());
        Ok(Self { components })
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// The parent directory, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.components.split_last()?;
        Some(Self {
            components: init.to_vec(),
        })
    }

    /// The final component, or `None` for the root.
    pub fn last(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(String::as_str)
    }

    /// Returns true if `other` is a prefix of this path.
    ///
    /// Every path is a subpath of itself, and the root is a subpath of every path.
    pub fn is_subpath(&self, other: &Path) -> bool {
        self.components.starts_with(&other.components)
    }

    /// Every proper ancestor of this path, nearest first, excluding the root.
    pub fn ancestors(&self) -> impl Iterator<Item = Path> + '_ {
        (1..self.components.len()).rev().map(|len| Self {
            components: self.components[..len].to_vec(),
        })
    }

    /// Resolve this path beneath a local directory.
    pub fn to_local(&self, root: &std::path::Path) -> PathBuf {
        let mut local = root.to_path_buf();
        local.extend(&self.components);
        local
    }

    /// List every regular file beneath a local directory, as paths relative to it.
    pub fn list(directory: &std::path::Path) -> std::io::Result<Vec<Path>> {
        let metadata = std::fs::metadata(directory)?;
        if !metadata.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a directory: {}", directory.display()),
            ));
        }

        let mut files = Vec::new();
        collect_files(directory, &Path::root(), &mut files)?;
        files.sort();
        Ok(files)
    }
}

fn collect_files(
    directory: &std::path::Path,
    prefix: &Path,
    files: &mut Vec<Path>,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(directory)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Ok(path) = prefix.join(name) else {
            continue;
        };

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&entry.path(), &path, files)?;
        } else if file_type.is_file() {
            files.push(path);
        }
    }
    Ok(())
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Path {
    type Error = PathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    #[test]
    fn parse_normalizes_separators() {
        assert_eq!(p("//a///b/").to_string(), "/a/b");
        assert_eq!(p("/").to_string(), "/");
        assert!(p("/").is_root());
    }

    #[test]
    fn parse_rejects_relative_and_colon() {
        assert_eq!(
            Path::parse("a/b"),
            Err(PathError::NotAbsolute("a/b".to_string()))
        );
        assert!(matches!(Path::parse("/a:b"), Err(PathError::Colon(_))));
        assert!(Path::parse("").is_err());
    }

    #[test]
    fn join_validates_component() {
        let root = Path::root();
        assert_eq!(root.join("a").unwrap(), p("/a"));
        assert_eq!(root.join(""), Err(PathError::EmptyComponent));
        assert!(matches!(root.join("a/b"), Err(PathError::Separator(_))));
        assert!(matches!(root.join("a:b"), Err(PathError::Colon(_))));
    }

    #[test]
    fn parent_and_last() {
        let path = p("/dir/sub/file.txt");
        assert_eq!(path.parent(), Some(p("/dir/sub")));
        assert_eq!(path.last(), Some("file.txt"));
        assert_eq!(p("/a").parent(), Some(Path::root()));
        assert_eq!(Path::root().parent(), None);
        assert_eq!(Path::root().last(), None);
    }

    #[test]
    fn subpath_is_component_prefix() {
        let path = p("/dir/sub");
        assert!(path.is_subpath(&path));
        assert!(path.is_subpath(&Path::root()));
        assert!(path.is_subpath(&p("/dir")));
        assert!(!path.is_subpath(&p("/di")));
        assert!(!p("/dir").is_subpath(&path));
    }

    #[test]
    fn ancestors_exclude_root_and_self() {
        let ancestors: Vec<String> = p("/a/b/c").ancestors().map(|a| a.to_string()).collect();
        assert_eq!(ancestors, vec!["/a/b", "/a"]);
        assert_eq!(Path::root().ancestors().count(), 0);
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&p("/a/b")).unwrap();
        assert_eq!(json, r#""/a/b""#);
        let back: Path = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p("/a/b"));
        assert!(serde_json::from_str::<Path>(r#""relative""#).is_err());
    }

    #[test]
    fn list_walks_local_tree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();
        std::fs::write(dir.path().join("top.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("sub/deeper/leaf.bin"), b"y").unwrap();

        let files = Path::list(dir.path()).unwrap();
        assert_eq!(files, vec![p("/sub/deeper/leaf.bin"), p("/top.txt")]);
    }

    #[test]
    fn list_rejects_missing_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"").unwrap();

        assert!(Path::list(&dir.path().join("missing")).is_err());
        assert!(Path::list(&file).is_err());
    }

    #[test]
    fn to_local_appends_components() {
        let local = p("/a/b").to_local(std::path::Path::new("/srv/root"));
        assert_eq!(local, PathBuf::from("/srv/root/a/b"));
    }
}
