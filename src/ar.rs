//! Asset resolution.
//!
//! The parser only records asset identifiers (`@./base.usda@`). Callers that
//! load sublayers, references or payloads turn those identifiers into files
//! with a [Resolver].

use std::path::{Component, Path, PathBuf};

use tracing::trace;

/// Maps an asset identifier to a concrete location.
pub trait Resolver {
    /// Returns the location of `identifier`, or `None` if it cannot be found.
    fn resolve(&self, identifier: &str) -> Option<PathBuf>;
}

/// Filesystem resolver.
///
/// Absolute identifiers are used as is. File relative identifiers (`./x`,
/// `../x`) are looked up next to the anchor only, other relative identifiers
/// are tried against the anchor and then against each search path in order.
#[derive(Debug, Clone, Default)]
pub struct DefaultResolver {
    anchor: PathBuf,
    search_paths: Vec<PathBuf>,
}

impl DefaultResolver {
    /// Resolver anchored at the directory `anchor`, usually the directory of
    /// the layer being loaded.
    pub fn new(anchor: impl Into<PathBuf>) -> Self {
        Self {
            anchor: anchor.into(),
            search_paths: Vec::new(),
        }
    }

    pub fn with_search_paths(mut self, paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.search_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn anchor(&self) -> &Path {
        &self.anchor
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    fn is_file_relative(identifier: &str) -> bool {
        identifier.starts_with("./") || identifier.starts_with("../")
    }

    fn existing(path: PathBuf) -> Option<PathBuf> {
        let path = normalize(&path);
        trace!(path = %path.display(), "probe asset");
        path.is_file().then_some(path)
    }
}

impl Resolver for DefaultResolver {
    fn resolve(&self, identifier: &str) -> Option<PathBuf> {
        if identifier.is_empty() {
            return None;
        }

        let path = Path::new(identifier);
        if path.is_absolute() {
            return Self::existing(path.to_path_buf());
        }

        if let Some(found) = Self::existing(self.anchor.join(path)) {
            return Some(found);
        }

        if Self::is_file_relative(identifier) {
            return None;
        }

        self.search_paths
            .iter()
            .find_map(|search_path| Self::existing(search_path.join(path)))
    }
}

/// Removes `.` and resolves `..` lexically.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result;

    use super::*;

    #[test]
    fn normalize_paths() {
        #[rustfmt::skip]
        const CASES: &[(&str, &str)] = &[
            ("a/./b", "a/b"),
            ("a/b/../c", "a/c"),
            ("./a", "a"),
            ("../a", "../a"),
            ("/a/b/..", "/a"),
        ];

        for (input, expected) in CASES {
            assert_eq!(normalize(Path::new(input)), PathBuf::from(expected), "{input}");
        }
    }

    #[test]
    fn resolve_relative_to_anchor() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::create_dir(dir.path().join("layers"))?;
        fs::write(dir.path().join("layers/anim.usda"), "#usda 1.0\n")?;
        fs::write(dir.path().join("shared.usda"), "#usda 1.0\n")?;

        let resolver = DefaultResolver::new(dir.path().join("layers"));

        assert_eq!(
            resolver.resolve("./anim.usda"),
            Some(dir.path().join("layers/anim.usda"))
        );
        assert_eq!(resolver.resolve("../shared.usda"), Some(dir.path().join("shared.usda")));
        assert_eq!(resolver.resolve("./missing.usda"), None);
        assert_eq!(resolver.resolve(""), None);

        let absolute = dir.path().join("shared.usda");
        assert_eq!(resolver.resolve(absolute.to_str().unwrap()), Some(absolute.clone()));

        Ok(())
    }

    #[test]
    fn resolve_search_paths() -> Result<()> {
        let anchor = tempfile::tempdir()?;
        let first = tempfile::tempdir()?;
        let second = tempfile::tempdir()?;

        fs::write(second.path().join("lib.usda"), "#usda 1.0\n")?;
        fs::write(anchor.path().join("local.usda"), "#usda 1.0\n")?;

        let resolver = DefaultResolver::new(anchor.path()).with_search_paths([first.path(), second.path()]);

        assert_eq!(resolver.resolve("lib.usda"), Some(second.path().join("lib.usda")));
        assert_eq!(resolver.resolve("local.usda"), Some(anchor.path().join("local.usda")));

        // File relative identifiers never consult search paths.
        assert_eq!(resolver.resolve("./lib.usda"), None);

        fs::write(first.path().join("lib.usda"), "#usda 1.0\n")?;
        assert_eq!(resolver.resolve("lib.usda"), Some(first.path().join("lib.usda")));

        Ok(())
    }
}
