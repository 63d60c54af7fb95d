//! Import resolution against the configured module search paths.

use std::path::{Path, PathBuf};

use rquickjs::Ctx;
use rquickjs::loader::Resolver;

use crate::error::{Error, Result};

/// Resolves import specifiers to absolute file paths.
///
/// - `./x` and `../x` from a file-backed module resolve next to that module
/// - anything else (cell imports, bare names) is tried against each search
///   path in order
/// - a specifier without an extension also matches `<name>.js`
#[derive(Debug, Clone, Default)]
pub(crate) struct SearchPathResolver {
    paths: Vec<PathBuf>,
}

impl SearchPathResolver {
    /// Canonicalize every search path; a missing directory is a config error.
    pub(crate) fn new<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let paths = paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                let resolved = path.canonicalize().map_err(|e| {
                    Error::Config(format!("module search path {}: {}", path.display(), e))
                })?;
                if !resolved.is_dir() {
                    return Err(Error::Config(format!(
                        "module search path {} is not a directory",
                        path.display()
                    )));
                }
                Ok(resolved)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { paths })
    }

    fn locate(&self, base: &str, name: &str) -> Option<PathBuf> {
        let specifier = Path::new(name);
        let relative = name.starts_with("./") || name.starts_with("../");

        if relative {
            let base = Path::new(base);
            if base.is_absolute() {
                let dir = base.parent()?;
                return existing_file(&dir.join(specifier));
            }
        }
        if specifier.is_absolute() {
            return existing_file(specifier);
        }
        self.paths
            .iter()
            .find_map(|root| existing_file(&root.join(specifier)))
    }
}

impl Resolver for SearchPathResolver {
    fn resolve<'js>(
        &mut self,
        _ctx: &Ctx<'js>,
        base: &str,
        name: &str,
    ) -> rquickjs::Result<String> {
        match self.locate(base, name) {
            Some(path) => {
                tracing::trace!("Resolved `{}` from {} to {}", name, base, path.display());
                Ok(path.to_string_lossy().into_owned())
            }
            None => Err(rquickjs::Error::new_resolving(base, name)),
        }
    }
}

fn existing_file(candidate: &Path) -> Option<PathBuf> {
    if candidate.is_file() {
        return candidate.canonicalize().ok();
    }
    if candidate.extension().is_none() {
        let with_extension = candidate.with_extension("js");
        if with_extension.is_file() {
            return with_extension.canonicalize().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("lib")).unwrap();
        std::fs::write(dir.path().join("helpers.js"), "export const one = 1;").unwrap();
        std::fs::write(dir.path().join("lib/math.js"), "export const two = 2;").unwrap();
        dir
    }

    #[test]
    fn test_bare_name_found_in_search_path() {
        let dir = fixture();
        let resolver = SearchPathResolver::new(&[dir.path()]).unwrap();
        let root = dir.path().canonicalize().unwrap();

        assert_eq!(
            resolver.locate("cell-1-1.js", "helpers.js"),
            Some(root.join("helpers.js"))
        );
        assert_eq!(
            resolver.locate("cell-1-1.js", "lib/math"),
            Some(root.join("lib/math.js"))
        );
    }

    #[test]
    fn test_relative_to_importing_file() {
        let dir = fixture();
        let resolver = SearchPathResolver::new(&[dir.path()]).unwrap();
        let root = dir.path().canonicalize().unwrap();
        let base = root.join("lib/math.js");

        assert_eq!(
            resolver.locate(&base.to_string_lossy(), "../helpers.js"),
            Some(root.join("helpers.js"))
        );
    }

    #[test]
    fn test_relative_from_cell_uses_search_paths() {
        let dir = fixture();
        let resolver = SearchPathResolver::new(&[dir.path()]).unwrap();
        assert!(resolver.locate("cell-1-1.js", "./helpers.js").is_some());
        assert!(resolver.locate("cell-1-1.js", "./missing.js").is_none());
    }

    #[test]
    fn test_no_search_paths_resolves_nothing() {
        let resolver = SearchPathResolver::default();
        assert!(resolver.locate("cell-1-1.js", "helpers.js").is_none());
    }

    #[test]
    fn test_missing_search_path_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let result = SearchPathResolver::new(&[missing]);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
