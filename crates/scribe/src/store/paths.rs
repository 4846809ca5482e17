//! Translation between stored path references and concrete paths.
//!
//! Older records hold absolute paths; newer ones hold paths relative to the
//! output root. Nothing tags which form a string uses, so the form is read
//! from the string itself and stored values are never rewritten.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct PathResolver {
    output_root: PathBuf,
}

impl PathResolver {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Resolves a stored reference against this resolver's output root.
    pub fn resolve(&self, stored: &str) -> PathBuf {
        resolve(stored, &self.output_root)
    }

    /// Converts a freshly produced artifact path into its stored form:
    /// relative when under the output root, unchanged otherwise.
    pub fn to_stored(&self, path: &Path) -> String {
        if path.is_absolute() {
            if let Ok(rel) = path.strip_prefix(&self.output_root) {
                if !rel.as_os_str().is_empty() {
                    return rel.to_string_lossy().into_owned();
                }
            }
        }
        path.to_string_lossy().into_owned()
    }
}

/// Pure resolution of `stored` against `output_root`.
///
/// Absolute (or rooted) strings and the empty string are returned as-is;
/// everything else is joined onto the root.
pub fn resolve(stored: &str, output_root: &Path) -> PathBuf {
    let path = Path::new(stored);
    if stored.is_empty() || path.is_absolute() || path.has_root() {
        return path.to_path_buf();
    }
    output_root.join(path)
}
