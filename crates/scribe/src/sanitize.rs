//! Helpers for keeping full paths out of logs and span fields.

use std::path::Path;

/// Returns only the file name component of a path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Redacts each path and joins the names with `, `.
pub fn redact_paths(paths: &[impl AsRef<Path>]) -> String {
    paths
        .iter()
        .map(|p| redact_path(p.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(Path::new("/srv/scribe/collected/12/34/transcript.txt")),
            "transcript.txt"
        );
    }

    #[test]
    fn test_redact_path_no_filename() {
        assert_eq!(redact_path(Path::new("/")), "<unknown>");
    }

    #[test]
    fn test_redact_path_keeps_only_root_dir_name() {
        assert_eq!(redact_path(Path::new("/srv/media/scribe-output")), "scribe-output");
    }

    #[test]
    fn test_redact_paths_joins_names() {
        let paths = vec![PathBuf::from("/a/b/video.mp4"), PathBuf::from("c/audio.ogg")];
        assert_eq!(redact_paths(&paths), "video.mp4, audio.ogg");
    }
}
