//! Deterministic artifact naming
//!
//! Every path the pipeline touches is a pure function of the item identifier
//! and the configured roots, so re-running an item overwrites its previous
//! artifacts instead of producing new ones.

use std::path::{Path, PathBuf};

/// Join the archive root and a locator into a remote path
pub fn remote_path(archive_root: &str, remote_locator: &str) -> String {
    let root = archive_root.trim_end_matches('/');
    let locator = remote_locator.trim_start_matches('/');
    if root.is_empty() {
        format!("/{}", locator)
    } else {
        format!("{}/{}", root, locator)
    }
}

/// `{staging_dir}/{identifier}.{extension}`
pub fn local_source_path(staging_dir: &Path, identifier: &str, extension: &str) -> PathBuf {
    staging_dir.join(format!("{}.{}", identifier, extension))
}

/// In-progress download path for a staged source: `{path}.part`
pub fn partial_path(local_path: &Path) -> PathBuf {
    let mut name = local_path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

/// Converted path for a source file: same stem, new extension, output directory.
pub fn converted_path(source: &Path, output_dir: &Path, extension: &str) -> Option<PathBuf> {
    let stem = source.file_stem()?;
    let mut name = stem.to_os_string();
    name.push(".");
    name.push(extension);
    Some(output_dir.join(name))
}

/// Whether an identifier can name a file inside the staging directory
pub fn is_safe_identifier(identifier: &str) -> bool {
    !identifier.trim().is_empty()
        && identifier != "."
        && identifier != ".."
        && !identifier.contains(['/', '\\', '\0'])
}

/// Whether `path` has the given extension (case-insensitive)
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_path_keeps_source_name() {
        let part = partial_path(Path::new("/spool/ACC1.dcm"));
        assert_eq!(part, PathBuf::from("/spool/ACC1.dcm.part"));
        assert!(!has_extension(&part, "dcm"));
    }

    #[test]
    fn test_remote_path_joins_single_separator() {
        assert_eq!(
            remote_path("/union/pacs-data/archive/", "/2024/01/study.dcm"),
            "/union/pacs-data/archive/2024/01/study.dcm"
        );
        assert_eq!(remote_path("/archive", "a/1.src"), "/archive/a/1.src");
        assert_eq!(remote_path("", "a/1.src"), "/a/1.src");
    }

    #[test]
    fn test_paths_are_pure_functions_of_identifier() {
        let staging = Path::new("/spool/dcm");
        let first = local_source_path(staging, "ACC1", "dcm");
        let second = local_source_path(staging, "ACC1", "dcm");
        assert_eq!(first, second);
        assert_eq!(first, PathBuf::from("/spool/dcm/ACC1.dcm"));

        let pdf = converted_path(&first, Path::new("/spool/pdf"), "pdf").unwrap();
        assert_eq!(pdf, PathBuf::from("/spool/pdf/ACC1.pdf"));
        assert_eq!(converted_path(&second, Path::new("/spool/pdf"), "pdf").unwrap(), pdf);
    }

    #[test]
    fn test_identifier_safety() {
        assert!(is_safe_identifier("ACC1"));
        assert!(is_safe_identifier("2024.0001"));
        assert!(!is_safe_identifier(""));
        assert!(!is_safe_identifier(".."));
        assert!(!is_safe_identifier("../etc/passwd"));
        assert!(!is_safe_identifier("a\\b"));
    }

    #[test]
    fn test_has_extension() {
        assert!(has_extension(Path::new("ACC1.dcm"), "dcm"));
        assert!(has_extension(Path::new("ACC1.DCM"), "dcm"));
        assert!(!has_extension(Path::new("ACC1.dcm.part"), "dcm"));
        assert!(!has_extension(Path::new("ACC1"), "dcm"));
    }
}
