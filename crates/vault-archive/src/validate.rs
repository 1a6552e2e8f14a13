//! Structural checks on untrusted archives.
//!
//! Valid entry names:
//! - Must be non-empty and relative (no leading `/`, `\`, or drive letter)
//! - Must not contain `\` or NUL
//! - Must not be `.` or `..`, nor contain `.`/`..` segments
//! - Must not contain empty segments, except a single trailing `/` on directories
//!
//! A stream that is not an archive at all is rejected, and so is an archive
//! with no entries: some readers happily present garbage as an empty archive.

use std::io::Cursor;

use crate::error::{ArchiveError, ArchiveResult};

/// Check every entry name of `archive` and return the number of entries.
pub fn validate_archive(archive: &[u8]) -> ArchiveResult<usize> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|e| ArchiveError::structure(format!("not a readable archive: {e}")))?;

    let count = zip.len();
    for index in 0..count {
        let entry = zip
            .by_index_raw(index)
            .map_err(|e| ArchiveError::structure(format!("unreadable entry #{index}: {e}")))?;
        validate_entry_name(entry.name())?;
    }

    if count == 0 {
        return Err(ArchiveError::structure("archive is empty or not an archive"));
    }
    Ok(count)
}

/// Validate a single entry name, returning `Ok(())` if it is safe.
///
/// # Examples
///
/// ```
/// use vault_archive::validate_entry_name;
///
/// assert!(validate_entry_name("com/example/Cash.class").is_ok());
/// assert!(validate_entry_name("META-INF/").is_ok());
/// assert!(validate_entry_name("../../etc/passwd").is_err());
/// assert!(validate_entry_name("/etc/passwd").is_err());
/// ```
pub fn validate_entry_name(name: &str) -> ArchiveResult<()> {
    let unsafe_entry = |reason: &str| ArchiveError::UnsafeEntry {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(unsafe_entry("name is empty"));
    }
    if name == "." || name == ".." {
        return Err(unsafe_entry("name is a relative directory marker"));
    }
    if name.contains('\\') {
        return Err(unsafe_entry("contains backslash"));
    }
    if name.contains('\0') {
        return Err(unsafe_entry("contains NUL"));
    }
    if is_absolute(name) {
        return Err(unsafe_entry("path is absolute"));
    }

    let body = name.strip_suffix('/').unwrap_or(name);
    for segment in body.split('/') {
        match segment {
            "" => return Err(unsafe_entry("path is not normalised (empty segment)")),
            "." | ".." => {
                return Err(unsafe_entry("path is not normalised (relative segment)"));
            }
            _ => {}
        }
    }
    Ok(())
}

fn is_absolute(name: &str) -> bool {
    if name.starts_with('/') {
        return true;
    }
    // `C:` style prefixes are absolute (or drive-relative) on Windows.
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ArchiveBuilder;

    fn archive_with(names: &[&str]) -> Vec<u8> {
        let mut builder = ArchiveBuilder::new();
        for name in names {
            builder = builder.entry(*name, b"x".to_vec());
        }
        builder.build().unwrap()
    }

    #[test]
    fn accepts_ordinary_archive() {
        let bytes = archive_with(&["com/example/Cash.class", "README.txt"]);
        assert_eq!(validate_archive(&bytes).unwrap(), 2);
    }

    #[test]
    fn rejects_parent_traversal() {
        let bytes = archive_with(&["ok.txt", "../../etc/passwd"]);
        let err = validate_archive(&bytes).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsafeEntry { ref name, .. } if name == "../../etc/passwd"));
    }

    #[test]
    fn rejects_absolute_path() {
        let bytes = archive_with(&["/etc/passwd"]);
        assert!(matches!(
            validate_archive(&bytes),
            Err(ArchiveError::UnsafeEntry { .. })
        ));
    }

    #[test]
    fn rejects_garbage_bytes() {
        let err = validate_archive(b"definitely not a zip file").unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidStructure { .. }));
    }

    #[test]
    fn rejects_empty_archive() {
        let bytes = ArchiveBuilder::new().build().unwrap();
        let err = validate_archive(&bytes).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidStructure { .. }));
    }

    #[test]
    fn entry_name_rules() {
        for good in ["a", "a/b/c.class", "dir/", "META-INF/MANIFEST.MF", "a..b/c"] {
            assert!(validate_entry_name(good).is_ok(), "{good} should pass");
        }
        for bad in [
            "", ".", "..", "a/../b", "./a", "a/./b", "a//b", "a\\b", "C:evil", "c:/x", "/abs",
            "x/..",
        ] {
            assert!(validate_entry_name(bad).is_err(), "{bad} should fail");
        }
    }
}
