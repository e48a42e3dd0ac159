//! Object key layout for the SFTP landing area.
//!
//! Encrypted uploads land under `in/sftp/{user}/{rest}`; their decrypted
//! counterparts are written to `in/decrypted/{user}/{rest minus .pgp}`.

use crate::error::{DecryptError, Result};

/// Root prefix for decrypted output
pub const DECRYPTED_ROOT_PREFIX: &str = "in/decrypted";

/// Extension stripped from encrypted object keys (case-insensitive)
pub const ENCRYPTED_EXTENSION: &str = ".pgp";

/// The parts of an inbound object key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePath {
    /// SFTP user the file belongs to
    pub user: String,

    /// Remaining key below the user's directory (may be empty)
    pub rest: String,
}

/// Split an inbound key into user and remaining path.
///
/// The first two segments must be `in` and `sftp` and the third (the user)
/// must be non-empty.
///
/// # Example
///
/// ```
/// use sftp_decrypt::core::paths::parse_source_path;
///
/// let parsed = parse_source_path("in/sftp/alice/reports/q1.csv.pgp").unwrap();
/// assert_eq!(parsed.user, "alice");
/// assert_eq!(parsed.rest, "reports/q1.csv.pgp");
/// ```
pub fn parse_source_path(key: &str) -> Result<SourcePath> {
    let parts: Vec<&str> = key.split('/').collect();

    match parts.as_slice() {
        ["in", "sftp", user, rest @ ..] if !user.is_empty() => Ok(SourcePath {
            user: user.to_string(),
            rest: rest.join("/"),
        }),
        _ => Err(DecryptError::MalformedKey {
            key: key.to_string(),
        }),
    }
}

/// Strip one trailing `.pgp` (any case) from `path`
pub fn strip_encrypted_extension(path: &str) -> &str {
    let cut = path.len().saturating_sub(ENCRYPTED_EXTENSION.len());
    match path.get(cut..) {
        Some(tail) if path.len() >= ENCRYPTED_EXTENSION.len()
            && tail.eq_ignore_ascii_case(ENCRYPTED_EXTENSION) =>
        {
            &path[..cut]
        }
        _ => path,
    }
}

/// Destination key for a user's decrypted file
///
/// # Example
///
/// ```
/// use sftp_decrypt::core::paths::destination_key;
///
/// assert_eq!(
///     destination_key("alice", "reports/q1.csv.PGP"),
///     "in/decrypted/alice/reports/q1.csv"
/// );
/// ```
pub fn destination_key(user: &str, rest: &str) -> String {
    format!(
        "{}/{}/{}",
        DECRYPTED_ROOT_PREFIX,
        user,
        strip_encrypted_extension(rest)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed_keys() {
        let cases = [
            ("in/sftp/alice/file.pgp", "alice", "file.pgp"),
            ("in/sftp/bob/a/b/c.txt.pgp", "bob", "a/b/c.txt.pgp"),
            ("in/sftp/carol/", "carol", ""),
            ("in/sftp/dave", "dave", ""),
            ("in/sftp/erin/dir//double", "erin", "dir//double"),
        ];

        for (key, user, rest) in cases {
            let parsed = parse_source_path(key).unwrap();
            assert_eq!(parsed.user, user, "user for {}", key);
            assert_eq!(parsed.rest, rest, "rest for {}", key);
        }
    }

    #[test]
    fn test_parse_rejects_malformed_keys() {
        for key in [
            "not/sftp/bob/file.pgp",
            "in/ftp/bob/file.pgp",
            "in/sftp//file.pgp",
            "in/sftp",
            "sftp/in/bob/file.pgp",
            "/in/sftp/bob/file.pgp",
            "IN/sftp/bob/file.pgp",
            "",
        ] {
            match parse_source_path(key) {
                Err(DecryptError::MalformedKey { key: reported }) => assert_eq!(reported, key),
                other => panic!("expected MalformedKey for {:?}, got {:?}", key, other),
            }
        }
    }

    #[test]
    fn test_strip_extension_once() {
        assert_eq!(strip_encrypted_extension("file.csv.pgp"), "file.csv");
        assert_eq!(strip_encrypted_extension("file.pgp.pgp"), "file.pgp");
        assert_eq!(strip_encrypted_extension("FILE.PgP"), "FILE");
        assert_eq!(strip_encrypted_extension("file.gpg"), "file.gpg");
        assert_eq!(strip_encrypted_extension("pgp"), "pgp");
        assert_eq!(strip_encrypted_extension(".pgp"), "");
        assert_eq!(strip_encrypted_extension("file.pgp/other"), "file.pgp/other");
        assert_eq!(strip_encrypted_extension("naïve"), "naïve");
    }

    #[test]
    fn test_destination_key() {
        assert_eq!(
            destination_key("alice", "reports/q1.csv.pgp"),
            "in/decrypted/alice/reports/q1.csv"
        );
        assert_eq!(
            destination_key("bob", "archive.pgp.pgp"),
            "in/decrypted/bob/archive.pgp"
        );
        assert_eq!(destination_key("carol", "plain.txt"), "in/decrypted/carol/plain.txt");
    }
}
