//! Working File Pair: the encrypted download and its decrypted output.
//!
//! Each run gets two uniquely named files in the work directory, named
//! `{role}-{unixMillis}-{random}-{basename}`, so concurrent runs sharing a
//! directory never collide.

use chrono::Utc;
use rand::Rng;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const RANDOM_SUFFIX_LEN: usize = 8;

/// Role tag of a working file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    Encrypted,
    Decrypted,
}

impl FileRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileRole::Encrypted => "encrypted",
            FileRole::Decrypted => "decrypted",
        }
    }
}

/// Build a unique file name for `role` and original `basename`
pub fn unique_name(role: FileRole, basename: &str) -> String {
    let random: String = rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(RANDOM_SUFFIX_LEN)
        .map(char::from)
        .collect();

    let basename = if basename.is_empty() { "object" } else { basename };

    format!(
        "{}-{}-{}-{}",
        role.as_str(),
        Utc::now().timestamp_millis(),
        random.to_lowercase(),
        basename
    )
}

/// Paths of one run's temporary files
///
/// The pair never creates the files itself; the stages do. [`cleanup`]
/// removes whichever of them exist.
///
/// [`cleanup`]: WorkingFiles::cleanup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingFiles {
    encrypted: PathBuf,
    decrypted: PathBuf,
}

impl WorkingFiles {
    /// Allocate a fresh pair of names under `work_dir`
    pub fn allocate(work_dir: &Path, basename: &str) -> Self {
        Self {
            encrypted: work_dir.join(unique_name(FileRole::Encrypted, basename)),
            decrypted: work_dir.join(unique_name(FileRole::Decrypted, basename)),
        }
    }

    pub fn encrypted(&self) -> &Path {
        &self.encrypted
    }

    pub fn decrypted(&self) -> &Path {
        &self.decrypted
    }

    /// Remove both files.
    ///
    /// Missing files are fine. Any other failure is logged and the path is
    /// returned; cleanup never fails the run.
    pub async fn cleanup(&self) -> Vec<PathBuf> {
        let mut leftover = Vec::new();

        for path in [&self.encrypted, &self.decrypted] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "Removed working file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to remove working file"
                    );
                    leftover.push(path.clone());
                }
            }
        }

        leftover
    }
}
