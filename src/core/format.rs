//! On-disk encoding detection for encrypted messages.
//!
//! Armored and binary messages are decrypted with different strategies (see
//! [`crate::core::crypto`]), so the pipeline classifies each downloaded file
//! from a short prefix before decrypting.

use std::fmt;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Maximum number of leading bytes inspected
pub const SAMPLE_LEN: usize = 100;

/// Header line opening an armored message
pub const ARMOR_HEADER: &[u8] = b"-----BEGIN PGP MESSAGE-----";

/// Encoding of an encrypted message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    /// Text-safe armored message
    Armored,
    /// Raw packet stream
    Binary,
}

impl fmt::Display for MessageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageFormat::Armored => write!(f, "ASCII-armored"),
            MessageFormat::Binary => write!(f, "binary"),
        }
    }
}

/// Classify a sampled prefix.
///
/// Armored requires the armor header somewhere in the sample and at least 90%
/// of the sampled bytes being printable ASCII, `\n` or `\r`.
///
/// # Example
///
/// ```
/// use sftp_decrypt::core::format::{classify, MessageFormat};
///
/// assert_eq!(classify(b"-----BEGIN PGP MESSAGE-----\n\nhQEMA"), MessageFormat::Armored);
/// assert_eq!(classify(&[0x85, 0x01, 0x0c, 0x03]), MessageFormat::Binary);
/// ```
pub fn classify(sample: &[u8]) -> MessageFormat {
    let sample = &sample[..sample.len().min(SAMPLE_LEN)];

    if !contains(sample, ARMOR_HEADER) {
        return MessageFormat::Binary;
    }

    let printable = sample
        .iter()
        .filter(|&&b| (32..=126).contains(&b) || b == b'\n' || b == b'\r')
        .count();

    if printable * 10 >= sample.len() * 9 {
        MessageFormat::Armored
    } else {
        MessageFormat::Binary
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Read up to [`SAMPLE_LEN`] bytes from the start of `path` and classify them
pub async fn detect_format(path: &Path) -> std::io::Result<MessageFormat> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut sample = Vec::with_capacity(SAMPLE_LEN);
    (&mut file)
        .take(SAMPLE_LEN as u64)
        .read_to_end(&mut sample)
        .await?;
    Ok(classify(&sample))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn armored_sample() -> Vec<u8> {
        let mut text = b"-----BEGIN PGP MESSAGE-----\r\n\r\n".to_vec();
        text.extend(std::iter::repeat(b'A').take(200));
        text
    }

    #[test]
    fn test_armored_message() {
        assert_eq!(classify(&armored_sample()), MessageFormat::Armored);
    }

    #[test]
    fn test_binary_without_header() {
        let sample: Vec<u8> = (0u8..=255).collect();
        assert_eq!(classify(&sample), MessageFormat::Binary);
        assert_eq!(classify(b"plain text that is not armored"), MessageFormat::Binary);
    }

    #[test]
    fn test_header_with_mostly_binary_sample() {
        let mut sample = ARMOR_HEADER.to_vec();
        sample.extend(std::iter::repeat(0x00).take(SAMPLE_LEN - ARMOR_HEADER.len()));
        assert_eq!(classify(&sample), MessageFormat::Binary);
    }

    #[test]
    fn test_printable_ratio_boundary() {
        // 100-byte sample: 90 printable passes, 89 does not
        let mut at_threshold = ARMOR_HEADER.to_vec();
        at_threshold.extend(std::iter::repeat(b'x').take(90 - ARMOR_HEADER.len()));
        at_threshold.extend(std::iter::repeat(0x01).take(10));
        assert_eq!(at_threshold.len(), 100);
        assert_eq!(classify(&at_threshold), MessageFormat::Armored);

        let mut below = ARMOR_HEADER.to_vec();
        below.extend(std::iter::repeat(b'x').take(89 - ARMOR_HEADER.len()));
        below.extend(std::iter::repeat(0x01).take(11));
        assert_eq!(classify(&below), MessageFormat::Binary);
    }

    #[test]
    fn test_header_beyond_sample_is_ignored() {
        let mut sample = vec![b'x'; SAMPLE_LEN];
        sample.extend_from_slice(ARMOR_HEADER);
        assert_eq!(classify(&sample), MessageFormat::Binary);
    }

    #[test]
    fn test_empty_sample() {
        assert_eq!(classify(&[]), MessageFormat::Binary);
    }

    #[tokio::test]
    async fn test_detect_format_from_files() {
        let dir = tempdir().unwrap();

        let armored = dir.path().join("armored.asc");
        tokio::fs::write(&armored, armored_sample()).await.unwrap();
        assert_eq!(detect_format(&armored).await.unwrap(), MessageFormat::Armored);

        let short = dir.path().join("short.bin");
        tokio::fs::write(&short, [0xc1, 0x4c]).await.unwrap();
        assert_eq!(detect_format(&short).await.unwrap(), MessageFormat::Binary);

        assert!(detect_format(&dir.path().join("missing")).await.is_err());
    }
}
