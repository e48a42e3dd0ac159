/*!
 * OpenPGP key unlocking and the two decryption strategies
 *
 * Armored messages are read whole, decrypted into memory and written in one
 * piece. Binary messages are streamed from the encrypted file straight into
 * the output file.
 *
 * # Authentication window of the binary strategy
 *
 * An OpenPGP message is only authenticated once its integrity trailer (the
 * MDC packet, or the final AEAD chunk) has been read, which for a streamed
 * message is at the very end. The streaming decryptor holds back up to
 * `stream_buffer_bytes` of plaintext; messages that fit in that window are
 * fully authenticated before any byte reaches the output file. Plaintext
 * beyond the window is released *before* the trailer is checked. A tampered
 * large message is still detected, the run fails and the partial output is
 * deleted without being uploaded, but the local file briefly holds
 * unauthenticated plaintext. Raise `STREAM_BUFFER_BYTES` where that matters
 * more than memory use.
 *
 * All of the work here is CPU-bound and uses blocking I/O, so the async
 * entry point runs it on the blocking thread pool.
 */

use anyhow::anyhow;
use secrecy::ExposeSecret;
use sequoia_openpgp as openpgp;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use openpgp::cert::prelude::*;
use openpgp::crypto::{KeyPair, Password, SessionKey};
use openpgp::packet::{PKESK, SKESK};
use openpgp::parse::stream::{
    DecryptionHelper, DecryptorBuilder, MessageStructure, VerificationHelper,
};
use openpgp::parse::Parse;
use openpgp::policy::{Policy, StandardPolicy};
use openpgp::types::SymmetricAlgorithm;
use openpgp::{Fingerprint, KeyHandle};

use crate::backend::KeyMaterial;
use crate::core::format::MessageFormat;
use crate::core::progress::{ProgressTracker, Tracked};
use crate::error::{DecryptError, Result};

/// Default plaintext window authenticated before release (25 MiB)
pub const DEFAULT_STREAM_BUFFER_BYTES: usize = 25 * 1024 * 1024;

const IO_BUFFER_BYTES: usize = 1024 * 1024;

/// Unlocked decryption subkeys of one private key
pub struct Keyring {
    keys: Vec<(Fingerprint, KeyPair)>,
}

impl std::fmt::Debug for Keyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyring")
            .field(
                "keys",
                &self.keys.iter().map(|(fp, _)| fp.to_hex()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Keyring {
    /// Parse the armored private key and unlock every encryption-capable
    /// secret subkey with the passphrase.
    pub fn unlock(material: &KeyMaterial) -> Result<Self> {
        let policy = StandardPolicy::new();
        Self::unlock_with_policy(material, &policy)
    }

    fn unlock_with_policy(material: &KeyMaterial, policy: &dyn Policy) -> Result<Self> {
        let cert = Cert::from_bytes(material.private_key.expose_secret().as_bytes())
            .map_err(|e| DecryptError::decryption(e.context("Failed to parse private key")))?;

        if !cert.is_tsk() {
            return Err(DecryptError::decryption(anyhow!(
                "key {} carries no secret key material",
                cert.fingerprint()
            )));
        }

        let password = Password::from(material.passphrase.expose_secret());
        let mut keys = Vec::new();

        for ka in cert
            .keys()
            .with_policy(policy, None)
            .supported()
            .secret()
            .for_transport_encryption()
            .for_storage_encryption()
        {
            let key = ka.key().clone();
            let fingerprint = key.fingerprint();

            let key = if key.secret().is_encrypted() {
                key.decrypt_secret(&password).map_err(|e| {
                    DecryptError::decryption(
                        e.context(format!("Failed to unlock private key {}", fingerprint)),
                    )
                })?
            } else {
                key
            };

            let pair = key.into_keypair().map_err(DecryptError::decryption)?;
            keys.push((fingerprint, pair));
        }

        if keys.is_empty() {
            return Err(DecryptError::decryption(anyhow!(
                "key {} has no usable encryption subkey",
                cert.fingerprint()
            )));
        }

        debug!(subkeys = keys.len(), "Unlocked decryption subkeys");
        Ok(Self { keys })
    }
}

struct Helper {
    keyring: Keyring,
}

impl VerificationHelper for Helper {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(Vec::new())
    }

    // Signatures are not checked; only confidentiality and integrity matter here
    fn check(&mut self, _structure: MessageStructure) -> openpgp::Result<()> {
        Ok(())
    }
}

impl DecryptionHelper for Helper {
    fn decrypt<D>(
        &mut self,
        pkesks: &[PKESK],
        _skesks: &[SKESK],
        sym_algo: Option<SymmetricAlgorithm>,
        mut decrypt: D,
    ) -> openpgp::Result<Option<Fingerprint>>
    where
        D: FnMut(SymmetricAlgorithm, &SessionKey) -> bool,
    {
        for pkesk in pkesks {
            for (fingerprint, pair) in self.keyring.keys.iter_mut() {
                if let Some((algo, session_key)) = pkesk.decrypt(pair, sym_algo) {
                    if decrypt(algo, &session_key) {
                        return Ok(Some(fingerprint.clone()));
                    }
                }
            }
        }

        Err(anyhow!("no session key could be decrypted with the provided key"))
    }
}

fn decryption_io(context: &'static str) -> impl Fn(io::Error) -> DecryptError {
    move |e| DecryptError::decryption(anyhow::Error::new(e).context(context))
}

/// Armored strategy: read the whole message as text, decrypt into memory,
/// then write the plaintext in one piece.
///
/// The whole message is authenticated before anything is written.
pub fn decrypt_armored(keyring: Keyring, encrypted: &Path, decrypted: &Path) -> Result<u64> {
    let text = std::fs::read_to_string(encrypted)
        .map_err(decryption_io("Failed to read armored message"))?;

    let policy = StandardPolicy::new();
    let mut decryptor = DecryptorBuilder::from_bytes(text.as_bytes())
        .and_then(|builder| {
            builder
                .buffer_size(text.len().max(IO_BUFFER_BYTES))
                .with_policy(&policy, None, Helper { keyring })
        })
        .map_err(|e| DecryptError::decryption(e.context("Failed to decrypt armored message")))?;

    let mut plaintext = Vec::new();
    decryptor
        .read_to_end(&mut plaintext)
        .map_err(decryption_io("Failed to decrypt armored message"))?;

    std::fs::write(decrypted, &plaintext)
        .map_err(decryption_io("Failed to write decrypted output"))?;

    Ok(plaintext.len() as u64)
}

/// Binary strategy: stream ciphertext from `encrypted` through the
/// decryptor into `decrypted`, counting outgoing plaintext on `progress`.
///
/// Only the first `stream_buffer_bytes` of plaintext are authenticated
/// before release; see the module documentation.
pub fn decrypt_binary(
    keyring: Keyring,
    encrypted: &Path,
    decrypted: &Path,
    stream_buffer_bytes: usize,
    progress: Arc<ProgressTracker>,
) -> Result<u64> {
    let input = File::open(encrypted).map_err(decryption_io("Failed to open encrypted file"))?;
    let input = BufReader::with_capacity(IO_BUFFER_BYTES, input);

    let policy = StandardPolicy::new();
    let decryptor = DecryptorBuilder::from_reader(input)
        .and_then(|builder| {
            builder
                .buffer_size(stream_buffer_bytes)
                .with_policy(&policy, None, Helper { keyring })
        })
        .map_err(|e| DecryptError::decryption(e.context("Failed to decrypt binary message")))?;

    let output = File::create(decrypted)
        .map_err(decryption_io("Failed to create decrypted output"))?;
    let mut output = BufWriter::with_capacity(IO_BUFFER_BYTES, output);

    let mut plaintext = Tracked::new(decryptor, progress);
    let written = io::copy(&mut plaintext, &mut output)
        .map_err(decryption_io("Failed to decrypt binary message"))?;
    output
        .flush()
        .map_err(decryption_io("Failed to write decrypted output"))?;

    Ok(written)
}

/// Decrypt `encrypted` into `decrypted` with the strategy matching `format`.
///
/// Key unlocking happens here too, so any key problem surfaces as
/// [`DecryptError::DecryptionFailed`]. Returns the plaintext size.
pub async fn decrypt_file(
    encrypted: &Path,
    decrypted: &Path,
    material: &KeyMaterial,
    format: MessageFormat,
    stream_buffer_bytes: usize,
) -> Result<u64> {
    let encrypted_size = tokio::fs::metadata(encrypted)
        .await
        .map_err(decryption_io("Failed to stat encrypted file"))?
        .len();

    info!(format = %format, bytes = encrypted_size, "Decrypting message");

    let progress = ProgressTracker::start("Decrypt", encrypted_size);
    let task_progress = progress.clone();
    let material = material.clone();
    let encrypted: PathBuf = encrypted.to_path_buf();
    let decrypted: PathBuf = decrypted.to_path_buf();

    let outcome = tokio::task::spawn_blocking(move || {
        let keyring = Keyring::unlock(&material)?;
        match format {
            MessageFormat::Armored => {
                let written = decrypt_armored(keyring, &encrypted, &decrypted)?;
                task_progress.record(written);
                Ok(written)
            }
            MessageFormat::Binary => decrypt_binary(
                keyring,
                &encrypted,
                &decrypted,
                stream_buffer_bytes,
                task_progress,
            ),
        }
    })
    .await;

    progress.finish();

    match outcome {
        Ok(result) => result,
        Err(join_error) => Err(DecryptError::decryption(
            anyhow::Error::new(join_error).context("Decryption task did not complete"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openpgp::serialize::stream::{Armorer, LiteralWriter, Message};
    use openpgp::serialize::SerializeInto;
    use tempfile::tempdir;

    const PASSPHRASE: &str = "correct horse battery staple";

    fn generate_key() -> (Cert, KeyMaterial) {
        let (cert, _revocation) = CertBuilder::new()
            .add_userid("transfer <transfer@example.org>")
            .add_transport_encryption_subkey()
            .set_password(Some(PASSPHRASE.into()))
            .generate()
            .unwrap();
        let armored = String::from_utf8(cert.as_tsk().armored().to_vec().unwrap()).unwrap();
        (cert, KeyMaterial::new(armored, PASSPHRASE))
    }

    fn encrypt(cert: &Cert, plaintext: &[u8], armor: bool) -> Vec<u8> {
        let policy = StandardPolicy::new();
        let recipients = cert
            .keys()
            .with_policy(&policy, None)
            .supported()
            .for_transport_encryption();

        let mut sink = Vec::new();
        {
            let message = Message::new(&mut sink);
            let message = if armor {
                Armorer::new(message).build().unwrap()
            } else {
                message
            };
            #[allow(deprecated)]
            let message = openpgp::serialize::stream::Encryptor::for_recipients(message, recipients)
                .build()
                .unwrap();
            let mut literal = LiteralWriter::new(message).build().unwrap();
            literal.write_all(plaintext).unwrap();
            literal.finalize().unwrap();
        }
        sink
    }

    #[test]
    fn test_unlock_rejects_wrong_passphrase() {
        let (_, material) = generate_key();
        let wrong = KeyMaterial::new(material.private_key.expose_secret(), "nope");
        let err = Keyring::unlock(&wrong).unwrap_err();
        assert!(matches!(err, DecryptError::DecryptionFailed(_)));
        assert!(err.to_string().contains("unlock"));
    }

    #[test]
    fn test_unlock_rejects_garbage_key() {
        let material = KeyMaterial::new("not a key", PASSPHRASE);
        assert!(matches!(
            Keyring::unlock(&material),
            Err(DecryptError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_unlock_rejects_public_only_key() {
        let (cert, _) = generate_key();
        let public = String::from_utf8(cert.armored().to_vec().unwrap()).unwrap();
        let err = Keyring::unlock(&KeyMaterial::new(public, PASSPHRASE)).unwrap_err();
        assert!(err.to_string().contains("no secret key material"));
    }

    #[tokio::test]
    async fn test_armored_round_trip() {
        let dir = tempdir().unwrap();
        let (cert, material) = generate_key();
        let plaintext = b"id,amount\n1,100\n2,250\n".repeat(100);

        let encrypted = dir.path().join("in.asc");
        let decrypted = dir.path().join("out.csv");
        std::fs::write(&encrypted, encrypt(&cert, &plaintext, true)).unwrap();

        let written = decrypt_file(
            &encrypted,
            &decrypted,
            &material,
            MessageFormat::Armored,
            DEFAULT_STREAM_BUFFER_BYTES,
        )
        .await
        .unwrap();

        assert_eq!(written, plaintext.len() as u64);
        assert_eq!(std::fs::read(&decrypted).unwrap(), plaintext);
    }

    #[tokio::test]
    async fn test_binary_round_trip_beyond_buffer_window() {
        let dir = tempdir().unwrap();
        let (cert, material) = generate_key();
        let plaintext: Vec<u8> = (0..300_000u32).map(|i| (i * 7 % 256) as u8).collect();

        let encrypted = dir.path().join("in.pgp");
        let decrypted = dir.path().join("out.bin");
        std::fs::write(&encrypted, encrypt(&cert, &plaintext, false)).unwrap();

        // Window far smaller than the message forces incremental release
        let written = decrypt_file(
            &encrypted,
            &decrypted,
            &material,
            MessageFormat::Binary,
            64 * 1024,
        )
        .await
        .unwrap();

        assert_eq!(written, plaintext.len() as u64);
        assert_eq!(std::fs::read(&decrypted).unwrap(), plaintext);
    }

    #[tokio::test]
    async fn test_tampered_message_fails_inside_window() {
        let dir = tempdir().unwrap();
        let (cert, material) = generate_key();
        let mut ciphertext = encrypt(&cert, b"ledger contents", false);
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0x01;

        let encrypted = dir.path().join("in.pgp");
        let decrypted = dir.path().join("out.bin");
        std::fs::write(&encrypted, ciphertext).unwrap();

        let result = decrypt_file(
            &encrypted,
            &decrypted,
            &material,
            MessageFormat::Binary,
            DEFAULT_STREAM_BUFFER_BYTES,
        )
        .await;

        assert!(matches!(result, Err(DecryptError::DecryptionFailed(_))));
        let leaked = std::fs::read(&decrypted).unwrap_or_default();
        assert!(leaked.is_empty());
    }

    #[tokio::test]
    async fn test_message_for_other_recipient_fails() {
        let dir = tempdir().unwrap();
        let (other, _) = generate_key();
        let (_, material) = generate_key();

        let encrypted = dir.path().join("in.pgp");
        std::fs::write(&encrypted, encrypt(&other, b"not for you", false)).unwrap();

        let err = decrypt_file(
            &encrypted,
            &dir.path().join("out"),
            &material,
            MessageFormat::Binary,
            DEFAULT_STREAM_BUFFER_BYTES,
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("no session key"));
    }

    #[tokio::test]
    async fn test_binary_bytes_through_armored_strategy_fail() {
        let dir = tempdir().unwrap();
        let (cert, material) = generate_key();
        let encrypted = dir.path().join("in.pgp");
        let mut ciphertext = encrypt(&cert, b"payload", false);
        ciphertext.extend_from_slice(&[0xff, 0xfe, 0x00]);
        std::fs::write(&encrypted, ciphertext).unwrap();

        let result = decrypt_file(
            &encrypted,
            &dir.path().join("out"),
            &material,
            MessageFormat::Armored,
            DEFAULT_STREAM_BUFFER_BYTES,
        )
        .await;

        assert!(matches!(result, Err(DecryptError::DecryptionFailed(_))));
    }
}
