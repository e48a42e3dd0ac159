//! Secrets Manager key store
//!
//! Each transfer server keeps its PGP key in the secret
//! `aws/transfer/{serverId}/@pgp-default` as a JSON string with
//! `PGPPrivateKey` and `PGPPassphrase`.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_secretsmanager::Client;
use tracing::debug;

use crate::backend::{parse_key_secret, KeyLookupError, KeyMaterial, KeyStore};

#[derive(Debug, Clone)]
pub struct SecretsManagerKeyStore {
    client: Client,
}

impl SecretsManagerKeyStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &SdkConfig) -> Self {
        let builder = aws_sdk_secretsmanager::config::Builder::from(config);
        Self::new(Client::from_conf(builder.build()))
    }
}

#[async_trait]
impl KeyStore for SecretsManagerKeyStore {
    async fn key_material(&self, server_id: &str) -> Result<KeyMaterial, KeyLookupError> {
        let secret_id = self.secret_name(server_id);
        debug!(secret = %secret_id, "Fetching PGP credentials");

        let output = self
            .client
            .get_secret_value()
            .secret_id(&secret_id)
            .send()
            .await
            .map_err(|e| KeyLookupError::Service(e.into()))?;

        let secret = output.secret_string().ok_or_else(|| {
            KeyLookupError::Malformed(format!("secret {} has no string value", secret_id))
        })?;
        parse_key_secret(secret)
    }
}
