use async_trait::async_trait;
use serde_json::Value;

use crate::errors::Result;

/// Decrypts sensitive provider settings on read. The cipher itself lives
/// outside the core; configurations are stored with secret fields encrypted
/// at the persistence boundary.
#[async_trait]
pub trait SecretDecryptorTrait: Send + Sync {
    async fn decrypt_settings(&self, settings: &Value) -> Result<Value>;
}

/// Identity decryptor for deployments that store settings in the clear.
pub struct PassthroughDecryptor;

#[async_trait]
impl SecretDecryptorTrait for PassthroughDecryptor {
    async fn decrypt_settings(&self, settings: &Value) -> Result<Value> {
        Ok(settings.clone())
    }
}
