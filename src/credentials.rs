//! Credential sealing and lookup
//!
//! Integration tokens are stored as hex(nonce || ciphertext || tag) sealed
//! with ChaCha20-Poly1305. The integration id is bound in as associated data,
//! so a ciphertext copied onto another integration will not open. Decrypted
//! tokens only ever live in `SecretString`.

use crate::error::{ReplyrError, Result};
use crate::storage::Store;
use ring::aead::{Aad, CHACHA20_POLY1305, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

const KEY_LEN: usize = 32;

/// Decrypted token pair for one integration
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
}

impl Credentials {
    pub fn new(access_token: &str, refresh_token: Option<&str>) -> Self {
        Self {
            access_token: SecretString::from(access_token.to_string()),
            refresh_token: refresh_token.map(|t| SecretString::from(t.to_string())),
        }
    }
}

/// Resolves decrypted credentials for an integration
pub trait CredentialStore: Send + Sync {
    fn get_credentials(&self, integration_id: &str) -> Result<Credentials>;
}

/// ChaCha20-Poly1305 sealer keyed by a 32-byte secret
pub struct Sealer {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl Sealer {
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_LEN {
            return Err(ReplyrError::Credentials(format!(
                "sealing key must be {} bytes, got {}",
                KEY_LEN,
                key.len()
            )));
        }
        let unbound = UnboundKey::new(&CHACHA20_POLY1305, key)
            .map_err(|_| ReplyrError::Credentials("failed to create sealing key".to_string()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Key given as 64 hex characters
    pub fn from_hex(hex_key: &SecretString) -> Result<Self> {
        let bytes = hex::decode(hex_key.expose_secret().trim())
            .map_err(|_| ReplyrError::Credentials("sealing key is not valid hex".to_string()))?;
        Self::new(&bytes)
    }

    /// Key read from the named environment variable
    pub fn from_env(var: &str) -> Result<Self> {
        let value = std::env::var(var)
            .map_err(|_| ReplyrError::Credentials(format!("environment variable {} not set", var)))?;
        Self::from_hex(&SecretString::from(value))
    }

    /// Fresh random key, hex encoded
    pub fn generate_key_hex() -> Result<SecretString> {
        let mut key = [0u8; KEY_LEN];
        SystemRandom::new()
            .fill(&mut key)
            .map_err(|_| ReplyrError::Credentials("failed to generate random key".to_string()))?;
        Ok(SecretString::from(hex::encode(key)))
    }

    pub fn seal(&self, integration_id: &str, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| ReplyrError::Credentials("failed to generate nonce".to_string()))?;

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(integration_id.as_bytes()),
                &mut in_out,
            )
            .map_err(|_| ReplyrError::Credentials("encryption failed".to_string()))?;

        let mut sealed = nonce_bytes.to_vec();
        sealed.extend_from_slice(&in_out);
        Ok(hex::encode(sealed))
    }

    pub fn open(&self, integration_id: &str, sealed: &str) -> Result<SecretString> {
        let bytes = hex::decode(sealed.trim())
            .map_err(|_| ReplyrError::Credentials("sealed token is not valid hex".to_string()))?;
        if bytes.len() < NONCE_LEN + CHACHA20_POLY1305.tag_len() {
            return Err(ReplyrError::Credentials("sealed token is truncated".to_string()));
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| ReplyrError::Credentials("invalid nonce".to_string()))?;

        let mut in_out = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::from(integration_id.as_bytes()), &mut in_out)
            .map_err(|_| ReplyrError::Credentials("decryption failed: wrong key or corrupted token".to_string()))?;

        let text = String::from_utf8(plaintext.to_vec())
            .map_err(|_| ReplyrError::Credentials("decrypted token is not UTF-8".to_string()))?;
        Ok(SecretString::from(text))
    }
}

/// Opens the sealed tokens stored on the integration record
pub struct SealedCredentialStore {
    store: Arc<dyn Store>,
    sealer: Sealer,
}

impl SealedCredentialStore {
    pub fn new(store: Arc<dyn Store>, sealer: Sealer) -> Self {
        Self { store, sealer }
    }
}

impl CredentialStore for SealedCredentialStore {
    fn get_credentials(&self, integration_id: &str) -> Result<Credentials> {
        let integration = self
            .store
            .get_integration(integration_id)?
            .ok_or_else(|| ReplyrError::IntegrationNotFound(integration_id.to_string()))?;

        let sealed_access = integration
            .access_token_sealed
            .as_deref()
            .ok_or_else(|| ReplyrError::Credentials("integration has no access token".to_string()))?;

        let access_token = self.sealer.open(integration_id, sealed_access)?;
        let refresh_token = integration
            .refresh_token_sealed
            .as_deref()
            .map(|sealed| self.sealer.open(integration_id, sealed))
            .transpose()?;

        Ok(Credentials {
            access_token,
            refresh_token,
        })
    }
}

/// Hands out fixed credentials for every integration; for tests and local runs
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    credentials: Credentials,
}

impl StaticCredentials {
    pub fn new(access_token: &str) -> Self {
        Self {
            credentials: Credentials::new(access_token, None),
        }
    }
}

impl CredentialStore for StaticCredentials {
    fn get_credentials(&self, _integration_id: &str) -> Result<Credentials> {
        Ok(self.credentials.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Integration, Platform};
    use crate::storage::SqliteStore;

    fn sealer() -> Sealer {
        Sealer::from_hex(&Sealer::generate_key_hex().unwrap()).unwrap()
    }

    #[test]
    fn test_seal_open() {
        let s = sealer();
        let sealed = s.seal("int-1", "ya29.token").unwrap();
        assert!(!sealed.contains("ya29"));
        assert_eq!(s.open("int-1", &sealed).unwrap().expose_secret(), "ya29.token");
    }

    #[test]
    fn test_fresh_nonce_each_seal() {
        let s = sealer();
        assert_ne!(s.seal("int-1", "same").unwrap(), s.seal("int-1", "same").unwrap());
    }

    #[test]
    fn test_bound_to_integration_id() {
        let s = sealer();
        let sealed = s.seal("int-1", "token").unwrap();
        assert!(matches!(s.open("int-2", &sealed), Err(ReplyrError::Credentials(_))));
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = sealer().seal("int-1", "token").unwrap();
        assert!(sealer().open("int-1", &sealed).is_err());
    }

    #[test]
    fn test_malformed_input() {
        let s = sealer();
        assert!(s.open("int-1", "not-hex").is_err());
        assert!(s.open("int-1", "abcd").is_err());
        assert!(Sealer::new(&[0u8; 16]).is_err());
        assert!(Sealer::from_hex(&SecretString::from("zz".to_string())).is_err());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let creds = Credentials::new("super-secret", Some("refresh-secret"));
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("refresh-secret"));
    }

    #[test]
    fn test_store_opens_integration_tokens() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let s = sealer();
        let access = s.seal("int-1", "access").unwrap();
        let refresh = s.seal("int-1", "refresh").unwrap();
        let integ = Integration::new("t1", Platform::Youtube, "UC1")
            .with_id("int-1")
            .with_sealed_tokens(access, Some(refresh));
        store.create_integration(&integ).unwrap();
        let bare = Integration::new("t1", Platform::Youtube, "UC2").with_id("int-2");
        store.create_integration(&bare).unwrap();

        let creds_store = SealedCredentialStore::new(store, s);
        let creds = creds_store.get_credentials("int-1").unwrap();
        assert_eq!(creds.access_token.expose_secret(), "access");
        assert_eq!(creds.refresh_token.unwrap().expose_secret(), "refresh");

        assert!(matches!(
            creds_store.get_credentials("int-2"),
            Err(ReplyrError::Credentials(_))
        ));
        assert!(matches!(
            creds_store.get_credentials("missing"),
            Err(ReplyrError::IntegrationNotFound(_))
        ));
    }
}
