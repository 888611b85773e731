use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode};
use tracing::warn;
use uuid::Uuid;

use cove_types::api::Claims;

use crate::revocation::AllowList;

/// Tokens live for 30 days; the allow-list entry written on sign expires at
/// the same moment.
const TOKEN_LIFETIME_SECS: i64 = 30 * 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token header carries no key id")]
    MissingKeyId,
    #[error("unknown key id {0}")]
    UnknownKeyId(String),
    #[error("token signature is invalid")]
    SignatureInvalid,
    #[error("token is expired")]
    Expired,
    #[error("token has been revoked")]
    Revoked,
}

/// Signs and verifies bearer tokens against the rotating key material on
/// disk: a JSON key map `{kid: publicKeyPem}` plus one `<kid>.pem` PKCS#8
/// private key per generation. The key map is reloaded on every verification
/// so a rotation needs no restart; the private key is only touched on sign.
pub struct KeyStore {
    key_map_path: PathBuf,
    private_key_dir: PathBuf,
    allow_list: AllowList,
}

impl KeyStore {
    pub fn new(key_map_path: impl Into<PathBuf>, private_key_dir: impl Into<PathBuf>) -> Self {
        Self {
            key_map_path: key_map_path.into(),
            private_key_dir: private_key_dir.into(),
            allow_list: AllowList::new(),
        }
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    fn load_key_map(&self) -> Result<BTreeMap<String, String>> {
        let raw = fs::read_to_string(&self.key_map_path)
            .with_context(|| format!("reading key map {}", self.key_map_path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing key map {}", self.key_map_path.display()))
    }

    /// Sign claims for `user_id` with the currently-active key (the greatest
    /// kid — kids are dated, so that is the newest generation) and record the
    /// allow-list entry for HTTP verification.
    pub fn sign(&self, user_id: Uuid, username: &str) -> Result<String> {
        let key_map = self.load_key_map()?;
        let (kid, _) = key_map
            .iter()
            .next_back()
            .context("key map is empty, run the rotation job")?;

        let pem_path = self.private_key_dir.join(format!("{kid}.pem"));
        let pem = fs::read(&pem_path)
            .with_context(|| format!("reading private key {}", pem_path.display()))?;
        let encoding_key = EncodingKey::from_ed_pem(&pem)
            .with_context(|| format!("parsing private key {}", pem_path.display()))?;

        let claims = Claims {
            sub: user_id,
            username: username.to_string(),
            exp: (Utc::now() + Duration::seconds(TOKEN_LIFETIME_SECS)).timestamp() as usize,
        };

        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(kid.clone());

        let token = encode(&header, &claims, &encoding_key)?;
        self.allow_list.insert(
            user_id,
            &token,
            StdDuration::from_secs(TOKEN_LIFETIME_SECS as u64),
        );
        Ok(token)
    }

    /// Verify a token's signature and freshness. Used directly at the
    /// WebSocket upgrade, where a connection is authenticated exactly once.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let header = decode_header(token).map_err(|_| TokenError::SignatureInvalid)?;
        let kid = header.kid.ok_or(TokenError::MissingKeyId)?;

        let key_map = self.load_key_map().map_err(|err| {
            warn!("key map unavailable during verification: {err:#}");
            TokenError::UnknownKeyId(kid.clone())
        })?;
        let pem = key_map
            .get(&kid)
            .ok_or_else(|| TokenError::UnknownKeyId(kid.clone()))?;

        let decoding_key =
            DecodingKey::from_ed_pem(pem.as_bytes()).map_err(|_| TokenError::SignatureInvalid)?;

        let data = decode::<Claims>(token, &decoding_key, &Validation::new(Algorithm::EdDSA))
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::SignatureInvalid,
            })?;

        Ok(data.claims)
    }

    /// HTTP verification: signature plus allow-list membership, so a forced
    /// logout takes effect immediately for REST calls.
    pub fn verify_http(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.verify(token)?;
        if !self.allow_list.contains(claims.sub, token) {
            return Err(TokenError::Revoked);
        }
        Ok(claims)
    }
}
