//! Resolves a `keyId` (and the scheme a caller wants to sign under, or a
//! peer declared in an incoming signature) into a ready-to-use
//! [`SignatureKey`], merging per-key option overrides over a manager-wide
//! base and handling the `algorithm`-to-primitive coercion rules.
//!
//! Two construction modes mirror how callers actually hold keys: a single
//! fixed `(keyId, key)` pair for services that talk to one counterparty, or
//! an injected async lookup function for services that resolve `keyId`
//! against a database or cache. Both are stateless beyond their closure
//! captures, so a `KeyManager` is cheap to clone behind an `Arc` and share
//! across request-handling tasks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::{
    self, merge_options, DigestAlgorithm, KeyConfig, MacAlgorithm, SignatureOptions,
    SignatureOptionsOverride, SignatureScheme,
};
use crate::context::{HttpMessageAdapter, MessageContext};
use crate::error::{config_err, verify_err, ConfigurationError, Error};
use crate::key::SignatureKey;
use crate::parser;

type LookupFuture =
    Pin<Box<dyn Future<Output = Result<Option<(KeyConfig, SignatureOptionsOverride)>, ConfigurationError>> + Send>>;
type LookupFn = dyn Fn(String) -> LookupFuture + Send + Sync;

enum KeySource {
    Fixed {
        key_id: String,
        config: KeyConfig,
        overrides: SignatureOptionsOverride,
    },
    Lookup(Arc<LookupFn>),
}

/// Resolves keys and merges signing/verification options. See the module
/// docs for the two construction modes.
pub struct KeyManager {
    base_options: SignatureOptions,
    digest_algorithm: DigestAlgorithm,
    source: KeySource,
}

impl KeyManager {
    /// A manager backed by a single fixed key, with no option overrides
    /// beyond `base_options`. `version` must equal
    /// [`crate::config::SUPPORTED_VERSION`].
    pub fn from_key(
        version: &str,
        key_id: impl Into<String>,
        config: KeyConfig,
        base_options: SignatureOptions,
    ) -> Result<Self, ConfigurationError> {
        config::check_version(version)?;
        Ok(KeyManager {
            base_options,
            digest_algorithm: DigestAlgorithm::Sha256,
            source: KeySource::Fixed {
                key_id: key_id.into(),
                config,
                overrides: SignatureOptionsOverride::default(),
            },
        })
    }

    /// As [`Self::from_key`], with per-key option overrides merged over
    /// `base_options`.
    pub fn from_key_with_overrides(
        version: &str,
        key_id: impl Into<String>,
        config: KeyConfig,
        overrides: SignatureOptionsOverride,
        base_options: SignatureOptions,
    ) -> Result<Self, ConfigurationError> {
        config::check_version(version)?;
        Ok(KeyManager {
            base_options,
            digest_algorithm: DigestAlgorithm::Sha256,
            source: KeySource::Fixed {
                key_id: key_id.into(),
                config,
                overrides,
            },
        })
    }

    /// A manager backed by an injected async lookup: given a `keyId`,
    /// returns the key configuration and its option overrides, or `None` if
    /// no such key exists. The closure must be `Send + Sync + 'static` so
    /// the manager itself remains shareable across tasks. `version` must
    /// equal [`crate::config::SUPPORTED_VERSION`].
    pub fn from_lookup<F, Fut>(
        version: &str,
        lookup: F,
        base_options: SignatureOptions,
    ) -> Result<Self, ConfigurationError>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<(KeyConfig, SignatureOptionsOverride)>, ConfigurationError>>
            + Send
            + 'static,
    {
        config::check_version(version)?;
        Ok(KeyManager {
            base_options,
            digest_algorithm: DigestAlgorithm::Sha256,
            source: KeySource::Lookup(Arc::new(move |key_id| Box::pin(lookup(key_id)))),
        })
    }

    /// Overrides the digest algorithm used for `Digest` header construction
    /// when a resolved key's scheme does not pin one itself (i.e. `hs2019`
    /// over a keypair key, or a manager that never signs). Default SHA-256.
    pub fn with_digest_algorithm(mut self, digest_algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = digest_algorithm;
        self
    }

    /// Resolves `key_id` under `scheme`, raising a [`crate::error::VerificationError`]
    /// if no such key exists.
    pub async fn get_key(&self, key_id: &str, scheme: SignatureScheme) -> Result<SignatureKey, Error> {
        match self.try_get_key(key_id, scheme).await? {
            Some(key) => Ok(key),
            None => Err(verify_err(format!("key {key_id} not found")).into()),
        }
    }

    /// As [`Self::get_key`], but returns `None` instead of raising when the
    /// key is absent.
    pub async fn try_get_key(
        &self,
        key_id: &str,
        scheme: SignatureScheme,
    ) -> Result<Option<SignatureKey>, Error> {
        let resolved = match &self.source {
            KeySource::Fixed {
                key_id: fixed_id,
                config,
                overrides,
            } => {
                if fixed_id != key_id {
                    return Ok(None);
                }
                (config.clone(), overrides.clone())
            }
            KeySource::Lookup(lookup) => match lookup(key_id.to_owned()).await? {
                Some(pair) => pair,
                None => return Ok(None),
            },
        };
        let (config, overrides) = resolved;

        let options = merge_options(&self.base_options, &overrides)?;
        let (config, digest_algorithm) = self.coerce_scheme(scheme, config)?;

        let key = SignatureKey::new(key_id.to_owned(), &config, options, scheme, digest_algorithm)?;
        Ok(Some(key))
    }

    /// Implements the `algorithm`-to-primitive coercion rules: `hs2019`
    /// passes the resolved key through unchanged; `hmac-sha256` pins the MAC
    /// to HMAC-SHA256 and the digest to SHA-256, rejecting any key that
    /// isn't a symmetric secret; `rsa-sha256`/`ecdsa-sha256` are reserved and
    /// always raise, since no asymmetric dispatch exists yet.
    fn coerce_scheme(
        &self,
        scheme: SignatureScheme,
        config: KeyConfig,
    ) -> Result<(KeyConfig, DigestAlgorithm), ConfigurationError> {
        match scheme {
            SignatureScheme::Hs2019 => {
                let digest_algorithm = match &config {
                    KeyConfig::Secret { mac_algorithm, .. } => mac_algorithm.digest_algorithm(),
                    KeyConfig::KeyPair { .. } => self.digest_algorithm,
                };
                Ok((config, digest_algorithm))
            }
            SignatureScheme::HmacSha256 => match config {
                KeyConfig::Secret { key_material, .. } => Ok((
                    KeyConfig::Secret {
                        mac_algorithm: MacAlgorithm::HmacSha256,
                        key_material,
                    },
                    DigestAlgorithm::Sha256,
                )),
                KeyConfig::KeyPair { .. } => Err(config_err(
                    "algorithm 'hmac-sha256' requires a symmetric secret key",
                )),
            },
            SignatureScheme::RsaSha256 | SignatureScheme::EcdsaSha256 => {
                Err(config_err("key pair algorithms are not yet supported"))
            }
        }
    }

    /// Parses the signature on `ctx`, resolves the declaring key (defaulting
    /// to `hs2019` when the signature omits `algorithm`), and verifies it
    /// against the request-direction option set.
    pub async fn verify_request<A: HttpMessageAdapter>(
        &self,
        ctx: &MessageContext<'_, A>,
        observed_at_ms: Option<i64>,
    ) -> Result<(), Error> {
        let key = self.resolve_from_message(ctx).await?;
        key.verify_request(ctx, observed_at_ms)
    }

    /// As [`Self::verify_request`], for the response-direction option set.
    pub async fn verify_response<A: HttpMessageAdapter>(
        &self,
        ctx: &MessageContext<'_, A>,
        observed_at_ms: Option<i64>,
    ) -> Result<(), Error> {
        let key = self.resolve_from_message(ctx).await?;
        key.verify_response(ctx, observed_at_ms)
    }

    async fn resolve_from_message<A: HttpMessageAdapter>(
        &self,
        ctx: &MessageContext<'_, A>,
    ) -> Result<SignatureKey, Error> {
        let signature_string = ctx
            .extract_signature_string()?
            .ok_or_else(|| verify_err("no signature present on message"))?;
        let parsed = parser::parse(&signature_string)?;
        let scheme = parsed.algorithm.unwrap_or(SignatureScheme::Hs2019);
        self.get_key(&parsed.key_id, scheme).await
    }

    /// Resolves `key_id` under `scheme` and signs the request-direction
    /// option set.
    pub async fn sign_request<A: HttpMessageAdapter>(
        &self,
        key_id: &str,
        scheme: SignatureScheme,
        ctx: &MessageContext<'_, A>,
    ) -> Result<String, Error> {
        let key = self.get_key(key_id, scheme).await?;
        key.sign_request(ctx)
    }

    /// As [`Self::sign_request`], for the response-direction option set.
    pub async fn sign_response<A: HttpMessageAdapter>(
        &self,
        key_id: &str,
        scheme: SignatureScheme,
        ctx: &MessageContext<'_, A>,
    ) -> Result<String, Error> {
        let key = self.get_key(key_id, scheme).await?;
        key.sign_response(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{RequestTarget, TimestampOptions};
    use std::collections::BTreeMap;

    struct TestAdapter {
        headers: BTreeMap<String, Vec<String>>,
    }

    impl HttpMessageAdapter for TestAdapter {
        fn header_values(&self, name: &str) -> Option<Vec<String>> {
            self.headers.get(&name.to_ascii_lowercase()).cloned()
        }

        fn request_target(&self) -> Option<RequestTarget> {
            Some(RequestTarget {
                method: "POST".to_owned(),
                path: "/inbox".to_owned(),
            })
        }
    }

    fn secret_config() -> KeyConfig {
        KeyConfig::Secret {
            mac_algorithm: MacAlgorithm::HmacSha256,
            key_material: b"correct horse battery staple".to_vec(),
        }
    }

    #[tokio::test]
    async fn fixed_key_sign_then_verify_round_trip() {
        let manager =
            KeyManager::from_key(config::SUPPORTED_VERSION, "k1", secret_config(), SignatureOptions::default())
                .unwrap();

        let key = manager.get_key("k1", SignatureScheme::HmacSha256).await.unwrap();
        let digest_header = key.create_digest_header(b"");

        let mut headers = BTreeMap::new();
        headers.insert("host".to_owned(), vec!["example.org".to_owned()]);
        headers.insert("digest".to_owned(), vec![digest_header]);
        let adapter = TestAdapter { headers };
        let ctx = MessageContext::with_timestamps(
            &adapter,
            TimestampOptions {
                created: Some(1_700_000_000),
                expires: None,
            },
        );

        let signature = manager
            .sign_request("k1", SignatureScheme::HmacSha256, &ctx)
            .await
            .unwrap();

        let mut verify_headers = headers_with_signature(&adapter.headers, &signature);
        let verify_adapter = TestAdapter {
            headers: std::mem::take(&mut verify_headers),
        };
        let verify_ctx = MessageContext::new(&verify_adapter);
        manager
            .verify_request(&verify_ctx, Some(1_700_000_030_000))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_key_id_is_not_found() {
        let manager =
            KeyManager::from_key(config::SUPPORTED_VERSION, "k1", secret_config(), SignatureOptions::default())
                .unwrap();
        let result = manager.get_key("nope", SignatureScheme::HmacSha256).await;
        assert!(result.unwrap_err().is_verification());
    }

    #[tokio::test]
    async fn rsa_scheme_is_rejected_before_key_construction() {
        let manager =
            KeyManager::from_key(config::SUPPORTED_VERSION, "k1", secret_config(), SignatureOptions::default())
                .unwrap();
        let result = manager.get_key("k1", SignatureScheme::RsaSha256).await;
        assert!(!result.unwrap_err().is_verification());
    }

    #[tokio::test]
    async fn lookup_backed_manager_resolves_keys() {
        let manager = KeyManager::from_lookup(
            config::SUPPORTED_VERSION,
            |key_id: String| async move {
                if key_id == "k1" {
                    Ok(Some((secret_config(), SignatureOptionsOverride::default())))
                } else {
                    Ok(None)
                }
            },
            SignatureOptions::default(),
        )
        .unwrap();

        assert!(manager
            .try_get_key("k1", SignatureScheme::HmacSha256)
            .await
            .unwrap()
            .is_some());
        assert!(manager
            .try_get_key("k2", SignatureScheme::HmacSha256)
            .await
            .unwrap()
            .is_none());
    }

    fn headers_with_signature(
        base: &BTreeMap<String, Vec<String>>,
        signature: &str,
    ) -> BTreeMap<String, Vec<String>> {
        let mut headers = base.clone();
        headers.insert("signature".to_owned(), vec![signature.to_owned()]);
        headers
    }
}
