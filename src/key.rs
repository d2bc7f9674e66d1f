//! The signature key: a concrete signing/verification primitive bound to a
//! resolved option record, plus the sign/verify entry points that build the
//! canonical string and drive the MAC.
//!
//! A [`SignatureKey`] is produced by [`crate::manager::KeyManager`]; it is
//! stateless beyond its configuration, so callers may cache it freely and
//! use it from multiple threads without locking.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::{Digest as ShaDigest, Sha256, Sha512};
use subtle::ConstantTimeEq;

use crate::config::{
    self, DigestAlgorithm, HeaderMap as OptionHeaderMap, KeyConfig, KeypairAlgorithm,
    MacAlgorithm, SignatureOptions, SignatureScheme,
};
use crate::context::{HttpMessageAdapter, MessageContext, TimestampOptions};
use crate::error::{config_err, verify_err, ConfigurationError, Error, VerificationError};
use crate::parser::{self, ParsedSignature};

/// Tolerance for a `created` timestamp in the future, in milliseconds.
pub const CREATED_SLACK_MS: i64 = 60_000;

/// Tolerance for an `expires` timestamp in the past, in milliseconds.
pub const EXPIRES_SLACK_MS: i64 = 60_000;

const DIGEST_HEADER_NAME: &str = "digest";

enum KeyVariant {
    Hmac {
        mac_algorithm: MacAlgorithm,
        key_material: Vec<u8>,
    },
    /// Reserved for future asymmetric support; see module docs on
    /// [`crate::config::KeyConfig::KeyPair`]. The engine never dispatches
    /// signing or verification to this variant.
    KeyPair {
        #[allow(dead_code)]
        algorithm: KeypairAlgorithm,
        has_private_key: bool,
    },
}

impl KeyVariant {
    fn from_config(config: &KeyConfig) -> Result<Self, ConfigurationError> {
        match config {
            KeyConfig::Secret {
                mac_algorithm,
                key_material,
            } => Ok(KeyVariant::Hmac {
                mac_algorithm: *mac_algorithm,
                key_material: key_material.clone(),
            }),
            KeyConfig::KeyPair {
                algorithm,
                hash_name,
                private_key,
                ..
            } => {
                const SUPPORTED_HASHES: &[&str] = &["sha256", "sha384", "sha512"];
                if !SUPPORTED_HASHES.contains(&hash_name.to_ascii_lowercase().as_str()) {
                    return Err(config_err(format!(
                        "unsupported hash '{hash_name}' for keypair key configuration"
                    )));
                }
                Ok(KeyVariant::KeyPair {
                    algorithm: *algorithm,
                    has_private_key: private_key.is_some(),
                })
            }
        }
    }

    fn mac(&self, buf: &[u8]) -> Result<Vec<u8>, ConfigurationError> {
        match self {
            KeyVariant::Hmac {
                mac_algorithm,
                key_material,
            } => Ok(compute_hmac(*mac_algorithm, key_material, buf)),
            KeyVariant::KeyPair { has_private_key, .. } => {
                if !has_private_key {
                    return Err(config_err(
                        "key has no private key configured; cannot sign",
                    ));
                }
                Err(config_err("key pair algorithms are not yet supported"))
            }
        }
    }

    fn verify_mac(&self, buf: &[u8], mac: &[u8]) -> Result<bool, ConfigurationError> {
        match self {
            KeyVariant::Hmac {
                mac_algorithm,
                key_material,
            } => Ok(verify_hmac(*mac_algorithm, key_material, buf, mac)),
            KeyVariant::KeyPair { .. } => {
                Err(config_err("key pair algorithms are not yet supported"))
            }
        }
    }
}

fn compute_hmac(algorithm: MacAlgorithm, key: &[u8], buf: &[u8]) -> Vec<u8> {
    match algorithm {
        MacAlgorithm::HmacSha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(key)
                .expect("HMAC can be constructed with a key of any length");
            mac.update(buf);
            mac.finalize().into_bytes().to_vec()
        }
        MacAlgorithm::HmacSha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(key)
                .expect("HMAC can be constructed with a key of any length");
            mac.update(buf);
            mac.finalize().into_bytes().to_vec()
        }
    }
}

/// Constant-time in the equal-length case; a length mismatch is reported as
/// `false` rather than panicking or leaking timing on the compared bytes.
fn verify_hmac(algorithm: MacAlgorithm, key: &[u8], buf: &[u8], candidate_mac: &[u8]) -> bool {
    match algorithm {
        MacAlgorithm::HmacSha256 => match Hmac::<Sha256>::new_from_slice(key) {
            Ok(mut mac) => {
                mac.update(buf);
                mac.verify_slice(candidate_mac).is_ok()
            }
            Err(_) => false,
        },
        MacAlgorithm::HmacSha512 => match Hmac::<Sha512>::new_from_slice(key) {
            Ok(mut mac) => {
                mac.update(buf);
                mac.verify_slice(candidate_mac).is_ok()
            }
            Err(_) => false,
        },
    }
}

/// A resolved signature key: identifier, merged option record, scheme, and
/// the concrete signing primitive. Produced by
/// [`crate::manager::KeyManager::get_key`] / `try_get_key`.
pub struct SignatureKey {
    key_id: String,
    options: SignatureOptions,
    scheme: SignatureScheme,
    digest_algorithm: DigestAlgorithm,
    variant: KeyVariant,
}

impl SignatureKey {
    pub(crate) fn new(
        key_id: String,
        config: &KeyConfig,
        options: SignatureOptions,
        scheme: SignatureScheme,
        digest_algorithm: DigestAlgorithm,
    ) -> Result<Self, ConfigurationError> {
        let variant = KeyVariant::from_config(config)?;
        Ok(SignatureKey {
            key_id,
            options,
            scheme,
            digest_algorithm,
            variant,
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn options(&self) -> &SignatureOptions {
        &self.options
    }

    /// `"{digestAlgName}={base64(hash(body))}"`.
    pub fn create_digest_header(&self, body: &[u8]) -> String {
        let digest = hash_body(self.digest_algorithm, body);
        format!("{}={}", self.digest_algorithm.wire_name(), BASE64.encode(digest))
    }

    /// Splits `header` on the first `=` only, compares the algorithm token
    /// case-insensitively against this key's configured digest algorithm,
    /// recomputes the digest over `body`, and compares in constant time.
    /// Any mismatch — algorithm token, malformed header, or digest value —
    /// is a [`VerificationError`]; there is no silent-`false` path.
    pub fn verify_digest_header(&self, body: &[u8], header: &str) -> Result<(), VerificationError> {
        let (alg_token, digest_b64) = header
            .split_once('=')
            .ok_or_else(|| verify_err(format!("malformed digest header '{header}'")))?;

        let declared = config::DigestAlgorithm::parse_wire_name(alg_token)
            .ok_or_else(|| verify_err(format!("unsupported digest algorithm '{alg_token}'")))?;
        if declared != self.digest_algorithm {
            return Err(verify_err(format!(
                "digest algorithm mismatch: header declares '{alg_token}', key expects '{}'",
                self.digest_algorithm.wire_name()
            )));
        }

        let candidate = BASE64
            .decode(digest_b64)
            .map_err(|e| verify_err(format!("invalid base64 in digest header: {e}")))?;
        let expected = hash_body(self.digest_algorithm, body);

        if expected.ct_eq(&candidate).unwrap_u8() != 1 {
            return Err(verify_err("digest mismatch"));
        }
        Ok(())
    }

    /// Builds the `Signature` header value for an outbound request: the
    /// header list from the merged options (adding `digest` when
    /// `calculateDigest` is on and it is not already present), the
    /// canonical string, the MAC, and the formatted parameter string.
    pub fn sign_request<A: HttpMessageAdapter>(
        &self,
        ctx: &MessageContext<'_, A>,
    ) -> Result<String, Error> {
        self.sign(ctx, &self.options.request_headers)
    }

    /// As [`Self::sign_request`], but for the response-direction option set.
    pub fn sign_response<A: HttpMessageAdapter>(
        &self,
        ctx: &MessageContext<'_, A>,
    ) -> Result<String, Error> {
        self.sign(ctx, &self.options.response_headers)
    }

    fn sign<A: HttpMessageAdapter>(
        &self,
        ctx: &MessageContext<'_, A>,
        header_map: &OptionHeaderMap,
    ) -> Result<String, Error> {
        let mut headers = config::headers_to_sign(header_map);
        if self.options.calculate_digest && !headers.iter().any(|h| h.eq_ignore_ascii_case(DIGEST_HEADER_NAME)) {
            headers.push(DIGEST_HEADER_NAME.to_owned());
        }

        let canonical = ctx.canonical_string(&headers)?;
        let mac = self.variant.mac(canonical.as_bytes())?;
        let signature = BASE64.encode(mac);

        let timestamps = ctx.timestamps();
        let mut out = format!(
            r#"keyId="{}",algorithm="{}""#,
            self.key_id,
            self.scheme.wire_name(),
        );
        if let Some(created) = timestamps.created {
            out.push_str(&format!(",created={created}"));
        }
        if let Some(expires) = timestamps.expires {
            out.push_str(&format!(",expires={}", parser::format_expires_value(expires)));
        }
        out.push_str(&format!(
            r#",headers="{}",signature="{}""#,
            headers.join(" "),
            signature,
        ));
        Ok(out)
    }

    /// Verifies the signature present on an incoming request against the
    /// request-direction option set.
    pub fn verify_request<A: HttpMessageAdapter>(
        &self,
        ctx: &MessageContext<'_, A>,
        observed_at_ms: Option<i64>,
    ) -> Result<(), Error> {
        self.verify(ctx, &self.options.request_headers, observed_at_ms)
    }

    /// As [`Self::verify_request`], but for the response-direction option set.
    pub fn verify_response<A: HttpMessageAdapter>(
        &self,
        ctx: &MessageContext<'_, A>,
        observed_at_ms: Option<i64>,
    ) -> Result<(), Error> {
        self.verify(ctx, &self.options.response_headers, observed_at_ms)
    }

    fn verify<A: HttpMessageAdapter>(
        &self,
        ctx: &MessageContext<'_, A>,
        header_map: &OptionHeaderMap,
        observed_at_ms: Option<i64>,
    ) -> Result<(), Error> {
        let signature_string = ctx
            .extract_signature_string()?
            .ok_or_else(|| verify_err("no signature present on message"))?;
        let parsed = parser::parse(&signature_string)?;

        self.check_algorithm_agreement(&parsed)?;

        // The signed `(created)`/`(expires)` pseudo-headers, if any, must
        // canonicalize to the values the peer actually signed, not whatever
        // timestamps `ctx` happens to carry (verification is stateless on
        // that front; only the caller's clock for slack-window checks).
        let verify_ctx = MessageContext::with_timestamps(
            ctx.adapter(),
            TimestampOptions {
                created: parsed.created,
                expires: parsed.expires,
            },
        );
        let canonical = verify_ctx.canonical_string(&parsed.headers)?;
        let verified = self.variant.verify_mac(canonical.as_bytes(), &parsed.signature)?;
        if !verified {
            return Err(verify_err("signature does not match recomputed MAC").into());
        }

        self.check_required_headers(header_map, &parsed)?;

        let observed_at_ms = observed_at_ms.unwrap_or_else(now_ms);
        if !valid_creation(parsed.created_ms(), observed_at_ms) {
            return Err(verify_err("signature 'created' timestamp is too far in the future").into());
        }
        if !valid_expires(parsed.expires_ms(), observed_at_ms) {
            return Err(verify_err("signature has expired").into());
        }

        Ok(())
    }

    fn check_algorithm_agreement(&self, parsed: &ParsedSignature) -> Result<(), VerificationError> {
        if let Some(declared) = parsed.algorithm {
            if declared != self.scheme {
                return Err(verify_err(format!(
                    "algorithm mismatch: signature declares '{}', key is configured for '{}'",
                    declared.wire_name(),
                    self.scheme.wire_name()
                )));
            }
        }
        Ok(())
    }

    fn check_required_headers(
        &self,
        header_map: &OptionHeaderMap,
        parsed: &ParsedSignature,
    ) -> Result<(), VerificationError> {
        let mut required = config::headers_required_for_verification(header_map);
        if self.options.calculate_digest {
            required.push(DIGEST_HEADER_NAME.to_owned());
        }

        let signed: Vec<String> = parsed
            .headers
            .iter()
            .map(|h| h.to_ascii_lowercase())
            .collect();

        let missing: Vec<&str> = required
            .iter()
            .filter(|required_name| !signed.iter().any(|s| s == &required_name.to_ascii_lowercase()))
            .map(|s| s.as_str())
            .collect();

        if !missing.is_empty() {
            return Err(verify_err(format!(
                "required header(s) not signed: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

fn hash_body(algorithm: DigestAlgorithm, body: &[u8]) -> Vec<u8> {
    match algorithm {
        DigestAlgorithm::Sha256 => Sha256::digest(body).to_vec(),
        DigestAlgorithm::Sha512 => Sha512::digest(body).to_vec(),
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// `created - observedAt < CREATED_SLACK` when `created` is in the future;
/// vacuously valid when `created` is absent or not in the future.
pub fn valid_creation(created_ms: Option<i64>, observed_at_ms: i64) -> bool {
    match created_ms {
        None => true,
        Some(created) if created > observed_at_ms => created - observed_at_ms < CREATED_SLACK_MS,
        Some(_) => true,
    }
}

/// `observedAt - expires < EXPIRES_SLACK` when `expires` is in the past;
/// vacuously valid when `expires` is absent or not in the past.
pub fn valid_expires(expires_ms: Option<f64>, observed_at_ms: i64) -> bool {
    match expires_ms {
        None => true,
        Some(expires) if expires < observed_at_ms as f64 => {
            (observed_at_ms as f64 - expires) < EXPIRES_SLACK_MS as f64
        }
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_slack_window_boundary() {
        let observed_at_ms: i64 = 1_000_000_000_000;
        let created_s_valid = (observed_at_ms + CREATED_SLACK_MS) / 1000 - 1;
        let created_s_invalid = (observed_at_ms + CREATED_SLACK_MS) / 1000 + 1;

        assert!(valid_creation(Some(created_s_valid * 1000), observed_at_ms));
        assert!(!valid_creation(Some(created_s_invalid * 1000), observed_at_ms));
    }

    #[test]
    fn past_created_is_always_valid() {
        assert!(valid_creation(Some(0), 1_000_000_000_000));
    }

    #[test]
    fn future_expires_is_always_valid() {
        assert!(valid_expires(Some(2_000_000_000_000.0), 1_000_000_000_000));
    }

    #[test]
    fn absent_timestamps_are_vacuously_valid() {
        assert!(valid_creation(None, 0));
        assert!(valid_expires(None, 0));
    }

    #[test]
    fn digest_round_trip() {
        let config = KeyConfig::Secret {
            mac_algorithm: MacAlgorithm::HmacSha256,
            key_material: b"secret".to_vec(),
        };
        let key = SignatureKey::new(
            "test".to_owned(),
            &config,
            SignatureOptions::default(),
            SignatureScheme::HmacSha256,
            DigestAlgorithm::Sha256,
        )
        .unwrap();

        let body = br#"{"foo":"bar"}"#;
        let header = key.create_digest_header(body);
        assert!(header.starts_with("SHA-256="));
        assert!(key.verify_digest_header(body, &header).is_ok());
        assert!(key.verify_digest_header(b"tampered", &header).is_err());
    }

    #[test]
    fn keypair_sign_is_a_configuration_error() {
        let config = KeyConfig::KeyPair {
            algorithm: KeypairAlgorithm::Rsa,
            hash_name: "sha256".to_owned(),
            public_key: vec![1, 2, 3],
            private_key: Some(vec![4, 5, 6]),
            params: crate::config::KeypairParams::Rsa(crate::config::RsaParams {
                padding: crate::config::RsaPadding::Pkcs1v15,
                salt_length: None,
            }),
        };
        let key = SignatureKey::new(
            "test".to_owned(),
            &config,
            SignatureOptions::default(),
            SignatureScheme::Hs2019,
            DigestAlgorithm::Sha256,
        )
        .unwrap();
        let err = key.variant.mac(b"anything").unwrap_err();
        assert!(err.reason().contains("not yet supported"));
    }

    #[test]
    fn keypair_without_private_key_reports_missing_key() {
        let config = KeyConfig::KeyPair {
            algorithm: KeypairAlgorithm::Rsa,
            hash_name: "sha256".to_owned(),
            public_key: vec![1, 2, 3],
            private_key: None,
            params: crate::config::KeypairParams::Rsa(crate::config::RsaParams {
                padding: crate::config::RsaPadding::Pkcs1v15,
                salt_length: None,
            }),
        };
        let key = SignatureKey::new(
            "test".to_owned(),
            &config,
            SignatureOptions::default(),
            SignatureScheme::Hs2019,
            DigestAlgorithm::Sha256,
        )
        .unwrap();
        let err = key.variant.mac(b"anything").unwrap_err();
        assert!(err.reason().contains("no private key"));
    }
}
