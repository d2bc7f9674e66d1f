//! Closed enumerations and the per-key/per-manager option records.
//!
//! Everything here is pure data plus the option-merging rule; the crypto
//! lives in [`crate::key`].

use std::collections::BTreeMap;

use crate::error::ConfigurationError;

/// The wire version this engine implements. Construction fails unless the
/// caller asks for exactly this string.
pub const SUPPORTED_VERSION: &str = "draft-cavage-http-signatures-12";

/// Validates the `version` construction option against
/// [`SUPPORTED_VERSION`].
pub(crate) fn check_version(version: &str) -> Result<(), ConfigurationError> {
    if version != SUPPORTED_VERSION {
        return Err(crate::error::config_err(format!(
            "unsupported version '{version}', this engine implements '{SUPPORTED_VERSION}'"
        )));
    }
    Ok(())
}

/// Digest algorithm used for the `Digest` header and, for `hs2019` keys,
/// bound into the signing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    /// Wire name as it appears in a `Digest` header, e.g. `SHA-256`.
    pub fn wire_name(self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Parses a wire name case-insensitively, as required when matching the
    /// algorithm token of an incoming `Digest` header.
    pub fn parse_wire_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("SHA-256") {
            Some(DigestAlgorithm::Sha256)
        } else if name.eq_ignore_ascii_case("SHA-512") {
            Some(DigestAlgorithm::Sha512)
        } else {
            None
        }
    }
}

/// MAC algorithm carried by a symmetric-secret key configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacAlgorithm {
    HmacSha256,
    HmacSha512,
}

impl MacAlgorithm {
    /// Wire name as it appears in the `algorithm` signature parameter.
    pub fn wire_name(self) -> &'static str {
        match self {
            MacAlgorithm::HmacSha256 => "hmac-sha256",
            MacAlgorithm::HmacSha512 => "hmac-sha512",
        }
    }

    /// The digest algorithm implied when this MAC is used for an `hs2019`
    /// body digest (SHA-256 under HMAC-SHA256, SHA-512 under HMAC-SHA512).
    pub fn digest_algorithm(self) -> DigestAlgorithm {
        match self {
            MacAlgorithm::HmacSha256 => DigestAlgorithm::Sha256,
            MacAlgorithm::HmacSha512 => DigestAlgorithm::Sha512,
        }
    }
}

/// Keypair family reserved for future asymmetric support. The engine never
/// dispatches signing or verification to these; a key manager configured
/// with one of the pinned asymmetric schemes raises a [`ConfigurationError`]
/// before any key is constructed (see [`crate::manager`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeypairAlgorithm {
    Rsa,
    Ecdsa,
}

/// The `algorithm` parameter's closed value set. `Hs2019` leaves the
/// concrete primitive free (determined by the resolved key); the others pin
/// it, and the engine rejects a signature whose declared scheme disagrees
/// with the resolved key's actual primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureScheme {
    Hs2019,
    HmacSha256,
    RsaSha256,
    EcdsaSha256,
}

impl SignatureScheme {
    pub fn wire_name(self) -> &'static str {
        match self {
            SignatureScheme::Hs2019 => "hs2019",
            SignatureScheme::HmacSha256 => "hmac-sha256",
            SignatureScheme::RsaSha256 => "rsa-sha256",
            SignatureScheme::EcdsaSha256 => "ecdsa-sha256",
        }
    }

    /// Parses the `algorithm` parameter value. Returns `None` for anything
    /// outside the closed set, which the parser turns into a hard error.
    pub fn parse_wire_name(name: &str) -> Option<Self> {
        match name {
            "hs2019" => Some(SignatureScheme::Hs2019),
            "hmac-sha256" => Some(SignatureScheme::HmacSha256),
            "rsa-sha256" => Some(SignatureScheme::RsaSha256),
            "ecdsa-sha256" => Some(SignatureScheme::EcdsaSha256),
            _ => None,
        }
    }
}

/// RSA-specific parameters carried by a keypair key configuration. Reserved
/// for when asymmetric signing ships; never read by the current engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaParams {
    pub padding: RsaPadding,
    /// Salt length in bytes, only meaningful under PSS padding.
    pub salt_length: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaPadding {
    Pkcs1v15,
    Pss,
}

/// ECDSA-specific parameters carried by a keypair key configuration.
/// Reserved, as with [`RsaParams`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcdsaEncoding {
    /// IEEE P1363 fixed-width `r || s`.
    P1363,
    /// ASN.1 DER `SEQUENCE { r, s }`.
    Der,
}

/// Scheme-specific parameters for a keypair key configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeypairParams {
    Rsa(RsaParams),
    Ecdsa { encoding: EcdsaEncoding },
}

/// A resolved key's concrete material and algorithm choice. This is the
/// tagged variant: a symmetric secret,
/// or a keypair (reserved, never dispatched to).
#[derive(Clone)]
pub enum KeyConfig {
    /// Symmetric-secret form: a MAC algorithm plus opaque key material.
    Secret {
        mac_algorithm: MacAlgorithm,
        key_material: Vec<u8>,
    },
    /// Keypair form, reserved. `private_key` is `None` for verification-only
    /// keys; signing with such a key is a [`ConfigurationError`].
    KeyPair {
        algorithm: KeypairAlgorithm,
        hash_name: String,
        public_key: Vec<u8>,
        private_key: Option<Vec<u8>>,
        params: KeypairParams,
    },
}

impl std::fmt::Debug for KeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyConfig::Secret { mac_algorithm, .. } => f
                .debug_struct("KeyConfig::Secret")
                .field("mac_algorithm", mac_algorithm)
                .field("key_material", &"<redacted>")
                .finish(),
            KeyConfig::KeyPair {
                algorithm,
                hash_name,
                private_key,
                ..
            } => f
                .debug_struct("KeyConfig::KeyPair")
                .field("algorithm", algorithm)
                .field("hash_name", hash_name)
                .field("has_private_key", &private_key.is_some())
                .finish(),
        }
    }
}

/// How a header participates in signing/verification for one direction
/// (request or response).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderUsage {
    /// Included when signing, not required when verifying.
    Sign,
    /// Required when verifying, not added when signing.
    Verify,
    /// Both: included when signing, required when verifying.
    Both,
}

impl HeaderUsage {
    fn includes_in_signing(self) -> bool {
        matches!(self, HeaderUsage::Sign | HeaderUsage::Both)
    }

    fn required_for_verification(self) -> bool {
        matches!(self, HeaderUsage::Verify | HeaderUsage::Both)
    }
}

/// Header name -> usage mapping for one message direction.
pub type HeaderMap = BTreeMap<String, HeaderUsage>;

/// Returns the header names that should be included when signing, in the
/// iteration order of `map` (a `BTreeMap`, so alphabetical by header name;
/// callers that care about a specific wire order build the final header
/// list themselves, as [`crate::key::SignatureKey`] does by always leading
/// with `(request-target)`/`(created)`/`(expires)` pseudo-headers).
pub(crate) fn headers_to_sign(map: &HeaderMap) -> Vec<String> {
    map.iter()
        .filter(|(_, usage)| usage.includes_in_signing())
        .map(|(name, _)| name.clone())
        .collect()
}

/// Returns the header names required to be present in an incoming
/// signature's declared header set.
pub(crate) fn headers_required_for_verification(map: &HeaderMap) -> Vec<String> {
    map.iter()
        .filter(|(_, usage)| usage.required_for_verification())
        .map(|(name, _)| name.clone())
        .collect()
}

/// The merged option record a [`crate::key::SignatureKey`] actually uses.
#[derive(Debug, Clone)]
pub struct SignatureOptions {
    pub request_headers: HeaderMap,
    pub response_headers: HeaderMap,
    pub calculate_digest: bool,
}

impl Default for SignatureOptions {
    fn default() -> Self {
        let mut request_headers = HeaderMap::new();
        request_headers.insert("(request-target)".to_owned(), HeaderUsage::Both);
        request_headers.insert("host".to_owned(), HeaderUsage::Both);
        SignatureOptions {
            request_headers,
            response_headers: HeaderMap::new(),
            calculate_digest: true,
        }
    }
}

/// Caller-supplied overrides, each field optional; `None` means "use the
/// base/default value" when merged via [`merge_options`].
#[derive(Debug, Clone, Default)]
pub struct SignatureOptionsOverride {
    pub request_headers: Option<HeaderMap>,
    pub response_headers: Option<HeaderMap>,
    pub calculate_digest: Option<bool>,
}

/// Explicit `merge(base, override)`, enumerating the known options by name
/// rather than walking fields reflectively — the option set is closed and
/// small, so there is nothing a reflective walk would buy here.
///
/// Returns a [`ConfigurationError`] only if a future caller adds a
/// non-defaultable option and leaves it unset in both `base` and
/// `override_` (today every field in [`SignatureOptions`] has a default, so
/// this never actually fails, but the call sites are written to propagate
/// the error rather than unwrap it).
pub(crate) fn merge_options(
    base: &SignatureOptions,
    override_: &SignatureOptionsOverride,
) -> Result<SignatureOptions, ConfigurationError> {
    let request_headers = override_
        .request_headers
        .clone()
        .unwrap_or_else(|| base.request_headers.clone());
    let response_headers = override_
        .response_headers
        .clone()
        .unwrap_or_else(|| base.response_headers.clone());
    let calculate_digest = override_.calculate_digest.unwrap_or(base.calculate_digest);

    Ok(SignatureOptions {
        request_headers,
        response_headers,
        calculate_digest,
    })
}
