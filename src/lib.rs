//! HTTP Signatures (draft-cavage-http-signatures-12): canonicalization,
//! strict parameter parsing, HMAC sign/verify, body digests, and a key
//! manager that resolves an incoming `keyId` to a concrete key.
//!
//! This crate has no opinion on which HTTP framework a caller uses; the
//! only seam is [`HttpMessageAdapter`], a small trait implemented once per
//! framework. Everything else — canonical-string construction, parameter
//! parsing, MAC computation, option merging — is framework-agnostic.
//!
//! ```no_run
//! use httpsig::{KeyConfig, KeyManager, MacAlgorithm, SignatureOptions, SignatureScheme};
//!
//! # async fn example(ctx: &httpsig::MessageContext<'_, impl httpsig::HttpMessageAdapter>) -> Result<(), httpsig::Error> {
//! let manager = KeyManager::from_key(
//!     httpsig::SUPPORTED_VERSION,
//!     "my-key",
//!     KeyConfig::Secret {
//!         mac_algorithm: MacAlgorithm::HmacSha256,
//!         key_material: b"shared secret".to_vec(),
//!     },
//!     SignatureOptions::default(),
//! )?;
//!
//! let signature_header = manager.sign_request("my-key", SignatureScheme::HmacSha256, ctx).await?;
//! manager.verify_request(ctx, None).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod context;
mod error;
mod key;
mod manager;
mod parser;

pub use config::{
    DigestAlgorithm, EcdsaEncoding, HeaderMap, HeaderUsage, KeyConfig, KeypairAlgorithm,
    KeypairParams, MacAlgorithm, RsaPadding, RsaParams, SignatureOptions,
    SignatureOptionsOverride, SignatureScheme, SUPPORTED_VERSION,
};
pub use context::{HttpMessageAdapter, MessageContext, RequestTarget, TimestampOptions};
pub use error::{ConfigurationError, Error, VerificationError};
pub use key::{SignatureKey, CREATED_SLACK_MS, EXPIRES_SLACK_MS};
pub use manager::KeyManager;
pub use parser::{parse as parse_signature_header, ParsedSignature};
