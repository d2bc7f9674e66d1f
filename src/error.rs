//! The two failure kinds the engine ever raises.
//!
//! [`ConfigurationError`] means the caller (or the key configuration they
//! supplied) is structurally wrong; it is not recoverable at runtime.
//! [`VerificationError`] means a concrete message failed some part of the
//! signature check; it is the expected outcome when talking to a hostile or
//! buggy peer and carries no information beyond a human-readable reason.

/// Raised at construction time, or whenever a call discovers that its inputs
/// are structurally invalid (unsupported algorithm, missing private key,
/// unsupported wire version, ...). Indicates a programmer error upstream of
/// this crate.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ConfigurationError(pub(crate) String);

impl ConfigurationError {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        tracing::warn!(%reason, "httpsig configuration error");
        Self(reason)
    }

    /// The human-readable reason this error was raised.
    pub fn reason(&self) -> &str {
        &self.0
    }
}

/// Raised when a message fails any part of the signature check: absent
/// signature, malformed parameter string, bad base64, unsupported scheme,
/// key not found, algorithm disagreement, MAC mismatch, digest mismatch,
/// a required header missing from the signed set, or a `created`/`expires`
/// timestamp outside the slack window.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct VerificationError(pub(crate) String);

impl VerificationError {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        tracing::debug!(%reason, "httpsig verification error");
        Self(reason)
    }

    /// The human-readable reason this error was raised.
    pub fn reason(&self) -> &str {
        &self.0
    }
}

/// Either of the two failure kinds this crate raises. Adapters at the HTTP
/// framework boundary typically map [`Error::Verification`] to `403` and
/// [`Error::Configuration`] to `500`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
}

impl Error {
    /// `true` for [`Error::Verification`] — the outcome a conforming HTTP
    /// adapter should map to a `403`.
    pub fn is_verification(&self) -> bool {
        matches!(self, Error::Verification(_))
    }
}

// A couple of small helpers used throughout the crate; not part of the
// public contract, just to keep call sites terse.
pub(crate) fn config_err(reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::new(reason)
}

pub(crate) fn verify_err(reason: impl Into<String>) -> VerificationError {
    VerificationError::new(reason)
}
