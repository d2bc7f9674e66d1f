//! The narrow adapter contract the engine consumes from an HTTP framework,
//! and the [`MessageContext`] built on top of it that produces the
//! canonical string fed to the MAC.
//!
//! Nothing in this module touches sockets or imports from an HTTP
//! framework; [`HttpMessageAdapter`] is the one seam a caller implements
//! over whatever request/response type their framework hands them.

use crate::error::{verify_err, VerificationError};

/// Method and path of a request, as needed to synthesize the
/// `(request-target)` pseudo-header. The path is copied verbatim,
/// including any query string the adapter supplies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    pub method: String,
    pub path: String,
}

/// The interface the engine consumes from a framework adapter: a
/// case-insensitive, multi-valued header accessor, and an optional request
/// target for requests. The engine never mutates the underlying message;
/// callers are responsible for writing the `Signature` (and `Digest`)
/// header strings the engine returns back onto their concrete request or
/// response object.
pub trait HttpMessageAdapter {
    /// Returns all values for `name`, matched case-insensitively, in
    /// arrival order. An empty header is not a valid result: adapters must
    /// return `None` rather than `Some(vec![])`.
    fn header_values(&self, name: &str) -> Option<Vec<String>>;

    /// `Some` for requests that carry a method and path; `None` for
    /// responses, which have no `(request-target)`.
    fn request_target(&self) -> Option<RequestTarget> {
        None
    }
}

/// Instance-scope timestamps used to synthesize the `(created)` and
/// `(expires)` pseudo-headers when signing. Verification reads these
/// values out of the already-parsed `Signature` header instead, so this is
/// only consulted on the signing path.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampOptions {
    pub created: Option<i64>,
    pub expires: Option<f64>,
}

/// An append-only view over one HTTP message, layering pseudo-header
/// resolution and canonical-string construction on top of an
/// [`HttpMessageAdapter`].
pub struct MessageContext<'a, A: HttpMessageAdapter> {
    adapter: &'a A,
    timestamps: TimestampOptions,
}

impl<'a, A: HttpMessageAdapter> MessageContext<'a, A> {
    pub fn new(adapter: &'a A) -> Self {
        MessageContext {
            adapter,
            timestamps: TimestampOptions::default(),
        }
    }

    pub fn with_timestamps(adapter: &'a A, timestamps: TimestampOptions) -> Self {
        MessageContext { adapter, timestamps }
    }

    /// The underlying adapter, so a caller that only has a `MessageContext`
    /// (e.g. [`crate::key::SignatureKey::verify_request`]) can build a second
    /// context over the same message with a different set of timestamps.
    pub fn adapter(&self) -> &'a A {
        self.adapter
    }

    pub fn timestamps(&self) -> TimestampOptions {
        self.timestamps
    }

    /// Builds the canonical string for an ordered list of (already
    /// lower-cased or not — this lower-cases internally) header names.
    pub fn canonical_string(&self, header_names: &[String]) -> Result<String, VerificationError> {
        let mut lines = Vec::with_capacity(header_names.len());
        for name in header_names {
            let lower = name.to_ascii_lowercase();
            let value = self.resolve_header(&lower)?;
            if value.is_empty() {
                lines.push(format!("{lower}:"));
            } else {
                lines.push(format!("{lower}: {value}"));
            }
        }
        Ok(lines.join("\n"))
    }

    fn resolve_header(&self, lower_name: &str) -> Result<String, VerificationError> {
        match lower_name {
            "(request-target)" => {
                let target = self.adapter.request_target().ok_or_else(|| {
                    verify_err("attempted to sign/verify missing header '(request-target)'")
                })?;
                Ok(format!(
                    "{} {}",
                    target.method.to_ascii_lowercase(),
                    target.path
                ))
            }
            "(created)" => self.timestamps.created.map(|c| c.to_string()).ok_or_else(|| {
                verify_err("attempted to sign/verify missing header '(created)'")
            }),
            "(expires)" => self
                .timestamps
                .expires
                .map(|e| crate::parser::format_expires_value(e))
                .ok_or_else(|| verify_err("attempted to sign/verify missing header '(expires)'")),
            other => {
                let values = self.adapter.header_values(other).ok_or_else(|| {
                    verify_err(format!("attempted to sign/verify missing header '{other}'"))
                })?;
                Ok(values.join(", "))
            }
        }
    }

    /// Retrieves the single signature candidate present on this message,
    /// inspecting both the `signature` header and any `authorization`
    /// header values that begin with `"Signature "`. Returns `Ok(None)` if
    /// no candidate is present, and a verification error if more than one
    /// is found (a local interpretation of an ambiguity the draft leaves
    /// unspecified; see the design notes).
    pub fn extract_signature_string(&self) -> Result<Option<String>, VerificationError> {
        let mut candidates = Vec::new();

        if let Some(values) = self.adapter.header_values("signature") {
            candidates.extend(values);
        }
        if let Some(values) = self.adapter.header_values("authorization") {
            for value in values {
                if let Some(rest) = value.strip_prefix("Signature ") {
                    candidates.push(rest.to_owned());
                }
            }
        }

        match candidates.len() {
            0 => Ok(None),
            1 => Ok(Some(candidates.into_iter().next().unwrap())),
            _ => Err(verify_err("multiple signatures present on message")),
        }
    }
}
