//! Strict reader (and its near-inverse formatter) for the `Signature`
//! header's parameter list.
//!
//! The grammar is deliberately stricter than a casual `key=value` splitter:
//! every deviation from the IETF grammar is a hard
//! [`VerificationError`], never a best-effort recovery. See the `tests`
//! module and `tests/parser_strictness.rs` for the exhaustive rejection
//! list.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::config::SignatureScheme;
use crate::error::{verify_err, VerificationError};

/// A validated `Signature` header, parsed and ready for canonicalization
/// and MAC verification. Every field already satisfies the invariants
/// checked on construction: `signature` is non-empty,
/// `headers` has at least one entry, and no parameter name repeats.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSignature {
    pub key_id: String,
    pub signature: Vec<u8>,
    pub headers: Vec<String>,
    pub algorithm: Option<SignatureScheme>,
    /// Seconds since epoch, stored exactly as given so formatting is lossless.
    pub created: Option<i64>,
    /// Seconds since epoch, may carry a fractional part.
    pub expires: Option<f64>,
}

impl ParsedSignature {
    /// `created`, converted to milliseconds since epoch.
    pub fn created_ms(&self) -> Option<i64> {
        self.created.map(|s| s * 1000)
    }

    /// `expires`, converted to milliseconds since epoch.
    pub fn expires_ms(&self) -> Option<f64> {
        self.expires.map(|s| s * 1000.0)
    }

    /// Renders this record back into the wire parameter string, in the
    /// fixed order `keyId, algorithm, created, expires, headers, signature`
    /// (omitting absent optional fields). Designed as the parser's near
    /// left-inverse: `parse(format(parse(s))) == parse(s)` for any `s` that
    /// parses successfully (Testable Property 5).
    pub fn format(&self) -> String {
        let mut out = format!(r#"keyId="{}""#, self.key_id);
        if let Some(algorithm) = self.algorithm {
            out.push_str(&format!(r#",algorithm="{}""#, algorithm.wire_name()));
        }
        if let Some(created) = self.created {
            out.push_str(&format!(",created={}", created));
        }
        if let Some(expires) = self.expires {
            out.push_str(&format!(",expires={}", format_expires_value(expires)));
        }
        out.push_str(&format!(r#",headers="{}""#, self.headers.join(" ")));
        out.push_str(&format!(r#",signature="{}""#, BASE64.encode(&self.signature)));
        out
    }
}

pub(crate) fn format_expires_value(expires: f64) -> String {
    if expires.fract() == 0.0 {
        format!("{}", expires as i64)
    } else {
        // Trim trailing zeros but keep at least one fractional digit.
        let s = format!("{}", expires);
        s
    }
}

/// Parses the value of a `Signature` header (or the portion of an
/// `Authorization` header following `Signature `).
pub fn parse(input: &str) -> Result<ParsedSignature, VerificationError> {
    let mut key_id: Option<String> = None;
    let mut signature: Option<Vec<u8>> = None;
    let mut headers: Option<Vec<String>> = None;
    let mut algorithm: Option<SignatureScheme> = None;
    let mut created: Option<i64> = None;
    let mut expires: Option<f64> = None;
    let mut seen_params: Vec<&str> = Vec::new();

    if input.is_empty() {
        return Err(verify_err("empty signature header"));
    }

    for (index, part) in input.split(',').enumerate() {
        if part.is_empty() {
            return Err(verify_err(
                "empty parameter in signature header (leading, trailing, or doubled comma)",
            ));
        }
        if index > 0 && part.starts_with(' ') {
            return Err(verify_err("whitespace after comma in signature header"));
        }

        let eq_index = part
            .find('=')
            .ok_or_else(|| verify_err(format!("malformed signature parameter '{part}'")))?;
        let name = &part[..eq_index];
        let raw_value = &part[eq_index + 1..];

        if name.is_empty() || name.chars().any(|c| c.is_whitespace()) {
            return Err(verify_err(format!("invalid parameter name '{name}'")));
        }
        if seen_params.contains(&name) {
            return Err(verify_err(format!("duplicate parameter '{name}'")));
        }
        seen_params.push(name);

        match name {
            "keyId" => key_id = Some(parse_quoted_string(raw_value)?),
            "algorithm" => {
                let value = parse_quoted_string(raw_value)?;
                algorithm = Some(
                    SignatureScheme::parse_wire_name(&value)
                        .ok_or_else(|| verify_err(format!("unsupported algorithm '{value}'")))?,
                );
            }
            "headers" => {
                let value = parse_quoted_string(raw_value)?;
                headers = Some(parse_headers_value(&value)?);
            }
            "signature" => {
                let value = parse_quoted_string(raw_value)?;
                signature = Some(parse_signature_value(&value)?);
            }
            "created" => created = Some(parse_created_value(raw_value)?),
            "expires" => expires = Some(parse_expires_value(raw_value)?),
            _ => {
                // Unknown parameters are silently ignored.
            }
        }
    }

    let key_id = key_id.ok_or_else(|| verify_err("keyId parameter is missing"))?;
    let signature = signature.ok_or_else(|| verify_err("signature parameter is missing"))?;
    let headers = headers.unwrap_or_else(|| vec!["(created)".to_owned()]);

    Ok(ParsedSignature {
        key_id,
        signature,
        headers,
        algorithm,
        created,
        expires,
    })
}

fn parse_quoted_string(raw: &str) -> Result<String, VerificationError> {
    if raw.len() < 2 || !raw.starts_with('"') || !raw.ends_with('"') {
        return Err(verify_err(format!("value '{raw}' is not a quoted string")));
    }
    Ok(raw[1..raw.len() - 1].to_owned())
}

fn parse_headers_value(value: &str) -> Result<Vec<String>, VerificationError> {
    if value.is_empty() {
        return Err(verify_err("headers parameter is empty"));
    }
    for c in value.chars() {
        if c == '\t' || c == '\u{B}' || c == '\u{C}' || c == '\u{A0}' {
            return Err(verify_err(
                "headers parameter contains a disallowed whitespace character",
            ));
        }
    }
    if value.starts_with(' ') || value.ends_with(' ') || value.contains("  ") {
        return Err(verify_err(
            "headers parameter has leading, trailing, or consecutive spaces",
        ));
    }
    Ok(value.split(' ').map(str::to_owned).collect())
}

fn parse_signature_value(value: &str) -> Result<Vec<u8>, VerificationError> {
    let decoded = BASE64
        .decode(value)
        .map_err(|e| verify_err(format!("invalid base64 in signature parameter: {e}")))?;
    let unpadded_len = value.trim_end_matches('=').len();
    if (unpadded_len * 3) / 4 != decoded.len() || decoded.is_empty() {
        return Err(verify_err("signature parameter decodes to invalid length"));
    }
    Ok(decoded)
}

fn parse_created_value(raw: &str) -> Result<i64, VerificationError> {
    if raw.starts_with('"') {
        return Err(verify_err("created must be a bare integer, not a quoted string"));
    }
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(verify_err(format!("invalid created value '{raw}'")));
    }
    if raw.len() > 1 && raw.starts_with('0') {
        return Err(verify_err("created must not have a leading zero"));
    }
    raw.parse::<i64>()
        .map_err(|_| verify_err(format!("created value '{raw}' out of range")))
}

fn parse_expires_value(raw: &str) -> Result<f64, VerificationError> {
    if raw.starts_with('"') {
        return Err(verify_err("expires must be a bare decimal, not a quoted string"));
    }
    if raw.is_empty() {
        return Err(verify_err("expires value is empty"));
    }
    if raw.starts_with('.') || raw.ends_with('.') {
        return Err(verify_err(
            "expires must not have a leading or trailing decimal point",
        ));
    }
    let dot_count = raw.matches('.').count();
    if dot_count > 1 {
        return Err(verify_err("expires must have at most one decimal point"));
    }
    let integer_part = raw.split('.').next().unwrap_or("");
    if integer_part.is_empty() || !integer_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(verify_err(format!("invalid expires value '{raw}'")));
    }
    if integer_part.len() > 1 && integer_part.starts_with('0') {
        return Err(verify_err("expires must not have a leading zero"));
    }
    if dot_count == 1 {
        let fractional_part = raw.split('.').nth(1).unwrap_or("");
        if fractional_part.is_empty() || !fractional_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(verify_err(format!("invalid expires value '{raw}'")));
        }
    }
    raw.parse::<f64>()
        .map_err(|_| verify_err(format!("expires value '{raw}' out of range")))
}
