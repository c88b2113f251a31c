//! Return-Path Codec
//!
//! Encodes the post-login destination into the opaque `state` token that
//! rides through the provider's OAuth redirect, and decodes it back on the
//! callback page.
//!
//! ## Token format
//!
//! The token is URL-safe base64 (no padding) over a small JSON payload:
//!
//! ```text
//! { "returnTo": "/insights", "issuedAt": 1735689600000 }
//! ```
//!
//! `returnTo` is an app-internal path; `issuedAt` is a UTC millisecond
//! timestamp recorded at sign-in time. The token crosses a third-party
//! redirect and must be assumed hostile on the way back: decoding never
//! panics and never surfaces an error, it degrades to "no return path".

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AuthError, Result};

/// An app-internal path a signed-in user should land on.
///
/// Always absolute within the app (begins with `/`). Anything else,
/// including full URLs, fails to parse, which keeps provider-supplied
/// redirect destinations inside the app.
///
/// # Examples
///
/// ```
/// use core_session::ReturnPath;
///
/// assert!(ReturnPath::parse("/insights").is_some());
/// assert!(ReturnPath::parse("insights").is_none());
/// assert!(ReturnPath::parse("https://evil.example/").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnPath(String);

impl ReturnPath {
    /// Parse a candidate path, accepting only paths that begin with `/`.
    pub fn parse(candidate: &str) -> Option<Self> {
        if candidate.starts_with('/') {
            Some(Self(candidate.to_string()))
        } else {
            None
        }
    }

    /// The app root, `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReturnPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload carried inside the opaque state token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct OAuthState {
    #[serde(rename = "returnTo")]
    return_to: String,
    /// UTC milliseconds at token creation.
    #[serde(rename = "issuedAt")]
    issued_at: i64,
}

/// Encode a return path into the opaque state token.
///
/// Infallible: the output is plain URL-safe base64 and needs no further
/// escaping when appended to a redirect URL.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use core_session::{decode_state, encode_state, ReturnPath};
///
/// let path = ReturnPath::parse("/insights").unwrap();
/// let token = encode_state(&path, Utc::now());
/// assert_eq!(decode_state(&token), Some(path));
/// ```
pub fn encode_state(return_to: &ReturnPath, issued_at: DateTime<Utc>) -> String {
    let state = OAuthState {
        return_to: return_to.as_str().to_string(),
        issued_at: issued_at.timestamp_millis(),
    };
    // Two plain fields; serialization cannot fail.
    let json = serde_json::to_string(&state).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

/// Decode a state token back into a return path.
///
/// Never panics and never returns an error. Yields `None` when the token
/// is not valid base64, the payload is not the expected JSON shape,
/// `returnTo` is missing, or `returnTo` is not an app-internal path. The
/// caller falls back to its next destination source in every such case.
pub fn decode_state(token: &str) -> Option<ReturnPath> {
    match parse_state(token) {
        Ok(path) => Some(path),
        Err(error) => {
            tracing::debug!("Discarding OAuth state token: {error}");
            None
        }
    }
}

/// Parse a state token, keeping the failure reason.
fn parse_state(token: &str) -> Result<ReturnPath> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|e| AuthError::MalformedState(format!("invalid base64: {e}")))?;

    let state: OAuthState = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::MalformedState(format!("invalid payload: {e}")))?;

    ReturnPath::parse(&state.return_to).ok_or_else(|| {
        AuthError::MalformedState(format!(
            "returnTo {:?} is not an app-internal path",
            state.return_to
        ))
    })
}
