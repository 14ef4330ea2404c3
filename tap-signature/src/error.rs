//! Error types for TAP signing, key handling and configuration.
//!
//! Signer-side and infrastructure failures are reported as [`TapError`].
//! Verification never returns an error: it always produces exactly one
//! [`VerificationVerdict`](crate::tap::VerificationVerdict).
//!
//! # Error Categories
//!
//! - **Identity errors** ([`TapError::IdentityRevoked`], [`TapError::IdentityExpired`],
//!   [`TapError::IdentityNotYetValid`], [`TapError::UnknownKey`]): the requested signing
//!   identity cannot be used right now
//! - **Entropy errors** ([`TapError::NonceGeneration`]): the operating system RNG failed
//! - **Input errors** ([`TapError::MalformedInput`], [`TapError::InvalidParameters`]):
//!   the request or the signature parameters cannot be serialized
//! - **Key errors** ([`TapError::KeyError`], [`TapError::CryptoError`]): key material could
//!   not be decoded, encoded, generated or used
//! - **Configuration errors** ([`TapError::ConfigError`])
//!
//! # Examples
//!
//! ```
//! use tap_signature::error::{Result, TapError};
//!
//! fn require_https(url: &str) -> Result<()> {
//!     if !url.starts_with("https://") {
//!         return Err(TapError::MalformedInput(format!("not an https url: {url}")));
//!     }
//!     Ok(())
//! }
//!
//! assert!(require_https("http://merchant.example.com").is_err());
//! ```

use thiserror::Error;

/// Result type alias for TAP operations.
///
/// All fallible functions in this crate return this type.
pub type Result<T> = std::result::Result<T, TapError>;

/// Errors that can occur while signing requests or managing keys.
///
/// No error is retried internally. A caller that hits
/// [`IdentityExpired`](Self::IdentityExpired) on the signing side should rotate
/// keys; a caller whose request was rejected for freshness should re-sign with
/// a fresh timestamp and nonce, never resend the old envelope.
#[must_use = "errors should be handled, propagated, or explicitly panicked"]
#[derive(Debug, Error)]
pub enum TapError {
    /// The key identifier is not present in the registry.
    #[error("unknown key id: {0}")]
    UnknownKey(String),

    /// A key with the same identifier is already registered.
    #[error("key id already registered: {0}")]
    DuplicateKey(String),

    /// The identity has been revoked and must not produce signatures.
    ///
    /// # Recovery
    ///
    /// Sign with the identity that replaced it after rotation.
    #[error("signing identity {0} is revoked")]
    IdentityRevoked(String),

    /// The identity's validity window has not started yet.
    #[error("signing identity {key_id} is not valid before {not_before}")]
    IdentityNotYetValid {
        /// Key identifier of the identity.
        key_id: String,
        /// Unix timestamp at which the identity becomes valid.
        not_before: u64,
    },

    /// The identity's validity window has ended.
    #[error("signing identity {key_id} expired at {not_after}")]
    IdentityExpired {
        /// Key identifier of the identity.
        key_id: String,
        /// Unix timestamp after which the identity is unusable.
        not_after: u64,
    },

    /// The identity definition itself is inconsistent (e.g. `not_before > not_after`).
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// The system entropy source failed while generating a nonce.
    ///
    /// This is fatal for the signing call. There is no fallback to a weaker
    /// generator.
    #[error("nonce generation failed: {0}")]
    NonceGeneration(String),

    /// The request or the transmitted signature metadata is malformed.
    ///
    /// Raised when a covered component is missing from the request, when a
    /// method or header name is not a valid HTTP token, or when a
    /// `Signature-Input` / `Signature` field cannot be parsed.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Signature parameters violate policy (lifetime bounds, unsafe characters).
    #[error("invalid signature parameters: {0}")]
    InvalidParameters(String),

    /// Key material could not be decoded, encoded or generated.
    ///
    /// # Recovery
    ///
    /// Check that the PEM file contains a PKCS#8 private key or an SPKI public
    /// key for Ed25519, ECDSA P-256 or RSA.
    #[error("key error: {0}")]
    KeyError(String),

    /// A cryptographic primitive failed while producing a signature.
    #[error("cryptographic operation failed: {0}")]
    CryptoError(String),

    /// Configuration is missing, unreadable or out of bounds.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The system clock is before the Unix epoch.
    #[error("system clock error: {0}")]
    ClockError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = TapError::IdentityRevoked("agent-key-1".into());
        assert_eq!(error.to_string(), "signing identity agent-key-1 is revoked");
    }

    #[test]
    fn test_identity_window_errors() {
        let error = TapError::IdentityNotYetValid { key_id: "k1".to_owned(), not_before: 10 };
        assert_eq!(error.to_string(), "signing identity k1 is not valid before 10");

        let error = TapError::IdentityExpired { key_id: "k1".to_owned(), not_after: 20 };
        assert_eq!(error.to_string(), "signing identity k1 expired at 20");
    }

    #[test]
    fn test_malformed_input_error() {
        let error = TapError::MalformedInput("covered header `x-request-id` is missing".to_owned());
        assert!(error.to_string().starts_with("malformed input:"));
    }
}
