//! Trusted Agent Protocol (TAP) signing and verification engine.
//!
//! An agent signs each outbound HTTP request with
//! [RFC 9421 HTTP Message Signatures](https://www.rfc-editor.org/rfc/rfc9421.html);
//! the merchant verifies the signature before trusting the request.
//!
//! # Protocol Overview
//!
//! Every signed request carries two header fields:
//!
//! - **Signature-Input**: covered components and signature parameters, e.g.
//!   `sig1=("@method" "@target-uri");created=1700000000;expires=1700000300;keyid="k1";alg="ed25519";nonce="...";tag="agent-browser-auth"`
//! - **Signature**: the base64 signature bytes, e.g. `sig1=:MEUCIQ...:`
//!
//! A request body is covered only through its `Content-Digest` field, which
//! the caller computes (see [`compute_content_digest`]). The engine never reads
//! the body.
//!
//! # Key Components
//!
//! - [`canonicalize`]: builds the signature base from a request and parameters
//! - [`TapSigner`]: signs outbound requests with identities from a [`SignerRegistry`]
//! - [`TapVerifier`]: verifies inbound requests against a [`TrustRegistry`] and a
//!   [`ReplayCache`], producing a [`VerificationVerdict`]
//! - [`PrivateKey`] / [`PublicKey`]: closed set of algorithms
//!   (`ed25519`, `ecdsa-p256-sha256`, `rsa-pss-sha256`)
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use ed25519_dalek::SigningKey;
//! use tap_signature::tap::{
//!     CoveredComponents, HttpRequest, PrivateKey, ReplayCache, SignerConfig, SignerRegistry,
//!     SigningIdentity, TapSigner, TapVerifier, TrustRegistry, Validity, VerificationVerdict,
//!     VerifierConfig,
//! };
//!
//! # fn example() -> tap_signature::error::Result<()> {
//! let key = PrivateKey::Ed25519(SigningKey::from_bytes(&[7u8; 32]));
//! let identity = SigningIdentity::new("agent-key-1", key, Validity::unbounded())?;
//!
//! let trust = Arc::new(TrustRegistry::new());
//! trust.register(identity.verifying_identity())?;
//!
//! let signers = Arc::new(SignerRegistry::new());
//! signers.register(identity)?;
//!
//! let signer = TapSigner::new(Arc::clone(&signers), SignerConfig::default())?;
//! let verifier =
//!     TapVerifier::new(trust, Arc::new(ReplayCache::new()), VerifierConfig::default())?;
//!
//! let request = HttpRequest::new("GET", "https://merchant.example.com/api/products")?;
//! let now = 1_700_000_000;
//! let signed =
//!     signer.sign(&request, "agent-key-1", &CoveredComponents::method_and_target(), now)?;
//!
//! assert_eq!(verifier.verify(&signed, now + 1), VerificationVerdict::Valid);
//! assert_eq!(verifier.verify(&signed, now + 2), VerificationVerdict::Replayed);
//! # Ok(())
//! # }
//! ```
//!
//! # Security Considerations
//!
//! - **Short lifetimes**: signatures expire after 5 minutes by default and never
//!   live longer than 8 minutes
//! - **Replay prevention**: nonces come from the OS entropy source; the verifier
//!   records `(keyid, nonce)` only after the signature checks out
//! - **Parameter binding**: the `@signature-params` line is part of the signed
//!   bytes, so changing `created`, `expires`, `keyid`, `nonce` or the component
//!   order invalidates the signature
//! - **No oracle**: report [`VerificationVerdict::public_message`] to clients, keep
//!   the specific verdict for logs

mod canonical;
mod components;
mod identity;
pub mod jwk;
mod keys;
mod params;
mod registry;
mod replay;
mod request;
pub mod signer;
pub mod verifier;

#[cfg(test)]
mod tests;

use std::time::{SystemTime, UNIX_EPOCH};

pub use canonical::{SignatureBase, canonicalize};
pub use components::{Component, CoveredComponents};
pub use keys::{Algorithm, PrivateKey, PublicKey};
pub use params::{InteractionType, SignatureInput, SignatureParameters, parse_signature_header};
pub use identity::{Identity, SigningIdentity, Validity, VerifyingIdentity};
pub use registry::{KeyRegistry, SignerRegistry, TrustRegistry};
pub use replay::{ReplayCache, ReplayRecord};
pub use request::{
    CONTENT_DIGEST_HEADER, DigestAlgorithm, HttpRequest, SIGNATURE_HEADER,
    SIGNATURE_INPUT_HEADER, compute_content_digest, compute_content_digest_with,
    verify_content_digest,
};
pub use signer::{NonceSource, OsNonceSource, SignedRequest, SignerConfig, TapSigner};
pub use verifier::{TapVerifier, VerificationOutcome, VerificationVerdict, VerifierConfig};

use crate::error::{Result, TapError};

/// Default signature lifetime in seconds (`expires - created`).
pub const DEFAULT_SIGNATURE_LIFETIME_SECS: u64 = 300;

/// Upper bound on any signature lifetime in seconds (8 minutes).
pub const TAP_MAX_VALIDITY_WINDOW_SECS: u64 = 480;

/// Default signature label used in `Signature-Input` and `Signature`.
pub const DEFAULT_SIGNATURE_LABEL: &str = "sig1";

/// Returns the current Unix time in seconds.
///
/// # Errors
///
/// Returns [`TapError::ClockError`] if the system clock is before the epoch.
pub fn unix_now() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| TapError::ClockError(format!("system time error: {e}")))
}
