//! TAP Signature: request signing and verification for AI shopping agents
//!
//! A Rust library implementing the signature layer of Visa's Trusted Agent
//! Protocol (TAP). An autonomous agent signs each outbound HTTP request; the
//! merchant verifies the signature before trusting the request's origin and
//! integrity.
//!
//! # What does it do?
//!
//! - **Cryptographic Authentication**: RFC 9421 HTTP Message Signatures with
//!   Ed25519, ECDSA P-256 or RSA-PSS
//! - **Freshness and Replay Defense**: short-lived signatures with a one-time
//!   nonce, tracked by a replay cache
//! - **Key Management**: signer and trust registries with revocation and
//!   graceful rotation
//! - **RFC Compliance**: RFC 9421 (HTTP Signatures), RFC 9530 (Content-Digest)
//!   and RFC 7638 (JWK Thumbprints)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                          ┌──────────────────────┐
//! │   AI Agent      │                          │   Merchant endpoint  │
//! │                 │                          │                      │
//! │  TapSigner ─────┼── HTTPS + Signature ────►│  TapVerifier         │
//! │   │             │   Signature-Input        │   │   │        │     │
//! │   ▼             │                          │   ▼   ▼        ▼     │
//! │ SignerRegistry  │                          │ Trust  Replay  Policy│
//! └─────────────────┘                          └──────────────────────┘
//! ```
//!
//! Both sides build the same signature base with [`tap::canonicalize`]. The
//! engine never inspects request bodies; cover them with a `Content-Digest`
//! header.
//!
//! # Quick Start
//!
//! ## 1. Sign an outbound request
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use tap_signature::tap::{
//!     Algorithm, HttpRequest, InteractionType, PrivateKey, SignerConfig, SignerRegistry,
//!     SigningIdentity, TapSigner, Validity,
//! };
//!
//! # fn main() -> tap_signature::error::Result<()> {
//! let key = PrivateKey::generate(Algorithm::Ed25519)?;
//! let registry = Arc::new(SignerRegistry::new());
//! registry.register(SigningIdentity::new("agent-key-1", key, Validity::unbounded())?)?;
//!
//! let signer = TapSigner::new(registry, SignerConfig::default())?;
//! let request = HttpRequest::new("POST", "https://merchant.example.com/checkout")?
//!     .with_content_digest(br#"{"cart_id":"c-42"}"#);
//!
//! let signed = signer.sign_for_interaction(
//!     &request,
//!     "agent-key-1",
//!     InteractionType::Checkout,
//!     1_700_000_000,
//! )?;
//! for (name, value) in signed.headers() {
//!     println!("{name}: {value}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## 2. Verify an inbound request
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use tap_signature::{
//!     config::TapConfig,
//!     security::{TapRequirement, authorize},
//!     tap::HttpRequest,
//! };
//!
//! # fn handle(request: &HttpRequest, now: u64) -> Result<(), Box<dyn std::error::Error>> {
//! let config = TapConfig::from_file(Path::new("tap.toml"))?;
//! let verifier = config.build_verifier()?;
//!
//! match authorize(&verifier, request, TapRequirement::CheckoutRequired, now) {
//!     Ok(decision) => println!("allowed: {decision:?}"),
//!     Err(denied) => println!("{} {denied}", denied.status_code()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`tap`]: canonicalization, keys, registries, signer, verifier, replay cache
//! - [`config`]: TOML configuration and trust registry loading
//! - [`security`]: audit logging and endpoint access policy
//! - [`error`]: error types
//!
//! # Security Considerations
//!
//! - **Private keys never leave the signer side**: verifiers only hold
//!   [`tap::PublicKey`]; PEM exports of private keys are zeroized on drop
//! - **Verdicts are terminal**: a rejected request must be re-signed, never
//!   resent
//! - **No oracle**: clients only see a generic rejection message
//! - **Audit trail**: key lifecycle and verification decisions are logged on the
//!   `audit` tracing target

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![allow(
    clippy::multiple_crate_versions,
    reason = "transitive dependencies from the RustCrypto stack"
)]

pub mod config;
pub mod error;
pub mod security;
pub mod tap;

pub use error::{Result, TapError};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let _ = std::marker::PhantomData::<TapError>;
        let _ = std::marker::PhantomData::<config::TapConfig>;
        let _ = std::marker::PhantomData::<tap::TapVerifier>;
    }
}
