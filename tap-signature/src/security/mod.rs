//! Security controls around the signature engine.
//!
//! # Audit Logging
//!
//! Key lifecycle changes and every signing and verification decision are
//! written as structured events on the `audit` tracing target, with key ids
//! redacted:
//!
//! ```rust
//! use tap_signature::{audit, security::audit::AuditEventType};
//! use uuid::Uuid;
//!
//! audit!(
//!     AuditEventType::VerificationRejected,
//!     "agent-key-1",
//!     Uuid::new_v4(),
//!     with_verdict("replayed")
//! );
//! ```
//!
//! # Access Policy
//!
//! [`policy`] maps verification outcomes to allow/deny decisions per endpoint
//! ([`TapRequirement`]).
//!
//! # Security Considerations
//!
//! - Audit logs use a separate tracing target for easy filtering
//! - Clients only ever see a generic rejection message; the precise verdict
//!   stays in server-side logs

pub mod audit;
pub mod policy;

pub use audit::{AuditDetails, AuditEvent, AuditEventType, audit_log, redact_key_id};
pub use policy::{AccessDecision, AccessDenied, TapRequirement, authorize, is_signed};
