//! Audit logging for signing, verification and key lifecycle events.
//!
//! Events are emitted through `tracing` with target `"audit"` so they can be
//! filtered and routed separately from diagnostic logs. Key ids are partially
//! redacted and signature bytes are never logged.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tap::InteractionType;

/// Types of auditable events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// A request was signed.
    SignatureGenerated,
    /// An inbound signature verified as valid.
    SignatureVerified,
    /// An inbound signature was rejected.
    VerificationRejected,
    /// An identity was added to a registry.
    KeyRegistered,
    /// An identity was revoked, immediately or by a scheduled rotation.
    KeyRevoked,
    /// A new identity replaced an old one with a grace period.
    KeyRotated,
}

/// Contextual details for an audit entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AuditDetails {
    /// Request target (`path?query`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Signature nonce.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Verification verdict name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<String>,
    /// Signature algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    /// Interaction tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interaction: Option<String>,
    /// Key id being replaced during rotation (redacted).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaced_key_id: Option<String>,
    /// Unix time at which a scheduled revocation takes effect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoke_at: Option<u64>,
}

/// Audit log entry.
///
/// # Examples
///
/// ```
/// use tap_signature::security::audit::{AuditEvent, AuditEventType};
/// use uuid::Uuid;
///
/// let event = AuditEvent::new(AuditEventType::SignatureGenerated, "agent-key-1", Uuid::new_v4())
///     .with_target("/api/products")
///     .with_nonce("550e8400-e29b-41d4-a716-446655440000");
///
/// tap_signature::security::audit::audit_log(&event);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred.
    pub timestamp: SystemTime,
    /// What happened.
    pub event_type: AuditEventType,
    /// Redacted key id of the identity involved.
    pub key_id: String,
    /// Correlation id for the operation.
    pub request_id: Uuid,
    /// Event details.
    pub details: AuditDetails,
}

impl AuditEvent {
    /// Creates a new audit event. `key_id` is redacted on the way in.
    #[must_use]
    #[allow(
        clippy::impl_trait_in_params,
        reason = "impl AsRef<str> is idiomatic for builder methods"
    )]
    pub fn new(event_type: AuditEventType, key_id: impl AsRef<str>, request_id: Uuid) -> Self {
        Self {
            timestamp: SystemTime::now(),
            event_type,
            key_id: redact_key_id(key_id.as_ref()),
            request_id,
            details: AuditDetails::default(),
        }
    }

    /// Adds the request target.
    #[must_use]
    #[allow(
        clippy::impl_trait_in_params,
        reason = "impl Into<String> is idiomatic for builder methods"
    )]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.details.target = Some(target.into());
        self
    }

    /// Adds the signature nonce.
    #[must_use]
    #[allow(
        clippy::impl_trait_in_params,
        reason = "impl Into<String> is idiomatic for builder methods"
    )]
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.details.nonce = Some(nonce.into());
        self
    }

    /// Adds the verification verdict.
    #[must_use]
    #[allow(
        clippy::impl_trait_in_params,
        reason = "impl Into<String> is idiomatic for builder methods"
    )]
    pub fn with_verdict(mut self, verdict: impl Into<String>) -> Self {
        self.details.verdict = Some(verdict.into());
        self
    }

    /// Adds the signature algorithm.
    #[must_use]
    #[allow(
        clippy::impl_trait_in_params,
        reason = "impl Into<String> is idiomatic for builder methods"
    )]
    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.details.algorithm = Some(algorithm.into());
        self
    }

    /// Adds the interaction tag, if the signature carried one.
    #[must_use]
    pub fn with_interaction(mut self, interaction: Option<InteractionType>) -> Self {
        self.details.interaction = interaction.map(|tag| tag.tag().to_owned());
        self
    }

    /// Adds the key id that a rotation replaces.
    #[must_use]
    #[allow(
        clippy::impl_trait_in_params,
        reason = "impl AsRef<str> is idiomatic for builder methods"
    )]
    pub fn with_replaced_key_id(mut self, key_id: impl AsRef<str>) -> Self {
        self.details.replaced_key_id = Some(redact_key_id(key_id.as_ref()));
        self
    }

    /// Adds the time at which a scheduled revocation takes effect.
    #[must_use]
    pub const fn with_revoke_at(mut self, revoke_at: u64) -> Self {
        self.details.revoke_at = Some(revoke_at);
        self
    }
}

/// Logs an audit event to tracing with target `"audit"`.
pub fn audit_log(event: &AuditEvent) {
    tracing::info!(
        target: "audit",
        timestamp = ?event.timestamp,
        event_type = ?event.event_type,
        key_id = %event.key_id,
        request_id = %event.request_id,
        details = ?event.details,
        "AUDIT"
    );
}

/// Redacts a key id, keeping the first four and the last three characters.
///
/// Enough to correlate log lines with a registry entry without publishing the
/// full identifier. Ids of twelve characters or fewer are kept as is.
///
/// # Examples
///
/// ```
/// use tap_signature::security::audit::redact_key_id;
///
/// assert_eq!(redact_key_id("poqkLGiymh_W0uP6PZFw-dvez3QJT5SolqXBCW38r0U"), "poqk...r0U");
/// assert_eq!(redact_key_id("agent-key-1"), "agent-key-1");
/// ```
#[must_use]
pub fn redact_key_id(key_id: &str) -> String {
    let chars: Vec<char> = key_id.chars().collect();
    if chars.len() <= 12 {
        return key_id.to_owned();
    }
    let head: String = chars.iter().take(4).collect();
    let tail: String = chars.iter().skip(chars.len() - 3).collect();
    format!("{head}...{tail}")
}

/// Convenience macro for audit logging.
///
/// # Examples
///
/// ```
/// use tap_signature::{audit, security::audit::AuditEventType};
/// use uuid::Uuid;
///
/// audit!(AuditEventType::KeyRevoked, "agent-key-1", Uuid::new_v4());
///
/// audit!(
///     AuditEventType::VerificationRejected,
///     "agent-key-1",
///     Uuid::new_v4(),
///     with_verdict("expired"),
///     with_target("/api/products")
/// );
/// ```
#[macro_export]
macro_rules! audit {
    ($event_type:expr, $key_id:expr, $request_id:expr) => {
        $crate::security::audit::audit_log(
            &$crate::security::audit::AuditEvent::new($event_type, $key_id, $request_id)
        )
    };
    ($event_type:expr, $key_id:expr, $request_id:expr, $($method:ident($arg:expr)),+ $(,)?) => {
        $crate::security::audit::audit_log(
            &$crate::security::audit::AuditEvent::new($event_type, $key_id, $request_id)
                $(.$method($arg))+
        )
    };
}
