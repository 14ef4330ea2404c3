//! Endpoint access policy on top of verification.
//!
//! A request without signature headers is a regular user request. A request
//! that carries them is an agent request and must verify. Endpoints then pick
//! a [`TapRequirement`]:
//!
//! | requirement        | no headers | invalid | valid, browse | valid, checkout |
//! |--------------------|------------|---------|---------------|-----------------|
//! | `Optional`         | anonymous  | 401     | agent         | agent           |
//! | `Required`         | 401        | 401     | agent         | agent           |
//! | `CheckoutRequired` | 401        | 401     | 403           | agent           |

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::tap::{
    HttpRequest, InteractionType, SIGNATURE_HEADER, SIGNATURE_INPUT_HEADER, TapVerifier,
    VerificationOutcome, VerificationVerdict,
};

/// How much TAP authentication an endpoint demands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TapRequirement {
    /// Regular users allowed; signed requests must still verify.
    #[default]
    Optional,
    /// A valid agent signature is required.
    Required,
    /// A valid agent signature tagged for checkout is required.
    CheckoutRequired,
}

/// Who is allowed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// Unsigned request on an endpoint that does not require TAP.
    Anonymous,
    /// Verified agent request.
    Agent {
        /// Key id the request was signed with.
        key_id: String,
        /// Agent name from the trust registry.
        agent_name: Option<String>,
        /// Interaction tag carried by the signature.
        interaction: Option<InteractionType>,
    },
}

impl AccessDecision {
    /// Returns `true` for a verified agent.
    #[must_use]
    pub const fn is_agent(&self) -> bool {
        matches!(self, Self::Agent { .. })
    }
}

/// Why a request was turned away.
///
/// `Display` is safe to return to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AccessDenied {
    /// No valid signature. Carries the verdict for server-side logging only.
    #[error("request authentication failed")]
    Unauthenticated(VerificationVerdict),
    /// Valid signature, wrong interaction type.
    #[error("this endpoint requires a checkout interaction")]
    Forbidden,
}

impl AccessDenied {
    /// HTTP status code to answer with.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Unauthenticated(_) => 401,
            Self::Forbidden => 403,
        }
    }
}

impl TapRequirement {
    /// Applies the requirement to a verification outcome.
    ///
    /// `None` means the request carried no signature headers.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenied`] according to the table in the module docs.
    pub fn evaluate(
        self,
        outcome: Option<&VerificationOutcome>,
    ) -> Result<AccessDecision, AccessDenied> {
        let Some(outcome) = outcome else {
            return match self {
                Self::Optional => Ok(AccessDecision::Anonymous),
                Self::Required | Self::CheckoutRequired => {
                    Err(AccessDenied::Unauthenticated(VerificationVerdict::MalformedInput))
                }
            };
        };

        if !outcome.is_valid() {
            return Err(AccessDenied::Unauthenticated(outcome.verdict));
        }
        if self == Self::CheckoutRequired && !outcome.is_checkout() {
            return Err(AccessDenied::Forbidden);
        }

        Ok(AccessDecision::Agent {
            key_id: outcome.key_id.clone().unwrap_or_default(),
            agent_name: outcome.agent_name.clone(),
            interaction: outcome.interaction,
        })
    }
}

/// Returns `true` if the request carries either signature header.
#[must_use]
pub fn is_signed(request: &HttpRequest) -> bool {
    request.header_values(SIGNATURE_INPUT_HEADER).next().is_some()
        || request.header_values(SIGNATURE_HEADER).next().is_some()
}

/// Verifies a request if it is signed and applies `requirement`.
///
/// # Errors
///
/// Returns [`AccessDenied`] according to the table in the module docs.
pub fn authorize(
    verifier: &TapVerifier,
    request: &HttpRequest,
    requirement: TapRequirement,
    now: u64,
) -> Result<AccessDecision, AccessDenied> {
    let outcome = is_signed(request).then(|| verifier.verify_detailed(request, now));
    let decision = requirement.evaluate(outcome.as_ref());
    if let Err(denied) = &decision {
        debug!(status = denied.status_code(), ?requirement, "access denied");
    }
    decision
}
