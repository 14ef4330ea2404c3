//! TAP signature verification.
//!
//! [`TapVerifier`] turns an inbound request into exactly one
//! [`VerificationVerdict`]. Checks run in a fixed order and stop at the first
//! failure:
//!
//! 1. parse `Signature-Input` / `Signature` → [`MalformedInput`](VerificationVerdict::MalformedInput)
//! 2. resolve the key id → [`UnknownKey`](VerificationVerdict::UnknownKey) /
//!    [`RevokedKey`](VerificationVerdict::RevokedKey)
//! 3. match the algorithm → [`UnsupportedAlgorithm`](VerificationVerdict::UnsupportedAlgorithm)
//! 4. freshness → [`NotYetValid`](VerificationVerdict::NotYetValid) /
//!    [`Expired`](VerificationVerdict::Expired)
//! 5. rebuild the signature base from the received request and parameters
//! 6. check the signature → [`SignatureMismatch`](VerificationVerdict::SignatureMismatch)
//! 7. commit the nonce with an atomic insert-if-absent; already present →
//!    [`Replayed`](VerificationVerdict::Replayed)
//!
//! The nonce is checked only once the signature holds, so a forged request
//! reusing a consumed nonce reports `SignatureMismatch` and can never poison
//! the replay cache.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{
    error::{Result, TapError},
    security::audit::{AuditEvent, AuditEventType, audit_log},
    tap::{
        DEFAULT_SIGNATURE_LABEL, TAP_MAX_VALIDITY_WINDOW_SECS,
        canonical::canonicalize,
        components::Component,
        identity::Identity,
        keys::Algorithm,
        params::{InteractionType, SignatureInput, parse_signature_header},
        registry::TrustRegistry,
        replay::ReplayCache,
        request::{HttpRequest, SIGNATURE_HEADER, SIGNATURE_INPUT_HEADER},
        signer::validate_label,
    },
};

/// Result of verifying one request.
///
/// Only [`Valid`](Self::Valid) authorizes processing. Every other verdict is
/// terminal for that request; the agent must re-sign rather than resend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationVerdict {
    /// Signature checks out and the nonce has been consumed.
    Valid,
    /// Signature metadata is missing, unparseable or violates policy.
    MalformedInput,
    /// No trusted identity has this key id.
    UnknownKey,
    /// The identity is revoked or outside its validity window.
    RevokedKey,
    /// The signature does not match the rebuilt signature base.
    SignatureMismatch,
    /// The signature's `expires` (plus skew) has passed.
    Expired,
    /// The signature's `created` (minus skew) is in the future.
    NotYetValid,
    /// The `(keyid, nonce)` pair has already been accepted.
    Replayed,
    /// The `alg` parameter is unknown or does not match the identity.
    UnsupportedAlgorithm,
}

impl VerificationVerdict {
    /// Returns `true` only for [`Valid`](Self::Valid).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Stable snake_case name, for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::MalformedInput => "malformed_input",
            Self::UnknownKey => "unknown_key",
            Self::RevokedKey => "revoked_key",
            Self::SignatureMismatch => "signature_mismatch",
            Self::Expired => "expired",
            Self::NotYetValid => "not_yet_valid",
            Self::Replayed => "replayed",
            Self::UnsupportedAlgorithm => "unsupported_algorithm",
        }
    }

    /// Message safe to return to the client.
    ///
    /// All failures share one message so a caller cannot tell an unknown key
    /// from a bad signature.
    #[must_use]
    pub const fn public_message(&self) -> &'static str {
        match self {
            Self::Valid => "request authenticated",
            _ => "request authentication failed",
        }
    }
}

impl fmt::Display for VerificationVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.public_message())
    }
}

/// Verdict plus whatever the verifier learned about the signer on the way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationOutcome {
    /// Final verdict.
    pub verdict: VerificationVerdict,
    /// `keyid` parameter, once parsed.
    pub key_id: Option<String>,
    /// Agent name from the trust registry, once resolved.
    pub agent_name: Option<String>,
    /// Interaction tag, once parsed.
    pub interaction: Option<InteractionType>,
    /// `created` parameter, once parsed.
    pub created: Option<u64>,
    /// `expires` parameter, once parsed.
    pub expires: Option<u64>,
}

impl VerificationOutcome {
    fn new() -> Self {
        Self {
            verdict: VerificationVerdict::MalformedInput,
            key_id: None,
            agent_name: None,
            interaction: None,
            created: None,
            expires: None,
        }
    }

    /// Returns `true` only for a valid verdict.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.verdict.is_valid()
    }

    /// Returns `true` for a valid checkout-tagged request.
    #[must_use]
    pub fn is_checkout(&self) -> bool {
        self.is_valid() && self.interaction == Some(InteractionType::Checkout)
    }

    /// Returns `true` for a valid request tagged as browsing or untagged.
    #[must_use]
    pub fn is_browsing(&self) -> bool {
        self.is_valid() && self.interaction != Some(InteractionType::Checkout)
    }
}

/// Verifier settings.
///
/// Deserializes from the `[verifier]` table of a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerifierConfig {
    /// Tolerance applied to both ends of the freshness window.
    pub clock_skew_secs: u64,
    /// Longest accepted `expires - created`.
    pub max_lifetime_secs: u64,
    /// Optional cap on `now - created`, independent of `expires`.
    pub max_signature_age_secs: Option<u64>,
    /// Components every signature must cover.
    pub required_components: Vec<Component>,
    /// Expected signature label.
    pub label: String,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            clock_skew_secs: 0,
            max_lifetime_secs: TAP_MAX_VALIDITY_WINDOW_SECS,
            max_signature_age_secs: None,
            required_components: vec![Component::Method],
            label: DEFAULT_SIGNATURE_LABEL.to_owned(),
        }
    }
}

impl VerifierConfig {
    /// Checks bounds and the label.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::ConfigError`] if the maximum lifetime is zero or
    /// above [`TAP_MAX_VALIDITY_WINDOW_SECS`], the skew exceeds the maximum
    /// lifetime, or the label is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_lifetime_secs == 0 || self.max_lifetime_secs > TAP_MAX_VALIDITY_WINDOW_SECS {
            return Err(TapError::ConfigError(format!(
                "verifier max_lifetime_secs must be in 1..={TAP_MAX_VALIDITY_WINDOW_SECS}, got {}",
                self.max_lifetime_secs
            )));
        }
        if self.clock_skew_secs > self.max_lifetime_secs {
            return Err(TapError::ConfigError(format!(
                "verifier clock_skew_secs {} exceeds max_lifetime_secs {}",
                self.clock_skew_secs, self.max_lifetime_secs
            )));
        }
        validate_label(&self.label)
    }

    /// Rotation grace that keeps every in-flight signature verifiable.
    #[must_use]
    pub const fn min_rotation_grace(&self) -> u64 {
        self.max_lifetime_secs + self.clock_skew_secs
    }
}

/// Verifies inbound TAP signatures.
///
/// `Send + Sync`; share one instance across request handlers with `Arc`.
#[derive(Debug)]
pub struct TapVerifier {
    trust: Arc<TrustRegistry>,
    replay: Arc<ReplayCache>,
    config: VerifierConfig,
}

impl TapVerifier {
    /// Creates a verifier.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::ConfigError`] if `config` fails validation.
    pub fn new(
        trust: Arc<TrustRegistry>,
        replay: Arc<ReplayCache>,
        config: VerifierConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { trust, replay, config })
    }

    /// Verifier settings.
    #[must_use]
    pub const fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Trust registry consulted for key ids.
    #[must_use]
    pub const fn trust_registry(&self) -> &Arc<TrustRegistry> {
        &self.trust
    }

    /// Replay cache that records accepted nonces.
    #[must_use]
    pub const fn replay_cache(&self) -> &Arc<ReplayCache> {
        &self.replay
    }

    /// Verifies a request and returns only the verdict.
    pub fn verify<R: AsRef<HttpRequest> + ?Sized>(
        &self,
        request: &R,
        now: u64,
    ) -> VerificationVerdict {
        self.verify_detailed(request.as_ref(), now).verdict
    }

    /// Verifies a request, reporting the signer details that were recovered.
    #[instrument(skip(self, request), fields(method = request.method(), target = %request.target()))]
    pub fn verify_detailed(&self, request: &HttpRequest, now: u64) -> VerificationOutcome {
        let mut outcome = VerificationOutcome::new();
        outcome.verdict = self.evaluate(request, now, &mut outcome);

        let key_id = outcome.key_id.as_deref().unwrap_or("-");
        if outcome.is_valid() {
            debug!(key_id, "signature verified");
        } else {
            warn!(key_id, verdict = outcome.verdict.as_str(), "signature rejected");
        }
        audit_log(&outcome_event(request, &outcome));
        outcome
    }

    fn evaluate(
        &self,
        request: &HttpRequest,
        now: u64,
        outcome: &mut VerificationOutcome,
    ) -> VerificationVerdict {
        use VerificationVerdict as V;

        // 1. metadata
        let (Some(input_value), Some(signature_value)) =
            (single_header(request, SIGNATURE_INPUT_HEADER), single_header(request, SIGNATURE_HEADER))
        else {
            return V::MalformedInput;
        };
        let input = match SignatureInput::parse(input_value) {
            Ok(input) => input,
            Err(e) => {
                debug!(error = %e, "unparseable Signature-Input");
                return V::MalformedInput;
            }
        };
        outcome.key_id = Some(input.key_id.clone());
        outcome.created = Some(input.created);
        outcome.expires = Some(input.expires);
        outcome.interaction = input.tag;

        let Ok((label, signature)) = parse_signature_header(signature_value) else {
            return V::MalformedInput;
        };
        if label != self.config.label || input.label != self.config.label {
            return V::MalformedInput;
        }
        if !self.config.required_components.iter().all(|c| input.covered.contains(c)) {
            return V::MalformedInput;
        }
        if input.expires <= input.created
            || input.expires - input.created > self.config.max_lifetime_secs
        {
            return V::MalformedInput;
        }

        // 2. identity
        let Some(identity) = self.trust.resolve_at(&input.key_id, now) else {
            return V::UnknownKey;
        };
        outcome.agent_name = identity.name().map(str::to_owned);
        if identity.is_revoked() || !identity.validity().contains(input.created) {
            return V::RevokedKey;
        }

        // 3. algorithm
        let Some(algorithm) =
            Algorithm::from_wire(&input.algorithm).filter(|alg| *alg == identity.algorithm())
        else {
            return V::UnsupportedAlgorithm;
        };

        // 4. freshness
        let skew = self.config.clock_skew_secs;
        if now.saturating_add(skew) < input.created {
            return V::NotYetValid;
        }
        if now > input.expires.saturating_add(skew) {
            return V::Expired;
        }
        let too_old = self
            .config
            .max_signature_age_secs
            .is_some_and(|max_age| now.saturating_sub(input.created) > max_age.saturating_add(skew));
        if too_old {
            return V::Expired;
        }

        // 5. signature base from what was received
        let parameters = input.into_parameters(algorithm);
        let base = match canonicalize(request, &parameters) {
            Ok(base) => base,
            Err(e) => {
                debug!(error = %e, "cannot rebuild signature base");
                return V::MalformedInput;
            }
        };

        // 6. signature
        if !identity.public_key().verify(base.as_bytes(), &signature) {
            return V::SignatureMismatch;
        }

        // 7. replay
        let retain_until = parameters.expires.saturating_add(skew);
        if !self.replay.record(&parameters.key_id, &parameters.nonce, retain_until, now) {
            return V::Replayed;
        }
        V::Valid
    }
}

/// The value of a header that must appear exactly once.
fn outcome_event(request: &HttpRequest, outcome: &VerificationOutcome) -> AuditEvent {
    let key_id = outcome.key_id.as_deref().unwrap_or("-");
    let event = if outcome.is_valid() {
        AuditEvent::new(AuditEventType::SignatureVerified, key_id, Uuid::new_v4())
    } else {
        AuditEvent::new(AuditEventType::VerificationRejected, key_id, Uuid::new_v4())
            .with_verdict(outcome.verdict.as_str())
    };
    event.with_target(request.target()).with_interaction(outcome.interaction)
}

fn single_header<'a>(request: &'a HttpRequest, name: &str) -> Option<&'a str> {
    let mut values = request.header_values(name);
    let first = values.next()?;
    values.next().is_none().then_some(first)
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;

    use super::*;
    use crate::tap::{
        components::CoveredComponents,
        identity::{SigningIdentity, Validity},
        keys::PrivateKey,
        registry::SignerRegistry,
        signer::{SignedRequest, SignerConfig, TapSigner},
    };

    const T: u64 = 1_700_000_000;

    struct Fixture {
        signer: TapSigner,
        verifier: TapVerifier,
        trust: Arc<TrustRegistry>,
    }

    fn fixture_with(config: VerifierConfig) -> Fixture {
        let key = PrivateKey::Ed25519(SigningKey::from_bytes(&[42u8; 32]));
        let identity = SigningIdentity::new("agent-key-1", key, Validity::unbounded()).unwrap();

        let trust = Arc::new(TrustRegistry::new());
        trust.register(identity.verifying_identity().with_name("Shopping Agent")).unwrap();
        let signers = Arc::new(SignerRegistry::new());
        signers.register(identity).unwrap();

        Fixture {
            signer: TapSigner::new(signers, SignerConfig::default()).unwrap(),
            verifier: TapVerifier::new(Arc::clone(&trust), Arc::new(ReplayCache::new()), config)
                .unwrap(),
            trust,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(VerifierConfig::default())
    }

    fn sign(f: &Fixture, now: u64) -> SignedRequest {
        let request = HttpRequest::new("GET", "https://merchant.example.com/api/products").unwrap();
        f.signer.sign(&request, "agent-key-1", &CoveredComponents::method_and_target(), now).unwrap()
    }

    fn with_header(signed: &SignedRequest, name: &str, value: &str) -> HttpRequest {
        let mut request = signed.request().clone();
        request.insert_header(name, value).unwrap();
        request
    }

    #[test]
    fn test_valid_then_replayed() {
        let f = fixture();
        let signed = sign(&f, T);

        let outcome = f.verifier.verify_detailed(signed.request(), T + 1);
        assert_eq!(outcome.verdict, VerificationVerdict::Valid);
        assert_eq!(outcome.key_id.as_deref(), Some("agent-key-1"));
        assert_eq!(outcome.agent_name.as_deref(), Some("Shopping Agent"));
        assert_eq!(outcome.created, Some(T));
        assert_eq!(outcome.expires, Some(T + 300));

        assert_eq!(f.verifier.verify(&signed, T + 2), VerificationVerdict::Replayed);
    }

    #[test]
    fn test_missing_headers_are_malformed() {
        let f = fixture();
        let request = HttpRequest::new("GET", "https://merchant.example.com/").unwrap();
        let outcome = f.verifier.verify_detailed(&request, T);
        assert_eq!(outcome.verdict, VerificationVerdict::MalformedInput);
        assert!(outcome.key_id.is_none());
    }

    #[test]
    fn test_duplicate_signature_input_is_malformed() {
        let f = fixture();
        let signed = sign(&f, T);
        let mut request = signed.request().clone();
        request.append_header(SIGNATURE_INPUT_HEADER, signed.signature_input()).unwrap();
        assert_eq!(f.verifier.verify(&request, T), VerificationVerdict::MalformedInput);
    }

    #[test]
    fn test_label_mismatch_is_malformed() {
        let f = fixture();
        let signed = sign(&f, T);
        let renamed = signed.signature().replacen("sig1=", "sig2=", 1);
        let request = with_header(&signed, SIGNATURE_HEADER, &renamed);
        assert_eq!(f.verifier.verify(&request, T), VerificationVerdict::MalformedInput);
    }

    #[test]
    fn test_required_component_missing() {
        let config = VerifierConfig {
            required_components: vec![Component::Method, Component::ContentDigest],
            ..VerifierConfig::default()
        };
        let f = fixture_with(config);
        let signed = sign(&f, T);
        assert_eq!(f.verifier.verify(&signed, T), VerificationVerdict::MalformedInput);
    }

    #[test]
    fn test_lifetime_above_maximum_is_malformed() {
        let config = VerifierConfig { max_lifetime_secs: 120, ..VerifierConfig::default() };
        let f = fixture_with(config);
        let signed = sign(&f, T);
        assert_eq!(f.verifier.verify(&signed, T), VerificationVerdict::MalformedInput);
    }

    #[test]
    fn test_unknown_and_revoked_key() {
        let f = fixture();
        let signed = sign(&f, T);

        let other = fixture();
        other.trust.revoke("agent-key-1").unwrap();
        assert_eq!(other.verifier.verify(&signed, T), VerificationVerdict::RevokedKey);

        let empty = TapVerifier::new(
            Arc::new(TrustRegistry::new()),
            Arc::new(ReplayCache::new()),
            VerifierConfig::default(),
        )
        .unwrap();
        assert_eq!(empty.verify(&signed, T), VerificationVerdict::UnknownKey);
    }

    #[test]
    fn test_identity_validity_window() {
        let f = fixture();
        let signed = sign(&f, T);

        let key = PrivateKey::Ed25519(SigningKey::from_bytes(&[42u8; 32]));
        let identity =
            SigningIdentity::new("agent-key-1", key, Validity::new(0, T - 1).unwrap()).unwrap();
        let trust = Arc::new(TrustRegistry::new());
        trust.register(identity.verifying_identity()).unwrap();
        let verifier =
            TapVerifier::new(trust, Arc::new(ReplayCache::new()), VerifierConfig::default())
                .unwrap();

        assert_eq!(verifier.verify(&signed, T), VerificationVerdict::RevokedKey);
    }

    #[test]
    fn test_algorithm_mismatch() {
        let f = fixture();
        let signed = sign(&f, T);

        let forged = signed.signature_input().replace("alg=\"ed25519\"", "alg=\"rsa-pss-sha256\"");
        let request = with_header(&signed, SIGNATURE_INPUT_HEADER, &forged);
        assert_eq!(f.verifier.verify(&request, T), VerificationVerdict::UnsupportedAlgorithm);

        let forged = signed.signature_input().replace("alg=\"ed25519\"", "alg=\"hmac-sha256\"");
        let request = with_header(&signed, SIGNATURE_INPUT_HEADER, &forged);
        assert_eq!(f.verifier.verify(&request, T), VerificationVerdict::UnsupportedAlgorithm);
    }

    #[test]
    fn test_freshness_boundaries_inclusive() {
        let f = fixture();
        assert_eq!(f.verifier.verify(&sign(&f, T), T), VerificationVerdict::Valid);
        assert_eq!(f.verifier.verify(&sign(&f, T), T + 300), VerificationVerdict::Valid);
        assert_eq!(f.verifier.verify(&sign(&f, T), T + 301), VerificationVerdict::Expired);
        assert_eq!(f.verifier.verify(&sign(&f, T), T - 1), VerificationVerdict::NotYetValid);
    }

    #[test]
    fn test_clock_skew_widens_window() {
        let config = VerifierConfig { clock_skew_secs: 30, ..VerifierConfig::default() };
        let f = fixture_with(config);
        assert_eq!(f.verifier.verify(&sign(&f, T), T - 30), VerificationVerdict::Valid);
        assert_eq!(f.verifier.verify(&sign(&f, T), T - 31), VerificationVerdict::NotYetValid);
        assert_eq!(f.verifier.verify(&sign(&f, T), T + 330), VerificationVerdict::Valid);
        assert_eq!(f.verifier.verify(&sign(&f, T), T + 331), VerificationVerdict::Expired);
    }

    #[test]
    fn test_max_signature_age() {
        let config =
            VerifierConfig { max_signature_age_secs: Some(60), ..VerifierConfig::default() };
        let f = fixture_with(config);
        assert_eq!(f.verifier.verify(&sign(&f, T), T + 60), VerificationVerdict::Valid);
        assert_eq!(f.verifier.verify(&sign(&f, T), T + 61), VerificationVerdict::Expired);
    }

    #[test]
    fn test_rejections_do_not_consume_nonce() {
        let f = fixture();
        let signed = sign(&f, T);

        let tampered = with_header(&signed, "x-extra", "1");
        let mut tampered_target = HttpRequest::new("GET", "https://merchant.example.com/api/orders")
            .unwrap();
        for (name, value) in signed.headers() {
            tampered_target.insert_header(name, value).unwrap();
        }
        assert_eq!(
            f.verifier.verify(&tampered_target, T + 1),
            VerificationVerdict::SignatureMismatch
        );
        assert_eq!(f.verifier.verify(&signed, T - 5), VerificationVerdict::NotYetValid);
        assert!(f.verifier.replay_cache().is_empty());

        assert_eq!(f.verifier.verify(&tampered, T + 1), VerificationVerdict::Valid);
    }

    #[test]
    fn test_signature_parameters_are_bound() {
        let f = fixture();
        let other = PrivateKey::Ed25519(SigningKey::from_bytes(&[7u8; 32]));
        let other = SigningIdentity::new("agent-key-2", other, Validity::unbounded()).unwrap();
        f.trust.register(other.verifying_identity()).unwrap();

        let signed = sign(&f, T);
        let input = signed.signature_input();
        assert!(input.starts_with("sig1=(\"@method\" \"@target-uri\");"));

        let forgeries = [
            input.replace(&format!("created={T}"), &format!("created={}", T - 1)),
            input.replace("keyid=\"agent-key-1\"", "keyid=\"agent-key-2\""),
            input.replace(&format!("nonce=\"{}\"", signed.nonce()), "nonce=\"zzz\""),
            input.replace("(\"@method\" \"@target-uri\")", "(\"@target-uri\" \"@method\")"),
        ];
        for forged in &forgeries {
            assert_ne!(forged, input);
            let request = with_header(&signed, SIGNATURE_INPUT_HEADER, forged);
            assert_eq!(
                f.verifier.verify(&request, T),
                VerificationVerdict::SignatureMismatch,
                "{forged}"
            );
        }
        assert!(f.verifier.replay_cache().is_empty());
        assert_eq!(f.verifier.verify(&signed, T), VerificationVerdict::Valid);
    }

    #[test]
    fn test_origin_form_target_tampering() {
        let f = fixture();
        let request = HttpRequest::new("GET", "/api/products")
            .unwrap()
            .with_header("host", "shop.example.com")
            .unwrap();
        let signed = f
            .signer
            .sign(&request, "agent-key-1", &CoveredComponents::method_and_target(), T)
            .unwrap();

        let mut moved = HttpRequest::new("GET", "//attacker.example/api/products")
            .unwrap()
            .with_header("host", "shop.example.com")
            .unwrap();
        for (name, value) in signed.headers() {
            moved.insert_header(name, value).unwrap();
        }
        assert_eq!(f.verifier.verify(&moved, T), VerificationVerdict::SignatureMismatch);
        assert_eq!(f.verifier.verify(&signed, T), VerificationVerdict::Valid);
    }

    #[test]
    fn test_outcome_audit_event() {
        let f = fixture();
        let request = HttpRequest::new("POST", "https://merchant.example.com/checkout").unwrap();
        let signed = f
            .signer
            .sign_for_interaction(&request, "agent-key-1", InteractionType::Checkout, T)
            .unwrap();

        let outcome = f.verifier.verify_detailed(signed.request(), T);
        let event = outcome_event(signed.request(), &outcome);
        assert_eq!(event.event_type, AuditEventType::SignatureVerified);
        assert_eq!(event.details.interaction.as_deref(), Some("agent-payer-auth"));
        assert_eq!(event.details.target.as_deref(), Some("/checkout"));
        assert!(event.details.verdict.is_none());

        let outcome = f.verifier.verify_detailed(signed.request(), T);
        let event = outcome_event(signed.request(), &outcome);
        assert_eq!(event.event_type, AuditEventType::VerificationRejected);
        assert_eq!(event.details.verdict.as_deref(), Some("replayed"));
        assert_eq!(event.details.interaction.as_deref(), Some("agent-payer-auth"));
    }

    #[test]
    fn test_bad_base64_is_malformed() {
        let f = fixture();
        let signed = sign(&f, T);
        let request = with_header(&signed, SIGNATURE_HEADER, "sig1=:!!!:");
        assert_eq!(f.verifier.verify(&request, T), VerificationVerdict::MalformedInput);
    }

    #[test]
    fn test_public_message_is_generic() {
        let failures = [
            VerificationVerdict::MalformedInput,
            VerificationVerdict::UnknownKey,
            VerificationVerdict::SignatureMismatch,
            VerificationVerdict::Replayed,
        ];
        for verdict in failures {
            assert_eq!(verdict.to_string(), "request authentication failed");
            assert!(!verdict.is_valid());
        }
        assert!(VerificationVerdict::Valid.is_valid());
        assert_eq!(VerificationVerdict::NotYetValid.as_str(), "not_yet_valid");
    }

    #[test]
    fn test_config_validation() {
        let trust = Arc::new(TrustRegistry::new());
        let replay = Arc::new(ReplayCache::new());
        let bad = [
            VerifierConfig { max_lifetime_secs: 0, ..VerifierConfig::default() },
            VerifierConfig { max_lifetime_secs: 481, ..VerifierConfig::default() },
            VerifierConfig { clock_skew_secs: 481, ..VerifierConfig::default() },
            VerifierConfig { label: String::new(), ..VerifierConfig::default() },
        ];
        for config in bad {
            assert!(matches!(
                TapVerifier::new(Arc::clone(&trust), Arc::clone(&replay), config),
                Err(TapError::ConfigError(_))
            ));
        }
        assert_eq!(VerifierConfig::default().min_rotation_grace(), 480);
    }
}
