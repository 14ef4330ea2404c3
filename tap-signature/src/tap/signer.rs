//! TAP request signing.
//!
//! [`TapSigner`] resolves a [`SigningIdentity`] from a [`SignerRegistry`],
//! builds fresh [`SignatureParameters`], canonicalizes the request and
//! attaches `Signature-Input` and `Signature` header fields.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    error::{Result, TapError},
    security::audit::{AuditEvent, AuditEventType, audit_log},
    tap::{
        DEFAULT_SIGNATURE_LABEL, DEFAULT_SIGNATURE_LIFETIME_SECS, TAP_MAX_VALIDITY_WINDOW_SECS,
        canonical::canonicalize,
        components::{Component, CoveredComponents},
        identity::{Identity, SigningIdentity},
        params::{InteractionType, SignatureParameters, format_signature_header},
        registry::SignerRegistry,
        request::{CONTENT_DIGEST_HEADER, HttpRequest, SIGNATURE_HEADER, SIGNATURE_INPUT_HEADER},
        unix_now,
    },
};

/// Signer settings.
///
/// Deserializes from the `[signer]` table of a configuration file; every
/// field is optional there.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignerConfig {
    /// `expires - created` for new signatures.
    pub lifetime_secs: u64,
    /// Upper bound on `lifetime_secs`; never above [`TAP_MAX_VALIDITY_WINDOW_SECS`].
    pub max_lifetime_secs: u64,
    /// Signature label.
    pub label: String,
    /// Components covered by [`TapSigner::sign_request`].
    pub covered_components: CoveredComponents,
    /// Also cover `content-digest` when the request carries one.
    pub cover_content_digest: bool,
    /// Interaction tag added to every signature, if any.
    pub tag: Option<InteractionType>,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            lifetime_secs: DEFAULT_SIGNATURE_LIFETIME_SECS,
            max_lifetime_secs: TAP_MAX_VALIDITY_WINDOW_SECS,
            label: DEFAULT_SIGNATURE_LABEL.to_owned(),
            covered_components: CoveredComponents::method_and_target(),
            cover_content_digest: true,
            tag: None,
        }
    }
}

impl SignerConfig {
    /// Checks lifetime bounds and the label.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::ConfigError`] if the lifetime is zero or above the
    /// maximum, the maximum exceeds [`TAP_MAX_VALIDITY_WINDOW_SECS`], or the
    /// label is not a valid dictionary key.
    pub fn validate(&self) -> Result<()> {
        if self.lifetime_secs == 0 {
            return Err(TapError::ConfigError("signer lifetime_secs must be positive".to_owned()));
        }
        if self.max_lifetime_secs > TAP_MAX_VALIDITY_WINDOW_SECS {
            return Err(TapError::ConfigError(format!(
                "signer max_lifetime_secs {} exceeds {TAP_MAX_VALIDITY_WINDOW_SECS}",
                self.max_lifetime_secs
            )));
        }
        if self.lifetime_secs > self.max_lifetime_secs {
            return Err(TapError::ConfigError(format!(
                "signer lifetime_secs {} exceeds max_lifetime_secs {}",
                self.lifetime_secs, self.max_lifetime_secs
            )));
        }
        validate_label(&self.label)
    }
}

/// Checks that a signature label is a structured-field key.
pub(crate) fn validate_label(label: &str) -> Result<()> {
    let mut bytes = label.bytes();
    let valid_start = bytes.next().is_some_and(|b| b.is_ascii_lowercase() || b == b'*');
    let valid_rest = bytes.all(|b| {
        b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'_' | b'-' | b'.' | b'*')
    });
    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(TapError::ConfigError(format!("invalid signature label `{label}`")))
    }
}

/// Source of single-use nonces.
pub trait NonceSource: Send + Sync {
    /// Returns a fresh nonce.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::NonceGeneration`] if no nonce can be produced.
    fn nonce(&self) -> Result<String>;
}

/// Nonces from the operating system CSPRNG, formatted as UUIDs.
///
/// A failing entropy source aborts the signing call; there is no fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsNonceSource;

impl NonceSource for OsNonceSource {
    fn nonce(&self) -> Result<String> {
        let mut bytes = [0u8; 16];
        getrandom::getrandom(&mut bytes)
            .map_err(|e| TapError::NonceGeneration(format!("OS entropy source failed: {e}")))?;
        Ok(uuid::Builder::from_random_bytes(bytes).into_uuid().to_string())
    }
}

/// A request with its signature attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    request: HttpRequest,
    parameters: SignatureParameters,
    signature_input: String,
    signature: String,
}

impl SignedRequest {
    /// The request, including `Signature-Input` and `Signature`.
    #[must_use]
    pub const fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// Parameters that were signed.
    #[must_use]
    pub const fn parameters(&self) -> &SignatureParameters {
        &self.parameters
    }

    /// `Signature-Input` field value.
    #[must_use]
    pub fn signature_input(&self) -> &str {
        &self.signature_input
    }

    /// `Signature` field value.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Nonce used in this signature.
    #[must_use]
    pub fn nonce(&self) -> &str {
        &self.parameters.nonce
    }

    /// The two signature header fields as `(name, value)` pairs.
    #[must_use]
    pub fn headers(&self) -> [(&'static str, &str); 2] {
        [
            (SIGNATURE_INPUT_HEADER, self.signature_input.as_str()),
            (SIGNATURE_HEADER, self.signature.as_str()),
        ]
    }

    /// Consumes the envelope, returning the signed request.
    #[must_use]
    pub fn into_request(self) -> HttpRequest {
        self.request
    }
}

impl AsRef<HttpRequest> for SignedRequest {
    fn as_ref(&self) -> &HttpRequest {
        &self.request
    }
}

/// Signs outbound requests on behalf of registered identities.
///
/// Signing never mutates shared state apart from lazily applying scheduled
/// revocations in the registry, so one signer can serve many threads.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use ed25519_dalek::SigningKey;
/// use tap_signature::tap::{
///     HttpRequest, PrivateKey, SignerConfig, SignerRegistry, SigningIdentity, TapSigner, Validity,
/// };
///
/// # fn example() -> tap_signature::error::Result<()> {
/// let registry = Arc::new(SignerRegistry::new());
/// let key = PrivateKey::Ed25519(SigningKey::from_bytes(&[1u8; 32]));
/// registry.register(SigningIdentity::new("agent-key-1", key, Validity::unbounded())?)?;
///
/// let signer = TapSigner::new(registry, SignerConfig::default())?;
/// let request = HttpRequest::new("POST", "https://merchant.example.com/cart")?
///     .with_content_digest(br#"{"product_id":"p-1"}"#);
/// let signed = signer.sign_request(&request, "agent-key-1")?;
///
/// assert!(signed.signature_input().starts_with(r#"sig1=("@method" "@target-uri" "content-digest")"#));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TapSigner<N: NonceSource = OsNonceSource> {
    registry: Arc<SignerRegistry>,
    config: SignerConfig,
    nonces: N,
}

impl TapSigner {
    /// Creates a signer using OS nonces.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::ConfigError`] if `config` fails validation.
    pub fn new(registry: Arc<SignerRegistry>, config: SignerConfig) -> Result<Self> {
        Self::with_nonce_source(registry, config, OsNonceSource)
    }
}

impl<N: NonceSource> TapSigner<N> {
    /// Creates a signer with a custom nonce source.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::ConfigError`] if `config` fails validation.
    pub fn with_nonce_source(
        registry: Arc<SignerRegistry>,
        config: SignerConfig,
        nonces: N,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { registry, config, nonces })
    }

    /// Signer settings.
    #[must_use]
    pub const fn config(&self) -> &SignerConfig {
        &self.config
    }

    /// Registry the signer resolves key ids in.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SignerRegistry> {
        &self.registry
    }

    /// Signs with the configured components at the current time.
    ///
    /// `content-digest` is appended to the covered components when the request
    /// carries one and `cover_content_digest` is set.
    ///
    /// # Errors
    ///
    /// See [`sign`](Self::sign); also [`TapError::ClockError`].
    pub fn sign_request(&self, request: &HttpRequest, key_id: &str) -> Result<SignedRequest> {
        let components = self.default_components(request);
        self.sign(request, key_id, &components, unix_now()?)
    }

    /// Signs with the configured components and an explicit interaction tag.
    ///
    /// # Errors
    ///
    /// See [`sign`](Self::sign).
    pub fn sign_for_interaction(
        &self,
        request: &HttpRequest,
        key_id: &str,
        interaction: InteractionType,
        now: u64,
    ) -> Result<SignedRequest> {
        let identity = self.resolve(key_id, now)?;
        let components = self.default_components(request);
        self.sign_inner(request, &identity, &components, Some(interaction), now)
    }

    /// Signs `request` with the identity registered under `key_id`.
    ///
    /// # Errors
    ///
    /// - [`TapError::UnknownKey`] if no identity is registered under `key_id`
    /// - [`TapError::IdentityRevoked`], [`TapError::IdentityNotYetValid`],
    ///   [`TapError::IdentityExpired`] if the identity cannot sign at `now`
    /// - [`TapError::NonceGeneration`] if the nonce source fails
    /// - [`TapError::MalformedInput`] if a covered component is missing
    /// - [`TapError::CryptoError`] if the signature primitive fails
    pub fn sign(
        &self,
        request: &HttpRequest,
        key_id: &str,
        components: &CoveredComponents,
        now: u64,
    ) -> Result<SignedRequest> {
        let identity = self.resolve(key_id, now)?;
        self.sign_inner(request, &identity, components, self.config.tag, now)
    }

    /// Signs with an identity the caller holds directly.
    ///
    /// # Errors
    ///
    /// Same as [`sign`](Self::sign), minus [`TapError::UnknownKey`].
    pub fn sign_with_identity(
        &self,
        request: &HttpRequest,
        identity: &SigningIdentity,
        components: &CoveredComponents,
        now: u64,
    ) -> Result<SignedRequest> {
        self.sign_inner(request, identity, components, self.config.tag, now)
    }

    fn resolve(&self, key_id: &str, now: u64) -> Result<Arc<SigningIdentity>> {
        self.registry.resolve_at(key_id, now).ok_or_else(|| TapError::UnknownKey(key_id.to_owned()))
    }

    fn default_components(&self, request: &HttpRequest) -> CoveredComponents {
        let components = &self.config.covered_components;
        if self.config.cover_content_digest
            && request.header_values(CONTENT_DIGEST_HEADER).next().is_some()
        {
            components.with(Component::ContentDigest)
        } else {
            components.clone()
        }
    }

    #[instrument(
        skip(self, request, identity, components),
        fields(key_id = identity.key_id(), method = request.method(), target = %request.target())
    )]
    fn sign_inner(
        &self,
        request: &HttpRequest,
        identity: &SigningIdentity,
        components: &CoveredComponents,
        tag: Option<InteractionType>,
        now: u64,
    ) -> Result<SignedRequest> {
        identity.ensure_usable(now)?;

        let expires = now.checked_add(self.config.lifetime_secs).ok_or_else(|| {
            TapError::InvalidParameters(format!("expiry overflows for created={now}"))
        })?;
        let parameters = SignatureParameters {
            covered: components.clone(),
            created: now,
            expires,
            key_id: identity.key_id().to_owned(),
            algorithm: identity.algorithm(),
            nonce: self.nonces.nonce()?,
            tag,
        };
        parameters.validate(self.config.max_lifetime_secs)?;

        let base = canonicalize(request, &parameters)?;
        let signature = identity.private_key().sign(base.as_bytes())?;

        let signature_input = parameters.to_signature_input(&self.config.label);
        let signature = format_signature_header(&self.config.label, &signature);

        let mut request = request.clone();
        request.insert_header(SIGNATURE_INPUT_HEADER, &signature_input)?;
        request.insert_header(SIGNATURE_HEADER, &signature)?;

        debug!(created = now, expires, "request signed");
        audit_log(&generated_event(&request, &parameters));

        Ok(SignedRequest { request, parameters, signature_input, signature })
    }
}

fn generated_event(request: &HttpRequest, parameters: &SignatureParameters) -> AuditEvent {
    AuditEvent::new(AuditEventType::SignatureGenerated, &parameters.key_id, Uuid::new_v4())
        .with_target(request.target())
        .with_nonce(parameters.nonce.clone())
        .with_algorithm(parameters.algorithm.as_str())
        .with_interaction(parameters.tag)
}
