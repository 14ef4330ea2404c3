//! Signing and verifying identities.
//!
//! A [`SigningIdentity`] owns private key material and lives only on the agent
//! side. A [`VerifyingIdentity`] carries the matching public key and lives in
//! the merchant's trust registry. Both share a key id, an algorithm, a
//! validity window and a revocation flag.

use std::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

use crate::{
    error::{Result, TapError},
    tap::{
        jwk::Jwk,
        keys::{Algorithm, PrivateKey, PublicKey},
    },
};

/// Inclusive validity window `[not_before, not_after]` in Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validity {
    not_before: u64,
    not_after: u64,
}

impl Validity {
    /// Creates a validity window.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::InvalidIdentity`] if `not_before > not_after`.
    pub fn new(not_before: u64, not_after: u64) -> Result<Self> {
        if not_before > not_after {
            return Err(TapError::InvalidIdentity(format!(
                "not_before ({not_before}) is after not_after ({not_after})"
            )));
        }
        Ok(Self { not_before, not_after })
    }

    /// A window that never closes.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self { not_before: 0, not_after: u64::MAX }
    }

    /// Start of the window.
    #[must_use]
    pub const fn not_before(&self) -> u64 {
        self.not_before
    }

    /// End of the window.
    #[must_use]
    pub const fn not_after(&self) -> u64 {
        self.not_after
    }

    /// Returns `true` if `at` lies inside the window, bounds included.
    #[must_use]
    pub const fn contains(&self, at: u64) -> bool {
        self.not_before <= at && at <= self.not_after
    }
}

impl Default for Validity {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Behaviour shared by everything a [`KeyRegistry`](crate::tap::KeyRegistry) stores.
///
/// Revocation is one-way: once marked, an identity stays revoked.
pub trait Identity: Send + Sync + 'static {
    /// Key identifier (the `keyid` signature parameter).
    fn key_id(&self) -> &str;

    /// Signature algorithm bound to the key.
    fn algorithm(&self) -> Algorithm;

    /// Validity window.
    fn validity(&self) -> Validity;

    /// Returns `true` once the identity has been revoked.
    fn is_revoked(&self) -> bool;

    /// Marks the identity revoked.
    fn mark_revoked(&self);
}

/// Agent-side identity holding the private key.
pub struct SigningIdentity {
    key_id: String,
    key: PrivateKey,
    validity: Validity,
    revoked: AtomicBool,
}

impl SigningIdentity {
    /// Creates an identity with an explicit key id.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::InvalidIdentity`] if `key_id` is empty or contains
    /// characters that cannot be carried in a structured-field string.
    pub fn new(key_id: impl Into<String>, key: PrivateKey, validity: Validity) -> Result<Self> {
        let key_id = key_id.into();
        validate_key_id(&key_id)?;
        Ok(Self { key_id, key, validity, revoked: AtomicBool::new(false) })
    }

    /// Creates an identity whose key id is the RFC 7638 JWK thumbprint of its
    /// public key.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::KeyError`] if the public key cannot be expressed as a JWK.
    pub fn with_thumbprint_key_id(key: PrivateKey, validity: Validity) -> Result<Self> {
        let key_id = Jwk::from_public_key(&key.public_key())?.thumbprint()?;
        Self::new(key_id, key, validity)
    }

    /// Checks that the identity may sign at `now`.
    ///
    /// # Errors
    ///
    /// - [`TapError::IdentityRevoked`] if revoked
    /// - [`TapError::IdentityNotYetValid`] if `now < not_before`
    /// - [`TapError::IdentityExpired`] if `now > not_after`
    pub fn ensure_usable(&self, now: u64) -> Result<()> {
        if self.is_revoked() {
            return Err(TapError::IdentityRevoked(self.key_id.clone()));
        }
        if now < self.validity.not_before {
            return Err(TapError::IdentityNotYetValid {
                key_id: self.key_id.clone(),
                not_before: self.validity.not_before,
            });
        }
        if now > self.validity.not_after {
            return Err(TapError::IdentityExpired {
                key_id: self.key_id.clone(),
                not_after: self.validity.not_after,
            });
        }
        Ok(())
    }

    /// Public counterpart, suitable for a merchant's trust registry.
    #[must_use]
    pub fn verifying_identity(&self) -> VerifyingIdentity {
        VerifyingIdentity {
            key_id: self.key_id.clone(),
            key: self.key.public_key(),
            validity: self.validity,
            name: None,
            revoked: AtomicBool::new(false),
        }
    }

    pub(crate) fn private_key(&self) -> &PrivateKey {
        &self.key
    }
}

impl Identity for SigningIdentity {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn algorithm(&self) -> Algorithm {
        self.key.algorithm()
    }

    fn validity(&self) -> Validity {
        self.validity
    }

    fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::Acquire)
    }

    fn mark_revoked(&self) {
        self.revoked.store(true, Ordering::Release);
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.key.algorithm())
            .field("validity", &self.validity)
            .field("revoked", &self.is_revoked())
            .finish_non_exhaustive()
    }
}

/// Merchant-side identity holding only the public key.
#[derive(Debug)]
pub struct VerifyingIdentity {
    key_id: String,
    key: PublicKey,
    validity: Validity,
    name: Option<String>,
    revoked: AtomicBool,
}

impl VerifyingIdentity {
    /// Creates a verifying identity.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::InvalidIdentity`] for an empty or unsafe key id.
    pub fn new(key_id: impl Into<String>, key: PublicKey, validity: Validity) -> Result<Self> {
        let key_id = key_id.into();
        validate_key_id(&key_id)?;
        Ok(Self { key_id, key, validity, name: None, revoked: AtomicBool::new(false) })
    }

    /// Attaches a human-readable agent name, reported in verification outcomes.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Public key used to check signatures.
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.key
    }

    /// Agent name, if one was configured.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl Identity for VerifyingIdentity {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn algorithm(&self) -> Algorithm {
        self.key.algorithm()
    }

    fn validity(&self) -> Validity {
        self.validity
    }

    fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::Acquire)
    }

    fn mark_revoked(&self) {
        self.revoked.store(true, Ordering::Release);
    }
}

/// Key ids travel as sf-strings, so only printable ASCII without `"` or `\`
/// round-trips safely.
fn validate_key_id(key_id: &str) -> Result<()> {
    if key_id.is_empty() {
        return Err(TapError::InvalidIdentity("key id must not be empty".to_owned()));
    }
    if !key_id.bytes().all(|b| (0x20..0x7f).contains(&b) && b != b'"' && b != b'\\') {
        return Err(TapError::InvalidIdentity(format!(
            "key id `{}` contains unsupported characters",
            key_id.escape_default()
        )));
    }
    Ok(())
}
