//! Key and trust registries.
//!
//! One generic [`KeyRegistry`] backs both sides: the agent keeps its
//! [`SigningIdentity`] values in a [`SignerRegistry`], the merchant keeps
//! [`VerifyingIdentity`] values in a [`TrustRegistry`]. Lookups take a read
//! lock and can run in parallel; registration, revocation and rotation take
//! the write lock.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    audit,
    error::{Result, TapError},
    security::audit::AuditEventType,
    tap::{
        TAP_MAX_VALIDITY_WINDOW_SECS,
        identity::{Identity, SigningIdentity, VerifyingIdentity},
    },
};

/// Registry of signing identities, keyed by key id.
pub type SignerRegistry = KeyRegistry<SigningIdentity>;

/// Registry of trusted agent public keys, keyed by key id.
pub type TrustRegistry = KeyRegistry<VerifyingIdentity>;

#[derive(Debug)]
struct Entry<I> {
    identity: Arc<I>,
    revoke_at: Option<u64>,
}

/// Thread-safe map from key id to identity with revocation and rotation.
#[derive(Debug)]
pub struct KeyRegistry<I> {
    entries: RwLock<HashMap<String, Entry<I>>>,
    min_rotation_grace: u64,
}

impl<I: Identity> KeyRegistry<I> {
    /// Creates an empty registry.
    ///
    /// Rotation grace periods must cover at least one maximum signature
    /// lifetime ([`TAP_MAX_VALIDITY_WINDOW_SECS`]).
    #[must_use]
    pub fn new() -> Self {
        Self::with_min_rotation_grace(TAP_MAX_VALIDITY_WINDOW_SECS)
    }

    /// Creates an empty registry with a custom minimum rotation grace.
    ///
    /// Use the verifier's maximum lifetime plus its clock skew so that every
    /// signature issued before a rotation can still be verified.
    #[must_use]
    pub fn with_min_rotation_grace(min_rotation_grace: u64) -> Self {
        Self { entries: RwLock::new(HashMap::new()), min_rotation_grace }
    }

    /// Looks up an identity, ignoring scheduled revocations.
    #[must_use]
    pub fn resolve(&self, key_id: &str) -> Option<Arc<I>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key_id).map(|entry| Arc::clone(&entry.identity))
    }

    /// Looks up an identity as of `now`, applying any revocation scheduled at
    /// or before `now`.
    #[must_use]
    pub fn resolve_at(&self, key_id: &str, now: u64) -> Option<Arc<I>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(key_id)?;
        if entry.revoke_at.is_some_and(|at| at <= now) && !entry.identity.is_revoked() {
            entry.identity.mark_revoked();
            audit!(AuditEventType::KeyRevoked, key_id, Uuid::new_v4());
        }
        Some(Arc::clone(&entry.identity))
    }

    /// Adds an identity.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::DuplicateKey`] if the key id is already registered.
    #[instrument(skip(self, identity), fields(key_id = identity.key_id()))]
    pub fn register(&self, identity: I) -> Result<Arc<I>> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let key_id = identity.key_id().to_owned();
        if entries.contains_key(&key_id) {
            return Err(TapError::DuplicateKey(key_id));
        }

        let identity = Arc::new(identity);
        entries.insert(key_id.clone(), Entry { identity: Arc::clone(&identity), revoke_at: None });
        drop(entries);

        debug!("identity registered");
        audit!(
            AuditEventType::KeyRegistered,
            &key_id,
            Uuid::new_v4(),
            with_algorithm(identity.algorithm().as_str())
        );
        Ok(identity)
    }

    /// Revokes an identity immediately. Revoking twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::UnknownKey`] if the key id is not registered.
    #[instrument(skip(self))]
    pub fn revoke(&self, key_id: &str) -> Result<()> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(key_id).ok_or_else(|| TapError::UnknownKey(key_id.to_owned()))?;
        if !entry.identity.is_revoked() {
            entry.identity.mark_revoked();
            audit!(AuditEventType::KeyRevoked, key_id, Uuid::new_v4());
        }
        Ok(())
    }

    /// Registers `new_identity` and schedules revocation of `old_key_id` at
    /// `now + grace`.
    ///
    /// Both identities resolve during the grace period, so signatures issued
    /// with the old key just before the rotation still verify.
    ///
    /// # Errors
    ///
    /// - [`TapError::InvalidParameters`] if `grace` is below the minimum
    /// - [`TapError::UnknownKey`] if `old_key_id` is not registered
    /// - [`TapError::DuplicateKey`] if the new key id is already registered
    #[instrument(skip(self, new_identity), fields(new_key_id = new_identity.key_id()))]
    pub fn rotate(
        &self,
        new_identity: I,
        old_key_id: &str,
        grace: u64,
        now: u64,
    ) -> Result<Arc<I>> {
        if grace < self.min_rotation_grace {
            return Err(TapError::InvalidParameters(format!(
                "rotation grace {grace}s is shorter than the minimum {}s",
                self.min_rotation_grace
            )));
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let new_key_id = new_identity.key_id().to_owned();
        if entries.contains_key(&new_key_id) {
            return Err(TapError::DuplicateKey(new_key_id));
        }
        let old = entries
            .get_mut(old_key_id)
            .ok_or_else(|| TapError::UnknownKey(old_key_id.to_owned()))?;

        let revoke_at = now.saturating_add(grace);
        // An earlier schedule wins.
        let revoke_at = old.revoke_at.map_or(revoke_at, |existing| existing.min(revoke_at));
        old.revoke_at = Some(revoke_at);

        let identity = Arc::new(new_identity);
        entries.insert(new_key_id.clone(), Entry { identity: Arc::clone(&identity), revoke_at: None });
        drop(entries);

        debug!(revoke_at, "key rotated");
        audit!(
            AuditEventType::KeyRotated,
            &new_key_id,
            Uuid::new_v4(),
            with_replaced_key_id(old_key_id),
            with_revoke_at(revoke_at)
        );
        Ok(identity)
    }

    /// Scheduled revocation time for a key, if any.
    #[must_use]
    pub fn scheduled_revocation(&self, key_id: &str) -> Option<u64> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key_id).and_then(|entry| entry.revoke_at)
    }

    /// Registered key ids, sorted.
    #[must_use]
    pub fn key_ids(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = entries.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered identities, revoked ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Minimum accepted rotation grace in seconds.
    #[must_use]
    pub const fn min_rotation_grace(&self) -> u64 {
        self.min_rotation_grace
    }
}

impl<I: Identity> Default for KeyRegistry<I> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;

    use super::*;
    use crate::tap::{identity::Validity, keys::PrivateKey};

    fn identity(key_id: &str, seed: u8) -> SigningIdentity {
        let key = PrivateKey::Ed25519(SigningKey::from_bytes(&[seed; 32]));
        SigningIdentity::new(key_id, key, Validity::unbounded()).unwrap()
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = SignerRegistry::new();
        assert!(registry.is_empty());

        registry.register(identity("k1", 1)).unwrap();
        assert_eq!(registry.resolve("k1").unwrap().key_id(), "k1");
        assert!(registry.resolve("k2").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let registry = SignerRegistry::new();
        registry.register(identity("k1", 1)).unwrap();
        assert!(matches!(registry.register(identity("k1", 2)), Err(TapError::DuplicateKey(_))));
    }

    #[test]
    fn test_revoke() {
        let registry = SignerRegistry::new();
        let handle = registry.register(identity("k1", 1)).unwrap();

        registry.revoke("k1").unwrap();
        assert!(handle.is_revoked(), "revocation is visible through existing handles");
        assert!(registry.resolve("k1").unwrap().is_revoked());
        registry.revoke("k1").unwrap();

        assert!(matches!(registry.revoke("missing"), Err(TapError::UnknownKey(_))));
    }

    #[test]
    fn test_rotate_schedules_revocation() {
        let registry = SignerRegistry::new();
        registry.register(identity("old", 1)).unwrap();

        registry.rotate(identity("new", 2), "old", 600, 1_000).unwrap();
        assert_eq!(registry.scheduled_revocation("old"), Some(1_600));

        assert!(!registry.resolve_at("old", 1_599).unwrap().is_revoked());
        assert!(!registry.resolve("old").unwrap().is_revoked(), "plain lookups are time-agnostic");
        assert!(registry.resolve_at("old", 1_600).unwrap().is_revoked());
        assert!(!registry.resolve_at("new", 1_600).unwrap().is_revoked());
    }

    #[test]
    fn test_rotate_rejects_short_grace() {
        let registry = SignerRegistry::new();
        registry.register(identity("old", 1)).unwrap();

        let result = registry.rotate(identity("new", 2), "old", 479, 1_000);
        assert!(matches!(result, Err(TapError::InvalidParameters(_))));
        assert!(registry.resolve("new").is_none());

        let registry = SignerRegistry::with_min_rotation_grace(60);
        registry.register(identity("old", 1)).unwrap();
        assert!(registry.rotate(identity("new", 2), "old", 60, 1_000).is_ok());
    }

    #[test]
    fn test_rotate_errors() {
        let registry = SignerRegistry::new();
        registry.register(identity("a", 1)).unwrap();
        registry.register(identity("b", 2)).unwrap();

        assert!(matches!(
            registry.rotate(identity("c", 3), "missing", 600, 0),
            Err(TapError::UnknownKey(_))
        ));
        assert!(matches!(
            registry.rotate(identity("b", 3), "a", 600, 0),
            Err(TapError::DuplicateKey(_))
        ));
        assert_eq!(registry.key_ids(), ["a", "b"]);
    }

    #[test]
    fn test_earlier_schedule_wins() {
        let registry = SignerRegistry::new();
        registry.register(identity("old", 1)).unwrap();
        registry.rotate(identity("new1", 2), "old", 500, 1_000).unwrap();
        registry.rotate(identity("new2", 3), "old", 900, 1_000).unwrap();
        assert_eq!(registry.scheduled_revocation("old"), Some(1_500));
    }

    #[test]
    fn test_trust_registry_holds_public_identities() {
        let trust = TrustRegistry::new();
        let signer = identity("k1", 1);
        trust.register(signer.verifying_identity().with_name("Agent")).unwrap();
        assert_eq!(trust.resolve("k1").unwrap().name(), Some("Agent"));
    }
}
