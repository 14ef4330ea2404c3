//! Engine configuration.
//!
//! [`TapConfig`] is read from TOML and bundles the signer settings, the
//! verifier settings and the list of trusted agent keys.
//!
//! ```toml
//! [signer]
//! lifetime_secs = 120
//! label = "sig1"
//! covered_components = ["@method", "@target-uri", "@authority"]
//! tag = "agent-browser-auth"
//!
//! [verifier]
//! clock_skew_secs = 5
//! max_lifetime_secs = 480
//! required_components = ["@method", "@target-uri"]
//!
//! [[trusted_keys]]
//! key_id = "agent-key-1"
//! algorithm = "ed25519"
//! public_key_path = "keys/agent-key-1.pub.pem"
//! name = "Shopping Agent"
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Deserialize;
use tracing::{debug, instrument};

use crate::{
    error::{Result, TapError},
    tap::{
        Algorithm, PublicKey, ReplayCache, SignerConfig, TapVerifier, TrustRegistry, Validity,
        VerifierConfig, VerifyingIdentity,
    },
};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TapConfig {
    /// Outbound signing settings.
    pub signer: SignerConfig,
    /// Inbound verification settings.
    pub verifier: VerifierConfig,
    /// Agent public keys the verifier trusts.
    pub trusted_keys: Vec<TrustedKeyConfig>,
}

/// One `[[trusted_keys]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrustedKeyConfig {
    /// Key id agents put in `keyid`.
    pub key_id: String,
    /// Expected algorithm; checked against the loaded key when set.
    #[serde(default)]
    pub algorithm: Option<Algorithm>,
    /// SPKI PEM file. Relative paths resolve against the configuration file.
    pub public_key_path: PathBuf,
    /// Human-readable agent name reported in verification outcomes.
    #[serde(default)]
    pub name: Option<String>,
    /// Start of the validity window, Unix seconds.
    #[serde(default)]
    pub not_before: Option<u64>,
    /// End of the validity window, Unix seconds.
    #[serde(default)]
    pub not_after: Option<u64>,
}

impl TapConfig {
    /// Parses configuration from a TOML string and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::ConfigError`] if the TOML is invalid or a value is
    /// out of bounds.
    pub fn from_toml(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| TapError::ConfigError(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a configuration file.
    ///
    /// Relative `public_key_path` values are rewritten against the directory
    /// containing `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::ConfigError`] if the file cannot be read or fails
    /// [`from_toml`](Self::from_toml).
    #[instrument]
    pub fn from_file(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path).map_err(|e| {
            TapError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_toml(&source)?;

        if let Some(base) = path.parent() {
            for key in &mut config.trusted_keys {
                if key.public_key_path.is_relative() {
                    key.public_key_path = base.join(&key.public_key_path);
                }
            }
        }
        debug!(trusted_keys = config.trusted_keys.len(), "configuration loaded");
        Ok(config)
    }

    /// Checks every section.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::ConfigError`] on the first invalid value, including
    /// duplicate trusted key ids and inverted validity windows.
    pub fn validate(&self) -> Result<()> {
        self.signer.validate()?;
        self.verifier.validate()?;

        let mut seen = std::collections::HashSet::new();
        for key in &self.trusted_keys {
            if !seen.insert(key.key_id.as_str()) {
                return Err(TapError::ConfigError(format!(
                    "trusted key `{}` is listed twice",
                    key.key_id
                )));
            }
            key.validity()?;
        }
        Ok(())
    }

    /// Loads every trusted key into a fresh registry.
    ///
    /// The registry's minimum rotation grace is the verifier's maximum
    /// lifetime plus its clock skew.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::ConfigError`] if a key file cannot be read or
    /// does not match its declared algorithm, and [`TapError::KeyError`] if it
    /// is not a valid SPKI PEM key.
    pub fn load_trust_registry(&self) -> Result<TrustRegistry> {
        let registry = TrustRegistry::with_min_rotation_grace(self.verifier.min_rotation_grace());
        for key in &self.trusted_keys {
            registry.register(key.load()?)?;
        }
        Ok(registry)
    }

    /// Builds a verifier over the configured trust registry and a new replay
    /// cache.
    ///
    /// # Errors
    ///
    /// See [`load_trust_registry`](Self::load_trust_registry).
    pub fn build_verifier(&self) -> Result<TapVerifier> {
        let trust = Arc::new(self.load_trust_registry()?);
        TapVerifier::new(trust, Arc::new(ReplayCache::new()), self.verifier.clone())
    }
}

impl TrustedKeyConfig {
    fn validity(&self) -> Result<Validity> {
        Validity::new(self.not_before.unwrap_or(0), self.not_after.unwrap_or(u64::MAX)).map_err(
            |_| TapError::ConfigError(format!("trusted key `{}` has not_before > not_after", self.key_id)),
        )
    }

    /// Reads the PEM file and builds the identity.
    ///
    /// # Errors
    ///
    /// See [`TapConfig::load_trust_registry`].
    pub fn load(&self) -> Result<VerifyingIdentity> {
        let pem = fs::read_to_string(&self.public_key_path).map_err(|e| {
            TapError::ConfigError(format!(
                "cannot read key for `{}` from {}: {e}",
                self.key_id,
                self.public_key_path.display()
            ))
        })?;
        let key = PublicKey::from_public_key_pem(&pem)?;
        if let Some(expected) = self.algorithm.filter(|alg| *alg != key.algorithm()) {
            return Err(TapError::ConfigError(format!(
                "trusted key `{}` is {} but configured as {expected}",
                self.key_id,
                key.algorithm()
            )));
        }

        let identity = VerifyingIdentity::new(self.key_id.clone(), key, self.validity()?)?;
        Ok(match &self.name {
            Some(name) => identity.with_name(name.clone()),
            None => identity,
        })
    }
}
