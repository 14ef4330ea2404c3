//! Signature algorithms and key material.
//!
//! The supported set is closed: Ed25519, ECDSA P-256 with SHA-256 and RSA-PSS
//! with SHA-256. Private and public halves are separate types so a verifier
//! never holds signing material.

use std::{fmt, str::FromStr};

use ed25519_dalek::Signer as _;
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rand_core::OsRng;
use rsa::{Pss, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use signature::Verifier as _;
use zeroize::Zeroizing;

use crate::error::{Result, TapError};

/// RSA modulus size used by [`PrivateKey::generate`].
pub const RSA_KEY_BITS: usize = 2048;

/// Signature algorithm advertised in the `alg` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// EdDSA over Curve25519.
    #[serde(rename = "ed25519")]
    Ed25519,
    /// ECDSA over NIST P-256 with SHA-256, fixed-size `r || s` encoding.
    #[serde(rename = "ecdsa-p256-sha256")]
    EcdsaP256,
    /// RSASSA-PSS with SHA-256 and MGF1-SHA-256, salt length 32.
    #[serde(rename = "rsa-pss-sha256")]
    RsaPss,
}

impl Algorithm {
    /// All supported algorithms.
    pub const ALL: [Self; 3] = [Self::Ed25519, Self::EcdsaP256, Self::RsaPss];

    /// Returns the wire name used in the `alg` parameter.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ed25519 => "ed25519",
            Self::EcdsaP256 => "ecdsa-p256-sha256",
            Self::RsaPss => "rsa-pss-sha256",
        }
    }

    /// Maps a wire name back to an algorithm.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.as_str() == name)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = TapError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_wire(s).ok_or_else(|| TapError::KeyError(format!("unsupported algorithm: {s}")))
    }
}

/// Private signing key, held only on the signer side.
#[derive(Clone)]
pub enum PrivateKey {
    /// Ed25519 signing key.
    Ed25519(ed25519_dalek::SigningKey),
    /// ECDSA P-256 signing key.
    EcdsaP256(p256::ecdsa::SigningKey),
    /// RSA private key used with PSS padding.
    RsaPss(Box<RsaPrivateKey>),
}

impl PrivateKey {
    /// Generates a fresh key from the operating system RNG.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::KeyError`] if RSA key generation fails.
    pub fn generate(algorithm: Algorithm) -> Result<Self> {
        Ok(match algorithm {
            Algorithm::Ed25519 => Self::Ed25519(ed25519_dalek::SigningKey::generate(&mut OsRng)),
            Algorithm::EcdsaP256 => Self::EcdsaP256(p256::ecdsa::SigningKey::random(&mut OsRng)),
            Algorithm::RsaPss => {
                let key = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
                    .map_err(|e| TapError::KeyError(format!("RSA key generation failed: {e}")))?;
                Self::RsaPss(Box::new(key))
            }
        })
    }

    /// Decodes a PKCS#8 PEM private key, detecting the algorithm from its OID.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::KeyError`] if the PEM holds none of the supported key types.
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self> {
        if let Ok(key) = ed25519_dalek::SigningKey::from_pkcs8_pem(pem) {
            return Ok(Self::Ed25519(key));
        }
        if let Ok(key) = p256::ecdsa::SigningKey::from_pkcs8_pem(pem) {
            return Ok(Self::EcdsaP256(key));
        }
        RsaPrivateKey::from_pkcs8_pem(pem)
            .map(|key| Self::RsaPss(Box::new(key)))
            .map_err(|e| TapError::KeyError(format!("unsupported or invalid private key: {e}")))
    }

    /// Encodes the key as PKCS#8 PEM. The returned string is wiped on drop.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::KeyError`] if encoding fails.
    pub fn to_pkcs8_pem(&self) -> Result<Zeroizing<String>> {
        let encoded = match self {
            Self::Ed25519(key) => key.to_pkcs8_pem(LineEnding::LF),
            Self::EcdsaP256(key) => key.to_pkcs8_pem(LineEnding::LF),
            Self::RsaPss(key) => key.to_pkcs8_pem(LineEnding::LF),
        };
        encoded.map_err(|e| TapError::KeyError(format!("PKCS#8 encoding failed: {e}")))
    }

    /// Returns the algorithm this key signs with.
    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        match self {
            Self::Ed25519(_) => Algorithm::Ed25519,
            Self::EcdsaP256(_) => Algorithm::EcdsaP256,
            Self::RsaPss(_) => Algorithm::RsaPss,
        }
    }

    /// Derives the matching public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        match self {
            Self::Ed25519(key) => PublicKey::Ed25519(key.verifying_key()),
            Self::EcdsaP256(key) => PublicKey::EcdsaP256(key.verifying_key().to_owned()),
            Self::RsaPss(key) => PublicKey::RsaPss(Box::new(key.to_public_key())),
        }
    }

    /// Signs `message`, returning the raw signature bytes.
    ///
    /// Ed25519 and ECDSA (RFC 6979) are deterministic; RSA-PSS draws its salt
    /// from the OS RNG.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::CryptoError`] if the primitive fails.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Ed25519(key) => key
                .try_sign(message)
                .map(|sig| sig.to_bytes().to_vec())
                .map_err(|e| TapError::CryptoError(format!("ed25519 signing failed: {e}"))),
            Self::EcdsaP256(key) => {
                let sig: p256::ecdsa::Signature = signature::Signer::try_sign(key, message)
                    .map_err(|e| TapError::CryptoError(format!("ecdsa signing failed: {e}")))?;
                Ok(sig.to_bytes().to_vec())
            }
            Self::RsaPss(key) => {
                let hashed = Sha256::digest(message);
                key.sign_with_rng(&mut OsRng, Pss::new::<Sha256>(), &hashed)
                    .map_err(|e| TapError::CryptoError(format!("rsa-pss signing failed: {e}")))
            }
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

/// Public verifying key, held only on the verifier side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    /// Ed25519 verifying key.
    Ed25519(ed25519_dalek::VerifyingKey),
    /// ECDSA P-256 verifying key.
    EcdsaP256(p256::ecdsa::VerifyingKey),
    /// RSA public key used with PSS padding.
    RsaPss(Box<RsaPublicKey>),
}

impl PublicKey {
    /// Decodes an SPKI PEM public key, detecting the algorithm from its OID.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::KeyError`] if the PEM holds none of the supported key types.
    pub fn from_public_key_pem(pem: &str) -> Result<Self> {
        if let Ok(key) = ed25519_dalek::VerifyingKey::from_public_key_pem(pem) {
            return Ok(Self::Ed25519(key));
        }
        if let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_pem(pem) {
            return Ok(Self::EcdsaP256(key));
        }
        RsaPublicKey::from_public_key_pem(pem)
            .map(|key| Self::RsaPss(Box::new(key)))
            .map_err(|e| TapError::KeyError(format!("unsupported or invalid public key: {e}")))
    }

    /// Encodes the key as SPKI PEM.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::KeyError`] if encoding fails.
    pub fn to_public_key_pem(&self) -> Result<String> {
        let encoded = match self {
            Self::Ed25519(key) => key.to_public_key_pem(LineEnding::LF),
            Self::EcdsaP256(key) => key.to_public_key_pem(LineEnding::LF),
            Self::RsaPss(key) => key.to_public_key_pem(LineEnding::LF),
        };
        encoded.map_err(|e| TapError::KeyError(format!("SPKI encoding failed: {e}")))
    }

    /// Returns the algorithm this key verifies.
    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        match self {
            Self::Ed25519(_) => Algorithm::Ed25519,
            Self::EcdsaP256(_) => Algorithm::EcdsaP256,
            Self::RsaPss(_) => Algorithm::RsaPss,
        }
    }

    /// Checks `signature` over `message`.
    ///
    /// Returns `false` for a wrong-length or otherwise undecodable signature
    /// as well as for a mismatch.
    #[must_use]
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        match self {
            Self::Ed25519(key) => ed25519_dalek::Signature::from_slice(signature)
                .is_ok_and(|sig| key.verify(message, &sig).is_ok()),
            Self::EcdsaP256(key) => p256::ecdsa::Signature::from_slice(signature)
                .is_ok_and(|sig| key.verify(message, &sig).is_ok()),
            Self::RsaPss(key) => {
                let hashed = Sha256::digest(message);
                key.verify(Pss::new::<Sha256>(), &hashed, signature).is_ok()
            }
        }
    }
}
