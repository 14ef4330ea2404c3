//! JSON Web Key (JWK) and JWK Set (JWKS) support for agent key directories.
//!
//! Implements the [RFC 7517](https://www.rfc-editor.org/rfc/rfc7517.html)
//! public key formats for the three TAP algorithms and the
//! [RFC 7638](https://www.rfc-editor.org/rfc/rfc7638.html) thumbprint used as a
//! default `keyid`.
//!
//! | Algorithm | `kty` | Members | `alg` |
//! |-----------|-------|---------|-------|
//! | `ed25519` | `OKP` | `crv`, `x` | `EdDSA` |
//! | `ecdsa-p256-sha256` | `EC` | `crv`, `x`, `y` | `ES256` |
//! | `rsa-pss-sha256` | `RSA` | `n`, `e` | `PS256` |
//!
//! # JWK Thumbprint
//!
//! The thumbprint is the base64url (no padding) SHA-256 of the canonical JSON
//! containing only the required members in lexicographic order, e.g.
//! `{"crv":"Ed25519","kty":"OKP","x":"..."}`.
//!
//! A merchant can load a published [`Jwks`] into its trust registry with
//! [`Jwk::to_public_key`]; the `kid` becomes the key id.
//!
//! # Examples
//!
//! ```rust
//! use ed25519_dalek::SigningKey;
//! use tap_signature::tap::{
//!     PrivateKey,
//!     jwk::{Jwk, Jwks},
//! };
//!
//! let key = PrivateKey::Ed25519(SigningKey::from_bytes(&[0u8; 32]));
//! let jwk = Jwk::from_public_key(&key.public_key()).expect("ed25519 keys always convert");
//!
//! assert_eq!(jwk.kty, "OKP");
//! assert_eq!(jwk.kid.len(), 43);
//!
//! let json = Jwks::new(jwk).to_json().expect("serialization should succeed");
//! assert!(json.contains("\"keys\""));
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use p256::{EncodedPoint, FieldBytes};
use rsa::{BigUint, RsaPublicKey, traits::PublicKeyParts};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    error::{Result, TapError},
    tap::keys::PublicKey,
};

/// Public key in JWK form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    /// Key type: `OKP`, `EC` or `RSA`.
    pub kty: String,
    /// Curve name for `OKP` and `EC` keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    /// Public key (`OKP`) or x coordinate (`EC`), base64url.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// Y coordinate (`EC`), base64url.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    /// Modulus (`RSA`), base64url big-endian.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// Public exponent (`RSA`), base64url big-endian.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    /// Key ID (JWK thumbprint).
    pub kid: String,
    /// JOSE algorithm name.
    pub alg: String,
    /// Key usage (always `"verify"` for published keys).
    #[serde(rename = "use")]
    pub key_use: String,
}

impl Jwk {
    /// Converts a public key, computing its thumbprint as `kid`.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::KeyError`] if an EC point cannot be decompressed.
    pub fn from_public_key(key: &PublicKey) -> Result<Self> {
        let mut jwk = Self {
            kty: String::new(),
            crv: None,
            x: None,
            y: None,
            n: None,
            e: None,
            kid: String::new(),
            alg: String::new(),
            key_use: "verify".to_owned(),
        };

        match key {
            PublicKey::Ed25519(key) => {
                jwk.kty = "OKP".to_owned();
                jwk.crv = Some("Ed25519".to_owned());
                jwk.x = Some(URL_SAFE_NO_PAD.encode(key.as_bytes()));
                jwk.alg = "EdDSA".to_owned();
            }
            PublicKey::EcdsaP256(key) => {
                let point = key.to_encoded_point(false);
                let (Some(x), Some(y)) = (point.x(), point.y()) else {
                    return Err(TapError::KeyError("P-256 point has no affine coordinates".into()));
                };
                jwk.kty = "EC".to_owned();
                jwk.crv = Some("P-256".to_owned());
                jwk.x = Some(URL_SAFE_NO_PAD.encode(x));
                jwk.y = Some(URL_SAFE_NO_PAD.encode(y));
                jwk.alg = "ES256".to_owned();
            }
            PublicKey::RsaPss(key) => {
                jwk.kty = "RSA".to_owned();
                jwk.n = Some(URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()));
                jwk.e = Some(URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()));
                jwk.alg = "PS256".to_owned();
            }
        }

        jwk.kid = jwk.thumbprint()?;
        Ok(jwk)
    }

    /// Computes the RFC 7638 thumbprint.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::KeyError`] if the key type is unknown or a required
    /// member is missing.
    pub fn thumbprint(&self) -> Result<String> {
        // Members are base64url or fixed names, so no JSON escaping is needed.
        let canonical = match self.kty.as_str() {
            "OKP" => {
                format!(r#"{{"crv":"{}","kty":"OKP","x":"{}"}}"#, self.member("crv")?, self.member("x")?)
            }
            "EC" => format!(
                r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#,
                self.member("crv")?,
                self.member("x")?,
                self.member("y")?
            ),
            "RSA" => {
                format!(r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#, self.member("e")?, self.member("n")?)
            }
            other => return Err(TapError::KeyError(format!("unsupported JWK key type `{other}`"))),
        };

        Ok(URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes())))
    }

    /// Decodes the JWK back into a verification key.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::KeyError`] for unsupported curves, missing members,
    /// bad base64 or invalid key material.
    pub fn to_public_key(&self) -> Result<PublicKey> {
        match (self.kty.as_str(), self.crv.as_deref()) {
            ("OKP", Some("Ed25519")) => {
                let x = decode_member(self.member("x")?)?;
                let bytes: [u8; 32] = x
                    .as_slice()
                    .try_into()
                    .map_err(|_| TapError::KeyError("Ed25519 key must be 32 bytes".into()))?;
                ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                    .map(PublicKey::Ed25519)
                    .map_err(|e| TapError::KeyError(format!("invalid Ed25519 key: {e}")))
            }
            ("EC", Some("P-256")) => {
                let x = decode_member(self.member("x")?)?;
                let y = decode_member(self.member("y")?)?;
                if x.len() != 32 || y.len() != 32 {
                    return Err(TapError::KeyError("P-256 coordinates must be 32 bytes".into()));
                }
                let point = EncodedPoint::from_affine_coordinates(
                    FieldBytes::from_slice(&x),
                    FieldBytes::from_slice(&y),
                    false,
                );
                p256::ecdsa::VerifyingKey::from_encoded_point(&point)
                    .map(PublicKey::EcdsaP256)
                    .map_err(|e| TapError::KeyError(format!("invalid P-256 key: {e}")))
            }
            ("RSA", _) => {
                let n = BigUint::from_bytes_be(&decode_member(self.member("n")?)?);
                let e = BigUint::from_bytes_be(&decode_member(self.member("e")?)?);
                RsaPublicKey::new(n, e)
                    .map(|key| PublicKey::RsaPss(Box::new(key)))
                    .map_err(|e| TapError::KeyError(format!("invalid RSA key: {e}")))
            }
            (kty, crv) => Err(TapError::KeyError(format!(
                "unsupported JWK kty `{kty}` / crv `{}`",
                crv.unwrap_or("-")
            ))),
        }
    }

    fn member(&self, name: &str) -> Result<&str> {
        let value = match name {
            "crv" => &self.crv,
            "x" => &self.x,
            "y" => &self.y,
            "n" => &self.n,
            "e" => &self.e,
            _ => &None,
        };
        value
            .as_deref()
            .ok_or_else(|| TapError::KeyError(format!("{} JWK is missing `{name}`", self.kty)))
    }
}

fn decode_member(value: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| TapError::KeyError(format!("invalid base64url in JWK: {e}")))
}

/// JSON Web Key Set, as served from an agent's key directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwks {
    /// Published keys.
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Creates a JWKS with a single key.
    #[must_use]
    pub fn new(jwk: Jwk) -> Self {
        Self { keys: vec![jwk] }
    }

    /// Finds a key by `kid`.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|jwk| jwk.kid == kid)
    }

    /// Serializes the set to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parses a JWKS document.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::KeyError`] if the JSON is not a JWK set.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| TapError::KeyError(format!("invalid JWKS: {e}")))
    }
}
