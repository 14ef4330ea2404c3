//! Signature parameters and the `Signature-Input` / `Signature` wire format.
//!
//! Both fields are single-member structured-field dictionaries (RFC 8941).
//! The parser is deliberately narrow: it accepts exactly one member, the
//! parameters `created`, `expires`, `keyid`, `alg`, `nonce` and `tag`, and
//! rejects everything else as malformed.

use std::{collections::HashSet, fmt};

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, TapError},
    tap::{
        components::{Component, CoveredComponents},
        keys::Algorithm,
    },
};

/// Kind of agent interaction, carried in the `tag` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InteractionType {
    /// Browsing interaction (catalog, product details).
    #[serde(rename = "agent-browser-auth")]
    Browse,
    /// Payment interaction (checkout, payment processing).
    #[serde(rename = "agent-payer-auth")]
    Checkout,
}

impl InteractionType {
    /// Returns the TAP tag value for this interaction type.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Browse => "agent-browser-auth",
            Self::Checkout => "agent-payer-auth",
        }
    }

    /// Maps a tag value back to an interaction type.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "agent-browser-auth" => Some(Self::Browse),
            "agent-payer-auth" => Some(Self::Checkout),
            _ => None,
        }
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Parameters bound into every signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParameters {
    /// Ordered covered components.
    pub covered: CoveredComponents,
    /// Creation time, Unix seconds.
    pub created: u64,
    /// Expiry time, Unix seconds.
    pub expires: u64,
    /// Key identifier.
    pub key_id: String,
    /// Signature algorithm.
    pub algorithm: Algorithm,
    /// Single-use token.
    pub nonce: String,
    /// Optional interaction tag.
    pub tag: Option<InteractionType>,
}

impl SignatureParameters {
    /// `expires - created`, zero if inverted.
    #[must_use]
    pub const fn lifetime(&self) -> u64 {
        self.expires.saturating_sub(self.created)
    }

    /// Checks time ordering, lifetime bound and string safety.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::InvalidParameters`] if `expires <= created`, the
    /// lifetime exceeds `max_lifetime`, or `keyid` / `nonce` cannot be
    /// serialized as structured-field strings.
    pub fn validate(&self, max_lifetime: u64) -> Result<()> {
        if self.expires <= self.created {
            return Err(TapError::InvalidParameters(format!(
                "expires ({}) must be after created ({})",
                self.expires, self.created
            )));
        }
        if self.lifetime() > max_lifetime {
            return Err(TapError::InvalidParameters(format!(
                "signature lifetime {}s exceeds maximum {max_lifetime}s",
                self.lifetime()
            )));
        }
        for (name, value) in [("keyid", &self.key_id), ("nonce", &self.nonce)] {
            if value.is_empty() || !is_sf_string_safe(value) {
                return Err(TapError::InvalidParameters(format!(
                    "{name} is empty or contains non-printable characters"
                )));
            }
        }
        Ok(())
    }

    /// Serializes the inner list and parameters, the value of the
    /// `@signature-params` line.
    ///
    /// Parameter order is fixed: `created`, `expires`, `keyid`, `alg`,
    /// `nonce`, then `tag` when present.
    #[must_use]
    pub fn serialize(&self) -> String {
        let mut out = format!(
            "{};created={};expires={};keyid={};alg={};nonce={}",
            self.covered.to_inner_list(),
            self.created,
            self.expires,
            sf_string(&self.key_id),
            sf_string(self.algorithm.as_str()),
            sf_string(&self.nonce),
        );
        if let Some(tag) = self.tag {
            out.push_str(";tag=");
            out.push_str(&sf_string(tag.tag()));
        }
        out
    }

    /// `Signature-Input` field value for `label`.
    #[must_use]
    pub fn to_signature_input(&self, label: &str) -> String {
        format!("{label}={}", self.serialize())
    }
}

/// Parsed `Signature-Input` member, before the algorithm is resolved.
///
/// The algorithm stays a raw string so that an unknown name can be reported
/// separately from a syntactically broken field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInput {
    /// Dictionary key, e.g. `sig1`.
    pub label: String,
    /// Covered components, in received order.
    pub covered: CoveredComponents,
    /// `created` parameter.
    pub created: u64,
    /// `expires` parameter.
    pub expires: u64,
    /// `keyid` parameter.
    pub key_id: String,
    /// `alg` parameter as received.
    pub algorithm: String,
    /// `nonce` parameter.
    pub nonce: String,
    /// `tag` parameter.
    pub tag: Option<InteractionType>,
}

impl SignatureInput {
    /// Parses a `Signature-Input` field value.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::MalformedInput`] for anything other than a single
    /// dictionary member with an inner list of component identifiers and the
    /// known parameters, each present exactly once (`tag` optional).
    pub fn parse(value: &str) -> Result<Self> {
        let mut cursor = Cursor::new(value.trim_matches(|c| c == ' ' || c == '\t'));

        let label = cursor.key()?;
        cursor.expect(b'=')?;
        let covered = cursor.inner_list()?;

        let mut seen = HashSet::new();
        let (mut created, mut expires) = (None, None);
        let (mut key_id, mut algorithm, mut nonce, mut tag) = (None, None, None, None);

        while cursor.eat(b';') {
            cursor.skip_spaces();
            let name = cursor.key()?;
            if !seen.insert(name.clone()) {
                return Err(malformed(format!("duplicate parameter `{name}`")));
            }
            if !cursor.eat(b'=') {
                return Err(malformed(format!("parameter `{name}` has no value")));
            }
            match name.as_str() {
                "created" => created = Some(cursor.integer()?),
                "expires" => expires = Some(cursor.integer()?),
                "keyid" => key_id = Some(cursor.string()?),
                "alg" => algorithm = Some(cursor.string()?),
                "nonce" => nonce = Some(cursor.string()?),
                "tag" => {
                    let value = cursor.string()?;
                    tag = Some(
                        InteractionType::from_tag(&value)
                            .ok_or_else(|| malformed(format!("unknown tag `{value}`")))?,
                    );
                }
                other => return Err(malformed(format!("unknown parameter `{other}`"))),
            }
        }

        if !cursor.at_end() {
            return Err(malformed("unexpected content after the first member".to_owned()));
        }

        Ok(Self {
            label,
            covered,
            created: created.ok_or_else(|| missing("created"))?,
            expires: expires.ok_or_else(|| missing("expires"))?,
            key_id: key_id.ok_or_else(|| missing("keyid"))?,
            algorithm: algorithm.ok_or_else(|| missing("alg"))?,
            nonce: nonce.ok_or_else(|| missing("nonce"))?,
            tag,
        })
    }

    /// Binds the resolved algorithm, producing the parameters to verify.
    #[must_use]
    pub fn into_parameters(self, algorithm: Algorithm) -> SignatureParameters {
        SignatureParameters {
            covered: self.covered,
            created: self.created,
            expires: self.expires,
            key_id: self.key_id,
            algorithm,
            nonce: self.nonce,
            tag: self.tag,
        }
    }
}

/// Parses a `Signature` field value of the form `label=:base64:`.
///
/// Returns the label and the decoded signature bytes.
///
/// # Errors
///
/// Returns [`TapError::MalformedInput`] for multiple members, parameters,
/// a non-byte-sequence value or invalid base64.
pub fn parse_signature_header(value: &str) -> Result<(String, Vec<u8>)> {
    let mut cursor = Cursor::new(value.trim_matches(|c| c == ' ' || c == '\t'));
    let label = cursor.key()?;
    cursor.expect(b'=')?;
    let bytes = cursor.byte_sequence()?;
    if !cursor.at_end() {
        return Err(malformed("unexpected content after the signature".to_owned()));
    }
    Ok((label, bytes))
}

/// Formats a `Signature` field value.
pub(crate) fn format_signature_header(label: &str, signature: &[u8]) -> String {
    format!("{label}=:{}:", STANDARD.encode(signature))
}

fn malformed(message: String) -> TapError {
    TapError::MalformedInput(message)
}

fn missing(name: &str) -> TapError {
    malformed(format!("missing `{name}` parameter"))
}

/// Printable ASCII, the character set of an sf-string.
pub(crate) fn is_sf_string_safe(value: &str) -> bool {
    value.bytes().all(|b| (0x20..0x7f).contains(&b))
}

fn sf_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Byte cursor over a structured-field value.
struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(input: &'a str) -> Self {
        Self { input: input.as_bytes(), pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.eat(byte) {
            Ok(())
        } else {
            Err(malformed(format!("expected `{}` at offset {}", char::from(byte), self.pos)))
        }
    }

    fn skip_spaces(&mut self) {
        while self.eat(b' ') {}
    }

    /// `key = ( lcalpha / "*" ) *( lcalpha / DIGIT / "_" / "-" / "." / "*" )`
    fn key(&mut self) -> Result<String> {
        let start = self.pos;
        match self.peek() {
            Some(b) if b.is_ascii_lowercase() || b == b'*' => self.pos += 1,
            _ => return Err(malformed(format!("expected a key at offset {start}"))),
        }
        while let Some(b) = self.peek() {
            if b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'_' | b'-' | b'.' | b'*')
            {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    fn inner_list(&mut self) -> Result<CoveredComponents> {
        self.expect(b'(')?;
        let mut components = Vec::new();
        loop {
            self.skip_spaces();
            if self.eat(b')') {
                break;
            }
            let identifier = self.string()?;
            if self.peek() == Some(b';') {
                return Err(malformed(format!("component `{identifier}` carries parameters")));
            }
            components.push(Component::parse(&identifier)?);
            match self.peek() {
                Some(b' ' | b')') => {}
                _ => return Err(malformed("unterminated component list".to_owned())),
            }
        }
        CoveredComponents::new(components)
    }

    /// Non-negative sf-integer of at most 15 digits.
    fn integer(&mut self) -> Result<u64> {
        if self.peek() == Some(b'-') {
            return Err(malformed("negative integers are not allowed".to_owned()));
        }
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        let digits = &self.input[start..self.pos];
        if digits.is_empty() || digits.len() > 15 {
            return Err(malformed(format!("expected an integer at offset {start}")));
        }
        if self.peek() == Some(b'.') {
            return Err(malformed("decimals are not allowed".to_owned()));
        }
        std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| malformed(format!("invalid integer at offset {start}")))
    }

    fn string(&mut self) -> Result<String> {
        self.expect(b'"')?;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(malformed("unterminated string".to_owned())),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(c @ (b'"' | b'\\')) => {
                            out.push(char::from(c));
                            self.pos += 1;
                        }
                        _ => return Err(malformed("invalid escape in string".to_owned())),
                    }
                }
                Some(c) if (0x20..0x7f).contains(&c) => {
                    out.push(char::from(c));
                    self.pos += 1;
                }
                Some(_) => return Err(malformed("non-printable character in string".to_owned())),
            }
        }
    }

    fn byte_sequence(&mut self) -> Result<Vec<u8>> {
        self.expect(b':')?;
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
        {
            self.pos += 1;
        }
        let encoded = &self.input[start..self.pos];
        self.expect(b':')?;
        STANDARD.decode(encoded).map_err(|e| malformed(format!("invalid base64 signature: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = r#"sig1=("@method" "@target-uri");created=1700000000;expires=1700000300;keyid="agent-key-1";alg="ed25519";nonce="0f1e2d3c";tag="agent-browser-auth""#;

    fn sample() -> SignatureParameters {
        SignatureParameters {
            covered: CoveredComponents::method_and_target(),
            created: 1_700_000_000,
            expires: 1_700_000_300,
            key_id: "agent-key-1".to_owned(),
            algorithm: Algorithm::Ed25519,
            nonce: "0f1e2d3c".to_owned(),
            tag: Some(InteractionType::Browse),
        }
    }

    #[test]
    fn test_serialize_fixed_order() {
        assert_eq!(sample().to_signature_input("sig1"), HEADER);
    }

    #[test]
    fn test_parse_signature_input() {
        let input = SignatureInput::parse(HEADER).unwrap();
        assert_eq!(input.label, "sig1");
        assert_eq!(input.algorithm, "ed25519");
        assert_eq!(input.into_parameters(Algorithm::Ed25519), sample());
    }

    #[test]
    fn test_parse_accepts_reordered_parameters() {
        let header = r#"sig1=("@method");nonce="n";alg="ed25519";keyid="k";expires=20;created=10"#;
        let input = SignatureInput::parse(header).unwrap();
        assert_eq!((input.created, input.expires), (10, 20));
        assert!(input.tag.is_none());
    }

    #[test]
    fn test_parse_rejects_missing_and_duplicate_parameters() {
        let missing_nonce = r#"sig1=("@method");created=1;expires=2;keyid="k";alg="ed25519""#;
        assert!(matches!(SignatureInput::parse(missing_nonce), Err(TapError::MalformedInput(_))));

        let duplicate =
            r#"sig1=("@method");created=1;created=1;expires=2;keyid="k";alg="ed25519";nonce="n""#;
        assert!(matches!(SignatureInput::parse(duplicate), Err(TapError::MalformedInput(_))));
    }

    #[test]
    fn test_parse_rejects_unexpected_syntax() {
        let cases = [
            // unknown parameter
            r#"sig1=("@method");created=1;expires=2;keyid="k";alg="ed25519";nonce="n";foo=1"#,
            // boolean parameter
            r#"sig1=("@method");created=1;expires=2;keyid="k";alg="ed25519";nonce="n";keyid"#,
            // negative integer
            r#"sig1=("@method");created=-1;expires=2;keyid="k";alg="ed25519";nonce="n""#,
            // two members
            r#"sig1=("@method");created=1;expires=2;keyid="k";alg="ed25519";nonce="n", sig2=("@method")"#,
            // duplicate component
            r#"sig1=("@method" "@method");created=1;expires=2;keyid="k";alg="ed25519";nonce="n""#,
            // uppercase header component
            r#"sig1=("Host");created=1;expires=2;keyid="k";alg="ed25519";nonce="n""#,
            // component parameters
            r#"sig1=("@method";req);created=1;expires=2;keyid="k";alg="ed25519";nonce="n""#,
            // unknown tag
            r#"sig1=("@method");created=1;expires=2;keyid="k";alg="ed25519";nonce="n";tag="x""#,
            "",
            "sig1",
        ];
        for case in cases {
            assert!(
                matches!(SignatureInput::parse(case), Err(TapError::MalformedInput(_))),
                "should reject: {case}"
            );
        }
    }

    #[test]
    fn test_string_escapes_roundtrip() {
        let mut params = sample();
        params.key_id = r#"agent "quoted" \ key"#.to_owned();
        let header = params.to_signature_input("sig1");
        let parsed = SignatureInput::parse(&header).unwrap();
        assert_eq!(parsed.key_id, params.key_id);
    }

    #[test]
    fn test_validate_lifetime() {
        let mut params = sample();
        assert!(params.validate(480).is_ok());

        params.expires = params.created;
        assert!(matches!(params.validate(480), Err(TapError::InvalidParameters(_))));

        params.expires = params.created + 481;
        assert!(matches!(params.validate(480), Err(TapError::InvalidParameters(_))));

        params.expires = params.created + 480;
        assert!(params.validate(480).is_ok(), "maximum lifetime is inclusive");
    }

    #[test]
    fn test_validate_rejects_unsafe_nonce() {
        let mut params = sample();
        params.nonce = "tab\there".to_owned();
        assert!(matches!(params.validate(480), Err(TapError::InvalidParameters(_))));
    }

    #[test]
    fn test_parse_signature_header() {
        let value = format_signature_header("sig1", &[1, 2, 3, 250]);
        let (label, bytes) = parse_signature_header(&value).unwrap();
        assert_eq!(label, "sig1");
        assert_eq!(bytes, [1, 2, 3, 250]);

        assert!(parse_signature_header("sig1=:not base64!:").is_err());
        assert!(parse_signature_header("sig1=:AQID:;alg=1").is_err());
        assert!(parse_signature_header("sig1=\"AQID\"").is_err());
        assert!(parse_signature_header("sig1=:AQID:, sig2=:AQID:").is_err());
    }

    #[test]
    fn test_interaction_type_serde() {
        let json = serde_json::to_string(&InteractionType::Checkout).unwrap();
        assert_eq!(json, "\"agent-payer-auth\"");
        assert_eq!(InteractionType::from_tag("agent-browser-auth"), Some(InteractionType::Browse));
        assert_eq!(InteractionType::from_tag("browsing"), None);
    }
}
