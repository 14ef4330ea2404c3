//! HTTP request description consumed by the signer and the verifier.
//!
//! The engine only sees the method, the target and the header fields. Bodies
//! are covered indirectly through the `Content-Digest` field; use
//! [`compute_content_digest`] (or [`HttpRequest::with_content_digest`]) on the
//! sending side and [`verify_content_digest`] on the receiving side.

use base64::{Engine, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256, Sha512};
use url::Url;

use crate::{
    error::{Result, TapError},
    tap::components::is_token,
};

/// `Signature-Input` header name.
pub const SIGNATURE_INPUT_HEADER: &str = "signature-input";

/// `Signature` header name.
pub const SIGNATURE_HEADER: &str = "signature";

/// `Content-Digest` header name (RFC 9530).
pub const CONTENT_DIGEST_HEADER: &str = "content-digest";

/// Placeholder base for origin-form targets; never exposed.
const ORIGIN_FORM_BASE: &str = "http://origin-form.invalid";

/// Method, target and header fields of an HTTP request.
///
/// Header names are stored lowercase, values as received. Repeated fields keep
/// their order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    method: String,
    url: Url,
    absolute: bool,
    headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// Creates a request without header fields.
    ///
    /// `target` is either an absolute URL (`https://host/path?q`) or an
    /// origin-form target (`/path?q`), in which case `@authority` is taken from
    /// the `Host` header. Any fragment is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::MalformedInput`] if `method` is not an HTTP token or
    /// `target` cannot be parsed.
    pub fn new(method: &str, target: &str) -> Result<Self> {
        if !is_token(method) {
            return Err(TapError::MalformedInput(format!(
                "method `{}` is not an HTTP token",
                method.escape_default()
            )));
        }

        let absolute = !target.starts_with('/');
        let parsed = if absolute {
            Url::parse(target)
        } else {
            Url::parse(ORIGIN_FORM_BASE).map(|mut base| {
                set_origin_form(&mut base, target);
                base
            })
        };
        let mut url = parsed
            .map_err(|e| TapError::MalformedInput(format!("invalid request target: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(TapError::MalformedInput(format!("request target `{target}` has no path")));
        }
        url.set_fragment(None);

        Ok(Self { method: method.to_ascii_uppercase(), url, absolute, headers: Vec::new() })
    }

    /// Appends a header field and returns the request.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::MalformedInput`] for an invalid name or a value
    /// containing CR, LF or NUL.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        self.append_header(name, value)?;
        Ok(self)
    }

    /// Appends a header field, keeping existing lines with the same name.
    ///
    /// # Errors
    ///
    /// See [`with_header`](Self::with_header).
    pub fn append_header(&mut self, name: &str, value: &str) -> Result<()> {
        let name = validate_header(name, value)?;
        self.headers.push((name, value.to_owned()));
        Ok(())
    }

    /// Sets a header field, replacing all existing lines with the same name.
    ///
    /// # Errors
    ///
    /// See [`with_header`](Self::with_header).
    pub fn insert_header(&mut self, name: &str, value: &str) -> Result<()> {
        let name = validate_header(name, value)?;
        self.headers.retain(|(existing, _)| *existing != name);
        self.headers.push((name, value.to_owned()));
        Ok(())
    }

    /// Removes every line of a header field.
    pub fn remove_header(&mut self, name: &str) {
        let name = name.to_ascii_lowercase();
        self.headers.retain(|(existing, _)| *existing != name);
    }

    /// Sets `Content-Digest` to the SHA-256 digest of `body`.
    #[must_use]
    pub fn with_content_digest(mut self, body: &[u8]) -> Self {
        let name = CONTENT_DIGEST_HEADER.to_owned();
        self.headers.retain(|(existing, _)| *existing != name);
        self.headers.push((name, compute_content_digest(body)));
        self
    }

    /// Uppercased request method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Normalized absolute path; `/` when the target has none.
    #[must_use]
    pub fn path(&self) -> &str {
        match self.url.path() {
            "" => "/",
            path => path,
        }
    }

    /// Query string without the leading `?`.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.url.query()
    }

    /// Path plus query, the value of `@target-uri`.
    #[must_use]
    pub fn target(&self) -> String {
        match self.query() {
            Some(query) => format!("{}?{query}", self.path()),
            None => self.path().to_owned(),
        }
    }

    /// Lowercased host with any non-default port.
    ///
    /// Comes from the URL for absolute targets and from the `Host` header for
    /// origin-form targets.
    #[must_use]
    pub fn authority(&self) -> Option<String> {
        if self.absolute {
            let host = self.url.host_str()?.to_ascii_lowercase();
            return Some(match self.url.port() {
                Some(port) => format!("{host}:{port}"),
                None => host,
            });
        }
        self.header_values("host").next().map(|host| host.trim().to_ascii_lowercase())
    }

    /// Absolute URL as given, or `None` for origin-form targets.
    #[must_use]
    pub fn url(&self) -> Option<&Url> {
        self.absolute.then_some(&self.url)
    }

    /// All values of a header field, in order.
    pub fn header_values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .filter(move |(existing, _)| *existing == name)
            .map(|(_, value)| value.as_str())
    }

    /// Combined field value: each line trimmed with internal whitespace
    /// collapsed, lines joined by `", "`. `None` when the field is absent.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<String> {
        let lines: Vec<String> = self
            .header_values(name)
            .map(|value| value.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect();
        (!lines.is_empty()).then(|| lines.join(", "))
    }

    /// All header fields as `(lowercase name, value)` pairs.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl AsRef<Self> for HttpRequest {
    fn as_ref(&self) -> &Self {
        self
    }
}

/// Applies an origin-form target to the placeholder base.
///
/// The target is split by hand rather than resolved as a relative reference,
/// so `//host/path` stays a path and never replaces the authority.
fn set_origin_form(base: &mut Url, target: &str) {
    let target = target.split_once('#').map_or(target, |(head, _)| head);
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };
    base.set_path(path);
    base.set_query(query);
}

fn validate_header(name: &str, value: &str) -> Result<String> {
    if !is_token(name) {
        return Err(TapError::MalformedInput(format!(
            "header name `{}` is not an HTTP token",
            name.escape_default()
        )));
    }
    if value.bytes().any(|b| matches!(b, b'\r' | b'\n' | 0)) {
        return Err(TapError::MalformedInput(format!("header `{name}` has an invalid value")));
    }
    Ok(name.to_ascii_lowercase())
}

/// Hash algorithms accepted in `Content-Digest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    /// `sha-256`
    Sha256,
    /// `sha-512`
    Sha512,
}

impl DigestAlgorithm {
    /// Algorithm key as used in the dictionary, e.g. `sha-256`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha-256",
            Self::Sha512 => "sha-512",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        match key {
            "sha-256" => Some(Self::Sha256),
            "sha-512" => Some(Self::Sha512),
            _ => None,
        }
    }

    fn digest(self, body: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(body).to_vec(),
            Self::Sha512 => Sha512::digest(body).to_vec(),
        }
    }
}

/// Computes a SHA-256 `Content-Digest` value, e.g. `sha-256=:X48E9q...=:`.
///
/// # Examples
///
/// ```
/// use tap_signature::tap::compute_content_digest;
///
/// let digest = compute_content_digest(b"");
/// assert_eq!(digest, "sha-256=:47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=:");
/// ```
#[must_use]
pub fn compute_content_digest(body: &[u8]) -> String {
    compute_content_digest_with(DigestAlgorithm::Sha256, body)
}

/// Computes a `Content-Digest` value with the given algorithm.
#[must_use]
pub fn compute_content_digest_with(algorithm: DigestAlgorithm, body: &[u8]) -> String {
    format!("{}=:{}:", algorithm.as_str(), STANDARD.encode(algorithm.digest(body)))
}

/// Checks a received `Content-Digest` value against the body.
///
/// Unknown algorithm entries are ignored. Returns `true` only if at least one
/// known entry is present and every known entry matches.
#[must_use]
pub fn verify_content_digest(header_value: &str, body: &[u8]) -> bool {
    let mut matched = false;
    for member in header_value.split(',') {
        let Some((key, value)) = member.trim().split_once('=') else {
            return false;
        };
        let Some(algorithm) = DigestAlgorithm::from_key(key.trim()) else {
            continue;
        };
        let Some(encoded) = value.trim().strip_prefix(':').and_then(|v| v.strip_suffix(':'))
        else {
            return false;
        };
        match STANDARD.decode(encoded) {
            Ok(received) if received == algorithm.digest(body) => matched = true,
            _ => return false,
        }
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_uppercased_and_validated() {
        let request = HttpRequest::new("get", "https://merchant.example.com/").unwrap();
        assert_eq!(request.method(), "GET");
        assert!(matches!(
            HttpRequest::new("GE T", "https://merchant.example.com/"),
            Err(TapError::MalformedInput(_))
        ));
        assert!(HttpRequest::new("", "https://merchant.example.com/").is_err());
    }

    #[test]
    fn test_target_normalization() {
        let request =
            HttpRequest::new("GET", "https://merchant.example.com/api/./products?page=2#top")
                .unwrap();
        assert_eq!(request.path(), "/api/products");
        assert_eq!(request.query(), Some("page=2"));
        assert_eq!(request.target(), "/api/products?page=2");

        let request = HttpRequest::new("GET", "https://merchant.example.com").unwrap();
        assert_eq!(request.target(), "/");
    }

    #[test]
    fn test_origin_form_target() {
        let request = HttpRequest::new("POST", "/cart/items?x=1")
            .unwrap()
            .with_header("Host", "Merchant.Example.com:8443")
            .unwrap();
        assert_eq!(request.target(), "/cart/items?x=1");
        assert_eq!(request.authority().as_deref(), Some("merchant.example.com:8443"));
        assert!(request.url().is_none());
    }

    #[test]
    fn test_origin_form_double_slash_stays_in_path() {
        let request = HttpRequest::new("GET", "//attacker.example/api/products?page=2#top")
            .unwrap()
            .with_header("host", "merchant.example.com")
            .unwrap();
        assert_eq!(request.path(), "//attacker.example/api/products");
        assert_eq!(request.target(), "//attacker.example/api/products?page=2");
        assert_eq!(request.authority().as_deref(), Some("merchant.example.com"));

        let plain = HttpRequest::new("GET", "/api/products?page=2").unwrap();
        assert_ne!(request.target(), plain.target());
    }

    #[test]
    fn test_authority_drops_default_port() {
        let request = HttpRequest::new("GET", "https://Merchant.Example.com:443/a").unwrap();
        assert_eq!(request.authority().as_deref(), Some("merchant.example.com"));

        let request = HttpRequest::new("GET", "http://merchant.example.com:8080/a").unwrap();
        assert_eq!(request.authority().as_deref(), Some("merchant.example.com:8080"));
    }

    #[test]
    fn test_header_combination() {
        let request = HttpRequest::new("GET", "https://m.example.com/")
            .unwrap()
            .with_header("Accept", "  text/html,   application/json ")
            .unwrap()
            .with_header("accept", "*/*")
            .unwrap();
        assert_eq!(request.header("ACCEPT").as_deref(), Some("text/html, application/json, */*"));
        assert!(request.header("x-missing").is_none());
    }

    #[test]
    fn test_insert_header_replaces() {
        let mut request = HttpRequest::new("GET", "https://m.example.com/")
            .unwrap()
            .with_header("x-a", "1")
            .unwrap()
            .with_header("x-a", "2")
            .unwrap();
        request.insert_header("X-A", "3").unwrap();
        assert_eq!(request.header_values("x-a").collect::<Vec<_>>(), ["3"]);

        request.remove_header("x-a");
        assert!(request.header("x-a").is_none());
    }

    #[test]
    fn test_header_validation() {
        let request = HttpRequest::new("GET", "https://m.example.com/").unwrap();
        assert!(request.clone().with_header("bad name", "v").is_err());
        assert!(request.with_header("x-a", "line\r\nInjected: 1").is_err());
    }

    #[test]
    fn test_content_digest_sha512() {
        let value = compute_content_digest_with(DigestAlgorithm::Sha512, b"{}");
        assert!(value.starts_with("sha-512=:"));
        assert!(verify_content_digest(&value, b"{}"));
    }

    #[test]
    fn test_verify_content_digest() {
        let body = br#"{"product_id":"p-1","quantity":2}"#;
        let digest = compute_content_digest(body);

        assert!(verify_content_digest(&digest, body));
        assert!(!verify_content_digest(&digest, b"tampered"));
        assert!(!verify_content_digest("md5=:AAAA:", body), "no known algorithm");
        assert!(!verify_content_digest("garbage", body));

        let combined = format!("unixsum=:AAAA:, {digest}");
        assert!(verify_content_digest(&combined, body));
    }

    #[test]
    fn test_with_content_digest_sets_header() {
        let request = HttpRequest::new("POST", "https://m.example.com/cart")
            .unwrap()
            .with_content_digest(b"a")
            .with_content_digest(b"b");
        assert_eq!(request.header_values(CONTENT_DIGEST_HEADER).count(), 1);
        assert_eq!(request.header(CONTENT_DIGEST_HEADER), Some(compute_content_digest(b"b")));
    }
}
