//! Covered component identifiers.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TapError};

/// One request-derived value that can be included in a signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Component {
    /// `@method`: the request method, uppercased.
    Method,
    /// `@target-uri`: normalized absolute path plus query, without fragment.
    TargetUri,
    /// `@authority`: lowercased host with non-default port.
    Authority,
    /// `@path`: normalized absolute path.
    Path,
    /// `@query`: `?` followed by the query string (`?` alone when absent).
    Query,
    /// `content-digest`: the transmitted `Content-Digest` field value.
    ContentDigest,
    /// Any other header field, by lowercase name.
    Header(String),
}

impl Component {
    /// Creates a header component, lowercasing `name`.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::MalformedInput`] if `name` is not an HTTP token or
    /// names a derived component.
    pub fn header(name: &str) -> Result<Self> {
        Self::parse(&name.to_ascii_lowercase())
    }

    /// Parses a component identifier as it appears on the wire.
    ///
    /// Identifiers are case-sensitive: header names must already be lowercase.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::MalformedInput`] for unknown derived components,
    /// uppercase header names or non-token characters.
    pub fn parse(identifier: &str) -> Result<Self> {
        match identifier {
            "@method" => Ok(Self::Method),
            "@target-uri" => Ok(Self::TargetUri),
            "@authority" => Ok(Self::Authority),
            "@path" => Ok(Self::Path),
            "@query" => Ok(Self::Query),
            "content-digest" => Ok(Self::ContentDigest),
            id if id.starts_with('@') => {
                Err(TapError::MalformedInput(format!("unsupported derived component `{id}`")))
            }
            name => {
                if !is_token(name) || name.bytes().any(|b| b.is_ascii_uppercase()) {
                    return Err(TapError::MalformedInput(format!(
                        "invalid header component name `{name}`"
                    )));
                }
                Ok(Self::Header(name.to_owned()))
            }
        }
    }

    /// Returns the identifier used in the signature base and `Signature-Input`.
    #[must_use]
    pub fn identifier(&self) -> &str {
        match self {
            Self::Method => "@method",
            Self::TargetUri => "@target-uri",
            Self::Authority => "@authority",
            Self::Path => "@path",
            Self::Query => "@query",
            Self::ContentDigest => "content-digest",
            Self::Header(name) => name,
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl FromStr for Component {
    type Err = TapError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Component {
    type Error = TapError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Component> for String {
    fn from(component: Component) -> Self {
        component.identifier().to_owned()
    }
}

/// Ordered, duplicate-free sequence of covered components.
///
/// Order is significant: it fixes the line order of the signature base and
/// must be identical on both sides after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CoveredComponents(Vec<Component>);

impl CoveredComponents {
    /// Builds a component set.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::MalformedInput`] if the sequence is empty or repeats a component.
    pub fn new(components: impl IntoIterator<Item = Component>) -> Result<Self> {
        let mut covered = Vec::new();
        for component in components {
            if covered.contains(&component) {
                return Err(TapError::MalformedInput(format!(
                    "component `{component}` is covered twice"
                )));
            }
            covered.push(component);
        }
        if covered.is_empty() {
            return Err(TapError::MalformedInput("no covered components".to_owned()));
        }
        Ok(Self(covered))
    }

    /// `("@method" "@target-uri")`, the default coverage for agent requests.
    #[must_use]
    pub fn method_and_target() -> Self {
        Self(vec![Component::Method, Component::TargetUri])
    }

    /// Parses wire identifiers in order.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::MalformedInput`] for invalid or repeated identifiers.
    pub fn from_identifiers<S: AsRef<str>>(identifiers: &[S]) -> Result<Self> {
        let components =
            identifiers.iter().map(|id| Component::parse(id.as_ref())).collect::<Result<Vec<_>>>()?;
        Self::new(components)
    }

    /// Returns a copy with `component` appended, unless it is already covered.
    #[must_use]
    pub fn with(&self, component: Component) -> Self {
        let mut covered = self.clone();
        if !covered.contains(&component) {
            covered.0.push(component);
        }
        covered
    }

    /// Returns `true` if `component` is covered.
    #[must_use]
    pub fn contains(&self, component: &Component) -> bool {
        self.0.contains(component)
    }

    /// Iterates components in signature order.
    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.0.iter()
    }

    /// Number of covered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Never `true`; construction rejects an empty list.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serializes the inner list, e.g. `("@method" "@target-uri")`.
    #[must_use]
    pub fn to_inner_list(&self) -> String {
        let ids: Vec<String> = self.0.iter().map(|c| format!("\"{}\"", c.identifier())).collect();
        format!("({})", ids.join(" "))
    }
}

impl Default for CoveredComponents {
    fn default() -> Self {
        Self::method_and_target()
    }
}

impl TryFrom<Vec<String>> for CoveredComponents {
    type Error = TapError;

    fn try_from(value: Vec<String>) -> Result<Self> {
        Self::from_identifiers(&value)
    }
}

impl From<CoveredComponents> for Vec<String> {
    fn from(covered: CoveredComponents) -> Self {
        covered.0.into_iter().map(String::from).collect()
    }
}

impl<'a> IntoIterator for &'a CoveredComponents {
    type IntoIter = std::slice::Iter<'a, Component>;
    type Item = &'a Component;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Returns `true` if `s` is a non-empty RFC 9110 token.
pub(crate) fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}
