//! Signature base construction (RFC 9421 section 2.5).

use std::fmt;

use crate::{
    error::{Result, TapError},
    tap::{
        components::Component,
        params::SignatureParameters,
        request::{CONTENT_DIGEST_HEADER, HttpRequest},
    },
};

/// The exact bytes that get signed.
///
/// Built fresh for each sign or verify call and dropped afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct SignatureBase(String);

impl SignatureBase {
    /// Bytes passed to the signature algorithm.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Textual form, for diagnostics and tests.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SignatureBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SignatureBase").field(&self.0).finish()
    }
}

/// Builds the signature base for `request` under `parameters`.
///
/// One `"<id>": <value>` line per covered component in order, followed by the
/// `"@signature-params"` line. Lines are separated by `\n` with no trailing
/// newline.
///
/// ```text
/// "@method": GET
/// "@target-uri": /api/products
/// "@signature-params": ("@method" "@target-uri");created=1700000000;expires=...
/// ```
///
/// # Errors
///
/// Returns [`TapError::MalformedInput`] if a covered component cannot be
/// derived from the request, e.g. a covered header is absent.
pub fn canonicalize(request: &HttpRequest, parameters: &SignatureParameters) -> Result<SignatureBase> {
    let mut lines = Vec::with_capacity(parameters.covered.len() + 1);

    for component in &parameters.covered {
        let value = component_value(request, component)?;
        if value.contains(['\n', '\r']) {
            return Err(TapError::MalformedInput(format!(
                "component `{component}` contains a line break"
            )));
        }
        lines.push(format!("\"{}\": {value}", component.identifier()));
    }
    lines.push(format!("\"@signature-params\": {}", parameters.serialize()));

    Ok(SignatureBase(lines.join("\n")))
}

fn component_value(request: &HttpRequest, component: &Component) -> Result<String> {
    let missing = || TapError::MalformedInput(format!("covered component `{component}` is missing"));

    match component {
        Component::Method => Ok(request.method().to_owned()),
        Component::TargetUri => Ok(request.target()),
        Component::Authority => request.authority().ok_or_else(missing),
        Component::Path => Ok(request.path().to_owned()),
        Component::Query => Ok(format!("?{}", request.query().unwrap_or_default())),
        Component::ContentDigest => request.header(CONTENT_DIGEST_HEADER).ok_or_else(missing),
        Component::Header(name) => request.header(name).ok_or_else(missing),
    }
}
