//! Request URL construction.
//!
//! # Design
//! `EndpointBuilder` is pure: it validates the base URL once and then joins
//! paths and query strings with no I/O. The fixed identity parameters always
//! come first in a stable order, followed by caller parameters in the order
//! given, so the same call always yields byte-identical URLs.

use crate::config::AppIdentity;
use crate::error::ClientError;

/// Composes request URLs for one API base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointBuilder {
    base_url: String,
    fixed_params: Vec<(&'static str, String)>,
}

impl EndpointBuilder {
    pub fn new(base_url: &str, identity: &AppIdentity) -> Result<Self, ClientError> {
        let base_url = validate_base_url(base_url)?;
        let fixed_params = vec![
            ("key", identity.api_key.clone()),
            ("app_uid", identity.app_uid.clone()),
            ("app_ver", identity.app_version.clone()),
            ("version", identity.protocol_version.to_string()),
        ];
        Ok(Self {
            base_url,
            fixed_params,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `<base>/<path>?key=..&app_uid=..&app_ver=..&version=..[&extra..]`
    pub fn build(&self, path: &str, extra_params: &[(&str, String)]) -> Result<String, ClientError> {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            return Err(invalid(path, "path is empty"));
        }
        if path.contains(['?', '#']) || path.contains(char::is_whitespace) {
            return Err(invalid(path, "path must not contain a query, fragment, or whitespace"));
        }

        let query = self
            .fixed_params
            .iter()
            .map(|(name, value)| (*name, value.as_str()))
            .chain(extra_params.iter().map(|(name, value)| (*name, value.as_str())))
            .map(|(name, value)| format!("{}={}", encode_component(name), encode_component(value)))
            .collect::<Vec<_>>()
            .join("&");

        Ok(format!("{}/{path}?{query}", self.base_url))
    }
}

/// Percent-encode everything outside RFC 3986's unreserved set.
pub fn encode_component(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char);
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

fn validate_base_url(raw: &str) -> Result<String, ClientError> {
    let trimmed = raw.trim_end_matches('/');
    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .ok_or_else(|| invalid(raw, "scheme must be http or https"))?;
    let host = rest.split('/').next().unwrap_or_default();
    if host.is_empty() {
        return Err(invalid(raw, "missing host"));
    }
    if trimmed.contains(['?', '#']) || trimmed.contains(char::is_whitespace) {
        return Err(invalid(raw, "base URL must not contain a query, fragment, or whitespace"));
    }
    Ok(trimmed.to_string())
}

fn invalid(url: &str, reason: &'static str) -> ClientError {
    ClientError::InvalidUrl {
        url: url.to_string(),
        reason,
    }
}
