//! Request context extraction and eligibility.
//!
//! # Responsibilities
//! - Parse the request path with the grammar of the local tier
//! - Normalize the method
//! - Classify a parsed request as eligible for filtering or not
//!
//! # Design Decisions
//! - A context only exists fully parsed; there is no partially valid state
//! - Eligibility is a typed result, never an error
//! - The account lookup happens outside this module; classification is pure

use std::fmt;

use crate::config::ReservedContainers;
use crate::filter::error::ParseError;
use crate::filter::spec::Tier;

/// API version reported for object-tier paths, which carry none.
pub const OBJECT_TIER_API_VERSION: &str = "0";

/// Identity of the object a request targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    api_version: String,
    account: String,
    container: String,
    object: String,
    method: String,
}

impl RequestContext {
    /// Parse `path` with the grammar of `tier`.
    ///
    /// Proxy tier: `/{version}/{account}/{container}/{object}`.
    /// Object tier: `/{device}/{partition}/{account}/{container}/{object}`.
    /// The object segment keeps embedded slashes and may be empty.
    pub fn extract(tier: Tier, method: &str, path: &str) -> Result<Self, ParseError> {
        let rest = path
            .strip_prefix('/')
            .ok_or_else(|| ParseError::NotAbsolute(path.to_string()))?;

        let names: &[&'static str] = match tier {
            Tier::Proxy => &["version", "account", "container"],
            Tier::Object => &["device", "partition", "account", "container"],
        };
        let expected = names.len() + 1;

        let segments: Vec<&str> = rest.splitn(expected, '/').collect();
        if segments.len() < expected {
            return Err(ParseError::MissingSegments {
                path: path.to_string(),
                found: segments.len(),
                expected,
            });
        }
        for (segment, name) in segments.iter().zip(names) {
            if segment.is_empty() {
                return Err(ParseError::EmptySegment {
                    path: path.to_string(),
                    segment: *name,
                });
            }
        }

        let api_version = match tier {
            Tier::Proxy => segments[0].to_string(),
            Tier::Object => OBJECT_TIER_API_VERSION.to_string(),
        };
        let n = segments.len();

        Ok(Self {
            api_version,
            account: segments[n - 3].to_string(),
            container: segments[n - 2].to_string(),
            object: segments[n - 1].to_string(),
            method: method.to_ascii_lowercase(),
        })
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    /// Lowercase HTTP verb.
    pub fn method(&self) -> &str {
        &self.method
    }
}

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.account, self.container, self.object)
    }
}

/// Why a request does not take part in filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    /// The path could not be parsed.
    Unparseable,
    /// The container stores filter artifacts.
    ReservedContainer,
    /// Account or container level request.
    NoObject,
    /// The account has filtering turned off.
    FilteringDisabled,
    /// Multi-part manifest GET, served as-is.
    ManifestRequest,
}

impl Ineligible {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ineligible::Unparseable => "unparseable",
            Ineligible::ReservedContainer => "reserved_container",
            Ineligible::NoObject => "no_object",
            Ineligible::FilteringDisabled => "filtering_disabled",
            Ineligible::ManifestRequest => "manifest_request",
        }
    }
}

/// Outcome of the eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    NotApplicable(Ineligible),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

/// Classify a parsed request.
///
/// `filtering_enabled` is only consulted on the proxy tier; the object tier
/// relies on the proxy having checked it already.
pub fn eligibility(
    context: &RequestContext,
    tier: Tier,
    reserved: &ReservedContainers,
    filtering_enabled: bool,
) -> Eligibility {
    if reserved.contains(context.container()) {
        return Eligibility::NotApplicable(Ineligible::ReservedContainer);
    }
    if context.object().is_empty() {
        return Eligibility::NotApplicable(Ineligible::NoObject);
    }
    if tier == Tier::Proxy && !filtering_enabled {
        return Eligibility::NotApplicable(Ineligible::FilteringDisabled);
    }
    Eligibility::Eligible
}
