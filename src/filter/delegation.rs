//! Cross-tier delegation signal.
//!
//! Filters owned by the other tier travel in the `x-filter-delegation` header
//! as a JSON object keyed by ordering key:
//!
//! ```text
//! x-filter-delegation: {"3":{"tier":"object","kind":"native","when":"pre_put","entry_point":"audit"}}
//! x-filter-delegation-version: 1
//! ```
//!
//! The peer merges the signal into its own resolved set instead of resolving
//! the delegated filters again, so a key is never counted twice.

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::filter::error::FilterError;
use crate::filter::spec::FilterSet;

pub const DELEGATION_HEADER: HeaderName = HeaderName::from_static("x-filter-delegation");
pub const DELEGATION_VERSION_HEADER: HeaderName = HeaderName::from_static("x-filter-delegation-version");

/// Current wire format version.
pub const DELEGATION_VERSION: u32 = 1;

/// Encode `filters` as a header value.
pub fn encode(filters: &FilterSet) -> Result<HeaderValue, FilterError> {
    let json = serde_json::to_string(filters)
        .map_err(|e| FilterError::DelegationEncoding(e.to_string()))?;
    HeaderValue::from_str(&json).map_err(|e| FilterError::DelegationEncoding(e.to_string()))
}

/// Decode a header value produced by [`encode`].
///
/// Works on the raw bytes: parameters may carry UTF-8 that `to_str` rejects.
pub fn decode(value: &HeaderValue) -> Result<FilterSet, FilterError> {
    serde_json::from_slice(value.as_bytes()).map_err(|e| FilterError::DelegationDecoding(e.to_string()))
}

/// Write the delegation signal onto outgoing headers, replacing any previous one.
pub fn attach(headers: &mut HeaderMap, filters: &FilterSet) -> Result<(), FilterError> {
    let value = encode(filters)?;
    headers.insert(DELEGATION_HEADER, value);
    headers.insert(DELEGATION_VERSION_HEADER, HeaderValue::from(DELEGATION_VERSION));
    Ok(())
}

/// Remove and decode a delegation signal received from the peer tier.
///
/// A missing version header is read as the current version.
pub fn take(headers: &mut HeaderMap) -> Result<Option<FilterSet>, FilterError> {
    let version = headers.remove(DELEGATION_VERSION_HEADER);
    let Some(value) = headers.remove(DELEGATION_HEADER) else {
        return Ok(None);
    };

    if let Some(version) = version {
        let parsed = version
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok());
        if parsed != Some(DELEGATION_VERSION) {
            return Err(FilterError::DelegationDecoding(format!(
                "unsupported version {:?}",
                version
            )));
        }
    }

    decode(&value).map(Some)
}

/// Drop any delegation signal without reading it.
///
/// Returns true when something was removed.
pub fn strip(headers: &mut HeaderMap) -> bool {
    let version = headers.remove(DELEGATION_VERSION_HEADER).is_some();
    let signal = headers.remove(DELEGATION_HEADER).is_some();
    version || signal
}

/// Merge a received signal into the locally resolved set.
///
/// Keys already resolved locally win. Returns the number of filters added.
pub fn merge(resolved: &mut FilterSet, delegated: FilterSet) -> usize {
    let mut added = 0;
    for (key, spec) in delegated {
        if let std::collections::btree_map::Entry::Vacant(entry) = resolved.entry(key) {
            entry.insert(spec);
            added += 1;
        }
    }
    added
}
