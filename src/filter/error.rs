//! Error types for the filter subsystem.

use thiserror::Error;

use crate::filter::spec::LifecyclePoint;

/// Boxed error returned by execution engines.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A request path does not follow the tier's account/container/object grammar.
///
/// Callers treat this as "not a filterable request", never as a failure of
/// the request itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("path {0:?} is not absolute")]
    NotAbsolute(String),

    #[error("path {path:?} has {found} segments, expected at least {expected}")]
    MissingSegments {
        path: String,
        found: usize,
        expected: usize,
    },

    #[error("path {path:?} has an empty {segment} segment")]
    EmptySegment { path: String, segment: &'static str },
}

/// The account-metadata collaborator could not answer.
#[derive(Debug, Error)]
pub enum MetadataLookupError {
    #[error("metadata store unavailable: {0}")]
    Unavailable(String),

    #[error("malformed metadata document: {0}")]
    Malformed(String),
}

/// Errors raised while running filters for a request.
#[derive(Debug, Error)]
pub enum FilterError {
    /// An execution engine failed. The chain is aborted.
    #[error("filter {entry_point} failed: {source}")]
    Execution {
        entry_point: String,
        #[source]
        source: BoxError,
    },

    /// No native filter is registered under the entry point.
    #[error("no native filter registered for entry point {0:?}")]
    UnknownEntryPoint(String),

    /// The delegation signal could not be written to the outgoing message.
    #[error("failed to encode delegation signal: {0}")]
    DelegationEncoding(String),

    /// The delegation signal received from the peer tier is unusable.
    #[error("malformed delegation signal: {0}")]
    DelegationDecoding(String),

    #[error(transparent)]
    MetadataLookup(#[from] MetadataLookupError),

    /// A lifecycle hook was invoked out of order for this request.
    #[error("hook {attempted} is not allowed after {previous:?}")]
    HookOrder {
        attempted: LifecyclePoint,
        previous: Option<LifecyclePoint>,
    },
}

impl FilterError {
    /// Entry point of the filter that failed, if the error came from one.
    pub fn entry_point(&self) -> Option<&str> {
        match self {
            FilterError::Execution { entry_point, .. } => Some(entry_point),
            FilterError::UnknownEntryPoint(entry_point) => Some(entry_point),
            _ => None,
        }
    }
}
