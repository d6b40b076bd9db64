//! Error taxonomy for the scan pipeline.
//!
//! Per-token errors ([`TokenStepError`]) never escape the enumeration
//! boundary as errors: they are recorded as `failures` entries in the scan
//! result and the remaining indices proceed. Only a failed supply read
//! ([`ScanError::SupplyRead`]) is fatal to a scan.

use thiserror::Error;

use crate::types::TokenId;

/// Failure to resolve a metadata URI into a JSON document with the required
/// fields.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network or transport failure reaching the metadata host.
    #[error("metadata request failed")]
    Transport(#[source] reqwest::Error),

    /// The metadata host answered with a non-2xx status.
    #[error("metadata request returned status {status}")]
    Status { status: reqwest::StatusCode },

    /// The fetched document is not valid JSON.
    #[error("metadata document is not valid JSON")]
    Json(#[source] serde_json::Error),

    /// A required field is absent or not a string. Absence is surfaced, not
    /// defaulted, so callers can record the token as unresolved.
    #[error("metadata document is missing required field `{0}`")]
    MissingField(&'static str),

    /// The URI uses a scheme the fetcher does not understand.
    #[error("unsupported metadata URI scheme: {uri}")]
    UnsupportedScheme { uri: String },

    /// An inline `data:` URI could not be decoded.
    #[error("malformed data URI: {reason}")]
    DataUri { reason: String },
}

/// A single token's resolution failure, keyed by the enumeration index it
/// occurred at.
#[derive(Debug, Error)]
pub enum TokenStepError {
    #[error("token_at_index({index}) failed: {cause}")]
    TokenAtIndex { index: u64, cause: anyhow::Error },

    #[error("owner_of({id}) failed: {cause}")]
    OwnerOf { id: TokenId, cause: anyhow::Error },

    #[error("token_uri({id}) failed: {cause}")]
    TokenUri { id: TokenId, cause: anyhow::Error },

    #[error("metadata resolution for token {id} failed")]
    Metadata {
        id: TokenId,
        #[source]
        source: FetchError,
    },

    /// The contract reported the same token id at two indices. The later
    /// index is recorded as a failure so the token list keeps one entry per
    /// id while every index stays accounted for.
    #[error("token id {id} already seen at an earlier index")]
    DuplicateId { id: TokenId },

    /// The resolution task was aborted before producing a result.
    #[error("resolution task for index {index} did not complete")]
    TaskFailed { index: u64 },
}

/// Scan-fatal failure: no result can be produced.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to read total supply: {0}")]
    SupplyRead(anyhow::Error),
}
