//! Collection scanner for index-enumerable NFT contracts.
//!
//! Walks an enumerable token contract by index, resolves each token's JSON
//! metadata, and folds the results into collection-wide ownership
//! statistics. Scans are triggered by total-supply changes and published as
//! immutable `{tokens, stats, failures}` snapshots for a rendering layer.
//!
//! Pipeline: supply change → [`CollectionScanner`] → [`TokenEnumerator`]
//! (per-token failure isolation) → [`stats::aggregate`] → published
//! [`ScanResult`] over a watch channel.
//!
//! The chain and the metadata host are reached through two seams the
//! embedding application implements: [`ContractAccessor`] for the four
//! read-only contract calls, and [`MetadataFetcher`] (with a
//! `reqwest`-backed default) for URI → JSON resolution.

pub mod contract;
pub mod enumerator;
pub mod error;
pub mod metadata;
pub mod scanner;
pub mod stats;
pub mod types;

pub use contract::ContractAccessor;
pub use enumerator::{EnumerationOutcome, ScanFailure, TokenEnumerator};
pub use error::{FetchError, ScanError, TokenStepError};
pub use metadata::{
    HttpFetcherConfig, HttpMetadataFetcher, MetadataFetcher, MetadataResolver, TokenMetadata,
};
pub use scanner::{
    watch_supply, CollectionScanner, ScanResult, ScanState, ScannerConfig, ScannerHandle,
};
pub use stats::{aggregate, CollectionStats, HolderStanding, TOP_HOLDERS_LIMIT};
pub use types::{Address, InvalidAddress, Token, TokenId};

// Re-exported for implementors of the accessor/fetcher seams.
pub use async_trait::async_trait;
