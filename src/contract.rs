//! Read-only accessor seam for the enumerable token contract.

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Address, TokenId};

/// Read-only view of an index-enumerable NFT contract.
///
/// Implementations wrap whatever transport reaches the chain (JSON-RPC
/// provider, multicall batcher, test double). All methods are point-in-time
/// reads; the scanner treats their results as a best-effort snapshot, not a
/// transactionally consistent view.
#[async_trait]
pub trait ContractAccessor: Send + Sync + 'static {
    /// Total number of live tokens.
    ///
    /// Watched by [`watch_supply`](crate::scanner::watch_supply) to trigger
    /// scans, and read again at the start of every scan as the
    /// authoritative count.
    async fn token_count(&self) -> Result<u64>;

    /// Token id at the given enumeration index, valid for
    /// `index < token_count()`.
    async fn token_at_index(&self, index: u64) -> Result<TokenId>;

    /// Current owner of the token.
    async fn owner_of(&self, id: TokenId) -> Result<Address>;

    /// Metadata URI for the token.
    async fn token_uri(&self, id: TokenId) -> Result<String>;
}
