//! Token enumeration with per-token failure isolation.
//!
//! Each index in `[0, count)` becomes its own resolution task: index →
//! token id → uri/owner → metadata. A semaphore caps concurrent
//! resolutions; the default bound of 1 keeps a single well-ordered request
//! in flight at a time, a deliberate backpressure choice toward the RPC
//! endpoint and the metadata host. One token's failure never aborts the
//! run: it becomes a `failures` entry and the remaining indices proceed.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::contract::ContractAccessor;
use crate::error::TokenStepError;
use crate::metadata::MetadataResolver;
use crate::types::{Token, TokenId};

const ENUMERATOR_TARGET: &str = "collection_scanner::enumerator";

/// A per-index failure recorded during enumeration.
#[derive(Debug)]
pub struct ScanFailure {
    /// Enumeration index the failure occurred at.
    pub index: u64,
    pub error: TokenStepError,
}

/// Outcome of one enumeration pass.
///
/// Every index is accounted for exactly once, either as a resolved token or
/// as a failure: `tokens.len() + failures.len()` equals the enumerated
/// count. `tokens` is in index order here; the scanner re-sorts by id
/// before publishing.
#[derive(Debug, Default)]
pub struct EnumerationOutcome {
    pub tokens: Vec<Token>,
    /// Unresolved indices, ascending by index.
    pub failures: Vec<ScanFailure>,
}

/// Drives index → token id → owner/uri → metadata resolution against the
/// contract accessor.
pub struct TokenEnumerator {
    accessor: Arc<dyn ContractAccessor>,
    resolver: MetadataResolver,
    max_concurrent: usize,
}

impl TokenEnumerator {
    pub fn new(accessor: Arc<dyn ContractAccessor>, resolver: MetadataResolver) -> Self {
        Self {
            accessor,
            resolver,
            max_concurrent: 1,
        }
    }

    /// Cap on concurrently resolving tokens. Values above 1 trade the
    /// conservative request rate for throughput; the published token order
    /// is unaffected since the scanner sorts by id.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Resolve every index in `[0, count)`.
    ///
    /// Infallible by construction: failures are data, not errors. A full
    /// re-run happens only through a fresh call.
    pub async fn enumerate(&self, count: u64) -> EnumerationOutcome {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks: JoinSet<(u64, Result<Token, TokenStepError>)> = JoinSet::new();

        for index in 0..count {
            let accessor = Arc::clone(&self.accessor);
            let resolver = self.resolver.clone();
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (index, Err(TokenStepError::TaskFailed { index })),
                };
                let result = resolve_index(accessor.as_ref(), &resolver, index).await;
                (index, result)
            });
        }

        // Collect into index-order slots so the failure list stays ordered
        // regardless of completion order.
        let mut slots: Vec<Option<Result<Token, TokenStepError>>> =
            (0..count).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index as usize] = Some(result),
                Err(e) => {
                    tracing::warn!(
                        target: ENUMERATOR_TARGET,
                        error = %e,
                        "resolution task aborted"
                    );
                }
            }
        }

        let mut outcome = EnumerationOutcome::default();
        let mut seen: HashSet<TokenId> = HashSet::new();
        for (index, slot) in slots.into_iter().enumerate() {
            let index = index as u64;
            match slot {
                Some(Ok(token)) => {
                    if seen.insert(token.id) {
                        outcome.tokens.push(token);
                    } else {
                        tracing::warn!(
                            target: ENUMERATOR_TARGET,
                            index,
                            token_id = token.id,
                            "contract reported duplicate token id"
                        );
                        outcome.failures.push(ScanFailure {
                            index,
                            error: TokenStepError::DuplicateId { id: token.id },
                        });
                    }
                }
                Some(Err(error)) => {
                    tracing::debug!(
                        target: ENUMERATOR_TARGET,
                        index,
                        error = %error,
                        "token resolution failed"
                    );
                    outcome.failures.push(ScanFailure { index, error });
                }
                None => outcome.failures.push(ScanFailure {
                    index,
                    error: TokenStepError::TaskFailed { index },
                }),
            }
        }

        outcome
    }
}

async fn resolve_index(
    accessor: &dyn ContractAccessor,
    resolver: &MetadataResolver,
    index: u64,
) -> Result<Token, TokenStepError> {
    let id = accessor
        .token_at_index(index)
        .await
        .map_err(|cause| TokenStepError::TokenAtIndex { index, cause })?;

    let uri = accessor
        .token_uri(id)
        .await
        .map_err(|cause| TokenStepError::TokenUri { id, cause })?;

    let owner = accessor
        .owner_of(id)
        .await
        .map_err(|cause| TokenStepError::OwnerOf { id, cause })?;

    let metadata = resolver
        .resolve(&uri)
        .await
        .map_err(|source| TokenStepError::Metadata { id, source })?;

    Ok(Token {
        id,
        uri,
        owner,
        image: metadata.image,
        name: metadata.name,
    })
}
