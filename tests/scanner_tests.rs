//! End-to-end tests for the enumerator and the scan lifecycle, driven
//! against in-memory contract accessors. Metadata is served through inline
//! `data:` URIs so the real HTTP fetcher runs without a network.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use collection_scanner::{
    async_trait, watch_supply, Address, CollectionScanner, ContractAccessor, HttpFetcherConfig,
    HttpMetadataFetcher, MetadataResolver, ScanError, ScanState, ScannerConfig, ScannerHandle,
    TokenEnumerator, TokenId, TokenStepError,
};

/// Suite-wide tracing init; safe to call repeatedly.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn addr(n: u8) -> Address {
    Address::new([n; 20])
}

fn data_uri(id: TokenId) -> String {
    format!(r#"data:application/json,{{"name":"Token #{id}","image":"https://img.example/{id}.png"}}"#)
}

/// Data URI whose document has no `image` field.
fn broken_data_uri(id: TokenId) -> String {
    format!(r#"data:application/json,{{"name":"Token #{id}"}}"#)
}

fn resolver() -> MetadataResolver {
    init_tracing();
    let fetcher = HttpMetadataFetcher::new(HttpFetcherConfig::default()).unwrap();
    MetadataResolver::new(Arc::new(fetcher))
}

/// Configurable in-memory contract.
///
/// Token id at index `i` is `i` (or `count - 1 - i` when `reversed`), the
/// owner comes from the `owners` ring, and the metadata document is served
/// inline.
#[derive(Default)]
struct MockContract {
    supply: AtomicU64,
    fail_supply: AtomicBool,
    owners: Vec<Address>,
    fail_indices: HashSet<u64>,
    broken_metadata: HashSet<TokenId>,
    reversed: bool,
    constant_id: Option<TokenId>,
    /// Total `token_at_index` calls; each scan over supply `n` adds `n`.
    index_calls: AtomicU64,
}

impl MockContract {
    fn new(supply: u64, owners: Vec<Address>) -> Self {
        Self {
            supply: AtomicU64::new(supply),
            owners,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ContractAccessor for MockContract {
    async fn token_count(&self) -> Result<u64> {
        if self.fail_supply.load(Ordering::SeqCst) {
            return Err(anyhow!("rpc: connection refused"));
        }
        Ok(self.supply.load(Ordering::SeqCst))
    }

    async fn token_at_index(&self, index: u64) -> Result<TokenId> {
        self.index_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_indices.contains(&index) {
            return Err(anyhow!("rpc: execution reverted"));
        }
        if let Some(id) = self.constant_id {
            return Ok(id);
        }
        if self.reversed {
            Ok(self.supply.load(Ordering::SeqCst) - 1 - index)
        } else {
            Ok(index)
        }
    }

    async fn owner_of(&self, id: TokenId) -> Result<Address> {
        Ok(self.owners[id as usize % self.owners.len()])
    }

    async fn token_uri(&self, id: TokenId) -> Result<String> {
        if self.broken_metadata.contains(&id) {
            Ok(broken_data_uri(id))
        } else {
            Ok(data_uri(id))
        }
    }
}

async fn wait_for<F>(handle: &ScannerHandle, predicate: F) -> ScanState
where
    F: FnMut(&ScanState) -> bool,
{
    let mut rx = handle.subscribe();
    let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for scan state")
        .expect("scanner stopped")
        .clone();
    state
}

async fn wait_for_ready(handle: &ScannerHandle) -> ScanState {
    wait_for(handle, |state| matches!(state, ScanState::Ready(_))).await
}

#[tokio::test]
async fn enumerate_accounts_for_every_index() {
    let contract = Arc::new(MockContract {
        fail_indices: HashSet::from([2]),
        ..MockContract::new(5, vec![addr(1)])
    });
    let enumerator = TokenEnumerator::new(contract, resolver()).with_max_concurrent(3);

    let outcome = enumerator.enumerate(5).await;

    assert_eq!(outcome.tokens.len(), 4);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].index, 2);
    assert!(matches!(
        outcome.failures[0].error,
        TokenStepError::TokenAtIndex { index: 2, .. }
    ));
}

#[tokio::test]
async fn enumerate_records_duplicate_token_ids() {
    let contract = Arc::new(MockContract {
        constant_id: Some(7),
        ..MockContract::new(3, vec![addr(1)])
    });
    let enumerator = TokenEnumerator::new(contract, resolver());

    let outcome = enumerator.enumerate(3).await;

    assert_eq!(outcome.tokens.len(), 1);
    assert_eq!(outcome.tokens[0].id, 7);
    assert_eq!(outcome.failures.len(), 2);
    assert_eq!(outcome.failures[0].index, 1);
    assert_eq!(outcome.failures[1].index, 2);
    assert!(outcome
        .failures
        .iter()
        .all(|f| matches!(f.error, TokenStepError::DuplicateId { id: 7 })));
}

#[tokio::test]
async fn scan_aggregates_ownership_stats() {
    // Tokens 0, 1 → A; token 2 → B.
    let a = addr(0xaa);
    let b = addr(0xbb);
    let contract = Arc::new(MockContract::new(3, vec![a, a, b]));
    let (handle, scanner) = CollectionScanner::spawn(contract, resolver(), ScannerConfig::default());

    assert!(matches!(handle.state(), ScanState::Idle));
    handle.supply_changed(3).await;
    let state = wait_for_ready(&handle).await;

    let result = state.result().unwrap();
    assert_eq!(result.tokens.len(), 3);
    assert!(result.failures.is_empty());
    assert_eq!(result.stats.total_supply, 3);
    assert_eq!(result.stats.unique_owners, HashSet::from([a, b]));
    assert_eq!(result.stats.tokens_per_owner[&a], 2);
    assert_eq!(result.stats.tokens_per_owner[&b], 1);
    assert_eq!(result.stats.top_holders[0].owner, a);
    assert_eq!(format!("{:.1}", result.stats.top_holders[0].percentage), "66.7");

    scanner.abort();
}

#[tokio::test]
async fn scan_with_partial_failure_stays_ready() {
    let contract = Arc::new(MockContract {
        broken_metadata: HashSet::from([1]),
        ..MockContract::new(2, vec![addr(1)])
    });
    let (handle, scanner) = CollectionScanner::spawn(contract, resolver(), ScannerConfig::default());

    handle.supply_changed(2).await;
    let state = wait_for_ready(&handle).await;

    let result = state.result().unwrap();
    assert_eq!(result.tokens.len(), 1);
    assert_eq!(result.tokens[0].id, 0);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].index, 1);
    assert!(matches!(
        result.failures[0].error,
        TokenStepError::Metadata { id: 1, .. }
    ));
    // Every index accounted for.
    assert_eq!(
        result.tokens.len() + result.failures.len(),
        result.stats.total_supply as usize
    );

    scanner.abort();
}

#[tokio::test]
async fn supply_read_failure_goes_failed() {
    let contract = MockContract::new(3, vec![addr(1)]);
    contract.fail_supply.store(true, Ordering::SeqCst);
    let (handle, scanner) =
        CollectionScanner::spawn(Arc::new(contract), resolver(), ScannerConfig::default());

    handle.supply_changed(3).await;
    let state = wait_for(&handle, |s| matches!(s, ScanState::Failed(_))).await;

    assert!(matches!(state.error(), Some(ScanError::SupplyRead(_))));
    assert!(state.result().is_none());

    scanner.abort();
}

#[tokio::test]
async fn scan_publishes_tokens_sorted_ascending_by_id() {
    let contract = Arc::new(MockContract {
        reversed: true,
        ..MockContract::new(4, vec![addr(1), addr(2)])
    });
    let (handle, scanner) = CollectionScanner::spawn(contract, resolver(), ScannerConfig::default());

    handle.supply_changed(4).await;
    let state = wait_for_ready(&handle).await;

    let ids: Vec<TokenId> = state.result().unwrap().tokens.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);

    scanner.abort();
}

#[tokio::test]
async fn unchanged_supply_observation_skips_rescan() {
    let contract = Arc::new(MockContract::new(2, vec![addr(1)]));
    let (handle, scanner) = CollectionScanner::spawn(contract, resolver(), ScannerConfig::default());

    handle.supply_changed(2).await;
    let first = wait_for_ready(&handle).await;
    let first = first.result().unwrap().clone();

    handle.supply_changed(2).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let current = handle.state();
    let current = current.result().expect("still ready");
    assert!(Arc::ptr_eq(current, &first), "snapshot was rebuilt for an unchanged supply");

    scanner.abort();
}

#[tokio::test]
async fn refresh_forces_new_snapshot() {
    let contract = Arc::new(MockContract::new(2, vec![addr(1)]));
    let (handle, scanner) = CollectionScanner::spawn(contract, resolver(), ScannerConfig::default());

    handle.supply_changed(2).await;
    let first = wait_for_ready(&handle).await;
    let first = first.result().unwrap().clone();

    handle.refresh().await;
    let state = wait_for(&handle, |s| match s {
        ScanState::Ready(r) => !Arc::ptr_eq(r, &first),
        _ => false,
    })
    .await;

    assert_eq!(state.result().unwrap().tokens.len(), 2);

    scanner.abort();
}

#[tokio::test(start_paused = true)]
async fn watch_supply_triggers_scan_per_distinct_value() {
    let contract = Arc::new(MockContract::new(2, vec![addr(1)]));
    let (handle, scanner) = CollectionScanner::spawn(
        Arc::clone(&contract) as Arc<dyn ContractAccessor>,
        resolver(),
        ScannerConfig::default(),
    );
    let watcher = tokio::spawn(watch_supply(
        Arc::clone(&contract) as Arc<dyn ContractAccessor>,
        handle.clone(),
        Duration::from_secs(1),
    ));

    // First poll drives the initial unknown → known scan.
    let state = wait_for_ready(&handle).await;
    let first = state.result().unwrap().clone();
    assert_eq!(first.stats.total_supply, 2);
    assert_eq!(contract.index_calls.load(Ordering::SeqCst), 2);

    // Many more polls with an unchanged supply trigger no rescans.
    tokio::time::sleep(Duration::from_secs(20)).await;
    let current = handle.state();
    assert!(Arc::ptr_eq(current.result().unwrap(), &first));
    assert_eq!(contract.index_calls.load(Ordering::SeqCst), 2);

    // A minted token changes the polled value; the next tick rescans once.
    contract.supply.store(3, Ordering::SeqCst);
    let state = wait_for(&handle, |s| match s {
        ScanState::Ready(r) => r.stats.total_supply == 3,
        _ => false,
    })
    .await;
    assert_eq!(state.result().unwrap().tokens.len(), 3);
    assert_eq!(contract.index_calls.load(Ordering::SeqCst), 5);

    watcher.abort();
    scanner.abort();
}

#[tokio::test(start_paused = true)]
async fn watch_supply_poll_failure_surfaces_failed() {
    let contract = Arc::new(MockContract::new(2, vec![addr(1)]));
    contract.fail_supply.store(true, Ordering::SeqCst);
    let (handle, scanner) = CollectionScanner::spawn(
        Arc::clone(&contract) as Arc<dyn ContractAccessor>,
        resolver(),
        ScannerConfig::default(),
    );
    let watcher = tokio::spawn(watch_supply(
        Arc::clone(&contract) as Arc<dyn ContractAccessor>,
        handle.clone(),
        Duration::from_secs(1),
    ));

    // The failed poll falls through to a refresh; the scanner re-reads the
    // supply itself and surfaces the failure.
    let state = wait_for(&handle, |s| matches!(s, ScanState::Failed(_))).await;
    assert!(matches!(state.error(), Some(ScanError::SupplyRead(_))));

    // Once the supply read recovers, the next poll scans normally.
    contract.fail_supply.store(false, Ordering::SeqCst);
    let state = wait_for_ready(&handle).await;
    assert_eq!(state.result().unwrap().stats.total_supply, 2);

    watcher.abort();
    scanner.abort();
}

/// Contract whose first `owner_of` call bumps the supply from 3 to 5 and
/// notifies the scanner, simulating a mint landing mid-scan.
struct BumpingContract {
    supply: AtomicU64,
    bumped: AtomicBool,
    handle: Mutex<Option<ScannerHandle>>,
}

#[async_trait]
impl ContractAccessor for BumpingContract {
    async fn token_count(&self) -> Result<u64> {
        Ok(self.supply.load(Ordering::SeqCst))
    }

    async fn token_at_index(&self, index: u64) -> Result<TokenId> {
        Ok(index)
    }

    async fn owner_of(&self, _id: TokenId) -> Result<Address> {
        if !self.bumped.swap(true, Ordering::SeqCst) {
            self.supply.store(5, Ordering::SeqCst);
            let handle = self.handle.lock().unwrap().clone();
            if let Some(handle) = handle {
                handle.supply_changed(5).await;
            }
        }
        Ok(addr(1))
    }

    async fn token_uri(&self, id: TokenId) -> Result<String> {
        Ok(data_uri(id))
    }
}

#[tokio::test]
async fn supply_bump_mid_scan_discards_stale_result() {
    let contract = Arc::new(BumpingContract {
        supply: AtomicU64::new(3),
        bumped: AtomicBool::new(false),
        handle: Mutex::new(None),
    });
    let (handle, scanner) = CollectionScanner::spawn(
        Arc::clone(&contract) as Arc<dyn ContractAccessor>,
        resolver(),
        ScannerConfig::default(),
    );
    *contract.handle.lock().unwrap() = Some(handle.clone());

    handle.supply_changed(3).await;
    let state = wait_for_ready(&handle).await;

    // The scan keyed to supply 3 was superseded before publishing; the
    // first Ready snapshot already reflects the fresh scan over 5.
    let result = state.result().unwrap();
    assert_eq!(result.stats.total_supply, 5);
    assert_eq!(result.tokens.len(), 5);
    assert!(result.failures.is_empty());

    scanner.abort();
}
