//! Scan lifecycle: trigger coalescing, state machine, snapshot publishing.
//!
//! The scanner runs as a background task in the `(handle, service)` shape
//! used across this codebase. Supply observations arrive over an mpsc
//! channel; scan state is published over a watch channel (single writer,
//! any number of rendering-side readers). The loading flag is derived from
//! the state and toggles at transition boundaries only — never from inside
//! per-token error handling.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::contract::ContractAccessor;
use crate::enumerator::{ScanFailure, TokenEnumerator};
use crate::error::ScanError;
use crate::metadata::MetadataResolver;
use crate::stats::{self, CollectionStats};
use crate::types::Token;

const SCANNER_TARGET: &str = "collection_scanner::scanner";

/// Configuration for [`CollectionScanner`].
#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// Cap on concurrently resolving tokens during a scan.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_resolutions: usize,
    /// Buffered triggers before senders start to await.
    #[serde(default = "default_trigger_buffer")]
    pub trigger_buffer: usize,
    /// Poll interval for [`watch_supply`], in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_max_concurrent() -> usize {
    1
}

fn default_trigger_buffer() -> usize {
    16
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_resolutions: default_max_concurrent(),
            trigger_buffer: default_trigger_buffer(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl ScannerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// A published scan snapshot.
///
/// Created fresh each scan and superseded, never merged, by the next
/// scan's result.
#[derive(Debug)]
pub struct ScanResult {
    /// Resolved tokens, ascending by id, one entry per id.
    pub tokens: Vec<Token>,
    pub stats: CollectionStats,
    /// Indices that could not be resolved, ascending by index.
    pub failures: Vec<ScanFailure>,
}

/// Externally observable scan lifecycle state.
#[derive(Debug, Clone, Default)]
pub enum ScanState {
    /// No scan has been triggered yet.
    #[default]
    Idle,
    /// A scan is in flight; drives the rendering layer's loading indicator.
    Scanning,
    /// Last scan completed. May carry partial failures — see
    /// [`ScanResult::failures`].
    Ready(Arc<ScanResult>),
    /// The supply count itself could not be read; no result was produced.
    Failed(Arc<ScanError>),
}

impl ScanState {
    pub fn is_scanning(&self) -> bool {
        matches!(self, Self::Scanning)
    }

    pub fn result(&self) -> Option<&Arc<ScanResult>> {
        match self {
            Self::Ready(result) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ScanError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    /// The watched supply value was observed to change.
    SupplyChanged(u64),
    /// Scan regardless of the last published supply.
    Refresh,
}

/// Cheap-to-clone handle for triggering scans and observing state.
#[derive(Clone)]
pub struct ScannerHandle {
    trigger_tx: mpsc::Sender<Trigger>,
    state_rx: watch::Receiver<ScanState>,
}

impl ScannerHandle {
    /// Report a newly observed total-supply value.
    ///
    /// Triggers a scan unless the value matches the last published
    /// snapshot. Observations arriving while a scan is in flight are
    /// queued and coalesced; the latest one wins.
    pub async fn supply_changed(&self, supply: u64) {
        self.send(Trigger::SupplyChanged(supply)).await;
    }

    /// Force a scan regardless of the last published supply.
    pub async fn refresh(&self) {
        self.send(Trigger::Refresh).await;
    }

    async fn send(&self, trigger: Trigger) {
        if let Err(e) = self.trigger_tx.send(trigger).await {
            tracing::warn!(
                target: SCANNER_TARGET,
                error = %e,
                "failed to send scan trigger (scanner stopped)"
            );
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> ScanState {
        self.state_rx.borrow().clone()
    }

    /// Watch receiver for state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ScanState> {
        self.state_rx.clone()
    }
}

/// Background service owning the scan lifecycle.
///
/// State machine `Idle → Scanning → Ready | Failed`. The current
/// [`ScanResult`] is single-writer (only the active scan publishes it) and
/// multi-reader through the watch channel.
pub struct CollectionScanner {
    handle: JoinHandle<()>,
}

impl CollectionScanner {
    /// Spawn the scanner.
    ///
    /// Returns a `(ScannerHandle, CollectionScanner)` pair. The handle is
    /// cheap to clone and can be shared with whatever watches the supply
    /// and with the rendering layer.
    pub fn spawn(
        accessor: Arc<dyn ContractAccessor>,
        resolver: MetadataResolver,
        config: ScannerConfig,
    ) -> (ScannerHandle, Self) {
        let (trigger_tx, trigger_rx) = mpsc::channel(config.trigger_buffer);
        let (state_tx, state_rx) = watch::channel(ScanState::Idle);

        let enumerator = TokenEnumerator::new(Arc::clone(&accessor), resolver)
            .with_max_concurrent(config.max_concurrent_resolutions);
        let handle = tokio::spawn(Self::run(trigger_rx, state_tx, accessor, enumerator));

        (
            ScannerHandle {
                trigger_tx,
                state_rx,
            },
            Self { handle },
        )
    }

    async fn run(
        mut triggers: mpsc::Receiver<Trigger>,
        state_tx: watch::Sender<ScanState>,
        accessor: Arc<dyn ContractAccessor>,
        enumerator: TokenEnumerator,
    ) {
        // Supply value of the last published Ready snapshot; triggers that
        // observed no actual change are skipped against it.
        let mut last_published: Option<u64> = None;

        while let Some(first) = triggers.recv().await {
            let (mut observed, mut forced) = match first {
                Trigger::SupplyChanged(supply) => (Some(supply), false),
                Trigger::Refresh => (None, true),
            };
            // Coalesce queued triggers; the latest observation wins.
            while let Ok(next) = triggers.try_recv() {
                match next {
                    Trigger::SupplyChanged(supply) => observed = Some(supply),
                    Trigger::Refresh => forced = true,
                }
            }

            if !forced && observed.is_some() && observed == last_published {
                tracing::debug!(
                    target: SCANNER_TARGET,
                    supply = observed,
                    "supply unchanged, skipping scan"
                );
                continue;
            }

            // Entered exactly once per scan; cleared exactly once below,
            // however many per-token failures the scan records.
            let _ = state_tx.send(ScanState::Scanning);

            loop {
                let count = match accessor.token_count().await {
                    Ok(count) => count,
                    Err(cause) => {
                        tracing::error!(
                            target: SCANNER_TARGET,
                            error = %cause,
                            "supply read failed, aborting scan"
                        );
                        let _ = state_tx
                            .send(ScanState::Failed(Arc::new(ScanError::SupplyRead(cause))));
                        last_published = None;
                        break;
                    }
                };

                tracing::info!(target: SCANNER_TARGET, supply = count, "scan started");
                let outcome = enumerator.enumerate(count).await;

                // Last-trigger-wins: if a different supply was observed
                // while we were scanning, discard this result unpublished
                // and scan again against the fresh count.
                let mut superseding: Option<u64> = None;
                let mut refresh_queued = false;
                while let Ok(next) = triggers.try_recv() {
                    match next {
                        Trigger::SupplyChanged(supply) => superseding = Some(supply),
                        Trigger::Refresh => refresh_queued = true,
                    }
                }
                if refresh_queued || superseding.is_some_and(|supply| supply != count) {
                    tracing::info!(
                        target: SCANNER_TARGET,
                        stale_supply = count,
                        "scan superseded, discarding result"
                    );
                    continue;
                }

                let mut tokens = outcome.tokens;
                tokens.sort_unstable_by_key(|token| token.id);
                let stats = stats::aggregate(&tokens, count);
                let result = ScanResult {
                    tokens,
                    stats,
                    failures: outcome.failures,
                };

                tracing::info!(
                    target: SCANNER_TARGET,
                    supply = count,
                    resolved = result.tokens.len(),
                    failed = result.failures.len(),
                    "scan complete"
                );
                let _ = state_tx.send(ScanState::Ready(Arc::new(result)));
                last_published = Some(count);
                break;
            }
        }

        tracing::info!(target: SCANNER_TARGET, "collection scanner shutting down");
    }

    /// Wait for the scanner to finish (its trigger channel must be closed
    /// first by dropping all handles).
    pub async fn join(self) {
        let _ = self.handle.await;
    }

    /// Abort the background task.
    pub fn abort(self) {
        self.handle.abort();
    }
}

/// Polls `token_count()` and pokes the scanner when the value changes.
///
/// Equivalent of a UI-side watched supply read: the first successful poll
/// triggers the initial unknown → known scan. A failed poll falls through
/// to [`ScannerHandle::refresh`] so the scanner re-reads the supply itself
/// and surfaces `Failed`.
pub async fn watch_supply(
    accessor: Arc<dyn ContractAccessor>,
    handle: ScannerHandle,
    poll_interval: Duration,
) {
    let mut last_seen: Option<u64> = None;
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match accessor.token_count().await {
            Ok(supply) => {
                if last_seen != Some(supply) {
                    tracing::debug!(
                        target: SCANNER_TARGET,
                        supply,
                        previous = last_seen,
                        "supply changed"
                    );
                    last_seen = Some(supply);
                    handle.supply_changed(supply).await;
                }
            }
            Err(e) => {
                tracing::warn!(target: SCANNER_TARGET, error = %e, "supply poll failed");
                last_seen = None;
                handle.refresh().await;
            }
        }
    }
}
