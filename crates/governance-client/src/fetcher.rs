//! Proposal fetching and the cached proposal set
//!
//! Each fetch cycle fans out one indexer query per candidate id, waits for
//! all of them, and concatenates the successful results in ascending id
//! order. A failed id-query is a gap, not an error. The cycle only fails when
//! the indexer itself is unreachable, in which case the previous set stays in
//! the store.
//!
//! Cycles may overlap. A cycle that succeeds always publishes, so the last
//! one to complete wins. A cycle that fails after a newer cycle has already
//! published is superseded: its error is neither recorded on the store nor
//! counted by the circuit breaker.

use crate::circuit_breaker::IndexerCircuitBreaker;
use crate::collaborators::ProposalRefresh;
use crate::config::FetcherConfig;
use crate::error::{FetchError, IndexerError};
use crate::indexer::ProposalIndexer;
use crate::proposal::Proposal;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Default)]
struct StoreState {
    proposals: Arc<Vec<Proposal>>,
    generation: u64,
    updated_at: Option<DateTime<Utc>>,
    last_error: Option<FetchError>,
}

/// The cached proposal set.
///
/// Only the fetcher writes it, always by swapping in a complete result set,
/// so readers see either the previous cycle or the next one.
#[derive(Default)]
pub struct ProposalStore {
    state: RwLock<StoreState>,
}

impl ProposalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current proposal set. Cheap to clone and stable across refreshes.
    pub fn snapshot(&self) -> Arc<Vec<Proposal>> {
        self.state.read().proposals.clone()
    }

    pub fn get(&self, id: u64) -> Option<Proposal> {
        self.state
            .read()
            .proposals
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    /// Number of completed fetch cycles; 0 until the first one lands.
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().updated_at
    }

    pub fn is_loaded(&self) -> bool {
        self.generation() > 0
    }

    /// Error of the most recent cycle, cleared by the next successful one.
    pub fn last_error(&self) -> Option<FetchError> {
        self.state.read().last_error.clone()
    }

    fn replace(&self, proposals: Vec<Proposal>) -> (u64, Arc<Vec<Proposal>>) {
        let proposals = Arc::new(proposals);
        let mut state = self.state.write();
        state.proposals = proposals.clone();
        state.generation += 1;
        state.updated_at = Some(Utc::now());
        state.last_error = None;
        (state.generation, proposals)
    }

    /// Record a failed cycle unless a newer one published since it started.
    fn record_error_if_current(&self, error: FetchError, started_at: u64) -> bool {
        let mut state = self.state.write();
        if state.generation != started_at {
            return false;
        }
        state.last_error = Some(error);
        true
    }
}

/// Polls the indexer and keeps the [`ProposalStore`] current.
pub struct ProposalFetcher {
    indexer: Arc<dyn ProposalIndexer>,
    store: Arc<ProposalStore>,
    breaker: IndexerCircuitBreaker,
    candidate_count: u64,
    poll_interval: Duration,
}

impl ProposalFetcher {
    pub fn new(
        indexer: Arc<dyn ProposalIndexer>,
        store: Arc<ProposalStore>,
        config: &FetcherConfig,
    ) -> Self {
        Self {
            indexer,
            store,
            breaker: IndexerCircuitBreaker::new(config.circuit_breaker.clone()),
            candidate_count: config.candidate_count,
            poll_interval: config.poll_interval,
        }
    }

    pub fn store(&self) -> &Arc<ProposalStore> {
        &self.store
    }

    /// Run one fetch cycle without touching the store.
    pub async fn fetch(&self) -> Result<Vec<Proposal>, FetchError> {
        self.fetch_cycle(None).await
    }

    /// `started_at` is the store generation the cycle began from; a transport
    /// failure is only counted while no newer cycle has published.
    async fn fetch_cycle(&self, started_at: Option<u64>) -> Result<Vec<Proposal>, FetchError> {
        if let Err(open) = self.breaker.check() {
            return Err(FetchError::TransportUnavailable {
                reason: open.to_string(),
            });
        }

        let queries = (0..self.candidate_count).map(|id| {
            let indexer = self.indexer.clone();
            async move { (id, indexer.proposals_by_id(id).await) }
        });
        let results = join_all(queries).await;

        let mut proposals = Vec::new();
        let mut transport_failures = 0u64;
        let mut last_transport_error: Option<IndexerError> = None;

        for (id, result) in results {
            match result {
                Ok(mut records) => proposals.append(&mut records),
                Err(e) => {
                    warn!(candidate_id = id, error = %e, "Skipping proposal query");
                    if e.is_transport() {
                        transport_failures += 1;
                        last_transport_error = Some(e);
                    }
                }
            }
        }

        if self.candidate_count > 0 && transport_failures == self.candidate_count {
            if started_at.map_or(true, |generation| generation == self.store.generation()) {
                self.breaker.record_failure();
            }
            let reason = last_transport_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "all indexer queries failed".to_string());
            return Err(FetchError::TransportUnavailable { reason });
        }

        self.breaker.record_success();
        Ok(proposals)
    }

    /// Run one fetch cycle and publish the result.
    ///
    /// On failure the previous proposal set is kept and the error is recorded
    /// on the store, unless a newer cycle has published in the meantime.
    pub async fn refresh(&self) -> Result<Arc<Vec<Proposal>>, FetchError> {
        let started_at = self.store.generation();
        match self.fetch_cycle(Some(started_at)).await {
            Ok(proposals) => {
                let (generation, proposals) = self.store.replace(proposals);
                debug!(count = proposals.len(), generation, "Proposal set refreshed");
                Ok(proposals)
            }
            Err(e) => {
                if self.store.record_error_if_current(e.clone(), started_at) {
                    warn!(error = %e, "Proposal refresh failed, keeping cached set");
                } else {
                    debug!(error = %e, started_at, "Ignoring failure of superseded refresh");
                }
                Err(e)
            }
        }
    }

    /// Start the background polling loop.
    ///
    /// The first cycle runs immediately. Cycles run in a set owned by the
    /// polling task, so aborting the returned handle also cancels any cycle
    /// still in flight.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let fetcher = self.clone();
        info!(
            interval_secs = fetcher.poll_interval.as_secs_f64(),
            candidates = fetcher.candidate_count,
            "Starting proposal polling"
        );

        tokio::spawn(async move {
            let mut ticker = interval(fetcher.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let mut cycles = JoinSet::new();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // A stalled cycle never holds back the next tick.
                        let cycle = fetcher.clone();
                        cycles.spawn(async move {
                            let _ = cycle.refresh().await;
                        });
                    }
                    Some(joined) = cycles.join_next(), if !cycles.is_empty() => {
                        if let Err(e) = joined {
                            warn!(error = %e, "Proposal fetch cycle ended abnormally");
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl ProposalRefresh for ProposalFetcher {
    async fn refresh_now(&self) {
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "On-demand proposal refresh failed");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use crate::proposal::sample_proposal;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;
    use tokio::sync::Semaphore;

    /// Indexer double: fixed records per id, a set of ids whose query fails.
    #[derive(Default)]
    pub(crate) struct FakeIndexer {
        pub records: Mutex<HashMap<u64, Vec<Proposal>>>,
        pub failing: Mutex<HashSet<u64>>,
        pub transport_down: std::sync::atomic::AtomicBool,
        pub calls: AtomicUsize,
    }

    impl FakeIndexer {
        pub(crate) fn with_one_per_id(count: u64, id_offset: u64) -> Self {
            let indexer = FakeIndexer::default();
            {
                let mut records = indexer.records.lock();
                for id in 0..count {
                    let proposal_id = id + id_offset;
                    records.insert(
                        id,
                        vec![sample_proposal(proposal_id, &format!("ipfs://proposal-{proposal_id}"))],
                    );
                }
            }
            indexer
        }
    }

    #[async_trait]
    impl ProposalIndexer for FakeIndexer {
        async fn proposals_by_id(&self, id: u64) -> Result<Vec<Proposal>, IndexerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.transport_down.load(Ordering::SeqCst) {
                return Err(IndexerError::Transport("connection refused".into()));
            }
            if self.failing.lock().contains(&id) {
                return Err(IndexerError::Query(format!("no entity for {id}")));
            }
            Ok(self.records.lock().get(&id).cloned().unwrap_or_default())
        }
    }

    /// Indexer double that answers calls in order from a script. A gated
    /// entry holds its answer until the test adds a permit.
    #[derive(Default)]
    struct ScriptedIndexer {
        script: Mutex<VecDeque<(Option<Arc<Semaphore>>, Result<Vec<Proposal>, IndexerError>)>>,
        started: AtomicUsize,
    }

    impl ScriptedIndexer {
        fn push(
            &self,
            gate: Option<Arc<Semaphore>>,
            result: Result<Vec<Proposal>, IndexerError>,
        ) {
            self.script.lock().push_back((gate, result));
        }

        async fn wait_started(&self, count: usize) {
            let deadline = Instant::now() + Duration::from_millis(500);
            while self.started.load(Ordering::SeqCst) < count {
                if Instant::now() > deadline {
                    panic!("indexer never saw {count} calls");
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        }
    }

    #[async_trait]
    impl ProposalIndexer for ScriptedIndexer {
        async fn proposals_by_id(&self, _id: u64) -> Result<Vec<Proposal>, IndexerError> {
            let next = self.script.lock().pop_front();
            self.started.fetch_add(1, Ordering::SeqCst);
            let (gate, result) = next.unwrap_or((None, Ok(Vec::new())));
            if let Some(gate) = gate {
                gate.acquire().await.unwrap().forget();
            }
            result
        }
    }

    fn fetcher_with(indexer: Arc<dyn ProposalIndexer>, candidates: u64) -> ProposalFetcher {
        breaker_fetcher(indexer, candidates, 2, Duration::from_millis(10))
    }

    fn breaker_fetcher(
        indexer: Arc<dyn ProposalIndexer>,
        candidates: u64,
        failure_threshold: u32,
        poll_interval: Duration,
    ) -> ProposalFetcher {
        let config = FetcherConfig {
            candidate_count: candidates,
            poll_interval,
            request_timeout: Duration::from_secs(1),
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold,
                reset_timeout: Duration::from_secs(60),
                success_threshold: 1,
            },
        };
        ProposalFetcher::new(indexer, Arc::new(ProposalStore::new()), &config)
    }

    fn ids(proposals: &[Proposal]) -> Vec<u64> {
        proposals.iter().map(|p| p.id).collect()
    }

    #[tokio::test]
    async fn test_merge_keeps_query_order_not_id_order() {
        let indexer = Arc::new(FakeIndexer::with_one_per_id(10, 100));
        // Candidate 0 answers with the highest proposal id.
        indexer
            .records
            .lock()
            .insert(0, vec![sample_proposal(109, "ipfs://z")]);
        indexer
            .records
            .lock()
            .insert(9, vec![sample_proposal(100, "ipfs://a")]);
        let fetcher = fetcher_with(indexer, 10);

        let proposals = fetcher.fetch().await.unwrap();
        assert_eq!(
            ids(&proposals),
            vec![109, 101, 102, 103, 104, 105, 106, 107, 108, 100]
        );
    }

    #[tokio::test]
    async fn test_ten_candidates_return_ten_entries() {
        let indexer = Arc::new(FakeIndexer::with_one_per_id(10, 100));
        let fetcher = fetcher_with(indexer.clone(), 10);

        let proposals = fetcher.fetch().await.unwrap();
        assert_eq!(proposals.len(), 10);
        assert_eq!(ids(&proposals), (100..110).collect::<Vec<_>>());
        assert_eq!(indexer.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_merge_is_idempotent() {
        let indexer = Arc::new(FakeIndexer::with_one_per_id(10, 0));
        let fetcher = fetcher_with(indexer, 10);

        let first = fetcher.fetch().await.unwrap();
        let second = fetcher.fetch().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_partial_failures_are_gaps() {
        let indexer = Arc::new(FakeIndexer::with_one_per_id(10, 0));
        indexer.failing.lock().extend([2, 5, 7]);
        let fetcher = fetcher_with(indexer, 10);

        let proposals = fetcher.fetch().await.expect("partial failure is not an error");
        assert_eq!(ids(&proposals), vec![0, 1, 3, 4, 6, 8, 9]);
    }

    #[tokio::test]
    async fn test_multiple_records_per_id_are_concatenated() {
        let indexer = Arc::new(FakeIndexer::default());
        indexer.records.lock().insert(
            1,
            vec![sample_proposal(11, "a"), sample_proposal(12, "b")],
        );
        indexer.records.lock().insert(0, vec![sample_proposal(10, "c")]);
        let fetcher = fetcher_with(indexer, 3);

        assert_eq!(ids(&fetcher.fetch().await.unwrap()), vec![10, 11, 12]);
    }

    #[tokio::test]
    async fn test_transport_down_keeps_stale_set() {
        let indexer = Arc::new(FakeIndexer::with_one_per_id(3, 0));
        let fetcher = fetcher_with(indexer.clone(), 3);

        fetcher.refresh().await.unwrap();
        assert_eq!(fetcher.store().snapshot().len(), 3);
        assert_eq!(fetcher.store().generation(), 1);

        indexer.transport_down.store(true, Ordering::SeqCst);
        let err = fetcher.refresh().await.unwrap_err();
        assert!(matches!(err, FetchError::TransportUnavailable { .. }));

        assert_eq!(fetcher.store().snapshot().len(), 3);
        assert_eq!(fetcher.store().generation(), 1);
        assert_eq!(fetcher.store().last_error(), Some(err));

        indexer.transport_down.store(false, Ordering::SeqCst);
        fetcher.refresh().await.unwrap();
        assert!(fetcher.store().last_error().is_none());
        assert_eq!(fetcher.store().generation(), 2);
    }

    #[tokio::test]
    async fn test_circuit_opens_and_skips_queries() {
        let indexer = Arc::new(FakeIndexer::with_one_per_id(4, 0));
        indexer.transport_down.store(true, Ordering::SeqCst);
        let fetcher = fetcher_with(indexer.clone(), 4);

        assert!(fetcher.fetch().await.is_err());
        assert!(fetcher.fetch().await.is_err());
        assert_eq!(fetcher.breaker.state(), CircuitState::Open);
        let calls_before = indexer.calls.load(Ordering::SeqCst);

        let err = fetcher.fetch().await.unwrap_err();
        assert!(err.to_string().contains("circuit open"));
        assert_eq!(indexer.calls.load(Ordering::SeqCst), calls_before);
    }

    #[tokio::test]
    async fn test_zero_candidates_yield_empty_set() {
        let indexer = Arc::new(FakeIndexer::default());
        let fetcher = fetcher_with(indexer, 0);
        assert!(fetcher.fetch().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_replaces_whole_set() {
        let indexer = Arc::new(FakeIndexer::with_one_per_id(3, 0));
        let fetcher = fetcher_with(indexer.clone(), 3);
        fetcher.refresh().await.unwrap();
        let before = fetcher.store().snapshot();

        indexer.records.lock().remove(&1);
        fetcher.refresh().await.unwrap();

        assert_eq!(ids(&before), vec![0, 1, 2]);
        assert_eq!(ids(&fetcher.store().snapshot()), vec![0, 2]);
        assert!(fetcher.store().get(1).is_none());
        assert!(fetcher.store().get(2).is_some());
    }

    #[tokio::test]
    async fn test_overlapping_cycles_last_completed_wins() {
        let indexer = Arc::new(ScriptedIndexer::default());
        let gate = Arc::new(Semaphore::new(0));
        indexer.push(Some(gate.clone()), Ok(vec![sample_proposal(1, "ipfs://slow")]));
        indexer.push(None, Ok(vec![sample_proposal(2, "ipfs://fast")]));
        let fetcher = Arc::new(fetcher_with(indexer.clone(), 1));

        let slow = {
            let fetcher = fetcher.clone();
            tokio::spawn(async move { fetcher.refresh().await })
        };
        indexer.wait_started(1).await;

        fetcher.refresh().await.unwrap();
        assert_eq!(ids(&fetcher.store().snapshot()), vec![2]);
        assert_eq!(fetcher.store().generation(), 1);

        gate.add_permits(1);
        slow.await.unwrap().unwrap();
        assert_eq!(ids(&fetcher.store().snapshot()), vec![1]);
        assert_eq!(fetcher.store().generation(), 2);
    }

    #[tokio::test]
    async fn test_late_failure_after_newer_success_is_ignored() {
        let indexer = Arc::new(ScriptedIndexer::default());
        let gate = Arc::new(Semaphore::new(0));
        indexer.push(
            Some(gate.clone()),
            Err(IndexerError::Transport("connection reset".into())),
        );
        indexer.push(None, Ok(vec![sample_proposal(2, "ipfs://fresh")]));
        let fetcher = Arc::new(breaker_fetcher(
            indexer.clone(),
            1,
            1,
            Duration::from_millis(10),
        ));

        let slow = {
            let fetcher = fetcher.clone();
            tokio::spawn(async move { fetcher.refresh().await })
        };
        indexer.wait_started(1).await;
        fetcher.refresh().await.unwrap();

        gate.add_permits(1);
        let late = slow.await.unwrap();
        assert!(matches!(late, Err(FetchError::TransportUnavailable { .. })));

        assert!(fetcher.store().last_error().is_none());
        assert_eq!(fetcher.store().generation(), 1);
        assert_eq!(ids(&fetcher.store().snapshot()), vec![2]);
        assert_eq!(fetcher.breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_stopping_poller_cancels_cycle_in_flight() {
        let indexer = Arc::new(ScriptedIndexer::default());
        let gate = Arc::new(Semaphore::new(0));
        indexer.push(Some(gate.clone()), Ok(vec![sample_proposal(1, "ipfs://late")]));
        let fetcher = Arc::new(breaker_fetcher(
            indexer.clone(),
            1,
            2,
            Duration::from_secs(60),
        ));

        let handle = fetcher.start();
        indexer.wait_started(1).await;
        handle.abort();
        let _ = handle.await;

        gate.add_permits(1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fetcher.store().generation(), 0);
        assert!(fetcher.store().snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_polling_loop_populates_store() {
        let indexer = Arc::new(FakeIndexer::with_one_per_id(2, 0));
        let fetcher = Arc::new(fetcher_with(indexer, 2));
        let handle = fetcher.start();

        let deadline = Instant::now() + Duration::from_millis(500);
        while fetcher.store().generation() < 2 {
            if Instant::now() > deadline {
                panic!("polling loop never refreshed twice");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(fetcher.store().snapshot().len(), 2);

        handle.abort();
    }

    #[tokio::test]
    async fn test_polling_against_graphql_server() {
        let body = r#"{"data":{"proposals":[{"id":"1","proposerId":"0xab","uri":"ipfs://live","startTime":"1","endTime":"2","forScore":"0","againstScore":"0","executed":false}]}}"#;
        let (addr, server) = crate::indexer::tests::spawn_repeating_graphql_server(body).await;
        let indexer = crate::indexer::GraphqlIndexer::new(
            &format!("http://{addr}"),
            Duration::from_secs(5),
        )
        .unwrap();
        let config = FetcherConfig {
            candidate_count: 3,
            poll_interval: Duration::from_millis(20),
            ..FetcherConfig::default()
        };
        let fetcher = Arc::new(ProposalFetcher::new(
            Arc::new(indexer),
            Arc::new(ProposalStore::new()),
            &config,
        ));
        let handle = fetcher.start();

        let deadline = Instant::now() + Duration::from_secs(2);
        while !fetcher.store().is_loaded() {
            if Instant::now() > deadline {
                panic!("store never loaded from graphql server");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(fetcher.store().snapshot().len(), 3);

        handle.abort();
        server.abort();
    }
}
