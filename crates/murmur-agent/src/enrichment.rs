// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded worker pool for post-turn enrichment.
//!
//! Recording a turn enqueues one job and returns. Workers embed the message
//! into the vector index and, for assistant turns, run entity tracking and
//! fact extraction over the exchange. A full queue drops the job with a
//! warning and a counter; failures inside a job are logged under the job's
//! correlation id and never reach the caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use murmur_core::types::{Message, MessageRole, SnippetKind, VectorMetadata};
use murmur_core::{EmbeddingAdapter, MurmurError, StorageAdapter, VectorIndex};
use murmur_memory::{EntityTracker, FactExtractor};
use murmur_resilience::{BreakerRegistry, Dependency};

/// How far back to look for the user message an assistant turn answers.
const EXCHANGE_LOOKBACK: usize = 4;

/// One recorded turn awaiting enrichment.
#[derive(Debug, Clone)]
pub struct EnrichmentJob {
    pub correlation_id: String,
    pub message: Message,
}

/// Queue counters for the status surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnrichmentStats {
    pub pending: usize,
    pub dropped: u64,
    pub workers: usize,
}

/// The work done for one job.
pub struct Enricher {
    storage: Arc<dyn StorageAdapter>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingAdapter>,
    breakers: Arc<BreakerRegistry>,
    entities: Arc<EntityTracker>,
    facts: Arc<FactExtractor>,
    track_entities: bool,
}

impl Enricher {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingAdapter>,
        breakers: Arc<BreakerRegistry>,
        entities: Arc<EntityTracker>,
        facts: Arc<FactExtractor>,
        track_entities: bool,
    ) -> Self {
        Self {
            storage,
            vectors,
            embedder,
            breakers,
            entities,
            facts,
            track_entities,
        }
    }

    pub async fn process(&self, job: &EnrichmentJob) {
        let message = &job.message;
        if let Err(e) = self.index(message).await {
            warn!(error = %e, "message stored without embedding");
        }
        if message.role != MessageRole::Assistant {
            return;
        }

        let user_text = match self.preceding_user_text(message).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "could not load the exchange for extraction");
                return;
            }
        };

        if self.track_entities {
            let ids = self
                .entities
                .track_turn(&message.user_id, &user_text, &message.content)
                .await;
            debug!(entities = ids.len(), "entities tracked");
        }
        match self
            .facts
            .extract_and_store(
                &message.user_id,
                Some(&message.session_id),
                &user_text,
                &message.content,
            )
            .await
        {
            Ok(created) if !created.is_empty() => info!(facts = created.len(), "facts remembered"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "fact extraction failed"),
        }
    }

    async fn index(&self, message: &Message) -> Result<(), MurmurError> {
        let embedder = Arc::clone(&self.embedder);
        let text = message.content.clone();
        let vector = self
            .breakers
            .get(Dependency::LlmEmbed)
            .call(async move { embedder.embed(&text).await })
            .await?;
        let metadata = VectorMetadata {
            user_id: message.user_id.clone(),
            kind: SnippetKind::Message,
        };
        self.vectors.upsert(&message.id, &vector, &metadata).await
    }

    /// Text of the latest user message recorded before `message` in its session.
    async fn preceding_user_text(&self, message: &Message) -> Result<String, MurmurError> {
        let recent = self
            .storage
            .recent_messages(&message.session_id, EXCHANGE_LOOKBACK)
            .await?;
        Ok(recent
            .into_iter()
            .rev()
            .filter(|m| m.id != message.id && m.created_at <= message.created_at)
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content)
            .unwrap_or_default())
    }
}

/// Fixed-size pool draining a bounded job queue.
pub struct EnrichmentQueue {
    tx: mpsc::Sender<EnrichmentJob>,
    accepting: AtomicBool,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
    dropped: AtomicU64,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
    cancel: CancellationToken,
}

impl EnrichmentQueue {
    /// Spawn `workers` tasks sharing a queue of `capacity` jobs. Workers stop
    /// when `cancel` fires.
    pub fn start(
        enricher: Arc<Enricher>,
        workers: usize,
        capacity: usize,
        cancel: CancellationToken,
    ) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let pending = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());

        let handles = (0..workers)
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&rx),
                    Arc::clone(&enricher),
                    Arc::clone(&pending),
                    Arc::clone(&idle),
                    cancel.clone(),
                ))
            })
            .collect();
        info!(workers, capacity, "enrichment workers started");

        Self {
            tx,
            accepting: AtomicBool::new(true),
            pending,
            idle,
            dropped: AtomicU64::new(0),
            workers: std::sync::Mutex::new(handles),
            worker_count: workers,
            cancel,
        }
    }

    /// Enqueue a job without waiting. Returns false if it was dropped.
    pub fn submit(&self, job: EnrichmentJob) -> bool {
        if !self.accepting.load(Ordering::SeqCst) {
            self.record_drop(&job, "shutting down");
            return false;
        }
        self.pending.fetch_add(1, Ordering::SeqCst);
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(e) => {
                self.finish_one();
                let reason = match &e {
                    mpsc::error::TrySendError::Full(_) => "queue full",
                    mpsc::error::TrySendError::Closed(_) => "workers stopped",
                };
                self.record_drop(&e.into_inner(), reason);
                false
            }
        }
    }

    /// Resolves once every accepted job has been processed.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn stats(&self) -> EnrichmentStats {
        EnrichmentStats {
            pending: self.pending.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
            workers: self.worker_count,
        }
    }

    /// Stop accepting jobs, give queued ones up to `timeout`, then stop the
    /// workers.
    pub async fn shutdown(&self, timeout: std::time::Duration) {
        self.accepting.store(false, Ordering::SeqCst);
        if tokio::time::timeout(timeout, self.wait_idle()).await.is_err() {
            warn!(
                remaining = self.pending.load(Ordering::SeqCst),
                "enrichment drain timed out, abandoning queued jobs"
            );
        }
        self.cancel.cancel();
        let handles: Vec<_> = self
            .workers
            .lock()
            .map(|mut w| w.drain(..).collect())
            .unwrap_or_default();
        for handle in handles {
            let _ = handle.await;
        }
        info!("enrichment workers stopped");
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn record_drop(&self, job: &EnrichmentJob, reason: &str) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
        metrics::counter!("murmur_enrichment_dropped_total").increment(1);
        warn!(
            correlation_id = %job.correlation_id,
            session_id = %job.message.session_id,
            reason,
            "enrichment job dropped"
        );
    }
}

async fn worker_loop(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<EnrichmentJob>>>,
    enricher: Arc<Enricher>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = async { rx.lock().await.recv().await } => job,
        };
        let Some(job) = job else { break };

        let span = info_span!(
            "enrichment",
            worker,
            correlation_id = %job.correlation_id,
            session_id = %job.message.session_id,
            user = %job.message.user_id,
        );
        enricher.process(&job).instrument(span).await;

        if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            idle.notify_waiters();
        }
    }
    debug!(worker, "enrichment worker exiting");
}
