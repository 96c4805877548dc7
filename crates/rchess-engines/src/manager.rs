//! Request serialization and caching for one logical engine.
//!
//! The manager is the sole cross-request mutual-exclusion boundary for its
//! engine: an unbounded FIFO queue drained by a single worker thread, each
//! request run to full completion before the next, which is what upholds
//! the session's single-in-flight contract under arbitrary concurrency.
//! The cache sits in front of the queue and is strictly opportunistic.
//!
//! No queue-length bound is imposed: under sustained overload callers see
//! growing latency, not rejection.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use crate::cache::{AnalysisCache, CachedAnalysis};
use crate::client::EngineClient;
use crate::config::SearchSettings;
use crate::error::{EngineError, EngineResult};
use crate::process::lock;
use crate::types::{AnalysisResult, EngineOptions};

struct QueuedRequest {
    fen: String,
    options: EngineOptions,
    /// One-shot completion handle; resolving or rejecting it destroys the
    /// request.
    completion: mpsc::Sender<EngineResult<AnalysisResult>>,
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<QueuedRequest>,
    worker_running: bool,
}

pub struct EngineManager {
    client: Arc<EngineClient>,
    cache: AnalysisCache,
    settings: SearchSettings,
    state: Arc<Mutex<QueueState>>,
    /// Searches that actually reached the engine (cache misses).
    engine_calls: Arc<AtomicU64>,
}

impl EngineManager {
    pub fn new(client: Arc<EngineClient>, cache: AnalysisCache, settings: SearchSettings) -> Self {
        EngineManager {
            client,
            cache,
            settings,
            state: Arc::new(Mutex::new(QueueState::default())),
            engine_calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn client(&self) -> &Arc<EngineClient> {
        &self.client
    }

    /// Requests that reached the engine rather than the cache.
    pub fn engine_calls(&self) -> u64 {
        self.engine_calls.load(Ordering::Relaxed)
    }

    pub fn queue_len(&self) -> usize {
        lock(&self.state).queue.len()
    }

    /// Cached-or-queued analysis; safe under unbounded concurrent callers.
    pub fn analyze_position(
        &self,
        fen: &str,
        options: EngineOptions,
    ) -> EngineResult<AnalysisResult> {
        let depth = options.requested_depth(self.settings.default_depth);
        let multipv = options.multi_pv.unwrap_or(1);

        // Multi-line requests skip the cache: entries model a single line
        // and serving one to a MultiPV caller would drop data.
        if multipv <= 1 {
            if let Some(hit) = self.cache.lookup(fen, depth) {
                log::debug!("cache hit for ({fen}, depth {depth})");
                return Ok(hit.into_result());
            }
        }

        let (tx, rx) = mpsc::channel();
        {
            let mut st = lock(&self.state);
            st.queue.push_back(QueuedRequest {
                fen: fen.to_string(),
                options,
                completion: tx,
            });
        }
        self.ensure_worker();

        // The worker rejects or resolves every request it pops; a dropped
        // sender without a verdict means the worker died mid-request.
        rx.recv().unwrap_or_else(|_| {
            Err(EngineError::Crashed {
                engine: self.client.kind().to_string(),
            })
        })
    }

    /// Start the queue worker if it is not running. Idempotent; the worker
    /// parks itself (exits) when the queue empties and is restarted by the
    /// next enqueue.
    fn ensure_worker(&self) {
        {
            let mut st = lock(&self.state);
            if st.worker_running {
                return;
            }
            st.worker_running = true;
        }

        let client = Arc::clone(&self.client);
        let cache = self.cache.clone();
        let state = Arc::clone(&self.state);
        let engine_calls = Arc::clone(&self.engine_calls);

        thread::spawn(move || loop {
            let request = {
                let mut st = lock(&state);
                match st.queue.pop_front() {
                    Some(r) => r,
                    None => {
                        st.worker_running = false;
                        break;
                    }
                }
            };

            engine_calls.fetch_add(1, Ordering::Relaxed);
            let multipv = request.options.multi_pv.unwrap_or(1);
            let result = if multipv > 1 {
                client.analyze_position(&request.fen, &request.options)
            } else {
                client.get_best_move(&request.fen, &request.options)
            };

            if multipv <= 1 {
                if let Ok(analysis) = &result {
                    cache.store(&request.fen, &CachedAnalysis::from_result(analysis));
                }
            }
            if let Err(e) = &result {
                // Rejects only this request; the queue keeps draining.
                log::warn!("queued analysis of '{}' failed: {e}", request.fen);
            }

            // The caller may have given up waiting; that is its business.
            let _ = request.completion.send(result);
        });
    }

    /// Default-depth best-move preset.
    pub fn get_best_move(&self, fen: &str) -> EngineResult<AnalysisResult> {
        self.analyze_position(
            fen,
            EngineOptions {
                depth: Some(self.settings.default_depth),
                ..Default::default()
            },
        )
    }

    /// Fixed deep-depth preset.
    pub fn deep_analysis(&self, fen: &str) -> EngineResult<AnalysisResult> {
        self.analyze_position(
            fen,
            EngineOptions {
                depth: Some(self.settings.deep_depth),
                ..Default::default()
            },
        )
    }

    /// Fixed shallow-depth preset returning only the evaluation.
    pub fn quick_eval(&self, fen: &str) -> EngineResult<i32> {
        let result = self.analyze_position(
            fen,
            EngineOptions {
                depth: Some(self.settings.quick_depth),
                ..Default::default()
            },
        )?;
        Ok(result.evaluation)
    }
}
