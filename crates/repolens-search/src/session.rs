//! Query session controller: debounce and cancellation
//!
//! Sits between the UI's input stream and the query engine. Each keystroke
//! supersedes any pending query and restarts a fixed debounce delay; only
//! the highest sequence number ever seen is allowed to complete and reach
//! the UI, so a stale completion is discarded by a plain integer
//! comparison rather than by racing timer callbacks.
//!
//! The state machine lives in [`Debouncer`], which is pure and takes
//! explicit timestamps, making the debounce/cancellation contract testable
//! without timers. [`QuerySession`] is the async wrapper that drives it
//! with tokio timers and dispatches to the [`HybridQueryEngine`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::query::{HybridQueryEngine, SearchMode, SearchQuery, SearchResult};

/// A query released by the debouncer for dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchedQuery {
    /// Sequence number of the input event that produced it
    pub seq: u64,
    /// Query text
    pub text: String,
}

/// One pending input awaiting its debounce deadline
#[derive(Debug, Clone)]
struct Pending {
    seq: u64,
    text: String,
    deadline: u64,
}

/// Pure debounce/cancellation state machine.
///
/// States per query: Idle -> Pending -> (Cancelled | Completed). A new
/// input moves any Pending query to Cancelled by replacing it; [`accept`]
/// admits a completion only for the highest sequence number observed.
/// Time is an explicit `u64` in caller-defined units.
///
/// [`accept`]: Debouncer::accept
#[derive(Debug)]
pub struct Debouncer {
    debounce: u64,
    next_seq: u64,
    pending: Option<Pending>,
}

impl Debouncer {
    /// Create a debouncer with the given delay.
    pub fn new(debounce: u64) -> Self {
        Self {
            debounce,
            next_seq: 0,
            pending: None,
        }
    }

    /// Record a new input event, superseding any pending query.
    ///
    /// Returns the sequence number assigned to this input.
    pub fn observe(&mut self, now: u64, text: impl Into<String>) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.pending = Some(Pending {
            seq,
            text: text.into(),
            deadline: now + self.debounce,
        });
        seq
    }

    /// Deadline of the pending query, if any.
    pub fn next_deadline(&self) -> Option<u64> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    /// Release the pending query if its debounce deadline has passed.
    pub fn due(&mut self, now: u64) -> Option<DispatchedQuery> {
        if self.pending.as_ref().is_some_and(|p| p.deadline <= now) {
            self.pending.take().map(|p| DispatchedQuery {
                seq: p.seq,
                text: p.text,
            })
        } else {
            None
        }
    }

    /// Whether a completion for `seq` may be delivered.
    ///
    /// Only the most recent input's sequence number is ever accepted;
    /// everything older was superseded and its result must be dropped.
    pub fn accept(&self, seq: u64) -> bool {
        seq == self.next_seq
    }
}

/// Session tuning knobs
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Debounce delay in milliseconds
    pub debounce_ms: u64,
    /// Maximum results per delivered query
    pub limit: usize,
    /// Search mode for dispatched queries
    pub mode: SearchMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            limit: 25,
            mode: SearchMode::Hybrid,
        }
    }
}

/// A delivered (non-superseded) query completion
#[derive(Debug)]
pub struct SessionResult {
    /// Sequence number of the completed query
    pub seq: u64,
    /// Query text it was computed for
    pub text: String,
    /// Ranked results
    pub results: Vec<SearchResult>,
}

/// Async wrapper driving a [`Debouncer`] against the query engine.
///
/// Dropping the session closes the input channel and ends the background
/// task; an in-flight engine call is not aborted, its result is simply
/// never delivered.
pub struct QuerySession {
    input: mpsc::UnboundedSender<String>,
    output: mpsc::UnboundedReceiver<SessionResult>,
}

impl QuerySession {
    /// Spawn a session task over the given engine.
    pub fn spawn(engine: Arc<HybridQueryEngine>, config: SessionConfig) -> Self {
        let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();
        let (output_tx, output_rx) = mpsc::unbounded_channel::<SessionResult>();

        tokio::spawn(async move {
            let started = Instant::now();
            let mut debouncer = Debouncer::new(config.debounce_ms);
            let (done_tx, mut done_rx) =
                mpsc::unbounded_channel::<(u64, String, Vec<SearchResult>)>();

            loop {
                let deadline = debouncer.next_deadline();

                tokio::select! {
                    maybe_input = input_rx.recv() => {
                        match maybe_input {
                            Some(text) => {
                                let now = now_ms(started);
                                debouncer.observe(now, text);
                            }
                            // UI went away, session over
                            None => break,
                        }
                    }
                    Some((seq, text, results)) = done_rx.recv() => {
                        if debouncer.accept(seq) {
                            let _ = output_tx.send(SessionResult { seq, text, results });
                        } else {
                            debug!("Discarding superseded result (seq {})", seq);
                        }
                    }
                    _ = sleep_until(started, deadline), if deadline.is_some() => {
                        if let Some(query) = debouncer.due(now_ms(started)) {
                            dispatch(&engine, &config, query, done_tx.clone());
                        }
                    }
                }
            }
        });

        Self {
            input: input_tx,
            output: output_rx,
        }
    }

    /// Feed one input event (a keystroke's resulting text).
    ///
    /// Returns false if the session task has ended.
    pub fn submit(&self, text: impl Into<String>) -> bool {
        self.input.send(text.into()).is_ok()
    }

    /// Receive the next non-superseded query completion.
    pub async fn recv(&mut self) -> Option<SessionResult> {
        self.output.recv().await
    }
}

/// Milliseconds since session start.
fn now_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Sleep until the given session-relative deadline.
async fn sleep_until(started: Instant, deadline_ms: Option<u64>) {
    match deadline_ms {
        Some(ms) => tokio::time::sleep_until(started + Duration::from_millis(ms)).await,
        // Branch is disabled by the select guard; never completes
        None => std::future::pending().await,
    }
}

/// Dispatch one debounced query to the engine on its own task.
fn dispatch(
    engine: &Arc<HybridQueryEngine>,
    config: &SessionConfig,
    query: DispatchedQuery,
    done: mpsc::UnboundedSender<(u64, String, Vec<SearchResult>)>,
) {
    let engine = Arc::clone(engine);
    let search = SearchQuery {
        text: query.text.clone(),
        mode: config.mode,
        seq: query.seq,
    };
    let limit = config.limit;

    tokio::spawn(async move {
        match engine.search(&search, limit).await {
            Ok(results) => {
                let _ = done.send((search.seq, search.text, results));
            }
            Err(e) => warn!("Query '{}' failed: {}", search.text, e),
        }
    });
}
