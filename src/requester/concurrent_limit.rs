use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::requester::requester_trait::{QueryRequest, Requester, RowResult, RowStream};
use crate::utils::config::RequesterConfig;
use crate::utils::error::RequesterError;

const CHANNEL_CAPACITY: usize = 64;

struct QueueItem {
    request: QueryRequest,
    output: mpsc::Sender<RowResult>,
}

struct AdmissionState {
    outstanding: usize,
    queue: VecDeque<QueueItem>,
}

struct Shared {
    inner: Arc<dyn Requester>,
    concurrent_limit: usize,
    timeout: Duration,
    state: Mutex<AdmissionState>,
}

/// Wraps a raw transport with an admission-controlled FIFO queue.
///
/// At most `concurrent_limit` requests are outstanding against the inner
/// transport; the rest wait in submission order. Submission never blocks:
/// the caller always gets its output channel back immediately, fed either
/// directly from the transport or later when a slot frees up.
pub struct ConcurrentLimitRequester {
    shared: Arc<Shared>,
}

impl ConcurrentLimitRequester {
    pub fn new(
        inner: Arc<dyn Requester>,
        config: RequesterConfig,
    ) -> Result<Self, RequesterError> {
        if config.concurrent_limit == 0 {
            return Err(RequesterError::InvalidConfig(
                "concurrent_limit must be a positive number".to_string(),
            ));
        }
        Ok(Self {
            shared: Arc::new(Shared {
                inner,
                concurrent_limit: config.concurrent_limit,
                timeout: Duration::from_millis(config.timeout_ms),
                state: Mutex::new(AdmissionState {
                    outstanding: 0,
                    queue: VecDeque::new(),
                }),
            }),
        })
    }

    /// Currently dispatched request count, for observability.
    pub fn outstanding(&self) -> usize {
        lock(&self.shared.state).outstanding
    }

    /// Currently queued request count, for observability.
    pub fn queued(&self) -> usize {
        lock(&self.shared.state).queue.len()
    }
}

impl Requester for ConcurrentLimitRequester {
    fn request(&self, request: QueryRequest) -> RowStream {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let immediate = {
            let mut state = lock(&self.shared.state);
            if state.outstanding < self.shared.concurrent_limit {
                state.outstanding += 1;
                true
            } else {
                debug!(
                    queued = state.queue.len() + 1,
                    "concurrency limit reached, queueing request"
                );
                state.queue.push_back(QueueItem {
                    request: request.clone(),
                    output: tx.clone(),
                });
                false
            }
        };
        if immediate {
            Shared::dispatch(&self.shared, request, tx);
        }
        rx
    }
}

impl Shared {
    /// Pipe one request's transport stream into its output channel,
    /// applying the timeout and failure policies at the terminal.
    fn dispatch(shared: &Arc<Shared>, request: QueryRequest, output: mpsc::Sender<RowResult>) {
        let shared = Arc::clone(shared);
        tokio::spawn(async move {
            let started = Instant::now();
            let mut stream = shared.inner.request(request);
            loop {
                match stream.recv().await {
                    Some(Ok(row)) => {
                        // A dropped receiver stops production; the slot is
                        // still released below.
                        if output.send(Ok(row)).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(error)) => {
                        Shared::fail(&shared, &output, error).await;
                        return;
                    }
                    None => break,
                }
            }

            let elapsed = started.elapsed();
            if elapsed > shared.timeout {
                // The transport reported success, but past the budget the
                // request is failed-by-timeout anyway.
                Shared::fail(
                    &shared,
                    &output,
                    RequesterError::Timeout {
                        elapsed_ms: elapsed.as_millis() as u64,
                        budget_ms: shared.timeout.as_millis() as u64,
                    },
                )
                .await;
                return;
            }

            drop(output);
            Shared::complete(&shared);
        });
    }

    /// Normal completion: release the slot and dispatch the queue head, in
    /// exact submission order.
    fn complete(shared: &Arc<Shared>) {
        let next = {
            let mut state = lock(&shared.state);
            state.outstanding -= 1;
            if state.outstanding < shared.concurrent_limit {
                state.queue.pop_front().map(|item| {
                    state.outstanding += 1;
                    item
                })
            } else {
                None
            }
        };
        if let Some(item) = next {
            debug!("slot freed, dispatching queued request");
            Shared::dispatch(shared, item.request, item.output);
        }
    }

    /// Failure: deliver the error to the failing request only, close every
    /// queued channel without data, and reset admission state so later
    /// submissions are unaffected. Requests already dispatched keep running.
    async fn fail(
        shared: &Arc<Shared>,
        output: &mpsc::Sender<RowResult>,
        error: RequesterError,
    ) {
        let drained = {
            let mut state = lock(&shared.state);
            state.outstanding -= 1;
            state.queue.drain(..).collect::<Vec<_>>()
        };
        if !drained.is_empty() {
            warn!(
                dropped = drained.len(),
                "transport failure, draining queued requests"
            );
        }
        drop(drained);
        let _ = output.send(Err(error)).await;
    }
}

fn lock(state: &Mutex<AdmissionState>) -> std::sync::MutexGuard<'_, AdmissionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
