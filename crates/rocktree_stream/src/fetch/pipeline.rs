//! Deduplicated, prioritized fetch + decode on a bounded worker pool.
//!
//! ```text
//! Coordinator                        Workers (rayon pool)
//! ┌──────────────┐
//! │ request()    │ queue by priority
//! │ dispatch()   │──────────────────► store.get / transport.fetch (+ retries)
//! │              │                    │
//! │              │◄──── Fetched ──────┤
//! │              │                    decode
//! │ drain()      │◄──── Completed ────┘
//! └──────────────┘
//! ```
//!
//! The coordinator owns the queue and the outstanding set, so deduplication
//! needs no locks. Workers only ever talk back through the channel.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{self as channel, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use super::request::{DecodeJob, FetchEvent, FetchKey, FetchOutput, FetchPriority, FetchRequest, FetchTicket};
use super::retry::RetryPolicy;
use super::store::ByteStore;
use super::transport::Transport;
use crate::config::FetchConfig;
use crate::decode::{decode_bulk, decode_node_data, decode_planetoid};
use crate::error::FetchError;

/// Queue entry; `Reverse` in the heap makes the smallest priority pop first.
struct Queued {
  priority: FetchPriority,
  request: FetchRequest,
}

impl PartialEq for Queued {
  fn eq(&self, other: &Self) -> bool {
    self.priority == other.priority
  }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Queued {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering {
    self.priority.cmp(&other.priority)
  }
}

/// Counters since the pipeline was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
  pub requested: u64,
  pub joined: u64,
  pub dispatched: u64,
  pub completed: u64,
  pub failed: u64,
}

/// Everything a worker needs, shared across jobs.
struct WorkerContext {
  transport: Arc<dyn Transport>,
  store: Arc<dyn ByteStore>,
  retry: RetryPolicy,
  timeout: Duration,
}

pub struct FetchPipeline {
  pool: rayon::ThreadPool,
  context: Arc<WorkerContext>,
  max_in_flight: usize,
  queue: BinaryHeap<Reverse<Queued>>,
  /// Queued or in flight.
  outstanding: HashSet<FetchKey>,
  in_flight: usize,
  sender: Sender<FetchEvent>,
  receiver: Receiver<FetchEvent>,
  stats: PipelineStats,
}

impl FetchPipeline {
  pub fn new(
    config: &FetchConfig,
    transport: Arc<dyn Transport>,
    store: Arc<dyn ByteStore>,
  ) -> Result<Self, rayon::ThreadPoolBuildError> {
    let pool = rayon::ThreadPoolBuilder::new()
      .num_threads(config.workers)
      .thread_name(|i| format!("rocktree-fetch-{i}"))
      .build()?;
    let (sender, receiver) = channel::unbounded();
    Ok(Self {
      pool,
      context: Arc::new(WorkerContext {
        transport,
        store,
        retry: config.retry,
        timeout: Duration::from_millis(config.timeout_ms),
      }),
      max_in_flight: config.max_in_flight.max(1),
      queue: BinaryHeap::new(),
      outstanding: HashSet::new(),
      in_flight: 0,
      sender,
      receiver,
      stats: PipelineStats::default(),
    })
  }

  /// Queue a request. A request for an outstanding key joins it.
  pub fn request(&mut self, request: FetchRequest) -> FetchTicket {
    let key = request.key.clone();
    if self.outstanding.contains(&key) {
      self.stats.joined += 1;
      return FetchTicket { key, joined: true };
    }
    self.stats.requested += 1;
    self.outstanding.insert(key.clone());
    self.queue.push(Reverse(Queued {
      priority: request.priority.clone(),
      request,
    }));
    FetchTicket { key, joined: false }
  }

  #[inline]
  pub fn is_outstanding(&self, key: &FetchKey) -> bool {
    self.outstanding.contains(key)
  }

  #[inline]
  pub fn queued(&self) -> usize {
    self.queue.len()
  }

  #[inline]
  pub fn in_flight(&self) -> usize {
    self.in_flight
  }

  /// No queued or running work.
  #[inline]
  pub fn is_idle(&self) -> bool {
    self.outstanding.is_empty()
  }

  #[inline]
  pub fn stats(&self) -> PipelineStats {
    self.stats
  }

  /// Start queued jobs up to the in-flight limit. Returns the number started.
  pub fn dispatch(&mut self) -> usize {
    let mut started = 0;
    while self.in_flight < self.max_in_flight {
      let Some(Reverse(queued)) = self.queue.pop() else {
        break;
      };
      let request = queued.request;
      let context = Arc::clone(&self.context);
      let sender = self.sender.clone();
      self.in_flight += 1;
      self.stats.dispatched += 1;
      started += 1;
      self.pool.spawn(move || run_job(&context, request, &sender));
    }
    started
  }

  /// Take every event that has arrived, without blocking.
  pub fn drain(&mut self) -> Vec<FetchEvent> {
    let events: Vec<FetchEvent> = self.receiver.try_iter().collect();
    self.account(&events);
    events
  }

  /// Block up to `timeout` for the first event, then drain the rest.
  pub fn wait_for_events(&mut self, timeout: Duration) -> Vec<FetchEvent> {
    let first = match self.receiver.recv_timeout(timeout) {
      Ok(event) => event,
      Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return Vec::new(),
    };
    let mut events = vec![first];
    events.extend(self.receiver.try_iter());
    self.account(&events);
    events
  }

  fn account(&mut self, events: &[FetchEvent]) {
    for event in events {
      if let FetchEvent::Completed { key, result, .. } = event {
        self.outstanding.remove(key);
        self.in_flight = self.in_flight.saturating_sub(1);
        self.stats.completed += 1;
        if result.is_err() {
          self.stats.failed += 1;
        }
      }
    }
  }
}

// =============================================================================
// Worker side
// =============================================================================

fn run_job(context: &WorkerContext, request: FetchRequest, sender: &Sender<FetchEvent>) {
  let key = request.key.clone();
  let (bytes, attempts, from_store) = match acquire(context, &request) {
    Ok(acquired) => acquired,
    Err(error) => {
      let attempts = match &error {
        FetchError::NetworkFailure { attempts, .. } | FetchError::HttpStatus { attempts, .. } => *attempts,
        FetchError::DecodeFailure(_) => 0,
      };
      let _ = sender.send(FetchEvent::Completed {
        key,
        attempts,
        result: Err(error),
      });
      return;
    }
  };

  let _ = sender.send(FetchEvent::Fetched {
    key: key.clone(),
    bytes: bytes.len(),
    from_store,
  });

  let result = decode(&request.decode, &bytes).map_err(FetchError::from);
  if let Err(err) = &result {
    debug!(path = %key.path, kind = ?key.kind, "decode failed: {err}");
  }
  // Receiver gone means the engine shut down.
  let _ = sender.send(FetchEvent::Completed { key, attempts, result });
}

/// Bytes from the store, or from the transport with retries.
fn acquire(context: &WorkerContext, request: &FetchRequest) -> Result<(Vec<u8>, u32, bool), FetchError> {
  match context.store.get(&request.url) {
    Ok(Some(bytes)) => return Ok((bytes, 0, true)),
    Ok(None) => {}
    Err(err) => warn!(url = %request.url, "discarding corrupt stored entry: {err}"),
  }

  let mut attempt = 1;
  loop {
    match context.transport.fetch(&request.url, context.timeout) {
      Ok(bytes) => {
        context.store.put(&request.url, &bytes);
        return Ok((bytes, attempt, false));
      }
      Err(err) if err.is_permanent() || !context.retry.should_retry(attempt) => {
        return Err(FetchError::from_transport(err, attempt));
      }
      Err(err) => {
        let delay = context.retry.delay_after(attempt);
        debug!(url = %request.url, attempt, ?delay, "retrying after {err}");
        if !delay.is_zero() {
          std::thread::sleep(delay);
        }
        attempt += 1;
      }
    }
  }
}

fn decode(job: &DecodeJob, bytes: &[u8]) -> Result<FetchOutput, crate::error::DecodeError> {
  Ok(match job {
    DecodeJob::Planetoid => FetchOutput::Planetoid(decode_planetoid(bytes)?),
    DecodeJob::Bulk { head } => FetchOutput::Bulk(decode_bulk(bytes, head)?),
    DecodeJob::NodeData { path, bounds, options } => {
      FetchOutput::NodeData(Box::new(decode_node_data(bytes, path, bounds.as_ref(), options)?))
    }
  })
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod pipeline_test;
