//! StreamingEngine - the single coordinator.
//!
//! Owns the shape index, the state table, the resident cache and the renderer
//! handle. Workers never touch any of them; they report through the fetch
//! pipeline's channel and every decision is made here, once per `sync`.
//!
//! # Sync phases
//!
//! ```text
//! bootstrap ─► handle events ─► select ─► issue requests ─► dispatch
//!                                                              │
//!   view ◄── upload ◄── evict ◄── touch ◄── draw list ◄── admit ┘
//! ```
//!
//! Node data that lands before the bulk describing its node is held in a
//! quarantine until that bulk confirms or denies the node.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use glam::DVec3;
use tracing::{debug, info, info_span, warn};
use web_time::Instant;

use crate::cache::ResidentCache;
use crate::camera::CameraState;
use crate::config::EngineConfig;
use crate::constants::FLAG_NODATA;
use crate::decode::{BulkMetadata, NodeMetadata, NodePayload, PlanetoidMetadata, TextureFormat};
use crate::error::{BudgetExceeded, EngineError, FetchError, ProtocolInconsistency};
use crate::fetch::{
  ByteStore, DecodeJob, FetchEvent, FetchKey, FetchKind, FetchOutput, FetchPipeline, FetchPriority, FetchRequest,
  Transport, UrlBuilder,
};
use crate::metrics::EngineMetrics;
use crate::octree::{select, BoundingSphere, NodePath, OctreeShape, OrientedBoundingBox, RequestStats, Selection};
use crate::render::{DrawItem, RenderBackend, ResidentView};
use crate::state::{FailedLane, FailureInfo, NodeRecord, NodeState, StateTable, Trigger};

/// Request parameters for an explicit prefetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeDataParams {
  pub epoch: u32,
  pub texture_format: TextureFormat,
  pub imagery_epoch: Option<u32>,
}

/// Non-fatal events for the host, drained with `drain_reports`.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineReport {
  NodeFailed {
    path: NodePath,
    kind: FetchKind,
    error: FetchError,
  },
  BudgetExceeded(BudgetExceeded),
  ProtocolInconsistency(ProtocolInconsistency),
}

enum Pending {
  Metadata { head: NodePath, epoch: u32 },
  Data { path: NodePath },
}

pub struct StreamingEngine<R: RenderBackend> {
  config: EngineConfig,
  urls: UrlBuilder,
  pipeline: FetchPipeline,
  shape: OctreeShape,
  states: StateTable,
  cache: ResidentCache,
  renderer: R,
  metrics: EngineMetrics,
  frame: u64,
  planetoid: Option<PlanetoidMetadata>,
  /// Events collected by `wait_for_fetches`, handled on the next sync.
  inbox: Vec<FetchEvent>,
  /// Node data decoded before its shape was confirmed.
  quarantine: BTreeMap<NodePath, Box<NodePayload>>,
  /// Confirmed payloads waiting for admission.
  ready: Vec<Box<NodePayload>>,
  /// Failed bulk fetches for heads that were outside the metadata lane
  /// (already holding data), keyed to the frame of failure.
  detached_bulk_failures: HashMap<NodePath, u64>,
  selection: Selection,
  draw_items: Vec<DrawItem>,
  reports: Vec<EngineReport>,
}

impl<R: RenderBackend> StreamingEngine<R> {
  pub fn new(
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    store: Arc<dyn ByteStore>,
    renderer: R,
  ) -> Result<Self, EngineError> {
    config.validate()?;
    let pipeline = FetchPipeline::new(&config.fetch, transport, store)?;
    let mut metrics = EngineMetrics::new();
    metrics.budget_bytes = config.cache.budget_bytes;
    info!(
      workers = config.fetch.workers,
      budget_bytes = config.cache.budget_bytes,
      "streaming engine started"
    );
    Ok(Self {
      urls: UrlBuilder::new(&config.endpoint),
      cache: ResidentCache::new(config.cache.budget_bytes),
      config,
      pipeline,
      shape: OctreeShape::new(),
      states: StateTable::new(),
      renderer,
      metrics,
      frame: 0,
      planetoid: None,
      inbox: Vec::new(),
      quarantine: BTreeMap::new(),
      ready: Vec::new(),
      detached_bulk_failures: HashMap::new(),
      selection: Selection::default(),
      draw_items: Vec::new(),
      reports: Vec::new(),
    })
  }

  // ===========================================================================
  // Accessors
  // ===========================================================================

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Number of completed syncs.
  pub fn frame(&self) -> u64 {
    self.frame
  }

  pub fn state(&self, path: &NodePath) -> NodeState {
    self.states.state(path)
  }

  pub fn node_record(&self, path: &NodePath) -> Option<&NodeRecord> {
    self.states.record(path)
  }

  pub fn shape(&self) -> &OctreeShape {
    &self.shape
  }

  pub fn cache(&self) -> &ResidentCache {
    &self.cache
  }

  pub fn metrics(&self) -> &EngineMetrics {
    &self.metrics
  }

  pub fn renderer(&self) -> &R {
    &self.renderer
  }

  pub fn planetoid(&self) -> Option<&PlanetoidMetadata> {
    self.planetoid.as_ref()
  }

  /// Selection computed by the last sync.
  pub fn selection(&self) -> &Selection {
    &self.selection
  }

  pub fn is_quarantined(&self, path: &NodePath) -> bool {
    self.quarantine.contains_key(path)
  }

  /// Requests queued or running.
  pub fn pending_fetches(&self) -> usize {
    self.pipeline.queued() + self.pipeline.in_flight()
  }

  /// Nothing queued, running or waiting to be handled.
  pub fn is_idle(&self) -> bool {
    self.pipeline.is_idle() && self.inbox.is_empty()
  }

  /// View from the last sync, without advancing a frame.
  pub fn view(&self) -> ResidentView<'_> {
    ResidentView::new(&self.cache, &self.draw_items)
  }

  pub fn drain_reports(&mut self) -> Vec<EngineReport> {
    std::mem::take(&mut self.reports)
  }

  /// Block up to `timeout` for fetch results; they are handled on the next
  /// sync. Returns the number of events received.
  pub fn wait_for_fetches(&mut self, timeout: Duration) -> usize {
    let events = self.pipeline.wait_for_events(timeout);
    let count = events.len();
    self.inbox.extend(events);
    count
  }

  // ===========================================================================
  // Sync
  // ===========================================================================

  /// Run one frame and return the nodes to draw.
  pub fn sync(&mut self, camera: &CameraState) -> ResidentView<'_> {
    let started = Instant::now();
    self.frame += 1;
    let _span = info_span!("sync", frame = self.frame).entered();

    self.bootstrap();
    self.handle_events();
    self.selection = select(&self.shape, camera, &self.config.lod);
    let requests = self.issue_requests();
    self.pipeline.dispatch();
    self.admit_ready();
    self.build_draw_list();
    let protected = self.protected_set();
    self.touch_used();
    self.evict(&protected);
    self.upload_drawn();
    self.update_metrics(requests, started);

    ResidentView::new(&self.cache, &self.draw_items)
  }

  /// Queue node data for `path` ahead of selection. Only nodes in `Unknown`
  /// or `ShapeKnown` are accepted. The request is dispatched on the next
  /// sync; the result is admitted as evictable unless selected.
  pub fn prefetch(&mut self, path: &NodePath, params: NodeDataParams) -> bool {
    let key = FetchKey::node_data(path.clone());
    let state = self.states.state(path);
    if !matches!(state, NodeState::Unknown | NodeState::ShapeKnown)
      || self.cache.contains(path)
      || self.pipeline.is_outstanding(&key)
    {
      return false;
    }
    if !self.apply(path, NodeState::DataRequested, Trigger::Selector) {
      return false;
    }
    let url = self
      .urls
      .node_data(path, params.epoch, params.texture_format, params.imagery_epoch);
    let bounds = self.shape.get(path).and_then(|node| node.meta.obb);
    debug!(%path, "prefetch");
    self.submit_node_data(path, url, bounds, 0.0);
    true
  }

  /// Release every GPU handle and drop all resident nodes. The shape index
  /// is kept; in-flight results are still handled by later syncs.
  pub fn shutdown(&mut self) {
    let released = self.cache.clear(&mut self.renderer);
    for path in self.states.in_state(NodeState::Resident) {
      self.apply(&path, NodeState::Evicting, Trigger::CacheEviction);
      self.apply(&path, NodeState::Unknown, Trigger::CacheEviction);
    }
    self.draw_items.clear();
    info!(released, "streaming engine shut down");
  }

  // ===========================================================================
  // State helpers
  // ===========================================================================

  /// Apply a transition; invalid ones are logged and skipped.
  fn apply(&mut self, path: &NodePath, to: NodeState, trigger: Trigger) -> bool {
    match self.states.transition(path, to, trigger) {
      Ok(_) => true,
      Err(err) => {
        warn!("{err}");
        false
      }
    }
  }

  fn fail_node(&mut self, path: &NodePath, lane: FailedLane, trigger: Trigger, permanent: bool, reason: String) {
    let failure = FailureInfo {
      lane,
      frame: self.frame,
      permanent,
      reason,
    };
    if let Err(err) = self.states.fail(path, trigger, failure) {
      warn!("{err}");
    }
  }

  fn report_inconsistency(&mut self, inconsistency: ProtocolInconsistency) {
    warn!(path = %inconsistency.path, "protocol inconsistency: {}", inconsistency.detail);
    self.metrics.inconsistencies += 1;
    self.reports.push(EngineReport::ProtocolInconsistency(inconsistency));
  }

  fn retry_due(&self, path: &NodePath) -> bool {
    self
      .states
      .retry_due(path, self.frame, self.config.cache.failed_retry_cooldown_frames)
  }

  // ===========================================================================
  // Requests
  // ===========================================================================

  fn request_bulk(&mut self, head: &NodePath, epoch: u32, error: f64) {
    let key = FetchKey::bulk(head.clone());
    let request = FetchRequest {
      priority: FetchPriority::new(&key, error),
      url: self.urls.bulk(head, epoch),
      decode: DecodeJob::Bulk { head: head.clone() },
      key,
    };
    debug!(%head, epoch, "requesting bulk");
    self.pipeline.request(request);
    self.metrics.metadata_requests += 1;
  }

  fn request_node_data(&mut self, path: &NodePath, error: f64) {
    let Some(node) = self.shape.get(path) else {
      return;
    };
    let meta = &node.meta;
    let format = self.config.decode.texture_format_for(meta.texture_formats);
    let url = self
      .urls
      .node_data(path, meta.epoch, format, meta.request_imagery_epoch());
    let bounds = meta.obb;
    self.submit_node_data(path, url, bounds, error);
  }

  fn submit_node_data(&mut self, path: &NodePath, url: String, bounds: Option<OrientedBoundingBox>, error: f64) {
    let key = FetchKey::node_data(path.clone());
    let request = FetchRequest {
      priority: FetchPriority::new(&key, error),
      url,
      decode: DecodeJob::NodeData {
        path: path.clone(),
        bounds,
        options: self.config.decode.node_options(),
      },
      key,
    };
    self.pipeline.request(request);
    self.metrics.data_requests += 1;
  }

  /// Request the planetoid until it loads. The root stays in
  /// `MetadataRequested` from here until the root bulk decodes.
  fn bootstrap(&mut self) {
    if self.planetoid.is_some() {
      return;
    }
    let key = FetchKey::planetoid();
    if self.pipeline.is_outstanding(&key) {
      return;
    }
    let root = NodePath::root();
    let ready = match self.states.state(&root) {
      NodeState::Unknown => true,
      NodeState::Failed => self.retry_due(&root),
      _ => false,
    };
    if !ready || !self.apply(&root, NodeState::MetadataRequested, Trigger::Selector) {
      return;
    }

    info!("requesting planetoid");
    let request = FetchRequest {
      priority: FetchPriority::new(&key, 0.0),
      url: self.urls.planetoid(),
      decode: DecodeJob::Planetoid,
      key,
    };
    self.pipeline.request(request);
    self.metrics.metadata_requests += 1;
  }

  fn metadata_request_allowed(&self, head: &NodePath) -> bool {
    match self.states.state(head) {
      NodeState::Unknown => true,
      NodeState::Failed => self.retry_due(head),
      NodeState::DataRequested | NodeState::Decoding | NodeState::Resident => {
        self.detached_bulk_failures.get(head).map_or(true, |&failed| {
          self.frame >= failed.saturating_add(self.config.cache.failed_retry_cooldown_frames)
        })
      }
      NodeState::MetadataRequested | NodeState::ShapeKnown | NodeState::Evicting => false,
    }
  }

  fn data_request_allowed(&self, path: &NodePath) -> bool {
    match self.states.state(path) {
      NodeState::ShapeKnown => true,
      // Evicted earlier; the shape is still cached.
      NodeState::Unknown => self.shape.is_shape_known(path),
      NodeState::Failed => match self.states.failure(path) {
        Some(failure) if failure.lane == FailedLane::Data => self.retry_due(path),
        // The node's child bulk is gone for good; it is drawn as a leaf.
        Some(failure) => failure.permanent && self.shape.is_leaf_only(path),
        None => false,
      },
      _ => false,
    }
  }

  /// Issue new requests for the selection, most urgent first, within the
  /// per-sync budget.
  fn issue_requests(&mut self) -> RequestStats {
    let _span = info_span!("issue_requests").entered();
    let mut pending: Vec<(FetchPriority, Pending)> = Vec::new();

    for request in &self.selection.metadata_requests {
      let key = FetchKey::bulk(request.head.clone());
      if self.pipeline.is_outstanding(&key) || !self.metadata_request_allowed(&request.head) {
        continue;
      }
      pending.push((
        FetchPriority::new(&key, request.error),
        Pending::Metadata {
          head: request.head.clone(),
          epoch: request.epoch,
        },
      ));
    }
    for candidate in &self.selection.data_candidates {
      let key = FetchKey::node_data(candidate.path.clone());
      if self.pipeline.is_outstanding(&key) || !self.data_request_allowed(&candidate.path) {
        continue;
      }
      pending.push((
        FetchPriority::new(&key, candidate.error),
        Pending::Data {
          path: candidate.path.clone(),
        },
      ));
    }
    pending.sort_by(|a, b| a.0.cmp(&b.0));

    let budget = self.config.fetch.requests_per_sync;
    let mut stats = RequestStats::default();
    for (priority, item) in pending {
      match item {
        Pending::Metadata { head, epoch } => {
          if !budget.can_request_metadata(stats.metadata_issued) {
            stats.deferred += 1;
            continue;
          }
          if matches!(self.states.state(&head), NodeState::Unknown | NodeState::Failed) {
            self.apply(&head, NodeState::MetadataRequested, Trigger::Selector);
          }
          self.detached_bulk_failures.remove(&head);
          self.request_bulk(&head, epoch, priority.error);
          stats.metadata_issued += 1;
        }
        Pending::Data { path } => {
          if !budget.can_request_data(stats.data_issued) {
            stats.deferred += 1;
            continue;
          }
          if self.states.state(&path) == NodeState::Unknown
            && !self.apply(&path, NodeState::ShapeKnown, Trigger::Selector)
          {
            continue;
          }
          if self.apply(&path, NodeState::DataRequested, Trigger::Selector) {
            self.request_node_data(&path, priority.error);
            stats.data_issued += 1;
          }
        }
      }
    }
    stats
  }

  // ===========================================================================
  // Events
  // ===========================================================================

  fn handle_events(&mut self) {
    let _span = info_span!("handle_events").entered();
    let mut events = std::mem::take(&mut self.inbox);
    events.extend(self.pipeline.drain());
    for event in events {
      match event {
        FetchEvent::Fetched { key, bytes, from_store } => {
          self.metrics.bytes_fetched += bytes as u64;
          if from_store {
            self.metrics.store_hits += 1;
          }
          if key.kind == FetchKind::NodeData {
            self.apply(&key.path, NodeState::Decoding, Trigger::FetchCompletion);
          }
        }
        FetchEvent::Completed { key, attempts, result } => {
          self.metrics.fetches_completed += 1;
          match result {
            Ok(FetchOutput::Planetoid(planetoid)) => self.on_planetoid(planetoid),
            Ok(FetchOutput::Bulk(bulk)) => self.on_bulk(&bulk),
            Ok(FetchOutput::NodeData(payload)) => self.on_node_data(payload),
            Err(error) => self.on_failure(key, attempts, error),
          }
        }
      }
    }
  }

  fn on_planetoid(&mut self, planetoid: PlanetoidMetadata) {
    let root = NodePath::root();
    info!(
      root_epoch = planetoid.root_epoch,
      radius = planetoid.radius,
      "planetoid loaded"
    );
    let meta = NodeMetadata {
      path: root.clone(),
      flags: FLAG_NODATA,
      epoch: planetoid.root_epoch,
      bulk_epoch: Some(planetoid.root_epoch),
      obb: None,
      meters_per_texel: 0.0,
      imagery_epoch: None,
      texture_formats: 0,
    };
    let radius = f64::from(planetoid.radius) + f64::from(planetoid.max_terrain_altitude);
    self.shape.insert_root(meta, BoundingSphere::new(DVec3::ZERO, radius));
    let epoch = planetoid.root_epoch;
    self.planetoid = Some(planetoid);
    self.request_bulk(&root, epoch, 0.0);
  }

  fn on_bulk(&mut self, bulk: &BulkMetadata) {
    let head = &bulk.head;
    self.detached_bulk_failures.remove(head);
    let insert = self.shape.insert_bulk(bulk);
    debug!(%head, nodes = bulk.nodes.len(), shape_known = insert.shape_known.len(), "bulk merged");

    for path in &insert.shape_known {
      if matches!(self.states.state(path), NodeState::MetadataRequested | NodeState::Unknown) {
        self.apply(path, NodeState::ShapeKnown, Trigger::DecoderCompletion);
      }
    }
    for inconsistency in insert.inconsistencies {
      self.report_inconsistency(inconsistency);
    }
    self.resolve_quarantine(head);
  }

  fn on_node_data(&mut self, payload: Box<NodePayload>) {
    let path = payload.path.clone();
    let head = path.bulk_head();
    if self.shape.contains(&path) {
      self.ready.push(payload);
    } else if self.shape.has_bulk(&head) {
      self.discard_unconfirmed(&path, true, format!("node data for a node bulk {head} does not list"));
    } else if self.shape.is_leaf_only(&head) {
      // A later bulk for the head may still list it.
      self.discard_unconfirmed(&path, false, format!("node data below leaf-only node {head}"));
    } else {
      debug!(%path, "holding node data until its bulk arrives");
      self.quarantine.insert(path, payload);
    }
  }

  /// Admit or discard quarantined data covered by the bulk at `head`.
  fn resolve_quarantine(&mut self, head: &NodePath) {
    let covered: Vec<NodePath> = self
      .quarantine
      .keys()
      .filter(|path| path.bulk_head() == *head)
      .cloned()
      .collect();
    for path in covered {
      let Some(payload) = self.quarantine.remove(&path) else {
        continue;
      };
      if self.shape.contains(&path) {
        debug!(%path, "held node data confirmed");
        self.ready.push(payload);
      } else {
        self.discard_unconfirmed(&path, true, format!("bulk {head} does not list this node"));
      }
    }
  }

  /// Drop held data with no shape behind it. Only a loaded bulk that omits
  /// the node makes the failure `permanent`.
  fn discard_unconfirmed(&mut self, path: &NodePath, permanent: bool, detail: String) {
    self.fail_node(path, FailedLane::Data, Trigger::DecoderCompletion, permanent, detail.clone());
    self.report_inconsistency(ProtocolInconsistency::new(path.clone(), detail));
  }

  fn on_failure(&mut self, key: FetchKey, attempts: u32, error: FetchError) {
    let path = key.path.clone();
    let permanent = error.is_permanent();
    let trigger = if error.is_decode_failure() {
      self.metrics.decode_failures += 1;
      Trigger::DecoderCompletion
    } else {
      self.metrics.fetch_failures += 1;
      Trigger::FetchCompletion
    };
    warn!(%path, kind = ?key.kind, attempts, permanent, "fetch failed: {error}");

    match key.kind {
      FetchKind::Planetoid => {
        self.fail_node(&path, FailedLane::Metadata, trigger, permanent, error.to_string());
      }
      FetchKind::Bulk => {
        if self.states.state(&path) == NodeState::MetadataRequested {
          self.fail_node(&path, FailedLane::Metadata, trigger, permanent, error.to_string());
        } else {
          self.detached_bulk_failures.insert(path.clone(), self.frame);
        }
        if permanent {
          let inconsistency = self
            .shape
            .mark_leaf_only(&path, format!("child bulk failed permanently: {error}"));
          self.report_inconsistency(inconsistency);
        }
        self.discard_quarantined_under(&path);
      }
      FetchKind::NodeData => {
        // DataRequested when the transport failed, Decoding when the decoder did.
        self.fail_node(&path, FailedLane::Data, trigger, permanent, error.to_string());
      }
    }

    self.reports.push(EngineReport::NodeFailed {
      path,
      kind: key.kind,
      error,
    });
  }

  /// Held data that the failed bulk at `head` would have confirmed.
  fn discard_quarantined_under(&mut self, head: &NodePath) {
    let covered: Vec<NodePath> = self
      .quarantine
      .keys()
      .filter(|path| path.bulk_head() == *head)
      .cloned()
      .collect();
    for path in covered {
      self.quarantine.remove(&path);
      self.discard_unconfirmed(&path, false, format!("bulk {head} failed before confirming this node"));
    }
  }

  // ===========================================================================
  // Cache
  // ===========================================================================

  fn admit_ready(&mut self) {
    let mut ready = std::mem::take(&mut self.ready);
    ready.sort_by(|a, b| a.path.cmp(&b.path));
    for payload in ready {
      let path = payload.path.clone();
      if !self.apply(&path, NodeState::Resident, Trigger::DecoderCompletion) {
        continue;
      }
      let bytes = self.cache.admit(*payload, self.frame);
      debug!(%path, bytes, "admitted");
      self.metrics.admitted += 1;
    }
  }

  /// Resident desired nodes, plus the nearest resident ancestor of each
  /// desired node that is not resident yet.
  fn build_draw_list(&mut self) {
    let mut drawn: BTreeMap<NodePath, u8> = BTreeMap::new();
    let mut fallbacks = 0;
    for path in &self.selection.desired {
      if self.cache.contains(path) {
        drawn.entry(path.clone()).or_insert(0);
      } else if let Some(ancestor) = path.ancestors().find(|ancestor| self.cache.contains(ancestor)) {
        fallbacks += 1;
        drawn.entry(ancestor).or_insert(0);
      }
    }

    // A drawn child masks its octant of a drawn parent.
    let paths: Vec<NodePath> = drawn.keys().cloned().collect();
    for path in &paths {
      if let (Some(parent), Some(octant)) = (path.parent(), path.last_octant()) {
        if let Some(mask) = drawn.get_mut(&parent) {
          *mask |= 1 << octant;
        }
      }
    }

    self.metrics.fallback_draws = fallbacks;
    self.draw_items = drawn
      .into_iter()
      .map(|(path, covered_octants)| DrawItem { path, covered_octants })
      .collect();
  }

  /// Desired and drawn nodes, and ancestors of nodes whose data is on its way.
  fn protected_set(&self) -> HashSet<NodePath> {
    let mut protected: HashSet<NodePath> = self.selection.desired.iter().cloned().collect();
    protected.extend(self.draw_items.iter().map(|item| item.path.clone()));

    let loading = self
      .states
      .in_state(NodeState::DataRequested)
      .into_iter()
      .chain(self.states.in_state(NodeState::Decoding))
      .chain(self.quarantine.keys().cloned());
    for path in loading {
      protected.extend(path.ancestors());
    }
    protected
  }

  fn touch_used(&mut self) {
    for path in &self.selection.desired {
      self.cache.touch(path, self.frame);
    }
    for item in &self.draw_items {
      self.cache.touch(&item.path, self.frame);
    }
  }

  fn evict(&mut self, protected: &HashSet<NodePath>) {
    let _span = info_span!("evict").entered();
    let outcome = self.cache.evict(protected, &mut self.renderer);
    for path in &outcome.evicted {
      self.apply(path, NodeState::Evicting, Trigger::CacheEviction);
      self.apply(path, NodeState::Unknown, Trigger::CacheEviction);
    }
    self.metrics.evicted += outcome.evicted.len() as u64;
    if let Some(exceeded) = outcome.exceeded {
      warn!("{exceeded}");
      self.reports.push(EngineReport::BudgetExceeded(exceeded));
    }
  }

  /// The single upload pass of a sync: drawn nodes without handles.
  fn upload_drawn(&mut self) {
    for item in &self.draw_items {
      if self.cache.upload(&item.path, &mut self.renderer) > 0 {
        self.metrics.uploads += 1;
      }
    }
  }

  fn update_metrics(&mut self, requests: RequestStats, started: Instant) {
    let metrics = &mut self.metrics;
    metrics.frame = self.frame;
    metrics.record_resident_levels(self.cache.iter().map(|(path, _)| path.level()));
    metrics.resident_nodes = self.cache.len();
    metrics.resident_bytes = self.cache.usage();
    metrics.budget_bytes = self.cache.budget();
    metrics.desired_nodes = self.selection.desired.len();
    metrics.drawn_nodes = self.draw_items.len();
    metrics.state_counts = self.states.counts();
    metrics.queued_requests = self.pipeline.queued();
    metrics.in_flight_requests = self.pipeline.in_flight();
    metrics.quarantined = self.quarantine.len();
    metrics.quarantined_bytes = self.quarantine.values().map(|payload| payload.byte_size()).sum();
    metrics.deferred_requests += requests.deferred as u64;
    metrics.record_sync_timing(started.elapsed().as_micros() as u64);

    debug!(
      desired = metrics.desired_nodes,
      drawn = metrics.drawn_nodes,
      resident = metrics.resident_nodes,
      bytes = metrics.resident_bytes,
      issued = requests.total_issued(),
      "sync complete"
    );
  }
}

impl<R: RenderBackend> Drop for StreamingEngine<R> {
  fn drop(&mut self) {
    self.cache.clear(&mut self.renderer);
  }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;
