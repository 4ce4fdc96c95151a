//! The pull-based render engine.
//!
//! A frame request enters through [`RenderEngine::render`], which installs frame arguments for
//! the upstream tree and calls [`RenderEngine::render_roi`]. That call resolves metadata
//! (RoD, identity, transforms), reconciles the request against the image cache, renders the
//! missing inputs recursively and dispatches the effect's render action over the rectangles still
//! missing.

pub(crate) mod abort;
pub(crate) mod actions_cache;
pub(crate) mod context;
pub(crate) mod diagnostics;
pub(crate) mod dispatch;
pub(crate) mod get_image;
pub(crate) mod opts;
pub(crate) mod propagate;
pub(crate) mod reconcile;
pub(crate) mod render_roi;
pub(crate) mod stats;
pub(crate) mod trimap;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockWriteGuard, TryLockError};

use crate::cache::store::{ImageCache, MemoryImageCache};
use crate::engine::context::{ContextTable, FrameArgs, RenderContext};
use crate::engine::diagnostics::{Diagnostics, TracingDiagnostics};
use crate::engine::dispatch::PluginLock;
use crate::engine::opts::EngineOpts;
use crate::engine::render_roi::{RenderOutput, RenderRequest};
use crate::engine::stats::{EngineStats, StatCounters};
use crate::foundation::core::NodeId;
use crate::foundation::error::{FxError, FxResult};
use crate::graph::node::NodeGraph;
use crate::graph::timeline::Timeline;

/// How a frame request may be interrupted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameRenderOpts {
    /// The request may be superseded by a newer one or by graph edits.
    pub abortable: bool,
    /// The request comes from the user (viewer refresh, interactive scrub).
    pub user_interaction: bool,
    /// Background sequential render (playback, disk write).
    pub sequential: bool,
}

/// Render engine bound to one node graph and one image cache.
pub struct RenderEngine {
    graph: Arc<NodeGraph>,
    cache: Arc<dyn ImageCache>,
    timeline: Arc<Timeline>,
    opts: EngineOpts,
    pool: rayon::ThreadPool,
    plugin_locks: Mutex<HashMap<String, Arc<PluginLock>>>,
    project_lock: RwLock<()>,
    contexts: ContextTable,
    render_age: AtomicU64,
    active_tiles: AtomicUsize,
    stats: StatCounters,
    diagnostics: Arc<dyn Diagnostics>,
}

impl std::fmt::Debug for RenderEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderEngine")
            .field("nodes", &self.graph.len())
            .field("threads", &self.pool.current_num_threads())
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}

impl RenderEngine {
    pub fn new(
        graph: Arc<NodeGraph>,
        cache: Arc<dyn ImageCache>,
        timeline: Arc<Timeline>,
        opts: EngineOpts,
    ) -> FxResult<Self> {
        opts.validate()?;
        let pool = build_thread_pool(opts.threads)?;
        graph.set_memo_capacity(opts.actions_cache_entries);
        Ok(Self {
            graph,
            cache,
            timeline,
            opts,
            pool,
            plugin_locks: Mutex::new(HashMap::new()),
            project_lock: RwLock::new(()),
            contexts: ContextTable::default(),
            render_age: AtomicU64::new(0),
            active_tiles: AtomicUsize::new(0),
            stats: StatCounters::default(),
            diagnostics: Arc::new(TracingDiagnostics),
        })
    }

    /// Engine with an in-memory cache configured from `opts.cache` and a timeline at frame 0.
    pub fn with_defaults(graph: Arc<NodeGraph>, opts: EngineOpts) -> FxResult<Self> {
        let cache = Arc::new(MemoryImageCache::new(opts.cache));
        Self::new(graph, cache, Arc::new(Timeline::default()), opts)
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn graph(&self) -> &Arc<NodeGraph> {
        &self.graph
    }

    pub fn cache(&self) -> &Arc<dyn ImageCache> {
        &self.cache
    }

    pub fn timeline(&self) -> &Arc<Timeline> {
        &self.timeline
    }

    pub fn opts(&self) -> &EngineOpts {
        &self.opts
    }

    pub fn stats(&self) -> EngineStats {
        self.stats.snapshot()
    }

    /// Hold the project exclusively. While the guard lives, fully-safe-frame effects render
    /// sequentially.
    pub fn lock_project_exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.project_lock
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn project_lock_held(&self) -> bool {
        match self.project_lock.try_read() {
            Ok(_) => false,
            Err(TryLockError::WouldBlock) => true,
            Err(TryLockError::Poisoned(_)) => false,
        }
    }

    /// Process-wide lock shared by every instance of `plugin_id`, reentrant per thread.
    fn plugin_lock(&self, plugin_id: &str) -> Arc<PluginLock> {
        let mut locks = self
            .plugin_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(plugin_id.to_owned()).or_default())
    }

    /// Render `node` for one frame.
    ///
    /// Frame arguments are installed for every node upstream of `node` with the hashes they have
    /// now, so abort checks deeper in the recursion compare against the state the frame started
    /// from.
    #[tracing::instrument(level = "debug", skip(self, req), fields(node = node.0, time = req.time))]
    pub fn render(
        &self,
        node: NodeId,
        req: &RenderRequest,
        opts: FrameRenderOpts,
    ) -> FxResult<RenderOutput> {
        let requester = self.graph.node(node)?;
        let age = self.render_age.fetch_add(1, Ordering::AcqRel) + 1;
        if opts.abortable && opts.user_interaction {
            requester.bump_render_age(age);
        }

        let mut nodes = Vec::new();
        for id in self.graph.upstream(node)? {
            nodes.push((id, self.graph.node(id)?.hash()));
        }
        let template = FrameArgs {
            time: req.time,
            view: req.view,
            requester: node,
            node_hash: requester.hash(),
            sequential: opts.sequential,
            abortable: opts.abortable,
            user_interaction: opts.user_interaction,
            render_age: age,
        };

        let mut ctx = RenderContext::new();
        let mut frame = ctx.begin_frame(&nodes, template);
        self.render_roi(node, req, &mut frame)
    }
}

fn build_thread_pool(threads: Option<usize>) -> FxResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(FxError::config("engine 'threads' must be >= 1 when set"));
    }

    let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("pullfx-{i}"));
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| FxError::config(format!("failed to build rayon thread pool: {e}")))
}
