//! Tiled dispatch of the render action according to the node's thread-safety class.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::cache::image::PlaneBuffer;
use crate::engine::RenderEngine;
use crate::engine::context::{FrameArgs, RenderContext};
use crate::engine::reconcile::PlaneToRender;
use crate::engine::stats::StatCounters;
use crate::foundation::core::{Affine, BitDepth, MipLevel, Time, ViewIdx};
use crate::foundation::error::FxError;
use crate::foundation::math::RectI;
use crate::graph::effect::{InputImages, RenderActionArgs, ThreadSafety};
use crate::graph::node::Node;

/// How one dispatch executes its rectangles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// Sequential, under the process-wide lock of the plugin.
    GlobalLock,
    /// Sequential, under the node instance lock.
    InstanceLock,
    /// Sequential, no engine-level lock.
    Sequential,
    /// Split into `tiles` bands per rectangle and render them on the pool.
    Parallel { tiles: usize },
}

/// Host state the strategy choice depends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchConditions {
    pub supports_tiles: bool,
    /// Idle worker threads, already bounded by configuration.
    pub available_threads: usize,
    pub exclusive_project_lock: bool,
}

/// Map a thread-safety class to an execution strategy. `FullySafeFrame` degrades to
/// `Sequential` when tiling is unsupported, fewer than two threads are free, or the project is
/// locked exclusively.
pub fn select_strategy(safety: ThreadSafety, cond: DispatchConditions) -> ExecutionStrategy {
    match safety {
        ThreadSafety::Unsafe => ExecutionStrategy::GlobalLock,
        ThreadSafety::InstanceSafe => ExecutionStrategy::InstanceLock,
        ThreadSafety::FullySafe => ExecutionStrategy::Sequential,
        ThreadSafety::FullySafeFrame => {
            if !cond.supports_tiles || cond.available_threads < 2 || cond.exclusive_project_lock {
                ExecutionStrategy::Sequential
            } else {
                ExecutionStrategy::Parallel {
                    tiles: cond.available_threads,
                }
            }
        }
    }
}

/// Result of one unit of work.
#[derive(Debug)]
pub(crate) enum TileStatus {
    Ok,
    Failed(FxError),
    Aborted,
    /// Nothing left to render here but another render holds part of it pending.
    TakeImageLock,
}

impl TileStatus {
    /// Fold tile results: failure beats abort beats "take image lock" beats success.
    fn merge(self, other: TileStatus) -> TileStatus {
        use TileStatus::*;
        match (self, other) {
            (Failed(e), _) | (_, Failed(e)) => Failed(e),
            (Aborted, _) | (_, Aborted) => Aborted,
            (TakeImageLock, _) | (_, TakeImageLock) => TakeImageLock,
            (Ok, Ok) => Ok,
        }
    }
}

/// Everything a tile needs besides its rectangle.
pub(crate) struct TileJob<'a> {
    pub(crate) node: &'a Node,
    pub(crate) frame: &'a FrameArgs,
    pub(crate) time: Time,
    pub(crate) view: ViewIdx,
    pub(crate) mip: MipLevel,
    pub(crate) depth: BitDepth,
    pub(crate) planes: &'a [PlaneToRender],
    pub(crate) transforms: &'a BTreeMap<usize, Affine>,
    /// Rectangles were claimed beforehand; skip the minimal-rect recomputation.
    pub(crate) trimap: bool,
    pub(crate) tile_align: i32,
}

/// Process-wide lock of one plugin. Reentrant on the owning thread, so a render action that
/// pulls another instance of the same plugin through `get_image` does not block on itself.
#[derive(Debug, Default)]
pub(crate) struct PluginLock {
    owner: Mutex<Option<(ThreadId, usize)>>,
    released: Condvar,
}

impl PluginLock {
    pub(crate) fn acquire(&self) -> PluginLockGuard<'_> {
        let me = thread::current().id();
        let mut owner = self.owner.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match owner.as_mut() {
                None => {
                    *owner = Some((me, 1));
                    break;
                }
                Some((id, depth)) if *id == me => {
                    *depth += 1;
                    break;
                }
                Some(_) => {
                    owner = self
                        .released
                        .wait(owner)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
        PluginLockGuard { lock: self }
    }

    #[cfg(test)]
    fn depth(&self) -> usize {
        let owner = *self.owner.lock().unwrap_or_else(PoisonError::into_inner);
        owner.map_or(0, |(_, d)| d)
    }
}

pub(crate) struct PluginLockGuard<'a> {
    lock: &'a PluginLock,
}

impl Drop for PluginLockGuard<'_> {
    fn drop(&mut self) {
        let mut owner = self
            .lock
            .owner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some((_, depth)) = owner.as_mut() {
            *depth -= 1;
            if *depth == 0 {
                *owner = None;
                self.lock.released.notify_one();
            }
        }
    }
}

/// One scheduled rectangle with the inputs rendered for it and the context snapshot the effect
/// sees while rendering it.
pub(crate) struct WorkRect {
    pub(crate) rect: RectI,
    pub(crate) inputs: Arc<InputImages>,
    pub(crate) ctx: Arc<RenderContext>,
}

impl RenderEngine {
    fn available_threads(&self) -> usize {
        let pool = self.pool.current_num_threads();
        let busy = self.active_tiles.load(Ordering::Acquire);
        let free = pool.saturating_sub(busy);
        if self.opts.max_tiles > 0 {
            free.min(self.opts.max_tiles)
        } else {
            free
        }
    }

    pub(crate) fn dispatch(&self, job: &TileJob<'_>, work: &[WorkRect]) -> TileStatus {
        let caps = job.node.capabilities();
        let strategy = select_strategy(
            caps.thread_safety,
            DispatchConditions {
                supports_tiles: caps.supports_tiles,
                available_threads: self.available_threads(),
                exclusive_project_lock: self.project_lock_held(),
            },
        );
        debug!(node = job.node.id().0, ?strategy, rects = work.len(), "dispatch");

        match strategy {
            ExecutionStrategy::GlobalLock => {
                let lock = self.plugin_lock(job.node.effect().plugin_id());
                let _guard = lock.acquire();
                self.run_sequential(job, work)
            }
            ExecutionStrategy::InstanceLock => {
                let _guard = job.node.instance_lock();
                self.run_sequential(job, work)
            }
            ExecutionStrategy::Sequential => self.run_sequential(job, work),
            ExecutionStrategy::Parallel { tiles } => self.run_parallel(job, work, tiles),
        }
    }

    fn run_sequential(&self, job: &TileJob<'_>, work: &[WorkRect]) -> TileStatus {
        let mut status = TileStatus::Ok;
        for w in work {
            status = status.merge(self.render_tile(job, w.rect, w));
            if matches!(status, TileStatus::Failed(_) | TileStatus::Aborted) {
                break;
            }
        }
        status
    }

    fn run_parallel(&self, job: &TileJob<'_>, work: &[WorkRect], tiles: usize) -> TileStatus {
        let items: Vec<(RectI, &WorkRect)> = work
            .iter()
            .flat_map(|w| {
                w.rect
                    .split_rows(tiles, job.tile_align)
                    .into_iter()
                    .map(move |t| (t, w))
            })
            .collect();
        self.active_tiles.fetch_add(items.len(), Ordering::AcqRel);
        let status = self.pool.install(|| {
            items
                .par_iter()
                .map(|(t, w)| self.render_tile(job, *t, w))
                .reduce(|| TileStatus::Ok, TileStatus::merge)
        });
        self.active_tiles.fetch_sub(items.len(), Ordering::AcqRel);
        status
    }

    /// Render one tile: recompute what is still missing, run the effect into scratch buffers,
    /// then paste into the render-mapped images and mark the tile rendered.
    fn render_tile(&self, job: &TileJob<'_>, rect: RectI, work: &WorkRect) -> TileStatus {
        if self.is_aborted(job.node, job.frame) {
            return TileStatus::Aborted;
        }

        let rect = if job.trimap {
            rect
        } else {
            let rest = RectI::bbox(
                job.planes
                    .iter()
                    .flat_map(|p| p.render_mapped().rest_to_render(rect))
                    .collect::<Vec<_>>()
                    .iter(),
            );
            if rest.is_empty() {
                let pending = job.planes.iter().any(|p| p.render_mapped().has_pending(rect));
                return if pending {
                    TileStatus::TakeImageLock
                } else {
                    TileStatus::Ok
                };
            }
            rest
        };

        let mut buffers = Vec::with_capacity(job.planes.len());
        for p in job.planes {
            match PlaneBuffer::new(rect, p.components.clone(), job.depth) {
                Ok(b) => buffers.push(b),
                Err(e) => {
                    if let FxError::Allocation { bytes } = e {
                        self.diagnostics
                            .allocation_failed(job.node.id(), job.node.label(), bytes);
                    }
                    return TileStatus::Failed(e);
                }
            }
        }

        {
            let _bound = self.contexts.bind(Arc::clone(&work.ctx));
            let mut args = RenderActionArgs {
                node: job.node.id(),
                time: job.time,
                view: job.view,
                mip: job.mip,
                roi: rect,
                planes: &mut buffers,
                inputs: work.inputs.as_ref(),
                input_transforms: job.transforms,
                ctx: work.ctx.as_ref(),
                engine: self,
            };
            if let Err(e) = job.node.effect().render(&mut args) {
                if !e.is_aborted() {
                    self.diagnostics
                        .node_error(job.node.id(), job.node.label(), &e);
                }
                return TileStatus::Failed(e);
            }
        }

        for (p, buf) in job.planes.iter().zip(&buffers) {
            if self.opts.check_nan {
                let bad = buf.count_non_finite();
                if bad > 0 {
                    warn!(
                        node = job.node.id().0,
                        plane = %p.components,
                        count = bad,
                        "render action produced non-finite values"
                    );
                    StatCounters::add(&self.stats.non_finite_pixels, bad as u64);
                }
            }
            let img = p.render_mapped();
            img.paste_buffer(buf, rect);
            img.mark_rendered(rect);
        }
        StatCounters::bump(&self.stats.tiles_rendered);
        TileStatus::Ok
    }
}

#[cfg(test)]
#[path = "../../tests/unit/engine/dispatch.rs"]
mod tests;
