//! pullfx is a demand-driven image render engine for node graphs of visual effects.
//!
//! A caller asks a node for a pixel window at a time, view and mip level. The engine pulls what
//! it needs from upstream nodes, reuses previously rendered pixels from a content-addressed image
//! cache, and runs each effect's render action under the concurrency discipline the effect
//! declares.
//!
//! # Render overview
//!
//! 1. **Frame**: [`RenderEngine::render`] installs frame arguments (hashes, abort flags) for the
//!    upstream tree.
//! 2. **Metadata**: region of definition, identity and transform concatenation, memoized per node
//!    hash in an actions cache.
//! 3. **Reconcile**: find or create one cache entry per plane and compute the rectangles still
//!    missing.
//! 4. **Inputs**: render every input over its region of interest, recursively.
//! 5. **Dispatch**: run the effect over the missing rectangles, sequentially or in parallel
//!    tiles, then mark them rendered.
//!
//! Cancellation is cooperative: an aborted render returns [`FxError::Aborted`] and leaves no
//! half-rendered entry in the cache.
#![forbid(unsafe_code)]

mod cache;
mod effects;
mod engine;
mod foundation;
mod graph;

pub use cache::bitmap::{Claim, RectList};
pub use cache::image::{Image, ImageId, ImageKey, ImageParams, PixelsRead, PlaneBuffer};
pub use cache::store::{CacheOpts, CacheStats, ImageCache, MemoryImageCache};
pub use effects::checkerboard::Checkerboard;
pub use effects::dot::Dot;
pub use effects::gain::Gain;
pub use effects::parse_effect;
pub use effects::translate::Translate;
pub use engine::context::{CallArgs, FrameArgs, FrameScope, InputReroute, RenderContext};
pub use engine::diagnostics::{Diagnostics, TracingDiagnostics};
pub use engine::dispatch::{DispatchConditions, ExecutionStrategy, select_strategy};
pub use engine::opts::{EngineOpts, MemoryPressurePolicy, PressureGranularity};
pub use engine::render_roi::{RenderOutput, RenderRequest};
pub use engine::stats::EngineStats;
pub use engine::{FrameRenderOpts, RenderEngine};
pub use foundation::core::{
    Affine, BitDepth, COLOR_LAYER, ImageComponents, MipLevel, NodeHash, NodeId, Point,
    ProjectFormat, Rect, Time, TimeKey, Vec2, ViewIdx,
};
pub use foundation::error::{FxError, FxResult, RenderRoIStatus, status_of};
pub use foundation::math::{RectI, canonical_to_pixel};
pub use graph::effect::{
    ActionArgs, Capabilities, Effect, FrameSpan, FramesNeeded, Identity, InputFrame, InputImages,
    PlanesNeeded, RenderActionArgs, RoiMap, ThreadSafety, TimeDomain, TransformAction,
};
pub use graph::node::{Node, NodeGraph};
pub use graph::timeline::Timeline;
