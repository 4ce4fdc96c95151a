//! The plugin boundary. The engine calls these actions; it never defines what they compute.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::image::{Image, PlaneBuffer};
use crate::engine::RenderEngine;
use crate::engine::context::RenderContext;
use crate::engine::render_roi::RenderOutput;
use crate::foundation::core::{
    Affine, BitDepth, ImageComponents, MipLevel, NodeId, Rect, Time, ViewIdx,
};
use crate::foundation::error::FxResult;
use crate::foundation::math::{RectI, union_rect};

/// Concurrency contract a plugin declares for its render action.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum ThreadSafety {
    /// One render at a time across every instance of the plugin.
    Unsafe,
    /// One render at a time per node instance.
    InstanceSafe,
    /// Unlimited concurrent renders; images are the only synchronisation point.
    FullySafe,
    /// Fully safe, and the host may slice one frame into tiles rendered in parallel.
    FullySafeFrame,
}

/// Static capabilities of an effect. Read-only during a render call.
#[derive(Clone, Debug, PartialEq)]
pub struct Capabilities {
    pub supports_tiles: bool,
    pub supports_multi_resolution: bool,
    pub supports_render_scale: bool,
    pub thread_safety: ThreadSafety,
    pub is_writer: bool,
    pub is_multi_planar: bool,
    /// Output changes over time even with constant parameters.
    pub frame_varying: bool,
    /// The effect is a pure geometric transform that can be folded into a concatenated matrix.
    pub can_transform: bool,
    pub preferred_components: ImageComponents,
    pub preferred_depth: BitDepth,
    pub pixel_aspect: f64,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            supports_tiles: true,
            supports_multi_resolution: true,
            supports_render_scale: true,
            thread_safety: ThreadSafety::FullySafe,
            is_writer: false,
            is_multi_planar: false,
            frame_varying: true,
            can_transform: false,
            preferred_components: ImageComponents::rgba(),
            preferred_depth: BitDepth::Float,
            pixel_aspect: 1.0,
        }
    }
}

/// Result of the identity query.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Identity {
    #[default]
    None,
    /// Output equals input `input_nb` rendered at `time`.
    Input { input_nb: usize, time: Time },
    /// Output equals this node's own output at another time.
    SelfAt { time: Time },
}

/// Canonical region needed from each input, keyed by input index.
pub type RoiMap = BTreeMap<usize, Rect>;

/// Inclusive frame span needed from an input in one view.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FrameSpan {
    pub first: Time,
    pub last: Time,
    pub view: ViewIdx,
}

impl FrameSpan {
    pub fn single(time: Time, view: ViewIdx) -> Self {
        Self {
            first: time,
            last: time,
            view,
        }
    }

    /// Intersection with `domain`. A span lying wholly outside collapses to its frame nearest
    /// the domain, since every frame out there renders the same clamped image.
    pub fn within(self, domain: TimeDomain) -> Self {
        let first = self.first.max(domain.first);
        let last = self.last.min(domain.last);
        if first <= last {
            Self { first, last, ..self }
        } else if self.last < domain.first {
            Self::single(self.last, self.view)
        } else {
            Self::single(self.first, self.view)
        }
    }

    /// Frames of the span, stepping by one from `first`. Empty when a bound is not finite.
    pub fn frames(self) -> impl Iterator<Item = Time> {
        let n = if self.first.is_finite() && self.last.is_finite() && self.last >= self.first {
            ((self.last - self.first).floor() as u64).saturating_add(1)
        } else {
            0
        };
        (0..n).map(move |i| self.first + i as f64)
    }
}

/// Frames needed from each input, keyed by input index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FramesNeeded(pub BTreeMap<usize, Vec<FrameSpan>>);

/// Inclusive time domain of an effect.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TimeDomain {
    pub first: Time,
    pub last: Time,
}

impl TimeDomain {
    pub const UNBOUNDED: Self = Self {
        first: f64::NEG_INFINITY,
        last: f64::INFINITY,
    };
}

/// Which planes an effect produces itself and which it forwards from upstream.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanesNeeded {
    pub produced: Vec<ImageComponents>,
    /// Input that supplies every plane this node does not produce.
    pub pass_through_input: Option<usize>,
    /// Planes requested from each input when it is rendered for this node.
    pub input_planes: BTreeMap<usize, Vec<ImageComponents>>,
}

/// A geometric transform action: output = `matrix` * input `input_nb`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransformAction {
    pub input_nb: usize,
    pub matrix: Affine,
}

/// Arguments shared by the metadata actions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActionArgs {
    pub time: Time,
    pub view: ViewIdx,
    pub mip: MipLevel,
}

impl ActionArgs {
    pub fn scale(&self) -> f64 {
        self.mip.scale()
    }
}

/// One upstream frame rendered for the current render action.
#[derive(Clone, Debug)]
pub struct InputFrame {
    pub time: Time,
    pub view: ViewIdx,
    pub output: RenderOutput,
}

/// Upstream images rendered for one rectangle, keyed by input index.
#[derive(Clone, Debug, Default)]
pub struct InputImages(pub BTreeMap<usize, Vec<InputFrame>>);

impl InputImages {
    pub fn get(&self, input_nb: usize, time: Time, view: ViewIdx) -> Option<&RenderOutput> {
        self.0
            .get(&input_nb)?
            .iter()
            .find(|f| f.time == time && f.view == view)
            .map(|f| &f.output)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Arguments of the render action for one tile.
pub struct RenderActionArgs<'a> {
    pub node: NodeId,
    pub time: Time,
    pub view: ViewIdx,
    /// Mip level the effect renders at (may be 0 when the request was at a reduced scale).
    pub mip: MipLevel,
    /// Pixel window to fill, at `mip`.
    pub roi: RectI,
    /// One buffer per produced plane, each covering `roi`.
    pub planes: &'a mut [PlaneBuffer],
    pub(crate) inputs: &'a InputImages,
    pub(crate) input_transforms: &'a BTreeMap<usize, Affine>,
    /// Snapshot of the render context that scheduled this tile.
    pub ctx: &'a RenderContext,
    pub engine: &'a RenderEngine,
}

impl RenderActionArgs<'_> {
    /// First plane of input `input_nb` rendered at the current time and view.
    pub fn input(&self, input_nb: usize) -> Option<&Arc<Image>> {
        self.input_at(input_nb, self.time)
    }

    pub fn input_at(&self, input_nb: usize, time: Time) -> Option<&Arc<Image>> {
        self.inputs.get(input_nb, time, self.view)?.first()
    }

    pub fn input_plane(
        &self,
        input_nb: usize,
        time: Time,
        components: &ImageComponents,
    ) -> Option<&Arc<Image>> {
        self.inputs.get(input_nb, time, self.view)?.get(components)
    }

    /// Concatenated upstream transform the effect must apply when sampling `input_nb`.
    pub fn input_transform(&self, input_nb: usize) -> Option<Affine> {
        self.input_transforms.get(&input_nb).copied()
    }

    pub fn plane_mut(&mut self, components: &ImageComponents) -> Option<&mut PlaneBuffer> {
        self.planes.iter_mut().find(|p| p.components() == components)
    }
}

/// An image effect as seen by the engine.
///
/// Metadata actions must be idempotent for a given node hash: the engine memoizes them.
pub trait Effect: Send + Sync {
    /// Identifier shared by every instance of the plugin (global lock scope of `Unsafe`).
    fn plugin_id(&self) -> &str;

    fn max_input_count(&self) -> usize {
        0
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Region of definition. `None` means the effect produces nothing.
    ///
    /// The default is the union of the connected inputs' RoDs.
    fn region_of_definition(
        &self,
        _args: &ActionArgs,
        input_rods: &BTreeMap<usize, Rect>,
    ) -> FxResult<Option<Rect>> {
        Ok(input_rods.values().copied().reduce(union_rect))
    }

    fn is_identity(&self, _args: &ActionArgs, _roi: RectI, _rod: Rect) -> FxResult<Identity> {
        Ok(Identity::None)
    }

    /// Region needed from each input to produce `output_roi`. Defaults to `output_roi` for every
    /// connected input.
    fn regions_of_interest(
        &self,
        _args: &ActionArgs,
        output_roi: Rect,
        connected: &[usize],
    ) -> RoiMap {
        connected.iter().map(|&i| (i, output_roi)).collect()
    }

    fn frames_needed(&self, time: Time, view: ViewIdx, connected: &[usize]) -> FramesNeeded {
        FramesNeeded(
            connected
                .iter()
                .map(|&i| (i, vec![FrameSpan::single(time, view)]))
                .collect(),
        )
    }

    fn time_domain(&self, input_domains: &[TimeDomain]) -> TimeDomain {
        input_domains
            .iter()
            .copied()
            .reduce(|a, b| TimeDomain {
                first: a.first.min(b.first),
                last: a.last.max(b.last),
            })
            .unwrap_or(TimeDomain::UNBOUNDED)
    }

    fn planes_needed(&self, _time: Time, _view: ViewIdx, connected: &[usize]) -> PlanesNeeded {
        let preferred = self.capabilities().preferred_components;
        PlanesNeeded {
            produced: vec![preferred.clone()],
            pass_through_input: connected.first().copied(),
            input_planes: connected.iter().map(|&i| (i, vec![preferred.clone()])).collect(),
        }
    }

    /// Only called when `capabilities().can_transform` is set.
    fn transform(&self, _args: &ActionArgs) -> FxResult<Option<TransformAction>> {
        Ok(None)
    }

    /// Whether the effect can apply an upstream transform matrix itself when reading `input_nb`.
    fn input_can_receive_transform(&self, _input_nb: usize) -> bool {
        false
    }

    fn render(&self, args: &mut RenderActionArgs<'_>) -> FxResult<()>;
}

#[cfg(test)]
#[path = "../../tests/unit/graph/effect.rs"]
mod tests;
