use std::collections::BTreeMap;

use crate::effects::channel_value;
use crate::foundation::core::{Affine, Point, Rect, Vec2};
use crate::foundation::error::FxResult;
use crate::foundation::math::RectI;
use crate::graph::effect::{
    ActionArgs, Capabilities, Effect, Identity, RenderActionArgs, RoiMap, ThreadSafety,
    TransformAction,
};

/// Integer-sampled translation. Chains of translations fold into one matrix applied by the
/// last one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Translate {
    pub dx: f64,
    pub dy: f64,
}

impl Translate {
    pub fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    fn offset(&self) -> Vec2 {
        Vec2::new(self.dx, self.dy)
    }

    fn matrix(&self) -> Affine {
        Affine::translate(self.offset())
    }
}

impl Effect for Translate {
    fn plugin_id(&self) -> &str {
        "pullfx.translate"
    }

    fn max_input_count(&self) -> usize {
        1
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            thread_safety: ThreadSafety::FullySafeFrame,
            can_transform: true,
            ..Capabilities::default()
        }
    }

    fn region_of_definition(
        &self,
        _args: &ActionArgs,
        input_rods: &BTreeMap<usize, Rect>,
    ) -> FxResult<Option<Rect>> {
        Ok(input_rods.get(&0).map(|r| *r + self.offset()))
    }

    fn is_identity(&self, args: &ActionArgs, _roi: RectI, _rod: Rect) -> FxResult<Identity> {
        if self.dx == 0.0 && self.dy == 0.0 {
            return Ok(Identity::Input {
                input_nb: 0,
                time: args.time,
            });
        }
        Ok(Identity::None)
    }

    fn regions_of_interest(
        &self,
        _args: &ActionArgs,
        output_roi: Rect,
        connected: &[usize],
    ) -> RoiMap {
        connected
            .iter()
            .map(|&i| (i, output_roi - self.offset()))
            .collect()
    }

    fn transform(&self, _args: &ActionArgs) -> FxResult<Option<TransformAction>> {
        Ok(Some(TransformAction {
            input_nb: 0,
            matrix: self.matrix(),
        }))
    }

    fn input_can_receive_transform(&self, input_nb: usize) -> bool {
        input_nb == 0
    }

    fn render(&self, args: &mut RenderActionArgs<'_>) -> FxResult<()> {
        let Some(src) = args.input(0).cloned() else {
            return Ok(());
        };
        let total = match args.input_transform(0) {
            Some(upstream) => self.matrix() * upstream,
            None => self.matrix(),
        };
        let inv = total.inverse();
        let scale = args.mip.scale();
        let roi = args.roi;
        let read = src.read();
        for plane in args.planes.iter_mut() {
            let comps = plane.components().clone();
            for y in roi.y1..roi.y2 {
                for x in roi.x1..roi.x2 {
                    let p = Point::new(
                        (f64::from(x) + 0.5) / scale,
                        (f64::from(y) + 0.5) / scale,
                    );
                    let q = inv * p;
                    let sx = (q.x * scale).floor() as i32;
                    let sy = (q.y * scale).floor() as i32;
                    let Some(sp) = read.pixel(sx, sy) else {
                        continue;
                    };
                    let Some(dp) = plane.pixel_mut(x, y) else {
                        continue;
                    };
                    for (v, name) in dp.iter_mut().zip(&comps.channels) {
                        *v = channel_value(src.components(), sp, name);
                    }
                }
            }
        }
        Ok(())
    }
}
