use crate::effects::channel_value;
use crate::foundation::core::Rect;
use crate::foundation::error::FxResult;
use crate::foundation::math::RectI;
use crate::graph::effect::{ActionArgs, Effect, Identity, RenderActionArgs};

/// Routing node: always identity on its only input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Dot;

impl Effect for Dot {
    fn plugin_id(&self) -> &str {
        "pullfx.dot"
    }

    fn max_input_count(&self) -> usize {
        1
    }

    fn is_identity(&self, args: &ActionArgs, _roi: RectI, _rod: Rect) -> FxResult<Identity> {
        Ok(Identity::Input {
            input_nb: 0,
            time: args.time,
        })
    }

    // Only reached when the identity short-circuit is bypassed; copies the input through.
    fn render(&self, args: &mut RenderActionArgs<'_>) -> FxResult<()> {
        let Some(src) = args.input(0).cloned() else {
            return Ok(());
        };
        let roi = args.roi;
        let read = src.read();
        for plane in args.planes.iter_mut() {
            let comps = plane.components().clone();
            for y in roi.y1..roi.y2 {
                for x in roi.x1..roi.x2 {
                    if let (Some(sp), Some(dp)) = (read.pixel(x, y), plane.pixel_mut(x, y)) {
                        for (v, name) in dp.iter_mut().zip(&comps.channels) {
                            *v = channel_value(src.components(), sp, name);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
