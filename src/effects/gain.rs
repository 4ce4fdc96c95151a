use crate::effects::channel_value;
use crate::foundation::core::Rect;
use crate::foundation::error::FxResult;
use crate::foundation::math::RectI;
use crate::graph::effect::{
    ActionArgs, Capabilities, Effect, Identity, RenderActionArgs, ThreadSafety,
};

/// Multiply color channels by a constant. Alpha is left untouched.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Gain {
    pub gain: f32,
}

impl Gain {
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }
}

impl Effect for Gain {
    fn plugin_id(&self) -> &str {
        "pullfx.gain"
    }

    fn max_input_count(&self) -> usize {
        1
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            thread_safety: ThreadSafety::FullySafeFrame,
            ..Capabilities::default()
        }
    }

    fn is_identity(&self, args: &ActionArgs, _roi: RectI, _rod: Rect) -> FxResult<Identity> {
        if self.gain == 1.0 {
            Ok(Identity::Input {
                input_nb: 0,
                time: args.time,
            })
        } else {
            Ok(Identity::None)
        }
    }

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
                    let Some(sp) = read.pixel(x, y) else {
                        continue;
                    };
                    let Some(dp) = plane.pixel_mut(x, y) else {
                        continue;
                    };
                    for (v, name) in dp.iter_mut().zip(&comps.channels) {
                        let s = channel_value(src.components(), sp, name);
                        *v = if name == "A" { s } else { s * self.gain };
                    }
                }
            }
        }
        Ok(())
    }
}
