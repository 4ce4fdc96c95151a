use std::collections::BTreeMap;

use crate::foundation::core::Rect;
use crate::foundation::error::FxResult;
use crate::graph::effect::{ActionArgs, Capabilities, Effect, RenderActionArgs, ThreadSafety};

/// Infinite two-color checkerboard. Clipped to the project format by the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct Checkerboard {
    /// Cell size in canonical units.
    pub size: f64,
    pub colors: [[f32; 4]; 2],
}

impl Checkerboard {
    pub fn new(size: f64) -> Self {
        Self {
            size,
            colors: [[0.1, 0.1, 0.1, 1.0], [0.9, 0.9, 0.9, 1.0]],
        }
    }
}

impl Effect for Checkerboard {
    fn plugin_id(&self) -> &str {
        "pullfx.checkerboard"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            thread_safety: ThreadSafety::FullySafeFrame,
            frame_varying: false,
            ..Capabilities::default()
        }
    }

    fn region_of_definition(
        &self,
        _args: &ActionArgs,
        _input_rods: &BTreeMap<usize, Rect>,
    ) -> FxResult<Option<Rect>> {
        Ok(Some(Rect::new(
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
            f64::INFINITY,
            f64::INFINITY,
        )))
    }

    fn render(&self, args: &mut RenderActionArgs<'_>) -> FxResult<()> {
        let scale = args.mip.scale();
        let roi = args.roi;
        for plane in args.planes.iter_mut() {
            let comps = plane.components().clone();
            for y in roi.y1..roi.y2 {
                let cy = ((f64::from(y) + 0.5) / scale / self.size).floor() as i64;
                for x in roi.x1..roi.x2 {
                    let cx = ((f64::from(x) + 0.5) / scale / self.size).floor() as i64;
                    let color = self.colors[(cx + cy).rem_euclid(2) as usize];
                    let Some(px) = plane.pixel_mut(x, y) else {
                        continue;
                    };
                    for (v, name) in px.iter_mut().zip(&comps.channels) {
                        *v = match name.as_str() {
                            "R" => color[0],
                            "G" => color[1],
                            "B" => color[2],
                            "A" => color[3],
                            _ => 0.0,
                        };
                    }
                }
            }
        }
        Ok(())
    }
}
