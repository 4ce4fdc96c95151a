use crate::foundation::math::RectI;
use smallvec::SmallVec;

/// Rectangles still to compute. Usually one to four entries.
pub type RectList = SmallVec<[RectI; 4]>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum PixelState {
    Unrendered = 0,
    Rendered = 1,
    /// Claimed by a render in flight (trimap).
    Pending = 2,
}

/// Result of a trimap claim over a region.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Claim {
    /// Rectangles this caller now owns and must render (or release).
    pub claimed: RectList,
    /// Part of the region is being produced by another render.
    pub pending_elsewhere: bool,
}

/// Per-pixel rendered state of one image.
///
/// Pixels outside `bounds` are never reported as missing.
#[derive(Clone, Debug)]
pub(crate) struct Bitmap {
    bounds: RectI,
    states: Vec<u8>,
}

impl Bitmap {
    pub(crate) fn new(bounds: RectI) -> Self {
        Self {
            bounds,
            states: vec![PixelState::Unrendered as u8; bounds.area() as usize],
        }
    }

    pub(crate) fn bounds(&self) -> RectI {
        self.bounds
    }

    fn index(&self, x: i32, y: i32) -> usize {
        ((y - self.bounds.y1) as usize) * (self.bounds.width() as usize)
            + (x - self.bounds.x1) as usize
    }

    pub(crate) fn set(&mut self, rect: RectI, state: PixelState) {
        let Some(r) = rect.intersect(self.bounds) else {
            return;
        };
        for y in r.y1..r.y2 {
            let start = self.index(r.x1, y);
            let end = start + r.width() as usize;
            self.states[start..end].fill(state as u8);
        }
    }

    /// Replace `from` by `to` inside `rect`, leaving other states untouched.
    pub(crate) fn replace(&mut self, rect: RectI, from: PixelState, to: PixelState) {
        let Some(r) = rect.intersect(self.bounds) else {
            return;
        };
        for y in r.y1..r.y2 {
            let start = self.index(r.x1, y);
            for s in &mut self.states[start..start + r.width() as usize] {
                if *s == from as u8 {
                    *s = to as u8;
                }
            }
        }
    }

    pub(crate) fn any(&self, rect: RectI, state: PixelState) -> bool {
        let Some(r) = rect.intersect(self.bounds) else {
            return false;
        };
        (r.y1..r.y2).any(|y| {
            let start = self.index(r.x1, y);
            self.states[start..start + r.width() as usize]
                .iter()
                .any(|&s| s == state as u8)
        })
    }

    /// Minimal set of rectangles inside `roi` whose pixels are in `state`.
    ///
    /// Rows are scanned into runs and vertically adjacent rows with identical runs merge into one
    /// rectangle, so a rectangle that was rendered earlier never shows up again.
    pub(crate) fn rects_in_state(&self, roi: RectI, state: PixelState) -> RectList {
        let mut out = RectList::new();
        let Some(r) = roi.intersect(self.bounds) else {
            return out;
        };

        // Open rectangles from the previous row, keyed by their x span.
        let mut open: Vec<RectI> = Vec::new();
        let mut runs: Vec<(i32, i32)> = Vec::new();
        for y in r.y1..r.y2 {
            runs.clear();
            let start = self.index(r.x1, y);
            let row = &self.states[start..start + r.width() as usize];
            let mut x = 0usize;
            while x < row.len() {
                if row[x] == state as u8 {
                    let run_start = x;
                    while x < row.len() && row[x] == state as u8 {
                        x += 1;
                    }
                    runs.push((r.x1 + run_start as i32, r.x1 + x as i32));
                } else {
                    x += 1;
                }
            }

            let same_spans = open.len() == runs.len()
                && open
                    .iter()
                    .zip(runs.iter())
                    .all(|(o, &(a, b))| o.x1 == a && o.x2 == b);
            if same_spans {
                for o in &mut open {
                    o.y2 = y + 1;
                }
            } else {
                out.extend(open.drain(..));
                open.extend(runs.iter().map(|&(a, b)| RectI::new(a, y, b, y + 1)));
            }
        }
        out.extend(open);
        out
    }

    /// Unrendered rectangles of `roi` that nobody is computing yet.
    pub(crate) fn rest_to_render(&self, roi: RectI) -> RectList {
        self.rects_in_state(roi, PixelState::Unrendered)
    }

    /// Claim the unrendered part of `roi` by flipping it to `Pending`.
    pub(crate) fn claim(&mut self, roi: RectI) -> Claim {
        let claimed = self.rest_to_render(roi);
        for r in &claimed {
            self.set(*r, PixelState::Pending);
        }
        Claim {
            pending_elsewhere: self.any_pending_outside(roi, &claimed),
            claimed,
        }
    }

    fn any_pending_outside(&self, roi: RectI, mine: &RectList) -> bool {
        let Some(r) = roi.intersect(self.bounds) else {
            return false;
        };
        (r.y1..r.y2).any(|y| {
            (r.x1..r.x2).any(|x| {
                self.states[self.index(x, y)] == PixelState::Pending as u8
                    && !mine.iter().any(|m| m.contains_point(x, y))
            })
        })
    }

    pub(crate) fn is_fully_rendered(&self, roi: RectI) -> bool {
        let Some(r) = roi.intersect(self.bounds) else {
            return true;
        };
        (r.y1..r.y2).all(|y| {
            let start = self.index(r.x1, y);
            self.states[start..start + r.width() as usize]
                .iter()
                .all(|&s| s == PixelState::Rendered as u8)
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/bitmap.rs"]
mod tests;
