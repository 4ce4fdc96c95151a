use crate::foundation::core::{MipLevel, Rect};

/// Half-open integer rectangle `[x1, x2) x [y1, y2)` in pixel space of some mip level.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct RectI {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl RectI {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(self) -> i32 {
        (self.x2 - self.x1).max(0)
    }

    pub fn height(self) -> i32 {
        (self.y2 - self.y1).max(0)
    }

    pub fn area(self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn is_empty(self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }

    pub fn contains_point(self, x: i32, y: i32) -> bool {
        x >= self.x1 && x < self.x2 && y >= self.y1 && y < self.y2
    }

    /// `true` when `other` lies entirely inside `self`. Empty rectangles are contained everywhere.
    pub fn contains(self, other: RectI) -> bool {
        other.is_empty()
            || (other.x1 >= self.x1
                && other.y1 >= self.y1
                && other.x2 <= self.x2
                && other.y2 <= self.y2)
    }

    pub fn intersect(self, other: RectI) -> Option<RectI> {
        let r = RectI::new(
            self.x1.max(other.x1),
            self.y1.max(other.y1),
            self.x2.min(other.x2),
            self.y2.min(other.y2),
        );
        (!r.is_empty()).then_some(r)
    }

    pub fn intersects(self, other: RectI) -> bool {
        self.intersect(other).is_some()
    }

    /// Bounding box of both rectangles. Empty operands are ignored.
    pub fn union(self, other: RectI) -> RectI {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        RectI::new(
            self.x1.min(other.x1),
            self.y1.min(other.y1),
            self.x2.max(other.x2),
            self.y2.max(other.y2),
        )
    }

    /// Bounding box of a set of rectangles.
    pub fn bbox<'a>(rects: impl IntoIterator<Item = &'a RectI>) -> RectI {
        rects
            .into_iter()
            .fold(RectI::default(), |acc, r| acc.union(*r))
    }

    /// Map this rectangle from level `from` up to full resolution (level 0).
    pub fn upscale_pow2(self, from: MipLevel) -> RectI {
        let k = from.alignment();
        RectI::new(
            self.x1.saturating_mul(k),
            self.y1.saturating_mul(k),
            self.x2.saturating_mul(k),
            self.y2.saturating_mul(k),
        )
    }

    /// Map a level-0 rectangle down to `to`, rounding outward.
    pub fn downscale_pow2(self, to: MipLevel) -> RectI {
        let k = to.alignment();
        RectI::new(
            self.x1.div_euclid(k),
            self.y1.div_euclid(k),
            ceil_div(self.x2, k),
            ceil_div(self.y2, k),
        )
    }

    /// Grow outward so every edge is a multiple of `align`.
    pub fn round_out_to(self, align: i32) -> RectI {
        if align <= 1 {
            return self;
        }
        RectI::new(
            self.x1.div_euclid(align) * align,
            self.y1.div_euclid(align) * align,
            ceil_div(self.x2, align) * align,
            ceil_div(self.y2, align) * align,
        )
    }

    /// Convert to canonical (resolution independent) coordinates.
    pub fn to_canonical(self, mip: MipLevel, par: f64) -> Rect {
        let inv = 1.0 / mip.scale();
        Rect::new(
            f64::from(self.x1) * inv * par,
            f64::from(self.y1) * inv,
            f64::from(self.x2) * inv * par,
            f64::from(self.y2) * inv,
        )
    }

    /// Split into at most `n` horizontal bands whose inner edges are multiples of `align`.
    pub fn split_rows(self, n: usize, align: i32) -> Vec<RectI> {
        let align = align.max(1);
        if self.is_empty() || n <= 1 {
            return vec![self];
        }
        let rows = self.height();
        let step = ceil_div(ceil_div(rows, n as i32), align).max(1) * align;
        let mut out = Vec::with_capacity(n);
        let mut y = self.y1;
        while y < self.y2 {
            let mut y_next = if y == self.y1 {
                // First band ends on an aligned boundary so later bands start aligned.
                (y.div_euclid(align) * align + step).min(self.y2)
            } else {
                (y + step).min(self.y2)
            };
            if y_next <= y {
                y_next = self.y2;
            }
            out.push(RectI::new(self.x1, y, self.x2, y_next));
            y = y_next;
        }
        out
    }
}

impl std::fmt::Display for RectI {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{} {}x{}]", self.x1, self.y1, self.width(), self.height())
    }
}

fn ceil_div(a: i32, b: i32) -> i32 {
    -((-a).div_euclid(b))
}

/// Convert a canonical rectangle to pixel space at `mip`, rounding outward.
///
/// Infinite edges saturate to the `i32` range; callers clip RoDs before converting.
pub fn canonical_to_pixel(r: Rect, mip: MipLevel, par: f64) -> RectI {
    let s = mip.scale();
    let conv = |v: f64, up: bool| -> i32 {
        let v = if up { v.ceil() } else { v.floor() };
        if v.is_nan() {
            0
        } else {
            v.clamp(f64::from(i32::MIN / 2), f64::from(i32::MAX / 2)) as i32
        }
    };
    RectI::new(
        conv(r.x0 * s / par, false),
        conv(r.y0 * s, false),
        conv(r.x1 * s / par, true),
        conv(r.y1 * s, true),
    )
}

/// `true` when the rectangle is well formed (`x0 <= x1`, `y0 <= y1`) and not NaN.
pub fn is_well_formed(r: Rect) -> bool {
    r.x0 <= r.x1 && r.y0 <= r.y1
}

pub fn is_null_rect(r: Rect) -> bool {
    !(r.x1 > r.x0 && r.y1 > r.y0)
}

pub fn has_infinite_edge(r: Rect) -> bool {
    !(r.x0.is_finite() && r.y0.is_finite() && r.x1.is_finite() && r.y1.is_finite())
}

/// Replace each infinite edge of `r` with the matching edge of `clip`.
pub fn clip_infinite_edges(r: Rect, clip: Rect) -> Rect {
    Rect::new(
        if r.x0.is_finite() { r.x0 } else { clip.x0 },
        if r.y0.is_finite() { r.y0 } else { clip.y0 },
        if r.x1.is_finite() { r.x1 } else { clip.x1 },
        if r.y1.is_finite() { r.y1 } else { clip.y1 },
    )
}

pub fn intersect_rect(a: Rect, b: Rect) -> Option<Rect> {
    let r = a.intersect(b);
    (!is_null_rect(r)).then_some(r)
}

/// Union that ignores null operands.
pub fn union_rect(a: Rect, b: Rect) -> Rect {
    if is_null_rect(a) {
        return b;
    }
    if is_null_rect(b) {
        return a;
    }
    a.union(b)
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
