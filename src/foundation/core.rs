use crate::foundation::error::{FxError, FxResult};

pub use kurbo::{Affine, Point, Rect, Vec2};

/// Render time. Fractional times are legal (motion blur sub-frames, retiming).
pub type Time = f64;

/// Stable identifier of a node inside a [`NodeGraph`](crate::NodeGraph).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct NodeId(pub u32);

/// View index (stereo / multi-view renders). View 0 is the main view.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct ViewIdx(pub u32);

/// Opaque content hash of a node: parameters, upstream graph and time-varying state.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct NodeHash(pub u64);

/// Mipmap level. Level 0 is full resolution, each increment halves linear resolution.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct MipLevel(pub u32);

impl MipLevel {
    pub const FULL: Self = Self(0);

    /// Linear scale factor of this level (`1 / 2^level`).
    pub fn scale(self) -> f64 {
        1.0 / f64::from(1u32 << self.0.min(30))
    }

    /// Pixel alignment a level-0 rectangle needs to map exactly onto this level.
    pub fn alignment(self) -> i32 {
        1i32 << self.0.min(30)
    }

    pub fn is_full(self) -> bool {
        self.0 == 0
    }
}

/// Hashable wrapper around a [`Time`], compared bitwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimeKey(u64);

impl TimeKey {
    pub fn new(t: Time) -> Self {
        // -0.0 and 0.0 must land on the same key.
        if t == 0.0 {
            Self(0)
        } else {
            Self(t.to_bits())
        }
    }

    pub fn time(self) -> Time {
        f64::from_bits(self.0)
    }
}

/// Storage depth of one channel.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum BitDepth {
    Byte,
    Short,
    Half,
    Float,
}

impl BitDepth {
    pub fn bytes_per_channel(self) -> u64 {
        match self {
            Self::Byte => 1,
            Self::Short | Self::Half => 2,
            Self::Float => 4,
        }
    }

    /// Quantize a value to what this depth can represent.
    ///
    /// Pixels are held as `f32` internally; integer depths clamp and round, `Half` and `Float`
    /// store the value as is.
    pub fn quantize(self, v: f32) -> f32 {
        match self {
            Self::Byte => (v.clamp(0.0, 1.0) * 255.0).round() / 255.0,
            Self::Short => (v.clamp(0.0, 1.0) * 65535.0).round() / 65535.0,
            Self::Half | Self::Float => v,
        }
    }
}

/// Name of the color layer. Every other layer is a non-color plane (motion vectors, disparity…).
pub const COLOR_LAYER: &str = "Color";

/// Component layout of one image plane: a layer name and its ordered channel names.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct ImageComponents {
    pub layer: String,
    pub channels: Vec<String>,
}

impl ImageComponents {
    pub fn new(layer: impl Into<String>, channels: &[&str]) -> FxResult<Self> {
        if channels.is_empty() || channels.len() > 4 {
            return Err(FxError::validation(
                "image components must have between 1 and 4 channels",
            ));
        }
        Ok(Self {
            layer: layer.into(),
            channels: channels.iter().map(|c| c.to_string()).collect(),
        })
    }

    pub fn rgba() -> Self {
        Self::color(&["R", "G", "B", "A"])
    }

    pub fn rgb() -> Self {
        Self::color(&["R", "G", "B"])
    }

    pub fn alpha() -> Self {
        Self::color(&["A"])
    }

    fn color(channels: &[&str]) -> Self {
        Self {
            layer: COLOR_LAYER.to_string(),
            channels: channels.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn is_color(&self) -> bool {
        self.layer == COLOR_LAYER
    }

    pub fn n_comps(&self) -> usize {
        self.channels.len()
    }

    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c == name)
    }

    /// `true` when every channel of `self` can be read out of `src` without inventing data.
    pub fn is_subset_of(&self, src: &ImageComponents) -> bool {
        self.layer == src.layer && self.channels.iter().all(|c| src.channel_index(c).is_some())
    }

    /// `true` when `src` can be converted into `self` at output time.
    ///
    /// Color layouts convert freely (missing alpha becomes opaque, missing color becomes 0); other
    /// layers need every channel present in `src`.
    pub fn can_convert_from(&self, src: &ImageComponents) -> bool {
        if self.is_color() && src.is_color() {
            return true;
        }
        self.is_subset_of(src)
    }
}

impl std::fmt::Display for ImageComponents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.layer, self.channels.join(""))
    }
}

/// Project frame used to clip infinite regions of definition.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProjectFormat {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_par")]
    pub pixel_aspect: f64,
}

fn default_par() -> f64 {
    1.0
}

impl Default for ProjectFormat {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            pixel_aspect: 1.0,
        }
    }
}

impl ProjectFormat {
    /// Canonical rectangle covered by the format.
    pub fn rect(self) -> Rect {
        Rect::new(
            0.0,
            0.0,
            f64::from(self.width) * self.pixel_aspect,
            f64::from(self.height),
        )
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
