//! Built-in effects.

pub(crate) mod checkerboard;
pub(crate) mod dot;
pub(crate) mod gain;
pub(crate) mod translate;

use std::sync::Arc;

use crate::foundation::core::ImageComponents;
use crate::foundation::error::{FxError, FxResult};
use crate::graph::effect::Effect;

use checkerboard::Checkerboard;
use dot::Dot;
use gain::Gain;
use translate::Translate;

/// Build a built-in effect from its kind and JSON parameters (`null` for defaults).
pub fn parse_effect(kind: &str, params: &serde_json::Value) -> FxResult<Arc<dyn Effect>> {
    let kind = kind.trim().to_ascii_lowercase();
    if kind.is_empty() {
        return Err(FxError::validation("effect kind must be non-empty"));
    }
    let params = if params.is_null() {
        None
    } else {
        Some(
            params
                .as_object()
                .ok_or_else(|| FxError::validation("effect params must be an object"))?,
        )
    };
    let num = |name: &str, default: f64| -> FxResult<f64> {
        match params.and_then(|p| p.get(name)) {
            None => Ok(default),
            Some(v) => {
                let f = v.as_f64().ok_or_else(|| {
                    FxError::validation(format!("{kind}.{name} must be a number"))
                })?;
                if !f.is_finite() {
                    return Err(FxError::validation(format!("{kind}.{name} must be finite")));
                }
                Ok(f)
            }
        }
    };

    match kind.as_str() {
        "checkerboard" => {
            let size = num("size", 64.0)?;
            if size <= 0.0 {
                return Err(FxError::validation("checkerboard.size must be > 0"));
            }
            Ok(Arc::new(Checkerboard::new(size)))
        }
        "gain" => Ok(Arc::new(Gain::new(num("gain", 1.0)? as f32))),
        "translate" => Ok(Arc::new(Translate::new(num("dx", 0.0)?, num("dy", 0.0)?))),
        "dot" => Ok(Arc::new(Dot)),
        _ => Err(FxError::validation(format!("unknown effect kind '{kind}'"))),
    }
}

/// Channel `name` of a pixel laid out as `src`. Missing alpha reads as opaque, any other missing
/// channel as zero.
pub(crate) fn channel_value(src: &ImageComponents, px: &[f32], name: &str) -> f32 {
    match src.channel_index(name) {
        Some(i) => px[i],
        None if name == "A" => 1.0,
        None => 0.0,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/effects/mod.rs"]
mod tests;
