use crate::cache::store::CacheOpts;
use crate::foundation::core::ProjectFormat;
use crate::foundation::error::{FxError, FxResult};

/// How much is re-rendered when a partially rendered entry is released under memory pressure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureGranularity {
    /// Re-render the whole requested window.
    #[default]
    FullWindow,
    /// Re-render only what the released entry was missing.
    MissingRects,
}

/// Policy applied when the image cache reports itself nearly full.
///
/// The threshold itself belongs to the cache (see [`CacheOpts::near_full_ratio`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MemoryPressurePolicy {
    pub enabled: bool,
    pub granularity: PressureGranularity,
}

impl Default for MemoryPressurePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            granularity: PressureGranularity::FullWindow,
        }
    }
}

/// Engine configuration, loadable from JSON.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineOpts {
    /// Worker pool size. `None` lets rayon decide.
    pub threads: Option<usize>,
    /// Upper bound on tiles per parallel dispatch. `0` means "pool size".
    pub max_tiles: usize,
    /// Mark in-flight regions so concurrent non-abortable renders wait instead of recomputing.
    pub trimap: bool,
    /// Scan effect output for NaN/Inf.
    pub check_nan: bool,
    pub max_recursion_depth: usize,
    /// Memoized (time, view, mip) entries kept per node.
    pub actions_cache_entries: usize,
    /// Frame used to clip infinite regions of definition of nodes without inputs.
    pub project_format: ProjectFormat,
    pub memory_pressure: MemoryPressurePolicy,
    /// Configuration of the in-memory cache built by
    /// [`RenderEngine::with_defaults`](crate::RenderEngine::with_defaults).
    pub cache: CacheOpts,
}

impl Default for EngineOpts {
    fn default() -> Self {
        Self {
            threads: None,
            max_tiles: 0,
            trimap: true,
            check_nan: true,
            max_recursion_depth: 256,
            actions_cache_entries: 64,
            project_format: ProjectFormat::default(),
            memory_pressure: MemoryPressurePolicy::default(),
            cache: CacheOpts::default(),
        }
    }
}

impl EngineOpts {
    pub fn from_json_str(s: &str) -> FxResult<Self> {
        let opts: Self = serde_json::from_str(s)
            .map_err(|e| FxError::config(format!("invalid engine config: {e}")))?;
        opts.validate()?;
        Ok(opts)
    }

    pub fn validate(&self) -> FxResult<()> {
        if let Some(n) = self.threads
            && n == 0
        {
            return Err(FxError::config("'threads' must be >= 1 when set"));
        }
        if self.max_recursion_depth == 0 {
            return Err(FxError::config("'max_recursion_depth' must be >= 1"));
        }
        if self.actions_cache_entries == 0 {
            return Err(FxError::config("'actions_cache_entries' must be >= 1"));
        }
        let pf = self.project_format;
        if pf.width == 0 || pf.height == 0 {
            return Err(FxError::config("project format must be non-empty"));
        }
        if !(pf.pixel_aspect.is_finite() && pf.pixel_aspect > 0.0) {
            return Err(FxError::config("project pixel aspect must be finite and > 0"));
        }
        if self.cache.capacity_bytes == 0 {
            return Err(FxError::config("cache 'capacity_bytes' must be > 0"));
        }
        let r = self.cache.near_full_ratio;
        if !(r > 0.0 && r <= 1.0) {
            return Err(FxError::config("cache 'near_full_ratio' must be in (0, 1]"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/engine/opts.rs"]
mod tests;
