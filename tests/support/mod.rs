#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pullfx::{
    ActionArgs, Affine, Capabilities, Effect, EngineOpts, FxError, FxResult, Identity,
    ImageCache, MemoryImageCache, NodeGraph, Rect, RectI, RenderActionArgs, RenderEngine,
    RenderOutput, TimeDomain, Timeline, TransformAction,
};

pub type RenderHook = Box<dyn Fn(&RenderActionArgs<'_>) -> FxResult<()> + Send + Sync>;

/// Configurable effect that counts its actions and records what it rendered.
///
/// Output value = `value` + channel 0 of input 0 (when connected), on every channel.
pub struct StubEffect {
    plugin_id: String,
    caps: Capabilities,
    inputs: usize,
    rod: Option<Rect>,
    value: f32,
    identity: Mutex<Identity>,
    transform: Option<Affine>,
    receives_transform: bool,
    delay: Option<Duration>,
    domain: Option<TimeDomain>,
    fail: AtomicBool,
    hook: Option<RenderHook>,
    pub rod_calls: AtomicUsize,
    pub identity_calls: AtomicUsize,
    pub render_calls: AtomicUsize,
    pub domain_calls: AtomicUsize,
    rendered: Mutex<Vec<RectI>>,
    seen_transforms: Mutex<Vec<Option<Affine>>>,
}

impl StubEffect {
    /// Source with a fixed RoD.
    pub fn generator(rod: Rect, value: f32) -> Self {
        Self::new(0, Some(rod), value)
    }

    /// One-input filter whose RoD is its input's.
    pub fn filter(value: f32) -> Self {
        Self::new(1, None, value)
    }

    fn new(inputs: usize, rod: Option<Rect>, value: f32) -> Self {
        Self {
            plugin_id: "test.stub".to_string(),
            caps: Capabilities::default(),
            inputs,
            rod,
            value,
            identity: Mutex::new(Identity::None),
            transform: None,
            receives_transform: false,
            delay: None,
            domain: None,
            fail: AtomicBool::new(false),
            hook: None,
            rod_calls: AtomicUsize::new(0),
            identity_calls: AtomicUsize::new(0),
            render_calls: AtomicUsize::new(0),
            domain_calls: AtomicUsize::new(0),
            rendered: Mutex::new(Vec::new()),
            seen_transforms: Mutex::new(Vec::new()),
        }
    }

    /// Fixed RoD regardless of inputs.
    pub fn with_rod(mut self, rod: Rect) -> Self {
        self.rod = Some(rod);
        self
    }

    pub fn plugin(mut self, id: &str) -> Self {
        self.plugin_id = id.to_string();
        self
    }

    pub fn caps(mut self, f: impl FnOnce(&mut Capabilities)) -> Self {
        f(&mut self.caps);
        self
    }

    pub fn identity(self, id: Identity) -> Self {
        *self.identity.lock().unwrap() = id;
        self
    }

    pub fn transform(mut self, m: Affine) -> Self {
        self.caps.can_transform = true;
        self.transform = Some(m);
        self
    }

    pub fn receives_transform(mut self) -> Self {
        self.receives_transform = true;
        self
    }

    pub fn delay(mut self, d: Duration) -> Self {
        self.delay = Some(d);
        self
    }

    /// Fixed frame range regardless of inputs.
    pub fn with_domain(mut self, first: f64, last: f64) -> Self {
        self.domain = Some(TimeDomain { first, last });
        self
    }

    pub fn hook(
        mut self,
        f: impl Fn(&RenderActionArgs<'_>) -> FxResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.hook = Some(Box::new(f));
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn renders(&self) -> usize {
        self.render_calls.load(Ordering::SeqCst)
    }

    pub fn rod_queries(&self) -> usize {
        self.rod_calls.load(Ordering::SeqCst)
    }

    pub fn identity_queries(&self) -> usize {
        self.identity_calls.load(Ordering::SeqCst)
    }

    pub fn domain_queries(&self) -> usize {
        self.domain_calls.load(Ordering::SeqCst)
    }

    pub fn rendered(&self) -> Vec<RectI> {
        self.rendered.lock().unwrap().clone()
    }

    pub fn seen_transforms(&self) -> Vec<Option<Affine>> {
        self.seen_transforms.lock().unwrap().clone()
    }
}

impl Effect for StubEffect {
    fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    fn max_input_count(&self) -> usize {
        self.inputs
    }

    fn capabilities(&self) -> Capabilities {
        self.caps.clone()
    }

    fn region_of_definition(
        &self,
        _args: &ActionArgs,
        input_rods: &BTreeMap<usize, Rect>,
    ) -> FxResult<Option<Rect>> {
        self.rod_calls.fetch_add(1, Ordering::SeqCst);
        match self.rod {
            Some(r) => Ok(Some(r)),
            None => Ok(input_rods.get(&0).copied()),
        }
    }

    fn is_identity(&self, _args: &ActionArgs, _roi: RectI, _rod: Rect) -> FxResult<Identity> {
        self.identity_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.identity.lock().unwrap())
    }

    fn time_domain(&self, input_domains: &[TimeDomain]) -> TimeDomain {
        self.domain_calls.fetch_add(1, Ordering::SeqCst);
        self.domain
            .or_else(|| input_domains.first().copied())
            .unwrap_or(TimeDomain::UNBOUNDED)
    }

    fn transform(&self, _args: &ActionArgs) -> FxResult<Option<TransformAction>> {
        Ok(self.transform.map(|matrix| TransformAction { input_nb: 0, matrix }))
    }

    fn input_can_receive_transform(&self, input_nb: usize) -> bool {
        self.receives_transform && input_nb == 0
    }

    fn render(&self, args: &mut RenderActionArgs<'_>) -> FxResult<()> {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        self.rendered.lock().unwrap().push(args.roi);
        self.seen_transforms
            .lock()
            .unwrap()
            .push(args.input_transform(0));
        if let Some(hook) = &self.hook {
            hook(&*args)?;
        }
        if let Some(d) = self.delay {
            std::thread::sleep(d);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(FxError::action("stub failure"));
        }

        let src = args.input(0).cloned();
        let read = src.as_ref().map(|s| s.read());
        let roi = args.roi;
        for plane in args.planes.iter_mut() {
            for y in roi.y1..roi.y2 {
                for x in roi.x1..roi.x2 {
                    let base = read
                        .as_ref()
                        .and_then(|r| r.pixel(x, y))
                        .map_or(0.0, |p| p[0]);
                    if let Some(px) = plane.pixel_mut(x, y) {
                        px.fill(base + self.value);
                    }
                }
            }
        }
        Ok(())
    }
}

pub fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Rect {
    Rect::new(x0, y0, x1, y1)
}

pub fn opts(threads: usize) -> EngineOpts {
    EngineOpts {
        threads: Some(threads),
        ..EngineOpts::default()
    }
}

/// Engine over `graph` with its own in-memory cache, returned alongside for inspection.
pub fn engine_with_cache(
    graph: &Arc<NodeGraph>,
    opts: EngineOpts,
) -> (RenderEngine, Arc<MemoryImageCache>) {
    let cache = Arc::new(MemoryImageCache::new(opts.cache));
    let engine = RenderEngine::new(
        Arc::clone(graph),
        Arc::clone(&cache) as Arc<dyn ImageCache>,
        Arc::new(Timeline::default()),
        opts,
    )
    .unwrap();
    (engine, cache)
}

pub fn engine(graph: &Arc<NodeGraph>) -> RenderEngine {
    engine_with_cache(graph, opts(4)).0
}

/// Channel 0 of the first plane at `(x, y)`.
pub fn value_at(out: &RenderOutput, x: i32, y: i32) -> Option<f32> {
    let img = out.first()?;
    let read = img.read();
    read.pixel(x, y).map(|p| p[0])
}

pub fn area(rects: &[RectI]) -> u64 {
    rects.iter().map(|r| r.area()).sum()
}
