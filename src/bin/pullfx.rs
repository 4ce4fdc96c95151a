use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde_json::json;

#[derive(Parser, Debug)]
#[command(name = "pullfx", version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a window of the demo graph (checkerboard -> gain -> translate -> translate) as PNG.
    Render(RenderArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Engine config JSON. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frame time.
    #[arg(long, default_value_t = 0.0)]
    time: f64,

    /// Mip level (0 = full resolution, 1 = half...).
    #[arg(long, default_value_t = 0)]
    mip: u32,

    /// Pixel window `x1,y1,x2,y2` at the requested mip level. Defaults to the whole RoD.
    #[arg(long)]
    roi: Option<String>,

    /// Checker cell size in canonical pixels.
    #[arg(long, default_value_t = 64.0)]
    size: f64,

    #[arg(long, default_value_t = 1.5)]
    gain: f64,

    /// Offset of each of the two translate nodes.
    #[arg(long, default_value_t = 16.0)]
    dx: f64,

    #[arg(long, default_value_t = 8.0)]
    dy: f64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    match cli.cmd {
        Command::Render(args) => cmd_render(args),
    }
}

fn read_config(path: Option<&Path>) -> anyhow::Result<pullfx::EngineOpts> {
    let Some(path) = path else {
        return Ok(pullfx::EngineOpts::default());
    };
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("read config '{}'", path.display()))?;
    Ok(pullfx::EngineOpts::from_json_str(&s)?)
}

fn parse_roi(s: &str) -> anyhow::Result<pullfx::RectI> {
    let v: Vec<i32> = s
        .split(',')
        .map(|p| p.trim().parse::<i32>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("parse roi '{s}'"))?;
    let &[x1, y1, x2, y2] = v.as_slice() else {
        anyhow::bail!("roi must be 'x1,y1,x2,y2', got '{s}'");
    };
    let r = pullfx::RectI::new(x1, y1, x2, y2);
    if r.is_empty() {
        anyhow::bail!("roi '{s}' is empty");
    }
    Ok(r)
}

fn build_demo_graph(args: &RenderArgs) -> anyhow::Result<(Arc<pullfx::NodeGraph>, pullfx::NodeId)> {
    let graph = Arc::new(pullfx::NodeGraph::new());
    let checker = graph.add_node(
        "checkerboard",
        pullfx::parse_effect("checkerboard", &json!({ "size": args.size }))?,
    );
    let gain = graph.add_node("gain", pullfx::parse_effect("gain", &json!({ "gain": args.gain }))?);
    let offset = json!({ "dx": args.dx, "dy": args.dy });
    let t1 = graph.add_node("translate1", pullfx::parse_effect("translate", &offset)?);
    let t2 = graph.add_node("translate2", pullfx::parse_effect("translate", &offset)?);
    graph.connect(gain, 0, checker)?;
    graph.connect(t1, 0, gain)?;
    graph.connect(t2, 0, t1)?;
    Ok((graph, t2))
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let opts = read_config(args.config.as_deref())?;
    let (graph, output) = build_demo_graph(&args)?;
    let format = opts.project_format;
    let engine = pullfx::RenderEngine::with_defaults(graph, opts)?;

    let mip = pullfx::MipLevel(args.mip);
    let roi = match &args.roi {
        Some(s) => parse_roi(s)?,
        None => pullfx::canonical_to_pixel(format.rect(), mip, format.pixel_aspect),
    };
    let req = pullfx::RenderRequest::new(args.time, roi).with_mip(mip);
    let out = engine.render(output, &req, pullfx::FrameRenderOpts::default())?;
    let img = out
        .first()
        .context("the graph produced nothing inside the requested window")?;

    let bounds = roi
        .intersect(img.bounds())
        .context("rendered image does not overlap the requested window")?;
    let width = u32::try_from(bounds.width()).context("image width")?;
    let height = u32::try_from(bounds.height()).context("image height")?;
    let comps = img.components().clone();
    let pixels = img.read();
    let mut rgba = Vec::with_capacity((width as usize) * (height as usize) * 4);
    for y in bounds.y1..bounds.y2 {
        for x in bounds.x1..bounds.x2 {
            let px = pixels.pixel(x, y).unwrap_or(&[]);
            for name in ["R", "G", "B", "A"] {
                let v = match comps.channel_index(name) {
                    Some(i) => px.get(i).copied().unwrap_or(0.0),
                    None if name == "A" => 1.0,
                    None => 0.0,
                };
                rgba.push((v.clamp(0.0, 1.0) * 255.0).round() as u8);
            }
        }
    }

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        &args.out,
        &rgba,
        width,
        height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    let stats = engine.stats();
    eprintln!(
        "wrote {} ({}x{}, {} render calls, {} tiles, {} cache hits)",
        args.out.display(),
        width,
        height,
        stats.render_calls,
        stats.tiles_rendered,
        stats.cache_hits
    );
    Ok(())
}
