use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use lottie_thumb::{Capabilities, ThumbnailConfig, ThumbnailJob, ThumbnailMetadata};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lottie-thumb", version)]
struct Cli {
    /// Emit log lines as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the middle frame of a Lottie JSON or ZIP bundle to PNG.
    Thumb(ThumbArgs),
    /// Print which rendering strategies this host can use.
    Probe(ProbeArgs),
}

#[derive(Parser, Debug)]
struct ThumbArgs {
    /// Input animation (`.json`, or a ZIP bundle).
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Config JSON; `LOTTIE_THUMB_*` variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the metadata JSON here instead of stdout.
    #[arg(long)]
    metadata: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;

    match cli.cmd {
        Command::Thumb(args) => runtime.block_on(cmd_thumb(args)),
        Command::Probe(args) => cmd_probe(args),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ThumbnailConfig> {
    let cfg = match path {
        Some(p) => ThumbnailConfig::from_json_file(p)?,
        None => ThumbnailConfig::default(),
    };
    let cfg = cfg.apply_env();
    cfg.validate()?;
    Ok(cfg)
}

async fn cmd_thumb(args: ThumbArgs) -> anyhow::Result<()> {
    let cfg = load_config(args.config.as_deref())?;
    let caps = Capabilities::detect(&cfg);
    let job = ThumbnailJob::new(&args.in_path, &args.out);

    let mut sink: Option<ThumbnailMetadata> = None;
    let metadata = lottie_thumb::generate_thumbnail(&job, &mut sink, &cfg, &caps)
        .await
        .with_context(|| format!("thumbnail for '{}'", args.in_path.display()))?;

    let json = serde_json::to_string_pretty(&metadata).context("serialize metadata")?;
    match &args.metadata {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("write metadata '{}'", path.display()))?,
        None => println!("{json}"),
    }
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let cfg = load_config(args.config.as_deref())?;
    let caps = Capabilities::detect(&cfg);
    let report = serde_json::json!({
        "browser": caps.browser.as_ref().map(|p| p.display().to_string()),
        "engine_script": caps.engine_script.as_ref().map(|e| e.path.display().to_string()),
        "emulated_dom": caps.emulated_dom,
        "raster": caps.raster,
        "cascade": caps.plan(&cfg),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serialize probe report")?
    );
    Ok(())
}
