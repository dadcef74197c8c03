use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use reelcut::{
    config::EditorConfig,
    error::EditorError,
    render::{AudioOutput, RateControl, RenderJob, RenderSpec},
    video::Clip,
    TimelineSnapshot,
};

#[derive(Parser)]
#[command(
    name = "reelcut",
    version,
    about = "Inspect, seek and export video timelines",
    long_about = "Reelcut opens media files with frame-accurate seeking, places them on a timeline and renders the result with one- or two-pass encoding."
)]
struct Cli {
    /// Configuration file (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print container and stream information
    Info {
        /// Media file to inspect
        file: PathBuf,
    },

    /// Seek to a time and save the decoded frame as PNG
    Snapshot {
        /// Media file to read
        file: PathBuf,

        /// Position in seconds
        #[arg(long, default_value_t = 0.0)]
        at: f64,

        /// PNG file to write
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Render files placed end to end, or a saved timeline
    Render(RenderArgs),
}

#[derive(Args)]
struct RenderArgs {
    /// Media files, placed on the timeline in order
    files: Vec<PathBuf>,

    /// Output file
    #[arg(short, long)]
    output: PathBuf,

    /// Saved timeline (TOML) used instead of FILES
    #[arg(long)]
    timeline: Option<PathBuf>,

    /// Container short name (mp4, matroska, avi, ...)
    #[arg(long)]
    container: Option<String>,

    /// Video encoder short name (libx264, mpeg4, libvpx, ...)
    #[arg(long)]
    codec: Option<String>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    #[arg(long)]
    fps: Option<f64>,

    /// Target bitrate in kbit/s
    #[arg(long, conflicts_with = "crf")]
    bitrate: Option<u32>,

    /// Constant quality instead of a bitrate
    #[arg(long)]
    crf: Option<u32>,

    /// Compression preset, 1 (slowest) to 10 (fastest)
    #[arg(long)]
    preset: Option<u8>,

    /// Encoding passes (1 or 2)
    #[arg(long)]
    passes: Option<u8>,

    /// Add a synthesized audio track
    #[arg(long)]
    audio: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::from_level(log_level).into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting reelcut v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            EditorConfig::from_file(config_path)?
        }
        None => EditorConfig::default(),
    };

    if let Err(e) = run(cli.command, config).await {
        match e.downcast_ref::<EditorError>() {
            Some(editor_error) => error!("❌ {}", editor_error.user_message()),
            None => error!("❌ {:#}", e),
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn run(command: Command, config: EditorConfig) -> Result<()> {
    match command {
        Command::Info { file } => {
            let clip = Clip::load(&file, &config.decode)?;
            println!("{}", clip.info());
        }
        Command::Snapshot { file, at, output } => {
            let mut clip = Clip::load(&file, &config.decode)?;
            clip.goto_second_and_read(at, true, true)?;
            let frame = clip
                .image()
                .ok_or_else(|| anyhow!("No frame decoded at {:.3}s", at))?;
            frame
                .save_png(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("📸 Saved frame at {:.3}s to {:?}", clip.current(), output);
        }
        Command::Render(args) => render(args, config).await?,
    }

    Ok(())
}

/// Timeline of `files` end to end, plus the first clip for output defaults
fn sequential_timeline(files: &[PathBuf], config: &EditorConfig) -> Result<(TimelineSnapshot, Clip)> {
    let mut placed = Vec::with_capacity(files.len());
    let mut first = None;

    for file in files {
        let clip = Clip::load(file, &config.decode)?;
        info!("   {:?}: {:.2}s", file, clip.duration());
        placed.push((file.clone(), clip.duration()));
        if first.is_none() {
            first = Some(clip);
        }
    }

    let first = first.ok_or_else(|| anyhow!("Nothing to render: give media files or --timeline"))?;
    Ok((TimelineSnapshot::sequential(&placed), first))
}

fn load_timeline(path: &Path, config: &EditorConfig) -> Result<(TimelineSnapshot, Clip)> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let snapshot = TimelineSnapshot::from_toml(&text)?;
    let first = snapshot
        .clips
        .last()
        .ok_or_else(|| anyhow!("Timeline {} has no clips", path.display()))?;
    let clip = Clip::load(&first.path, &config.decode)?;
    Ok((snapshot, clip))
}

async fn render(args: RenderArgs, mut config: EditorConfig) -> Result<()> {
    if let Some(container) = args.container {
        config.render.container = container;
    }
    if let Some(codec) = args.codec {
        config.render.codec = codec;
    }
    if let Some(preset) = args.preset {
        config.render.preset = preset;
    }
    if let Some(passes) = args.passes {
        config.render.passes = passes;
    }
    config.validate()?;

    let (snapshot, first) = match &args.timeline {
        Some(path) => load_timeline(path, &config)?,
        None => sequential_timeline(&args.files, &config)?,
    };

    let mut spec = RenderSpec::from_movie_info(&args.output, first.info(), &config.render);
    drop(first);

    if let Some(video) = spec.video.as_mut() {
        video.width = args.width.unwrap_or(video.width);
        video.height = args.height.unwrap_or(video.height);
        video.fps = args.fps.unwrap_or(video.fps);
        if let Some(crf) = args.crf {
            video.rate = RateControl::Quality { crf };
        } else if let Some(kbps) = args.bitrate {
            video.rate = RateControl::Bitrate { kbps };
        }
    }
    spec.audio = if args.audio {
        Some(spec.audio.unwrap_or_else(|| AudioOutput {
            codec: config.render.audio_codec.clone(),
            ..AudioOutput::default()
        }))
    } else {
        None
    };

    info!("🎞️ Rendering {} clip(s) to {:?}", snapshot.clips.len(), spec.path);

    let job = RenderJob::spawn(snapshot, spec, config);
    let mut progress = job.progress();
    let reporter = tokio::spawn(async move {
        let mut last_percent = None;
        while progress.changed().await.is_ok() {
            let current = *progress.borrow_and_update();
            let percent = (current.fraction() * 100.0) as u32;
            if last_percent != Some(percent) && percent % 10 == 0 {
                info!("   {:>3}% (pass {}/{})", percent, current.pass, current.passes);
                last_percent = Some(percent);
            }
        }
    });

    let report = job.wait().await?;
    reporter.await?;

    info!("✅ Wrote {:?}: {} frames, {} bytes", report.path, report.frames, report.bytes);
    Ok(())
}
