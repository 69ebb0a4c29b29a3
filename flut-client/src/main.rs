//! flut — pixel-flooding CLI client.
//!
//! ```text
//! flut image.png                          Stream one image
//! flut a.png b.png --duration-ms 500      Cycle an animation
//! flut image.png --scale 0.5 --dither     Half size, scattered fill-in
//! flut image.png --dry-run                Encode and "send" in memory
//! flut --gen-config                       Print the default config TOML
//! ```
//!
//! The client is UI glue around `flut-core`: it decodes images, owns the
//! TCP connection, and drives the sequencer's animation cadence. All
//! streaming mechanics live in the core.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use flut_core::{
    MemoryTransport, PixelGrid, SessionController, StreamParams, TcpTransport, Transport,
};

use crate::config::FlutConfig;

/// Cadence at which the sequencer is advanced and status is sampled.
const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Status lines are logged roughly every this many ticks.
const STATUS_EVERY_TICKS: u32 = 40;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "flut", about = "Streams images onto a pixel-flooding canvas server")]
struct Cli {
    /// Images to stream; more than one forms a cycled animation.
    images: Vec<PathBuf>,

    /// Server host (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Server TCP port (overrides config).
    #[arg(long)]
    port: Option<u16>,

    /// Resampling factor (overrides config).
    #[arg(long)]
    scale: Option<f32>,

    /// Canvas x origin for the OFFSET header.
    #[arg(long, default_value_t = 0)]
    offset_x: u32,

    /// Canvas y origin for the OFFSET header.
    #[arg(long, default_value_t = 0)]
    offset_y: u32,

    /// Number of parallel sender tasks (overrides config).
    #[arg(long)]
    workers: Option<usize>,

    /// Number of chunks per frame buffer; defaults to the worker count.
    #[arg(long)]
    chunks: Option<usize>,

    /// Randomize pixel transmission order (dithering).
    #[arg(long)]
    dither: bool,

    /// Per-frame duration in milliseconds (overrides config).
    #[arg(long)]
    duration_ms: Option<u64>,

    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "flut.toml")]
    config: PathBuf,

    /// Encode and stream into memory instead of a server.
    #[arg(long)]
    dry_run: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&FlutConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let config = FlutConfig::load(&cli.config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("flut v{}", env!("CARGO_PKG_VERSION"));

    if cli.images.is_empty() {
        return Err("no images given (see --help)".into());
    }

    // Decode up front; a bad file aborts before anything streams.
    let mut grids = Vec::with_capacity(cli.images.len());
    for path in &cli.images {
        let decoded = image::open(path)
            .map_err(|e| format!("cannot decode {}: {e}", path.display()))?
            .to_rgba8();
        let (width, height) = decoded.dimensions();
        info!(path = %path.display(), width, height, "image loaded");
        grids.push(Arc::new(PixelGrid::from_rgba8(
            width,
            height,
            decoded.as_raw(),
        )?));
    }

    let workers = cli.workers.unwrap_or(config.stream.workers);
    let params = StreamParams {
        grids,
        scale: cli.scale.unwrap_or(config.stream.scale),
        origin: (cli.offset_x, cli.offset_y),
        worker_count: workers,
        chunk_count: cli.chunks.unwrap_or(workers),
        shuffled: cli.dither || config.stream.dither,
        durations: vec![Duration::from_millis(
            cli.duration_ms.unwrap_or(config.stream.duration_ms),
        )],
    };

    // The connection is owned here, not by the streaming core.
    let memory = cli.dry_run.then(|| Arc::new(MemoryTransport::new()));
    let transport: Arc<dyn Transport> = match &memory {
        Some(memory) => {
            info!("dry run: streaming into memory");
            Arc::clone(memory) as Arc<dyn Transport>
        }
        None => {
            let host = cli.host.as_deref().unwrap_or(&config.network.host);
            let port = cli.port.unwrap_or(config.network.port);
            let transport = TcpTransport::connect((host, port)).await?;
            info!(server = %transport.peer_addr(), "connected");
            Arc::new(transport)
        }
    };

    let controller = SessionController::new(Arc::clone(&transport));
    controller.start(&params)?;

    // Cadence loop: advance the animation, sample status, wait for
    // Ctrl-C. The core only exposes pull-based queries, so this loop is
    // the one place wall time enters the system.
    let sequencer = controller.sequencer();
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    let mut last_tick = Instant::now();
    let mut ticks: u32 = 0;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Ctrl-C received — stopping stream");
                break;
            }
            _ = interval.tick() => {
                let now = Instant::now();
                sequencer.advance(now - last_tick);
                last_tick = now;

                ticks += 1;
                if ticks % STATUS_EVERY_TICKS == 0 {
                    let status = controller.status();
                    let (w, h) = status.frame_size.unwrap_or((0, 0));
                    let frame = format!("{w}x{h}");
                    info!(
                        running = status.running,
                        active_workers = status.active_workers,
                        frame,
                        "status"
                    );
                    if status.active_workers == 0 && !transport.is_connected() {
                        warn!("all workers dead and transport disconnected; reconnect and restart");
                    }
                }
            }
        }
    }

    controller.stop();
    // One poll interval of grace so workers observe the stop.
    tokio::time::sleep(Duration::from_millis(50)).await;

    if let Some(memory) = memory {
        info!(
            sends = memory.send_count(),
            bytes = memory.bytes_sent(),
            "dry run finished"
        );
    }

    Ok(())
}
