// SPDX-License-Identifier: GPL-3.0-only

use clap::{Args, Parser, Subcommand};
use qr_scanner::Config;
use qr_scanner::backends::camera::LensFacing;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "qr-scanner")]
#[command(about = "Scan QR codes with a camera")]
#[command(version = env!("GIT_VERSION"))]
#[command(subcommand_required = false)]
struct Cli {
    #[command(flatten)]
    camera: CameraArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Clone, Default)]
struct CameraArgs {
    /// Camera device node to use (e.g. /dev/video2)
    #[arg(long, global = true)]
    camera: Option<String>,

    /// Start with the front camera
    #[arg(long, global = true)]
    front: bool,

    /// Turn the torch on at start
    #[arg(long, global = true)]
    torch: bool,

    /// Scan an image file instead of a camera
    #[arg(long, global = true, value_name = "IMAGE")]
    source: Option<PathBuf>,

    /// Configuration file (default: ~/.config/qr-scanner/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan continuously (default)
    Scan {
        /// Print payloads to stdout instead of running the terminal UI
        #[arg(long)]
        headless: bool,

        /// Exit after the first payload (headless only)
        #[arg(long, requires = "headless")]
        once: bool,
    },

    /// List available cameras
    List,

    /// Decode QR codes in an image file
    Decode {
        /// Image to decode
        image: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let interactive = matches!(cli.command, None | Some(Commands::Scan { headless: false, .. }));
    init_logging(interactive);

    let config = load_config(&cli.camera)?;
    let source = cli.camera.source;

    match cli.command {
        Some(Commands::Scan {
            headless: true,
            once,
        }) => cli::scan_headless(config, source, once),
        Some(Commands::Scan { headless: false, .. }) | None => cli::scan_interactive(config, source),
        Some(Commands::List) => cli::list_cameras(),
        Some(Commands::Decode { image }) => cli::decode_image(&image),
    }
}

/// Read the config file, then apply command line overrides
fn load_config(args: &CameraArgs) -> Result<Config, Box<dyn std::error::Error>> {
    // An explicitly named file must be valid
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };

    if let Some(device) = &args.camera {
        config.camera_device = Some(device.clone());
    }
    if args.front {
        config.lens_facing = LensFacing::Front;
    }
    if args.torch {
        config.torch_on_start = true;
    }
    Ok(config)
}

/// Set up tracing
///
/// Set RUST_LOG to control the level, e.g. RUST_LOG=qr_scanner=debug. The
/// terminal UI owns the screen, so interactive mode logs to a file.
fn init_logging(interactive: bool) {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    if interactive && let Some(file) = open_log_file() {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .with_target(true)
            .init();
        return;
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .init();
}

fn open_log_file() -> Option<std::fs::File> {
    let path = Config::log_file_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok()?;
    }
    std::fs::OpenOptions::new().create(true).append(true).open(path).ok()
}
