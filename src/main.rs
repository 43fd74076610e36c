//! sketchbox - render, replay and verify deterministic sketches.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use wasm_sketch_sandbox_rs::cli::{self, RunOptions};
use wasm_sketch_sandbox_rs::protocol::version_string;
use wasm_sketch_sandbox_rs::{RemoteRenderer, SandboxConfig, SketchSandbox, SnapshotRenderer};

#[derive(Parser, Debug)]
#[command(name = "sketchbox")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Sandbox configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Renderer used for run, replay and verify
    #[arg(long, global = true, value_enum, default_value_t = RendererKind::Local)]
    renderer: RendererKind,

    /// Remote render service base URL
    #[arg(long, global = true, default_value = "http://localhost:3000")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum RendererKind {
    Local,
    Remote,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render a sketch to PNG and write its snapshot
    Run {
        /// Sketch source (WAT)
        file: PathBuf,

        #[arg(long, default_value_t = 0)]
        seed: i64,

        /// Comma-separated VAR values in 0..=100
        #[arg(long, default_value = "")]
        vars: String,

        #[arg(long, default_value_t = 512)]
        width: u32,

        #[arg(long, default_value_t = 512)]
        height: u32,

        /// Embed the source in the snapshot
        #[arg(long)]
        include_code: bool,

        /// Output PNG path [default: <file>.png]
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Re-render a snapshot
    Replay {
        snapshot: PathBuf,

        /// Sketch source, when the snapshot has none embedded
        #[arg(long)]
        code: Option<PathBuf>,

        #[arg(short, long, default_value = "replay.png")]
        out: PathBuf,
    },

    /// Check that a snapshot reproduces; exits 1 on mismatch
    Verify {
        snapshot: PathBuf,

        #[arg(long)]
        code: Option<PathBuf>,
    },
}

fn renderer(cli: &Cli, config: &SandboxConfig) -> Result<Box<dyn SnapshotRenderer>> {
    let renderer: Box<dyn SnapshotRenderer> = match cli.renderer {
        RendererKind::Local => Box::new(SketchSandbox::new(config.clone())?),
        RendererKind::Remote => Box::new(RemoteRenderer::new(cli.endpoint.clone())),
    };
    Ok(renderer)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("wasm_sketch_sandbox_rs=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::debug!("sketchbox {}", version_string());
    let config = match &cli.config {
        Some(path) => SandboxConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SandboxConfig::default(),
    };
    let renderer = renderer(&cli, &config)?;

    match &cli.command {
        Commands::Run {
            file,
            seed,
            vars,
            width,
            height,
            include_code,
            out,
        } => {
            let source = std::fs::read_to_string(file)
                .with_context(|| format!("reading {}", file.display()))?;
            let out = out.clone().unwrap_or_else(|| file.with_extension("png"));
            let options = RunOptions {
                source,
                seed: *seed,
                vars: cli::parse_vars(vars)?,
                width: *width,
                height: *height,
                include_code: *include_code,
            };
            let outcome = cli::run_to_files(renderer.as_ref(), &config, options, &out).await?;
            println!("{}", outcome.image_path.display());
            println!("{}", outcome.snapshot_path.display());
            println!("outputHash {}", outcome.snapshot.output_hash);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Replay {
            snapshot,
            code,
            out,
        } => {
            let code = cli::read_code(code.as_deref())?;
            cli::replay_to_file(renderer.as_ref(), snapshot, code.as_deref(), out).await?;
            println!("{}", out.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Verify { snapshot, code } => {
            let code = cli::read_code(code.as_deref())?;
            let outcome = cli::verify_file(renderer.as_ref(), snapshot, code.as_deref()).await?;
            println!("{outcome}");
            if outcome.is_verified() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(1))
            }
        }
    }
}
