//! # aetheric-runtime
//!
//! Runs a Lua script tree in a window, reloading it on every save.
//!
//! ```bash
//! aetheric-runtime --config runtime.toml
//! aetheric-runtime --script-root game/
//! aetheric-runtime --script-root game/ --headless --frames 600
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use aetheric_runtime::{EngineBuilder, EngineResult, RuntimeConfig};

#[derive(Parser)]
#[command(name = "aetheric-runtime")]
#[command(about = "Script-driven frame runtime with hot reload")]
#[command(version)]
struct Cli {
    /// Config file (missing file: defaults)
    #[arg(short, long, default_value = "runtime.toml")]
    config: PathBuf,

    /// Script directory, overrides the config's `script_root`
    #[arg(short, long)]
    script_root: Option<PathBuf>,

    /// Run without a window
    #[arg(long)]
    headless: bool,

    /// Frames to run in headless mode
    #[arg(long, default_value_t = 600, requires = "headless")]
    frames: u64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match RuntimeConfig::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("aetheric-runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_filter.as_str()),
    )
    .init();

    match run(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, mut config: RuntimeConfig) -> EngineResult<()> {
    if let Some(root) = cli.script_root {
        config.script_root = root;
    }

    let mut engine = EngineBuilder::new().with_config(config).build()?;

    if cli.headless {
        let summaries = engine.run_headless(cli.frames);
        let faulted = summaries.iter().filter(|s| s.banner.is_some()).count();
        let reloads = summaries.iter().filter(|s| s.reloaded).count();
        info!(
            "Headless run finished: {} frames, {faulted} with an error banner, {reloads} reloads, {} faults",
            summaries.len(),
            engine.context().diagnostics.fault_count()
        );
        engine.shutdown();
        return Ok(());
    }

    engine.run()
}
