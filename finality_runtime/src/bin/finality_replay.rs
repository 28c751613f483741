//! finality-replay: rebuild a Core and report it.
//!
//! `replay` takes a binary operation log or a JSON array of envelopes and
//! replays it twice to check determinism. `session` opens a relay session
//! directory the way a running relay would (snapshot plus log tail).

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use finality_kernel::{Address, Authority, Core, OperationEnvelope, H256};
use finality_runtime::operation_log::read_log;
use finality_runtime::replay::{consensus_of, rebuild_core, verify_determinism};
use finality_runtime::{RelaySession, RuntimeConfig, RuntimeError, RuntimeResult};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    /// `.json` files are envelopes, everything else a binary log
    Auto,
    Json,
    Log,
}

#[derive(Parser)]
#[command(name = "finality-replay")]
#[command(about = "Rebuild a finality Core and print its state", long_about = None)]
#[command(version)]
struct Cli {
    /// Fail unless the final state hash equals this value
    #[arg(long, global = true)]
    expect_hash: Option<H256>,

    /// Log level
    #[arg(long, env = "FINALITY_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay an operation stream from scratch
    Replay {
        /// Operation log or JSON envelope file
        input: PathBuf,

        #[arg(long, value_enum, default_value = "auto")]
        format: Format,

        /// Consensus authority; defaults to the caller of the first operation
        #[arg(long)]
        consensus: Option<Address>,
    },

    /// Open a relay session directory
    Session {
        /// Runtime configuration file (JSON)
        #[arg(short, long, env = "FINALITY_CONFIG")]
        config: PathBuf,

        /// Overrides `data_dir` from the config file
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Overrides `session_id` from the config file
        #[arg(long)]
        session_id: Option<String>,
    },
}

fn load(input: &Path, format: Format) -> RuntimeResult<Vec<OperationEnvelope>> {
    let json = match format {
        Format::Json => true,
        Format::Log => false,
        Format::Auto => input.extension().is_some_and(|ext| ext == "json"),
    };
    if json {
        let content = fs::read_to_string(input)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        read_log(input)
    }
}

fn report(core: &Core, hash: &H256) {
    println!("sequence:     {}", core.last_sequence());
    println!("status:       {}", core.status());
    println!("height:       {}", core.height());
    println!("dynasty:      {}", core.dynasty());
    println!("validators:   {}", core.validators().count());
    println!("kernel hash:  {}", core.latest_kernel_hash());
    if let Some(fault) = core.fault() {
        println!("fault:        {}", fault);
    }
    println!("state hash:   {}", hash);
}

fn run(cli: &Cli) -> RuntimeResult<H256> {
    match &cli.command {
        Commands::Replay {
            input,
            format,
            consensus,
        } => {
            let envelopes = load(input, *format)?;
            let consensus = consensus
                .map(Authority::new)
                .or_else(|| consensus_of(&envelopes))
                .unwrap_or(Authority::new(Address::ZERO));

            let hash = verify_determinism(consensus, &envelopes)?;
            let (core, _) = rebuild_core(consensus, &envelopes)?;
            println!("operations:   {}", envelopes.len());
            report(&core, &hash);
            Ok(hash)
        }
        Commands::Session {
            config,
            data_dir,
            session_id,
        } => {
            let mut cfg = RuntimeConfig::load(config)?;
            if let Some(dir) = data_dir {
                cfg.data_dir = dir.clone();
            }
            if let Some(id) = session_id {
                cfg.session_id = id.clone();
            }
            let session = RelaySession::open(&cfg)?;
            let hash = session.current_hash()?;
            println!("session:      {}", session.session_id());
            report(session.core(), &hash);
            Ok(hash)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = run(&cli).and_then(|hash| match cli.expect_hash {
        Some(expected) if expected != hash => Err(RuntimeError::ReplayDivergence {
            first: expected,
            second: hash,
        }),
        _ => Ok(hash),
    });

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Replay failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
