use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, subscriber::set_global_default};
use tracing_subscriber::filter::EnvFilter;
use zerosync_pipeline::{
    command::CommandOptions,
    download::Downloader,
    layout::{WorkspaceLayout, DEFAULT_PROOFS_URL},
    shutdown::Shutdown,
    stages, FailurePolicy, Pipeline, RunnerConfig, Sequencer,
};
use zerosync_program_input::{
    prepare_bootloader_input, prepare_increment_input, BootloaderInputFiles, IncrementInputFiles,
    PedersenHasher,
};

/// Zerosync → Starknet - verify the latest Zerosync header-chain proof in Cairo and on Starknet
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[command(flatten)]
    layout: LayoutArgs,
    /// Run later steps even if an earlier step failed
    #[arg(long, env = "ZEROSYNC_KEEP_GOING", default_value = "false")]
    keep_going: bool,
    /// Kill any external tool running longer than this many seconds
    #[arg(long, env = "ZEROSYNC_STEP_TIMEOUT_SECS")]
    step_timeout_secs: Option<u64>,
    /// Report peak memory of external tools (requires /usr/bin/time)
    #[arg(long, env = "ZEROSYNC_MEASURE_RESOURCES", default_value = "false")]
    measure_resources: bool,
    /// Logging level (off, error, warn, info, debug, trace)
    #[arg(long, env = "ZEROSYNC_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Args)]
struct LayoutArgs {
    /// Workspace directory, all other directories are relative to it
    #[arg(long, env = "ZEROSYNC_WORKSPACE", default_value = ".")]
    workspace: PathBuf,
    /// cairo-lang directory holding the simple bootloader
    #[arg(long, env = "ZEROSYNC_CAIRO_DIR", default_value = "cairo-lang")]
    cairo_dir: PathBuf,
    /// Stone prover directory holding the prover binary and its configuration
    #[arg(long, env = "ZEROSYNC_PROVER_DIR", default_value = "stone-prover/e2e_test")]
    prover_dir: PathBuf,
    /// Directory of the Starknet calldata tool and contract call script
    #[arg(long, env = "ZEROSYNC_STARKNET_DIR", default_value = "starknet")]
    starknet_dir: PathBuf,
    /// Manifest of the header-chain proof parser
    #[arg(
        long,
        env = "ZEROSYNC_PARSER_MANIFEST",
        default_value = "header_chain_parser/Cargo.toml"
    )]
    parser_manifest: PathBuf,
    /// Base URL of the published Zerosync proof pair
    #[arg(long, env = "ZEROSYNC_PROOFS_URL", default_value = DEFAULT_PROOFS_URL)]
    proofs_url: String,
    /// Cairo program runner
    #[arg(long, env = "ZEROSYNC_CAIRO_RUN", default_value = "cairo-run")]
    cairo_run: String,
    /// Stone prover binary, relative to the prover directory
    #[arg(long, env = "ZEROSYNC_PROVER", default_value = "cpu_air_prover")]
    prover: PathBuf,
    /// Cargo binary used for the parser and calldata tools, must accept `+nightly`
    #[arg(long, env = "ZEROSYNC_CARGO", default_value = "cargo")]
    cargo: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the increment program input from the previous proof
    IncrementInput {
        /// Compiled increment program [default: <workspace>/increment_batch.json]
        #[arg(long)]
        program: Option<PathBuf>,
        /// Previous proof [default: <workspace>/increment_batch_proof.json]
        #[arg(long)]
        prev_proof: Option<PathBuf>,
        /// Output file [default: <workspace>/increment_batch_input.json]
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Wrap a compiled program and its input into a simple bootloader input
    BootloaderInput {
        /// Compiled program [default: <workspace>/increment_batch.json]
        #[arg(long)]
        program: Option<PathBuf>,
        /// Program input [default: <workspace>/increment_batch_input.json]
        #[arg(long)]
        program_input: Option<PathBuf>,
        /// Output file [default: <cairo-dir>/simple_bootloader_input.json]
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Download the latest published Zerosync proof pair
    Fetch,
    /// Prepare the increment input and run the increment program
    Increment,
    /// Run the increment program in the bootloader and prove the execution
    Bootloader,
    /// Full flow: fetch, parse, bootload, prove and verify on Starknet
    Run,
}

impl LayoutArgs {
    fn into_layout(self) -> Result<WorkspaceLayout> {
        let root = self.workspace.canonicalize().map_err(|e| {
            anyhow!(
                "Workspace directory not found at '{}': {}",
                self.workspace.display(),
                e
            )
        })?;

        Ok(WorkspaceLayout {
            cairo_dir: self.cairo_dir,
            prover_dir: self.prover_dir,
            starknet_dir: self.starknet_dir,
            parser_manifest: self.parser_manifest,
            proofs_url: self.proofs_url,
            cairo_run: self.cairo_run,
            prover: self.prover,
            cargo: self.cargo,
            ..WorkspaceLayout::new(root)
        })
    }
}

fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber_builder =
        tracing_subscriber::fmt::Subscriber::builder().with_env_filter(env_filter);

    let subscriber = subscriber_builder.with_writer(std::io::stderr).finish();
    set_global_default(subscriber).expect("Failed to set subscriber");
}

async fn run_pipeline(pipeline: Pipeline, config: RunnerConfig) -> Result<bool> {
    let shutdown = Shutdown::default();
    let mut sequencer =
        Sequencer::new(config, Downloader::with_defaults()?).with_shutdown(shutdown.subscribe());
    tokio::spawn(async move { shutdown.run().await });

    let report = sequencer.run(&pipeline).await;
    for (description, err) in report.failures() {
        error!("{}: {}", description, err);
    }
    Ok(report.is_success())
}

async fn run(cli: Cli) -> Result<bool> {
    let layout = cli.layout.into_layout()?;
    let config = RunnerConfig {
        failure_policy: if cli.keep_going {
            FailurePolicy::KeepGoing
        } else {
            FailurePolicy::Halt
        },
        command: CommandOptions {
            timeout: cli.step_timeout_secs.map(Duration::from_secs),
            measure_resources: cli.measure_resources,
        },
    };

    match cli.command {
        Commands::IncrementInput {
            program,
            prev_proof,
            output,
        } => {
            let defaults = stages::increment_input_files(&layout);
            let files = IncrementInputFiles {
                program: program.unwrap_or(defaults.program),
                prev_proof: prev_proof.unwrap_or(defaults.prev_proof),
                output: output.unwrap_or(defaults.output),
            };
            let input = prepare_increment_input(&PedersenHasher, &files)?;
            info!("Increment program hash: {}", input.increment_program_hash);
            Ok(true)
        }
        Commands::BootloaderInput {
            program,
            program_input,
            output,
        } => {
            let defaults = stages::bootloader_input_files(&layout);
            let files = BootloaderInputFiles {
                program: program.unwrap_or(defaults.program),
                program_input: program_input.unwrap_or(defaults.program_input),
                output: output.unwrap_or(defaults.output),
            };
            prepare_bootloader_input(&files)?;
            Ok(true)
        }
        Commands::Fetch => run_pipeline(stages::fetch_pipeline(&layout), config).await,
        Commands::Increment => run_pipeline(stages::increment_pipeline(&layout), config).await,
        Commands::Bootloader => run_pipeline(stages::bootloader_pipeline(&layout), config).await,
        Commands::Run => run_pipeline(stages::zerosync_pipeline(&layout), config).await,
    }
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(cli).await {
        Ok(true) => {
            info!("Zerosync pipeline has exited without errors");
            std::process::exit(0);
        }
        Ok(false) => {
            error!("Zerosync pipeline has finished with failed steps");
            std::process::exit(1);
        }
        Err(err) => {
            error!("Zerosync pipeline has exited with error: {}", err);
            std::process::exit(1);
        }
    }
}
