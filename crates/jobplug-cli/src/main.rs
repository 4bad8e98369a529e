mod report;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use jobplug::{DylibBinder, Engine, EngineConfig, EngineError, TokenPolicy};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "jobplug", version, about = "Inspect job plugin manifests")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a manifest and list categories, jobs, mappings and modules
    Inspect {
        #[command(flatten)]
        load: LoadArgs,
        #[arg(long)]
        json: bool,
    },
    /// Show the prototype and mappings registered for one job type
    Resolve {
        #[command(flatten)]
        load: LoadArgs,
        job_type: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct LoadArgs {
    #[arg(long)]
    manifest: PathBuf,
    /// Module search directory; repeatable, overrides the manifest's list
    #[arg(long = "search-dir")]
    search_dirs: Vec<PathBuf>,
    /// Reject malformed manifest entries instead of dropping them
    #[arg(long)]
    strict: bool,
}

impl LoadArgs {
    fn load(&self) -> anyhow::Result<Engine> {
        let config = EngineConfig::load()?;
        debug!("Engine config: {:?}", config);

        let mut builder = Engine::builder(&self.manifest)
            .config(config)
            .binder(std::sync::Arc::new(DylibBinder));
        if !self.search_dirs.is_empty() {
            builder = builder.search_directories(self.search_dirs.iter().cloned());
        }
        if self.strict {
            builder = builder.token_policy(TokenPolicy::Strict);
        }
        Ok(builder.build()?)
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Inspect { load, json } => {
            let engine = load.load()?;
            let summary = engine.summary();
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", report::render_summary(&summary));
            }
        }
        Command::Resolve {
            load,
            job_type,
            json,
        } => {
            let engine = load.load()?;
            let resolution = report::resolve(&engine, &job_type)
                .ok_or_else(|| anyhow::anyhow!("job type {} is not registered", job_type))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&resolution)?);
            } else {
                print!("{}", report::render_resolution(&resolution));
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            let code = err
                .downcast_ref::<EngineError>()
                .map(|e| e.kind().code())
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}
