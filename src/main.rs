use std::collections::BTreeMap;
use std::process::ExitCode;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use wb_domain::KnowledgeBase;
use wb_pipeline::{PipelineRequest, RunSummary};
use workbench_rust::bootstrap::{self, Service};
use workbench_rust::{telemetry, AppConfig};

#[derive(Parser)]
#[command(name = "workbench", version, about = "Staged lexicon -> calculation -> interpretation pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Levanta uno de los servicios HTTP.
    Serve {
        #[arg(value_enum)]
        service: ServiceArg,
        /// Puerto; por defecto `PORT` o 8000.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Ejecuta un run y lo imprime como JSON.
    Run {
        #[arg(long)]
        term: String,
        /// Parámetro `nombre=valor`; repetible.
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, f64)>,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        /// Usa los servicios configurados en vez de las etapas locales.
        #[arg(long)]
        remote: bool,
    },
    /// Lista las entradas de la base de conocimiento.
    Entities,
}

#[derive(Clone, Copy, ValueEnum)]
enum ServiceArg {
    Lexicon,
    Calculation,
    Interpretation,
    Gateway,
}

impl From<ServiceArg> for Service {
    fn from(arg: ServiceArg) -> Self {
        match arg {
            ServiceArg::Lexicon => Service::Lexicon,
            ServiceArg::Calculation => Service::Calculation,
            ServiceArg::Interpretation => Service::Interpretation,
            ServiceArg::Gateway => Service::Gateway,
        }
    }
}

fn parse_param(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = raw.split_once('=')
                           .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let value: f64 = value.trim()
                          .parse()
                          .map_err(|e| format!("invalid value for '{name}': {e}"))?;
    Ok((name.trim().to_string(), value))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    telemetry::init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::from_env().context("invalid configuration")?;

    match cli.command {
        Command::Serve { service, port } => {
            let service = Service::from(service);
            let router = bootstrap::service_router(service, &config)?;
            bootstrap::serve(service, router, port.unwrap_or(config.port)).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { term,
                       params,
                       width,
                       height,
                       remote, } => {
            let orchestrator = if remote {
                bootstrap::remote_orchestrator(&config, config.require_endpoints()?)?
            } else {
                bootstrap::local_orchestrator(&config, bootstrap::load_knowledge_base(&config)?)?
            };
            let request = PipelineRequest { term,
                                            parameters: params.into_iter().collect::<BTreeMap<_, _>>(),
                                            width,
                                            height };
            let run = orchestrator.run(request).await?;
            let summary = RunSummary::from_run(&run);
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(if summary.is_completed() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Command::Entities => {
            let kb = bootstrap::load_knowledge_base(&config)?;
            let entries = kb.entries();
            if entries.is_empty() {
                return Err(anyhow!("knowledge base {} is empty", kb.version()));
            }
            println!("{}", serde_json::to_string_pretty(&entries)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}
