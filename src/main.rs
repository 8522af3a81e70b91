use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use lansweep::{
    api, NmapExecutor, Orchestrator, ProbeRunner, ProfileCatalog, ServiceConfig,
};

/// Private-network discovery service driving nmap over HTTP
#[derive(Debug, Parser)]
#[command(name = "lansweep", version, about)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, env = "LANSWEEP_LISTEN")]
    listen: Option<SocketAddr>,

    /// Service configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Profile catalog replacing the built-in profiles (TOML)
    #[arg(short, long, value_name = "FILE")]
    profiles: Option<PathBuf>,

    /// Path to the nmap binary
    #[arg(long, value_name = "PATH")]
    nmap_path: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<ServiceConfig> {
    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    config.apply_env()?;

    if let Some(listen) = cli.listen {
        config.listen_addr = listen;
    }
    if let Some(path) = &cli.profiles {
        config.profiles_path = Some(path.clone());
    }
    if let Some(nmap) = &cli.nmap_path {
        config.nmap_path = nmap.clone();
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli).context("invalid configuration")?;

    let catalog = match &config.profiles_path {
        Some(path) => ProfileCatalog::from_file(path)
            .with_context(|| format!("cannot load profiles from {}", path.display()))?,
        None => ProfileCatalog::builtin(),
    };
    log::info!(
        "Loaded {} scan profiles; max hosts {}, request budget {}ms",
        catalog.len(),
        config
            .max_hosts
            .map_or_else(|| "unlimited".to_string(), |n| n.to_string()),
        config.request_budget_ms
    );

    let probe = Arc::new(ProbeRunner::new(NmapExecutor::from_config(&config)));
    let orchestrator = Orchestrator::new(probe, Arc::new(catalog), &config);

    api::start_server(config.listen_addr, orchestrator).await
}
