use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use dfs::config::AppConfig;
use dfs::logging::{self, LogConfig};
use dfs::naming::{NamingServer, RegistrationStub, Service, ServiceStub};
use dfs::path::Path;
use dfs::storage::{Storage, StorageServer};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Largest single read or write issued by `cat` and `put`.
const CHUNK_SIZE: u64 = 64 * 1024;

#[derive(Parser)]
#[command(name = "dfs")]
#[command(about = "Distributed filesystem servers and client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./dfs.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, short, global = true)]
    verbose: bool,

    #[arg(long, global = true)]
    json_logs: bool,

    #[command(flatten)]
    naming: NamingArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the naming server
    Naming,
    /// Run a storage server
    Storage(StorageArgs),
    /// List a directory
    Ls { path: Path },
    /// Create a directory
    Mkdir { path: Path },
    /// Create an empty file
    Touch { path: Path },
    /// Print a file to stdout
    Cat { path: Path },
    /// Copy a local file into the filesystem
    Put { local: PathBuf, path: Path },
    /// Print the effective configuration
    Config,
}

#[derive(Args, Serialize, Clone, Default)]
struct NamingArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long = "naming-host", global = true)]
    host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long = "naming-bind", global = true)]
    bind: Option<IpAddr>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    service_port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    registration_port: Option<u16>,
}

#[derive(Args, Serialize, Clone, Default)]
struct StorageArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    root: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    hostname: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    bind: Option<IpAddr>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    client_port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    command_port: Option<u16>,
}

#[derive(Serialize, Default)]
struct LogArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    json: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    verbose: Option<bool>,
}

/// Command-line values layered over the file and environment.
#[derive(Serialize)]
struct Overrides {
    naming: NamingArgs,
    storage: StorageArgs,
    log: LogArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = Overrides {
        naming: cli.naming.clone(),
        storage: match &cli.command {
            Commands::Storage(args) => args.clone(),
            _ => StorageArgs::default(),
        },
        log: LogArgs {
            json: cli.json_logs.then_some(true),
            verbose: cli.verbose.then_some(true),
        },
    };
    let config = AppConfig::new(cli.config.as_deref(), Some(overrides))
        .context("Failed to load configuration")?;

    logging::init(LogConfig::from(&config.log));

    match cli.command {
        Commands::Naming => run_naming(&config).await.context("Naming server failed")?,
        Commands::Storage(_) => run_storage(&config).await.context("Storage server failed")?,
        Commands::Ls { path } => run_ls(&service(&config)?, path).await?,
        Commands::Mkdir { path } => run_mkdir(&service(&config)?, path).await?,
        Commands::Touch { path } => run_touch(&service(&config)?, path).await?,
        Commands::Cat { path } => run_cat(&service(&config)?, path).await?,
        Commands::Put { local, path } => run_put(&service(&config)?, local, path).await?,
        Commands::Config => println!("{}", config.to_toml().context("Failed to render configuration")?),
    }

    Ok(())
}

fn service(config: &AppConfig) -> Result<ServiceStub> {
    ServiceStub::new(config.naming.service_address()).context("Invalid naming server address")
}

async fn run_naming(config: &AppConfig) -> Result<()> {
    let server = NamingServer::new(
        config.naming.service_bind(),
        config.naming.registration_bind(),
        config.rpc.listener_options(),
    )?;
    server.start()?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");
    server.stop().await;
    Ok(())
}

async fn run_storage(config: &AppConfig) -> Result<()> {
    let settings = &config.storage;
    let server = StorageServer::new(
        &settings.root,
        settings.bind,
        settings.client_port,
        settings.command_port,
        config.rpc.listener_options(),
    )?;
    let naming = RegistrationStub::new(config.naming.registration_address())?;
    server.start(&settings.hostname, &naming).await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");
    server.stop().await;
    Ok(())
}

async fn run_ls(service: &ServiceStub, path: Path) -> Result<()> {
    if !service.is_directory(path.clone()).await? {
        println!("{}", path);
        return Ok(());
    }
    for name in service.list(path).await? {
        println!("{}", name);
    }
    Ok(())
}

async fn run_mkdir(service: &ServiceStub, path: Path) -> Result<()> {
    if !service.create_directory(path.clone()).await? {
        bail!("{} already exists", path);
    }
    Ok(())
}

async fn run_touch(service: &ServiceStub, path: Path) -> Result<()> {
    if !service.create_file(path.clone()).await? {
        bail!("{} already exists", path);
    }
    Ok(())
}

async fn run_cat(service: &ServiceStub, path: Path) -> Result<()> {
    let storage = service.get_storage(path.clone()).await?;
    let size = storage.size(path.clone()).await?;

    let mut stdout = tokio::io::stdout();
    let mut offset = 0;
    while offset < size {
        let length = CHUNK_SIZE.min(size - offset);
        let data = storage.read(path.clone(), offset, length).await?;
        stdout.write_all(&data).await?;
        offset += length;
    }
    stdout.flush().await?;
    Ok(())
}

async fn run_put(service: &ServiceStub, local: PathBuf, path: Path) -> Result<()> {
    let data = tokio::fs::read(&local)
        .await
        .with_context(|| format!("Failed to read {}", local.display()))?;

    if !service.create_file(path.clone()).await? {
        bail!("{} already exists", path);
    }
    let storage = service.get_storage(path.clone()).await?;

    let mut offset = 0;
    for chunk in data.chunks(CHUNK_SIZE as usize) {
        storage.write(path.clone(), offset, chunk.to_vec()).await?;
        offset += chunk.len() as u64;
    }
    info!(path = %path, bytes = data.len(), storage = %storage.address(), "Stored file");
    Ok(())
}
