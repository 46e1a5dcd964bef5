use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use localup_health::{PgRecordCounter, check_health};
use localup_runtime::{Compose, ComposeProject, Runtime, Service, Stack, Standalone};
use tracing_subscriber::{EnvFilter, fmt};

mod config;

use config::LocalupConfig;

#[derive(Parser)]
#[command(name = "localup", about = "localup: provision local Storj test clusters")]
struct Cli {
    /// Config file (defaults to ./localup.toml, then ~/.config/localup/localup.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Provision services as local processes and write their launchers
    Standalone {
        /// Recipe stack (YAML)
        #[arg(long, short = 's')]
        stack: PathBuf,
        /// Cluster directory
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Checkout directory of the service sources
        #[arg(long)]
        project_dir: Option<PathBuf>,
        /// Keep existing instance directories
        #[arg(long)]
        no_clean: bool,
    },
    /// Render services into a compose file
    Compose {
        /// Recipe stack (YAML)
        #[arg(long, short = 's')]
        stack: PathBuf,
        /// Compose file to write; merged with its current services when it exists
        #[arg(long, short = 'o', default_value = "docker-compose.yaml")]
        output: PathBuf,
    },
    /// List services of a compose file
    List {
        #[arg(long, short = 'f', default_value = "docker-compose.yaml")]
        file: PathBuf,
    },
    /// Wait until the cluster database reports the expected number of records
    Health {
        /// Table to count
        #[arg(long, short = 't')]
        table: Option<String>,
        /// Expected record count
        #[arg(long, short = 'n')]
        number: Option<i64>,
        /// Seconds to wait before giving up, 0 waits forever
        #[arg(long, short = 'd')]
        duration: Option<u64>,
        /// Database connection URL
        #[arg(long)]
        database_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries command output
    fmt()
        .with_env_filter(EnvFilter::from_env("LOCALUP_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = LocalupConfig::discover(cli.config.as_deref())?;

    match cli.command {
        Command::Standalone {
            stack,
            dir,
            project_dir,
            no_clean,
        } => run_standalone(&config, &stack, dir, project_dir, no_clean),
        Command::Compose { stack, output } => run_compose(&config, &stack, &output),
        Command::List { file } => run_list(&file),
        Command::Health {
            table,
            number,
            duration,
            database_url,
        } => {
            let health = &config.health;
            let table = table.unwrap_or_else(|| health.table.clone());
            let number = number.unwrap_or(health.number);
            let timeout = match duration {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => health.timeout(),
            };
            let counter =
                PgRecordCounter::new(database_url.unwrap_or_else(|| health.database_url.clone()));
            check_health(&counter, &table, number, health.interval(), timeout).await?;
            println!("cluster is healthy: {table} has {number} records");
            Ok(())
        }
    }
}

fn run_standalone(
    config: &LocalupConfig,
    stack: &Path,
    dir: Option<PathBuf>,
    project_dir: Option<PathBuf>,
    no_clean: bool,
) -> Result<()> {
    let stack = Stack::from_file(stack)
        .with_context(|| format!("failed to load stack {}", stack.display()))?;
    let dir = dir.unwrap_or_else(|| config.runtime.dir.clone());
    let project_dir = project_dir.unwrap_or_else(|| config.runtime.project_dir.clone());

    let mut runtime =
        Standalone::new(&dir, &project_dir).with_clean(config.runtime.clean && !no_clean);
    if let Some(root) = config.build_root_identity()? {
        runtime = runtime.with_root_identity(root);
    }
    if let Some(grants) = config.build_access_grants() {
        runtime = runtime.with_access_grants(grants);
    }
    for (service, key, value) in config.variable_overrides() {
        runtime.set_variable(service, key, value);
    }

    tracing::info!(dir = %dir.display(), services = stack.services.len(), "Provisioning standalone cluster");
    for recipe in &stack.services {
        runtime
            .add_service(recipe)
            .with_context(|| format!("failed to add {}", recipe.name))?;
    }
    runtime.write()?;
    print_services(runtime.services())
}

fn run_compose(config: &LocalupConfig, stack: &Path, output: &Path) -> Result<()> {
    let stack = Stack::from_file(stack)
        .with_context(|| format!("failed to load stack {}", stack.display()))?;

    let mut runtime = Compose::new();
    if let Some(root) = config.build_root_identity()? {
        runtime = runtime.with_root_identity(root);
    }
    if let Some(grants) = config.build_access_grants() {
        runtime = runtime.with_access_grants(grants);
    }
    for (service, key, value) in config.variable_overrides() {
        runtime.set_variable(service, key, value);
    }
    for recipe in &stack.services {
        runtime
            .add_service(recipe)
            .with_context(|| format!("failed to add {}", recipe.name))?;
    }

    let mut project = if output.exists() {
        ComposeProject::load(output)?
    } else {
        ComposeProject::default()
    };
    project.services.extend(runtime.project().services);
    project.write(output)?;
    println!("{}", output.display());
    Ok(())
}

fn run_list(file: &Path) -> Result<()> {
    let project = ComposeProject::load(file)
        .with_context(|| format!("failed to load compose file {}", file.display()))?;
    for (name, service) in &project.services {
        println!("{name} {}", service.image.as_deref().unwrap_or("-"));
    }
    Ok(())
}

fn print_services(services: &[Service]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(services)?);
    Ok(())
}
