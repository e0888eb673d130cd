use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;

use stratus_core::{CancellationToken, PollError, ProviderError};
use stratus_provider_huaweicloud::cae::{ComponentAction, ComponentScope};
use stratus_provider_huaweicloud::config::ProviderConfig;
use stratus_provider_huaweicloud::cph::{BatchReport, CreateServerRequest, PhoneAction};
use stratus_provider_huaweicloud::{HuaweiCloudProvider, Waits};

/// Exit status after Ctrl-C, as shells report for SIGINT
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser)]
#[command(name = "stratus")]
#[command(about = "Drive Huawei Cloud phone and CAE operations to completion", long_about = None)]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Region, e.g. cn-north-4
    #[arg(long, global = true)]
    region: Option<String>,

    #[arg(long, global = true)]
    project_id: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    insecure: bool,

    /// Overall timeout in seconds for every wait
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Log every status check
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cloud phone servers and phones
    Cph {
        #[command(subcommand)]
        command: CphCommands,
    },
    /// CAE components
    Cae {
        #[command(subcommand)]
        command: CaeCommands,
    },
    /// Billing orders
    Order {
        #[command(subcommand)]
        command: OrderCommands,
    },
}

#[derive(Subcommand)]
enum CphCommands {
    Server {
        #[command(subcommand)]
        command: ServerCommands,
    },
    Phone {
        #[command(subcommand)]
        command: PhoneCommands,
    },
}

#[derive(Subcommand)]
enum ServerCommands {
    /// Create a server and wait until it is ready
    Create {
        /// JSON file with the create request
        #[arg(long)]
        file: PathBuf,
    },
    /// Show a server
    Show { id: String },
    /// Rename a server
    Rename { id: String, name: String },
    /// Unsubscribe a server and wait until it is released
    Delete { id: String },
}

#[derive(Subcommand)]
enum PhoneCommands {
    /// Restart phones and wait for the jobs
    Restart {
        #[arg(required = true)]
        phone_ids: Vec<String>,
    },
    /// Stop phones and wait for the jobs
    Stop {
        #[arg(required = true)]
        phone_ids: Vec<String>,
    },
    /// Reset phones and wait for the jobs
    Reset {
        #[arg(required = true)]
        phone_ids: Vec<String>,
    },
}

#[derive(clap::Args)]
struct ComponentArgs {
    #[arg(long)]
    environment: String,

    #[arg(long)]
    application: String,

    id: String,
}

impl ComponentArgs {
    fn scope(&self) -> ComponentScope {
        ComponentScope::new(self.environment.as_str(), self.application.as_str())
    }
}

#[derive(Subcommand)]
enum CaeCommands {
    Component {
        #[command(subcommand)]
        command: ComponentCommands,
    },
}

#[derive(Subcommand)]
enum ComponentCommands {
    /// Show a component
    Show(ComponentArgs),
    /// Delete a component and wait until it is gone
    Delete(ComponentArgs),
    /// Deploy a component and wait for the job
    Deploy {
        #[command(flatten)]
        args: ComponentArgs,

        /// Run an upgrade instead of a deploy
        #[arg(long)]
        upgrade: bool,
    },
}

#[derive(Subcommand)]
enum OrderCommands {
    /// Show the current status of an order
    Show { order_id: String },
    /// Wait for an order to complete
    Wait { order_id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let token = CancellationToken::new();
    let watcher = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupted, cancelling...".yellow());
            watcher.cancel();
        }
    });

    if let Err(e) = run(cli, token).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(if is_cancelled(&e) { EXIT_CANCELLED } else { 1 });
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = format!(
        "stratus={0},stratus_core={0},stratus_provider_huaweicloud={0}",
        level
    );
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
}

fn is_cancelled(e: &anyhow::Error) -> bool {
    e.downcast_ref::<ProviderError>()
        .and_then(|p| p.cause_as::<PollError>())
        .is_some_and(|p| p.is_cancelled())
}

fn load_config(cli: &Cli) -> Result<ProviderConfig> {
    let file = match &cli.config {
        Some(path) => ProviderConfig::from_file(path)?,
        None => ProviderConfig::default(),
    };
    let flags = ProviderConfig {
        region: cli.region.clone(),
        project_id: cli.project_id.clone(),
        insecure: cli.insecure.then_some(true),
        ..Default::default()
    };
    Ok(file.merge(ProviderConfig::from_env()).merge(flags))
}

async fn run(cli: Cli, token: CancellationToken) -> Result<()> {
    let config = load_config(&cli)?;
    log::debug!("Loaded {:?}", config);
    let mut waits = Waits::default();
    if let Some(secs) = cli.timeout {
        waits = waits.with_timeout(Duration::from_secs(secs));
    }
    let provider = HuaweiCloudProvider::new(config)?
        .with_waits(waits)
        .with_cancellation(token);

    match cli.command {
        Commands::Cph { command } => match command {
            CphCommands::Server { command } => run_server(&provider, command).await,
            CphCommands::Phone { command } => run_phone(&provider, command).await,
        },
        Commands::Cae {
            command: CaeCommands::Component { command },
        } => run_component(&provider, command).await,
        Commands::Order { command } => run_order(&provider, command).await,
    }
}

async fn run_order(provider: &HuaweiCloudProvider, command: OrderCommands) -> Result<()> {
    let orders = provider.orders()?;
    match command {
        OrderCommands::Show { order_id } => {
            let info = orders.get(&order_id).await?;
            println!("Order {} status {}", info.order_id, info.status);
        }
        OrderCommands::Wait { order_id } => {
            let info = orders.wait_complete(&order_id).await?;
            println!(
                "{} Order {} completed (status {})",
                "✓".green(),
                info.order_id,
                info.status
            );
        }
    }
    Ok(())
}

fn read_request(file: &Path) -> Result<CreateServerRequest> {
    let content =
        fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid request in {}", file.display()))
}

async fn run_server(provider: &HuaweiCloudProvider, command: ServerCommands) -> Result<()> {
    let servers = provider.cph_servers()?;
    match command {
        ServerCommands::Create { file } => {
            let request = read_request(&file)?;
            println!(
                "{}",
                format!("Creating CPH server {}...", request.server_name).cyan()
            );
            let server = servers.create(&request).await?;
            println!("{} CPH server {} is ready", "✓".green(), server.server_id);
            println!("{}", serde_json::to_string_pretty(&server)?);
        }
        ServerCommands::Show { id } => match servers.read(&id).await? {
            Some(server) => println!("{}", serde_json::to_string_pretty(&server)?),
            None => bail!("CPH server {} not found", id),
        },
        ServerCommands::Rename { id, name } => {
            servers.rename(&id, &name).await?;
            println!("{} CPH server {} renamed to {}", "✓".green(), id, name);
        }
        ServerCommands::Delete { id } => {
            println!("{}", format!("Deleting CPH server {}...", id).cyan());
            servers.delete(&id).await?;
            println!("{} CPH server {} deleted", "✓".green(), id);
        }
    }
    Ok(())
}

async fn run_phone(provider: &HuaweiCloudProvider, command: PhoneCommands) -> Result<()> {
    let (action, phone_ids) = match command {
        PhoneCommands::Restart { phone_ids } => (PhoneAction::Restart, phone_ids),
        PhoneCommands::Stop { phone_ids } => (PhoneAction::Stop, phone_ids),
        PhoneCommands::Reset { phone_ids } => (PhoneAction::Reset, phone_ids),
    };
    let report = provider.cph_phones()?.run(action, &phone_ids).await?;
    print_batch_report(action, &report);
    if !report.failed.is_empty() {
        bail!(
            "{} of {} phones failed to {}",
            report.failed.len(),
            phone_ids.len(),
            action
        );
    }
    Ok(())
}

fn print_batch_report(action: PhoneAction, report: &BatchReport) {
    for phone in &report.completed {
        println!("  {} {} {}", "✓".green(), action, phone);
    }
    for job in &report.rejected {
        println!(
            "  {} {} {} skipped - {} {}",
            "!".yellow(),
            action,
            job.phone_id,
            job.error_code.as_deref().unwrap_or_default(),
            job.error_msg.as_deref().unwrap_or_default()
        );
    }
    for job in &report.failed {
        println!("  {} {} {} - {}", "✗".red(), action, job.phone_id, job.error);
    }
}

async fn run_component(provider: &HuaweiCloudProvider, command: ComponentCommands) -> Result<()> {
    let components = provider.cae_components()?;
    match command {
        ComponentCommands::Show(args) => match components.get(&args.scope(), &args.id).await? {
            Some(component) => println!("{}", serde_json::to_string_pretty(&component)?),
            None => bail!("CAE component {} not found", args.id),
        },
        ComponentCommands::Delete(args) => {
            println!("{}", format!("Deleting CAE component {}...", args.id).cyan());
            components.delete(&args.scope(), &args.id).await?;
            println!("{} CAE component {} deleted", "✓".green(), args.id);
        }
        ComponentCommands::Deploy { args, upgrade } => {
            let action = if upgrade {
                ComponentAction::Upgrade
            } else {
                ComponentAction::Deploy
            };
            println!("{}", format!("Deploying CAE component {}...", args.id).cyan());
            let job_id = components
                .deploy(&args.scope(), &args.id, action, None)
                .await?;
            println!(
                "{} CAE component {} deployed (job {})",
                "✓".green(),
                args.id,
                job_id
            );
        }
    }
    Ok(())
}
