use clap::{CommandFactory, Parser};
use nord_collector::collection::CollectionPlugin;
use nord_collector::local::LocalPlugin;
use nord_collector::mail::MailPlugin;
use nord_collector::network::NetworkPlugin;
use nord_collector::remote::RemotePlugin;
use nord_collector::snmp::SnmpPlugin;
use nord_collector::sshcollect::SshCollectPlugin;
use nord_collector::{Controller, Registry};
use nord_common::config::Config;
use nord_flow::FlowPlugin;
use nord_storage::Store;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "data/config.json";

#[derive(Parser, Debug)]
#[command(name = "nord", about = "Nord Observability, Reliability & Discovery")]
struct Cli {
    /// Run data collection using the 'collection' plugin
    #[arg(long)]
    collect: bool,

    /// Run network discovery (perception) using the 'network' plugin
    #[arg(long)]
    perception: bool,

    /// Send collected data to remote server(s) using the 'api' plugin
    #[arg(long)]
    remote: bool,

    /// Start the text user interface
    #[arg(long)]
    ui: bool,

    /// Plugin to command
    #[arg(short = 'p', long)]
    plugin: Option<String>,

    /// Action to perform on the plugin
    #[arg(short = 'a', long)]
    action: Option<String>,

    /// Optional argument passed to the plugin action
    arg: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nord=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let store = open_store().await;
    let controller = Controller::new(build_registry(), store);

    println!("Nord Observability, Reliability & Discovery");

    if cli.ui {
        // The TUI is an external collaborator; when it is not registered
        // this reports plugin-not-found.
        dispatch(&controller, "textui", "start", None).await;
    }
    if cli.collect {
        dispatch(&controller, "collection", "collect", None).await;
    }
    if cli.perception {
        dispatch(&controller, "network", "perception", None).await;
    }
    if cli.remote {
        dispatch(&controller, "api", "send", None).await;
    }

    if let Some(plugin) = cli.plugin {
        let Some(action) = cli.action else {
            eprintln!("Error: No action specified for the plugin.");
            let _ = Cli::command().print_help();
            std::process::exit(1);
        };
        dispatch(&controller, &plugin, &action, cli.arg).await;
    }

    // No command selected.
    let _ = Cli::command().print_help();
}

/// Run one plugin command and exit with its status.
async fn dispatch(controller: &Controller, plugin: &str, action: &str, arg: Option<String>) {
    let mut args = HashMap::new();
    args.insert("action".to_string(), action.to_string());
    if let Some(arg) = arg {
        args.insert("args".to_string(), arg);
    }

    match controller.on_command(plugin, &args).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

/// Registration is an explicit list: what you see here is the full plugin
/// surface of the binary.
fn build_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(Arc::new(CollectionPlugin));
    registry.register(Arc::new(NetworkPlugin));
    registry.register(Arc::new(LocalPlugin));
    registry.register(Arc::new(MailPlugin));
    registry.register(Arc::new(SnmpPlugin));
    registry.register(Arc::new(SshCollectPlugin));
    registry.register(Arc::new(RemotePlugin));
    registry.register(Arc::new(FlowPlugin));
    registry
}

/// Open the store from the config's database section. Only that section is
/// parsed here so exotic collect shapes cannot break store startup.
async fn open_store() -> Option<Arc<Store>> {
    let database = Config::load_database(Path::new(CONFIG_PATH)).ok()?;
    if database.url.trim().is_empty() {
        return None;
    }
    match Store::open(&database.url).await {
        Ok(Some(store)) => {
            println!("Database connected: {}", database.url);
            Some(Arc::new(store))
        }
        Ok(None) => None,
        Err(e) => {
            println!("Warning: could not open database: {e}");
            None
        }
    }
}
