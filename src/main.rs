//! mindcraft-launcher CLI.
//!
//! Headless front end for the orchestration core: install/update/uninstall
//! the external mindcraft-ce project, run and supervise its bot process, and
//! edit the configuration documents it owns.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

use mindcraft_launcher::agents::AgentLibrary;
use mindcraft_launcher::installer::{Installer, UpdateStatus};
use mindcraft_launcher::keys::KeysStore;
use mindcraft_launcher::metadata::MetadataStore;
use mindcraft_launcher::runner::{launch_spec_from_settings, Runner, RunnerEvent};
use mindcraft_launcher::settings::{LoggingConsent, SettingsStore};
use mindcraft_launcher::{ollama, paths};

#[derive(Parser)]
#[command(name = "mindcraft-launcher")]
#[command(about = "Installer and launcher for mindcraft-ce", version)]
struct Cli {
    /// Override the launcher's local data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show installation state and whether an update is available
    Status,

    /// Install or update mindcraft-ce
    Install,

    /// Remove the installation
    Uninstall,

    /// Start the bot process and stream its output (Ctrl-C stops it)
    Play,

    /// Inspect or edit settings.json
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },

    /// Inspect or edit keys.json
    Keys {
        #[command(subcommand)]
        command: KeysCommands,
    },

    /// Show or set the logging consent flag
    Consent {
        /// New value; omit to show the current one
        value: Option<bool>,
    },

    /// Manage agent profiles
    Agents {
        #[command(subcommand)]
        command: AgentCommands,
    },

    /// List models available from a local Ollama daemon
    Models {
        #[arg(long, default_value = ollama::DEFAULT_BASE_URL)]
        url: String,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Print the settings document
    Show,
    /// Set one key; the value is parsed as JSON when possible
    Set { key: String, value: String },
}

#[derive(Subcommand)]
enum KeysCommands {
    /// List configured API keys
    List,
    /// Set one API key
    Set { name: String, key: String },
}

#[derive(Subcommand)]
enum AgentCommands {
    /// List agent profiles and whether they are enabled
    List,
    /// Create a new agent from the default template
    Create { name: String },
    /// Delete an agent profile
    Remove { name: String },
    /// Add an agent to the enabled profiles
    Enable { name: String },
    /// Remove an agent from the enabled profiles
    Disable { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    fmt().with_env_filter(filter).with_target(false).init();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => paths::local_data_dir()?,
    };

    match cli.command {
        Commands::Status => show_status(data_dir).await,
        Commands::Install => run_install(data_dir).await,
        Commands::Uninstall => Installer::new(data_dir)?.uninstall().await,
        Commands::Play => run_play(data_dir).await,
        Commands::Settings { command } => handle_settings(data_dir, command).await,
        Commands::Keys { command } => handle_keys(data_dir, command).await,
        Commands::Consent { value } => handle_consent(data_dir, value).await,
        Commands::Agents { command } => handle_agents(data_dir, command).await,
        Commands::Models { url } => list_models(&url).await,
    }
}

fn metadata_store(data_dir: &std::path::Path) -> MetadataStore {
    MetadataStore::new(paths::metadata_path(data_dir))
}

async fn show_status(data_dir: PathBuf) -> Result<()> {
    let installer = Installer::new(data_dir)?;
    match installer.check().await? {
        UpdateStatus::NotInstalled { latest } => {
            println!("mindcraft-ce has not been installed.");
            println!("Latest available version: {latest}");
            println!("Run `mindcraft-launcher install` to begin installation.");
        }
        UpdateStatus::UpToDate { version } => {
            println!("Version: {version}");
            println!("You are using the latest version.");
        }
        UpdateStatus::UpdateAvailable { installed, latest } => {
            println!("Version: {installed}");
            println!("A new version is available: {latest}.");
            println!("Run `mindcraft-launcher install` to update.");
        }
    }
    Ok(())
}

async fn run_install(data_dir: PathBuf) -> Result<()> {
    let installer = Installer::new(data_dir)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            println!("{line}");
        }
    });

    let result = installer.install(tx).await;
    let _ = printer.await;

    let metadata = result?;
    println!("--- Installation Complete ---");
    if let Some(version) = metadata.version {
        println!("mindcraft-ce {version} is installed.");
    }
    Ok(())
}

async fn run_play(data_dir: PathBuf) -> Result<()> {
    let install_dir = metadata_store(&data_dir).require_installed().await?;

    // Missing settings behave like an empty document, defaults apply.
    let raw_settings = SettingsStore::new(&install_dir)
        .load_raw()
        .await
        .unwrap_or_default();
    let spec = launch_spec_from_settings(&install_dir, &raw_settings);

    let runner = Runner::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    runner.launch(spec, tx)?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("--- Stopping process ---");
                runner.stop();
            }
            event = rx.recv() => {
                match event {
                    Some(RunnerEvent::Started { pid, agents_online, host, port }) => {
                        println!("--- Bot process started (PID {pid}) ---");
                        println!("{agents_online} agent(s) online on {host}:{port}");
                    }
                    Some(RunnerEvent::Line(line)) => println!("{line}"),
                    Some(RunnerEvent::Remediation(fix)) => {
                        println!();
                        println!(" === Suggested Fix === ");
                        println!("{fix}");
                        println!();
                    }
                    Some(RunnerEvent::Exited { .. }) | None => {
                        println!("--- Process exited ---");
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}

async fn handle_settings(data_dir: PathBuf, command: SettingsCommands) -> Result<()> {
    let install_dir = metadata_store(&data_dir).require_installed().await?;
    let store = SettingsStore::new(&install_dir);
    match command {
        SettingsCommands::Show => {
            let raw = store.load_raw().await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::Value::Object(raw))?
            );
        }
        SettingsCommands::Set { key, value } => {
            store.set_value(&key, &value).await?;
            println!("{key} updated.");
        }
    }
    Ok(())
}

async fn handle_keys(data_dir: PathBuf, command: KeysCommands) -> Result<()> {
    let install_dir = metadata_store(&data_dir).require_installed().await?;
    let store = KeysStore::new(&install_dir);
    match command {
        KeysCommands::List => {
            for (name, value) in store.load().await? {
                let shown = match value.as_str() {
                    Some("") | None => "Not Set",
                    Some(_) => "Set",
                };
                println!("{name}: {shown}");
            }
        }
        KeysCommands::Set { name, key } => {
            store.set(&name, &key).await?;
            println!("{name} saved.");
        }
    }
    Ok(())
}

async fn handle_consent(data_dir: PathBuf, value: Option<bool>) -> Result<()> {
    let install_dir = metadata_store(&data_dir).require_installed().await?;
    match value {
        Some(consent) => {
            LoggingConsent { consent }.save(&install_dir).await?;
            println!("Logging consent set to {consent}.");
        }
        None => {
            let consent = LoggingConsent::load(&install_dir).await?;
            println!("Logging consent: {}", consent.consent);
        }
    }
    Ok(())
}

fn profile_file_name(name: &str) -> String {
    if name.ends_with(".json") {
        name.to_string()
    } else {
        format!("{name}.json")
    }
}

async fn handle_agents(data_dir: PathBuf, command: AgentCommands) -> Result<()> {
    let install_dir = metadata_store(&data_dir).require_installed().await?;
    let library = AgentLibrary::new(&install_dir);
    match command {
        AgentCommands::List => {
            let agents = library.list().await?;
            if agents.is_empty() {
                println!("No agent profiles found.");
                return Ok(());
            }
            for agent in &agents {
                let mark = if agent.enabled { "x" } else { " " };
                let model = agent.model();
                println!(
                    "[{mark}] {} ({}) model: {}",
                    agent.name(),
                    agent.file_name,
                    model.model_name().unwrap_or("unset"),
                );
            }
            let selected = agents.iter().filter(|a| a.enabled).count();
            println!("Agents ({selected} selected)");
        }
        AgentCommands::Create { name } => {
            let agent = library.create(&profile_file_name(&name)).await?;
            println!("Created agent {} ({}).", agent.name(), agent.file_name);
        }
        AgentCommands::Remove { name } => {
            library.remove(&profile_file_name(&name)).await?;
            println!("Removed agent {name}.");
        }
        AgentCommands::Enable { name } => {
            library
                .sync_enabled(&profile_file_name(&name), true)
                .await?;
            println!("Enabled agent {name}.");
        }
        AgentCommands::Disable { name } => {
            library
                .sync_enabled(&profile_file_name(&name), false)
                .await?;
            println!("Disabled agent {name}.");
        }
    }
    Ok(())
}

async fn list_models(base_url: &str) -> Result<()> {
    let client = reqwest::Client::new();
    if !ollama::is_available(&client, base_url).await {
        return Err(anyhow!(
            "Ollama does not seem to be running at {base_url}"
        ));
    }
    let models = ollama::list_models(&client, base_url).await?;
    if models.is_empty() {
        println!("No models installed.");
        return Ok(());
    }
    for model in models {
        let gib = model.size as f64 / 1_073_741_824.0;
        println!("{} ({gib:.1} GiB)", model.name);
    }
    Ok(())
}
