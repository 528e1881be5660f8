mod commands;
mod desktop;

use anyhow::Result;
use bazytrack_core::config::get_data_dir;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bazytrack")]
#[command(about = "Location tracking client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show tracking status and the device identifier
    Status,
    /// Turn tracking on
    Start,
    /// Turn tracking off
    Stop,
    /// Print the device identifier
    Id {
        /// Also copy it to the terminal clipboard (OSC 52)
        #[arg(short, long)]
        copy: bool,
    },
    /// Manage tracker settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// List all settings
    List,
    /// Get a setting value
    Get {
        /// Setting key (e.g. `interval`)
        key: String,
    },
    /// Set a setting value
    Set {
        /// Setting key (e.g. `interval`)
        key: String,
        /// Value to set
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let data_dir = get_data_dir()?;

    match cli.command {
        Commands::Status => commands::status::handle_status(&data_dir),
        Commands::Start => commands::tracking::handle_start(&data_dir).await,
        Commands::Stop => commands::tracking::handle_stop(&data_dir).await,
        Commands::Id { copy } => commands::identity::handle_id(&data_dir, copy),
        Commands::Settings { action } => match action {
            SettingsAction::List => commands::settings::handle_list(&data_dir),
            SettingsAction::Get { key } => commands::settings::handle_get(&data_dir, &key),
            SettingsAction::Set { key, value } => {
                commands::settings::handle_set(&data_dir, &key, &value)
            }
        },
    }
}
