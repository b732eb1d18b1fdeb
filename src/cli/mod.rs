use clap::{Parser, Subcommand};

pub mod config;
pub mod publish;
pub mod run;
pub mod sync;
pub mod version;

#[derive(Parser)]
#[command(name = "patronage")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Creator subscription service backed by a ledger event log", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the service: background event sync plus the REST surface
    Run {
        /// Path to config file (default: ~/.local/share/patronage/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// Interval in seconds between background sync passes
        #[arg(long, default_value_t = 30)]
        sync_interval: u64,
    },

    /// Run a single event sync pass and print the report
    Sync {
        /// Path to config file (default: ~/.local/share/patronage/config.toml)
        #[arg(long)]
        config: Option<String>,
    },

    /// Publish a content file: encrypt if gated, store, certify, commit
    Publish {
        /// Path to config file (default: ~/.local/share/patronage/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// Path to the content file
        #[arg(long)]
        file: String,

        /// Creator profile object id
        #[arg(long)]
        profile: String,

        /// Creator capability object id proving ownership of the profile
        #[arg(long)]
        creator_cap: String,

        /// Content title
        #[arg(long)]
        title: String,

        /// Content description
        #[arg(long, default_value = "")]
        description: String,

        /// Content kind (text, image, video, audio)
        #[arg(long, default_value = "text")]
        kind: String,

        /// Encrypt for supporters only
        #[arg(long)]
        gated: bool,

        /// Path to hex-encoded 32-byte signing keyfile
        #[arg(long)]
        keyfile: String,
    },

    /// Display version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Run {
            config,
            sync_interval,
        } => run::execute(config, sync_interval).await,
        Commands::Sync { config } => sync::execute(config).await,
        Commands::Publish {
            config,
            file,
            profile,
            creator_cap,
            title,
            description,
            kind,
            gated,
            keyfile,
        } => {
            publish::execute(
                config,
                file,
                profile,
                creator_cap,
                title,
                description,
                kind,
                gated,
                keyfile,
            )
            .await
        }
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}

/// Resolve the config path, creating a default file when none exists yet.
pub(crate) fn load_config(
    config_path: Option<String>,
) -> Result<config::ServiceConfig, Box<dyn std::error::Error>> {
    let path = config_path
        .map(std::path::PathBuf::from)
        .unwrap_or_else(config::default_config_path);

    if !path.exists() {
        println!("No config file found. Creating default at {}", path.display());
        config::ServiceConfig::create_default(&path)?;
    }

    config::ServiceConfig::load(&path)
}
