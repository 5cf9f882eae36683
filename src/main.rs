use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;

use online_storage::{Client, ClientConfig, CreateOptions, Credentials};

#[derive(Parser)]
#[command(name = "online-storage")]
#[command(about = "Command-line client for the online key-value storage service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Service address (overrides STORAGE_HOST)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Session token (overrides STORAGE_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Change-password (overrides STORAGE_PASSWORD)
    #[arg(long, global = true)]
    password: Option<String>,

    /// Refresh token used by `refresh` (or STORAGE_REFRESH_TOKEN)
    #[arg(long, global = true, env = "STORAGE_REFRESH_TOKEN")]
    refresh_token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new storage and print its tokens
    Create {
        /// Domain allowed to use the storage (repeatable)
        #[arg(short, long = "domain")]
        domains: Vec<String>,

        /// Backup reference to seed the storage from
        #[arg(long)]
        backup: Option<String>,
    },

    /// Rotate the session token
    Refresh,

    /// Print the value stored under a key
    Get {
        /// Key to read
        key: String,
    },

    /// Write a JSON object into the storage
    Set {
        /// JSON document, e.g. '{"theme":"dark"}'
        data: String,
    },

    /// Delete one key
    Remove {
        /// Key to delete
        key: String,
    },

    /// Delete every key
    DeleteAll,

    /// Snapshot the storage
    Backup,

    /// List backups
    Backups,

    /// Restore a backup
    Restore {
        /// Backup reference
        key: String,
    },
}

impl Cli {
    /// `STORAGE_*` environment with the command-line flags on top, validated
    /// only once every override is applied.
    fn client_config(&self) -> online_storage::Result<ClientConfig> {
        let mut config = ClientConfig::from_env_unchecked();
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if self.token.is_some() {
            config.token = self.token.clone();
        }
        if self.password.is_some() {
            config.password = self.password.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

/// A new storage takes the change-password of the resolved configuration.
fn create_options(domains: Vec<String>, backup: Option<String>, config: &ClientConfig) -> CreateOptions {
    CreateOptions {
        domains: (!domains.is_empty()).then_some(domains),
        backup,
        password: config.password.clone(),
    }
}

fn credentials_json(credentials: &Credentials) -> Value {
    json!({
        "token": credentials.token,
        "refreshToken": credentials.refresh_token,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = cli
        .client_config()
        .map_err(|e| format!("Configuration error: {}", e))?;

    let client = Client::with_config(config.clone())?;
    client.set_refresh_token(cli.refresh_token);
    info!("Using storage service at {}", client.host());

    let output = match cli.command {
        Commands::Create { domains, backup } => {
            let created = client.create(create_options(domains, backup, &config)).await?;
            let credentials = created.data.ok_or("service returned no credentials")?;
            credentials_json(&credentials)
        }
        Commands::Refresh => {
            let refreshed = client.refresh().await?;
            json!({ "token": refreshed.data })
        }
        Commands::Get { key } => client.get(&key).await?,
        Commands::Set { data } => {
            let data: Value = serde_json::from_str(&data)
                .map_err(|e| format!("Invalid JSON document: {}", e))?;
            client.set(&data).await?
        }
        Commands::Remove { key } => Value::Bool(client.remove(&key).await?),
        Commands::DeleteAll => Value::Bool(client.delete_all().await?),
        Commands::Backup => client.backup().await?,
        Commands::Backups => Value::Array(client.list_backups().await?),
        Commands::Restore { key } => client.restore_backup(&key).await?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
