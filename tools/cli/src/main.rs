//! spbridge CLI - Command line interface for SharePoint to Azure Blob transfers.
//!
//! This tool runs transfers described by a JSON configuration file and
//! manages the secret key used to encrypt the credentials it contains.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zeroize::Zeroizing;

use spbridge_crypto::{KeySecretResolver, SecretKey};
use spbridge_transfer::{TransferConfig, TransferCoordinator};

/// Environment variable holding the base64 secret key.
const KEY_ENV: &str = "SPBRIDGE_SECRET_KEY";

#[derive(Parser)]
#[command(name = "spbridge")]
#[command(about = "spbridge - Copy SharePoint document libraries into Azure Blob Storage")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy every file of a SharePoint folder into the configured container.
    Transfer {
        /// Path to the JSON configuration file.
        #[arg(short, long)]
        config: PathBuf,

        /// Folder within the document library (default: root).
        #[arg(short, long, default_value = "/")]
        folder: String,

        /// File holding the base64 secret key (default: $SPBRIDGE_SECRET_KEY).
        #[arg(short, long)]
        key_file: Option<PathBuf>,
    },

    /// List objects in the destination container.
    List {
        /// Path to the JSON configuration file.
        #[arg(short, long)]
        config: PathBuf,

        /// File holding the base64 secret key (default: $SPBRIDGE_SECRET_KEY).
        #[arg(short, long)]
        key_file: Option<PathBuf>,
    },

    /// Check that both SharePoint and Azure Blob Storage are reachable.
    TestConnection {
        /// Path to the JSON configuration file.
        #[arg(short, long)]
        config: PathBuf,

        /// File holding the base64 secret key (default: $SPBRIDGE_SECRET_KEY).
        #[arg(short, long)]
        key_file: Option<PathBuf>,
    },

    /// Encrypt a secret for use in the configuration file.
    EncryptSecret {
        /// Plaintext to encrypt; read from stdin when omitted.
        #[arg(long)]
        value: Option<String>,

        /// File holding the base64 secret key (default: $SPBRIDGE_SECRET_KEY).
        #[arg(short, long)]
        key_file: Option<PathBuf>,
    },

    /// Generate a new secret key.
    GenerateKey,

    /// Print shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Transfer {
            config,
            folder,
            key_file,
        } => cmd_transfer(&config, &folder, key_file.as_deref()).await,

        Commands::List { config, key_file } => cmd_list(&config, key_file.as_deref()).await,

        Commands::TestConnection { config, key_file } => {
            cmd_test_connection(&config, key_file.as_deref()).await
        }

        Commands::EncryptSecret { value, key_file } => {
            cmd_encrypt_secret(value, key_file.as_deref())
        }

        Commands::GenerateKey => cmd_generate_key(),

        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "spbridge", &mut io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Load the secret key from a file or the environment.
fn load_key(key_file: Option<&Path>) -> Result<SecretKey> {
    let encoded = match key_file {
        Some(path) => Zeroizing::new(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read key file {}", path.display()))?,
        ),
        None => Zeroizing::new(std::env::var(KEY_ENV).with_context(|| {
            format!("No key file given and {} is not set", KEY_ENV)
        })?),
    };

    SecretKey::from_base64(&encoded).context("Invalid secret key")
}

/// Build a coordinator from a configuration file.
fn open_coordinator(config: &Path, key_file: Option<&Path>) -> Result<TransferCoordinator> {
    let resolver = KeySecretResolver::new(load_key(key_file)?);
    let config = TransferConfig::from_file(config)
        .with_context(|| format!("Failed to load configuration {}", config.display()))?;

    TransferCoordinator::new(config, &resolver).context("Failed to initialize transfer service")
}

/// Run a transfer and print the outcome.
async fn cmd_transfer(config: &Path, folder: &str, key_file: Option<&Path>) -> Result<ExitCode> {
    let coordinator = open_coordinator(config, key_file)?;

    info!("Transferring {} into {}", folder, coordinator.container());
    let outcome = coordinator.transfer_path(folder).await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if outcome.success && !outcome.has_failures() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// List destination objects.
async fn cmd_list(config: &Path, key_file: Option<&Path>) -> Result<ExitCode> {
    let coordinator = open_coordinator(config, key_file)?;
    let names = coordinator.list_destination_files().await;

    if names.is_empty() {
        println!("Container {} is empty.", coordinator.container());
    } else {
        println!("Contents of {}:", coordinator.container());
        for name in names {
            println!("  {}", name);
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Probe both endpoints and print the report.
async fn cmd_test_connection(config: &Path, key_file: Option<&Path>) -> Result<ExitCode> {
    let coordinator = open_coordinator(config, key_file)?;
    let report = coordinator.test_connection().await;

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(if report.overall {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Encrypt a plaintext secret.
fn cmd_encrypt_secret(value: Option<String>, key_file: Option<&Path>) -> Result<ExitCode> {
    let resolver = KeySecretResolver::new(load_key(key_file)?);

    let plaintext = match value {
        Some(value) => Zeroizing::new(value),
        None => {
            let mut buf = Zeroizing::new(String::new());
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read secret from stdin")?;
            buf
        }
    };

    let plaintext = plaintext.trim_end_matches(['\r', '\n']);
    if plaintext.is_empty() {
        anyhow::bail!("Secret cannot be empty");
    }

    let ciphertext = resolver
        .encrypt(plaintext)
        .context("Failed to encrypt secret")?;
    println!("{}", ciphertext);

    Ok(ExitCode::SUCCESS)
}

/// Print a new base64 secret key.
fn cmd_generate_key() -> Result<ExitCode> {
    let key = SecretKey::generate();
    println!("{}", key.to_base64());
    Ok(ExitCode::SUCCESS)
}
