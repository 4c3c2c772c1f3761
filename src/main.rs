//! CLI entry point for the PeerLink communication core.
//!
//! This binary provides a command-line interface for the library,
//! supporting key generation, configuration management, and a local
//! end-to-end demo of the messaging and transfer pipeline.

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use peerlink::{
    crypto::{FileKeyStorage, KeyPair, MemoryKeyStorage, PrivateKeyStorage},
    relay::{InMemoryKeyDirectory, InMemoryMessageStore, InMemorySignalRelay},
    transfer::{ChannelMessage, ChunkedSender, InMemoryDataChannel, TransferReceiver},
    utils::DEFAULT_CONFIG_FILE,
    CoreConfig, Peer,
};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// PeerLink - end-to-end encrypted peer-to-peer communication core
#[derive(Parser)]
#[command(name = "peerlink")]
#[command(about = "Hybrid-encrypted messaging, signaling and chunked transfer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long)]
    quiet: bool,

    /// Data directory for storing keys
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and inspect identity keys
    Keys {
        #[command(subcommand)]
        action: KeyCommands,
    },
    /// Generate and validate configuration files
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
    /// Run a local in-memory demo of the full pipeline
    Demo {
        /// Size of the binary payload to transfer, in bytes
        #[arg(short, long, default_value = "100000")]
        payload_size: usize,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Generate a new identity key pair
    Generate {
        /// Identity id to generate for (random if omitted)
        #[arg(short, long)]
        identity: Option<Uuid>,
        /// Force overwrite existing key material
        #[arg(short, long)]
        force: bool,
    },
    /// Display a stored identity's public key
    Show {
        /// Identity id to show
        #[arg(short, long)]
        identity: Uuid,
        /// Output format (base64, hex)
        #[arg(short, long, default_value = "base64")]
        format: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Generate a default configuration file
    Generate {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        /// Configuration file to validate
        file: Option<PathBuf>,
    },
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet)?;

    let mut config = CoreConfig::load(cli.config.as_deref())?;

    if let Some(data_dir) = cli.data_dir {
        config.storage.keys_dir = data_dir.join("keys");
        config.storage.data_dir = data_dir;
    }

    match cli.command {
        Commands::Keys { action } => handle_key_commands(action, &config),
        Commands::Config { action } => handle_config_commands(action, &config),
        Commands::Demo { payload_size } => handle_demo_command(payload_size, config).await,
    }
}

fn setup_logging(verbose: u8, quiet: bool) -> Result<()> {
    let log_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp_secs()
        .init();

    Ok(())
}

fn handle_key_commands(action: KeyCommands, config: &CoreConfig) -> Result<()> {
    config.ensure_directories()?;
    let storage = FileKeyStorage::new(config.storage.keys_dir.clone());

    match action {
        KeyCommands::Generate { identity, force } => {
            let identity = identity.unwrap_or_else(Uuid::new_v4);

            if storage.get(identity)?.is_some() && !force {
                return Err(anyhow::anyhow!(
                    "Key material for {identity} already exists. Use --force to overwrite."
                ));
            }

            info!("Generating identity key for {identity}");
            let pair = KeyPair::generate()?;
            storage.set(identity, &pair.export_private())?;

            println!("✓ Identity key generated");
            println!("  Identity: {identity}");
            println!("  Fingerprint: {}", pair.fingerprint());
            println!("  Public key: {}", pair.export_public());
        }
        KeyCommands::Show { identity, format } => {
            let export = storage
                .get(identity)?
                .ok_or_else(|| anyhow::anyhow!("No key material stored for {identity}"))?;
            let pair = KeyPair::import_private(&export)?;

            match format.as_str() {
                "base64" => println!("{}", pair.export_public()),
                "hex" => println!("{}", hex::encode(pair.public().as_bytes())),
                _ => return Err(anyhow::anyhow!("Unsupported format: {format}")),
            }
        }
    }
    Ok(())
}

fn handle_config_commands(action: ConfigCommands, config: &CoreConfig) -> Result<()> {
    match action {
        ConfigCommands::Generate { output } => {
            let default_config = CoreConfig::default();
            let output_path = output.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

            default_config.save(&output_path)?;
            println!("✓ Configuration generated: {}", output_path.display());
        }
        ConfigCommands::Validate { file } => {
            let config_to_validate = if let Some(path) = file {
                CoreConfig::from_file(path)?
            } else {
                config.clone()
            };

            config_to_validate.validate()?;
            println!("✓ Configuration is valid");
        }
        ConfigCommands::Show => {
            println!("{}", config.to_toml_string()?);
        }
    }
    Ok(())
}

/// Run the full pipeline locally: two peers over in-memory backends
/// exchange an encrypted message, then stream a chunked payload across an
/// in-memory data channel.
async fn handle_demo_command(payload_size: usize, config: CoreConfig) -> Result<()> {
    let directory = Arc::new(InMemoryKeyDirectory::new());
    let store = Arc::new(InMemoryMessageStore::new());
    let relay = Arc::new(InMemorySignalRelay::new());

    let (alice, _) = Peer::connect(
        Uuid::new_v4(),
        Box::new(MemoryKeyStorage::new()),
        directory.clone(),
        store.clone(),
        relay.clone(),
        config.clone(),
    )
    .await?;
    let (bob, _) = Peer::connect(
        Uuid::new_v4(),
        Box::new(MemoryKeyStorage::new()),
        directory,
        store,
        relay,
        config.clone(),
    )
    .await?;

    println!("Peers");
    println!("=====");
    println!("alice: {} ({})", alice.identity_id(), alice.keys().fingerprint());
    println!("bob:   {} ({})", bob.identity_id(), bob.keys().fingerprint());

    // Encrypted messaging through the shared store
    alice
        .send_message(&[bob.identity_id()], b"hello from alice")
        .await?;
    let inbox = bob.fetch_messages().await?;
    println!();
    println!("Messaging");
    println!("=========");
    for message in &inbox {
        println!(
            "bob received {} bytes from {}",
            message.plaintext.len(),
            message.sender_id
        );
    }

    // Chunked transfer over an in-memory channel
    let channel = InMemoryDataChannel::new();
    let sender = ChunkedSender::new(config.transfer.clone());
    let payload: Vec<u8> = (0..payload_size).map(|i| (i % 256) as u8).collect();

    sender
        .send(&channel, "demo.bin", "application/octet-stream", &payload)
        .await?;

    let mut receiver = TransferReceiver::new();
    let mut completed = None;
    for message in channel.take_sent() {
        let event = match message {
            ChannelMessage::Text(json) => receiver.handle_text(&json)?,
            ChannelMessage::Binary(chunk) => receiver.handle_chunk(&chunk)?,
        };
        if let peerlink::transfer::ReceiveEvent::Completed(received) = event {
            completed = Some(received);
        }
    }

    println!();
    println!("Transfer");
    println!("========");
    match completed {
        Some(received) if received.data == payload => {
            println!("✓ {} bytes transferred intact", received.data.len());
        }
        Some(received) => {
            return Err(anyhow::anyhow!(
                "payload mismatch: sent {} bytes, reassembled {}",
                payload.len(),
                received.data.len()
            ));
        }
        None => return Err(anyhow::anyhow!("transfer never completed")),
    }

    Ok(())
}
