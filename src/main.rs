use chordring::{
    chat::{printing_callback, run_chat},
    config::{BootstrapPeer, NodeConfig},
    network::node::ChordPeer,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "chordring")]
#[command(about = "A Chord ring node with a small chat front end")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new ring with this node as its only member
    #[command(name = "start")]
    Start(NodeArgs),
    /// Join an existing ring through a known member
    #[command(name = "join")]
    Join {
        #[command(flatten)]
        node: NodeArgs,
        /// Known ring member, as name@host:port
        #[arg(short = 'b', long = "bootstrap")]
        bootstrap: BootstrapPeer,
    },
}

#[derive(Args)]
struct NodeArgs {
    /// Node name; its hash is the node's ring identifier
    #[arg(short = 'n', long = "name")]
    name: Option<String>,
    /// JSON configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
    /// Host other nodes reach this one on
    #[arg(long = "host")]
    host: Option<String>,
    /// gRPC port (random if not specified)
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,
    /// Identifier width in bits
    #[arg(long = "bits")]
    bits: Option<u32>,
}

impl NodeArgs {
    fn into_config(self) -> Result<NodeConfig, String> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_file(path)
                .map_err(|e| format!("{}: {}", path.display(), e))?,
            None => NodeConfig::default(),
        };
        if let Some(name) = self.name {
            config.name = name;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bits) = self.bits {
            config.ring_bits = bits;
        }
        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let (node_args, bootstrap) = match cli.command {
        Commands::Start(node) => (node, None),
        Commands::Join { node, bootstrap } => (node, Some(bootstrap)),
    };
    let config = node_args.into_config()?;

    let mut peer = ChordPeer::start(config, Some(printing_callback()))
        .await
        .map_err(|e| format!("Failed to start node: {}", e))?;

    match &bootstrap {
        Some(bootstrap) => {
            if let Err(e) = peer.join(bootstrap).await {
                error!("Failed to join ring: {}", e);
                let _ = peer.shutdown().await;
                return Err(format!("Failed to join ring: {}", e));
            }
            info!("Joined the ring through {}", bootstrap);
        }
        None => {
            info!("Started a new ring as {}", peer.descriptor());
            info!(
                "Other nodes can join using: chordring join -n <NAME> -b {}@{}:{}",
                peer.descriptor().name(),
                peer.descriptor().host(),
                peer.descriptor().port()
            );
        }
    }

    peer.start_maintenance();
    run_chat(&peer).await;

    peer.shutdown()
        .await
        .map_err(|e| format!("Shutdown failed: {}", e))?;
    info!("Node shut down gracefully");
    Ok(())
}
