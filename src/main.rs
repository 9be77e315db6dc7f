//! nfa-learning: learning verification and update service.

use nfa_learning::api::{self, ApiState};
use nfa_learning::config::Config;
use nfa_learning::learning::proof::{self, MerkleTree};
use nfa_learning::learning::{H256, LearningCoordinator, LearningStore};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "nfa-learning")]
#[command(about = "Learning verification and update engine for non-fungible agents", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the learning API server
    Serve,

    /// Check a membership proof against a root, offline
    Verify {
        /// Learning root (hex)
        #[arg(long)]
        root: H256,

        /// Claimed leaf hash (hex)
        #[arg(long)]
        leaf: H256,

        /// Sibling hashes from the leaf upwards (hex, comma-separated)
        #[arg(long, value_delimiter = ',')]
        proof: Vec<H256>,
    },

    /// Build a learning tree from files and print its root and one proof
    Tree {
        /// Files whose contents become the tree's leaves, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Leaf to print a proof for
        #[arg(short, long, default_value = "0")]
        index: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.log.debug |= cli.debug;

    match cli.command {
        Commands::Serve => {
            let _log_guard = nfa_learning::telemetry::init_tracing(&config.log);
            let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
            runtime.block_on(serve(config))
        }
        Commands::Verify { root, leaf, proof } => {
            let valid = proof::verify(&root, &leaf, &proof);
            println!("{}", if valid { "valid" } else { "invalid" });
            if valid {
                Ok(())
            } else {
                std::process::exit(1)
            }
        }
        Commands::Tree { files, index } => print_tree(&files, index),
    }
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!(
        data_dir = %config.data_dir.display(),
        modules = config.modules.len(),
        agents = config.agents.len(),
        "starting nfa-learning"
    );

    let store = LearningStore::connect_in(&config.data_dir)
        .await
        .context("failed to open learning store")?;
    let coordinator = LearningCoordinator::new(
        store.clone(),
        Arc::new(config.directory()),
        Arc::new(config.module_registry()),
        config.learning.clone(),
    );
    let state = Arc::new(ApiState::new(Arc::new(coordinator)));

    let shutdown = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(%error, "failed to listen for ctrl-c");
        }
        tracing::info!("shutdown requested");
    };
    let result = api::serve(&config.api, state, shutdown).await;

    store.close().await;
    result
}

fn print_tree(files: &[PathBuf], index: usize) -> Result<()> {
    let contents = files
        .iter()
        .map(|path| {
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let tree = MerkleTree::from_contents(&contents).context("no leaves to build a tree from")?;
    let proof = tree
        .proof(index)
        .with_context(|| format!("leaf index {index} is out of range ({} leaves)", tree.leaf_count()))?;

    println!("root  {}", tree.root());
    println!("leaf  {}", tree.leaves()[index]);
    for sibling in proof {
        println!("proof {sibling}");
    }
    Ok(())
}
