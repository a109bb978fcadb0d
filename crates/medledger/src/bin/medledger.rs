//! Audit tool: recompute the Merkle commitment of a record store.
//!
//! Anyone holding a copy of the store can recompute the root and check a
//! record's inclusion against a root read off the ledger.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use medledger::core::{verify_leaf_hash, MerkleProof, MerkleRoot, MerkleTree, ResourceKey};
use medledger::store::{RecordStore, SqliteStore, StoreExt};

#[derive(Parser, Debug)]
#[command(name = "medledger")]
#[command(about = "Recompute and check medledger record commitments")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the root over every record in the store.
    Root {
        /// SQLite record store
        #[arg(long)]
        db: PathBuf,
    },
    /// Print the inclusion proof of one record as JSON.
    Prove(RecordArgs),
    /// Check one record against a root; exits 1 if it does not verify.
    Verify {
        #[command(flatten)]
        record: RecordArgs,

        /// Expected root, hex encoded
        #[arg(long)]
        root: String,
    },
}

#[derive(Args, Debug)]
struct RecordArgs {
    /// SQLite record store
    #[arg(long)]
    db: PathBuf,

    #[arg(long)]
    resource_type: String,

    #[arg(long)]
    resource_id: String,

    #[arg(long = "version", default_value = "1")]
    version_id: u64,
}

impl RecordArgs {
    fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.resource_type, &self.resource_id, self.version_id)
    }
}

#[derive(Serialize)]
struct ProofReport {
    key: ResourceKey,
    leaf_hash: String,
    root: String,
    leaf_count: usize,
    proof: MerkleProof,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match Cli::parse().command {
        Command::Root { db } => {
            let (_, tree) = load(&db).await?;
            println!("{}", tree.root());
            println!("leaves: {}", tree.leaf_count());
            Ok(ExitCode::SUCCESS)
        }
        Command::Prove(args) => {
            let report = prove(&args).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Verify { record, root } => {
            let expected = MerkleRoot::from_hex(&root).context("invalid --root")?;
            let report = prove(&record).await?;
            let leaf = medledger::core::Digest::from_hex(&report.leaf_hash)?;

            if verify_leaf_hash(&leaf, &report.proof, &expected) {
                println!("ok: {} is included under {}", report.key, expected);
                Ok(ExitCode::SUCCESS)
            } else {
                println!(
                    "FAILED: {} does not verify against {} (store root is {})",
                    report.key, expected, report.root
                );
                Ok(ExitCode::from(1))
            }
        }
    }
}

async fn load(db: &Path) -> anyhow::Result<(SqliteStore, MerkleTree)> {
    if !db.exists() {
        bail!("no record store at {}", db.display());
    }
    let store = SqliteStore::open(db)
        .with_context(|| format!("failed to open {}", db.display()))?;
    let records = store.scan_records().await?;
    tracing::debug!(records = records.len(), "store scanned");

    let leaves = records.iter().map(|r| r.payload.leaf_hash()).collect();
    let tree = MerkleTree::from_leaf_hashes(leaves).context("record store is empty")?;
    Ok((store, tree))
}

async fn prove(args: &RecordArgs) -> anyhow::Result<ProofReport> {
    let (store, tree) = load(&args.db).await?;
    let key = args.key();
    let record = store.require_record(&key).await?;
    let leaf_hash = record.payload.leaf_hash();
    let proof = tree.proof_for_hash(&leaf_hash)?;

    Ok(ProofReport {
        key,
        leaf_hash: leaf_hash.to_hex(),
        root: tree.root().to_hex(),
        leaf_count: tree.leaf_count(),
        proof,
    })
}
