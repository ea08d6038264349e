//! Operator CLI for the loadboard core.
//!
//! Owns the tasks that must not live in request handlers: migrations (with a
//! guardrail against touching a marketplace that has jobs in flight), db
//! status, a one-shot sweep cycle, config hashing, and audit log
//! verification.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "lb")]
#[command(about = "loadboard operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Run one lifecycle sweep cycle against Postgres and print the outcome.
    SweepOnce,

    /// Load the effective config and print its hash + canonical JSON.
    ConfigHash,

    /// Audit trail utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations. Guardrail: refuses when shipments are in flight
    /// (confirmed .. delivered) unless --yes is provided.
    Migrate {
        /// Acknowledge you are migrating a DB with in-flight shipments.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify the hash chain of a JSONL audit log.
    Verify {
        /// Path to the audit log file.
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev convenience; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Db { cmd } => match cmd {
            DbCmd::Status => db_status().await,
            DbCmd::Migrate { yes } => db_migrate(yes).await,
        },
        Commands::SweepOnce => sweep_once().await,
        Commands::ConfigHash => config_hash(),
        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { path } => audit_verify(&path),
        },
    }
}

async fn db_status() -> Result<()> {
    let pool = lb_db::connect_from_env().await?;
    let st = lb_db::status(&pool).await?;
    let in_flight = lb_db::count_in_flight_shipments(&pool).await?;
    println!(
        "db ok={} schema={} in_flight_shipments={}",
        st.ok, st.has_shipments_table, in_flight
    );
    Ok(())
}

async fn db_migrate(yes: bool) -> Result<()> {
    let pool = lb_db::connect_from_env().await?;

    let in_flight = lb_db::count_in_flight_shipments(&pool).await?;
    if in_flight > 0 && !yes {
        bail!(
            "refusing to migrate: {in_flight} shipment(s) are in flight. \
             Re-run with --yes to acknowledge."
        );
    }

    lb_db::migrate(&pool).await?;
    println!("migrations applied");
    Ok(())
}

async fn sweep_once() -> Result<()> {
    let pool = lb_db::connect_from_env().await?;
    match lb_db::sweep(&pool, Utc::now()).await? {
        lb_db::SweepOutcome::Swept { expired, reverted } => {
            println!("sweep: expired={expired} reverted={reverted}");
        }
        lb_db::SweepOutcome::Skipped => {
            println!("sweep: skipped (another instance holds the lock)");
        }
    }
    Ok(())
}

fn config_hash() -> Result<()> {
    let loaded = lb_config::load_from_env().context("config load failed")?;
    println!("config_hash={}", loaded.config_hash);
    println!("{}", loaded.canonical_json);
    Ok(())
}

fn audit_verify(path: &str) -> Result<()> {
    match lb_audit::verify_hash_chain(path)? {
        lb_audit::VerifyResult::Valid { lines } => {
            println!("audit chain valid ({lines} events)");
            Ok(())
        }
        lb_audit::VerifyResult::Broken { line, reason } => {
            bail!("audit chain BROKEN at line {line}: {reason}");
        }
    }
}
