//! Shared runtime state for lb-daemon.
//!
//! All types here are `Clone`-able (via `Arc` or copy). Handlers receive
//! `State<Arc<AppState>>` from Axum; this module owns nothing async itself.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use lb_audit::AuditWriter;
use lb_commission::CommissionConfig;
use lb_config::MarketConfig;
use lb_gatekeeper::{GateConfig, MemoryProfiles};
use lb_ledger::MarketLedger;
use lb_lifecycle::Profile;
use lb_schemas::LifecycleEvent;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// BusMsg — SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Lifecycle(LifecycleEvent),
    LogLine { level: String, msg: String },
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers.
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    /// Static build metadata.
    pub build: BuildInfo,
    /// The marketplace ledger; the RwLock write guard is the atomic unit
    /// every mutation runs under.
    pub ledger: RwLock<MarketLedger<MemoryProfiles>>,
    /// Hash of the effective configuration this process booted with.
    pub config_hash: String,
    /// JSONL audit writer, when configured.
    pub audit: Option<Mutex<AuditWriter>>,
    /// Optional Postgres pool (set when LB_DATABASE_URL is present); the
    /// sweep tick and the status endpoint use it.
    pub pool: Option<sqlx::PgPool>,
}

impl AppState {
    pub fn new(
        cfg: &MarketConfig,
        config_hash: String,
        profiles: MemoryProfiles,
        pool: Option<sqlx::PgPool>,
    ) -> Result<Self> {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);

        let gate_cfg = GateConfig {
            shipment_requires_subscription: cfg.gate.shipment_requires_subscription,
            offer_requires_subscription: cfg.gate.offer_requires_subscription,
        };
        let commission_cfg = CommissionConfig {
            rate_bps: cfg.commission.rate_bps,
            min_fee_minor: cfg.commission.min_fee_minor,
            max_fee_minor: cfg.commission.max_fee_minor,
            escrow_days: cfg.commission.escrow_days,
        };

        let audit = match &cfg.audit.path {
            Some(path) => Some(Mutex::new(
                AuditWriter::new(path, cfg.audit.hash_chain).context("open audit log")?,
            )),
            None => None,
        };

        Ok(Self {
            bus,
            build: BuildInfo {
                service: "lb-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            ledger: RwLock::new(MarketLedger::new(profiles, gate_cfg, commission_cfg)),
            config_hash,
            audit,
            pool,
        })
    }

    /// Record one lifecycle event on the SSE bus and in the audit log.
    /// Auditing failures are logged, never surfaced to the caller — the
    /// mutation already committed.
    pub async fn record(&self, event: LifecycleEvent) {
        if let Some(audit) = &self.audit {
            let mut w = audit.lock().await;
            if let Err(e) = w.append(&event.topic, &event.event_type, event.payload.clone()) {
                warn!("audit append failed: {e:#}");
            }
        }
        let _ = self.bus.send(BusMsg::Lifecycle(event));
    }
}

/// Load the profile seed file (a JSON array of profile projections).
pub fn load_profiles(path: &str) -> Result<MemoryProfiles> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read profiles {path}"))?;
    let list: Vec<Profile> = serde_json::from_str(&raw).context("malformed profiles json")?;
    let mut dir = MemoryProfiles::new();
    for p in list {
        dir.insert(p);
    }
    Ok(dir)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Spawn the lifecycle sweep tick.
///
/// On each interval:
/// - Runs the ledger sweep (expire stale offers, revert offerless shipments)
///   and broadcasts a `sweep_completed` event when anything changed.
/// - When a Postgres pool is configured, runs the store-side sweep too; the
///   advisory lock inside [`lb_db::sweep`] keeps that single-flight across
///   daemon instances.
pub fn spawn_sweep_tick(state: Arc<AppState>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let now = chrono::Utc::now();

            let plan = {
                let mut ledger = state.ledger.write().await;
                ledger.sweep(now)
            };
            if !plan.is_noop() {
                info!(
                    expired = plan.expire_offers.len(),
                    reverted = plan.revert_shipments.len(),
                    "sweep applied"
                );
                state
                    .record(LifecycleEvent {
                        ts_utc: now,
                        topic: "sweep".to_string(),
                        event_type: "sweep_completed".to_string(),
                        entity_id: uuid::Uuid::nil(),
                        payload: serde_json::json!({
                            "expired": plan.expire_offers.len(),
                            "reverted": plan.revert_shipments.len(),
                        }),
                    })
                    .await;
            }

            if let Some(pool) = &state.pool {
                match lb_db::sweep(pool, now).await {
                    Ok(lb_db::SweepOutcome::Swept { expired, reverted }) => {
                        if expired > 0 || reverted > 0 {
                            info!(expired, reverted, "db sweep applied");
                        }
                    }
                    Ok(lb_db::SweepOutcome::Skipped) => {}
                    Err(e) => warn!("db sweep failed: {e:#}"),
                }
            }
        }
    });
}
