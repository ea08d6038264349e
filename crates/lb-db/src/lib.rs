//! Postgres stores for shipments, offers, and audit events.
//!
//! Conventions follow the rest of the workspace: `anyhow::Result` for
//! infrastructure failures, typed outcome enums for invariant results (the
//! caller maps those to the error taxonomy), runtime `sqlx::query` with
//! binds, embedded migrations.
//!
//! Concurrency contract:
//!
//! - `create_offer_tx` — active-pair uniqueness is the partial unique index
//!   `offers_one_active_per_pair`; two near-simultaneous submissions cannot
//!   both insert.
//! - `accept_offer_tx` — the system's one multi-row transaction. The
//!   shipment row is claimed with a conditional UPDATE whose row-count
//!   decides the winner; the loser rolls back and observes `AlreadyMatched`.
//! - `sweep` — single-flight via `pg_try_advisory_lock`; per-row guarded
//!   UPDATEs keep it idempotent and safe to interleave with user calls.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use lb_commission::{commission, CommissionConfig};
use lb_lifecycle::{
    transition, Offer, OfferStatus, Shipment, ShipmentEvent, ShipmentStatus, TransitionError,
};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub const ENV_DB_URL: &str = "LB_DATABASE_URL";

/// Advisory lock key for the lifecycle sweep (single-flight across instances).
const SWEEP_LOCK_KEY: i64 = 0x4C42_5357;

/// Connect to Postgres using LB_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='shipments'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_shipments_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_shipments_table: bool,
}

/// Count shipments with a committed transporter still in flight. Used by CLI
/// guardrails to prevent accidental migration of a live marketplace.
pub async fn count_in_flight_shipments(pool: &PgPool) -> Result<i64> {
    // If schema doesn't exist yet, treat as 0 (safe) rather than failing.
    let st = status(pool).await?;
    if !st.has_shipments_table {
        return Ok(0);
    }

    let (n,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        select count(*)::bigint
        from shipments
        where status in ('confirmed','picked_up','in_transit','delivered')
        "#,
    )
    .fetch_one(pool)
    .await
    .context("count_in_flight_shipments failed")?;

    Ok(n)
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn shipment_from_row(row: &sqlx::postgres::PgRow) -> Result<Shipment> {
    let status_raw: String = row.try_get("status")?;
    let status = ShipmentStatus::parse(&status_raw)
        .with_context(|| format!("unknown shipment status in db: {status_raw}"))?;
    let stops_raw: Value = row.try_get("stops")?;
    let stops = serde_json::from_value(stops_raw).context("malformed stops json")?;

    Ok(Shipment {
        id: row.try_get("id")?,
        client_id: row.try_get("client_id")?,
        transporter_id: row.try_get("transporter_id")?,
        status,
        budget_minor: row.try_get("budget_minor")?,
        budget_visible: row.try_get("budget_visible")?,
        agreed_price_minor: row.try_get("agreed_price_minor")?,
        currency: row.try_get("currency")?,
        fee_minor: row.try_get("fee_minor")?,
        payout_minor: row.try_get("payout_minor")?,
        origin: row.try_get("origin")?,
        destination: row.try_get("destination")?,
        stops,
        container: row.try_get("container")?,
        weight_kg: row.try_get("weight_kg")?,
        delivered_at: row.try_get("delivered_at")?,
        escrow_release_at: row.try_get("escrow_release_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn offer_from_row(row: &sqlx::postgres::PgRow) -> Result<Offer> {
    let status_raw: String = row.try_get("status")?;
    let status = OfferStatus::parse(&status_raw)
        .with_context(|| format!("unknown offer status in db: {status_raw}"))?;

    Ok(Offer {
        id: row.try_get("id")?,
        shipment_id: row.try_get("shipment_id")?,
        transporter_id: row.try_get("transporter_id")?,
        price_minor: row.try_get("price_minor")?,
        currency: row.try_get("currency")?,
        estimated_days: row.try_get("estimated_days")?,
        available_from: row.try_get("available_from")?,
        status,
        valid_until: row.try_get("valid_until")?,
        created_at: row.try_get("created_at")?,
    })
}

// ---------------------------------------------------------------------------
// Shipments — CRUD
// ---------------------------------------------------------------------------

/// Insert a new shipment row (status as carried on the struct).
pub async fn insert_shipment(pool: &PgPool, s: &Shipment) -> Result<()> {
    sqlx::query(
        r#"
        insert into shipments (
          id, client_id, transporter_id, status, budget_minor, budget_visible,
          agreed_price_minor, currency, fee_minor, payout_minor,
          origin, destination, stops, container, weight_kg,
          delivered_at, escrow_release_at, created_at, updated_at
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
          $11, $12, $13, $14, $15, $16, $17, $18, $19
        )
        "#,
    )
    .bind(s.id)
    .bind(s.client_id)
    .bind(s.transporter_id)
    .bind(s.status.as_str())
    .bind(s.budget_minor)
    .bind(s.budget_visible)
    .bind(s.agreed_price_minor)
    .bind(&s.currency)
    .bind(s.fee_minor)
    .bind(s.payout_minor)
    .bind(&s.origin)
    .bind(&s.destination)
    .bind(serde_json::to_value(&s.stops).context("serialize stops")?)
    .bind(&s.container)
    .bind(s.weight_kg)
    .bind(s.delivered_at)
    .bind(s.escrow_release_at)
    .bind(s.created_at)
    .bind(s.updated_at)
    .execute(pool)
    .await
    .context("insert_shipment failed")?;

    Ok(())
}

pub async fn get_shipment(pool: &PgPool, id: Uuid) -> Result<Option<Shipment>> {
    let row = sqlx::query("select * from shipments where id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("get_shipment failed")?;
    row.as_ref().map(shipment_from_row).transpose()
}

pub async fn get_offer(pool: &PgPool, id: Uuid) -> Result<Option<Offer>> {
    let row = sqlx::query("select * from offers where id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("get_offer failed")?;
    row.as_ref().map(offer_from_row).transpose()
}

/// Offers on one shipment, stable order.
pub async fn list_offers_for_shipment(pool: &PgPool, shipment_id: Uuid) -> Result<Vec<Offer>> {
    let rows = sqlx::query("select * from offers where shipment_id = $1 order by created_at, id")
        .bind(shipment_id)
        .fetch_all(pool)
        .await
        .context("list_offers_for_shipment failed")?;
    rows.iter().map(offer_from_row).collect()
}

// ---------------------------------------------------------------------------
// Offers — create
// ---------------------------------------------------------------------------

/// Outcome of the atomic offer insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOfferOutcome {
    Created,
    /// The partial unique index refused a second active offer for the pair.
    DuplicateActive,
    ShipmentNotFound,
    /// Shipment no longer accepts offers.
    ShipmentClosed,
}

/// Insert an offer and advance a `pending` shipment to `offer_received`, in
/// one transaction. The offer row is refused (not an error) when an active
/// offer for the same `(shipment, transporter)` pair already exists — the
/// `offers_one_active_per_pair` index makes the check race-free.
pub async fn create_offer_tx(pool: &PgPool, offer: &Offer) -> Result<CreateOfferOutcome> {
    let mut tx = pool.begin().await.context("begin create_offer tx")?;

    // Lock the shipment row so a concurrent accept/cancel cannot close the
    // shipment between our check and our insert.
    let row = sqlx::query("select status from shipments where id = $1 for update")
        .bind(offer.shipment_id)
        .fetch_optional(&mut *tx)
        .await
        .context("create_offer: shipment lookup failed")?;
    let Some(row) = row else {
        return Ok(CreateOfferOutcome::ShipmentNotFound);
    };
    let status_raw: String = row.try_get("status")?;
    let Some(status) = ShipmentStatus::parse(&status_raw) else {
        anyhow::bail!("unknown shipment status in db: {status_raw}");
    };
    if !status.accepts_offers() {
        return Ok(CreateOfferOutcome::ShipmentClosed);
    }

    let inserted = sqlx::query(
        r#"
        insert into offers (
          id, shipment_id, transporter_id, price_minor, currency,
          estimated_days, available_from, status, valid_until, created_at
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        on conflict (shipment_id, transporter_id)
          where status in ('pending', 'accepted')
          do nothing
        "#,
    )
    .bind(offer.id)
    .bind(offer.shipment_id)
    .bind(offer.transporter_id)
    .bind(offer.price_minor)
    .bind(&offer.currency)
    .bind(offer.estimated_days)
    .bind(offer.available_from)
    .bind(offer.status.as_str())
    .bind(offer.valid_until)
    .bind(offer.created_at)
    .execute(&mut *tx)
    .await
    .context("create_offer: insert failed")?;

    if inserted.rows_affected() == 0 {
        return Ok(CreateOfferOutcome::DuplicateActive);
    }

    // Idempotent advance: only a `pending` shipment moves.
    sqlx::query(
        "update shipments set status = 'offer_received', updated_at = $2 \
         where id = $1 and status = 'pending'",
    )
    .bind(offer.shipment_id)
    .bind(offer.created_at)
    .execute(&mut *tx)
    .await
    .context("create_offer: advance shipment failed")?;

    tx.commit().await.context("commit create_offer tx")?;
    Ok(CreateOfferOutcome::Created)
}

// ---------------------------------------------------------------------------
// Offers — accept (the one multi-row transaction)
// ---------------------------------------------------------------------------

/// Outcome of the acceptance protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    Confirmed {
        transporter_id: Uuid,
        agreed_price_minor: i64,
        fee_minor: i64,
        payout_minor: i64,
    },
    OfferNotFound,
    /// Caller is not the owning client.
    NotOwner,
    /// Offer already decided, withdrawn, or past `valid_until`.
    OfferNotPending,
    /// A racing accept or concurrent cancel won; nothing was written.
    AlreadyMatched,
}

/// Accept one offer: target → `accepted`, sibling `pending` offers →
/// `rejected`, shipment → `confirmed` with price and commission — all or
/// nothing.
///
/// Lock order is shipment-then-offer everywhere in this crate, so the
/// transaction cannot deadlock against `create_offer_tx`.
pub async fn accept_offer_tx(
    pool: &PgPool,
    offer_id: Uuid,
    caller: Uuid,
    commission_cfg: &CommissionConfig,
    now: DateTime<Utc>,
) -> Result<AcceptOutcome> {
    let mut tx = pool.begin().await.context("begin accept tx")?;

    // Un-locked read to find the shipment; authoritative claims come below.
    let row = sqlx::query("select shipment_id, transporter_id, price_minor from offers where id = $1")
        .bind(offer_id)
        .fetch_optional(&mut *tx)
        .await
        .context("accept: offer lookup failed")?;
    let Some(row) = row else {
        return Ok(AcceptOutcome::OfferNotFound);
    };
    let shipment_id: Uuid = row.try_get("shipment_id")?;
    let transporter_id: Uuid = row.try_get("transporter_id")?;
    let price_minor: i64 = row.try_get("price_minor")?;

    // Serialize racing accepts on the shipment row.
    let row = sqlx::query("select client_id from shipments where id = $1 for update")
        .bind(shipment_id)
        .fetch_optional(&mut *tx)
        .await
        .context("accept: shipment lock failed")?;
    let Some(row) = row else {
        return Ok(AcceptOutcome::AlreadyMatched);
    };
    let client_id: Uuid = row.try_get("client_id")?;
    if caller != client_id {
        return Ok(AcceptOutcome::NotOwner);
    }

    let fee = match commission(commission_cfg, price_minor) {
        Ok(fee) => fee,
        // Fee policy failure: refuse the acceptance, never confirm unpriced.
        Err(e) => anyhow::bail!("accept: commission failed: {e}"),
    };

    // Claim the offer. An expired-but-unswept offer is never acceptable.
    let claimed = sqlx::query(
        "update offers set status = 'accepted' \
         where id = $1 and status = 'pending' and valid_until > $2",
    )
    .bind(offer_id)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("accept: offer claim failed")?;
    if claimed.rows_affected() == 0 {
        return Ok(AcceptOutcome::OfferNotPending);
    }

    // Claim the shipment; the row-count decides the race.
    let confirmed = sqlx::query(
        r#"
        update shipments
           set status = 'confirmed',
               transporter_id = $2,
               agreed_price_minor = $3,
               fee_minor = $4,
               payout_minor = $5,
               updated_at = $6
         where id = $1 and status in ('pending', 'offer_received')
        "#,
    )
    .bind(shipment_id)
    .bind(transporter_id)
    .bind(price_minor)
    .bind(fee.fee_minor)
    .bind(fee.payout_minor)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("accept: shipment confirm failed")?;
    if confirmed.rows_affected() == 0 {
        // Dropping the tx rolls back the offer claim above.
        return Ok(AcceptOutcome::AlreadyMatched);
    }

    // Deterministically reject all sibling pending offers.
    sqlx::query(
        "update offers set status = 'rejected' \
         where shipment_id = $1 and status = 'pending' and id <> $2",
    )
    .bind(shipment_id)
    .bind(offer_id)
    .execute(&mut *tx)
    .await
    .context("accept: sibling rejection failed")?;

    tx.commit().await.context("commit accept tx")?;
    Ok(AcceptOutcome::Confirmed {
        transporter_id,
        agreed_price_minor: price_minor,
        fee_minor: fee.fee_minor,
        payout_minor: fee.payout_minor,
    })
}

// ---------------------------------------------------------------------------
// Offers — reject / withdraw
// ---------------------------------------------------------------------------

/// Outcome of a single-offer decision (reject / withdraw).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecideOfferOutcome {
    Done,
    OfferNotFound,
    /// Caller does not own the relevant side of the offer.
    NotPermitted,
    OfferNotPending,
}

/// Client-side rejection of a single pending offer.
pub async fn reject_offer_tx(
    pool: &PgPool,
    offer_id: Uuid,
    caller: Uuid,
) -> Result<DecideOfferOutcome> {
    let mut tx = pool.begin().await.context("begin reject tx")?;

    let row = sqlx::query(
        r#"
        select o.status as offer_status, s.client_id
          from offers o
          join shipments s on s.id = o.shipment_id
         where o.id = $1
           for update of o, s
        "#,
    )
    .bind(offer_id)
    .fetch_optional(&mut *tx)
    .await
    .context("reject: lookup failed")?;
    let Some(row) = row else {
        return Ok(DecideOfferOutcome::OfferNotFound);
    };
    let client_id: Uuid = row.try_get("client_id")?;
    let status_raw: String = row.try_get("offer_status")?;
    if caller != client_id {
        return Ok(DecideOfferOutcome::NotPermitted);
    }
    if OfferStatus::parse(&status_raw) != Some(OfferStatus::Pending) {
        return Ok(DecideOfferOutcome::OfferNotPending);
    }

    sqlx::query("update offers set status = 'rejected' where id = $1")
        .bind(offer_id)
        .execute(&mut *tx)
        .await
        .context("reject: update failed")?;

    tx.commit().await.context("commit reject tx")?;
    Ok(DecideOfferOutcome::Done)
}

/// Transporter-side withdrawal of their own pending offer.
pub async fn withdraw_offer_tx(
    pool: &PgPool,
    offer_id: Uuid,
    caller: Uuid,
) -> Result<DecideOfferOutcome> {
    let mut tx = pool.begin().await.context("begin withdraw tx")?;

    let row = sqlx::query("select status, transporter_id from offers where id = $1 for update")
        .bind(offer_id)
        .fetch_optional(&mut *tx)
        .await
        .context("withdraw: lookup failed")?;
    let Some(row) = row else {
        return Ok(DecideOfferOutcome::OfferNotFound);
    };
    let transporter_id: Uuid = row.try_get("transporter_id")?;
    let status_raw: String = row.try_get("status")?;
    if caller != transporter_id {
        return Ok(DecideOfferOutcome::NotPermitted);
    }
    if OfferStatus::parse(&status_raw) != Some(OfferStatus::Pending) {
        return Ok(DecideOfferOutcome::OfferNotPending);
    }

    sqlx::query("update offers set status = 'withdrawn' where id = $1")
        .bind(offer_id)
        .execute(&mut *tx)
        .await
        .context("withdraw: update failed")?;

    tx.commit().await.context("commit withdraw tx")?;
    Ok(DecideOfferOutcome::Done)
}

// ---------------------------------------------------------------------------
// Shipments — advance / cancel / dispute
// ---------------------------------------------------------------------------

/// Outcome of an explicit shipment status mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShipmentMutationOutcome {
    Moved(ShipmentStatus),
    ShipmentNotFound,
    NotPermitted,
    /// The lifecycle table forbids this move; nothing was written.
    Illegal(TransitionError),
}

/// Apply one lifecycle event to a shipment under a row lock. Permission is
/// the caller's job; this function answers only state legality. Stamps
/// `delivered_at` / `escrow_release_at` as the statuses are reached.
async fn apply_event_locked(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    shipment_id: Uuid,
    current: ShipmentStatus,
    event: ShipmentEvent,
    escrow_days: i64,
    now: DateTime<Utc>,
) -> Result<Result<ShipmentStatus, TransitionError>> {
    let next = match transition(current, event) {
        Ok(next) => next,
        Err(e) => return Ok(Err(e)),
    };

    match next {
        ShipmentStatus::Delivered => {
            sqlx::query(
                "update shipments set status = $2, delivered_at = $3, updated_at = $3 where id = $1",
            )
            .bind(shipment_id)
            .bind(next.as_str())
            .bind(now)
            .execute(&mut **tx)
            .await
            .context("apply_event: delivered update failed")?;
        }
        ShipmentStatus::Completed => {
            let release = lb_commission::escrow_release_at(now, escrow_days);
            sqlx::query(
                "update shipments set status = $2, escrow_release_at = $3, updated_at = $4 where id = $1",
            )
            .bind(shipment_id)
            .bind(next.as_str())
            .bind(release)
            .bind(now)
            .execute(&mut **tx)
            .await
            .context("apply_event: completed update failed")?;
        }
        _ => {
            sqlx::query("update shipments set status = $2, updated_at = $3 where id = $1")
                .bind(shipment_id)
                .bind(next.as_str())
                .bind(now)
                .execute(&mut **tx)
                .await
                .context("apply_event: status update failed")?;
        }
    }

    Ok(Ok(next))
}

/// Explicit status advance (pickup / transit / delivered / completed).
/// `event` must be one of the four advance events; permission follows the
/// lifecycle table (transporter moves cargo, client confirms completion).
pub async fn advance_shipment_tx(
    pool: &PgPool,
    shipment_id: Uuid,
    caller: Uuid,
    event: ShipmentEvent,
    escrow_days: i64,
    now: DateTime<Utc>,
) -> Result<ShipmentMutationOutcome> {
    let mut tx = pool.begin().await.context("begin advance tx")?;

    let row = sqlx::query(
        "select status, client_id, transporter_id from shipments where id = $1 for update",
    )
    .bind(shipment_id)
    .fetch_optional(&mut *tx)
    .await
    .context("advance: lookup failed")?;
    let Some(row) = row else {
        return Ok(ShipmentMutationOutcome::ShipmentNotFound);
    };
    let status_raw: String = row.try_get("status")?;
    let Some(current) = ShipmentStatus::parse(&status_raw) else {
        anyhow::bail!("unknown shipment status in db: {status_raw}");
    };
    let client_id: Uuid = row.try_get("client_id")?;
    let transporter_id: Option<Uuid> = row.try_get("transporter_id")?;

    let permitted = match event {
        ShipmentEvent::ConfirmCompleted => caller == client_id,
        ShipmentEvent::MarkPickedUp | ShipmentEvent::MarkInTransit | ShipmentEvent::MarkDelivered => {
            transporter_id == Some(caller)
        }
        _ => false,
    };
    if !permitted {
        return Ok(ShipmentMutationOutcome::NotPermitted);
    }

    match apply_event_locked(&mut tx, shipment_id, current, event, escrow_days, now).await? {
        Ok(next) => {
            tx.commit().await.context("commit advance tx")?;
            Ok(ShipmentMutationOutcome::Moved(next))
        }
        Err(e) => Ok(ShipmentMutationOutcome::Illegal(e)),
    }
}

/// Client cancels an unmatched shipment.
pub async fn cancel_shipment_tx(
    pool: &PgPool,
    shipment_id: Uuid,
    caller: Uuid,
    now: DateTime<Utc>,
) -> Result<ShipmentMutationOutcome> {
    let mut tx = pool.begin().await.context("begin cancel tx")?;

    let row = sqlx::query("select status, client_id from shipments where id = $1 for update")
        .bind(shipment_id)
        .fetch_optional(&mut *tx)
        .await
        .context("cancel: lookup failed")?;
    let Some(row) = row else {
        return Ok(ShipmentMutationOutcome::ShipmentNotFound);
    };
    let status_raw: String = row.try_get("status")?;
    let Some(current) = ShipmentStatus::parse(&status_raw) else {
        anyhow::bail!("unknown shipment status in db: {status_raw}");
    };
    let client_id: Uuid = row.try_get("client_id")?;
    if caller != client_id {
        return Ok(ShipmentMutationOutcome::NotPermitted);
    }

    match apply_event_locked(&mut tx, shipment_id, current, ShipmentEvent::Cancel, 0, now).await? {
        Ok(next) => {
            tx.commit().await.context("commit cancel tx")?;
            Ok(ShipmentMutationOutcome::Moved(next))
        }
        Err(e) => Ok(ShipmentMutationOutcome::Illegal(e)),
    }
}

/// Either party parks a matched shipment in `disputed`.
pub async fn raise_dispute_tx(
    pool: &PgPool,
    shipment_id: Uuid,
    caller: Uuid,
    now: DateTime<Utc>,
) -> Result<ShipmentMutationOutcome> {
    let mut tx = pool.begin().await.context("begin dispute tx")?;

    let row = sqlx::query(
        "select status, client_id, transporter_id from shipments where id = $1 for update",
    )
    .bind(shipment_id)
    .fetch_optional(&mut *tx)
    .await
    .context("dispute: lookup failed")?;
    let Some(row) = row else {
        return Ok(ShipmentMutationOutcome::ShipmentNotFound);
    };
    let status_raw: String = row.try_get("status")?;
    let Some(current) = ShipmentStatus::parse(&status_raw) else {
        anyhow::bail!("unknown shipment status in db: {status_raw}");
    };
    let client_id: Uuid = row.try_get("client_id")?;
    let transporter_id: Option<Uuid> = row.try_get("transporter_id")?;
    if caller != client_id && transporter_id != Some(caller) {
        return Ok(ShipmentMutationOutcome::NotPermitted);
    }

    match apply_event_locked(&mut tx, shipment_id, current, ShipmentEvent::RaiseDispute, 0, now)
        .await?
    {
        Ok(next) => {
            tx.commit().await.context("commit dispute tx")?;
            Ok(ShipmentMutationOutcome::Moved(next))
        }
        Err(e) => Ok(ShipmentMutationOutcome::Illegal(e)),
    }
}

// ---------------------------------------------------------------------------
// Sweep
// ---------------------------------------------------------------------------

/// Outcome of one sweep cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    Swept { expired: u64, reverted: u64 },
    /// Another instance holds the sweep lock; nothing was done.
    Skipped,
}

/// Run one sweep cycle: expire stale pending offers, revert offerless
/// shipments. Single-flight across instances via an advisory lock held on one
/// connection for the duration of the cycle.
pub async fn sweep(pool: &PgPool, now: DateTime<Utc>) -> Result<SweepOutcome> {
    // The advisory lock is session-scoped: hold one connection for the whole
    // cycle so lock and unlock pair up.
    let mut conn = pool.acquire().await.context("sweep: acquire conn")?;

    let (locked,): (bool,) = sqlx::query_as::<_, (bool,)>("select pg_try_advisory_lock($1)")
        .bind(SWEEP_LOCK_KEY)
        .fetch_one(&mut *conn)
        .await
        .context("sweep: lock query failed")?;
    if !locked {
        return Ok(SweepOutcome::Skipped);
    }

    let result = sweep_locked(&mut conn, now).await;

    // Always release, even when the cycle failed.
    let _ = sqlx::query("select pg_advisory_unlock($1)")
        .bind(SWEEP_LOCK_KEY)
        .execute(&mut *conn)
        .await;

    result
}

async fn sweep_locked(
    conn: &mut sqlx::pool::PoolConnection<sqlx::Postgres>,
    now: DateTime<Utc>,
) -> Result<SweepOutcome> {
    let expired = sqlx::query(
        "update offers set status = 'expired' where status = 'pending' and valid_until < $1",
    )
    .bind(now)
    .execute(&mut **conn)
    .await
    .context("sweep: expire failed")?
    .rows_affected();

    let reverted = sqlx::query(
        r#"
        update shipments s
           set status = 'pending', updated_at = $1
         where s.status = 'offer_received'
           and not exists (
               select 1 from offers o
                where o.shipment_id = s.id
                  and o.status in ('pending', 'accepted')
           )
        "#,
    )
    .bind(now)
    .execute(&mut **conn)
    .await
    .context("sweep: revert failed")?
    .rows_affected();

    Ok(SweepOutcome::Swept { expired, reverted })
}

// ---------------------------------------------------------------------------
// Audit events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub event_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub topic: String,
    pub event_type: String,
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// Insert one audit event row (append-only semantics enforced at app layer).
pub async fn insert_audit_event(pool: &PgPool, ev: &NewAuditEvent) -> Result<()> {
    sqlx::query(
        r#"
        insert into audit_events (
          event_id, ts_utc, topic, event_type, payload, hash_prev, hash_self
        ) values ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(ev.event_id)
    .bind(ev.ts_utc)
    .bind(&ev.topic)
    .bind(&ev.event_type)
    .bind(&ev.payload)
    .bind(&ev.hash_prev)
    .bind(&ev.hash_self)
    .execute(pool)
    .await
    .context("insert_audit_event failed")?;

    Ok(())
}
