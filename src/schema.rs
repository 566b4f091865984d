//! Database schema management for `carhealth-diagnostics`.
//!
//! Ensures the document tables exist before the store is used.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates `obd_samples` (sensor groups as JSONB), `users` (assignment
/// pointer) and `bookings`. Safe to call on every startup; no-op if the
/// objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // Pre-recorded OBD snapshots
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS obd_samples (
            id       TEXT PRIMARY KEY,
            label    TEXT  NOT NULL,
            engine   JSONB,
            brake    JSONB,
            battery  JSONB
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Per-user profile with the sample assignment pointer
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            uid              TEXT PRIMARY KEY,
            email            TEXT,
            assigned_sample  TEXT,
            created_at       TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bookings (
            id              UUID PRIMARY KEY,
            customer_name   TEXT NOT NULL,
            phone           TEXT NOT NULL,
            preferred_date  TEXT NOT NULL,
            preferred_time  TEXT NOT NULL,
            centre_name     TEXT NOT NULL,
            issue_type      TEXT NOT NULL,
            lat             DOUBLE PRECISION,
            lon             DOUBLE PRECISION,
            obd_data        JSONB,
            created_at      TIMESTAMPTZ NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Samples are always listed by label, in byte order. Replaces the
    // locale-collated index created by earlier releases.
    sqlx::query("DROP INDEX IF EXISTS idx_obd_samples_label;")
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_obd_samples_label_c
            ON obd_samples (label COLLATE "C");
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
