use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use super::DocumentStore;
use crate::models::{Booking, Readings, Sample, UserProfile};

// ---

/// Labels compare byte-wise (`COLLATE "C"`), matching `MemoryStore` and the
/// code-point order the resolver relies on, whatever the database locale.
const LIST_SAMPLES_SQL: &str = r#"
    SELECT id, label, engine, brake, battery
    FROM obd_samples
    ORDER BY label COLLATE "C" ASC
"#;

/// Document store backed by PostgreSQL. Sensor groups live in JSONB columns so
/// that unknown readings survive a round trip.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SampleRow {
    // ---
    id: String,
    label: String,
    engine: Option<Json<Readings>>,
    brake: Option<Json<Readings>>,
    battery: Option<Json<Readings>>,
}

impl From<SampleRow> for Sample {
    fn from(row: SampleRow) -> Self {
        Sample {
            id: row.id,
            label: row.label,
            engine: row.engine.map(|j| j.0).unwrap_or_default(),
            brake: row.brake.map(|j| j.0).unwrap_or_default(),
            battery: row.battery.map(|j| j.0).unwrap_or_default(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    uid: String,
    email: Option<String>,
    assigned_sample: Option<String>,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl DocumentStore for PgStore {
    // ---
    async fn list_samples(&self) -> Result<Vec<Sample>> {
        let rows: Vec<SampleRow> = sqlx::query_as(LIST_SAMPLES_SQL)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Sample::from).collect())
    }

    async fn get_sample(&self, id: &str) -> Result<Option<Sample>> {
        let row: Option<SampleRow> = sqlx::query_as(
            r#"
            SELECT id, label, engine, brake, battery
            FROM obd_samples
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Sample::from))
    }

    async fn put_sample(&self, sample: &Sample) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO obd_samples (id, label, engine, brake, battery)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                label   = EXCLUDED.label,
                engine  = EXCLUDED.engine,
                brake   = EXCLUDED.brake,
                battery = EXCLUDED.battery
            "#,
        )
        .bind(&sample.id)
        .bind(&sample.label)
        .bind(Json(&sample.engine))
        .bind(Json(&sample.brake))
        .bind(Json(&sample.battery))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_user_profile(&self, uid: &str) -> Result<Option<UserProfile>> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT uid, email, assigned_sample, created_at
            FROM users
            WHERE uid = $1
            "#,
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| UserProfile {
            uid: r.uid,
            email: r.email,
            assigned_sample: r.assigned_sample,
            created_at: r.created_at,
        }))
    }

    async fn put_user_profile(&self, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (uid, email, assigned_sample, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (uid) DO UPDATE SET
                email           = EXCLUDED.email,
                assigned_sample = EXCLUDED.assigned_sample
            "#,
        )
        .bind(&profile.uid)
        .bind(&profile.email)
        .bind(&profile.assigned_sample)
        .bind(profile.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_booking(&self, booking: &Booking) -> Result<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO bookings (
                id, customer_name, phone, preferred_date, preferred_time,
                centre_name, issue_type, lat, lon, obd_data, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.customer_name)
        .bind(&booking.phone)
        .bind(&booking.preferred_date)
        .bind(&booking.preferred_time)
        .bind(&booking.centre_name)
        .bind(&booking.issue_type)
        .bind(booking.location.map(|p| p.lat))
        .bind(booking.location.map(|p| p.lon))
        .bind(booking.obd_data.as_ref().map(Json))
        .bind(booking.created_at)
        .execute(&self.pool)
        .await?;

        Ok(booking.id)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_orders_labels_bytewise() {
        // ---
        let sql = LIST_SAMPLES_SQL.split_whitespace().collect::<Vec<_>>().join(" ");
        assert!(sql.contains(r#"ORDER BY label COLLATE "C" ASC"#), "{sql}");
    }

    #[test]
    fn test_missing_jsonb_group_becomes_empty() {
        // ---
        let row = SampleRow {
            id: "s-1".to_string(),
            label: "Idle".to_string(),
            engine: Some(Json(Readings::default().with("engine_rpm", 800))),
            brake: None,
            battery: None,
        };
        let sample = Sample::from(row);
        assert_eq!(sample.engine.get("engine_rpm"), Some(&json!(800)));
        assert!(sample.brake.is_empty());
        assert!(sample.battery.is_empty());
    }
}
