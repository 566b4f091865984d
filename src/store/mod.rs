//! Read/write surface of the document store holding OBD samples, user
//! profiles and service bookings.
//!
//! Callers only see [`DocumentStore`]; `PgStore` backs the running service and
//! `MemoryStore` backs tests and local demos.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Booking, Sample, UserProfile};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

// ---

#[async_trait]
pub trait DocumentStore: Send + Sync {
    // ---
    /// All samples ordered by label, ascending. Ties come back in storage order.
    async fn list_samples(&self) -> Result<Vec<Sample>>;

    async fn get_sample(&self, id: &str) -> Result<Option<Sample>>;

    /// Insert or replace a sample.
    async fn put_sample(&self, sample: &Sample) -> Result<()>;

    async fn get_user_profile(&self, uid: &str) -> Result<Option<UserProfile>>;

    /// Insert or replace a user profile.
    async fn put_user_profile(&self, profile: &UserProfile) -> Result<()>;

    async fn insert_booking(&self, booking: &Booking) -> Result<Uuid>;
}
