use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::DocumentStore;
use crate::models::{Booking, Sample, UserProfile};

// ---

/// In-process document store. Samples keep insertion order so that label ties
/// resolve the way a real collection scan would.
#[derive(Debug, Default)]
pub struct MemoryStore {
    samples: RwLock<Vec<Sample>>,
    users: RwLock<HashMap<String, UserProfile>>,
    bookings: RwLock<Vec<Booking>>,
}

impl MemoryStore {
    // ---
    pub fn with_samples(samples: Vec<Sample>) -> Self {
        Self {
            samples: RwLock::new(samples),
            ..Default::default()
        }
    }

    pub async fn bookings(&self) -> Vec<Booking> {
        self.bookings.read().await.clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    // ---
    async fn list_samples(&self) -> Result<Vec<Sample>> {
        let mut samples = self.samples.read().await.clone();
        // byte order, like `COLLATE "C"`; stable sort keeps insertion order
        // for equal labels
        samples.sort_by(|a, b| a.label.as_bytes().cmp(b.label.as_bytes()));
        Ok(samples)
    }

    async fn get_sample(&self, id: &str) -> Result<Option<Sample>> {
        let samples = self.samples.read().await;
        Ok(samples.iter().find(|s| s.id == id).cloned())
    }

    async fn put_sample(&self, sample: &Sample) -> Result<()> {
        let mut samples = self.samples.write().await;
        match samples.iter_mut().find(|s| s.id == sample.id) {
            Some(existing) => *existing = sample.clone(),
            None => samples.push(sample.clone()),
        }
        Ok(())
    }

    async fn get_user_profile(&self, uid: &str) -> Result<Option<UserProfile>> {
        Ok(self.users.read().await.get(uid).cloned())
    }

    async fn put_user_profile(&self, profile: &UserProfile) -> Result<()> {
        self.users
            .write()
            .await
            .insert(profile.uid.clone(), profile.clone());
        Ok(())
    }

    async fn insert_booking(&self, booking: &Booking) -> Result<Uuid> {
        self.bookings.write().await.push(booking.clone());
        Ok(booking.id)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::Utc;

    fn sample(id: &str, label: &str) -> Sample {
        Sample {
            id: id.to_string(),
            label: label.to_string(),
            engine: Default::default(),
            brake: Default::default(),
            battery: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_list_samples_orders_by_label() {
        // ---
        let store = MemoryStore::with_samples(vec![
            sample("c", "Charlie"),
            sample("a", "Alpha"),
            sample("b", "Bravo"),
        ]);

        let ids: Vec<_> = store
            .list_samples()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_list_samples_uses_byte_order() {
        // ---
        let store = MemoryStore::with_samples(vec![
            sample("lower", "alpha"),
            sample("accent", "Écrou"),
            sample("upper", "Bravo"),
            sample("digit", "2nd gear"),
        ]);

        let labels: Vec<_> = store
            .list_samples()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.label)
            .collect();
        assert_eq!(labels, ["2nd gear", "Bravo", "alpha", "Écrou"]);
    }

    #[tokio::test]
    async fn test_put_sample_replaces_by_id() {
        // ---
        let store = MemoryStore::with_samples(vec![sample("a", "Alpha")]);
        store.put_sample(&sample("a", "Alpha v2")).await.unwrap();

        let samples = store.list_samples().await.unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].label, "Alpha v2");
    }

    #[tokio::test]
    async fn test_user_profile_round_trip() {
        // ---
        let store = MemoryStore::default();
        let profile = UserProfile {
            uid: "u-1".to_string(),
            email: None,
            assigned_sample: Some("a".to_string()),
            created_at: Utc::now(),
        };
        store.put_user_profile(&profile).await.unwrap();

        assert_eq!(store.get_user_profile("u-1").await.unwrap(), Some(profile));
        assert_eq!(store.get_user_profile("u-2").await.unwrap(), None);
    }
}
