//! Sample resolution: decides which OBD sample is "current" for a user and
//! in which order the rest of the collection is offered.
//!
//! Resolution never fails outward. Any lookup error is logged and degrades to
//! an empty or partial list, which the caller treats as "nothing to show".

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::cache::{LocalCache, ASSIGNED_SAMPLE_KEY};
use crate::models::Sample;
use crate::store::DocumentStore;

// ---

/// Ordered sample list plus the selected index (always 0 after a load).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedSamples {
    pub samples: Vec<Sample>,
    pub selected: usize,
}

impl ResolvedSamples {
    fn new(samples: Vec<Sample>) -> Self {
        Self {
            samples,
            selected: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Clone)]
pub struct SampleResolver {
    store: Arc<dyn DocumentStore>,
    cache: Arc<dyn LocalCache>,
}

impl SampleResolver {
    // ---
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<dyn LocalCache>) -> Self {
        Self { store, cache }
    }

    /// Resolve the ordered sample list for `uid` (the signed-in user, if any).
    pub async fn load(&self, uid: Option<&str>) -> ResolvedSamples {
        // ---
        info!("Resolving samples for user {:?}", uid);

        let Some(assigned_id) = self.assigned_sample_id(uid).await else {
            warn!("No assigned sample id found, nothing to show");
            return ResolvedSamples::default();
        };

        let all = match self.store.list_samples().await {
            Ok(all) => {
                debug!("Loaded {} samples from store", all.len());
                Some(all)
            }
            Err(e) => {
                error!("Failed to list samples: {:#}", e);
                None
            }
        };

        let assigned = match self.store.get_sample(&assigned_id).await {
            Ok(Some(sample)) => {
                debug!("Assigned sample loaded: {}", sample.label);
                Some(sample)
            }
            Ok(None) => {
                warn!("Assigned sample {} not found in store", assigned_id);
                None
            }
            Err(e) => {
                error!("Failed to fetch assigned sample {}: {:#}", assigned_id, e);
                None
            }
        };

        let ordered = match all {
            Some(all) => order_with_assigned(all, assigned),
            // partial: only what could be fetched
            None => assigned.into_iter().collect(),
        };

        info!("Sample list ready with {} items", ordered.len());
        ResolvedSamples::new(ordered)
    }

    /// Cache first; on a miss, read the user profile and populate the cache.
    async fn assigned_sample_id(&self, uid: Option<&str>) -> Option<String> {
        // ---
        match self.cache.get(ASSIGNED_SAMPLE_KEY).await {
            Ok(Some(id)) => {
                debug!("Assigned sample id from cache: {}", id);
                return Some(id);
            }
            Ok(None) => {}
            Err(e) => warn!("Cache read failed, falling back to store: {:#}", e),
        }

        let uid = uid?;
        debug!("No cached assignment, fetching profile for {}", uid);

        let profile = match self.store.get_user_profile(uid).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                error!("User profile {} does not exist", uid);
                return None;
            }
            Err(e) => {
                error!("Failed to fetch user profile {}: {:#}", uid, e);
                return None;
            }
        };

        let id = profile.assigned_sample?;
        if let Err(e) = self.cache.set(ASSIGNED_SAMPLE_KEY, &id).await {
            warn!("Failed to cache assigned sample id: {:#}", e);
        }
        Some(id)
    }
}

/// Put `assigned` first, followed by every other sample in the given order.
/// Without an assigned sample the list is returned unchanged.
pub fn order_with_assigned(all: Vec<Sample>, assigned: Option<Sample>) -> Vec<Sample> {
    // ---
    match assigned {
        Some(assigned) => {
            let mut ordered = Vec::with_capacity(all.len().max(1));
            let assigned_id = assigned.id.clone();
            ordered.push(assigned);
            ordered.extend(all.into_iter().filter(|s| s.id != assigned_id));
            ordered
        }
        None => all,
    }
}
