//! Long-lived diagnostics controller.
//!
//! Owns the loaded sample list, the current selection and the last prediction,
//! and enforces that at most one sync is in flight: a second sync started
//! while one is pending is rejected with [`SyncError::Busy`], so the pending
//! result is never raced.
//!
//! Every session change bumps an epoch. A reload or sync that started under
//! an older epoch drops its result instead of writing it over the state of
//! the session that replaced it.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::models::{HealthBand, PredictionResult, Sample};
use crate::normalize::{normalize, PayloadDefaults};
use crate::predict::{PredictError, PredictionClient};
use crate::resolver::SampleResolver;
use crate::session::{SessionState, Subscription};

// ---

#[derive(Debug, Error)]
pub enum SyncError {
    // ---
    #[error("a sync is already in progress")]
    Busy,

    #[error("no sample is loaded")]
    NoSamples,

    #[error("the session changed while the sync was in flight")]
    SessionChanged,

    #[error(transparent)]
    Prediction(#[from] PredictError),
}

/// Tunables for the sync action.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub payload_defaults: PayloadDefaults,
    /// Minimum perceived duration of a sync so a loading indicator does not flicker.
    pub min_duration: Duration,
    pub health_alert_threshold: f64,
}

impl SyncSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            payload_defaults: cfg.payload_defaults.clone(),
            min_duration: cfg.sync_min_duration,
            health_alert_threshold: cfg.health_alert_threshold,
        }
    }
}

#[derive(Debug, Default)]
struct ViewState {
    samples: Vec<Sample>,
    selected: usize,
    results: Option<PredictionResult>,
    /// Sample `results` was predicted from.
    synced_sample: Option<SampleSummary>,
    last_sync: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleSummary {
    pub id: String,
    pub label: String,
}

impl From<&Sample> for SampleSummary {
    fn from(sample: &Sample) -> Self {
        Self {
            id: sample.id.clone(),
            label: sample.label.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleListView {
    pub selected: usize,
    pub samples: Vec<SampleSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentView {
    pub name: &'static str,
    pub health_percent: f64,
    pub band: HealthBand,
    pub status: String,
    pub rul_km: f64,
    pub needs_service: bool,
}

/// Everything the dashboard renders, fully populated or explicitly absent.
///
/// `sample_label` is the current selection; `result_sample` is the sample the
/// health figures belong to. They differ after cycling without a new sync.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub sample_label: Option<String>,
    pub result_sample: Option<SampleSummary>,
    pub selected: usize,
    pub sample_count: usize,
    pub syncing: bool,
    pub overall_health: Option<u8>,
    pub components: Vec<ComponentView>,
    pub last_sync: Option<DateTime<Utc>>,
}

/// Clears the busy flag when the sync finishes or its future is dropped.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct DiagnosticsController {
    resolver: SampleResolver,
    client: PredictionClient,
    session: Arc<SessionState>,
    settings: SyncSettings,
    state: RwLock<ViewState>,
    busy: AtomicBool,
    epoch: AtomicU64,
}

impl DiagnosticsController {
    // ---
    pub fn new(
        resolver: SampleResolver,
        client: PredictionClient,
        session: Arc<SessionState>,
        settings: SyncSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            resolver,
            client,
            session,
            settings,
            state: RwLock::new(ViewState::default()),
            busy: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        })
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    /// Reload on sign-in, reset on sign-out. Keep the returned subscription
    /// alive for as long as the controller should follow the session.
    pub fn watch_session(self: &Arc<Self>) -> Subscription {
        // ---
        let controller: Weak<Self> = Arc::downgrade(self);
        self.session.on_auth_state_changed(move |user| {
            let Some(controller) = controller.upgrade() else {
                return;
            };
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                warn!("Auth state changed outside the runtime, ignoring");
                return;
            };
            // bumped here, in notification order, so tasks that finish out of
            // order still know which session they belong to
            let epoch = controller.advance_epoch();
            let signed_in = user.is_some();
            runtime.spawn(async move {
                if signed_in {
                    controller.reload_at(epoch).await;
                } else {
                    controller.reset_at(epoch).await;
                }
            });
        })
    }

    fn advance_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::Acquire) == epoch
    }

    /// Re-run sample resolution for the signed-in user. Selection returns to 0.
    pub async fn reload(&self) -> usize {
        self.reload_at(self.epoch.load(Ordering::Acquire)).await
    }

    async fn reload_at(&self, epoch: u64) -> usize {
        // ---
        if !self.is_current(epoch) {
            return self.state.read().await.samples.len();
        }
        let uid = self.session.current_user().map(|u| u.uid);
        let resolved = self.resolver.load(uid.as_deref()).await;

        let mut state = self.state.write().await;
        if !self.is_current(epoch) {
            debug!(
                "Session changed during reload, dropping {} samples",
                resolved.samples.len()
            );
            return state.samples.len();
        }
        state.samples = resolved.samples;
        state.selected = resolved.selected;
        state.samples.len()
    }

    /// Forget samples and results. Reloads and syncs still in flight are
    /// discarded when they finish.
    pub async fn reset(&self) {
        let epoch = self.advance_epoch();
        self.reset_at(epoch).await;
    }

    async fn reset_at(&self, epoch: u64) {
        // ---
        let mut state = self.state.write().await;
        if self.is_current(epoch) {
            *state = ViewState::default();
            debug!("Dashboard state reset");
        }
    }

    /// Advance the selection, wrapping around. `None` when nothing is loaded.
    pub async fn next_sample(&self) -> Option<Sample> {
        // ---
        let mut state = self.state.write().await;
        if state.samples.is_empty() {
            return None;
        }
        state.selected = (state.selected + 1) % state.samples.len();
        info!("Switching to sample index {}", state.selected);
        state.samples.get(state.selected).cloned()
    }

    pub async fn current_sample(&self) -> Option<Sample> {
        let state = self.state.read().await;
        state.samples.get(state.selected).cloned()
    }

    pub async fn results(&self) -> Option<PredictionResult> {
        self.state.read().await.results.clone()
    }

    pub fn is_syncing(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Submit the selected sample for prediction and keep the result.
    ///
    /// Rejected with [`SyncError::Busy`] while another sync is pending. Both
    /// success and failure are padded to the configured minimum duration.
    pub async fn sync_selected(&self) -> Result<PredictionResult, SyncError> {
        // ---
        let Some(_guard) = BusyGuard::acquire(&self.busy) else {
            warn!("Sync requested while another is in flight, rejecting");
            return Err(SyncError::Busy);
        };

        info!("=== SYNC STARTED ===");
        let started = Instant::now();
        let outcome = self.run_sync().await;

        let elapsed = started.elapsed();
        if elapsed < self.settings.min_duration {
            tokio::time::sleep(self.settings.min_duration - elapsed).await;
        }

        match &outcome {
            Ok(_) => info!("=== SYNC COMPLETED ==="),
            Err(e) => error!("Sync failed: {}", e),
        }
        outcome
    }

    async fn run_sync(&self) -> Result<PredictionResult, SyncError> {
        // ---
        let epoch = self.epoch.load(Ordering::Acquire);
        let sample = self.current_sample().await.ok_or(SyncError::NoSamples)?;
        info!("Selected sample: {:?} ({})", sample.label, sample.id);

        let payload = normalize(&sample, &self.settings.payload_defaults);
        let result = self.client.predict(&payload).await?;

        let mut state = self.state.write().await;
        if !self.is_current(epoch) {
            return Err(SyncError::SessionChanged);
        }
        state.results = Some(result.clone());
        state.synced_sample = Some(SampleSummary::from(&sample));
        state.last_sync = Some(Utc::now());
        Ok(result)
    }

    pub async fn sample_list(&self) -> SampleListView {
        // ---
        let state = self.state.read().await;
        SampleListView {
            selected: state.selected,
            samples: state.samples.iter().map(SampleSummary::from).collect(),
        }
    }

    pub async fn snapshot(&self) -> DashboardSnapshot {
        // ---
        let state = self.state.read().await;
        let threshold = self.settings.health_alert_threshold;

        let components = state
            .results
            .iter()
            .flat_map(|r| r.components())
            .map(|(name, health)| ComponentView {
                name,
                health_percent: health.health_percent,
                band: health.band(),
                status: health.status.clone(),
                rul_km: health.rul_km,
                needs_service: health.needs_service(threshold),
            })
            .collect();

        DashboardSnapshot {
            sample_label: state.samples.get(state.selected).map(|s| s.label.clone()),
            result_sample: state.synced_sample.clone(),
            selected: state.selected,
            sample_count: state.samples.len(),
            syncing: self.is_syncing(),
            overall_health: state.results.as_ref().map(PredictionResult::overall_health),
            components,
            last_sync: state.last_sync,
        }
    }
}
