use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::client::{ApiError, EnrollmentApi};
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::schedule::cache::{self, ScheduleCache, SharedCache};
use crate::schedule::coordinator::{Coordinator, PendingMove};
use crate::schedule::drag::DropResult;
use crate::schedule::notice::Notifier;

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    /// Show a placeholder; nothing has come back from the server yet.
    Loading,
    Ready,
    Failed(String),
}

/// One mounted schedule page. Owns the cache; dropping the view makes every
/// late response a no-op.
pub struct ScheduleView {
    cache: SharedCache,
    api: Arc<dyn EnrollmentApi>,
    coordinator: Coordinator,
    notifier: Notifier,
    retry: RetryPolicy,
    state: LoadState,
}

impl ScheduleView {
    /// Starts empty and `Loading`. Call [`ScheduleView::sync`] before showing data.
    pub fn open(api: Arc<dyn EnrollmentApi>, notifier: Notifier, retry: RetryPolicy) -> Self {
        let cache: SharedCache = Arc::new(RwLock::new(ScheduleCache::new()));
        let coordinator = Coordinator::new(api.clone(), Arc::downgrade(&cache), notifier.clone());

        Self {
            cache,
            api,
            coordinator,
            notifier,
            retry,
            state: LoadState::Loading,
        }
    }

    /// Rebuild the cache from the server listing, retrying transient failures.
    pub async fn sync(&mut self) -> &LoadState {
        self.state = LoadState::Loading;

        let api = &self.api;
        let result = retry_with_backoff(&self.retry, ApiError::is_transient, || {
            api.list_enrollments()
        })
        .await;

        self.state = match result {
            Ok(courses) => {
                info!("loaded {} scheduled courses", courses.len());
                let mut cache = cache::write(&self.cache);
                cache.load(courses);
                self.coordinator.resynced(&cache);
                LoadState::Ready
            }
            Err(e) => {
                warn!("schedule sync failed: {}", e);
                let message = format!("Could not load your schedule: {}", e);
                self.notifier.failure(&e, message.clone());
                LoadState::Failed(message)
            }
        };
        &self.state
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    /// Current schedule, or `None` while loading or after a failed sync.
    pub fn snapshot(&self) -> Option<ScheduleCache> {
        match self.state {
            LoadState::Ready => Some(cache::read(&self.cache).clone()),
            _ => None,
        }
    }

    pub fn coordinator(&self) -> Coordinator {
        self.coordinator.clone()
    }

    /// Forward a finished drag. Unchanged and cancelled drops stop here.
    pub fn submit_drop(&self, result: DropResult) -> Option<PendingMove> {
        match result {
            DropResult::Move(intent) => match self.coordinator.submit(intent) {
                Ok(pending) => Some(pending),
                Err(e) => {
                    warn!("drop rejected: {}", e);
                    None
                }
            },
            DropResult::Unchanged | DropResult::Cancelled => None,
        }
    }
}
