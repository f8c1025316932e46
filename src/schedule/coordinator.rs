//! Optimistic schedule mutations.
//!
//! A move is applied to the cache synchronously in [`Coordinator::submit`],
//! then [`PendingMove::settle`] sends exactly one request and either
//! reconciles the entry with the server record or restores the last slot the
//! server is known to hold.
//!
//! Moves of the same course are ordered by sequence number: only the response
//! to the most recently submitted move may touch the cache. Older responses
//! are discarded, although a successful one still updates the slot a later
//! revert falls back to.
//!
//! A handle dropped before its response arrives counts as a failed move that
//! nobody is told about.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::{ApiError, EnrollmentApi, ErrorKind};
use crate::models::{MoveEnrollmentRequest, NewEnrollmentRequest, ScheduledCourse, Slot};
use crate::schedule::cache::{self, ScheduleCache};
use crate::schedule::drag::MoveIntent;
use crate::schedule::notice::{Notifier, move_failed_message, remove_failed_message};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    #[error("course is already in that slot")]
    Unchanged,

    #[error("{0}")]
    InvalidSlot(String),

    #[error("course {0} is not in the schedule")]
    UnknownCourse(String),

    #[error("schedule view is closed")]
    ViewClosed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MoveOutcome {
    /// The server accepted the move; the cache shows the stored slot.
    Confirmed(Slot),
    /// The move failed and the cache went back to `restored`.
    Reverted { restored: Slot, error: ApiError },
    /// A newer move of the same course was submitted before this one settled.
    Superseded,
    /// The view was closed while the request was in flight.
    Abandoned,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoveOutcome {
    Removed,
    /// Nothing in the cache had that enrollment id.
    Missing,
    /// The delete failed and the entry was put back.
    Restored(ApiError),
    Abandoned,
}

/// Per-course bookkeeping while at least one move is in flight.
#[derive(Debug)]
struct Track {
    latest: u64,
    in_flight: usize,
    /// Last slot the server is known to hold.
    confirmed: Slot,
    confirmed_seq: u64,
    /// The latest move has already been reverted.
    latest_reverted: bool,
}

struct Inner {
    api: Arc<dyn EnrollmentApi>,
    cache: Weak<RwLock<ScheduleCache>>,
    tracks: Mutex<HashMap<String, Track>>,
    /// Courses whose entry is out of the cache while a delete is in flight,
    /// with the slot the server settled on in the meantime.
    removing: Mutex<HashMap<String, Option<Slot>>>,
    next_seq: AtomicU64,
    notifier: Notifier,
}

/// Cheap to clone; every clone coordinates the same view.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

/// A move that is already visible in the cache but not yet sent.
#[must_use = "a pending move does nothing until settled"]
pub struct PendingMove {
    inner: Arc<Inner>,
    intent: MoveIntent,
    code: String,
    seq: u64,
    settled: bool,
}

impl PendingMove {
    pub fn intent(&self) -> &MoveIntent {
        &self.intent
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Send the move and reconcile. Always resolves; failures become
    /// [`MoveOutcome::Reverted`].
    pub async fn settle(mut self) -> MoveOutcome {
        let request = MoveEnrollmentRequest::new(self.intent.course_id.clone(), self.intent.to);
        let result = self.inner.api.move_enrollment(&request).await;
        self.settled = true;
        self.inner.resolve(&self.intent, &self.code, self.seq, result)
    }
}

impl Drop for PendingMove {
    fn drop(&mut self) {
        if !self.settled {
            self.inner.withdraw(&self.intent, &self.code, self.seq);
        }
    }
}

impl Coordinator {
    pub fn new(
        api: Arc<dyn EnrollmentApi>,
        cache: Weak<RwLock<ScheduleCache>>,
        notifier: Notifier,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                cache,
                tracks: Mutex::new(HashMap::new()),
                removing: Mutex::new(HashMap::new()),
                next_seq: AtomicU64::new(1),
                notifier,
            }),
        }
    }

    /// Apply the move to the cache right away. No network activity happens
    /// until the returned handle is settled; dropping it unsettled undoes the
    /// move.
    pub fn submit(&self, intent: MoveIntent) -> Result<PendingMove, SubmitError> {
        intent.to.validate().map_err(SubmitError::InvalidSlot)?;

        let shared = self.inner.cache.upgrade().ok_or(SubmitError::ViewClosed)?;
        let mut cache = cache::write(&shared);

        let (current, code) = cache
            .get(&intent.course_id)
            .map(|c| (c.slot(), c.course.code.clone()))
            .ok_or_else(|| SubmitError::UnknownCourse(intent.course_id.clone()))?;
        if current == intent.to {
            return Err(SubmitError::Unchanged);
        }
        if current != intent.from {
            debug!(
                "move of {} starts from {} while the drag reported {}",
                code, current, intent.from
            );
        }

        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        {
            let mut tracks = self.inner.tracks();
            let track = tracks.entry(intent.course_id.clone()).or_insert(Track {
                latest: 0,
                in_flight: 0,
                confirmed: current,
                confirmed_seq: 0,
                latest_reverted: false,
            });
            track.latest = seq;
            track.in_flight += 1;
            track.latest_reverted = false;
        }

        cache.apply_move(&intent.course_id, intent.to);
        debug!("optimistic move #{} of {}: {} -> {}", seq, code, current, intent.to);

        Ok(PendingMove {
            inner: self.inner.clone(),
            intent,
            code,
            seq,
            settled: false,
        })
    }

    pub async fn move_course(&self, intent: MoveIntent) -> Result<MoveOutcome, SubmitError> {
        Ok(self.submit(intent)?.settle().await)
    }

    /// Whether a move of this course is still waiting for the server.
    pub fn is_pending(&self, course_id: &str) -> bool {
        self.inner.tracks().contains_key(course_id)
    }

    /// The cache was just rebuilt from the server listing. Pending moves that
    /// fail from now on fall back to the listed slots.
    pub fn resynced(&self, cache: &ScheduleCache) {
        for (course_id, track) in self.inner.tracks().iter_mut() {
            if let Some(entry) = cache.get(course_id) {
                track.confirmed = entry.slot();
            }
        }
    }

    /// Remove optimistically; the entry comes back if the server refuses.
    /// A 404 means the server no longer has it either, which counts as removed.
    pub async fn remove_course(&self, enrollment_id: &str) -> RemoveOutcome {
        let Some(shared) = self.inner.cache.upgrade() else {
            return RemoveOutcome::Abandoned;
        };
        let removed = {
            let mut cache = cache::write(&shared);
            let removed = cache.remove(enrollment_id);
            if let Some(entry) = &removed {
                self.inner.removing().insert(entry.course_id().to_string(), None);
            }
            removed
        };
        drop(shared);

        let Some(mut entry) = removed else {
            return RemoveOutcome::Missing;
        };

        let result = self.inner.api.delete_enrollment(enrollment_id).await;
        let parked = self.inner.removing().remove(entry.course_id()).flatten();
        let Some(shared) = self.inner.cache.upgrade() else {
            return RemoveOutcome::Abandoned;
        };

        match result {
            Ok(()) => {
                info!("removed {} from schedule", entry.course.code);
                RemoveOutcome::Removed
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("{} was already gone on the server", entry.course.code);
                RemoveOutcome::Removed
            }
            Err(e) => {
                warn!("removing {} failed: {}", entry.course.code, e);
                let message = remove_failed_message(&entry.course.code, &e);
                if let Some(slot) = parked {
                    debug!("{} comes back at {} settled during the delete", entry.course.code, slot);
                    entry.set_slot(slot);
                }
                cache::write(&shared).insert(entry);
                self.inner.notifier.failure(&e, message);
                RemoveOutcome::Restored(e)
            }
        }
    }

    /// Create an enrollment. The entry only appears once the server has
    /// assigned it an id.
    pub async fn add_course(
        &self,
        course_id: &str,
        slot: Slot,
    ) -> Result<ScheduledCourse, ApiError> {
        slot.validate().map_err(ApiError::Invalid)?;

        let request = NewEnrollmentRequest {
            course_id: course_id.to_string(),
            term: slot.term,
            period: slot.period,
        };

        match self.inner.api.create_enrollment(&request).await {
            Ok(record) => {
                if let Some(shared) = self.inner.cache.upgrade() {
                    cache::write(&shared).insert(record.clone());
                }
                info!("added {} at {}", record.course.code, record.slot());
                Ok(record)
            }
            Err(e) => {
                warn!("adding course {} failed: {}", course_id, e);
                let message = match e.server_message() {
                    Some(reason) => format!("Could not add the course: {}", reason),
                    None => format!("Could not add the course: {}", e),
                };
                self.inner.notifier.failure(&e, message);
                Err(e)
            }
        }
    }
}

impl Inner {
    fn tracks(&self) -> std::sync::MutexGuard<'_, HashMap<String, Track>> {
        self.tracks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn removing(&self) -> std::sync::MutexGuard<'_, HashMap<String, Option<Slot>>> {
        self.removing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remember the slot the server settled on for a course whose entry is
    /// out of the cache.
    fn park(&self, course_id: &str, slot: Slot) {
        if let Some(parked) = self.removing().get_mut(course_id) {
            *parked = Some(slot);
        }
    }

    /// The handle went away before a response was seen. Only the latest move
    /// rolls the cache back; no notice is raised.
    fn withdraw(&self, intent: &MoveIntent, code: &str, seq: u64) {
        let course_id = intent.course_id.as_str();

        let restore_to = {
            let mut tracks = self.tracks();
            let Some(track) = tracks.get_mut(course_id) else {
                return;
            };
            track.in_flight = track.in_flight.saturating_sub(1);
            let is_latest = seq == track.latest;
            if is_latest {
                track.latest_reverted = true;
            }
            let restore_to = track.confirmed;
            if track.in_flight == 0 {
                tracks.remove(course_id);
            }
            is_latest.then_some(restore_to)
        };

        let Some(slot) = restore_to else {
            return;
        };
        let Some(shared) = self.cache.upgrade() else {
            return;
        };
        if !cache::write(&shared).revert_move(course_id, slot) {
            self.park(course_id, slot);
        }
        debug!("move #{} of {} was never settled, back to {}", seq, code, slot);
    }

    fn resolve(
        &self,
        intent: &MoveIntent,
        code: &str,
        seq: u64,
        result: Result<ScheduledCourse, ApiError>,
    ) -> MoveOutcome {
        let course_id = intent.course_id.as_str();

        let (is_latest, restore_to, resync_stale) = {
            let mut tracks = self.tracks();
            let Some(track) = tracks.get_mut(course_id) else {
                return MoveOutcome::Abandoned;
            };
            track.in_flight = track.in_flight.saturating_sub(1);

            if let Ok(record) = &result {
                if seq > track.confirmed_seq {
                    track.confirmed = record.slot();
                    track.confirmed_seq = seq;
                }
            }

            let is_latest = seq == track.latest;
            if is_latest && result.is_err() {
                track.latest_reverted = true;
            }
            // Latest move already rolled back, and now an older one turns out
            // to have been stored: the cache must follow the server.
            let resync_stale = !is_latest && track.latest_reverted && result.is_ok();
            let restore_to = track.confirmed;

            if track.in_flight == 0 {
                tracks.remove(course_id);
            }
            (is_latest, restore_to, resync_stale)
        };

        let Some(shared) = self.cache.upgrade() else {
            debug!("view closed, dropping response #{} for {}", seq, code);
            return MoveOutcome::Abandoned;
        };

        if !is_latest {
            if resync_stale {
                if cache::write(&shared).apply_move(course_id, restore_to).is_none() {
                    self.park(course_id, restore_to);
                }
                info!("{} follows stored slot {} after a stale success", code, restore_to);
            } else {
                debug!("discarding stale response #{} for {}", seq, code);
            }
            return MoveOutcome::Superseded;
        }

        match result {
            Ok(record) => {
                let stored = record.slot();
                if stored != intent.to {
                    info!("server placed {} at {} instead of {}", code, stored, intent.to);
                }
                if !cache::write(&shared).reconcile(record) {
                    self.park(course_id, stored);
                }
                MoveOutcome::Confirmed(stored)
            }
            Err(error) => {
                warn!("move of {} to {} failed: {}", code, intent.to, error);
                if !cache::write(&shared).revert_move(course_id, restore_to) {
                    self.park(course_id, restore_to);
                }
                self.notifier
                    .failure(&error, move_failed_message(code, &error));
                MoveOutcome::Reverted {
                    restored: restore_to,
                    error,
                }
            }
        }
    }
}
