use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::{ScheduledCourse, Slot};

/// Cache handle owned by the view. The coordinator only keeps a `Weak`.
pub type SharedCache = Arc<RwLock<ScheduleCache>>;

/// Every operation is a single in-memory step; a poisoned lock still holds a
/// consistent cache, so it is recovered rather than propagated.
pub(crate) fn read(cache: &RwLock<ScheduleCache>) -> RwLockReadGuard<'_, ScheduleCache> {
    cache.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write(cache: &RwLock<ScheduleCache>) -> RwLockWriteGuard<'_, ScheduleCache> {
    cache.write().unwrap_or_else(PoisonError::into_inner)
}

/// The user's enrolled courses, keyed by course id (at most one entry each).
/// Purely in-memory: there is no way to persist or restore a snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleCache {
    entries: BTreeMap<String, ScheduledCourse>,
}

impl ScheduleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything with a fresh server listing.
    pub fn load(&mut self, courses: Vec<ScheduledCourse>) {
        self.entries = courses
            .into_iter()
            .map(|c| (c.course.id.clone(), c))
            .collect();
    }

    /// Returns the slot the course occupied before the move.
    pub fn apply_move(&mut self, course_id: &str, to: Slot) -> Option<Slot> {
        let entry = self.entries.get_mut(course_id)?;
        let previous = entry.slot();
        entry.set_slot(to);
        Some(previous)
    }

    pub fn revert_move(&mut self, course_id: &str, original: Slot) -> bool {
        self.apply_move(course_id, original).is_some()
    }

    pub fn remove(&mut self, enrollment_id: &str) -> Option<ScheduledCourse> {
        let course_id = self
            .entries
            .values()
            .find(|c| c.enrollment_id == enrollment_id)
            .map(|c| c.course.id.clone())?;
        self.entries.remove(&course_id)
    }

    /// Overwrite an existing entry with the server's record. Courses that left
    /// the cache in the meantime are not brought back.
    pub fn reconcile(&mut self, record: ScheduledCourse) -> bool {
        match self.entries.get_mut(record.course_id()) {
            Some(entry) => {
                *entry = record;
                true
            }
            None => false,
        }
    }

    pub fn insert(&mut self, entry: ScheduledCourse) {
        self.entries.insert(entry.course.id.clone(), entry);
    }

    pub fn get(&self, course_id: &str) -> Option<&ScheduledCourse> {
        self.entries.get(course_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduledCourse> {
        self.entries.values()
    }

    /// term -> period -> courses, each cell ordered by course code.
    pub fn by_term(&self) -> BTreeMap<i32, BTreeMap<i32, Vec<&ScheduledCourse>>> {
        let mut grid: BTreeMap<i32, BTreeMap<i32, Vec<&ScheduledCourse>>> = BTreeMap::new();
        for entry in self.entries.values() {
            grid.entry(entry.term)
                .or_default()
                .entry(entry.period)
                .or_default()
                .push(entry);
        }
        for periods in grid.values_mut() {
            for cell in periods.values_mut() {
                cell.sort_by(|a, b| a.course.code.cmp(&b.course.code));
            }
        }
        grid
    }

    pub fn credits_by_term(&self) -> BTreeMap<i32, f64> {
        let mut totals = BTreeMap::new();
        for entry in self.entries.values() {
            *totals.entry(entry.term).or_insert(0.0) += entry.course.credits;
        }
        totals
    }
}
