use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use crate::models::Slot;

/// One completed drag gesture. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveIntent {
    pub course_id: String,
    pub from: Slot,
    pub to: Slot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveDrag {
    pub course_id: String,
    pub origin: Slot,
    /// Droppable slot under the pointer, for highlighting.
    pub over: Option<Slot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropResult {
    Move(MoveIntent),
    /// Dropped back where it started.
    Unchanged,
    /// Dropped outside every zone, cancelled, or no drag in progress.
    Cancelled,
}

/// Turns pointer gestures into move intents. Holds no schedule data and
/// never talks to the coordinator itself.
#[derive(Debug, Clone)]
pub struct DragSurface {
    zones: BTreeSet<Slot>,
    active: Option<ActiveDrag>,
}

impl DragSurface {
    pub fn new(zones: impl IntoIterator<Item = Slot>) -> Self {
        Self {
            zones: zones.into_iter().collect(),
            active: None,
        }
    }

    /// Every (term, period) combination in the given ranges is a drop zone.
    pub fn grid(terms: RangeInclusive<i32>, periods: RangeInclusive<i32>) -> Self {
        Self::new(terms.flat_map(|t| periods.clone().map(move |p| Slot::new(t, p))))
    }

    pub fn is_droppable(&self, slot: Slot) -> bool {
        self.zones.contains(&slot)
    }

    pub fn active(&self) -> Option<&ActiveDrag> {
        self.active.as_ref()
    }

    /// Starting a new drag discards any unfinished one.
    pub fn begin(&mut self, course_id: impl Into<String>, origin: Slot) {
        self.active = Some(ActiveDrag {
            course_id: course_id.into(),
            origin,
            over: None,
        });
    }

    pub fn hover(&mut self, slot: Option<Slot>) {
        let over = slot.filter(|s| self.zones.contains(s));
        if let Some(active) = self.active.as_mut() {
            active.over = over;
        }
    }

    pub fn drop_on(&mut self, target: Option<Slot>) -> DropResult {
        let Some(active) = self.active.take() else {
            return DropResult::Cancelled;
        };

        match target {
            Some(to) if !self.zones.contains(&to) => DropResult::Cancelled,
            None => DropResult::Cancelled,
            Some(to) if to == active.origin => DropResult::Unchanged,
            Some(to) => DropResult::Move(MoveIntent {
                course_id: active.course_id,
                from: active.origin,
                to,
            }),
        }
    }

    pub fn cancel(&mut self) {
        self.active = None;
    }
}
