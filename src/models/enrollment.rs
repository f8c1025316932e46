use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::course::{Course, CourseRow};

pub const MAX_TERM: i32 = 12;
pub const MAX_PERIOD: i32 = 6;

/// Where a course sits in the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slot {
    pub term: i32,
    pub period: i32,
}

impl Slot {
    pub const fn new(term: i32, period: i32) -> Self {
        Self { term, period }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_TERM).contains(&self.term) {
            return Err(format!("term {} is out of range 1..={}", self.term, MAX_TERM));
        }
        if !(1..=MAX_PERIOD).contains(&self.period) {
            return Err(format!(
                "period {} is out of range 1..={}",
                self.period, MAX_PERIOD
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "term {}, period {}", self.term, self.period)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub term: i32,
    pub period: i32,
    pub created_at: String,
    pub updated_at: String,
}

/// A catalog course joined with the current user's enrollment in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledCourse {
    #[serde(flatten)]
    pub course: Course,
    pub enrollment_id: String,
    pub term: i32,
    pub period: i32,
}

impl ScheduledCourse {
    pub fn course_id(&self) -> &str {
        &self.course.id
    }

    pub fn slot(&self) -> Slot {
        Slot::new(self.term, self.period)
    }

    pub fn set_slot(&mut self, slot: Slot) {
        self.term = slot.term;
        self.period = slot.period;
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ScheduledCourseRow {
    #[sqlx(flatten)]
    pub course: CourseRow,
    pub enrollment_id: String,
    pub term: i32,
    pub period: i32,
}

impl TryFrom<ScheduledCourseRow> for ScheduledCourse {
    type Error = serde_json::Error;

    fn try_from(row: ScheduledCourseRow) -> Result<Self, Self::Error> {
        Ok(ScheduledCourse {
            course: Course::try_from(row.course)?,
            enrollment_id: row.enrollment_id,
            term: row.term,
            period: row.period,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEnrollmentRequest {
    pub course_id: String,
    pub term: i32,
    pub period: i32,
}

impl NewEnrollmentRequest {
    pub fn slot(&self) -> Slot {
        Slot::new(self.term, self.period)
    }
}

/// Body of `PATCH /enrollments/move`. Accepts `term` as an alias of `newSemester`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveEnrollmentRequest {
    pub course_id: String,
    #[serde(alias = "term")]
    pub new_semester: i32,
    pub period: i32,
}

impl MoveEnrollmentRequest {
    pub fn new(course_id: impl Into<String>, to: Slot) -> Self {
        Self {
            course_id: course_id.into(),
            new_semester: to.term,
            period: to.period,
        }
    }

    pub fn slot(&self) -> Slot {
        Slot::new(self.new_semester, self.period)
    }
}
