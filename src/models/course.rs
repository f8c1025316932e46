use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::enrollment::{MAX_PERIOD, MAX_TERM};

/// Catalog entry. The schedule editor never changes these fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub code: String,
    pub name: String,
    pub credits: f64,
    /// Terms the course may be offered in. Empty means any term.
    #[serde(default)]
    pub terms: Vec<i32>,
    /// Periods within a term the course may run in. Empty means any period.
    #[serde(default)]
    pub periods: Vec<i32>,
    #[serde(default)]
    pub subjects: Vec<String>,
    pub description: Option<String>,
    pub updated_at: String,
}

impl Course {
    pub fn offered_in_term(&self, term: i32) -> bool {
        self.terms.is_empty() || self.terms.contains(&term)
    }

    /// Snap a requested period to one the course actually runs in.
    /// Picks the nearest offered period; ties go to the lower one.
    pub fn normalize_period(&self, requested: i32) -> i32 {
        if self.periods.is_empty() || self.periods.contains(&requested) {
            return requested;
        }
        self.periods
            .iter()
            .copied()
            .min_by_key(|p| ((p - requested).abs(), *p))
            .unwrap_or(requested)
    }
}

/// Raw `courses` row; list columns are stored as JSON text.
#[derive(Debug, Clone, FromRow)]
pub struct CourseRow {
    pub id: String,
    pub code: String,
    pub name: String,
    pub credits: f64,
    pub terms: String,
    pub periods: String,
    pub subjects: String,
    pub description: Option<String>,
    pub updated_at: String,
}

impl TryFrom<CourseRow> for Course {
    type Error = serde_json::Error;

    fn try_from(row: CourseRow) -> Result<Self, Self::Error> {
        Ok(Course {
            id: row.id,
            code: row.code,
            name: row.name,
            credits: row.credits,
            terms: serde_json::from_str(&row.terms)?,
            periods: serde_json::from_str(&row.periods)?,
            subjects: serde_json::from_str(&row.subjects)?,
            description: row.description,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCourseRequest {
    pub code: String,
    pub name: String,
    pub credits: f64,
    #[serde(default)]
    pub terms: Vec<i32>,
    #[serde(default)]
    pub periods: Vec<i32>,
    #[serde(default)]
    pub subjects: Vec<String>,
    pub description: Option<String>,
    /// Ids of catalog courses that cannot be taken together with this one.
    #[serde(default)]
    pub excludes: Vec<String>,
}

impl NewCourseRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.code.trim().is_empty() {
            return Err("code must not be empty".to_string());
        }
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if !self.credits.is_finite() || self.credits < 0.0 {
            return Err("credits must be a non-negative number".to_string());
        }
        if let Some(t) = self.terms.iter().find(|t| !(1..=MAX_TERM).contains(*t)) {
            return Err(format!("term {} is out of range 1..={}", t, MAX_TERM));
        }
        if let Some(p) = self.periods.iter().find(|p| !(1..=MAX_PERIOD).contains(*p)) {
            return Err(format!("period {} is out of range 1..={}", p, MAX_PERIOD));
        }
        Ok(())
    }
}
