#![allow(dead_code)]

use course_planner::models::{Course, ScheduledCourse, Slot};

pub fn course(id: &str, code: &str) -> Course {
    Course {
        id: id.to_string(),
        code: code.to_string(),
        name: format!("{} course", code),
        credits: 2.0,
        terms: vec![],
        periods: vec![],
        subjects: vec!["cs".to_string()],
        description: None,
        updated_at: "2026-01-01T00:00:00+00:00".to_string(),
    }
}

pub fn scheduled(id: &str, code: &str, slot: Slot) -> ScheduledCourse {
    ScheduledCourse {
        course: course(id, code),
        enrollment_id: format!("e-{}", id),
        term: slot.term,
        period: slot.period,
    }
}
