use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::repository;
use crate::error::{AppError, conflict_on_unique};
use crate::models::*;
use crate::retry::{RetryPolicy, is_transient_db_error, retry_with_backoff};

/// Enrollment business rules on top of the repository.
/// Every database call goes through the shared retry policy.
#[derive(Clone)]
pub struct EnrollmentService {
    db: SqlitePool,
    retry: RetryPolicy,
}

impl EnrollmentService {
    pub fn new(db: SqlitePool, retry: RetryPolicy) -> Self {
        Self { db, retry }
    }

    pub async fn list_courses(&self) -> Result<Vec<Course>, AppError> {
        let db = &self.db;
        let courses =
            retry_with_backoff(&self.retry, is_transient_db_error, || repository::fetch_courses(db))
                .await?;
        Ok(courses)
    }

    pub async fn create_course(&self, req: NewCourseRequest) -> Result<Course, AppError> {
        req.validate().map_err(AppError::Validation)?;

        for excluded in &req.excludes {
            if self.find_course(excluded).await?.is_none() {
                return Err(AppError::Validation(format!(
                    "excluded course {} does not exist",
                    excluded
                )));
            }
        }

        let db = &self.db;
        let req = &req;
        let course = retry_with_backoff(&self.retry, is_transient_db_error, || {
            repository::insert_course(db, req)
        })
        .await
        .map_err(|e| conflict_on_unique(e, "A course with this code already exists"))?;

        info!("created course {} ({})", course.code, course.id);
        Ok(course)
    }

    pub async fn list_schedule(&self, user_id: &str) -> Result<Vec<ScheduledCourse>, AppError> {
        let db = &self.db;
        let schedule = retry_with_backoff(&self.retry, is_transient_db_error, || {
            repository::fetch_schedule(db, user_id)
        })
        .await?;
        Ok(schedule)
    }

    pub async fn enroll(
        &self,
        user_id: &str,
        req: NewEnrollmentRequest,
    ) -> Result<ScheduledCourse, AppError> {
        let course = self
            .find_course(&req.course_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Course".to_string()))?;
        let slot = self.place(&course, req.slot())?;

        let db = &self.db;
        let excluded = retry_with_backoff(&self.retry, is_transient_db_error, || {
            repository::find_excluded_enrollment(db, user_id, &course.id)
        })
        .await?;
        if let Some(code) = excluded {
            warn!("user {} tried to add {} while enrolled in {}", user_id, course.code, code);
            return Err(AppError::Conflict(format!(
                "{} cannot be taken together with {}",
                course.code, code
            )));
        }

        let enrollment = retry_with_backoff(&self.retry, is_transient_db_error, || {
            repository::insert_enrollment(db, user_id, &course.id, slot)
        })
        .await
        .map_err(|e| conflict_on_unique(e, "Course is already in your schedule"))?;

        info!("user {} enrolled in {} at {}", user_id, course.code, slot);
        Ok(ScheduledCourse {
            course,
            enrollment_id: enrollment.id,
            term: enrollment.term,
            period: enrollment.period,
        })
    }

    /// Move the user's enrollment for a course. The returned record carries the
    /// slot that was actually stored, which may differ from the request.
    pub async fn move_enrollment(
        &self,
        user_id: &str,
        req: MoveEnrollmentRequest,
    ) -> Result<ScheduledCourse, AppError> {
        let course = self
            .find_course(&req.course_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Course".to_string()))?;
        let slot = self.place(&course, req.slot())?;

        let db = &self.db;
        let updated = retry_with_backoff(&self.retry, is_transient_db_error, || {
            repository::update_enrollment_slot(db, user_id, &course.id, slot)
        })
        .await?;
        if !updated {
            return Err(AppError::NotFound("Enrollment".to_string()));
        }

        info!("user {} moved {} to {}", user_id, course.code, slot);
        retry_with_backoff(&self.retry, is_transient_db_error, || {
            repository::find_scheduled_course(db, user_id, &course.id)
        })
        .await?
        .ok_or_else(|| AppError::NotFound("Enrollment".to_string()))
    }

    pub async fn remove(&self, user_id: &str, enrollment_id: &str) -> Result<(), AppError> {
        let db = &self.db;
        let enrollment = retry_with_backoff(&self.retry, is_transient_db_error, || {
            repository::find_enrollment_by_id(db, enrollment_id)
        })
        .await?
        .ok_or_else(|| AppError::NotFound("Enrollment".to_string()))?;

        if enrollment.user_id != user_id {
            warn!("user {} tried to delete enrollment {} of another user", user_id, enrollment_id);
            return Err(AppError::Forbidden);
        }

        let deleted = retry_with_backoff(&self.retry, is_transient_db_error, || {
            repository::delete_enrollment(db, enrollment_id)
        })
        .await?;
        if !deleted {
            return Err(AppError::NotFound("Enrollment".to_string()));
        }

        info!("user {} removed enrollment {}", user_id, enrollment_id);
        Ok(())
    }

    async fn find_course(&self, course_id: &str) -> Result<Option<Course>, AppError> {
        let db = &self.db;
        let course = retry_with_backoff(&self.retry, is_transient_db_error, || {
            repository::find_course_by_id(db, course_id)
        })
        .await?;
        Ok(course)
    }

    /// Validate a requested slot against the course and normalize its period.
    fn place(&self, course: &Course, requested: Slot) -> Result<Slot, AppError> {
        requested.validate().map_err(AppError::Validation)?;
        if !course.offered_in_term(requested.term) {
            return Err(AppError::Conflict(format!(
                "{} is not offered in term {}",
                course.code, requested.term
            )));
        }
        Ok(Slot::new(requested.term, course.normalize_period(requested.period)))
    }
}
