use sqlx::SqlitePool;

use crate::retry::RetryPolicy;
use crate::services::EnrollmentService;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub enrollments: EnrollmentService,
}

impl AppState {
    pub fn new(db: SqlitePool, retry: RetryPolicy) -> Self {
        Self {
            enrollments: EnrollmentService::new(db.clone(), retry),
            db,
        }
    }
}
