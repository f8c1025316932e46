use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{
    Course, CourseRow, Enrollment, NewCourseRequest, ScheduledCourse, ScheduledCourseRow, Slot,
};

const COURSE_COLUMNS: &str =
    "c.id, c.code, c.name, c.credits, c.terms, c.periods, c.subjects, c.description, c.updated_at";

fn decode_err(e: serde_json::Error) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(e))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, sqlx::Error> {
    serde_json::to_string(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

pub async fn fetch_courses(db: &SqlitePool) -> Result<Vec<Course>, sqlx::Error> {
    let sql = format!("SELECT {} FROM courses c ORDER BY c.code", COURSE_COLUMNS);
    sqlx::query_as::<_, CourseRow>(&sql)
        .fetch_all(db)
        .await?
        .into_iter()
        .map(|row| Course::try_from(row).map_err(decode_err))
        .collect()
}

pub async fn find_course_by_id(db: &SqlitePool, id: &str) -> Result<Option<Course>, sqlx::Error> {
    let sql = format!("SELECT {} FROM courses c WHERE c.id = ?", COURSE_COLUMNS);
    sqlx::query_as::<_, CourseRow>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await?
        .map(|row| Course::try_from(row).map_err(decode_err))
        .transpose()
}

/// Insert a catalog course together with its (symmetric) exclusion pairs.
pub async fn insert_course(db: &SqlitePool, req: &NewCourseRequest) -> Result<Course, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    let terms = encode(&req.terms)?;
    let periods = encode(&req.periods)?;
    let subjects = encode(&req.subjects)?;

    let mut tx = db.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO courses
            (id, code, name, credits, terms, periods, subjects, description, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&id)
    .bind(&req.code)
    .bind(&req.name)
    .bind(req.credits)
    .bind(&terms)
    .bind(&periods)
    .bind(&subjects)
    .bind(&req.description)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    for other in &req.excludes {
        for (a, b) in [(id.as_str(), other.as_str()), (other.as_str(), id.as_str())] {
            sqlx::query(
                "INSERT OR IGNORE INTO course_exclusions (course_id, excluded_course_id) VALUES (?, ?)",
            )
            .bind(a)
            .bind(b)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;

    Ok(Course {
        id,
        code: req.code.clone(),
        name: req.name.clone(),
        credits: req.credits,
        terms: req.terms.clone(),
        periods: req.periods.clone(),
        subjects: req.subjects.clone(),
        description: req.description.clone(),
        updated_at: now,
    })
}

pub async fn fetch_schedule(
    db: &SqlitePool,
    user_id: &str,
) -> Result<Vec<ScheduledCourse>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {}, e.id AS enrollment_id, e.term, e.period
        FROM enrollments e
        JOIN courses c ON c.id = e.course_id
        WHERE e.user_id = ?
        ORDER BY e.term, e.period, c.code
        "#,
        COURSE_COLUMNS
    );
    sqlx::query_as::<_, ScheduledCourseRow>(&sql)
        .bind(user_id)
        .fetch_all(db)
        .await?
        .into_iter()
        .map(|row| ScheduledCourse::try_from(row).map_err(decode_err))
        .collect()
}

pub async fn find_scheduled_course(
    db: &SqlitePool,
    user_id: &str,
    course_id: &str,
) -> Result<Option<ScheduledCourse>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {}, e.id AS enrollment_id, e.term, e.period
        FROM enrollments e
        JOIN courses c ON c.id = e.course_id
        WHERE e.user_id = ? AND e.course_id = ?
        "#,
        COURSE_COLUMNS
    );
    sqlx::query_as::<_, ScheduledCourseRow>(&sql)
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(db)
        .await?
        .map(|row| ScheduledCourse::try_from(row).map_err(decode_err))
        .transpose()
}

pub async fn find_enrollment_by_id(
    db: &SqlitePool,
    id: &str,
) -> Result<Option<Enrollment>, sqlx::Error> {
    sqlx::query_as::<_, Enrollment>(
        "SELECT id, user_id, course_id, term, period, created_at, updated_at FROM enrollments WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(db)
    .await
}

/// Code of a course already in the user's schedule that excludes `course_id`.
pub async fn find_excluded_enrollment(
    db: &SqlitePool,
    user_id: &str,
    course_id: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT c.code
        FROM course_exclusions x
        JOIN enrollments e ON e.course_id = x.excluded_course_id
        JOIN courses c ON c.id = x.excluded_course_id
        WHERE x.course_id = ? AND e.user_id = ?
        LIMIT 1
        "#,
    )
    .bind(course_id)
    .bind(user_id)
    .fetch_optional(db)
    .await
}

pub async fn insert_enrollment(
    db: &SqlitePool,
    user_id: &str,
    course_id: &str,
    slot: Slot,
) -> Result<Enrollment, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO enrollments (id, user_id, course_id, term, period, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(course_id)
    .bind(slot.term)
    .bind(slot.period)
    .bind(&now)
    .execute(db)
    .await?;

    Ok(Enrollment {
        id,
        user_id: user_id.to_string(),
        course_id: course_id.to_string(),
        term: slot.term,
        period: slot.period,
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Returns false when the user has no enrollment for the course.
pub async fn update_enrollment_slot(
    db: &SqlitePool,
    user_id: &str,
    course_id: &str,
    slot: Slot,
) -> Result<bool, sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        r#"
        UPDATE enrollments
        SET term = ?1,
            period = ?2,
            updated_at = ?3
        WHERE user_id = ?4 AND course_id = ?5
        "#,
    )
    .bind(slot.term)
    .bind(slot.period)
    .bind(now)
    .bind(user_id)
    .bind(course_id)
    .execute(db)
    .await?
    .rows_affected();

    Ok(result > 0)
}

pub async fn delete_enrollment(db: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM enrollments WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?
        .rows_affected();

    Ok(result > 0)
}
