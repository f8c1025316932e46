use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::models::*;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/courses", get(list_courses).post(create_course))
        .route("/enrollments", get(list_enrollments).post(create_enrollment))
        .route("/enrollments/move", patch(move_enrollment))
        .route("/enrollments/{id}", delete(delete_enrollment))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Malformed bodies become 400 with the envelope instead of axum's plain-text rejection.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn list_courses(State(state): State<AppState>) -> Result<Json<Envelope<Vec<Course>>>, AppError> {
    let courses = state.enrollments.list_courses().await?;
    Ok(Json(Envelope::ok(courses)))
}

async fn create_course(
    State(state): State<AppState>,
    payload: Result<Json<NewCourseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<Course>>), AppError> {
    let course = state.enrollments.create_course(body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(course))))
}

/// The schedule is always served fresh; intermediaries must not cache it.
async fn list_enrollments(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Response, AppError> {
    let schedule = state.enrollments.list_schedule(&user_id).await?;
    let mut response = Json(Envelope::ok(schedule)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, max-age=0"),
    );
    response
        .headers_mut()
        .insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    Ok(response)
}

async fn create_enrollment(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    payload: Result<Json<NewEnrollmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<ScheduledCourse>>), AppError> {
    let scheduled = state.enrollments.enroll(&user_id, body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(scheduled))))
}

async fn move_enrollment(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    payload: Result<Json<MoveEnrollmentRequest>, JsonRejection>,
) -> Result<Json<Envelope<ScheduledCourse>>, AppError> {
    let scheduled = state
        .enrollments
        .move_enrollment(&user_id, body(payload)?)
        .await?;
    Ok(Json(Envelope::ok(scheduled)))
}

async fn delete_enrollment(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Envelope<serde_json::Value>>, AppError> {
    state.enrollments.remove(&user_id, &id).await?;
    Ok(Json(Envelope::ok(json!({ "enrollmentId": id }))))
}
