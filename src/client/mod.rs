pub mod error;

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::auth::USER_ID_HEADER;
use crate::config::ClientConfig;
use crate::models::{Envelope, MoveEnrollmentRequest, NewEnrollmentRequest, ScheduledCourse};

pub use error::{ApiError, ErrorKind};

/// The schedule editor's only way to reach the Enrollment API.
#[async_trait]
pub trait EnrollmentApi: Send + Sync {
    async fn list_enrollments(&self) -> Result<Vec<ScheduledCourse>, ApiError>;
    async fn create_enrollment(
        &self,
        req: &NewEnrollmentRequest,
    ) -> Result<ScheduledCourse, ApiError>;
    async fn move_enrollment(
        &self,
        req: &MoveEnrollmentRequest,
    ) -> Result<ScheduledCourse, ApiError>;
    async fn delete_enrollment(&self, enrollment_id: &str) -> Result<(), ApiError>;
}

pub struct HttpEnrollmentApi {
    client: Client,
    config: ClientConfig,
}

impl HttpEnrollmentApi {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::Invalid(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }
}

/// Unwrap `{ success, data, error }`, turning non-2xx or `success: false` into
/// `ServerRejected` with the server's message.
async fn read_envelope<T: DeserializeOwned>(response: Response) -> Result<Option<T>, ApiError> {
    let status = response.status();
    let body = response.text().await?;
    let envelope = serde_json::from_str::<Envelope<T>>(&body);

    if !status.is_success() {
        let message = envelope
            .ok()
            .and_then(|e| e.error)
            .unwrap_or_else(|| {
                if body.is_empty() {
                    status.to_string()
                } else {
                    body.clone()
                }
            });
        return Err(ApiError::ServerRejected {
            status: status.as_u16(),
            message,
        });
    }

    let envelope = envelope.map_err(|e| ApiError::Decode(e.to_string()))?;
    if !envelope.success {
        return Err(ApiError::ServerRejected {
            status: status.as_u16(),
            message: envelope.error.unwrap_or_default(),
        });
    }
    Ok(envelope.data)
}

fn require<T>(data: Option<T>) -> Result<T, ApiError> {
    data.ok_or_else(|| ApiError::Decode("response is missing data".to_string()))
}

#[async_trait]
impl EnrollmentApi for HttpEnrollmentApi {
    async fn list_enrollments(&self) -> Result<Vec<ScheduledCourse>, ApiError> {
        // タイムスタンプ付きでキャッシュを回避
        let url = format!(
            "{}?_ts={}",
            self.url("/enrollments"),
            chrono::Utc::now().timestamp_millis()
        );

        let response = self
            .client
            .get(&url)
            .header(USER_ID_HEADER, &self.config.user_id)
            .header(CACHE_CONTROL, "no-cache, no-store")
            .header(PRAGMA, "no-cache")
            .send()
            .await?;

        let courses = read_envelope::<Vec<ScheduledCourse>>(response).await?;
        Ok(courses.unwrap_or_default())
    }

    async fn create_enrollment(
        &self,
        req: &NewEnrollmentRequest,
    ) -> Result<ScheduledCourse, ApiError> {
        let response = self
            .client
            .post(self.url("/enrollments"))
            .header(USER_ID_HEADER, &self.config.user_id)
            .json(req)
            .send()
            .await?;

        require(read_envelope(response).await?)
    }

    async fn move_enrollment(
        &self,
        req: &MoveEnrollmentRequest,
    ) -> Result<ScheduledCourse, ApiError> {
        let response = self
            .client
            .patch(self.url("/enrollments/move"))
            .header(USER_ID_HEADER, &self.config.user_id)
            .json(req)
            .send()
            .await?;

        require(read_envelope(response).await?)
    }

    async fn delete_enrollment(&self, enrollment_id: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.url(&format!("/enrollments/{}", enrollment_id)))
            .header(USER_ID_HEADER, &self.config.user_id)
            .send()
            .await?;

        read_envelope::<serde_json::Value>(response).await?;
        Ok(())
    }
}
