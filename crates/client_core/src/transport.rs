use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::DoctorId,
    error::ApiError,
    protocol::{
        AvailableDoctorsQuery, AvailableSchedulesQuery, CreateAppointmentRequest,
        CreateAppointmentResponse, DoctorOption, OptionsResponse, ScheduleOption,
        APPOINTMENTS_ROUTE, AVAILABLE_DOCTORS_ROUTE, AVAILABLE_SCHEDULES_ROUTE,
    },
};
use tracing::debug;
use url::Url;

use crate::error::TransportError;

#[async_trait]
pub trait AppointmentTransport: Send + Sync {
    async fn available_doctors(&self, date: NaiveDate)
        -> Result<Vec<DoctorOption>, TransportError>;

    async fn available_schedules(
        &self,
        date: NaiveDate,
        doctor_id: DoctorId,
    ) -> Result<Vec<ScheduleOption>, TransportError>;

    async fn create_appointment(
        &self,
        request: &CreateAppointmentRequest,
    ) -> Result<CreateAppointmentResponse, TransportError>;
}

#[async_trait]
impl<T> AppointmentTransport for Arc<T>
where
    T: AppointmentTransport + ?Sized,
{
    async fn available_doctors(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<DoctorOption>, TransportError> {
        (**self).available_doctors(date).await
    }

    async fn available_schedules(
        &self,
        date: NaiveDate,
        doctor_id: DoctorId,
    ) -> Result<Vec<ScheduleOption>, TransportError> {
        (**self).available_schedules(date, doctor_id).await
    }

    async fn create_appointment(
        &self,
        request: &CreateAppointmentRequest,
    ) -> Result<CreateAppointmentResponse, TransportError> {
        (**self).create_appointment(request).await
    }
}

pub struct HttpTransport {
    http: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(server_url: &str) -> Result<Self, TransportError> {
        Self::with_client(server_url, Client::new())
    }

    pub fn with_timeout(server_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let http = Client::builder().timeout(timeout).build()?;
        Self::with_client(server_url, http)
    }

    pub fn with_client(server_url: &str, http: Client) -> Result<Self, TransportError> {
        let mut base_url = Url::parse(server_url.trim())
            .map_err(|e| TransportError::InvalidUrl(format!("{server_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl(server_url.to_string()));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, route: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(route.trim_start_matches('/'))
            .map_err(|e| TransportError::InvalidUrl(format!("{route}: {e}")))
    }
}

#[async_trait]
impl AppointmentTransport for HttpTransport {
    async fn available_doctors(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<DoctorOption>, TransportError> {
        let url = self.endpoint(AVAILABLE_DOCTORS_ROUTE)?;
        debug!(%url, %date, "loading available doctors");
        let res = self
            .http
            .get(url)
            .query(&AvailableDoctorsQuery { date })
            .send()
            .await?;
        let body: OptionsResponse<DoctorOption> = decode(res).await?;
        Ok(body.candidates)
    }

    async fn available_schedules(
        &self,
        date: NaiveDate,
        doctor_id: DoctorId,
    ) -> Result<Vec<ScheduleOption>, TransportError> {
        let url = self.endpoint(AVAILABLE_SCHEDULES_ROUTE)?;
        debug!(%url, %date, doctor_id = doctor_id.0, "loading available schedules");
        let res = self
            .http
            .get(url)
            .query(&AvailableSchedulesQuery { date, doctor_id })
            .send()
            .await?;
        let body: OptionsResponse<ScheduleOption> = decode(res).await?;
        Ok(body.candidates)
    }

    async fn create_appointment(
        &self,
        request: &CreateAppointmentRequest,
    ) -> Result<CreateAppointmentResponse, TransportError> {
        let url = self.endpoint(APPOINTMENTS_ROUTE)?;
        debug!(%url, "creating appointment");
        let res = self.http.post(url).json(request).send().await?;
        decode(res).await
    }
}

async fn decode<T: DeserializeOwned>(res: Response) -> Result<T, TransportError> {
    let status = res.status();
    if status.is_success() {
        return res
            .json::<T>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()));
    }

    let body = res.text().await.unwrap_or_default();
    Err(error_from_body(status, &body))
}

fn error_from_body(status: StatusCode, body: &str) -> TransportError {
    match serde_json::from_str::<ApiError>(body) {
        Ok(api_error)
            if status == StatusCode::UNPROCESSABLE_ENTITY
                || (api_error.is_validation() && !api_error.field_errors.is_empty()) =>
        {
            TransportError::Validation {
                message: api_error.message,
                field_errors: api_error.field_errors,
            }
        }
        Ok(api_error) => TransportError::Status {
            status: status.as_u16(),
            message: api_error.message,
        },
        Err(_) => {
            let trimmed = body.trim();
            let message = if trimmed.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string()
            } else {
                trimmed.to_string()
            };
            TransportError::Status {
                status: status.as_u16(),
                message,
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
