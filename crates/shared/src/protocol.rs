use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::domain::{AppointmentId, DoctorId, ScheduleId};

pub const AVAILABLE_DOCTORS_ROUTE: &str = "/appointments/available-doctors";
pub const AVAILABLE_SCHEDULES_ROUTE: &str = "/appointments/available-schedules";
pub const APPOINTMENTS_ROUTE: &str = "/appointments";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsResponse<T> {
    pub candidates: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableDoctorsQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableSchedulesQuery {
    pub date: NaiveDate,
    pub doctor_id: DoctorId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorOption {
    pub doctor_id: DoctorId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleOption {
    pub schedule_id: ScheduleId,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_slots: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub date: NaiveDate,
    pub doctor_id: DoctorId,
    pub schedule_id: ScheduleId,
    pub chief_complaint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentResponse {
    pub appointment_id: AppointmentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
