use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use shared::{
    domain::{DoctorId, ScheduleId, DATE_FORMAT},
    protocol::{CreateAppointmentRequest, DoctorOption, ScheduleOption},
};

use crate::{
    chain::{ChainField, OptionItem, SelectionChain},
    error::FormError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentField {
    Date,
    Doctor,
    Schedule,
    ChiefComplaint,
}

impl AppointmentField {
    /// Key used for this field in request bodies and server error maps.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Doctor => "doctor_id",
            Self::Schedule => "schedule_id",
            Self::ChiefComplaint => "chief_complaint",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ORDER.iter().copied().find(|f| f.wire_name() == name)
    }
}

impl ChainField for AppointmentField {
    const ORDER: &'static [Self] = &[
        Self::Date,
        Self::Doctor,
        Self::Schedule,
        Self::ChiefComplaint,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn label(self) -> &'static str {
        match self {
            Self::Date => "Date",
            Self::Doctor => "Doctor",
            Self::Schedule => "Schedule",
            Self::ChiefComplaint => "Chief complaint",
        }
    }

    fn has_options(self) -> bool {
        matches!(self, Self::Doctor | Self::Schedule)
    }

    fn validate(self, value: &str) -> Result<(), String> {
        match self {
            Self::Date => parse_date(value).map(|_| ()),
            Self::Doctor => value
                .parse::<DoctorId>()
                .map(|_| ())
                .map_err(|_| format!("{value:?} is not a doctor id")),
            Self::Schedule => value
                .parse::<ScheduleId>()
                .map(|_| ())
                .map_err(|_| format!("{value:?} is not a schedule id")),
            Self::ChiefComplaint => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionQuery {
    Doctors { date: NaiveDate },
    Schedules { date: NaiveDate, doctor_id: DoctorId },
}

impl OptionQuery {
    /// Builds the query for `field` from the upstream values captured in a
    /// refresh ticket.
    pub fn for_field(field: AppointmentField, upstream: &[String]) -> Result<Self, String> {
        match (field, upstream) {
            (AppointmentField::Doctor, [date]) => Ok(Self::Doctors {
                date: parse_date(date)?,
            }),
            (AppointmentField::Schedule, [date, doctor]) => Ok(Self::Schedules {
                date: parse_date(date)?,
                doctor_id: doctor
                    .parse()
                    .map_err(|_| format!("{doctor:?} is not a doctor id"))?,
            }),
            _ => Err(format!(
                "{} has no option source for {} upstream values",
                field.label(),
                upstream.len()
            )),
        }
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| format!("{value:?} is not a date (expected YYYY-MM-DD)"))
}

pub fn doctor_item(doctor: &DoctorOption) -> OptionItem {
    let label = match doctor.specialization.as_deref() {
        Some(spec) if !spec.trim().is_empty() => format!("{} ({spec})", doctor.name),
        _ => doctor.name.clone(),
    };
    OptionItem::new(doctor.doctor_id.to_string(), label)
}

pub fn schedule_item(schedule: &ScheduleOption) -> OptionItem {
    let mut label = format!(
        "{}-{}",
        schedule.start_time.format("%H:%M"),
        schedule.end_time.format("%H:%M")
    );
    match schedule.remaining_slots {
        Some(1) => label.push_str(" (1 slot left)"),
        Some(n) => label.push_str(&format!(" ({n} slots left)")),
        None => {}
    }
    OptionItem::new(schedule.schedule_id.to_string(), label)
}

pub fn build_request(
    chain: &SelectionChain<AppointmentField>,
) -> Result<CreateAppointmentRequest, FormError> {
    let missing = chain.missing_required();
    if !missing.is_empty() {
        return Err(FormError::MissingFields {
            labels: missing.into_iter().map(ChainField::label).collect(),
        });
    }

    let value = |field: AppointmentField| chain.value(field).unwrap_or_default();
    Ok(CreateAppointmentRequest {
        date: parse_date(value(AppointmentField::Date)).map_err(FormError::InvalidRequest)?,
        doctor_id: value(AppointmentField::Doctor)
            .parse()
            .map_err(|_| FormError::InvalidRequest("doctor id is not numeric".to_string()))?,
        schedule_id: value(AppointmentField::Schedule)
            .parse()
            .map_err(|_| FormError::InvalidRequest("schedule id is not numeric".to_string()))?,
        chief_complaint: value(AppointmentField::ChiefComplaint).to_string(),
    })
}
