//! Appointment editor state.
//!
//! The draft keeps the start as salon-local wall-clock time plus a duration,
//! so that changing one field never silently changes another: moving the
//! date keeps the time of day, moving the start keeps the length, and only
//! an explicit end-time edit changes the duration. Conversion to UTC happens
//! when a payload is built.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use shared::{
    domain::{AppointmentStatus, ClientId, LocationId, ServiceId, TechnicianId},
    error::ValidationError,
    protocol::{Appointment, AppointmentInput, AppointmentPatch, Service},
    validation::ValidationResult,
};

pub const DEFAULT_DURATION_MINUTES: u32 = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct AppointmentDraft {
    start: NaiveDateTime,
    duration_minutes: u32,
    offset: FixedOffset,
    pub client_id: Option<ClientId>,
    pub technician_id: Option<TechnicianId>,
    pub location_id: Option<LocationId>,
    pub service_id: Option<ServiceId>,
    pub notes: String,
    pub status: AppointmentStatus,
}

impl AppointmentDraft {
    /// Empty draft starting at `start` (salon-local time in `offset`).
    pub fn new(start: NaiveDateTime, offset: FixedOffset) -> Self {
        Self {
            start,
            duration_minutes: DEFAULT_DURATION_MINUTES,
            offset,
            client_id: None,
            technician_id: None,
            location_id: None,
            service_id: None,
            notes: String::new(),
            status: AppointmentStatus::Pending,
        }
    }

    pub fn from_appointment(appointment: &Appointment, offset: FixedOffset) -> Self {
        let duration = appointment.duration_minutes().max(0);
        Self {
            start: appointment.start_time.with_timezone(&offset).naive_local(),
            duration_minutes: u32::try_from(duration).unwrap_or(u32::MAX),
            offset,
            client_id: Some(appointment.client_id.clone()),
            technician_id: Some(appointment.technician_id.clone()),
            location_id: Some(appointment.location_id.clone()),
            service_id: Some(appointment.service_id.clone()),
            notes: appointment.notes.clone().unwrap_or_default(),
            status: appointment.status,
        }
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.start + Duration::minutes(i64::from(self.duration_minutes))
    }

    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn start_utc(&self) -> DateTime<Utc> {
        self.to_utc(self.start)
    }

    pub fn end_utc(&self) -> DateTime<Utc> {
        self.to_utc(self.end())
    }

    fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let utc = local - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&utc)
    }

    /// Move to another day, keeping the time of day and the duration.
    pub fn set_date(&mut self, date: NaiveDate) {
        self.start = date.and_time(self.start.time());
    }

    /// Move the start, keeping the duration.
    pub fn set_start_time(&mut self, time: NaiveTime) {
        self.start = self.start.date().and_time(time);
    }

    /// Change the length; the end follows.
    pub fn set_duration(&mut self, minutes: u32) {
        self.duration_minutes = minutes;
    }

    /// Set the end on the start's day and recompute the duration.
    pub fn set_end_time(&mut self, time: NaiveTime) -> ValidationResult<()> {
        let end = self.start.date().and_time(time);
        if end <= self.start {
            return Err(ValidationError::new(
                "endTime",
                "End time must be after start time",
            ));
        }
        self.duration_minutes = u32::try_from((end - self.start).num_minutes()).unwrap_or(u32::MAX);
        Ok(())
    }

    /// Pick a service and adopt its standard duration.
    pub fn apply_service(&mut self, service: &Service) {
        self.service_id = Some(service.id.clone());
        if service.duration_minutes > 0 {
            self.duration_minutes = service.duration_minutes;
        }
    }

    pub fn validate(&self) -> ValidationResult<()> {
        if self.client_id.is_none() {
            return Err(ValidationError::required("clientId", "Client"));
        }
        if self.technician_id.is_none() {
            return Err(ValidationError::required("technicianId", "Technician"));
        }
        if self.location_id.is_none() {
            return Err(ValidationError::required("locationId", "Location"));
        }
        if self.service_id.is_none() {
            return Err(ValidationError::required("serviceId", "Service"));
        }
        if self.duration_minutes == 0 {
            return Err(ValidationError::new(
                "duration",
                "Duration must be greater than zero",
            ));
        }
        Ok(())
    }

    fn trimmed_notes(&self) -> Option<String> {
        let notes = self.notes.trim();
        (!notes.is_empty()).then(|| notes.to_string())
    }

    /// Full payload for creating the appointment.
    pub fn to_input(&self) -> ValidationResult<AppointmentInput> {
        self.validate()?;
        let (Some(client_id), Some(technician_id), Some(location_id), Some(service_id)) = (
            self.client_id.clone(),
            self.technician_id.clone(),
            self.location_id.clone(),
            self.service_id.clone(),
        ) else {
            return Err(ValidationError::new("appointment", "Appointment is incomplete"));
        };
        Ok(AppointmentInput {
            start_time: self.start_utc(),
            end_time: self.end_utc(),
            client_id,
            technician_id,
            location_id,
            service_id,
            status: self.status,
            notes: self.trimmed_notes(),
            recurring: None,
        })
    }

    /// Only the fields that differ from `original`.
    pub fn to_patch(&self, original: &Appointment) -> ValidationResult<AppointmentPatch> {
        self.validate()?;
        let start = self.start_utc();
        let end = self.end_utc();
        let notes = self.trimmed_notes();
        Ok(AppointmentPatch {
            start_time: (start != original.start_time).then_some(start),
            end_time: (end != original.end_time).then_some(end),
            status: (self.status != original.status).then_some(self.status),
            client_id: changed(&self.client_id, &original.client_id),
            technician_id: changed(&self.technician_id, &original.technician_id),
            location_id: changed(&self.location_id, &original.location_id),
            service_id: changed(&self.service_id, &original.service_id),
            notes: (notes != original.notes).then(|| notes.unwrap_or_default()),
            no_show_fee: None,
            expected_updated_at: original.updated_at,
        })
    }
}

fn changed<T: Clone + PartialEq>(draft: &Option<T>, original: &T) -> Option<T> {
    draft.as_ref().filter(|value| *value != original).cloned()
}
