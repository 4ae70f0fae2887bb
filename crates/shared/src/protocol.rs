use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        AppointmentId, AppointmentStatus, BlockId, ClientFilter, ClientId, LineItemId,
        LineItemKind, LocationId, ProductId, RecurrenceScope, SeriesId, ServiceId, TechnicianId,
        Weekday,
    },
    recurrence::RecurrenceRule,
};

/// `"HH:MM"` wall-clock times as the API sends them.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%H:%M";

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&time.format(FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(raw.trim(), FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S"))
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayHours {
    #[serde(with = "hhmm")]
    pub open: NaiveTime,
    #[serde(with = "hhmm")]
    pub close: NaiveTime,
    pub is_open: bool,
}

impl DayHours {
    pub fn open(open: NaiveTime, close: NaiveTime) -> Self {
        Self {
            open,
            close,
            is_open: true,
        }
    }

    pub fn closed() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            close: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
            is_open: false,
        }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.is_open && time >= self.open && time < self.close
    }
}

/// Per-day open/close hours, shared by locations and technician schedules.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperatingHours(pub BTreeMap<Weekday, DayHours>);

impl OperatingHours {
    /// Tuesday to Saturday, 09:00-19:00; closed Sunday and Monday.
    pub fn standard() -> Self {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN);
        let seven_pm = NaiveTime::from_hms_opt(19, 0, 0).unwrap_or(NaiveTime::MIN);
        let days = Weekday::ALL
            .into_iter()
            .map(|day| {
                let hours = match day {
                    Weekday::Sunday | Weekday::Monday => DayHours::closed(),
                    _ => DayHours::open(nine, seven_pm),
                };
                (day, hours)
            })
            .collect();
        Self(days)
    }

    pub fn get(&self, day: Weekday) -> Option<&DayHours> {
        self.0.get(&day)
    }

    pub fn set(&mut self, day: Weekday, hours: DayHours) {
        self.0.insert(day, hours);
    }

    pub fn is_open_at(&self, day: Weekday, time: NaiveTime) -> bool {
        self.get(day).is_some_and(|hours| hours.contains(time))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub hours: OperatingHours,
    #[serde(default)]
    pub technician_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationInput {
    pub name: String,
    #[serde(default)]
    pub slug: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub phone: String,
    #[serde(default)]
    pub hours: OperatingHours,
}

impl LocationInput {
    pub fn from_location(location: &Location) -> Self {
        Self {
            name: location.name.clone(),
            slug: location.slug.clone(),
            address: location.address.clone(),
            city: location.city.clone(),
            state: location.state.clone(),
            zip: location.zip.clone(),
            phone: location.phone.clone(),
            hours: location.hours.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Technician {
    pub id: TechnicianId,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub master_fee: bool,
    #[serde(default)]
    pub location_ids: Vec<LocationId>,
    #[serde(default)]
    pub appointment_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicianInput {
    pub name: String,
    pub color: String,
    pub active: bool,
    pub master_fee: bool,
    pub location_ids: Vec<LocationId>,
}

impl TechnicianInput {
    pub fn from_technician(technician: &Technician) -> Self {
        Self {
            name: technician.name.clone(),
            color: technician.color.clone(),
            active: technician.active,
            master_fee: technician.master_fee,
            location_ids: technician.location_ids.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicianSchedule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technician_id: Option<TechnicianId>,
    pub days: OperatingHours,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub phone_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub visit_count: u32,
    #[serde(default)]
    pub no_show_count: u32,
    #[serde(default)]
    pub cancellation_count: u32,
    pub updated_at: DateTime<Utc>,
}

/// Partial client update. `None` fields are left untouched by the API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_updated_at: Option<DateTime<Utc>>,
}

impl ClientPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.phone.is_none()
            && self.email.is_none()
            && self.blocked.is_none()
            && self.block_reason.is_none()
            && self.notes.is_none()
    }

    /// Apply the patch to a local copy, as the server would.
    pub fn apply_to(&self, client: &mut Client) {
        if let Some(name) = &self.name {
            client.name = name.clone();
        }
        if let Some(phone) = &self.phone {
            client.phone = phone.clone();
        }
        if let Some(email) = &self.email {
            client.email = (!email.is_empty()).then(|| email.clone());
        }
        if let Some(blocked) = self.blocked {
            client.blocked = blocked;
            if !blocked {
                client.block_reason = None;
            }
        }
        if let Some(reason) = &self.block_reason {
            client.block_reason = Some(reason.clone());
        }
        if let Some(notes) = &self.notes {
            client.notes = Some(notes.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPage {
    pub clients: Vec<Client>,
    pub total: u32,
    pub page: u32,
    pub page_size: u32,
}

impl ClientPage {
    pub fn page_count(&self) -> u32 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(self.page_size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientQuery {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub search: String,
    #[serde(default)]
    pub filter: ClientFilter,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoShowFee {
    pub amount_cents: i64,
    #[serde(default)]
    pub charged: bool,
    #[serde(default)]
    pub waived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub id: LineItemId,
    pub kind: LineItemKind,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<ServiceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

impl LineItem {
    /// Signed contribution to the appointment total; discounts subtract.
    pub fn line_total_cents(&self) -> i64 {
        let gross = self
            .unit_price_cents
            .saturating_abs()
            .saturating_mul(i64::from(self.quantity));
        match self.kind {
            LineItemKind::Discount => -gross,
            LineItemKind::Service | LineItemKind::Product => gross,
        }
    }
}

/// Sum of line items, never below zero.
pub fn appointment_total_cents(items: &[LineItem]) -> i64 {
    items
        .iter()
        .map(LineItem::line_total_cents)
        .fold(0i64, i64::saturating_add)
        .max(0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemInput {
    pub kind: LineItemKind,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<ServiceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

impl LineItemInput {
    pub fn into_line_item(self, id: LineItemId) -> LineItem {
        LineItem {
            id,
            kind: self.kind,
            description: self.description,
            service_id: self.service_id,
            product_id: self.product_id,
            quantity: self.quantity,
            unit_price_cents: self.unit_price_cents,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringSettings {
    pub rule: RecurrenceRule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_id: Option<SeriesId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringRequest {
    pub rule: RecurrenceRule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: AppointmentId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub client_id: ClientId,
    pub technician_id: TechnicianId,
    pub location_id: LocationId,
    pub service_id: ServiceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_show_fee: Option<NoShowFee>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring: Option<RecurringSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Appointment {
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }

    pub fn is_recurring(&self) -> bool {
        self.recurring.is_some()
    }

    pub fn series_id(&self) -> Option<&SeriesId> {
        self.recurring
            .as_ref()
            .and_then(|recurring| recurring.series_id.as_ref())
    }

    pub fn overlaps(&self, other: &Appointment) -> bool {
        self.technician_id == other.technician_id
            && self.status.is_active()
            && other.status.is_active()
            && self.start_time < other.end_time
            && other.start_time < self.end_time
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentInput {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub client_id: ClientId,
    pub technician_id: TechnicianId,
    pub location_id: LocationId,
    pub service_id: ServiceId,
    pub status: AppointmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring: Option<RecurringRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AppointmentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technician_id: Option<TechnicianId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<LocationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<ServiceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_show_fee: Option<NoShowFee>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_updated_at: Option<DateTime<Utc>>,
}

impl AppointmentPatch {
    pub fn is_empty(&self) -> bool {
        self.start_time.is_none()
            && self.end_time.is_none()
            && self.status.is_none()
            && self.client_id.is_none()
            && self.technician_id.is_none()
            && self.location_id.is_none()
            && self.service_id.is_none()
            && self.notes.is_none()
            && self.no_show_fee.is_none()
    }

    pub fn apply_to(&self, appointment: &mut Appointment) {
        if let Some(start) = self.start_time {
            appointment.start_time = start;
        }
        if let Some(end) = self.end_time {
            appointment.end_time = end;
        }
        if let Some(status) = self.status {
            appointment.status = status;
        }
        if let Some(client_id) = &self.client_id {
            appointment.client_id = client_id.clone();
        }
        if let Some(technician_id) = &self.technician_id {
            appointment.technician_id = technician_id.clone();
        }
        if let Some(location_id) = &self.location_id {
            appointment.location_id = location_id.clone();
        }
        if let Some(service_id) = &self.service_id {
            appointment.service_id = service_id.clone();
        }
        if let Some(notes) = &self.notes {
            appointment.notes = Some(notes.clone());
        }
        if let Some(fee) = &self.no_show_fee {
            appointment.no_show_fee = Some(fee.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub scope: RecurrenceScope,
    #[serde(default)]
    pub notify_client: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<LocationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technician_id: Option<TechnicianId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicianBlock {
    pub id: BlockId,
    pub technician_id: TechnicianId,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_rule: Option<RecurrenceRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_id: Option<SeriesId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInput {
    pub technician_id: TechnicianId,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_rule: Option<RecurrenceRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technician_id: Option<TechnicianId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub duration_minutes: u32,
    pub price_cents: i64,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    pub location_id: LocationId,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technician_id: Option<TechnicianId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<ServiceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilitySlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub technician_id: TechnicianId,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
