//! Typed access to the salon REST API.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    domain::{
        AppointmentId, BlockId, ClientId, LineItemId, LocationId, RecurrenceScope, TechnicianId,
    },
    error::ApiErrorBody,
    protocol::{
        Appointment, AppointmentInput, AppointmentPatch, AppointmentQuery, AvailabilityQuery,
        AvailabilitySlot, BlockInput, BlockQuery, CancelRequest, Client as SalonClient,
        ClientPage, ClientPatch, ClientQuery, LineItem, LineItemInput, Location, LocationInput,
        RecurringRequest, RecurringSettings, Service, Technician, TechnicianBlock,
        TechnicianInput, TechnicianSchedule,
    },
};
use tracing::debug;
use url::Url;

use crate::error::{ClientError, ClientResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);
const DEFAULT_PAGE_SIZE: u32 = 25;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    pub search_debounce: Duration,
    pub page_size: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct ScopeQuery {
    scope: &'static str,
}

impl From<RecurrenceScope> for ScopeQuery {
    fn from(scope: RecurrenceScope) -> Self {
        Self {
            scope: scope.as_query(),
        }
    }
}

/// Handle on the `/api/*` endpoints. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SalonApi {
    http: Client,
    base_url: String,
    options: ClientOptions,
}

impl SalonApi {
    pub fn new(base_url: &str, options: ClientOptions) -> ClientResult<Self> {
        let parsed = Url::parse(base_url.trim())?;
        let base_url = parsed.as_str().trim_end_matches('/').to_string();
        let http = Client::builder().timeout(options.timeout).build()?;
        Ok(Self {
            http,
            base_url,
            options,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        debug!("api: request method={method} path={path}");
        self.http
            .request(method, format!("{}/api{path}", self.base_url))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let response = request.send().await?;
        let value = read_body(response).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn send_unit(&self, request: RequestBuilder) -> ClientResult<()> {
        let response = request.send().await?;
        read_body(response).await.map(|_| ())
    }

    // Locations

    pub async fn list_locations(&self) -> ClientResult<Vec<Location>> {
        self.send_json(self.request(Method::GET, "/locations")).await
    }

    pub async fn create_location(&self, input: &LocationInput) -> ClientResult<Location> {
        self.send_json(self.request(Method::POST, "/locations").json(input))
            .await
    }

    pub async fn update_location(
        &self,
        id: &LocationId,
        input: &LocationInput,
    ) -> ClientResult<Location> {
        self.send_json(
            self.request(Method::PUT, &format!("/locations/{id}"))
                .json(input),
        )
        .await
    }

    pub async fn delete_location(&self, id: &LocationId) -> ClientResult<()> {
        self.send_unit(self.request(Method::DELETE, &format!("/locations/{id}")))
            .await
    }

    // Technicians

    pub async fn list_technicians(
        &self,
        location_id: Option<&LocationId>,
    ) -> ClientResult<Vec<Technician>> {
        let mut request = self.request(Method::GET, "/technicians");
        if let Some(location_id) = location_id {
            request = request.query(&[("locationId", location_id.as_str())]);
        }
        self.send_json(request).await
    }

    pub async fn create_technician(&self, input: &TechnicianInput) -> ClientResult<Technician> {
        self.send_json(self.request(Method::POST, "/technicians").json(input))
            .await
    }

    pub async fn update_technician(
        &self,
        id: &TechnicianId,
        input: &TechnicianInput,
    ) -> ClientResult<Technician> {
        self.send_json(
            self.request(Method::PUT, &format!("/technicians/{id}"))
                .json(input),
        )
        .await
    }

    pub async fn delete_technician(&self, id: &TechnicianId) -> ClientResult<()> {
        self.send_unit(self.request(Method::DELETE, &format!("/technicians/{id}")))
            .await
    }

    pub async fn technician_schedule(&self, id: &TechnicianId) -> ClientResult<TechnicianSchedule> {
        self.send_json(self.request(Method::GET, &format!("/technicians/{id}/schedule")))
            .await
    }

    pub async fn update_technician_schedule(
        &self,
        id: &TechnicianId,
        schedule: &TechnicianSchedule,
    ) -> ClientResult<TechnicianSchedule> {
        self.send_json(
            self.request(Method::PUT, &format!("/technicians/{id}/schedule"))
                .json(schedule),
        )
        .await
    }

    // Clients

    pub async fn list_clients(&self, query: &ClientQuery) -> ClientResult<ClientPage> {
        self.send_json(self.request(Method::GET, "/clients").query(query))
            .await
    }

    pub async fn patch_client(
        &self,
        id: &ClientId,
        patch: &ClientPatch,
    ) -> ClientResult<SalonClient> {
        self.send_json(
            self.request(Method::PATCH, &format!("/clients/{id}"))
                .json(patch),
        )
        .await
    }

    pub async fn client_appointments(&self, id: &ClientId) -> ClientResult<Vec<Appointment>> {
        self.send_json(self.request(Method::GET, &format!("/clients/{id}/appointments")))
            .await
    }

    // Appointments

    pub async fn list_appointments(
        &self,
        query: &AppointmentQuery,
    ) -> ClientResult<Vec<Appointment>> {
        self.send_json(self.request(Method::GET, "/appointments").query(query))
            .await
    }

    pub async fn create_appointment(&self, input: &AppointmentInput) -> ClientResult<Appointment> {
        self.send_json(self.request(Method::POST, "/appointments").json(input))
            .await
    }

    pub async fn patch_appointment(
        &self,
        id: &AppointmentId,
        patch: &AppointmentPatch,
    ) -> ClientResult<Appointment> {
        self.send_json(
            self.request(Method::PATCH, &format!("/appointments/{id}"))
                .json(patch),
        )
        .await
    }

    /// Full edit. `scope` is sent only for occurrences of a recurring series.
    pub async fn update_appointment(
        &self,
        id: &AppointmentId,
        patch: &AppointmentPatch,
        scope: Option<RecurrenceScope>,
    ) -> ClientResult<Appointment> {
        let mut request = self
            .request(Method::PUT, &format!("/appointments/{id}"))
            .json(patch);
        if let Some(scope) = scope {
            request = request.query(&ScopeQuery::from(scope));
        }
        self.send_json(request).await
    }

    pub async fn cancel_appointment(
        &self,
        id: &AppointmentId,
        request: &CancelRequest,
    ) -> ClientResult<Appointment> {
        self.send_json(
            self.request(Method::POST, &format!("/appointments/{id}/cancel"))
                .json(request),
        )
        .await
    }

    pub async fn line_items(&self, id: &AppointmentId) -> ClientResult<Vec<LineItem>> {
        self.send_json(self.request(Method::GET, &format!("/appointments/{id}/line-items")))
            .await
    }

    pub async fn add_line_item(
        &self,
        id: &AppointmentId,
        input: &LineItemInput,
    ) -> ClientResult<LineItem> {
        self.send_json(
            self.request(Method::POST, &format!("/appointments/{id}/line-items"))
                .json(input),
        )
        .await
    }

    pub async fn delete_line_item(
        &self,
        id: &AppointmentId,
        line_item_id: &LineItemId,
    ) -> ClientResult<()> {
        self.send_unit(
            self.request(Method::DELETE, &format!("/appointments/{id}/line-items"))
                .query(&[("lineItemId", line_item_id.as_str())]),
        )
        .await
    }

    pub async fn recurring(&self, id: &AppointmentId) -> ClientResult<Option<RecurringSettings>> {
        self.send_json(self.request(Method::GET, &format!("/appointments/{id}/recurring")))
            .await
    }

    /// Turns the appointment into the first occurrence of a series and
    /// returns the occurrences the API created.
    pub async fn create_recurring(
        &self,
        id: &AppointmentId,
        request: &RecurringRequest,
    ) -> ClientResult<Vec<Appointment>> {
        self.send_json(
            self.request(Method::POST, &format!("/appointments/{id}/recurring"))
                .json(request),
        )
        .await
    }

    pub async fn delete_recurring(
        &self,
        id: &AppointmentId,
        scope: RecurrenceScope,
    ) -> ClientResult<()> {
        self.send_unit(
            self.request(Method::DELETE, &format!("/appointments/{id}/recurring"))
                .query(&ScopeQuery::from(scope)),
        )
        .await
    }

    // Technician blocks

    pub async fn list_blocks(&self, query: &BlockQuery) -> ClientResult<Vec<TechnicianBlock>> {
        self.send_json(self.request(Method::GET, "/technician-blocks").query(query))
            .await
    }

    pub async fn create_block(&self, input: &BlockInput) -> ClientResult<TechnicianBlock> {
        self.send_json(self.request(Method::POST, "/technician-blocks").json(input))
            .await
    }

    pub async fn delete_block(&self, id: &BlockId, scope: RecurrenceScope) -> ClientResult<()> {
        self.send_unit(
            self.request(Method::DELETE, &format!("/technician-blocks/{id}"))
                .query(&ScopeQuery::from(scope)),
        )
        .await
    }

    // Catalog

    pub async fn services(&self) -> ClientResult<Vec<Service>> {
        self.send_json(self.request(Method::GET, "/services")).await
    }

    pub async fn availability(
        &self,
        query: &AvailabilityQuery,
    ) -> ClientResult<Vec<AvailabilitySlot>> {
        self.send_json(self.request(Method::GET, "/availability").query(query))
            .await
    }
}

/// Read a response body, mapping error statuses and in-band conflict flags.
async fn read_body(response: Response) -> ClientResult<Value> {
    let status = response.status();
    let bytes = response.bytes().await?;
    let value = if bytes.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else if status.is_success() {
        serde_json::from_slice(&bytes)?
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).trim().to_string())
        })
    };

    if !status.is_success() {
        return Err(error_from_body(status, value));
    }
    if value.get("conflict").and_then(Value::as_bool) == Some(true) {
        return Err(error_from_body(StatusCode::CONFLICT, value));
    }
    Ok(value)
}

fn error_from_body(status: StatusCode, value: Value) -> ClientError {
    let body = match value {
        Value::String(text) => ApiErrorBody::new(text),
        Value::Null => ApiErrorBody::default(),
        other => serde_json::from_value::<ApiErrorBody>(other).unwrap_or_default(),
    };
    let message = if body.error.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.error
    };

    if status == StatusCode::CONFLICT || body.conflict {
        return ClientError::Conflict {
            message,
            current: body.current,
        };
    }
    ClientError::Http { status, message }
}

/// Decode the server's current record from a conflict error, if it sent one.
pub fn conflict_current<T: DeserializeOwned>(err: &ClientError) -> Option<T> {
    match err {
        ClientError::Conflict {
            current: Some(current),
            ..
        } => serde_json::from_value(current.clone()).ok(),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
