//! In-process stand-ins for the salon API used across the test modules.

use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::Mutex};

use crate::{
    notify::RecordingNotifier,
    transport::{ClientOptions, SalonApi},
};

pub type Calls = Arc<Mutex<Vec<String>>>;

pub async fn spawn_api(app: Router) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

pub fn api(base_url: &str) -> SalonApi {
    SalonApi::new(base_url, ClientOptions::default()).expect("api")
}

pub fn recording() -> Arc<RecordingNotifier> {
    Arc::new(RecordingNotifier::default())
}

pub fn ts(raw: &str) -> DateTime<Utc> {
    raw.parse().expect("timestamp")
}

pub fn location_json(id: &str, name: &str, technician_count: u32) -> Value {
    json!({
        "id": id,
        "name": name,
        "slug": shared::validation::slugify(name),
        "address": "1 Coast Hwy",
        "city": "Newport Beach",
        "state": "CA",
        "zip": "92660",
        "phone": "9495550142",
        "technicianCount": technician_count,
        "hours": {}
    })
}

pub fn technician_json(id: &str, name: &str, location_ids: &[&str], appointment_count: u32) -> Value {
    json!({
        "id": id,
        "name": name,
        "color": "#1f8a70",
        "active": true,
        "masterFee": false,
        "locationIds": location_ids,
        "appointmentCount": appointment_count
    })
}

pub fn client_json(id: &str, name: &str, updated_at: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "phone": "7145550199",
        "phoneVerified": true,
        "email": format!("{}@example.com", name.to_ascii_lowercase()),
        "blocked": false,
        "visitCount": 4,
        "noShowCount": 0,
        "cancellationCount": 1,
        "updatedAt": updated_at
    })
}

pub fn appointment_json(id: &str, start: &str, end: &str, status: &str) -> Value {
    json!({
        "id": id,
        "startTime": start,
        "endTime": end,
        "status": status,
        "clientId": "c-1",
        "technicianId": "t-1",
        "locationId": "loc-1",
        "serviceId": "svc-1",
        "lineItems": []
    })
}
