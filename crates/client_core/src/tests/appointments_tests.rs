use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDateTime, NaiveTime};
use serde_json::{json, Value};
use shared::{
    domain::{LineItemKind, LocationId, ProductId, ServiceId, TechnicianId},
    recurrence::Frequency,
};

use super::*;
use crate::{
    notify::{RecordingNotifier, ToastLevel},
    test_support::{api, appointment_json, recording, spawn_api, ts, Calls},
};

type Store = Arc<tokio::sync::Mutex<HashMap<String, Value>>>;

#[derive(Clone, Default)]
struct Server {
    calls: Calls,
    appointments: Store,
    line_items: Arc<tokio::sync::Mutex<Vec<Value>>>,
}

fn occurrence(id: &str, start: &str, end: &str) -> Value {
    let mut value = appointment_json(id, start, end, "CONFIRMED");
    value["recurring"] = json!({ "rule": "FREQ=WEEKLY;COUNT=3", "seriesId": "s-1" });
    value
}

fn seeded() -> Server {
    let server = Server::default();
    let mut single = appointment_json(
        "a-1",
        "2026-10-20T17:00:00Z",
        "2026-10-20T18:00:00Z",
        "CONFIRMED",
    );
    single["updatedAt"] = json!("2026-10-01T12:00:00Z");
    let records = [
        single,
        occurrence("a-2", "2026-10-13T19:00:00Z", "2026-10-13T20:00:00Z"),
        occurrence("a-3", "2026-10-20T19:00:00Z", "2026-10-20T20:00:00Z"),
        occurrence("a-4", "2026-10-27T19:00:00Z", "2026-10-27T20:00:00Z"),
    ];
    {
        let mut store = server.appointments.try_lock().expect("fresh store");
        for record in records {
            let id = record["id"].as_str().unwrap_or_default().to_string();
            store.insert(id, record);
        }
    }
    *server.line_items.try_lock().expect("fresh items") = vec![json!({
        "id": "li-1",
        "kind": "SERVICE",
        "description": "Gel manicure",
        "serviceId": "svc-1",
        "quantity": 1,
        "unitPriceCents": 4000
    })];
    server
}

fn body_keys(body: &Value) -> String {
    let mut keys: Vec<_> = body
        .as_object()
        .map(|object| object.keys().cloned().collect())
        .unwrap_or_default();
    keys.sort();
    keys.join(",")
}

async fn merge(store: &Store, id: &str, body: &Value) -> Value {
    let mut store = store.lock().await;
    let record = store.entry(id.to_string()).or_insert_with(|| {
        appointment_json(id, "2026-10-20T17:00:00Z", "2026-10-20T18:00:00Z", "PENDING")
    });
    for (key, value) in body.as_object().into_iter().flatten() {
        if key != "expectedUpdatedAt" {
            record[key] = value.clone();
        }
    }
    record.clone()
}

async fn list(State(server): State<Server>) -> Json<Value> {
    let mut records: Vec<Value> = server.appointments.lock().await.values().cloned().collect();
    records.sort_by_key(|record| record["startTime"].as_str().unwrap_or_default().to_string());
    Json(Value::Array(records))
}

async fn create(State(server): State<Server>, Json(body): Json<Value>) -> Json<Value> {
    server.calls.lock().await.push(format!("POST {}", body_keys(&body)));
    Json(merge(&server.appointments, "a-new", &body).await)
}

async fn put_appointment(
    State(server): State<Server>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let scope = query.get("scope").cloned().unwrap_or_else(|| "-".into());
    server
        .calls
        .lock()
        .await
        .push(format!("PUT {id} scope={scope} {}", body_keys(&body)));
    Json(merge(&server.appointments, &id, &body).await)
}

async fn patch_appointment(
    State(server): State<Server>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    server
        .calls
        .lock()
        .await
        .push(format!("PATCH {id} {}", body_keys(&body)));
    if body["status"] == "NO_SHOW" {
        return (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": "payment processor unavailable" })),
        );
    }
    match body["status"].as_str() {
        // Someone else already started the appointment; the server says so.
        Some("COMPLETED") => {
            let current = merge(
                &server.appointments,
                &id,
                &json!({ "status": "IN_PROGRESS", "updatedAt": "2026-10-02T08:00:00Z" }),
            )
            .await;
            return (
                StatusCode::CONFLICT,
                Json(json!({ "error": "Appointment was changed", "conflict": true, "current": current })),
            );
        }
        // Same, but the conflict body carries no record.
        Some("IN_PROGRESS") => {
            merge(
                &server.appointments,
                &id,
                &json!({ "status": "CHECKED_IN", "notes": "Checked in at the front desk" }),
            )
            .await;
            return (
                StatusCode::CONFLICT,
                Json(json!({ "error": "Appointment was changed", "conflict": true })),
            );
        }
        _ => {}
    }
    (StatusCode::OK, Json(merge(&server.appointments, &id, &body).await))
}

async fn cancel(
    State(server): State<Server>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    server
        .calls
        .lock()
        .await
        .push(format!("CANCEL {id} scope={}", body["scope"].as_str().unwrap_or_default()));
    Json(merge(&server.appointments, &id, &json!({ "status": "CANCELLED" })).await)
}

async fn list_items(State(server): State<Server>) -> Json<Value> {
    server.calls.lock().await.push("GET line-items".into());
    Json(Value::Array(server.line_items.lock().await.clone()))
}

async fn add_item(State(server): State<Server>, Json(mut body): Json<Value>) -> Json<Value> {
    server.calls.lock().await.push(format!("POST line-item {}", body["kind"]));
    let mut items = server.line_items.lock().await;
    body["id"] = json!(format!("li-{}", items.len() + 1));
    items.push(body.clone());
    Json(body)
}

async fn delete_item(
    State(server): State<Server>,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, &'static str) {
    server.calls.lock().await.push(format!(
        "DELETE line-item {}",
        query.get("lineItemId").cloned().unwrap_or_default()
    ));
    (StatusCode::INTERNAL_SERVER_ERROR, "locked for checkout")
}

async fn create_recurring(
    State(server): State<Server>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    server.calls.lock().await.push(format!(
        "REPEAT {id} rule={} count={}",
        body["rule"].as_str().unwrap_or_default(),
        body["count"]
    ));
    Json(json!([
        occurrence(&id, "2026-10-20T17:00:00Z", "2026-10-20T18:00:00Z"),
        occurrence("a-1b", "2026-11-03T17:00:00Z", "2026-11-03T18:00:00Z")
    ]))
}

async fn stop_recurring(
    State(server): State<Server>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> StatusCode {
    server.calls.lock().await.push(format!(
        "STOP {id} scope={}",
        query.get("scope").cloned().unwrap_or_default()
    ));
    StatusCode::NO_CONTENT
}

async fn services() -> Json<Value> {
    Json(json!([
        { "id": "svc-1", "name": "Gel Manicure", "durationMinutes": 45, "priceCents": 4000 },
        { "id": "svc-2", "name": "Spa Pedicure", "durationMinutes": 60, "priceCents": 5500 }
    ]))
}

async fn availability(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    assert_eq!(query.get("locationId").map(String::as_str), Some("loc-1"));
    assert_eq!(query.get("date").map(String::as_str), Some("2026-10-20"));
    Json(json!([
        { "startTime": "2026-10-20T16:00:00Z", "endTime": "2026-10-20T17:00:00Z", "technicianId": "t-1" }
    ]))
}

async fn loaded(server: &Server) -> (AppointmentsView, Arc<RecordingNotifier>) {
    let app = Router::new()
        .route("/api/appointments", get(list).post(create))
        .route(
            "/api/appointments/:id",
            axum::routing::put(put_appointment).patch(patch_appointment),
        )
        .route("/api/appointments/:id/cancel", post(cancel))
        .route(
            "/api/appointments/:id/line-items",
            get(list_items).post(add_item).delete(delete_item),
        )
        .route(
            "/api/appointments/:id/recurring",
            post(create_recurring).delete(stop_recurring),
        )
        .route("/api/services", get(services))
        .route("/api/availability", get(availability))
        .with_state(server.clone());
    let base = spawn_api(app).await;
    let notifier = recording();
    let view = AppointmentsView::new(api(&base), notifier.clone());
    view.load(&AppointmentQuery::default())
        .await
        .expect("load")
        .expect("current");
    (view, notifier)
}

fn pacific() -> FixedOffset {
    FixedOffset::west_opt(7 * 3600).unwrap()
}

fn id(raw: &str) -> AppointmentId {
    AppointmentId::new(raw)
}

#[tokio::test]
async fn moving_a_single_appointment_sends_only_times() {
    let server = seeded();
    let (view, _) = loaded(&server).await;

    let mut draft = view.draft(&id("a-1"), pacific()).await.expect("draft");
    draft.set_start_time(NaiveTime::from_hms_opt(11, 30, 0).unwrap());
    let saved = view
        .save(&id("a-1"), &draft, RecurrenceScope::All)
        .await
        .expect("save");

    assert_eq!(saved.start_time, ts("2026-10-20T18:30:00Z"));
    assert_eq!(saved.end_time, ts("2026-10-20T19:30:00Z"));
    assert_eq!(
        server.calls.lock().await.clone(),
        vec!["PUT a-1 scope=- endTime,expectedUpdatedAt,startTime"]
    );
}

#[tokio::test]
async fn series_edit_carries_scope() {
    let server = seeded();
    let (view, _) = loaded(&server).await;

    let mut draft = view.draft(&id("a-3"), pacific()).await.expect("draft");
    draft.set_duration(90);
    view.save(&id("a-3"), &draft, RecurrenceScope::ThisAndFuture)
        .await
        .expect("save");

    assert_eq!(
        server.calls.lock().await.clone(),
        vec!["PUT a-3 scope=this_and_future endTime"]
    );
    assert_eq!(view.get(&id("a-3")).await.unwrap().duration_minutes(), 90);
}

#[tokio::test]
async fn unchanged_draft_is_not_sent() {
    let server = seeded();
    let (view, notifier) = loaded(&server).await;
    let draft = view.draft(&id("a-1"), pacific()).await.expect("draft");
    view.save(&id("a-1"), &draft, RecurrenceScope::This)
        .await
        .expect("noop");
    assert!(server.calls.lock().await.is_empty());
    assert_eq!(notifier.last().unwrap().level, ToastLevel::Info);
}

#[tokio::test]
async fn incomplete_draft_is_not_booked() {
    let server = seeded();
    let (view, notifier) = loaded(&server).await;

    let start = NaiveDateTime::parse_from_str("2026-10-21 09:00", "%Y-%m-%d %H:%M").unwrap();
    let mut draft = AppointmentDraft::new(start, pacific());
    draft.technician_id = Some(TechnicianId::new("t-1"));
    draft.location_id = Some(LocationId::new("loc-1"));
    draft.service_id = Some(ServiceId::new("svc-1"));

    view.create(&draft).await.expect_err("no client");
    assert!(server.calls.lock().await.is_empty());
    assert_eq!(notifier.errors(), vec!["Client is required"]);

    draft.client_id = Some(shared::domain::ClientId::new("c-1"));
    let booked = view.create(&draft).await.expect("book");
    assert_eq!(booked.id, id("a-new"));
    assert_eq!(booked.start_time, ts("2026-10-21T16:00:00Z"));
    assert_eq!(view.appointments().await.len(), 5);
}

#[tokio::test]
async fn unconventional_status_is_still_sent() {
    let server = seeded();
    let (view, notifier) = loaded(&server).await;

    let saved = view
        .set_status(&id("a-1"), AppointmentStatus::Pending)
        .await
        .expect("status");
    assert_eq!(saved.status, AppointmentStatus::Pending);
    assert_eq!(
        server.calls.lock().await.clone(),
        vec!["PATCH a-1 expectedUpdatedAt,status"]
    );
    assert_eq!(notifier.last().unwrap().message, "Status changed to PENDING");
}

#[tokio::test]
async fn failed_no_show_restores_appointment() {
    let server = seeded();
    let (view, notifier) = loaded(&server).await;
    let before = view.get(&id("a-1")).await.unwrap();

    view.mark_no_show(&id("a-1"), 2_500)
        .await
        .expect_err("gateway");

    assert_eq!(view.get(&id("a-1")).await.unwrap(), before);
    assert_eq!(notifier.errors(), vec!["Failed to mark no-show"]);
}

#[tokio::test]
async fn waiving_requires_a_fee_and_a_reason() {
    let server = seeded();
    let (view, notifier) = loaded(&server).await;

    view.waive_no_show_fee(&id("a-1"), " ")
        .await
        .expect_err("reason");
    view.waive_no_show_fee(&id("a-1"), "car trouble")
        .await
        .expect_err("no fee");
    assert!(server.calls.lock().await.is_empty());
    assert_eq!(
        notifier.errors(),
        vec!["Reason is required", "This appointment has no no-show fee"]
    );
}

#[tokio::test]
async fn line_items_are_validated_against_running_total() {
    let server = seeded();
    let (view, _) = loaded(&server).await;

    let discount = LineItemInput {
        kind: LineItemKind::Discount,
        description: "Birthday".into(),
        service_id: None,
        product_id: None,
        quantity: 1,
        unit_price_cents: 5_000,
    };
    view.add_line_item(&id("a-1"), discount.clone())
        .await
        .expect_err("too large");
    assert_eq!(server.calls.lock().await.clone(), vec!["GET line-items"]);

    let polish = LineItemInput {
        kind: LineItemKind::Product,
        description: "Cuticle oil".into(),
        service_id: None,
        product_id: Some(ProductId::new("p-oil")),
        quantity: 2,
        unit_price_cents: 800,
    };
    let added = view.add_line_item(&id("a-1"), polish).await.expect("add");
    assert_eq!(added.id, LineItemId::new("li-2"));
    assert_eq!(view.total_cents().await, 5_600);

    view.add_line_item(&id("a-1"), discount).await.expect("fits now");
    assert_eq!(view.total_cents().await, 600);
    assert_eq!(view.line_items().await.len(), 3);
}

#[tokio::test]
async fn failed_line_item_removal_puts_it_back() {
    let server = seeded();
    let (view, notifier) = loaded(&server).await;
    let before = view.load_line_items(&id("a-1")).await.expect("items");

    view.remove_line_item(&id("a-1"), &LineItemId::new("li-1"))
        .await
        .expect_err("locked");

    assert_eq!(view.line_items().await, before);
    assert_eq!(notifier.errors(), vec!["Failed to remove line item"]);
    assert!(server
        .calls
        .lock()
        .await
        .contains(&"DELETE line-item li-1".to_string()));
}

#[tokio::test]
async fn cancelling_whole_series_marks_loaded_occurrences() {
    let server = seeded();
    let (view, _) = loaded(&server).await;

    view.cancel(&id("a-2"), Some("moving away".into()), RecurrenceScope::All)
        .await
        .expect("cancel");

    for occurrence in ["a-2", "a-3", "a-4"] {
        assert_eq!(
            view.get(&id(occurrence)).await.unwrap().status,
            AppointmentStatus::Cancelled
        );
    }
    assert_eq!(
        view.get(&id("a-1")).await.unwrap().status,
        AppointmentStatus::Confirmed
    );
    assert_eq!(server.calls.lock().await.clone(), vec!["CANCEL a-2 scope=all"]);
}

#[tokio::test]
async fn stopping_from_an_occurrence_drops_later_ones() {
    let server = seeded();
    let (view, _) = loaded(&server).await;

    view.stop_recurring(&id("a-3"), RecurrenceScope::ThisAndFuture)
        .await
        .expect("stop");

    assert!(view.get(&id("a-4")).await.is_none());
    assert!(view.get(&id("a-2")).await.unwrap().is_recurring());
    assert!(!view.get(&id("a-3")).await.unwrap().is_recurring());
    assert_eq!(
        server.calls.lock().await.clone(),
        vec!["STOP a-3 scope=this_and_future"]
    );
}

#[tokio::test]
async fn repeating_adds_returned_occurrences() {
    let server = seeded();
    let (view, notifier) = loaded(&server).await;
    let rule = RecurrenceRule::new(Frequency::Weekly)
        .with_interval(2)
        .unwrap();

    let counted_rule = rule.clone().with_count(3).unwrap();
    view.make_recurring(&id("a-1"), counted_rule, RecurrenceEnd::Count(3))
        .await
        .expect_err("two ends");
    assert!(server.calls.lock().await.is_empty());

    let created = view
        .make_recurring(&id("a-1"), rule, RecurrenceEnd::Count(2))
        .await
        .expect("repeat");
    assert_eq!(created.len(), 2);
    assert!(view.get(&id("a-1")).await.unwrap().is_recurring());
    assert!(view.get(&id("a-1b")).await.is_some());
    assert_eq!(
        server.calls.lock().await.clone(),
        vec!["REPEAT a-1 rule=FREQ=WEEKLY;INTERVAL=2 count=2"]
    );
    assert_eq!(notifier.last().unwrap().message, "Repeats 2 time(s)");
}

#[tokio::test]
async fn editor_lookups_load_together() {
    let server = seeded();
    let (view, _) = loaded(&server).await;

    let (services, slots) = view
        .editor_lookups(&AvailabilityQuery {
            location_id: LocationId::new("loc-1"),
            date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            technician_id: None,
            service_id: Some(ServiceId::new("svc-1")),
        })
        .await
        .expect("lookups");
    assert_eq!(services.len(), 2);
    assert_eq!(slots[0].technician_id, TechnicianId::new("t-1"));
}

#[tokio::test]
async fn conflict_adopts_the_record_the_server_sends() {
    let server = seeded();
    let (view, notifier) = loaded(&server).await;

    let err = view
        .set_status(&id("a-1"), AppointmentStatus::Completed)
        .await
        .expect_err("conflict");
    assert!(err.is_conflict());

    let shown = view.get(&id("a-1")).await.expect("still loaded");
    assert_eq!(shown.status, AppointmentStatus::InProgress);
    assert_eq!(shown.updated_at, Some(ts("2026-10-02T08:00:00Z")));
    assert_eq!(notifier.errors().len(), 1);
    assert!(notifier.errors()[0].contains("try again"));
}

#[tokio::test]
async fn conflict_without_record_refetches_the_calendar() {
    let server = seeded();
    let (view, notifier) = loaded(&server).await;

    view.set_status(&id("a-1"), AppointmentStatus::InProgress)
        .await
        .expect_err("conflict");

    let shown = view.get(&id("a-1")).await.expect("still loaded");
    assert_eq!(shown.status, AppointmentStatus::CheckedIn);
    assert_eq!(shown.notes.as_deref(), Some("Checked in at the front desk"));
    assert_eq!(notifier.errors().len(), 1);
}
