use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use serde_json::{json, Value};

use super::*;
use crate::{
    notify::RecordingNotifier,
    test_support::{appointment_json, client_json, recording, spawn_api, ts, Calls},
    transport::ClientOptions,
};

#[derive(Clone, Default)]
struct Server {
    calls: Calls,
    chi_changed: Arc<AtomicBool>,
}

async fn list(
    State(server): State<Server>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let search = query.get("search").cloned().unwrap_or_default();
    let page = query.get("page").cloned().unwrap_or_default();
    server
        .calls
        .lock()
        .await
        .push(format!("GET search={search} page={page}"));
    if search == "slow" {
        tokio::time::sleep(Duration::from_millis(150)).await;
        return Json(json!({
            "clients": [client_json("c-9", "Slow", "2026-10-01T17:00:00Z")],
            "total": 1, "page": 1, "pageSize": 25
        }));
    }
    if search == "fast" {
        return Json(json!({
            "clients": [client_json("c-8", "Fast", "2026-10-01T17:00:00Z")],
            "total": 1, "page": 1, "pageSize": 25
        }));
    }
    let chi = if server.chi_changed.load(Ordering::SeqCst) {
        client_json("c-3", "Chi Nguyen", "2026-10-03T09:00:00Z")
    } else {
        client_json("c-3", "Chi", "2026-10-01T17:00:00Z")
    };
    Json(json!({
        "clients": [
            client_json("c-1", "Ana", "2026-10-01T17:00:00Z"),
            client_json("c-2", "Bao", "2026-10-01T17:00:00Z"),
            chi
        ],
        "total": 60,
        "page": page.parse::<u32>().unwrap_or(1),
        "pageSize": 25
    }))
}

async fn patch_client(
    State(server): State<Server>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    server.calls.lock().await.push(format!("PATCH {id} {body}"));
    match id.as_str() {
        "c-2" => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": "Client was modified",
                "conflict": true,
                "current": client_json("c-2", "Bao Tran", "2026-10-02T08:00:00Z")
            })),
        ),
        "c-3" => {
            server.chi_changed.store(true, Ordering::SeqCst);
            (StatusCode::CONFLICT, Json(json!({ "error": "stale" })))
        }
        _ => {
            let mut saved = client_json(&id, "Ana", "2026-10-05T12:00:00Z");
            for (key, value) in body.as_object().into_iter().flatten() {
                if key != "expectedUpdatedAt" {
                    saved[key] = value.clone();
                }
            }
            (StatusCode::OK, Json(saved))
        }
    }
}

async fn history(Path(id): Path<String>) -> Json<Value> {
    assert_eq!(id, "c-1");
    Json(json!([
        appointment_json("a-1", "2026-09-01T17:00:00Z", "2026-09-01T18:00:00Z", "COMPLETED"),
        appointment_json("a-2", "2026-10-01T17:00:00Z", "2026-10-01T18:00:00Z", "NO_SHOW")
    ]))
}

async fn view_with(server: &Server) -> (ClientsView, Arc<RecordingNotifier>) {
    let app = Router::new()
        .route("/api/clients", get(list))
        .route("/api/clients/:id", patch(patch_client))
        .route("/api/clients/:id/appointments", get(history))
        .with_state(server.clone());
    let base = spawn_api(app).await;
    let options = ClientOptions {
        search_debounce: Duration::from_millis(20),
        ..ClientOptions::default()
    };
    let notifier = recording();
    let view = ClientsView::new(
        SalonApi::new(&base, options).expect("api"),
        notifier.clone(),
    );
    (view, notifier)
}

async fn loaded(server: &Server) -> (ClientsView, Arc<RecordingNotifier>) {
    let (view, notifier) = view_with(server).await;
    view.refresh().await.expect("load");
    server.calls.lock().await.clear();
    (view, notifier)
}

#[tokio::test]
async fn blocking_without_reason_never_calls_api() {
    let server = Server::default();
    let (view, notifier) = loaded(&server).await;
    let before = view.get(&ClientId::new("c-1")).await;

    let err = view
        .set_blocked(&ClientId::new("c-1"), true, Some("  ".into()))
        .await
        .expect_err("reason required");
    assert!(matches!(err, ClientError::Validation(_)));
    assert!(server.calls.lock().await.is_empty());
    assert_eq!(view.get(&ClientId::new("c-1")).await, before);
    assert_eq!(
        notifier.errors(),
        vec!["A reason is required to block a client"]
    );
}

#[tokio::test]
async fn contact_update_normalizes_phone_and_sends_version() {
    let server = Server::default();
    let (view, _notifier) = loaded(&server).await;

    let saved = view
        .update_contact(
            &ClientId::new("c-1"),
            ClientPatch {
                phone: Some("1 (714) 555-0123".into()),
                ..ClientPatch::default()
            },
        )
        .await
        .expect("update");
    assert_eq!(saved.phone, "7145550123");

    let calls = server.calls.lock().await.clone();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].contains(r#""phone":"7145550123""#));
    assert!(calls[0].contains(r#""expectedUpdatedAt":"2026-10-01T17:00:00Z""#));
    assert_eq!(
        view.get(&ClientId::new("c-1")).await.unwrap().updated_at,
        ts("2026-10-05T12:00:00Z")
    );
}

#[tokio::test]
async fn bad_phone_is_rejected_locally() {
    let server = Server::default();
    let (view, notifier) = loaded(&server).await;
    view.update_contact(
        &ClientId::new("c-1"),
        ClientPatch {
            phone: Some("555-0123".into()),
            ..ClientPatch::default()
        },
    )
    .await
    .expect_err("short phone");
    assert!(server.calls.lock().await.is_empty());
    assert_eq!(notifier.errors(), vec!["Phone number must be 10 digits"]);
}

#[tokio::test]
async fn conflict_adopts_record_from_response() {
    let server = Server::default();
    let (view, notifier) = loaded(&server).await;

    let err = view
        .update_contact(
            &ClientId::new("c-2"),
            ClientPatch {
                name: Some("Bao T.".into()),
                ..ClientPatch::default()
            },
        )
        .await
        .expect_err("conflict");
    assert!(err.is_conflict());

    let shown = view.get(&ClientId::new("c-2")).await.unwrap();
    assert_eq!(shown.name, "Bao Tran");
    assert_eq!(shown.updated_at, ts("2026-10-02T08:00:00Z"));
    assert!(notifier.errors()[0].contains("changed by someone else"));
}

#[tokio::test]
async fn conflict_without_record_refetches() {
    let server = Server::default();
    let (view, _notifier) = loaded(&server).await;

    view.update_notes(&ClientId::new("c-3"), "prefers almond shape")
        .await
        .expect_err("conflict");

    let shown = view.get(&ClientId::new("c-3")).await.unwrap();
    assert_eq!(shown.name, "Chi Nguyen");
    assert_eq!(shown.notes, None);
}

#[tokio::test]
async fn rapid_typing_sends_only_last_search() {
    let server = Server::default();
    let (view, _notifier) = view_with(&server).await;

    let first = view.search("a");
    let second = async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        view.search("an").await
    };
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.expect("first"), None);
    assert!(second.expect("second").is_some());
    assert_eq!(
        server.calls.lock().await.clone(),
        vec!["GET search=an page=1"]
    );
}

#[tokio::test]
async fn slow_search_response_is_discarded() {
    let server = Server::default();
    let (view, _notifier) = view_with(&server).await;

    let slow = view.search("slow");
    let fast = async {
        tokio::time::sleep(Duration::from_millis(60)).await;
        view.search("fast").await
    };
    let (slow, fast) = tokio::join!(slow, fast);

    assert_eq!(slow.expect("slow"), None);
    assert!(fast.expect("fast").is_some());
    let names: Vec<_> = view.clients().await.into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["Fast"]);
    assert_eq!(view.listing().await.query.search, "fast");
}

#[tokio::test]
async fn paging_tracks_totals() {
    let server = Server::default();
    let (view, _notifier) = loaded(&server).await;
    assert_eq!(view.listing().await.page_count, 3);

    view.go_to_page(2).await.expect("page").expect("current");
    view.set_filter(ClientFilter::NoShows).await.expect("filter");
    assert_eq!(
        server.calls.lock().await.clone(),
        vec!["GET search= page=2", "GET search= page=1"]
    );
    assert_eq!(view.listing().await.query.filter, ClientFilter::NoShows);
}

#[tokio::test]
async fn history_lists_past_appointments() {
    let server = Server::default();
    let (view, _notifier) = view_with(&server).await;
    let history = view
        .appointment_history(&ClientId::new("c-1"))
        .await
        .expect("history");
    assert_eq!(history.len(), 2);
}
