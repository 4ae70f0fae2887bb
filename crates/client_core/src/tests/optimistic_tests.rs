use std::sync::atomic::{AtomicBool, Ordering};

use shared::domain::LocationId;

use super::*;

#[derive(Debug, Clone, PartialEq)]
struct Row {
    id: LocationId,
    name: String,
    count: u32,
}

impl Keyed for Row {
    type Key = LocationId;

    fn key(&self) -> &LocationId {
        &self.id
    }
}

fn row(id: &str, name: &str) -> Row {
    Row {
        id: LocationId::new(id),
        name: name.to_string(),
        count: 0,
    }
}

fn rows() -> Mutex<OptimisticCollection<Row>> {
    Mutex::new(OptimisticCollection::new(vec![
        row("a", "Irvine"),
        row("b", "Tustin"),
        row("c", "Orange"),
    ]))
}

#[tokio::test]
async fn failed_update_restores_exact_snapshot() {
    let collection = rows();
    let before = collection.lock().await.clone();

    let err = apply_optimistic(
        &collection,
        &LocationId::new("b"),
        |row| {
            row.name = "Tustin Market Place".into();
            row.count = 9;
        },
        |patched| async move {
            assert_eq!(patched.name, "Tustin Market Place");
            Err::<Row, _>(ClientError::rejected("server said no"))
        },
    )
    .await
    .expect_err("commit fails");

    assert!(matches!(err, ClientError::Rejected(_)));
    assert_eq!(*collection.lock().await, before);
}

#[tokio::test]
async fn successful_update_keeps_server_version() {
    let collection = rows();

    let saved = apply_optimistic(
        &collection,
        &LocationId::new("a"),
        |row| row.name = "irvine spectrum".into(),
        |mut patched| async move {
            patched.name = "Irvine Spectrum".into();
            Ok(patched)
        },
    )
    .await
    .expect("commit");

    assert_eq!(saved.name, "Irvine Spectrum");
    let guard = collection.lock().await;
    assert_eq!(guard.get(&LocationId::new("a")).unwrap().name, "Irvine Spectrum");
}

#[tokio::test]
async fn patched_value_is_visible_while_request_is_in_flight() {
    let collection = rows();
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

    let id_c = LocationId::new("c");
    let update = apply_optimistic(
        &collection,
        &id_c,
        |row| row.count = 5,
        |patched| async move {
            let _ = release_rx.await;
            Ok(patched)
        },
    );
    let observe = async {
        tokio::task::yield_now().await;
        let seen = collection
            .lock()
            .await
            .get(&LocationId::new("c"))
            .map(|row| row.count);
        let _ = release_tx.send(());
        seen
    };

    let (result, seen) = tokio::join!(update, observe);
    result.expect("update");
    assert_eq!(seen, Some(5));
}

#[tokio::test]
async fn missing_record_is_rejected_without_commit() {
    let collection = rows();
    let committed = AtomicBool::new(false);
    let err = apply_optimistic(
        &collection,
        &LocationId::new("zz"),
        |_| {},
        |patched| {
            committed.store(true, Ordering::SeqCst);
            async move { Ok(patched) }
        },
    )
    .await
    .expect_err("missing");
    assert!(matches!(err, ClientError::Rejected(_)));
    assert!(!committed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn failed_removal_reinserts_at_original_index() {
    let collection = rows();
    let before = collection.lock().await.clone();

    remove_optimistic(&collection, &LocationId::new("b"), |_| async {
        Err(ClientError::rejected("in use"))
    })
    .await
    .expect_err("remove fails");

    assert_eq!(*collection.lock().await, before);

    let removed = remove_optimistic(&collection, &LocationId::new("b"), |_| async { Ok(()) })
        .await
        .expect("remove");
    assert_eq!(removed.name, "Tustin");
    assert_eq!(collection.lock().await.len(), 2);
}

#[tokio::test]
async fn insert_swaps_placeholder_for_server_record() {
    let collection = rows();
    let placeholder = row(&temp_id(), "Anaheim");
    assert!(is_temp_id(placeholder.id.as_str()));

    let created = insert_optimistic(&collection, placeholder, async {
        Ok(row("d", "Anaheim"))
    })
    .await
    .expect("insert");
    assert_eq!(created.id, LocationId::new("d"));

    let guard = collection.lock().await;
    assert_eq!(guard.len(), 4);
    assert!(guard.items().iter().all(|row| !is_temp_id(row.id.as_str())));
}

#[tokio::test]
async fn failed_insert_drops_placeholder() {
    let collection = rows();
    insert_optimistic(&collection, row(&temp_id(), "Anaheim"), async {
        Err::<Row, _>(ClientError::rejected("duplicate"))
    })
    .await
    .expect_err("insert fails");
    assert_eq!(collection.lock().await.len(), 3);
}
