use std::sync::Arc;

use shared::{
    domain::{ClientFilter, ClientId},
    protocol::{Appointment, Client, ClientPage, ClientPatch, ClientQuery},
};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    error::{ClientError, ClientResult},
    latest::{RequestGuard, RequestTicket},
    notify::{reject, report, report_failure, Notifier},
    optimistic::{apply_optimistic, OptimisticCollection},
    transport::{conflict_current, SalonApi},
};

/// What the client list is currently showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientListing {
    pub query: ClientQuery,
    pub total: u32,
    pub page_count: u32,
}

pub struct ClientsView {
    api: SalonApi,
    notifier: Arc<dyn Notifier>,
    guard: RequestGuard,
    clients: Mutex<OptimisticCollection<Client>>,
    listing: Mutex<ClientListing>,
}

impl ClientsView {
    pub fn new(api: SalonApi, notifier: Arc<dyn Notifier>) -> Self {
        let query = ClientQuery {
            page: 1,
            page_size: api.options().page_size,
            ..ClientQuery::default()
        };
        Self {
            api,
            notifier,
            guard: RequestGuard::new(),
            clients: Mutex::new(OptimisticCollection::default()),
            listing: Mutex::new(ClientListing {
                query,
                total: 0,
                page_count: 0,
            }),
        }
    }

    pub async fn clients(&self) -> Vec<Client> {
        self.clients.lock().await.items().to_vec()
    }

    pub async fn get(&self, id: &ClientId) -> Option<Client> {
        self.clients.lock().await.get(id).cloned()
    }

    pub async fn listing(&self) -> ClientListing {
        self.listing.lock().await.clone()
    }

    /// Debounced search from page 1. Returns `Ok(None)` when a later search,
    /// filter change or page change superseded this one, either during the
    /// debounce window or while the request was in flight.
    pub async fn search(&self, term: &str) -> ClientResult<Option<ClientPage>> {
        let query = {
            let mut listing = self.listing.lock().await;
            listing.query.search = term.trim().to_string();
            listing.query.page = 1;
            listing.query.clone()
        };
        let ticket = self.guard.begin();
        if !self
            .guard
            .wait_debounce(ticket, self.api.options().search_debounce)
            .await
        {
            return Ok(None);
        }
        self.fetch(ticket, query).await
    }

    pub async fn set_filter(&self, filter: ClientFilter) -> ClientResult<Option<ClientPage>> {
        let query = {
            let mut listing = self.listing.lock().await;
            listing.query.filter = filter;
            listing.query.page = 1;
            listing.query.clone()
        };
        let ticket = self.guard.begin();
        self.fetch(ticket, query).await
    }

    pub async fn go_to_page(&self, page: u32) -> ClientResult<Option<ClientPage>> {
        let query = {
            let mut listing = self.listing.lock().await;
            listing.query.page = page.max(1);
            listing.query.clone()
        };
        let ticket = self.guard.begin();
        self.fetch(ticket, query).await
    }

    /// Re-run the current query.
    pub async fn refresh(&self) -> ClientResult<Option<ClientPage>> {
        let query = self.listing.lock().await.query.clone();
        let ticket = self.guard.begin();
        self.fetch(ticket, query).await
    }

    async fn fetch(
        &self,
        ticket: RequestTicket,
        query: ClientQuery,
    ) -> ClientResult<Option<ClientPage>> {
        let result = self.api.list_clients(&query).await;
        let Some(result) = self.guard.accept(ticket, result) else {
            return Ok(None);
        };
        let page = report_failure(&*self.notifier, result, "Failed to load clients")?;
        self.clients.lock().await.replace_all(page.clients.clone());
        let mut listing = self.listing.lock().await;
        listing.total = page.total;
        listing.page_count = page.page_count();
        Ok(Some(page))
    }

    pub async fn update_contact(&self, id: &ClientId, patch: ClientPatch) -> ClientResult<Client> {
        self.submit(id, patch, "Failed to update client", |client| {
            format!("{} updated", client.name)
        })
        .await
    }

    /// Blocking requires a reason; unblocking clears it.
    pub async fn set_blocked(
        &self,
        id: &ClientId,
        blocked: bool,
        reason: Option<String>,
    ) -> ClientResult<Client> {
        let patch = ClientPatch {
            blocked: Some(blocked),
            block_reason: if blocked { Some(reason.unwrap_or_default()) } else { None },
            ..ClientPatch::default()
        };
        let failure = if blocked {
            "Failed to block client"
        } else {
            "Failed to unblock client"
        };
        self.submit(id, patch, failure, move |client| {
            let state = if blocked { "blocked" } else { "unblocked" };
            format!("{} {state}", client.name)
        })
        .await
    }

    pub async fn update_notes(&self, id: &ClientId, notes: &str) -> ClientResult<Client> {
        let patch = ClientPatch {
            notes: Some(notes.trim().to_string()),
            ..ClientPatch::default()
        };
        self.submit(id, patch, "Failed to save notes", |_| "Notes saved".to_string())
            .await
    }

    /// Validated optimistic PATCH guarded by `expectedUpdatedAt`.
    ///
    /// On a conflict the local edit is dropped and the server's current record
    /// replaces it, taken from the conflict body or, failing that, refetched.
    async fn submit(
        &self,
        id: &ClientId,
        mut patch: ClientPatch,
        failure: &str,
        success: impl FnOnce(&Client) -> String,
    ) -> ClientResult<Client> {
        if let Err(err) = patch.validate() {
            return reject(&*self.notifier, err);
        }
        if patch.is_empty() {
            return reject(&*self.notifier, ClientError::rejected("Nothing to update"));
        }
        let Some(current) = self.get(id).await else {
            return reject(&*self.notifier, ClientError::rejected("Client is not loaded"));
        };
        if patch.expected_updated_at.is_none() {
            patch.expected_updated_at = Some(current.updated_at);
        }

        let result = apply_optimistic(
            &self.clients,
            id,
            |client| patch.apply_to(client),
            |_| self.api.patch_client(id, &patch),
        )
        .await;

        if let Err(err) = &result {
            if err.is_conflict() {
                warn!("clients: edit conflict client_id={id}");
                self.adopt_current(id, err).await;
            }
        }
        report(&*self.notifier, result, success, failure)
    }

    async fn adopt_current(&self, id: &ClientId, err: &ClientError) {
        if let Some(current) = conflict_current::<Client>(err) {
            self.clients.lock().await.upsert(current);
            return;
        }
        let query = self.listing.lock().await.query.clone();
        match self.api.list_clients(&query).await {
            Ok(page) => {
                if let Some(current) = page.clients.into_iter().find(|client| &client.id == id) {
                    self.clients.lock().await.upsert(current);
                }
            }
            Err(refetch) => warn!("clients: refetch after conflict failed client_id={id} error={refetch}"),
        }
    }

    pub async fn appointment_history(&self, id: &ClientId) -> ClientResult<Vec<Appointment>> {
        let result = self.api.client_appointments(id).await;
        if let Ok(history) = &result {
            info!("clients: loaded history client_id={id} count={}", history.len());
        }
        report_failure(&*self.notifier, result, "Failed to load appointment history")
    }
}

#[cfg(test)]
#[path = "../tests/clients_tests.rs"]
mod tests;
