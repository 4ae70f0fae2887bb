use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate};
use shared::{
    domain::{AppointmentId, AppointmentStatus, LineItemId, RecurrenceScope},
    error::ValidationError,
    protocol::{
        appointment_total_cents, Appointment, AppointmentPatch, AppointmentQuery,
        AvailabilityQuery, AvailabilitySlot, CancelRequest, LineItem, LineItemInput, NoShowFee,
        RecurringRequest, RecurringSettings, Service,
    },
    recurrence::RecurrenceRule,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    editor::AppointmentDraft,
    error::{ClientError, ClientResult},
    latest::RequestGuard,
    notify::{reject, report, report_failure, Notifier, Toast},
    optimistic::{
        apply_optimistic, insert_optimistic, remove_optimistic, temp_id, OptimisticCollection,
    },
    transport::{conflict_current, SalonApi},
};

/// How a new series ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurrenceEnd {
    Count(u32),
    Until(NaiveDate),
}

enum Write {
    Patch,
    Put(Option<RecurrenceScope>),
}

pub struct AppointmentsView {
    api: SalonApi,
    notifier: Arc<dyn Notifier>,
    guard: RequestGuard,
    appointments: Mutex<OptimisticCollection<Appointment>>,
    last_query: Mutex<AppointmentQuery>,
    line_items: Mutex<OptimisticCollection<LineItem>>,
    line_items_for: Mutex<Option<AppointmentId>>,
}

impl AppointmentsView {
    pub fn new(api: SalonApi, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            api,
            notifier,
            guard: RequestGuard::new(),
            appointments: Mutex::new(OptimisticCollection::default()),
            last_query: Mutex::new(AppointmentQuery::default()),
            line_items: Mutex::new(OptimisticCollection::default()),
            line_items_for: Mutex::new(None),
        }
    }

    pub async fn appointments(&self) -> Vec<Appointment> {
        self.appointments.lock().await.items().to_vec()
    }

    pub async fn get(&self, id: &AppointmentId) -> Option<Appointment> {
        self.appointments.lock().await.get(id).cloned()
    }

    /// Editor state for a loaded appointment, in the salon's offset.
    pub async fn draft(&self, id: &AppointmentId, offset: FixedOffset) -> Option<AppointmentDraft> {
        self.get(id)
            .await
            .map(|appointment| AppointmentDraft::from_appointment(&appointment, offset))
    }

    /// Load the calendar range. `Ok(None)` when a newer load won.
    pub async fn load(&self, query: &AppointmentQuery) -> ClientResult<Option<Vec<Appointment>>> {
        *self.last_query.lock().await = query.clone();
        let Some(result) = self.guard.run(self.api.list_appointments(query)).await else {
            return Ok(None);
        };
        let appointments =
            report_failure(&*self.notifier, result, "Failed to load appointments")?;
        self.appointments
            .lock()
            .await
            .replace_all(appointments.clone());
        Ok(Some(appointments))
    }

    pub async fn create(&self, draft: &AppointmentDraft) -> ClientResult<Appointment> {
        let input = match draft.to_input() {
            Ok(input) => input,
            Err(err) => return reject(&*self.notifier, err),
        };
        let result = self.api.create_appointment(&input).await;
        if let Ok(appointment) = &result {
            info!("appointments: booked appointment_id={}", appointment.id);
            self.appointments.lock().await.upsert(appointment.clone());
        }
        report(
            &*self.notifier,
            result,
            |_| "Appointment booked".to_string(),
            "Failed to create appointment",
        )
    }

    /// Save editor changes. For an occurrence of a series, `scope` picks which
    /// occurrences the API rewrites; only this one is updated locally.
    pub async fn save(
        &self,
        id: &AppointmentId,
        draft: &AppointmentDraft,
        scope: RecurrenceScope,
    ) -> ClientResult<Appointment> {
        let current = self.loaded(id).await?;
        let patch = match draft.to_patch(&current) {
            Ok(patch) => patch,
            Err(err) => return reject(&*self.notifier, err),
        };
        if patch.is_empty() {
            self.notifier.notify(Toast::info("No changes to save"));
            return Ok(current);
        }
        let scope = current.is_recurring().then_some(scope);
        let result = self
            .write(id, patch, Write::Put(scope), "Failed to save appointment", |_| {
                "Appointment saved".to_string()
            })
            .await;
        let series_wide = matches!(
            scope,
            Some(RecurrenceScope::ThisAndFuture | RecurrenceScope::All)
        );
        if result.is_ok() && series_wide {
            debug!("appointments: series edit saved appointment_id={id}, other occurrences refresh on next load");
        }
        result
    }

    /// Any status is accepted; moves outside the usual flow are only logged.
    pub async fn set_status(
        &self,
        id: &AppointmentId,
        status: AppointmentStatus,
    ) -> ClientResult<Appointment> {
        let current = self.loaded(id).await?;
        if !current.status.is_conventional_transition(status) {
            warn!(
                "appointments: unusual status change appointment_id={id} from={} to={status}",
                current.status
            );
        }
        let patch = AppointmentPatch {
            status: Some(status),
            ..AppointmentPatch::default()
        };
        self.write(id, patch, Write::Patch, "Failed to update status", move |_| {
            format!("Status changed to {status}")
        })
        .await
    }

    pub async fn cancel(
        &self,
        id: &AppointmentId,
        reason: Option<String>,
        scope: RecurrenceScope,
    ) -> ClientResult<Appointment> {
        let current = self.loaded(id).await?;
        let request = CancelRequest {
            reason: reason
                .map(|reason| reason.trim().to_string())
                .filter(|reason| !reason.is_empty()),
            scope,
            notify_client: false,
        };
        let result = apply_optimistic(
            &self.appointments,
            id,
            |appointment| appointment.status = AppointmentStatus::Cancelled,
            |_| self.api.cancel_appointment(id, &request),
        )
        .await;
        if result.is_ok() && current.is_recurring() {
            let mut appointments = self.appointments.lock().await;
            let mates = series_mates(appointments.items(), &current, scope);
            for mate in mates {
                appointments.upsert(Appointment {
                    status: AppointmentStatus::Cancelled,
                    ..mate
                });
            }
        }
        report(
            &*self.notifier,
            result,
            |_| "Appointment cancelled".to_string(),
            "Failed to cancel appointment",
        )
    }

    /// Mark a no-show, optionally recording a fee to charge.
    pub async fn mark_no_show(&self, id: &AppointmentId, fee_cents: i64) -> ClientResult<Appointment> {
        if fee_cents < 0 {
            return reject(
                &*self.notifier,
                ValidationError::new("fee", "Fee cannot be negative"),
            );
        }
        self.loaded(id).await?;
        let patch = AppointmentPatch {
            status: Some(AppointmentStatus::NoShow),
            no_show_fee: (fee_cents > 0).then(|| NoShowFee {
                amount_cents: fee_cents,
                charged: false,
                waived: false,
                reason: None,
            }),
            ..AppointmentPatch::default()
        };
        self.write(id, patch, Write::Patch, "Failed to mark no-show", |_| {
            "Marked as no-show".to_string()
        })
        .await
    }

    pub async fn waive_no_show_fee(&self, id: &AppointmentId, reason: &str) -> ClientResult<Appointment> {
        let reason = reason.trim();
        if reason.is_empty() {
            return reject(&*self.notifier, ValidationError::required("reason", "Reason"));
        }
        let current = self.loaded(id).await?;
        let Some(fee) = current.no_show_fee else {
            return reject(
                &*self.notifier,
                ClientError::rejected("This appointment has no no-show fee"),
            );
        };
        let patch = AppointmentPatch {
            no_show_fee: Some(NoShowFee {
                waived: true,
                reason: Some(reason.to_string()),
                ..fee
            }),
            ..AppointmentPatch::default()
        };
        self.write(id, patch, Write::Patch, "Failed to waive fee", |_| {
            "No-show fee waived".to_string()
        })
        .await
    }

    async fn loaded(&self, id: &AppointmentId) -> ClientResult<Appointment> {
        match self.get(id).await {
            Some(appointment) => Ok(appointment),
            None => reject(&*self.notifier, ClientError::rejected("Appointment is not loaded")),
        }
    }

    /// Optimistic write guarded by `expectedUpdatedAt`.
    ///
    /// On a conflict the edit is dropped and the server's copy replaces it,
    /// taken from the conflict body or refetched with the last calendar query.
    async fn write(
        &self,
        id: &AppointmentId,
        mut patch: AppointmentPatch,
        write: Write,
        failure: &str,
        success: impl FnOnce(&Appointment) -> String,
    ) -> ClientResult<Appointment> {
        if patch.expected_updated_at.is_none() {
            patch.expected_updated_at = self.get(id).await.and_then(|current| current.updated_at);
        }
        let result = apply_optimistic(
            &self.appointments,
            id,
            |appointment| patch.apply_to(appointment),
            |_| async {
                match write {
                    Write::Patch => self.api.patch_appointment(id, &patch).await,
                    Write::Put(scope) => self.api.update_appointment(id, &patch, scope).await,
                }
            },
        )
        .await;
        if let Err(err) = &result {
            if err.is_conflict() {
                warn!("appointments: edit conflict appointment_id={id}");
                self.adopt_current(id, err).await;
            }
        }
        report(&*self.notifier, result, success, failure)
    }

    async fn adopt_current(&self, id: &AppointmentId, err: &ClientError) {
        if let Some(current) = conflict_current::<Appointment>(err) {
            self.appointments.lock().await.upsert(current);
            return;
        }
        let query = self.last_query.lock().await.clone();
        match self.api.list_appointments(&query).await {
            Ok(appointments) => {
                let current = appointments
                    .into_iter()
                    .find(|appointment| &appointment.id == id);
                if let Some(current) = current {
                    self.appointments.lock().await.upsert(current);
                }
            }
            Err(refetch) => warn!(
                "appointments: refetch after conflict failed appointment_id={id} error={refetch}"
            ),
        }
    }

    // Line items

    pub async fn line_items(&self) -> Vec<LineItem> {
        self.line_items.lock().await.items().to_vec()
    }

    pub async fn total_cents(&self) -> i64 {
        appointment_total_cents(self.line_items.lock().await.items())
    }

    pub async fn load_line_items(&self, id: &AppointmentId) -> ClientResult<Vec<LineItem>> {
        let result = self.api.line_items(id).await;
        let items = report_failure(&*self.notifier, result, "Failed to load line items")?;
        self.line_items.lock().await.replace_all(items.clone());
        *self.line_items_for.lock().await = Some(id.clone());
        Ok(items)
    }

    async fn ensure_line_items(&self, id: &AppointmentId) -> ClientResult<()> {
        if self.line_items_for.lock().await.as_ref() != Some(id) {
            self.load_line_items(id).await?;
        }
        Ok(())
    }

    /// Validated against the current total, shown immediately under a
    /// placeholder id, then replaced by the saved item.
    pub async fn add_line_item(
        &self,
        id: &AppointmentId,
        mut input: LineItemInput,
    ) -> ClientResult<LineItem> {
        self.ensure_line_items(id).await?;
        if let Err(err) = input.validate(self.total_cents().await) {
            return reject(&*self.notifier, err);
        }
        let placeholder = input.clone().into_line_item(LineItemId::new(temp_id()));
        let result =
            insert_optimistic(&self.line_items, placeholder, self.api.add_line_item(id, &input))
                .await;
        report(
            &*self.notifier,
            result,
            |item| format!("Added {}", item.description),
            "Failed to add line item",
        )
    }

    pub async fn remove_line_item(
        &self,
        id: &AppointmentId,
        line_item_id: &LineItemId,
    ) -> ClientResult<LineItem> {
        self.ensure_line_items(id).await?;
        let result = remove_optimistic(&self.line_items, line_item_id, |_| {
            self.api.delete_line_item(id, line_item_id)
        })
        .await;
        report(
            &*self.notifier,
            result,
            |item| format!("Removed {}", item.description),
            "Failed to remove line item",
        )
    }

    // Recurrence

    pub async fn recurring(&self, id: &AppointmentId) -> ClientResult<Option<RecurringSettings>> {
        let result = self.api.recurring(id).await;
        report_failure(&*self.notifier, result, "Failed to load recurrence")
    }

    /// Turn the appointment into the first occurrence of a series. The API
    /// expands the rule; the returned occurrences join the calendar.
    pub async fn make_recurring(
        &self,
        id: &AppointmentId,
        rule: RecurrenceRule,
        end: RecurrenceEnd,
    ) -> ClientResult<Vec<Appointment>> {
        let (count, until) = match end {
            RecurrenceEnd::Count(count) => (Some(count), None),
            RecurrenceEnd::Until(until) => (None, Some(until)),
        };
        let request = RecurringRequest { rule, until, count };
        if let Err(err) = request.validate() {
            return reject(&*self.notifier, err);
        }
        let result = self.api.create_recurring(id, &request).await;
        if let Ok(occurrences) = &result {
            info!(
                "appointments: series created appointment_id={id} rule={} occurrences={}",
                request.rule,
                occurrences.len()
            );
            let mut appointments = self.appointments.lock().await;
            for occurrence in occurrences {
                appointments.upsert(occurrence.clone());
            }
        }
        report(
            &*self.notifier,
            result,
            |occurrences| format!("Repeats {} time(s)", occurrences.len()),
            "Failed to make appointment recurring",
        )
    }

    /// Stop a series. This occurrence stays on the calendar as a one-off;
    /// `this_and_future` drops later occurrences and `all` drops every other
    /// occurrence.
    pub async fn stop_recurring(&self, id: &AppointmentId, scope: RecurrenceScope) -> ClientResult<()> {
        let result = self.api.delete_recurring(id, scope).await;
        if result.is_ok() {
            let mut appointments = self.appointments.lock().await;
            if let Some(current) = appointments.get(id).cloned() {
                let dropped: Vec<_> = series_mates(appointments.items(), &current, scope)
                    .into_iter()
                    .map(|mate| mate.id)
                    .collect();
                appointments.retain(|appointment| !dropped.contains(&appointment.id));
                appointments.upsert(Appointment {
                    recurring: None,
                    ..current
                });
            }
        }
        report(
            &*self.notifier,
            result,
            |_| "Recurrence stopped".to_string(),
            "Failed to stop recurrence",
        )
    }

    // Editor lookups

    pub async fn services(&self) -> ClientResult<Vec<Service>> {
        let result = self.api.services().await;
        report_failure(&*self.notifier, result, "Failed to load services")
    }

    pub async fn availability(&self, query: &AvailabilityQuery) -> ClientResult<Vec<AvailabilitySlot>> {
        let result = self.api.availability(query).await;
        report_failure(&*self.notifier, result, "Failed to load availability")
    }

    /// Services and open slots fetched together when the editor opens.
    pub async fn editor_lookups(
        &self,
        query: &AvailabilityQuery,
    ) -> ClientResult<(Vec<Service>, Vec<AvailabilitySlot>)> {
        let result = futures::try_join!(self.api.services(), self.api.availability(query));
        report_failure(&*self.notifier, result, "Failed to load booking options")
    }
}

/// Other loaded occurrences of `current`'s series covered by `scope`.
fn series_mates(
    appointments: &[Appointment],
    current: &Appointment,
    scope: RecurrenceScope,
) -> Vec<Appointment> {
    let Some(series_id) = current.series_id() else {
        return Vec::new();
    };
    appointments
        .iter()
        .filter(|appointment| appointment.id != current.id)
        .filter(|appointment| appointment.series_id() == Some(series_id))
        .filter(|appointment| match scope {
            RecurrenceScope::This => false,
            RecurrenceScope::ThisAndFuture => appointment.start_time > current.start_time,
            RecurrenceScope::All => true,
        })
        .cloned()
        .collect()
}

#[cfg(test)]
#[path = "../tests/appointments_tests.rs"]
mod tests;
