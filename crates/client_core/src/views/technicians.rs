use std::sync::Arc;

use shared::{
    domain::{LocationId, TechnicianId},
    protocol::{Technician, TechnicianInput, TechnicianSchedule},
    validation::validate_hours,
};
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    error::{ClientError, ClientResult},
    latest::RequestGuard,
    notify::{reject, report, report_failure, Notifier},
    optimistic::{apply_optimistic, remove_optimistic, OptimisticCollection},
    transport::SalonApi,
};

pub struct TechniciansView {
    api: SalonApi,
    notifier: Arc<dyn Notifier>,
    guard: RequestGuard,
    technicians: Mutex<OptimisticCollection<Technician>>,
}

impl TechniciansView {
    pub fn new(api: SalonApi, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            api,
            notifier,
            guard: RequestGuard::new(),
            technicians: Mutex::new(OptimisticCollection::default()),
        }
    }

    pub async fn technicians(&self) -> Vec<Technician> {
        self.technicians.lock().await.items().to_vec()
    }

    pub async fn get(&self, id: &TechnicianId) -> Option<Technician> {
        self.technicians.lock().await.get(id).cloned()
    }

    /// Refresh the list, optionally only technicians working at `location`.
    pub async fn load(
        &self,
        location: Option<&LocationId>,
    ) -> ClientResult<Option<Vec<Technician>>> {
        let Some(result) = self.guard.run(self.api.list_technicians(location)).await else {
            return Ok(None);
        };
        let technicians = report_failure(&*self.notifier, result, "Failed to load technicians")?;
        self.technicians
            .lock()
            .await
            .replace_all(technicians.clone());
        Ok(Some(technicians))
    }

    pub async fn create(&self, mut input: TechnicianInput) -> ClientResult<Technician> {
        if let Err(err) = input.validate() {
            return reject(&*self.notifier, err);
        }
        let result = self.api.create_technician(&input).await;
        if let Ok(technician) = &result {
            info!("technicians: created technician_id={}", technician.id);
            self.technicians.lock().await.upsert(technician.clone());
        }
        report(
            &*self.notifier,
            result,
            |technician| format!("Technician {} added", technician.name),
            "Failed to create technician",
        )
    }

    pub async fn update(&self, id: &TechnicianId, input: TechnicianInput) -> ClientResult<Technician> {
        self.edit(id, |draft| *draft = input, "Failed to update technician", |technician| {
            format!("Technician {} updated", technician.name)
        })
        .await
    }

    pub async fn set_active(&self, id: &TechnicianId, active: bool) -> ClientResult<Technician> {
        self.edit(
            id,
            |draft| draft.active = active,
            "Failed to update technician status",
            move |technician| {
                let state = if active { "activated" } else { "deactivated" };
                format!("{} {state}", technician.name)
            },
        )
        .await
    }

    pub async fn set_master_fee(&self, id: &TechnicianId, master_fee: bool) -> ClientResult<Technician> {
        self.edit(
            id,
            |draft| draft.master_fee = master_fee,
            "Failed to update master fee",
            |technician| format!("Master fee updated for {}", technician.name),
        )
        .await
    }

    pub async fn assign_locations(
        &self,
        id: &TechnicianId,
        location_ids: Vec<LocationId>,
    ) -> ClientResult<Technician> {
        self.edit(
            id,
            |draft| draft.location_ids = location_ids,
            "Failed to update locations",
            |technician| format!("Locations updated for {}", technician.name),
        )
        .await
    }

    /// Build the full input from the loaded record, change it, validate, and
    /// send it as an optimistic update.
    async fn edit(
        &self,
        id: &TechnicianId,
        change: impl FnOnce(&mut TechnicianInput),
        failure: &str,
        success: impl FnOnce(&Technician) -> String,
    ) -> ClientResult<Technician> {
        let Some(current) = self.get(id).await else {
            return reject(&*self.notifier, ClientError::rejected("Technician is not loaded"));
        };
        let mut input = TechnicianInput::from_technician(&current);
        change(&mut input);
        if let Err(err) = input.validate() {
            return reject(&*self.notifier, err);
        }
        let result = apply_optimistic(
            &self.technicians,
            id,
            |technician| {
                technician.name = input.name.clone();
                technician.color = input.color.clone();
                technician.active = input.active;
                technician.master_fee = input.master_fee;
                technician.location_ids = input.location_ids.clone();
            },
            |_| self.api.update_technician(id, &input),
        )
        .await;
        report(&*self.notifier, result, success, failure)
    }

    /// Refused while the technician is still assigned to a location or has
    /// appointments on the books.
    pub async fn delete(&self, id: &TechnicianId) -> ClientResult<Technician> {
        let Some(current) = self.get(id).await else {
            return reject(&*self.notifier, ClientError::rejected("Technician is not loaded"));
        };
        if !current.location_ids.is_empty() {
            return reject(
                &*self.notifier,
                ClientError::rejected(format!(
                    "Remove {} from all locations before deleting",
                    current.name
                )),
            );
        }
        if current.appointment_count > 0 {
            return reject(
                &*self.notifier,
                ClientError::rejected(format!(
                    "{} has {} appointment(s) and cannot be deleted; deactivate instead",
                    current.name, current.appointment_count
                )),
            );
        }
        let result =
            remove_optimistic(&self.technicians, id, |_| self.api.delete_technician(id)).await;
        report(
            &*self.notifier,
            result,
            |technician| format!("Technician {} deleted", technician.name),
            "Failed to delete technician",
        )
    }

    pub async fn schedule(&self, id: &TechnicianId) -> ClientResult<TechnicianSchedule> {
        let result = self.api.technician_schedule(id).await;
        report_failure(&*self.notifier, result, "Failed to load schedule")
    }

    pub async fn update_schedule(
        &self,
        id: &TechnicianId,
        mut schedule: TechnicianSchedule,
    ) -> ClientResult<TechnicianSchedule> {
        if let Err(err) = validate_hours(&schedule.days) {
            return reject(&*self.notifier, err);
        }
        schedule.technician_id = Some(id.clone());
        let result = self.api.update_technician_schedule(id, &schedule).await;
        report(
            &*self.notifier,
            result,
            |_| "Schedule saved".to_string(),
            "Failed to save schedule",
        )
    }
}

#[cfg(test)]
#[path = "../tests/technicians_tests.rs"]
mod tests;
