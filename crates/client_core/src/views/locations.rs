use std::sync::Arc;

use shared::{
    domain::LocationId,
    protocol::{Location, LocationInput, OperatingHours},
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

pub struct LocationsView {
    api: SalonApi,
    notifier: Arc<dyn Notifier>,
    guard: RequestGuard,
    locations: Mutex<OptimisticCollection<Location>>,
}

impl LocationsView {
    pub fn new(api: SalonApi, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            api,
            notifier,
            guard: RequestGuard::new(),
            locations: Mutex::new(OptimisticCollection::default()),
        }
    }

    pub async fn locations(&self) -> Vec<Location> {
        self.locations.lock().await.items().to_vec()
    }

    pub async fn get(&self, id: &LocationId) -> Option<Location> {
        self.locations.lock().await.get(id).cloned()
    }

    /// Refresh the list. `Ok(None)` means a newer load superseded this one.
    pub async fn load(&self) -> ClientResult<Option<Vec<Location>>> {
        let Some(result) = self.guard.run(self.api.list_locations()).await else {
            return Ok(None);
        };
        let locations = report_failure(&*self.notifier, result, "Failed to load locations")?;
        self.locations.lock().await.replace_all(locations.clone());
        Ok(Some(locations))
    }

    pub async fn create(&self, mut input: LocationInput) -> ClientResult<Location> {
        if let Err(err) = input.validate() {
            return reject(&*self.notifier, err);
        }
        let result = self.api.create_location(&input).await;
        if let Ok(location) = &result {
            info!("locations: created location_id={} slug={}", location.id, location.slug);
            self.locations.lock().await.upsert(location.clone());
        }
        report(
            &*self.notifier,
            result,
            |location| format!("Location {} created", location.name),
            "Failed to create location",
        )
    }

    pub async fn update(&self, id: &LocationId, mut input: LocationInput) -> ClientResult<Location> {
        if let Err(err) = input.validate() {
            return reject(&*self.notifier, err);
        }
        let result = apply_optimistic(
            &self.locations,
            id,
            |location| {
                location.name = input.name.clone();
                location.slug = input.slug.clone();
                location.address = input.address.clone();
                location.city = input.city.clone();
                location.state = input.state.clone();
                location.zip = input.zip.clone();
                location.phone = input.phone.clone();
                location.hours = input.hours.clone();
            },
            |_| self.api.update_location(id, &input),
        )
        .await;
        report(
            &*self.notifier,
            result,
            |location| format!("Location {} updated", location.name),
            "Failed to update location",
        )
    }

    pub async fn update_hours(&self, id: &LocationId, hours: OperatingHours) -> ClientResult<Location> {
        if let Err(err) = validate_hours(&hours) {
            return reject(&*self.notifier, err);
        }
        let Some(current) = self.get(id).await else {
            return reject(&*self.notifier, ClientError::rejected("Location is not loaded"));
        };
        let input = LocationInput {
            hours: hours.clone(),
            ..LocationInput::from_location(&current)
        };
        let result = apply_optimistic(
            &self.locations,
            id,
            |location| location.hours = hours,
            |_| self.api.update_location(id, &input),
        )
        .await;
        report(
            &*self.notifier,
            result,
            |location| format!("Hours for {} saved", location.name),
            "Failed to update hours",
        )
    }

    /// Locations that still have technicians assigned are refused before any
    /// request is sent.
    pub async fn delete(&self, id: &LocationId) -> ClientResult<Location> {
        let Some(current) = self.get(id).await else {
            return reject(&*self.notifier, ClientError::rejected("Location is not loaded"));
        };
        if current.technician_count > 0 {
            return reject(
                &*self.notifier,
                ClientError::rejected(format!(
                    "Cannot delete {}: {} technician(s) are still assigned",
                    current.name, current.technician_count
                )),
            );
        }
        let result =
            remove_optimistic(&self.locations, id, |_| self.api.delete_location(id)).await;
        report(
            &*self.notifier,
            result,
            |location| format!("Location {} deleted", location.name),
            "Failed to delete location",
        )
    }
}

#[cfg(test)]
#[path = "../tests/locations_tests.rs"]
mod tests;
