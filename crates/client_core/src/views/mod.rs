//! Per-screen state. Each view owns its records and is driven through
//! `&self`, so a front end can share it behind an `Arc` and fire actions
//! concurrently.

pub mod appointments;
pub mod blocks;
pub mod clients;
pub mod locations;
pub mod technicians;

pub use appointments::{AppointmentsView, RecurrenceEnd};
pub use blocks::BlocksView;
pub use clients::{ClientListing, ClientsView};
pub use locations::LocationsView;
pub use technicians::TechniciansView;
