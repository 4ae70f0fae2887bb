//! Headless salon admin client: REST transport, per-screen view state with
//! optimistic updates, latest-request-wins fetch guarding and toasts.

pub mod editor;
pub mod error;
pub mod latest;
pub mod notify;
pub mod optimistic;
pub mod transport;
pub mod views;

pub use editor::AppointmentDraft;
pub use error::{ClientError, ClientResult};
pub use latest::{RequestGuard, RequestTicket};
pub use notify::{Notifier, RecordingNotifier, Toast, ToastLevel, TracingNotifier};
pub use optimistic::{Keyed, OptimisticCollection};
pub use transport::{conflict_current, ClientOptions, SalonApi};
pub use views::{
    AppointmentsView, BlocksView, ClientListing, ClientsView, LocationsView, RecurrenceEnd,
    TechniciansView,
};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
