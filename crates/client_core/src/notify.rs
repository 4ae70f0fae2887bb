//! Toast notifications raised by view actions.

use std::sync::Mutex;

use tracing::{info, warn};

use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
}

impl Toast {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Error,
            message: message.into(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, toast: Toast);
}

/// Writes toasts to the log. Used when nothing renders them.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, toast: Toast) {
        match toast.level {
            ToastLevel::Error => warn!("toast: {}", toast.message),
            ToastLevel::Success | ToastLevel::Info => info!("toast: {}", toast.message),
        }
    }
}

/// Keeps every toast in order.
#[derive(Default)]
pub struct RecordingNotifier {
    toasts: Mutex<Vec<Toast>>,
}

impl RecordingNotifier {
    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts
            .lock()
            .map(|toasts| toasts.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn take(&self) -> Vec<Toast> {
        match self.toasts.lock() {
            Ok(mut toasts) => std::mem::take(&mut *toasts),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn last(&self) -> Option<Toast> {
        self.toasts().pop()
    }

    pub fn errors(&self) -> Vec<String> {
        self.toasts()
            .into_iter()
            .filter(|toast| toast.level == ToastLevel::Error)
            .map(|toast| toast.message)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, toast: Toast) {
        match self.toasts.lock() {
            Ok(mut toasts) => toasts.push(toast),
            Err(poisoned) => poisoned.into_inner().push(toast),
        }
    }
}

/// Turn the outcome of one user action into exactly one toast.
///
/// Unexpected failures are also logged with their cause, since the toast
/// only carries `failure`.
pub fn report<T>(
    notifier: &dyn Notifier,
    result: ClientResult<T>,
    success: impl FnOnce(&T) -> String,
    failure: &str,
) -> ClientResult<T> {
    match &result {
        Ok(value) => notifier.notify(Toast::success(success(value))),
        Err(err) => {
            if !err.is_expected() {
                warn!("notify: {failure} error={err}");
            }
            notifier.notify(Toast::error(err.toast_message(failure)));
        }
    }
    result
}

/// Like [`report`] but silent on success, for fetches.
pub fn report_failure<T>(
    notifier: &dyn Notifier,
    result: ClientResult<T>,
    failure: &str,
) -> ClientResult<T> {
    if let Err(err) = &result {
        if !err.is_expected() {
            warn!("notify: {failure} error={err}");
        }
        notifier.notify(Toast::error(err.toast_message(failure)));
    }
    result
}

/// Report a failure raised before any request, such as a validation error.
pub fn reject<T>(notifier: &dyn Notifier, err: impl Into<ClientError>) -> ClientResult<T> {
    let err = err.into();
    notifier.notify(Toast::error(err.toast_message("Request rejected")));
    Err(err)
}
