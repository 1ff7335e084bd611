//! UI seams: the foreground surface, its progress indicator, and the UI thread queue.
//!
//! Only mandatory releases show an indicator. It cannot be dismissed by the
//! user and stays up while the platform installer runs.

mod progress;
mod queue;

pub use progress::{CHECK_PROGRESS_TOKEN, MEBIBYTE_IN_BYTES, ProgressBinding};
pub use queue::{CallbackToken, TaskQueue, UiHandler, UiTask};

use std::sync::Arc;

/// A blocking progress indicator created by a [`ForegroundSurface`].
///
/// All methods are called from the UI-owning thread.
pub trait ProgressIndicator: Send + Sync {
    fn set_indeterminate(&self, indeterminate: bool);

    /// Sets the determinate range, in mebibytes.
    fn set_max(&self, max: u64);

    /// Sets the determinate position, in mebibytes.
    fn set_progress(&self, position: u64);

    fn show(&self);

    fn hide(&self);
}

/// The application's currently visible surface.
pub trait ForegroundSurface: Send + Sync {
    /// Creates a non-dismissable indicator titled `title`.
    fn create_progress_indicator(&self, title: &str) -> Arc<dyn ProgressIndicator>;
}
