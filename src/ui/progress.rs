//! Progress indicator binding for mandatory downloads.

use super::queue::{CallbackToken, UiHandler};
use super::{ForegroundSurface, ProgressIndicator};
use crate::release::DownloadProgress;
use parking_lot::Mutex;
use std::sync::Arc;

/// Token of the pending indicator refresh.
pub const CHECK_PROGRESS_TOKEN: CallbackToken = CallbackToken("check-progress");

/// Byte counts are shown in mebibytes to keep the range small.
pub const MEBIBYTE_IN_BYTES: u64 = 1024 * 1024;

struct Attached {
    indicator: Arc<dyn ProgressIndicator>,
    determinate: bool,
    max: u64,
    position: u64,
}

#[derive(Default)]
struct BindingState {
    attached: Option<Attached>,
    latest: Option<DownloadProgress>,
    refresh_pending: bool,
}

/// Drives the blocking indicator from download progress.
///
/// Progress updates are coalesced into a single refresh posted on the UI
/// queue under [`CHECK_PROGRESS_TOKEN`]. [`ProgressBinding::detach`] clears
/// the indicator reference under the lock, cancels that refresh, and posts
/// the hide afterwards, so nobody observes an indicator mid-teardown.
#[derive(Clone)]
pub struct ProgressBinding {
    state: Arc<Mutex<BindingState>>,
    ui: Arc<dyn UiHandler>,
}

impl std::fmt::Debug for ProgressBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressBinding")
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl ProgressBinding {
    pub fn new(ui: Arc<dyn UiHandler>) -> Self {
        Self {
            state: Arc::new(Mutex::new(BindingState::default())),
            ui,
        }
    }

    /// Shows a new indeterminate indicator on `surface`, replacing any attached one.
    pub fn attach(&self, surface: &dyn ForegroundSurface, title: &str) {
        self.detach();
        let indicator = surface.create_progress_indicator(title);
        indicator.set_indeterminate(true);
        indicator.show();

        let mut state = self.state.lock();
        state.attached = Some(Attached {
            indicator,
            determinate: false,
            max: 0,
            position: 0,
        });
        log::debug!("Progress indicator attached");
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().attached.is_some()
    }

    /// Records `progress` and schedules a refresh. No-op while unattached.
    pub fn update(&self, progress: DownloadProgress) {
        let mut state = self.state.lock();
        if state.attached.is_none() {
            return;
        }
        state.latest = Some(progress);
        if state.refresh_pending {
            return;
        }
        state.refresh_pending = true;
        drop(state);

        let shared = Arc::clone(&self.state);
        self.ui.post_with_token(
            CHECK_PROGRESS_TOKEN,
            Box::new(move || refresh(&shared)),
        );
    }

    /// Detaches the indicator. Idempotent.
    pub fn detach(&self) {
        let attached = {
            let mut state = self.state.lock();
            state.latest = None;
            state.refresh_pending = false;
            state.attached.take()
        };
        self.ui.remove_callbacks(CHECK_PROGRESS_TOKEN);

        if let Some(attached) = attached {
            log::debug!("Progress indicator detached");
            self.ui.post(Box::new(move || attached.indicator.hide()));
        }
    }
}

/// Applies the latest progress to the attached indicator.
fn refresh(shared: &Mutex<BindingState>) {
    let mut state = shared.lock();
    state.refresh_pending = false;
    let Some(progress) = state.latest else {
        return;
    };
    let Some(attached) = state.attached.as_mut() else {
        return;
    };
    let Some(total) = progress.known_total() else {
        return;
    };

    if !attached.determinate {
        attached.determinate = true;
        attached.max = total / MEBIBYTE_IN_BYTES;
        attached.indicator.set_indeterminate(false);
        attached.indicator.set_max(attached.max);
    }

    let position = (progress.current / MEBIBYTE_IN_BYTES).min(attached.max);
    if position >= attached.position {
        attached.position = position;
        attached.indicator.set_progress(position);
    }
}
