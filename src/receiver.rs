//! Adapter for platform download notifications.

use crate::distribute::Distributor;
use crate::download::Connector;

/// A notification delivered by the platform's download service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformNotification {
    /// The user clicked the pending download notification
    NotificationClicked,
    /// A download finished
    DownloadComplete { download_id: u64 },
    /// Anything else
    Other(String),
}

/// Forwards platform notifications to a [`Distributor`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DownloadReceiver;

impl DownloadReceiver {
    pub fn on_receive<K: Connector>(
        &self,
        distributor: &mut Distributor<K>,
        notification: PlatformNotification,
    ) {
        match notification {
            // Clicking a download notification should at least show the app.
            PlatformNotification::NotificationClicked => distributor.resume_app(),
            PlatformNotification::DownloadComplete { download_id } => {
                distributor.on_download_complete_by_id(download_id)
            }
            PlatformNotification::Other(action) => {
                log::trace!("Ignoring platform notification {}", action)
            }
        }
    }
}
