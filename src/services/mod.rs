//! Collaborators of the job pipeline
//!
//! Each external system sits behind a trait so the jobs can be driven by fakes
//! in tests; the concrete clients talk to Sonarr, Plex and a mounted cloud drive.

pub mod clock;
pub mod copy;
pub mod download_client;
pub mod media_server;
pub mod naming;
pub mod refresher;
pub mod storage;

use std::sync::Arc;

pub use clock::{Clock, InstantClock, TokioClock};
pub use copy::CopyService;
pub use download_client::{DownloadClient, QueueRecord, Series, SonarrClient};
pub use media_server::{MediaServer, PlexClient};
pub use naming::SeasonNaming;
pub use refresher::SeriesRefresher;
pub use storage::{MountedStorage, RemoteElement, RemoteStorage};

/// Services shared by every handler.
#[derive(Clone)]
pub struct Collaborators {
    pub download_client: Arc<dyn DownloadClient>,
    pub copier: Arc<CopyService>,
    pub refresher: Arc<SeriesRefresher>,
    pub naming: Arc<SeasonNaming>,
    pub clock: Arc<dyn Clock>,
}
