use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use spindle_core::config::RunnerSettings;
use spindle_core::event::EventBus;
use spindle_core::project::ProjectDirs;

/// Everything one run needs, passed explicitly — no ambient singletons.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: String,
    pub dirs: ProjectDirs,
    pub settings: RunnerSettings,
    pub events: Arc<EventBus>,
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(dirs: ProjectDirs, settings: RunnerSettings) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            dirs,
            settings,
            events: Arc::new(EventBus::default()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}
