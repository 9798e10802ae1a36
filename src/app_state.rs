use std::sync::Arc;

use crate::broker::Publisher;
use crate::config::QueueNames;
use crate::store::JobStateStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStateStore>,
    pub publisher: Publisher,
    pub queues: QueueNames,
}

impl AppState {
    pub fn new(store: Arc<dyn JobStateStore>, publisher: Publisher, queues: QueueNames) -> Self {
        Self {
            store,
            publisher,
            queues,
        }
    }
}
