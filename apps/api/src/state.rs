use std::sync::Arc;

use crate::dispatch::queue::JobQueue;
use crate::dispatch::Dispatcher;
use crate::store::{DocumentStore, JobStore};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub dispatcher: Arc<Dispatcher>,
    /// Primary substrate handle kept for the health probe's queue depth.
    pub queue: Arc<dyn JobQueue>,
}
