//! Application state.

use std::sync::Arc;

use hookclip_storage::{DeliveryConfig, DeliverySigner, StorageLayout};
use hookclip_worker::{Orchestrator, WorkerContext};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub orchestrator: Orchestrator,
    pub signer: Arc<DeliverySigner>,
}

impl AppState {
    pub fn new(config: ApiConfig, ctx: Arc<WorkerContext>, delivery: DeliveryConfig) -> Self {
        Self {
            config,
            orchestrator: Orchestrator::new(ctx),
            signer: Arc::new(DeliverySigner::new(delivery)),
        }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.orchestrator.context().layout
    }
}
