use std::sync::Arc;
use vault_keeper::PositionService;
use vault_keeper_core::{KeeperStore, ReportStore};
use vault_keeper_ledger::VaultRebalanceGateway;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KeeperStore>,
    pub reports: Arc<dyn ReportStore>,
    pub positions: Arc<PositionService>,
    pub gateway: Arc<VaultRebalanceGateway>,
}

impl AppState {
    #[must_use]
    pub fn new(
        store: Arc<dyn KeeperStore>,
        reports: Arc<dyn ReportStore>,
        gateway: Arc<VaultRebalanceGateway>,
    ) -> Self {
        Self {
            positions: Arc::new(PositionService::new(Arc::clone(&store))),
            store,
            reports,
            gateway,
        }
    }
}
