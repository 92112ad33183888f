use std::sync::Arc;

use movement_model::Country;
use recon_dwings::DwingsCache;
use recon_dwings::DwingsSource;
use recon_import::ImportOrchestrator;
use recon_import::InMemoryConfigCatalog;
use recon_import::InMemoryGlobalLock;
use recon_import::InMemoryKpiSnapshot;
use recon_import::InMemoryOfflineStore;
use recon_store::InMemoryMovementStore;
use recon_store::InMemoryReconciliationStore;

use crate::ReconciliationFacade;

/// Wires up an orchestrator entirely from the in-memory collaborators, for
/// local runs and demos that have no real offline-first backend yet. The
/// caller still registers country records and field mappings through
/// `with_country`/`with_mapping` on the `InMemoryConfigCatalog` passed in;
/// this only fixes the storage and locking layers.
#[must_use]
pub fn in_memory_facade(
    config: InMemoryConfigCatalog,
    dwings_source: Arc<dyn DwingsSource>,
    dwings_data_source: impl Into<String>,
) -> ReconciliationFacade {
    let orchestrator = ImportOrchestrator::new(
        Arc::new(InMemoryGlobalLock::new()),
        Arc::new(InMemoryOfflineStore::new()),
        Arc::new(config),
        Arc::new(InMemoryKpiSnapshot::new()),
        Arc::new(InMemoryMovementStore::new()),
        Arc::new(InMemoryReconciliationStore::new()),
        Arc::new(DwingsCache::new(dwings_source)),
        dwings_data_source,
    );
    ReconciliationFacade::new(Arc::new(orchestrator))
}

#[must_use]
pub fn demo_country() -> Country {
    Country {
        id: "FR".into(),
        ambre_pivot: "P".into(),
        ambre_receivable: "R".into(),
        local_db_path: None,
        network_db_path: None,
        service_code: None,
    }
}
