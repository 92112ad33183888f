use std::path::PathBuf;
use std::sync::Arc;

use recon_import::ImportOrchestrator;
use recon_import::ImportOutcome;
use recon_import::ImportRequest;
use recon_import::ImportResult;

/// The single entry point callers outside this workspace are expected to
/// use: wraps an `ImportOrchestrator` behind the one operation external
/// callers need, the same way this workspace's other facades sit in front
/// of a service trait object rather than exposing it directly.
#[derive(Clone)]
pub struct ReconciliationFacade {
    orchestrator: Arc<ImportOrchestrator>,
}

impl ReconciliationFacade {
    #[must_use]
    pub fn new(orchestrator: Arc<ImportOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn import(
        &self,
        country_id: impl Into<String>,
        files: Vec<PathBuf>,
        modified_by: impl Into<String>,
    ) -> ImportOutcome<ImportResult> {
        self.orchestrator
            .import(ImportRequest {
                country_id: country_id.into(),
                files,
                modified_by: modified_by.into(),
            })
            .await
    }
}
