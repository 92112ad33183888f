#![deny(clippy::print_stdout, clippy::print_stderr)]

//! The thin external-facing crate: composes C1-C8 behind a single
//! `ReconciliationFacade::import` call and re-exports the types a caller
//! needs to build one, without pulling in every component crate directly.

mod csv_dwings_source;
mod facade;
pub mod demo;

pub use csv_dwings_source::CsvDwingsSource;
pub use facade::ReconciliationFacade;

pub use recon_import::ConfigCatalog;
pub use recon_import::GlobalLock;
pub use recon_import::ImportError;
pub use recon_import::ImportOrchestrator;
pub use recon_import::ImportOutcome;
pub use recon_import::ImportRequest;
pub use recon_import::ImportResult;
pub use recon_import::ImportStatus;
pub use recon_import::InMemoryConfigCatalog;
pub use recon_import::InMemoryGlobalLock;
pub use recon_import::InMemoryKpiSnapshot;
pub use recon_import::InMemoryOfflineStore;
pub use recon_import::KpiSnapshot;
pub use recon_import::LockError;
pub use recon_import::OfflineStore;

#[cfg(test)]
mod tests {
    use super::*;
    use recon_dwings::DwingsData;
    use recon_dwings::DwingsResult;
    use recon_dwings::DwingsSource;
    use recon_ingest::FieldKind;
    use recon_ingest::FieldMapping;
    use recon_ingest::MappingTable;
    use std::io::Write;
    use std::sync::Arc;

    struct EmptyDwingsSource;

    #[async_trait::async_trait]
    impl DwingsSource for EmptyDwingsSource {
        async fn load(&self, _data_source: &str) -> DwingsResult<DwingsData> {
            Ok(DwingsData::default())
        }
    }

    fn mapping() -> MappingTable {
        MappingTable::new(vec![
            FieldMapping {
                destination: "Account_ID".into(),
                source_expression: "Account".into(),
                transform: None,
                kind: FieldKind::Text,
            },
            FieldMapping {
                destination: "CCY".into(),
                source_expression: "Currency".into(),
                transform: None,
                kind: FieldKind::Text,
            },
            FieldMapping {
                destination: "Event_Num".into(),
                source_expression: "Event".into(),
                transform: None,
                kind: FieldKind::Text,
            },
            FieldMapping {
                destination: "RawLabel".into(),
                source_expression: "Label".into(),
                transform: None,
                kind: FieldKind::Text,
            },
            FieldMapping {
                destination: "SignedAmount".into(),
                source_expression: "Amount".into(),
                transform: None,
                kind: FieldKind::Decimal,
            },
            FieldMapping {
                destination: "Operation_Date".into(),
                source_expression: "OpDate".into(),
                transform: None,
                kind: FieldKind::Date,
            },
        ])
    }

    #[tokio::test]
    async fn facade_runs_a_fresh_import_end_to_end() {
        let config = InMemoryConfigCatalog::new()
            .with_country(demo::demo_country())
            .with_mapping("FR", mapping());
        let facade = demo::in_memory_facade(config, Arc::new(EmptyDwingsSource), "dwings.csv");

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("in.csv");
        let mut file = std::fs::File::create(&path).expect("create temp csv");
        file.write_all(
            b"Account,Currency,Event,Label,Amount,OpDate\n\
              P,EUR,E1,pivot row,100.00,2024-01-10\n\
              R,EUR,E1,receivable row,-100.00,2024-01-10\n",
        )
        .expect("write temp csv");

        let result = facade
            .import("FR", vec![path], "import")
            .await
            .expect("import succeeds");

        assert!(result.success);
        assert_eq!(result.new, 2);
    }
}
