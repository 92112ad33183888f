//! Command-line entry point: a single `import` subcommand wrapping
//! `recon_api::ReconciliationFacade`. Output formatting lives here, not in
//! the core crates, which never print.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::ValueEnum;
use movement_model::Country;
use recon_api::InMemoryConfigCatalog;
use recon_api::ReconciliationFacade;
use recon_api::demo;
use recon_ingest::FieldKind;
use recon_ingest::FieldMapping;
use recon_ingest::MappingTable;
use serde::Serialize;

#[derive(Debug, Parser)]
#[command(name = "reconcile", about = "Bank-movement / DWINGS reconciliation engine")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Import one or two AMBRE files for a country and rebuild its
    /// reconciliation rows.
    Import {
        /// Country identifier (e.g. FR).
        #[arg(long = "country-id", value_name = "COUNTRY_ID")]
        country_id: String,

        /// Account id booked as the pivot side.
        #[arg(long = "pivot-account", value_name = "ACCOUNT_ID")]
        pivot_account: String,

        /// Account id booked as the receivable side.
        #[arg(long = "receivable-account", value_name = "ACCOUNT_ID")]
        receivable_account: String,

        /// One or two delimited AMBRE input files.
        #[arg(value_name = "FILE", required = true, num_args = 1..=2)]
        files: Vec<PathBuf>,

        /// Flat DWINGS invoice export to link movements against.
        #[arg(long = "dwings-file", value_name = "FILE")]
        dwings_file: PathBuf,

        /// Identity recorded on every row this import writes.
        #[arg(long = "modified-by", value_name = "USER", default_value = "cli-import")]
        modified_by: String,

        /// Output format.
        #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Serialize)]
struct ImportResultView {
    new: usize,
    updated: usize,
    deleted: usize,
    processed: usize,
    success: bool,
    errors: Vec<String>,
    validation_errors: Vec<String>,
}

impl From<&recon_api::ImportResult> for ImportResultView {
    fn from(result: &recon_api::ImportResult) -> Self {
        Self {
            new: result.new,
            updated: result.updated,
            deleted: result.deleted,
            processed: result.processed,
            success: result.success,
            errors: result.errors.clone(),
            validation_errors: result.validation_errors.clone(),
        }
    }
}

/// The canonical AMBRE column set (§6), mapped one-to-one with no
/// transforms: the CLI expects input files already headered with these
/// names rather than an arbitrary bank export layout.
fn default_mapping() -> MappingTable {
    let text = |name: &str| FieldMapping {
        destination: name.to_string(),
        source_expression: name.to_string(),
        transform: None,
        kind: FieldKind::Text,
    };
    let decimal = |name: &str| FieldMapping {
        destination: name.to_string(),
        source_expression: name.to_string(),
        transform: None,
        kind: FieldKind::Decimal,
    };
    let date = |name: &str| FieldMapping {
        destination: name.to_string(),
        source_expression: name.to_string(),
        transform: None,
        kind: FieldKind::Date,
    };
    MappingTable::new(vec![
        text("Account_ID"),
        text("CCY"),
        text("Event_Num"),
        text("Folder"),
        text("RawLabel"),
        decimal("SignedAmount"),
        decimal("LocalSignedAmount"),
        date("Operation_Date"),
        date("Value_Date"),
        text("Receivable_InvoiceFromAmbre"),
        text("Receivable_DWRefFromAmbre"),
        text("Reconciliation_Num"),
        text("ReconciliationOrigin_Num"),
    ])
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Import {
            country_id,
            pivot_account,
            receivable_account,
            files,
            dwings_file,
            modified_by,
            format,
        } => run_import(country_id, pivot_account, receivable_account, files, dwings_file, modified_by, format).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_import(
    country_id: String,
    pivot_account: String,
    receivable_account: String,
    files: Vec<PathBuf>,
    dwings_file: PathBuf,
    modified_by: String,
    format: OutputFormat,
) -> Result<()> {
    let country = Country {
        id: country_id.clone(),
        ambre_pivot: pivot_account,
        ambre_receivable: receivable_account,
        local_db_path: None,
        network_db_path: None,
        service_code: None,
    };
    let config = InMemoryConfigCatalog::new()
        .with_country(country)
        .with_mapping(country_id.clone(), default_mapping());
    let dwings_source = Arc::new(recon_api::CsvDwingsSource);
    let facade: ReconciliationFacade = demo::in_memory_facade(
        config,
        dwings_source,
        dwings_file.to_str().context("dwings file path must be valid UTF-8")?.to_string(),
    );

    let result = facade.import(country_id, files, modified_by).await?;

    match format {
        OutputFormat::Text => print_text(&result),
        OutputFormat::Json => {
            let view = ImportResultView::from(&result);
            println!("{}", serde_json::to_string_pretty(&view).context("serializing import result")?);
        }
    }

    if !result.success {
        anyhow::bail!("import did not complete successfully");
    }
    Ok(())
}

fn print_text(result: &recon_api::ImportResult) {
    if result.success {
        println!(
            "import succeeded: {} new, {} updated, {} deleted ({} rows processed)",
            result.new, result.updated, result.deleted, result.processed
        );
    } else {
        println!("import failed");
        for error in &result.errors {
            println!("  error: {error}");
        }
        for error in &result.validation_errors {
            println!("  validation error: {error}");
        }
    }
}
