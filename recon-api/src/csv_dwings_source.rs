use movement_model::DwingsInvoice;
use movement_model::Money;
use recon_dwings::DwingsData;
use recon_dwings::DwingsError;
use recon_dwings::DwingsResult;
use recon_dwings::DwingsSource;

/// Reads a flat DWINGS invoice export: one row per invoice, a fixed column
/// set rather than a declarative mapping (this is an internal DWINGS
/// extract, not a user-authored AMBRE file). Guarantees are not exported by
/// the same feed in this workspace's setup, so `guarantees` is always empty;
/// linkage still works through the invoice-side resolution paths in
/// `recon_dwings::resolve`.
pub struct CsvDwingsSource;

fn optional(record: &csv::StringRecord, headers: &csv::StringRecord, name: &str) -> Option<String> {
    let index = headers.iter().position(|header| header.eq_ignore_ascii_case(name))?;
    let value = record.get(index)?.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn optional_amount(record: &csv::StringRecord, headers: &csv::StringRecord, name: &str) -> Option<Money> {
    optional(record, headers, name).and_then(|value| {
        let minor_units: i64 = value.replace(['.', ','], "").parse().ok()?;
        Some(Money::from_minor_units(minor_units))
    })
}

#[async_trait::async_trait]
impl DwingsSource for CsvDwingsSource {
    async fn load(&self, data_source: &str) -> DwingsResult<DwingsData> {
        let contents = std::fs::read_to_string(data_source)
            .map_err(|err| DwingsError::Source(format!("cannot read {data_source}: {err}")))?;
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(contents.as_bytes());
        let headers = reader
            .headers()
            .map_err(|err| DwingsError::Source(format!("dwings csv header error: {err}")))?
            .clone();

        let mut invoices = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| DwingsError::Source(format!("dwings csv row error: {err}")))?;
            let Some(invoice_id) = optional(&record, &headers, "InvoiceID") else {
                continue;
            };
            invoices.push(DwingsInvoice {
                invoice_id,
                t_invoice_status: optional(&record, &headers, "Status").unwrap_or_default(),
                billing_amount: optional_amount(&record, &headers, "BillingAmount"),
                requested_amount: optional_amount(&record, &headers, "RequestedAmount"),
                final_amount: optional_amount(&record, &headers, "FinalAmount"),
                billing_currency: optional(&record, &headers, "BillingCurrency").unwrap_or_default(),
                bgpmt: optional(&record, &headers, "BGPMT"),
                payment_method: optional(&record, &headers, "PaymentMethod"),
                sender_reference: optional(&record, &headers, "SenderReference"),
                receiver_reference: optional(&record, &headers, "ReceiverReference"),
                business_case_reference: optional(&record, &headers, "BusinessCaseReference"),
                business_case_id: optional(&record, &headers, "BusinessCaseID"),
                mt_status: optional(&record, &headers, "MTStatus"),
                comm_id_email: false,
                start_date: None,
                end_date: None,
                sender_party_name: optional(&record, &headers, "SenderPartyName"),
                receiver_party_name: optional(&record, &headers, "ReceiverPartyName"),
            });
        }

        Ok(DwingsData {
            invoices,
            guarantees: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn reads_invoices_from_a_flat_csv_export() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dwings.csv");
        let mut file = std::fs::File::create(&path).expect("create temp csv");
        file.write_all(
            b"InvoiceID,Status,BillingAmount,BillingCurrency,BGPMT\n\
              BGI0000000001234,OPEN,500.00,EUR,BGPMT999999\n",
        )
        .expect("write temp csv");

        let data = CsvDwingsSource
            .load(path.to_str().expect("utf8 path"))
            .await
            .expect("loads");
        assert_eq!(data.invoices.len(), 1);
        assert_eq!(data.invoices[0].invoice_id, "BGI0000000001234");
        assert_eq!(data.invoices[0].bgpmt.as_deref(), Some("BGPMT999999"));
    }
}
