//! C1: reads one or two delimited AMBRE files through a declarative field
//! mapping, filters by account side, and fails fast when a country's pivot
//! and receivable accounts are not both represented.

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;
use movement_model::Country;
use movement_model::Money;
use movement_model::Movement;
use movement_model::Side;
use thiserror::Error;

use crate::mapping::FieldKind;
use crate::mapping::MappingTable;
use crate::mapping::NamedTransform;
use crate::mapping::RawValue;
use crate::mapping::split_source_expression;
use crate::transforms;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("both the pivot and receivable account sides must appear in the import")]
    MissingAccountSide,
}

pub type RawRow = HashMap<String, RawValue>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountSides {
    pub pivot_seen: bool,
    pub receivable_seen: bool,
}

impl AccountSides {
    #[must_use]
    pub fn is_complete(self) -> bool {
        self.pivot_seen && self.receivable_seen
    }
}

const ACCOUNT_ID: &str = "Account_ID";

/// Reads and maps every row across `paths`, dropping rows whose `Account_ID`
/// is neither the country's pivot nor receivable account, and failing the
/// whole import if after filtering one side never appeared.
pub fn read(
    paths: &[impl AsRef<Path>],
    mapping: &MappingTable,
    country: &Country,
) -> Result<Vec<RawRow>, IngestError> {
    let mut rows = Vec::new();
    let mut sides = AccountSides::default();

    for path in paths {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|err| {
            IngestError::InvalidInput(format!("cannot read {}: {err}", path.display()))
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(contents.as_bytes());
        let headers = reader
            .headers()
            .map_err(|err| IngestError::InvalidInput(format!("csv header error: {err}")))?
            .clone();

        for record in reader.records() {
            let record =
                record.map_err(|err| IngestError::InvalidInput(format!("csv row error: {err}")))?;
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }

            let row = build_row(&record, &headers, mapping)?;

            let Some(RawValue::Text(account_id)) = row.get(ACCOUNT_ID) else {
                rows.push(row);
                continue;
            };

            if account_id == &country.ambre_pivot {
                sides.pivot_seen = true;
            } else if account_id == &country.ambre_receivable {
                sides.receivable_seen = true;
            } else {
                continue;
            }

            rows.push(row);
        }
    }

    if !sides.is_complete() {
        return Err(IngestError::MissingAccountSide);
    }

    Ok(rows)
}

fn build_row(
    record: &StringRecord,
    headers: &StringRecord,
    mapping: &MappingTable,
) -> Result<RawRow, IngestError> {
    let mut row = RawRow::new();
    for field in &mapping.fields {
        let raw_text = resolve_source_expression(record, headers, &field.source_expression)?;
        let transformed = apply_transform(&raw_text, field.transform.as_deref(), mapping);
        let value = parse_declared_kind(&transformed, field.kind)?;
        row.insert(field.destination.clone(), value);
    }
    Ok(row)
}

fn resolve_source_expression(
    record: &StringRecord,
    headers: &StringRecord,
    expression: &str,
) -> Result<String, IngestError> {
    let tokens = split_source_expression(expression);
    let mut joined = String::new();
    for token in tokens {
        let index = headers
            .iter()
            .position(|candidate| candidate.eq_ignore_ascii_case(token))
            .ok_or_else(|| IngestError::InvalidInput(format!("missing column {token}")))?;
        joined.push_str(record.get(index).unwrap_or("").trim());
    }
    Ok(joined)
}

fn apply_transform(value: &str, transform_name: Option<&str>, mapping: &MappingTable) -> String {
    let Some(name) = transform_name else {
        return value.to_string();
    };
    match NamedTransform::resolve(name) {
        NamedTransform::BookingNameFromId => {
            transforms::get_booking_name_from_id(value, &mapping.country_booking_names)
        }
        NamedTransform::MbawIdFromLabel => transforms::get_mbaw_id_from_label(value),
        NamedTransform::CodesFromLabel => transforms::get_codes_from_label(value),
        NamedTransform::TrnFromLabel => transforms::get_trn_from_label(value),
        NamedTransform::ExtractForReceivable => transforms::extract_for_receivable(value),
        NamedTransform::RemoveZerosFromStart => transforms::remove_zeros_from_start(value),
        NamedTransform::Identity => value.to_string(),
    }
}

fn parse_declared_kind(value: &str, kind: FieldKind) -> Result<RawValue, IngestError> {
    match kind {
        FieldKind::Text => Ok(RawValue::Text(value.to_string())),
        FieldKind::Decimal => parse_decimal(value).map(RawValue::Decimal),
        FieldKind::Date => parse_date(value).map(RawValue::Date),
    }
}

/// Accepts comma or period as the decimal separator; whichever occurs last
/// in the string is treated as the separator, everything before it is
/// digits-only integer part.
fn parse_decimal(raw: &str) -> Result<Money, IngestError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IngestError::InvalidInput("amount cannot be empty".into()));
    }
    let negative = trimmed.starts_with('-');
    let body = trimmed.trim_start_matches(['-', '+']);

    let separator = body.rfind([',', '.']);
    let (integer_part, fraction_part) = match separator {
        Some(pos) => (&body[..pos], &body[pos + 1..]),
        None => (body, ""),
    };

    let digits_integer: String = integer_part.chars().filter(char::is_ascii_digit).collect();
    let mut digits_fraction: String = fraction_part.chars().filter(char::is_ascii_digit).collect();
    if digits_integer.is_empty() && digits_fraction.is_empty() {
        return Err(IngestError::InvalidInput(format!(
            "cannot parse decimal: {raw}"
        )));
    }
    digits_fraction.truncate(2);
    while digits_fraction.len() < 2 {
        digits_fraction.push('0');
    }

    let integer_value: i64 = if digits_integer.is_empty() {
        0
    } else {
        digits_integer
            .parse()
            .map_err(|_| IngestError::InvalidInput(format!("cannot parse decimal: {raw}")))?
    };
    let fraction_value: i64 = digits_fraction.parse().unwrap_or(0);
    let minor_units = integer_value * 100 + fraction_value;
    Ok(Money::from_minor_units(if negative {
        -minor_units
    } else {
        minor_units
    }))
}

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d-%b-%y"];

/// Tries ISO, then French, then Italian, then the DWINGS short form, in that
/// order, returning the first format that parses.
fn parse_date(raw: &str) -> Result<NaiveDate, IngestError> {
    let trimmed = raw.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
    }
    Err(IngestError::InvalidInput(format!(
        "cannot parse date: {raw}"
    )))
}

fn required_text(row: &RawRow, key: &str) -> Result<String, IngestError> {
    match row.get(key) {
        Some(RawValue::Text(value)) if !value.is_empty() => Ok(value.clone()),
        _ => Err(IngestError::InvalidInput(format!("missing field {key}"))),
    }
}

fn optional_text(row: &RawRow, key: &str) -> Option<String> {
    match row.get(key) {
        Some(RawValue::Text(value)) if !value.is_empty() => Some(value.clone()),
        _ => None,
    }
}

fn required_decimal(row: &RawRow, key: &str) -> Result<Money, IngestError> {
    row.get(key)
        .and_then(RawValue::as_decimal)
        .ok_or_else(|| IngestError::InvalidInput(format!("missing amount field {key}")))
}

fn required_date(row: &RawRow, key: &str) -> Result<NaiveDate, IngestError> {
    row.get(key)
        .and_then(RawValue::as_date)
        .ok_or_else(|| IngestError::InvalidInput(format!("missing date field {key}")))
}

fn optional_category(row: &RawRow) -> Option<i32> {
    match row.get("Category") {
        Some(RawValue::Text(value)) => value.parse::<i32>().ok(),
        _ => None,
    }
}

/// Builds a fully-typed `Movement` from one mapped row, stamping `id` from
/// the derived business key and coherence-checking that amount, date and
/// currency are present and non-empty.
pub fn movement_from_row(
    row: &RawRow,
    country: &Country,
    now: chrono::DateTime<chrono::Utc>,
    modified_by: &str,
) -> Result<Movement, IngestError> {
    let account_id = required_text(row, ACCOUNT_ID)?;
    if country.side_of(&account_id).is_none() {
        return Err(IngestError::InvalidInput(format!(
            "account {account_id} belongs to neither the pivot nor receivable side"
        )));
    }
    let currency = required_text(row, "CCY")?;
    let signed_amount = required_decimal(row, "SignedAmount")?;
    let local_signed_amount = required_decimal(row, "LocalSignedAmount").unwrap_or(signed_amount);
    let operation_date = required_date(row, "Operation_Date")?;
    let value_date = required_date(row, "Value_Date").unwrap_or(operation_date);

    let mut movement = Movement {
        id: String::new(),
        country: country.id.clone(),
        account_id,
        currency,
        event_num: optional_text(row, "Event_Num").unwrap_or_default(),
        folder: optional_text(row, "Folder").unwrap_or_default(),
        raw_label: optional_text(row, "RawLabel").unwrap_or_default(),
        signed_amount,
        local_signed_amount,
        operation_date,
        value_date,
        reconciliation_num: optional_text(row, "Reconciliation_Num"),
        reconciliation_origin_num: optional_text(row, "ReconciliationOrigin_Num"),
        receivable_invoice_from_ambre: optional_text(row, "Receivable_InvoiceFromAmbre"),
        receivable_dw_ref_from_ambre: optional_text(row, "Receivable_DWRefFromAmbre"),
        category: optional_category(row),
        version: 1,
        creation_date: now,
        last_modified: now,
        modified_by: modified_by.to_string(),
        delete_date: None,
    };
    movement.id = movement.business_key().into_movement_id();
    Ok(movement)
}

#[must_use]
pub fn side_of(country: &Country, account_id: &str) -> Option<Side> {
    country.side_of(account_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::FieldMapping;
    use std::io::Write;

    fn country() -> Country {
        Country {
            id: "FR".into(),
            ambre_pivot: "P".into(),
            ambre_receivable: "R".into(),
            local_db_path: None,
            network_db_path: None,
            service_code: None,
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
                destination: "LocalSignedAmount".into(),
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

    fn write_csv(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).expect("create temp csv");
        file.write_all(contents.as_bytes()).expect("write temp csv");
        path
    }

    #[test]
    fn reads_and_filters_by_account_side() {
        let dir = tempfile::tempdir().expect("tempdir");
        let csv = "Account,Currency,Event,Label,Amount,OpDate\n\
                    P,EUR,E1,pivot row,100.00,2024-01-10\n\
                    R,EUR,E1,receivable row,-100.00,2024-01-10\n\
                    X,EUR,E1,unrelated account,5.00,2024-01-10\n";
        let path = write_csv(&dir, "in.csv", csv);

        let rows = read(&[path], &mapping(), &country()).expect("read succeeds");
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn missing_account_side_aborts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let csv = "Account,Currency,Event,Label,Amount,OpDate\n\
                    P,EUR,E1,pivot only,100.00,2024-01-10\n";
        let path = write_csv(&dir, "in.csv", csv);

        let err = read(&[path], &mapping(), &country()).unwrap_err();
        assert!(matches!(err, IngestError::MissingAccountSide));
    }

    #[test]
    fn decimal_parsing_accepts_comma_or_period() {
        assert_eq!(parse_decimal("1,234.56").expect("parses").minor_units(), 123456);
        assert_eq!(parse_decimal("1.234,56").expect("parses").minor_units(), 123456);
        assert_eq!(parse_decimal("-12.5").expect("parses").minor_units(), -1250);
    }

    #[test]
    fn date_parsing_tries_formats_in_order() {
        assert_eq!(
            parse_date("2024-01-10").expect("iso"),
            NaiveDate::from_ymd_opt(2024, 1, 10).expect("valid date")
        );
        assert_eq!(
            parse_date("10/01/2024").expect("french"),
            NaiveDate::from_ymd_opt(2024, 1, 10).expect("valid date")
        );
        assert_eq!(
            parse_date("10-JAN-24").expect("dwings short form"),
            NaiveDate::from_ymd_opt(2024, 1, 10).expect("valid date")
        );
    }

    #[test]
    fn movement_from_row_derives_id_from_business_key() {
        let mut row = RawRow::new();
        row.insert("Account_ID".into(), RawValue::Text("P".into()));
        row.insert("CCY".into(), RawValue::Text("EUR".into()));
        row.insert("Event_Num".into(), RawValue::Text("E1".into()));
        row.insert(
            "SignedAmount".into(),
            RawValue::Decimal(Money::from_minor_units(10_000)),
        );
        row.insert(
            "Operation_Date".into(),
            RawValue::Date(NaiveDate::from_ymd_opt(2024, 1, 10).expect("valid date")),
        );

        let now = chrono::Utc::now();
        let movement = movement_from_row(&row, &country(), now, "import").expect("builds");
        assert_eq!(movement.id, movement.business_key().as_str());
    }
}
