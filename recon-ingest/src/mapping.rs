//! The declarative field-mapping table supplied at runtime: destination
//! field name, a source expression (a single column or a bracket
//! concatenation), and an optional named transform.

use std::collections::HashMap;

use movement_model::Money;

use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Decimal,
    Date,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamedTransform {
    BookingNameFromId,
    MbawIdFromLabel,
    CodesFromLabel,
    TrnFromLabel,
    ExtractForReceivable,
    RemoveZerosFromStart,
    /// An unrecognized transform name: the source value passes through
    /// unchanged, per the parser's contract.
    Identity,
}

impl NamedTransform {
    #[must_use]
    pub fn resolve(name: &str) -> Self {
        match name {
            "get_booking_name_from_id" => Self::BookingNameFromId,
            "get_mbaw_id_from_label" => Self::MbawIdFromLabel,
            "get_codes_from_label" => Self::CodesFromLabel,
            "get_trn_from_label" => Self::TrnFromLabel,
            "extract_for_receivable" => Self::ExtractForReceivable,
            "remove_zeros_from_start" => Self::RemoveZerosFromStart,
            _ => Self::Identity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub destination: String,
    pub source_expression: String,
    pub transform: Option<String>,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    pub fields: Vec<FieldMapping>,
    pub country_booking_names: HashMap<String, String>,
}

impl MappingTable {
    #[must_use]
    pub fn new(fields: Vec<FieldMapping>) -> Self {
        Self {
            fields,
            country_booking_names: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_country_booking_names(mut self, table: HashMap<String, String>) -> Self {
        self.country_booking_names = table;
        self
    }
}

/// A bracket-concatenation source expression such as `[FieldA]&[FieldB]`
/// splits into its component column references, in declaration order.
#[must_use]
pub fn split_source_expression(expression: &str) -> Vec<&str> {
    if !expression.contains('[') {
        return vec![expression];
    }
    expression
        .split('&')
        .map(|part| part.trim().trim_start_matches('[').trim_end_matches(']'))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    Decimal(Money),
    Date(NaiveDate),
}

impl RawValue {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_decimal(&self) -> Option<Money> {
        match self {
            RawValue::Decimal(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            RawValue::Date(value) => Some(*value),
            _ => None,
        }
    }
}
