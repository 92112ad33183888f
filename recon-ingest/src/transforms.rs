//! Pure, deterministic, side-effect free helpers used by the parser's
//! declarative transform table. None of these touch the filesystem or any
//! shared mutable state.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex_lite::Regex;

const DEFAULT_GUARANTEE_PATTERN: &str = r"(?i)GUAR[0-9]{10,}";

fn bgpmt_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)BGPMT[A-Z0-9]{6,}").expect("static pattern compiles"))
}

fn bgi_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)BGI[0-9]{13}").expect("static pattern compiles"))
}

fn mbaw_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)MBAW[A-Z0-9]+").expect("static pattern compiles"))
}

fn default_guarantee_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(DEFAULT_GUARANTEE_PATTERN).expect("static pattern compiles"))
}

/// `BGPMT[A-Z0-9]{6,}`, case-insensitive. BGPMT tokens are unique per
/// payment so the first match is returned.
#[must_use]
pub fn extract_bgpmt(text: &str) -> Option<String> {
    bgpmt_pattern()
        .find(text)
        .map(|m| m.as_str().to_ascii_uppercase())
}

/// Strict `BGI` followed by exactly 13 decimal digits. Looser variants are
/// deliberately not supported: a relaxed digit count produces false
/// positives against unrelated reference numbers.
#[must_use]
pub fn extract_bgi(text: &str) -> Option<String> {
    bgi_pattern()
        .find(text)
        .map(|m| m.as_str().to_ascii_uppercase())
}

/// Extracts a guarantee id using the issuer's configured pattern, falling
/// back to a reasonable default when no override is supplied.
#[must_use]
pub fn extract_guarantee_id(text: &str, pattern: Option<&Regex>) -> Option<String> {
    let pattern = pattern.unwrap_or_else(|| default_guarantee_pattern());
    pattern.find(text).map(|m| m.as_str().to_ascii_uppercase())
}

#[must_use]
pub fn get_mbaw_id_from_label(label: &str) -> String {
    mbaw_pattern()
        .find(label)
        .map(|m| m.as_str().to_ascii_uppercase())
        .unwrap_or_default()
}

#[must_use]
pub fn get_codes_from_label(label: &str) -> String {
    let trimmed = label.trim();
    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= 13 {
        trimmed.to_string()
    } else {
        chars[chars.len() - 13..].iter().collect()
    }
}

#[must_use]
pub fn get_trn_from_label(label: &str) -> String {
    let chars: Vec<char> = label.chars().collect();
    if chars.len() < 43 {
        return String::new();
    }
    chars.iter().skip(42).take(10).collect()
}

#[must_use]
pub fn extract_for_receivable(label: &str) -> String {
    if let Some(bgi) = extract_bgi(label) {
        return bgi;
    }
    if let Some(guarantee) = extract_guarantee_id(label, None) {
        return guarantee;
    }
    String::new()
}

#[must_use]
pub fn remove_zeros_from_start(value: &str) -> String {
    value.trim_start_matches('0').to_string()
}

#[must_use]
pub fn get_booking_name_from_id(code: &str, country_table: &HashMap<String, String>) -> String {
    country_table
        .get(code)
        .cloned()
        .unwrap_or_else(|| code.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    ToCategorize,
    Collection,
    Payment,
    Adjustment,
    XclLoader,
    Trigger,
    IncomingPayment,
    DirectDebit,
    ManualOutgoing,
    OutgoingPayment,
    ExternalDebitPayment,
}

/// Detects the transaction type from the label, which side of the account
/// pair the row belongs to, and an optional category index carried directly
/// on pivot rows. Match order follows the declared keyword order; the first
/// match wins.
#[must_use]
pub fn transaction_type_for_label(
    label: &str,
    is_pivot: bool,
    category_index: Option<i32>,
) -> TransactionType {
    let upper = label.to_ascii_uppercase();
    if upper.contains("TO CATEGORIZE") || label.trim().is_empty() {
        return TransactionType::ToCategorize;
    }

    if is_pivot {
        if let Some(index) = category_index {
            return pivot_category_from_index(index);
        }
        if upper.contains("COLLECTION") {
            return TransactionType::Collection;
        }
        if upper.contains("AUTOMATIC REFUND") || upper.contains("AUTOMATIC PAYMENT") {
            return TransactionType::Payment;
        }
        if upper.contains("ADJUSTMENT") {
            return TransactionType::Adjustment;
        }
        if upper.contains("XCL LOADER") {
            return TransactionType::XclLoader;
        }
        if upper.contains("TRIGGER") {
            return TransactionType::Trigger;
        }
        return TransactionType::ToCategorize;
    }

    if upper.contains("INCOMING PAYMENT") {
        return TransactionType::IncomingPayment;
    }
    if upper.contains("DIRECT DEBIT") {
        return TransactionType::DirectDebit;
    }
    if upper.contains("MANUAL OUTGOING") {
        return TransactionType::ManualOutgoing;
    }
    if upper.contains("OUTGOING PAYMENT") {
        return TransactionType::OutgoingPayment;
    }
    if upper.contains("EXTERNAL DEBIT PAYMENT") {
        return TransactionType::ExternalDebitPayment;
    }
    TransactionType::ToCategorize
}

fn pivot_category_from_index(index: i32) -> TransactionType {
    match index {
        1 => TransactionType::Collection,
        2 => TransactionType::Payment,
        3 => TransactionType::Adjustment,
        4 => TransactionType::XclLoader,
        5 => TransactionType::Trigger,
        _ => TransactionType::ToCategorize,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgpmt_is_case_insensitive_and_uppercases_output() {
        assert_eq!(
            extract_bgpmt("ref bgpmt123abc done").as_deref(),
            Some("BGPMT123ABC")
        );
        assert_eq!(extract_bgpmt("no token here"), None);
    }

    #[test]
    fn bgi_requires_exactly_thirteen_digits() {
        assert_eq!(
            extract_bgi("label BGI0000000001234 tail").as_deref(),
            Some("BGI0000000001234")
        );
        assert_eq!(extract_bgi("label BGI123 tail"), None);
        assert_eq!(extract_bgi("label BGI00000000012345 tail"), None);
    }

    #[test]
    fn extractors_are_idempotent() {
        let label = "payment BGPMT998877 BGI0000000001234";
        let once = extract_bgpmt(label);
        let twice = once.as_deref().and_then(extract_bgpmt);
        assert_eq!(once, twice);
    }

    #[test]
    fn codes_from_label_takes_trailing_thirteen_chars() {
        assert_eq!(get_codes_from_label("  short  "), "short");
        assert_eq!(
            get_codes_from_label("this label is definitely longer than thirteen"),
            "than thirteen"
        );
    }

    #[test]
    fn trn_from_label_reads_fixed_window() {
        let label = "0".repeat(42) + "TRN1234567" + "trailing";
        assert_eq!(get_trn_from_label(&label), "TRN1234567");
        assert_eq!(get_trn_from_label("too short"), "");
    }

    #[test]
    fn transaction_type_keyword_order_for_pivot() {
        assert_eq!(
            transaction_type_for_label("TO CATEGORIZE please", true, None),
            TransactionType::ToCategorize
        );
        assert_eq!(
            transaction_type_for_label("monthly COLLECTION batch", true, None),
            TransactionType::Collection
        );
        assert_eq!(
            transaction_type_for_label("AUTOMATIC PAYMENT run", true, None),
            TransactionType::Payment
        );
        assert_eq!(
            transaction_type_for_label("anything", true, Some(3)),
            TransactionType::Adjustment
        );
    }

    #[test]
    fn transaction_type_keyword_order_for_receivable() {
        assert_eq!(
            transaction_type_for_label("INCOMING PAYMENT received", false, None),
            TransactionType::IncomingPayment
        );
        assert_eq!(
            transaction_type_for_label("a DIRECT DEBIT order", false, None),
            TransactionType::DirectDebit
        );
    }

    #[test]
    fn remove_zeros_strips_only_leading() {
        assert_eq!(remove_zeros_from_start("0000123400"), "123400");
        assert_eq!(remove_zeros_from_start("no leading"), "no leading");
    }
}
