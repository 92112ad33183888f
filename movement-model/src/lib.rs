#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Shared domain types for the AMBRE/DWINGS reconciliation pipeline.
//!
//! Every crate downstream of this one passes these typed records across its
//! boundaries instead of an untyped map of field name to value.

use std::fmt;

use chrono::DateTime;
use chrono::NaiveDate;
use chrono::Utc;
use thiserror::Error;

pub type MovementId = String;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("validation error: {0}")]
    Validation(String),
}

pub type ModelResult<T> = Result<T, ModelError>;

/// A fixed-point signed monetary amount, stored as minor units (e.g. cents)
/// rather than floating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money {
    minor_units: i64,
}

impl Money {
    pub const SCALE: u32 = 2;

    #[must_use]
    pub fn from_minor_units(minor_units: i64) -> Self {
        Self { minor_units }
    }

    #[must_use]
    pub fn minor_units(self) -> i64 {
        self.minor_units
    }

    #[must_use]
    pub fn abs_diff(self, other: Self) -> i64 {
        (self.minor_units - other.minor_units).abs()
    }

    #[must_use]
    pub fn is_credit(self) -> bool {
        self.minor_units >= 0
    }

    #[must_use]
    pub fn sign(self) -> Sign {
        if self.is_credit() { Sign::Credit } else { Sign::Debit }
    }
}

impl std::ops::Add for Money {
    type Output = Money;
    fn add(self, rhs: Self) -> Self::Output {
        Money::from_minor_units(self.minor_units + rhs.minor_units)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = 10_i64.pow(Self::SCALE);
        let sign = if self.minor_units < 0 { "-" } else { "" };
        write!(
            f,
            "{sign}{}.{:02}",
            (self.minor_units / scale).abs(),
            (self.minor_units % scale).abs()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Credit,
    Debit,
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sign::Credit => write!(f, "C"),
            Sign::Debit => write!(f, "D"),
        }
    }
}

/// Which side of a country's account pair a movement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Pivot,
    Receivable,
}

/// The deterministic tuple identifying a movement independent of import
/// order. Two rows with an identical business key are the same movement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BusinessKey(String);

impl BusinessKey {
    #[must_use]
    pub fn compute(
        account_id: &str,
        event_num: &str,
        reconciliation_num: Option<&str>,
        reconciliation_origin_num: Option<&str>,
        signed_amount: Money,
        operation_date: NaiveDate,
    ) -> Self {
        Self(format!(
            "{}|{}|{}|{}|{}|{}",
            account_id.trim(),
            event_num.trim(),
            reconciliation_num.unwrap_or("").trim(),
            reconciliation_origin_num.unwrap_or("").trim(),
            signed_amount.minor_units(),
            operation_date,
        ))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_movement_id(self) -> MovementId {
        self.0
    }
}

impl fmt::Display for BusinessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One AMBRE bank-movement row.
#[derive(Debug, Clone, PartialEq)]
pub struct Movement {
    pub id: MovementId,
    pub country: String,
    pub account_id: String,
    pub currency: String,
    pub event_num: String,
    pub folder: String,
    pub raw_label: String,
    pub signed_amount: Money,
    pub local_signed_amount: Money,
    pub operation_date: NaiveDate,
    pub value_date: NaiveDate,
    pub reconciliation_num: Option<String>,
    pub reconciliation_origin_num: Option<String>,
    pub receivable_invoice_from_ambre: Option<String>,
    pub receivable_dw_ref_from_ambre: Option<String>,
    pub category: Option<i32>,
    pub version: u32,
    pub creation_date: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub modified_by: String,
    pub delete_date: Option<DateTime<Utc>>,
}

impl Movement {
    #[must_use]
    pub fn business_key(&self) -> BusinessKey {
        BusinessKey::compute(
            &self.account_id,
            &self.event_num,
            self.reconciliation_num.as_deref(),
            self.reconciliation_origin_num.as_deref(),
            self.signed_amount,
            self.operation_date,
        )
    }

    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.delete_date.is_some()
    }

    #[must_use]
    pub fn side(&self, country: &Country) -> Option<Side> {
        if self.account_id == country.ambre_pivot {
            Some(Side::Pivot)
        } else if self.account_id == country.ambre_receivable {
            Some(Side::Receivable)
        } else {
            None
        }
    }

    /// Business fields compared for equality by the diff engine; versioning
    /// and audit fields never trigger an update.
    #[must_use]
    pub fn same_business_fields(&self, other: &Movement) -> bool {
        self.account_id == other.account_id
            && self.currency == other.currency
            && self.event_num == other.event_num
            && self.folder == other.folder
            && self.raw_label == other.raw_label
            && self.signed_amount == other.signed_amount
            && self.local_signed_amount == other.local_signed_amount
            && self.operation_date == other.operation_date
            && self.value_date == other.value_date
            && self.category == other.category
            && self.reconciliation_num == other.reconciliation_num
            && self.receivable_invoice_from_ambre == other.receivable_invoice_from_ambre
            && self.receivable_dw_ref_from_ambre == other.receivable_dw_ref_from_ambre
    }

    /// Returns a new record carrying `incoming`'s business fields, bumping
    /// `version` and preserving `creation_date`. Used by the diff engine for
    /// the update path; the staging merge only ever receives immutable
    /// records, never mutates in place.
    #[must_use]
    pub fn updated_from(&self, incoming: &Movement, now: DateTime<Utc>) -> Movement {
        Movement {
            id: self.id.clone(),
            version: self.version + 1,
            creation_date: self.creation_date,
            last_modified: now,
            modified_by: incoming.modified_by.clone(),
            delete_date: None,
            ..incoming.clone()
        }
    }

    #[must_use]
    pub fn archived(&self, now: DateTime<Utc>) -> Movement {
        Movement {
            version: self.version + 1,
            last_modified: now,
            delete_date: Some(now),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn revived_from(&self, incoming: &Movement, now: DateTime<Utc>) -> Movement {
        Movement {
            id: self.id.clone(),
            version: self.version + 1,
            creation_date: self.creation_date,
            last_modified: now,
            modified_by: incoming.modified_by.clone(),
            delete_date: None,
            ..incoming.clone()
        }
    }
}

/// The first-matching-rule output id for the action a reconciliation row
/// carries. Closed over the variants this codebase actually assigns rather
/// than left as an opaque integer, per the reflection-to-typed-setter design
/// note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Unset,
    NotApplicable,
    Investigate,
    Match,
    Trigger,
    Claim,
    Adjust,
    WriteOff,
}

impl Action {
    #[must_use]
    pub fn requires_status(self) -> bool {
        !matches!(self, Action::Unset | Action::NotApplicable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Unset,
    Pending,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kpi {
    Unset,
    OnTime,
    Late,
    AtRisk,
    Resolved,
    WrittenOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentType {
    None,
    MissingDwingsLink,
    AmountMismatch,
    Duplicate,
    ManualReviewRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonNonRisky {
    None,
    KnownDelay,
    ClientAdvised,
    Other,
}

/// A reconciliation row, 1:1 with a `Movement` by `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub id: MovementId,
    pub dwings_invoice_id: Option<String>,
    pub dwings_guarantee_id: Option<String>,
    pub dwings_commission_id: Option<String>,
    pub action: Action,
    pub action_status: ActionStatus,
    pub action_date: Option<DateTime<Utc>>,
    pub kpi: Kpi,
    pub incident_type: IncidentType,
    pub risky_item: bool,
    pub reason_non_risky: ReasonNonRisky,
    pub comments: String,
    pub internal_invoice_reference: Option<String>,
    pub first_claim_date: Option<NaiveDate>,
    pub last_claim_date: Option<NaiveDate>,
    pub to_remind: bool,
    pub to_remind_date: Option<NaiveDate>,
    pub ack: bool,
    pub swift_code: Option<String>,
    pub payment_reference: Option<String>,
    pub trigger_date: Option<NaiveDate>,
    pub assignee: Option<String>,
    pub version: u32,
    pub creation_date: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub modified_by: String,
    pub delete_date: Option<DateTime<Utc>>,
}

impl Reconciliation {
    #[must_use]
    pub fn new(movement_id: MovementId, now: DateTime<Utc>, modified_by: impl Into<String>) -> Self {
        Self {
            id: movement_id,
            dwings_invoice_id: None,
            dwings_guarantee_id: None,
            dwings_commission_id: None,
            action: Action::Unset,
            action_status: ActionStatus::Unset,
            action_date: None,
            kpi: Kpi::Unset,
            incident_type: IncidentType::None,
            risky_item: false,
            reason_non_risky: ReasonNonRisky::None,
            comments: String::new(),
            internal_invoice_reference: None,
            first_claim_date: None,
            last_claim_date: None,
            to_remind: false,
            to_remind_date: None,
            ack: false,
            swift_code: None,
            payment_reference: None,
            trigger_date: None,
            assignee: None,
            version: 1,
            creation_date: now,
            last_modified: now,
            modified_by: modified_by.into(),
            delete_date: None,
        }
    }

    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.delete_date.is_some()
    }

    /// Assigns a new action, enforcing the invariant that `action_status`
    /// and `action_date` are only ever set alongside an actionable action.
    pub fn set_action(&mut self, action: Action, now: DateTime<Utc>) {
        self.action = action;
        if action.requires_status() {
            self.action_status = ActionStatus::Pending;
            self.action_date = Some(now);
        } else {
            self.action_status = ActionStatus::Unset;
            self.action_date = None;
        }
    }

    /// Appends a comment rather than overwriting; rules never silently
    /// discard prior comment history.
    pub fn append_comment(&mut self, author: &str, text: &str, now: DateTime<Utc>) {
        let entry = format!("[{now}] {author}: {text}");
        if self.comments.is_empty() {
            self.comments = entry;
        } else {
            self.comments = format!("{entry}\n{}", self.comments);
        }
    }

    pub fn archive(&mut self, now: DateTime<Utc>) {
        self.delete_date = Some(now);
        self.version += 1;
        self.last_modified = now;
    }

    pub fn revive(&mut self, now: DateTime<Utc>) {
        self.delete_date = None;
        self.version += 1;
        self.last_modified = now;
    }

    #[must_use]
    pub fn is_action_status_consistent(&self) -> bool {
        if self.action.requires_status() {
            self.action_status != ActionStatus::Unset && self.action_date.is_some()
        } else {
            self.action_status == ActionStatus::Unset && self.action_date.is_none()
        }
    }
}

/// Read-only DWINGS invoice reference data.
#[derive(Debug, Clone, PartialEq)]
pub struct DwingsInvoice {
    pub invoice_id: String,
    pub t_invoice_status: String,
    pub billing_amount: Option<Money>,
    pub requested_amount: Option<Money>,
    pub final_amount: Option<Money>,
    pub billing_currency: String,
    pub bgpmt: Option<String>,
    pub payment_method: Option<String>,
    pub sender_reference: Option<String>,
    pub receiver_reference: Option<String>,
    pub business_case_reference: Option<String>,
    pub business_case_id: Option<String>,
    pub mt_status: Option<String>,
    pub comm_id_email: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub sender_party_name: Option<String>,
    pub receiver_party_name: Option<String>,
}

impl DwingsInvoice {
    #[must_use]
    pub fn amount_priority(&self) -> [Option<Money>; 3] {
        [self.billing_amount, self.requested_amount, self.final_amount]
    }

    #[must_use]
    pub fn references_token(&self, token: &str) -> bool {
        let token = token.to_ascii_uppercase();
        [
            Some(self.invoice_id.as_str()),
            self.sender_reference.as_deref(),
            self.receiver_reference.as_deref(),
            self.business_case_reference.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|candidate| candidate.to_ascii_uppercase() == token)
    }

    #[must_use]
    pub fn covers_date(&self, date: NaiveDate) -> bool {
        let after_start = self.start_date.is_none_or(|start| date >= start);
        let before_end = self.end_date.is_none_or(|end| date <= end);
        after_start && before_end
    }
}

/// Read-only DWINGS guarantee reference data.
#[derive(Debug, Clone, PartialEq)]
pub struct DwingsGuarantee {
    pub guarantee_id: String,
    pub guarantee_status: String,
    pub guarantee_type: Option<String>,
    pub outstanding_amount: Option<Money>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub party_name: Option<String>,
}

/// A country's AMBRE configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Country {
    pub id: String,
    pub ambre_pivot: String,
    pub ambre_receivable: String,
    pub local_db_path: Option<String>,
    pub network_db_path: Option<String>,
    pub service_code: Option<String>,
}

impl Country {
    #[must_use]
    pub fn side_of(&self, account_id: &str) -> Option<Side> {
        if account_id == self.ambre_pivot {
            Some(Side::Pivot)
        } else if account_id == self.ambre_receivable {
            Some(Side::Receivable)
        } else {
            None
        }
    }
}

/// The transient Add/Update/Archive classification produced by the diff
/// engine and consumed by the staging merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovementChangeSet {
    pub to_add: Vec<Movement>,
    pub to_update: Vec<Movement>,
    pub to_archive: Vec<MovementId>,
}

impl MovementChangeSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_update.is_empty() && self.to_archive.is_empty()
    }
}
