#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Parser/Mapper (reads delimited AMBRE files through a declarative field
//! mapping) and the pure transformation library its transforms call into.

mod mapping;
mod parser;
mod transforms;

pub use mapping::FieldKind;
pub use mapping::FieldMapping;
pub use mapping::MappingTable;
pub use mapping::NamedTransform;
pub use mapping::RawValue;
pub use parser::AccountSides;
pub use parser::IngestError;
pub use parser::RawRow;
pub use parser::movement_from_row;
pub use parser::read;
pub use transforms::TransactionType;
pub use transforms::extract_bgi;
pub use transforms::extract_bgpmt;
pub use transforms::extract_for_receivable;
pub use transforms::extract_guarantee_id;
pub use transforms::get_booking_name_from_id;
pub use transforms::get_codes_from_label;
pub use transforms::get_mbaw_id_from_label;
pub use transforms::get_trn_from_label;
pub use transforms::remove_zeros_from_start;
pub use transforms::transaction_type_for_label;
