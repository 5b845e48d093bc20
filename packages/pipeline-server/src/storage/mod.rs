//! redb-backed persistence for records and batches (spec §4.1, §4.2, §4.9).
//!
//! - [`tables`]: table definitions and row codecs
//! - [`store`]: `RecordStore` -- claim/settle/recover/retry/clean
//! - [`report`]: read-only projections (counts, listings, export rows)
//! - [`error`]: `StoreError`

pub mod error;
pub mod report;
pub mod store;
pub mod tables;

pub use error::StoreError;
pub use report::{ExportRow, RecordFilter};
pub use store::RecordStore;
