//! Access layer for row-oriented operations.
//!
//! - **Value / DataType**: typed column values and the row codec
//! - **OperationManager**: inserts and scans rows of catalog tables through
//!   the buffer pool
//!
//! Rows are stored as heap page records; a table is the ordered list of pages
//! the catalog keeps for it.

pub mod operation;
pub mod value;

pub use operation::OperationManager;
pub use value::{decode_row, encode_row, DataType, Value};
