//! Btable schema representation: column types, codebooks, projections.

mod column;
mod table;
mod types;

pub use column::{Codebook, ColumnSchema};
pub use table::TableSchema;
pub use types::ColumnType;
