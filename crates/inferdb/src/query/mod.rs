//! Query execution: select/infer, simulate, relational analysis, and
//! output reshaping.

pub mod estimate;
pub mod functions;
pub mod pipeline;
pub mod shaping;
pub mod simulate;

pub use estimate::{PairFunction, RankedColumn};
pub use functions::{
    ColumnFunction, ColumnOrderKey, ColumnPredicate, CompareOp, EvalContext, OrderKey,
    QueryFunction, ResolvedFunction, WherePredicate,
};
pub use pipeline::{ImputeSpec, SelectPlan};
pub use shaping::OutputShape;
pub use simulate::Given;
