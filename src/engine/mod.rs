//! The recalculation engine: identifier allocation, aggregate counters,
//! generated fields, cascades and bulk repair jobs.

pub mod aggregate;
pub mod bulk;
pub mod cascade;
pub mod generated;
pub mod numbers;

use std::time::Duration;

use thiserror::Error;

use crate::core::EntityKind;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("could not allocate a free {field} within {budget:?}")]
    Exhausted {
        field: &'static str,
        budget: Duration,
    },
    #[error("missing {entity} {id} referenced by {context}")]
    MissingReference {
        entity: EntityKind,
        id: i64,
        context: &'static str,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub use bulk::{BulkReport, RowFailure};
pub use numbers::NumberField;
