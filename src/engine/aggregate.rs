//! Per-location aggregate counters.
//!
//! The eight counters are always recomputed from the full outplanting
//! working set. The `exclude` parameter computes "as if already removed"
//! statistics during a delete, before the row actually goes away.

use crate::core::{AggregateStats, DepartmentId, OutplantingId, TerritoryId};
use crate::store::Store;

use super::EngineError;

/// Recompute and persist the counters of one department.
pub fn recompute_department(
    store: &Store,
    id: DepartmentId,
    exclude: Option<OutplantingId>,
) -> Result<AggregateStats, EngineError> {
    let facts = store.outplanting_facts_for_department(id, exclude)?;
    let stats = AggregateStats::from_facts(&facts);
    store.update_department_stats(id, &stats)?;
    Ok(stats)
}

/// Recompute and persist the counters of one territory, scoped over every
/// outplanting in its departments.
pub fn recompute_territory(
    store: &Store,
    id: TerritoryId,
    exclude: Option<OutplantingId>,
) -> Result<AggregateStats, EngineError> {
    let facts = store.outplanting_facts_for_territory(id, exclude)?;
    let stats = AggregateStats::from_facts(&facts);
    store.update_territory_stats(id, &stats)?;
    Ok(stats)
}
