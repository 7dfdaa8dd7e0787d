//! Recomputation of cached display and identifier strings.
//!
//! Each function loads the entity plus the immediate related rows its
//! formula needs, evaluates the pure formula on the core type and persists
//! the result. A dangling required reference fails with
//! [`EngineError::MissingReference`] so the enclosing transaction rolls
//! back without partial state.

use crate::core::{DepartmentId, EntityKind, FamilyId, GardenId, IndividualId, SpeciesId, TerritoryId};
use crate::store::Store;

use super::EngineError;

fn missing(entity: EntityKind, id: i64, context: &'static str) -> EngineError {
    EngineError::MissingReference {
        entity,
        id,
        context,
    }
}

/// Refresh `full_name_generated`, `num_orders_generated` and
/// `catalog_date_generated` of one garden.
pub fn recompute_garden(store: &Store, id: GardenId) -> Result<(), EngineError> {
    let garden = store.garden(id)?;
    let num_orders = store.count_unprocessed_orders(id)?;
    let catalog_date = store.latest_catalog_date(id)?;
    store.update_garden_generated(id, &garden.full_name(), num_orders, catalog_date)?;
    Ok(())
}

pub fn recompute_family(store: &Store, id: FamilyId) -> Result<(), EngineError> {
    let family = store.family(id)?;
    store.update_family_full_name(id, &family.full_name())?;
    Ok(())
}

pub fn recompute_species(store: &Store, id: SpeciesId) -> Result<(), EngineError> {
    let species = store.species(id)?;
    let family = store
        .family_opt(species.family)?
        .ok_or_else(|| missing(EntityKind::Family, species.family.get(), "species.family"))?;
    store.update_species_full_name(id, &species.full_name(&family.genus, true))?;
    Ok(())
}

pub fn recompute_territory_name(store: &Store, id: TerritoryId) -> Result<(), EngineError> {
    let territory = store.territory(id)?;
    store.update_territory_name(id, &territory.display_name())?;
    Ok(())
}

/// Refresh a department's `full_code` from the configured template.
/// Returns the new code so callers can detect a change.
pub fn recompute_department_full_code(
    store: &Store,
    id: DepartmentId,
    template: &[String],
) -> Result<String, EngineError> {
    let department = store.department(id)?;
    let territory_code = match department.territory {
        Some(territory_id) => {
            let territory = store.territory_opt(territory_id)?.ok_or_else(|| {
                missing(
                    EntityKind::Territory,
                    territory_id.get(),
                    "department.territory",
                )
            })?;
            Some(territory.code)
        }
        None => None,
    };
    let full_code = department.compose_full_code(template, territory_code.as_deref());
    store.update_department_full_code(id, &full_code)?;
    Ok(full_code)
}

/// Refresh `ipen_generated` and `id_name_generated` of one individual.
pub fn recompute_individual_identity(store: &Store, id: IndividualId) -> Result<(), EngineError> {
    let mut individual = store.individual(id)?;
    let species = store
        .species_opt(individual.species)?
        .ok_or_else(|| missing(EntityKind::Species, individual.species.get(), "individual.species"))?;
    let family = store
        .family_opt(species.family)?
        .ok_or_else(|| missing(EntityKind::Family, species.family.get(), "species.family"))?;
    let garden = store.garden_opt(individual.ipen_garden)?.ok_or_else(|| {
        missing(
            EntityKind::Garden,
            individual.ipen_garden.get(),
            "individual.ipen_garden",
        )
    })?;
    // an IPEN code cannot be formed for a garden without a code
    let garden_code = garden.code.as_deref().ok_or_else(|| {
        missing(
            EntityKind::Garden,
            individual.ipen_garden.get(),
            "individual.ipen_garden.code",
        )
    })?;

    individual.ipen_generated = individual.ipen_code(garden_code);
    individual.id_name_generated = individual.id_name(&species.full_name(&family.genus, false));
    store.update_individual_generated(&individual)?;
    Ok(())
}

/// Refresh the outplanting summary fields of one individual.
pub fn recompute_individual_placements(
    store: &Store,
    id: IndividualId,
) -> Result<(), EngineError> {
    let mut individual = store.individual(id)?;
    let placements = store.placements_for_individual(id)?;
    individual.apply_placements(&placements);
    store.update_individual_generated(&individual)?;
    Ok(())
}
