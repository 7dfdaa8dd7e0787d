//! Dependency-aware save/delete cascades.
//!
//! Every top-level trigger runs inside one `BEGIN IMMEDIATE` transaction:
//! the module-level functions open it, walk the dependency graph through a
//! [`Cascade`] and commit. Any failure rolls the whole trigger back.
//!
//! Declared edges:
//! - Outplanting save/delete -> Department counters -> Territory counters,
//!   and -> Individual placement cache.
//! - Department save -> own full_code + counters, old and new Territory
//!   counters; full_code change -> placement caches of affected individuals.
//! - Territory save (code change) -> full_code of every department in it.
//! - Family save -> every Species -> every Individual identity.
//! - OutgoingOrder/ExternalCatalog save/delete -> owning garden.
//!
//! The graph is a DAG; the visited set only guards against recomputing the
//! same node twice when fan-outs converge.

use std::collections::HashSet;

use crate::config::Config;
use crate::core::{
    BotanicGarden, CatalogId, Department, DepartmentId, EntityKind, ExternalCatalog, Family,
    FamilyId, GardenId, Individual, IndividualId, OrderId, OutgoingOrder, Outplanting,
    OutplantingId, Species, SpeciesId, Territory, TerritoryId,
};
use crate::store::Store;

use super::{aggregate, generated, EngineError};

/// One cascade walk: recompute steps check in here before running so that
/// converging fan-outs do not revisit a node.
struct Cascade<'a> {
    store: &'a Store,
    visited: HashSet<(EntityKind, i64)>,
}

impl<'a> Cascade<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self {
            store,
            visited: HashSet::new(),
        }
    }

    fn first_visit(&mut self, kind: EntityKind, id: i64) -> bool {
        self.visited.insert((kind, id))
    }

    // -- recompute steps --

    fn garden_refresh(&mut self, id: GardenId) -> Result<(), EngineError> {
        if self.first_visit(EntityKind::Garden, id.get()) {
            generated::recompute_garden(self.store, id)?;
        }
        Ok(())
    }

    fn department_counters(
        &mut self,
        id: DepartmentId,
        exclude: Option<OutplantingId>,
    ) -> Result<(), EngineError> {
        if self.first_visit(EntityKind::Department, id.get()) {
            aggregate::recompute_department(self.store, id, exclude)?;
        }
        Ok(())
    }

    fn territory_counters(
        &mut self,
        id: TerritoryId,
        exclude: Option<OutplantingId>,
    ) -> Result<(), EngineError> {
        if self.first_visit(EntityKind::Territory, id.get()) {
            aggregate::recompute_territory(self.store, id, exclude)?;
        }
        Ok(())
    }

    fn individual_placements(&mut self, id: IndividualId) -> Result<(), EngineError> {
        if self.first_visit(EntityKind::Individual, id.get()) {
            generated::recompute_individual_placements(self.store, id)?;
        }
        Ok(())
    }

    fn individual_identity(&mut self, id: IndividualId) -> Result<(), EngineError> {
        if self.first_visit(EntityKind::Individual, id.get()) {
            generated::recompute_individual_identity(self.store, id)?;
        }
        Ok(())
    }

    fn species_refresh(&mut self, id: SpeciesId) -> Result<(), EngineError> {
        if self.first_visit(EntityKind::Species, id.get()) {
            generated::recompute_species(self.store, id)?;
            for individual in self.store.individual_ids_of_species(id)? {
                self.individual_identity(individual)?;
            }
        }
        Ok(())
    }

    fn department_full_code_refresh(
        &mut self,
        id: DepartmentId,
        template: &[String],
    ) -> Result<(), EngineError> {
        if !self.first_visit(EntityKind::Department, id.get()) {
            return Ok(());
        }
        let before = self.store.department(id)?.full_code;
        let after = generated::recompute_department_full_code(self.store, id, template)?;
        if before != after {
            for individual in self.store.individual_ids_outplanted_in_department(id)? {
                self.individual_placements(individual)?;
            }
        }
        Ok(())
    }

    fn outplanting_location(
        &mut self,
        department: Option<DepartmentId>,
        exclude: Option<OutplantingId>,
    ) -> Result<(), EngineError> {
        let Some(department_id) = department else {
            return Ok(());
        };
        self.department_counters(department_id, exclude)?;
        if let Some(territory_id) = self.store.department(department_id)?.territory {
            self.territory_counters(territory_id, exclude)?;
        }
        Ok(())
    }
}

// -- top-level triggers --

/// Save a garden and refresh its generated columns. The code is uppercased
/// and an empty code becomes NULL before persisting.
pub fn save_garden(store: &Store, garden: &mut BotanicGarden) -> Result<GardenId, EngineError> {
    let txn = store.begin()?;
    let id = {
        garden.normalize_code();
        let id = txn.save_garden(garden)?;
        let mut cascade = Cascade::new(&txn);
        cascade.garden_refresh(id)?;
        id
    };
    txn.commit()?;
    Ok(id)
}

pub fn save_outgoing_order(store: &Store, order: &mut OutgoingOrder) -> Result<OrderId, EngineError> {
    let txn = store.begin()?;
    let id = {
        let id = txn.save_order(order)?;
        let mut cascade = Cascade::new(&txn);
        cascade.garden_refresh(order.garden)?;
        id
    };
    txn.commit()?;
    Ok(id)
}

pub fn delete_outgoing_order(store: &Store, id: OrderId) -> Result<(), EngineError> {
    let txn = store.begin()?;
    {
        let order = txn.order_opt(id)?.ok_or(crate::store::StoreError::NotFound {
            entity: EntityKind::OutgoingOrder,
            id: id.get(),
        })?;
        txn.delete_order(id)?;
        let mut cascade = Cascade::new(&txn);
        cascade.garden_refresh(order.garden)?;
    }
    txn.commit()?;
    Ok(())
}

pub fn save_external_catalog(
    store: &Store,
    catalog: &mut ExternalCatalog,
) -> Result<CatalogId, EngineError> {
    let txn = store.begin()?;
    let id = {
        let id = txn.save_catalog(catalog)?;
        let mut cascade = Cascade::new(&txn);
        cascade.garden_refresh(catalog.garden)?;
        id
    };
    txn.commit()?;
    Ok(id)
}

pub fn delete_external_catalog(store: &Store, id: CatalogId) -> Result<(), EngineError> {
    let txn = store.begin()?;
    {
        let catalog = txn
            .catalog_opt(id)?
            .ok_or(crate::store::StoreError::NotFound {
                entity: EntityKind::ExternalCatalog,
                id: id.get(),
            })?;
        txn.delete_catalog(id)?;
        let mut cascade = Cascade::new(&txn);
        cascade.garden_refresh(catalog.garden)?;
    }
    txn.commit()?;
    Ok(())
}

/// Save a family and refresh every species and individual downstream of it.
pub fn save_family(store: &Store, family: &mut Family) -> Result<FamilyId, EngineError> {
    let txn = store.begin()?;
    let id = {
        let id = txn.save_family(family)?;
        generated::recompute_family(&txn, id)?;
        let mut cascade = Cascade::new(&txn);
        cascade.visited.insert((EntityKind::Family, id.get()));
        for species in txn.species_ids_in_family(id)? {
            cascade.species_refresh(species)?;
        }
        id
    };
    txn.commit()?;
    Ok(id)
}

pub fn save_species(store: &Store, species: &mut Species) -> Result<SpeciesId, EngineError> {
    let txn = store.begin()?;
    let id = {
        let id = txn.save_species(species)?;
        let mut cascade = Cascade::new(&txn);
        cascade.species_refresh(id)?;
        id
    };
    txn.commit()?;
    Ok(id)
}

/// Save a territory; a code change refreshes the full code of every
/// department in it (and through those, affected placement caches).
pub fn save_territory(
    store: &Store,
    config: &Config,
    territory: &mut Territory,
) -> Result<TerritoryId, EngineError> {
    let txn = store.begin()?;
    let id = {
        let old_code = match territory.id {
            Some(id) => txn.territory_opt(id)?.map(|t| t.code),
            None => None,
        };
        let id = txn.save_territory(territory)?;
        generated::recompute_territory_name(&txn, id)?;
        let mut cascade = Cascade::new(&txn);
        cascade.territory_counters(id, None)?;
        if old_code.as_deref() != Some(territory.code.as_str()) {
            for department in txn.department_ids_in_territory(id)? {
                cascade.department_full_code_refresh(department, &config.department_full_code)?;
            }
        }
        id
    };
    txn.commit()?;
    Ok(id)
}

/// Save a department: refresh its full code and counters, the old and new
/// territory counters, and, when the full code changed, the placement cache
/// of every individual planted here.
pub fn save_department(
    store: &Store,
    config: &Config,
    department: &mut Department,
) -> Result<DepartmentId, EngineError> {
    let txn = store.begin()?;
    let id = {
        let old = match department.id {
            Some(id) => txn.department_opt(id)?,
            None => None,
        };
        let id = txn.save_department(department)?;

        let mut cascade = Cascade::new(&txn);
        cascade.visited.insert((EntityKind::Department, id.get()));
        let old_full_code = old.as_ref().map(|d| d.full_code.clone()).unwrap_or_default();
        let full_code =
            generated::recompute_department_full_code(&txn, id, &config.department_full_code)?;
        aggregate::recompute_department(&txn, id, None)?;

        if let Some(territory) = department.territory {
            cascade.territory_counters(territory, None)?;
        }
        if let Some(old_territory) = old.as_ref().and_then(|d| d.territory) {
            cascade.territory_counters(old_territory, None)?;
        }
        if full_code != old_full_code {
            for individual in txn.individual_ids_outplanted_in_department(id)? {
                cascade.individual_placements(individual)?;
            }
        }
        id
    };
    txn.commit()?;
    Ok(id)
}

/// Save an individual. Uniqueness violations on the generated numbers
/// surface before any cascade work happens.
pub fn save_individual(
    store: &Store,
    individual: &mut Individual,
) -> Result<IndividualId, EngineError> {
    let txn = store.begin()?;
    let id = {
        let id = txn.save_individual(individual)?;
        generated::recompute_individual_identity(&txn, id)?;
        id
    };
    txn.commit()?;
    Ok(id)
}

pub fn save_outplanting(
    store: &Store,
    outplanting: &mut Outplanting,
) -> Result<OutplantingId, EngineError> {
    let txn = store.begin()?;
    let id = {
        let old = match outplanting.id {
            Some(id) => txn.outplanting_opt(id)?,
            None => None,
        };
        let id = txn.save_outplanting(outplanting)?;

        let mut cascade = Cascade::new(&txn);
        cascade.outplanting_location(outplanting.department, None)?;
        // a moved outplanting leaves stale counters behind
        if let Some(old) = old {
            if old.department != outplanting.department {
                cascade.outplanting_location(old.department, None)?;
            }
        }
        cascade.individual_placements(outplanting.individual)?;
        id
    };
    txn.commit()?;
    Ok(id)
}

/// Delete an outplanting: counters are recomputed with the row excluded
/// before it goes away, then the individual's placement cache follows.
pub fn delete_outplanting(store: &Store, id: OutplantingId) -> Result<(), EngineError> {
    let txn = store.begin()?;
    {
        let outplanting = txn.outplanting(id)?;
        let mut cascade = Cascade::new(&txn);
        cascade.outplanting_location(outplanting.department, Some(id))?;
        txn.delete_outplanting(id)?;
        cascade.individual_placements(outplanting.individual)?;
    }
    txn.commit()?;
    Ok(())
}

/// Delete an individual together with its outplantings, then refresh the
/// counters of every location it was planted in.
pub fn delete_individual(store: &Store, id: IndividualId) -> Result<(), EngineError> {
    let txn = store.begin()?;
    {
        let departments = txn.department_ids_of_individual(id)?;
        txn.delete_individual(id)?;
        let mut cascade = Cascade::new(&txn);
        for department in departments {
            cascade.outplanting_location(Some(department), None)?;
        }
    }
    txn.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn config() -> Config {
        Config::default()
    }

    struct Fixture {
        store: Store,
        territory: Territory,
        department: Department,
        individual: Individual,
    }

    fn fixture() -> Fixture {
        let store = Store::open_in_memory().unwrap();
        let cfg = config();
        let mut family = Family::new("Rosaceae", "Rosa");
        save_family(&store, &mut family).unwrap();
        let mut species = Species::new(family.id.unwrap(), "canina");
        save_species(&store, &mut species).unwrap();
        let mut garden = BotanicGarden::new(1, Some("g1"), "Home");
        save_garden(&store, &mut garden).unwrap();
        let mut territory = Territory::new("T1", "North");
        save_territory(&store, &cfg, &mut territory).unwrap();
        let mut department = Department::new(territory.id, "D1", "Alpinum");
        save_department(&store, &cfg, &mut department).unwrap();
        let mut individual = Individual::new(42, 1000, species.id.unwrap(), garden.id.unwrap());
        individual.ipen_country = "au".into();
        individual.ipen_transfer_restricted = "0".into();
        individual.ipen_accession_number = "42".into();
        save_individual(&store, &mut individual).unwrap();
        Fixture {
            store,
            territory,
            department,
            individual,
        }
    }

    fn outplant(fx: &Fixture, died: Option<time::Date>) -> Outplanting {
        let mut outplanting = Outplanting::new(fx.department.id, fx.individual.id.unwrap());
        outplanting.plant_died = died;
        save_outplanting(&fx.store, &mut outplanting).unwrap();
        outplanting
    }

    #[test]
    fn garden_save_normalizes_and_generates() {
        let fx = fixture();
        let garden = fx.store.garden(fx.individual.ipen_garden).unwrap();
        assert_eq!(garden.code.as_deref(), Some("G1"));
        assert_eq!(garden.full_name_generated, "1 (G1/Home)");
    }

    #[test]
    fn outplanting_save_updates_counters_and_cache() {
        let fx = fixture();
        outplant(&fx, None);
        outplant(&fx, None);
        outplant(&fx, Some(date!(2020 - 01 - 01)));

        let department = fx.store.department(fx.department.id.unwrap()).unwrap();
        assert_eq!(department.stats.num_outplantings, 3);
        assert_eq!(department.stats.num_outplantings_alive, 2);
        let territory = fx.store.territory(fx.territory.id.unwrap()).unwrap();
        assert_eq!(territory.stats.num_outplantings, 3);

        let individual = fx.store.individual(fx.individual.id.unwrap()).unwrap();
        assert_eq!(individual.outplantings_generated.len(), 3);
        assert_eq!(individual.alive_outplantings_generated.len(), 2);
        assert_eq!(individual.departments_generated, "T1-D1");
        assert_eq!(individual.territories_generated, "(T1)");
        assert!(individual.is_alive_generated);
    }

    #[test]
    fn deleting_the_dead_outplanting_recounts() {
        let fx = fixture();
        outplant(&fx, None);
        outplant(&fx, None);
        let dead = outplant(&fx, Some(date!(2020 - 01 - 01)));

        delete_outplanting(&fx.store, dead.id.unwrap()).unwrap();
        let department = fx.store.department(fx.department.id.unwrap()).unwrap();
        assert_eq!(department.stats.num_outplantings, 2);
        assert_eq!(department.stats.num_outplantings_alive, 2);

        let individual = fx.store.individual(fx.individual.id.unwrap()).unwrap();
        assert_eq!(individual.outplantings_generated.len(), 2);
    }

    #[test]
    fn territory_code_change_reaches_individual_caches() {
        let fx = fixture();
        outplant(&fx, None);

        let mut territory = fx.store.territory(fx.territory.id.unwrap()).unwrap();
        territory.code = "T9".into();
        save_territory(&fx.store, &config(), &mut territory).unwrap();

        let department = fx.store.department(fx.department.id.unwrap()).unwrap();
        assert_eq!(department.full_code, "T9-D1");
        let individual = fx.store.individual(fx.individual.id.unwrap()).unwrap();
        assert_eq!(individual.departments_generated, "T9-D1");
        assert_eq!(individual.territories_generated, "(T9)");
        assert_eq!(
            fx.store.territory(fx.territory.id.unwrap()).unwrap().name_generated,
            "T9 (North)"
        );
    }

    #[test]
    fn department_move_recounts_both_territories() {
        let fx = fixture();
        outplant(&fx, None);
        let cfg = config();
        let mut other = Territory::new("T2", "South");
        save_territory(&fx.store, &cfg, &mut other).unwrap();

        let mut department = fx.store.department(fx.department.id.unwrap()).unwrap();
        department.territory = other.id;
        save_department(&fx.store, &cfg, &mut department).unwrap();

        let old = fx.store.territory(fx.territory.id.unwrap()).unwrap();
        assert_eq!(old.stats.num_outplantings, 0);
        let new = fx.store.territory(other.id.unwrap()).unwrap();
        assert_eq!(new.stats.num_outplantings, 1);
        assert_eq!(
            fx.store.department(fx.department.id.unwrap()).unwrap().full_code,
            "T2-D1"
        );
        assert_eq!(
            fx.store.individual(fx.individual.id.unwrap()).unwrap().departments_generated,
            "T2-D1"
        );
    }

    #[test]
    fn family_save_cascades_to_individual_names() {
        let fx = fixture();
        let species = fx.store.species(fx.individual.species).unwrap();
        let mut family = fx.store.family(species.family).unwrap();
        family.genus = "Rubus".into();
        save_family(&fx.store, &mut family).unwrap();

        assert_eq!(
            fx.store.species(fx.individual.species).unwrap().full_name_generated,
            "Rubus canina"
        );
        assert_eq!(
            fx.store.individual(fx.individual.id.unwrap()).unwrap().id_name_generated,
            "42 (Rubus canina)"
        );
    }

    #[test]
    fn duplicate_accession_number_fails_before_cascading() {
        let fx = fixture();
        let mut duplicate = Individual::new(
            42,
            1001,
            fx.individual.species,
            fx.individual.ipen_garden,
        );
        let err = save_individual(&fx.store, &mut duplicate).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Store(crate::store::StoreError::Constraint {
                field: "accession_number",
                ..
            })
        ));
        assert_eq!(fx.store.individual_ids().unwrap().len(), 1);
    }

    #[test]
    fn missing_reference_rolls_back_the_whole_cascade() {
        let fx = fixture();
        // a partner garden without an IPEN code makes identity recompute fail
        let mut codeless = BotanicGarden::new(2, None, "Partner");
        save_garden(&fx.store, &mut codeless).unwrap();
        let mut broken = Individual::new(77, 1077, fx.individual.species, codeless.id.unwrap());
        let err = save_individual(&fx.store, &mut broken);
        assert!(err.is_err());
        // nothing persisted, not even the individual row itself
        assert_eq!(fx.store.individual_ids().unwrap().len(), 1);

        // and a species save that reaches the broken individual leaves the
        // species name untouched too
        let before = fx.store.species(fx.individual.species).unwrap();
        let mut species = before.clone();
        species.species = "dumalis".into();
        // make the existing individual unrecomputable by pulling the garden code
        let mut garden = fx.store.garden(fx.individual.ipen_garden).unwrap();
        garden.code = None;
        fx.store.save_garden(&mut garden).unwrap();
        assert!(save_species(&fx.store, &mut species).is_err());
        assert_eq!(
            fx.store.species(fx.individual.species).unwrap().species,
            before.species
        );
    }

    #[test]
    fn deleting_an_individual_recounts_its_departments() {
        let fx = fixture();
        outplant(&fx, None);
        delete_individual(&fx.store, fx.individual.id.unwrap()).unwrap();

        assert!(fx.store.outplanting_ids().unwrap().is_empty());
        let department = fx.store.department(fx.department.id.unwrap()).unwrap();
        assert_eq!(department.stats.num_outplantings, 0);
        let territory = fx.store.territory(fx.territory.id.unwrap()).unwrap();
        assert_eq!(territory.stats.num_outplantings, 0);
    }

    #[test]
    fn orders_and_catalogs_refresh_the_garden() {
        let fx = fixture();
        let garden_id = fx.individual.ipen_garden;
        let mut order = OutgoingOrder::new(garden_id, date!(2021 - 01 - 01), "seeds");
        save_outgoing_order(&fx.store, &mut order).unwrap();
        assert_eq!(fx.store.garden(garden_id).unwrap().num_orders_generated, 1);

        delete_outgoing_order(&fx.store, order.id.unwrap()).unwrap();
        assert_eq!(fx.store.garden(garden_id).unwrap().num_orders_generated, 0);

        let mut catalog = ExternalCatalog::new(garden_id, date!(2022 - 05 - 01));
        save_external_catalog(&fx.store, &mut catalog).unwrap();
        assert_eq!(
            fx.store.garden(garden_id).unwrap().catalog_date_generated,
            Some(date!(2022 - 05 - 01))
        );

        delete_external_catalog(&fx.store, catalog.id.unwrap()).unwrap();
        assert_eq!(
            fx.store.garden(garden_id).unwrap().catalog_date_generated,
            None
        );
    }
}
