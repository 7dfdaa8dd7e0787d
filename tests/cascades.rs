//! End-to-end cascade behavior through the public API.

mod fixtures;

use botgard::engine::cascade;
use botgard::{AggregateStats, EngineError, Individual, Outplanting, StoreError};
use fixtures::Inventory;
use time::macros::date;

#[test]
fn a_fresh_fixture_is_fully_generated() {
    let inv = Inventory::new();

    let garden = inv.store.garden(inv.garden.id.unwrap()).unwrap();
    assert_eq!(garden.full_name_generated, "1 (G1/Home garden)");

    let species = inv.store.species(inv.species.id.unwrap()).unwrap();
    assert_eq!(species.full_name_generated, "Rosa canina L.");

    let department = inv.store.department(inv.department_id()).unwrap();
    assert_eq!(department.full_code, "T1-D1");

    let individual = inv.store.individual(inv.individual_id()).unwrap();
    assert_eq!(individual.ipen_generated, "AU-0-G1-42");
    assert_eq!(individual.id_name_generated, "42 (Rosa canina)");
    assert!(!individual.is_alive_generated);
}

#[test]
fn counters_follow_outplantings_up_both_levels() {
    let inv = Inventory::new();
    inv.outplant(None);
    inv.outplant(None);
    inv.outplant(Some(date!(2020 - 06 - 01)));

    let department = inv.store.department(inv.department_id()).unwrap();
    assert_eq!(department.stats.num_outplantings, 3);
    assert_eq!(department.stats.num_outplantings_alive, 2);
    assert_eq!(department.stats.num_individuals, 1);
    assert_eq!(department.stats.num_individuals_alive, 1);

    let territory = inv.store.territory(inv.territory_id()).unwrap();
    assert_eq!(territory.stats, department.stats);

    let individual = inv.store.individual(inv.individual_id()).unwrap();
    assert_eq!(individual.outplantings_generated.len(), 3);
    assert_eq!(individual.alive_outplantings_generated.len(), 2);
    assert!(individual.is_alive_generated);
    assert_eq!(individual.departments_generated, "T1-D1");
    assert_eq!(individual.territories_generated, "(T1)");
}

#[test]
fn deleting_an_outplanting_counts_as_if_it_never_existed() {
    let inv = Inventory::new();
    inv.outplant(None);
    inv.outplant(None);
    let dead = inv.outplant(Some(date!(2020 - 06 - 01)));

    cascade::delete_outplanting(&inv.store, dead).unwrap();

    // same state as a fixture that only ever had the two living outplantings
    let control = Inventory::new();
    control.outplant(None);
    control.outplant(None);

    let department = inv.store.department(inv.department_id()).unwrap();
    let expected = control.store.department(control.department_id()).unwrap();
    assert_eq!(department.stats, expected.stats);
    assert_eq!(department.stats.num_outplantings, 2);
    assert_eq!(department.stats.num_outplantings_alive, 2);

    let individual = inv.store.individual(inv.individual_id()).unwrap();
    assert_eq!(individual.outplantings_generated.len(), 2);
}

#[test]
fn renaming_a_territory_ripples_to_placement_caches() {
    let inv = Inventory::new();
    inv.outplant(None);

    let mut territory = inv.store.territory(inv.territory_id()).unwrap();
    territory.code = "T7".into();
    cascade::save_territory(&inv.store, &inv.config, &mut territory).unwrap();

    assert_eq!(
        inv.store.department(inv.department_id()).unwrap().full_code,
        "T7-D1"
    );
    let individual = inv.store.individual(inv.individual_id()).unwrap();
    assert_eq!(individual.departments_generated, "T7-D1");
    assert_eq!(individual.territories_generated, "(T7)");
}

#[test]
fn moving_an_outplanting_refreshes_the_department_it_left() {
    let inv = Inventory::new();
    let id = inv.outplant(None);
    let mut other = botgard::Department::new(inv.territory.id, "D2", "Rockery");
    cascade::save_department(&inv.store, &inv.config, &mut other).unwrap();

    let mut outplanting = inv.store.outplanting(id).unwrap();
    outplanting.department = other.id;
    cascade::save_outplanting(&inv.store, &mut outplanting).unwrap();

    let old = inv.store.department(inv.department_id()).unwrap();
    assert_eq!(old.stats, AggregateStats::default());
    let new = inv.store.department(other.id.unwrap()).unwrap();
    assert_eq!(new.stats.num_outplantings, 1);

    let individual = inv.store.individual(inv.individual_id()).unwrap();
    assert_eq!(individual.departments_generated, "T1-D2");
}

#[test]
fn deleting_an_individual_takes_its_outplantings_along() {
    let inv = Inventory::new();
    inv.outplant(None);
    inv.outplant(Some(date!(2019 - 03 - 01)));

    cascade::delete_individual(&inv.store, inv.individual_id()).unwrap();

    assert!(inv.store.outplanting_ids().unwrap().is_empty());
    let department = inv.store.department(inv.department_id()).unwrap();
    assert_eq!(department.stats, AggregateStats::default());
    let territory = inv.store.territory(inv.territory_id()).unwrap();
    assert_eq!(territory.stats, AggregateStats::default());
}

#[test]
fn duplicate_numbers_are_rejected_without_side_effects() {
    let inv = Inventory::new();

    let mut same_accession = Individual::new(
        42,
        2000,
        inv.species.id.unwrap(),
        inv.garden.id.unwrap(),
    );
    let err = cascade::save_individual(&inv.store, &mut same_accession).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Store(StoreError::Constraint {
            field: "accession_number",
            ..
        })
    ));

    let mut same_order = Individual::new(
        43,
        1000,
        inv.species.id.unwrap(),
        inv.garden.id.unwrap(),
    );
    let err = cascade::save_individual(&inv.store, &mut same_order).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Store(StoreError::Constraint {
            field: "order_number",
            ..
        })
    ));

    assert_eq!(inv.store.individual_ids().unwrap().len(), 1);
}

#[test]
fn seed_availability_is_queryable() {
    let inv = Inventory::new();
    let with_seed = inv.add_individual(43, 1001);
    let mut individual = inv.store.individual(with_seed).unwrap();
    individual.seed_available = true;
    individual.seed_in_stock = true;
    cascade::save_individual(&inv.store, &mut individual).unwrap();

    assert_eq!(
        inv.store.individuals_with_seed_available().unwrap(),
        vec![with_seed]
    );
}

#[test]
fn an_outplanting_without_a_department_still_counts_for_the_individual() {
    let inv = Inventory::new();
    let mut homeless = Outplanting::new(None, inv.individual_id());
    cascade::save_outplanting(&inv.store, &mut homeless).unwrap();

    let individual = inv.store.individual(inv.individual_id()).unwrap();
    assert_eq!(individual.outplantings_generated.len(), 1);
    assert!(individual.is_alive_generated);
    assert_eq!(individual.departments_generated, "");
    assert_eq!(individual.territories_generated, "");

    // no department, nothing to count
    let department = inv.store.department(inv.department_id()).unwrap();
    assert_eq!(department.stats, AggregateStats::default());
}
