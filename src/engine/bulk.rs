//! Whole-table maintenance jobs.
//!
//! Every job walks its id list in chunks of [`BATCH_SIZE`], one write
//! transaction per chunk. Inside a chunk each row runs under a savepoint:
//! a failing row is rolled back and recorded in the [`BulkReport`] while
//! the rest of the chunk goes through.

use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::core::EntityKind;
use crate::store::Store;

use super::{aggregate, generated, EngineError};

/// Rows per write transaction during bulk jobs.
pub const BATCH_SIZE: usize = 500;

/// One row that a bulk job could not process.
#[derive(Debug, Serialize)]
pub struct RowFailure {
    pub entity: EntityKind,
    pub id: i64,
    pub error: String,
}

/// Outcome of a bulk job. Failures never abort the job.
#[derive(Debug, Default, Serialize)]
pub struct BulkReport {
    pub processed: usize,
    pub failed: usize,
    pub failures: Vec<RowFailure>,
}

impl BulkReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    fn absorb(&mut self, other: BulkReport) {
        self.processed += other.processed;
        self.failed += other.failed;
        self.failures.extend(other.failures);
    }
}

fn run_batched<T: Copy>(
    store: &Store,
    entity: EntityKind,
    ids: &[T],
    key: impl Fn(T) -> i64,
    mut step: impl FnMut(&Store, T) -> Result<(), EngineError>,
) -> Result<BulkReport, EngineError> {
    let started = Instant::now();
    let mut report = BulkReport::default();
    for chunk in ids.chunks(BATCH_SIZE) {
        let txn = store.begin()?;
        for &id in chunk {
            txn.savepoint("bulk_row")?;
            match step(&txn, id) {
                Ok(()) => {
                    txn.release_savepoint("bulk_row")?;
                    report.processed += 1;
                }
                Err(err) => {
                    txn.rollback_savepoint("bulk_row")?;
                    report.failed += 1;
                    report.failures.push(RowFailure {
                        entity,
                        id: key(id),
                        error: err.to_string(),
                    });
                }
            }
        }
        txn.commit()?;
    }
    info!(
        kind = entity.as_str(),
        processed = report.processed,
        failed = report.failed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "bulk pass done"
    );
    Ok(report)
}

fn clean(value: &str) -> String {
    value.trim().replace('\t', " ")
}

fn clean_in_place(value: &mut String) -> bool {
    let cleaned = clean(value);
    if cleaned == *value {
        false
    } else {
        *value = cleaned;
        true
    }
}

fn clean_opt_in_place(value: &mut Option<String>) -> bool {
    match value {
        Some(v) => clean_in_place(v),
        None => false,
    }
}

/// Trim leading/trailing whitespace and replace tabs with spaces in every
/// hand-entered text column. A changed row also refreshes its own generated
/// columns; downstream rows are left to the recalculation passes. Rows whose
/// cleaned value collides with a uniqueness constraint are recorded and
/// skipped.
pub fn strip_whitespace(store: &Store, config: &Config) -> Result<BulkReport, EngineError> {
    let mut report = BulkReport::default();

    let ids = store.garden_ids()?;
    report.absorb(run_batched(
        store,
        EntityKind::Garden,
        &ids,
        |id| id.get(),
        |store, id| {
            let mut garden = store.garden(id)?;
            let mut changed = clean_opt_in_place(&mut garden.code);
            changed |= clean_in_place(&mut garden.name);
            if changed {
                store.save_garden(&mut garden)?;
                generated::recompute_garden(store, id)?;
            }
            Ok(())
        },
    )?);

    let ids = store.territory_ids()?;
    report.absorb(run_batched(
        store,
        EntityKind::Territory,
        &ids,
        |id| id.get(),
        |store, id| {
            let mut territory = store.territory(id)?;
            let mut changed = clean_in_place(&mut territory.code);
            changed |= clean_in_place(&mut territory.name);
            if changed {
                store.save_territory(&mut territory)?;
                generated::recompute_territory_name(store, id)?;
            }
            Ok(())
        },
    )?);

    let ids = store.department_ids()?;
    report.absorb(run_batched(
        store,
        EntityKind::Department,
        &ids,
        |id| id.get(),
        |store, id| {
            let mut department = store.department(id)?;
            let mut changed = clean_in_place(&mut department.code);
            changed |= clean_in_place(&mut department.name);
            if changed {
                store.save_department(&mut department)?;
                generated::recompute_department_full_code(
                    store,
                    id,
                    &config.department_full_code,
                )?;
            }
            Ok(())
        },
    )?);

    let ids = store.family_ids()?;
    report.absorb(run_batched(
        store,
        EntityKind::Family,
        &ids,
        |id| id.get(),
        |store, id| {
            let mut family = store.family(id)?;
            let mut changed = false;
            for field in [
                &mut family.family,
                &mut family.subfamily,
                &mut family.tribus,
                &mut family.subtribus,
                &mut family.genus,
                &mut family.genus_author,
            ] {
                changed |= clean_in_place(field);
            }
            if changed {
                store.save_family(&mut family)?;
                generated::recompute_family(store, id)?;
            }
            Ok(())
        },
    )?);

    let ids = store.species_ids()?;
    report.absorb(run_batched(
        store,
        EntityKind::Species,
        &ids,
        |id| id.get(),
        |store, id| {
            let mut species = store.species(id)?;
            let mut changed = false;
            for field in [
                &mut species.species,
                &mut species.species_author,
                &mut species.subspecies,
                &mut species.subspecies_author,
                &mut species.variety,
                &mut species.variety_author,
                &mut species.form,
                &mut species.form_author,
                &mut species.cultivar,
            ] {
                changed |= clean_in_place(field);
            }
            if changed {
                store.save_species(&mut species)?;
                generated::recompute_species(store, id)?;
            }
            Ok(())
        },
    )?);

    let ids = store.individual_ids()?;
    report.absorb(run_batched(
        store,
        EntityKind::Individual,
        &ids,
        |id| id.get(),
        |store, id| {
            let mut individual = store.individual(id)?;
            let mut changed = clean_in_place(&mut individual.ipen_country);
            changed |= clean_in_place(&mut individual.ipen_transfer_restricted);
            changed |= clean_in_place(&mut individual.ipen_accession_number);
            if changed {
                store.save_individual(&mut individual)?;
                generated::recompute_individual_identity(store, id)?;
            }
            Ok(())
        },
    )?);

    Ok(report)
}

/// Legacy data carries the territory inside the department code, as
/// `"<territory>-<code>"`. For every such department whose territory part
/// names an existing territory: link it, keep only the bare code and
/// refresh the full code. Departments with an unknown territory part are
/// left untouched.
pub fn assign_territory(store: &Store, config: &Config) -> Result<BulkReport, EngineError> {
    let ids = store.department_ids()?;
    run_batched(
        store,
        EntityKind::Department,
        &ids,
        |id| id.get(),
        |store, id| {
            let mut department = store.department(id)?;
            if !department.code.contains('-') {
                return Ok(());
            }
            let mut parts = department.code.split('-');
            let territory_code = parts.next().unwrap_or_default();
            let bare_code = parts.next().unwrap_or_default().to_owned();
            let Some(territory) = store.territory_by_code(territory_code)? else {
                return Ok(());
            };
            department.territory = territory.id;
            department.code = bare_code;
            store.save_department(&mut department)?;
            generated::recompute_department_full_code(store, id, &config.department_full_code)?;
            Ok(())
        },
    )
}

/// Recompute every garden's generated columns.
pub fn recalc_gardens(store: &Store) -> Result<BulkReport, EngineError> {
    let ids = store.garden_ids()?;
    run_batched(
        store,
        EntityKind::Garden,
        &ids,
        |id| id.get(),
        |store, id| generated::recompute_garden(store, id),
    )
}

/// Recompute every cached taxon name, families before the species that
/// embed their genus.
pub fn recalc_taxa(store: &Store) -> Result<BulkReport, EngineError> {
    let mut report = BulkReport::default();
    let ids = store.family_ids()?;
    report.absorb(run_batched(
        store,
        EntityKind::Family,
        &ids,
        |id| id.get(),
        |store, id| generated::recompute_family(store, id),
    )?);
    let ids = store.species_ids()?;
    report.absorb(run_batched(
        store,
        EntityKind::Species,
        &ids,
        |id| id.get(),
        |store, id| generated::recompute_species(store, id),
    )?);
    Ok(report)
}

/// Recompute territory display names and department full codes.
pub fn recalc_location_codes(store: &Store, config: &Config) -> Result<BulkReport, EngineError> {
    let mut report = BulkReport::default();
    let ids = store.territory_ids()?;
    report.absorb(run_batched(
        store,
        EntityKind::Territory,
        &ids,
        |id| id.get(),
        |store, id| generated::recompute_territory_name(store, id),
    )?);
    let ids = store.department_ids()?;
    report.absorb(run_batched(
        store,
        EntityKind::Department,
        &ids,
        |id| id.get(),
        |store, id| {
            generated::recompute_department_full_code(store, id, &config.department_full_code)?;
            Ok(())
        },
    )?);
    Ok(report)
}

/// Recompute every aggregate counter, territories first.
pub fn recalc_outplantings(store: &Store) -> Result<BulkReport, EngineError> {
    let mut report = BulkReport::default();
    let ids = store.territory_ids()?;
    report.absorb(run_batched(
        store,
        EntityKind::Territory,
        &ids,
        |id| id.get(),
        |store, id| aggregate::recompute_territory(store, id, None).map(|_| ()),
    )?);
    let ids = store.department_ids()?;
    report.absorb(run_batched(
        store,
        EntityKind::Department,
        &ids,
        |id| id.get(),
        |store, id| aggregate::recompute_department(store, id, None).map(|_| ()),
    )?);
    Ok(report)
}

/// Recompute every individual's identity strings and placement cache.
pub fn recalc_individuals(store: &Store) -> Result<BulkReport, EngineError> {
    let ids = store.individual_ids()?;
    run_batched(
        store,
        EntityKind::Individual,
        &ids,
        |id| id.get(),
        |store, id| {
            generated::recompute_individual_identity(store, id)?;
            generated::recompute_individual_placements(store, id)
        },
    )
}

/// Recompute only the outplanting summary cache of every individual. Needs
/// none of the identity inputs, so it repairs placement caches even for
/// rows whose garden has lost its IPEN code.
pub fn recalc_individuals_outplantings(store: &Store) -> Result<BulkReport, EngineError> {
    let ids = store.individual_ids()?;
    run_batched(
        store,
        EntityKind::Individual,
        &ids,
        |id| id.get(),
        |store, id| generated::recompute_individual_placements(store, id),
    )
}

/// Rebuild every derived field in the database from scratch. Passes run in
/// dependency order so that later passes read refreshed inputs.
pub fn recalc_all(store: &Store, config: &Config) -> Result<BulkReport, EngineError> {
    let started = Instant::now();
    let mut report = BulkReport::default();
    report.absorb(strip_whitespace(store, config)?);
    report.absorb(assign_territory(store, config)?);
    report.absorb(recalc_gardens(store)?);
    report.absorb(recalc_taxa(store)?);
    report.absorb(recalc_location_codes(store, config)?);
    report.absorb(recalc_outplantings(store)?);
    report.absorb(recalc_individuals(store)?);
    // placement caches of rows whose identity recompute failed above
    report.absorb(recalc_individuals_outplantings(store)?);
    info!(
        processed = report.processed,
        failed = report.failed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "full recalculation done"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        BotanicGarden, Department, Family, Individual, Outplanting, Species, Territory,
    };

    fn seeded() -> (Store, Config) {
        let store = Store::open_in_memory().unwrap();
        (store, Config::default())
    }

    #[test]
    fn strip_whitespace_cleans_and_regenerates() {
        let (store, config) = seeded();
        let mut family = Family::new(" Rosaceae\t", "Rosa ");
        store.save_family(&mut family).unwrap();
        let mut species = Species::new(family.id.unwrap(), "\tcanina ");
        store.save_species(&mut species).unwrap();

        let report = strip_whitespace(&store, &config).unwrap();
        assert!(report.is_clean());

        let family = store.family(family.id.unwrap()).unwrap();
        assert_eq!(family.family, "Rosaceae");
        assert_eq!(family.genus, "Rosa");
        // a changed row refreshes its own generated columns in the same pass
        assert_eq!(family.full_name_generated, "Rosa  - Rosaceae");
        let species = store.species(species.id.unwrap()).unwrap();
        assert_eq!(species.species, "canina");
        assert_eq!(species.full_name_generated, "Rosa canina");
    }

    #[test]
    fn strip_whitespace_records_uniqueness_collisions() {
        let (store, config) = seeded();
        let mut clean_row = Territory::new("T1", "North");
        store.save_territory(&mut clean_row).unwrap();
        let mut dirty = Territory::new(" T1", "Also north");
        store.save_territory(&mut dirty).unwrap();

        let report = strip_whitespace(&store, &config).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].entity, EntityKind::Territory);
        assert_eq!(report.failures[0].id, dirty.id.unwrap().get());
        // the colliding row keeps its old value
        assert_eq!(store.territory(dirty.id.unwrap()).unwrap().code, " T1");
    }

    #[test]
    fn assign_territory_splits_legacy_codes() {
        let (store, config) = seeded();
        let mut territory = Territory::new("T1", "North");
        store.save_territory(&mut territory).unwrap();
        let mut legacy = Department::new(None, "T1-D2", "Legacy");
        store.save_department(&mut legacy).unwrap();
        let mut unknown = Department::new(None, "X9-D3", "Orphan");
        store.save_department(&mut unknown).unwrap();

        let report = assign_territory(&store, &config).unwrap();
        assert!(report.is_clean());

        let legacy = store.department(legacy.id.unwrap()).unwrap();
        assert_eq!(legacy.territory, territory.id);
        assert_eq!(legacy.code, "D2");
        assert_eq!(legacy.full_code, "T1-D2");

        let unknown = store.department(unknown.id.unwrap()).unwrap();
        assert_eq!(unknown.territory, None);
        assert_eq!(unknown.code, "X9-D3");
    }

    #[test]
    fn recalc_all_rebuilds_from_raw_rows() {
        let (store, config) = seeded();
        let mut family = Family::new("Rosaceae", " Rosa");
        store.save_family(&mut family).unwrap();
        let mut species = Species::new(family.id.unwrap(), "canina");
        store.save_species(&mut species).unwrap();
        let mut garden = BotanicGarden::new(1, Some("G1"), "Home");
        store.save_garden(&mut garden).unwrap();
        let mut territory = Territory::new("T1", "North");
        store.save_territory(&mut territory).unwrap();
        let mut department = Department::new(territory.id, "D1", "Alpinum");
        store.save_department(&mut department).unwrap();
        let mut individual = Individual::new(42, 1000, species.id.unwrap(), garden.id.unwrap());
        individual.ipen_country = "au".into();
        store.save_individual(&mut individual).unwrap();
        let mut outplanting = Outplanting::new(department.id, individual.id.unwrap());
        store.save_outplanting(&mut outplanting).unwrap();

        let report = recalc_all(&store, &config).unwrap();
        assert!(report.is_clean(), "{:?}", report.failures);

        assert_eq!(store.garden(garden.id.unwrap()).unwrap().full_name_generated, "1 (G1/Home)");
        assert_eq!(
            store.species(species.id.unwrap()).unwrap().full_name_generated,
            "Rosa canina"
        );
        let department = store.department(department.id.unwrap()).unwrap();
        assert_eq!(department.full_code, "T1-D1");
        assert_eq!(department.stats.num_outplantings, 1);
        assert_eq!(
            store.territory(territory.id.unwrap()).unwrap().stats.num_outplantings,
            1
        );
        let individual = store.individual(individual.id.unwrap()).unwrap();
        assert_eq!(individual.ipen_generated, "AU--G1-");
        assert_eq!(individual.id_name_generated, "42 (Rosa canina)");
        assert_eq!(individual.departments_generated, "T1-D1");
    }

    #[test]
    fn failing_rows_do_not_stop_the_pass() {
        let (store, _) = seeded();
        let mut family = Family::new("Rosaceae", "Rosa");
        store.save_family(&mut family).unwrap();
        let mut species = Species::new(family.id.unwrap(), "canina");
        store.save_species(&mut species).unwrap();
        let mut garden = BotanicGarden::new(1, Some("G1"), "Home");
        store.save_garden(&mut garden).unwrap();
        let mut codeless = BotanicGarden::new(2, None, "Partner");
        store.save_garden(&mut codeless).unwrap();

        let mut fine = Individual::new(1, 1000, species.id.unwrap(), garden.id.unwrap());
        store.save_individual(&mut fine).unwrap();
        let mut broken = Individual::new(2, 1001, species.id.unwrap(), codeless.id.unwrap());
        store.save_individual(&mut broken).unwrap();

        let report = recalc_individuals(&store).unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].id, broken.id.unwrap().get());
        // the fine row still got its identity
        assert!(!store.individual(fine.id.unwrap()).unwrap().id_name_generated.is_empty());
    }

    #[test]
    fn placement_caches_are_repairable_without_identity_inputs() {
        let (store, _) = seeded();
        let mut family = Family::new("Rosaceae", "Rosa");
        store.save_family(&mut family).unwrap();
        let mut species = Species::new(family.id.unwrap(), "canina");
        store.save_species(&mut species).unwrap();
        let mut codeless = BotanicGarden::new(1, None, "Partner");
        store.save_garden(&mut codeless).unwrap();
        let mut individual = Individual::new(1, 1000, species.id.unwrap(), codeless.id.unwrap());
        store.save_individual(&mut individual).unwrap();
        let mut rogue = Outplanting::new(None, individual.id.unwrap());
        store.save_outplanting(&mut rogue).unwrap();

        // the fused pass rolls the row back at the identity recompute
        let report = recalc_individuals(&store).unwrap();
        assert_eq!(report.failed, 1);
        let stale = store.individual(individual.id.unwrap()).unwrap();
        assert!(stale.outplantings_generated.is_empty());
        assert!(!stale.is_alive_generated);

        // the cache-only pass does not need the garden code
        let report = recalc_individuals_outplantings(&store).unwrap();
        assert!(report.is_clean());
        let repaired = store.individual(individual.id.unwrap()).unwrap();
        assert_eq!(repaired.outplantings_generated, vec![rogue.id.unwrap()]);
        assert!(repaired.is_alive_generated);
    }
}
