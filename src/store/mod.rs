//! SQLite-backed inventory store.
//!
//! One connection, synchronous access. Cascades run inside a single
//! `BEGIN IMMEDIATE` transaction ([`Store::begin`]); bulk jobs additionally
//! use savepoints so one bad row does not abort a whole batch.

mod rows;
mod schema;

use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use time::Date;

use crate::core::{
    AggregateStats, BotanicGarden, CatalogId, Department, DepartmentId, EntityKind,
    ExternalCatalog, Family, FamilyId, GardenId, Individual, IndividualId, OrderId, OutgoingOrder,
    Outplanting, OutplantingFact, OutplantingId, Placement, Species, SpeciesId, Territory,
    TerritoryId,
};
use rows::{IdList, SqlDate};

const BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: i64 },
    #[error("unique constraint violated on {entity}.{field}")]
    Constraint {
        entity: EntityKind,
        field: &'static str,
    },
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::finish_open(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::finish_open(Connection::open_in_memory()?)
    }

    fn finish_open(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
        schema::initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Start the single write transaction a cascade runs in.
    pub fn begin(&self) -> Result<StoreTxn<'_>, StoreError> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(StoreTxn {
            store: self,
            open: true,
        })
    }

    pub(crate) fn savepoint(&self, name: &str) -> Result<(), StoreError> {
        self.conn.execute_batch(&format!("SAVEPOINT {name}"))?;
        Ok(())
    }

    pub(crate) fn release_savepoint(&self, name: &str) -> Result<(), StoreError> {
        self.conn.execute_batch(&format!("RELEASE {name}"))?;
        Ok(())
    }

    pub(crate) fn rollback_savepoint(&self, name: &str) -> Result<(), StoreError> {
        self.conn
            .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))?;
        Ok(())
    }

    fn ids<T>(&self, sql: &str, wrap: fn(i64) -> T) -> Result<Vec<T>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(wrap(row?));
        }
        Ok(out)
    }

    // -- gardens --

    pub fn save_garden(&self, garden: &mut BotanicGarden) -> Result<GardenId, StoreError> {
        match garden.id {
            Some(id) => {
                let changed = self
                    .conn
                    .execute(
                        "UPDATE garden SET number = ?1, code = ?2, name = ?3 WHERE id = ?4",
                        params![garden.number, garden.code, garden.name, id.get()],
                    )
                    .map_err(|err| constraint(err, EntityKind::Garden, &["number"]))?;
                if changed == 0 {
                    return Err(not_found(EntityKind::Garden, id.get()));
                }
                Ok(id)
            }
            None => {
                self.conn
                    .execute(
                        "INSERT INTO garden (number, code, name) VALUES (?1, ?2, ?3)",
                        params![garden.number, garden.code, garden.name],
                    )
                    .map_err(|err| constraint(err, EntityKind::Garden, &["number"]))?;
                let id = GardenId::new(self.conn.last_insert_rowid());
                garden.id = Some(id);
                Ok(id)
            }
        }
    }

    pub fn garden_opt(&self, id: GardenId) -> Result<Option<BotanicGarden>, StoreError> {
        let sql = format!("SELECT {} FROM garden WHERE id = ?1", rows::GARDEN_COLS);
        Ok(self
            .conn
            .query_row(&sql, params![id.get()], rows::garden_from_row)
            .optional()?)
    }

    pub fn garden(&self, id: GardenId) -> Result<BotanicGarden, StoreError> {
        self.garden_opt(id)?
            .ok_or_else(|| not_found(EntityKind::Garden, id.get()))
    }

    pub fn garden_ids(&self) -> Result<Vec<GardenId>, StoreError> {
        self.ids("SELECT id FROM garden ORDER BY id", GardenId::new)
    }

    pub fn update_garden_generated(
        &self,
        id: GardenId,
        full_name: &str,
        num_orders: i64,
        catalog_date: Option<Date>,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE garden SET full_name_generated = ?1, num_orders_generated = ?2, \
             catalog_date_generated = ?3 WHERE id = ?4",
            params![full_name, num_orders, rows::opt_sql_date(catalog_date), id.get()],
        )?;
        Ok(())
    }

    pub fn count_unprocessed_orders(&self, garden: GardenId) -> Result<i64, StoreError> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM outgoing_order WHERE garden_id = ?1 AND processed = 0",
            params![garden.get()],
            |row| row.get(0),
        )?)
    }

    pub fn latest_catalog_date(&self, garden: GardenId) -> Result<Option<Date>, StoreError> {
        let date: Option<SqlDate> = self.conn.query_row(
            "SELECT MAX(date_uploaded) FROM external_catalog WHERE garden_id = ?1",
            params![garden.get()],
            |row| row.get(0),
        )?;
        Ok(rows::opt_date(date))
    }

    // -- outgoing orders --

    pub fn save_order(&self, order: &mut OutgoingOrder) -> Result<OrderId, StoreError> {
        match order.id {
            Some(id) => {
                let changed = self.conn.execute(
                    "UPDATE outgoing_order SET garden_id = ?1, date_created = ?2, \
                     order_text = ?3, processed = ?4 WHERE id = ?5",
                    params![
                        order.garden.get(),
                        SqlDate(order.date_created),
                        order.order_text,
                        order.processed,
                        id.get()
                    ],
                )?;
                if changed == 0 {
                    return Err(not_found(EntityKind::OutgoingOrder, id.get()));
                }
                Ok(id)
            }
            None => {
                self.conn.execute(
                    "INSERT INTO outgoing_order (garden_id, date_created, order_text, processed) \
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        order.garden.get(),
                        SqlDate(order.date_created),
                        order.order_text,
                        order.processed
                    ],
                )?;
                let id = OrderId::new(self.conn.last_insert_rowid());
                order.id = Some(id);
                Ok(id)
            }
        }
    }

    pub fn order_opt(&self, id: OrderId) -> Result<Option<OutgoingOrder>, StoreError> {
        let sql = format!(
            "SELECT {} FROM outgoing_order WHERE id = ?1",
            rows::ORDER_COLS
        );
        Ok(self
            .conn
            .query_row(&sql, params![id.get()], rows::order_from_row)
            .optional()?)
    }

    pub fn delete_order(&self, id: OrderId) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM outgoing_order WHERE id = ?1", params![id.get()])?;
        Ok(())
    }

    // -- external catalogs --

    pub fn save_catalog(&self, catalog: &mut ExternalCatalog) -> Result<CatalogId, StoreError> {
        match catalog.id {
            Some(id) => {
                let changed = self.conn.execute(
                    "UPDATE external_catalog SET garden_id = ?1, date_uploaded = ?2, \
                     date_outgoing = ?3 WHERE id = ?4",
                    params![
                        catalog.garden.get(),
                        SqlDate(catalog.date_uploaded),
                        rows::opt_sql_date(catalog.date_outgoing),
                        id.get()
                    ],
                )?;
                if changed == 0 {
                    return Err(not_found(EntityKind::ExternalCatalog, id.get()));
                }
                Ok(id)
            }
            None => {
                self.conn.execute(
                    "INSERT INTO external_catalog (garden_id, date_uploaded, date_outgoing) \
                     VALUES (?1, ?2, ?3)",
                    params![
                        catalog.garden.get(),
                        SqlDate(catalog.date_uploaded),
                        rows::opt_sql_date(catalog.date_outgoing)
                    ],
                )?;
                let id = CatalogId::new(self.conn.last_insert_rowid());
                catalog.id = Some(id);
                Ok(id)
            }
        }
    }

    pub fn catalog_opt(&self, id: CatalogId) -> Result<Option<ExternalCatalog>, StoreError> {
        let sql = format!(
            "SELECT {} FROM external_catalog WHERE id = ?1",
            rows::CATALOG_COLS
        );
        Ok(self
            .conn
            .query_row(&sql, params![id.get()], rows::catalog_from_row)
            .optional()?)
    }

    pub fn delete_catalog(&self, id: CatalogId) -> Result<(), StoreError> {
        self.conn.execute(
            "DELETE FROM external_catalog WHERE id = ?1",
            params![id.get()],
        )?;
        Ok(())
    }

    // -- families --

    pub fn save_family(&self, family: &mut Family) -> Result<FamilyId, StoreError> {
        match family.id {
            Some(id) => {
                let changed = self.conn.execute(
                    "UPDATE family SET family = ?1, subfamily = ?2, tribus = ?3, \
                     subtribus = ?4, genus = ?5, genus_author = ?6 WHERE id = ?7",
                    params![
                        family.family,
                        family.subfamily,
                        family.tribus,
                        family.subtribus,
                        family.genus,
                        family.genus_author,
                        id.get()
                    ],
                )?;
                if changed == 0 {
                    return Err(not_found(EntityKind::Family, id.get()));
                }
                Ok(id)
            }
            None => {
                self.conn.execute(
                    "INSERT INTO family (family, subfamily, tribus, subtribus, genus, genus_author) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        family.family,
                        family.subfamily,
                        family.tribus,
                        family.subtribus,
                        family.genus,
                        family.genus_author
                    ],
                )?;
                let id = FamilyId::new(self.conn.last_insert_rowid());
                family.id = Some(id);
                Ok(id)
            }
        }
    }

    pub fn family_opt(&self, id: FamilyId) -> Result<Option<Family>, StoreError> {
        let sql = format!("SELECT {} FROM family WHERE id = ?1", rows::FAMILY_COLS);
        Ok(self
            .conn
            .query_row(&sql, params![id.get()], rows::family_from_row)
            .optional()?)
    }

    pub fn family(&self, id: FamilyId) -> Result<Family, StoreError> {
        self.family_opt(id)?
            .ok_or_else(|| not_found(EntityKind::Family, id.get()))
    }

    pub fn family_ids(&self) -> Result<Vec<FamilyId>, StoreError> {
        self.ids("SELECT id FROM family ORDER BY id", FamilyId::new)
    }

    pub fn update_family_full_name(&self, id: FamilyId, full_name: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE family SET full_name_generated = ?1 WHERE id = ?2",
            params![full_name, id.get()],
        )?;
        Ok(())
    }

    pub fn species_ids_in_family(&self, id: FamilyId) -> Result<Vec<SpeciesId>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM species WHERE family_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![id.get()], |row| row.get::<_, i64>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(SpeciesId::new(row?));
        }
        Ok(out)
    }

    // -- species --

    pub fn save_species(&self, species: &mut Species) -> Result<SpeciesId, StoreError> {
        match species.id {
            Some(id) => {
                let changed = self.conn.execute(
                    "UPDATE species SET family_id = ?1, species = ?2, species_author = ?3, \
                     subspecies = ?4, subspecies_author = ?5, variety = ?6, variety_author = ?7, \
                     form = ?8, form_author = ?9, cultivar = ?10 WHERE id = ?11",
                    params![
                        species.family.get(),
                        species.species,
                        species.species_author,
                        species.subspecies,
                        species.subspecies_author,
                        species.variety,
                        species.variety_author,
                        species.form,
                        species.form_author,
                        species.cultivar,
                        id.get()
                    ],
                )?;
                if changed == 0 {
                    return Err(not_found(EntityKind::Species, id.get()));
                }
                Ok(id)
            }
            None => {
                self.conn.execute(
                    "INSERT INTO species (family_id, species, species_author, subspecies, \
                     subspecies_author, variety, variety_author, form, form_author, cultivar) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        species.family.get(),
                        species.species,
                        species.species_author,
                        species.subspecies,
                        species.subspecies_author,
                        species.variety,
                        species.variety_author,
                        species.form,
                        species.form_author,
                        species.cultivar
                    ],
                )?;
                let id = SpeciesId::new(self.conn.last_insert_rowid());
                species.id = Some(id);
                Ok(id)
            }
        }
    }

    pub fn species_opt(&self, id: SpeciesId) -> Result<Option<Species>, StoreError> {
        let sql = format!("SELECT {} FROM species WHERE id = ?1", rows::SPECIES_COLS);
        Ok(self
            .conn
            .query_row(&sql, params![id.get()], rows::species_from_row)
            .optional()?)
    }

    pub fn species(&self, id: SpeciesId) -> Result<Species, StoreError> {
        self.species_opt(id)?
            .ok_or_else(|| not_found(EntityKind::Species, id.get()))
    }

    pub fn species_ids(&self) -> Result<Vec<SpeciesId>, StoreError> {
        self.ids("SELECT id FROM species ORDER BY id", SpeciesId::new)
    }

    pub fn update_species_full_name(
        &self,
        id: SpeciesId,
        full_name: &str,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE species SET full_name_generated = ?1 WHERE id = ?2",
            params![full_name, id.get()],
        )?;
        Ok(())
    }

    pub fn individual_ids_of_species(&self, id: SpeciesId) -> Result<Vec<IndividualId>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM individual WHERE species_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![id.get()], |row| row.get::<_, i64>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(IndividualId::new(row?));
        }
        Ok(out)
    }

    // -- territories --

    pub fn save_territory(&self, territory: &mut Territory) -> Result<TerritoryId, StoreError> {
        match territory.id {
            Some(id) => {
                let changed = self
                    .conn
                    .execute(
                        "UPDATE territory SET code = ?1, name = ?2 WHERE id = ?3",
                        params![territory.code, territory.name, id.get()],
                    )
                    .map_err(|err| constraint(err, EntityKind::Territory, &["code"]))?;
                if changed == 0 {
                    return Err(not_found(EntityKind::Territory, id.get()));
                }
                Ok(id)
            }
            None => {
                self.conn
                    .execute(
                        "INSERT INTO territory (code, name) VALUES (?1, ?2)",
                        params![territory.code, territory.name],
                    )
                    .map_err(|err| constraint(err, EntityKind::Territory, &["code"]))?;
                let id = TerritoryId::new(self.conn.last_insert_rowid());
                territory.id = Some(id);
                Ok(id)
            }
        }
    }

    pub fn territory_opt(&self, id: TerritoryId) -> Result<Option<Territory>, StoreError> {
        let sql = format!(
            "SELECT {} FROM territory WHERE id = ?1",
            rows::territory_cols()
        );
        Ok(self
            .conn
            .query_row(&sql, params![id.get()], rows::territory_from_row)
            .optional()?)
    }

    pub fn territory(&self, id: TerritoryId) -> Result<Territory, StoreError> {
        self.territory_opt(id)?
            .ok_or_else(|| not_found(EntityKind::Territory, id.get()))
    }

    pub fn territory_ids(&self) -> Result<Vec<TerritoryId>, StoreError> {
        self.ids("SELECT id FROM territory ORDER BY id", TerritoryId::new)
    }

    pub fn territory_by_code(&self, code: &str) -> Result<Option<Territory>, StoreError> {
        let sql = format!(
            "SELECT {} FROM territory WHERE code = ?1",
            rows::territory_cols()
        );
        Ok(self
            .conn
            .query_row(&sql, params![code], rows::territory_from_row)
            .optional()?)
    }

    pub fn update_territory_name(
        &self,
        id: TerritoryId,
        name_generated: &str,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE territory SET name_generated = ?1 WHERE id = ?2",
            params![name_generated, id.get()],
        )?;
        Ok(())
    }

    pub fn update_territory_stats(
        &self,
        id: TerritoryId,
        stats: &AggregateStats,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE territory SET num_outplantings = ?1, \
             num_individuals = ?2, num_species = ?3, num_genera = ?4, \
             num_outplantings_alive = ?5, num_individuals_alive = ?6, \
             num_species_alive = ?7, num_genera_alive = ?8 WHERE id = ?9",
            params![
                stats.num_outplantings,
                stats.num_individuals,
                stats.num_species,
                stats.num_genera,
                stats.num_outplantings_alive,
                stats.num_individuals_alive,
                stats.num_species_alive,
                stats.num_genera_alive,
                id.get()
            ],
        )?;
        Ok(())
    }

    pub fn department_ids_in_territory(
        &self,
        id: TerritoryId,
    ) -> Result<Vec<DepartmentId>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM department WHERE territory_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![id.get()], |row| row.get::<_, i64>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(DepartmentId::new(row?));
        }
        Ok(out)
    }

    // -- departments --

    pub fn save_department(&self, department: &mut Department) -> Result<DepartmentId, StoreError> {
        let territory = department.territory.map(TerritoryId::get);
        match department.id {
            Some(id) => {
                let changed = self.conn.execute(
                    "UPDATE department SET territory_id = ?1, code = ?2, name = ?3 WHERE id = ?4",
                    params![territory, department.code, department.name, id.get()],
                )?;
                if changed == 0 {
                    return Err(not_found(EntityKind::Department, id.get()));
                }
                Ok(id)
            }
            None => {
                self.conn.execute(
                    "INSERT INTO department (territory_id, code, name) VALUES (?1, ?2, ?3)",
                    params![territory, department.code, department.name],
                )?;
                let id = DepartmentId::new(self.conn.last_insert_rowid());
                department.id = Some(id);
                Ok(id)
            }
        }
    }

    pub fn department_opt(&self, id: DepartmentId) -> Result<Option<Department>, StoreError> {
        let sql = format!(
            "SELECT {} FROM department WHERE id = ?1",
            rows::department_cols()
        );
        Ok(self
            .conn
            .query_row(&sql, params![id.get()], rows::department_from_row)
            .optional()?)
    }

    pub fn department(&self, id: DepartmentId) -> Result<Department, StoreError> {
        self.department_opt(id)?
            .ok_or_else(|| not_found(EntityKind::Department, id.get()))
    }

    pub fn department_ids(&self) -> Result<Vec<DepartmentId>, StoreError> {
        self.ids("SELECT id FROM department ORDER BY id", DepartmentId::new)
    }

    pub fn update_department_full_code(
        &self,
        id: DepartmentId,
        full_code: &str,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE department SET full_code = ?1 WHERE id = ?2",
            params![full_code, id.get()],
        )?;
        Ok(())
    }

    pub fn update_department_stats(
        &self,
        id: DepartmentId,
        stats: &AggregateStats,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE department SET num_outplantings = ?1, \
             num_individuals = ?2, num_species = ?3, num_genera = ?4, \
             num_outplantings_alive = ?5, num_individuals_alive = ?6, \
             num_species_alive = ?7, num_genera_alive = ?8 WHERE id = ?9",
            params![
                stats.num_outplantings,
                stats.num_individuals,
                stats.num_species,
                stats.num_genera,
                stats.num_outplantings_alive,
                stats.num_individuals_alive,
                stats.num_species_alive,
                stats.num_genera_alive,
                id.get()
            ],
        )?;
        Ok(())
    }

    /// Outplanting facts scoped to one department, optionally leaving out a
    /// row that is about to be deleted.
    pub fn outplanting_facts_for_department(
        &self,
        id: DepartmentId,
        exclude: Option<OutplantingId>,
    ) -> Result<Vec<OutplantingFact>, StoreError> {
        self.facts(
            "SELECT o.id, o.individual_id, i.species_id, f.genus, o.plant_died \
             FROM outplanting o \
             JOIN individual i ON i.id = o.individual_id \
             JOIN species s ON s.id = i.species_id \
             JOIN family f ON f.id = s.family_id \
             WHERE o.department_id = ?1 AND (?2 IS NULL OR o.id <> ?2) \
             ORDER BY o.id",
            id.get(),
            exclude,
        )
    }

    /// Same facts, scoped to every department of a territory.
    pub fn outplanting_facts_for_territory(
        &self,
        id: TerritoryId,
        exclude: Option<OutplantingId>,
    ) -> Result<Vec<OutplantingFact>, StoreError> {
        self.facts(
            "SELECT o.id, o.individual_id, i.species_id, f.genus, o.plant_died \
             FROM outplanting o \
             JOIN department d ON d.id = o.department_id \
             JOIN individual i ON i.id = o.individual_id \
             JOIN species s ON s.id = i.species_id \
             JOIN family f ON f.id = s.family_id \
             WHERE d.territory_id = ?1 AND (?2 IS NULL OR o.id <> ?2) \
             ORDER BY o.id",
            id.get(),
            exclude,
        )
    }

    fn facts(
        &self,
        sql: &str,
        scope_id: i64,
        exclude: Option<OutplantingId>,
    ) -> Result<Vec<OutplantingFact>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(
            params![scope_id, exclude.map(OutplantingId::get)],
            rows::fact_from_row,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn individual_ids_outplanted_in_department(
        &self,
        id: DepartmentId,
    ) -> Result<Vec<IndividualId>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT individual_id FROM outplanting WHERE department_id = ?1 \
             ORDER BY individual_id",
        )?;
        let rows = stmt.query_map(params![id.get()], |row| row.get::<_, i64>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(IndividualId::new(row?));
        }
        Ok(out)
    }

    // -- individuals --

    pub fn save_individual(&self, individual: &mut Individual) -> Result<IndividualId, StoreError> {
        const FIELDS: &[&str] = &["accession_number", "order_number"];
        match individual.id {
            Some(id) => {
                let changed = self
                    .conn
                    .execute(
                        "UPDATE individual SET accession_number = ?1, order_number = ?2, \
                         species_id = ?3, ipen_country = ?4, ipen_transfer_restricted = ?5, \
                         ipen_garden_id = ?6, ipen_accession_number = ?7, seed_available = ?8, \
                         seed_in_stock = ?9 WHERE id = ?10",
                        params![
                            individual.accession_number,
                            individual.order_number,
                            individual.species.get(),
                            individual.ipen_country,
                            individual.ipen_transfer_restricted,
                            individual.ipen_garden.get(),
                            individual.ipen_accession_number,
                            individual.seed_available,
                            individual.seed_in_stock,
                            id.get()
                        ],
                    )
                    .map_err(|err| constraint(err, EntityKind::Individual, FIELDS))?;
                if changed == 0 {
                    return Err(not_found(EntityKind::Individual, id.get()));
                }
                Ok(id)
            }
            None => {
                self.conn
                    .execute(
                        "INSERT INTO individual (accession_number, order_number, species_id, \
                         ipen_country, ipen_transfer_restricted, ipen_garden_id, \
                         ipen_accession_number, seed_available, seed_in_stock) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        params![
                            individual.accession_number,
                            individual.order_number,
                            individual.species.get(),
                            individual.ipen_country,
                            individual.ipen_transfer_restricted,
                            individual.ipen_garden.get(),
                            individual.ipen_accession_number,
                            individual.seed_available,
                            individual.seed_in_stock
                        ],
                    )
                    .map_err(|err| constraint(err, EntityKind::Individual, FIELDS))?;
                let id = IndividualId::new(self.conn.last_insert_rowid());
                individual.id = Some(id);
                Ok(id)
            }
        }
    }

    pub fn individual_opt(&self, id: IndividualId) -> Result<Option<Individual>, StoreError> {
        let sql = format!(
            "SELECT {} FROM individual WHERE id = ?1",
            rows::INDIVIDUAL_COLS
        );
        Ok(self
            .conn
            .query_row(&sql, params![id.get()], rows::individual_from_row)
            .optional()?)
    }

    pub fn individual(&self, id: IndividualId) -> Result<Individual, StoreError> {
        self.individual_opt(id)?
            .ok_or_else(|| not_found(EntityKind::Individual, id.get()))
    }

    pub fn individual_ids(&self) -> Result<Vec<IndividualId>, StoreError> {
        self.ids("SELECT id FROM individual ORDER BY id", IndividualId::new)
    }

    pub fn update_individual_generated(&self, individual: &Individual) -> Result<(), StoreError> {
        let id = individual
            .id
            .ok_or_else(|| not_found(EntityKind::Individual, 0))?;
        self.conn.execute(
            "UPDATE individual SET ipen_generated = ?1, id_name_generated = ?2, \
             outplantings_generated = ?3, alive_outplantings_generated = ?4, \
             departments_generated = ?5, territories_generated = ?6, is_alive_generated = ?7 \
             WHERE id = ?8",
            params![
                individual.ipen_generated,
                individual.id_name_generated,
                IdList(individual.outplantings_generated.clone()),
                IdList(individual.alive_outplantings_generated.clone()),
                individual.departments_generated,
                individual.territories_generated,
                individual.is_alive_generated,
                id.get()
            ],
        )?;
        Ok(())
    }

    pub fn delete_individual(&self, id: IndividualId) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM individual WHERE id = ?1", params![id.get()])?;
        Ok(())
    }

    /// Placement rows for one individual: outplanting id, liveness, and the
    /// owning location codes (absent when the outplanting has no department).
    pub fn placements_for_individual(
        &self,
        id: IndividualId,
    ) -> Result<Vec<Placement>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT o.id, o.plant_died IS NULL, d.full_code, t.code \
             FROM outplanting o \
             LEFT JOIN department d ON d.id = o.department_id \
             LEFT JOIN territory t ON t.id = d.territory_id \
             WHERE o.individual_id = ?1 ORDER BY o.id",
        )?;
        let rows = stmt.query_map(params![id.get()], |row| {
            Ok(Placement {
                id: OutplantingId::new(row.get(0)?),
                alive: row.get(1)?,
                department_full_code: row.get(2)?,
                territory_code: row.get(3)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn individuals_with_seed_available(&self) -> Result<Vec<IndividualId>, StoreError> {
        self.ids(
            "SELECT id FROM individual WHERE seed_available = 1 ORDER BY id",
            IndividualId::new,
        )
    }

    // -- outplantings --

    pub fn save_outplanting(&self, outplanting: &mut Outplanting) -> Result<OutplantingId, StoreError> {
        let department = outplanting.department.map(DepartmentId::get);
        match outplanting.id {
            Some(id) => {
                let changed = self.conn.execute(
                    "UPDATE outplanting SET department_id = ?1, individual_id = ?2, \
                     seeded_date = ?3, date = ?4, plant_died = ?5 WHERE id = ?6",
                    params![
                        department,
                        outplanting.individual.get(),
                        rows::opt_sql_date(outplanting.seeded_date),
                        rows::opt_sql_date(outplanting.date),
                        rows::opt_sql_date(outplanting.plant_died),
                        id.get()
                    ],
                )?;
                if changed == 0 {
                    return Err(not_found(EntityKind::Outplanting, id.get()));
                }
                Ok(id)
            }
            None => {
                self.conn.execute(
                    "INSERT INTO outplanting (department_id, individual_id, seeded_date, date, plant_died) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        department,
                        outplanting.individual.get(),
                        rows::opt_sql_date(outplanting.seeded_date),
                        rows::opt_sql_date(outplanting.date),
                        rows::opt_sql_date(outplanting.plant_died)
                    ],
                )?;
                let id = OutplantingId::new(self.conn.last_insert_rowid());
                outplanting.id = Some(id);
                Ok(id)
            }
        }
    }

    pub fn outplanting_opt(&self, id: OutplantingId) -> Result<Option<Outplanting>, StoreError> {
        let sql = format!(
            "SELECT {} FROM outplanting WHERE id = ?1",
            rows::OUTPLANTING_COLS
        );
        Ok(self
            .conn
            .query_row(&sql, params![id.get()], rows::outplanting_from_row)
            .optional()?)
    }

    pub fn outplanting(&self, id: OutplantingId) -> Result<Outplanting, StoreError> {
        self.outplanting_opt(id)?
            .ok_or_else(|| not_found(EntityKind::Outplanting, id.get()))
    }

    pub fn outplanting_ids(&self) -> Result<Vec<OutplantingId>, StoreError> {
        self.ids("SELECT id FROM outplanting ORDER BY id", OutplantingId::new)
    }

    pub fn outplanting_ids_of_individual(
        &self,
        id: IndividualId,
    ) -> Result<Vec<OutplantingId>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM outplanting WHERE individual_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![id.get()], |row| row.get::<_, i64>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(OutplantingId::new(row?));
        }
        Ok(out)
    }

    /// Distinct departments an individual is outplanted in.
    pub fn department_ids_of_individual(
        &self,
        id: IndividualId,
    ) -> Result<Vec<DepartmentId>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT department_id FROM outplanting
             WHERE individual_id = ?1 AND department_id IS NOT NULL
             ORDER BY department_id",
        )?;
        let rows = stmt.query_map(params![id.get()], |row| row.get::<_, i64>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(DepartmentId::new(row?));
        }
        Ok(out)
    }

    pub fn delete_outplanting(&self, id: OutplantingId) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM outplanting WHERE id = ?1", params![id.get()])?;
        Ok(())
    }

    // -- identifier pools --

    pub fn accession_number_exists(&self, value: i64) -> Result<bool, StoreError> {
        self.number_exists("accession_number", value)
    }

    pub fn order_number_exists(&self, value: i64) -> Result<bool, StoreError> {
        self.number_exists("order_number", value)
    }

    fn number_exists(&self, column: &str, value: i64) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM individual WHERE {column} = ?1"),
            params![value],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn max_accession_number(&self) -> Result<Option<i64>, StoreError> {
        self.max_number("accession_number")
    }

    pub fn max_order_number(&self) -> Result<Option<i64>, StoreError> {
        self.max_number("order_number")
    }

    fn max_number(&self, column: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.conn.query_row(
            &format!("SELECT MAX({column}) FROM individual"),
            [],
            |row| row.get(0),
        )?)
    }

    pub fn accession_numbers_at_least(&self, min: i64) -> Result<Vec<i64>, StoreError> {
        self.numbers_at_least("accession_number", min)
    }

    pub fn order_numbers_at_least(&self, min: i64) -> Result<Vec<i64>, StoreError> {
        self.numbers_at_least("order_number", min)
    }

    fn numbers_at_least(&self, column: &str, min: i64) -> Result<Vec<i64>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {column} FROM individual WHERE {column} >= ?1 ORDER BY {column}"
        ))?;
        let rows = stmt.query_map(params![min], |row| row.get::<_, i64>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

/// An open `BEGIN IMMEDIATE` transaction. Rolls back on drop unless
/// committed.
pub struct StoreTxn<'a> {
    store: &'a Store,
    open: bool,
}

impl<'a> StoreTxn<'a> {
    pub fn commit(mut self) -> Result<(), StoreError> {
        self.store.conn.execute_batch("COMMIT")?;
        self.open = false;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<(), StoreError> {
        self.store.conn.execute_batch("ROLLBACK")?;
        self.open = false;
        Ok(())
    }
}

impl<'a> std::ops::Deref for StoreTxn<'a> {
    type Target = Store;

    fn deref(&self) -> &Store {
        self.store
    }
}

impl Drop for StoreTxn<'_> {
    fn drop(&mut self) {
        if self.open {
            let _ = self.store.conn.execute_batch("ROLLBACK");
        }
    }
}

fn not_found(entity: EntityKind, id: i64) -> StoreError {
    StoreError::NotFound { entity, id }
}

fn constraint(
    err: rusqlite::Error,
    entity: EntityKind,
    fields: &[&'static str],
) -> StoreError {
    if let rusqlite::Error::SqliteFailure(failure, Some(message)) = &err {
        if failure.code == rusqlite::ErrorCode::ConstraintViolation {
            for field in fields {
                if message.contains(field) {
                    return StoreError::Constraint {
                        entity,
                        field,
                    };
                }
            }
        }
    }
    StoreError::Sqlite(err)
}
