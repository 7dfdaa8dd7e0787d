//! SQLite schema for the inventory store.

use rusqlite::Connection;

use super::StoreError;

pub(crate) const SCHEMA_VERSION: u32 = 1;

pub(crate) fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS garden (
           id INTEGER PRIMARY KEY,
           number INTEGER NOT NULL UNIQUE,
           code TEXT,
           name TEXT NOT NULL,
           full_name_generated TEXT NOT NULL DEFAULT '',
           num_orders_generated INTEGER NOT NULL DEFAULT 0,
           catalog_date_generated TEXT
         );
         CREATE TABLE IF NOT EXISTS outgoing_order (
           id INTEGER PRIMARY KEY,
           garden_id INTEGER NOT NULL REFERENCES garden(id) ON DELETE CASCADE,
           date_created TEXT NOT NULL,
           order_text TEXT NOT NULL DEFAULT '',
           processed INTEGER NOT NULL DEFAULT 0
         );
         CREATE INDEX IF NOT EXISTS outgoing_order_by_garden
           ON outgoing_order (garden_id);
         CREATE TABLE IF NOT EXISTS external_catalog (
           id INTEGER PRIMARY KEY,
           garden_id INTEGER NOT NULL REFERENCES garden(id) ON DELETE CASCADE,
           date_uploaded TEXT NOT NULL,
           date_outgoing TEXT
         );
         CREATE INDEX IF NOT EXISTS external_catalog_by_garden
           ON external_catalog (garden_id);
         CREATE TABLE IF NOT EXISTS family (
           id INTEGER PRIMARY KEY,
           family TEXT NOT NULL,
           subfamily TEXT NOT NULL DEFAULT '',
           tribus TEXT NOT NULL DEFAULT '',
           subtribus TEXT NOT NULL DEFAULT '',
           genus TEXT NOT NULL,
           genus_author TEXT NOT NULL DEFAULT '',
           full_name_generated TEXT NOT NULL DEFAULT ''
         );
         CREATE TABLE IF NOT EXISTS species (
           id INTEGER PRIMARY KEY,
           family_id INTEGER NOT NULL REFERENCES family(id) ON DELETE CASCADE,
           species TEXT NOT NULL,
           species_author TEXT NOT NULL DEFAULT '',
           subspecies TEXT NOT NULL DEFAULT '',
           subspecies_author TEXT NOT NULL DEFAULT '',
           variety TEXT NOT NULL DEFAULT '',
           variety_author TEXT NOT NULL DEFAULT '',
           form TEXT NOT NULL DEFAULT '',
           form_author TEXT NOT NULL DEFAULT '',
           cultivar TEXT NOT NULL DEFAULT '',
           full_name_generated TEXT NOT NULL DEFAULT ''
         );
         CREATE INDEX IF NOT EXISTS species_by_family
           ON species (family_id);
         CREATE TABLE IF NOT EXISTS territory (
           id INTEGER PRIMARY KEY,
           code TEXT NOT NULL UNIQUE,
           name TEXT NOT NULL,
           name_generated TEXT NOT NULL DEFAULT '',
           num_outplantings INTEGER NOT NULL DEFAULT 0,
           num_individuals INTEGER NOT NULL DEFAULT 0,
           num_species INTEGER NOT NULL DEFAULT 0,
           num_genera INTEGER NOT NULL DEFAULT 0,
           num_outplantings_alive INTEGER NOT NULL DEFAULT 0,
           num_individuals_alive INTEGER NOT NULL DEFAULT 0,
           num_species_alive INTEGER NOT NULL DEFAULT 0,
           num_genera_alive INTEGER NOT NULL DEFAULT 0
         );
         CREATE TABLE IF NOT EXISTS department (
           id INTEGER PRIMARY KEY,
           territory_id INTEGER REFERENCES territory(id) ON DELETE SET NULL,
           code TEXT NOT NULL,
           name TEXT NOT NULL DEFAULT '',
           full_code TEXT NOT NULL DEFAULT '',
           num_outplantings INTEGER NOT NULL DEFAULT 0,
           num_individuals INTEGER NOT NULL DEFAULT 0,
           num_species INTEGER NOT NULL DEFAULT 0,
           num_genera INTEGER NOT NULL DEFAULT 0,
           num_outplantings_alive INTEGER NOT NULL DEFAULT 0,
           num_individuals_alive INTEGER NOT NULL DEFAULT 0,
           num_species_alive INTEGER NOT NULL DEFAULT 0,
           num_genera_alive INTEGER NOT NULL DEFAULT 0
         );
         CREATE INDEX IF NOT EXISTS department_by_territory
           ON department (territory_id);
         CREATE TABLE IF NOT EXISTS individual (
           id INTEGER PRIMARY KEY,
           accession_number INTEGER NOT NULL UNIQUE,
           order_number INTEGER NOT NULL UNIQUE,
           species_id INTEGER NOT NULL REFERENCES species(id) ON DELETE CASCADE,
           ipen_country TEXT NOT NULL DEFAULT '',
           ipen_transfer_restricted TEXT NOT NULL DEFAULT '',
           ipen_garden_id INTEGER NOT NULL REFERENCES garden(id),
           ipen_accession_number TEXT NOT NULL DEFAULT '',
           seed_available INTEGER NOT NULL DEFAULT 0,
           seed_in_stock INTEGER NOT NULL DEFAULT 0,
           ipen_generated TEXT NOT NULL DEFAULT '',
           id_name_generated TEXT NOT NULL DEFAULT '',
           outplantings_generated TEXT NOT NULL DEFAULT '[]',
           alive_outplantings_generated TEXT NOT NULL DEFAULT '[]',
           departments_generated TEXT NOT NULL DEFAULT '',
           territories_generated TEXT NOT NULL DEFAULT '',
           is_alive_generated INTEGER NOT NULL DEFAULT 0
         );
         CREATE INDEX IF NOT EXISTS individual_by_species
           ON individual (species_id);
         CREATE TABLE IF NOT EXISTS outplanting (
           id INTEGER PRIMARY KEY,
           department_id INTEGER REFERENCES department(id) ON DELETE SET NULL,
           individual_id INTEGER NOT NULL REFERENCES individual(id) ON DELETE CASCADE,
           seeded_date TEXT,
           date TEXT,
           plant_died TEXT
         );
         CREATE INDEX IF NOT EXISTS outplanting_by_department
           ON outplanting (department_id);
         CREATE INDEX IF NOT EXISTS outplanting_by_individual
           ON outplanting (individual_id);
         CREATE TABLE IF NOT EXISTS meta (
           key TEXT PRIMARY KEY,
           value TEXT NOT NULL
         );",
    )?;
    conn.execute(
        "INSERT INTO meta (key, value) VALUES ('schema_version', ?1) \
         ON CONFLICT(key) DO NOTHING",
        [SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}
