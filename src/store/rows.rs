//! Row <-> domain type conversions.
//!
//! Dates are stored as ISO-8601 text, outplanting id lists as JSON arrays.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Row;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::Date;

use crate::core::{
    AggregateStats, BotanicGarden, CatalogId, Department, DepartmentId, ExternalCatalog, Family,
    FamilyId, GardenId, Individual, IndividualId, OrderId, OutgoingOrder, Outplanting,
    OutplantingFact, OutplantingId, Species, SpeciesId, Territory, TerritoryId,
};

const DATE_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");

/// `time::Date` carried through a TEXT column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SqlDate(pub Date);

impl ToSql for SqlDate {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let text = self
            .0
            .format(DATE_FORMAT)
            .map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))?;
        Ok(ToSqlOutput::from(text))
    }
}

impl FromSql for SqlDate {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        Date::parse(text, DATE_FORMAT)
            .map(SqlDate)
            .map_err(|err| FromSqlError::Other(Box::new(err)))
    }
}

pub(crate) fn opt_date(value: Option<SqlDate>) -> Option<Date> {
    value.map(|d| d.0)
}

pub(crate) fn opt_sql_date(value: Option<Date>) -> Option<SqlDate> {
    value.map(SqlDate)
}

/// JSON-encoded list of outplanting ids.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct IdList(pub Vec<OutplantingId>);

impl ToSql for IdList {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let json = serde_json::to_string(&self.0)
            .map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))?;
        Ok(ToSqlOutput::from(json))
    }
}

impl FromSql for IdList {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        serde_json::from_str(text)
            .map(IdList)
            .map_err(|err| FromSqlError::Other(Box::new(err)))
    }
}

pub(crate) const GARDEN_COLS: &str =
    "id, number, code, name, full_name_generated, num_orders_generated, catalog_date_generated";

pub(crate) fn garden_from_row(row: &Row<'_>) -> rusqlite::Result<BotanicGarden> {
    Ok(BotanicGarden {
        id: Some(GardenId::new(row.get(0)?)),
        number: row.get(1)?,
        code: row.get(2)?,
        name: row.get(3)?,
        full_name_generated: row.get(4)?,
        num_orders_generated: row.get(5)?,
        catalog_date_generated: opt_date(row.get(6)?),
    })
}

pub(crate) const ORDER_COLS: &str = "id, garden_id, date_created, order_text, processed";

pub(crate) fn order_from_row(row: &Row<'_>) -> rusqlite::Result<OutgoingOrder> {
    Ok(OutgoingOrder {
        id: Some(OrderId::new(row.get(0)?)),
        garden: GardenId::new(row.get(1)?),
        date_created: row.get::<_, SqlDate>(2)?.0,
        order_text: row.get(3)?,
        processed: row.get(4)?,
    })
}

pub(crate) const CATALOG_COLS: &str = "id, garden_id, date_uploaded, date_outgoing";

pub(crate) fn catalog_from_row(row: &Row<'_>) -> rusqlite::Result<ExternalCatalog> {
    Ok(ExternalCatalog {
        id: Some(CatalogId::new(row.get(0)?)),
        garden: GardenId::new(row.get(1)?),
        date_uploaded: row.get::<_, SqlDate>(2)?.0,
        date_outgoing: opt_date(row.get(3)?),
    })
}

pub(crate) const FAMILY_COLS: &str =
    "id, family, subfamily, tribus, subtribus, genus, genus_author, full_name_generated";

pub(crate) fn family_from_row(row: &Row<'_>) -> rusqlite::Result<Family> {
    Ok(Family {
        id: Some(FamilyId::new(row.get(0)?)),
        family: row.get(1)?,
        subfamily: row.get(2)?,
        tribus: row.get(3)?,
        subtribus: row.get(4)?,
        genus: row.get(5)?,
        genus_author: row.get(6)?,
        full_name_generated: row.get(7)?,
    })
}

pub(crate) const SPECIES_COLS: &str = "id, family_id, species, species_author, subspecies, \
     subspecies_author, variety, variety_author, form, form_author, cultivar, full_name_generated";

pub(crate) fn species_from_row(row: &Row<'_>) -> rusqlite::Result<Species> {
    Ok(Species {
        id: Some(SpeciesId::new(row.get(0)?)),
        family: FamilyId::new(row.get(1)?),
        species: row.get(2)?,
        species_author: row.get(3)?,
        subspecies: row.get(4)?,
        subspecies_author: row.get(5)?,
        variety: row.get(6)?,
        variety_author: row.get(7)?,
        form: row.get(8)?,
        form_author: row.get(9)?,
        cultivar: row.get(10)?,
        full_name_generated: row.get(11)?,
    })
}

pub(crate) const STATS_COLS: &str = "num_outplantings, num_individuals, num_species, num_genera, \
     num_outplantings_alive, num_individuals_alive, num_species_alive, num_genera_alive";

pub(crate) fn stats_from_row(row: &Row<'_>, start: usize) -> rusqlite::Result<AggregateStats> {
    Ok(AggregateStats {
        num_outplantings: row.get(start)?,
        num_individuals: row.get(start + 1)?,
        num_species: row.get(start + 2)?,
        num_genera: row.get(start + 3)?,
        num_outplantings_alive: row.get(start + 4)?,
        num_individuals_alive: row.get(start + 5)?,
        num_species_alive: row.get(start + 6)?,
        num_genera_alive: row.get(start + 7)?,
    })
}

pub(crate) fn territory_cols() -> String {
    format!("id, code, name, name_generated, {STATS_COLS}")
}

pub(crate) fn territory_from_row(row: &Row<'_>) -> rusqlite::Result<Territory> {
    Ok(Territory {
        id: Some(TerritoryId::new(row.get(0)?)),
        code: row.get(1)?,
        name: row.get(2)?,
        name_generated: row.get(3)?,
        stats: stats_from_row(row, 4)?,
    })
}

pub(crate) fn department_cols() -> String {
    format!("id, territory_id, code, name, full_code, {STATS_COLS}")
}

pub(crate) fn department_from_row(row: &Row<'_>) -> rusqlite::Result<Department> {
    Ok(Department {
        id: Some(DepartmentId::new(row.get(0)?)),
        territory: row.get::<_, Option<i64>>(1)?.map(TerritoryId::new),
        code: row.get(2)?,
        name: row.get(3)?,
        full_code: row.get(4)?,
        stats: stats_from_row(row, 5)?,
    })
}

pub(crate) const INDIVIDUAL_COLS: &str = "id, accession_number, order_number, species_id, \
     ipen_country, ipen_transfer_restricted, ipen_garden_id, ipen_accession_number, \
     seed_available, seed_in_stock, ipen_generated, id_name_generated, outplantings_generated, \
     alive_outplantings_generated, departments_generated, territories_generated, is_alive_generated";

pub(crate) fn individual_from_row(row: &Row<'_>) -> rusqlite::Result<Individual> {
    Ok(Individual {
        id: Some(IndividualId::new(row.get(0)?)),
        accession_number: row.get(1)?,
        order_number: row.get(2)?,
        species: SpeciesId::new(row.get(3)?),
        ipen_country: row.get(4)?,
        ipen_transfer_restricted: row.get(5)?,
        ipen_garden: GardenId::new(row.get(6)?),
        ipen_accession_number: row.get(7)?,
        seed_available: row.get(8)?,
        seed_in_stock: row.get(9)?,
        ipen_generated: row.get(10)?,
        id_name_generated: row.get(11)?,
        outplantings_generated: row.get::<_, IdList>(12)?.0,
        alive_outplantings_generated: row.get::<_, IdList>(13)?.0,
        departments_generated: row.get(14)?,
        territories_generated: row.get(15)?,
        is_alive_generated: row.get(16)?,
    })
}

pub(crate) const OUTPLANTING_COLS: &str =
    "id, department_id, individual_id, seeded_date, date, plant_died";

pub(crate) fn outplanting_from_row(row: &Row<'_>) -> rusqlite::Result<Outplanting> {
    Ok(Outplanting {
        id: Some(OutplantingId::new(row.get(0)?)),
        department: row.get::<_, Option<i64>>(1)?.map(DepartmentId::new),
        individual: IndividualId::new(row.get(2)?),
        seeded_date: opt_date(row.get(3)?),
        date: opt_date(row.get(4)?),
        plant_died: opt_date(row.get(5)?),
    })
}

pub(crate) fn fact_from_row(row: &Row<'_>) -> rusqlite::Result<OutplantingFact> {
    Ok(OutplantingFact {
        id: OutplantingId::new(row.get(0)?),
        individual: IndividualId::new(row.get(1)?),
        species: SpeciesId::new(row.get(2)?),
        genus: row.get(3)?,
        plant_died: opt_date(row.get(4)?),
    })
}
