//! Shared test fixture: a small inventory with one of everything.

use botgard::engine::cascade;
use botgard::{
    BotanicGarden, Config, Department, DepartmentId, Family, Individual, IndividualId,
    Outplanting, OutplantingId, Species, Store, Territory, TerritoryId,
};
use time::Date;

pub struct Inventory {
    pub store: Store,
    pub config: Config,
    pub garden: BotanicGarden,
    pub family: Family,
    pub species: Species,
    pub territory: Territory,
    pub department: Department,
    pub individual: Individual,
}

impl Inventory {
    /// One garden, one taxon, one territory/department, one individual.
    /// Everything saved through the cascade entry points, so all generated
    /// fields start out consistent.
    pub fn new() -> Self {
        let store = Store::open_in_memory().expect("open in-memory store");
        let config = Config::default();

        let mut family = Family::new("Rosaceae", "Rosa");
        family.genus_author = "L.".into();
        cascade::save_family(&store, &mut family).expect("save family");

        let mut species = Species::new(family.id.unwrap(), "canina");
        species.species_author = "L.".into();
        cascade::save_species(&store, &mut species).expect("save species");

        let mut garden = BotanicGarden::new(1, Some("G1"), "Home garden");
        cascade::save_garden(&store, &mut garden).expect("save garden");

        let mut territory = Territory::new("T1", "North field");
        cascade::save_territory(&store, &config, &mut territory).expect("save territory");

        let mut department = Department::new(territory.id, "D1", "Alpinum");
        cascade::save_department(&store, &config, &mut department).expect("save department");

        let mut individual = Individual::new(42, 1000, species.id.unwrap(), garden.id.unwrap());
        individual.ipen_country = "AU".into();
        individual.ipen_transfer_restricted = "0".into();
        individual.ipen_accession_number = "42".into();
        cascade::save_individual(&store, &mut individual).expect("save individual");

        Self {
            store,
            config,
            garden,
            family,
            species,
            territory,
            department,
            individual,
        }
    }

    pub fn territory_id(&self) -> TerritoryId {
        self.territory.id.unwrap()
    }

    pub fn department_id(&self) -> DepartmentId {
        self.department.id.unwrap()
    }

    pub fn individual_id(&self) -> IndividualId {
        self.individual.id.unwrap()
    }

    /// Outplant the fixture individual in the fixture department.
    pub fn outplant(&self, plant_died: Option<Date>) -> OutplantingId {
        let mut outplanting = Outplanting::new(self.department.id, self.individual_id());
        outplanting.plant_died = plant_died;
        cascade::save_outplanting(&self.store, &mut outplanting).expect("save outplanting");
        outplanting.id.unwrap()
    }

    /// Add another accessioned individual of the fixture species.
    pub fn add_individual(&self, accession_number: i64, order_number: i64) -> IndividualId {
        let mut individual = Individual::new(
            accession_number,
            order_number,
            self.species.id.unwrap(),
            self.garden.id.unwrap(),
        );
        individual.ipen_country = "AU".into();
        individual.ipen_transfer_restricted = "0".into();
        individual.ipen_accession_number = accession_number.to_string();
        cascade::save_individual(&self.store, &mut individual).expect("save individual");
        individual.id.unwrap()
    }
}
