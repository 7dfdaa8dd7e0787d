//! Accessioned individuals and their outplantings.
//!
//! An Individual is one accession of a species; an Outplanting places it
//! in a department. The individual caches its IPEN code, its display name
//! and a summary of where it is planted.

use time::Date;

use super::identity::{DepartmentId, GardenId, IndividualId, OutplantingId, SpeciesId};

/// `id_name_generated` is capped at this many characters.
pub const ID_NAME_MAX_CHARS: usize = 100;

#[derive(Clone, Debug, PartialEq)]
pub struct Individual {
    pub id: Option<IndividualId>,
    /// Allocated by the number generator, unique.
    pub accession_number: i64,
    /// Allocated by the number generator, unique.
    pub order_number: i64,
    pub species: SpeciesId,

    pub ipen_country: String,
    pub ipen_transfer_restricted: String,
    pub ipen_garden: GardenId,
    pub ipen_accession_number: String,

    pub seed_available: bool,
    pub seed_in_stock: bool,

    pub ipen_generated: String,
    pub id_name_generated: String,
    pub outplantings_generated: Vec<OutplantingId>,
    pub alive_outplantings_generated: Vec<OutplantingId>,
    pub departments_generated: String,
    pub territories_generated: String,
    pub is_alive_generated: bool,
}

impl Individual {
    pub fn new(
        accession_number: i64,
        order_number: i64,
        species: SpeciesId,
        ipen_garden: GardenId,
    ) -> Self {
        Self {
            id: None,
            accession_number,
            order_number,
            species,
            ipen_country: String::new(),
            ipen_transfer_restricted: String::new(),
            ipen_garden,
            ipen_accession_number: String::new(),
            seed_available: false,
            seed_in_stock: false,
            ipen_generated: String::new(),
            id_name_generated: String::new(),
            outplantings_generated: Vec::new(),
            alive_outplantings_generated: Vec::new(),
            departments_generated: String::new(),
            territories_generated: String::new(),
            is_alive_generated: false,
        }
    }

    /// `"{COUNTRY}-{RESTRICTED}-{GARDEN_CODE}-{accession}"`. Everything is
    /// uppercased except the accession part, which is taken verbatim.
    pub fn ipen_code(&self, garden_code: &str) -> String {
        format!(
            "{}-{}-{}-{}",
            self.ipen_country.to_uppercase(),
            self.ipen_transfer_restricted.to_uppercase(),
            garden_code.to_uppercase(),
            self.ipen_accession_number
        )
    }

    /// `"{accession_number} ({species full name, no author})"`, truncated to
    /// 100 characters on a char boundary.
    pub fn id_name(&self, species_full_name: &str) -> String {
        let full = format!("{} ({})", self.accession_number, species_full_name);
        full.chars().take(ID_NAME_MAX_CHARS).collect()
    }

    /// Recompute the outplanting summary fields from the individual's
    /// current placement rows.
    pub fn apply_placements(&mut self, placements: &[Placement]) {
        let summary = PlacementSummary::from_placements(placements);
        self.outplantings_generated = summary.outplantings;
        self.alive_outplantings_generated = summary.alive_outplantings;
        self.departments_generated = summary.departments;
        self.territories_generated = summary.territories;
        self.is_alive_generated = summary.is_alive;
    }
}

/// An individual planted out in a department (or nowhere, when the
/// department is gone). The fact table behind all aggregate counters.
#[derive(Clone, Debug, PartialEq)]
pub struct Outplanting {
    pub id: Option<OutplantingId>,
    pub department: Option<DepartmentId>,
    pub individual: IndividualId,
    pub seeded_date: Option<Date>,
    pub date: Option<Date>,
    /// `None` means the plant is alive.
    pub plant_died: Option<Date>,
}

impl Outplanting {
    pub fn new(department: Option<DepartmentId>, individual: IndividualId) -> Self {
        Self {
            id: None,
            department,
            individual,
            seeded_date: None,
            date: None,
            plant_died: None,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.plant_died.is_none()
    }
}

/// One outplanting row joined with the location codes the individual's
/// summary fields are built from.
#[derive(Clone, Debug, PartialEq)]
pub struct Placement {
    pub id: OutplantingId,
    pub alive: bool,
    pub department_full_code: Option<String>,
    pub territory_code: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlacementSummary {
    pub outplantings: Vec<OutplantingId>,
    pub alive_outplantings: Vec<OutplantingId>,
    /// Space-joined sorted unique department full codes.
    pub departments: String,
    /// Space-joined sorted unique territory codes, each parenthesized.
    pub territories: String,
    pub is_alive: bool,
}

impl PlacementSummary {
    pub fn from_placements(placements: &[Placement]) -> Self {
        let outplantings = placements.iter().map(|p| p.id).collect();
        let alive_outplantings: Vec<OutplantingId> =
            placements.iter().filter(|p| p.alive).map(|p| p.id).collect();

        let mut departments: Vec<&str> = placements
            .iter()
            .filter_map(|p| p.department_full_code.as_deref())
            .collect();
        departments.sort_unstable();
        departments.dedup();

        let mut territories: Vec<&str> = placements
            .iter()
            .filter_map(|p| p.territory_code.as_deref())
            .collect();
        territories.sort_unstable();
        territories.dedup();
        let territories: Vec<String> =
            territories.iter().map(|code| format!("({code})")).collect();

        Self {
            is_alive: !alive_outplantings.is_empty(),
            outplantings,
            alive_outplantings,
            departments: departments.join(" "),
            territories: territories.join(" "),
        }
    }
}
