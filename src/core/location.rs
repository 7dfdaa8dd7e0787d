//! Garden geography: territories, departments and their cached statistics.
//!
//! Territories contain departments; outplantings point at departments.
//! Both location kinds carry the same eight aggregate counters, recomputed
//! from the full outplanting working set rather than incrementally, because
//! the individual/species/genus counts are distinct-set cardinalities.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use time::Date;

use super::identity::{DepartmentId, IndividualId, OutplantingId, SpeciesId, TerritoryId};

#[derive(Clone, Debug, PartialEq)]
pub struct Territory {
    pub id: Option<TerritoryId>,
    /// Short territory code, unique.
    pub code: String,
    pub name: String,

    pub name_generated: String,
    pub stats: AggregateStats,
}

impl Territory {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            code: code.into(),
            name: name.into(),
            name_generated: String::new(),
            stats: AggregateStats::default(),
        }
    }

    /// `"{code} ({name})"`.
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.code, self.name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Department {
    pub id: Option<DepartmentId>,
    pub territory: Option<TerritoryId>,
    pub code: String,
    pub name: String,

    pub full_code: String,
    pub stats: AggregateStats,
}

impl Department {
    pub fn new(
        territory: Option<TerritoryId>,
        code: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            territory,
            code: code.into(),
            name: name.into(),
            full_code: String::new(),
            stats: AggregateStats::default(),
        }
    }

    /// Concatenate the configured template parts. `"territory"` expands to
    /// the territory code (empty when the department has none),
    /// `"department"` to the own code, anything else is taken verbatim.
    pub fn compose_full_code(&self, template: &[String], territory_code: Option<&str>) -> String {
        let mut out = String::new();
        for part in template {
            match part.as_str() {
                "territory" => {
                    if let Some(code) = territory_code {
                        out.push_str(code);
                    }
                }
                "department" => out.push_str(&self.code),
                literal => out.push_str(literal),
            }
        }
        out
    }
}

/// One row of the aggregate working set: an outplanting joined with the
/// individual, species and genus it counts towards.
#[derive(Clone, Debug, PartialEq)]
pub struct OutplantingFact {
    pub id: OutplantingId,
    pub individual: IndividualId,
    pub species: SpeciesId,
    pub genus: String,
    pub plant_died: Option<Date>,
}

impl OutplantingFact {
    pub fn is_alive(&self) -> bool {
        self.plant_died.is_none()
    }
}

/// The eight per-location counters cached on Territory and Department.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub num_outplantings: i64,
    pub num_individuals: i64,
    pub num_species: i64,
    pub num_genera: i64,
    pub num_outplantings_alive: i64,
    pub num_individuals_alive: i64,
    pub num_species_alive: i64,
    pub num_genera_alive: i64,
}

impl AggregateStats {
    /// Compute all eight counters from a working set of facts.
    pub fn from_facts(facts: &[OutplantingFact]) -> Self {
        let all = Subcounts::collect(facts.iter());
        let alive = Subcounts::collect(facts.iter().filter(|f| f.is_alive()));
        Self {
            num_outplantings: all.outplantings,
            num_individuals: all.individuals.len() as i64,
            num_species: all.species.len() as i64,
            num_genera: all.genera.len() as i64,
            num_outplantings_alive: alive.outplantings,
            num_individuals_alive: alive.individuals.len() as i64,
            num_species_alive: alive.species.len() as i64,
            num_genera_alive: alive.genera.len() as i64,
        }
    }

    pub fn num_outplantings_alive_percent(&self) -> String {
        percent(self.num_outplantings_alive, self.num_outplantings)
    }

    pub fn num_individuals_percent(&self) -> String {
        percent(self.num_individuals, self.num_outplantings)
    }

    pub fn num_individuals_alive_percent(&self) -> String {
        percent(self.num_individuals_alive, self.num_individuals)
    }

    pub fn num_species_percent(&self) -> String {
        percent(self.num_species, self.num_individuals)
    }

    pub fn num_species_alive_percent(&self) -> String {
        percent(self.num_species_alive, self.num_species)
    }

    pub fn num_genera_percent(&self) -> String {
        percent(self.num_genera, self.num_individuals)
    }

    pub fn num_genera_alive_percent(&self) -> String {
        percent(self.num_genera_alive, self.num_genera)
    }
}

struct Subcounts<'a> {
    outplantings: i64,
    individuals: HashSet<IndividualId>,
    species: HashSet<SpeciesId>,
    genera: HashSet<&'a str>,
}

impl<'a> Subcounts<'a> {
    fn collect(facts: impl Iterator<Item = &'a OutplantingFact>) -> Self {
        let mut sub = Self {
            outplantings: 0,
            individuals: HashSet::new(),
            species: HashSet::new(),
            genera: HashSet::new(),
        };
        for fact in facts {
            sub.outplantings += 1;
            sub.individuals.insert(fact.individual);
            sub.species.insert(fact.species);
            sub.genera.insert(fact.genus.as_str());
        }
        sub
    }
}

// Two decimals, but integral values keep a trailing ".0" ("50.0%", "0.0%").
fn percent(part: i64, whole: i64) -> String {
    let value = if whole > 0 {
        (part as f64 / whole as f64 * 10_000.0).round() / 100.0
    } else {
        0.0
    };
    if value.fract() == 0.0 {
        format!("{value:.1}%")
    } else {
        format!("{value}%")
    }
}
