//! Taxonomy: families (with genus) and species.
//!
//! Both carry a cached `full_name_generated` column. The formulas are pure;
//! persistence and the Family -> Species -> Individual cascade live in the
//! engine.

use super::identity::{FamilyId, SpeciesId};

/// A family/genus record. One row per (family, genus) combination.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Family {
    pub id: Option<FamilyId>,
    pub family: String,
    pub subfamily: String,
    pub tribus: String,
    pub subtribus: String,
    pub genus: String,
    pub genus_author: String,

    pub full_name_generated: String,
}

impl Family {
    pub fn new(family: impl Into<String>, genus: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            genus: genus.into(),
            ..Self::default()
        }
    }

    /// `"{genus} {genus_author} - {family}"`, with subfamily/tribus/subtribus
    /// appended for Asteraceae. Empty parts keep their separating blanks;
    /// downstream consumers rely on the exact historical format.
    pub fn full_name(&self) -> String {
        if self.family.to_uppercase() == "ASTERACEAE" {
            format!(
                "{} {} - {} {} {} {}",
                self.genus, self.genus_author, self.family, self.subfamily, self.tribus,
                self.subtribus
            )
        } else {
            format!("{} {} - {}", self.genus, self.genus_author, self.family)
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Species {
    pub id: Option<SpeciesId>,
    pub family: FamilyId,
    pub species: String,
    pub species_author: String,
    pub subspecies: String,
    pub subspecies_author: String,
    pub variety: String,
    pub variety_author: String,
    pub form: String,
    pub form_author: String,
    pub cultivar: String,

    pub full_name_generated: String,
}

impl Species {
    pub fn new(family: FamilyId, species: impl Into<String>) -> Self {
        Self {
            id: None,
            family,
            species: species.into(),
            species_author: String::new(),
            subspecies: String::new(),
            subspecies_author: String::new(),
            variety: String::new(),
            variety_author: String::new(),
            form: String::new(),
            form_author: String::new(),
            cultivar: String::new(),
            full_name_generated: String::new(),
        }
    }

    /// First non-empty author, checked variety > subspecies > form > species.
    /// The precedence is historical and deliberately kept as-is.
    pub fn author_name(&self) -> &str {
        for author in [
            &self.variety_author,
            &self.subspecies_author,
            &self.form_author,
            &self.species_author,
        ] {
            if !author.is_empty() {
                return author;
            }
        }
        ""
    }

    /// Binomial plus optional subspecies/variety/form/cultivar, optionally
    /// followed by the author name. `genus` comes from the related [`Family`].
    pub fn full_name(&self, genus: &str, with_author: bool) -> String {
        let mut name = format!("{} {}", genus, self.species);
        if !self.subspecies.is_empty() {
            name.push_str(" subsp. ");
            name.push_str(&self.subspecies);
        }
        if !self.variety.is_empty() {
            name.push_str(" var. ");
            name.push_str(&self.variety);
        }
        if !self.form.is_empty() {
            name.push_str(" f. ");
            name.push_str(&self.form);
        }
        if !self.cultivar.is_empty() {
            name.push_str(" '");
            name.push_str(&self.cultivar);
            name.push('\'');
        }
        if with_author {
            let author = self.author_name();
            if !author.is_empty() {
                name.push(' ');
                name.push_str(author);
            }
        }
        name
    }
}
