//! Row identifiers and entity kinds.
//!
//! Every entity is keyed by a signed 64-bit rowid. The newtypes keep the
//! dependency graph readable: a `DepartmentId` cannot be handed to a query
//! expecting a `TerritoryId`.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub fn new(raw: i64) -> Self {
                Self(raw)
            }

            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(
    /// A botanic garden (the institution itself or a partner garden).
    GardenId
);
id_newtype!(
    /// A taxonomic family/genus record.
    FamilyId
);
id_newtype!(SpeciesId);
id_newtype!(TerritoryId);
id_newtype!(DepartmentId);
id_newtype!(IndividualId);
id_newtype!(OutplantingId);
id_newtype!(
    /// An outgoing seed order to a partner garden.
    OrderId
);
id_newtype!(
    /// An uploaded seed catalog from a partner garden.
    CatalogId
);

/// Entity discriminator, used for cascade visited-sets and error reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Garden,
    OutgoingOrder,
    ExternalCatalog,
    Family,
    Species,
    Territory,
    Department,
    Individual,
    Outplanting,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Garden => "garden",
            Self::OutgoingOrder => "outgoing_order",
            Self::ExternalCatalog => "external_catalog",
            Self::Family => "family",
            Self::Species => "species",
            Self::Territory => "territory",
            Self::Department => "department",
            Self::Individual => "individual",
            Self::Outplanting => "outplanting",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
