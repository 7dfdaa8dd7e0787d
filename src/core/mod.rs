//! Core domain types for the garden inventory
//!
//! Module hierarchy follows type dependency order:
//! - identity: row id newtypes, EntityKind
//! - garden: BotanicGarden, OutgoingOrder, ExternalCatalog
//! - taxon: Family, Species
//! - location: Territory, Department, AggregateStats
//! - individual: Individual, Outplanting, placement summaries

pub mod garden;
pub mod identity;
pub mod individual;
pub mod location;
pub mod taxon;

pub use garden::{BotanicGarden, ExternalCatalog, OutgoingOrder};
pub use identity::{
    CatalogId, DepartmentId, EntityKind, FamilyId, GardenId, IndividualId, OrderId, OutplantingId,
    SpeciesId, TerritoryId,
};
pub use individual::{
    ID_NAME_MAX_CHARS, Individual, Outplanting, Placement, PlacementSummary,
};
pub use location::{AggregateStats, Department, OutplantingFact, Territory};
pub use taxon::{Family, Species};
