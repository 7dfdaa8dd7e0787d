#![forbid(unsafe_code)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod store;
pub mod telemetry;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the main types at crate root for convenience
pub use crate::config::Config;
pub use crate::core::{
    AggregateStats, BotanicGarden, CatalogId, Department, DepartmentId, EntityKind,
    ExternalCatalog, Family, FamilyId, GardenId, Individual, IndividualId, OrderId, OutgoingOrder,
    Outplanting, OutplantingId, Species, SpeciesId, Territory, TerritoryId,
};
pub use crate::engine::{BulkReport, EngineError, NumberField};
pub use crate::store::{Store, StoreError};
