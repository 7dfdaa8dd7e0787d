//! Botanic gardens and their incoming/outgoing paperwork.
//!
//! `BotanicGarden.full_name_generated`, `num_orders_generated` and
//! `catalog_date_generated` are cached columns; the formulas live here,
//! the counting queries live in the store, and the cascade stitches them
//! together on every save of a garden, order or catalog.

use time::Date;

use super::identity::{CatalogId, GardenId, OrderId};

#[derive(Clone, Debug, PartialEq)]
pub struct BotanicGarden {
    pub id: Option<GardenId>,
    /// Institution number, unique across all gardens.
    pub number: i64,
    /// IPEN garden code. Stored uppercased; empty input becomes `None`.
    pub code: Option<String>,
    pub name: String,

    pub full_name_generated: String,
    pub num_orders_generated: i64,
    pub catalog_date_generated: Option<Date>,
}

impl BotanicGarden {
    pub fn new(number: i64, code: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            number,
            code: code.map(str::to_owned),
            name: name.into(),
            full_name_generated: String::new(),
            num_orders_generated: 0,
            catalog_date_generated: None,
        }
    }

    /// `"{number} ({code|-}/{name})"`.
    pub fn full_name(&self) -> String {
        let code = self.code.as_deref().unwrap_or("-");
        format!("{} ({}/{})", self.number, code, self.name)
    }

    /// Uppercase the IPEN code and turn an empty string into `None`.
    pub fn normalize_code(&mut self) {
        self.code = match self.code.take() {
            Some(code) if !code.is_empty() => Some(code.to_uppercase()),
            _ => None,
        };
    }
}

/// An order of seed material sent out to a partner garden.
#[derive(Clone, Debug, PartialEq)]
pub struct OutgoingOrder {
    pub id: Option<OrderId>,
    pub garden: GardenId,
    pub date_created: Date,
    pub order_text: String,
    pub processed: bool,
}

impl OutgoingOrder {
    pub fn new(garden: GardenId, date_created: Date, order_text: impl Into<String>) -> Self {
        Self {
            id: None,
            garden,
            date_created,
            order_text: order_text.into(),
            processed: false,
        }
    }
}

/// A seed catalog uploaded for a partner garden.
#[derive(Clone, Debug, PartialEq)]
pub struct ExternalCatalog {
    pub id: Option<CatalogId>,
    pub garden: GardenId,
    pub date_uploaded: Date,
    pub date_outgoing: Option<Date>,
}

impl ExternalCatalog {
    pub fn new(garden: GardenId, date_uploaded: Date) -> Self {
        Self {
            id: None,
            garden,
            date_uploaded,
            date_outgoing: None,
        }
    }
}
