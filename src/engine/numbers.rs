//! Collision-free allocation of accession and order numbers.

use std::time::{Duration, Instant};

use rand::Rng;

use crate::config::{Config, NumberStrategy};
use crate::store::Store;

use super::EngineError;

/// Wall-clock budget for the `random_range` strategy.
pub const RANDOM_BUDGET: Duration = Duration::from_secs(5);

/// Which unique identifier column is being allocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumberField {
    Accession,
    Order,
}

impl NumberField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accession => "accession_number",
            Self::Order => "order_number",
        }
    }

    fn exists(&self, store: &Store, value: i64) -> Result<bool, EngineError> {
        Ok(match self {
            Self::Accession => store.accession_number_exists(value)?,
            Self::Order => store.order_number_exists(value)?,
        })
    }

    fn max(&self, store: &Store) -> Result<Option<i64>, EngineError> {
        Ok(match self {
            Self::Accession => store.max_accession_number()?,
            Self::Order => store.max_order_number()?,
        })
    }

    fn at_least(&self, store: &Store, min: i64) -> Result<Vec<i64>, EngineError> {
        Ok(match self {
            Self::Accession => store.accession_numbers_at_least(min)?,
            Self::Order => store.order_numbers_at_least(min)?,
        })
    }
}

/// Allocate a number for `field` that no individual currently uses.
pub fn allocate(
    store: &Store,
    field: NumberField,
    strategy: &NumberStrategy,
) -> Result<i64, EngineError> {
    match *strategy {
        NumberStrategy::RandomRange { min, max } => {
            let start = Instant::now();
            let mut rng = rand::rng();
            loop {
                let candidate = rng.random_range(min..=max);
                if !field.exists(store, candidate)? {
                    return Ok(candidate);
                }
                if start.elapsed() > RANDOM_BUDGET {
                    return Err(EngineError::Exhausted {
                        field: field.as_str(),
                        budget: RANDOM_BUDGET,
                    });
                }
            }
        }
        // Highest existing value plus one. Gaps left by deletions stay open.
        NumberStrategy::Incremental { min } => Ok(match field.max(store)? {
            Some(max) => max + 1,
            None => min,
        }),
        // First gap in the sorted values >= min, so freed numbers get reused.
        NumberStrategy::IncrementalTight { min } => {
            let nums = field.at_least(store, min)?;
            let Some(&first) = nums.first() else {
                return Ok(min);
            };
            let mut prev = first;
            for &n in &nums {
                if n > prev + 1 {
                    return Ok(prev + 1);
                }
                prev = n;
            }
            Ok(prev + 1)
        }
    }
}

/// Allocate an accession number using the configured strategy.
pub fn new_accession_number(store: &Store, config: &Config) -> Result<i64, EngineError> {
    allocate(store, NumberField::Accession, &config.accession_generation)
}

/// Allocate an order number using the configured strategy.
pub fn new_order_number(store: &Store, config: &Config) -> Result<i64, EngineError> {
    allocate(store, NumberField::Order, &config.order_number_generation)
}
