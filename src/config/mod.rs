//! Configuration: full-code template and identifier allocation strategies.

mod load;
mod schema;

pub use load::{load, load_or_default};
pub use schema::{Config, ConfigError, LoggingConfig, NumberStrategy, MIN_RANDOM_SPAN};
