mod config;
mod load;

pub use crate::config::{Config, ContainmentConfig};
pub use load::{load, ConfigError, ConfigType};
