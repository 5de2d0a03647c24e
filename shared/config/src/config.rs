use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub containment: ContainmentConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ContainmentConfig {
    /// Reset the local position of an entity to its new parent's origin when it is inserted
    /// into a container
    pub neutralize_position_on_insert: bool,

    /// Upper bound on the number of steps any walk up the spatial hierarchy may take. Anything
    /// deeper is assumed to be a cycle
    pub max_hierarchy_depth: usize,
}

impl Default for ContainmentConfig {
    fn default() -> Self {
        Self {
            neutralize_position_on_insert: true,
            max_hierarchy_depth: 1024,
        }
    }
}
