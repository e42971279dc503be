//! # Configuration
//!
//! Memory budgets and growth sizes for one engine instance.
//!
//! Loaded once at startup, typically from a TOML file:
//!
//! ```toml
//! global_memory_bytes = 134217728
//! system_memory_bytes = 8388608
//! entity_chunk_capacity = 512
//! component_chunk_capacity = 512
//! ```
//!
//! Missing keys fall back to [`EcsConfig::default`].

use serde::{Deserialize, Serialize};

use crate::error::{EcsError, EcsResult};

/// Global memory budget: 128 MiB.
pub const DEFAULT_GLOBAL_MEMORY_BYTES: usize = 128 * 1024 * 1024;
/// System memory budget: 8 MiB.
pub const DEFAULT_SYSTEM_MEMORY_BYTES: usize = 8 * 1024 * 1024;
/// Objects per entity chunk.
pub const DEFAULT_ENTITY_CHUNK_CAPACITY: usize = 512;
/// Objects per component chunk.
pub const DEFAULT_COMPONENT_CHUNK_CAPACITY: usize = 512;
/// Slots added per entity handle table growth.
pub const DEFAULT_ENTITY_TABLE_GROW: usize = 1024;
/// Slots added per component id table growth.
pub const DEFAULT_COMPONENT_TABLE_GROW: usize = 1024;
/// Initial capacity of the pending-destroy queue.
pub const DEFAULT_PENDING_DESTROY_RESERVE: usize = 1024;

/// Configuration for an engine and its managers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcsConfig {
    /// Bytes of global memory every manager draws from.
    pub global_memory_bytes: usize,
    /// Bytes reserved for systems out of the global budget.
    pub system_memory_bytes: usize,
    /// Entities per chunk.
    pub entity_chunk_capacity: usize,
    /// Components per chunk.
    pub component_chunk_capacity: usize,
    /// Entity handle table growth block.
    pub entity_table_grow: usize,
    /// Component id table growth block.
    pub component_table_grow: usize,
    /// Initial capacity of the pending-destroy queue.
    pub pending_destroy_reserve: usize,
}

impl Default for EcsConfig {
    fn default() -> Self {
        Self {
            global_memory_bytes: DEFAULT_GLOBAL_MEMORY_BYTES,
            system_memory_bytes: DEFAULT_SYSTEM_MEMORY_BYTES,
            entity_chunk_capacity: DEFAULT_ENTITY_CHUNK_CAPACITY,
            component_chunk_capacity: DEFAULT_COMPONENT_CHUNK_CAPACITY,
            entity_table_grow: DEFAULT_ENTITY_TABLE_GROW,
            component_table_grow: DEFAULT_COMPONENT_TABLE_GROW,
            pending_destroy_reserve: DEFAULT_PENDING_DESTROY_RESERVE,
        }
    }
}

impl EcsConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidConfig`] on malformed TOML or invalid values.
    pub fn from_toml_str(source: &str) -> EcsResult<Self> {
        let config: Self = toml::from_str(source).map_err(|err| EcsError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidConfig`] if serialization fails.
    pub fn to_toml_string(&self) -> EcsResult<String> {
        toml::to_string(self).map_err(|err| EcsError::InvalidConfig(err.to_string()))
    }

    /// Checks that every capacity is usable.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> EcsResult<()> {
        let fields = [
            ("global_memory_bytes", self.global_memory_bytes),
            ("system_memory_bytes", self.system_memory_bytes),
            ("entity_chunk_capacity", self.entity_chunk_capacity),
            ("component_chunk_capacity", self.component_chunk_capacity),
            ("entity_table_grow", self.entity_table_grow),
            ("component_table_grow", self.component_table_grow),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, value)| *value == 0) {
            return Err(EcsError::InvalidConfig(format!("{name} must be greater than zero")));
        }

        if self.system_memory_bytes > self.global_memory_bytes {
            return Err(EcsError::InvalidConfig(format!(
                "system_memory_bytes ({}) exceeds global_memory_bytes ({})",
                self.system_memory_bytes, self.global_memory_bytes
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EcsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.global_memory_bytes, 134_217_728);
        assert_eq!(config.system_memory_bytes, 8_388_608);
        assert_eq!(config.entity_chunk_capacity, 512);
        assert_eq!(config.pending_destroy_reserve, 1024);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = EcsConfig::from_toml_str("entity_chunk_capacity = 64\n").unwrap();
        assert_eq!(config.entity_chunk_capacity, 64);
        assert_eq!(config.component_chunk_capacity, DEFAULT_COMPONENT_CHUNK_CAPACITY);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = EcsConfig::from_toml_str("component_table_grow = 0\n").unwrap_err();
        assert!(matches!(err, EcsError::InvalidConfig(msg) if msg.contains("component_table_grow")));
    }

    #[test]
    fn test_system_budget_must_fit() {
        let config = EcsConfig {
            global_memory_bytes: 1024,
            system_memory_bytes: 2048,
            ..EcsConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(EcsConfig::from_toml_str("entity_chunk_capacity = \"many\"").is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EcsConfig {
            entity_chunk_capacity: 32,
            ..EcsConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(EcsConfig::from_toml_str(&text).unwrap(), config);
    }
}
