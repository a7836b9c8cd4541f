// =============================================================================
// CONFIG — Réglages du moteur
// =============================================================================
//
// Un fichier JSON, tous les champs facultatifs :
//
//   { "cache_snapshots": true, "drop_empty_rows": false }
//
// =============================================================================

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("erreur d'entrée/sortie : {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration invalide : {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Garder chaque table exécutée sous son identifiant, pour qu'une
    /// requête suivante puisse repartir d'elle
    pub cache_snapshots: bool,
    /// Retirer les lignes dont toutes les valeurs affichées sont nulles
    pub drop_empty_rows: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            cache_snapshots: true,
            drop_empty_rows: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = EngineConfig::from_json_str(r#"{ "drop_empty_rows": false }"#).unwrap();
        assert!(config.cache_snapshots);
        assert!(!config.drop_empty_rows);
        assert_eq!(EngineConfig::from_json_str("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_invalid_config() {
        let err = EngineConfig::from_json_str(r#"{ "cache_snapshots": "oui" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Serde(_)));
        let err = EngineConfig::from_path("/nonexistent/tabrust.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_json_round_trip() {
        let config = EngineConfig { cache_snapshots: false, drop_empty_rows: true };
        let text = config.to_json().unwrap();
        assert_eq!(EngineConfig::from_json_str(&text).unwrap(), config);
    }
}
