//! Act engine settings, loaded from the environment or a JSON file
use super::error::ConfigError;
use super::principal::{AccessPolicy, Role};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_VAT_RATE: f64 = 12.0;
pub const DEFAULT_NUMBER_PREFIX: &str = "ACT";
pub const DEFAULT_WORK_DESCRIPTION: &str =
    "Maintenance of snow disposal sites for receiving removed snow";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ActsConfig {
    /// Percent, e.g. 12.0
    pub vat_rate: f64,
    /// Trip statuses eligible for billing and reporting. Empty means no filter.
    pub valid_statuses: Vec<String>,
    pub number_prefix: String,
    pub work_description: String,
    pub generation_roles: Vec<Role>,
}

impl Default for ActsConfig {
    fn default() -> Self {
        Self {
            vat_rate: DEFAULT_VAT_RATE,
            valid_statuses: vec!["OK".to_string()],
            number_prefix: DEFAULT_NUMBER_PREFIX.to_string(),
            work_description: DEFAULT_WORK_DESCRIPTION.to_string(),
            generation_roles: vec![Role::Akimat, Role::Kgu, Role::Contractor, Role::Landfill],
        }
    }
}

impl ActsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same rules as [`ActsConfig::from_env`] over an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(raw) = get("ACTS_VAT_RATE") {
            let rate: f64 = raw.parse().map_err(|_| ConfigError::Invalid {
                field: "ACTS_VAT_RATE",
                reason: format!("{raw} is not a number"),
            })?;
            // a non-positive rate from the environment keeps the default
            if rate > 0.0 {
                cfg.vat_rate = rate;
            }
        }
        if let Some(raw) = get("ACTS_VALID_STATUSES") {
            let statuses = parse_list(&raw);
            if !statuses.is_empty() {
                cfg.valid_statuses = statuses;
            }
        }
        if let Some(prefix) = get("ACTS_NUMBER_PREFIX") {
            cfg.number_prefix = prefix;
        }
        if let Some(description) = get("ACTS_WORK_DESCRIPTION") {
            cfg.work_description = description;
        }
        if let Some(raw) = get("ACTS_GENERATION_ROLES") {
            cfg.generation_roles = parse_list(&raw)
                .iter()
                .map(|r| r.parse::<Role>())
                .collect::<Result<Vec<Role>, _>>()
                .map_err(|e| ConfigError::Invalid {
                    field: "ACTS_GENERATION_ROLES",
                    reason: e.to_string(),
                })?;
        }

        cfg.normalise();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let mut cfg: ActsConfig = serde_json::from_str(raw)?;
        cfg.normalise();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.vat_rate.is_finite() || self.vat_rate < 0.0 {
            return Err(ConfigError::Invalid {
                field: "vat_rate",
                reason: "must be >= 0".into(),
            });
        }
        if self.number_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "number_prefix",
                reason: "must not be empty".into(),
            });
        }
        if self.generation_roles.contains(&Role::Driver) {
            return Err(ConfigError::Invalid {
                field: "generation_roles",
                reason: "drivers cannot generate acts".into(),
            });
        }
        Ok(())
    }

    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy::new(self.generation_roles.clone())
    }

    fn normalise(&mut self) {
        self.valid_statuses = self
            .valid_statuses
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let cfg = ActsConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, ActsConfig::default());
    }

    #[test]
    fn environment_overrides_are_normalised() {
        let cfg = ActsConfig::from_lookup(lookup(&[
            ("ACTS_VAT_RATE", "16"),
            ("ACTS_VALID_STATUSES", " ok , finished,,"),
            ("ACTS_NUMBER_PREFIX", "AVR"),
            ("ACTS_GENERATION_ROLES", "akimat,kgu"),
        ]))
        .unwrap();

        assert_eq!(cfg.vat_rate, 16.0);
        assert_eq!(cfg.valid_statuses, vec!["OK", "FINISHED"]);
        assert_eq!(cfg.number_prefix, "AVR");
        assert_eq!(cfg.generation_roles, vec![Role::Akimat, Role::Kgu]);
    }

    #[test]
    fn non_positive_vat_from_environment_keeps_default() {
        let cfg = ActsConfig::from_lookup(lookup(&[("ACTS_VAT_RATE", "0")])).unwrap();
        assert_eq!(cfg.vat_rate, DEFAULT_VAT_RATE);
    }

    #[test]
    fn json_rejects_negative_vat_and_drivers() {
        assert!(ActsConfig::from_json_str(r#"{"vat_rate": -1.0}"#).is_err());
        assert!(ActsConfig::from_json_str(r#"{"generation_roles": ["DRIVER"]}"#).is_err());

        let cfg = ActsConfig::from_json_str(r#"{"vat_rate": 0.0, "valid_statuses": ["ok"]}"#).unwrap();
        assert_eq!(cfg.vat_rate, 0.0);
        assert_eq!(cfg.valid_statuses, vec!["OK"]);
        assert_eq!(cfg.number_prefix, DEFAULT_NUMBER_PREFIX);
    }
}
