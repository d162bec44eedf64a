//! Connection configuration for one or more named databases
//!
//! The registry is built once at process start from environment variables and
//! passed explicitly to everything that needs it; nothing reads the
//! environment after startup.
//!
//! Single-database mode (no `MSSQL_DB_KEYS`):
//! `MSSQL_SERVER`, `MSSQL_PORT`, `MSSQL_USER`, `MSSQL_PASSWORD`,
//! `MSSQL_DATABASE`, `MSSQL_ENCRYPT`, `MSSQL_TRUST_SERVER_CERTIFICATE`.
//!
//! Multi-database mode: `MSSQL_DB_KEYS=maindb,reportingdb` plus the same
//! variables per key, e.g. `MSSQL_MAINDB_USER`. The first listed key is the
//! default.

use serde::Serialize;

use crate::types::{DbError, DbResult};

/// Resolved connection parameters for one target database.
///
/// Immutable once built. `user`, `password`, and `database` are only
/// guaranteed non-empty after [`DbRegistry::resolve`] has accepted the entry.
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    pub server: String,
    pub port: Option<u16>,
    pub user: String,
    pub password: String,
    pub database: String,
    pub encrypt: bool,
    pub trust_server_certificate: bool,
}

impl ConnectionDescriptor {
    fn from_lookup(get: &impl Fn(&str) -> Option<String>, prefix: &str) -> Self {
        let var = |name: &str| get(&format!("{prefix}{name}"));

        let port = var("PORT").and_then(|raw| match raw.parse() {
            Ok(port) => Some(port),
            Err(_) => {
                tracing::warn!("ignoring unparsable {prefix}PORT value '{raw}'");
                None
            }
        });

        Self {
            server: var("SERVER").unwrap_or_else(|| "localhost".to_string()),
            port,
            user: var("USER").unwrap_or_default(),
            password: var("PASSWORD").unwrap_or_default(),
            database: var("DATABASE").unwrap_or_default(),
            encrypt: flag(var("ENCRYPT")),
            trust_server_certificate: flag(var("TRUST_SERVER_CERTIFICATE")),
        }
    }

    fn validate(&self, key: &str) -> DbResult<()> {
        let mut missing = Vec::new();
        if self.user.is_empty() {
            missing.push("user");
        }
        if self.password.is_empty() {
            missing.push("password");
        }
        if self.database.is_empty() {
            missing.push("database");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DbError::Config(format!(
                "Missing required database configuration for '{}': {}",
                key,
                missing.join(", ")
            )))
        }
    }

    /// Credential-free view for listings.
    pub fn masked(&self) -> MaskedDescriptor {
        MaskedDescriptor {
            server: self.server.clone(),
            port: self.port.unwrap_or(1433),
            database: self.database.clone(),
            user: self.user.clone(),
            options: MaskedTlsOptions {
                encrypt: self.encrypt,
                trust_server_certificate: self.trust_server_certificate,
            },
        }
    }
}

/// `true` enables; anything else (including unset) disables.
fn flag(value: Option<String>) -> bool {
    value.as_deref() == Some("true")
}

/// Descriptor with the password omitted, for `list_databases` output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskedDescriptor {
    pub server: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub options: MaskedTlsOptions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskedTlsOptions {
    pub encrypt: bool,
    pub trust_server_certificate: bool,
}

/// Ordered key → descriptor registry.
///
/// Construction never fails; required-field validation happens at resolve
/// time so the server can start before its environment is complete.
#[derive(Debug, Clone)]
pub struct DbRegistry {
    entries: Vec<(String, ConnectionDescriptor)>,
}

impl DbRegistry {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an injected variable lookup. Production uses
    /// [`DbRegistry::from_env`]; tests pass a map.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let keys: Vec<String> = get("MSSQL_DB_KEYS")
            .map(|raw| {
                raw.split(',')
                    .map(|key| key.trim().to_string())
                    .filter(|key| !key.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let entries = if keys.is_empty() {
            vec![(
                "default".to_string(),
                ConnectionDescriptor::from_lookup(&get, "MSSQL_"),
            )]
        } else {
            keys.into_iter()
                .map(|key| {
                    let prefix = format!("MSSQL_{}_", key.to_uppercase());
                    let descriptor = ConnectionDescriptor::from_lookup(&get, &prefix);
                    (key, descriptor)
                })
                .collect()
        };

        Self { entries }
    }

    /// Select a descriptor by key; `None` selects the default entry.
    pub fn resolve(&self, key: Option<&str>) -> DbResult<&ConnectionDescriptor> {
        let (key, descriptor) = match key {
            Some(wanted) => self
                .entries
                .iter()
                .find(|(name, _)| name == wanted)
                .map(|(name, descriptor)| (name.as_str(), descriptor))
                .ok_or_else(|| DbError::Config(format!("Unknown database key '{wanted}'")))?,
            None => self
                .entries
                .first()
                .map(|(name, descriptor)| (name.as_str(), descriptor))
                .ok_or_else(|| DbError::Config("No databases configured".to_string()))?,
        };

        descriptor.validate(key)?;
        Ok(descriptor)
    }

    pub fn default_key(&self) -> &str {
        self.entries.first().map(|(key, _)| key.as_str()).unwrap_or("default")
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConnectionDescriptor)> {
        self.entries
            .iter()
            .map(|(key, descriptor)| (key.as_str(), descriptor))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn single_db_mode_resolves_sole_descriptor() {
        let registry = DbRegistry::from_lookup(lookup(&[
            ("MSSQL_SERVER", "db.example.com"),
            ("MSSQL_PORT", "1433"),
            ("MSSQL_USER", "sa"),
            ("MSSQL_PASSWORD", "secret"),
            ("MSSQL_DATABASE", "Northwind"),
            ("MSSQL_ENCRYPT", "true"),
        ]));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.default_key(), "default");

        let descriptor = registry.resolve(None).unwrap();
        assert_eq!(descriptor.server, "db.example.com");
        assert_eq!(descriptor.port, Some(1433));
        assert_eq!(descriptor.database, "Northwind");
        assert!(descriptor.encrypt);
        assert!(!descriptor.trust_server_certificate);
    }

    #[test]
    fn missing_required_fields_fail_resolution() {
        let registry = DbRegistry::from_lookup(lookup(&[("MSSQL_USER", "sa")]));

        let err = registry.resolve(None).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Missing required database configuration"));
        assert!(message.contains("password"));
        assert!(message.contains("database"));
        assert!(!message.contains("user,"));
    }

    #[test]
    fn unknown_key_is_a_config_error() {
        let registry = DbRegistry::from_lookup(lookup(&[
            ("MSSQL_USER", "sa"),
            ("MSSQL_PASSWORD", "secret"),
            ("MSSQL_DATABASE", "Northwind"),
        ]));

        let err = registry.resolve(Some("reportingdb")).unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
        assert!(err.to_string().contains("reportingdb"));
    }

    #[test]
    fn multi_db_mode_uses_first_key_as_default() {
        let registry = DbRegistry::from_lookup(lookup(&[
            ("MSSQL_DB_KEYS", "maindb, reportingdb"),
            ("MSSQL_MAINDB_SERVER", "main.example.com"),
            ("MSSQL_MAINDB_USER", "app"),
            ("MSSQL_MAINDB_PASSWORD", "secret"),
            ("MSSQL_MAINDB_DATABASE", "Main"),
            ("MSSQL_REPORTINGDB_SERVER", "reports.example.com"),
            ("MSSQL_REPORTINGDB_USER", "reader"),
            ("MSSQL_REPORTINGDB_PASSWORD", "secret2"),
            ("MSSQL_REPORTINGDB_DATABASE", "Reports"),
        ]));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.default_key(), "maindb");
        assert_eq!(registry.resolve(None).unwrap().database, "Main");
        assert_eq!(
            registry.resolve(Some("reportingdb")).unwrap().database,
            "Reports"
        );
    }

    #[test]
    fn unparsable_port_is_ignored() {
        let registry = DbRegistry::from_lookup(lookup(&[
            ("MSSQL_PORT", "not-a-port"),
            ("MSSQL_USER", "sa"),
            ("MSSQL_PASSWORD", "secret"),
            ("MSSQL_DATABASE", "Northwind"),
        ]));

        assert_eq!(registry.resolve(None).unwrap().port, None);
    }

    #[test]
    fn masked_descriptor_omits_password() {
        let registry = DbRegistry::from_lookup(lookup(&[
            ("MSSQL_USER", "sa"),
            ("MSSQL_PASSWORD", "hunter2"),
            ("MSSQL_DATABASE", "Northwind"),
        ]));

        let masked = registry.resolve(None).unwrap().masked();
        let json = serde_json::to_string(&masked).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("\"port\":1433"));
        assert!(json.contains("trustServerCertificate"));
    }
}
