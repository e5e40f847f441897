//! Driver connection configuration

use std::collections::HashMap;

/// Connection configuration shared by drivers
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    /// Host address
    pub host: String,
    /// Port number (0 for the driver default)
    pub port: u16,
    /// Database name
    pub database: Option<String>,
    /// Username
    pub username: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Additional driver-specific parameters
    pub params: HashMap<String, String>,
}

impl ConnectionConfig {
    /// Create a configuration for a server-based database
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            ..Self::default()
        }
    }

    /// Set the database name
    pub fn with_database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }

    /// Set username and password credentials
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    /// Set a driver-specific parameter
    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    /// Get a string parameter, checking the params map before known fields
    pub fn get_string(&self, key: &str) -> Option<String> {
        if let Some(val) = self.params.get(key) {
            return Some(val.clone());
        }
        match key {
            "host" => Some(self.host.clone()),
            "database" => self.database.clone(),
            "username" | "user" => self.username.clone(),
            "password" => self.password.clone(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_string_prefers_params_over_fields() {
        let config = ConnectionConfig::new("localhost", 1433)
            .with_database("app")
            .with_param("database", "override");
        assert_eq!(config.get_string("database"), Some("override".to_string()));
    }

    #[test]
    fn test_get_string_falls_back_to_known_fields() {
        let config = ConnectionConfig::new("db.internal", 1433)
            .with_credentials("svc", "secret");
        assert_eq!(config.get_string("host"), Some("db.internal".to_string()));
        assert_eq!(config.get_string("user"), Some("svc".to_string()));
        assert_eq!(config.get_string("unknown"), None);
    }
}
