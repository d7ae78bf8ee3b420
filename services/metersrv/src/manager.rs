//! Registry of named connections

use std::collections::HashMap;
use std::sync::Arc;

use common::time::{SystemTimeProvider, TimeProvider};
use sml_codec::SmlCodec;
use tracing::info;

use crate::connection::Connection;
use crate::error::{MeterSrvError, Result};
use crate::history::HistoryPolicy;
use crate::model::ConnectionConfig;

/// Connections by name; no two connections share a serial port
pub struct ConnectionManager {
    connections: HashMap<String, Connection>,
    history_policy: HistoryPolicy,
    verify_crc: bool,
    clock: Arc<dyn TimeProvider>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            history_policy: HistoryPolicy::Unbounded,
            verify_crc: true,
            clock: Arc::new(SystemTimeProvider),
        }
    }

    /// History policy for connections created by [`add`](Self::add)
    pub fn with_history_policy(mut self, policy: HistoryPolicy) -> Self {
        self.history_policy = policy;
        self
    }

    pub fn with_crc_verification(mut self, verify: bool) -> Self {
        self.verify_crc = verify;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn TimeProvider>) -> Self {
        self.clock = clock;
        self
    }

    /// Create and register a connection for `config`
    pub fn add(&mut self, config: ConnectionConfig) -> Result<&mut Connection> {
        let connection = Connection::new(config)
            .with_codec(Box::new(SmlCodec::new().with_crc_verification(self.verify_crc)))
            .with_clock(Arc::clone(&self.clock))
            .with_history_policy(self.history_policy);
        self.insert(connection)
    }

    /// Register an already built connection
    pub fn insert(&mut self, connection: Connection) -> Result<&mut Connection> {
        let name = connection.name().to_string();
        if name.is_empty() {
            return Err(MeterSrvError::validation("Connection name must not be empty"));
        }
        if self.connections.contains_key(&name) {
            return Err(MeterSrvError::connection_exists(&name));
        }

        let port = &connection.config().port_name;
        if !port.is_empty() {
            if let Some(owner) = self.find_by_port(port) {
                return Err(MeterSrvError::port_in_use(port, owner.name()));
            }
        }

        info!("Registered connection {} on {}", name, port);
        Ok(self.connections.entry(name).or_insert(connection))
    }

    /// Unregister a connection, closing it first
    pub fn remove(&mut self, name: &str) -> Result<Connection> {
        let mut connection = self
            .connections
            .remove(name)
            .ok_or_else(|| MeterSrvError::connection_not_found(name))?;
        connection.close();
        info!("Removed connection {}", name);
        Ok(connection)
    }

    pub fn get(&self, name: &str) -> Option<&Connection> {
        self.connections.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Connection> {
        self.connections.get_mut(name)
    }

    pub fn find_by_port(&self, port: &str) -> Option<&Connection> {
        self.connections
            .values()
            .find(|c| c.config().port_name == port)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.connections.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Hand out all connections, leaving the registry empty
    pub fn drain(&mut self) -> Vec<Connection> {
        let mut connections: Vec<Connection> =
            self.connections.drain().map(|(_, c)| c).collect();
        connections.sort_by(|a, b| a.name().cmp(b.name()));
        connections
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::model::CommunicationProtocol;

    fn config(name: &str, port: &str) -> ConnectionConfig {
        ConnectionConfig::new(name, port, CommunicationProtocol::DssInformation)
    }

    #[test]
    fn test_add_and_lookup() {
        let mut manager = ConnectionManager::new();
        manager.add(config("garage", "/dev/ttyUSB1")).unwrap();
        manager.add(config("basement", "/dev/ttyUSB0")).unwrap();

        assert_eq!(manager.names(), vec!["basement", "garage"]);
        assert_eq!(manager.find_by_port("/dev/ttyUSB1").unwrap().name(), "garage");
        assert!(manager.find_by_port("COM1").is_none());
        assert!(manager.get("garage").is_some());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut manager = ConnectionManager::new();
        manager.add(config("garage", "/dev/ttyUSB1")).unwrap();
        let err = manager.add(config("garage", "/dev/ttyUSB2")).unwrap_err();
        assert_eq!(err.to_string(), "Connection already exists: garage");
    }

    #[test]
    fn test_port_conflict_names_owner() {
        let mut manager = ConnectionManager::new();
        manager.add(config("garage", "/dev/ttyUSB1")).unwrap();
        let err = manager.add(config("attic", "/dev/ttyUSB1")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Port /dev/ttyUSB1 already used by connection garage"
        );
        assert!(matches!(
            err,
            MeterSrvError::PortInUse { ref connection, .. } if connection == "garage"
        ));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_remove_closes() {
        let mut manager = ConnectionManager::new();
        manager.add(config("garage", "/dev/ttyUSB1")).unwrap().open().unwrap();

        let removed = manager.remove("garage").unwrap();
        assert!(!removed.is_connected());
        assert!(manager.is_empty());
        assert!(matches!(
            manager.remove("garage"),
            Err(MeterSrvError::ConnectionNotFound(_))
        ));
    }

    #[test]
    fn test_get_mut_swaps_config() {
        let mut manager = ConnectionManager::new();
        manager.add(config("garage", "/dev/ttyUSB1")).unwrap();

        let conn = manager.get_mut("garage").unwrap();
        conn.set_config(config("garage", "/dev/ttyUSB9"));
        assert!(manager.find_by_port("/dev/ttyUSB9").is_some());
    }
}
