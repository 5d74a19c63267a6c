//! Peer directory: which controller instances exist and which node IPs each
//! can route to.
//!
//! Directory membership can change between dispatches (instances scale up
//! and down), so the dispatcher re-resolves it on every batch and never
//! caches the answer.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use mockhive_core::NodeId;

/// Errors resolving the directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("service discovery error: {0}")]
    Discovery(String),
}

impl From<DirectoryError> for mockhive_core::DispatchError {
    fn from(err: DirectoryError) -> Self {
        mockhive_core::DispatchError::Directory(err.to_string())
    }
}

/// A node a controller host can locally route to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: NodeId,
    pub ip: String,
    pub port: u16,
}

/// One peer controller instance, resolved at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInstance {
    /// Host IP the instance runs on; compared against controller-node IPs
    /// and against our own host to skip ourselves.
    pub host: String,
    /// Base URL for forwarding, e.g. `http://10.0.0.2:8085`.
    pub endpoint_base: String,
}

/// Service-discovery view of the controller cluster.
#[async_trait]
pub trait PeerDirectory: Send + Sync {
    /// Controller-capable hosts, keyed by host IP, each with the nodes it
    /// advertises. An empty map means remote routing is unconfigured, which
    /// the dispatcher treats as a hard error for the whole call.
    async fn controller_hosts(&self) -> Result<HashMap<String, Vec<NodeInfo>>, DirectoryError>;

    /// All controller service instances currently registered, in directory
    /// order. Single-target dispatch probes them in exactly this order.
    async fn service_instances(&self) -> Result<Vec<PeerInstance>, DirectoryError>;
}

/// File- or config-backed [`PeerDirectory`] for static deployments.
///
/// Larger clusters plug a real discovery client in behind the trait; the
/// static form is also what tests use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticDirectory {
    pub hosts: HashMap<String, Vec<NodeInfo>>,
    pub instances: Vec<PeerInstance>,
}

impl StaticDirectory {
    pub fn new(hosts: HashMap<String, Vec<NodeInfo>>, instances: Vec<PeerInstance>) -> Self {
        Self { hosts, instances }
    }

    /// Load the directory from a JSON file.
    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let content = fs::read_to_string(path)?;
        let directory = serde_json::from_str(&content)?;
        Ok(directory)
    }

    /// Save the directory to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), DirectoryError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[async_trait]
impl PeerDirectory for StaticDirectory {
    async fn controller_hosts(&self) -> Result<HashMap<String, Vec<NodeInfo>>, DirectoryError> {
        Ok(self.hosts.clone())
    }

    async fn service_instances(&self) -> Result<Vec<PeerInstance>, DirectoryError> {
        Ok(self.instances.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> StaticDirectory {
        let mut hosts = HashMap::new();
        hosts.insert(
            "10.0.0.2".to_string(),
            vec![NodeInfo {
                node_id: NodeId::new("10.0.1.5"),
                ip: "10.0.1.5".to_string(),
                port: 8025,
            }],
        );
        StaticDirectory::new(
            hosts,
            vec![PeerInstance {
                host: "10.0.0.2".to_string(),
                endpoint_base: "http://10.0.0.2:8085".to_string(),
            }],
        )
    }

    #[tokio::test]
    async fn test_static_directory_resolves() {
        let directory = sample();
        let hosts = directory.controller_hosts().await.unwrap();
        assert_eq!(hosts.len(), 1);
        assert!(hosts.contains_key("10.0.0.2"));

        let instances = directory.service_instances().await.unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].endpoint_base, "http://10.0.0.2:8085");
    }

    #[test]
    fn test_load_save_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("directory.json");

        let directory = sample();
        directory.save(&path).unwrap();

        let loaded = StaticDirectory::load(&path).unwrap();
        assert_eq!(loaded, directory);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = StaticDirectory::load(Path::new("/nonexistent/directory.json"));
        assert!(matches!(result, Err(DirectoryError::Io(_))));
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("directory.json");
        fs::write(&path, "{not json").unwrap();

        let result = StaticDirectory::load(&path);
        assert!(matches!(result, Err(DirectoryError::Json(_))));
    }
}
