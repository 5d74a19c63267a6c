// mockhive-dispatch
//! Command dispatch for mock-service agents.
//!
//! Turns a logical operation (start, stop, status, api sync, api delete)
//! targeting one or more mock-service instances into concrete deliveries to
//! the per-node agent owning each instance's runtime: local-first routing via
//! the channel registry, one-hop broadcast across peer controllers for the
//! rest, and per-target failure isolation so one bad node never fails a batch.
//!
//! The dispatcher holds no persistent state. The registry, directory, peer
//! client, and metrics store are injected read-only capabilities, so tests
//! can supply deterministic fakes without a network layer.

pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod metrics;
pub mod peer;
pub mod registry;

pub use config::ControllerConfig;
pub use directory::{DirectoryError, NodeInfo, PeerDirectory, PeerInstance, StaticDirectory};
pub use dispatcher::Dispatcher;
pub use metrics::{MetricsError, MetricsStore, NoopMetricsStore};
pub use peer::{PeerClient, PeerError};
pub use registry::{AgentHandle, AgentRegistry, ChannelRegistry};
