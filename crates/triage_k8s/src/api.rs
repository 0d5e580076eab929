use triage_core::error::AppError;

use crate::model::{Deployment, EventList, Node, Pod, ReplicaSet};

/// Read-only cluster queries used by enrichment.
pub trait ClusterApi {
    fn read_pod(&self, namespace: &str, name: &str) -> Result<Pod, AppError>;
    fn read_node(&self, name: &str) -> Result<Node, AppError>;
    /// At most `limit` events whose involved object is a pod.
    fn list_pod_events(&self, namespace: &str, limit: u32) -> Result<EventList, AppError>;
    fn read_replica_set(&self, namespace: &str, name: &str) -> Result<ReplicaSet, AppError>;
    fn read_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, AppError>;
}
