use std::collections::BTreeMap;

use triage_core::domain::cluster::{
    ContainerState, ContainerStatus, InvolvedObject, NamespaceEvent, NodeCondition, NodeContext,
    NodeInfo, OwnerContext, OwnerReference, PodCondition, VolumeMount,
};
use triage_core::domain::{CanonicalIncident, ClusterContext, PodFailure};
use triage_core::error::AppError;

use crate::api::ClusterApi;
use crate::model;

pub const DEFAULT_EVENT_LIMIT: u32 = 10;

/// Best-effort enrichment of pod-failure incidents from live cluster state.
pub struct ClusterEnricher<'a> {
    api: &'a dyn ClusterApi,
    cluster_name: String,
}

impl<'a> ClusterEnricher<'a> {
    pub fn new(api: &'a dyn ClusterApi, cluster_name: &str) -> Self {
        Self {
            api,
            cluster_name: cluster_name.to_string(),
        }
    }

    /// Attach cluster context to a pod-failure incident. Any other incident, or any failure to
    /// read the pod, returns the input unchanged.
    pub fn enrich(&self, incident: CanonicalIncident) -> CanonicalIncident {
        let Some(pod) = incident.pod_failure() else {
            return incident;
        };
        // "Unknown" is the normalizer's placeholder, never a real pod name.
        if pod.pod_name.is_empty() || pod.pod_name == PodFailure::default().pod_name {
            tracing::debug!("pod failure has no pod name, skipping enrichment");
            return incident;
        }

        match self.pod_context(pod) {
            Ok(ctx) => {
                tracing::info!(pod = %pod.pod_name, namespace = %pod.namespace, "incident enriched with cluster context");
                CanonicalIncident {
                    cluster_context: Some(ctx),
                    ..incident
                }
            }
            Err(e) => {
                tracing::warn!(pod = %pod.pod_name, error = %e.describe(), "cluster enrichment failed");
                incident
            }
        }
    }

    fn pod_context(&self, failure: &PodFailure) -> Result<ClusterContext, AppError> {
        let pod = self.api.read_pod(&failure.namespace, &failure.pod_name)?;
        let namespace = pod
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| failure.namespace.clone());

        let owner = match self.owner_context(&pod, &namespace) {
            Ok(owner) => owner,
            Err(e) => {
                tracing::warn!(error = %e.describe(), "owner lookup failed");
                None
            }
        };

        let node_name = pod
            .spec
            .node_name
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| Some(failure.node_name.clone()).filter(|n| !n.is_empty()));
        let node = node_name.map(|name| self.node_context(&name));

        let containers = &pod.spec.containers;
        Ok(ClusterContext {
            cluster_name: self.cluster_name.clone(),
            pod_ip: pod.status.pod_ip.clone(),
            host_ip: pod.status.host_ip.clone(),
            phase: pod.status.phase.clone(),
            qos_class: pod.status.qos_class.clone(),
            start_time: pod.status.start_time.clone(),
            owner_references: pod
                .metadata
                .owner_references
                .iter()
                .map(|r| OwnerReference {
                    kind: r.kind.clone(),
                    name: r.name.clone(),
                    uid: r.uid.clone(),
                    controller: r.controller,
                })
                .collect(),
            resource_requests: per_container(containers, |c| {
                c.resources
                    .as_ref()
                    .map(|r| r.requests.clone())
                    .filter(|m| !m.is_empty())
            }),
            resource_limits: per_container(containers, |c| {
                c.resources
                    .as_ref()
                    .map(|r| r.limits.clone())
                    .filter(|m| !m.is_empty())
            }),
            environment_variables: per_container(containers, |c| {
                let names: Vec<String> = c.env.iter().map(|e| e.name.clone()).collect();
                Some(names).filter(|n| !n.is_empty())
            }),
            volume_mounts: per_container(containers, |c| {
                let mounts: Vec<VolumeMount> = c
                    .volume_mounts
                    .iter()
                    .map(|vm| VolumeMount {
                        name: vm.name.clone(),
                        mount_path: vm.mount_path.clone(),
                        read_only: vm.read_only,
                    })
                    .collect();
                Some(mounts).filter(|m| !m.is_empty())
            }),
            conditions: pod
                .status
                .conditions
                .iter()
                .map(|c| PodCondition {
                    kind: c.kind.clone(),
                    status: c.status.clone(),
                    reason: c.reason.clone(),
                    message: c.message.clone(),
                    last_transition_time: c.last_transition_time.clone(),
                })
                .collect(),
            container_statuses: pod.status.container_statuses.iter().map(container_status).collect(),
            owner,
            node,
            recent_events: self.namespace_events(&namespace, DEFAULT_EVENT_LIMIT),
        })
    }

    /// Pod → ReplicaSet → Deployment. `None` when the pod has no ReplicaSet owner.
    fn owner_context(&self, pod: &model::Pod, namespace: &str) -> Result<Option<OwnerContext>, AppError> {
        let Some(rs_ref) = pod
            .metadata
            .owner_references
            .iter()
            .find(|r| r.kind == "ReplicaSet")
        else {
            return Ok(None);
        };

        let rs = self.api.read_replica_set(namespace, &rs_ref.name)?;
        if let Some(dep_ref) = rs
            .metadata
            .owner_references
            .iter()
            .find(|r| r.kind == "Deployment")
        {
            let dep = self.api.read_deployment(namespace, &dep_ref.name)?;
            return Ok(Some(OwnerContext::Deployment {
                deployment_name: dep.metadata.name.unwrap_or_else(|| dep_ref.name.clone()),
                deployment_replicas: dep.spec.replicas,
                deployment_ready_replicas: dep.status.ready_replicas.unwrap_or(0),
                deployment_strategy: dep.spec.strategy.and_then(|s| s.kind),
            }));
        }

        Ok(Some(OwnerContext::ReplicaSet {
            replicaset_name: rs.metadata.name.unwrap_or_else(|| rs_ref.name.clone()),
            replicaset_replicas: rs.spec.replicas,
        }))
    }

    /// Node hardware and health. On failure only `node_name` and `error` are set.
    pub fn node_context(&self, node_name: &str) -> NodeContext {
        match self.api.read_node(node_name) {
            Ok(node) => {
                let status = node.status;
                NodeContext {
                    node_name: node_name.to_string(),
                    node_info: status.node_info.map(|i| NodeInfo {
                        architecture: i.architecture,
                        os_image: i.os_image,
                        kernel_version: i.kernel_version,
                        kubelet_version: i.kubelet_version,
                        container_runtime_version: i.container_runtime_version,
                    }),
                    capacity: status.capacity,
                    allocatable: status.allocatable,
                    conditions: status
                        .conditions
                        .into_iter()
                        .map(|c| NodeCondition {
                            kind: c.kind,
                            status: c.status,
                            reason: c.reason,
                            message: c.message,
                        })
                        .collect(),
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(node = node_name, error = %e.describe(), "node lookup failed");
                NodeContext {
                    node_name: node_name.to_string(),
                    error: Some(e.describe()),
                    ..NodeContext::default()
                }
            }
        }
    }

    /// Recent pod events in `namespace`; empty on failure.
    pub fn namespace_events(&self, namespace: &str, limit: u32) -> Vec<NamespaceEvent> {
        match self.api.list_pod_events(namespace, limit) {
            Ok(list) => list
                .items
                .into_iter()
                .take(limit as usize)
                .map(|e| NamespaceEvent {
                    name: e.metadata.name.unwrap_or_default(),
                    namespace: e.metadata.namespace,
                    reason: e.reason,
                    message: e.message,
                    kind: e.kind,
                    count: e.count,
                    first_timestamp: e.first_timestamp,
                    last_timestamp: e.last_timestamp,
                    involved_object: InvolvedObject {
                        kind: e.involved_object.kind,
                        name: e.involved_object.name,
                        namespace: e.involved_object.namespace,
                    },
                })
                .collect(),
            Err(e) => {
                tracing::warn!(%namespace, error = %e.describe(), "event listing failed");
                Vec::new()
            }
        }
    }
}

fn per_container<T>(
    containers: &[model::Container],
    f: impl Fn(&model::Container) -> Option<T>,
) -> BTreeMap<String, T> {
    containers
        .iter()
        .filter_map(|c| f(c).map(|v| (c.name.clone(), v)))
        .collect()
}

fn container_state(state: &model::ContainerState) -> Option<ContainerState> {
    if let Some(w) = &state.waiting {
        return Some(ContainerState::Waiting {
            reason: w.reason.clone(),
            message: w.message.clone(),
        });
    }
    if let Some(r) = &state.running {
        return Some(ContainerState::Running {
            started_at: r.started_at.clone(),
        });
    }
    state.terminated.as_ref().map(|t| ContainerState::Terminated {
        exit_code: t.exit_code,
        reason: t.reason.clone(),
        message: t.message.clone(),
        started_at: t.started_at.clone(),
        finished_at: t.finished_at.clone(),
    })
}

fn container_status(s: &model::ContainerStatus) -> ContainerStatus {
    ContainerStatus {
        name: s.name.clone(),
        ready: s.ready,
        restart_count: s.restart_count,
        image: s.image.clone(),
        image_id: s.image_id.clone(),
        container_id: s.container_id.clone(),
        started: s.started,
        state: s.state.as_ref().and_then(container_state),
        last_state: s.last_state.as_ref().and_then(container_state),
    }
}
