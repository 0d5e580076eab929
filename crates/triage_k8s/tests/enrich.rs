use std::cell::RefCell;
use std::io::Write;

use pretty_assertions::assert_eq;
use serde_json::json;

use triage_core::domain::cluster::{ContainerState, OwnerContext};
use triage_core::domain::CanonicalIncident;
use triage_core::error::AppError;
use triage_core::normalize::normalize;
use triage_k8s::api::ClusterApi;
use triage_k8s::enrich::ClusterEnricher;
use triage_k8s::http::HttpClusterApi;
use triage_k8s::model::{Deployment, EventList, Node, Pod, ReplicaSet};

#[derive(Default)]
struct MockCluster {
    pod: Option<serde_json::Value>,
    node: Option<serde_json::Value>,
    events: Option<serde_json::Value>,
    replica_set: Option<serde_json::Value>,
    deployment: Option<serde_json::Value>,
    calls: RefCell<Vec<String>>,
}

fn decode<T: serde::de::DeserializeOwned>(v: &Option<serde_json::Value>, what: &str) -> Result<T, AppError> {
    match v {
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| AppError::new("K8S_DECODE_FAILED", "bad fixture").with_details(e.to_string())),
        None => Err(AppError::new("K8S_NOT_FOUND", "Kubernetes object not found").with_details(what)),
    }
}

impl ClusterApi for MockCluster {
    fn read_pod(&self, namespace: &str, name: &str) -> Result<Pod, AppError> {
        self.calls.borrow_mut().push(format!("pod {namespace}/{name}"));
        decode(&self.pod, "pod")
    }

    fn read_node(&self, name: &str) -> Result<Node, AppError> {
        self.calls.borrow_mut().push(format!("node {name}"));
        decode(&self.node, "node")
    }

    fn list_pod_events(&self, namespace: &str, limit: u32) -> Result<EventList, AppError> {
        self.calls.borrow_mut().push(format!("events {namespace} limit={limit}"));
        decode(&self.events, "events")
    }

    fn read_replica_set(&self, namespace: &str, name: &str) -> Result<ReplicaSet, AppError> {
        self.calls.borrow_mut().push(format!("rs {namespace}/{name}"));
        decode(&self.replica_set, "replicaset")
    }

    fn read_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, AppError> {
        self.calls.borrow_mut().push(format!("deploy {namespace}/{name}"));
        decode(&self.deployment, "deployment")
    }
}

fn crash_loop_incident() -> CanonicalIncident {
    normalize(json!({
        "detail-type": "K8s Pod Failure",
        "time": "2026-03-01T12:00:00Z",
        "detail": {
            "pod_name": "api-7d9f",
            "namespace": "prod",
            "status": "CrashLoopBackOff",
            "node_name": "ip-10-0-1-12",
            "restart_count": 5
        }
    }))
}

fn pod_fixture() -> serde_json::Value {
    json!({
        "metadata": {
            "name": "api-7d9f",
            "namespace": "prod",
            "ownerReferences": [
                { "kind": "ReplicaSet", "name": "api-5c8d", "uid": "rs-uid", "controller": true }
            ]
        },
        "spec": {
            "nodeName": "ip-10-0-1-12",
            "containers": [{
                "name": "api",
                "resources": { "requests": { "cpu": "250m" }, "limits": { "memory": "512Mi" } },
                "env": [
                    { "name": "DATABASE_URL", "value": "postgres://user:hunter2@db/prod" },
                    { "name": "LOG_LEVEL", "value": "debug" }
                ],
                "volumeMounts": [{ "name": "config", "mountPath": "/etc/api", "readOnly": true }]
            }]
        },
        "status": {
            "phase": "Running",
            "podIP": "10.1.2.3",
            "hostIP": "10.0.1.12",
            "qosClass": "Burstable",
            "startTime": "2026-03-01T11:00:00Z",
            "conditions": [{ "type": "Ready", "status": "False", "reason": "ContainersNotReady" }],
            "containerStatuses": [{
                "name": "api",
                "ready": false,
                "restartCount": 5,
                "image": "registry/api:1.2.3",
                "imageID": "registry/api@sha256:abc",
                "containerID": "containerd://123",
                "started": false,
                "state": { "waiting": { "reason": "CrashLoopBackOff", "message": "back-off 5m0s" } },
                "lastState": { "terminated": { "exitCode": 137, "reason": "OOMKilled" } }
            }]
        }
    })
}

fn full_cluster() -> MockCluster {
    MockCluster {
        pod: Some(pod_fixture()),
        node: Some(json!({
            "metadata": { "name": "ip-10-0-1-12" },
            "status": {
                "nodeInfo": {
                    "architecture": "amd64",
                    "osImage": "Bottlerocket",
                    "kernelVersion": "6.1.0",
                    "kubeletVersion": "v1.30.0",
                    "containerRuntimeVersion": "containerd://1.7.0"
                },
                "capacity": { "cpu": "4", "memory": "16Gi" },
                "allocatable": { "cpu": "3920m" },
                "conditions": [{ "type": "MemoryPressure", "status": "True" }]
            }
        })),
        events: Some(json!({
            "items": [{
                "metadata": { "name": "api-7d9f.17a", "namespace": "prod" },
                "reason": "BackOff",
                "message": "Back-off restarting failed container",
                "type": "Warning",
                "count": 12,
                "involvedObject": { "kind": "Pod", "name": "api-7d9f", "namespace": "prod" }
            }]
        })),
        replica_set: Some(json!({
            "metadata": {
                "name": "api-5c8d",
                "ownerReferences": [{ "kind": "Deployment", "name": "api", "uid": "dep-uid" }]
            },
            "spec": { "replicas": 3 }
        })),
        deployment: Some(json!({
            "metadata": { "name": "api" },
            "spec": { "replicas": 3, "strategy": { "type": "RollingUpdate" } },
            "status": { "readyReplicas": 2 }
        })),
        calls: RefCell::new(Vec::new()),
    }
}

#[test]
fn pod_failure_gets_full_cluster_context() {
    let cluster = full_cluster();
    let enricher = ClusterEnricher::new(&cluster, "eks-prod");
    let enriched = enricher.enrich(crash_loop_incident());

    let ctx = enriched.cluster_context.expect("cluster context");
    assert_eq!(ctx.cluster_name, "eks-prod");
    assert_eq!(ctx.pod_ip.as_deref(), Some("10.1.2.3"));
    assert_eq!(ctx.host_ip.as_deref(), Some("10.0.1.12"));
    assert_eq!(ctx.phase.as_deref(), Some("Running"));
    assert_eq!(ctx.qos_class.as_deref(), Some("Burstable"));
    assert_eq!(ctx.owner_references[0].name, "api-5c8d");
    assert_eq!(ctx.resource_requests["api"]["cpu"], "250m");
    assert_eq!(ctx.resource_limits["api"]["memory"], "512Mi");
    assert_eq!(ctx.environment_variables["api"], vec!["DATABASE_URL", "LOG_LEVEL"]);
    assert_eq!(ctx.volume_mounts["api"][0].mount_path, "/etc/api");
    assert_eq!(ctx.conditions[0].kind, "Ready");

    let status = &ctx.container_statuses[0];
    assert_eq!(status.restart_count, 5);
    assert_eq!(status.image_id, "registry/api@sha256:abc");
    assert_eq!(
        status.state,
        Some(ContainerState::Waiting {
            reason: Some("CrashLoopBackOff".to_string()),
            message: Some("back-off 5m0s".to_string()),
        })
    );
    assert!(matches!(
        status.last_state,
        Some(ContainerState::Terminated { exit_code: 137, .. })
    ));

    assert_eq!(
        ctx.owner,
        Some(OwnerContext::Deployment {
            deployment_name: "api".to_string(),
            deployment_replicas: Some(3),
            deployment_ready_replicas: 2,
            deployment_strategy: Some("RollingUpdate".to_string()),
        })
    );

    let node = ctx.node.expect("node context");
    assert_eq!(node.node_info.expect("node info").os_image, "Bottlerocket");
    assert_eq!(node.capacity["memory"], "16Gi");
    assert!(node.error.is_none());

    assert_eq!(ctx.recent_events.len(), 1);
    assert_eq!(ctx.recent_events[0].count, Some(12));

    let calls = cluster.calls.borrow();
    assert_eq!(calls[0], "pod prod/api-7d9f");
    assert!(calls.contains(&"events prod limit=10".to_string()));
}

#[test]
fn environment_values_never_reach_the_incident() {
    let cluster = full_cluster();
    let enriched = ClusterEnricher::new(&cluster, "eks-prod").enrich(crash_loop_incident());
    let rendered = serde_json::to_string(&enriched).expect("serialize");
    assert!(rendered.contains("DATABASE_URL"));
    assert!(!rendered.contains("hunter2"));
}

#[test]
fn replica_set_without_deployment_reports_replica_set() {
    let mut cluster = full_cluster();
    cluster.replica_set = Some(json!({ "metadata": { "name": "api-5c8d" }, "spec": { "replicas": 1 } }));
    let enriched = ClusterEnricher::new(&cluster, "c").enrich(crash_loop_incident());
    assert_eq!(
        enriched.cluster_context.expect("ctx").owner,
        Some(OwnerContext::ReplicaSet {
            replicaset_name: "api-5c8d".to_string(),
            replicaset_replicas: Some(1),
        })
    );
}

#[test]
fn owner_lookup_failure_keeps_rest_of_context() {
    let mut cluster = full_cluster();
    cluster.replica_set = None;
    let enriched = ClusterEnricher::new(&cluster, "c").enrich(crash_loop_incident());
    let ctx = enriched.cluster_context.expect("ctx");
    assert!(ctx.owner.is_none());
    assert_eq!(ctx.phase.as_deref(), Some("Running"));
}

#[test]
fn pod_read_failure_returns_input_unchanged() {
    let cluster = MockCluster::default();
    let incident = crash_loop_incident();
    let out = ClusterEnricher::new(&cluster, "c").enrich(incident.clone());
    assert_eq!(out, incident);
}

#[test]
fn non_pod_incidents_are_not_queried() {
    let cluster = full_cluster();
    let incident = normalize(json!({
        "detail-type": "RDS DB Instance Event",
        "time": "2026-03-01T00:00:00Z",
        "detail": { "SourceIdentifier": "orders-db" }
    }));
    let out = ClusterEnricher::new(&cluster, "c").enrich(incident.clone());
    assert_eq!(out, incident);
    assert!(cluster.calls.borrow().is_empty());

    let nameless = normalize(json!({ "detail-type": "K8s Pod Failure", "detail": {} }));
    let out = ClusterEnricher::new(&cluster, "c").enrich(nameless.clone());
    assert_eq!(out, nameless);
    assert!(cluster.calls.borrow().is_empty());
}

#[test]
fn node_and_event_queries_degrade_on_failure() {
    let cluster = MockCluster::default();
    let enricher = ClusterEnricher::new(&cluster, "c");

    let node = enricher.node_context("ip-10-0-1-12");
    assert_eq!(node.node_name, "ip-10-0-1-12");
    assert!(node.node_info.is_none());
    assert!(node.error.as_deref().is_some_and(|e| e.contains("K8S_NOT_FOUND")));

    assert!(enricher.namespace_events("prod", 10).is_empty());
}

const CLUSTER_CA: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/cluster-ca.pem");

fn service_account(token: &str, ca: Option<&str>) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut token_file = std::fs::File::create(dir.path().join("token")).expect("token file");
    writeln!(token_file, "{token}").expect("write token");
    if let Some(ca) = ca {
        std::fs::write(dir.path().join("ca.crt"), ca).expect("write ca");
    }
    dir
}

#[test]
fn resolve_prefers_explicit_config_then_service_account() {
    let empty = tempfile::tempdir().expect("tempdir");
    let api = HttpClusterApi::resolve(Some("https://k8s.example:6443"), Some("tok"), None, empty.path(), &|_| None)
        .expect("explicit config");
    assert_eq!(api.api_url(), "https://k8s.example:6443");
    assert_eq!(api.ca_file(), None);

    let account = service_account("sa-token", None);
    let lookup = |key: &str| match key {
        "KUBERNETES_SERVICE_HOST" => Some("10.96.0.1".to_string()),
        _ => None,
    };
    let api = HttpClusterApi::resolve(None, None, None, account.path(), &lookup).expect("in-cluster");
    assert_eq!(api.api_url(), "https://10.96.0.1:443");

    let err = HttpClusterApi::resolve(None, Some("tok"), None, account.path(), &|_| None).expect_err("no api url");
    assert_eq!(err.code, "K8S_NOT_CONFIGURED");

    let err = HttpClusterApi::resolve(Some("https://k8s"), None, None, empty.path(), &|_| None)
        .expect_err("no token file");
    assert_eq!(err.code, "K8S_MISSING_TOKEN");
}

#[test]
fn resolve_trusts_the_mounted_cluster_ca() {
    let pem = std::fs::read_to_string(CLUSTER_CA).expect("fixture");
    let account = service_account("sa-token", Some(pem.as_str()));
    let lookup = |key: &str| match key {
        "KUBERNETES_SERVICE_HOST" => Some("10.96.0.1".to_string()),
        "KUBERNETES_SERVICE_PORT" => Some("6443".to_string()),
        _ => None,
    };

    let api = HttpClusterApi::resolve(None, None, None, account.path(), &lookup).expect("in-cluster");
    assert_eq!(api.api_url(), "https://10.96.0.1:6443");
    assert_eq!(api.ca_file(), Some(account.path().join("ca.crt").as_path()));

    // An explicit CA file overrides the mounted one.
    let api = HttpClusterApi::resolve(None, None, Some(CLUSTER_CA), account.path(), &lookup).expect("override");
    assert_eq!(api.ca_file(), Some(std::path::Path::new(CLUSTER_CA)));
}

#[test]
fn unreadable_or_invalid_ca_fails_cleanly() {
    let account = service_account("sa-token", None);
    let missing = account.path().join("missing-ca.crt");
    let err = HttpClusterApi::resolve(
        Some("https://k8s.example:6443"),
        None,
        missing.to_str(),
        account.path(),
        &|_| None,
    )
    .expect_err("missing ca file");
    assert_eq!(err.code, "K8S_CA_INVALID");
    assert!(err.details.as_deref().is_some_and(|d| d.contains("missing-ca.crt")));

    let garbage = service_account("sa-token", Some("not a certificate\n"));
    let lookup = |key: &str| (key == "KUBERNETES_SERVICE_HOST").then(|| "10.96.0.1".to_string());
    let err = HttpClusterApi::resolve(None, None, None, garbage.path(), &lookup).expect_err("no certificates");
    assert_eq!(err.code, "K8S_CA_INVALID");

    let corrupt = "-----BEGIN CERTIFICATE-----\nTUlJQm9ndXM=\n-----END CERTIFICATE-----\n";
    let corrupt = service_account("sa-token", Some(corrupt));
    let err = HttpClusterApi::resolve(None, None, None, corrupt.path(), &lookup).expect_err("bad der");
    assert_eq!(err.code, "K8S_CA_INVALID");
}
