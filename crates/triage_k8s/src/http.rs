use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use triage_core::error::AppError;

use crate::api::ClusterApi;
use crate::model::{Deployment, EventList, Node, Pod, ReplicaSet};

/// Mounted service account: `token` and the cluster CA bundle `ca.crt`.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Kubernetes REST client authenticated with a bearer token.
#[derive(Clone)]
pub struct HttpClusterApi {
    api_url: String,
    token: String,
    ca_file: Option<PathBuf>,
    agent: ureq::Agent,
}

impl std::fmt::Debug for HttpClusterApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClusterApi")
            .field("api_url", &self.api_url)
            .field("ca_file", &self.ca_file)
            .finish_non_exhaustive()
    }
}

impl HttpClusterApi {
    /// A client that verifies the API server against the default web roots.
    pub fn new(api_url: &str, token: &str) -> Result<Self, AppError> {
        let api_url = api_url.trim().trim_end_matches('/').to_string();
        if !api_url.starts_with("https://") && !api_url.starts_with("http://") {
            return Err(AppError::new(
                "K8S_INVALID_API_URL",
                "Kubernetes API URL must be an http(s) URL",
            )
            .with_details(format!("api_url={api_url}")));
        }
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::new("K8S_MISSING_TOKEN", "Kubernetes API token is empty"));
        }
        Ok(Self {
            api_url,
            token: token.to_string(),
            ca_file: None,
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
        })
    }

    /// Trust only the PEM certificates in `path` when verifying the API server.
    pub fn with_ca_file(self, path: &Path) -> Result<Self, AppError> {
        let tls = cluster_tls_config(path)?;
        Ok(Self {
            ca_file: Some(path.to_path_buf()),
            agent: ureq::AgentBuilder::new()
                .timeout(REQUEST_TIMEOUT)
                .tls_config(tls)
                .build(),
            ..self
        })
    }

    /// Explicit settings first, then the in-cluster service host and the mounted service account.
    ///
    /// An explicit `ca_file` must load. Otherwise `ca.crt` under `account_dir` is used when present.
    pub fn resolve(
        api_url: Option<&str>,
        token: Option<&str>,
        ca_file: Option<&str>,
        account_dir: &Path,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, AppError> {
        let api_url = match api_url.filter(|u| !u.trim().is_empty()) {
            Some(url) => url.to_string(),
            None => {
                let host = lookup("KUBERNETES_SERVICE_HOST").filter(|h| !h.is_empty());
                let Some(host) = host else {
                    return Err(AppError::new(
                        "K8S_NOT_CONFIGURED",
                        "No Kubernetes API URL configured and not running in a cluster",
                    )
                    .with_details("set K8S_API_URL or KUBERNETES_SERVICE_HOST"));
                };
                let port = lookup("KUBERNETES_SERVICE_PORT")
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| "443".to_string());
                format!("https://{host}:{port}")
            }
        };

        let token = match token.filter(|t| !t.trim().is_empty()) {
            Some(t) => t.to_string(),
            None => {
                let token_path = account_dir.join("token");
                std::fs::read_to_string(&token_path).map_err(|e| {
                    AppError::new("K8S_MISSING_TOKEN", "Failed to read service account token")
                        .with_details(format!("path={}; {e}", token_path.display()))
                })?
            }
        };

        let api = Self::new(&api_url, &token)?;
        match ca_file.filter(|p| !p.trim().is_empty()) {
            Some(path) => api.with_ca_file(Path::new(path.trim())),
            None => {
                let mounted = account_dir.join("ca.crt");
                if mounted.is_file() {
                    api.with_ca_file(&mounted)
                } else {
                    Ok(api)
                }
            }
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn ca_file(&self) -> Option<&Path> {
        self.ca_file.as_deref()
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, AppError> {
        let url = format!("{}{path}", self.api_url);
        let mut req = self
            .agent
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .set("authorization", &format!("Bearer {}", self.token))
            .set("accept", "application/json");
        for (k, v) in query {
            req = req.query(k, v);
        }

        match req.call() {
            Ok(r) if r.status() == 200 => r.into_json().map_err(|e| {
                AppError::new("K8S_DECODE_FAILED", "Failed to decode Kubernetes API response")
                    .with_details(format!("path={path}; {e}"))
            }),
            Ok(r) => Err(
                AppError::new("K8S_REQUEST_FAILED", "Kubernetes API request failed")
                    .with_details(format!("path={path}; status={}", r.status())),
            ),
            Err(ureq::Error::Status(404, _)) => Err(
                AppError::new("K8S_NOT_FOUND", "Kubernetes object not found")
                    .with_details(format!("path={path}")),
            ),
            Err(ureq::Error::Status(code, _)) => Err(
                AppError::new("K8S_REQUEST_FAILED", "Kubernetes API request failed")
                    .with_details(format!("path={path}; status={code}"))
                    .with_retryable(code == 429 || code >= 500),
            ),
            Err(e) => Err(
                AppError::new("K8S_UNREACHABLE", "Failed to reach the Kubernetes API")
                    .with_details(e.to_string())
                    .with_retryable(true),
            ),
        }
    }
}

fn cluster_tls_config(path: &Path) -> Result<Arc<rustls::ClientConfig>, AppError> {
    let invalid = |details: String| {
        AppError::new("K8S_CA_INVALID", "Failed to load the cluster CA bundle")
            .with_details(format!("path={}; {details}", path.display()))
    };

    let file = File::open(path).map_err(|e| invalid(e.to_string()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| invalid(e.to_string()))?;

    let mut roots = rustls::RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(invalid(format!("no usable certificates (ignored={ignored})")));
    }
    tracing::debug!(added, ignored, "loaded cluster CA bundle");

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| invalid(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Object names are DNS subdomains; anything else would change the request path.
pub fn object_name(name: &str) -> Result<&str, AppError> {
    let valid = !name.is_empty()
        && name.len() <= 253
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.');
    if valid {
        Ok(name)
    } else {
        Err(AppError::new("K8S_INVALID_NAME", "Invalid Kubernetes object name")
            .with_details(format!("name={name}")))
    }
}

pub fn pod_path(namespace: &str, name: &str) -> Result<String, AppError> {
    Ok(format!(
        "/api/v1/namespaces/{}/pods/{}",
        object_name(namespace)?,
        object_name(name)?
    ))
}

pub fn node_path(name: &str) -> Result<String, AppError> {
    Ok(format!("/api/v1/nodes/{}", object_name(name)?))
}

pub fn events_path(namespace: &str) -> Result<String, AppError> {
    Ok(format!("/api/v1/namespaces/{}/events", object_name(namespace)?))
}

pub fn replica_set_path(namespace: &str, name: &str) -> Result<String, AppError> {
    Ok(format!(
        "/apis/apps/v1/namespaces/{}/replicasets/{}",
        object_name(namespace)?,
        object_name(name)?
    ))
}

pub fn deployment_path(namespace: &str, name: &str) -> Result<String, AppError> {
    Ok(format!(
        "/apis/apps/v1/namespaces/{}/deployments/{}",
        object_name(namespace)?,
        object_name(name)?
    ))
}

impl ClusterApi for HttpClusterApi {
    fn read_pod(&self, namespace: &str, name: &str) -> Result<Pod, AppError> {
        self.get_json(&pod_path(namespace, name)?, &[])
    }

    fn read_node(&self, name: &str) -> Result<Node, AppError> {
        self.get_json(&node_path(name)?, &[])
    }

    fn list_pod_events(&self, namespace: &str, limit: u32) -> Result<EventList, AppError> {
        let limit = limit.to_string();
        self.get_json(
            &events_path(namespace)?,
            &[("fieldSelector", "involvedObject.kind=Pod"), ("limit", &limit)],
        )
    }

    fn read_replica_set(&self, namespace: &str, name: &str) -> Result<ReplicaSet, AppError> {
        self.get_json(&replica_set_path(namespace, name)?, &[])
    }

    fn read_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, AppError> {
        self.get_json(&deployment_path(namespace, name)?, &[])
    }
}
