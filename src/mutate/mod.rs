//! Pod instrumentation: the JSON patch that injects marble parameters.
//!
//! The engine reads a narrow view of the pod ([`PodSpec`]) and produces a
//! list of typed [`PatchOperation`]s. It performs no I/O and never logs;
//! the admission server decides what to do with the result.

mod engine;
mod patch;

pub use engine::{build_patch, required_env, InjectionPolicy, SGX_TOLERATION_KEY};
pub use patch::{apply_patch, PatchError, PatchOperation};

use k8s_openapi::api::core::v1 as corev1;
use serde::Serialize;
use serde_json::{json, Value};

/// A single environment variable as written into a container spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvVar {
    /// Variable name.
    pub name: String,
    /// Literal value.
    pub value: String,
}

impl EnvVar {
    /// Create a variable from a name and value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// JSON form used in patch values.
    pub fn to_value(&self) -> Value {
        json!({ "name": self.name, "value": self.value })
    }
}

/// Container view: its name and the names of the env entries it already has.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Container {
    /// Container name.
    pub name: String,
    /// Names of existing env entries, in declaration order.
    pub env: Vec<String>,
}

impl Container {
    /// Whether an env entry called `name` is already declared.
    pub fn has_env(&self, name: &str) -> bool {
        self.env.iter().any(|existing| existing == name)
    }
}

/// The parts of a pod the engine looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodSpec {
    /// `metadata.name`.
    pub name: Option<String>,
    /// `metadata.generateName`.
    pub generate_name: Option<String>,
    /// `metadata.namespace`.
    pub namespace: Option<String>,
    /// `spec.containers`, in order.
    pub containers: Vec<Container>,
    /// Whether `spec.tolerations` is present in the document.
    pub has_tolerations: bool,
}

impl PodSpec {
    /// Extract the view from a decoded pod object.
    pub fn from_pod(pod: &corev1::Pod) -> Self {
        let containers = pod
            .spec
            .as_ref()
            .map(|spec| {
                spec.containers
                    .iter()
                    .map(|c| Container {
                        name: c.name.clone(),
                        env: c
                            .env
                            .iter()
                            .flatten()
                            .map(|var| var.name.clone())
                            .collect(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: pod.metadata.name.clone(),
            generate_name: pod.metadata.generate_name.clone(),
            namespace: pod.metadata.namespace.clone(),
            containers,
            has_tolerations: pod
                .spec
                .as_ref()
                .is_some_and(|spec| spec.tolerations.is_some()),
        }
    }

    /// Fill in the namespace when the pod document does not carry one.
    /// Pods created through the API server often leave it to the request.
    #[must_use]
    pub fn with_default_namespace(mut self, namespace: Option<&str>) -> Self {
        if self.namespace.as_deref().map_or(true, str::is_empty) {
            self.namespace = namespace.map(str::to_owned);
        }
        self
    }

    /// Marble type: the pod name, else the `generateName` prefix without
    /// its trailing dashes, else the empty string.
    pub fn marble_type(&self) -> &str {
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            return name;
        }
        self.generate_name
            .as_deref()
            .map(|prefix| prefix.trim_end_matches('-'))
            .unwrap_or_default()
    }

    /// Namespace, or the empty string.
    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or_default()
    }
}

/// DNS names for a marble type in a namespace, comma separated.
pub fn dns_names(marble_type: &str, namespace: &str) -> String {
    format!(
        "{marble_type},{marble_type}.{namespace},{marble_type}.{namespace}.svc.cluster.local"
    )
}

/// UUID file location for a marble type.
pub fn uuid_file(marble_type: &str) -> String {
    format!("/{marble_type}/data/uuid")
}
