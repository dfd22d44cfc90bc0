//! Patch construction for marble pods.

use serde_json::json;

use super::{dns_names, uuid_file, EnvVar, PatchOperation, PodSpec};
use crate::marble::{COORDINATOR_ADDR_ENV, DNS_NAMES_ENV, MARBLE_TYPE_ENV, UUID_FILE_ENV};

/// Toleration key for the SGX enclave page cache resource.
pub const SGX_TOLERATION_KEY: &str = "kubernetes.azure.com/sgx_epc_mem_in_MiB";

/// Process-wide injection settings, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionPolicy {
    /// Coordinator address written into every container.
    pub coordinator_addr: String,
    /// Toleration key used when trusted-hardware scheduling is requested.
    pub toleration_key: String,
}

impl InjectionPolicy {
    /// Policy with the default SGX toleration key.
    pub fn new(coordinator_addr: impl Into<String>) -> Self {
        Self {
            coordinator_addr: coordinator_addr.into(),
            toleration_key: SGX_TOLERATION_KEY.to_owned(),
        }
    }
}

/// The four variables every container must end up with, in injection order.
pub fn required_env(pod: &PodSpec, policy: &InjectionPolicy) -> [EnvVar; 4] {
    let marble_type = pod.marble_type();
    [
        EnvVar::new(COORDINATOR_ADDR_ENV, policy.coordinator_addr.as_str()),
        EnvVar::new(MARBLE_TYPE_ENV, marble_type),
        EnvVar::new(DNS_NAMES_ENV, dns_names(marble_type, pod.namespace())),
        EnvVar::new(UUID_FILE_ENV, uuid_file(marble_type)),
    ]
}

/// Build the patch for `pod`.
///
/// Containers without env entries receive one operation that sets the whole
/// list. Other containers receive one append per missing variable. Entries
/// that already exist are never touched. Operations follow container order
/// and are contiguous per container; the toleration operation, if any,
/// comes last.
pub fn build_patch(
    pod: &PodSpec,
    policy: &InjectionPolicy,
    inject_trust_toleration: bool,
) -> Vec<PatchOperation> {
    let required = required_env(pod, policy);
    let mut patch = Vec::new();

    for (idx, container) in pod.containers.iter().enumerate() {
        let path = format!("/spec/containers/{idx}/env");

        if container.env.is_empty() {
            patch.push(PatchOperation::SetList {
                path,
                items: required.iter().map(EnvVar::to_value).collect(),
            });
            continue;
        }

        patch.extend(
            required
                .iter()
                .filter(|var| !container.has_env(&var.name))
                .map(|var| PatchOperation::Append {
                    path: path.clone(),
                    item: var.to_value(),
                }),
        );
    }

    if inject_trust_toleration {
        patch.push(toleration_operation(pod, &policy.toleration_key));
    }

    patch
}

/// Writes the toleration list as a unit. Existing tolerations are dropped.
fn toleration_operation(pod: &PodSpec, key: &str) -> PatchOperation {
    let path = "/spec/tolerations".to_owned();
    let toleration = json!({ "key": key });
    if pod.has_tolerations {
        PatchOperation::Replace {
            path,
            value: json!([toleration]),
        }
    } else {
        PatchOperation::SetList {
            path,
            items: vec![toleration],
        }
    }
}
