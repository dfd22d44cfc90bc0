//! Admission review documents shared by the admission tests.

use serde_json::{json, Value};

/// Request identifier used by every fixture.
pub const UID: &str = "705ab4f5-6393-11e8-b7cc-42010a800002";

/// Coordinator address the fixtures are mutated with.
pub const COORDINATOR: &str = "coordinator-mesh-api.marblerun:25554";

/// A pod creation review as the API server sends it.
pub fn review_for(pod: Value) -> Value {
    json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": UID,
            "kind": { "group": "", "version": "v1", "kind": "Pod" },
            "resource": { "group": "", "version": "v1", "resource": "pods" },
            "requestKind": { "group": "", "version": "v1", "kind": "Pod" },
            "requestResource": { "group": "", "version": "v1", "resource": "pods" },
            "namespace": "injectable",
            "operation": "CREATE",
            "userInfo": {
                "username": "kubernetes-admin",
                "groups": ["system:masters", "system:authenticated"]
            },
            "object": pod,
            "oldObject": null,
            "dryRun": false,
            "options": { "kind": "CreateOptions", "apiVersion": "meta.k8s.io/v1" }
        }
    })
}

/// `testpod` in `injectable` with one container and no env.
pub fn testpod() -> Value {
    json!({
        "kind": "Pod",
        "apiVersion": "v1",
        "metadata": {
            "name": "testpod",
            "namespace": "injectable",
            "creationTimestamp": null,
            "labels": { "name": "testpod", "marblerun.marbletype": "test" }
        },
        "spec": {
            "containers": [{
                "name": "testpod",
                "image": "test:image",
                "command": ["/bin/bash"],
                "terminationMessagePath": "/dev/termination-log",
                "terminationMessagePolicy": "File",
                "imagePullPolicy": "IfNotPresent"
            }],
            "restartPolicy": "Always",
            "terminationGracePeriodSeconds": 30,
            "dnsPolicy": "ClusterFirst",
            "serviceAccountName": "default",
            "serviceAccount": "default",
            "securityContext": {},
            "schedulerName": "default-scheduler",
            "priority": 0,
            "enableServiceLinks": true
        },
        "status": {}
    })
}

/// Serialized review of [`testpod`].
pub fn testpod_review() -> Vec<u8> {
    review_for(testpod()).to_string().into_bytes()
}
