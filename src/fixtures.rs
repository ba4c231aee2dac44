//! Helper methods only available for tests
use crate::api::v1::cluster::{cluster_resource, ClusterSpec, ClusterStatus};
use crate::api::v1::scheduled_backup::{scheduled_backup_resource, ScheduledBackupSpec};
use crate::api::v1::{Cluster, ScheduledBackup, CNPG_GROUP, CNPG_VERSION};
use crate::config::{ClusterRef, Config};
use crate::postgres::{ActivityProbe, MockActivityProbe, ProbeFactory};
use crate::util::errors::Error;
use crate::util::secrets::Credentials;
use http::{Method, Request, Response};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::{client::Body, Client, ResourceExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

pub fn config() -> Config {
    Config {
        cluster: ClusterRef {
            namespace: "databases".to_string(),
            name: "pg".to_string(),
        },
        pod_name: "pg-1".to_string(),
        log_level: "debug".to_string(),
        cnpg_group: CNPG_GROUP.to_string(),
        cnpg_version: CNPG_VERSION.to_string(),
        check_interval: Duration::from_secs(60),
        cluster_refresh_interval: Duration::from_secs(30),
        metrics_bind_address: "127.0.0.1:0".to_string(),
    }
}

/// A cluster named `pg` with the given recorded primary and phase
pub fn cluster(current_primary: &str, phase: &str) -> Cluster {
    let mut cluster = Cluster::new(
        "pg",
        &cluster_resource(CNPG_GROUP, CNPG_VERSION),
        ClusterSpec::default(),
    )
    .within("databases");
    cluster.metadata.resource_version = Some("1".to_string());
    cluster.status = Some(ClusterStatus {
        current_primary: (!current_primary.is_empty()).then(|| current_primary.to_string()),
        phase: Some(phase.to_string()),
        ..Default::default()
    });
    cluster
}

pub fn with_annotations(mut cluster: Cluster, annotations: &[(&str, &str)]) -> Cluster {
    for (key, value) in annotations {
        cluster
            .annotations_mut()
            .insert(key.to_string(), value.to_string());
    }
    cluster
}

pub fn scheduled_backup() -> ScheduledBackup {
    let mut spec = ScheduledBackupSpec::default();
    spec.fields.insert("schedule".to_string(), json!("0 0 0 * * *"));
    spec.fields.insert("cluster".to_string(), json!({ "name": "pg" }));
    ScheduledBackup::new("pg", &scheduled_backup_resource(CNPG_GROUP, CNPG_VERSION), spec)
        .within("databases")
}

pub fn superuser_secret(entries: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some("pg-superuser".to_string()),
            namespace: Some("databases".to_string()),
            ..Default::default()
        },
        data: Some(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        ),
        ..Default::default()
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        username: "postgres".to_string(),
        password: "pw".to_string(),
        database: "postgres".to_string(),
        host: "localhost".to_string(),
        port: 5432,
    }
}

/// Hands out the given probes in order, one per call
pub fn probe_factory(probes: Vec<MockActivityProbe>) -> ProbeFactory {
    let probes = Mutex::new(probes.into_iter().rev().collect::<Vec<_>>());
    Box::new(move |given: &Credentials| -> Result<Box<dyn ActivityProbe>, Error> {
        assert_eq!(*given, credentials());
        match probes.lock().unwrap().pop() {
            Some(probe) => Ok(Box::new(probe) as Box<dyn ActivityProbe>),
            None => Err(Error::InvalidArgument("no probe left".to_string())),
        }
    })
}

type BodyCheck = Box<dyn FnOnce(Value) + Send>;

/// One expected request against the mocked apiserver and the reply to it
pub struct Exchange {
    method: Method,
    path: String,
    status: u16,
    response: Vec<u8>,
    check: Option<BodyCheck>,
}

pub fn get_ok<T: Serialize>(path: &str, object: &T) -> Exchange {
    Exchange {
        method: Method::GET,
        path: path.to_string(),
        status: 200,
        response: serde_json::to_vec(object).unwrap(),
        check: None,
    }
}

pub fn put_ok<T, F>(path: &str, object: &T, check: F) -> Exchange
where
    T: Serialize,
    F: FnOnce(Value) + Send + 'static,
{
    Exchange {
        method: Method::PUT,
        path: path.to_string(),
        status: 200,
        response: serde_json::to_vec(object).unwrap(),
        check: Some(Box::new(check)),
    }
}

pub fn status_err(method: &str, path: &str, code: u16, reason: &str) -> Exchange {
    let status = json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": format!("request to {} failed: {}", path, reason),
        "reason": reason,
        "code": code,
    });
    Exchange {
        method: Method::from_bytes(method.as_bytes()).unwrap(),
        path: path.to_string(),
        status: code,
        response: serde_json::to_vec(&status).unwrap(),
        check: None,
    }
}

type ApiServerHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;
pub struct ApiServerVerifier(ApiServerHandle);

impl ApiServerVerifier {
    pub fn new() -> (Client, Self) {
        let (mock_service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        (Client::new(mock_service, "default"), Self(handle))
    }

    /// Answer the expected requests in order.
    ///
    /// NB: a client making more calls than expected sees `Service(Closed(()))`
    /// once this task finishes and drops the handle.
    pub fn run(mut self, exchanges: Vec<Exchange>) -> JoinHandle<()> {
        tokio::spawn(async move {
            for exchange in exchanges {
                let (request, send) = self.0.next_request().await.expect("service not called");
                assert_eq!(request.method(), exchange.method);
                assert_eq!(request.uri().path(), exchange.path);
                if let Some(check) = exchange.check {
                    let body = request.into_body().collect_bytes().await.unwrap();
                    check(serde_json::from_slice(&body).unwrap());
                }
                send.send_response(
                    Response::builder()
                        .status(exchange.status)
                        .body(Body::from(exchange.response))
                        .unwrap(),
                );
            }
        })
    }
}

pub async fn timeout_after_1s(handle: JoinHandle<()>) {
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("timeout on mock apiserver")
        .expect("scenario succeeded")
}
