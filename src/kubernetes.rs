use futures::io::AsyncRead;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, LogParams};
use kube::core::Request;
use kube::{Api, Client, Config, Resource, ResourceExt};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info};

use crate::error::{BoxError, Result, TailError};
use crate::types::{StreamOptions, TargetRecord};

/// Raw log bytes of a single workload.
pub type LogStream<'a> = Pin<Box<dyn AsyncRead + Send + 'a>>;

/// Lists the workloads that can be tailed.
pub trait Inventory {
    fn list_targets(&self, kind: &str) -> impl Future<Output = Result<Vec<TargetRecord>>> + Send;
}

/// Opens live log streams for resolved targets.
pub trait LogProvider {
    fn open_log_stream<'a>(
        &'a self,
        target: &'a TargetRecord,
        options: StreamOptions,
    ) -> impl Future<Output = Result<LogStream<'a>>> + Send + 'a;
}

/// Inventory and log provider backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub async fn connect(in_cluster: bool) -> Result<Self> {
        let config = if in_cluster {
            Config::incluster().map_err(TailError::InCluster)?
        } else {
            Config::infer().await.map_err(TailError::Kubeconfig)?
        };
        info!("Connecting to cluster at {}", config.cluster_url);
        let client = Client::try_from(config).map_err(TailError::Client)?;
        Ok(Self { client })
    }

    async fn list_pods(&self) -> Result<Vec<TargetRecord>> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let list = pods
            .list(&ListParams::default())
            .await
            .map_err(|e| TailError::Inventory {
                kind: "pods".to_string(),
                source: Box::new(e),
            })?;
        debug!("Listed {} pods", list.items.len());

        Ok(list
            .items
            .iter()
            .map(|pod| TargetRecord::pod(pod.name_any(), pod.namespace().unwrap_or_default()))
            .collect())
    }
}

impl Inventory for KubeCluster {
    fn list_targets(&self, kind: &str) -> impl Future<Output = Result<Vec<TargetRecord>>> + Send {
        let kind = kind.to_ascii_lowercase();
        async move {
            match kind.as_str() {
                "pod" | "pods" => self.list_pods().await,
                _ => Err(TailError::UnsupportedKind(kind)),
            }
        }
    }
}

impl LogProvider for KubeCluster {
    fn open_log_stream<'a>(
        &'a self,
        target: &'a TargetRecord,
        options: StreamOptions,
    ) -> impl Future<Output = Result<LogStream<'a>>> + Send + 'a {
        async move {
            let open_error = |source: BoxError| TailError::StreamOpen {
                name: target.name.clone(),
                source,
            };
            let params = LogParams {
                follow: options.follow,
                tail_lines: Some(options.tail_lines),
                ..Default::default()
            };
            // Same request Api::<Pod>::log_stream builds, issued on the shared
            // client so the stream only borrows the cluster handle.
            let request = Request::new(Pod::url_path(&(), Some(target.namespace.as_str())))
                .logs(&target.name, &params)
                .map_err(|e| open_error(Box::new(e)))?;
            let stream = self
                .client
                .request_stream(request)
                .await
                .map_err(|e| open_error(Box::new(e)))?;
            Ok(Box::pin(stream) as LogStream<'a>)
        }
    }
}
