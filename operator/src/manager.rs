use crate::{Config, Metrics, Result, inmemorychannel};
use chrono::{DateTime, Utc};
use common::{ChannelConditionType, ConditionSet, InMemoryChannel};
use futures::{FutureExt, StreamExt, future::BoxFuture};
use k8s_openapi::api::core::v1::Service;
use kube::{
    api::{Api, ListParams},
    client::Client,
    runtime::{controller::Controller, events::Reporter, watcher},
};
use prometheus_client::encoding::text::encode;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

// Context for our reconciler
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Controller settings
    pub config: Config,
    /// Conditions of an InMemoryChannel, validated once at startup
    pub conditions: ConditionSet<ChannelConditionType>,
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Prometheus metrics
    pub metrics: Metrics,
}

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    #[serde(skip)]
    pub reporter: Reporter,
}
impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reporter: Reporter {
                controller: "imc-controller".into(),
                instance: std::env::var("POD_NAME").ok(),
            },
        }
    }
}

/// Data owned by the Manager
#[derive(Clone, Default)]
pub struct Manager {
    /// Diagnostics populated by the reconciler
    diagnostics: Arc<RwLock<Diagnostics>>,
    metrics: Metrics,
}

/// Manager that owns a Controller for InMemoryChannel
impl Manager {
    /// Lifecycle initialization interface for app
    ///
    /// This returns a `Manager` that drives a `Controller` + a future to be awaited
    /// It is up to `main` to wait for the controller stream.
    pub async fn new(config: Config) -> Result<(Self, BoxFuture<'static, ()>)> {
        let client = Client::try_default().await?;
        let manager = Manager::default();
        let context = Arc::new(Context {
            client: client.clone(),
            config,
            conditions: ChannelConditionType::condition_set()?,
            diagnostics: manager.diagnostics.clone(),
            metrics: manager.metrics.clone(),
        });

        let channels = Api::<InMemoryChannel>::all(client.clone());
        // Ensure CRD is installed before loop-watching
        if let Err(e) = channels.list(&ListParams::default().limit(1)).await {
            tracing::error!("is the crd installed? please run: cargo run --bin crdgen | kubectl apply -f -");
            return Err(e.into());
        }

        // All good. Start controller and return its future.
        let controller = Controller::new(channels, watcher::Config::default().any_semantic())
            .owns(Api::<Service>::all(client), watcher::Config::default())
            .shutdown_on_signal()
            .run(inmemorychannel::reconcile, inmemorychannel::error_policy, context)
            .filter_map(|x| async move { std::result::Result::ok(x) })
            .for_each(|_| futures::future::ready(()))
            .boxed();

        Ok((manager, controller))
    }

    /// Metrics getter
    pub fn metrics(&self) -> Result<String> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.metrics.registry)?;
        Ok(buffer)
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }
}
