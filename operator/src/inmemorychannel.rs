use crate::{Config, Error, OPERATOR, Result, config::channel_service_name, manager::Context};
use chrono::Utc;
use common::{
    ChannelConditionType, ConditionStatus, InMemoryChannel, InMemoryChannelStatus,
    inmemorychannel::{Addressable, ChannelLifecycle, DeliveryStatus},
};
use k8s_openapi::{
    api::{
        apps::v1::Deployment,
        core::v1::{Endpoints, Service, ServicePort, ServiceSpec},
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::{
    Resource, ResourceExt,
    api::{Api, Patch, PatchParams},
    runtime::{
        controller::Action,
        events::{Event, EventType, Recorder},
    },
};
use std::{collections::BTreeMap, sync::Arc};
use tokio::time::Duration;
use tracing::{Span, debug, field, info, instrument, warn};
use url::Url;

/// What a reconcile pass saw of the objects a channel depends on
#[derive(Clone, Debug, Default)]
pub struct Observations {
    pub dispatcher: Option<Deployment>,
    pub service: Option<Service>,
    pub endpoints: Option<Endpoints>,
    /// Error returned while applying the channel Service
    pub channel_service_error: Option<String>,
}

#[instrument(skip(ctx, channel), fields(channel))]
pub async fn reconcile(channel: Arc<InMemoryChannel>, ctx: Arc<Context>) -> Result<Action> {
    let ns = channel
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let name = channel.name_any();
    Span::current().record("channel", &field::display(format!("{ns}/{name}")));
    let _mes = ctx.metrics.channel.count_and_measure();
    ctx.diagnostics.write().await.last_event = Utc::now();

    let observations = observe(&channel, &ctx).await?;
    let generation = channel.metadata.generation.unwrap_or_default();
    let current = channel.status.clone().unwrap_or_default();
    let mut status = current.clone();
    {
        let mut lifecycle = status.lifecycle(&ctx.conditions);
        apply_observations(&mut lifecycle, &channel, &observations, &ctx.config)?;
        lifecycle.observe_generation(generation);
    }
    let ready = status.conditions.is_happy(generation);
    ctx.metrics.channel.set_ready(&channel, ready);

    if status != current {
        let api: Api<InMemoryChannel> = Api::namespaced(ctx.client.clone(), &ns);
        api.patch_status(&name, &PatchParams::default(), &Patch::Merge(status.to_patch()?))
            .await?;
        debug!("status of {ns}/{name} updated");
        if let Some(ev) = ready_event(&current, &status) {
            send_event(&ctx, &channel, ev).await?;
        }
    }
    if ready {
        Ok(Action::requeue(Duration::from_secs(ctx.config.requeue_seconds)))
    } else {
        Ok(Action::requeue(Duration::from_secs(30)))
    }
}

#[must_use]
pub fn error_policy(channel: Arc<InMemoryChannel>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!(
        "reconcile failed for '{:?}.{:?}': {:?}",
        channel.metadata.namespace, channel.metadata.name, error
    );
    ctx.metrics.channel.reconcile_failure(&channel, error);
    Action::requeue(Duration::from_secs(60))
}

async fn observe(channel: &InMemoryChannel, ctx: &Context) -> Result<Observations> {
    let cfg = &ctx.config;
    let deployments: Api<Deployment> = Api::namespaced(ctx.client.clone(), &cfg.system_namespace);
    let services: Api<Service> = Api::namespaced(ctx.client.clone(), &cfg.system_namespace);
    let endpoints: Api<Endpoints> = Api::namespaced(ctx.client.clone(), &cfg.system_namespace);
    let channel_service_error = match apply_channel_service(channel, ctx).await {
        Ok(()) => None,
        Err(e) => {
            warn!("Applying the channel Service of {} failed with: {e}", channel.name_any());
            Some(e.to_string())
        }
    };
    Ok(Observations {
        dispatcher: deployments.get_opt(&cfg.dispatcher_name).await?,
        service: services.get_opt(&cfg.dispatcher_name).await?,
        endpoints: endpoints.get_opt(&cfg.dispatcher_name).await?,
        channel_service_error,
    })
}

async fn apply_channel_service(channel: &InMemoryChannel, ctx: &Context) -> Result<()> {
    let svc = channel_service(channel, &ctx.config)?;
    let ns = svc.namespace().unwrap_or_default();
    let api: Api<Service> = Api::namespaced(ctx.client.clone(), &ns);
    api.patch(
        &svc.name_any(),
        &PatchParams::apply(OPERATOR).force(),
        &Patch::Apply(&svc),
    )
    .await?;
    Ok(())
}

/// ExternalName Service pointing the channel hostname to the dispatcher
pub fn channel_service(channel: &InMemoryChannel, config: &Config) -> Result<Service> {
    let ns = channel
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    Ok(Service {
        metadata: ObjectMeta {
            name: Some(channel_service_name(&channel.name_any())),
            namespace: Some(ns),
            labels: Some(BTreeMap::from([
                ("messaging.knative.dev/role".to_string(), "in-memory-channel".to_string()),
                ("app.kubernetes.io/managed-by".to_string(), "imc-controller".to_string()),
            ])),
            owner_references: channel.controller_owner_ref(&()).map(|o| vec![o]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ExternalName".to_string()),
            external_name: Some(config.dispatcher_host()),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: 80,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Translate what was observed into the channel conditions
pub fn apply_observations(
    lc: &mut ChannelLifecycle<'_>,
    channel: &InMemoryChannel,
    obs: &Observations,
    config: &Config,
) -> Result<()> {
    let ns = channel.namespace().unwrap_or_default();
    let dispatcher = format!("{}/{}", config.system_namespace, config.dispatcher_name);
    lc.initialize_conditions();

    match obs.dispatcher.as_ref().map(|d| d.status.as_ref()) {
        None => lc.mark_dispatcher_failed(
            "DispatcherDeploymentDoesNotExist",
            &format!("Dispatcher Deployment {dispatcher} does not exist"),
        )?,
        Some(None) => lc.mark_dispatcher_unknown(
            "DispatcherDeploymentUnknown",
            &format!("Dispatcher Deployment {dispatcher} has no status yet"),
        )?,
        Some(Some(status)) => lc.propagate_dispatcher_status(status)?,
    }

    if obs.service.is_some() {
        lc.mark_service_true()?;
    } else {
        lc.mark_service_failed(
            "DispatcherServiceDoesNotExist",
            &format!("Dispatcher Service {dispatcher} does not exist"),
        )?;
    }

    match obs.endpoints.as_ref() {
        None => lc.mark_endpoints_failed(
            "DispatcherEndpointsDoesNotExist",
            &format!("Dispatcher Endpoints {dispatcher} does not exist"),
        )?,
        Some(ep) if !has_ready_address(ep) => lc.mark_endpoints_failed(
            "DispatcherEndpointsNotReady",
            "There are no endpoints ready for Dispatcher service",
        )?,
        Some(_) => lc.mark_endpoints_true()?,
    }

    match obs.channel_service_error.as_deref() {
        Some(e) => lc.mark_channel_service_failed("ChannelServiceFailed", &format!("Channel Service failed: {e}"))?,
        None => lc.mark_channel_service_true()?,
    }

    lc.set_address(Some(Addressable::from_url(format!(
        "http://{}",
        config.channel_host(&channel.name_any(), &ns)
    ))))?;

    match channel.dead_letter_sink_uri().map(Url::parse) {
        None => lc.mark_dead_letter_sink_not_configured()?,
        Some(Ok(uri)) => lc.mark_dead_letter_sink_resolved_succeeded(DeliveryStatus {
            dead_letter_sink_uri: Some(uri.to_string()),
        })?,
        Some(Err(e)) => lc.mark_dead_letter_sink_resolved_failed(
            "Unable to get the DeadLetterSink's URI",
            &format!("Failed to parse the dead letter sink URI: {e}"),
        )?,
    }
    Ok(())
}

fn has_ready_address(ep: &Endpoints) -> bool {
    ep.subsets.as_ref().is_some_and(|subsets| {
        subsets
            .iter()
            .any(|s| s.addresses.as_ref().is_some_and(|a| !a.is_empty()))
    })
}

/// Event describing a change of the Ready condition, if it moved
fn ready_event(previous: &InMemoryChannelStatus, current: &InMemoryChannelStatus) -> Option<Event> {
    let before = previous
        .get_condition(ChannelConditionType::Ready)
        .map(|c| c.status);
    let after = current.get_condition(ChannelConditionType::Ready)?;
    if before == Some(after.status) {
        return None;
    }
    Some(match after.status {
        ConditionStatus::True => Event {
            type_: EventType::Normal,
            reason: "ChannelReady".to_string(),
            note: Some("InMemoryChannel is ready".to_string()),
            action: "Reconcile".to_string(),
            secondary: None,
        },
        status => {
            let note: String = format!(
                "Ready is {}: {} {}",
                status.as_str(),
                after.reason.as_deref().unwrap_or_default(),
                after.message.as_deref().unwrap_or_default()
            )
            .chars()
            .take(1023)
            .collect();
            Event {
                type_: EventType::Warning,
                reason: "ChannelNotReady".to_string(),
                note: Some(note),
                action: "Reconcile".to_string(),
                secondary: None,
            }
        }
    })
}

async fn send_event(ctx: &Context, channel: &InMemoryChannel, ev: Event) -> Result<()> {
    let reporter = ctx.diagnostics.read().await.reporter.clone();
    let oref = channel.object_ref(&());
    let recorder = Recorder::new(ctx.client.clone(), reporter, oref.clone());
    let reason = ev.reason.clone();
    match recorder.publish(ev).await {
        Ok(()) => {
            info!("{reason} {}/{}", oref.namespace.unwrap_or_default(), channel.name_any());
            Ok(())
        }
        Err(kube::Error::Api(src)) => {
            warn!("Ignoring {:?} while sending an event", src);
            Ok(())
        }
        Err(e) => Err(Error::KubeError(e)),
    }
}
