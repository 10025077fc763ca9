use crate::{
    ChildStatusProjector, ConditionManager, ConditionSet, ConditionStore, Result,
    condition::{Condition, ConditionType},
};
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::DeploymentStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

/// Describe an in-memory best effort channel
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    kind = "InMemoryChannel",
    status = "InMemoryChannelStatus",
    shortname = "imc",
    group = "messaging.knative.dev",
    version = "v1",
    namespaced
)]
#[kube(
    doc = "Custom resource representing an in-memory channel",
    printcolumn = r#"
    {"name":"URL",    "type":"string", "description":"Address", "jsonPath":".status.address.url"},
    {"name":"Ready",  "type":"string", "description":"Ready", "jsonPath":".status.conditions[?(@.type == 'Ready')].status"},
    {"name":"Reason", "type":"string", "description":"Reason", "jsonPath":".status.conditions[?(@.type == 'Ready')].reason"},
    {"name":"last_updated", "type":"date", "description":"Last update date", "format": "date-time", "jsonPath":".status.conditions[?(@.type == 'Ready')].lastTransitionTime"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InMemoryChannelSpec {
    /// Delivery options applied to every subscriber
    pub delivery: Option<DeliverySpec>,
    /// Subscribers receiving the events of this channel
    #[serde(default)]
    pub subscribers: Vec<SubscriberSpec>,
}

#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySpec {
    /// Where to send events that could not be delivered
    pub dead_letter_sink: Option<Destination>,
    /// Number of retries before sending to the dead letter sink
    pub retry: Option<i32>,
}

#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    /// Absolute URI of the destination
    pub uri: Option<String>,
}

#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberSpec {
    /// UID of the subscription
    pub uid: Option<String>,
    /// Generation of the subscription
    pub generation: Option<i64>,
    pub subscriber_uri: Option<String>,
    pub reply_uri: Option<String>,
    pub delivery: Option<DeliverySpec>,
}

/// Addressable exposes where events can be sent
#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Addressable {
    /// Name of the address, the URL scheme
    pub name: Option<String>,
    pub url: Option<String>,
}

impl Addressable {
    pub fn from_url(url: impl Into<String>) -> Self {
        Addressable {
            name: None,
            url: Some(url.into()),
        }
    }
}

#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStatus {
    /// Resolved URI of the dead letter sink
    pub dead_letter_sink_uri: Option<String>,
}

#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Copy, Debug, Hash, JsonSchema)]
pub enum ChannelConditionType {
    /// All the conditions below are True
    Ready,
    /// The dispatcher Deployment is Available
    DispatcherReady,
    /// The dispatcher Service exists
    ServiceReady,
    /// The dispatcher Service is backed by at least one endpoint
    EndpointsReady,
    /// The channel has a non-empty hostname
    Addressable,
    /// The ExternalName Service representing the channel exists
    ChannelServiceReady,
    /// The dead letter sink is resolved, or none is configured
    DeadLetterSinkResolved,
}

impl ConditionType for ChannelConditionType {
    const READY: Self = ChannelConditionType::Ready;

    fn as_str(&self) -> &'static str {
        match self {
            ChannelConditionType::Ready => "Ready",
            ChannelConditionType::DispatcherReady => "DispatcherReady",
            ChannelConditionType::ServiceReady => "ServiceReady",
            ChannelConditionType::EndpointsReady => "EndpointsReady",
            ChannelConditionType::Addressable => "Addressable",
            ChannelConditionType::ChannelServiceReady => "ChannelServiceReady",
            ChannelConditionType::DeadLetterSinkResolved => "DeadLetterSinkResolved",
        }
    }
}

impl ChannelConditionType {
    /// Conditions of an InMemoryChannel; the dispatcher is only informational
    pub fn condition_set() -> Result<ConditionSet<Self>> {
        ConditionSet::builder()
            .dependent(ChannelConditionType::ServiceReady)
            .dependent(ChannelConditionType::EndpointsReady)
            .dependent(ChannelConditionType::Addressable)
            .dependent(ChannelConditionType::ChannelServiceReady)
            .dependent(ChannelConditionType::DeadLetterSinkResolved)
            .informational(ChannelConditionType::DispatcherReady)
            .build()
    }
}

const DISPATCHER_AVAILABLE: ChildStatusProjector<ChannelConditionType> = ChildStatusProjector::new(
    ChannelConditionType::DispatcherReady,
    "Available",
    "DispatcherDeployment",
    "Dispatcher Deployment",
);

/// The status object of `InMemoryChannel`
#[derive(Deserialize, Serialize, Eq, PartialEq, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InMemoryChannelStatus {
    #[serde(flatten)]
    pub conditions: ConditionStore<ChannelConditionType>,
    /// Address of the channel, null until one is known
    #[serde(default)]
    pub address: Option<Addressable>,
    /// Resolved delivery options
    #[serde(default)]
    pub delivery_status: DeliveryStatus,
}

impl InMemoryChannelStatus {
    pub fn get_condition(&self, condition_type: ChannelConditionType) -> Option<&Condition<ChannelConditionType>> {
        self.conditions.get(condition_type)
    }

    /// Start a lifecycle pass over this status
    pub fn lifecycle<'a>(&'a mut self, set: &'a ConditionSet<ChannelConditionType>) -> ChannelLifecycle<'a> {
        ChannelLifecycle {
            manager: set.manage(&mut self.conditions),
            address: &mut self.address,
            delivery_status: &mut self.delivery_status,
        }
    }

    /// Merge patch body for the status subresource
    pub fn to_patch(&self) -> Result<serde_json::Value> {
        Ok(json!({
            "apiVersion": "messaging.knative.dev/v1",
            "kind": "InMemoryChannel",
            "status": serde_json::to_value(self)?
        }))
    }
}

impl InMemoryChannel {
    /// Ready is True and the latest spec has been observed
    pub fn is_ready(&self) -> bool {
        let generation = self.metadata.generation.unwrap_or_default();
        self.status
            .as_ref()
            .is_some_and(|s| s.conditions.is_happy(generation))
    }

    /// Dead letter sink URI from the spec, if any
    pub fn dead_letter_sink_uri(&self) -> Option<&str> {
        self.spec
            .delivery
            .as_ref()
            .and_then(|d| d.dead_letter_sink.as_ref())
            .and_then(|s| s.uri.as_deref())
    }
}

/// Typed condition operations of an InMemoryChannel status
pub struct ChannelLifecycle<'a> {
    manager: ConditionManager<'a, ChannelConditionType>,
    address: &'a mut Option<Addressable>,
    delivery_status: &'a mut DeliveryStatus,
}

impl ChannelLifecycle<'_> {
    #[must_use]
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.manager = self.manager.at(now);
        self
    }

    pub fn initialize_conditions(&mut self) {
        self.manager.initialize_conditions();
    }

    pub fn observe_generation(&mut self, generation: i64) {
        self.manager.observe_generation(generation);
    }

    pub fn is_happy(&self, generation: i64) -> bool {
        self.manager.is_happy(generation)
    }

    pub fn get_condition(&self, condition_type: ChannelConditionType) -> Option<Condition<ChannelConditionType>> {
        self.manager.get_condition(condition_type)
    }

    /// Addressable is True only for a URL with a non-empty host
    pub fn set_address(&mut self, addr: Option<Addressable>) -> Result<()> {
        let scheme = addr
            .as_ref()
            .and_then(|a| a.url.as_deref())
            .and_then(|u| Url::parse(u).ok())
            .filter(|u| u.host_str().is_some_and(|h| !h.is_empty()))
            .map(|u| u.scheme().to_string());
        match (addr, scheme) {
            (Some(mut addr), Some(scheme)) => {
                addr.name = Some(scheme);
                *self.address = Some(addr);
                self.manager.mark_true(ChannelConditionType::Addressable)
            }
            (addr, _) => {
                *self.address = addr;
                self.manager.mark_false(
                    ChannelConditionType::Addressable,
                    "emptyHostname",
                    "hostname is the empty string",
                )
            }
        }
    }

    pub fn mark_dispatcher_failed(&mut self, reason: &str, message: &str) -> Result<()> {
        self.manager
            .mark_false(ChannelConditionType::DispatcherReady, reason, message)
    }

    pub fn mark_dispatcher_unknown(&mut self, reason: &str, message: &str) -> Result<()> {
        self.manager
            .mark_unknown(ChannelConditionType::DispatcherReady, reason, message)
    }

    /// Project the Available condition of the dispatcher Deployment
    pub fn propagate_dispatcher_status(&mut self, status: &DeploymentStatus) -> Result<()> {
        let conditions = status.conditions.as_deref().unwrap_or_default();
        DISPATCHER_AVAILABLE.project(&mut self.manager, conditions)?;
        Ok(())
    }

    pub fn mark_service_true(&mut self) -> Result<()> {
        self.manager.mark_true(ChannelConditionType::ServiceReady)
    }

    pub fn mark_service_failed(&mut self, reason: &str, message: &str) -> Result<()> {
        self.manager
            .mark_false(ChannelConditionType::ServiceReady, reason, message)
    }

    pub fn mark_service_unknown(&mut self, reason: &str, message: &str) -> Result<()> {
        self.manager
            .mark_unknown(ChannelConditionType::ServiceReady, reason, message)
    }

    pub fn mark_channel_service_true(&mut self) -> Result<()> {
        self.manager.mark_true(ChannelConditionType::ChannelServiceReady)
    }

    pub fn mark_channel_service_failed(&mut self, reason: &str, message: &str) -> Result<()> {
        self.manager
            .mark_false(ChannelConditionType::ChannelServiceReady, reason, message)
    }

    pub fn mark_channel_service_unknown(&mut self, reason: &str, message: &str) -> Result<()> {
        self.manager
            .mark_unknown(ChannelConditionType::ChannelServiceReady, reason, message)
    }

    pub fn mark_endpoints_true(&mut self) -> Result<()> {
        self.manager.mark_true(ChannelConditionType::EndpointsReady)
    }

    pub fn mark_endpoints_failed(&mut self, reason: &str, message: &str) -> Result<()> {
        self.manager
            .mark_false(ChannelConditionType::EndpointsReady, reason, message)
    }

    pub fn mark_endpoints_unknown(&mut self, reason: &str, message: &str) -> Result<()> {
        self.manager
            .mark_unknown(ChannelConditionType::EndpointsReady, reason, message)
    }

    pub fn mark_dead_letter_sink_resolved_succeeded(&mut self, delivery_status: DeliveryStatus) -> Result<()> {
        *self.delivery_status = delivery_status;
        self.manager
            .mark_true(ChannelConditionType::DeadLetterSinkResolved)
    }

    /// A channel without dead letter sink counts as resolved
    pub fn mark_dead_letter_sink_not_configured(&mut self) -> Result<()> {
        *self.delivery_status = DeliveryStatus::default();
        self.manager.mark_true_with_reason(
            ChannelConditionType::DeadLetterSinkResolved,
            "DeadLetterSinkNotConfigured",
            "No dead letter sink is configured.",
        )
    }

    pub fn mark_dead_letter_sink_resolved_failed(&mut self, reason: &str, message: &str) -> Result<()> {
        *self.delivery_status = DeliveryStatus::default();
        self.manager
            .mark_false(ChannelConditionType::DeadLetterSinkResolved, reason, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConditionSeverity;
    use k8s_openapi::api::apps::v1::DeploymentCondition;

    fn channel(generation: i64) -> InMemoryChannel {
        let mut imc = InMemoryChannel::new("events", InMemoryChannelSpec::default());
        imc.metadata.namespace = Some("default".to_string());
        imc.metadata.generation = Some(generation);
        imc
    }

    fn ready(status: &InMemoryChannelStatus) -> Condition<ChannelConditionType> {
        status.get_condition(ChannelConditionType::Ready).cloned().unwrap()
    }

    fn valid_address() -> Option<Addressable> {
        Some(Addressable::from_url(
            "http://events-kn-channel.default.svc.cluster.local",
        ))
    }

    fn all_healthy(lc: &mut ChannelLifecycle<'_>) {
        lc.mark_service_true().unwrap();
        lc.mark_endpoints_true().unwrap();
        lc.mark_channel_service_true().unwrap();
        lc.set_address(valid_address()).unwrap();
        lc.mark_dead_letter_sink_not_configured().unwrap();
    }

    #[test]
    fn test_channel_becomes_ready() {
        let set = ChannelConditionType::condition_set().unwrap();
        let mut imc = channel(2);
        let mut status = InMemoryChannelStatus::default();
        let mut lc = status.lifecycle(&set);
        lc.initialize_conditions();
        for t in [
            ChannelConditionType::ServiceReady,
            ChannelConditionType::EndpointsReady,
            ChannelConditionType::Addressable,
            ChannelConditionType::ChannelServiceReady,
            ChannelConditionType::DeadLetterSinkResolved,
        ] {
            assert!(lc.get_condition(t).unwrap().is_unknown());
        }
        assert!(lc.get_condition(ChannelConditionType::Ready).unwrap().is_unknown());

        lc.mark_service_true().unwrap();
        assert!(lc.get_condition(ChannelConditionType::Ready).unwrap().is_unknown());

        lc.mark_channel_service_true().unwrap();
        lc.mark_endpoints_true().unwrap();
        lc.set_address(valid_address()).unwrap();
        assert!(lc.get_condition(ChannelConditionType::Ready).unwrap().is_unknown());

        lc.mark_dead_letter_sink_not_configured().unwrap();
        assert!(lc.get_condition(ChannelConditionType::Ready).unwrap().is_true());
        assert!(!lc.is_happy(2));
        lc.observe_generation(2);
        assert!(lc.is_happy(2));

        imc.status = Some(status.clone());
        assert!(imc.is_ready());
        imc.metadata.generation = Some(3);
        assert!(!imc.is_ready());
        assert!(ready(&status).is_true());
    }

    #[test]
    fn test_initialize_seeds_only_dependents() {
        let set = ChannelConditionType::condition_set().unwrap();
        let mut status = InMemoryChannelStatus::default();
        status.lifecycle(&set).initialize_conditions();
        let seeded: Vec<&str> = status
            .conditions
            .conditions()
            .iter()
            .map(|c| c.condition_type.as_str())
            .collect();
        assert_eq!(
            seeded,
            [
                "Addressable",
                "ChannelServiceReady",
                "DeadLetterSinkResolved",
                "EndpointsReady",
                "Ready",
                "ServiceReady"
            ]
        );
        assert!(status.get_condition(ChannelConditionType::DispatcherReady).is_none());
    }

    #[test]
    fn test_service_failure_after_all_true() {
        let set = ChannelConditionType::condition_set().unwrap();
        let mut status = InMemoryChannelStatus::default();
        let mut lc = status.lifecycle(&set);
        lc.initialize_conditions();
        all_healthy(&mut lc);
        lc.mark_service_failed("NoService", "service missing").unwrap();
        let ready = ready(&status);
        assert!(ready.is_false());
        assert_eq!(ready.reason.as_deref(), Some("NoService"));
        assert_eq!(ready.message.as_deref(), Some("service missing"));
    }

    #[test]
    fn test_dispatcher_is_informational() {
        let set = ChannelConditionType::condition_set().unwrap();
        let mut status = InMemoryChannelStatus::default();
        let mut lc = status.lifecycle(&set);
        lc.initialize_conditions();
        all_healthy(&mut lc);
        lc.propagate_dispatcher_status(&DeploymentStatus {
            conditions: Some(vec![DeploymentCondition {
                type_: "Available".to_string(),
                status: "False".to_string(),
                reason: Some("MinimumReplicasUnavailable".to_string()),
                message: Some("Deployment does not have minimum availability.".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        })
        .unwrap();
        let dispatcher = status
            .get_condition(ChannelConditionType::DispatcherReady)
            .unwrap();
        assert!(dispatcher.is_false());
        assert_eq!(dispatcher.severity, ConditionSeverity::Info);
        assert_eq!(dispatcher.reason.as_deref(), Some("DispatcherDeploymentFalse"));
        assert_eq!(
            dispatcher.message.as_deref(),
            Some(
                "The status of Dispatcher Deployment is False: MinimumReplicasUnavailable : Deployment does not have minimum availability."
            )
        );
        assert!(ready(&status).is_true());
    }

    #[test]
    fn test_dispatcher_without_conditions_is_untouched() {
        let set = ChannelConditionType::condition_set().unwrap();
        let mut status = InMemoryChannelStatus::default();
        let mut lc = status.lifecycle(&set);
        lc.mark_dispatcher_unknown("DispatcherDeploymentUnknown", "starting").unwrap();
        lc.propagate_dispatcher_status(&DeploymentStatus::default()).unwrap();
        let dispatcher = status
            .get_condition(ChannelConditionType::DispatcherReady)
            .unwrap();
        assert!(dispatcher.is_unknown());
        assert_eq!(dispatcher.message.as_deref(), Some("starting"));
    }

    #[test]
    fn test_set_address() {
        let set = ChannelConditionType::condition_set().unwrap();
        let mut status = InMemoryChannelStatus::default();
        let mut lc = status.lifecycle(&set);
        lc.set_address(valid_address()).unwrap();
        assert_eq!(status.address.as_ref().unwrap().name.as_deref(), Some("http"));
        assert!(
            status
                .get_condition(ChannelConditionType::Addressable)
                .unwrap()
                .is_true()
        );

        for addr in [None, Some(Addressable::default()), Some(Addressable::from_url("not a url"))] {
            let mut lc = status.lifecycle(&set);
            lc.set_address(addr.clone()).unwrap();
            let c = status.get_condition(ChannelConditionType::Addressable).unwrap();
            assert!(c.is_false());
            assert_eq!(c.reason.as_deref(), Some("emptyHostname"));
            assert_eq!(c.message.as_deref(), Some("hostname is the empty string"));
            assert_eq!(status.address, addr);
        }
    }

    #[test]
    fn test_dead_letter_sink() {
        let set = ChannelConditionType::condition_set().unwrap();
        let mut status = InMemoryChannelStatus::default();
        let mut lc = status.lifecycle(&set);
        lc.mark_dead_letter_sink_resolved_succeeded(DeliveryStatus {
            dead_letter_sink_uri: Some("http://sink.default.svc.cluster.local".to_string()),
        })
        .unwrap();
        assert!(status.delivery_status.dead_letter_sink_uri.is_some());

        let mut lc = status.lifecycle(&set);
        lc.mark_dead_letter_sink_resolved_failed("Unable to get the DeadLetterSink's URI", "bad uri")
            .unwrap();
        assert_eq!(status.delivery_status, DeliveryStatus::default());
        assert!(
            status
                .get_condition(ChannelConditionType::DeadLetterSinkResolved)
                .unwrap()
                .is_false()
        );

        let mut lc = status.lifecycle(&set);
        lc.mark_dead_letter_sink_not_configured().unwrap();
        let c = status
            .get_condition(ChannelConditionType::DeadLetterSinkResolved)
            .unwrap();
        assert!(c.is_true());
        assert_eq!(c.reason.as_deref(), Some("DeadLetterSinkNotConfigured"));
        assert_eq!(c.message.as_deref(), Some("No dead letter sink is configured."));
    }

    #[test]
    fn test_status_patch_shape() {
        let set = ChannelConditionType::condition_set().unwrap();
        let mut status = InMemoryChannelStatus::default();
        let mut lc = status.lifecycle(&set);
        lc.initialize_conditions();
        lc.observe_generation(4);
        let patch = status.to_patch().unwrap();
        assert_eq!(patch["kind"], "InMemoryChannel");
        assert_eq!(patch["status"]["observedGeneration"], 4);
        assert_eq!(patch["status"]["conditions"].as_array().unwrap().len(), 6);
        assert_eq!(patch["status"]["address"], serde_json::Value::Null);
        assert_eq!(
            patch["status"]["deliveryStatus"]["deadLetterSinkUri"],
            serde_json::Value::Null
        );
        let back: InMemoryChannelStatus = serde_json::from_value(patch["status"].clone()).unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn test_dead_letter_sink_uri_from_spec() {
        let mut imc = channel(1);
        assert_eq!(imc.dead_letter_sink_uri(), None);
        imc.spec.delivery = Some(DeliverySpec {
            dead_letter_sink: Some(Destination {
                uri: Some("http://sink".to_string()),
            }),
            retry: Some(3),
        });
        assert_eq!(imc.dead_letter_sink_uri(), Some("http://sink"));
    }
}
