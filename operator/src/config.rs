use clap::Parser;

/// Settings of the InMemoryChannel controller
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Namespace where the dispatcher runs
    #[arg(long, env = "SYSTEM_NAMESPACE", default_value = "knative-eventing")]
    pub system_namespace: String,
    /// Name of the dispatcher Deployment, Service and Endpoints
    #[arg(long, env = "DISPATCHER_NAME", default_value = "imc-dispatcher")]
    pub dispatcher_name: String,
    #[arg(long, env = "CLUSTER_DOMAIN", default_value = "cluster.local")]
    pub cluster_domain: String,
    /// Address of the health/metrics server
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:9000")]
    pub listen: String,
    /// Delay before a healthy channel is checked again
    #[arg(long, env = "REQUEUE_SECONDS", default_value_t = 300)]
    pub requeue_seconds: u64,
    /// Log as json lines
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl Config {
    pub fn dispatcher_host(&self) -> String {
        format!(
            "{}.{}.svc.{}",
            self.dispatcher_name, self.system_namespace, self.cluster_domain
        )
    }

    pub fn channel_host(&self, name: &str, namespace: &str) -> String {
        format!(
            "{}.{namespace}.svc.{}",
            channel_service_name(name),
            self.cluster_domain
        )
    }
}

pub fn channel_service_name(channel: &str) -> String {
    format!("{channel}-kn-channel")
}
