use crate::protocol::Eid;
use std::time::Duration;

/// Which end of the connection this pipeline is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Bind, listen, accept, and re-accept after a disconnect.
    Server,
    /// Connect once; no reconnect.
    Client,
}

/// Pipeline configuration: endpoint identity, transport address, queue
/// and pool capacities, and the retry timing constants.
#[derive(Debug, Clone)]
pub struct Config {
    pub role: Role,
    pub host: String,
    pub port: u16,
    /// Endpoint ID stamped as the source of submitted requests.
    pub local_eid: Eid,
    /// Endpoint ID submitted requests are addressed to.
    pub peer_eid: Eid,
    pub packet_pool: usize,
    pub message_pool: usize,
    pub action_pool: usize,
    pub rx_packet_depth: usize,
    pub tx_packet_depth: usize,
    pub rx_message_depth: usize,
    pub tx_message_depth: usize,
    pub submission_depth: usize,
    pub completion_depth: usize,
    /// Resubmissions allowed after the first transmission, unless the
    /// submitter overrides the policy.
    pub default_retries: u32,
    /// Time an in-flight request may wait for its response before it is
    /// resubmitted or retired.
    pub action_delta: Duration,
    /// Retry scheduler tick interval.
    pub tick_delta: Duration,
    /// How long `run` waits for the pipeline to come up.
    pub startup_timeout: Duration,
}

impl Config {
    fn with_role(role: Role, host: &str, port: u16) -> Self {
        Self {
            role,
            host: host.to_owned(),
            port,
            local_eid: Eid::NULL,
            peer_eid: Eid::NULL,
            packet_pool: 1024,
            message_pool: 128,
            action_pool: 128,
            rx_packet_depth: 1024,
            tx_packet_depth: 1024,
            rx_message_depth: 128,
            tx_message_depth: 128,
            submission_depth: 128,
            completion_depth: 128,
            default_retries: 8,
            action_delta: Duration::from_millis(100),
            tick_delta: Duration::from_millis(1),
            startup_timeout: Duration::from_secs(5),
        }
    }

    /// A server pipeline bound to `host:port`.
    pub fn server(host: &str, port: u16) -> Self {
        Self::with_role(Role::Server, host, port)
    }

    /// A client pipeline connecting to `host:port`.
    pub fn client(host: &str, port: u16) -> Self {
        Self::with_role(Role::Client, host, port)
    }

    /// The `host:port` string this pipeline binds or connects to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
