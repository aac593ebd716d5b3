use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReceiverConfig {
    pub keepalive_path: String,
    pub keepalive_interval_secs: u64,
    pub keepalive_disconnect_on_failure: bool,
    pub backoff_base_secs: f64,
    pub backoff_max_secs: f64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            keepalive_path: "/v1/keepalive".to_string(),
            keepalive_interval_secs: 55,
            keepalive_disconnect_on_failure: true,
            backoff_base_secs: 30.0,
            backoff_max_secs: 900.0,
        }
    }
}
