use crate::registry::{ConnectionState, DeviceRecord};
use crate::sensor::telemetry::TelemetrySample;
use crate::transport::DeviceIdentity;

/// One tracked air-quality sensor node. Owned exclusively by the node
/// registry and mutated only in response to transport events or decoded
/// telemetry.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorNode {
    pub identity: DeviceIdentity,
    pub display_name: Option<String>,
    pub connection_state: ConnectionState,
    pub last_signal_strength: Option<i16>,
    pub latest_telemetry: Option<TelemetrySample>,
}

impl SensorNode {
    pub fn discovered(identity: DeviceIdentity, display_name: Option<String>) -> Self {
        SensorNode {
            identity,
            display_name,
            connection_state: ConnectionState::Discovered,
            last_signal_strength: None,
            latest_telemetry: None,
        }
    }
}

impl DeviceRecord for SensorNode {
    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    fn mark_connected(&mut self) {
        self.connection_state = ConnectionState::Connected;
    }
}
