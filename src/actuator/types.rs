use crate::registry::{ConnectionState, DeviceRecord};
use crate::transport::DeviceIdentity;

/// The single tracked haptic actuator. Created on connect, torn down on
/// disconnect; at most one exists system-wide.
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorDevice {
    pub identity: DeviceIdentity,
    pub connection_state: ConnectionState,
    pub battery_level: Option<u8>,
    pub device_id: Option<String>,
}

impl ActuatorDevice {
    pub fn connected(identity: DeviceIdentity) -> Self {
        ActuatorDevice {
            identity,
            connection_state: ConnectionState::Connected,
            battery_level: None,
            device_id: None,
        }
    }
}

impl DeviceRecord for ActuatorDevice {
    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    fn mark_connected(&mut self) {
        self.connection_state = ConnectionState::Connected;
    }
}

/// A 4-channel motor intensity frame, in fixed channel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorPattern {
    pub front_left: u8,
    pub front_right: u8,
    pub back_left: u8,
    pub back_right: u8,
}

impl MotorPattern {
    /// The all-zero pattern that stops every motor.
    pub const STOP: MotorPattern = MotorPattern {
        front_left: 0,
        front_right: 0,
        back_left: 0,
        back_right: 0,
    };

    pub fn new(front_left: u8, front_right: u8, back_left: u8, back_right: u8) -> Self {
        MotorPattern { front_left, front_right, back_left, back_right }
    }

    pub fn to_bytes(self) -> [u8; 4] {
        [self.front_left, self.front_right, self.back_left, self.back_right]
    }
}
