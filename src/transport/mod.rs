use std::fmt;

pub mod ble;

/// Opaque identifier the transport layer assigns to a remote device. Stable
/// for the lifetime of a connection; the core never inspects its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    pub fn new(raw: impl Into<String>) -> Self {
        DeviceIdentity(raw.into())
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceIdentity {
    fn from(raw: &str) -> Self {
        DeviceIdentity::new(raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    SensorNode,
    Actuator,
}

/// Logical channels the core reads from and writes to. The transport maps
/// these onto the concrete GATT characteristics of each device kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Sensor telemetry notifications.
    Telemetry,
    /// Actuator command/response exchange.
    Control,
    /// Actuator motor intensity frames.
    Motor,
}

/// Events the transport layer delivers to the core. Delivery is in-order per
/// device; cross-device ordering is unconstrained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Discovered {
        kind: DeviceKind,
        identity: DeviceIdentity,
        display_name: Option<String>,
        signal_strength: Option<i16>,
    },
    Connected {
        kind: DeviceKind,
        identity: DeviceIdentity,
    },
    Disconnected {
        kind: DeviceKind,
        identity: DeviceIdentity,
        reason: Option<String>,
    },
    ConnectFailed {
        kind: DeviceKind,
        identity: DeviceIdentity,
        reason: Option<String>,
    },
    /// Outcome of a `subscribe` request. For the actuator control channel
    /// this doubles as the "communication enabled" handshake signal.
    SubscribeResult {
        identity: DeviceIdentity,
        channel: Channel,
        enabled: bool,
    },
    ValueUpdated {
        identity: DeviceIdentity,
        channel: Channel,
        value: Vec<u8>,
    },
    SignalStrengthUpdated {
        identity: DeviceIdentity,
        value: i16,
    },
}

/// The abstract peripheral capability the core consumes. All requests are
/// fire-and-forget: the core never blocks on the transport, it issues a
/// request and later receives the corresponding [`TransportEvent`].
pub trait Transport: Clone + Send + 'static {
    fn connect(&self, identity: &DeviceIdentity);
    fn disconnect(&self, identity: &DeviceIdentity);
    fn write(&self, identity: &DeviceIdentity, channel: Channel, payload: Vec<u8>);
    fn subscribe(&self, identity: &DeviceIdentity, channel: Channel);
    fn request_signal_strength(&self, identity: &DeviceIdentity);
}
