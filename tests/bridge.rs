//! End-to-end scenarios for the fusion controller, driven through a
//! recording mock transport.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use aq_buzz::config::types::Config;
use aq_buzz::fusion::controller::FusionController;
use aq_buzz::transport::{Channel, DeviceIdentity, DeviceKind, Transport, TransportEvent};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Connect(DeviceIdentity),
    Disconnect(DeviceIdentity),
    Write(DeviceIdentity, Channel, Vec<u8>),
    Subscribe(DeviceIdentity, Channel),
    ReadSignalStrength(DeviceIdentity),
}

#[derive(Clone, Default)]
struct MockTransport {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl MockTransport {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn motor_writes(&self) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Write(_, Channel::Motor, payload) => Some(payload),
                _ => None,
            })
            .collect()
    }

    fn control_writes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Write(_, Channel::Control, payload) => {
                    Some(String::from_utf8(payload).expect("control writes are ascii lines"))
                },
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Transport for MockTransport {
    fn connect(&self, identity: &DeviceIdentity) {
        self.record(Call::Connect(identity.clone()));
    }

    fn disconnect(&self, identity: &DeviceIdentity) {
        self.record(Call::Disconnect(identity.clone()));
    }

    fn write(&self, identity: &DeviceIdentity, channel: Channel, payload: Vec<u8>) {
        self.record(Call::Write(identity.clone(), channel, payload));
    }

    fn subscribe(&self, identity: &DeviceIdentity, channel: Channel) {
        self.record(Call::Subscribe(identity.clone(), channel));
    }

    fn request_signal_strength(&self, identity: &DeviceIdentity) {
        self.record(Call::ReadSignalStrength(identity.clone()));
    }
}

struct Harness {
    transport: MockTransport,
    controller: FusionController<MockTransport>,
}

impl Harness {
    fn new() -> Self {
        let transport = MockTransport::default();
        let controller = FusionController::new(
            Config::default(),
            transport.clone(),
            CancellationToken::new(),
        );
        Harness { transport, controller }
    }

    fn feed(&mut self, event: TransportEvent) {
        self.controller.handle_event(event);
    }

    fn connect_node(&mut self, identity: &DeviceIdentity, rssi: i16) {
        self.feed(TransportEvent::Discovered {
            kind: DeviceKind::SensorNode,
            identity: identity.clone(),
            display_name: Some(format!("FeatherAQ {}", identity)),
            signal_strength: Some(rssi),
        });
        self.feed(TransportEvent::Connected {
            kind: DeviceKind::SensorNode,
            identity: identity.clone(),
        });
    }

    fn telemetry(&mut self, identity: &DeviceIdentity, avg: f32, slope: f32) {
        self.feed(TransportEvent::ValueUpdated {
            identity: identity.clone(),
            channel: Channel::Telemetry,
            value: frame(1_599_400_000, avg as u16, avg, slope),
        });
    }

    fn connect_actuator(&mut self, identity: &DeviceIdentity) {
        self.feed(TransportEvent::Discovered {
            kind: DeviceKind::Actuator,
            identity: identity.clone(),
            display_name: Some("Buzz".to_string()),
            signal_strength: Some(-60),
        });
        self.feed(TransportEvent::Connected {
            kind: DeviceKind::Actuator,
            identity: identity.clone(),
        });
    }

    /// Walk the actuator through the full handshake to `Ready`.
    fn complete_handshake(&mut self, identity: &DeviceIdentity) {
        self.feed(TransportEvent::SubscribeResult {
            identity: identity.clone(),
            channel: Channel::Control,
            enabled: true,
        });
        self.control_response(identity, r#"{"command":"auth as developer","status_code":200}"#);
        self.control_response(identity, r#"{"command":"audio stop","status_code":200}"#);
        self.control_response(identity, r#"{"command":"motors start","status_code":200}"#);
        self.control_response(identity, r#"{"command":"motors clear_queue","status_code":200}"#);
    }

    fn control_response(&mut self, identity: &DeviceIdentity, json: &str) {
        self.feed(TransportEvent::ValueUpdated {
            identity: identity.clone(),
            channel: Channel::Control,
            value: json.as_bytes().to_vec(),
        });
    }
}

fn frame(timestamp: u64, raw: u16, avg: f32, slope: f32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(18);
    bytes.extend_from_slice(&timestamp.to_be_bytes());
    bytes.extend_from_slice(&raw.to_be_bytes());
    bytes.extend_from_slice(&avg.to_bits().to_be_bytes());
    bytes.extend_from_slice(&slope.to_bits().to_be_bytes());
    bytes
}

#[tokio::test]
async fn discovered_devices_are_connected_and_subscribed() {
    let mut harness = Harness::new();
    let node = DeviceIdentity::from("feather-1");

    harness.connect_node(&node, -50);

    let calls = harness.transport.calls();
    assert!(calls.contains(&Call::Connect(node.clone())));
    assert!(calls.contains(&Call::Subscribe(node.clone(), Channel::Telemetry)));
}

#[tokio::test]
async fn handshake_issues_the_documented_command_sequence() {
    let mut harness = Harness::new();
    let buzz = DeviceIdentity::from("buzz-1");

    harness.connect_actuator(&buzz);
    assert!(harness.transport.calls().contains(&Call::Subscribe(buzz.clone(), Channel::Control)));

    harness.complete_handshake(&buzz);
    assert_eq!(
        harness.transport.control_writes(),
        vec![
            "device battery_soc\n",
            "device info\n",
            "auth as developer\n",
            "accept\n",
            "audio stop\n",
            "motors start\n",
            "motors clear_queue\n",
        ],
    );
}

#[tokio::test]
async fn no_motor_commands_before_the_handshake_completes() {
    let mut harness = Harness::new();
    let buzz = DeviceIdentity::from("buzz-1");
    let node = DeviceIdentity::from("feather-1");

    harness.connect_actuator(&buzz);
    harness.connect_node(&node, -50);
    harness.telemetry(&node, 300.0, 0.6);

    assert!(harness.transport.motor_writes().is_empty());
}

#[tokio::test]
async fn authorization_failure_never_drives_the_motors() {
    let mut harness = Harness::new();
    let buzz = DeviceIdentity::from("buzz-1");
    let node = DeviceIdentity::from("feather-1");

    harness.connect_actuator(&buzz);
    harness.feed(TransportEvent::SubscribeResult {
        identity: buzz.clone(),
        channel: Channel::Control,
        enabled: true,
    });
    harness.control_response(&buzz, r#"{"command":"auth as developer","status_code":401,"message":"denied"}"#);

    harness.connect_node(&node, -50);
    harness.telemetry(&node, 300.0, 0.6);

    assert!(harness.transport.motor_writes().is_empty());
}

#[tokio::test]
async fn nearest_node_telemetry_becomes_a_motor_pattern() {
    let mut harness = Harness::new();
    let buzz = DeviceIdentity::from("buzz-1");
    let node = DeviceIdentity::from("feather-1");

    harness.connect_actuator(&buzz);
    harness.complete_handshake(&buzz);

    harness.connect_node(&node, -50);
    harness.telemetry(&node, 300.0, 0.6);

    // concentration at the ceiling with a rising trend biases the rear
    assert_eq!(harness.transport.motor_writes().last().unwrap(), &vec![0, 0, 128, 255]);
}

#[tokio::test]
async fn losing_the_last_node_stops_the_motors() {
    let mut harness = Harness::new();
    let buzz = DeviceIdentity::from("buzz-1");
    let node = DeviceIdentity::from("feather-1");

    harness.connect_actuator(&buzz);
    harness.complete_handshake(&buzz);
    harness.connect_node(&node, -50);
    harness.telemetry(&node, 300.0, 0.6);

    harness.feed(TransportEvent::Disconnected {
        kind: DeviceKind::SensorNode,
        identity: node.clone(),
        reason: None,
    });

    assert_eq!(harness.transport.motor_writes().last().unwrap(), &vec![0, 0, 0, 0]);
}

#[tokio::test]
async fn selection_tracks_the_stronger_node_regardless_of_event_order() {
    for reversed in [false, true] {
        let mut harness = Harness::new();
        let buzz = DeviceIdentity::from("buzz-1");
        let near = DeviceIdentity::from("feather-near");
        let far = DeviceIdentity::from("feather-far");

        harness.connect_actuator(&buzz);
        harness.complete_handshake(&buzz);

        harness.connect_node(&far, -50);
        harness.connect_node(&near, -45);

        // far reports a falling trend, near a rising one
        if reversed {
            harness.telemetry(&near, 300.0, 0.6);
            harness.telemetry(&far, 300.0, -0.6);
        } else {
            harness.telemetry(&far, 300.0, -0.6);
            harness.telemetry(&near, 300.0, 0.6);
        }

        // the output always reflects the -45 node's data
        assert_eq!(harness.transport.motor_writes().last().unwrap(), &vec![0, 0, 128, 255]);
    }
}

#[tokio::test]
async fn telemetry_after_disconnect_is_ignored() {
    let mut harness = Harness::new();
    let buzz = DeviceIdentity::from("buzz-1");
    let node = DeviceIdentity::from("feather-1");

    harness.connect_actuator(&buzz);
    harness.complete_handshake(&buzz);
    harness.connect_node(&node, -50);
    harness.feed(TransportEvent::Disconnected {
        kind: DeviceKind::SensorNode,
        identity: node.clone(),
        reason: None,
    });

    let writes_before = harness.transport.motor_writes();
    harness.telemetry(&node, 300.0, 0.6);
    assert_eq!(harness.transport.motor_writes(), writes_before);
}

#[tokio::test]
async fn truncated_telemetry_keeps_the_previous_pattern() {
    let mut harness = Harness::new();
    let buzz = DeviceIdentity::from("buzz-1");
    let node = DeviceIdentity::from("feather-1");

    harness.connect_actuator(&buzz);
    harness.complete_handshake(&buzz);
    harness.connect_node(&node, -50);
    harness.telemetry(&node, 300.0, 0.0);
    assert_eq!(harness.transport.motor_writes().last().unwrap(), &vec![0, 255, 255, 0]);

    harness.feed(TransportEvent::ValueUpdated {
        identity: node.clone(),
        channel: Channel::Telemetry,
        value: vec![0x00, 0x01, 0x02],
    });

    assert_eq!(harness.transport.motor_writes().last().unwrap(), &vec![0, 255, 255, 0]);
}

#[tokio::test]
async fn second_actuator_is_rejected() {
    let mut harness = Harness::new();
    let first = DeviceIdentity::from("buzz-1");
    let second = DeviceIdentity::from("buzz-2");

    harness.connect_actuator(&first);

    harness.feed(TransportEvent::Discovered {
        kind: DeviceKind::Actuator,
        identity: second.clone(),
        display_name: None,
        signal_strength: None,
    });
    assert!(!harness.transport.calls().contains(&Call::Connect(second.clone())));

    // even an unsolicited connect is turned away
    harness.feed(TransportEvent::Connected {
        kind: DeviceKind::Actuator,
        identity: second.clone(),
    });
    assert!(harness.transport.calls().contains(&Call::Disconnect(second.clone())));
}

#[tokio::test]
async fn actuator_reconnect_requires_a_fresh_handshake() {
    let mut harness = Harness::new();
    let buzz = DeviceIdentity::from("buzz-1");
    let node = DeviceIdentity::from("feather-1");

    harness.connect_actuator(&buzz);
    harness.complete_handshake(&buzz);
    harness.connect_node(&node, -50);
    harness.telemetry(&node, 300.0, 0.6);
    let writes_after_first = harness.transport.motor_writes().len();
    assert!(writes_after_first > 0);

    harness.feed(TransportEvent::Disconnected {
        kind: DeviceKind::Actuator,
        identity: buzz.clone(),
        reason: Some("link lost".to_string()),
    });
    harness.connect_actuator(&buzz);

    // not ready again yet: telemetry must not produce motor writes
    harness.telemetry(&node, 150.0, 0.0);
    assert_eq!(harness.transport.motor_writes().len(), writes_after_first);

    // completing the new handshake pushes the current pattern
    harness.complete_handshake(&buzz);
    assert_eq!(harness.transport.motor_writes().last().unwrap(), &vec![0, 128, 128, 0]);
}

#[tokio::test]
async fn battery_and_device_info_do_not_disturb_the_handshake() {
    let mut harness = Harness::new();
    let buzz = DeviceIdentity::from("buzz-1");
    let node = DeviceIdentity::from("feather-1");

    harness.connect_actuator(&buzz);
    harness.feed(TransportEvent::SubscribeResult {
        identity: buzz.clone(),
        channel: Channel::Control,
        enabled: true,
    });

    // info responses arrive mid-handshake
    harness.control_response(&buzz, r#"{"command":"device battery_soc","status_code":200,"battery_soc":91}"#);
    harness.control_response(&buzz, r#"{"command":"device info","status_code":200,"device_id":"BZ-1701"}"#);

    harness.control_response(&buzz, r#"{"command":"auth as developer","status_code":200}"#);
    harness.control_response(&buzz, r#"{"command":"audio stop","status_code":200}"#);
    harness.control_response(&buzz, r#"{"command":"motors start","status_code":200}"#);
    harness.control_response(&buzz, r#"{"command":"motors clear_queue","status_code":200}"#);

    harness.connect_node(&node, -50);
    harness.telemetry(&node, 300.0, -0.6);
    assert_eq!(harness.transport.motor_writes().last().unwrap(), &vec![255, 128, 0, 0]);
}

#[tokio::test]
async fn signal_strength_updates_reorder_the_selection() {
    let mut harness = Harness::new();
    let buzz = DeviceIdentity::from("buzz-1");
    let a = DeviceIdentity::from("feather-a");
    let b = DeviceIdentity::from("feather-b");

    harness.connect_actuator(&buzz);
    harness.complete_handshake(&buzz);

    harness.connect_node(&a, -45);
    harness.connect_node(&b, -60);
    harness.telemetry(&a, 300.0, 0.6);
    harness.telemetry(&b, 300.0, -0.6);
    assert_eq!(harness.transport.motor_writes().last().unwrap(), &vec![0, 0, 128, 255]);

    // b moves closer than a
    harness.feed(TransportEvent::SignalStrengthUpdated { identity: b.clone(), value: -40 });
    assert_eq!(harness.transport.motor_writes().last().unwrap(), &vec![255, 128, 0, 0]);
}
