use futures::channel::mpsc::Receiver;
use futures::StreamExt;
use indexmap::IndexMap;
use log::{debug, info, warn};
use tokio::spawn;
use tokio::time::{sleep, sleep_until, Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::actuator::codec::{self, Request, Response};
use crate::actuator::constants::HANDSHAKE_DEADLINE;
use crate::actuator::session::{ActuatorSession, HandshakePhase};
use crate::actuator::types::{ActuatorDevice, MotorPattern};
use crate::config::types::Config;
use crate::error::SessionError;
use crate::fusion::haptics::map_sample;
use crate::fusion::select::ProximitySelector;
use crate::registry::{ConnectionState, DeviceRegistry};
use crate::sensor::constants::RSSI_POLL_DELAY;
use crate::sensor::telemetry::decode_frame;
use crate::sensor::types::SensorNode;
use crate::transport::{Channel, DeviceIdentity, DeviceKind, Transport, TransportEvent};

/// Orchestrates the registries, selection, mapping and the actuator session
/// in response to transport events.
///
/// All mutation happens on the single event path in [`run`]: the transport
/// funnels its callbacks into one channel, so no two registry mutations or
/// selection passes ever run concurrently.
///
/// [`run`]: FusionController::run
pub struct FusionController<T: Transport> {
    transport: T,
    config: Config,
    nodes: DeviceRegistry<SensorNode>,
    actuators: DeviceRegistry<ActuatorDevice>,
    session: ActuatorSession,
    selector: ProximitySelector,
    /// Per-node signal strength polling, cancelled exactly once when the
    /// registry entry is removed.
    rssi_polls: IndexMap<DeviceIdentity, CancellationToken>,
    pending_actuator: Option<DeviceIdentity>,
    handshake_deadline: Option<(u64, Instant)>,
    /// The last pattern actually written to the actuator.
    last_pattern: Option<MotorPattern>,
    cancel: CancellationToken,
}

impl<T: Transport> FusionController<T> {
    pub fn new(config: Config, transport: T, cancel: CancellationToken) -> Self {
        FusionController {
            transport,
            config,
            nodes: DeviceRegistry::new(),
            actuators: DeviceRegistry::new(),
            session: ActuatorSession::new(),
            selector: ProximitySelector::new(),
            rssi_polls: IndexMap::new(),
            pending_actuator: None,
            handshake_deadline: None,
            last_pattern: None,
            cancel,
        }
    }

    /// Drain transport events until cancelled or the transport goes away.
    pub async fn run(mut self, mut events: Receiver<TransportEvent>) {
        info!("Fusion controller running");
        let cancel = self.cancel.clone();

        loop {
            let deadline = self.handshake_deadline;
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.next() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                _ = wait_until(deadline), if deadline.is_some() => {
                    if let Some((generation, _)) = deadline {
                        self.handle_handshake_deadline(generation);
                    }
                },
            }
        }

        // takes the per-node polling tasks down with it
        self.cancel.cancel();
        info!("Fusion controller stopped");
    }

    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Discovered { kind: DeviceKind::SensorNode, identity, display_name, signal_strength } => {
                self.on_node_discovered(identity, display_name, signal_strength);
            },
            TransportEvent::Discovered { kind: DeviceKind::Actuator, identity, .. } => {
                self.on_actuator_discovered(identity);
            },
            TransportEvent::Connected { kind: DeviceKind::SensorNode, identity } => {
                self.on_node_connected(identity);
            },
            TransportEvent::Connected { kind: DeviceKind::Actuator, identity } => {
                self.on_actuator_connected(identity);
            },
            TransportEvent::Disconnected { kind: DeviceKind::SensorNode, identity, reason } => {
                self.on_node_disconnected(identity, reason);
            },
            TransportEvent::Disconnected { kind: DeviceKind::Actuator, identity, .. } => {
                self.on_actuator_disconnected(identity);
            },
            TransportEvent::ConnectFailed { kind: DeviceKind::SensorNode, identity, reason } => {
                let outcome = self.nodes.update(&identity, |node| {
                    node.connection_state = ConnectionState::FailedToConnect { reason };
                });
                if outcome.is_miss() {
                    debug!("Connect failure for unknown node {}", identity);
                }
            },
            TransportEvent::ConnectFailed { kind: DeviceKind::Actuator, identity, reason } => {
                warn!("Failed to connect to actuator {}: {:?}", identity, reason);
                if self.pending_actuator.as_ref() == Some(&identity) {
                    self.pending_actuator = None;
                }
            },
            TransportEvent::SubscribeResult { identity, channel: Channel::Control, enabled } => {
                self.on_comms_enablement(identity, enabled);
            },
            TransportEvent::SubscribeResult { identity, channel, enabled } => {
                if enabled {
                    debug!("Subscribed to {:?} of {}", channel, identity);
                } else {
                    warn!("Failed to subscribe to {:?} of {}", channel, identity);
                }
            },
            TransportEvent::ValueUpdated { identity, channel: Channel::Telemetry, value } => {
                self.on_telemetry_frame(identity, &value);
            },
            TransportEvent::ValueUpdated { identity, channel: Channel::Control, value } => {
                self.on_control_response(identity, &value);
            },
            TransportEvent::ValueUpdated { identity, channel: Channel::Motor, .. } => {
                debug!("Ignoring unexpected motor channel notification from {}", identity);
            },
            TransportEvent::SignalStrengthUpdated { identity, value } => {
                let outcome = self.nodes.update(&identity, |node| {
                    node.last_signal_strength = Some(value);
                });
                if outcome.is_miss() {
                    debug!("Signal strength for unknown device {}", identity);
                } else {
                    self.refresh_output();
                }
            },
        }
    }

    fn on_node_discovered(&mut self, identity: DeviceIdentity, display_name: Option<String>, signal_strength: Option<i16>) {
        let node = self.nodes.insert_if_absent(SensorNode::discovered(identity.clone(), display_name.clone()));
        if let Some(name) = display_name {
            node.display_name = Some(name);
        }
        if let Some(rssi) = signal_strength {
            node.last_signal_strength = Some(rssi);
        }

        match node.connection_state {
            ConnectionState::Discovered | ConnectionState::FailedToConnect { .. } => {
                node.connection_state = ConnectionState::Connecting;
                info!("Connecting to sensor node {}...", identity);
                self.transport.connect(&identity);
            },
            _ => {},
        }
    }

    fn on_actuator_discovered(&mut self, identity: DeviceIdentity) {
        // at most one actuator, system-wide
        if !self.actuators.is_empty() || self.pending_actuator.is_some() {
            return;
        }
        info!("Connecting to actuator {}...", identity);
        self.pending_actuator = Some(identity.clone());
        self.transport.connect(&identity);
    }

    fn on_node_connected(&mut self, identity: DeviceIdentity) {
        let node = SensorNode::discovered(identity.clone(), None);
        let record = self.nodes.upsert_on_connect(node);
        info!(
            "Sensor node {} ({}) connected",
            identity,
            record.display_name.as_deref().unwrap_or("unnamed"),
        );

        self.transport.subscribe(&identity, Channel::Telemetry);
        self.spawn_rssi_poll(identity);
        self.refresh_output();
    }

    fn on_actuator_connected(&mut self, identity: DeviceIdentity) {
        if self.pending_actuator.as_ref() == Some(&identity) {
            self.pending_actuator = None;
        }
        if !self.actuators.is_empty() && !self.actuators.contains(&identity) {
            warn!("Ignoring second actuator {}", identity);
            self.transport.disconnect(&identity);
            return;
        }

        info!("Actuator {} connected; enabling communication...", identity);
        self.actuators.upsert_on_connect(ActuatorDevice::connected(identity.clone()));
        self.session.on_connected();
        self.handshake_deadline = Some((
            self.session.generation(),
            Instant::now() + Duration::from_millis(HANDSHAKE_DEADLINE),
        ));
        self.transport.subscribe(&identity, Channel::Control);
    }

    fn on_node_disconnected(&mut self, identity: DeviceIdentity, reason: Option<String>) {
        match self.nodes.remove(&identity) {
            Some(node) => {
                info!(
                    "Sensor node {} ({}) disconnected: {}",
                    identity,
                    node.display_name.as_deref().unwrap_or("unnamed"),
                    reason.as_deref().unwrap_or("no reason given"),
                );
                self.cancel_rssi_poll(&identity);
                self.refresh_output();
            },
            None => debug!("Disconnect for unknown node {}", identity),
        }
    }

    fn on_actuator_disconnected(&mut self, identity: DeviceIdentity) {
        if self.pending_actuator.as_ref() == Some(&identity) {
            self.pending_actuator = None;
        }
        if self.actuators.remove(&identity).is_some() {
            warn!("Actuator {} disconnected", identity);
            self.session.on_disconnected();
            self.handshake_deadline = None;
            self.last_pattern = None;
        }
    }

    fn on_comms_enablement(&mut self, identity: DeviceIdentity, enabled: bool) {
        if !self.actuators.contains(&identity) {
            debug!("Comms enablement result for unknown actuator {}", identity);
            return;
        }

        let requests = self.session.on_comms_enabled(enabled);
        self.send_requests(&identity, requests);
        self.after_session_step();
    }

    fn on_telemetry_frame(&mut self, identity: DeviceIdentity, frame: &[u8]) {
        match decode_frame(frame) {
            Ok(sample) => {
                let outcome = self.nodes.update(&identity, |node| {
                    node.latest_telemetry = Some(sample);
                });
                if outcome.is_miss() {
                    debug!("Telemetry for unknown node {}", identity);
                } else {
                    self.refresh_output();
                }
            },
            // the node keeps its previous sample
            Err(err) => warn!("Discarding telemetry frame from {}: {}", identity, err),
        }
    }

    fn on_control_response(&mut self, identity: DeviceIdentity, raw: &[u8]) {
        if !self.actuators.contains(&identity) {
            debug!("Control response from unknown actuator {}", identity);
            return;
        }

        let response = match codec::decode_response(raw) {
            Ok(response) => response,
            Err(err) => {
                warn!("Discarding actuator response: {}", err);
                return;
            },
        };

        match response {
            // state-independent device info, stored outside the handshake
            Response::Battery { level } => {
                let _ = self.actuators.update(&identity, |actuator| {
                    actuator.battery_level = Some(level);
                });
            },
            Response::DeviceInfo { ref id } => {
                info!("Actuator reports device id {}", id);
                let _ = self.actuators.update(&identity, |actuator| {
                    actuator.device_id = Some(id.clone());
                });
            },
            ref response => {
                let requests = self.session.on_response(response);
                self.send_requests(&identity, requests);
                self.after_session_step();
            },
        }
    }

    fn handle_handshake_deadline(&mut self, generation: u64) {
        self.handshake_deadline = None;
        if self.session.on_deadline(generation) {
            warn!("Actuator handshake timed out");
        }
    }

    /// Re-rank the nodes and push the pattern for the nearest one. With no
    /// eligible node left the motors are stopped explicitly rather than
    /// letting the last pattern run forever.
    fn refresh_output(&mut self) {
        let snapshot = self.nodes.snapshot();

        let pattern = match self.selector.select(&snapshot) {
            None => Some(MotorPattern::STOP),
            Some(selected) => snapshot
                .iter()
                .find(|node| node.identity == selected)
                .and_then(|node| node.latest_telemetry.as_ref())
                .map(|sample| map_sample(sample, &self.config)),
        };

        // a selected node without telemetry yet keeps the current output
        if let Some(pattern) = pattern {
            self.push_pattern(pattern);
        }
    }

    fn push_pattern(&mut self, pattern: MotorPattern) {
        if self.last_pattern == Some(pattern) {
            return;
        }
        let Some(identity) = self.actuators.identities().next().cloned() else {
            return;
        };

        match self.session.motor_frame(pattern) {
            Ok(frame) => {
                self.transport.write(&identity, Channel::Motor, frame.to_vec());
                self.last_pattern = Some(pattern);
            },
            Err(SessionError::NotReady) => {
                debug!("Dropping motor pattern: handshake not complete");
            },
        }
    }

    fn send_requests(&mut self, identity: &DeviceIdentity, requests: Vec<Request>) {
        for request in requests {
            self.transport.write(identity, Channel::Control, codec::encode_request(request));
        }
    }

    fn after_session_step(&mut self) {
        match self.session.phase() {
            HandshakePhase::Ready => {
                if self.handshake_deadline.take().is_some() {
                    info!("Actuator handshake complete; motors ready");
                }
                self.refresh_output();
            },
            HandshakePhase::Failed(failure) => {
                if self.handshake_deadline.take().is_some() {
                    warn!("Actuator handshake failed: {:?}", failure);
                }
            },
            _ => {},
        }
    }

    fn spawn_rssi_poll(&mut self, identity: DeviceIdentity) {
        if self.rssi_polls.contains_key(&identity) {
            return;
        }

        let token = self.cancel.child_token();
        self.rssi_polls.insert(identity.clone(), token.clone());
        let transport = self.transport.clone();

        spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = sleep(Duration::from_millis(RSSI_POLL_DELAY)) => {
                        transport.request_signal_strength(&identity);
                    },
                }
            }
        });
    }

    fn cancel_rssi_poll(&mut self, identity: &DeviceIdentity) {
        if let Some(token) = self.rssi_polls.shift_remove(identity) {
            token.cancel();
        }
    }
}

async fn wait_until(deadline: Option<(u64, Instant)>) {
    match deadline {
        Some((_, at)) => sleep_until(at).await,
        // guarded out of the select when there is no deadline
        None => std::future::pending().await,
    }
}
