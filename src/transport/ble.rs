use std::collections::HashMap;
use btleplug::api::{Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::channel::mpsc::{unbounded, Sender, UnboundedReceiver, UnboundedSender};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::actuator::constants::{make_buzz_command_rx_uuid, make_buzz_command_tx_uuid, make_buzz_motor_uuid, make_buzz_service_uuid};
use crate::error::DeviceError;
use crate::sensor::constants::{make_feather_aq_service_uuid, make_feather_aq_telemetry_uuid};
use crate::transport::{Channel, DeviceIdentity, DeviceKind, Transport, TransportEvent};

/**
 * How long (milliseconds) connecting to a peripheral may take.
 */
const CONNECT_DEADLINE: u64 = 10_000;

/**
 * How long (milliseconds) a write to or subscribe on a characteristic may
 * take.
 */
const WRITE_DEADLINE: u64 = 2000;

#[derive(Debug)]
enum TransportRequest {
    Connect(DeviceIdentity),
    Disconnect(DeviceIdentity),
    Write(DeviceIdentity, Channel, Vec<u8>),
    Subscribe(DeviceIdentity, Channel),
    ReadSignalStrength(DeviceIdentity),
}

/// btleplug-backed implementation of the abstract transport capability.
///
/// The handle is a cheap clone around a request channel; a single driver
/// task owns the adapter and all peripherals, performs the requests, and
/// funnels everything that happens back through the event channel.
#[derive(Clone)]
pub struct BleTransport {
    requests: UnboundedSender<TransportRequest>,
}

impl BleTransport {
    pub fn spawn(cancel: CancellationToken, events: Sender<TransportEvent>) -> (Self, JoinHandle<Result<(), DeviceError>>) {
        let (requests, request_receiver) = unbounded();
        let handle = spawn(drive(cancel, request_receiver, events));
        (BleTransport { requests }, handle)
    }

    fn request(&self, request: TransportRequest) {
        // a send failure means the driver is gone; requests are fire-and-forget
        let _ = self.requests.unbounded_send(request);
    }
}

impl Transport for BleTransport {
    fn connect(&self, identity: &DeviceIdentity) {
        self.request(TransportRequest::Connect(identity.clone()));
    }

    fn disconnect(&self, identity: &DeviceIdentity) {
        self.request(TransportRequest::Disconnect(identity.clone()));
    }

    fn write(&self, identity: &DeviceIdentity, channel: Channel, payload: Vec<u8>) {
        self.request(TransportRequest::Write(identity.clone(), channel, payload));
    }

    fn subscribe(&self, identity: &DeviceIdentity, channel: Channel) {
        self.request(TransportRequest::Subscribe(identity.clone(), channel));
    }

    fn request_signal_strength(&self, identity: &DeviceIdentity) {
        self.request(TransportRequest::ReadSignalStrength(identity.clone()));
    }
}

struct Tracked {
    peripheral: Peripheral,
    kind: DeviceKind,
    notify_cancel: Option<CancellationToken>,
}

struct Driver {
    adapter: Adapter,
    events: Sender<TransportEvent>,
    tracked: HashMap<DeviceIdentity, Tracked>,
    cancel: CancellationToken,
}

async fn drive(
    cancel: CancellationToken,
    mut requests: UnboundedReceiver<TransportRequest>,
    events: Sender<TransportEvent>,
) -> Result<(), DeviceError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    let adapter = adapters.into_iter().next().ok_or(DeviceError::NoAdapter)?;

    info!("Scanning using adapter {}...", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));

    let filter = ScanFilter {
        services: vec![make_feather_aq_service_uuid(), make_buzz_service_uuid()],
    };
    adapter.start_scan(filter).await?;
    let mut central_events = adapter.events().await?;

    let mut driver = Driver {
        adapter,
        events,
        tracked: HashMap::new(),
        cancel: cancel.clone(),
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(event) = central_events.next() => driver.handle_central_event(event).await,
            Some(request) = requests.next() => driver.handle_request(request).await,
        }
    }

    if let Err(err) = driver.adapter.stop_scan().await {
        warn!("Failed to stop scanning: {:?}", err);
    }

    Ok(())
}

impl Driver {
    async fn handle_central_event(&mut self, event: CentralEvent) {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                self.on_advertisement(id).await;
            },
            CentralEvent::DeviceConnected(id) => {
                // Connected is emitted by the connect task once service
                // discovery finished, not from here
                debug!("Link established with {:?}", id);
            },
            CentralEvent::DeviceDisconnected(id) => {
                self.on_peripheral_disconnected(id).await;
            },
            _ => {},
        }
    }

    async fn on_advertisement(&mut self, id: PeripheralId) {
        let identity = identity_of(&id);

        if let Some(tracked) = self.tracked.get(&identity) {
            // known peripheral; advertisements only refresh the signal strength
            let rssi = match tracked.peripheral.properties().await {
                Ok(Some(properties)) => properties.rssi,
                _ => None,
            };
            if let Some(value) = rssi {
                self.emit(TransportEvent::SignalStrengthUpdated { identity, value }).await;
            }
            return;
        }

        let peripheral = match self.adapter.peripheral(&id).await {
            Ok(peripheral) => peripheral,
            Err(err) => {
                warn!("Failed to resolve advertised peripheral {:?}: {:?}", id, err);
                return;
            },
        };

        let properties = match peripheral.properties().await {
            Ok(Some(properties)) => properties,
            Ok(None) => {
                warn!("Peripheral {:?} has no properties", id);
                return;
            },
            Err(err) => {
                warn!("Could not query peripheral {:?} for properties: {:?}", id, err);
                return;
            },
        };

        // Some environments ignore the scan filter, so check the service
        // uuids again
        let Some(kind) = classify(&properties.services) else {
            return;
        };

        info!(
            "Discovered {:?} {} {}",
            kind,
            identity,
            properties.local_name.as_deref().unwrap_or("NONE"),
        );

        self.tracked.insert(identity.clone(), Tracked { peripheral, kind, notify_cancel: None });
        self.emit(TransportEvent::Discovered {
            kind,
            identity,
            display_name: properties.local_name,
            signal_strength: properties.rssi,
        })
        .await;
    }

    async fn on_peripheral_disconnected(&mut self, id: PeripheralId) {
        let identity = identity_of(&id);
        if let Some(tracked) = self.tracked.remove(&identity) {
            if let Some(cancel) = tracked.notify_cancel {
                cancel.cancel();
            }
            self.emit(TransportEvent::Disconnected { kind: tracked.kind, identity, reason: None }).await;
        }
    }

    async fn handle_request(&mut self, request: TransportRequest) {
        match request {
            TransportRequest::Connect(identity) => self.connect(identity),
            TransportRequest::Disconnect(identity) => self.disconnect(&identity).await,
            TransportRequest::Write(identity, channel, payload) => self.write(&identity, channel, payload).await,
            TransportRequest::Subscribe(identity, channel) => self.subscribe(identity, channel).await,
            TransportRequest::ReadSignalStrength(identity) => self.read_signal_strength(identity).await,
        }
    }

    fn connect(&mut self, identity: DeviceIdentity) {
        let Some(tracked) = self.tracked.get(&identity) else {
            warn!("Connect requested for unknown peripheral {}", identity);
            return;
        };

        // connecting can take seconds; run it off the driver loop so other
        // devices keep flowing
        let peripheral = tracked.peripheral.clone();
        let kind = tracked.kind;
        let mut events = self.events.clone();

        spawn(async move {
            let attempt = async {
                peripheral.connect().await?;
                peripheral.discover_services().await?;

                if find_characteristic(&peripheral, required_characteristic(kind)).is_none() {
                    return Err(DeviceError::MissingCharacteristic);
                }
                Ok(())
            };

            tokio::select! {
                _ = sleep(Duration::from_millis(CONNECT_DEADLINE)) => {
                    warn!("Connecting to {} took too long", identity);
                    let _ = events.send(TransportEvent::ConnectFailed {
                        kind,
                        identity,
                        reason: Some("connect timed out".to_string()),
                    }).await;
                }
                result = attempt => match result {
                    Ok(()) => {
                        let _ = events.send(TransportEvent::Connected { kind, identity }).await;
                    },
                    Err(err) => {
                        warn!("Connecting to {} failed: {:?}", identity, err);
                        let _ = events.send(TransportEvent::ConnectFailed {
                            kind,
                            identity,
                            reason: Some(err.to_string()),
                        }).await;
                    },
                },
            }
        });
    }

    async fn disconnect(&mut self, identity: &DeviceIdentity) {
        let Some(tracked) = self.tracked.get(identity) else {
            return;
        };
        if let Err(err) = tracked.peripheral.disconnect().await {
            warn!("Failed to disconnect from {}: {:?}", identity, err);
        }
    }

    async fn write(&mut self, identity: &DeviceIdentity, channel: Channel, payload: Vec<u8>) {
        let Some(tracked) = self.tracked.get(identity) else {
            debug!("Write to unknown peripheral {}", identity);
            return;
        };
        let Some((uuid, write_type)) = write_target(tracked.kind, channel) else {
            warn!("No writable characteristic for {:?} on {:?}", channel, tracked.kind);
            return;
        };
        let Some(characteristic) = find_characteristic(&tracked.peripheral, uuid) else {
            warn!("Characteristic for {:?} is not available on {}", channel, identity);
            return;
        };

        let fut = tracked.peripheral.write(&characteristic, &payload, write_type);

        tokio::select! {
            _ = sleep(Duration::from_millis(WRITE_DEADLINE)) => {
                warn!("Sending to {:?} of {} took too long", channel, identity);
            }
            result = fut => {
                if let Err(err) = result {
                    warn!("Failed to send to {:?} of {}: {:?}", channel, identity, err);
                }
            }
        };
    }

    async fn subscribe(&mut self, identity: DeviceIdentity, channel: Channel) {
        let mut pump = None;
        let enabled = match self.tracked.get(&identity) {
            None => {
                debug!("Subscribe for unknown peripheral {}", identity);
                return;
            },
            Some(tracked) => {
                let subscribed = match subscribe_target(tracked.kind, channel) {
                    None => {
                        warn!("No notifying characteristic for {:?} on {:?}", channel, tracked.kind);
                        false
                    },
                    Some(uuid) => match find_characteristic(&tracked.peripheral, uuid) {
                        None => {
                            warn!("Characteristic for {:?} is not available on {}", channel, identity);
                            false
                        },
                        Some(characteristic) => {
                            debug!("Subscribing to characteristic {:?} of {}", characteristic.uuid, identity);
                            subscribe_with_deadline(&tracked.peripheral, &characteristic).await
                        },
                    },
                };

                if subscribed && tracked.notify_cancel.is_none() {
                    pump = Some((tracked.peripheral.clone(), self.cancel.child_token()));
                }
                subscribed
            },
        };

        if let Some((peripheral, token)) = pump {
            let _ = spawn_notification_pump(token.clone(), peripheral, identity.clone(), self.events.clone());
            if let Some(tracked) = self.tracked.get_mut(&identity) {
                tracked.notify_cancel = Some(token);
            }
        }

        self.emit(TransportEvent::SubscribeResult { identity, channel, enabled }).await;
    }

    async fn read_signal_strength(&mut self, identity: DeviceIdentity) {
        let Some(tracked) = self.tracked.get(&identity) else {
            debug!("Signal strength requested for unknown peripheral {}", identity);
            return;
        };

        let rssi = match tracked.peripheral.properties().await {
            Ok(Some(properties)) => properties.rssi,
            Ok(None) => None,
            Err(err) => {
                warn!("Failed to read signal strength of {}: {:?}", identity, err);
                None
            },
        };

        if let Some(value) = rssi {
            self.emit(TransportEvent::SignalStrengthUpdated { identity, value }).await;
        }
    }

    async fn emit(&mut self, event: TransportEvent) {
        if self.events.send(event).await.is_err() {
            // the core is gone; the driver will be cancelled shortly
            debug!("Dropped transport event: core receiver closed");
        }
    }
}

async fn subscribe_with_deadline(peripheral: &Peripheral, characteristic: &Characteristic) -> bool {
    tokio::select! {
        _ = sleep(Duration::from_millis(WRITE_DEADLINE)) => {
            warn!("Subscribing to characteristic {:?} took too long", characteristic.uuid);
            false
        }
        result = peripheral.subscribe(characteristic) => match result {
            Ok(()) => true,
            Err(err) => {
                warn!("Failed to subscribe to characteristic {:?}: {:?}", characteristic.uuid, err);
                false
            },
        },
    }
}

fn spawn_notification_pump(
    cancel: CancellationToken,
    peripheral: Peripheral,
    identity: DeviceIdentity,
    mut events: Sender<TransportEvent>,
) -> JoinHandle<Result<(), DeviceError>> {
    spawn(async move {
        let mut notification_stream = peripheral.notifications().await?;

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                Some(notification) = notification_stream.next() => {
                    if let Some(channel) = channel_of(notification.uuid) {
                        let _ = events.send(TransportEvent::ValueUpdated {
                            identity: identity.clone(),
                            channel,
                            value: notification.value,
                        }).await;
                    }
                },
            }
        }

        Ok(())
    })
}

fn identity_of(id: &PeripheralId) -> DeviceIdentity {
    DeviceIdentity::new(format!("{:?}", id))
}

fn classify(services: &[Uuid]) -> Option<DeviceKind> {
    if services.contains(&make_feather_aq_service_uuid()) {
        Some(DeviceKind::SensorNode)
    } else if services.contains(&make_buzz_service_uuid()) {
        Some(DeviceKind::Actuator)
    } else {
        None
    }
}

/// The characteristic a freshly connected device must expose before it is
/// reported to the core.
fn required_characteristic(kind: DeviceKind) -> Uuid {
    match kind {
        DeviceKind::SensorNode => make_feather_aq_telemetry_uuid(),
        DeviceKind::Actuator => make_buzz_command_rx_uuid(),
    }
}

fn subscribe_target(kind: DeviceKind, channel: Channel) -> Option<Uuid> {
    match (kind, channel) {
        (DeviceKind::SensorNode, Channel::Telemetry) => Some(make_feather_aq_telemetry_uuid()),
        (DeviceKind::Actuator, Channel::Control) => Some(make_buzz_command_tx_uuid()),
        _ => None,
    }
}

fn write_target(kind: DeviceKind, channel: Channel) -> Option<(Uuid, WriteType)> {
    match (kind, channel) {
        (DeviceKind::Actuator, Channel::Control) => Some((make_buzz_command_rx_uuid(), WriteType::WithResponse)),
        (DeviceKind::Actuator, Channel::Motor) => Some((make_buzz_motor_uuid(), WriteType::WithoutResponse)),
        _ => None,
    }
}

fn find_characteristic(peripheral: &Peripheral, uuid: Uuid) -> Option<Characteristic> {
    peripheral
        .services()
        .into_iter()
        .flat_map(|service| service.characteristics)
        .find(|characteristic| characteristic.uuid == uuid)
}

fn channel_of(uuid: Uuid) -> Option<Channel> {
    if uuid == make_feather_aq_telemetry_uuid() {
        Some(Channel::Telemetry)
    } else if uuid == make_buzz_command_tx_uuid() {
        Some(Channel::Control)
    } else {
        None
    }
}
