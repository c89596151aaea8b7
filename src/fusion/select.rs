use crate::registry::ConnectionState;
use crate::sensor::types::SensorNode;
use crate::transport::DeviceIdentity;

/// Picks the sensor node believed physically nearest: connected nodes with a
/// known signal strength, ranked by native signed ordering (closer devices
/// report larger, less negative values).
///
/// Ties at the maximum retain the previous selection while it remains among
/// the top-ranked nodes, else fall back to registry insertion order, so the
/// haptic output does not flap between equally-ranked nodes.
#[derive(Debug, Default)]
pub struct ProximitySelector {
    current: Option<DeviceIdentity>,
}

impl ProximitySelector {
    pub fn new() -> Self {
        ProximitySelector { current: None }
    }

    pub fn select(&mut self, nodes: &[SensorNode]) -> Option<DeviceIdentity> {
        let strongest = eligible(nodes).map(|(_, rssi)| rssi).max()?;

        let retained = self.current.as_ref().and_then(|current| {
            eligible(nodes)
                .filter(|(_, rssi)| *rssi == strongest)
                .find(|(node, _)| node.identity == *current)
        });

        let (node, _) = retained.or_else(|| eligible(nodes).find(|(_, rssi)| *rssi == strongest))?;

        let chosen = node.identity.clone();
        self.current = Some(chosen.clone());
        Some(chosen)
    }
}

fn eligible(nodes: &[SensorNode]) -> impl Iterator<Item = (&SensorNode, i16)> {
    nodes
        .iter()
        .filter(|node| node.connection_state == ConnectionState::Connected)
        .filter_map(|node| node.last_signal_strength.map(|rssi| (node, rssi)))
}
