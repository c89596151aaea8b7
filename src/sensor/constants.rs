use uuid::Uuid;

/**
 * The UUID of the Bluetooth BLE service advertised by FeatherAQ sensor nodes.
 */
pub const FEATHER_AQ_SERVICE: &str = "42610001-7274-6c65-7946-656174686572";

/**
 * The UUID of the remote GATT characteristic that notifies telemetry frames.
 */
pub const FEATHER_AQ_TELEMETRY_CHARACTERISTIC: &str = "42610002-7274-6c65-7946-656174686572";

/**
 * How often (milliseconds) to poll a connected node for its signal strength.
 */
pub const RSSI_POLL_DELAY: u64 = 1000;

pub fn make_feather_aq_service_uuid() -> Uuid {
    Uuid::parse_str(FEATHER_AQ_SERVICE).unwrap()
}

pub fn make_feather_aq_telemetry_uuid() -> Uuid {
    Uuid::parse_str(FEATHER_AQ_TELEMETRY_CHARACTERISTIC).unwrap()
}
