use uuid::Uuid;

/**
 * The UUID of the UART-style Bluetooth BLE service advertised by the Buzz
 * actuator.
 */
pub const BUZZ_SERVICE: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";

/**
 * The UUID of the remote GATT characteristic that accepts command requests.
 */
pub const BUZZ_COMMAND_RX_CHARACTERISTIC: &str = "6e400002-b5a3-f393-e0a9-e50e24dcca9e";

/**
 * The UUID of the remote GATT characteristic that notifies command responses.
 */
pub const BUZZ_COMMAND_TX_CHARACTERISTIC: &str = "6e400003-b5a3-f393-e0a9-e50e24dcca9e";

/**
 * The UUID of the remote GATT characteristic that accepts raw motor frames.
 */
pub const BUZZ_MOTOR_CHARACTERISTIC: &str = "6e400004-b5a3-f393-e0a9-e50e24dcca9e";

/**
 * How long (milliseconds) the enable/authorize/configure handshake may take
 * before the session is failed with a timeout.
 */
pub const HANDSHAKE_DEADLINE: u64 = 15_000;

pub fn make_buzz_service_uuid() -> Uuid {
    Uuid::parse_str(BUZZ_SERVICE).unwrap()
}

pub fn make_buzz_command_rx_uuid() -> Uuid {
    Uuid::parse_str(BUZZ_COMMAND_RX_CHARACTERISTIC).unwrap()
}

pub fn make_buzz_command_tx_uuid() -> Uuid {
    Uuid::parse_str(BUZZ_COMMAND_TX_CHARACTERISTIC).unwrap()
}

pub fn make_buzz_motor_uuid() -> Uuid {
    Uuid::parse_str(BUZZ_MOTOR_CHARACTERISTIC).unwrap()
}
