use serde::Deserialize;

use crate::actuator::types::MotorPattern;
use crate::error::CommandError;

/// Control requests the bridge can issue to the actuator. Each encodes as a
/// newline-terminated ASCII line on the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Authorize,
    Accept,
    BatteryInfo,
    DeviceInfo,
    MicDisable,
    MotorsEnable,
    MotorsClearQueue,
}

impl Request {
    fn line(self) -> &'static str {
        match self {
            Request::Authorize => "auth as developer",
            Request::Accept => "accept",
            Request::BatteryInfo => "device battery_soc",
            Request::DeviceInfo => "device info",
            Request::MicDisable => "audio stop",
            Request::MotorsEnable => "motors start",
            Request::MotorsClearQueue => "motors clear_queue",
        }
    }
}

/// Decoded control responses. Battery and device info may arrive at any time
/// after communication is enabled, independent of the handshake phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Authorized { ok: bool, message: Option<String> },
    Accepted,
    Battery { level: u8 },
    DeviceInfo { id: String },
    MicDisabled(bool),
    MotorsEnabled(bool),
    MotorsQueueCleared(bool),
}

pub fn encode_request(request: Request) -> Vec<u8> {
    let mut payload = request.line().as_bytes().to_vec();
    payload.push(b'\n');
    payload
}

/// Raw 4-byte intensity frame for the motor channel.
pub fn encode_motor_frame(pattern: MotorPattern) -> [u8; 4] {
    pattern.to_bytes()
}

#[derive(Deserialize)]
struct WireResponse {
    command: String,
    status_code: u16,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    battery_soc: Option<u8>,
    #[serde(default)]
    device_id: Option<String>,
}

/// Decode one JSON response object from the command channel.
pub fn decode_response(raw: &[u8]) -> Result<Response, CommandError> {
    let wire: WireResponse = serde_json::from_slice(raw)?;
    let ok = wire.status_code == 200;

    match wire.command.as_str() {
        "auth as developer" => Ok(Response::Authorized { ok, message: wire.message }),
        "accept" => Ok(Response::Accepted),
        "device battery_soc" => wire
            .battery_soc
            .map(|level| Response::Battery { level })
            .ok_or(CommandError::MissingField { field: "battery_soc" }),
        "device info" => wire
            .device_id
            .map(|id| Response::DeviceInfo { id })
            .ok_or(CommandError::MissingField { field: "device_id" }),
        "audio stop" => Ok(Response::MicDisabled(ok)),
        "motors start" => Ok(Response::MotorsEnabled(ok)),
        "motors clear_queue" => Ok(Response::MotorsQueueCleared(ok)),
        _ => Err(CommandError::UnknownCommand { command: wire.command }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_encode_as_terminated_lines() {
        assert_eq!(encode_request(Request::Authorize), b"auth as developer\n");
        assert_eq!(encode_request(Request::MotorsClearQueue), b"motors clear_queue\n");
    }

    #[test]
    fn motor_frame_is_the_raw_intensity_tuple() {
        let frame = encode_motor_frame(MotorPattern::new(1, 2, 3, 4));
        assert_eq!(frame, [1, 2, 3, 4]);
    }

    #[test]
    fn decodes_battery_response() {
        let raw = br#"{"command":"device battery_soc","status_code":200,"battery_soc":87}"#;
        assert_eq!(decode_response(raw).unwrap(), Response::Battery { level: 87 });
    }

    #[test]
    fn decodes_device_info_response() {
        let raw = br#"{"command":"device info","status_code":200,"device_id":"BZ-1701"}"#;
        assert_eq!(
            decode_response(raw).unwrap(),
            Response::DeviceInfo { id: "BZ-1701".to_string() },
        );
    }

    #[test]
    fn auth_rejection_carries_the_message() {
        let raw = br#"{"command":"auth as developer","status_code":401,"message":"bad token"}"#;
        assert_eq!(
            decode_response(raw).unwrap(),
            Response::Authorized { ok: false, message: Some("bad token".to_string()) },
        );
    }

    #[test]
    fn unknown_command_is_an_error() {
        let raw = br#"{"command":"leds rainbow","status_code":200}"#;
        assert!(matches!(
            decode_response(raw),
            Err(CommandError::UnknownCommand { command }) if command == "leds rainbow",
        ));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            decode_response(b"motors go brr"),
            Err(CommandError::Malformed { .. }),
        ));
    }

    #[test]
    fn battery_without_level_is_missing_field() {
        let raw = br#"{"command":"device battery_soc","status_code":500}"#;
        assert!(matches!(
            decode_response(raw),
            Err(CommandError::MissingField { field: "battery_soc" }),
        ));
    }
}
