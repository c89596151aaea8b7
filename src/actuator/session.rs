use log::debug;

use crate::actuator::codec::{encode_motor_frame, Request, Response};
use crate::actuator::types::MotorPattern;
use crate::error::SessionError;

/// Why a handshake was abandoned. Recoverable only by a fresh connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeFailure {
    CommsUnavailable,
    Unauthorized,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    Disconnected,
    AwaitingCommsEnabled,
    RequestingInfo,
    Authorizing,
    ConfiguringMotors,
    Ready,
    Failed(HandshakeFailure),
}

/// State machine layered over one actuator connection: drives the
/// enable → authorize → configure handshake and gates motor frames on the
/// `Ready` phase.
///
/// Methods return the control requests to issue next; the caller encodes and
/// writes them. A generation counter, bumped on every connect, guards
/// against responses and deadlines that belong to an earlier connection.
#[derive(Debug)]
pub struct ActuatorSession {
    phase: HandshakePhase,
    generation: u64,
    motors_enabled: bool,
    queue_cleared: bool,
}

impl ActuatorSession {
    pub fn new() -> Self {
        ActuatorSession {
            phase: HandshakePhase::Disconnected,
            generation: 0,
            motors_enabled: false,
            queue_cleared: false,
        }
    }

    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_ready(&self) -> bool {
        self.phase == HandshakePhase::Ready
    }

    /// Transport reported a fresh connection. The caller must request
    /// communication enablement (subscribe to the control channel).
    pub fn on_connected(&mut self) {
        self.generation += 1;
        self.phase = HandshakePhase::AwaitingCommsEnabled;
        self.motors_enabled = false;
        self.queue_cleared = false;
    }

    /// Transport reported the outcome of the communication enablement
    /// request.
    pub fn on_comms_enabled(&mut self, enabled: bool) -> Vec<Request> {
        if self.phase != HandshakePhase::AwaitingCommsEnabled {
            debug!("Ignoring stale comms enablement result in phase {:?}", self.phase);
            return Vec::new();
        }

        if enabled {
            self.phase = HandshakePhase::RequestingInfo;
            vec![Request::BatteryInfo, Request::DeviceInfo, Request::Authorize]
        } else {
            self.phase = HandshakePhase::Failed(HandshakeFailure::CommsUnavailable);
            Vec::new()
        }
    }

    /// A decoded control response arrived. Battery and device info responses
    /// are state-independent and handled by the caller; everything else
    /// advances the handshake.
    pub fn on_response(&mut self, response: &Response) -> Vec<Request> {
        match self.phase {
            HandshakePhase::Disconnected | HandshakePhase::Failed(_) => {
                debug!("Discarding stale actuator response in phase {:?}", self.phase);
                return Vec::new();
            },
            _ => {},
        }

        match response {
            Response::Authorized { ok: true, .. } => {
                if self.phase != HandshakePhase::RequestingInfo {
                    return Vec::new();
                }
                // Authorizing is transient: the configure commands go out in
                // the same dispatch step.
                self.phase = HandshakePhase::Authorizing;
                self.phase = HandshakePhase::ConfiguringMotors;
                vec![
                    Request::Accept,
                    Request::MicDisable,
                    Request::MotorsEnable,
                    Request::MotorsClearQueue,
                ]
            },
            Response::Authorized { ok: false, .. } => {
                if self.phase == HandshakePhase::RequestingInfo {
                    self.phase = HandshakePhase::Failed(HandshakeFailure::Unauthorized);
                }
                Vec::new()
            },
            // configure confirmations are only meaningful while configuring;
            // anything else is a leftover from an earlier connection
            Response::MotorsEnabled(true) => {
                if self.phase == HandshakePhase::ConfiguringMotors {
                    self.motors_enabled = true;
                    self.advance_if_configured();
                }
                Vec::new()
            },
            Response::MotorsQueueCleared(true) => {
                if self.phase == HandshakePhase::ConfiguringMotors {
                    self.queue_cleared = true;
                    self.advance_if_configured();
                }
                Vec::new()
            },
            Response::MotorsEnabled(false) | Response::MotorsQueueCleared(false) => {
                debug!("Actuator rejected a motor configuration command: {:?}", response);
                Vec::new()
            },
            Response::Accepted | Response::MicDisabled(_) => Vec::new(),
            Response::Battery { .. } | Response::DeviceInfo { .. } => Vec::new(),
        }
    }

    /// The handshake deadline fired. Returns true if this moved the session
    /// to `Failed(Timeout)`; deadlines from earlier generations are ignored.
    pub fn on_deadline(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        match self.phase {
            HandshakePhase::Disconnected | HandshakePhase::Ready | HandshakePhase::Failed(_) => false,
            _ => {
                self.phase = HandshakePhase::Failed(HandshakeFailure::Timeout);
                true
            },
        }
    }

    /// Transport reported a disconnect. Any in-flight handshake is
    /// invalidated; previously gathered device/battery info is discarded by
    /// the caller along with the device record.
    pub fn on_disconnected(&mut self) {
        self.phase = HandshakePhase::Disconnected;
        self.motors_enabled = false;
        self.queue_cleared = false;
    }

    /// Produce the wire frame for a motor pattern, or report `NotReady` in
    /// any phase other than `Ready`.
    pub fn motor_frame(&self, pattern: MotorPattern) -> Result<[u8; 4], SessionError> {
        if self.phase == HandshakePhase::Ready {
            Ok(encode_motor_frame(pattern))
        } else {
            Err(SessionError::NotReady)
        }
    }

    fn advance_if_configured(&mut self) {
        if self.phase == HandshakePhase::ConfiguringMotors && self.motors_enabled && self.queue_cleared {
            self.phase = HandshakePhase::Ready;
        }
    }
}

impl Default for ActuatorSession {
    fn default() -> Self {
        ActuatorSession::new()
    }
}
