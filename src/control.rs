//! MCTP Control message support (DSP0236 §12), layered on the public
//! handler interface. The pipeline core never special-cases type 0x00;
//! registering a [`ControlHandler`] is what turns an endpoint into a
//! control responder.

use crate::dispatch::MessageHandler;
use crate::message::Message;
use crate::protocol::{Eid, MessageType};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Control command codes served by this endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlCommand {
    SetEndpointId = 0x01,
    GetEndpointId = 0x02,
    GetEndpointUuid = 0x03,
    GetVersionSupport = 0x04,
    GetMessageTypeSupport = 0x05,
}

impl ControlCommand {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::SetEndpointId),
            0x02 => Some(Self::GetEndpointId),
            0x03 => Some(Self::GetEndpointUuid),
            0x04 => Some(Self::GetVersionSupport),
            0x05 => Some(Self::GetMessageTypeSupport),
            _ => None,
        }
    }
}

/// Completion codes carried in every control response.
pub mod completion {
    pub const SUCCESS: u8 = 0x00;
    pub const ERROR: u8 = 0x01;
    pub const ERROR_INVALID_DATA: u8 = 0x02;
    pub const ERROR_INVALID_LENGTH: u8 = 0x03;
    pub const ERROR_NOT_READY: u8 = 0x04;
    pub const ERROR_UNSUPPORTED_CMD: u8 = 0x05;
    /// Command-specific: queried message type is not supported.
    pub const ERROR_UNSUPPORTED_TYPE: u8 = 0x80;
}

/// Operation field of a Set Endpoint ID request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EidOperation {
    Set = 0,
    Force = 1,
    Reset = 2,
    SetDiscoveredFlag = 3,
}

/// EID assignment status reported by a Set Endpoint ID response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EidAssignment {
    Accepted = 0,
    Rejected = 1,
}

/// The two-byte header prefixed to every control request and response:
/// request bit, datagram bit, 5-bit instance ID, then the command code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlHeader {
    pub request: bool,
    pub datagram: bool,
    pub instance: u8,
    pub command: u8,
}

impl ControlHeader {
    pub fn request(instance: u8, command: ControlCommand) -> Self {
        Self {
            request: true,
            datagram: false,
            instance: instance & 0x1F,
            command: command as u8,
        }
    }

    /// The response header echoing this request.
    pub fn reply(&self) -> Self {
        Self {
            request: false,
            datagram: false,
            instance: self.instance,
            command: self.command,
        }
    }

    pub fn encode(&self) -> [u8; 2] {
        let mut first = self.instance & 0x1F;
        if self.request {
            first |= 1 << 7;
        }
        if self.datagram {
            first |= 1 << 6;
        }
        [first, self.command]
    }

    /// Splits a control payload into its header and body.
    pub fn decode(payload: &[u8]) -> Option<(Self, &[u8])> {
        let [first, command, body @ ..] = payload else {
            return None;
        };
        let header = Self {
            request: first & 0x80 != 0,
            datagram: first & 0x40 != 0,
            instance: first & 0x1F,
            command: *command,
        };
        Some((header, body))
    }
}

/// One 4-digit BCD version entry. A digit of 0xF means "any" and ranks
/// below every concrete digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlVersion {
    pub major: u8,
    pub minor: u8,
    pub update: u8,
    pub alpha: u8,
}

impl ControlVersion {
    pub fn new(major: u8, minor: u8, update: u8, alpha: u8) -> Self {
        Self {
            major,
            minor,
            update,
            alpha,
        }
    }

    pub fn to_bytes(self) -> [u8; 4] {
        [self.major, self.minor, self.update, self.alpha]
    }

    fn digits(self) -> impl Iterator<Item = i8> {
        self.to_bytes().into_iter().flat_map(|byte| {
            [byte >> 4, byte & 0x0F]
                .into_iter()
                .map(|digit| if digit == 0xF { -1 } else { digit as i8 })
        })
    }
}

impl Ord for ControlVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.digits().cmp(other.digits())
    }
}

impl PartialOrd for ControlVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The MCTP base-protocol version this endpoint reports: 1.3.1.
pub const BASE_VERSION: ControlVersion = ControlVersion {
    major: 0xF1,
    minor: 0xF3,
    update: 0xF1,
    alpha: 0x00,
};

/// Identity and capability state answered by the control handler.
#[derive(Debug, Clone)]
pub struct EndpointState {
    pub eid: Eid,
    pub bus_owner: Eid,
    pub uuid: [u8; 16],
    /// Message types reported by Get Message Type Support.
    pub message_types: Vec<MessageType>,
    versions: Vec<(MessageType, Vec<ControlVersion>)>,
}

impl EndpointState {
    pub fn new(eid: Eid) -> Self {
        let mut state = Self {
            eid,
            bus_owner: Eid::NULL,
            uuid: [0u8; 16],
            message_types: Vec::new(),
            versions: Vec::new(),
        };
        state.register_version(MessageType::CONTROL, BASE_VERSION);
        state
    }

    /// Records a supported version, keeping each type's list ordered by
    /// the BCD comparator.
    pub fn register_version(&mut self, msg_type: MessageType, version: ControlVersion) {
        match self.versions.iter_mut().find(|(t, _)| *t == msg_type) {
            Some((_, list)) => {
                if !list.contains(&version) {
                    list.push(version);
                    list.sort();
                }
            }
            None => self.versions.push((msg_type, vec![version])),
        }
    }

    /// The ordered versions supported for `msg_type`, if any.
    pub fn versions_for(&self, msg_type: MessageType) -> Option<&[ControlVersion]> {
        self.versions
            .iter()
            .find(|(t, _)| *t == msg_type)
            .map(|(_, list)| list.as_slice())
    }
}

/// Answers the control command set over shared endpoint state.
pub struct ControlHandler {
    state: Arc<Mutex<EndpointState>>,
}

impl ControlHandler {
    pub fn new(state: Arc<Mutex<EndpointState>>) -> Self {
        Self { state }
    }
}

impl MessageHandler for ControlHandler {
    fn handle(&self, request: &Message, response: &mut Message) -> bool {
        let Some((header, body)) = ControlHeader::decode(request.payload()) else {
            debug!("control request shorter than its header; dropping");
            return false;
        };
        if !header.request || header.datagram {
            // Responses are paired by the dispatcher; datagrams get no
            // answer at all.
            return false;
        }

        let mut out = Vec::with_capacity(24);
        out.extend_from_slice(&header.reply().encode());

        let mut state = self.state.lock();
        match ControlCommand::from_u8(header.command) {
            Some(ControlCommand::SetEndpointId) => match body {
                [operation, eid, ..] => {
                    let eid = Eid(*eid);
                    let op = operation & 0x03;
                    let accepted = (op == EidOperation::Set as u8
                        || op == EidOperation::Force as u8)
                        && !eid.is_reserved();
                    if accepted {
                        state.eid = eid;
                        state.bus_owner = request.src;
                        debug!("assigned endpoint ID {} by {}", eid, request.src);
                    }
                    let status = if accepted {
                        EidAssignment::Accepted
                    } else {
                        EidAssignment::Rejected
                    };
                    out.push(completion::SUCCESS);
                    out.push((status as u8) << 4);
                    out.push(state.eid.0);
                    // No dynamic EID pool behind this endpoint.
                    out.push(0x00);
                }
                _ => out.push(completion::ERROR_INVALID_LENGTH),
            },
            Some(ControlCommand::GetEndpointId) => {
                out.push(completion::SUCCESS);
                out.push(state.eid.0);
                // Simple endpoint, dynamic EID.
                out.push(0x00);
                out.push(0x00);
            }
            Some(ControlCommand::GetEndpointUuid) => {
                out.push(completion::SUCCESS);
                out.extend_from_slice(&state.uuid);
            }
            Some(ControlCommand::GetVersionSupport) => match body {
                [queried, ..] => match state.versions_for(MessageType::from_wire(*queried)) {
                    Some(versions) => {
                        out.push(completion::SUCCESS);
                        out.push(versions.len() as u8);
                        for version in versions {
                            out.extend_from_slice(&version.to_bytes());
                        }
                    }
                    None => out.push(completion::ERROR_UNSUPPORTED_TYPE),
                },
                _ => out.push(completion::ERROR_INVALID_LENGTH),
            },
            Some(ControlCommand::GetMessageTypeSupport) => {
                out.push(completion::SUCCESS);
                out.push(state.message_types.len() as u8);
                for msg_type in &state.message_types {
                    out.push(msg_type.to_wire());
                }
            }
            None => out.push(completion::ERROR_UNSUPPORTED_CMD),
        }

        response.set_payload(&out);
        true
    }
}

/// Builds a Set Endpoint ID request payload.
pub fn set_endpoint_id_request(instance: u8, operation: EidOperation, eid: Eid) -> Vec<u8> {
    let mut out = ControlHeader::request(instance, ControlCommand::SetEndpointId)
        .encode()
        .to_vec();
    out.push(operation as u8);
    out.push(eid.0);
    out
}

/// Builds a Get Endpoint ID request payload.
pub fn get_endpoint_id_request(instance: u8) -> Vec<u8> {
    ControlHeader::request(instance, ControlCommand::GetEndpointId)
        .encode()
        .to_vec()
}

/// Builds a Get Endpoint UUID request payload.
pub fn get_endpoint_uuid_request(instance: u8) -> Vec<u8> {
    ControlHeader::request(instance, ControlCommand::GetEndpointUuid)
        .encode()
        .to_vec()
}

/// Builds a Get MCTP Version Support request payload.
pub fn get_version_support_request(instance: u8, queried: MessageType) -> Vec<u8> {
    let mut out = ControlHeader::request(instance, ControlCommand::GetVersionSupport)
        .encode()
        .to_vec();
    out.push(queried.to_wire());
    out
}

/// Builds a Get Message Type Support request payload.
pub fn get_message_type_support_request(instance: u8) -> Vec<u8> {
    ControlHeader::request(instance, ControlCommand::GetMessageTypeSupport)
        .encode()
        .to_vec()
}
