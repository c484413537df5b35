use crate::queue::Recycle;
use std::time::Instant;

/// MCTP header version carried in every packet (DSP0236).
pub const MCTP_VERSION: u8 = 1;
/// Size of the packed MCTP packet header in bytes.
pub const HEADER_SIZE: usize = 4;
/// Baseline transmission unit: the payload bytes carried by one packet.
pub const BTU: usize = 64;
/// Size of one wire record: the 4-byte header plus one BTU of payload.
pub const PACKET_SIZE: usize = HEADER_SIZE + BTU;
/// Maximum size of a reassembled message payload.
pub const MAX_MESSAGE_SIZE: usize = 8192;
/// Number of message tags (3-bit field).
pub const NUM_TAGS: usize = 8;
/// Message bytes carried by a start-of-message packet; its first payload
/// byte holds the message-type code.
pub const SOM_CAPACITY: usize = BTU - 1;

macro_rules! wire_field {
    ($name:ident, $mask:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub u8);

        impl From<u8> for $name {
            fn from(val: u8) -> Self {
                $name(val & $mask)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

wire_field!(Eid, 0xFF, "8-bit MCTP endpoint identifier.");
wire_field!(
    Tag,
    0x07,
    "3-bit message tag correlating a request with its response."
);
wire_field!(SeqNum, 0x03, "2-bit packet sequence number, modulo 4.");
wire_field!(MessageType, 0x7F, "7-bit MCTP message-type code.");

impl Eid {
    /// The reserved null endpoint ID.
    pub const NULL: Eid = Eid(0x00);
    /// The reserved broadcast endpoint ID.
    pub const BROADCAST: Eid = Eid(0xFF);

    /// True for the two endpoint IDs DSP0236 reserves.
    pub fn is_reserved(self) -> bool {
        self == Eid::NULL || self == Eid::BROADCAST
    }
}

impl Tag {
    /// Slot index of this tag in the tag table.
    pub fn index(self) -> usize {
        (self.0 & 0x07) as usize
    }
}

impl SeqNum {
    /// The sequence number following this one.
    pub fn next(self) -> SeqNum {
        SeqNum((self.0 + 1) & 0x03)
    }
}

impl MessageType {
    /// The MCTP Control message type.
    pub const CONTROL: MessageType = MessageType(0x00);

    /// Reads a type code from the first payload byte of a SOM packet,
    /// discarding the integrity-check bit.
    pub fn from_wire(byte: u8) -> Self {
        MessageType(byte & 0x7F)
    }

    /// Wire encoding of the type code; the integrity-check bit is
    /// transmitted as zero.
    pub fn to_wire(self) -> u8 {
        self.0 & 0x7F
    }
}

/// The parsed 4-byte MCTP packet header.
///
/// Bit layout of the flag byte (byte 3): SOM bit 7, EOM bit 6, tag bits
/// 5..3, tag-owner bit 2, sequence bits 1..0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub version: u8,
    pub dest: Eid,
    pub src: Eid,
    pub som: bool,
    pub eom: bool,
    pub tag: Tag,
    pub tag_owner: bool,
    pub seq: SeqNum,
}

impl Default for PacketHeader {
    fn default() -> Self {
        Self {
            version: MCTP_VERSION,
            dest: Eid::NULL,
            src: Eid::NULL,
            som: false,
            eom: false,
            tag: Tag(0),
            tag_owner: false,
            seq: SeqNum(0),
        }
    }
}

impl PacketHeader {
    /// Packs the header into its wire form.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut flags = ((self.tag.0 & 0x07) << 3) | (self.seq.0 & 0x03);
        if self.som {
            flags |= 1 << 7;
        }
        if self.eom {
            flags |= 1 << 6;
        }
        if self.tag_owner {
            flags |= 1 << 2;
        }
        [self.version & 0x0F, self.dest.0, self.src.0, flags]
    }

    /// Unpacks a header from its wire form. Every bit pattern is
    /// representable; version validation is the reassembler's job.
    pub fn decode(bytes: [u8; HEADER_SIZE]) -> Self {
        Self {
            version: bytes[0] & 0x0F,
            dest: Eid(bytes[1]),
            src: Eid(bytes[2]),
            som: bytes[3] & 0x80 != 0,
            eom: bytes[3] & 0x40 != 0,
            tag: Tag::from(bytes[3] >> 3),
            tag_owner: bytes[3] & 0x04 != 0,
            seq: SeqNum::from(bytes[3]),
        }
    }
}

/// One 68-byte MCTP wire record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: [u8; BTU],
}

impl Default for Packet {
    fn default() -> Self {
        Self {
            header: PacketHeader::default(),
            payload: [0u8; BTU],
        }
    }
}

impl Packet {
    /// Serializes the packet into one wire record.
    pub fn to_bytes(&self) -> [u8; PACKET_SIZE] {
        let mut out = [0u8; PACKET_SIZE];
        out[..HEADER_SIZE].copy_from_slice(&self.header.encode());
        out[HEADER_SIZE..].copy_from_slice(&self.payload);
        out
    }

    /// Deserializes one wire record.
    pub fn from_bytes(bytes: &[u8; PACKET_SIZE]) -> Self {
        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&bytes[..HEADER_SIZE]);
        let mut payload = [0u8; BTU];
        payload.copy_from_slice(&bytes[HEADER_SIZE..]);
        Self {
            header: PacketHeader::decode(header),
            payload,
        }
    }
}

/// A pooled packet plus its arrival timestamp.
///
/// Slots circulate between the free pool, the receive/transmit packet
/// queues, and the outbound chain of an action.
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketSlot {
    pub packet: Packet,
    pub arrived: Option<Instant>,
}

impl Recycle for PacketSlot {
    fn recycle(&mut self) {
        self.packet = Packet::default();
        self.arrived = None;
    }
}
