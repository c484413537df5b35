use crate::message::Message;
use crate::protocol::{BTU, MCTP_VERSION, PacketHeader, PacketSlot, SOM_CAPACITY, SeqNum};
use smallvec::SmallVec;

/// Splits outbound messages into BTU-sized packets.
///
/// One running sequence number spans every packet this endpoint
/// transmits, matching the single expected-sequence counter on the
/// receiving side.
pub struct Fragmenter {
    next_seq: SeqNum,
}

impl Default for Fragmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Fragmenter {
    pub fn new() -> Self {
        Self {
            next_seq: SeqNum(0),
        }
    }

    /// The sequence number the next emitted packet will carry.
    pub fn next_seq(&self) -> SeqNum {
        self.next_seq
    }

    /// Number of packets a payload of `len` bytes occupies.
    pub fn packet_count(len: usize) -> usize {
        len.div_ceil(BTU).max(1)
    }

    /// Builds the packet chain for `msg`, drawing slots from `acquire`.
    ///
    /// The SOM packet carries the message-type code in its first payload
    /// byte followed by the first 63 message bytes; every later packet
    /// carries the next 64. The final packet is zero-padded. Returns
    /// `None` if `acquire` gives out (the pool was closed).
    pub fn fragment(
        &mut self,
        msg: &Message,
        mut acquire: impl FnMut() -> Option<Box<PacketSlot>>,
    ) -> Option<SmallVec<[Box<PacketSlot>; 4]>> {
        let data = msg.payload();
        let count = Self::packet_count(data.len());
        let mut chain = SmallVec::new();
        for i in 0..count {
            let mut slot = acquire()?;
            let packet = &mut slot.packet;
            packet.header = PacketHeader {
                version: MCTP_VERSION,
                dest: msg.dest,
                src: msg.src,
                som: i == 0,
                eom: i == count - 1,
                tag: msg.tag,
                tag_owner: msg.tag_owner,
                seq: self.next_seq,
            };
            self.next_seq = self.next_seq.next();
            packet.payload = [0u8; BTU];
            if i == 0 {
                packet.payload[0] = msg.msg_type.to_wire();
                let take = data.len().min(SOM_CAPACITY);
                packet.payload[1..1 + take].copy_from_slice(&data[..take]);
            } else {
                let start = i * BTU - 1;
                let end = (start + BTU).min(data.len());
                packet.payload[..end - start].copy_from_slice(&data[start..end]);
            }
            chain.push(slot);
        }
        Some(chain)
    }
}
