use crate::message::Message;
use crate::protocol::{BTU, MCTP_VERSION, MessageType, NUM_TAGS, PacketSlot, SeqNum};
use crate::queue::Pool;
use crate::stats::PipelineCounters;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::debug;

/// Why a packet, or the partial message it touched, was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Header version is not 1.
    Version,
    /// The packet sequence broke continuity.
    Sequence,
    /// A new SOM arrived while the tag's previous message was still
    /// missing its EOM.
    NoEom,
    /// A continuation packet arrived with no message in progress.
    NoSom,
    /// The packet's tag-owner bit contradicts the in-progress message.
    WrongOwner,
    /// The partial message has no room for another BTU.
    Overflow,
}

/// Outcome of feeding one packet to the reassembler.
#[derive(Debug)]
pub enum Ingest {
    /// The packet extended a message still in progress.
    Consumed,
    /// The packet completed a message.
    Complete(Box<Message>),
    /// The packet was discarded.
    Dropped(DropReason),
    /// The message pool has been closed; the stage should exit.
    Closed,
}

/// Rebuilds messages from the inbound packet stream.
///
/// One in-process slot per tag holds the partially assembled message;
/// a single expected-sequence counter spans all tags because packets
/// arrive in order on the one underlying stream. The table is private
/// to the reassembler stage and needs no lock.
pub struct Reassembler {
    slots: [Option<Box<Message>>; NUM_TAGS],
    expected_seq: SeqNum,
    counters: Arc<PipelineCounters>,
}

impl Reassembler {
    pub fn new(counters: Arc<PipelineCounters>) -> Self {
        Self {
            slots: Default::default(),
            expected_seq: SeqNum(0),
            counters,
        }
    }

    /// The sequence number the next accepted packet must carry.
    pub fn expected_seq(&self) -> SeqNum {
        self.expected_seq
    }

    /// Number of messages currently being assembled.
    pub fn in_progress(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Processes one inbound packet. The packet slot itself stays with
    /// the caller, which returns it to the packet pool afterwards.
    pub fn ingest(&mut self, slot: &PacketSlot, pool: &Pool<Message>) -> Ingest {
        let header = slot.packet.header;
        if header.version != MCTP_VERSION {
            self.counters.dropped_version.fetch_add(1, Ordering::Relaxed);
            debug!("dropping packet with header version {}", header.version);
            return Ingest::Dropped(DropReason::Version);
        }

        let idx = header.tag.index();
        if header.seq != self.expected_seq {
            // Continuity broke: whatever was in progress on this tag is
            // unsalvageable. A SOM resynchronizes the stream; anything
            // else is dropped until one arrives.
            if let Some(partial) = self.slots[idx].take() {
                pool.release(partial);
            }
            self.counters.dropped_seqnum.fetch_add(1, Ordering::Relaxed);
            debug!(
                "sequence mismatch on tag {}: expected {}, got {}",
                header.tag, self.expected_seq, header.seq
            );
            if !header.som {
                return Ingest::Dropped(DropReason::Sequence);
            }
            self.expected_seq = header.seq;
        }

        if header.som {
            if let Some(partial) = self.slots[idx].take() {
                self.counters.dropped_noeom.fetch_add(1, Ordering::Relaxed);
                debug!("tag {} restarted before its EOM arrived", header.tag);
                pool.release(partial);
            }
        } else {
            let Some(partial) = self.slots[idx].as_ref() else {
                self.counters.dropped_nosom.fetch_add(1, Ordering::Relaxed);
                return Ingest::Dropped(DropReason::NoSom);
            };
            if header.tag_owner != partial.tag_owner {
                let partial = self.slots[idx].take().expect("slot checked above");
                pool.release(partial);
                self.counters.dropped_wrongto.fetch_add(1, Ordering::Relaxed);
                debug!("tag-owner flipped mid-message on tag {}", header.tag);
                return Ingest::Dropped(DropReason::WrongOwner);
            }
        }

        if header.som {
            let Some(mut msg) = pool.acquire_wait() else {
                return Ingest::Closed;
            };
            msg.dest = header.dest;
            msg.src = header.src;
            msg.tag_owner = header.tag_owner;
            msg.tag = header.tag;
            msg.msg_type = MessageType::from_wire(slot.packet.payload[0]);
            msg.created = slot.arrived;
            msg.append(&slot.packet.payload[1..BTU]);
            self.slots[idx] = Some(msg);
        } else {
            let partial = self.slots[idx].as_mut().expect("slot checked above");
            if !partial.append(&slot.packet.payload) {
                let partial = self.slots[idx].take().expect("slot checked above");
                pool.release(partial);
                self.counters
                    .dropped_overflow
                    .fetch_add(1, Ordering::Relaxed);
                debug!("tag {} overflowed the message buffer", header.tag);
                return Ingest::Dropped(DropReason::Overflow);
            }
        }

        self.expected_seq = header.seq.next();

        if header.eom {
            let msg = self.slots[idx].take().expect("slot filled above");
            self.counters.message_count.fetch_add(1, Ordering::Relaxed);
            Ingest::Complete(msg)
        } else {
            Ingest::Consumed
        }
    }
}
