use crate::action::Action;
use crate::config::Config;
use crate::message::Message;
use crate::protocol::PacketSlot;
use crate::queue::{BoundedQueue, Pool};
use crate::stats::PipelineCounters;
use crate::tags::TagTable;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// Why the pipeline is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// External request; the server's accept loop exits too.
    Orderly,
    /// A stage hit a transport failure; a server recycles and
    /// re-accepts, a client just shuts down.
    Abnormal,
}

/// Shared stop signal between the stages and the supervisor.
#[derive(Default)]
pub struct StopFlag {
    cause: Mutex<Option<StopCause>>,
    cond: Condvar,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop. An orderly request upgrades an abnormal one so
    /// the accept loop still exits; nothing downgrades orderly.
    pub fn request(&self, cause: StopCause) {
        let mut current = self.cause.lock();
        match *current {
            None => *current = Some(cause),
            Some(StopCause::Abnormal) if cause == StopCause::Orderly => {
                *current = Some(StopCause::Orderly)
            }
            Some(_) => {}
        }
        self.cond.notify_all();
    }

    pub fn is_stopping(&self) -> bool {
        self.cause.lock().is_some()
    }

    pub fn cause(&self) -> Option<StopCause> {
        *self.cause.lock()
    }

    /// Blocks until a stop is requested.
    pub fn wait_stopping(&self) {
        let mut current = self.cause.lock();
        while current.is_none() {
            self.cond.wait(&mut current);
        }
    }

    /// Rearms the flag for the next accepted connection.
    pub fn reset(&self) {
        *self.cause.lock() = None;
    }
}

/// The queues, pools, and tag table of one connection.
///
/// Built when a connection is established and torn down with it; every
/// stage of the pipeline communicates exclusively through this wiring.
pub struct Wiring {
    pub packets: Pool<PacketSlot>,
    pub messages: Pool<Message>,
    pub actions: Pool<Action>,
    /// Inbound packets from the socket reader to the reassembler.
    pub rx_packets: BoundedQueue<Box<PacketSlot>>,
    /// Fragmented actions from the packet writer to the socket writer.
    pub tx_packets: BoundedQueue<Box<Action>>,
    /// Reassembled messages from the reassembler to the dispatcher.
    pub rx_messages: BoundedQueue<Box<Message>>,
    /// Actions whose message is ready for fragmentation.
    pub tx_messages: BoundedQueue<Box<Action>>,
    /// Submitted actions waiting for a free tag.
    pub submissions: BoundedQueue<Box<Action>>,
    /// Terminal actions awaiting callback delivery and retirement.
    pub completions: BoundedQueue<Box<Action>>,
    pub tags: TagTable,
    pub counters: Arc<PipelineCounters>,
}

impl Wiring {
    pub fn new(config: &Config, counters: Arc<PipelineCounters>) -> Self {
        Self {
            packets: Pool::new(config.packet_pool),
            messages: Pool::new(config.message_pool),
            actions: Pool::new(config.action_pool),
            rx_packets: BoundedQueue::new(config.rx_packet_depth),
            tx_packets: BoundedQueue::new(config.tx_packet_depth),
            rx_messages: BoundedQueue::new(config.rx_message_depth),
            tx_messages: BoundedQueue::new(config.tx_message_depth),
            submissions: BoundedQueue::new(config.submission_depth),
            completions: BoundedQueue::new(config.completion_depth),
            tags: TagTable::new(),
            counters,
        }
    }

    /// Returns an action and everything it owns to the pools.
    pub fn retire(&self, mut action: Box<Action>) {
        if let Some(request) = action.request.take() {
            self.messages.release(request);
        }
        if let Some(response) = action.response.take() {
            self.messages.release(response);
        }
        for packet in std::mem::take(&mut action.packets) {
            self.packets.release(packet);
        }
        self.actions.release(action);
    }

    /// Closes every queue and pool, waking all blocked stages.
    pub fn close_all(&self) {
        self.rx_packets.close();
        self.tx_packets.close();
        self.rx_messages.close();
        self.tx_messages.close();
        self.submissions.close();
        self.completions.close();
        self.packets.close();
        self.messages.close();
        self.actions.close();
    }

    /// Routes everything still queued or parked in the tag table back to
    /// the pools. Called after the stage threads have been joined.
    pub fn drain_into_pools(&self) {
        for packet in self.rx_packets.drain_remaining() {
            self.packets.release(packet);
        }
        for msg in self.rx_messages.drain_remaining() {
            self.messages.release(msg);
        }
        for action in self.tx_messages.drain_remaining() {
            self.retire(action);
        }
        for action in self.tx_packets.drain_remaining() {
            self.retire(action);
        }
        for action in self.submissions.drain_remaining() {
            self.retire(action);
        }
        for action in self.completions.drain_remaining() {
            self.retire(action);
        }
        let (actions, messages) = self.tags.drain();
        for action in actions {
            self.retire(action);
        }
        for msg in messages {
            self.messages.release(msg);
        }
    }
}
