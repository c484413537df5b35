use crate::action::Action;
use crate::message::Message;
use crate::protocol::{NUM_TAGS, Tag};
use parking_lot::{Mutex, MutexGuard};

/// Occupancy state of one tag-table slot.
#[derive(Debug, Default)]
pub enum TagSlot {
    /// No action bound to this tag.
    #[default]
    Vacant,
    /// The action is out with the fragmenter or the socket writer.
    Sending,
    /// The request is on the wire; the action waits here for a response.
    Waiting(Box<Action>),
    /// A response arrived while the action was still with the writer.
    Responded(Box<Message>),
}

impl TagSlot {
    pub fn is_vacant(&self) -> bool {
        matches!(self, TagSlot::Vacant)
    }
}

/// Result of pairing an inbound response against the table.
#[derive(Debug)]
pub enum PairOutcome {
    /// The waiting action, with the response attached; its slot is free.
    Paired(Box<Action>),
    /// The action is still with the writer; the response is parked in
    /// the slot until the writer deposits it.
    Parked,
    /// No action owns this tag; the message is handed back.
    Stray(Box<Message>),
}

/// Result of the socket writer depositing a transmitted request.
#[derive(Debug)]
pub enum DepositOutcome {
    /// The action now waits in its slot for the peer's response.
    Waiting,
    /// The response raced the deposit; the action is returned with the
    /// response attached and its slot is free.
    AlreadyResponded(Box<Action>),
}

/// The fixed table of 8 tag slots correlating in-flight requests with
/// their responses, shared by the dispatcher, the socket writer, and the
/// retry scheduler under a single mutex.
#[derive(Default)]
pub struct TagTable {
    slots: Mutex<[TagSlot; NUM_TAGS]>,
}

impl TagTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the whole table. The retry scheduler holds this guard
    /// across its sweep and promotion phases so it observes a
    /// consistent slot state.
    pub fn guard(&self) -> MutexGuard<'_, [TagSlot; NUM_TAGS]> {
        self.slots.lock()
    }

    /// Matches an inbound response against its tag slot.
    pub fn pair_response(&self, msg: Box<Message>) -> PairOutcome {
        let mut slots = self.slots.lock();
        let slot = &mut slots[msg.tag.index()];
        match std::mem::take(slot) {
            TagSlot::Waiting(mut action) => {
                action.response = Some(msg);
                PairOutcome::Paired(action)
            }
            TagSlot::Sending => {
                *slot = TagSlot::Responded(msg);
                PairOutcome::Parked
            }
            TagSlot::Vacant => PairOutcome::Stray(msg),
            TagSlot::Responded(parked) => {
                // A second response for the same tag; keep the first.
                *slot = TagSlot::Responded(parked);
                PairOutcome::Stray(msg)
            }
        }
    }

    /// Deposits a request action whose packets have been transmitted.
    pub fn deposit_sent(&self, mut action: Box<Action>) -> DepositOutcome {
        let tag = action
            .request
            .as_ref()
            .map(|req| req.tag)
            .unwrap_or_default();
        let mut slots = self.slots.lock();
        let slot = &mut slots[tag.index()];
        match std::mem::take(slot) {
            TagSlot::Responded(msg) => {
                action.response = Some(msg);
                DepositOutcome::AlreadyResponded(action)
            }
            _ => {
                *slot = TagSlot::Waiting(action);
                DepositOutcome::Waiting
            }
        }
    }

    /// Vacates a tag after a failed transmission, returning any response
    /// that managed to arrive in the meantime.
    pub fn clear(&self, tag: Tag) -> Option<Box<Message>> {
        let mut slots = self.slots.lock();
        match std::mem::take(&mut slots[tag.index()]) {
            TagSlot::Responded(msg) => Some(msg),
            _ => None,
        }
    }

    /// Empties the table at teardown. Waiting actions and parked
    /// responses are handed back for retirement.
    pub fn drain(&self) -> (Vec<Box<Action>>, Vec<Box<Message>>) {
        let mut slots = self.slots.lock();
        let mut actions = Vec::new();
        let mut messages = Vec::new();
        for slot in slots.iter_mut() {
            match std::mem::take(slot) {
                TagSlot::Waiting(action) => actions.push(action),
                TagSlot::Responded(msg) => messages.push(msg),
                TagSlot::Vacant | TagSlot::Sending => {}
            }
        }
        (actions, messages)
    }

    /// Number of slots not currently vacant.
    pub fn occupied(&self) -> usize {
        self.slots
            .lock()
            .iter()
            .filter(|slot| !slot.is_vacant())
            .count()
    }
}
