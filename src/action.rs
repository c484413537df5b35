use crate::message::Message;
use crate::protocol::{MessageType, PacketSlot};
use crate::queue::Recycle;
use smallvec::SmallVec;
use std::fmt;
use std::sync::mpsc::{Receiver, SyncSender};
use std::time::{Duration, Instant};

/// Terminal status of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionCode {
    /// A response was paired, or the outbound response was transmitted.
    #[default]
    Success,
    /// The transport failed while the action's packets were being sent.
    SendFailed,
    /// The retry cap was reached without a response.
    TimedOut,
}

/// One-shot callback observing an action at a lifecycle edge.
pub type ActionCallback = Box<dyn FnOnce(&Action) + Send>;

/// Retry policy for a submitted action, counted in resubmissions after
/// the first transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retry {
    /// Use the pipeline's configured default.
    #[default]
    Default,
    /// Resubmit until a response arrives or the connection dies.
    Forever,
    /// At most this many resubmissions.
    Limit(u32),
}

impl Retry {
    /// Total transmissions allowed under this policy.
    pub(crate) fn cap(self, default_retries: u32) -> u32 {
        match self {
            Retry::Default => default_retries.saturating_add(1),
            Retry::Forever => u32::MAX,
            Retry::Limit(n) => n.saturating_add(1),
        }
    }
}

/// Options accepted by `Pipeline::submit`.
#[derive(Default)]
pub struct SubmitOptions {
    pub retry: Retry,
    pub on_submitted: Option<ActionCallback>,
    pub on_completed: Option<ActionCallback>,
    pub on_failed: Option<ActionCallback>,
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A submitted request and its lifecycle state.
///
/// An action owns its request message, the response once paired, and the
/// chain of packet slots produced by the fragmenter. It lives in exactly
/// one place at a time: the free pool, the submission queue, a tag-table
/// slot, the transmit queues, or the completion queue.
pub struct Action {
    pub request: Option<Box<Message>>,
    pub response: Option<Box<Message>>,
    pub packets: SmallVec<[Box<PacketSlot>; 4]>,
    pub created: Option<Instant>,
    pub submitted: Option<Instant>,
    pub completed: Option<Instant>,
    /// Transmissions performed so far.
    pub num: u32,
    /// Transmissions allowed before the action is retired.
    pub max: u32,
    pub completion: CompletionCode,
    /// True for actions created by `submit`, false for actions carrying
    /// a locally generated response to an inbound request.
    pub outbound: bool,
    pub on_submitted: Option<ActionCallback>,
    pub on_completed: Option<ActionCallback>,
    pub on_failed: Option<ActionCallback>,
    pub notify: Option<SyncSender<ActionOutcome>>,
}

impl Default for Action {
    fn default() -> Self {
        Self {
            request: None,
            response: None,
            packets: SmallVec::new(),
            created: None,
            submitted: None,
            completed: None,
            num: 0,
            max: 0,
            completion: CompletionCode::Success,
            outbound: false,
            on_submitted: None,
            on_completed: None,
            on_failed: None,
            notify: None,
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("request", &self.request)
            .field("response", &self.response)
            .field("packets", &self.packets.len())
            .field("num", &self.num)
            .field("max", &self.max)
            .field("completion", &self.completion)
            .field("outbound", &self.outbound)
            .finish_non_exhaustive()
    }
}

impl Recycle for Action {
    fn recycle(&mut self) {
        debug_assert!(self.request.is_none() && self.response.is_none());
        debug_assert!(self.packets.is_empty());
        self.request = None;
        self.response = None;
        self.packets.clear();
        self.created = None;
        self.submitted = None;
        self.completed = None;
        self.num = 0;
        self.max = 0;
        self.completion = CompletionCode::Success;
        self.outbound = false;
        self.on_submitted = None;
        self.on_completed = None;
        self.on_failed = None;
        self.notify = None;
    }
}

/// The terminal result of an action, delivered to a waiting submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub completion: CompletionCode,
    /// Type and payload of the paired response, if one arrived.
    pub response: Option<(MessageType, Vec<u8>)>,
}

/// Handle returned by `submit`; resolves once the action completes,
/// fails, or is retired at shutdown.
pub struct ActionHandle {
    pub(crate) rx: Receiver<ActionOutcome>,
}

impl ActionHandle {
    /// Blocks up to `timeout` for the action's outcome. `None` means the
    /// deadline passed or the pipeline was torn down first.
    pub fn wait(self, timeout: Duration) -> Option<ActionOutcome> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Returns the outcome if it has already been posted.
    pub fn try_wait(&self) -> Option<ActionOutcome> {
        self.rx.try_recv().ok()
    }
}
