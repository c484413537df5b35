use crate::action::CompletionCode;
use crate::message::Message;
use crate::protocol::MessageType;
use crate::tags::PairOutcome;
use crate::time::TimeProvider;
use crate::wiring::Wiring;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, warn};

/// Serves inbound requests of one message type.
pub trait MessageHandler: Send + Sync {
    /// Handles an inbound request. The envelope of `response` is
    /// prefilled (endpoints swapped, tag copied, tag-owner cleared);
    /// fill its payload and return true to transmit it.
    fn handle(&self, request: &Message, response: &mut Message) -> bool;

    /// Typed delivery of a paired response whose submitter installed no
    /// completion callback.
    fn on_response(&self, _response: &Message) {}
}

/// Handler table indexed by the MCTP message-type code.
pub struct HandlerTable {
    slots: [Option<Arc<dyn MessageHandler>>; 256],
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerTable {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    pub fn set(&mut self, msg_type: MessageType, handler: Arc<dyn MessageHandler>) {
        self.slots[msg_type.0 as usize] = Some(handler);
    }

    pub fn clear(&mut self, msg_type: MessageType) {
        self.slots[msg_type.0 as usize] = None;
    }

    pub fn get(&self, msg_type: MessageType) -> Option<Arc<dyn MessageHandler>> {
        self.slots[msg_type.0 as usize].clone()
    }
}

/// Observes every reassembled inbound message before dispatch; returning
/// true consumes the message. Lets a test client drive the pipeline
/// manually instead of going through the handler table.
pub type InboundHook = Box<dyn FnMut(&Message) -> bool + Send>;

/// Routes reassembled messages: requests to the handler table, responses
/// to the action waiting in the tag table.
pub struct Dispatcher {
    wiring: Arc<Wiring>,
    handlers: Arc<RwLock<HandlerTable>>,
    hook: Arc<Mutex<Option<InboundHook>>>,
    time: Arc<dyn TimeProvider>,
}

impl Dispatcher {
    pub fn new(
        wiring: Arc<Wiring>,
        handlers: Arc<RwLock<HandlerTable>>,
        hook: Arc<Mutex<Option<InboundHook>>>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            wiring,
            handlers,
            hook,
            time,
        }
    }

    /// Drains the inbound message queue until it is closed.
    pub fn run(&self) {
        while let Some(msg) = self.wiring.rx_messages.pop_wait() {
            self.deliver(msg);
        }
    }

    /// Routes one inbound message.
    pub fn deliver(&self, msg: Box<Message>) {
        if let Some(hook) = self.hook.lock().as_mut()
            && hook(&msg)
        {
            self.wiring.messages.release(msg);
            return;
        }
        if msg.tag_owner {
            self.deliver_request(msg);
        } else {
            self.deliver_response(msg);
        }
    }

    fn deliver_request(&self, msg: Box<Message>) {
        let Some(handler) = self.handlers.read().get(msg.msg_type) else {
            debug!("no handler for message type {}; dropping request", msg.msg_type);
            self.wiring.messages.release(msg);
            return;
        };
        let Some(mut action) = self.wiring.actions.try_acquire() else {
            warn!("action pool exhausted; dropping inbound request");
            self.wiring.messages.release(msg);
            return;
        };
        let Some(mut response) = self.wiring.messages.try_acquire() else {
            warn!("message pool exhausted; dropping inbound request");
            self.wiring.messages.release(msg);
            self.wiring.actions.release(action);
            return;
        };
        response.prepare_reply(&msg);
        let respond = handler.handle(&msg, &mut response);
        action.created = Some(self.time.now());
        action.request = Some(msg);
        if !respond {
            self.wiring.messages.release(response);
            self.wiring.retire(action);
            return;
        }
        response.created = Some(self.time.now());
        action.response = Some(response);
        if let Err(err) = self.wiring.tx_messages.push(action) {
            self.wiring
                .counters
                .dropped_count
                .fetch_add(1, Ordering::Relaxed);
            self.wiring.retire(err.into_inner());
        }
    }

    fn deliver_response(&self, msg: Box<Message>) {
        match self.wiring.tags.pair_response(msg) {
            PairOutcome::Paired(mut action) => {
                action.completed = Some(self.time.now());
                action.completion = CompletionCode::Success;
                if let Err(err) = self.wiring.completions.push(action) {
                    self.wiring.retire(err.into_inner());
                }
            }
            PairOutcome::Parked => {}
            PairOutcome::Stray(msg) => {
                debug!("response on tag {} matches no action", msg.tag);
                self.wiring.messages.release(msg);
            }
        }
    }
}
