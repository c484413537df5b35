//! # MCTP Stream Transport
//!
//! A Management Component Transport Protocol (MCTP, DSP0236) endpoint
//! over a single reliable byte-stream connection.
//!
//! The crate turns the stream into 68-byte framed packets, reassembles
//! packets into messages, dispatches messages to typed handlers, tracks
//! in-flight request/response correlation by 3-bit tag, and performs
//! bounded retransmission.
//!
//! ## Architecture
//!
//! - **Pipeline**: seven long-lived stages (socket reader, reassembler,
//!   dispatcher, fragmenter, socket writer, retry scheduler, completion)
//!   connected by bounded FIFO queues.
//! - **Memory**: packets, messages, and actions are drawn from fixed
//!   pools built at connection start; nothing is allocated per packet.
//! - **Correlation**: an 8-slot tag table pairs responses with the
//!   actions that own the tag; the scheduler resubmits on timeout and
//!   retires after a bounded number of transmissions.
//! - **Lifecycle**: a supervisor wires the stages up per connection,
//!   drains everything on shutdown, and (in server mode) re-accepts.

pub mod action;
pub mod config;
pub mod control;
pub mod dispatch;
pub mod error;
pub mod fragment;
pub mod message;
pub mod pipeline;
pub mod protocol;
pub mod queue;
pub mod reassembly;
pub mod scheduler;
pub mod stages;
pub mod stats;
pub mod tags;
pub mod time;
pub mod wiring;

pub use action::{
    Action, ActionCallback, ActionHandle, ActionOutcome, CompletionCode, Retry, SubmitOptions,
};
pub use config::{Config, Role};
pub use dispatch::{Dispatcher, HandlerTable, InboundHook, MessageHandler};
pub use error::{RunError, SubmitError};
pub use fragment::Fragmenter;
pub use message::Message;
pub use pipeline::Pipeline;
pub use protocol::{
    BTU, Eid, HEADER_SIZE, MAX_MESSAGE_SIZE, MCTP_VERSION, MessageType, NUM_TAGS, PACKET_SIZE,
    Packet, PacketHeader, PacketSlot, SOM_CAPACITY, SeqNum, Tag,
};
pub use queue::{BoundedQueue, Pool, PushError, Recycle};
pub use reassembly::{DropReason, Ingest, Reassembler};
pub use scheduler::RetryScheduler;
pub use stats::{CounterSnapshot, PipelineCounters};
pub use tags::{DepositOutcome, PairOutcome, TagSlot, TagTable};
pub use time::{ManualTimeProvider, SystemTimeProvider, TimeProvider};
pub use wiring::{StopCause, StopFlag, Wiring};
