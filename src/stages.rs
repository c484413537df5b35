//! The socket-facing stage loops and the completion stage.
//!
//! Each loop follows the same shape: blocking-pop an element, do one
//! unit of work, push downstream. A closed queue or pool is the shared
//! exit path; a transport failure additionally requests an abnormal
//! stop so the supervisor can tear the connection down.

use crate::action::CompletionCode;
use crate::dispatch::HandlerTable;
use crate::fragment::Fragmenter;
use crate::protocol::{PACKET_SIZE, Packet};
use crate::queue::PushError;
use crate::reassembly::{Ingest, Reassembler};
use crate::tags::DepositOutcome;
use crate::time::TimeProvider;
use crate::wiring::{StopCause, StopFlag, Wiring};
use parking_lot::RwLock;
use std::io::{Read, Write};
use std::sync::atomic::Ordering;
use tracing::{debug, warn};

/// Reads one packet-sized record per iteration and queues it for
/// reassembly. A short or failed read is treated as connection loss.
pub fn socket_reader<R: Read>(
    mut conn: R,
    wiring: &Wiring,
    stop: &StopFlag,
    time: &dyn TimeProvider,
) {
    loop {
        let Some(mut slot) = wiring.packets.acquire_wait() else {
            break;
        };
        let mut buf = [0u8; PACKET_SIZE];
        if let Err(err) = conn.read_exact(&mut buf) {
            debug!("socket read failed: {}", err);
            wiring.packets.release(slot);
            stop.request(StopCause::Abnormal);
            break;
        }
        slot.packet = Packet::from_bytes(&buf);
        slot.arrived = Some(time.now());
        match wiring.rx_packets.push(slot) {
            Ok(()) => {}
            Err(PushError::Full(slot)) => {
                wiring.counters.dropped_count.fetch_add(1, Ordering::Relaxed);
                wiring.packets.release(slot);
            }
            Err(PushError::Closed(slot)) => {
                wiring.packets.release(slot);
                break;
            }
        }
    }
}

/// Feeds inbound packets through the reassembler and queues completed
/// messages for dispatch.
pub fn reassembler_stage(wiring: &Wiring, reassembler: &mut Reassembler) {
    while let Some(slot) = wiring.rx_packets.pop_wait() {
        match reassembler.ingest(&slot, &wiring.messages) {
            Ingest::Complete(msg) => match wiring.rx_messages.push(msg) {
                Ok(()) => {}
                Err(PushError::Full(msg)) => {
                    wiring.counters.dropped_count.fetch_add(1, Ordering::Relaxed);
                    wiring.messages.release(msg);
                }
                Err(PushError::Closed(msg)) => {
                    wiring.messages.release(msg);
                    wiring.packets.release(slot);
                    break;
                }
            },
            Ingest::Consumed | Ingest::Dropped(_) => {}
            Ingest::Closed => {
                wiring.packets.release(slot);
                break;
            }
        }
        wiring.packets.release(slot);
    }
}

/// Fragments the message of each queued action into its packet chain.
pub fn fragmenter_stage(wiring: &Wiring, fragmenter: &mut Fragmenter) {
    while let Some(mut action) = wiring.tx_messages.pop_wait() {
        // A resubmitted action still owns the chain of its previous
        // transmission.
        for packet in std::mem::take(&mut action.packets) {
            wiring.packets.release(packet);
        }
        if action.response.is_none() && action.request.is_none() {
            wiring.retire(action);
            continue;
        }
        let chain = {
            let msg = action
                .response
                .as_deref()
                .or(action.request.as_deref())
                .expect("checked above");
            fragmenter.fragment(msg, || wiring.packets.acquire_wait())
        };
        match chain {
            Some(chain) => {
                action.packets = chain;
                if let Err(err) = wiring.tx_packets.push(action) {
                    wiring.counters.dropped_count.fetch_add(1, Ordering::Relaxed);
                    wiring.retire(err.into_inner());
                }
            }
            None => {
                wiring.retire(action);
                break;
            }
        }
    }
}

/// Transmits each action's packet chain as contiguous records.
pub fn socket_writer<W: Write>(
    mut conn: W,
    wiring: &Wiring,
    stop: &StopFlag,
    time: &dyn TimeProvider,
) {
    while let Some(mut action) = wiring.tx_packets.pop_wait() {
        let mut send_failed = false;
        for slot in &action.packets {
            if let Err(err) = conn.write_all(&slot.packet.to_bytes()) {
                warn!("socket write failed: {}", err);
                send_failed = true;
                break;
            }
        }
        if send_failed {
            action.completion = CompletionCode::SendFailed;
            // A request that never made it out will get no response;
            // free its tag and discard anything parked there.
            if action.response.is_none()
                && let Some(request) = &action.request
                && let Some(parked) = wiring.tags.clear(request.tag)
            {
                wiring.messages.release(parked);
            }
            if let Err(err) = wiring.completions.push(action) {
                wiring.retire(err.into_inner());
            }
            stop.request(StopCause::Abnormal);
            break;
        }
        for packet in std::mem::take(&mut action.packets) {
            wiring.packets.release(packet);
        }
        if action.response.is_some() {
            // A response completes on send.
            action.completed = Some(time.now());
            action.completion = CompletionCode::Success;
            if let Err(err) = wiring.completions.push(action) {
                wiring.retire(err.into_inner());
            }
        } else {
            match wiring.tags.deposit_sent(action) {
                DepositOutcome::Waiting => {}
                DepositOutcome::AlreadyResponded(mut action) => {
                    action.completed = Some(time.now());
                    action.completion = CompletionCode::Success;
                    if let Err(err) = wiring.completions.push(action) {
                        wiring.retire(err.into_inner());
                    }
                }
            }
        }
    }
}

/// Drains terminal actions: counts them, delivers callbacks and the
/// submitter's outcome, and retires everything to the pools.
pub fn completion_stage(wiring: &Wiring, handlers: &RwLock<HandlerTable>, time: &dyn TimeProvider) {
    while let Some(mut action) = wiring.completions.pop_wait() {
        if action.completed.is_none() {
            action.completed = Some(time.now());
        }
        let success = action.completion == CompletionCode::Success;
        if success {
            wiring
                .counters
                .successful_actions
                .fetch_add(1, Ordering::Relaxed);
            if let Some(callback) = action.on_completed.take() {
                callback(&action);
            } else if action.outbound
                && let Some(response) = action.response.as_deref()
                && let Some(handler) = handlers.read().get(response.msg_type)
            {
                handler.on_response(response);
            }
        } else {
            wiring
                .counters
                .failed_actions
                .fetch_add(1, Ordering::Relaxed);
            if let Some(callback) = action.on_failed.take() {
                callback(&action);
            }
        }
        if let Some(notify) = action.notify.take() {
            let outcome = crate::action::ActionOutcome {
                completion: action.completion,
                response: action
                    .response
                    .as_deref()
                    .map(|msg| (msg.msg_type, msg.payload().to_vec())),
            };
            let _ = notify.send(outcome);
        }
        wiring.retire(action);
    }
}
