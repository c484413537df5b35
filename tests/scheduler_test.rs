use mctp_stream::action::CompletionCode;
use mctp_stream::config::Config;
use mctp_stream::message::Message;
use mctp_stream::protocol::{MessageType, Tag};
use mctp_stream::tags::PairOutcome;
use mctp_stream::scheduler::RetryScheduler;
use mctp_stream::stats::PipelineCounters;
use mctp_stream::time::ManualTimeProvider;
use mctp_stream::wiring::Wiring;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DELTA: Duration = Duration::from_millis(100);

struct Rig {
    wiring: Arc<Wiring>,
    scheduler: RetryScheduler,
    time: Arc<ManualTimeProvider>,
}

impl Rig {
    fn new() -> Self {
        let config = Config::client("127.0.0.1", 0);
        let wiring = Arc::new(Wiring::new(
            &config,
            Arc::new(PipelineCounters::default()),
        ));
        let time = Arc::new(ManualTimeProvider::new(Instant::now()));
        let scheduler = RetryScheduler::new(
            Arc::clone(&wiring),
            time.clone(),
            DELTA,
            Duration::from_millis(1),
        );
        Self {
            wiring,
            scheduler,
            time,
        }
    }

    /// Queues a fresh submission, as `Pipeline::submit` would.
    fn submit(&self, max: u32) {
        let mut msg = self.wiring.messages.acquire_wait().unwrap();
        msg.tag_owner = true;
        msg.msg_type = MessageType(0x7E);
        msg.set_payload(&[1, 2, 3]);
        let mut action = self.wiring.actions.acquire_wait().unwrap();
        action.request = Some(msg);
        action.max = max;
        self.wiring.submissions.push(action).unwrap();
    }

    /// Plays the transmit path: takes the next fragmentation-ready
    /// action and parks it in the tag table as the socket writer would.
    fn transmit_one(&self) -> Tag {
        let action = self.wiring.tx_messages.try_pop().expect("action queued");
        let tag = action.request.as_ref().unwrap().tag;
        let _ = self.wiring.tags.deposit_sent(action);
        tag
    }
}

#[test]
fn test_promotes_lowest_free_tag_first() {
    let rig = Rig::new();
    rig.submit(9);
    rig.submit(9);
    rig.scheduler.tick();

    assert_eq!(rig.wiring.tags.occupied(), 2);
    assert_eq!(rig.transmit_one(), Tag(0));
    assert_eq!(rig.transmit_one(), Tag(1));
    assert!(rig.wiring.tx_messages.try_pop().is_none());
}

#[test]
fn test_promotion_stops_at_eight_tags() {
    let rig = Rig::new();
    for _ in 0..10 {
        rig.submit(9);
    }
    rig.scheduler.tick();

    assert_eq!(rig.wiring.tags.occupied(), 8);
    assert_eq!(rig.wiring.submissions.len(), 2);
    for expected in 0..8u8 {
        assert_eq!(rig.transmit_one(), Tag(expected));
    }

    // Pairing a response frees tag 0 for the next submission.
    match rig.wiring.tags.pair_response(response_message(Tag(0))) {
        PairOutcome::Paired(action) => rig.wiring.retire(action),
        other => panic!("expected Paired, got {:?}", other),
    }
    rig.scheduler.tick();
    assert_eq!(rig.wiring.submissions.len(), 1);
    assert_eq!(rig.transmit_one(), Tag(0));
}

fn response_message(tag: Tag) -> Box<Message> {
    let mut msg = Box::new(Message::default());
    msg.tag = tag;
    msg.tag_owner = false;
    msg.msg_type = MessageType(0x7E);
    msg.set_payload(&[4]);
    msg
}

#[test]
fn test_promote_stamps_submission_state() {
    let rig = Rig::new();
    rig.submit(9);
    rig.scheduler.tick();

    let action = rig.wiring.tx_messages.try_pop().unwrap();
    assert_eq!(action.num, 1);
    assert!(action.submitted.is_some());
    assert_eq!(action.request.as_ref().unwrap().tag, Tag(0));
    let _ = rig.wiring.tags.deposit_sent(action);
}

#[test]
fn test_no_resubmit_before_deadline() {
    let rig = Rig::new();
    rig.submit(9);
    rig.scheduler.tick();
    rig.transmit_one();

    rig.time.advance(DELTA / 2);
    rig.scheduler.tick();
    assert!(rig.wiring.tx_messages.try_pop().is_none());
    assert_eq!(rig.wiring.tags.occupied(), 1);
}

#[test]
fn test_resubmits_after_deadline() {
    let rig = Rig::new();
    rig.submit(9);
    rig.scheduler.tick();
    rig.transmit_one();

    rig.time.advance(DELTA);
    rig.scheduler.tick();
    let action = rig.wiring.tx_messages.try_pop().expect("resubmission");
    assert_eq!(action.num, 2);
    // The tag stays bound across the resubmission.
    assert_eq!(action.request.as_ref().unwrap().tag, Tag(0));
    assert_eq!(rig.wiring.tags.occupied(), 1);
    let _ = rig.wiring.tags.deposit_sent(action);
}

#[test]
fn test_retires_after_transmission_cap() {
    let rig = Rig::new();
    // Three transmissions allowed (retry = 2).
    rig.submit(3);
    rig.scheduler.tick();
    rig.transmit_one();

    for expected_num in [2, 3] {
        rig.time.advance(DELTA);
        rig.scheduler.tick();
        let action = rig.wiring.tx_messages.try_pop().expect("resubmission");
        assert_eq!(action.num, expected_num);
        let _ = rig.wiring.tags.deposit_sent(action);
    }

    rig.time.advance(DELTA);
    rig.scheduler.tick();
    assert!(rig.wiring.tx_messages.try_pop().is_none());
    let failed = rig.wiring.completions.try_pop().expect("retired action");
    assert_eq!(failed.completion, CompletionCode::TimedOut);
    assert_eq!(failed.num, 3);
    assert_eq!(rig.wiring.tags.occupied(), 0);
    rig.wiring.retire(failed);
}

#[test]
fn test_forever_retry_never_retires() {
    let rig = Rig::new();
    rig.submit(u32::MAX);
    rig.scheduler.tick();
    rig.transmit_one();

    for round in 0..5u32 {
        rig.time.advance(DELTA);
        rig.scheduler.tick();
        let action = rig.wiring.tx_messages.try_pop().expect("resubmission");
        assert_eq!(action.num, round + 2);
        let _ = rig.wiring.tags.deposit_sent(action);
    }
    assert!(rig.wiring.completions.try_pop().is_none());
}

#[test]
fn test_in_transit_action_is_not_swept() {
    let rig = Rig::new();
    rig.submit(3);
    rig.scheduler.tick();
    // The action is still with the fragmenter/writer (slot Sending);
    // even a long-overdue deadline must not touch it.
    rig.time.advance(DELTA * 10);
    rig.scheduler.tick();
    assert_eq!(rig.wiring.tags.occupied(), 1);
    assert!(rig.wiring.completions.try_pop().is_none());
}
