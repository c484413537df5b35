use mctp_stream::fragment::Fragmenter;
use mctp_stream::message::Message;
use mctp_stream::protocol::{BTU, Eid, MessageType, PacketSlot, SeqNum, Tag};

fn outbound_message(len: usize) -> Message {
    let mut msg = Message::default();
    msg.dest = Eid(0x02);
    msg.src = Eid(0x01);
    msg.tag_owner = true;
    msg.tag = Tag(3);
    msg.msg_type = MessageType(0x7E);
    let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    msg.set_payload(&payload);
    msg
}

fn fragment(fragmenter: &mut Fragmenter, msg: &Message) -> Vec<Box<PacketSlot>> {
    fragmenter
        .fragment(msg, || Some(Box::new(PacketSlot::default())))
        .unwrap()
        .into_iter()
        .collect()
}

#[test]
fn test_single_byte_message() {
    let msg = outbound_message(1);
    let chain = fragment(&mut Fragmenter::new(), &msg);
    assert_eq!(chain.len(), 1);
    let packet = &chain[0].packet;
    assert!(packet.header.som);
    assert!(packet.header.eom);
    assert_eq!(packet.header.seq, SeqNum(0));
    assert_eq!(packet.payload[0], 0x7E);
    assert_eq!(packet.payload[1], msg.payload()[0]);
    assert_eq!(&packet.payload[2..], &[0u8; BTU - 2]);
}

#[test]
fn test_len_63_fills_the_som_packet() {
    let msg = outbound_message(63);
    let chain = fragment(&mut Fragmenter::new(), &msg);
    assert_eq!(chain.len(), 1);
    assert_eq!(&chain[0].packet.payload[1..], msg.payload());
}

#[test]
fn test_len_64_is_one_packet() {
    let msg = outbound_message(64);
    let chain = fragment(&mut Fragmenter::new(), &msg);
    assert_eq!(chain.len(), 1);
    // Only 63 message bytes fit behind the type byte.
    assert_eq!(&chain[0].packet.payload[1..], &msg.payload()[..63]);
}

#[test]
fn test_len_65_is_two_packets() {
    let msg = outbound_message(65);
    let chain = fragment(&mut Fragmenter::new(), &msg);
    assert_eq!(chain.len(), 2);
    assert!(chain[0].packet.header.som);
    assert!(!chain[0].packet.header.eom);
    assert!(!chain[1].packet.header.som);
    assert!(chain[1].packet.header.eom);
    // The second packet resumes at message byte 63.
    assert_eq!(chain[1].packet.payload[0], msg.payload()[63]);
    assert_eq!(chain[1].packet.payload[1], msg.payload()[64]);
    assert_eq!(&chain[1].packet.payload[2..], &[0u8; BTU - 2]);
}

#[test]
fn test_len_8192_is_128_packets() {
    let msg = outbound_message(8192);
    let chain = fragment(&mut Fragmenter::new(), &msg);
    assert_eq!(chain.len(), 128);
    for (i, slot) in chain.iter().enumerate() {
        let header = slot.packet.header;
        assert_eq!(header.som, i == 0);
        assert_eq!(header.eom, i == 127);
        assert_eq!(header.seq, SeqNum((i % 4) as u8));
        assert_eq!(header.tag, Tag(3));
        assert!(header.tag_owner);
    }
}

#[test]
fn test_packet_count_boundaries() {
    assert_eq!(Fragmenter::packet_count(0), 1);
    assert_eq!(Fragmenter::packet_count(1), 1);
    assert_eq!(Fragmenter::packet_count(64), 1);
    assert_eq!(Fragmenter::packet_count(65), 2);
    assert_eq!(Fragmenter::packet_count(128), 2);
    assert_eq!(Fragmenter::packet_count(129), 3);
    assert_eq!(Fragmenter::packet_count(8192), 128);
}

#[test]
fn test_payload_split_across_packets() {
    let msg = outbound_message(200);
    let chain = fragment(&mut Fragmenter::new(), &msg);
    assert_eq!(chain.len(), 4);
    let data = msg.payload();
    assert_eq!(&chain[0].packet.payload[1..], &data[..63]);
    assert_eq!(&chain[1].packet.payload[..], &data[63..127]);
    assert_eq!(&chain[2].packet.payload[..], &data[127..191]);
    // The final packet carries the remaining 9 bytes, zero-padded.
    assert_eq!(&chain[3].packet.payload[..9], &data[191..200]);
    assert_eq!(&chain[3].packet.payload[9..], &[0u8; BTU - 9]);
}

#[test]
fn test_seq_continues_across_messages() {
    let mut fragmenter = Fragmenter::new();
    let first = fragment(&mut fragmenter, &outbound_message(150));
    assert_eq!(first.len(), 3);
    assert_eq!(fragmenter.next_seq(), SeqNum(3));
    let second = fragment(&mut fragmenter, &outbound_message(1));
    assert_eq!(second[0].packet.header.seq, SeqNum(3));
    assert_eq!(fragmenter.next_seq(), SeqNum(0));
}

#[test]
fn test_fragment_stops_when_pool_closes() {
    let msg = outbound_message(200);
    let mut remaining = 2;
    let chain = Fragmenter::new().fragment(&msg, || {
        if remaining == 0 {
            None
        } else {
            remaining -= 1;
            Some(Box::new(PacketSlot::default()))
        }
    });
    assert!(chain.is_none());
}
