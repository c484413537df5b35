use mctp_stream::control::{
    BASE_VERSION, ControlHandler, ControlVersion, EidOperation, EndpointState, completion,
    get_endpoint_id_request, get_message_type_support_request, get_endpoint_uuid_request,
    get_version_support_request, set_endpoint_id_request,
};
use mctp_stream::dispatch::MessageHandler;
use mctp_stream::message::Message;
use mctp_stream::protocol::{Eid, MessageType, Tag};
use parking_lot::Mutex;
use std::sync::Arc;

fn control_request(src: u8, dest: u8, payload: &[u8]) -> Message {
    let mut msg = Message::default();
    msg.src = Eid(src);
    msg.dest = Eid(dest);
    msg.tag_owner = true;
    msg.tag = Tag(0);
    msg.msg_type = MessageType::CONTROL;
    msg.set_payload(payload);
    msg
}

fn serve(state: &Arc<Mutex<EndpointState>>, request: &Message) -> Option<Vec<u8>> {
    let handler = ControlHandler::new(Arc::clone(state));
    let mut response = Message::default();
    response.prepare_reply(request);
    handler
        .handle(request, &mut response)
        .then(|| response.payload().to_vec())
}

#[test]
fn test_set_endpoint_id() {
    let state = Arc::new(Mutex::new(EndpointState::new(Eid::NULL)));
    let payload = set_endpoint_id_request(0, EidOperation::Set, Eid(0x02));
    assert_eq!(payload, vec![0x80, 0x01, 0x00, 0x02]);

    let request = control_request(0x01, 0x02, &payload);
    let response = serve(&state, &request).expect("a response");
    // Header echo with the request bit cleared, success, assignment
    // accepted, the active EID, no pool.
    assert_eq!(response, vec![0x00, 0x01, 0x00, 0x00, 0x02, 0x00]);

    let state = state.lock();
    assert_eq!(state.eid, Eid(0x02));
    assert_eq!(state.bus_owner, Eid(0x01));
}

#[test]
fn test_set_endpoint_id_rejects_reserved() {
    let state = Arc::new(Mutex::new(EndpointState::new(Eid(0x09))));
    let payload = set_endpoint_id_request(0, EidOperation::Set, Eid::BROADCAST);
    let response = serve(&state, &control_request(0x01, 0x09, &payload)).expect("a response");
    assert_eq!(response[2], completion::SUCCESS);
    // Assignment status: rejected.
    assert_eq!(response[3], 0x10);
    // The old EID stays in force.
    assert_eq!(response[4], 0x09);
    assert_eq!(state.lock().eid, Eid(0x09));
}

#[test]
fn test_set_endpoint_id_short_request() {
    let state = Arc::new(Mutex::new(EndpointState::new(Eid::NULL)));
    let response =
        serve(&state, &control_request(0x01, 0x00, &[0x80, 0x01])).expect("a response");
    assert_eq!(response, vec![0x00, 0x01, completion::ERROR_INVALID_LENGTH]);
}

#[test]
fn test_get_endpoint_id_after_assignment() {
    let state = Arc::new(Mutex::new(EndpointState::new(Eid::NULL)));
    let set = set_endpoint_id_request(0, EidOperation::Set, Eid(0x02));
    serve(&state, &control_request(0x01, 0x00, &set)).expect("a response");

    let get = get_endpoint_id_request(1);
    let response = serve(&state, &control_request(0x01, 0x02, &get)).expect("a response");
    // Instance echoed; EID 0x02; simple endpoint with a dynamic EID.
    assert_eq!(response, vec![0x01, 0x02, 0x00, 0x02, 0x00, 0x00]);
}

#[test]
fn test_get_endpoint_uuid() {
    let mut endpoint = EndpointState::new(Eid(0x05));
    endpoint.uuid = [0x11; 16];
    let state = Arc::new(Mutex::new(endpoint));
    let response = serve(
        &state,
        &control_request(0x01, 0x05, &get_endpoint_uuid_request(0)),
    )
    .expect("a response");
    assert_eq!(response[2], completion::SUCCESS);
    assert_eq!(&response[3..], &[0x11; 16][..]);
}

#[test]
fn test_get_version_support() {
    let state = Arc::new(Mutex::new(EndpointState::new(Eid(0x05))));
    let query = get_version_support_request(0, MessageType::CONTROL);
    let response = serve(&state, &control_request(0x01, 0x05, &query)).expect("a response");
    // One entry: MCTP base 1.3.1 in BCD with presence nibbles.
    assert_eq!(
        response,
        vec![0x00, 0x04, completion::SUCCESS, 1, 0xF1, 0xF3, 0xF1, 0x00]
    );
}

#[test]
fn test_get_version_support_unknown_type() {
    let state = Arc::new(Mutex::new(EndpointState::new(Eid(0x05))));
    let query = get_version_support_request(0, MessageType(0x55));
    let response = serve(&state, &control_request(0x01, 0x05, &query)).expect("a response");
    assert_eq!(response[2], completion::ERROR_UNSUPPORTED_TYPE);
}

#[test]
fn test_get_message_type_support() {
    let mut endpoint = EndpointState::new(Eid(0x05));
    endpoint.message_types = vec![MessageType(0x01), MessageType(0x7E)];
    let state = Arc::new(Mutex::new(endpoint));
    let response = serve(
        &state,
        &control_request(0x01, 0x05, &get_message_type_support_request(0)),
    )
    .expect("a response");
    assert_eq!(response, vec![0x00, 0x05, completion::SUCCESS, 2, 0x01, 0x7E]);
}

#[test]
fn test_unknown_command() {
    let state = Arc::new(Mutex::new(EndpointState::new(Eid(0x05))));
    let response =
        serve(&state, &control_request(0x01, 0x05, &[0x80, 0x7A])).expect("a response");
    assert_eq!(response, vec![0x00, 0x7A, completion::ERROR_UNSUPPORTED_CMD]);
}

#[test]
fn test_inbound_response_and_datagram_get_no_reply() {
    let state = Arc::new(Mutex::new(EndpointState::new(Eid(0x05))));
    // Request bit clear.
    assert!(serve(&state, &control_request(0x01, 0x05, &[0x00, 0x02])).is_none());
    // Datagram bit set.
    assert!(serve(&state, &control_request(0x01, 0x05, &[0xC0, 0x02])).is_none());
}

#[test]
fn test_version_ordering_ranks_any_lowest() {
    // 0xF digits ("any") sort below every concrete digit.
    let any_minor = ControlVersion::new(0xF1, 0xFF, 0x00, 0x00);
    let one_zero = ControlVersion::new(0xF1, 0xF0, 0x00, 0x00);
    let one_three = ControlVersion::new(0xF1, 0xF3, 0x00, 0x00);
    let two_oh = ControlVersion::new(0xF2, 0xF0, 0x00, 0x00);
    assert!(any_minor < one_zero);
    assert!(one_zero < one_three);
    assert!(one_three < two_oh);

    let mut endpoint = EndpointState::new(Eid(0x05));
    endpoint.register_version(MessageType(0x01), two_oh);
    endpoint.register_version(MessageType(0x01), any_minor);
    endpoint.register_version(MessageType(0x01), one_three);
    assert_eq!(
        endpoint.versions_for(MessageType(0x01)).unwrap(),
        &[any_minor, one_three, two_oh]
    );
}

#[test]
fn test_base_version_is_registered_for_control() {
    let endpoint = EndpointState::new(Eid::NULL);
    assert_eq!(
        endpoint.versions_for(MessageType::CONTROL).unwrap(),
        &[BASE_VERSION]
    );
}
