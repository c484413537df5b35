use crate::protocol::{Eid, MAX_MESSAGE_SIZE, MessageType, Tag};
use crate::queue::Recycle;
use std::fmt;
use std::time::Instant;

/// A reassembled inbound message or an outbound message awaiting
/// fragmentation.
///
/// Messages are pooled; the payload buffer is allocated once per element
/// and reused, with `len` tracking the valid prefix.
pub struct Message {
    pub dest: Eid,
    pub src: Eid,
    pub tag_owner: bool,
    pub tag: Tag,
    pub msg_type: MessageType,
    pub created: Option<Instant>,
    len: usize,
    payload: [u8; MAX_MESSAGE_SIZE],
}

impl Default for Message {
    fn default() -> Self {
        Self {
            dest: Eid::NULL,
            src: Eid::NULL,
            tag_owner: false,
            tag: Tag(0),
            msg_type: MessageType(0),
            created: None,
            len: 0,
            payload: [0u8; MAX_MESSAGE_SIZE],
        }
    }
}

impl Message {
    /// The valid payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Remaining payload capacity in bytes.
    pub fn remaining(&self) -> usize {
        MAX_MESSAGE_SIZE - self.len
    }

    /// Replaces the payload. The caller validates the length bound.
    pub fn set_payload(&mut self, bytes: &[u8]) {
        debug_assert!(bytes.len() <= MAX_MESSAGE_SIZE);
        let take = bytes.len().min(MAX_MESSAGE_SIZE);
        self.payload[..take].copy_from_slice(&bytes[..take]);
        self.len = take;
    }

    /// Appends bytes to the payload. Returns false, leaving the message
    /// untouched, if the bytes do not fit.
    pub fn append(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.remaining() {
            return false;
        }
        self.payload[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        true
    }

    /// Fills in the envelope of a response to `request`: endpoints
    /// swapped, same tag and type, tag-owner cleared, empty payload.
    pub fn prepare_reply(&mut self, request: &Message) {
        self.dest = request.src;
        self.src = request.dest;
        self.tag = request.tag;
        self.tag_owner = false;
        self.msg_type = request.msg_type;
        self.len = 0;
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("dest", &self.dest)
            .field("src", &self.src)
            .field("tag_owner", &self.tag_owner)
            .field("tag", &self.tag)
            .field("msg_type", &self.msg_type)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

impl Recycle for Message {
    fn recycle(&mut self) {
        self.dest = Eid::NULL;
        self.src = Eid::NULL;
        self.tag_owner = false;
        self.tag = Tag(0);
        self.msg_type = MessageType(0);
        self.created = None;
        self.len = 0;
    }
}
