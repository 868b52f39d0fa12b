//! Message envelopes exchanged between runners and the judge
//!
//! Every message carries a kind, a conversation tag used for selective
//! receipt, the logical names of both ends and an opaque payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{ConversationId, RelayError, RelayResult, RunnerId};

/// Message kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Judge tells a captain to begin a trial; payload is the lap count
    Start,
    /// Baton hand-off from a runner to its target
    HandoffRequest,
    /// Target confirms it consumed a hand-off request
    HandoffAck,
    /// Captain reports that all laps of the trial are done
    Completion,
}

impl MessageKind {
    /// Conversation a message of this kind travels on
    pub fn conversation(self) -> ConversationId {
        match self {
            MessageKind::Start | MessageKind::HandoffRequest | MessageKind::HandoffAck => {
                ConversationId::RUNNING
            }
            MessageKind::Completion => ConversationId::COMPLETION,
        }
    }
}

/// A message in flight
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub kind: MessageKind,
    pub conversation: ConversationId,
    pub sender: RunnerId,
    pub receiver: RunnerId,
    pub payload: Bytes,
}

impl Envelope {
    /// Build an envelope on the default conversation of `kind`
    pub fn new(kind: MessageKind, sender: RunnerId, receiver: RunnerId, payload: Bytes) -> Self {
        Envelope {
            kind,
            conversation: kind.conversation(),
            sender,
            receiver,
            payload,
        }
    }

    /// Start signal carrying the lap count for the trial
    pub fn start(judge: RunnerId, captain: RunnerId, laps: u32) -> Self {
        Self::new(MessageKind::Start, judge, captain, encode_laps(laps))
    }

    pub fn handoff_request(from: RunnerId, to: RunnerId) -> Self {
        Self::new(MessageKind::HandoffRequest, from, to, Bytes::new())
    }

    pub fn handoff_ack(from: RunnerId, to: RunnerId) -> Self {
        Self::new(MessageKind::HandoffAck, from, to, Bytes::new())
    }

    /// Completion report carrying the number of laps run
    pub fn completion(captain: RunnerId, judge: RunnerId, laps: u32) -> Self {
        Self::new(MessageKind::Completion, captain, judge, encode_laps(laps))
    }

    /// Decode the lap count of a start or completion message
    pub fn laps(&self) -> RelayResult<u32> {
        decode_laps(&self.payload)
    }
}

fn encode_laps(laps: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(4);
    buf.put_u32_le(laps);
    buf.freeze()
}

fn decode_laps(payload: &Bytes) -> RelayResult<u32> {
    if payload.len() != 4 {
        return Err(RelayError::InvalidPayload {
            expected: 4,
            actual: payload.len(),
        });
    }
    let mut buf = payload.clone();
    Ok(buf.get_u32_le())
}

/// Selective-receipt filter over envelopes
///
/// A template matches a conversation and optionally narrows on kind and
/// sender. Unset fields match anything.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    conversation: ConversationId,
    kind: Option<MessageKind>,
    sender: Option<RunnerId>,
}

impl Template {
    pub fn conversation(conversation: ConversationId) -> Self {
        Template {
            conversation,
            kind: None,
            sender: None,
        }
    }

    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_sender(mut self, sender: RunnerId) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn matches(&self, envelope: &Envelope) -> bool {
        envelope.conversation == self.conversation
            && self.kind.map_or(true, |k| k == envelope.kind)
            && self.sender.as_ref().map_or(true, |s| *s == envelope.sender)
    }
}
