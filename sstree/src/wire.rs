//! Wire format serialization and deserialization.
//!
//! Cursor-based, big-endian encoding of the tree state message.
//!
//! ## State Message Wire Format
//!
//! ```text
//! message_type (1) || reason (1) || root (2) || distance (1) || parent (2)
//! || user payload (codec-defined)
//!
//! message_type: 0x54
//! reason: 0x01 regular broadcast, 0x02 triggered broadcast
//! distance: 0-254 hops, 255 = unknown
//! ```
//!
//! Receivers look at the first byte before anything else: frames of other
//! protocols sharing the radio are dropped without further parsing.

use alloc::vec::Vec;

use thiserror::Error;

use crate::types::{NodeId, Reason, TreeState};

/// Discriminator of the tree state message.
pub const MESSAGE_TYPE: u8 = 0x54;

/// Fixed header size preceding the user payload.
pub const HEADER_LEN: usize = 7;

const REASON_REGULAR: u8 = 0x01;
const REASON_TRIGGERED: u8 = 0x02;

/// Decoding error types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Unexpected end of buffer.
    #[error("unexpected end of buffer")]
    UnexpectedEof,
    /// First byte is not the tree state discriminator.
    #[error("not a tree state message (type {0:#04x})")]
    WrongMessageType(u8),
    /// Reason byte is neither regular nor triggered.
    #[error("invalid broadcast reason {0:#04x}")]
    InvalidReason(u8),
    /// Trailing bytes after the message.
    #[error("trailing bytes after message")]
    InvalidLength,
    /// Field value outside its domain.
    #[error("invalid field value")]
    InvalidValue,
}

/// Zero-copy reader over a byte slice.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Create a new reader over a byte slice.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Returns the number of bytes remaining.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Returns true if there are no more bytes to read.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let v = *self.buf.get(self.pos).ok_or(DecodeError::UnexpectedEof)?;
        self.pos += 1;
        Ok(v)
    }

    /// Read a fixed number of bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::UnexpectedEof);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Read a u16 in big-endian format.
    pub fn read_u16_be(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Read a u32 in big-endian format.
    pub fn read_u32_be(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a node identifier.
    pub fn read_node_id(&mut self) -> Result<NodeId, DecodeError> {
        self.read_u16_be()
    }
}

/// Writer for encoding messages.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Create a new empty writer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Write into an existing buffer, discarding its contents but keeping
    /// its allocation.
    pub fn reuse(mut buf: Vec<u8>) -> Self {
        buf.clear();
        Self { buf }
    }

    /// Returns the current length of written data.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if no data has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Write a slice of bytes.
    pub fn write_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    /// Write a u16 in big-endian format.
    pub fn write_u16_be(&mut self, v: u16) {
        self.write_bytes(&v.to_be_bytes());
    }

    /// Write a u32 in big-endian format.
    pub fn write_u32_be(&mut self, v: u32) {
        self.write_bytes(&v.to_be_bytes());
    }

    /// Write a node identifier.
    pub fn write_node_id(&mut self, id: NodeId) {
        self.write_u16_be(id);
    }

    /// Finish writing and return the buffer.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    /// Get the buffer as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

/// Trait for types that can be encoded to wire format.
pub trait Encode {
    /// Encode this value to the writer.
    fn encode(&self, w: &mut Writer);

    /// Encode and return the bytes.
    fn encode_to_vec(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode(&mut w);
        w.finish()
    }
}

/// Trait for types that can be decoded from wire format.
pub trait Decode: Sized {
    /// Decode a value from the reader.
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError>;

    /// Decode from a byte slice (strict: rejects trailing bytes).
    fn decode_from_slice(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        let result = Self::decode(&mut r)?;
        if !r.is_empty() {
            return Err(DecodeError::InvalidLength);
        }
        Ok(result)
    }
}

/// Application payload carried in every state message.
///
/// Blanket-implemented for anything with a wire codec and a default value
/// (the default is what an empty table slot holds).
pub trait UserData: Encode + Decode + Clone + Default {}

impl<T: Encode + Decode + Clone + Default> UserData for T {}

impl Encode for () {
    fn encode(&self, _w: &mut Writer) {}
}

impl Decode for () {
    fn decode(_r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(())
    }
}

impl Encode for u8 {
    fn encode(&self, w: &mut Writer) {
        w.write_u8(*self);
    }
}

impl Decode for u8 {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        r.read_u8()
    }
}

impl Encode for u16 {
    fn encode(&self, w: &mut Writer) {
        w.write_u16_be(*self);
    }
}

impl Decode for u16 {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        r.read_u16_be()
    }
}

impl Encode for u32 {
    fn encode(&self, w: &mut Writer) {
        w.write_u32_be(*self);
    }
}

impl Decode for u32 {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        r.read_u32_be()
    }
}

impl<const K: usize> Encode for [u8; K] {
    fn encode(&self, w: &mut Writer) {
        w.write_bytes(self);
    }
}

impl<const K: usize> Decode for [u8; K] {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let mut out = [0u8; K];
        out.copy_from_slice(r.read_bytes(K)?);
        Ok(out)
    }
}

/// The periodic advertisement of a node's tree state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeStateMessage<U> {
    pub reason: Reason,
    pub state: TreeState<U>,
}

impl<U> TreeStateMessage<U> {
    pub fn new(reason: Reason, state: TreeState<U>) -> Self {
        Self { reason, state }
    }
}

/// Returns true if `data` starts with the tree state discriminator.
///
/// Reads nothing beyond the first byte.
pub fn is_tree_state(data: &[u8]) -> bool {
    data.first() == Some(&MESSAGE_TYPE)
}

impl Encode for Reason {
    fn encode(&self, w: &mut Writer) {
        w.write_u8(match self {
            Reason::Regular => REASON_REGULAR,
            Reason::Triggered => REASON_TRIGGERED,
        });
    }
}

impl Decode for Reason {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        match r.read_u8()? {
            REASON_REGULAR => Ok(Reason::Regular),
            REASON_TRIGGERED => Ok(Reason::Triggered),
            other => Err(DecodeError::InvalidReason(other)),
        }
    }
}

/// Encode a state message from a borrowed state.
pub fn encode_state<U: Encode>(w: &mut Writer, reason: Reason, state: &TreeState<U>) {
    w.write_u8(MESSAGE_TYPE);
    reason.encode(w);
    w.write_node_id(state.root);
    w.write_u8(state.distance);
    w.write_node_id(state.parent);
    state.user_data.encode(w);
}

impl<U: Encode> Encode for TreeStateMessage<U> {
    fn encode(&self, w: &mut Writer) {
        encode_state(w, self.reason, &self.state);
    }
}

impl<U: Decode> Decode for TreeStateMessage<U> {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let message_type = r.read_u8()?;
        if message_type != MESSAGE_TYPE {
            return Err(DecodeError::WrongMessageType(message_type));
        }
        // Header must be complete before any field is interpreted.
        if r.remaining() < HEADER_LEN - 1 {
            return Err(DecodeError::UnexpectedEof);
        }

        let reason = Reason::decode(r)?;
        let root = r.read_node_id()?;
        let distance = r.read_u8()?;
        let parent = r.read_node_id()?;
        let user_data = U::decode(r)?;

        Ok(TreeStateMessage {
            reason,
            state: TreeState {
                root,
                distance,
                parent,
                user_data,
            },
        })
    }
}
