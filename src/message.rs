//! The [`Message`] type: an ordered sequence of MIDI bytes plus a
//! timestamp, mirroring the teacher's internal `MidiMessage` but exposed as
//! a first-class, documented type since the bus layer above it needs to
//! read and rebuild message bytes (meta text, SysEx reassembly, channel
//! overrides).

use crate::bytes::{self, SYSEX_END, SYSEX_START};

/// A single, complete MIDI message: its raw bytes plus the time (in
/// seconds, since some unspecified origin that does not change over the
/// life of a connection) at which it was produced or is to be sent.
///
/// Invariants (see the byte model in [`crate::bytes`]):
/// - `bytes[0]` is a status byte (high bit set), or the message is empty
///   while still being built up (e.g. mid-SysEx).
/// - for channel messages, `bytes[0]`'s low nibble is the channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    bytes: Vec<u8>,
    timestamp: f64,
}

impl Message {
    /// An empty message with timestamp 0.0.
    pub fn new() -> Self {
        Message::default()
    }

    /// Builds a short (1-3 byte) channel or system message.
    pub fn from_bytes(timestamp: f64, bytes: &[u8]) -> Self {
        Message {
            bytes: bytes.to_vec(),
            timestamp,
        }
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: f64) {
        self.timestamp = timestamp;
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn status(&self) -> u8 {
        self.bytes.first().copied().unwrap_or(0)
    }

    pub fn data(&self, index: usize) -> u8 {
        self.bytes.get(index).copied().unwrap_or(0)
    }

    pub fn set_status(&mut self, status: u8) {
        if self.bytes.is_empty() {
            self.bytes.push(status);
        } else {
            self.bytes[0] = status;
        }
    }

    /// Overwrites the channel nibble of the status byte, leaving the
    /// message-type nibble untouched.
    pub fn set_channel(&mut self, channel: u8) {
        let status = self.status();
        self.set_status(bytes::mask_status(status) | bytes::mask_channel(channel));
    }

    /// Appends a raw byte (used while assembling SysEx / Meta payloads).
    pub fn push(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Classifies and stores an incoming short message by byte count,
    /// following the same rule the sequencer's live-record path uses: a
    /// Note On with velocity 0 is rewritten as a Note Off before storage.
    ///
    /// Returns `false` (leaving `self` unchanged) if `raw` is empty or its
    /// leading status byte doesn't match the given count.
    pub fn set_midi_event(&mut self, timestamp: f64, raw: &[u8]) -> bool {
        if raw.is_empty() {
            return false;
        }
        let mut status = raw[0];
        if status & 0x80 == 0 {
            return false;
        }
        if raw.len() == 3 && bytes::is_note_off_velocity(status, raw[2]) {
            status = bytes::mask_status(bytes::NOTE_OFF) | bytes::mask_channel(status);
        }
        self.timestamp = timestamp;
        self.bytes.clear();
        self.bytes.push(status);
        self.bytes.extend_from_slice(&raw[1..]);
        true
    }

    /// Appends one SysEx continuation byte. Returns `false` once the
    /// terminator `0xF7` has been appended (signalling the caller that the
    /// message is complete), `true` otherwise.
    pub fn append_sysex(&mut self, byte: u8) -> bool {
        if self.bytes.is_empty() {
            self.bytes.push(SYSEX_START);
        } else {
            self.bytes.push(byte);
        }
        byte != SYSEX_END
    }

    pub fn is_sysex(&self) -> bool {
        bytes::is_sysex_msg(self.status())
    }

    pub fn is_meta(&self) -> bool {
        bytes::is_meta_msg(self.status())
    }

    /// The meta-type byte (the second byte of `FF tt ...`), if this is a
    /// Meta message with at least two bytes.
    pub fn meta_type(&self) -> Option<u8> {
        if self.is_meta() && self.bytes.len() >= 2 {
            Some(self.bytes[1])
        } else {
            None
        }
    }

    /// Parses `FF tt <vlq-len> <text>` and returns the text payload, if the
    /// header is well-formed and the buffer is long enough to hold it.
    pub fn get_meta_event_text(&self) -> Option<String> {
        if !self.is_meta() || self.bytes.len() < 3 {
            return None;
        }
        let len = bytes::bytes_to_varinum(&self.bytes, 2) as usize;
        let header_len = 2 + bytes::varinum_size(len as u32);
        if self.bytes.len() < header_len + len {
            return None;
        }
        std::str::from_utf8(&self.bytes[header_len..header_len + len])
            .ok()
            .map(|s| s.to_string())
    }

    /// Rebuilds the message as `FF tt <vlq-len> <text>`, preserving the
    /// meta-type byte (or defaulting to `0x01`, text event, for a fresh
    /// message) and recomputing the length.
    pub fn set_meta_event_text(&mut self, text: &str) {
        let meta_type = self.meta_type().unwrap_or(0x01);
        let mut out = vec![bytes::META_OR_RESET, meta_type];
        out.extend(bytes::varinum_to_bytes(text.len() as u32));
        out.extend_from_slice(text.as_bytes());
        self.bytes = out;
    }

    pub fn get_text(&self) -> Option<String> {
        self.get_meta_event_text()
    }

    pub fn set_text(&mut self, text: &str) {
        self.set_meta_event_text(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_b_note_on_velocity_zero_becomes_note_off() {
        let mut m = Message::new();
        assert!(m.set_midi_event(0.0, &[0x90, 60, 0]));
        assert_eq!(bytes::mask_status(m.status()), bytes::NOTE_OFF);
        assert_eq!(m.data(0), 60);
        assert_eq!(m.data(1), 0);
    }

    #[test]
    fn malformed_event_is_rejected_and_unchanged() {
        let mut m = Message::from_bytes(1.0, &[0x90, 60, 100]);
        let before = m.clone();
        assert!(!m.set_midi_event(2.0, &[]));
        assert_eq!(m, before);
        assert!(!m.set_midi_event(2.0, &[0x3F, 1, 2]));
        assert_eq!(m, before);
    }

    #[test]
    fn scenario_d_sysex_reassembly() {
        let mut m = Message::new();
        assert!(m.append_sysex(0xF0));
        for b in [0x7E, 0x7F, 0x06, 0x01] {
            assert!(m.append_sysex(b));
        }
        assert!(!m.append_sysex(SYSEX_END));
        assert_eq!(m.bytes(), &[0xF0, 0x7E, 0x7F, 0x06, 0x01, 0xF7]);
    }

    #[test]
    fn meta_text_round_trip() {
        let mut m = Message::new();
        m.set_status(bytes::META_OR_RESET);
        m.push(0x03); // track name
        let text = "a".repeat(1000);
        m.set_meta_event_text(&text);
        assert_eq!(m.get_meta_event_text().as_deref(), Some(text.as_str()));
    }
}
