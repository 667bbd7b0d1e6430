//! [`Event`]: a [`Message`] with the application-level attributes the bus
//! layer and its callers need — which input bus it arrived on, selection
//! and marking flags for editing, and a lightweight link used to pair a
//! Note On with its matching Note Off.

use crate::bytes::{self, BussByte, Channel, NO_BUS, NO_CHANNEL};
use crate::message::Message;

/// A kind of note event, used by the `note` constructor to pick the right
/// status nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    On,
    Off,
}

/// A timestamped MIDI event plus bookkeeping used by editors and players.
///
/// The link to a paired Note Off is expressed as an index into whatever
/// `Vec<Event>` owns both events (an "iterator/handle", not shared
/// ownership) rather than a pointer or `Rc`, matching the spec's data
/// model for `Event`.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    message: Message,
    input_bus: BussByte,
    channel: Channel,
    marked: bool,
    selected: bool,
    painted: bool,
    link: Option<usize>,
}

impl Default for Event {
    fn default() -> Self {
        Event::new()
    }
}

impl Event {
    /// An empty event: status Note Off, both data bytes 0.
    pub fn new() -> Self {
        Event {
            message: Message::from_bytes(0.0, &[bytes::NOTE_OFF, 0, 0]),
            input_bus: NO_BUS,
            channel: NO_CHANNEL,
            marked: false,
            selected: false,
            painted: false,
            link: None,
        }
    }

    pub fn from_status(timestamp: f64, status: u8, d0: u8, d1: u8) -> Self {
        let channel = if bytes::is_channel_msg(status) {
            bytes::mask_channel(status)
        } else {
            NO_CHANNEL
        };
        Event {
            message: Message::from_bytes(timestamp, &[status, d0, d1]),
            input_bus: NO_BUS,
            channel,
            marked: false,
            selected: false,
            painted: false,
            link: None,
        }
    }

    /// Builds a Tempo Meta event (`FF 51 03 tt tt tt`) for the given BPM.
    pub fn tempo(timestamp: f64, bpm: f64) -> Self {
        let tempo_us = bytes::tempo_us_from_bpm(bpm);
        let payload = bytes::tempo_us_to_bytes(tempo_us);
        let mut message = Message::new();
        message.set_timestamp(timestamp);
        message.set_status(bytes::META_OR_RESET);
        message.push(0x51);
        message.push(3);
        message.push(payload[0]);
        message.push(payload[1]);
        message.push(payload[2]);
        Event {
            message,
            input_bus: NO_BUS,
            channel: NO_CHANNEL,
            marked: false,
            selected: false,
            painted: false,
            link: None,
        }
    }

    /// Builds a Note On/Off event. If `channel` is [`NO_CHANNEL`], it is
    /// stored as channel 0 and `has_channel()` reports false — the real
    /// channel is considered "not yet known" (used while recording live,
    /// before the incoming note has been matched to a track).
    pub fn note(timestamp: f64, kind: NoteKind, channel: Channel, note: u8, velocity: u8) -> Self {
        let had_channel = channel != NO_CHANNEL;
        let stored_channel = if had_channel {
            bytes::mask_channel(channel)
        } else {
            0
        };
        let base = match kind {
            NoteKind::On => bytes::NOTE_ON,
            NoteKind::Off => bytes::NOTE_OFF,
        };
        Event {
            message: Message::from_bytes(timestamp, &[base | stored_channel, note, velocity]),
            input_bus: NO_BUS,
            channel: if had_channel { stored_channel } else { NO_CHANNEL },
            marked: false,
            selected: false,
            painted: false,
            link: None,
        }
    }

    pub fn has_channel(&self) -> bool {
        self.channel != NO_CHANNEL
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }

    pub fn timestamp(&self) -> f64 {
        self.message.timestamp()
    }

    pub fn set_timestamp(&mut self, timestamp: f64) {
        self.message.set_timestamp(timestamp);
    }

    /// Rescales the event's timestamp to a new PPQN resolution, rounding
    /// to the nearest tick.
    pub fn rescale(&mut self, new_ppqn: u32, old_ppqn: u32) {
        if old_ppqn == 0 {
            return;
        }
        let ratio = f64::from(new_ppqn) / f64::from(old_ppqn);
        let rescaled = (self.message.timestamp() * ratio).round();
        self.message.set_timestamp(rescaled);
    }

    pub fn status(&self) -> u8 {
        self.message.status()
    }

    pub fn set_status(&mut self, status: u8) {
        self.message.set_status(status);
    }

    /// Sets the channel nibble on the status byte and updates the stored
    /// channel.
    pub fn set_channel(&mut self, channel: Channel) {
        self.channel = bytes::mask_channel(channel);
        self.message.set_channel(channel);
    }

    pub fn set_channel_status(&mut self, event_code: u8, channel: Channel) {
        self.channel = bytes::mask_channel(channel);
        self.message.set_status(bytes::mask_status(event_code) | self.channel);
    }

    pub fn set_meta_status(&mut self, meta_type: u8) {
        self.message.set_status(bytes::META_OR_RESET);
        self.channel = meta_type; // meta type rides in the channel slot, per the original design
    }

    /// Sets the event-type nibble but preserves the previously-recorded
    /// channel, used during live recording before the incoming channel has
    /// been matched to a track.
    pub fn set_status_keep_channel(&mut self, event_code: u8) {
        let channel = bytes::mask_channel(self.message.status());
        self.message.set_status(bytes::mask_status(event_code) | channel);
    }

    /// Classifies and stores an incoming wire event. See
    /// [`Message::set_midi_event`] for the exact rules (Note On velocity 0
    /// rewrite, SysEx handling). Returns `false`, leaving `self` unchanged,
    /// on malformed input.
    pub fn set_midi_event(&mut self, timestamp: f64, raw: &[u8]) -> bool {
        if bytes::is_sysex_msg(raw.first().copied().unwrap_or(0)) {
            let mut message = Message::new();
            for &b in raw {
                message.append_sysex(b);
            }
            message.set_timestamp(timestamp);
            self.message = message;
            return true;
        }
        self.message.set_midi_event(timestamp, raw)
    }

    /// Appends a SysEx continuation byte; see [`Message::append_sysex`].
    pub fn append_sysex(&mut self, byte: u8) -> bool {
        self.message.append_sysex(byte)
    }

    pub fn is_note_on(&self) -> bool {
        bytes::is_note_on_msg(self.status())
    }

    pub fn is_note_off(&self) -> bool {
        bytes::is_note_off_msg(self.status())
    }

    pub fn is_sysex(&self) -> bool {
        self.message.is_sysex()
    }

    pub fn is_meta(&self) -> bool {
        self.message.is_meta()
    }

    pub fn get_text(&self) -> Option<String> {
        self.message.get_text()
    }

    pub fn set_text(&mut self, text: &str) {
        self.message.set_text(text);
    }

    pub fn input_bus(&self) -> BussByte {
        self.input_bus
    }

    pub fn set_input_bus(&mut self, bus: BussByte) {
        self.input_bus = bus;
    }

    pub fn marked(&self) -> bool {
        self.marked
    }

    pub fn mark(&mut self, marked: bool) {
        self.marked = marked;
    }

    pub fn selected(&self) -> bool {
        self.selected
    }

    pub fn select(&mut self, selected: bool) {
        self.selected = selected;
    }

    pub fn painted(&self) -> bool {
        self.painted
    }

    pub fn paint(&mut self, painted: bool) {
        self.painted = painted;
    }

    /// Links this (Note On) event to the index of its paired Note Off.
    /// Bidirectional linking is the caller's responsibility (typically an
    /// owning `Vec<Event>` sets both sides).
    pub fn link_to(&mut self, index: usize) {
        self.link = Some(index);
    }

    pub fn unlink(&mut self) {
        self.link = None;
    }

    pub fn linked(&self) -> Option<usize> {
        self.link
    }

    pub fn has_link(&self) -> bool {
        self.link.is_some()
    }

    /// Tie-break weight used by `Ord`/`<` when two events share a
    /// timestamp. Ported verbatim (in effect, not literal C++) from the
    /// original `event::get_rank`: SysEx ranks highest, then channel
    /// events ordered program-change < control-change < meta <
    /// aftertouch/pressure/pitch-wheel < note-on < note-off, with the
    /// channel folded into the low byte for events that rank nonzero. Note
    /// that under this ordering Note On sorts *before* Note Off at equal
    /// ranks-ascending comparisons (`self < other`); this mirrors the
    /// original source exactly and is called out as a possible
    /// inconsistency with its own doc comments in the design notes, not
    /// guessed-around here.
    pub fn get_rank(&self) -> i32 {
        if self.is_sysex() {
            return 0x3000;
        }
        if self.is_meta() {
            return 0x0030;
        }
        let code = bytes::mask_status(self.status());
        let note = self.message.data(0) as i32;
        let mut result = match code {
            bytes::NOTE_OFF => 0x2000 + note,
            bytes::NOTE_ON => 0x1000 + note,
            bytes::AFTERTOUCH | bytes::CHANNEL_PRESSURE | bytes::PITCH_WHEEL => 0x0050,
            bytes::CONTROL_CHANGE => 0x0020,
            bytes::PROGRAM_CHANGE => 0x0010,
            _ => 0,
        };
        if result != 0 {
            result += i32::from(bytes::mask_channel(self.status())) << 8;
        }
        result
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for Event {}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.timestamp()
            .partial_cmp(&other.timestamp())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| self.get_rank().cmp(&other.get_rank()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_b_velocity_zero_note_on_is_note_off() {
        let mut e = Event::new();
        assert!(e.set_midi_event(0.0, &[0x90, 60, 0]));
        assert_eq!(bytes::mask_status(e.status()), bytes::NOTE_OFF);
        assert_eq!(e.message().data(0), 60);
        assert_eq!(e.message().data(1), 0);
        assert!(e.is_note_off());
    }

    #[test]
    fn scenario_c_tempo_event() {
        let e = Event::tempo(0.0, 120.0);
        assert!(e.is_meta());
        assert_eq!(e.message().bytes(), &[0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20]);
    }

    #[test]
    fn ordering_is_timestamp_then_rank() {
        let mut a = Event::note(10.0, NoteKind::On, 0, 60, 100);
        let mut b = Event::note(10.0, NoteKind::Off, 0, 60, 0);
        assert_eq!(a.timestamp(), b.timestamp());
        assert_eq!((a < b), (a.get_rank() < b.get_rank()));
        a.set_timestamp(5.0);
        b.set_timestamp(10.0);
        assert!(a < b);
    }

    #[test]
    fn sysex_ranks_above_everything() {
        let mut sysex = Event::new();
        sysex.set_midi_event(0.0, &[0xF0, 0x7E, 0x7F, 0xF7]);
        let note_on = Event::note(0.0, NoteKind::On, 0, 60, 100);
        assert!(sysex.get_rank() > note_on.get_rank());
    }

    #[test]
    fn malformed_event_bytes_leave_event_unchanged() {
        let mut e = Event::note(1.0, NoteKind::On, 0, 60, 100);
        let before = e.clone();
        assert!(!e.set_midi_event(2.0, &[0x3F, 1]));
        assert_eq!(e, before);
    }

    #[test]
    fn note_with_no_channel_reports_has_channel_false() {
        let e = Event::note(0.0, NoteKind::On, NO_CHANNEL, 60, 100);
        assert!(!e.has_channel());
        assert_eq!(bytes::mask_channel(e.status()), 0);
    }

    #[test]
    fn linking_notes() {
        let mut on = Event::note(0.0, NoteKind::On, 0, 60, 100);
        on.link_to(3);
        assert_eq!(on.linked(), Some(3));
        on.unlink();
        assert!(!on.has_link());
    }
}
