//! Status-byte semantics, message-size lookups, the MIDI variable-length
//! quantity (VLQ) codec, and tempo/measure conversions.
//!
//! These are pure functions operating on raw bytes; nothing here owns a
//! connection to any backend. See [`crate::message`] and [`crate::event`]
//! for the types built on top of them.

/// A bus index. `NO_BUS` means "no input bus", i.e. not yet tagged.
pub type BussByte = u8;

/// Sentinel bus index meaning "none".
pub const NO_BUS: BussByte = 0xFF;

/// A 4-bit MIDI channel, or the sentinel [`NO_CHANNEL`].
pub type Channel = u8;

/// Sentinel channel value meaning "none". Deliberately outside the 0..16
/// channel range so it can never collide with a real channel nibble.
pub const NO_CHANNEL: Channel = 0x80;

/// A signed tick/pulse count. `NULL_PULSE` means "no pulse".
pub type Pulse = i64;

/// Sentinel pulse value meaning "no pulse".
pub const NULL_PULSE: Pulse = -1;

#[inline]
pub fn is_null_pulse(p: Pulse) -> bool {
    p == NULL_PULSE
}

// ---------------------------------------------------------------------
// Status byte constants
// ---------------------------------------------------------------------

pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const AFTERTOUCH: u8 = 0xA0;
pub const CONTROL_CHANGE: u8 = 0xB0;
pub const PROGRAM_CHANGE: u8 = 0xC0;
pub const CHANNEL_PRESSURE: u8 = 0xD0;
pub const PITCH_WHEEL: u8 = 0xE0;
pub const SYSEX_START: u8 = 0xF0;
pub const MTC_QUARTER_FRAME: u8 = 0xF1;
pub const SONG_POSITION: u8 = 0xF2;
pub const SONG_SELECT: u8 = 0xF3;
pub const TUNE_REQUEST: u8 = 0xF6;
pub const SYSEX_END: u8 = 0xF7;
pub const TIMING_CLOCK: u8 = 0xF8;
pub const CLOCK_START: u8 = 0xFA;
pub const CLOCK_CONTINUE: u8 = 0xFB;
pub const CLOCK_STOP: u8 = 0xFC;
pub const ACTIVE_SENSING: u8 = 0xFE;
/// Ambiguous by design: 0xFF is Meta when read from a file, Reset when
/// received live from the wire. Callers must track their own context;
/// see the Open Questions note in the design docs.
pub const META_OR_RESET: u8 = 0xFF;

pub const CHAN_MASK: u8 = 0x0F;
pub const STATUS_MASK: u8 = 0xF0;

#[inline]
pub fn mask_channel(status: u8) -> u8 {
    status & CHAN_MASK
}

#[inline]
pub fn mask_status(status: u8) -> u8 {
    status & STATUS_MASK
}

// ---------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------

/// Channel messages that carry exactly one data byte: Program Change and
/// Channel Pressure. Expressed as a membership test (`==` twice), not the
/// constant-truthy `m == 0xC0 || 0xD0` found in the original source.
#[inline]
pub fn is_one_byte_msg(m: u8) -> bool {
    let s = mask_status(m);
    s == PROGRAM_CHANGE || s == CHANNEL_PRESSURE
}

/// Channel messages that carry two data bytes: Note On/Off, Aftertouch,
/// Control Change, and Pitch Wheel.
#[inline]
pub fn is_two_byte_msg(m: u8) -> bool {
    let s = mask_status(m);
    matches!(
        s,
        NOTE_OFF | NOTE_ON | AFTERTOUCH | CONTROL_CHANGE | PITCH_WHEEL
    )
}

#[inline]
pub fn is_channel_msg(m: u8) -> bool {
    (0x80..0xF0).contains(&m)
}

#[inline]
pub fn is_system_msg(m: u8) -> bool {
    (0xF0..0xF8).contains(&m)
}

#[inline]
pub fn is_realtime_msg(m: u8) -> bool {
    m >= 0xF8
}

#[inline]
pub fn is_note_on_msg(m: u8) -> bool {
    mask_status(m) == NOTE_ON
}

#[inline]
pub fn is_note_off_msg(m: u8) -> bool {
    mask_status(m) == NOTE_OFF
}

#[inline]
pub fn is_note_msg(m: u8) -> bool {
    let s = mask_status(m);
    s == NOTE_OFF || s == NOTE_ON || s == AFTERTOUCH
}

#[inline]
pub fn is_controller_msg(m: u8) -> bool {
    mask_status(m) == CONTROL_CHANGE
}

#[inline]
pub fn is_program_change_msg(m: u8) -> bool {
    mask_status(m) == PROGRAM_CHANGE
}

/// Aftertouch, Channel Pressure, Pitch Wheel and Control Change all carry a
/// continuously-varying value, as opposed to a discrete event.
#[inline]
pub fn is_continuous_event_msg(m: u8) -> bool {
    let s = mask_status(m);
    matches!(s, AFTERTOUCH | CHANNEL_PRESSURE | PITCH_WHEEL | CONTROL_CHANGE)
}

#[inline]
pub fn is_sysex_msg(m: u8) -> bool {
    m == SYSEX_START
}

#[inline]
pub fn is_sysex_end_msg(m: u8) -> bool {
    m == SYSEX_END
}

/// True for 0xFF. Whether that byte means Meta or Reset is a matter of
/// context (file read vs. live stream) that this function deliberately
/// does not resolve; see [`META_OR_RESET`].
#[inline]
pub fn is_meta_msg(m: u8) -> bool {
    m == META_OR_RESET
}

/// Assumes `b` is already known to be a meta-type byte (the second byte of
/// a `FF tt ...` sequence, not the status byte itself). Covers
/// text/copyright/track-name/instrument/lyric/marker/cue-point.
#[inline]
pub fn is_meta_text_msg(meta_type: u8) -> bool {
    (0x01..=0x07).contains(&meta_type)
}

#[inline]
pub fn is_tempo_msg(meta_type: u8) -> bool {
    meta_type == 0x51
}

#[inline]
pub fn is_time_signature_msg(meta_type: u8) -> bool {
    meta_type == 0x58
}

#[inline]
pub fn is_key_signature_msg(meta_type: u8) -> bool {
    meta_type == 0x59
}

#[inline]
pub fn is_sense_or_reset_msg(m: u8) -> bool {
    m == ACTIVE_SENSING || m == META_OR_RESET
}

/// A Note On with velocity 0 is semantically a Note Off.
#[inline]
pub fn is_note_off_velocity(status: u8, velocity: u8) -> bool {
    is_note_on_msg(status) && velocity == 0
}

/// Total message size implied by a channel/system status byte: 1, 2, or 3
/// bytes (including the status byte itself). Returns `None` for SysEx
/// (variable size) and for bytes with no fixed size.
pub fn status_size(status: u8) -> Option<usize> {
    if is_two_byte_msg(status) || status == SONG_POSITION {
        Some(3)
    } else if is_one_byte_msg(status) || status == MTC_QUARTER_FRAME || status == SONG_SELECT {
        Some(2)
    } else if matches!(
        status,
        TUNE_REQUEST | TIMING_CLOCK | CLOCK_START | CLOCK_CONTINUE | CLOCK_STOP
            | ACTIVE_SENSING | META_OR_RESET
    ) {
        Some(1)
    } else {
        None
    }
}

/// Total size of a Meta event's constant-size payload, given its meta-type
/// byte (the one right after 0xFF). Includes the meta-type byte and the
/// length byte but not the 0xFF itself. Returns `None` for meta types whose
/// payload is variable-length (text events, sequencer-specific, etc.).
pub fn meta_size(meta_type: u8) -> Option<usize> {
    match meta_type {
        0x51 => Some(6),              // set_tempo:       FF 51 03 tt tt tt
        0x58 => Some(7),              // time_signature:  FF 58 04 nn dd cc bb
        0x00 | 0x59 => Some(5),       // seq_number/key_signature
        0x20 | 0x21 => Some(4),       // midi_channel/midi_port (deprecated)
        0x54 => Some(8),              // smpte_offset
        _ => None,
    }
}

// ---------------------------------------------------------------------
// Variable-length quantity (VLQ) codec
// ---------------------------------------------------------------------

/// Decodes a MIDI VLQ starting at `buf[offset]`. Stops at the first byte
/// without its continuation bit (0x80) set. Returns 0 if `offset` is out
/// of range.
pub fn bytes_to_varinum(buf: &[u8], offset: usize) -> u32 {
    let mut result: u32 = 0;
    let mut i = offset;
    while i < buf.len() {
        let b = buf[i];
        result = (result << 7) | u32::from(b & 0x7F);
        i += 1;
        if b & 0x80 == 0 {
            break;
        }
    }
    result
}

/// Encodes `v` as a big-endian MIDI VLQ: every byte but the last carries
/// the continuation bit (0x80). Supports the full MIDI file range,
/// 0..=0x0FFFFFFF.
pub fn varinum_to_bytes(v: u32) -> Vec<u8> {
    let mut buffer = v & 0x7F;
    let mut value = v >> 7;
    while value > 0 {
        buffer <<= 8;
        buffer |= 0x80 | (value & 0x7F);
        value >>= 7;
    }
    let mut out = Vec::with_capacity(4);
    loop {
        out.push((buffer & 0xFF) as u8);
        if buffer & 0x80 != 0 {
            buffer >>= 8;
        } else {
            break;
        }
    }
    out
}

/// Size in bytes that `varinum_to_bytes` would produce for `len`. Returns 0
/// for values outside the supported range (unsupported, per the spec).
pub fn varinum_size(len: u32) -> usize {
    if len > 0x0FFF_FFFF {
        0
    } else if len < 0x80 {
        1
    } else if len < 0x4000 {
        2
    } else if len < 0x20_0000 {
        3
    } else {
        4
    }
}

// ---------------------------------------------------------------------
// Tempo conversions
// ---------------------------------------------------------------------

/// Interprets three big-endian bytes (as stored in a Tempo meta event) as
/// microseconds per quarter note.
pub fn tempo_us_from_bytes(tt: [u8; 3]) -> u32 {
    (u32::from(tt[0]) << 16) | (u32::from(tt[1]) << 8) | u32::from(tt[2])
}

/// Encodes a microseconds-per-quarter-note tempo as the three big-endian
/// bytes used in a Tempo meta event payload.
pub fn tempo_us_to_bytes(tempo_us: u32) -> [u8; 3] {
    [
        ((tempo_us >> 16) & 0xFF) as u8,
        ((tempo_us >> 8) & 0xFF) as u8,
        (tempo_us & 0xFF) as u8,
    ]
}

/// Converts a tempo in microseconds-per-quarter-note to beats per minute.
pub fn bpm_from_tempo_us(tempo_us: u32) -> f64 {
    if tempo_us == 0 {
        0.0
    } else {
        60_000_000.0 / f64::from(tempo_us)
    }
}

/// Converts beats per minute to microseconds-per-quarter-note, rounding to
/// the nearest integer the way the original tempo-event encoder does.
pub fn tempo_us_from_bpm(bpm: f64) -> u32 {
    if bpm <= 0.0 {
        0
    } else {
        (60_000_000.0 / bpm + 0.5) as u32
    }
}

/// Seconds elapsed for `pulses` ticks at the given tempo (BPM) and PPQN.
pub fn pulses_to_seconds(pulses: Pulse, bpm: f64, ppqn: u32) -> f64 {
    if bpm <= 0.0 || ppqn == 0 {
        0.0
    } else {
        60.0 * (pulses as f64) / (bpm * f64::from(ppqn))
    }
}

/// Number of measures (possibly fractional) that `pulses` ticks span, given
/// PPQN, beats-per-measure and beat-width. Mirrors
/// `pulses_to_measures(p, P, B, W)` from the original calculations module:
/// `m = p * W / (4 * P * B)`.
pub fn pulses_to_measures(pulses: Pulse, ppqn: u32, beats_per_measure: u32, beat_width: u32) -> f64 {
    if ppqn == 0 || beats_per_measure == 0 || beat_width == 0 {
        0.0
    } else {
        let qnotes_per_measure = 4.0 * f64::from(beats_per_measure) / f64::from(beat_width);
        let measure_len = f64::from(ppqn) * qnotes_per_measure;
        (pulses as f64) / measure_len
    }
}

/// One position within a measures:beats:ticks song time. Measures and
/// beats are 1-based; `ticks` is the pulse remainder within the beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasuresBeatsTicks {
    pub measures: i64,
    pub beats: i64,
    pub ticks: i64,
}

/// Converts an absolute pulse count into measures:beats:ticks form.
/// `NULL_PULSE` is treated as pulse 0.
pub fn pulses_to_measures_beats_ticks(
    mut pulses: Pulse,
    ppqn: u32,
    beats_per_measure: u32,
    beat_width: u32,
) -> Option<MeasuresBeatsTicks> {
    if ppqn == 0 || beats_per_measure == 0 || beat_width == 0 {
        return None;
    }
    if is_null_pulse(pulses) {
        pulses = 0;
    }
    let w = f64::from(beat_width);
    let p = f64::from(ppqn);
    let b = f64::from(beats_per_measure);
    let qnotes_per_measure = 4.0 * b / w;
    let measure_len = p * qnotes_per_measure;
    let beat_ticks = (measure_len / b) as i64;
    let measure = (pulses as f64 / measure_len) as i64 + 1;
    let beat = 1 + (((pulses as f64) * w / p / 4.0) as i64).rem_euclid(beats_per_measure as i64);
    let ticks = if beat_ticks == 0 {
        0
    } else {
        pulses.rem_euclid(beat_ticks)
    };
    Some(MeasuresBeatsTicks {
        measures: measure,
        beats: beat,
        ticks,
    })
}

/// Formats pulses as a `"measures:beats:ticks"` string, e.g. `"001:1:000"`.
pub fn pulses_to_measurestring(pulses: Pulse, ppqn: u32, beats_per_measure: u32, beat_width: u32) -> String {
    match pulses_to_measures_beats_ticks(pulses, ppqn, beats_per_measure, beat_width) {
        Some(m) => format!("{:03}:{}:{:03}", m.measures, m.beats, m.ticks),
        None => "000:0:000".to_string(),
    }
}

/// The inverse of [`pulses_to_measurestring`]. `"M:B:T"` fields are 1-based
/// for `M` and `B`; `T` is a pulse remainder within the beat. A `"$"` in the
/// ticks field is shorthand for "end of the beat" (`ppqn - 1`).
pub fn measurestring_to_pulses(s: &str, ppqn: u32, beats_per_measure: u32, beat_width: u32) -> Pulse {
    if s.is_empty() || ppqn == 0 || beat_width == 0 {
        return 0;
    }
    let mut fields = s.splitn(3, ':');
    let measures: i64 = fields.next().and_then(|v| v.parse().ok()).unwrap_or(0);
    let beats: i64 = fields.next().and_then(|v| v.parse().ok()).unwrap_or(0);
    let ticks: i64 = match fields.next() {
        Some("$") => i64::from(ppqn) - 1,
        Some(v) => v.parse().unwrap_or(0),
        None => 0,
    };
    let m = (measures - 1).max(0);
    let b = (beats - 1).max(0);
    let qn_per_beat = 4.0 / f64::from(beat_width);
    let pulses_per_beat = f64::from(ppqn) * qn_per_beat;
    let pulses_per_measure = pulses_per_beat * f64::from(beats_per_measure);
    (m as f64 * pulses_per_measure + b as f64 * pulses_per_beat) as Pulse + ticks
}

/// Scales tempo-relative to MIDI's 0..127 note range, per the original's
/// `tempo_to_note_value`. `bpm_min`/`bpm_max` bound the linear mapping.
pub fn tempo_to_note_value(bpm: f64, bpm_min: f64, bpm_max: f64) -> u8 {
    if bpm_max <= bpm_min {
        return 0;
    }
    let slope = 127.0 / (bpm_max - bpm_min);
    let note = (slope * (bpm - bpm_min) + 0.5) as i32;
    note.clamp(0, 127) as u8
}

/// The inverse of [`tempo_to_note_value`].
pub fn note_value_to_tempo(note: u8, bpm_min: f64, bpm_max: f64) -> f64 {
    let slope = (bpm_max - bpm_min) / 127.0;
    bpm_min + slope * f64::from(note)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varinum_round_trip() {
        for v in [0u32, 1, 0x3F, 0x40, 0x7F, 0x80, 0x2000, 0x1F_FFFF, 0x20_0000, 0x0FFF_FFFF] {
            let bytes = varinum_to_bytes(v);
            assert_eq!(bytes.len(), varinum_size(v));
            assert_eq!(bytes_to_varinum(&bytes, 0), v);
        }
    }

    #[test]
    fn scenario_a_vlq() {
        let bytes = varinum_to_bytes(0x20_0000);
        assert_eq!(bytes, vec![0x81, 0x80, 0x80, 0x00]);
        assert_eq!(bytes_to_varinum(&bytes, 0), 0x20_0000);
    }

    #[test]
    fn varinum_unsupported_size() {
        assert_eq!(varinum_size(0x1000_0000), 0);
    }

    #[test]
    fn tempo_round_trip() {
        for us in [1u32, 500_000, 0x00FF_FFFF] {
            let bytes = tempo_us_to_bytes(us);
            assert_eq!(tempo_us_from_bytes(bytes), us);
        }
    }

    #[test]
    fn scenario_c_tempo_bytes() {
        assert_eq!(tempo_us_to_bytes(500_000), [0x07, 0xA1, 0x20]);
    }

    #[test]
    fn note_off_velocity_zero() {
        assert!(is_note_off_velocity(NOTE_ON, 0));
        assert!(!is_note_off_velocity(NOTE_ON, 64));
        assert!(!is_note_off_velocity(NOTE_OFF, 0));
    }

    #[test]
    fn one_byte_msg_is_exact_membership() {
        assert!(is_one_byte_msg(PROGRAM_CHANGE));
        assert!(is_one_byte_msg(CHANNEL_PRESSURE | 0x05));
        assert!(!is_one_byte_msg(NOTE_ON));
    }

    #[test]
    fn status_sizes() {
        assert_eq!(status_size(NOTE_ON), Some(3));
        assert_eq!(status_size(PROGRAM_CHANGE), Some(2));
        assert_eq!(status_size(TIMING_CLOCK), Some(1));
        assert_eq!(status_size(SYSEX_START), None);
    }

    #[test]
    fn meta_sizes() {
        assert_eq!(meta_size(0x51), Some(6));
        assert_eq!(meta_size(0x58), Some(7));
        assert_eq!(meta_size(0x01), None);
    }
}
