//! The backend-abstraction layer: the [`MidiApi`] contract every host
//! realization (ALSA, JACK, CoreMIDI, WinMM, Web MIDI, and the always-on
//! [`dummy`] fallback) implements, plus [`ApiId`] selection and detection.

use crate::clientinfo::Io;
use crate::errors::{BackendErrorKind, ErrorCallback};
use crate::message::Message;
use crate::ports::PortSet;
use crate::queue::Ignore;

pub mod dummy;

#[cfg(all(target_os = "linux", not(feature = "jack")))]
pub mod alsa;
#[cfg(feature = "jack")]
pub mod jack;
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub mod coremidi;
#[cfg(target_os = "windows")]
pub mod winmm;
#[cfg(target_arch = "wasm32")]
pub mod webmidi;

/// Identifies a compiled-in backend realization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiId {
    Jack,
    Alsa,
    CoreMidi,
    WinMM,
    WebMidi,
    Dummy,
}

impl ApiId {
    pub fn name(self) -> &'static str {
        match self {
            ApiId::Jack => "JACK",
            ApiId::Alsa => "ALSA",
            ApiId::CoreMidi => "CoreMIDI",
            ApiId::WinMM => "WinMM",
            ApiId::WebMidi => "Web MIDI",
            ApiId::Dummy => "Dummy",
        }
    }
}

impl std::fmt::Display for ApiId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns the compiled-in backends for this target, in the order they
/// should be tried: JACK, ALSA, CoreMIDI, WinMM, Web MIDI, then the
/// dummy backend as a fallback that's always available.
pub fn detect() -> Vec<ApiId> {
    let mut found = Vec::new();

    #[cfg(feature = "jack")]
    found.push(ApiId::Jack);

    #[cfg(all(target_os = "linux", not(feature = "jack")))]
    found.push(ApiId::Alsa);

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    found.push(ApiId::CoreMidi);

    #[cfg(target_os = "windows")]
    found.push(ApiId::WinMM);

    #[cfg(target_arch = "wasm32")]
    found.push(ApiId::WebMidi);

    found.push(ApiId::Dummy);
    found
}

/// Result of polling or popping a queued input message: the delta time
/// since the previous message (seconds) and the message itself.
pub type TimedMessage = (f64, Message);

/// The contract a host MIDI backend realizes. One instance is owned by
/// exactly one `Bus` and handles exactly one `io` direction (`Engine` for
/// the master bus's own connection-only handle).
///
/// Every method that can fail returns `bool` or `Option`; diagnostics that
/// don't fit that protocol go through the installed [`ErrorCallback`],
/// never a panic or a `Result` crossing this boundary (the contract itself
/// does not throw, matching the propagation policy that public operations
/// report failure through return values, not exceptions).
pub trait MidiApi: Send {
    /// Which direction this instance was built for.
    fn io(&self) -> Io;

    /// Opens a client session with the host subsystem. Does not activate
    /// the client in a processing graph and does not create ports.
    fn engine_connect(&mut self, client_name: &str) -> bool;

    /// Releases the client session. Idempotent.
    fn engine_disconnect(&mut self);

    /// Attaches to the processing graph, for backends that have one
    /// (JACK). Backends without the concept return `true`.
    fn engine_activate(&mut self) -> bool {
        true
    }

    /// Detaches from the processing graph. Backends without the concept
    /// are a no-op returning `true`.
    fn engine_deactivate(&mut self) -> bool {
        true
    }

    /// Finishes setup after `engine_connect`: buffers, queues, reader
    /// threads. Must be safe to call exactly once per instance.
    fn initialize(&mut self, client_name: &str) -> bool;

    fn is_port_open(&self) -> bool;

    fn open_port(&mut self, port_number: usize, local_name: &str) -> bool;

    fn open_virtual_port(&mut self, local_name: &str) -> bool;

    fn close_port(&mut self);

    fn get_port_count(&self) -> usize;

    fn get_port_name(&self, index: usize) -> Option<String>;

    fn get_port_alias(&self, index: usize) -> Option<String>;

    /// Bulk-enumerates ports of this instance's io direction into `ports`,
    /// clearing it first unless `preclear` is false. Returns the count, or
    /// `-1` if the backend is not connected.
    fn get_io_port_info(&self, ports: &mut PortSet, preclear: bool) -> i32;

    /// JACK only supports setting the client name at open time; other
    /// backends may rename freely. A backend that can't honors the call
    /// as a no-op and returns `false`.
    fn set_client_name(&mut self, name: &str) -> bool;

    fn set_port_name(&mut self, name: &str) -> bool;

    /// Sends one complete message. Delivery is atomic relative to other
    /// `send_message` calls on the same instance; a message too large for
    /// the backend's buffer either grows the buffer or fails outright —
    /// never a partial send.
    fn send_message(&mut self, message: &Message) -> bool;

    /// Ensures deferred sends are visible to the backend. Returns `true`
    /// if there was nothing deferred.
    fn flush_port(&mut self) -> bool {
        true
    }

    fn ignore_midi_types(&mut self, flags: Ignore);

    fn set_input_callback(&mut self, callback: Box<dyn FnMut(f64, &Message) + Send>);

    fn cancel_input_callback(&mut self);

    /// Pops the next queued message, if input is queue-driven and
    /// non-empty.
    fn get_message(&mut self) -> Option<TimedMessage>;

    fn set_error_callback(&mut self, callback: ErrorCallback);

    fn report_error(&mut self, kind: BackendErrorKind, message: &str);

    // Real-time control extensions. A backend that can't realize one of
    // these simply returns `false`; none of them are required.

    fn clock_start(&mut self) -> bool {
        false
    }

    fn clock_send(&mut self, _tick: i64) -> bool {
        false
    }

    fn clock_stop(&mut self) -> bool {
        false
    }

    fn clock_continue(&mut self, _tick: i64, _beats: i32) -> bool {
        false
    }

    fn send_byte(&mut self, _byte: u8) -> bool {
        false
    }
}
