//! A cross-platform, realtime MIDI I/O runtime: byte/message/event models,
//! a per-backend realization of the [`api::MidiApi`] contract (ALSA, JACK,
//! CoreMIDI, WinMM, Web MIDI, and a dependency-free [`api::dummy`]
//! fallback), and a [`bus`]/[`busarray`]/[`masterbus`] layer that turns
//! enumerated host ports into addressable, clock-aware buses.
//!
//! The [`MasterBus`] is the usual entry point: it picks a backend via
//! [`api::detect`], enumerates ports into input/output [`BusArray`]s, and
//! forwards playback, clocking, and port-enumeration calls to them.

pub mod api;
pub mod bus;
pub mod busarray;
pub mod bytes;
pub mod clientinfo;
pub mod errors;
pub mod event;
pub mod masterbus;
pub mod message;
pub mod ports;
pub mod queue;

pub use bus::{Bus, Clocking};
pub use busarray::BusArray;
pub use clientinfo::{ClientInfo, Io};
pub use errors::{BackendErrorKind, ErrorCallback};
pub use event::{Event, NoteKind};
pub use masterbus::{ClockAction, MasterBus};
pub use message::Message;
pub use ports::{IoDirection, PortDescriptor, PortKind, PortSet};
pub use queue::{Ignore, InputQueue};
