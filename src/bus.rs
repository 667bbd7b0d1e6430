//! [`Bus`]: one logical MIDI port, either input or output, owning exactly
//! one backend [`MidiApi`] instance plus the identity, clocking, and
//! active-flag state the bus array and master bus above it manage in bulk.

use crate::api::MidiApi;
use crate::clientinfo::{Io, SharedClientInfo};
use crate::errors::ErrorCallback;
use crate::event::Event;
use crate::ports::{IoDirection, PortKind};

/// The policy governing MIDI real-time clock emission on an output bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clocking {
    Disabled,
    Off,
    Pos,
    Mod,
    Unavailable,
}

impl Default for Clocking {
    fn default() -> Self {
        Clocking::Off
    }
}

/// Clock-mod granularity shared by every output bus: 16th-note boundaries
/// at the default PPQN/4 subdivision. Mutable only through
/// [`set_clock_mod`]; read through [`clock_mod`].
static CLOCK_MOD: std::sync::atomic::AtomicI32 = std::sync::atomic::AtomicI32::new(64);

pub fn clock_mod() -> i32 {
    CLOCK_MOD.load(std::sync::atomic::Ordering::Relaxed)
}

pub fn set_clock_mod(value: i32) {
    CLOCK_MOD.store(value, std::sync::atomic::Ordering::Relaxed);
}

/// One logical port: identifiers, names, clocking state, active flag, and
/// the single backend instance it owns. Input and output buses share this
/// base; `clocking`/`last_tick` only have meaning on an output bus.
pub struct Bus {
    index: usize,
    client_id: i32,
    bus_id: i32,
    port_id: i32,
    bus_name: String,
    port_name: String,
    alias: String,
    io: Io,
    kind: PortKind,
    clocking: Clocking,
    active: bool,
    last_tick: i64,
    client_info: SharedClientInfo,
    api: Box<dyn MidiApi>,
}

impl Bus {
    pub fn new(index: usize, io: Io, api: Box<dyn MidiApi>, client_info: SharedClientInfo) -> Self {
        Bus {
            index,
            client_id: 0,
            bus_id: 0,
            port_id: 0,
            bus_name: String::new(),
            port_name: String::new(),
            alias: String::new(),
            io,
            kind: PortKind::Normal,
            clocking: Clocking::Off,
            active: false,
            last_tick: -1,
            client_info,
            api,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn io(&self) -> Io {
        self.io
    }

    pub fn api(&self) -> &dyn MidiApi {
        self.api.as_ref()
    }

    pub fn api_mut(&mut self) -> &mut dyn MidiApi {
        self.api.as_mut()
    }

    pub fn initialize(&mut self, client_name: &str) -> bool {
        self.api.initialize(client_name)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, flag: bool) {
        self.active = flag;
    }

    pub fn is_system(&self) -> bool {
        self.kind == PortKind::System
    }

    pub fn is_locked(&self) -> bool {
        // A port is locked once opened: renaming/reopening would race the
        // backend's own handle.
        self.api.is_port_open()
    }

    pub fn bus_name(&self) -> &str {
        &self.bus_name
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn clocking(&self) -> Clocking {
        self.clocking
    }

    pub fn set_clocking(&mut self, clocking: Clocking) {
        self.clocking = clocking;
    }

    pub fn client_id(&self) -> i32 {
        self.client_id
    }

    pub fn port_id(&self) -> i32 {
        self.port_id
    }

    /// Refreshes identifiers and names from the shared client info's port
    /// set at this bus's index.
    pub fn refresh_port_info(&mut self) {
        let guard = self.client_info.lock();
        let info = guard.borrow();
        let Some(port) = info.io_ports(self.io).get(self.index) else { return };
        self.client_id = port.client_id;
        self.bus_id = port.client_id;
        self.port_id = port.port_id;
        self.bus_name = port.client_name.clone();
        self.port_name = port.port_name.clone();
        self.alias = port.alias.clone().unwrap_or_default();
        self.kind = port.kind;
    }

    /// An input-only enable/disable toggle. A system port is always
    /// activated with clocking forced to `Off` ("none"), regardless of
    /// `flag`.
    pub fn init_input(&mut self, flag: bool) {
        if self.is_system() {
            self.active = true;
            self.clocking = Clocking::Off;
            return;
        }
        self.active = flag;
    }

    /// Gated by `active`: polls the backend for a pending message, tagging
    /// any produced event with this bus's index.
    pub fn poll_for_midi(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.api.get_message().is_some()
    }

    /// Pops one queued message (if any) and tags it with this bus's index.
    pub fn get_midi_event(&mut self) -> Option<Event> {
        if !self.active {
            return None;
        }
        let (timestamp, message) = self.api.get_message()?;
        let mut event = Event::from_status(timestamp, message.status(), message.data(0), message.data(1));
        event.set_input_bus(self.index as u8);
        Some(event)
    }

    /// Depending on `clocking`: "pos" with a nonzero tick sends Continue at
    /// that tick; "mod" (or a zero tick) sends Start and aligns
    /// `last_tick` to the next multiple of `PPQN/4 * clock_mod`, so
    /// subsequent `clock_send` calls land on 16th-note boundaries.
    pub fn init_clock(&mut self, tick: i64, ppqn: i32) {
        match self.clocking {
            Clocking::Pos if tick != 0 => {
                self.clock_continue(tick, 0);
            }
            Clocking::Mod | Clocking::Pos => {
                self.clock_start();
                let clock_mod_ticks = i64::from(ppqn / 4 * clock_mod());
                let starting_tick = if clock_mod_ticks == 0 {
                    tick
                } else {
                    ((tick + clock_mod_ticks - 1) / clock_mod_ticks) * clock_mod_ticks
                };
                self.last_tick = starting_tick - 1;
            }
            Clocking::Off | Clocking::Disabled | Clocking::Unavailable => {}
        }
    }

    pub fn last_tick(&self) -> i64 {
        self.last_tick
    }

    pub fn clock_send(&mut self, tick: i64) -> bool {
        if !matches!(self.clocking, Clocking::Mod | Clocking::Pos) {
            return false;
        }
        self.last_tick = tick;
        self.api.clock_send(tick)
    }

    pub fn clock_start(&mut self) -> bool {
        if matches!(self.clocking, Clocking::Disabled | Clocking::Unavailable) {
            return false;
        }
        self.api.clock_start()
    }

    pub fn clock_stop(&mut self) -> bool {
        if matches!(self.clocking, Clocking::Disabled | Clocking::Unavailable) {
            return false;
        }
        self.api.clock_stop()
    }

    pub fn clock_continue(&mut self, tick: i64, beats: i32) -> bool {
        if matches!(self.clocking, Clocking::Disabled | Clocking::Unavailable) {
            return false;
        }
        self.last_tick = tick;
        self.api.clock_continue(tick, beats)
    }

    /// Applies a channel override to `event`'s status byte before handing
    /// it to the backend. `channel == NO_CHANNEL` leaves it untouched.
    pub fn send_event(&mut self, event: &Event, channel: crate::bytes::Channel) -> bool {
        if !self.active {
            return false;
        }
        let mut message = event.message().clone();
        if channel != crate::bytes::NO_CHANNEL && crate::bytes::is_channel_msg(message.status()) {
            message.set_channel(channel);
        }
        self.api.send_message(&message)
    }

    pub fn send_sysex(&mut self, event: &Event) -> bool {
        if !self.active {
            return false;
        }
        self.api.send_message(event.message())
    }

    pub fn flush(&mut self) -> bool {
        self.api.flush_port()
    }

    pub fn set_error_callback(&mut self, callback: ErrorCallback) {
        self.api.set_error_callback(callback);
    }

    pub fn io_direction(&self) -> IoDirection {
        match self.io {
            Io::Input => IoDirection::Input,
            Io::Output => IoDirection::Output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::dummy::DummyApi;

    fn bus(io: Io) -> Bus {
        Bus::new(0, io, Box::new(DummyApi::new(io)), crate::clientinfo::new_shared())
    }

    #[test]
    fn scenario_e_output_clock_alignment() {
        let mut b = bus(Io::Output);
        b.set_clocking(Clocking::Mod);
        set_clock_mod(64);
        b.init_clock(10, 192);
        assert_eq!(b.last_tick(), 3071);
    }

    #[test]
    fn system_port_is_always_active_with_clocking_off() {
        let mut b = bus(Io::Input);
        b.init_input(false);
        assert!(!b.is_active());

        // Force system classification directly (normally set by
        // refresh_port_info from the enumerated port kind).
        b.kind = PortKind::System;
        b.init_input(false);
        assert!(b.is_active());
        assert_eq!(b.clocking(), Clocking::Off);
    }

    #[test]
    fn inactive_bus_rejects_sends() {
        let mut b = bus(Io::Output);
        let event = Event::note(0.0, crate::event::NoteKind::On, 0, 60, 100);
        assert!(!b.send_event(&event, crate::bytes::NO_CHANNEL));
    }
}
