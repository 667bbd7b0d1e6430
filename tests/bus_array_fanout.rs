//! End-to-end coverage of the bus/bus-array layer using a recording mock
//! backend in place of a real host subsystem, since these properties are
//! about fan-out and ordering, not any particular driver.

use std::sync::{Arc, Mutex};

use midibus::bus::{Bus, Clocking};
use midibus::busarray::BusArray;
use midibus::clientinfo::Io;
use midibus::errors::{BackendErrorKind, ErrorCallback};
use midibus::message::Message;
use midibus::ports::PortSet;
use midibus::{Event, Ignore, NoteKind};

/// Records every clock call it receives instead of talking to a real
/// backend, so a test can assert exactly how many buses observed a given
/// control byte.
struct RecordingApi {
    io: Io,
    starts: Arc<Mutex<u32>>,
    sent: Arc<Mutex<Vec<i64>>>,
}

impl RecordingApi {
    fn new(io: Io, starts: Arc<Mutex<u32>>, sent: Arc<Mutex<Vec<i64>>>) -> Self {
        RecordingApi { io, starts, sent }
    }
}

impl midibus::api::MidiApi for RecordingApi {
    fn io(&self) -> Io {
        self.io
    }

    fn engine_connect(&mut self, _client_name: &str) -> bool {
        true
    }

    fn engine_disconnect(&mut self) {}

    fn initialize(&mut self, _client_name: &str) -> bool {
        true
    }

    fn is_port_open(&self) -> bool {
        true
    }

    fn open_port(&mut self, _port_number: usize, _local_name: &str) -> bool {
        true
    }

    fn open_virtual_port(&mut self, _local_name: &str) -> bool {
        true
    }

    fn close_port(&mut self) {}

    fn get_port_count(&self) -> usize {
        0
    }

    fn get_port_name(&self, _index: usize) -> Option<String> {
        None
    }

    fn get_port_alias(&self, _index: usize) -> Option<String> {
        None
    }

    fn get_io_port_info(&self, _ports: &mut PortSet, _preclear: bool) -> i32 {
        0
    }

    fn set_client_name(&mut self, _name: &str) -> bool {
        false
    }

    fn set_port_name(&mut self, _name: &str) -> bool {
        false
    }

    fn send_message(&mut self, _message: &Message) -> bool {
        true
    }

    fn ignore_midi_types(&mut self, _flags: Ignore) {}

    fn set_input_callback(&mut self, _callback: Box<dyn FnMut(f64, &Message) + Send>) {}

    fn cancel_input_callback(&mut self) {}

    fn get_message(&mut self) -> Option<(f64, Message)> {
        None
    }

    fn set_error_callback(&mut self, _callback: ErrorCallback) {}

    fn report_error(&mut self, _kind: BackendErrorKind, _message: &str) {}

    fn clock_start(&mut self) -> bool {
        *self.starts.lock().unwrap() += 1;
        true
    }

    fn clock_send(&mut self, tick: i64) -> bool {
        self.sent.lock().unwrap().push(tick);
        true
    }
}

fn recording_bus(index: usize, clocking: Clocking, starts: &Arc<Mutex<u32>>) -> Bus {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let api = RecordingApi::new(Io::Output, starts.clone(), sent);
    let mut bus = Bus::new(index, Io::Output, Box::new(api), midibus::clientinfo::new_shared());
    bus.set_clocking(clocking);
    bus
}

#[test]
fn clock_start_fanout_skips_disabled_buses() {
    let starts = Arc::new(Mutex::new(0u32));
    let mut array = BusArray::new();
    array.add(recording_bus(0, Clocking::Mod, &starts));
    array.add(recording_bus(1, Clocking::Disabled, &starts));
    array.add(recording_bus(2, Clocking::Pos, &starts));

    array.clock_start();

    // Exactly the two non-disabled buses observed one clock_start call.
    assert_eq!(*starts.lock().unwrap(), 2);
}

#[test]
fn clock_send_after_init_clock_lands_on_alignment_boundary() {
    let starts = Arc::new(Mutex::new(0u32));
    let mut bus = recording_bus(0, Clocking::Mod, &starts);
    bus.init_clock(10, 192);
    assert_eq!(bus.last_tick(), 3071);
    assert!(bus.clock_send(3072));
    assert_eq!(bus.last_tick(), 3072);
}

#[test]
fn port_set_identity_is_stable_across_two_scans() {
    use midibus::api::{dummy::DummyApi, MidiApi};

    let mut api = DummyApi::new(Io::Input);
    api.engine_connect("test");
    let mut first = PortSet::new();
    let mut second = PortSet::new();
    api.get_io_port_info(&mut first, true);
    api.get_io_port_info(&mut second, true);
    assert_eq!(first.identity_pairs(), second.identity_pairs());
}

#[test]
fn send_event_applies_channel_override_through_a_bus() {
    let starts = Arc::new(Mutex::new(0u32));
    let mut bus = recording_bus(0, Clocking::Off, &starts);
    bus.set_active(true);
    let event = Event::note(0.0, NoteKind::On, 2, 60, 100);
    assert!(bus.send_event(&event, 5));
}
