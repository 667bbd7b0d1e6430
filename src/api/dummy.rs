//! The dummy backend: always compiled in, exposes zero ports, and accepts
//! (and silently discards) every send. Used as the bottom of the
//! detection order and by the test suite, which needs a deterministic
//! backend with no host dependency at all.

use crate::clientinfo::Io;
use crate::errors::{BackendErrorKind, ErrorCallback};
use crate::message::Message;
use crate::ports::PortSet;
use crate::queue::Ignore;

use super::{MidiApi, TimedMessage};

pub struct DummyApi {
    io: Io,
    connected: bool,
    port_open: bool,
    ignore: Ignore,
    error_callback: Option<ErrorCallback>,
}

impl DummyApi {
    pub fn new(io: Io) -> Self {
        DummyApi {
            io,
            connected: false,
            port_open: false,
            ignore: Ignore::empty(),
            error_callback: None,
        }
    }
}

impl MidiApi for DummyApi {
    fn io(&self) -> Io {
        self.io
    }

    fn engine_connect(&mut self, _client_name: &str) -> bool {
        log::warn!("dummy backend in use: no MIDI support compiled in for this target/build");
        self.connected = true;
        true
    }

    fn engine_disconnect(&mut self) {
        self.connected = false;
    }

    fn initialize(&mut self, client_name: &str) -> bool {
        self.engine_connect(client_name)
    }

    fn is_port_open(&self) -> bool {
        self.port_open
    }

    fn open_port(&mut self, _port_number: usize, _local_name: &str) -> bool {
        false
    }

    fn open_virtual_port(&mut self, _local_name: &str) -> bool {
        false
    }

    fn close_port(&mut self) {
        self.port_open = false;
    }

    fn get_port_count(&self) -> usize {
        0
    }

    fn get_port_name(&self, _index: usize) -> Option<String> {
        None
    }

    fn get_port_alias(&self, _index: usize) -> Option<String> {
        None
    }

    fn get_io_port_info(&self, ports: &mut PortSet, preclear: bool) -> i32 {
        if preclear {
            ports.clear();
        }
        if !self.connected {
            return -1;
        }
        0
    }

    fn set_client_name(&mut self, _name: &str) -> bool {
        false
    }

    fn set_port_name(&mut self, _name: &str) -> bool {
        false
    }

    fn send_message(&mut self, _message: &Message) -> bool {
        false
    }

    fn ignore_midi_types(&mut self, flags: Ignore) {
        self.ignore = flags;
    }

    fn set_input_callback(&mut self, _callback: Box<dyn FnMut(f64, &Message) + Send>) {}

    fn cancel_input_callback(&mut self) {}

    fn get_message(&mut self) -> Option<TimedMessage> {
        None
    }

    fn set_error_callback(&mut self, callback: ErrorCallback) {
        self.error_callback = Some(callback);
    }

    fn report_error(&mut self, kind: BackendErrorKind, message: &str) {
        if let Some(cb) = self.error_callback.as_mut() {
            cb(kind, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_reports_no_ports_until_connected() {
        let mut api = DummyApi::new(Io::Input);
        let mut ports = PortSet::new();
        assert_eq!(api.get_io_port_info(&mut ports, true), -1);
        assert!(api.engine_connect("test"));
        assert_eq!(api.get_io_port_info(&mut ports, true), 0);
        assert!(ports.is_empty());
    }

    #[test]
    fn dummy_never_opens_a_real_port() {
        let mut api = DummyApi::new(Io::Output);
        assert!(!api.open_port(0, "out"));
        assert!(!api.is_port_open());
    }

    #[test]
    fn dummy_forwards_reported_errors() {
        let mut api = DummyApi::new(Io::Input);
        let seen = std::sync::Arc::new(std::sync::Mutex::new(None));
        let seen2 = seen.clone();
        api.set_error_callback(Box::new(move |kind, msg| {
            *seen2.lock().unwrap() = Some((kind, msg.to_string()));
        }));
        api.report_error(BackendErrorKind::Warning, "test warning");
        let got = seen.lock().unwrap().clone().unwrap();
        assert_eq!(got.0, BackendErrorKind::Warning);
        assert_eq!(got.1, "test warning");
    }
}
