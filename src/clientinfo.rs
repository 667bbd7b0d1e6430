//! [`ClientInfo`]: the information a backend gathers once — port lists,
//! client/application names, global timing — and that the bus layer above
//! it consults rather than re-querying the backend on every call.

use std::cell::RefCell;
use std::sync::Arc;

use parking_lot::ReentrantMutex;

use crate::ports::PortSet;

/// The recursive-mutex-guarded handle the bus layer shares: a `Bus`'s own
/// mutating operations and the `MasterBus` that owns it may both need to
/// touch the same `ClientInfo` on the same call stack (e.g. `refresh_port_info`
/// called from within a `MasterBus` method already holding it), which a
/// plain `Mutex` would deadlock on.
pub type SharedClientInfo = Arc<ReentrantMutex<RefCell<ClientInfo>>>;

/// Builds a fresh, independently-owned [`SharedClientInfo`] handle.
pub fn new_shared() -> SharedClientInfo {
    Arc::new(ReentrantMutex::new(RefCell::new(ClientInfo::new())))
}

/// Which side of a [`ClientInfo`]'s two port sets an index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Io {
    Input,
    Output,
}

impl Io {
    fn index(self) -> usize {
        match self {
            Io::Input => 0,
            Io::Output => 1,
        }
    }
}

/// Returns `true` for the sentinel "use every port" value (`-1`), the
/// convention both port-number fields below use for "not yet chosen".
pub fn is_all_ports(port_number: i32) -> bool {
    port_number == -1
}

/// Host-level MIDI status gathered once per process (or per engine
/// connection) and shared by every [`crate::bus::Bus`] built on top of it:
/// naming, preferences, global timing, and the enumerated port lists for
/// both directions.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    api_version: String,
    client_name: String,
    app_name: String,
    jack_midi: bool,
    virtual_ports: bool,
    auto_connect: bool,
    global_ppqn: i32,
    global_bpm: f64,
    io_ports: [PortSet; 2],
    input_portnumber: i32,
    output_portnumber: i32,
    global_queue: i32,
    is_connected: bool,
    error_string: String,
}

impl ClientInfo {
    pub fn new() -> Self {
        ClientInfo {
            input_portnumber: -1,
            output_portnumber: -1,
            global_queue: -1,
            ..Default::default()
        }
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn set_api_version(&mut self, v: impl Into<String>) {
        self.api_version = v.into();
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn set_client_name(&mut self, name: impl Into<String>) {
        self.client_name = name.into();
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn set_app_name(&mut self, name: impl Into<String>) {
        self.app_name = name.into();
    }

    pub fn jack_midi(&self) -> bool {
        self.jack_midi
    }

    pub fn set_jack_midi(&mut self, flag: bool) {
        self.jack_midi = flag;
    }

    pub fn virtual_ports(&self) -> bool {
        self.virtual_ports
    }

    pub fn set_virtual_ports(&mut self, flag: bool) {
        self.virtual_ports = flag;
    }

    pub fn auto_connect(&self) -> bool {
        self.auto_connect
    }

    pub fn set_auto_connect(&mut self, flag: bool) {
        self.auto_connect = flag;
    }

    pub fn global_ppqn(&self) -> i32 {
        self.global_ppqn
    }

    pub fn set_global_ppqn(&mut self, ppqn: i32) {
        self.global_ppqn = ppqn;
    }

    pub fn global_bpm(&self) -> f64 {
        self.global_bpm
    }

    pub fn set_global_bpm(&mut self, bpm: f64) {
        self.global_bpm = bpm;
    }

    pub fn global_tempo_us(&self) -> u32 {
        crate::bytes::tempo_us_from_bpm(self.global_bpm)
    }

    pub fn input_portnumber(&self) -> i32 {
        self.input_portnumber
    }

    pub fn set_input_portnumber(&mut self, p: i32) {
        if p >= -1 {
            self.input_portnumber = p;
        }
    }

    pub fn output_portnumber(&self) -> i32 {
        self.output_portnumber
    }

    pub fn set_output_portnumber(&mut self, p: i32) {
        if p >= -1 {
            self.output_portnumber = p;
        }
    }

    pub fn global_queue(&self) -> i32 {
        self.global_queue
    }

    pub fn set_global_queue(&mut self, q: i32) {
        self.global_queue = q;
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected
    }

    pub fn set_connected(&mut self, flag: bool) {
        self.is_connected = flag;
    }

    pub fn error_string(&self) -> &str {
        &self.error_string
    }

    pub fn set_error_string(&mut self, msg: impl Into<String>) {
        self.error_string = msg.into();
    }

    pub fn io_ports(&self, io: Io) -> &PortSet {
        &self.io_ports[io.index()]
    }

    pub fn io_ports_mut(&mut self, io: Io) -> &mut PortSet {
        &mut self.io_ports[io.index()]
    }

    pub fn clear(&mut self) {
        self.io_ports[0].clear();
        self.io_ports[1].clear();
    }

    pub fn is_empty(&self) -> bool {
        self.io_ports[0].is_empty() && self.io_ports[1].is_empty()
    }

    pub fn port_count(&self, io: Io) -> usize {
        self.io_ports(io).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{IoDirection, PortDescriptor, PortKind};

    #[test]
    fn fresh_client_info_has_no_port_selected() {
        let info = ClientInfo::new();
        assert!(is_all_ports(info.input_portnumber()));
        assert!(is_all_ports(info.output_portnumber()));
    }

    #[test]
    fn input_and_output_port_sets_are_independent() {
        let mut info = ClientInfo::new();
        info.io_ports_mut(Io::Input)
            .push(PortDescriptor::new(128, "A", 0, "In", IoDirection::Input, PortKind::Normal));
        assert_eq!(info.port_count(Io::Input), 1);
        assert_eq!(info.port_count(Io::Output), 0);
    }

    #[test]
    fn global_tempo_us_tracks_bpm() {
        let mut info = ClientInfo::new();
        info.set_global_bpm(120.0);
        assert_eq!(info.global_tempo_us(), 500_000);
    }
}
