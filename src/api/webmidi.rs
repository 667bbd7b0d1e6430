//! Web MIDI realization of [`MidiApi`], built on `web-sys`'s `MidiAccess`
//! bindings. Access is requested asynchronously from the browser (a
//! permission prompt on first use), so `engine_connect` only kicks off the
//! request; ports stay empty until the browser resolves it and the queue
//! starts filling only once an input port is actually open.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use js_sys::{Map, Promise};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{MidiAccess, MidiInput, MidiMessageEvent, MidiOptions, MidiOutput};

use crate::clientinfo::Io;
use crate::errors::{BackendErrorKind, ErrorCallback};
use crate::message::Message;
use crate::ports::{IoDirection, PortDescriptor, PortKind, PortSet};
use crate::queue::{Ignore, InputQueue};

use super::{MidiApi, TimedMessage};

fn request_access(sysex: bool, shared: Rc<RefCell<Option<MidiAccess>>>) -> Option<Promise> {
    let window = web_sys::window()?;
    let slot = shared.clone();
    let on_ok = Closure::wrap(Box::new(move |value: JsValue| {
        *slot.borrow_mut() = value.dyn_into::<MidiAccess>().ok();
    }) as Box<dyn FnMut(JsValue)>);
    let on_err = Closure::wrap(Box::new(move |_value: JsValue| {
        log::warn!("webmidi backend: browser denied or lacks Web MIDI access");
    }) as Box<dyn FnMut(JsValue)>);
    let promise = window
        .navigator()
        .request_midi_access_with_options(MidiOptions::new().sysex(sysex))
        .ok()?;
    let chained = promise.then2(&on_ok, &on_err);
    // Leak the closures: they must live for the lifetime of the pending
    // promise, which this function cannot track past its own return.
    on_ok.forget();
    on_err.forget();
    Some(chained)
}

pub struct WebMidiApi {
    io: Io,
    access: Rc<RefCell<Option<MidiAccess>>>,
    #[allow(dead_code)]
    pending: Option<Promise>,
    input: Option<MidiInput>,
    output: Option<MidiOutput>,
    #[allow(dead_code)]
    callback_closure: Option<Closure<dyn FnMut(MidiMessageEvent)>>,
    port_open: bool,
    ignore: Ignore,
    input_queue: Arc<Mutex<InputQueue>>,
    error_callback: Option<ErrorCallback>,
}

// `web_sys` handles are not `Send`, but every `MidiApi` instance is used
// from a single-threaded wasm32 event loop; `Send` here only satisfies the
// trait bound, not a genuine cross-thread handoff.
unsafe impl Send for WebMidiApi {}

impl WebMidiApi {
    pub fn new(io: Io) -> Self {
        WebMidiApi {
            io,
            access: Rc::new(RefCell::new(None)),
            pending: None,
            input: None,
            output: None,
            callback_closure: None,
            port_open: false,
            ignore: Ignore::empty(),
            input_queue: Arc::new(Mutex::new(InputQueue::new(1024))),
            error_callback: None,
        }
    }

    fn report(&mut self, kind: BackendErrorKind, msg: &str) {
        log::error!("webmidi backend: {msg}");
        if let Some(cb) = self.error_callback.as_mut() {
            cb(kind, msg);
        }
    }

    fn inputs(&self) -> Vec<MidiInput> {
        let access = self.access.borrow();
        let Some(access) = access.as_ref() else { return Vec::new() };
        let mut v = Vec::new();
        let inputs: Map = access.inputs().unchecked_into();
        inputs.for_each(&mut |value, _| {
            if let Ok(input) = value.dyn_into::<MidiInput>() {
                v.push(input);
            }
        });
        v
    }

    fn outputs(&self) -> Vec<MidiOutput> {
        let access = self.access.borrow();
        let Some(access) = access.as_ref() else { return Vec::new() };
        let mut v = Vec::new();
        let outputs: Map = access.outputs().unchecked_into();
        outputs.for_each(&mut |value, _| {
            if let Ok(output) = value.dyn_into::<MidiOutput>() {
                v.push(output);
            }
        });
        v
    }
}

impl MidiApi for WebMidiApi {
    fn io(&self) -> Io {
        self.io
    }

    fn engine_connect(&mut self, _client_name: &str) -> bool {
        // SysEx is requested unconditionally: asking only when needed would
        // mean re-prompting later, and browsers treat the broader grant as
        // the same single permission decision either way.
        self.pending = request_access(true, self.access.clone());
        self.pending.is_some()
    }

    fn engine_disconnect(&mut self) {
        self.close_port();
        self.access.replace(None);
        self.pending = None;
    }

    fn initialize(&mut self, client_name: &str) -> bool {
        self.engine_connect(client_name)
    }

    fn is_port_open(&self) -> bool {
        self.port_open
    }

    fn open_port(&mut self, port_number: usize, _local_name: &str) -> bool {
        if self.port_open {
            return false;
        }
        match self.io {
            Io::Input => {
                let Some(input) = self.inputs().into_iter().nth(port_number) else {
                    self.report(BackendErrorKind::InvalidDevice, "input index out of range");
                    return false;
                };
                let _ = input.open(); // asynchronous; resolves before events arrive

                let ignore = self.ignore;
                let queue = self.input_queue.clone();
                let closure = Closure::wrap(Box::new(move |event: MidiMessageEvent| {
                    let Some(buffer) = event.data() else { return };
                    if buffer.is_empty() {
                        return;
                    }
                    let status = buffer[0];
                    let suppressed = (status == 0xF0 && ignore.contains(Ignore::SYSEX))
                        || (status == 0xF1 && ignore.contains(Ignore::TIME))
                        || (status == 0xF8 && ignore.contains(Ignore::TIME))
                        || (status == 0xFE && ignore.contains(Ignore::ACTIVE_SENSE));
                    if !suppressed {
                        let timestamp_us = event.time_stamp() * 1000.0;
                        let message = Message::from_bytes(timestamp_us / 1_000_000.0, &buffer);
                        let _ = queue.lock().unwrap().push(message);
                    }
                }) as Box<dyn FnMut(MidiMessageEvent)>);

                input.set_onmidimessage(Some(closure.as_ref().unchecked_ref()));
                self.callback_closure = Some(closure);
                self.input = Some(input);
            }
            Io::Output => {
                let Some(output) = self.outputs().into_iter().nth(port_number) else {
                    self.report(BackendErrorKind::InvalidDevice, "output index out of range");
                    return false;
                };
                let _ = output.open(); // asynchronous
                self.output = Some(output);
            }
        }
        self.port_open = true;
        true
    }

    fn open_virtual_port(&mut self, _local_name: &str) -> bool {
        // The browser, not this process, owns port creation.
        false
    }

    fn close_port(&mut self) {
        if let Some(input) = self.input.take() {
            input.set_onmidimessage(None);
        }
        self.callback_closure = None;
        if let Some(output) = self.output.take() {
            let _ = output.close();
        }
        self.port_open = false;
    }

    fn get_port_count(&self) -> usize {
        match self.io {
            Io::Input => self.inputs().len(),
            Io::Output => self.outputs().len(),
        }
    }

    fn get_port_name(&self, index: usize) -> Option<String> {
        match self.io {
            Io::Input => self.inputs().into_iter().nth(index).map(|p| p.name().unwrap_or_else(|| p.id())),
            Io::Output => self.outputs().into_iter().nth(index).map(|p| p.name().unwrap_or_else(|| p.id())),
        }
    }

    fn get_port_alias(&self, _index: usize) -> Option<String> {
        None
    }

    fn get_io_port_info(&self, ports: &mut PortSet, preclear: bool) -> i32 {
        if preclear {
            ports.clear();
        }
        if self.access.borrow().is_none() {
            return -1;
        }
        let count = self.get_port_count();
        let io = match self.io {
            Io::Input => IoDirection::Input,
            Io::Output => IoDirection::Output,
        };
        for i in 0..count {
            let name = self.get_port_name(i).unwrap_or_default();
            ports.push(PortDescriptor::new(0, "Web MIDI", i as i32, name, io, PortKind::Normal));
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
        let Some(output) = self.output.as_ref() else { return false };
        output.send_with_u8_slice(message.bytes()).is_ok()
    }

    fn ignore_midi_types(&mut self, flags: Ignore) {
        self.ignore = flags;
    }

    fn set_input_callback(&mut self, _callback: Box<dyn FnMut(f64, &Message) + Send>) {
        // Routed through the port's own `onmidimessage` closure installed at
        // `open_port` time; this backend is queue-driven only.
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
