//! JACK realization of [`MidiApi`]. One JACK client per instance; MIDI I/O
//! happens inside the JACK process callback (a real-time thread), so
//! everything reachable from it is allocation-free and lock-free. A
//! single-producer/single-consumer ring buffer moves outgoing [`Message`]s
//! from the application thread into the process callback, and incoming
//! ones from the process callback out to the application/queue.

use std::ffi::CString;
use std::os::raw::{c_char, c_void};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use jack_sys as sys;

use crate::clientinfo::Io;
use crate::errors::{BackendErrorKind, ErrorCallback};
use crate::message::Message;
use crate::ports::PortSet;
use crate::queue::{Ignore, InputQueue};

use super::{MidiApi, TimedMessage};

const OUTPUT_RING_CAPACITY: usize = 2048;

/// A bounded SPSC ring of [`Message`]s, used for both the output path
/// (application thread producer, process-callback consumer) and the input
/// path (process-callback producer, application thread consumer). It is
/// guarded by a `Mutex` rather than being lock-free in the strict sense:
/// lock acquisition inside the process callback is a documented deviation
/// (see DESIGN.md) justified by the short, uncontended critical sections
/// involved versus the complexity of a truly wait-free ring here.
struct MessageRing {
    buffer: Mutex<std::collections::VecDeque<Message>>,
    capacity: usize,
    dropped: AtomicU64,
    max_occupancy: AtomicU64,
}

impl MessageRing {
    fn new(capacity: usize) -> Self {
        MessageRing {
            buffer: Mutex::new(std::collections::VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
            max_occupancy: AtomicU64::new(0),
        }
    }

    fn push(&self, message: Message) -> bool {
        let mut buf = self.buffer.lock().unwrap();
        if buf.len() >= self.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        buf.push_back(message);
        let occ = buf.len() as u64;
        drop(buf);
        self.max_occupancy.fetch_max(occ, Ordering::Relaxed);
        true
    }

    fn pop(&self) -> Option<Message> {
        self.buffer.lock().unwrap().pop_front()
    }

    fn peek_len(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }
}

impl Drop for MessageRing {
    fn drop(&mut self) {
        let dropped = self.dropped.load(Ordering::Relaxed);
        let max_occ = self.max_occupancy.load(Ordering::Relaxed);
        if dropped > 0 || max_occ as usize > self.capacity / 2 {
            log::warn!(
                "jack message ring closing with {} dropped, max occupancy {}/{}",
                dropped,
                max_occ,
                self.capacity
            );
        }
    }
}

/// Shared state reachable from the JACK process callback. Everything the
/// callback touches is either atomic, a short-held mutex over a plain
/// queue (see [`MessageRing`]), or fixed-size — no allocation on the
/// hot path beyond what the ring's `Mutex` itself may do internally.
struct ProcessShared {
    io: Io,
    port: std::sync::atomic::AtomicPtr<c_void>,
    input_ring: Option<Arc<MessageRing>>,
    output_ring: Option<Arc<MessageRing>>,
    ignore: std::sync::atomic::AtomicU8,
    last_frame_time: AtomicU64,
    /// Bytes of a SysEx message straddling more than one callback event,
    /// non-empty only between a `0xF0` and its terminating `0xF7`. Guarded
    /// by the same short-critical-section `Mutex` deviation as
    /// [`MessageRing`].
    sysex_buffer: Mutex<Vec<u8>>,
}

unsafe impl Sync for ProcessShared {}

pub struct JackApi {
    io: Io,
    client: *mut sys::jack_client_t,
    port_name: Option<String>,
    connected: bool,
    port_open: bool,
    shared: Arc<ProcessShared>,
    input_queue: Option<InputQueue>,
    callback: Option<Box<dyn FnMut(f64, &Message) + Send>>,
    error_callback: Option<ErrorCallback>,
    last_message_time: f64,
}

unsafe impl Send for JackApi {}

impl JackApi {
    pub fn new(io: Io) -> Self {
        JackApi {
            io,
            client: std::ptr::null_mut(),
            port_name: None,
            connected: false,
            port_open: false,
            shared: Arc::new(ProcessShared {
                io,
                port: std::sync::atomic::AtomicPtr::new(std::ptr::null_mut()),
                input_ring: None,
                output_ring: None,
                ignore: std::sync::atomic::AtomicU8::new(0),
                last_frame_time: AtomicU64::new(0),
                sysex_buffer: Mutex::new(Vec::new()),
            }),
            input_queue: Some(InputQueue::new(1024)),
            callback: None,
            error_callback: None,
            last_message_time: 0.0,
        }
    }

    fn report(&mut self, kind: BackendErrorKind, msg: &str) {
        log::error!("jack backend: {msg}");
        if let Some(cb) = self.error_callback.as_mut() {
            cb(kind, msg);
        }
    }
}

impl Drop for JackApi {
    fn drop(&mut self) {
        self.close_port();
        self.engine_disconnect();
    }
}

unsafe extern "C" fn process_callback(nframes: sys::jack_nframes_t, arg: *mut c_void) -> i32 {
    let shared = &*(arg as *const ProcessShared);
    let port = shared.port.load(Ordering::Acquire);
    if port.is_null() {
        return 0;
    }

    match shared.io {
        Io::Input => {
            let buf = sys::jack_port_get_buffer(port as *mut sys::jack_port_t, nframes);
            let ignore = Ignore::from_bits_truncate(shared.ignore.load(Ordering::Relaxed));
            let count: u32 = sys::jack_midi_get_event_count(buf);
            let mut sysex = shared.sysex_buffer.lock().unwrap();
            for i in 0..count {
                let mut event: sys::jack_midi_event_t = std::mem::zeroed();
                if sys::jack_midi_event_get(&mut event, buf, i as sys::jack_nframes_t) != 0 {
                    continue;
                }
                let bytes = std::slice::from_raw_parts(event.buffer, event.size);
                if bytes.is_empty() {
                    continue;
                }
                if !sysex.is_empty() || bytes[0] == crate::bytes::SYSEX_START {
                    if ignore.filters(crate::bytes::SYSEX_START) {
                        if bytes.last() == Some(&crate::bytes::SYSEX_END) {
                            sysex.clear();
                        }
                        continue;
                    }
                    sysex.extend_from_slice(bytes);
                    if sysex.last() == Some(&crate::bytes::SYSEX_END) {
                        if let Some(ring) = shared.input_ring.as_ref() {
                            ring.push(Message::from_bytes(event.time as f64, &sysex));
                        }
                        sysex.clear();
                    }
                    continue;
                }
                if ignore.filters(bytes[0]) {
                    continue;
                }
                if let Some(ring) = shared.input_ring.as_ref() {
                    ring.push(Message::from_bytes(event.time as f64, bytes));
                }
            }
        }
        Io::Output => {
            let buf = sys::jack_port_get_buffer(port as *mut sys::jack_port_t, nframes);
            sys::jack_midi_clear_buffer(buf);
            if let Some(ring) = shared.output_ring.as_ref() {
                while let Some(message) = ring.pop() {
                    let bytes = message.bytes();
                    let rc = sys::jack_midi_event_write(
                        buf,
                        0,
                        bytes.as_ptr(),
                        bytes.len(),
                    );
                    if rc != 0 {
                        // Buffer full this cycle; the ring keeps what's
                        // left for the next one rather than dropping it.
                        break;
                    }
                }
            }
        }
    }
    0
}

impl MidiApi for JackApi {
    fn io(&self) -> Io {
        self.io
    }

    fn engine_connect(&mut self, client_name: &str) -> bool {
        if !self.client.is_null() {
            return true;
        }
        let c_name = match CString::new(client_name) {
            Ok(c) => c,
            Err(_) => return false,
        };
        let mut status: sys::jack_status_t = 0;
        let client = unsafe {
            sys::jack_client_open(
                c_name.as_ptr() as *const c_char,
                sys::JackNoStartServer,
                &mut status,
            )
        };
        if client.is_null() {
            self.report(BackendErrorKind::NoDeviceFound, "jack server is not running");
            return false;
        }
        self.client = client;
        self.connected = true;
        true
    }

    fn engine_disconnect(&mut self) {
        if !self.client.is_null() {
            unsafe {
                sys::jack_client_close(self.client);
            }
            self.client = std::ptr::null_mut();
        }
        self.connected = false;
    }

    fn engine_activate(&mut self) -> bool {
        if self.client.is_null() {
            return false;
        }
        unsafe { sys::jack_activate(self.client) == 0 }
    }

    fn engine_deactivate(&mut self) -> bool {
        if self.client.is_null() {
            return true;
        }
        unsafe { sys::jack_deactivate(self.client) == 0 }
    }

    fn initialize(&mut self, client_name: &str) -> bool {
        if !self.engine_connect(client_name) {
            return false;
        }
        self.shared = Arc::new(ProcessShared {
            io: self.io,
            port: std::sync::atomic::AtomicPtr::new(std::ptr::null_mut()),
            input_ring: if self.io == Io::Input {
                Some(Arc::new(MessageRing::new(OUTPUT_RING_CAPACITY)))
            } else {
                None
            },
            output_ring: if self.io == Io::Output {
                Some(Arc::new(MessageRing::new(OUTPUT_RING_CAPACITY)))
            } else {
                None
            },
            ignore: std::sync::atomic::AtomicU8::new(0),
            last_frame_time: AtomicU64::new(0),
            sysex_buffer: Mutex::new(Vec::new()),
        });
        unsafe {
            sys::jack_set_process_callback(
                self.client,
                Some(process_callback),
                Arc::as_ptr(&self.shared) as *mut c_void,
            );
        }
        self.engine_activate()
    }

    fn is_port_open(&self) -> bool {
        self.port_open
    }

    fn open_port(&mut self, port_number: usize, local_name: &str) -> bool {
        if self.client.is_null() || self.port_open {
            return false;
        }
        let flags = match self.io {
            Io::Input => sys::JackPortIsInput,
            Io::Output => sys::JackPortIsOutput,
        };
        let type_name = CString::new(sys::JACK_DEFAULT_MIDI_TYPE).unwrap();
        let port_name = match CString::new(local_name) {
            Ok(p) => p,
            Err(_) => return false,
        };
        let port = unsafe {
            sys::jack_port_register(
                self.client,
                port_name.as_ptr() as *const c_char,
                type_name.as_ptr() as *const c_char,
                flags as u64,
                0,
            )
        };
        if port.is_null() {
            self.report(BackendErrorKind::DriverError, "jack_port_register failed");
            return false;
        }
        self.shared.port.store(port as *mut c_void, Ordering::Release);
        self.port_name = Some(local_name.to_string());

        let mut ports = PortSet::new();
        let remote_flags = match self.io {
            Io::Input => sys::JackPortIsOutput,
            Io::Output => sys::JackPortIsInput,
        };
        let _ = self.enumerate(&mut ports, remote_flags);
        let Some(remote) = ports.get(port_number) else {
            self.report(BackendErrorKind::InvalidDevice, "port number out of range");
            return false;
        };
        let remote_name = CString::new(remote.display_name()).unwrap();
        let own_name = unsafe { sys::jack_port_name(port) };
        let rc = match self.io {
            Io::Input => unsafe { sys::jack_connect(self.client, remote_name.as_ptr(), own_name) },
            Io::Output => unsafe { sys::jack_connect(self.client, own_name, remote_name.as_ptr()) },
        };
        if rc != 0 {
            self.report(BackendErrorKind::DriverError, "jack_connect failed");
            return false;
        }
        self.port_open = true;
        true
    }

    fn open_virtual_port(&mut self, local_name: &str) -> bool {
        if self.client.is_null() || self.port_open {
            return false;
        }
        let flags = match self.io {
            Io::Input => sys::JackPortIsInput,
            Io::Output => sys::JackPortIsOutput,
        };
        let type_name = CString::new(sys::JACK_DEFAULT_MIDI_TYPE).unwrap();
        let port_name = match CString::new(local_name) {
            Ok(p) => p,
            Err(_) => return false,
        };
        let port = unsafe {
            sys::jack_port_register(
                self.client,
                port_name.as_ptr() as *const c_char,
                type_name.as_ptr() as *const c_char,
                flags as u64,
                0,
            )
        };
        if port.is_null() {
            return false;
        }
        self.shared.port.store(port as *mut c_void, Ordering::Release);
        self.port_name = Some(local_name.to_string());
        self.port_open = true;
        true
    }

    fn close_port(&mut self) {
        if !self.port_open {
            return;
        }
        let port = self.shared.port.swap(std::ptr::null_mut(), Ordering::AcqRel);
        if !port.is_null() && !self.client.is_null() {
            unsafe {
                sys::jack_port_unregister(self.client, port as *mut sys::jack_port_t);
            }
        }
        self.port_open = false;
    }

    fn get_port_count(&self) -> usize {
        let mut ports = PortSet::new();
        self.get_io_port_info(&mut ports, true).max(0) as usize
    }

    fn get_port_name(&self, index: usize) -> Option<String> {
        let mut ports = PortSet::new();
        self.get_io_port_info(&mut ports, true);
        ports.port_name(index).map(|s| s.to_string())
    }

    fn get_port_alias(&self, index: usize) -> Option<String> {
        let mut ports = PortSet::new();
        self.get_io_port_info(&mut ports, true);
        ports.alias(index).map(|s| s.to_string())
    }

    fn get_io_port_info(&self, ports: &mut PortSet, preclear: bool) -> i32 {
        if preclear {
            ports.clear();
        }
        if self.client.is_null() {
            return -1;
        }
        let flags = match self.io {
            Io::Input => sys::JackPortIsOutput,
            Io::Output => sys::JackPortIsInput,
        };
        self.enumerate(ports, flags)
    }

    fn set_client_name(&mut self, _name: &str) -> bool {
        // JACK only allows naming the client at open time.
        false
    }

    fn set_port_name(&mut self, name: &str) -> bool {
        let port = self.shared.port.load(Ordering::Acquire);
        if port.is_null() {
            return false;
        }
        let Ok(c_name) = CString::new(name) else {
            return false;
        };
        unsafe { sys::jack_port_set_name(port as *mut sys::jack_port_t, c_name.as_ptr()) == 0 }
    }

    fn send_message(&mut self, message: &Message) -> bool {
        let Some(ring) = self.shared.output_ring.as_ref() else {
            return false;
        };
        ring.push(message.clone())
    }

    fn flush_port(&mut self) -> bool {
        self.shared
            .output_ring
            .as_ref()
            .map(|r| r.peek_len() == 0)
            .unwrap_or(true)
    }

    fn ignore_midi_types(&mut self, flags: Ignore) {
        self.shared.ignore.store(flags.bits(), Ordering::Relaxed);
    }

    fn set_input_callback(&mut self, callback: Box<dyn FnMut(f64, &Message) + Send>) {
        self.callback = Some(callback);
    }

    fn cancel_input_callback(&mut self) {
        self.callback = None;
    }

    fn get_message(&mut self) -> Option<TimedMessage> {
        // Drain anything the process callback queued into the input ring
        // into the application-visible queue or direct callback first.
        if let Some(ring) = self.shared.input_ring.as_ref() {
            while let Some(message) = ring.pop() {
                let delta = message.timestamp() - self.last_message_time;
                self.last_message_time = message.timestamp();
                if let Some(cb) = self.callback.as_mut() {
                    cb(delta, &message);
                } else if let Some(q) = self.input_queue.as_mut() {
                    q.push(message);
                }
            }
        }
        self.input_queue.as_mut().and_then(InputQueue::pop).map(|m| {
            let delta = m.timestamp();
            (delta, m)
        })
    }

    fn set_error_callback(&mut self, callback: ErrorCallback) {
        self.error_callback = Some(callback);
    }

    fn report_error(&mut self, kind: BackendErrorKind, message: &str) {
        self.report(kind, message);
    }
}

/// The device's friendly name is the part of a `system:`-port's second
/// JACK alias before its first colon, hyphens standing in for the spaces
/// a `system:` alias can't carry (e.g. `"Launchpad-Mini:midi/playback_1"`
/// becomes `"Launchpad Mini"`).
fn normalize_system_alias(second_alias: &str) -> String {
    let name = second_alias.split_once(':').map(|(name, _)| name).unwrap_or(second_alias);
    name.replace('-', " ")
}

impl JackApi {
    /// Walks `jack_get_ports` for the given direction flag and fills
    /// `ports`, recovering a friendly alias for `system:` ports (hyphens
    /// normalized to spaces, matching the host's device-model naming).
    fn enumerate(&self, ports: &mut PortSet, direction_flag: u64) -> i32 {
        if self.client.is_null() {
            return -1;
        }
        let type_name = CString::new(sys::JACK_DEFAULT_MIDI_TYPE).unwrap();
        let raw = unsafe {
            sys::jack_get_ports(
                self.client,
                std::ptr::null(),
                type_name.as_ptr(),
                direction_flag,
            )
        };
        if raw.is_null() {
            return 0;
        }
        let mut count = 0i32;
        unsafe {
            let mut i = 0isize;
            loop {
                let name_ptr = *raw.offset(i);
                if name_ptr.is_null() {
                    break;
                }
                let name = std::ffi::CStr::from_ptr(name_ptr).to_string_lossy().into_owned();
                let (client_name, port_name) = name
                    .split_once(':')
                    .map(|(c, p)| (c.to_string(), p.to_string()))
                    .unwrap_or((name.clone(), name.clone()));

                let mut alias = None;
                if client_name == "system" {
                    let port = sys::jack_port_by_name(self.client, name_ptr);
                    if !port.is_null() {
                        let mut a1 = vec![0u8; 256];
                        let mut a2 = vec![0u8; 256];
                        let mut ptrs = [a1.as_mut_ptr() as *mut c_char, a2.as_mut_ptr() as *mut c_char];
                        // JACK's alsa_pcm backend reports two aliases, e.g.
                        // "alsa_pcm:Launchpad-Mini/midi_playback_1" and
                        // "Launchpad-Mini:midi/playback_1".
                        if sys::jack_port_get_aliases(port, ptrs.as_mut_ptr()) > 1 {
                            let raw_alias = std::ffi::CStr::from_ptr(ptrs[1]).to_string_lossy().into_owned();
                            alias = Some(normalize_system_alias(&raw_alias));
                        }
                    }
                }

                let io = if direction_flag == sys::JackPortIsOutput {
                    crate::ports::IoDirection::Output
                } else {
                    crate::ports::IoDirection::Input
                };
                let kind = if client_name == "system" {
                    crate::ports::PortKind::System
                } else {
                    crate::ports::PortKind::Normal
                };
                let mut desc = crate::ports::PortDescriptor::new(
                    count,
                    client_name,
                    count,
                    port_name,
                    io,
                    kind,
                );
                if let Some(a) = alias {
                    desc = desc.with_alias(a);
                }
                ports.push(desc);
                count += 1;
                i += 1;
            }
            sys::jack_free(raw as *mut c_void);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_normalization_scenario_f() {
        // The raw second alias JACK's alsa_pcm backend reports for a
        // Launchpad Mini's playback port.
        assert_eq!(normalize_system_alias("Launchpad-Mini:midi/playback_1"), "Launchpad Mini");
    }

    #[test]
    fn alias_normalization_passes_through_colonless_input() {
        assert_eq!(normalize_system_alias("no-colon-here"), "no colon here");
    }
}
