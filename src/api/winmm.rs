//! Windows Multimedia (`winmm`) realization of [`MidiApi`], built on the
//! `windows` crate's `Win32_Media_Multimedia` bindings. Lighter-weight
//! than ALSA/JACK: WinMM predates per-message timestamping conventions
//! this runtime otherwise relies on, so delta times here are best-effort
//! (`timeGetTime`-based), matching WinMM's own advisory buffer-size
//! surface rather than a hard real-time contract.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use windows::Win32::Media::Multimedia::{
    midiInClose, midiInGetDevCapsW, midiInGetNumDevs, midiInOpen, midiInStart, midiInStop,
    midiOutClose, midiOutGetDevCapsW, midiOutGetNumDevs, midiOutOpen, midiOutShortMsg,
    HMIDIIN, HMIDIOUT, MIDIINCAPSW, MIDIOUTCAPSW,
};

use crate::clientinfo::Io;
use crate::errors::{BackendErrorKind, ErrorCallback};
use crate::message::Message;
use crate::ports::{IoDirection, PortDescriptor, PortKind, PortSet};
use crate::queue::{Ignore, InputQueue};

use super::{MidiApi, TimedMessage};

/// `CALLBACK_FUNCTION`: `dwCallback` names a callback function rather than
/// a window or thread, the only mode that lets us actually receive input.
const CALLBACK_FUNCTION: u32 = 0x0003_0000;
/// `MM_MIM_DATA`: a short (1-3 byte) message, packed into `dwParam1`.
const MIM_DATA: u32 = 0x3C3;
/// `MM_MIM_LONGDATA`: a `MIDIHDR*` buffer, used for SysEx. This
/// lighter-weight realization reports but does not reassemble these (see
/// DESIGN.md).
const MIM_LONGDATA: u32 = 0x3C6;

fn wide_to_string(buf: &[u16]) -> String {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..len])
}

/// State reachable from the `midiInOpen` callback, which Windows invokes
/// on its own thread with only a `dwInstance` integer to find its way
/// back to us by.
struct WinMmShared {
    ignore: AtomicU8,
    queue: Mutex<InputQueue>,
    callback: Mutex<Option<Box<dyn FnMut(f64, &Message) + Send>>>,
    last_time_ms: AtomicU64,
}

unsafe extern "system" fn handle_input(
    _hmi: HMIDIIN,
    wmsg: u32,
    dw_instance: usize,
    dw_param1: usize,
    dw_param2: usize,
) {
    if dw_instance == 0 {
        return;
    }
    let shared = &*(dw_instance as *const WinMmShared);

    let message = match wmsg {
        MIM_DATA => {
            let packed = dw_param1 as u32;
            let status = (packed & 0xFF) as u8;
            let len = crate::bytes::status_size(status).unwrap_or(1).clamp(1, 3);
            let raw = [status, ((packed >> 8) & 0xFF) as u8, ((packed >> 16) & 0xFF) as u8];
            let mut message = Message::new();
            if !message.set_midi_event(0.0, &raw[..len]) {
                return;
            }
            message
        }
        MIM_LONGDATA => return,
        _ => return,
    };

    let ignore = Ignore::from_bits_truncate(shared.ignore.load(Ordering::Relaxed));
    if ignore.filters(message.status()) {
        return;
    }

    let now_ms = dw_param2 as u64;
    let last = shared.last_time_ms.swap(now_ms, Ordering::Relaxed);
    let delta = if last == 0 { 0.0 } else { now_ms.saturating_sub(last) as f64 / 1000.0 };
    let mut message = message;
    message.set_timestamp(delta);

    if let Some(cb) = shared.callback.lock().unwrap().as_mut() {
        cb(delta, &message);
    } else if !shared.queue.lock().unwrap().push(message) {
        log::warn!("winmm input queue limit reached");
    }
}

pub struct WinMmApi {
    io: Io,
    in_handle: Option<HMIDIIN>,
    out_handle: Option<HMIDIOUT>,
    port_open: bool,
    shared: Arc<WinMmShared>,
    error_callback: Option<ErrorCallback>,
}

unsafe impl Send for WinMmApi {}

impl WinMmApi {
    pub fn new(io: Io) -> Self {
        WinMmApi {
            io,
            in_handle: None,
            out_handle: None,
            port_open: false,
            shared: Arc::new(WinMmShared {
                ignore: AtomicU8::new(0),
                queue: Mutex::new(InputQueue::new(1024)),
                callback: Mutex::new(None),
                last_time_ms: AtomicU64::new(0),
            }),
            error_callback: None,
        }
    }

    fn report(&mut self, kind: BackendErrorKind, msg: &str) {
        log::error!("winmm backend: {msg}");
        if let Some(cb) = self.error_callback.as_mut() {
            cb(kind, msg);
        }
    }
}

impl Drop for WinMmApi {
    fn drop(&mut self) {
        self.close_port();
    }
}

impl MidiApi for WinMmApi {
    fn io(&self) -> Io {
        self.io
    }

    fn engine_connect(&mut self, _client_name: &str) -> bool {
        true
    }

    fn engine_disconnect(&mut self) {
        self.close_port();
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
            Io::Input => unsafe {
                let mut handle = HMIDIIN::default();
                let instance = Arc::as_ptr(&self.shared) as usize;
                let rc = midiInOpen(
                    &mut handle,
                    port_number as u32,
                    Some(handle_input as usize),
                    Some(instance),
                    CALLBACK_FUNCTION,
                );
                if rc.0 != 0 {
                    self.report(BackendErrorKind::InvalidDevice, "midiInOpen failed");
                    return false;
                }
                let _ = midiInStart(handle);
                self.in_handle = Some(handle);
            },
            Io::Output => unsafe {
                let mut handle = HMIDIOUT::default();
                let rc = midiOutOpen(&mut handle, port_number as u32, None, None, 0x30000);
                if rc.0 != 0 {
                    self.report(BackendErrorKind::InvalidDevice, "midiOutOpen failed");
                    return false;
                }
                self.out_handle = Some(handle);
            },
        }
        self.port_open = true;
        true
    }

    fn open_virtual_port(&mut self, _local_name: &str) -> bool {
        // WinMM has no concept of virtual ports.
        false
    }

    fn close_port(&mut self) {
        unsafe {
            if let Some(h) = self.in_handle.take() {
                let _ = midiInStop(h);
                let _ = midiInClose(h);
            }
            if let Some(h) = self.out_handle.take() {
                let _ = midiOutClose(h);
            }
        }
        self.port_open = false;
    }

    fn get_port_count(&self) -> usize {
        match self.io {
            Io::Input => unsafe { midiInGetNumDevs() as usize },
            Io::Output => unsafe { midiOutGetNumDevs() as usize },
        }
    }

    fn get_port_name(&self, index: usize) -> Option<String> {
        match self.io {
            Io::Input => unsafe {
                let mut caps = MIDIINCAPSW::default();
                let rc = midiInGetDevCapsW(index, &mut caps, std::mem::size_of::<MIDIINCAPSW>() as u32);
                if rc.0 != 0 {
                    None
                } else {
                    Some(wide_to_string(&caps.szPname))
                }
            },
            Io::Output => unsafe {
                let mut caps = MIDIOUTCAPSW::default();
                let rc = midiOutGetDevCapsW(index, &mut caps, std::mem::size_of::<MIDIOUTCAPSW>() as u32);
                if rc.0 != 0 {
                    None
                } else {
                    Some(wide_to_string(&caps.szPname))
                }
            },
        }
    }

    fn get_port_alias(&self, _index: usize) -> Option<String> {
        None
    }

    fn get_io_port_info(&self, ports: &mut PortSet, preclear: bool) -> i32 {
        if preclear {
            ports.clear();
        }
        let count = self.get_port_count();
        let io = match self.io {
            Io::Input => IoDirection::Input,
            Io::Output => IoDirection::Output,
        };
        for i in 0..count {
            let name = self.get_port_name(i).unwrap_or_default();
            ports.push(PortDescriptor::new(0, "WinMM", i as i32, name, io, PortKind::Normal));
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
        let Some(h) = self.out_handle else { return false };
        let bytes = message.bytes();
        if bytes.is_empty() || bytes.len() > 3 {
            // SysEx/long messages need midiOutPrepareHeader + midiOutLongMsg,
            // not implemented by this lighter-weight realization.
            return false;
        }
        let mut packed = 0u32;
        for (i, &b) in bytes.iter().enumerate() {
            packed |= (b as u32) << (8 * i);
        }
        unsafe { midiOutShortMsg(h, packed).0 == 0 }
    }

    fn ignore_midi_types(&mut self, flags: Ignore) {
        self.shared.ignore.store(flags.bits(), Ordering::Relaxed);
    }

    fn set_input_callback(&mut self, callback: Box<dyn FnMut(f64, &Message) + Send>) {
        *self.shared.callback.lock().unwrap() = Some(callback);
    }

    fn cancel_input_callback(&mut self) {
        *self.shared.callback.lock().unwrap() = None;
    }

    fn get_message(&mut self) -> Option<TimedMessage> {
        let mut q = self.shared.queue.lock().unwrap();
        q.pop().map(|m| (m.timestamp(), m))
    }

    fn set_error_callback(&mut self, callback: ErrorCallback) {
        self.error_callback = Some(callback);
    }

    fn report_error(&mut self, kind: BackendErrorKind, message: &str) {
        self.report(kind, message);
    }
}
