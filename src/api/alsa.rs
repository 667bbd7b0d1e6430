//! ALSA sequencer realization of [`MidiApi`]. One duplex-capable
//! `alsa::Seq` client backs every instance; input ports spawn a dedicated
//! reader thread that blocks in `poll()` alongside a self-pipe used to
//! signal cancellation, the same discipline described for SysEx
//! reassembly and timestamping below.

use std::ffi::CString;
use std::fmt::Write as _;
use std::io::Write as _;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use alsa::seq::{
    Addr, ClientIter, EventType, MidiEvent, PortCap, PortInfo, PortIter, PortSubscribe, PortType,
    QueueTempo,
};
use alsa::{Direction, PollDescriptors, Seq};

use crate::clientinfo::Io;
use crate::errors::{BackendErrorKind, ErrorCallback};
use crate::message::Message;
use crate::ports::{IoDirection, PortDescriptor, PortKind, PortSet};
use crate::queue::{Ignore, InputQueue};

use super::{MidiApi, TimedMessage};

const READ_CAPS: PortCap = PortCap::READ.union(PortCap::SUBS_READ);
const WRITE_CAPS: PortCap = PortCap::WRITE.union(PortCap::SUBS_WRITE);
const PORT_TYPES: PortType = PortType::MIDI_GENERIC.union(PortType::APPLICATION);

/// System client 0 (`SND_SEQ_CLIENT_SYSTEM`) owns the Timer/Announce
/// ports, never real MIDI devices; every ALSA client walk skips it.
const SYSTEM_CLIENT: i32 = 0;

fn is_visible_port(p: &PortInfo, caps: PortCap) -> bool {
    p.get_client() != SYSTEM_CLIENT
        && p.get_type().intersects(PORT_TYPES)
        && !p.get_type().intersects(PortType::NO_EXPORT)
        && p.get_capability().intersects(caps)
}

fn port_count(seq: &Seq, caps: PortCap) -> usize {
    ClientIter::new(seq)
        .flat_map(|c| PortIter::new(seq, c.get_client()))
        .filter(|p| is_visible_port(p, caps))
        .count()
}

fn port_info(seq: &Seq, caps: PortCap, index: usize) -> Option<PortInfo> {
    ClientIter::new(seq)
        .flat_map(|c| PortIter::new(seq, c.get_client()))
        .filter(|p| is_visible_port(p, caps))
        .nth(index)
}

fn fill_port_set(seq: &Seq, caps: PortCap, io: IoDirection, ports: &mut PortSet) -> i32 {
    let mut count = 0;
    for client in ClientIter::new(seq) {
        for p in PortIter::new(seq, client.get_client()) {
            if !is_visible_port(&p, caps) {
                continue;
            }
            let client_name = seq
                .get_any_client_info(p.get_client())
                .and_then(|c| c.get_name().map(str::to_string))
                .unwrap_or_default();
            let mut desc = PortDescriptor::new(
                p.get_client(),
                client_name,
                p.get_port(),
                p.get_name().unwrap_or_default(),
                io,
                PortKind::Normal,
            );
            desc = desc.with_queue_id(0);
            ports.push(desc);
            count += 1;
        }
    }
    count
}

struct ReaderHandle {
    thread: JoinHandle<()>,
    trigger_send_fd: i32,
}

pub struct AlsaApi {
    io: Io,
    seq: Option<Arc<Seq>>,
    vport: i32,
    queue_id: i32,
    connected: bool,
    port_open: bool,
    ignore: Ignore,
    reader: Option<ReaderHandle>,
    input_queue: Arc<Mutex<InputQueue>>,
    callback: Arc<Mutex<Option<Box<dyn FnMut(f64, &Message) + Send>>>>,
    error_callback: Option<ErrorCallback>,
    encoder: Option<MidiEvent>,
}

impl AlsaApi {
    pub fn new(io: Io) -> Self {
        AlsaApi {
            io,
            seq: None,
            vport: -1,
            queue_id: -1,
            connected: false,
            port_open: false,
            ignore: Ignore::empty(),
            reader: None,
            input_queue: Arc::new(Mutex::new(InputQueue::new(1024))),
            callback: Arc::new(Mutex::new(None)),
            error_callback: None,
            encoder: None,
        }
    }

    fn report(&mut self, kind: BackendErrorKind, msg: &str) {
        log::error!("alsa backend: {msg}");
        if let Some(cb) = self.error_callback.as_mut() {
            cb(kind, msg);
        }
    }

    fn caps(&self) -> PortCap {
        match self.io {
            Io::Input => READ_CAPS,
            Io::Output => WRITE_CAPS,
        }
    }

    fn io_direction(&self) -> IoDirection {
        match self.io {
            Io::Input => IoDirection::Input,
            Io::Output => IoDirection::Output,
        }
    }
}

impl Drop for AlsaApi {
    fn drop(&mut self) {
        self.close_port();
        self.engine_disconnect();
    }
}

fn spawn_reader(
    seq: Arc<Seq>,
    queue_id: i32,
    ignore: Ignore,
    input_queue: Arc<Mutex<InputQueue>>,
    callback: Arc<Mutex<Option<Box<dyn FnMut(f64, &Message) + Send>>>>,
) -> Option<ReaderHandle> {
    let mut trigger_fds = [-1i32; 2];
    if unsafe { libc::pipe(trigger_fds.as_mut_ptr()) } == -1 {
        return None;
    }
    let trigger_recv = trigger_fds[0];
    let trigger_send = trigger_fds[1];

    let thread = std::thread::Builder::new()
        .name("alsa midi reader".into())
        .spawn(move || {
            let mut last_time: Option<u64> = None;
            let mut continue_sysex = false;
            let mut message = Message::new();
            let mut coder = MidiEvent::new(32).unwrap();
            coder.enable_running_status(false);
            let mut buffer = [0u8; 12];

            let mut poll_fds: Box<[libc::pollfd]>;
            {
                let desc = (&*seq, Some(Direction::Capture));
                let count = desc.count() + 1;
                let mut v = Vec::with_capacity(count);
                unsafe {
                    v.set_len(count);
                }
                poll_fds = v.into_boxed_slice();
                let _ = desc.fill(&mut poll_fds[1..]);
            }
            poll_fds[0].fd = trigger_recv;
            poll_fds[0].events = libc::POLLIN;

            let mut do_input = true;
            let mut seq_input = seq.input();
            while do_input {
                if let Ok(0) = seq_input.event_input_pending(true) {
                    let rc = unsafe {
                        libc::poll(poll_fds.as_mut_ptr(), poll_fds.len() as libc::nfds_t, -1)
                    };
                    if rc >= 0 && poll_fds[0].revents & libc::POLLIN != 0 {
                        let mut byte = 0u8;
                        let _ = unsafe {
                            libc::read(trigger_recv, &mut byte as *mut u8 as *mut _, 1)
                        };
                        do_input = false;
                    }
                    continue;
                }

                if !continue_sysex {
                    message.clear();
                }

                let mut ev = match seq_input.event_input() {
                    Ok(ev) => ev,
                    Err(e) if e.code() == -libc::ENOSPC => {
                        log::warn!("alsa midi input buffer overrun");
                        continue;
                    }
                    Err(_) => continue,
                };

                let do_decode = match ev.get_type() {
                    EventType::PortSubscribed | EventType::PortUnsubscribed => false,
                    EventType::Qframe | EventType::Tick | EventType::Clock => {
                        !ignore.contains(Ignore::TIME)
                    }
                    EventType::Sensing => !ignore.contains(Ignore::ACTIVE_SENSE),
                    EventType::Sysex => {
                        if !ignore.contains(Ignore::SYSEX) {
                            if let Ok(ext) = ev.get_ext() {
                                for &b in ext {
                                    message.push(b);
                                }
                                continue_sysex =
                                    message.bytes().last().copied() != Some(0xF7);
                            }
                        }
                        false
                    }
                    _ => true,
                };

                if do_decode {
                    if let Ok(nbytes) = coder.decode(&mut buffer, &mut ev) {
                        if nbytes > 0 {
                            for &b in &buffer[..nbytes] {
                                message.push(b);
                            }
                        }
                    }
                }

                if message.is_empty() || continue_sysex {
                    continue;
                }

                let alsa_time = match ev.get_time() {
                    Some(t) => t,
                    None => continue,
                };
                let ticks = alsa_time.as_secs() * 1_000_000 + u64::from(alsa_time.subsec_nanos()) / 1_000;
                let delta = match last_time {
                    None => 0.0,
                    Some(last) => (ticks.saturating_sub(last)) as f64 * 0.000_001,
                };
                last_time = Some(ticks);
                message.set_timestamp(delta);

                if let Some(cb) = callback.lock().unwrap().as_mut() {
                    cb(delta, &message);
                } else if !input_queue.lock().unwrap().push(message.clone()) {
                    log::warn!("alsa input queue limit reached");
                }
            }
            unsafe {
                libc::close(trigger_recv);
            }
            let _ = queue_id;
        })
        .ok()?;

    Some(ReaderHandle {
        thread,
        trigger_send_fd: trigger_send,
    })
}

impl MidiApi for AlsaApi {
    fn io(&self) -> Io {
        self.io
    }

    fn engine_connect(&mut self, client_name: &str) -> bool {
        if self.seq.is_some() {
            return true;
        }
        let dir = match self.io {
            Io::Input => None,
            Io::Output => Some(Direction::Playback),
        };
        let seq = match Seq::open(None, dir, true) {
            Ok(s) => s,
            Err(_) => {
                self.report(BackendErrorKind::DriverError, "could not open ALSA sequencer client");
                return false;
            }
        };
        if let Ok(c_name) = CString::new(client_name) {
            let _ = seq.set_client_name(&c_name);
        }
        self.seq = Some(Arc::new(seq));
        self.connected = true;
        true
    }

    fn engine_disconnect(&mut self) {
        self.seq = None;
        self.connected = false;
    }

    fn initialize(&mut self, client_name: &str) -> bool {
        if !self.engine_connect(client_name) {
            return false;
        }
        if self.io == Io::Input {
            if let Some(seq) = self.seq.as_ref() {
                let queue_name = unsafe { std::ffi::CStr::from_bytes_with_nul_unchecked(b"midibus queue\0") };
                if let Ok(qid) = seq.alloc_named_queue(queue_name) {
                    let tempo = QueueTempo::empty().unwrap();
                    tempo.set_tempo(600_000);
                    tempo.set_ppq(240);
                    let _ = seq.set_queue_tempo(qid, &tempo);
                    let _ = seq.drain_output();
                    self.queue_id = qid;
                }
            }
        }
        true
    }

    fn is_port_open(&self) -> bool {
        self.port_open
    }

    fn open_port(&mut self, port_number: usize, port_name: &str) -> bool {
        let Some(seq) = self.seq.clone() else { return false };
        if self.port_open {
            return false;
        }
        let Some(remote) = port_info(&seq, self.caps(), port_number) else {
            self.report(BackendErrorKind::InvalidDevice, "port number out of range");
            return false;
        };
        let Ok(c_name) = CString::new(port_name) else { return false };

        let local_caps = match self.io {
            Io::Input => WRITE_CAPS,
            Io::Output => READ_CAPS,
        };
        let vport = match seq.create_simple_port(&c_name, local_caps, PORT_TYPES) {
            Ok(p) => p,
            Err(_) => {
                self.report(BackendErrorKind::DriverError, "could not create ALSA port");
                return false;
            }
        };
        self.vport = vport;

        let sub = PortSubscribe::empty().unwrap();
        let own = Addr {
            client: seq.client_id().unwrap_or(-1),
            port: vport,
        };
        match self.io {
            Io::Input => {
                sub.set_sender(Addr { client: remote.get_client(), port: remote.get_port() });
                sub.set_dest(own);
            }
            Io::Output => {
                sub.set_sender(own);
                sub.set_dest(Addr { client: remote.get_client(), port: remote.get_port() });
                sub.set_time_update(true);
                sub.set_time_real(true);
            }
        }
        if seq.subscribe_port(&sub).is_err() {
            self.report(BackendErrorKind::DriverError, "could not subscribe ALSA port");
            let _ = seq.delete_port(vport);
            self.vport = -1;
            return false;
        }

        if self.io == Io::Input {
            let _ = seq.control_queue(self.queue_id, EventType::Start, 0, None);
            let _ = seq.drain_output();
            self.reader = spawn_reader(
                seq.clone(),
                self.queue_id,
                self.ignore,
                self.input_queue.clone(),
                self.callback.clone(),
            );
            if self.reader.is_none() {
                self.report(BackendErrorKind::ThreadError, "could not start ALSA reader thread");
                return false;
            }
        } else {
            self.encoder = Some(MidiEvent::new(32).unwrap());
        }

        self.port_open = true;
        true
    }

    fn open_virtual_port(&mut self, local_name: &str) -> bool {
        let Some(seq) = self.seq.clone() else { return false };
        if self.port_open {
            return false;
        }
        let Ok(c_name) = CString::new(local_name) else { return false };
        let local_caps = match self.io {
            Io::Input => WRITE_CAPS,
            Io::Output => READ_CAPS,
        };
        let vport = match seq.create_simple_port(&c_name, local_caps, PORT_TYPES) {
            Ok(p) => p,
            Err(_) => return false,
        };
        self.vport = vport;
        if self.io == Io::Input {
            let _ = seq.control_queue(self.queue_id, EventType::Start, 0, None);
            let _ = seq.drain_output();
            self.reader = spawn_reader(
                seq,
                self.queue_id,
                self.ignore,
                self.input_queue.clone(),
                self.callback.clone(),
            );
        } else {
            self.encoder = Some(MidiEvent::new(32).unwrap());
        }
        self.port_open = true;
        true
    }

    fn close_port(&mut self) {
        if !self.port_open {
            return;
        }
        if let Some(reader) = self.reader.take() {
            let _ = unsafe {
                libc::write(reader.trigger_send_fd, &0u8 as *const u8 as *const _, 1)
            };
            let _ = reader.thread.join();
            unsafe {
                libc::close(reader.trigger_send_fd);
            }
        }
        if let Some(seq) = self.seq.as_ref() {
            if self.io == Io::Input && self.queue_id >= 0 {
                let _ = seq.control_queue(self.queue_id, EventType::Stop, 0, None);
                let _ = seq.drain_output();
            }
            if self.vport >= 0 {
                let _ = seq.delete_port(self.vport);
            }
        }
        self.vport = -1;
        self.port_open = false;
    }

    fn get_port_count(&self) -> usize {
        self.seq.as_ref().map(|s| port_count(s, self.caps())).unwrap_or(0)
    }

    fn get_port_name(&self, index: usize) -> Option<String> {
        let seq = self.seq.as_ref()?;
        let p = port_info(seq, self.caps(), index)?;
        let cinfo = seq.get_any_client_info(p.get_client()).ok()?;
        let mut out = String::new();
        let _ = write!(out, "{} {}:{}", cinfo.get_name().unwrap_or(""), p.get_client(), p.get_port());
        Some(out)
    }

    fn get_port_alias(&self, _index: usize) -> Option<String> {
        None
    }

    fn get_io_port_info(&self, ports: &mut PortSet, preclear: bool) -> i32 {
        if preclear {
            ports.clear();
        }
        let Some(seq) = self.seq.as_ref() else { return -1 };
        fill_port_set(seq, self.caps(), self.io_direction(), ports)
    }

    fn set_client_name(&mut self, name: &str) -> bool {
        let Some(seq) = self.seq.as_ref() else { return false };
        let Ok(c_name) = CString::new(name) else { return false };
        seq.set_client_name(&c_name).is_ok()
    }

    fn set_port_name(&mut self, _name: &str) -> bool {
        false
    }

    fn send_message(&mut self, message: &Message) -> bool {
        let Some(seq) = self.seq.as_ref() else { return false };
        let Some(coder) = self.encoder.as_mut() else { return false };
        let bytes = message.bytes();
        if bytes.len() > coder.get_buffer_size() as usize {
            if coder.resize_buffer(bytes.len() as u32).is_err() {
                return false;
            }
        }
        let mut ev = match coder.encode(bytes) {
            Ok((_, Some(ev))) => ev,
            _ => return false,
        };
        ev.set_source(self.vport);
        ev.set_subs();
        ev.set_direct();
        if seq.event_output(&mut ev).is_err() {
            return false;
        }
        let _ = seq.drain_output();
        true
    }

    fn flush_port(&mut self) -> bool {
        self.seq.as_ref().map(|s| s.drain_output().is_ok()).unwrap_or(true)
    }

    fn ignore_midi_types(&mut self, flags: Ignore) {
        self.ignore = flags;
    }

    fn set_input_callback(&mut self, callback: Box<dyn FnMut(f64, &Message) + Send>) {
        *self.callback.lock().unwrap() = Some(callback);
    }

    fn cancel_input_callback(&mut self) {
        *self.callback.lock().unwrap() = None;
    }

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

    fn clock_start(&mut self) -> bool {
        self.send_clock_event(EventType::Start)
    }

    fn clock_send(&mut self, _tick: i64) -> bool {
        self.send_clock_event(EventType::Clock)
    }

    fn clock_stop(&mut self) -> bool {
        self.send_clock_event(EventType::Stop)
    }

    fn clock_continue(&mut self, _tick: i64, _beats: i32) -> bool {
        self.send_clock_event(EventType::Continue)
    }
}

impl AlsaApi {
    fn send_clock_event(&mut self, event_type: EventType) -> bool {
        let Some(seq) = self.seq.as_ref() else { return false };
        let mut ev = alsa::seq::Event::new(event_type, &alsa::seq::EventData::None);
        ev.set_source(self.vport);
        ev.set_subs();
        ev.set_direct();
        let ok = seq.event_output_direct(&mut ev).is_ok();
        let _ = seq.drain_output();
        ok
    }
}
