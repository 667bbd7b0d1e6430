//! [`BusArray`]: an insertion-ordered, indexable collection of [`Bus`]es,
//! one array per direction, providing fan-out operations (clock control,
//! bulk input enable) and the per-bus operations the master bus forwards.

use crate::bus::{Bus, Clocking};
use crate::event::Event;

/// An insertion-ordered sequence of [`Bus`] unique-ownership handles,
/// indexable by bus index — the same index the backend's `PortSet` and
/// `Event::input_bus` use.
#[derive(Default)]
pub struct BusArray {
    buses: Vec<Bus>,
}

impl BusArray {
    pub fn new() -> Self {
        BusArray::default()
    }

    pub fn add(&mut self, bus: Bus) {
        self.buses.push(bus);
    }

    pub fn len(&self) -> usize {
        self.buses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Bus> {
        self.buses.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Bus> {
        self.buses.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bus> {
        self.buses.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Bus> {
        self.buses.iter_mut()
    }

    /// Calls `initialize` on every bus, continuing past individual
    /// failures (a bad device doesn't block the rest from coming up).
    pub fn initialize(&mut self, client_name: &str) {
        for bus in &mut self.buses {
            if !bus.initialize(client_name) {
                log::warn!("bus {} failed to initialize", bus.index());
            }
        }
    }

    pub fn clock_start(&mut self) {
        for bus in &mut self.buses {
            bus.clock_start();
        }
    }

    pub fn clock_stop(&mut self) {
        for bus in &mut self.buses {
            bus.clock_stop();
        }
    }

    pub fn clock_continue(&mut self, tick: i64) {
        for bus in &mut self.buses {
            bus.clock_continue(tick, 0);
        }
    }

    pub fn init_clock(&mut self, tick: i64, ppqn: i32) {
        for bus in &mut self.buses {
            bus.init_clock(tick, ppqn);
        }
    }

    pub fn set_clock(&mut self, clocking: Clocking) {
        for bus in &mut self.buses {
            bus.set_clocking(clocking);
        }
    }

    pub fn set_clock_at(&mut self, index: usize, clocking: Clocking) -> bool {
        match self.buses.get_mut(index) {
            Some(bus) => {
                bus.set_clocking(clocking);
                true
            }
            None => false,
        }
    }

    /// Returns `Clocking::Unavailable` for an out-of-range index, never a
    /// missing/optional value — callers always get a clocking state back.
    pub fn get_clock(&self, index: usize) -> Clocking {
        self.buses.get(index).map(Bus::clocking).unwrap_or(Clocking::Unavailable)
    }

    pub fn send_event(&mut self, index: usize, event: &Event, channel: crate::bytes::Channel) -> bool {
        match self.buses.get_mut(index) {
            Some(bus) => bus.send_event(event, channel),
            None => false,
        }
    }

    pub fn send_sysex(&mut self, index: usize, event: &Event) -> bool {
        match self.buses.get_mut(index) {
            Some(bus) => bus.send_sysex(event),
            None => false,
        }
    }

    pub fn flush(&mut self, index: usize) -> bool {
        match self.buses.get_mut(index) {
            Some(bus) => bus.flush(),
            None => false,
        }
    }

    pub fn get_midi_bus_name(&self, index: usize) -> Option<&str> {
        self.buses.get(index).map(Bus::bus_name)
    }

    pub fn get_midi_port_name(&self, index: usize) -> Option<&str> {
        self.buses.get(index).map(Bus::port_name)
    }

    pub fn get_midi_alias(&self, index: usize) -> Option<&str> {
        self.buses.get(index).map(Bus::alias)
    }

    /// Marks every bus whose identifiers match `(client, port)` inactive —
    /// the host's device-removal notification.
    pub fn port_exit(&mut self, client: i32, port: i32) {
        for bus in &mut self.buses {
            if bus.client_id() == client && bus.port_id() == port {
                bus.set_active(false);
            }
        }
    }

    pub fn set_input(&mut self, index: usize, flag: bool) -> bool {
        match self.buses.get_mut(index) {
            Some(bus) => {
                bus.init_input(flag);
                true
            }
            None => false,
        }
    }

    pub fn set_all_inputs(&mut self, flag: bool) {
        for bus in &mut self.buses {
            bus.init_input(flag);
        }
    }

    /// `true` only if the bus is active — `init_input` already folds "is a
    /// system port" and "explicitly enabled" into that one flag.
    pub fn get_input(&self, index: usize) -> bool {
        self.buses.get(index).map(Bus::is_active).unwrap_or(false)
    }

    pub fn is_system_port(&self, index: usize) -> bool {
        self.buses.get(index).map(Bus::is_system).unwrap_or(false)
    }

    pub fn is_port_unavailable(&self, index: usize) -> bool {
        self.buses.get(index).map(|b| !b.is_active()).unwrap_or(true)
    }

    pub fn is_port_locked(&self, index: usize) -> bool {
        self.buses.get(index).map(Bus::is_locked).unwrap_or(false)
    }

    /// Polls buses in order, returning as soon as any reports a pending
    /// message.
    pub fn poll_for_midi(&mut self) -> bool {
        for bus in &mut self.buses {
            if bus.poll_for_midi() {
                return true;
            }
        }
        false
    }

    /// Likewise in order, but pops and returns the event, tagged with the
    /// bus that delivered it.
    pub fn get_midi_event(&mut self) -> Option<Event> {
        for bus in &mut self.buses {
            if let Some(event) = bus.get_midi_event() {
                return Some(event);
            }
        }
        None
    }

    /// Swaps in a replacement bus at `index`, returning the bus that was
    /// there (used when a device reappears under a new backend handle).
    pub fn replacement_port(&mut self, index: usize, bus: Bus) -> Option<Bus> {
        if index >= self.buses.len() {
            return None;
        }
        Some(std::mem::replace(&mut self.buses[index], bus))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::dummy::DummyApi;
    use crate::clientinfo::Io;

    fn make_bus(io: Io, index: usize) -> Bus {
        Bus::new(index, io, Box::new(DummyApi::new(io)), crate::clientinfo::new_shared())
    }

    #[test]
    fn get_clock_on_invalid_index_is_unavailable() {
        let arr = BusArray::new();
        assert_eq!(arr.get_clock(5), Clocking::Unavailable);
    }

    #[test]
    fn bus_array_fanout_sets_clocking_on_every_bus() {
        let mut arr = BusArray::new();
        arr.add(make_bus(Io::Output, 0));
        arr.add(make_bus(Io::Output, 1));
        arr.set_clock(Clocking::Mod);
        assert_eq!(arr.get_clock(0), Clocking::Mod);
        assert_eq!(arr.get_clock(1), Clocking::Mod);
    }

    #[test]
    fn port_exit_deactivates_matching_bus_only() {
        let mut arr = BusArray::new();
        let mut a = make_bus(Io::Input, 0);
        a.set_active(true);
        let mut b = make_bus(Io::Input, 1);
        b.set_active(true);
        arr.add(a);
        arr.add(b);
        arr.port_exit(0, 0);
        assert!(!arr.get(0).unwrap().is_active());
        assert!(arr.get(1).unwrap().is_active());
    }

    #[test]
    fn poll_for_midi_stops_at_first_hit() {
        let mut arr = BusArray::new();
        arr.add(make_bus(Io::Input, 0));
        assert!(!arr.poll_for_midi());
    }
}
