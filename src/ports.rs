//! Port enumeration and identity: [`PortDescriptor`] and the
//! insertion-ordered [`PortSet`] that backends populate and the bus layer
//! indexes into.

/// Which direction a port moves data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoDirection {
    Input,
    Output,
    Duplex,
    /// The client's own engine/announce connection, not a musical port.
    Engine,
}

/// What kind of endpoint a port is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    /// A normal, backend-enumerated port.
    Normal,
    /// A virtual port created by us, connectable by others.
    Manual,
    /// An announce/timer-like port the backend reserves.
    System,
}

/// Identity record for a single port, as enumerated by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortDescriptor {
    pub client_id: i32,
    pub client_name: String,
    pub port_id: i32,
    pub port_name: String,
    pub io: IoDirection,
    pub kind: PortKind,
    pub queue_id: Option<i32>,
    pub alias: Option<String>,
}

impl PortDescriptor {
    pub fn new(
        client_id: i32,
        client_name: impl Into<String>,
        port_id: i32,
        port_name: impl Into<String>,
        io: IoDirection,
        kind: PortKind,
    ) -> Self {
        PortDescriptor {
            client_id,
            client_name: client_name.into(),
            port_id,
            port_name: port_name.into(),
            io,
            kind,
            queue_id: None,
            alias: None,
        }
    }

    pub fn with_queue_id(mut self, queue_id: i32) -> Self {
        self.queue_id = Some(queue_id);
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn is_virtual(&self) -> bool {
        self.kind == PortKind::Manual
    }

    pub fn is_system(&self) -> bool {
        self.kind == PortKind::System
    }

    /// A display name combining client and port name, e.g. `"Client:Port"`.
    pub fn display_name(&self) -> String {
        format!("{}:{}", self.client_name, self.port_name)
    }
}

/// An insertion-ordered sequence of [`PortDescriptor`]s. The vector index
/// is the stable identity the application uses to refer to a port (the
/// "bus index" of the spec's data model).
#[derive(Debug, Clone, Default)]
pub struct PortSet {
    ports: Vec<PortDescriptor>,
}

impl PortSet {
    pub fn new() -> Self {
        PortSet::default()
    }

    pub fn clear(&mut self) {
        self.ports.clear();
    }

    pub fn push(&mut self, port: PortDescriptor) {
        self.ports.push(port);
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PortDescriptor> {
        self.ports.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PortDescriptor> {
        self.ports.iter()
    }

    pub fn bus_id(&self, index: usize) -> Option<i32> {
        self.get(index).map(|p| p.client_id)
    }

    pub fn port_id(&self, index: usize) -> Option<i32> {
        self.get(index).map(|p| p.port_id)
    }

    pub fn bus_name(&self, index: usize) -> Option<&str> {
        self.get(index).map(|p| p.client_name.as_str())
    }

    pub fn port_name(&self, index: usize) -> Option<&str> {
        self.get(index).map(|p| p.port_name.as_str())
    }

    pub fn alias(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(|p| p.alias.as_deref())
    }

    pub fn is_virtual(&self, index: usize) -> bool {
        self.get(index).map(PortDescriptor::is_virtual).unwrap_or(false)
    }

    pub fn is_system(&self, index: usize) -> bool {
        self.get(index).map(PortDescriptor::is_system).unwrap_or(false)
    }

    /// `(client_id, port_id)` pairs, used to test enumeration stability
    /// between two successive scans with no host changes.
    pub fn identity_pairs(&self) -> Vec<(i32, i32)> {
        self.ports.iter().map(|p| (p.client_id, p.port_id)).collect()
    }
}

impl<'a> IntoIterator for &'a PortSet {
    type Item = &'a PortDescriptor;
    type IntoIter = std::slice::Iter<'a, PortDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.ports.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PortSet {
        let mut set = PortSet::new();
        set.push(PortDescriptor::new(128, "Synth", 0, "Synth In", IoDirection::Input, PortKind::Normal));
        set.push(
            PortDescriptor::new(129, "Launchpad", 0, "Launchpad Out", IoDirection::Output, PortKind::Normal)
                .with_alias("Launchpad Mini"),
        );
        set
    }

    #[test]
    fn port_set_identity_is_stable_across_scans() {
        let a = sample();
        let b = sample();
        assert_eq!(a.identity_pairs(), b.identity_pairs());
    }

    #[test]
    fn alias_is_retrievable_once_attached_to_a_descriptor() {
        // Alias normalization itself (JACK's hyphen/colon recovery) is
        // exercised at the backend that derives it; this only covers
        // `PortSet` storing and returning whatever alias it was given.
        let set = sample();
        assert_eq!(set.alias(1), Some("Launchpad Mini"));
        assert_eq!(set.alias(0), None);
    }
}
