//! Types describing the structure of a circuit.
//!
//! This module notably includes:
//! - [`BusNode`]: nodes which represent wires (buses)
//! - [`ElementNode`]: nodes which represent elements
//! - [`propagate_widths`]: the pre-simulation width-equalization pass
//!
//! Structure is kept apart from run state (values, timestamps, queues);
//! see [`CircuitState`](crate::circuit::state::CircuitState). This is what
//! lets subcircuit instances share one immutable structure while each owns
//! a private state.

use std::collections::HashSet;

use petgraph::prelude::UnGraphMap;
use petgraph::visit::{Bfs, Walker};
use slotmap::new_key_type;

use crate::element::{ComponentFn, PortProperties};
use crate::error::SimError;

new_key_type! {
    /// Key type for buses within a circuit.
    pub struct BusKey;
    /// Key type for elements within a circuit.
    pub struct ElementKey;
    /// Key type for circuits within a project.
    pub struct CircuitKey;
}

/// A struct which identifies a port (from its element and port index).
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Debug)]
pub struct ElementPort {
    /// The element this port belongs to.
    pub element: ElementKey,
    /// The port's index on the element.
    pub index: usize,
}

/// A node which represents a bus (a wire carrying one value).
///
/// Buses connect to element ports, and to sibling buses sharing the same
/// logical net; value and width propagation traverse the sibling graph.
#[derive(Debug)]
pub struct BusNode {
    /// The bus width in bits. Loaders may widen this before simulation.
    pub(crate) width: u32,
    /// Ports this bus is attached to.
    pub(crate) links: HashSet<ElementPort>,
    /// Sibling buses on the same net (direct connections only).
    pub(crate) connections: HashSet<BusKey>,
}
impl BusNode {
    /// Creates a new bus with the given width.
    pub fn new(width: u32) -> Self {
        Self { width: width.max(1), links: HashSet::new(), connections: HashSet::new() }
    }

    /// The bus width in bits.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// The ports attached to this bus.
    pub fn links(&self) -> &HashSet<ElementPort> {
        &self.links
    }

    /// The directly connected sibling buses.
    pub fn connections(&self) -> &HashSet<BusKey> {
        &self.connections
    }
}

/// A node which represents an element.
///
/// The envelope carries everything shared across element kinds: the
/// behavior discriminant, the optional unique label, the propagation
/// delay, and the port-to-bus links.
#[derive(Debug)]
pub struct ElementNode {
    /// The element's behavior.
    pub(crate) kind: ComponentFn,
    /// Optional label, unique within the circuit.
    pub(crate) label: Option<String>,
    /// Propagation delay added when this element is scheduled.
    pub(crate) delay: u64,
    /// The properties of this element's ports.
    pub(crate) port_props: Vec<PortProperties>,
    /// Bus each port is connected to (if connected).
    pub(crate) links: Vec<Option<BusKey>>,
}
impl ElementNode {
    /// Creates a new element node; `port_props` must come from the kind's
    /// [`Component::ports`](crate::element::Component::ports).
    pub(crate) fn new(
        kind: ComponentFn,
        label: Option<String>,
        delay: u64,
        port_props: Vec<PortProperties>,
    ) -> Self {
        let links = vec![None; port_props.len()];
        Self { kind, label, delay, port_props, links }
    }

    /// The element's behavior.
    pub fn kind(&self) -> &ComponentFn {
        &self.kind
    }

    /// The element's label, if any.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The element's propagation delay.
    pub fn delay(&self) -> u64 {
        self.delay
    }

    /// The properties of this element's ports.
    pub fn port_props(&self) -> &[PortProperties] {
        &self.port_props
    }

    /// The bus behind each port.
    pub fn links(&self) -> &[Option<BusKey>] {
        &self.links
    }
}

/// Collects the transitively connected net containing `start`, using an
/// iterative worklist with a visited set (bus meshes can be long chains).
pub(crate) fn net_of(
    buses: &slotmap::SlotMap<BusKey, BusNode>,
    start: BusKey,
) -> HashSet<BusKey> {
    let mut visited = HashSet::new();
    let mut worklist = vec![start];
    while let Some(key) = worklist.pop() {
        if visited.insert(key) {
            worklist.extend(buses[key].connections.iter().copied().filter(|k| !visited.contains(k)));
        }
    }
    visited
}

/// Equalizes widths across every connected bus group: each group is set to
/// the maximum width observed in it. Loaders call this once after
/// assembling a circuit, before any simulation.
pub fn propagate_widths(buses: &mut slotmap::SlotMap<BusKey, BusNode>) {
    let mut mesh: UnGraphMap<BusKey, ()> = UnGraphMap::new();
    for (key, bus) in buses.iter() {
        mesh.add_node(key);
        for &sibling in &bus.connections {
            mesh.add_edge(key, sibling, ());
        }
    }

    let mut seen: HashSet<BusKey> = HashSet::new();
    let mut components: Vec<Vec<BusKey>> = Vec::new();
    for start in mesh.nodes() {
        if seen.contains(&start) {
            continue;
        }
        let group: Vec<BusKey> = Bfs::new(&mesh, start).iter(&mesh).collect();
        seen.extend(group.iter().copied());
        components.push(group);
    }

    for group in components {
        let max_width = group.iter().map(|&k| buses[k].width).max().unwrap_or(1);
        for key in group {
            buses[key].width = max_width;
        }
    }
}

/// Widens a bus; narrowing is rejected. Only legal before simulation.
pub(crate) fn set_bus_width(bus: &mut BusNode, width: u32) -> Result<(), SimError> {
    if width < bus.width {
        return Err(SimError::WidthMismatch {
            left: bus.width,
            right: width,
            context: "bus widths may only widen before simulation".into(),
        });
    }
    bus.width = width;
    Ok(())
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;

    fn connect(buses: &mut SlotMap<BusKey, BusNode>, a: BusKey, b: BusKey) {
        if a != b {
            buses[a].connections.insert(b);
            buses[b].connections.insert(a);
        }
    }

    #[test]
    fn test_width_propagation_per_component() {
        let mut buses: SlotMap<BusKey, BusNode> = SlotMap::with_key();
        let a = buses.insert(BusNode::new(1));
        let b = buses.insert(BusNode::new(4));
        let c = buses.insert(BusNode::new(2));
        let lone = buses.insert(BusNode::new(8));
        connect(&mut buses, a, b);
        connect(&mut buses, b, c);

        propagate_widths(&mut buses);

        assert_eq!(buses[a].width, 4, "Every bus in a group should take the maximum width");
        assert_eq!(buses[b].width, 4);
        assert_eq!(buses[c].width, 4);
        assert_eq!(buses[lone].width, 8, "Isolated buses keep their width");
    }

    #[test]
    fn test_net_traversal_covers_chain() {
        let mut buses: SlotMap<BusKey, BusNode> = SlotMap::with_key();
        let keys: Vec<_> = (0..10).map(|_| buses.insert(BusNode::new(1))).collect();
        for pair in keys.windows(2) {
            connect(&mut buses, pair[0], pair[1]);
        }
        let other = buses.insert(BusNode::new(1));

        let net = net_of(&buses, keys[0]);
        assert_eq!(net.len(), 10, "The whole chain should be one net");
        assert!(!net.contains(&other));
    }

    #[test]
    fn test_set_bus_width_rejects_narrowing() {
        let mut bus = BusNode::new(4);
        assert!(set_bus_width(&mut bus, 8).is_ok());
        assert_eq!(bus.width, 8);
        assert!(set_bus_width(&mut bus, 2).is_err(), "Narrowing a bus must be rejected");
    }
}
