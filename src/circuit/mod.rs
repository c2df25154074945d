//! Circuit structure: buses, elements, labels, and the forest that lets
//! circuits instantiate each other as subcircuits.

pub mod graph;
pub mod sched;
pub mod state;

use std::collections::HashMap;
use std::ops::{Index, IndexMut};

use slotmap::SlotMap;

pub use graph::{propagate_widths, BusKey, BusNode, CircuitKey, ElementKey, ElementNode, ElementPort};

use crate::element::{Component, ComponentFn};
use crate::error::SimError;

/// The structure of one circuit: its buses, elements and label index.
///
/// Values and timestamps live in [`state::CircuitState`]; a `Circuit` is
/// immutable during simulation, so any number of states (the client's, and
/// one per subcircuit instance) can run against it.
#[derive(Debug)]
pub struct Circuit {
    id: String,
    name: String,
    pub(crate) buses: SlotMap<BusKey, BusNode>,
    pub(crate) elements: SlotMap<ElementKey, ElementNode>,
    pub(crate) labels: HashMap<String, ElementKey>,
    /// Labeled inputs, in insertion order (positional stimulus order).
    pub(crate) inputs: Vec<ElementKey>,
    /// Labeled outputs, in insertion order.
    pub(crate) outputs: Vec<ElementKey>,
    pub(crate) clocks: Vec<ElementKey>,
    pub(crate) memories: Vec<ElementKey>,
}

impl Circuit {
    /// Creates an empty circuit with a stable id and a display name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            buses: SlotMap::with_key(),
            elements: SlotMap::with_key(),
            labels: HashMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            clocks: Vec::new(),
            memories: Vec::new(),
        }
    }

    /// The circuit's stable id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The circuit's display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creates a bus with the specified width.
    pub fn add_bus(&mut self, width: u32) -> BusKey {
        self.buses.insert(BusNode::new(width))
    }

    /// Connects a bus to an element port, replacing any previous
    /// connection of that port.
    pub fn connect_one(&mut self, bus: BusKey, port: ElementPort) {
        self.disconnect(port);
        self.elements[port.element].links[port.index].replace(bus);
        self.buses[bus].links.insert(port);
    }

    /// Disconnects an element port from its bus, if connected.
    pub fn disconnect(&mut self, port: ElementPort) {
        if let Some(old) = self.elements[port.element].links[port.index].take() {
            let removed = self.buses[old].links.remove(&port);
            debug_assert!(removed, "Port should have been attached to its assigned bus");
        }
    }

    /// Connects every port of an element positionally. The bus list must
    /// have exactly one entry per port.
    pub fn connect_all(&mut self, element: ElementKey, buses: &[BusKey]) -> Result<(), SimError> {
        let n_ports = self.elements[element].links.len();
        if buses.len() != n_ports {
            return Err(SimError::BadInput(format!(
                "element has {n_ports} ports but {} buses were supplied",
                buses.len()
            )));
        }
        for (index, &bus) in buses.iter().enumerate() {
            self.connect_one(bus, ElementPort { element, index });
        }
        Ok(())
    }

    /// Joins two buses into one net. Mutual, idempotent, and a no-op on
    /// self-connection.
    pub fn connect_buses(&mut self, a: BusKey, b: BusKey) {
        if a != b {
            self.buses[a].connections.insert(b);
            self.buses[b].connections.insert(a);
        }
    }

    /// Widens a bus before simulation; narrowing is rejected.
    pub fn set_width(&mut self, bus: BusKey, width: u32) -> Result<(), SimError> {
        graph::set_bus_width(&mut self.buses[bus], width)
    }

    /// Equalizes widths across every connected bus group to the group
    /// maximum. Loaders call this once after assembling the circuit.
    pub fn propagate_widths(&mut self) {
        graph::propagate_widths(&mut self.buses);
    }

    /// Looks up an element by label.
    pub fn labeled(&self, label: &str) -> Option<ElementKey> {
        self.labels.get(label).copied()
    }

    /// Labeled inputs in positional order.
    pub fn inputs(&self) -> &[ElementKey] {
        &self.inputs
    }

    /// Labeled outputs in positional order.
    pub fn outputs(&self) -> &[ElementKey] {
        &self.outputs
    }

    /// Clock elements.
    pub fn clocks(&self) -> &[ElementKey] {
        &self.clocks
    }

    /// Memory-bearing elements.
    pub fn memories(&self) -> &[ElementKey] {
        &self.memories
    }

    /// The labels of this circuit's inputs, in positional order.
    pub fn input_labels(&self) -> Vec<&str> {
        self.inputs.iter().filter_map(|&k| self.elements[k].label()).collect()
    }

    /// The labels of this circuit's outputs, in positional order.
    pub fn output_labels(&self) -> Vec<&str> {
        self.outputs.iter().filter_map(|&k| self.elements[k].label()).collect()
    }

    /// The labels of this circuit's memories.
    pub fn memory_labels(&self) -> Vec<&str> {
        self.memories.iter().filter_map(|&k| self.elements[k].label()).collect()
    }

    /// Registers an element node built by the forest.
    fn insert_element(&mut self, node: ElementNode) -> Result<ElementKey, SimError> {
        if let Some(label) = &node.label {
            if self.labels.contains_key(label) {
                return Err(SimError::DuplicateLabel(label.clone()));
            }
        }
        let label = node.label.clone();
        let kind_is_input = node.kind.is_input();
        let kind_is_output = node.kind.is_output();
        let kind_is_clock = node.kind.is_clock();
        let kind_is_memory = node.kind.is_memory();

        let key = self.elements.insert(node);
        if let Some(label) = label {
            self.labels.insert(label, key);
        }
        if kind_is_input {
            self.inputs.push(key);
        }
        if kind_is_output {
            self.outputs.push(key);
        }
        if kind_is_clock {
            self.clocks.push(key);
        }
        if kind_is_memory {
            self.memories.push(key);
        }
        Ok(key)
    }
}

impl Index<BusKey> for Circuit {
    type Output = BusNode;

    fn index(&self, index: BusKey) -> &Self::Output {
        &self.buses[index]
    }
}
impl Index<ElementKey> for Circuit {
    type Output = ElementNode;

    fn index(&self, index: ElementKey) -> &Self::Output {
        &self.elements[index]
    }
}

/// Every circuit structure in a project, keyed for cross-references
/// (subcircuit elements hold a [`CircuitKey`] into the forest).
#[derive(Debug, Default)]
pub struct CircuitForest {
    pub(crate) circuits: SlotMap<CircuitKey, Circuit>,
}

impl CircuitForest {
    /// An empty forest.
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a circuit, returning its key.
    pub fn add_circuit(&mut self, circuit: Circuit) -> CircuitKey {
        self.circuits.insert(circuit)
    }

    /// Iterates all circuits.
    pub fn circuits(&self) -> impl Iterator<Item = (CircuitKey, &Circuit)> {
        self.circuits.iter()
    }

    /// Adds an element to a circuit. The element's port shape is computed
    /// here because subcircuit ports derive from their inner circuit's
    /// labeled I/O, which must already be in the forest.
    pub fn add_element(
        &mut self,
        circuit: CircuitKey,
        kind: impl Into<ComponentFn>,
        label: Option<&str>,
        delay: u64,
    ) -> Result<ElementKey, SimError> {
        let kind = kind.into();
        let port_props = kind.ports(self);
        let node = ElementNode::new(kind, label.map(str::to_string), delay, port_props);
        self.circuits[circuit].insert_element(node)
    }

    /// Adds a labeled input element and a bus wired to it.
    pub fn add_input(
        &mut self,
        circuit: CircuitKey,
        label: &str,
        width: u32,
    ) -> Result<(ElementKey, BusKey), SimError> {
        let key = self.add_element(circuit, crate::element::Input::new(width), Some(label), 0)?;
        let c = &mut self.circuits[circuit];
        let bus = c.add_bus(width);
        c.connect_one(bus, ElementPort { element: key, index: 0 });
        Ok((key, bus))
    }

    /// Adds a labeled output element and a bus wired to it.
    pub fn add_output(
        &mut self,
        circuit: CircuitKey,
        label: &str,
        width: u32,
    ) -> Result<(ElementKey, BusKey), SimError> {
        let key = self.add_element(circuit, crate::element::Output::new(width), Some(label), 0)?;
        let c = &mut self.circuits[circuit];
        let bus = c.add_bus(width);
        c.connect_one(bus, ElementPort { element: key, index: 0 });
        Ok((key, bus))
    }
}

impl Index<CircuitKey> for CircuitForest {
    type Output = Circuit;

    fn index(&self, index: CircuitKey) -> &Self::Output {
        &self.circuits[index]
    }
}
impl IndexMut<CircuitKey> for CircuitForest {
    fn index_mut(&mut self, index: CircuitKey) -> &mut Self::Output {
        &mut self.circuits[index]
    }
}
