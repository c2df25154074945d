//! A serde data model for circuit descriptions, and the builder that
//! turns a description into a runnable [`Project`].
//!
//! External loaders (CircuitVerse, JLS, Logisim, Nand2Tetris — all outside
//! this crate) parse their file formats into these structs; the core
//! performs no file I/O itself. [`NetlistDoc::build`] then constructs
//! buses, joins nets, instantiates elements, runs the width-propagation
//! pass, and indexes every circuit into a project.
//!
//! Circuits may instantiate earlier circuits in the same document as
//! subcircuits; definition must precede use.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::bitvalue::BitValue;
use crate::circuit::{BusKey, Circuit};
use crate::element as el;
use crate::element::{ComponentFn, Sensitivity};
use crate::error::SimError;
use crate::project::Project;

/// A whole project description.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetlistDoc {
    /// Format version tag.
    pub version: String,
    /// Project name.
    pub name: String,
    /// All circuits, in definition order.
    pub circuits: Vec<CircuitDesc>,
}

/// One circuit description.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CircuitDesc {
    /// Stable id, unique within the document.
    pub id: String,
    /// Display name, unique within the document.
    pub name: String,
    /// Buses, keyed by document-local id.
    pub buses: Vec<BusDesc>,
    /// Pairs of bus ids joined into one net.
    #[serde(default)]
    pub connections: Vec<(String, String)>,
    /// Elements with their positional port wiring.
    pub elements: Vec<ElementDesc>,
}

/// One bus description.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BusDesc {
    /// Document-local bus id.
    pub id: String,
    /// Width in bits (may be widened by width propagation).
    pub width: u32,
}

fn default_delay() -> u64 {
    1
}

/// One element description.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementDesc {
    /// Optional label, unique within the circuit.
    #[serde(default)]
    pub label: Option<String>,
    /// Propagation delay.
    #[serde(default = "default_delay")]
    pub delay: u64,
    /// The element kind and its parameters.
    pub kind: KindDesc,
    /// Bus ids wired to the element's ports, positionally; one per port.
    pub ports: Vec<String>,
}

/// Every element kind a description can name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
#[allow(missing_docs)]
pub enum KindDesc {
    And { width: u32, inputs: u32 },
    Or { width: u32, inputs: u32 },
    Xor { width: u32, inputs: u32 },
    Nand { width: u32, inputs: u32 },
    Nor { width: u32, inputs: u32 },
    Xnor { width: u32, inputs: u32 },
    Not { width: u32 },
    Buffer { width: u32 },
    TriState { width: u32 },
    ControlledInverter { width: u32 },
    Input { width: u32 },
    Output { width: u32 },
    Constant { value: BitValue },
    Power { width: u32 },
    Ground { width: u32 },
    Extend { width: u32 },
    Splitter {
        width: u32,
        split: Vec<u32>,
        #[serde(default)]
        mappings: Option<Vec<Vec<u32>>>,
    },
    Mux { width: u32, inputs: u32 },
    Demux { width: u32, outputs: u32 },
    Decoder { selsize: u32 },
    PriorityEncoder { inputs: u32 },
    BitSelector { width: u32 },
    Adder { width: u32 },
    TwosComplement { width: u32 },
    Alu { width: u32 },
    DFlipFlop { width: u32 },
    TFlipFlop { width: u32 },
    JkFlipFlop,
    SrLatch,
    DLatch {
        width: u32,
        #[serde(default)]
        transparent: bool,
    },
    Register {
        width: u32,
        #[serde(default)]
        negedge: bool,
    },
    Counter {
        width: u32,
        #[serde(default)]
        max_value: Option<u64>,
    },
    Clock,
    Random {
        width: u32,
        #[serde(default)]
        seed: u64,
    },
    Ram {
        width: u32,
        addr_width: u32,
        #[serde(default)]
        contents: Vec<BitValue>,
    },
    Rom {
        width: u32,
        addr_width: u32,
        #[serde(default)]
        contents: Vec<BitValue>,
    },
    Subcircuit { circuit: String },
    /// Anything this engine does not know; fatal at build time.
    #[serde(other)]
    Unknown,
}

impl KindDesc {
    /// Resolves the description into a concrete element, looking
    /// subcircuit targets up in the project built so far.
    fn resolve(&self, project: &Project) -> Result<ComponentFn, SimError> {
        Ok(match self.clone() {
            KindDesc::And { width, inputs } => el::And::new(width, inputs).into(),
            KindDesc::Or { width, inputs } => el::Or::new(width, inputs).into(),
            KindDesc::Xor { width, inputs } => el::Xor::new(width, inputs).into(),
            KindDesc::Nand { width, inputs } => el::Nand::new(width, inputs).into(),
            KindDesc::Nor { width, inputs } => el::Nor::new(width, inputs).into(),
            KindDesc::Xnor { width, inputs } => el::Xnor::new(width, inputs).into(),
            KindDesc::Not { width } => el::Not::new(width).into(),
            KindDesc::Buffer { width } => el::Buffer::new(width).into(),
            KindDesc::TriState { width } => el::TriState::new(width).into(),
            KindDesc::ControlledInverter { width } => el::ControlledInverter::new(width).into(),
            KindDesc::Input { width } => el::Input::new(width).into(),
            KindDesc::Output { width } => el::Output::new(width).into(),
            KindDesc::Constant { value } => el::Constant::new(value).into(),
            KindDesc::Power { width } => el::Power::new(width).into(),
            KindDesc::Ground { width } => el::Ground::new(width).into(),
            KindDesc::Extend { width } => el::Extend::new(width).into(),
            KindDesc::Splitter { width, split, mappings } => match mappings {
                Some(mappings) => el::Splitter::mapped(width, mappings)?.into(),
                None => el::Splitter::contiguous(width, split)?.into(),
            },
            KindDesc::Mux { width, inputs } => el::Mux::new(width, inputs).into(),
            KindDesc::Demux { width, outputs } => el::Demux::new(width, outputs).into(),
            KindDesc::Decoder { selsize } => el::Decoder::new(selsize).into(),
            KindDesc::PriorityEncoder { inputs } => el::PriorityEncoder::new(inputs).into(),
            KindDesc::BitSelector { width } => el::BitSelector::new(width).into(),
            KindDesc::Adder { width } => el::Adder::new(width).into(),
            KindDesc::TwosComplement { width } => el::TwosComplement::new(width).into(),
            KindDesc::Alu { width } => el::Alu::new(width).into(),
            KindDesc::DFlipFlop { width } => el::DFlipFlop::new(width).into(),
            KindDesc::TFlipFlop { width } => el::TFlipFlop::new(width).into(),
            KindDesc::JkFlipFlop => el::JkFlipFlop::new().into(),
            KindDesc::SrLatch => el::SrLatch::new().into(),
            KindDesc::DLatch { width, transparent } => match transparent {
                true => el::DLatch::transparent(width).into(),
                false => el::DLatch::new(width).into(),
            },
            KindDesc::Register { width, negedge } => match negedge {
                true => el::Register::with_edge(width, Sensitivity::Negedge).into(),
                false => el::Register::new(width).into(),
            },
            KindDesc::Counter { width, max_value } => match max_value {
                Some(m) => el::Counter::with_max(width, m).into(),
                None => el::Counter::new(width).into(),
            },
            KindDesc::Clock => el::Clock::new().into(),
            KindDesc::Random { width, seed } => el::Random::new(width, seed).into(),
            KindDesc::Ram { width, addr_width, contents } => {
                el::Ram::with_contents(width, addr_width, contents).into()
            }
            KindDesc::Rom { width, addr_width, contents } => {
                el::Rom::new(width, addr_width, contents).into()
            }
            KindDesc::Subcircuit { circuit } => {
                let key = project.circuit_by_id(&circuit).ok_or_else(|| {
                    SimError::ParseError(format!(
                        "subcircuit target {circuit:?} is not defined before use"
                    ))
                })?;
                el::Subcircuit::new(key).into()
            }
            KindDesc::Unknown => {
                return Err(SimError::UnsupportedElement("unrecognized element type".into()))
            }
        })
    }
}

impl NetlistDoc {
    /// Builds a runnable project: buses, nets, elements, width
    /// propagation, and circuit indexes.
    pub fn build(&self) -> Result<Project, SimError> {
        let mut project = Project::new(self.name.clone());

        for desc in &self.circuits {
            let ck = project.add_circuit(Circuit::new(desc.id.clone(), desc.name.clone()))?;

            let mut bus_ids: HashMap<&str, BusKey> = HashMap::new();
            for bus in &desc.buses {
                let key = project.forest_mut()[ck].add_bus(bus.width);
                if bus_ids.insert(&bus.id, key).is_some() {
                    return Err(SimError::ParseError(format!(
                        "duplicate bus id {:?} in circuit {:?}",
                        bus.id, desc.name
                    )));
                }
            }
            let lookup = |id: &str| {
                bus_ids.get(id).copied().ok_or_else(|| {
                    SimError::ParseError(format!("unknown bus id {id:?} in circuit {:?}", desc.name))
                })
            };

            for elem in &desc.elements {
                let kind = elem.kind.resolve(&project)?;
                let key = project.forest_mut().add_element(ck, kind, elem.label.as_deref(), elem.delay)?;
                let ports = elem.ports.iter().map(|id| lookup(id)).collect::<Result<Vec<_>, _>>()?;
                project.forest_mut()[ck].connect_all(key, &ports)?;
            }

            for (a, b) in &desc.connections {
                let (a, b) = (lookup(a)?, lookup(b)?);
                project.forest_mut()[ck].connect_buses(a, b);
            }

            project.forest_mut()[ck].propagate_widths();
        }

        Ok(project)
    }
}
