//! Digital logic elements and their simulation behavior.
//!
//! This module defines every element kind the engine can simulate (gates,
//! plexers, arithmetic, sequential storage, memories, the splitter and
//! subcircuits) together with the traits and structures used to describe
//! and run them:
//!
//! - **[`Component`]**: the behavior interface all elements implement,
//!   dispatched over the [`ComponentFn`] enum.
//! - **[`PortType`] and [`PortProperties`]**: the shape of an element's
//!   ports.
//! - **[`PortUpdate`]**: a value an element wants driven onto one of its
//!   ports after a resolve.
//! - **[`RunContext`]**: everything a resolve can see — previous and
//!   current port values, bus timestamps, private state, the circuit
//!   forest and the logger.
//!
//! A port value is a [`Signal`]: either a [`BitValue`] or null (no value /
//! high impedance). Any element observing a required null input with no
//! defined null behavior outputs null.

use enum_dispatch::enum_dispatch;

use crate::bitvalue::BitValue;
use crate::circuit::state::CircuitState;
use crate::circuit::CircuitForest;
use crate::error::SimError;
use crate::logging::{Level, Logger};

pub use arithmetic::*;
pub use gates::*;
pub use memory::*;
pub use misc::*;
pub use muxes::*;
pub use sequential::*;
pub use wiring::*;

mod arithmetic;
mod gates;
mod memory;
mod misc;
mod muxes;
mod sequential;
mod wiring;

/// The value carried by one port or bus: a bit vector, or null.
pub type Signal = Option<BitValue>;

/// Whether a signal is a known, non-zero value. Used for 1-bit controls.
pub fn is_high(sig: &Signal) -> bool {
    sig.as_ref().is_some_and(|v| !v.is_zero())
}

/// Whether a signal is a known all-zero value.
pub fn is_low(sig: &Signal) -> bool {
    sig.as_ref().is_some_and(BitValue::is_zero)
}

/// The type of ports available for a digital logic element.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Debug)]
pub enum PortType {
    /// A port which accepts incoming signals.
    Input,
    /// A port which provides outgoing signals.
    Output,
    /// A port which can accept and provide signals (splitter sides, RAM data).
    Inout,
}
impl PortType {
    /// Checks if the port type accepts input signals.
    pub fn accepts_input(self) -> bool {
        matches!(self, PortType::Input | PortType::Inout)
    }

    /// Checks if the port type provides outgoing signals.
    pub fn accepts_output(self) -> bool {
        matches!(self, PortType::Output | PortType::Inout)
    }
}

/// The properties of one port of an element.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Debug)]
pub struct PortProperties {
    /// Type of the port.
    pub ty: PortType,
    /// Width of the data the port works with, in bits.
    pub width: u32,
}

/// A value an element wants driven onto one of its ports.
///
/// Updates may only target ports whose type accepts output. Driving null
/// releases the port (high impedance).
#[derive(Debug, PartialEq, Clone)]
pub struct PortUpdate {
    /// Index of the port being updated within the element's port list.
    pub index: usize,
    /// The new value, or null.
    pub value: Signal,
}

/// The triggering conditions for elements based on a signal change.
///
/// A signal counts as high when it is a known non-zero value; null is
/// neither high nor low, so the first observation of a high clock after
/// null counts as a rising edge.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Sensitivity {
    /// Triggered on any change in a signal.
    Anyedge,
    /// Triggered on a rising edge (not-high to high).
    Posedge,
    /// Triggered on a falling edge (high to not-high).
    Negedge,
    /// Never triggered by a signal update.
    DontCare,
}
impl Sensitivity {
    /// Checks whether the change between the old and new value activates
    /// this sensitivity.
    pub fn activated(self, old: &Signal, new: &Signal) -> bool {
        match self {
            Sensitivity::Anyedge => old != new,
            Sensitivity::Posedge => !is_high(old) && is_high(new),
            Sensitivity::Negedge => is_high(old) && !is_high(new),
            Sensitivity::DontCare => false,
        }
    }

    /// Checks whether any position in the two slices activates this
    /// sensitivity.
    pub fn any_activated(self, old: &[Signal], new: &[Signal]) -> bool {
        std::iter::zip(old, new).any(|(o, n)| self.activated(o, n))
    }
}

/// The data direction a splitter last propagated in.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum SplitterOp {
    /// Wide side split out to the narrow side.
    PropOut,
    /// Narrow side merged into the wide side.
    PropIn,
    /// No propagation yet.
    #[default]
    None,
}

/// Private, mutable element state inspected and updated inside `resolve`.
#[derive(Debug)]
pub enum ElementState {
    /// A seeded value (labeled inputs).
    Value(Signal),
    /// Stored Q for flip-flops and latches.
    Latch {
        /// The stored value.
        q: Signal,
    },
    /// A counter's current count.
    Count(u64),
    /// Memory words, each exactly the element's word width.
    Memory(Vec<BitValue>),
    /// A random element's generator.
    Rng(rand::rngs::StdRng),
    /// The splitter's self-reported data direction.
    Splitter {
        /// Direction of the most recent propagation.
        last_op: SplitterOp,
    },
    /// A subcircuit instance's private inner run state.
    Subcircuit {
        /// The inner circuit's state, owned by this instance.
        state: Box<CircuitState>,
        /// Accumulated delay of the most recent inner resolution.
        delay: u64,
    },
}

/// All properties available when resolving an element.
pub struct RunContext<'a> {
    /// The port values before this update (the engine's per-element cache).
    pub old_ports: &'a [Signal],
    /// The port values after the update (fresh reads from the buses).
    pub new_ports: &'a [Signal],
    /// `last_update` of the bus behind each port; -1 when never written.
    pub timestamps: &'a [i64],
    /// The element's private state, if it declared any.
    pub state: Option<&'a mut ElementState>,
    /// Every circuit structure in the project (for subcircuits).
    pub forest: &'a CircuitForest,
    /// The logger attached to the running project.
    pub logger: &'a Logger,
    /// This element's dotted subsystem name for log records.
    pub subsystem: &'a str,
}
impl RunContext<'_> {
    /// Emits a diagnostic under this element's subsystem name.
    pub fn log(&self, level: Level, message: std::fmt::Arguments<'_>) {
        self.logger.log(level, self.subsystem, message);
    }
}

/// The interface defining how a digital logic element operates.
#[enum_dispatch]
pub trait Component {
    /// The properties of all ports of this element, in port order.
    ///
    /// Called once at attachment; the result must not change between calls.
    fn ports(&self, forest: &CircuitForest) -> Vec<PortProperties>;

    /// Initial private state, if the element carries any.
    fn initialize_state(&self, _forest: &CircuitForest) -> Option<ElementState> {
        None
    }

    /// Directly seeds the element with a value without a clock edge:
    /// labeled inputs store it, sequential elements set Q from it.
    ///
    /// Elements without seedable state reject the call.
    fn initialize_with(&self, _state: Option<&mut ElementState>, value: BitValue) -> Result<(), SimError> {
        let _ = value;
        Err(SimError::BadInput("element cannot be initialized with a value".into()))
    }

    /// Recomputes this element's outputs from its current inputs,
    /// returning the port updates to apply.
    ///
    /// Called by the propagation loop after a bus this element observes
    /// changed value. May fail fatally (splitter contention).
    fn resolve(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        self.validate_ports(ctx.forest, ctx.old_ports);
        self.validate_ports(ctx.forest, ctx.new_ports);
        self.resolve_inner(ctx)
    }

    /// Inner resolve wrapped by [`Component::resolve`] for port validation.
    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError>;

    /// Validates that known port values match the declared port widths.
    fn validate_ports(&self, forest: &CircuitForest, ports: &[Signal]) {
        if cfg!(debug_assertions) {
            let props = self.ports(forest);
            debug_assert_eq!(ports.len(), props.len(), "Expected correct number of ports");
            for (i, (sig, prop)) in ports.iter().zip(props).enumerate() {
                if let Some(v) = sig {
                    debug_assert_eq!(v.width(), prop.width, "Port {i} has incorrect bit width");
                }
            }
        }
    }
}

/// An enum that represents all supported digital logic elements.
#[enum_dispatch(Component)]
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum ComponentFn {
    // Gates
    And, Or, Xor, Nand, Nor, Xnor, Not, Buffer, TriState, ControlledInverter,
    // Wiring
    Input, Output, Constant, Power, Ground, Extend, Splitter,
    // Plexers
    Mux, Demux, Decoder, PriorityEncoder, BitSelector,
    // Arithmetic
    Adder, TwosComplement, Alu,
    // Sequential
    DFlipFlop, TFlipFlop, JkFlipFlop, SrLatch, DLatch, Register, Counter, Clock, Random,
    // Memory
    Ram, Rom,
    // Hierarchy
    Subcircuit,
}
impl ComponentFn {
    /// Whether this element is a clock source.
    pub fn is_clock(&self) -> bool {
        matches!(self, ComponentFn::Clock(_))
    }

    /// Whether this element is a labeled input.
    pub fn is_input(&self) -> bool {
        matches!(self, ComponentFn::Input(_))
    }

    /// Whether this element is a labeled output.
    pub fn is_output(&self) -> bool {
        matches!(self, ComponentFn::Output(_))
    }

    /// Whether this element carries addressable memory.
    pub fn is_memory(&self) -> bool {
        matches!(self, ComponentFn::Ram(_) | ComponentFn::Rom(_))
    }

    /// Word width and capacity, for memory elements.
    pub fn memory_geometry(&self) -> Option<(u32, u64)> {
        match self {
            ComponentFn::Ram(r) => Some((r.word_width(), r.capacity())),
            ComponentFn::Rom(r) => Some((r.word_width(), r.capacity())),
            _ => None,
        }
    }

    /// A short lowercase name for logging subsystems.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ComponentFn::And(_) => "and",
            ComponentFn::Or(_) => "or",
            ComponentFn::Xor(_) => "xor",
            ComponentFn::Nand(_) => "nand",
            ComponentFn::Nor(_) => "nor",
            ComponentFn::Xnor(_) => "xnor",
            ComponentFn::Not(_) => "not",
            ComponentFn::Buffer(_) => "buffer",
            ComponentFn::TriState(_) => "tristate",
            ComponentFn::ControlledInverter(_) => "cinverter",
            ComponentFn::Input(_) => "input",
            ComponentFn::Output(_) => "output",
            ComponentFn::Constant(_) => "constant",
            ComponentFn::Power(_) => "power",
            ComponentFn::Ground(_) => "ground",
            ComponentFn::Extend(_) => "extend",
            ComponentFn::Splitter(_) => "splitter",
            ComponentFn::Mux(_) => "mux",
            ComponentFn::Demux(_) => "demux",
            ComponentFn::Decoder(_) => "decoder",
            ComponentFn::PriorityEncoder(_) => "encoder",
            ComponentFn::BitSelector(_) => "bitselector",
            ComponentFn::Adder(_) => "adder",
            ComponentFn::TwosComplement(_) => "twoscomplement",
            ComponentFn::Alu(_) => "alu",
            ComponentFn::DFlipFlop(_) => "dff",
            ComponentFn::TFlipFlop(_) => "tff",
            ComponentFn::JkFlipFlop(_) => "jkff",
            ComponentFn::SrLatch(_) => "srlatch",
            ComponentFn::DLatch(_) => "dlatch",
            ComponentFn::Register(_) => "register",
            ComponentFn::Counter(_) => "counter",
            ComponentFn::Clock(_) => "clock",
            ComponentFn::Random(_) => "random",
            ComponentFn::Ram(_) => "ram",
            ComponentFn::Rom(_) => "rom",
            ComponentFn::Subcircuit(_) => "subcircuit",
        }
    }
}

/// Helper to define port lists (for [`Component::ports`]).
fn port_list(config: &[(PortProperties, u32)]) -> Vec<PortProperties> {
    config
        .iter()
        .flat_map(|&(props, ct)| std::iter::repeat(props).take(ct as usize))
        .collect()
}

/// Test helper which initializes all the ports an element should have,
/// setting them all to null.
#[cfg(test)]
fn null_ports(properties: &[PortProperties]) -> Vec<Signal> {
    properties.iter().map(|_| None).collect()
}

/// Test helper running an element against explicit old/new port values
/// with no state, forest, or timestamps.
#[cfg(test)]
pub(crate) mod harness {
    use super::*;

    pub fn run_stateless(
        c: &impl Component,
        old: &[Signal],
        new: &[Signal],
    ) -> Result<Vec<PortUpdate>, SimError> {
        run_with_state(c, old, new, None)
    }

    pub fn run_with_state(
        c: &impl Component,
        old: &[Signal],
        new: &[Signal],
        state: Option<&mut ElementState>,
    ) -> Result<Vec<PortUpdate>, SimError> {
        let forest = CircuitForest::default();
        let logger = Logger::new();
        let timestamps = vec![-1; new.len()];
        c.resolve(RunContext {
            old_ports: old,
            new_ports: new,
            timestamps: &timestamps,
            state,
            forest: &forest,
            logger: &logger,
            subsystem: "test",
        })
    }
}
