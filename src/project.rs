//! A project: a collection of circuits and their persistent run state.
//!
//! Loaders produce a [`Project`] by assembling circuits into its forest;
//! clients then address circuits by stable id or display name and drive
//! them through [`Project::run`]. Each circuit's run state (bus values,
//! memory contents) persists across calls on the same project, so a
//! memory written through [`Project::write_memory`] is visible to later
//! runs until a stimulus-bearing run resets the circuit.

use std::collections::HashMap;

use slotmap::SecondaryMap;

use crate::bitvalue::BitValue;
use crate::circuit::state::CircuitState;
use crate::circuit::{Circuit, CircuitForest, CircuitKey};
use crate::element::Signal;
use crate::error::SimError;
use crate::logging::Logger;

/// Input values for a run: keyed by label, positional over the circuit's
/// labeled inputs, or absent (continue from the current state).
#[derive(Debug, Clone, Default)]
pub enum Stimulus {
    /// Continue from the current state without reseeding.
    #[default]
    None,
    /// Label → value pairs.
    Named(Vec<(String, BitValue)>),
    /// One value per labeled input, in positional order.
    Positional(Vec<BitValue>),
}
impl Stimulus {
    /// Builds a named stimulus from label/value pairs.
    pub fn named<K: Into<String>>(pairs: impl IntoIterator<Item = (K, BitValue)>) -> Self {
        Stimulus::Named(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Builds a positional stimulus.
    pub fn positional(values: impl IntoIterator<Item = BitValue>) -> Self {
        Stimulus::Positional(values.into_iter().collect())
    }
}

/// Output values of a run, shaped like the stimulus that produced them.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Label → value, for named or absent stimulus.
    Named(HashMap<String, Signal>),
    /// One value per labeled output, in positional order.
    Positional(Vec<Signal>),
}
impl Response {
    /// Looks up an output by label (named responses only).
    pub fn get(&self, label: &str) -> Option<&Signal> {
        match self {
            Response::Named(map) => map.get(label),
            Response::Positional(_) => None,
        }
    }
}

/// The result of one [`Project::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Output values, shaped like the stimulus.
    pub outputs: Response,
    /// Total propagation delay: the simulated time at stability.
    pub propagation_delay: u64,
    /// Scheduler steps taken.
    pub steps: u64,
    /// Full clock cycles completed (0 for unclocked circuits).
    pub cycles: u64,
}

/// A collection of circuits, indexed by stable id and by name, together
/// with their persistent run state and the attached logger.
#[derive(Debug, Default)]
pub struct Project {
    name: String,
    forest: CircuitForest,
    by_id: HashMap<String, CircuitKey>,
    by_name: HashMap<String, CircuitKey>,
    states: SecondaryMap<CircuitKey, CircuitState>,
    logger: Logger,
}

impl Project {
    /// An empty project.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    /// The project's name (the root of all logging subsystem names).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The attached logger.
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Mutable access to the attached logger (level, filter, sinks).
    pub fn logger_mut(&mut self) -> &mut Logger {
        &mut self.logger
    }

    /// The circuit forest, for loaders assembling structure.
    pub fn forest(&self) -> &CircuitForest {
        &self.forest
    }

    /// Mutable access to the forest, for loaders.
    pub fn forest_mut(&mut self) -> &mut CircuitForest {
        &mut self.forest
    }

    /// Registers a circuit under its id and name. Ids must be unique;
    /// names must be unique.
    pub fn add_circuit(&mut self, circuit: Circuit) -> Result<CircuitKey, SimError> {
        if self.by_id.contains_key(circuit.id()) {
            return Err(SimError::ParseError(format!("duplicate circuit id {:?}", circuit.id())));
        }
        if self.by_name.contains_key(circuit.name()) {
            return Err(SimError::ParseError(format!("duplicate circuit name {:?}", circuit.name())));
        }
        let id = circuit.id().to_string();
        let name = circuit.name().to_string();
        let key = self.forest.add_circuit(circuit);
        self.by_id.insert(id, key);
        self.by_name.insert(name, key);
        Ok(key)
    }

    /// Looks up a circuit by stable id.
    pub fn circuit_by_id(&self, id: &str) -> Option<CircuitKey> {
        self.by_id.get(id).copied()
    }

    /// Looks up a circuit by display name.
    pub fn circuit_by_name(&self, name: &str) -> Option<CircuitKey> {
        self.by_name.get(name).copied()
    }

    /// Iterates every circuit in the project.
    pub fn circuits(&self) -> impl Iterator<Item = (CircuitKey, &Circuit)> {
        self.forest.circuits()
    }

    /// The structure of one circuit.
    pub fn circuit(&self, key: CircuitKey) -> &Circuit {
        &self.forest[key]
    }

    /// Overrides the scheduler step limit for one circuit.
    pub fn set_step_limit(&mut self, key: CircuitKey, limit: u64) {
        self.ensure_state(key);
        self.states[key].set_step_limit(limit);
    }

    fn ensure_state(&mut self, key: CircuitKey) {
        if self.states.get(key).is_none() {
            let subsystem = format!("{}.{}", self.name, self.forest[key].name());
            self.states.insert(key, CircuitState::new(&self.forest, key, subsystem));
        }
    }

    /// Runs a circuit to stability and returns its outputs.
    ///
    /// A stimulus-bearing run resets every element first, seeds the
    /// labeled inputs, then drains the event queue. Circuits containing a
    /// clock run the clocked outer loop instead: the clock toggles, the
    /// queue drains, and `halt(clock_high, cycles)` decides when to stop —
    /// omitting the predicate on a clocked circuit is an error, since the
    /// loop would never terminate.
    pub fn run(
        &mut self,
        key: CircuitKey,
        stimulus: Stimulus,
        halt: Option<&mut dyn FnMut(bool, u64) -> bool>,
    ) -> Result<RunReport, SimError> {
        self.ensure_state(key);
        let forest = &self.forest;
        let logger = &self.logger;
        let circuit = &forest[key];
        let state = &mut self.states[key];

        match &stimulus {
            Stimulus::None => {}
            Stimulus::Named(pairs) => {
                state.reset(forest);
                for (label, value) in pairs {
                    let element = circuit
                        .labeled(label)
                        .filter(|k| circuit[*k].kind().is_input())
                        .ok_or_else(|| {
                            SimError::BadInput(format!("no labeled input {label:?} in {}", circuit.name()))
                        })?;
                    state.initialize_element(forest, element, value.clone())?;
                }
            }
            Stimulus::Positional(values) => {
                state.reset(forest);
                if values.len() != circuit.inputs().len() {
                    return Err(SimError::BadInput(format!(
                        "{} inputs supplied but {} has {} labeled inputs",
                        values.len(),
                        circuit.name(),
                        circuit.inputs().len()
                    )));
                }
                for (&element, value) in circuit.inputs().iter().zip(values) {
                    state.initialize_element(forest, element, value.clone())?;
                }
            }
        }

        state.enqueue_all(forest);

        let mut cycles = 0u64;
        if circuit.clocks().is_empty() {
            state.propagate(forest, logger)?;
        } else {
            let Some(halt) = halt else {
                return Err(SimError::BadInput(format!(
                    "{} contains a clock; a halt predicate is required",
                    circuit.name()
                )));
            };
            loop {
                state.set_clock_level(forest, true)?;
                state.propagate(forest, logger)?;
                if halt(true, cycles) {
                    break;
                }
                state.set_clock_level(forest, false)?;
                state.propagate(forest, logger)?;
                cycles += 1;
                if halt(false, cycles) {
                    break;
                }
            }
        }

        let outputs = match &stimulus {
            Stimulus::Positional(_) => Response::Positional(
                circuit.outputs().iter().map(|&k| state.port_value(forest, k, 0)).collect(),
            ),
            _ => Response::Named(
                circuit
                    .outputs()
                    .iter()
                    .filter_map(|&k| {
                        circuit[k]
                            .label()
                            .map(|l| (l.to_string(), state.port_value(forest, k, 0)))
                    })
                    .collect(),
            ),
        };

        Ok(RunReport {
            outputs,
            propagation_delay: state.time(),
            steps: state.steps(),
            cycles,
        })
    }

    /// Direct access to one circuit's run state (test harnesses).
    pub fn state_mut(&mut self, key: CircuitKey) -> &mut CircuitState {
        self.ensure_state(key);
        &mut self.states[key]
    }

    /// Seeds a labeled element with a value without resetting the circuit:
    /// inputs take the value as their driven level, sequential elements
    /// set Q, memories load an image. The element is scheduled; call
    /// [`Project::settle`] to propagate.
    pub fn seed(
        &mut self,
        key: CircuitKey,
        label: &str,
        value: BitValue,
    ) -> Result<(), SimError> {
        self.ensure_state(key);
        let circuit = &self.forest[key];
        let element = circuit
            .labeled(label)
            .ok_or_else(|| SimError::BadInput(format!("no element labeled {label:?}")))?;
        self.states[key].initialize_element(&self.forest, element, value)
    }

    /// Drains the event queue without resetting or reseeding anything.
    pub fn settle(&mut self, key: CircuitKey) -> Result<(), SimError> {
        self.ensure_state(key);
        self.states[key].propagate(&self.forest, &self.logger)
    }

    /// The value currently on a labeled output.
    pub fn output_value(&mut self, key: CircuitKey, label: &str) -> Result<Signal, SimError> {
        self.ensure_state(key);
        let circuit = &self.forest[key];
        let element = circuit
            .labeled(label)
            .filter(|k| circuit[*k].kind().is_output())
            .ok_or_else(|| SimError::BadInput(format!("no labeled output {label:?}")))?;
        Ok(self.states[key].port_value(&self.forest, element, 0))
    }

    /// Drives a bus to a value under a fresh timestamp, flooding its net
    /// and scheduling attached elements. Harness-side stimulus for buses
    /// that have no labeled input.
    pub fn set_bus_value(
        &mut self,
        key: CircuitKey,
        bus: crate::circuit::BusKey,
        value: Signal,
    ) -> Result<(), SimError> {
        self.ensure_state(key);
        self.states[key].set_bus_value(&self.forest, bus, value)
    }

    /// Drives a bus to a value under an explicit timestamp. Equal-stamp
    /// writes on a splitter's two sides are how contention is provoked.
    pub fn set_bus_value_at(
        &mut self,
        key: CircuitKey,
        bus: crate::circuit::BusKey,
        value: Signal,
        stamp: i64,
    ) -> Result<(), SimError> {
        self.ensure_state(key);
        self.states[key].set_bus_value_at(&self.forest, bus, value, stamp)
    }

    /// Reads `len` words from a labeled memory element. Addressing past
    /// the capacity entirely is an error; a read overrunning the end
    /// yields null words with a warning.
    pub fn read_memory(
        &mut self,
        key: CircuitKey,
        name: &str,
        addr: u64,
        len: u64,
    ) -> Result<Vec<Signal>, SimError> {
        self.ensure_state(key);
        let circuit = &self.forest[key];
        let element = circuit
            .labeled(name)
            .filter(|k| circuit[*k].kind().is_memory())
            .ok_or_else(|| SimError::BadInput(format!("no memory named {name:?}")))?;
        let (_, capacity) = circuit[element].kind().memory_geometry().unwrap_or((0, 0));
        if addr >= capacity {
            return Err(SimError::MemoryOutOfRange {
                element: name.to_string(),
                address: addr,
                capacity,
            });
        }
        self.states[key].read_memory(&self.forest, &self.logger, element, addr, len)
    }

    /// Writes words into a labeled memory element, starting at `addr`.
    /// Addressing past the capacity entirely is an error; overrunning
    /// words are dropped with a warning.
    pub fn write_memory(
        &mut self,
        key: CircuitKey,
        name: &str,
        addr: u64,
        words: &[BitValue],
    ) -> Result<(), SimError> {
        self.ensure_state(key);
        let circuit = &self.forest[key];
        let element = circuit
            .labeled(name)
            .filter(|k| circuit[*k].kind().is_memory())
            .ok_or_else(|| SimError::BadInput(format!("no memory named {name:?}")))?;
        let (_, capacity) = circuit[element].kind().memory_geometry().unwrap_or((0, 0));
        if addr >= capacity {
            return Err(SimError::MemoryOutOfRange {
                element: name.to_string(),
                address: addr,
                capacity,
            });
        }
        self.states[key].write_memory(&self.forest, &self.logger, element, addr, words)
    }
}
