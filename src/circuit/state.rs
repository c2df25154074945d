//! Run state of a circuit: bus values and timestamps, per-element port
//! caches and private state, and the propagation loop.
//!
//! All state is owned by one [`CircuitState`], mutated from one thread,
//! never shared: the scheduling model is strictly single-threaded
//! cooperative, and the event queue is the sole coordination structure.
//! The loop runs to completion synchronously; the only termination
//! controls are the step limit and (for clocked runs) the halt predicate.

use slotmap::SecondaryMap;

use crate::bitvalue::BitValue;
use crate::circuit::graph::{net_of, BusKey, CircuitKey, ElementKey};
use crate::circuit::sched::{EventQueue, STEP_LIMIT};
use crate::circuit::CircuitForest;
use crate::element::{Component, ElementState, PortUpdate, RunContext, Signal};
use crate::error::SimError;
use crate::logging::{Level, Logger};

/// Run state of one bus.
#[derive(Debug, Clone, PartialEq)]
pub struct BusState {
    /// Current value, or null.
    pub value: Signal,
    /// Timestamp of the most recent value change; -1 when never written.
    pub last_update: i64,
}
impl Default for BusState {
    fn default() -> Self {
        Self { value: None, last_update: -1 }
    }
}

/// Run state of one element: the last-seen port values (the `old_ports` of
/// the next resolve) and the element's private state.
#[derive(Debug)]
pub(crate) struct ElementExec {
    pub(crate) ports: Vec<Signal>,
    pub(crate) state: Option<ElementState>,
    /// Dotted subsystem name for log records.
    pub(crate) name: String,
}

/// The complete run state of a circuit.
///
/// Structure lives in the [`CircuitForest`]; a state may only be used with
/// the forest it was initialized from. Subcircuit instances each own a
/// private `CircuitState` for their inner circuit while sharing the
/// structure.
#[derive(Debug)]
pub struct CircuitState {
    circuit: CircuitKey,
    subsystem: String,
    buses: SecondaryMap<BusKey, BusState>,
    elements: SecondaryMap<ElementKey, ElementExec>,
    queue: EventQueue,
    /// Monotonic counter stamping bus updates.
    stamp: i64,
    /// Current simulated time (max processed event time).
    time: u64,
    steps: u64,
    step_limit: u64,
}

impl CircuitState {
    /// Initializes run state for `circuit`, with all buses null and every
    /// element's private state freshly constructed.
    pub fn new(forest: &CircuitForest, circuit: CircuitKey, subsystem: impl Into<String>) -> Self {
        let subsystem = subsystem.into();
        let graph = &forest[circuit];

        let mut buses = SecondaryMap::new();
        for (bk, _) in graph.buses.iter() {
            buses.insert(bk, BusState::default());
        }

        let mut elements = SecondaryMap::new();
        for (i, (ek, elem)) in graph.elements.iter().enumerate() {
            let leaf = match &elem.label {
                Some(label) => label.clone(),
                None => format!("{}{i}", elem.kind.kind_name()),
            };
            elements.insert(
                ek,
                ElementExec {
                    ports: vec![None; elem.port_props.len()],
                    state: elem.kind.initialize_state(forest),
                    name: format!("{subsystem}.{leaf}"),
                },
            );
        }

        Self {
            circuit,
            subsystem,
            buses,
            elements,
            queue: EventQueue::new(),
            stamp: 0,
            time: 0,
            steps: 0,
            step_limit: STEP_LIMIT,
        }
    }

    /// The circuit this state belongs to.
    pub fn circuit(&self) -> CircuitKey {
        self.circuit
    }

    /// Current simulated time: the largest processed event time.
    pub fn time(&self) -> u64 {
        self.time
    }

    /// Scheduler steps taken since the last reset.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Overrides the default step limit.
    pub fn set_step_limit(&mut self, limit: u64) {
        self.step_limit = limit;
    }

    /// The current value of a bus.
    pub fn bus_value(&self, bus: BusKey) -> Signal {
        self.buses[bus].value.clone()
    }

    /// The timestamp of a bus's most recent value change (-1 if unset).
    pub fn bus_last_update(&self, bus: BusKey) -> i64 {
        self.buses[bus].last_update
    }

    /// The value on the bus behind an element port.
    pub fn port_value(&self, forest: &CircuitForest, element: ElementKey, index: usize) -> Signal {
        forest[self.circuit].elements[element].links[index]
            .and_then(|b| self.buses[b].value.clone())
    }

    /// A view of an element's private state.
    pub fn element_state(&self, element: ElementKey) -> Option<&ElementState> {
        self.elements.get(element).and_then(|e| e.state.as_ref())
    }

    /// Restores the as-constructed state: all buses null with unset
    /// timestamps, element state reinitialized (memories return to their
    /// loader images), counters and clocks cleared.
    pub fn reset(&mut self, forest: &CircuitForest) {
        let graph = &forest[self.circuit];
        for (bk, _) in graph.buses.iter() {
            self.buses[bk] = BusState::default();
        }
        for (ek, elem) in graph.elements.iter() {
            let exec = &mut self.elements[ek];
            exec.ports = vec![None; elem.port_props.len()];
            exec.state = elem.kind.initialize_state(forest);
        }
        self.queue.clear();
        self.stamp = 0;
        self.time = 0;
        self.steps = 0;
    }

    /// Schedules an element at the current time plus its delay.
    pub fn enqueue(&mut self, forest: &CircuitForest, element: ElementKey) {
        let at = self.time + self.delay_of(forest, element);
        self.queue.push(at, element);
    }

    /// Schedules every element except pure outputs, each at its delay.
    pub fn enqueue_all(&mut self, forest: &CircuitForest) {
        for (ek, elem) in forest[self.circuit].elements.iter() {
            if !elem.kind.is_output() {
                self.enqueue(forest, ek);
            }
        }
    }

    /// An element's scheduling delay. Subcircuits add the accumulated
    /// delay of their most recent inner resolution.
    fn delay_of(&self, forest: &CircuitForest, element: ElementKey) -> u64 {
        let base = forest[self.circuit].elements[element].delay;
        match self.elements.get(element).and_then(|e| e.state.as_ref()) {
            Some(ElementState::Subcircuit { delay, .. }) => base + delay,
            _ => base,
        }
    }

    /// Seeds an element with a value (labeled inputs, sequential Q,
    /// memory images) and schedules it.
    pub fn initialize_element(
        &mut self,
        forest: &CircuitForest,
        element: ElementKey,
        value: BitValue,
    ) -> Result<(), SimError> {
        let kind = &forest[self.circuit].elements[element].kind;
        let exec = &mut self.elements[element];
        kind.initialize_with(exec.state.as_mut(), value)?;
        self.enqueue(forest, element);
        Ok(())
    }

    /// Seeds an input-like element with a possibly-null signal and
    /// schedules it. Used by subcircuits to forward outer port values.
    pub(crate) fn seed_signal(
        &mut self,
        forest: &CircuitForest,
        element: ElementKey,
        sig: Signal,
    ) -> Result<(), SimError> {
        let width = forest[self.circuit].elements[element].port_props[0].width;
        if let Some(v) = &sig {
            if v.width() != width {
                return Err(SimError::WidthMismatch {
                    left: width,
                    right: v.width(),
                    context: "input seed".into(),
                });
            }
        }
        let exec = &mut self.elements[element];
        match &mut exec.state {
            Some(ElementState::Value(v)) => *v = sig,
            _ => return Err(SimError::BadInput("element cannot be seeded with a signal".into())),
        }
        self.enqueue(forest, element);
        Ok(())
    }

    /// Drives every clock element to `level` and schedules it.
    pub fn set_clock_level(&mut self, forest: &CircuitForest, level: bool) -> Result<(), SimError> {
        let clocks = forest[self.circuit].clocks.clone();
        for ek in clocks {
            self.initialize_element(forest, ek, BitValue::from(level))?;
        }
        Ok(())
    }

    /// Sets a bus's value under a fresh timestamp, flooding the net and
    /// scheduling attached elements.
    pub fn set_bus_value(
        &mut self,
        forest: &CircuitForest,
        bus: BusKey,
        value: Signal,
    ) -> Result<(), SimError> {
        self.stamp += 1;
        let stamp = self.stamp;
        self.apply_value(forest, bus, value, stamp)
    }

    /// Sets a bus's value under an explicit timestamp. Writes from
    /// different sources at the same timestamp are how splitter contention
    /// arises; test harnesses use this to construct that condition.
    pub fn set_bus_value_at(
        &mut self,
        forest: &CircuitForest,
        bus: BusKey,
        value: Signal,
        stamp: i64,
    ) -> Result<(), SimError> {
        self.stamp = self.stamp.max(stamp);
        self.apply_value(forest, bus, value, stamp)
    }

    /// Floods `value` over the net containing `bus` (an iterative
    /// traversal with a visited set, via [`net_of`]). Each bus that
    /// actually changes takes the stamp and schedules its input-accepting
    /// attached elements; same-value writes are suppressed.
    fn apply_value(
        &mut self,
        forest: &CircuitForest,
        start: BusKey,
        value: Signal,
        stamp: i64,
    ) -> Result<(), SimError> {
        let graph = &forest[self.circuit];
        let mut wake: Vec<ElementKey> = Vec::new();

        for bk in net_of(&graph.buses, start) {
            let bus = &graph.buses[bk];
            if let Some(v) = &value {
                if v.width() != bus.width {
                    return Err(SimError::WidthMismatch {
                        left: bus.width,
                        right: v.width(),
                        context: format!("driving a bus in {}", self.subsystem),
                    });
                }
            }
            let st = &mut self.buses[bk];
            if st.value != value {
                st.value = value.clone();
                // last_update is monotonically nondecreasing per bus.
                st.last_update = st.last_update.max(stamp);
                wake.extend(
                    bus.links
                        .iter()
                        .filter(|p| graph.elements[p.element].port_props[p.index].ty.accepts_input())
                        .map(|p| p.element),
                );
            }
        }

        for ek in wake {
            self.enqueue(forest, ek);
        }
        Ok(())
    }

    /// Drains the event queue until the circuit stabilizes, an element
    /// faults, or the step limit is exceeded.
    pub fn propagate(&mut self, forest: &CircuitForest, logger: &Logger) -> Result<(), SimError> {
        while let Some((t, ek)) = self.queue.pop() {
            self.time = self.time.max(t);
            self.steps += 1;
            if self.steps > self.step_limit {
                let err = SimError::StepLimitExceeded { limit: self.step_limit };
                logger.log(Level::Fatal, &self.subsystem, format_args!("{err}"));
                return Err(err);
            }

            let graph = &forest[self.circuit];
            let elem = &graph.elements[ek];
            let new_ports: Vec<Signal> = elem
                .links
                .iter()
                .map(|l| l.and_then(|b| self.buses[b].value.clone()))
                .collect();
            let timestamps: Vec<i64> = elem
                .links
                .iter()
                .map(|l| l.map_or(-1, |b| self.buses[b].last_update))
                .collect();

            let exec = &mut self.elements[ek];
            let old_ports = std::mem::replace(&mut exec.ports, new_ports.clone());
            logger.log(
                Level::Trace,
                &exec.name,
                format_args!("resolve at t={t} (step {})", self.steps),
            );
            let resolved = elem.kind.resolve(RunContext {
                old_ports: &old_ports,
                new_ports: &new_ports,
                timestamps: &timestamps,
                state: exec.state.as_mut(),
                forest,
                logger,
                subsystem: &exec.name,
            });
            let updates = match resolved {
                Ok(updates) => updates,
                Err(err) => {
                    logger.log(Level::Fatal, &self.subsystem, format_args!("{err}"));
                    return Err(err);
                }
            };

            for PortUpdate { index, value } in updates {
                let Some(bus) = elem.links[index] else { continue };
                self.stamp += 1;
                let stamp = self.stamp;
                if let Err(err) = self.apply_value(forest, bus, value, stamp) {
                    logger.log(Level::Fatal, &self.subsystem, format_args!("{err}"));
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Reads `len` words starting at `addr` from a memory element.
    /// Out-of-range words are null, with a warning logged.
    pub fn read_memory(
        &self,
        forest: &CircuitForest,
        logger: &Logger,
        element: ElementKey,
        addr: u64,
        len: u64,
    ) -> Result<Vec<Signal>, SimError> {
        let kind = &forest[self.circuit].elements[element].kind;
        let Some((_, capacity)) = kind.memory_geometry() else {
            return Err(SimError::BadInput("element is not a memory".into()));
        };
        let exec = &self.elements[element];
        let Some(ElementState::Memory(mem)) = &exec.state else {
            return Err(SimError::BadInput("memory state missing".into()));
        };
        Ok((0..len)
            .map(|i| {
                let a = addr + i;
                match a < capacity {
                    true => Some(mem[a as usize].clone()),
                    false => {
                        logger.log(
                            Level::Warning,
                            &exec.name,
                            format_args!("read from address {a} out of range (capacity {capacity})"),
                        );
                        None
                    }
                }
            })
            .collect())
    }

    /// Writes words starting at `addr` into a memory element, truncating
    /// or padding each to the word width. Out-of-range writes are dropped
    /// with a warning. The element is rescheduled so dependent outputs
    /// observe the new contents.
    pub fn write_memory(
        &mut self,
        forest: &CircuitForest,
        logger: &Logger,
        element: ElementKey,
        addr: u64,
        words: &[BitValue],
    ) -> Result<(), SimError> {
        let kind = &forest[self.circuit].elements[element].kind;
        let Some((width, capacity)) = kind.memory_geometry() else {
            return Err(SimError::BadInput("element is not a memory".into()));
        };
        {
            let exec = &mut self.elements[element];
            let Some(ElementState::Memory(mem)) = &mut exec.state else {
                return Err(SimError::BadInput("memory state missing".into()));
            };
            for (i, word) in words.iter().enumerate() {
                let a = addr + i as u64;
                match a < capacity {
                    true => mem[a as usize] = word.sized(width),
                    false => logger.log(
                        Level::Warning,
                        &exec.name,
                        format_args!("write to address {a} dropped (capacity {capacity})"),
                    ),
                }
            }
        }
        self.enqueue(forest, element);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits;
    use crate::circuit::{Circuit, ElementPort};
    use crate::element::Not;

    /// A forest with one circuit: three chained buses with a NOT gate
    /// reading the far end onto a fourth bus.
    fn chained() -> (CircuitForest, CircuitKey, Vec<BusKey>, BusKey) {
        let mut forest = CircuitForest::new();
        let ck = forest.add_circuit(Circuit::new("c0", "main"));
        let not = forest.add_element(ck, Not::new(1), None, 1).unwrap();
        let c = &mut forest[ck];
        let chain: Vec<BusKey> = (0..3).map(|_| c.add_bus(1)).collect();
        c.connect_buses(chain[0], chain[1]);
        c.connect_buses(chain[1], chain[2]);
        let out = c.add_bus(1);
        c.connect_one(chain[2], ElementPort { element: not, index: 0 });
        c.connect_one(out, ElementPort { element: not, index: 1 });
        (forest, ck, chain, out)
    }

    #[test]
    fn test_connected_group_converges_on_set_value() {
        let (forest, ck, chain, _) = chained();
        let mut state = CircuitState::new(&forest, ck, "t");

        state.set_bus_value(&forest, chain[0], Some(bits![1])).unwrap();
        for &bk in &chain {
            assert_eq!(state.bus_value(bk), Some(bits![1]), "Every bus in the net should take the value");
            assert_eq!(state.bus_last_update(bk), 1);
        }
    }

    #[test]
    fn test_same_value_write_is_suppressed() {
        let (forest, ck, chain, _) = chained();
        let mut state = CircuitState::new(&forest, ck, "t");

        state.set_bus_value(&forest, chain[0], Some(bits![1])).unwrap();
        let stamp = state.bus_last_update(chain[2]);
        state.set_bus_value(&forest, chain[1], Some(bits![1])).unwrap();
        assert_eq!(
            state.bus_last_update(chain[2]),
            stamp,
            "Writing the same value should not bump last_update"
        );
    }

    #[test]
    fn test_set_value_wakes_attached_element_through_net() {
        let (forest, ck, chain, out) = chained();
        let logger = Logger::new();
        let mut state = CircuitState::new(&forest, ck, "t");

        // A write at the near end reaches the NOT gate attached at the far
        // end of the net; draining the queue resolves it.
        state.set_bus_value(&forest, chain[0], Some(bits![0])).unwrap();
        state.propagate(&forest, &logger).unwrap();
        assert_eq!(state.bus_value(out), Some(bits![1]), "The gate should have resolved !0 = 1");
    }

    #[test]
    fn test_reset_clears_values_and_timestamps() {
        let (forest, ck, chain, out) = chained();
        let logger = Logger::new();
        let mut state = CircuitState::new(&forest, ck, "t");

        state.set_bus_value(&forest, chain[0], Some(bits![0])).unwrap();
        state.propagate(&forest, &logger).unwrap();

        state.reset(&forest);
        for bk in chain.into_iter().chain([out]) {
            assert_eq!(state.bus_value(bk), None);
            assert_eq!(state.bus_last_update(bk), -1, "Reset should clear timestamps to the unset sentinel");
        }
        assert_eq!(state.time(), 0);
        assert_eq!(state.steps(), 0);
    }
}
