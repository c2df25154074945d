use crate::circuit::state::CircuitState;
use crate::circuit::{CircuitForest, CircuitKey};
use crate::element::{Component, ElementState, PortProperties, PortType, PortUpdate, RunContext};
use crate::error::SimError;

/// A subcircuit: an element wrapping another circuit in the forest.
///
/// The element's input ports map positionally to the inner circuit's
/// labeled inputs, and its output ports to the inner labeled outputs. Each
/// instance owns a private [`CircuitState`] for the inner circuit, so two
/// instances of the same circuit never share storage. A resolve seeds the
/// inner inputs from the outer port values, runs the inner propagation
/// loop to stability, and forwards the inner outputs; the element's
/// scheduling delay grows by the inner resolution's accumulated delay.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Subcircuit {
    circuit: CircuitKey,
}
impl Subcircuit {
    /// Creates a subcircuit instantiating `circuit`.
    pub fn new(circuit: CircuitKey) -> Self {
        Self { circuit }
    }

    /// The inner circuit.
    pub fn circuit(&self) -> CircuitKey {
        self.circuit
    }
}
impl Component for Subcircuit {
    fn ports(&self, forest: &CircuitForest) -> Vec<PortProperties> {
        let inner = &forest[self.circuit];
        let port_of = |key: crate::circuit::ElementKey, ty: PortType| PortProperties {
            ty,
            width: inner[key].port_props()[0].width,
        };
        inner
            .inputs()
            .iter()
            .map(|&k| port_of(k, PortType::Input))
            .chain(inner.outputs().iter().map(|&k| port_of(k, PortType::Output)))
            .collect()
    }

    fn initialize_state(&self, forest: &CircuitForest) -> Option<ElementState> {
        let name = forest[self.circuit].name().to_string();
        let mut state = CircuitState::new(forest, self.circuit, name);
        // Everything inside needs a first resolution (constants, gates with
        // seeded defaults) before the instance forwards outputs.
        state.enqueue_all(forest);
        Some(ElementState::Subcircuit { state: Box::new(state), delay: 0 })
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        let Some(ElementState::Subcircuit { state, delay }) = ctx.state else {
            return Err(SimError::BadInput("subcircuit state missing".into()));
        };
        let inner = &ctx.forest[self.circuit];
        let n_in = inner.inputs().len();

        let before = state.time();
        for (i, &ek) in inner.inputs().iter().enumerate() {
            state.seed_signal(ctx.forest, ek, ctx.new_ports[i].clone())?;
        }
        state.propagate(ctx.forest, ctx.logger)?;
        *delay = state.time() - before;

        let updates = inner
            .outputs()
            .iter()
            .enumerate()
            .map(|(j, &ek)| PortUpdate {
                index: n_in + j,
                value: state.port_value(ctx.forest, ek, 0),
            })
            .collect();
        Ok(updates)
    }
}
