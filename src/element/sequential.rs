//! Clocked and level-sensitive storage elements.
//!
//! All edge-triggered elements detect transitions by comparing the clock
//! port's previous value (the engine's per-element cache) against the
//! fresh read, via [`Sensitivity`]. Synchronous reset overrides normal
//! behavior and drives Q on every resolve, not only on edges.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::bitvalue::BitValue;
use crate::circuit::CircuitForest;
use crate::element::{
    is_high, port_list, Component, ElementState, PortProperties, PortType, PortUpdate,
    RunContext, Sensitivity, Signal,
};
use crate::error::SimError;

/// Builds the Q / Q-bar updates from a stored value.
fn q_updates(q: &Signal, q_index: usize) -> Vec<PortUpdate> {
    vec![
        PortUpdate { index: q_index, value: q.clone() },
        PortUpdate { index: q_index + 1, value: q.as_ref().map(BitValue::not) },
    ]
}

/// Seeds a latch state with a width-checked value.
fn seed_latch(
    state: Option<&mut ElementState>,
    value: BitValue,
    width: u32,
) -> Result<(), SimError> {
    if value.width() != width {
        return Err(SimError::WidthMismatch {
            left: width,
            right: value.width(),
            context: "sequential initialize".into(),
        });
    }
    match state {
        Some(ElementState::Latch { q }) => {
            *q = Some(value);
            Ok(())
        }
        _ => Err(SimError::BadInput("element has no Q state".into())),
    }
}

/// A positive-edge D flip-flop.
///
/// Ports: `[0]` D, `[1]` clock, `[2]` enable, `[3]` reset, `[4]` preset,
/// `[5]` Q, `[6]` Q-bar. While reset is asserted Q is driven to the preset
/// value on every resolve; otherwise a rising clock edge with enable high
/// latches D. A null preset resets Q to zero.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct DFlipFlop {
    width: u32,
}
impl DFlipFlop {
    /// Creates a new D flip-flop with the specified width.
    pub fn new(width: u32) -> Self {
        Self { width: width.max(1) }
    }
}
impl Component for DFlipFlop {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            // d
            (PortProperties { ty: PortType::Input, width: self.width }, 1),
            // clock, enable, reset
            (PortProperties { ty: PortType::Input, width: 1 }, 3),
            // preset
            (PortProperties { ty: PortType::Input, width: self.width }, 1),
            // q, q-bar
            (PortProperties { ty: PortType::Output, width: self.width }, 2),
        ])
    }

    fn initialize_state(&self, _: &CircuitForest) -> Option<ElementState> {
        Some(ElementState::Latch { q: None })
    }

    fn initialize_with(&self, state: Option<&mut ElementState>, value: BitValue) -> Result<(), SimError> {
        seed_latch(state, value, self.width)
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        let Some(ElementState::Latch { q }) = ctx.state else {
            return Err(SimError::BadInput("flip-flop state missing".into()));
        };
        if is_high(&ctx.new_ports[3]) {
            *q = Some(ctx.new_ports[4].clone().unwrap_or_else(|| BitValue::low(self.width)));
        } else if Sensitivity::Posedge.activated(&ctx.old_ports[1], &ctx.new_ports[1])
            && is_high(&ctx.new_ports[2])
        {
            *q = ctx.new_ports[0].clone();
        }
        Ok(q_updates(q, 5))
    }
}

/// A positive-edge T flip-flop.
///
/// Same ports as [`DFlipFlop`]. On a rising edge with enable high, Q is
/// driven to the complement of the D input (toggling when D is wired back
/// to Q).
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct TFlipFlop {
    width: u32,
}
impl TFlipFlop {
    /// Creates a new T flip-flop with the specified width.
    pub fn new(width: u32) -> Self {
        Self { width: width.max(1) }
    }
}
impl Component for TFlipFlop {
    fn ports(&self, forest: &CircuitForest) -> Vec<PortProperties> {
        DFlipFlop { width: self.width }.ports(forest)
    }

    fn initialize_state(&self, _: &CircuitForest) -> Option<ElementState> {
        Some(ElementState::Latch { q: None })
    }

    fn initialize_with(&self, state: Option<&mut ElementState>, value: BitValue) -> Result<(), SimError> {
        seed_latch(state, value, self.width)
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        let Some(ElementState::Latch { q }) = ctx.state else {
            return Err(SimError::BadInput("flip-flop state missing".into()));
        };
        if is_high(&ctx.new_ports[3]) {
            *q = Some(ctx.new_ports[4].clone().unwrap_or_else(|| BitValue::low(self.width)));
        } else if Sensitivity::Posedge.activated(&ctx.old_ports[1], &ctx.new_ports[1])
            && is_high(&ctx.new_ports[2])
        {
            *q = ctx.new_ports[0].as_ref().map(BitValue::not);
        }
        Ok(q_updates(q, 5))
    }
}

/// A positive-edge JK flip-flop (1 bit).
///
/// Ports: `[0]` J, `[1]` K, `[2]` clock, `[3]` reset, `[4]` preset,
/// `[5]` Q, `[6]` Q-bar. On a rising edge: J=0,K=0 holds; J=1,K=0 sets;
/// J=0,K=1 resets; J=1,K=1 toggles. Null J or K counts as low.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct JkFlipFlop;
impl JkFlipFlop {
    /// Creates a new JK flip-flop.
    pub fn new() -> Self {
        Self
    }
}
impl Default for JkFlipFlop {
    fn default() -> Self {
        Self::new()
    }
}
impl Component for JkFlipFlop {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            // j, k, clock, reset, preset
            (PortProperties { ty: PortType::Input, width: 1 }, 5),
            // q, q-bar
            (PortProperties { ty: PortType::Output, width: 1 }, 2),
        ])
    }

    fn initialize_state(&self, _: &CircuitForest) -> Option<ElementState> {
        Some(ElementState::Latch { q: None })
    }

    fn initialize_with(&self, state: Option<&mut ElementState>, value: BitValue) -> Result<(), SimError> {
        seed_latch(state, value, 1)
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        let Some(ElementState::Latch { q }) = ctx.state else {
            return Err(SimError::BadInput("flip-flop state missing".into()));
        };
        if is_high(&ctx.new_ports[3]) {
            *q = Some(ctx.new_ports[4].clone().unwrap_or_else(|| BitValue::low(1)));
        } else if Sensitivity::Posedge.activated(&ctx.old_ports[2], &ctx.new_ports[2]) {
            let j = is_high(&ctx.new_ports[0]);
            let k = is_high(&ctx.new_ports[1]);
            *q = match (j, k) {
                (false, false) => q.clone(),
                (true, false) => Some(BitValue::high(1)),
                (false, true) => Some(BitValue::low(1)),
                (true, true) => q.as_ref().map(BitValue::not).or(Some(BitValue::high(1))),
            };
        }
        Ok(q_updates(q, 5))
    }
}

/// A level-sensitive SR latch (1 bit).
///
/// Ports: `[0]` S, `[1]` R, `[2]` Q, `[3]` Q-bar. S=1,R=0 sets; S=0,R=1
/// resets; S=0,R=0 holds. The S=1,R=1 case also holds: this non-standard
/// policy is chosen for determinism and is relied on by loaded circuits.
/// Null S or R counts as low.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct SrLatch;
impl SrLatch {
    /// Creates a new SR latch.
    pub fn new() -> Self {
        Self
    }
}
impl Default for SrLatch {
    fn default() -> Self {
        Self::new()
    }
}
impl Component for SrLatch {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            // s, r
            (PortProperties { ty: PortType::Input, width: 1 }, 2),
            // q, q-bar
            (PortProperties { ty: PortType::Output, width: 1 }, 2),
        ])
    }

    fn initialize_state(&self, _: &CircuitForest) -> Option<ElementState> {
        Some(ElementState::Latch { q: None })
    }

    fn initialize_with(&self, state: Option<&mut ElementState>, value: BitValue) -> Result<(), SimError> {
        seed_latch(state, value, 1)
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        let Some(ElementState::Latch { q }) = ctx.state else {
            return Err(SimError::BadInput("latch state missing".into()));
        };
        let s = is_high(&ctx.new_ports[0]);
        let r = is_high(&ctx.new_ports[1]);
        match (s, r) {
            (true, false) => *q = Some(BitValue::high(1)),
            (false, true) => *q = Some(BitValue::low(1)),
            // S=R=1 holds by policy; S=R=0 holds by definition.
            _ => {}
        }
        Ok(q_updates(q, 2))
    }
}

/// A D latch.
///
/// Ports: `[0]` D, `[1]` clock, `[2]` Q, `[3]` Q-bar.
///
/// The default ([`DLatch::new`]) reproduces the shipped behavior loaded
/// circuits rely on: Q is driven to the *complement* of D on a rising
/// clock edge. [`DLatch::transparent`] provides the textbook variant
/// instead, where Q follows D for as long as the clock is high.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct DLatch {
    width: u32,
    transparent: bool,
}
impl DLatch {
    /// The as-shipped variant: Q := !D on a rising clock edge.
    pub fn new(width: u32) -> Self {
        Self { width: width.max(1), transparent: false }
    }

    /// The textbook variant: Q follows D while the clock is high.
    pub fn transparent(width: u32) -> Self {
        Self { width: width.max(1), transparent: true }
    }
}
impl Component for DLatch {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            // d
            (PortProperties { ty: PortType::Input, width: self.width }, 1),
            // clock
            (PortProperties { ty: PortType::Input, width: 1 }, 1),
            // q, q-bar
            (PortProperties { ty: PortType::Output, width: self.width }, 2),
        ])
    }

    fn initialize_state(&self, _: &CircuitForest) -> Option<ElementState> {
        Some(ElementState::Latch { q: None })
    }

    fn initialize_with(&self, state: Option<&mut ElementState>, value: BitValue) -> Result<(), SimError> {
        seed_latch(state, value, self.width)
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        let Some(ElementState::Latch { q }) = ctx.state else {
            return Err(SimError::BadInput("latch state missing".into()));
        };
        match self.transparent {
            true => {
                if is_high(&ctx.new_ports[1]) {
                    *q = ctx.new_ports[0].clone();
                }
            }
            false => {
                if Sensitivity::Posedge.activated(&ctx.old_ports[1], &ctx.new_ports[1]) {
                    *q = ctx.new_ports[0].as_ref().map(BitValue::not);
                }
            }
        }
        Ok(q_updates(q, 2))
    }
}

/// A register with a configurable trigger edge.
///
/// Ports: `[0]` D, `[1]` enable, `[2]` clock, `[3]` clear, `[4]` D out.
/// Clear drives the output low on every resolve; otherwise the configured
/// clock edge with enable high stores D. The register is stateless: its
/// output bus holds the stored word between edges.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Register {
    width: u32,
    edge: Sensitivity,
}
impl Register {
    /// Creates a positive-edge register with the specified width.
    pub fn new(width: u32) -> Self {
        Self::with_edge(width, Sensitivity::Posedge)
    }

    /// Creates a register triggering on the given clock edge.
    pub fn with_edge(width: u32, edge: Sensitivity) -> Self {
        let edge = match edge {
            Sensitivity::Negedge => Sensitivity::Negedge,
            _ => Sensitivity::Posedge,
        };
        Self { width: width.max(1), edge }
    }
}
impl Component for Register {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            // din
            (PortProperties { ty: PortType::Input, width: self.width }, 1),
            // enable, clock, clear
            (PortProperties { ty: PortType::Input, width: 1 }, 3),
            // dout
            (PortProperties { ty: PortType::Output, width: self.width }, 1),
        ])
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        if is_high(&ctx.new_ports[3]) {
            Ok(vec![PortUpdate { index: 4, value: Some(BitValue::low(self.width)) }])
        } else if self.edge.activated(&ctx.old_ports[2], &ctx.new_ports[2])
            && is_high(&ctx.new_ports[1])
        {
            Ok(vec![PortUpdate { index: 4, value: ctx.new_ports[0].clone() }])
        } else {
            Ok(vec![])
        }
    }
}

/// A modulo counter.
///
/// Ports: `[0]` clock, `[1]` reset, `[2]` count, `[3]` zero flag. Each
/// rising clock edge increments modulo `max_value`; a rise with reset
/// asserted drives the count back to zero. The zero output is high
/// whenever the count is zero.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Counter {
    width: u32,
    /// Count modulus; 0 stands for 2^64.
    modulus: u64,
}
impl Counter {
    /// Creates a counter wrapping at `2^width`.
    pub fn new(width: u32) -> Self {
        let width = width.clamp(1, 64);
        let modulus = match width {
            64 => 0,
            w => 1 << w,
        };
        Self { width, modulus }
    }

    /// Creates a counter wrapping at `max_value` (0 wraps at 2^64).
    pub fn with_max(width: u32, max_value: u64) -> Self {
        Self { width: width.clamp(1, 64), modulus: max_value }
    }

    fn wrap(&self, v: u64) -> u64 {
        match self.modulus {
            0 => v,
            m => v % m,
        }
    }
}
impl Component for Counter {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            // clock, reset
            (PortProperties { ty: PortType::Input, width: 1 }, 2),
            // count
            (PortProperties { ty: PortType::Output, width: self.width }, 1),
            // zero flag
            (PortProperties { ty: PortType::Output, width: 1 }, 1),
        ])
    }

    fn initialize_state(&self, _: &CircuitForest) -> Option<ElementState> {
        Some(ElementState::Count(0))
    }

    fn initialize_with(&self, state: Option<&mut ElementState>, value: BitValue) -> Result<(), SimError> {
        match (state, value.as_unsigned()) {
            (Some(ElementState::Count(c)), Some(v)) => {
                *c = self.wrap(v);
                Ok(())
            }
            (_, None) => Err(SimError::BadInput("counter seed does not fit 64 bits".into())),
            _ => Err(SimError::BadInput("counter state missing".into())),
        }
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        let Some(ElementState::Count(count)) = ctx.state else {
            return Err(SimError::BadInput("counter state missing".into()));
        };
        if Sensitivity::Posedge.activated(&ctx.old_ports[0], &ctx.new_ports[0]) {
            *count = match is_high(&ctx.new_ports[1]) {
                true => 0,
                false => self.wrap(count.wrapping_add(1)),
            };
        }
        Ok(vec![
            PortUpdate { index: 2, value: Some(BitValue::from_u64(*count, self.width)) },
            PortUpdate { index: 3, value: Some(BitValue::from(*count == 0)) },
        ])
    }
}

/// A clock source.
///
/// Ports: `[0]` out. The clocked run loop toggles the stored level and
/// re-enqueues the element; resolve only forwards the level to the bus.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Clock;
impl Clock {
    /// Creates a new clock, initially low.
    pub fn new() -> Self {
        Self
    }
}
impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
impl Component for Clock {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[(PortProperties { ty: PortType::Output, width: 1 }, 1)])
    }

    fn initialize_state(&self, _: &CircuitForest) -> Option<ElementState> {
        Some(ElementState::Value(Some(BitValue::low(1))))
    }

    fn initialize_with(&self, state: Option<&mut ElementState>, value: BitValue) -> Result<(), SimError> {
        match state {
            Some(ElementState::Value(v)) => {
                *v = Some(value.sized(1));
                Ok(())
            }
            _ => Err(SimError::BadInput("clock state missing".into())),
        }
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        let value = match ctx.state {
            Some(ElementState::Value(v)) => v.clone(),
            _ => None,
        };
        Ok(vec![PortUpdate { index: 0, value }])
    }
}

/// A clocked uniform random source.
///
/// Ports: `[0]` clock, `[1]` out. Each rising clock edge draws a uniform
/// value in `[0, max_value]`. The generator is seeded at construction so
/// runs are reproducible.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Random {
    width: u32,
    max_value: u64,
    seed: u64,
}
impl Random {
    /// Creates a random source spanning the full width, seeded with `seed`.
    pub fn new(width: u32, seed: u64) -> Self {
        let width = width.clamp(1, 64);
        let max_value = match width {
            64 => u64::MAX,
            w => (1 << w) - 1,
        };
        Self { width, max_value, seed }
    }

    /// Creates a random source drawing from `[0, max_value]`.
    pub fn with_max(width: u32, max_value: u64, seed: u64) -> Self {
        Self { width: width.clamp(1, 64), max_value, seed }
    }
}
impl Component for Random {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            // clock
            (PortProperties { ty: PortType::Input, width: 1 }, 1),
            // out
            (PortProperties { ty: PortType::Output, width: self.width }, 1),
        ])
    }

    fn initialize_state(&self, _: &CircuitForest) -> Option<ElementState> {
        Some(ElementState::Rng(StdRng::seed_from_u64(self.seed)))
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        let Some(ElementState::Rng(rng)) = ctx.state else {
            return Err(SimError::BadInput("random state missing".into()));
        };
        if Sensitivity::Posedge.activated(&ctx.old_ports[0], &ctx.new_ports[0]) {
            let drawn = rng.gen_range(0..=self.max_value);
            Ok(vec![PortUpdate { index: 1, value: Some(BitValue::from_u64(drawn, self.width)) }])
        } else {
            Ok(vec![])
        }
    }
}
