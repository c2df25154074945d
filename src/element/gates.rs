use crate::bitvalue::BitValue;
use crate::circuit::CircuitForest;
use crate::element::{
    is_high, port_list, Component, PortProperties, PortType, PortUpdate, RunContext,
};
use crate::error::SimError;

/// Minimum number of inputs for multi-input logic gates.
pub const MIN_GATE_INPUTS: u32 = 2;
/// Maximum number of inputs for multi-input logic gates.
pub const MAX_GATE_INPUTS: u32 = 64;

macro_rules! gates {
    ($($(#[$m:meta])? $Id:ident: $f:expr, $invert:literal),*$(,)?) => {
        $(
            $(#[$m])?
            #[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
            pub struct $Id {
                width: u32,
                n_inputs: u32
            }
            impl $Id {
                /// Creates a new instance of the gate with the specified
                /// width and number of inputs.
                pub fn new(width: u32, n_inputs: u32) -> Self {
                    Self {
                        width: width.max(1),
                        n_inputs: n_inputs.clamp(MIN_GATE_INPUTS, MAX_GATE_INPUTS)
                    }
                }
            }
            impl Component for $Id {
                fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
                    port_list(&[
                        // inputs
                        (PortProperties { ty: PortType::Input, width: self.width }, self.n_inputs),
                        // output
                        (PortProperties { ty: PortType::Output, width: self.width }, 1),
                    ])
                }
                fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
                    // Any null input makes the output null.
                    let inputs = &ctx.new_ports[..self.n_inputs as usize];
                    let value = match inputs.iter().all(Option::is_some) {
                        false => None,
                        true => {
                            let mut it = inputs.iter().flatten();
                            let first = it.next().cloned().unwrap_or_else(BitValue::empty);
                            let folded = it
                                .try_fold(first, |acc, v| $f(&acc, v))
                                .map_err(SimError::from)?;
                            Some(if $invert { folded.not() } else { folded })
                        }
                    };

                    Ok(vec![PortUpdate {
                        index: self.n_inputs as usize,
                        value
                    }])
                }
            }
        )*
    }
}

gates! {
    /// An AND gate.
    And:  BitValue::and, false,
    /// An OR gate.
    Or:   BitValue::or, false,
    /// An XOR gate.
    Xor:  BitValue::xor, false,
    /// A NAND gate.
    Nand: BitValue::and, true,
    /// A NOR gate.
    Nor:  BitValue::or, true,
    /// An XNOR gate.
    Xnor: BitValue::xor, true,
}

/// A NOT gate.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Not {
    width: u32,
}
impl Not {
    /// Creates a new instance of the NOT gate with the specified width.
    pub fn new(width: u32) -> Self {
        Self { width: width.max(1) }
    }
}
impl Component for Not {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            // input
            (PortProperties { ty: PortType::Input, width: self.width }, 1),
            // output
            (PortProperties { ty: PortType::Output, width: self.width }, 1),
        ])
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        Ok(vec![PortUpdate { index: 1, value: ctx.new_ports[0].as_ref().map(BitValue::not) }])
    }
}

/// A buffer: output follows input unchanged.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Buffer {
    width: u32,
}
impl Buffer {
    /// Creates a new instance of the buffer with the specified width.
    pub fn new(width: u32) -> Self {
        Self { width: width.max(1) }
    }
}
impl Component for Buffer {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            (PortProperties { ty: PortType::Input, width: self.width }, 1),
            (PortProperties { ty: PortType::Output, width: self.width }, 1),
        ])
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        Ok(vec![PortUpdate { index: 1, value: ctx.new_ports[0].clone() }])
    }
}

/// A tri-state buffer: passes the input while control is high, otherwise
/// releases the output (null / high impedance).
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct TriState {
    width: u32,
}
impl TriState {
    /// Creates a new instance of the tri-state buffer with the specified width.
    pub fn new(width: u32) -> Self {
        Self { width: width.max(1) }
    }
}
impl Component for TriState {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            // control
            (PortProperties { ty: PortType::Input, width: 1 }, 1),
            // input
            (PortProperties { ty: PortType::Input, width: self.width }, 1),
            // output
            (PortProperties { ty: PortType::Output, width: self.width }, 1),
        ])
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        let value = match is_high(&ctx.new_ports[0]) {
            true => ctx.new_ports[1].clone(),
            false => None,
        };
        Ok(vec![PortUpdate { index: 2, value }])
    }
}

/// A controlled inverter: inverts the input while control is high,
/// otherwise releases the output.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct ControlledInverter {
    width: u32,
}
impl ControlledInverter {
    /// Creates a new instance of the controlled inverter with the specified width.
    pub fn new(width: u32) -> Self {
        Self { width: width.max(1) }
    }
}
impl Component for ControlledInverter {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            // control
            (PortProperties { ty: PortType::Input, width: 1 }, 1),
            // input
            (PortProperties { ty: PortType::Input, width: self.width }, 1),
            // output
            (PortProperties { ty: PortType::Output, width: self.width }, 1),
        ])
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        let value = match is_high(&ctx.new_ports[0]) {
            true => ctx.new_ports[1].as_ref().map(BitValue::not),
            false => None,
        };
        Ok(vec![PortUpdate { index: 2, value }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits;
    use crate::element::harness::run_stateless;
    use crate::element::null_ports;

    #[test]
    fn test_and_gate() {
        let gate = And::new(1, 2);
        let new = vec![Some(bits![0]), Some(bits![1]), None];

        let updates = run_stateless(&gate, &null_ports(&gate.ports(&Default::default())), &new).unwrap();

        assert_eq!(
            updates,
            vec![PortUpdate { index: 2, value: Some(bits![0]) }],
            "Expected a single update with index=2 and value=0 (1 & 0 = 0)"
        );
    }

    #[test]
    fn test_and_gate_multi_bit() {
        let gate = And::new(4, 2);
        let new = vec![Some(bits![1, 0, 1, 1]), Some(bits![1, 1, 0, 0]), None];

        let updates = run_stateless(&gate, &null_ports(&gate.ports(&Default::default())), &new).unwrap();

        // 1011 & 1100 = 1000
        assert_eq!(updates, vec![PortUpdate { index: 2, value: Some(bits![1, 0, 0, 0]) }]);
    }

    #[test]
    fn test_and_gate_3input_4bit() {
        let gate = And::new(4, 3);
        let new = vec![
            Some(bits![1, 0, 1, 1]),
            Some(bits![1, 1, 0, 0]),
            Some(bits![1, 1, 1, 0]),
            None,
        ];

        let updates = run_stateless(&gate, &null_ports(&gate.ports(&Default::default())), &new).unwrap();

        // 1011 & 1100 & 1110 = 1000
        assert_eq!(updates, vec![PortUpdate { index: 3, value: Some(bits![1, 0, 0, 0]) }]);
    }

    fn check_two_input(gate: &impl Component, expected: crate::bitvalue::BitValue) {
        let new = vec![Some(bits![1, 0, 1, 1]), Some(bits![1, 1, 0, 1]), None];
        let updates = run_stateless(gate, &null_ports(&gate.ports(&Default::default())), &new).unwrap();
        assert_eq!(
            updates,
            vec![PortUpdate { index: 2, value: Some(expected.clone()) }],
            "Gate over 1011 and 1101 should produce {expected}"
        );
    }

    #[test]
    fn test_or_nor_xor_xnor_nand() {
        check_two_input(&Or::new(4, 2), bits![1, 1, 1, 1]);
        check_two_input(&Nor::new(4, 2), bits![0, 0, 0, 0]);
        check_two_input(&Xor::new(4, 2), bits![0, 1, 1, 0]);
        check_two_input(&Xnor::new(4, 2), bits![1, 0, 0, 1]);
        check_two_input(&Nand::new(4, 2), bits![0, 1, 1, 0]);
    }

    #[test]
    fn test_null_input_yields_null_output() {
        let gate = And::new(4, 2);
        let new = vec![Some(bits![1, 0, 1, 1]), None, None];

        let updates = run_stateless(&gate, &null_ports(&gate.ports(&Default::default())), &new).unwrap();

        assert_eq!(
            updates,
            vec![PortUpdate { index: 2, value: None }],
            "A gate observing a null input should output null"
        );
    }

    #[test]
    fn test_not_gate() {
        let gate = Not::new(4);
        let new = vec![Some(bits![1, 0, 1, 1]), None];

        let updates = run_stateless(&gate, &null_ports(&gate.ports(&Default::default())), &new).unwrap();

        assert_eq!(
            updates,
            vec![PortUpdate { index: 1, value: Some(bits![0, 1, 0, 0]) }],
            "Expected !1011 = 0100"
        );
    }

    #[test]
    fn test_buffer_passes_value() {
        let gate = Buffer::new(2);
        let new = vec![Some(bits![1, 0]), None];

        let updates = run_stateless(&gate, &null_ports(&gate.ports(&Default::default())), &new).unwrap();

        assert_eq!(updates, vec![PortUpdate { index: 1, value: Some(bits![1, 0]) }]);
    }

    #[test]
    fn test_tristate_releases_when_control_low() {
        let gate = TriState::new(2);
        let old = null_ports(&gate.ports(&Default::default()));

        let driving = vec![Some(bits![1]), Some(bits![1, 0]), None];
        let updates = run_stateless(&gate, &old, &driving).unwrap();
        assert_eq!(updates, vec![PortUpdate { index: 2, value: Some(bits![1, 0]) }]);

        let released = vec![Some(bits![0]), Some(bits![1, 0]), None];
        let updates = run_stateless(&gate, &old, &released).unwrap();
        assert_eq!(
            updates,
            vec![PortUpdate { index: 2, value: None }],
            "A tri-state with low control should release its output"
        );
    }

    #[test]
    fn test_controlled_inverter() {
        let gate = ControlledInverter::new(2);
        let old = null_ports(&gate.ports(&Default::default()));

        let active = vec![Some(bits![1]), Some(bits![1, 0]), None];
        let updates = run_stateless(&gate, &old, &active).unwrap();
        assert_eq!(updates, vec![PortUpdate { index: 2, value: Some(bits![0, 1]) }]);

        let inactive = vec![Some(bits![0]), Some(bits![1, 0]), None];
        let updates = run_stateless(&gate, &old, &inactive).unwrap();
        assert_eq!(updates, vec![PortUpdate { index: 2, value: None }]);
    }
}
