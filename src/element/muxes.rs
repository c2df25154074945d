use crate::bitvalue::BitValue;
use crate::circuit::CircuitForest;
use crate::element::{
    is_high, port_list, Component, PortProperties, PortType, PortUpdate, RunContext, Signal,
};
use crate::error::SimError;

/// Minimum number of data ports for Mux/Demux/PriorityEncoder.
pub const MIN_PLEXER_INPUTS: u32 = 2;
/// Maximum number of data ports for Mux/Demux/PriorityEncoder.
pub const MAX_PLEXER_INPUTS: u32 = 64;
/// Minimum number of selector bits for Decoder.
pub const MIN_SELSIZE: u32 = 1;
/// Maximum number of selector bits for Decoder.
pub const MAX_SELSIZE: u32 = 6;

/// Width of a selector addressing `n` ports: `ceil(log2 n)`, at least 1.
fn sel_width(n: u32) -> u32 {
    (u32::BITS - (n - 1).leading_zeros()).max(1)
}

/// Reads a selector value, or None when it is null.
fn read_sel(sig: &Signal) -> Option<u64> {
    sig.as_ref().and_then(BitValue::as_unsigned)
}

/// A multiplexer: forwards the selected data input.
///
/// The data port count need not be a power of two; a selector value with no
/// matching data port yields a null output.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Mux {
    width: u32,
    n_inputs: u32,
}
impl Mux {
    /// Creates a new mux with the specified width and data input count.
    pub fn new(width: u32, n_inputs: u32) -> Self {
        Self {
            width: width.max(1),
            n_inputs: n_inputs.clamp(MIN_PLEXER_INPUTS, MAX_PLEXER_INPUTS),
        }
    }
}
impl Component for Mux {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            // selector
            (PortProperties { ty: PortType::Input, width: sel_width(self.n_inputs) }, 1),
            // data inputs
            (PortProperties { ty: PortType::Input, width: self.width }, self.n_inputs),
            // output
            (PortProperties { ty: PortType::Output, width: self.width }, 1),
        ])
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        let value = match read_sel(&ctx.new_ports[0]) {
            Some(sel) if sel < u64::from(self.n_inputs) => ctx.new_ports[1 + sel as usize].clone(),
            _ => None,
        };
        Ok(vec![PortUpdate { index: 1 + self.n_inputs as usize, value }])
    }
}

/// A demultiplexer: routes the data input to the selected output, driving
/// every other output low.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Demux {
    width: u32,
    n_outputs: u32,
}
impl Demux {
    /// Creates a new demux with the specified width and output count.
    pub fn new(width: u32, n_outputs: u32) -> Self {
        Self {
            width: width.max(1),
            n_outputs: n_outputs.clamp(MIN_PLEXER_INPUTS, MAX_PLEXER_INPUTS),
        }
    }
}
impl Component for Demux {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            // selector
            (PortProperties { ty: PortType::Input, width: sel_width(self.n_outputs) }, 1),
            // data input
            (PortProperties { ty: PortType::Input, width: self.width }, 1),
            // outputs
            (PortProperties { ty: PortType::Output, width: self.width }, self.n_outputs),
        ])
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        let updates = match read_sel(&ctx.new_ports[0]) {
            Some(sel) if sel < u64::from(self.n_outputs) => (0..self.n_outputs)
                .map(|i| PortUpdate {
                    index: 2 + i as usize,
                    value: match u64::from(i) == sel {
                        true => ctx.new_ports[1].clone(),
                        false => Some(BitValue::low(self.width)),
                    },
                })
                .collect(),
            _ => (0..self.n_outputs)
                .map(|i| PortUpdate { index: 2 + i as usize, value: None })
                .collect(),
        };
        Ok(updates)
    }
}

/// A decoder: one-hot over `2^k` one-bit outputs.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Decoder {
    selsize: u32,
}
impl Decoder {
    /// Creates a new decoder with the specified selector size.
    pub fn new(selsize: u32) -> Self {
        Self { selsize: selsize.clamp(MIN_SELSIZE, MAX_SELSIZE) }
    }
}
impl Component for Decoder {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            // selector
            (PortProperties { ty: PortType::Input, width: self.selsize }, 1),
            // outputs
            (PortProperties { ty: PortType::Output, width: 1 }, 1 << self.selsize),
        ])
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        let sel = read_sel(&ctx.new_ports[0]);
        let updates = (0u64..1 << self.selsize)
            .map(|i| PortUpdate {
                index: 1 + i as usize,
                value: sel.map(|s| BitValue::from(s == i)),
            })
            .collect();
        Ok(updates)
    }
}

/// A priority encoder: emits the index of the highest-set data input over
/// `k` one-bit outputs, most significant encoding bit first.
///
/// Outputs are null while enable is low, and null when no data input is
/// set (there is no valid encoding). Null data inputs count as not set.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct PriorityEncoder {
    n_inputs: u32,
}
impl PriorityEncoder {
    /// Creates a new priority encoder over the specified data input count.
    pub fn new(n_inputs: u32) -> Self {
        Self { n_inputs: n_inputs.clamp(MIN_PLEXER_INPUTS, MAX_PLEXER_INPUTS) }
    }

    fn out_bits(&self) -> u32 {
        sel_width(self.n_inputs)
    }
}
impl Component for PriorityEncoder {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            // data inputs
            (PortProperties { ty: PortType::Input, width: 1 }, self.n_inputs),
            // enable
            (PortProperties { ty: PortType::Input, width: 1 }, 1),
            // encoded outputs, MSB first
            (PortProperties { ty: PortType::Output, width: 1 }, self.out_bits()),
        ])
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        let k = self.out_bits();
        let base = self.n_inputs as usize + 1;
        let enabled = is_high(&ctx.new_ports[self.n_inputs as usize]);

        let encoded = enabled
            .then(|| {
                (0..self.n_inputs).rev().find(|&i| is_high(&ctx.new_ports[i as usize]))
            })
            .flatten();

        let updates = (0..k)
            .map(|bit| PortUpdate {
                // Output 0 carries the most significant encoding bit.
                index: base + bit as usize,
                value: encoded.map(|idx| BitValue::from(idx >> (k - 1 - bit) & 1 != 0)),
            })
            .collect();
        Ok(updates)
    }
}

/// A bit selector: forwards one bit of the input.
///
/// The selector is LSB-based: selector value `s` picks bit `s` counting
/// from the least significant end of the input, matching the loaders'
/// convention. A selector past the width yields null.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct BitSelector {
    width: u32,
}
impl BitSelector {
    /// Creates a new bit selector over an input of the specified width.
    pub fn new(width: u32) -> Self {
        Self { width: width.max(1) }
    }
}
impl Component for BitSelector {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            // input
            (PortProperties { ty: PortType::Input, width: self.width }, 1),
            // selector
            (PortProperties { ty: PortType::Input, width: sel_width(self.width) }, 1),
            // selected bit
            (PortProperties { ty: PortType::Output, width: 1 }, 1),
        ])
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        let value = match (&ctx.new_ports[0], read_sel(&ctx.new_ports[1])) {
            (Some(input), Some(sel)) if sel < u64::from(self.width) => {
                input.get(self.width - 1 - sel as u32).map(BitValue::from)
            }
            _ => None,
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
    fn test_mux_selects_each_input() {
        const WIDTH: u32 = 4;
        for n_inputs in [2, 3, 4, 8] {
            let mux = Mux::new(WIDTH, n_inputs);
            let props = mux.ports(&Default::default());
            assert_eq!(props.len() as u32, n_inputs + 2);

            let mut ports = null_ports(&props);
            for i in 0..n_inputs {
                ports[1 + i as usize] = Some(BitValue::from_u64(u64::from(i + 1) * 13 & 0xF, WIDTH));
            }

            for sel in 0..n_inputs {
                ports[0] = Some(BitValue::from_u64(u64::from(sel), sel_width(n_inputs)));
                let updates = run_stateless(&mux, &ports, &ports).unwrap();
                assert_eq!(
                    updates,
                    vec![PortUpdate {
                        index: 1 + n_inputs as usize,
                        value: ports[1 + sel as usize].clone()
                    }],
                    "Mux with {n_inputs} inputs and selector {sel} should forward input {sel}"
                );
            }
        }
    }

    #[test]
    fn test_mux_out_of_range_select_is_null() {
        // 3 data inputs need a 2-bit selector; selector 3 has no input.
        let mux = Mux::new(4, 3);
        let mut ports = null_ports(&mux.ports(&Default::default()));
        for i in 0..3 {
            ports[1 + i] = Some(bits![1, 1, 1, 1]);
        }
        ports[0] = Some(BitValue::from_u64(3, 2));

        let updates = run_stateless(&mux, &ports, &ports).unwrap();
        assert_eq!(
            updates,
            vec![PortUpdate { index: 4, value: None }],
            "An out-of-range selector should yield a null output"
        );
    }

    #[test]
    fn test_mux_scenario_select_two() {
        // data = [1, 0, 1, 1] over 1-bit inputs; select = 10 (binary).
        let mux = Mux::new(1, 4);
        let mut ports = null_ports(&mux.ports(&Default::default()));
        for (i, bit) in [1u64, 0, 1, 1].into_iter().enumerate() {
            ports[1 + i] = Some(BitValue::from_u64(bit, 1));
        }
        ports[0] = Some(bits![1, 0]);

        let updates = run_stateless(&mux, &ports, &ports).unwrap();
        assert_eq!(
            updates,
            vec![PortUpdate { index: 5, value: Some(bits![1]) }],
            "Selector 10 should forward data[2] = 1"
        );
    }

    #[test]
    fn test_demux_routes_selected_output() {
        let demux = Demux::new(4, 4);
        let mut ports = null_ports(&demux.ports(&Default::default()));
        ports[1] = Some(bits![1, 0, 1, 1]);

        for sel in 0..4u64 {
            ports[0] = Some(BitValue::from_u64(sel, 2));
            let updates = run_stateless(&demux, &ports, &ports).unwrap();
            let expected: Vec<_> = (0..4)
                .map(|i| PortUpdate {
                    index: 2 + i,
                    value: match i as u64 == sel {
                        true => ports[1].clone(),
                        false => Some(bits![0, 0, 0, 0]),
                    },
                })
                .collect();
            assert_eq!(updates, expected, "Demux with selector {sel} should route only output {sel}");
        }
    }

    #[test]
    fn test_decoder_one_hot() {
        for selsize in MIN_SELSIZE..=3 {
            let decoder = Decoder::new(selsize);
            let outputs = 1usize << selsize;
            let mut ports = null_ports(&decoder.ports(&Default::default()));

            for sel in 0..outputs {
                ports[0] = Some(BitValue::from_u64(sel as u64, selsize));
                let updates = run_stateless(&decoder, &ports, &ports).unwrap();
                let expected: Vec<_> = (0..outputs)
                    .map(|i| PortUpdate {
                        index: 1 + i,
                        value: Some(BitValue::from(i == sel)),
                    })
                    .collect();
                assert_eq!(updates, expected, "Decoder selsize {selsize} selector {sel} should be one-hot");
            }
        }
    }

    #[test]
    fn test_priority_encoder_picks_highest() {
        let enc = PriorityEncoder::new(4);
        let mut ports = null_ports(&enc.ports(&Default::default()));
        ports[4] = Some(bits![1]); // enable
        ports[0] = Some(bits![1]);
        ports[2] = Some(bits![1]);

        let updates = run_stateless(&enc, &ports, &ports).unwrap();
        // Highest set input is 2 = binary 10, MSB-first outputs.
        assert_eq!(
            updates,
            vec![
                PortUpdate { index: 5, value: Some(bits![1]) },
                PortUpdate { index: 6, value: Some(bits![0]) },
            ],
            "Inputs 0 and 2 set should encode 10"
        );
    }

    #[test]
    fn test_priority_encoder_disabled_is_null() {
        let enc = PriorityEncoder::new(4);
        let mut ports = null_ports(&enc.ports(&Default::default()));
        ports[0] = Some(bits![1]);
        ports[4] = Some(bits![0]); // enable low

        let updates = run_stateless(&enc, &ports, &ports).unwrap();
        assert_eq!(
            updates,
            vec![
                PortUpdate { index: 5, value: None },
                PortUpdate { index: 6, value: None },
            ],
            "A disabled encoder should output null"
        );
    }

    #[test]
    fn test_bit_selector_lsb_based() {
        let sel = BitSelector::new(4);
        let mut ports = null_ports(&sel.ports(&Default::default()));
        ports[0] = Some(bits![1, 0, 1, 1]);

        // LSB-based: bit 0 = 1, bit 1 = 1, bit 2 = 0, bit 3 = 1.
        for (s, expected) in [(0u64, true), (1, true), (2, false), (3, true)] {
            ports[1] = Some(BitValue::from_u64(s, 2));
            let updates = run_stateless(&sel, &ports, &ports).unwrap();
            assert_eq!(
                updates,
                vec![PortUpdate { index: 2, value: Some(BitValue::from(expected)) }],
                "Selector {s} over 1011 should pick bit {s} from the LSB end"
            );
        }
    }
}
