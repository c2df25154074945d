use crate::bitvalue::BitValue;
use crate::circuit::CircuitForest;
use crate::element::{
    port_list, Component, ElementState, PortProperties, PortType, PortUpdate, RunContext,
    SplitterOp,
};
use crate::error::SimError;

/// A labeled input: drives its seeded value onto its single output port.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Input {
    width: u32,
}
impl Input {
    /// Creates a new input with the specified width.
    pub fn new(width: u32) -> Self {
        Self { width: width.max(1) }
    }

    /// The input's width.
    pub fn width(&self) -> u32 {
        self.width
    }
}
impl Component for Input {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            // output
            (PortProperties { ty: PortType::Output, width: self.width }, 1),
        ])
    }

    fn initialize_state(&self, _: &CircuitForest) -> Option<ElementState> {
        Some(ElementState::Value(None))
    }

    fn initialize_with(&self, state: Option<&mut ElementState>, value: BitValue) -> Result<(), SimError> {
        if value.width() != self.width {
            return Err(SimError::WidthMismatch {
                left: self.width,
                right: value.width(),
                context: "input seed".into(),
            });
        }
        match state {
            Some(ElementState::Value(v)) => {
                *v = Some(value);
                Ok(())
            }
            _ => Err(SimError::BadInput("input element has no seed state".into())),
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

/// A labeled output: a read point with no behavior of its own.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Output {
    width: u32,
}
impl Output {
    /// Creates a new output with the specified width.
    pub fn new(width: u32) -> Self {
        Self { width: width.max(1) }
    }

    /// The output's width.
    pub fn width(&self) -> u32 {
        self.width
    }
}
impl Component for Output {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            // input
            (PortProperties { ty: PortType::Input, width: self.width }, 1),
        ])
    }

    fn resolve_inner(&self, _ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        Ok(vec![])
    }
}

/// A constant: drives a fixed value on every resolve.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct Constant {
    value: BitValue,
}
impl Constant {
    /// Creates a new constant driving the given value.
    pub fn new(value: BitValue) -> Self {
        Self { value }
    }
}
impl Component for Constant {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            // output
            (PortProperties { ty: PortType::Output, width: self.value.width() }, 1),
        ])
    }

    fn resolve_inner(&self, _ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        Ok(vec![PortUpdate { index: 0, value: Some(self.value.clone()) }])
    }
}

/// A power rail: drives all ones.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Power {
    width: u32,
}
impl Power {
    /// Creates a new power rail with the specified width.
    pub fn new(width: u32) -> Self {
        Self { width: width.max(1) }
    }
}
impl Component for Power {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[(PortProperties { ty: PortType::Output, width: self.width }, 1)])
    }

    fn resolve_inner(&self, _ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        Ok(vec![PortUpdate { index: 0, value: Some(BitValue::high(self.width)) }])
    }
}

/// A ground rail: drives all zeros.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Ground {
    width: u32,
}
impl Ground {
    /// Creates a new ground rail with the specified width.
    pub fn new(width: u32) -> Self {
        Self { width: width.max(1) }
    }
}
impl Component for Ground {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[(PortProperties { ty: PortType::Output, width: self.width }, 1)])
    }

    fn resolve_inner(&self, _ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        Ok(vec![PortUpdate { index: 0, value: Some(BitValue::low(self.width)) }])
    }
}

/// Replicates a one-bit input across every bit of the output.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Extend {
    width: u32,
}
impl Extend {
    /// Creates a new extender producing `width` copies of its input bit.
    pub fn new(width: u32) -> Self {
        Self { width: width.max(1) }
    }
}
impl Component for Extend {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            // input bit
            (PortProperties { ty: PortType::Input, width: 1 }, 1),
            // output
            (PortProperties { ty: PortType::Output, width: self.width }, 1),
        ])
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        let value = ctx.new_ports[0]
            .as_ref()
            .map(|bit| BitValue::repeat_bit(!bit.is_zero(), self.width));
        Ok(vec![PortUpdate { index: 1, value }])
    }
}

/// A bidirectional bus splitter/merger.
///
/// One wide port faces the full bus; N narrow ports face the pieces. The
/// splitter drives whichever side was updated less recently: a change on
/// the wide side splits out to the narrows, a change on the narrow side
/// merges into the wide value. When both sides hold known, disagreeing
/// values at equal timestamps the circuit is faulted with
/// [`SimError::SplitterContention`].
///
/// Port 0 is the wide side. Narrow port `j` (port `1 + j`) carries the
/// `j`-th slice counted from the least significant end of the wide bus, so
/// the most significant slice lands on the last narrow port. In bit-mapping
/// mode, each narrow port instead carries an explicit list of wide-bus bit
/// indices; indices are LSB-based (bit 0 is the least significant wide
/// bit), matching the loaders' convention rather than [`BitValue`]'s
/// MSB-first view.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct Splitter {
    wide_width: u32,
    /// Narrow port widths, in port order.
    split: Vec<u32>,
    /// Per narrow port: the wide-bus bit carried by each narrow bit,
    /// LSB-first on both sides. None in contiguous mode.
    mappings: Option<Vec<Vec<u32>>>,
}
impl Splitter {
    /// A contiguous splitter. `split[j]` is the width of narrow port `j`,
    /// which carries the `j`-th slice from the least significant end. The
    /// slice widths must cover the wide bus exactly.
    pub fn contiguous(wide_width: u32, split: Vec<u32>) -> Result<Self, SimError> {
        let total: u32 = split.iter().sum();
        if total != wide_width || split.iter().any(|&w| w == 0) {
            return Err(SimError::WidthMismatch {
                left: wide_width,
                right: total,
                context: "splitter slice widths".into(),
            });
        }
        Ok(Self { wide_width, split, mappings: None })
    }

    /// A bit-mapped splitter. `mappings[j]` lists the wide-bus bit indices
    /// (LSB-based) carried by narrow port `j`, one per narrow bit, LSB
    /// first. The same wide bit may appear under multiple ports.
    pub fn mapped(wide_width: u32, mappings: Vec<Vec<u32>>) -> Result<Self, SimError> {
        if mappings.iter().any(|m| m.is_empty() || m.iter().any(|&b| b >= wide_width)) {
            return Err(SimError::ParseError(format!(
                "splitter bit mapping references bits outside a {wide_width}-wide bus"
            )));
        }
        let split = mappings.iter().map(|m| m.len() as u32).collect();
        Ok(Self { wide_width, split, mappings: Some(mappings) })
    }

    /// Number of narrow ports.
    pub fn narrow_count(&self) -> usize {
        self.split.len()
    }

    /// The ports this splitter drives given its most recent direction:
    /// the wide port alone after a merge, the narrow ports otherwise.
    pub fn output_ports(&self, last_op: SplitterOp) -> Vec<usize> {
        match last_op {
            SplitterOp::PropIn => vec![0],
            SplitterOp::PropOut | SplitterOp::None => (1..=self.split.len()).collect(),
        }
    }

    /// Splits a wide value into the narrow port values.
    fn prop_out(&self, wide: &BitValue) -> Vec<BitValue> {
        match &self.mappings {
            None => {
                let mut narrows = Vec::with_capacity(self.split.len());
                let mut offset = 0;
                for &w in &self.split {
                    // LSB offset o, width w => MSB-first range [W-o-w, W-o).
                    let hi = self.wide_width - offset;
                    narrows.push(wide.bit_slice(hi - w, Some(hi)));
                    offset += w;
                }
                narrows
            }
            Some(mappings) => mappings
                .iter()
                .map(|m| {
                    m.iter()
                        .rev()
                        .map(|&b| wide.get(self.wide_width - 1 - b).unwrap_or(false))
                        .collect()
                })
                .collect(),
        }
    }

    /// Merges the narrow port values into a wide value.
    fn prop_in(&self, narrows: &[BitValue], subsystem: &str) -> Result<BitValue, SimError> {
        for (j, (narrow, &w)) in narrows.iter().zip(&self.split).enumerate() {
            if narrow.width() != w {
                return Err(SimError::WidthMismatch {
                    left: w,
                    right: narrow.width(),
                    context: format!("splitter narrow port {j}"),
                });
            }
        }
        match &self.mappings {
            None => {
                // Highest slice first; narrow port order is LSB-slice first.
                let mut wide = BitValue::empty();
                for narrow in narrows.iter().rev() {
                    wide = wide.concat(narrow);
                }
                Ok(wide)
            }
            Some(mappings) => {
                let mut bits: Vec<Option<bool>> = vec![None; self.wide_width as usize];
                for (m, narrow) in mappings.iter().zip(narrows) {
                    for (k, &b) in m.iter().enumerate() {
                        let bit = narrow.get(narrow.width() - 1 - k as u32).unwrap_or(false);
                        match bits[b as usize] {
                            Some(existing) if existing != bit => {
                                return Err(SimError::SplitterContention {
                                    element: subsystem.to_string(),
                                })
                            }
                            _ => bits[b as usize] = Some(bit),
                        }
                    }
                }
                // Unmapped wide bits read as zero.
                Ok((0..self.wide_width)
                    .rev()
                    .map(|b| bits[b as usize].unwrap_or(false))
                    .collect())
            }
        }
    }
}
impl Component for Splitter {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        let mut ports = vec![PortProperties { ty: PortType::Inout, width: self.wide_width }];
        ports.extend(self.split.iter().map(|&w| PortProperties { ty: PortType::Inout, width: w }));
        ports
    }

    fn initialize_state(&self, _: &CircuitForest) -> Option<ElementState> {
        Some(ElementState::Splitter { last_op: SplitterOp::None })
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        let wide = &ctx.new_ports[0];
        let narrows: Option<Vec<BitValue>> =
            ctx.new_ports[1..].iter().map(|s| s.as_ref().cloned()).collect();

        let op = match (wide, &narrows) {
            (None, Some(_)) => SplitterOp::PropIn,
            (Some(_), None) => SplitterOp::PropOut,
            (None, None) => SplitterOp::None,
            (Some(w), Some(known)) => {
                if &self.prop_out(w) == known {
                    SplitterOp::None
                } else {
                    // Disagreement: the younger side wins. The minimum over
                    // narrow timestamps starts at +inf, never at the -1
                    // "unset" sentinel.
                    let t_wide = ctx.timestamps[0];
                    let t_narrow = ctx.timestamps[1..].iter().copied().fold(i64::MAX, i64::min);
                    match t_wide.cmp(&t_narrow) {
                        std::cmp::Ordering::Greater => SplitterOp::PropOut,
                        std::cmp::Ordering::Less => SplitterOp::PropIn,
                        std::cmp::Ordering::Equal => {
                            return Err(SimError::SplitterContention {
                                element: ctx.subsystem.to_string(),
                            })
                        }
                    }
                }
            }
        };

        let updates = match op {
            SplitterOp::None => vec![],
            SplitterOp::PropOut => {
                let Some(w) = wide else {
                    unreachable!("splitter cannot split without a wide value")
                };
                self.prop_out(w)
                    .into_iter()
                    .enumerate()
                    .map(|(j, value)| PortUpdate { index: 1 + j, value: Some(value) })
                    .collect()
            }
            SplitterOp::PropIn => {
                let Some(known) = &narrows else {
                    unreachable!("splitter cannot merge without all narrow values")
                };
                let merged = self.prop_in(known, ctx.subsystem)?;
                vec![PortUpdate { index: 0, value: Some(merged) }]
            }
        };

        if op != SplitterOp::None {
            if let Some(ElementState::Splitter { last_op }) = ctx.state {
                *last_op = op;
            }
        }
        Ok(updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits;
    use crate::element::harness::{run_stateless, run_with_state};
    use crate::element::{null_ports, Signal};
    use crate::logging::Logger;

    fn splitter_state() -> ElementState {
        ElementState::Splitter { last_op: SplitterOp::None }
    }

    /// Runs a splitter with explicit per-port timestamps.
    fn run_with_timestamps(
        s: &Splitter,
        new: &[Signal],
        timestamps: &[i64],
        state: &mut ElementState,
    ) -> Result<Vec<PortUpdate>, SimError> {
        let forest = CircuitForest::default();
        let logger = Logger::new();
        let old = null_ports(&s.ports(&forest));
        s.resolve(RunContext {
            old_ports: &old,
            new_ports: new,
            timestamps,
            state: Some(state),
            forest: &forest,
            logger: &logger,
            subsystem: "splitter0",
        })
    }

    #[test]
    fn test_split_wide_to_narrow() {
        let s = Splitter::contiguous(4, vec![2, 2]).unwrap();
        let mut state = splitter_state();
        let new = vec![Some(bits![1, 0, 1, 1]), None, None];

        let updates =
            run_with_state(&s, &null_ports(&s.ports(&Default::default())), &new, Some(&mut state)).unwrap();

        assert_eq!(
            updates,
            vec![
                PortUpdate { index: 1, value: Some(bits![1, 1]) },
                PortUpdate { index: 2, value: Some(bits![1, 0]) },
            ],
            "Splitting 1011 into 2+2 should put the low slice 11 on narrow port 0"
        );
        assert!(matches!(state, ElementState::Splitter { last_op: SplitterOp::PropOut }));
    }

    #[test]
    fn test_merge_narrow_to_wide() {
        let s = Splitter::contiguous(4, vec![2, 2]).unwrap();
        let mut state = splitter_state();
        let new = vec![None, Some(bits![1, 1]), Some(bits![1, 0])];

        let updates =
            run_with_state(&s, &null_ports(&s.ports(&Default::default())), &new, Some(&mut state)).unwrap();

        assert_eq!(
            updates,
            vec![PortUpdate { index: 0, value: Some(bits![1, 0, 1, 1]) }],
            "Merging narrows 11 and 10 should recover the wide value 1011"
        );
        assert!(matches!(state, ElementState::Splitter { last_op: SplitterOp::PropIn }));
    }

    #[test]
    fn test_split_then_merge_roundtrip() {
        let s = Splitter::contiguous(6, vec![1, 2, 3]).unwrap();
        let wide = bits![1, 0, 1, 1, 0, 1];
        let narrows = s.prop_out(&wide);
        assert_eq!(narrows.len(), 3);
        assert_eq!(
            s.prop_in(&narrows, "s").unwrap(),
            wide,
            "propOut followed by propIn should recover the wide value"
        );
    }

    #[test]
    fn test_consistent_sides_do_nothing() {
        let s = Splitter::contiguous(4, vec![2, 2]).unwrap();
        let mut state = splitter_state();
        let new = vec![Some(bits![1, 0, 1, 1]), Some(bits![1, 1]), Some(bits![1, 0])];

        let updates = run_with_timestamps(&s, &new, &[3, 3, 3], &mut state).unwrap();
        assert!(updates.is_empty(), "Agreeing sides should not propagate anything");
    }

    #[test]
    fn test_newer_side_wins() {
        let s = Splitter::contiguous(4, vec![2, 2]).unwrap();
        let mut state = splitter_state();
        let disagreeing = vec![Some(bits![1, 0, 1, 1]), Some(bits![0, 0]), Some(bits![0, 0])];

        // Wide updated at t=5, narrows at t=2 and t=3: wide side wins.
        let updates = run_with_timestamps(&s, &disagreeing, &[5, 2, 3], &mut state).unwrap();
        assert_eq!(updates[0], PortUpdate { index: 1, value: Some(bits![1, 1]) });

        // Narrows updated later: they win.
        let updates = run_with_timestamps(&s, &disagreeing, &[1, 2, 3], &mut state).unwrap();
        assert_eq!(
            updates,
            vec![PortUpdate { index: 0, value: Some(bits![0, 0, 0, 0]) }],
            "With younger narrows the merge direction should be chosen"
        );
    }

    #[test]
    fn test_contention_at_equal_timestamps() {
        let s = Splitter::contiguous(4, vec![2, 2]).unwrap();
        let mut state = splitter_state();
        let disagreeing = vec![Some(bits![1, 0, 1, 1]), Some(bits![0, 0]), Some(bits![0, 0])];

        let err = run_with_timestamps(&s, &disagreeing, &[3, 3, 5], &mut state).unwrap_err();
        assert!(
            matches!(err, SimError::SplitterContention { .. }),
            "Equal timestamps with disagreeing values should fault, got {err:?}"
        );
    }

    #[test]
    fn test_mapped_split() {
        // Narrow 0 carries wide bits 0 and 2 (LSB-based); narrow 1 carries bit 3.
        let s = Splitter::mapped(4, vec![vec![0, 2], vec![3]]).unwrap();
        // wide = 1011 (MSB first) => LSB-based bits: b0=1 b1=1 b2=0 b3=1
        let narrows = s.prop_out(&bits![1, 0, 1, 1]);
        assert_eq!(narrows[0], bits![0, 1], "Narrow 0 should read wide bits 2,0 as 01");
        assert_eq!(narrows[1], bits![1], "Narrow 1 should read wide bit 3");
    }

    #[test]
    fn test_mapped_merge_conflict() {
        // Both narrows claim wide bit 0.
        let s = Splitter::mapped(2, vec![vec![0], vec![0, 1]]).unwrap();
        let err = s.prop_in(&[bits![1], bits![1, 0]], "s").unwrap_err();
        assert!(matches!(err, SimError::SplitterContention { .. }));

        // Agreeing claims merge fine; unmapped bits would read zero.
        let wide = s.prop_in(&[bits![0], bits![1, 0]], "s").unwrap();
        assert_eq!(wide, bits![1, 0]);
    }

    #[test]
    fn test_slice_widths_must_cover_bus() {
        assert!(Splitter::contiguous(4, vec![2, 1]).is_err(), "3 bits cannot cover a 4-bit bus");
        assert!(Splitter::contiguous(4, vec![2, 2]).is_ok());
    }

    #[test]
    fn test_output_ports_follow_direction() {
        let s = Splitter::contiguous(4, vec![2, 2]).unwrap();
        assert_eq!(s.output_ports(SplitterOp::PropIn), vec![0]);
        assert_eq!(s.output_ports(SplitterOp::PropOut), vec![1, 2]);
    }

    #[test]
    fn test_extend_makes_copies() {
        let e = Extend::new(4);
        let old = null_ports(&e.ports(&Default::default()));

        let updates = run_stateless(&e, &old, &[Some(bits![1]), None]).unwrap();
        assert_eq!(updates, vec![PortUpdate { index: 1, value: Some(bits![1, 1, 1, 1]) }]);

        let updates = run_stateless(&e, &old, &[Some(bits![0]), None]).unwrap();
        assert_eq!(updates, vec![PortUpdate { index: 1, value: Some(bits![0, 0, 0, 0]) }]);
    }

    #[test]
    fn test_constant_and_rails() {
        let c = Constant::new(bits![1, 0]);
        let updates = run_stateless(&c, &[None], &[None]).unwrap();
        assert_eq!(updates, vec![PortUpdate { index: 0, value: Some(bits![1, 0]) }]);

        let p = Power::new(2);
        let updates = run_stateless(&p, &[None], &[None]).unwrap();
        assert_eq!(updates, vec![PortUpdate { index: 0, value: Some(bits![1, 1]) }]);

        let g = Ground::new(2);
        let updates = run_stateless(&g, &[None], &[None]).unwrap();
        assert_eq!(updates, vec![PortUpdate { index: 0, value: Some(bits![0, 0]) }]);
    }

    #[test]
    fn test_input_seed_round_trip() {
        let input = Input::new(2);
        let mut state = input.initialize_state(&Default::default()).unwrap();
        input.initialize_with(Some(&mut state), bits![1, 0]).unwrap();

        let updates = run_with_state(&input, &[None], &[None], Some(&mut state)).unwrap();
        assert_eq!(updates, vec![PortUpdate { index: 0, value: Some(bits![1, 0]) }]);

        let err = input.initialize_with(Some(&mut state), bits![1]).unwrap_err();
        assert!(matches!(err, SimError::WidthMismatch { .. }), "Seeding a wrong width should fail");
    }
}
