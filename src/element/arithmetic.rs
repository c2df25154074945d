use crate::bitvalue::BitValue;
use crate::circuit::CircuitForest;
use crate::element::{
    is_high, port_list, Component, PortProperties, PortType, PortUpdate, RunContext,
};
use crate::error::SimError;

/// An adder.
///
/// Ports: `[0]` A, `[1]` B, `[2]` carry in, `[3]` carry out, `[4]` sum.
/// The sum wraps at the width; the wrap surfaces on the carry-out port. A
/// null A or B makes both outputs null; a null carry in is treated as zero.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Adder {
    width: u32,
}
impl Adder {
    /// Creates a new adder with the specified width.
    pub fn new(width: u32) -> Self {
        Self { width: width.max(1) }
    }
}
impl Component for Adder {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            // inputs A and B
            (PortProperties { ty: PortType::Input, width: self.width }, 2),
            // carry in
            (PortProperties { ty: PortType::Input, width: 1 }, 1),
            // carry out
            (PortProperties { ty: PortType::Output, width: 1 }, 1),
            // sum
            (PortProperties { ty: PortType::Output, width: self.width }, 1),
        ])
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        let (Some(a), Some(b)) = (&ctx.new_ports[0], &ctx.new_ports[1]) else {
            return Ok(vec![
                PortUpdate { index: 3, value: None },
                PortUpdate { index: 4, value: None },
            ]);
        };
        if a.width() != b.width() {
            return Err(SimError::WidthMismatch {
                left: a.width(),
                right: b.width(),
                context: "adder operands".into(),
            });
        }
        let cin = is_high(&ctx.new_ports[2]);

        let (sum, cout) = a.add_with_carry(b, cin);
        Ok(vec![
            PortUpdate { index: 3, value: Some(BitValue::from(cout)) },
            PortUpdate { index: 4, value: Some(sum) },
        ])
    }
}

/// A two's complementer: output = `!input + 1` at the input width.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct TwosComplement {
    width: u32,
}
impl TwosComplement {
    /// Creates a new two's complementer with the specified width.
    pub fn new(width: u32) -> Self {
        Self { width: width.max(1) }
    }
}
impl Component for TwosComplement {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            (PortProperties { ty: PortType::Input, width: self.width }, 1),
            (PortProperties { ty: PortType::Output, width: self.width }, 1),
        ])
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        let value = ctx.new_ports[0].as_ref().map(BitValue::twos_complement);
        Ok(vec![PortUpdate { index: 1, value }])
    }
}

/// ALU control codes (3 bits, read unsigned).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AluOp {
    And,     // 000
    Or,      // 001
    Add,     // 010
    AndNot,  // 100
    OrNot,   // 101
    Sub,     // 110
    LessThan, // 111
    Unknown,
}
impl AluOp {
    fn decode(code: u64) -> Self {
        match code {
            0b000 => AluOp::And,
            0b001 => AluOp::Or,
            0b010 => AluOp::Add,
            0b100 => AluOp::AndNot,
            0b101 => AluOp::OrNot,
            0b110 => AluOp::Sub,
            0b111 => AluOp::LessThan,
            _ => AluOp::Unknown,
        }
    }
}

/// An arithmetic-logic unit.
///
/// Ports: `[0]` A, `[1]` B, `[2]` control (3 bits), `[3]` carry out,
/// `[4]` result. Control codes: 000 A&B, 001 A|B, 010 A+B (with carry out),
/// 100 A&!B, 101 A|!B, 110 A-B, 111 A<B unsigned; unrecognized codes drive
/// the result low. The carry-out port is meaningful for add and subtract
/// (the subtract carry is the no-borrow flag) and low otherwise.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Alu {
    width: u32,
}
impl Alu {
    /// Creates a new ALU with the specified width.
    pub fn new(width: u32) -> Self {
        Self { width: width.max(1) }
    }
}
impl Component for Alu {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            // inputs A and B
            (PortProperties { ty: PortType::Input, width: self.width }, 2),
            // control
            (PortProperties { ty: PortType::Input, width: 3 }, 1),
            // carry out
            (PortProperties { ty: PortType::Output, width: 1 }, 1),
            // result
            (PortProperties { ty: PortType::Output, width: self.width }, 1),
        ])
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        let inputs = (&ctx.new_ports[0], &ctx.new_ports[1], &ctx.new_ports[2]);
        let ((Some(a), Some(b)), Some(ctl)) = ((inputs.0, inputs.1), inputs.2) else {
            return Ok(vec![
                PortUpdate { index: 3, value: None },
                PortUpdate { index: 4, value: None },
            ]);
        };
        if a.width() != b.width() {
            return Err(SimError::WidthMismatch {
                left: a.width(),
                right: b.width(),
                context: "alu operands".into(),
            });
        }

        let code = ctl.as_unsigned().unwrap_or(u64::MAX);
        let (result, carry) = match AluOp::decode(code) {
            AluOp::And => (a.and(b)?, false),
            AluOp::Or => (a.or(b)?, false),
            AluOp::Add => a.add_with_carry(b, false),
            AluOp::AndNot => (a.and(&b.not())?, false),
            AluOp::OrNot => (a.or(&b.not())?, false),
            AluOp::Sub => a.add_with_carry(&b.not(), true),
            AluOp::LessThan => (
                BitValue::from_u64(a.less_than(b)? as u64, self.width),
                false,
            ),
            AluOp::Unknown => (BitValue::low(self.width), false),
        };
        Ok(vec![
            PortUpdate { index: 3, value: Some(BitValue::from(carry)) },
            PortUpdate { index: 4, value: Some(result) },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits;
    use crate::element::harness::run_stateless;
    use crate::element::null_ports;

    fn adder_ports(a: u64, b: u64, cin: bool) -> Vec<crate::element::Signal> {
        vec![
            Some(BitValue::from_u64(a, 4)),
            Some(BitValue::from_u64(b, 4)),
            Some(BitValue::from(cin)),
            None,
            None,
        ]
    }

    #[test]
    fn test_adder_sums() {
        let adder = Adder::new(4);
        let old = null_ports(&adder.ports(&Default::default()));

        let updates = run_stateless(&adder, &old, &adder_ports(9, 4, false)).unwrap();
        assert_eq!(
            updates,
            vec![
                PortUpdate { index: 3, value: Some(bits![0]) },
                PortUpdate { index: 4, value: Some(BitValue::from_u64(13, 4)) },
            ],
            "9 + 4 = 13 with no carry"
        );
    }

    #[test]
    fn test_adder_wraps_with_carry_out() {
        let adder = Adder::new(4);
        let old = null_ports(&adder.ports(&Default::default()));

        let updates = run_stateless(&adder, &old, &adder_ports(15, 1, false)).unwrap();
        assert_eq!(
            updates,
            vec![
                PortUpdate { index: 3, value: Some(bits![1]) },
                PortUpdate { index: 4, value: Some(BitValue::from_u64(0, 4)) },
            ],
            "15 + 1 should wrap to 0 and raise carry out"
        );
    }

    #[test]
    fn test_adder_carry_in() {
        let adder = Adder::new(4);
        let old = null_ports(&adder.ports(&Default::default()));

        let updates = run_stateless(&adder, &old, &adder_ports(5, 5, true)).unwrap();
        assert_eq!(updates[1], PortUpdate { index: 4, value: Some(BitValue::from_u64(11, 4)) });
    }

    #[test]
    fn test_adder_null_operand() {
        let adder = Adder::new(4);
        let old = null_ports(&adder.ports(&Default::default()));
        let mut ports = adder_ports(5, 5, false);
        ports[1] = None;

        let updates = run_stateless(&adder, &old, &ports).unwrap();
        assert_eq!(
            updates,
            vec![
                PortUpdate { index: 3, value: None },
                PortUpdate { index: 4, value: None },
            ],
            "A null operand should null both outputs"
        );
    }

    #[test]
    fn test_twos_complement_element() {
        let tc = TwosComplement::new(4);
        let updates = run_stateless(&tc, &[None, None], &[Some(BitValue::from_u64(3, 4)), None]).unwrap();
        assert_eq!(
            updates,
            vec![PortUpdate { index: 1, value: Some(BitValue::from_u64(13, 4)) }],
            "-3 mod 16 = 13"
        );
    }

    fn alu_ports(a: u64, b: u64, ctl: u64) -> Vec<crate::element::Signal> {
        vec![
            Some(BitValue::from_u64(a, 4)),
            Some(BitValue::from_u64(b, 4)),
            Some(BitValue::from_u64(ctl, 3)),
            None,
            None,
        ]
    }

    #[test]
    fn test_alu_control_table() {
        let alu = Alu::new(4);
        let old = null_ports(&alu.ports(&Default::default()));
        let cases = [
            (0b000, 0b1010, 0b0110, 0b0010), // and
            (0b001, 0b1010, 0b0110, 0b1110), // or
            (0b010, 9, 4, 13),               // add
            (0b100, 0b1010, 0b0110, 0b1000), // a & !b
            (0b101, 0b1010, 0b0110, 0b1011), // a | !b
            (0b110, 9, 4, 5),                // sub
            (0b111, 3, 9, 1),                // a < b
            (0b011, 9, 4, 0),                // unknown code drives low
        ];
        for (ctl, a, b, expected) in cases {
            let updates = run_stateless(&alu, &old, &alu_ports(a, b, ctl)).unwrap();
            assert_eq!(
                updates[1],
                PortUpdate { index: 4, value: Some(BitValue::from_u64(expected, 4)) },
                "ALU control {ctl:03b} over a={a} b={b} should produce {expected}"
            );
        }
    }

    #[test]
    fn test_alu_subtract_no_borrow_flag() {
        let alu = Alu::new(4);
        let old = null_ports(&alu.ports(&Default::default()));

        let updates = run_stateless(&alu, &old, &alu_ports(9, 4, 0b110)).unwrap();
        assert_eq!(
            updates[0],
            PortUpdate { index: 3, value: Some(bits![1]) },
            "9 - 4 should raise the no-borrow carry"
        );

        let updates = run_stateless(&alu, &old, &alu_ports(4, 9, 0b110)).unwrap();
        assert_eq!(
            updates[0],
            PortUpdate { index: 3, value: Some(bits![0]) },
            "4 - 9 should clear the no-borrow carry"
        );
    }
}
