//! Addressable word storage.
//!
//! RAM control signals are active-low (chip select, output enable, write
//! enable), matching the loaders' conventions; the reset pin is
//! active-high and clears the entire store. Out-of-range addresses are a
//! logged warning, never a fault: reads return null and writes are
//! dropped.

use crate::bitvalue::BitValue;
use crate::circuit::CircuitForest;
use crate::element::{
    is_high, is_low, port_list, Component, ElementState, PortProperties, PortType, PortUpdate,
    RunContext, Signal,
};
use crate::error::SimError;
use crate::logging::Level;

/// Maximum address width for RAM/ROM.
pub const MAX_ADDR_WIDTH: u32 = 20;

/// Normalizes loader-supplied contents into exactly `capacity` words of
/// `width` bits (truncating from the MSB end or zero-padding).
fn normalize_contents(contents: Vec<BitValue>, width: u32, capacity: u64) -> Vec<BitValue> {
    let mut words: Vec<BitValue> = contents.into_iter().map(|w| w.sized(width)).collect();
    words.resize(capacity as usize, BitValue::low(width));
    words.truncate(capacity as usize);
    words
}

/// Splits a flat image into words of `width` bits, MSB end first.
/// The image width must be a multiple of the word width.
fn image_words(image: &BitValue, width: u32) -> Result<Vec<BitValue>, SimError> {
    if image.width() % width != 0 {
        return Err(SimError::WidthMismatch {
            left: image.width(),
            right: width,
            context: "memory image must be a multiple of the word width".into(),
        });
    }
    Ok((0..image.width() / width)
        .map(|i| image.bit_slice(i * width, Some((i + 1) * width)))
        .collect())
}

/// Reads an address port, or None when it is null.
fn read_addr(sig: &Signal) -> Option<u64> {
    sig.as_ref().and_then(BitValue::as_unsigned)
}

/// A random-access memory.
///
/// Ports: `[0]` address, `[1]` data in, `[2]` chip select (active low),
/// `[3]` output enable (active low), `[4]` write enable (active low),
/// `[5]` reset (active high), `[6]` data out.
///
/// The output is null unless the chip is selected, output is enabled and
/// the address is in range. Writes happen while the chip is selected and
/// write enable is low. Reset clears the whole store to zero and drives
/// the output to zero.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct Ram {
    width: u32,
    addr_width: u32,
    capacity: u64,
    initial: Vec<BitValue>,
}
impl Ram {
    /// Creates a zero-initialized RAM of `2^addr_width` words.
    pub fn new(width: u32, addr_width: u32) -> Self {
        Self::with_contents(width, addr_width, Vec::new())
    }

    /// Creates a RAM whose initial words come from the loader.
    /// Contents are truncated or padded to the word width and the capacity.
    pub fn with_contents(width: u32, addr_width: u32, contents: Vec<BitValue>) -> Self {
        let addr_width = addr_width.clamp(1, MAX_ADDR_WIDTH);
        Self::with_capacity(width, addr_width, 1 << addr_width, contents)
    }

    /// Creates a RAM with a capacity below `2^addr_width`; addresses at or
    /// past the capacity are out of range.
    pub fn with_capacity(width: u32, addr_width: u32, capacity: u64, contents: Vec<BitValue>) -> Self {
        let width = width.max(1);
        let addr_width = addr_width.clamp(1, MAX_ADDR_WIDTH);
        let capacity = capacity.clamp(1, 1 << addr_width);
        Self { width, addr_width, capacity, initial: normalize_contents(contents, width, capacity) }
    }

    /// Word width in bits.
    pub fn word_width(&self) -> u32 {
        self.width
    }

    /// Capacity in words.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}
impl Component for Ram {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            // address
            (PortProperties { ty: PortType::Input, width: self.addr_width }, 1),
            // data in
            (PortProperties { ty: PortType::Input, width: self.width }, 1),
            // chip select, output enable, write enable, reset
            (PortProperties { ty: PortType::Input, width: 1 }, 4),
            // data out
            (PortProperties { ty: PortType::Output, width: self.width }, 1),
        ])
    }

    fn initialize_state(&self, _: &CircuitForest) -> Option<ElementState> {
        Some(ElementState::Memory(self.initial.clone()))
    }

    fn initialize_with(&self, state: Option<&mut ElementState>, value: BitValue) -> Result<(), SimError> {
        let words = image_words(&value, self.width)?;
        match state {
            Some(ElementState::Memory(mem)) => {
                for (slot, word) in mem.iter_mut().zip(words) {
                    *slot = word;
                }
                Ok(())
            }
            _ => Err(SimError::BadInput("memory state missing".into())),
        }
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        let subsystem = ctx.subsystem;
        let logger = ctx.logger;
        let Some(ElementState::Memory(mem)) = ctx.state else {
            return Err(SimError::BadInput("memory state missing".into()));
        };

        if is_high(&ctx.new_ports[5]) {
            mem.fill(BitValue::low(self.width));
            return Ok(vec![PortUpdate { index: 6, value: Some(BitValue::low(self.width)) }]);
        }

        if !is_low(&ctx.new_ports[2]) {
            // Chip deselected.
            return Ok(vec![PortUpdate { index: 6, value: None }]);
        }

        let addr = read_addr(&ctx.new_ports[0]);
        if is_low(&ctx.new_ports[4]) {
            match (addr, &ctx.new_ports[1]) {
                (Some(a), Some(data)) if a < self.capacity => {
                    mem[a as usize] = data.sized(self.width);
                }
                (Some(a), Some(_)) => {
                    logger.log(
                        Level::Warning,
                        subsystem,
                        format_args!("write to address {a} dropped (capacity {})", self.capacity),
                    );
                }
                _ => {}
            }
        }

        let value = match addr {
            Some(a) if a < self.capacity => {
                is_low(&ctx.new_ports[3]).then(|| mem[a as usize].clone())
            }
            Some(a) => {
                logger.log(
                    Level::Warning,
                    subsystem,
                    format_args!("read from address {a} out of range (capacity {})", self.capacity),
                );
                None
            }
            None => None,
        };
        Ok(vec![PortUpdate { index: 6, value }])
    }
}

/// A read-only memory: a RAM with no data-in and no write enable.
///
/// Ports: `[0]` address, `[1]` chip select (active low), `[2]` data out.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct Rom {
    width: u32,
    addr_width: u32,
    capacity: u64,
    contents: Vec<BitValue>,
}
impl Rom {
    /// Creates a ROM whose words come from the loader.
    /// Contents are truncated or padded to the word width and the capacity.
    pub fn new(width: u32, addr_width: u32, contents: Vec<BitValue>) -> Self {
        let width = width.max(1);
        let addr_width = addr_width.clamp(1, MAX_ADDR_WIDTH);
        let capacity = 1 << addr_width;
        Self { width, addr_width, capacity, contents: normalize_contents(contents, width, capacity) }
    }

    /// Word width in bits.
    pub fn word_width(&self) -> u32 {
        self.width
    }

    /// Capacity in words.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}
impl Component for Rom {
    fn ports(&self, _: &CircuitForest) -> Vec<PortProperties> {
        port_list(&[
            // address
            (PortProperties { ty: PortType::Input, width: self.addr_width }, 1),
            // chip select
            (PortProperties { ty: PortType::Input, width: 1 }, 1),
            // data out
            (PortProperties { ty: PortType::Output, width: self.width }, 1),
        ])
    }

    fn initialize_state(&self, _: &CircuitForest) -> Option<ElementState> {
        Some(ElementState::Memory(self.contents.clone()))
    }

    fn initialize_with(&self, state: Option<&mut ElementState>, value: BitValue) -> Result<(), SimError> {
        let words = image_words(&value, self.width)?;
        match state {
            Some(ElementState::Memory(mem)) => {
                for (slot, word) in mem.iter_mut().zip(words) {
                    *slot = word;
                }
                Ok(())
            }
            _ => Err(SimError::BadInput("memory state missing".into())),
        }
    }

    fn resolve_inner(&self, ctx: RunContext<'_>) -> Result<Vec<PortUpdate>, SimError> {
        let Some(ElementState::Memory(mem)) = ctx.state else {
            return Err(SimError::BadInput("memory state missing".into()));
        };
        let value = match (is_low(&ctx.new_ports[1]), read_addr(&ctx.new_ports[0])) {
            (true, Some(a)) if a < self.capacity => Some(mem[a as usize].clone()),
            (true, Some(a)) => {
                ctx.logger.log(
                    Level::Warning,
                    ctx.subsystem,
                    format_args!("read from address {a} out of range (capacity {})", self.capacity),
                );
                None
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
    use crate::element::harness::run_with_state;

    /// address, data-in, cs, oe, we, reset, dout
    fn ram_ports(addr: u64, data: Option<&BitValue>, cs: u64, oe: u64, we: u64, reset: u64) -> Vec<Signal> {
        vec![
            Some(BitValue::from_u64(addr, 2)),
            data.cloned(),
            Some(BitValue::from_u64(cs, 1)),
            Some(BitValue::from_u64(oe, 1)),
            Some(BitValue::from_u64(we, 1)),
            Some(BitValue::from_u64(reset, 1)),
            None,
        ]
    }

    #[test]
    fn test_ram_write_then_read() {
        let ram = Ram::new(2, 2);
        let mut state = ram.initialize_state(&Default::default()).unwrap();
        let word = bits![1, 1];

        // Write "11" to address 01 with CS=0, WE=0 (OE high: output stays null).
        let writing = ram_ports(1, Some(&word), 0, 1, 0, 0);
        let updates = run_with_state(&ram, &writing, &writing, Some(&mut state)).unwrap();
        assert_eq!(updates, vec![PortUpdate { index: 6, value: None }]);

        // WE=1, OE=0, CS=0: the stored word comes back.
        let reading = ram_ports(1, None, 0, 0, 1, 0);
        let updates = run_with_state(&ram, &writing, &reading, Some(&mut state)).unwrap();
        assert_eq!(
            updates,
            vec![PortUpdate { index: 6, value: Some(word) }],
            "The written word should read back at the same address"
        );
    }

    #[test]
    fn test_ram_deselected_is_null() {
        let ram = Ram::new(2, 2);
        let mut state = ram.initialize_state(&Default::default()).unwrap();

        let deselected = ram_ports(1, None, 1, 0, 1, 0);
        let updates = run_with_state(&ram, &deselected, &deselected, Some(&mut state)).unwrap();
        assert_eq!(
            updates,
            vec![PortUpdate { index: 6, value: None }],
            "A deselected chip should not drive its output"
        );
    }

    #[test]
    fn test_ram_reset_clears_and_drives_zero() {
        let ram = Ram::new(2, 2);
        let mut state = ram.initialize_state(&Default::default()).unwrap();
        let word = bits![1, 1];

        let writing = ram_ports(1, Some(&word), 0, 1, 0, 0);
        run_with_state(&ram, &writing, &writing, Some(&mut state)).unwrap();

        let resetting = ram_ports(1, None, 0, 0, 1, 1);
        let updates = run_with_state(&ram, &writing, &resetting, Some(&mut state)).unwrap();
        assert_eq!(
            updates,
            vec![PortUpdate { index: 6, value: Some(bits![0, 0]) }],
            "Reset should drive the output to zero"
        );

        let reading = ram_ports(1, None, 0, 0, 1, 0);
        let updates = run_with_state(&ram, &resetting, &reading, Some(&mut state)).unwrap();
        assert_eq!(
            updates,
            vec![PortUpdate { index: 6, value: Some(bits![0, 0]) }],
            "Reset should have cleared the stored word"
        );
    }

    #[test]
    fn test_ram_initialize_from_image() {
        let ram = Ram::new(2, 2);
        let mut state = ram.initialize_state(&Default::default()).unwrap();

        // Image 8 bits = 4 words of 2, extracted MSB end first.
        ram.initialize_with(Some(&mut state), bits![1, 1, 1, 0, 0, 1, 0, 0]).unwrap();
        let ElementState::Memory(mem) = &state else { panic!("memory state expected") };
        assert_eq!(mem[0], bits![1, 1]);
        assert_eq!(mem[1], bits![1, 0]);
        assert_eq!(mem[2], bits![0, 1]);
        assert_eq!(mem[3], bits![0, 0]);

        // A non-multiple image must be rejected.
        let err = ram.initialize_with(Some(&mut state), bits![1, 1, 1]).unwrap_err();
        assert!(matches!(err, SimError::WidthMismatch { .. }));
    }

    #[test]
    fn test_rom_reads_contents_and_honors_enable() {
        let rom = Rom::new(2, 2, vec![bits![1, 0], bits![0, 1]]);
        let mut state = rom.initialize_state(&Default::default()).unwrap();

        let enabled = vec![Some(BitValue::from_u64(0, 2)), Some(bits![0]), None];
        let updates = run_with_state(&rom, &enabled, &enabled, Some(&mut state)).unwrap();
        assert_eq!(updates, vec![PortUpdate { index: 2, value: Some(bits![1, 0]) }]);

        let disabled = vec![Some(BitValue::from_u64(0, 2)), Some(bits![1]), None];
        let updates = run_with_state(&rom, &enabled, &disabled, Some(&mut state)).unwrap();
        assert_eq!(
            updates,
            vec![PortUpdate { index: 2, value: None }],
            "A disabled ROM should not drive its output"
        );
    }

    #[test]
    fn test_rom_unfilled_words_read_zero() {
        let rom = Rom::new(2, 2, vec![bits![1, 1]]);
        let mut state = rom.initialize_state(&Default::default()).unwrap();

        let at = |addr: u64| vec![Some(BitValue::from_u64(addr, 2)), Some(bits![0]), None];
        let updates = run_with_state(&rom, &at(3), &at(3), Some(&mut state)).unwrap();
        assert_eq!(updates, vec![PortUpdate { index: 2, value: Some(bits![0, 0]) }]);
    }
}
