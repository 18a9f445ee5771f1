// Interrupt controller: enable mask, pending flags, and master enable over
// the fourteen interrupt sources, with write-one-to-clear semantics on the
// pending-flags register.

/// One of the fourteen interrupt sources, in bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptSource {
    VBlank,
    HBlank,
    VCount,
    Timer0,
    Timer1,
    Timer2,
    Timer3,
    Serial,
    Dma0,
    Dma1,
    Dma2,
    Dma3,
    Keypad,
    GamePak,
}

impl InterruptSource {
    pub const ALL: [InterruptSource; 14] = [
        InterruptSource::VBlank,
        InterruptSource::HBlank,
        InterruptSource::VCount,
        InterruptSource::Timer0,
        InterruptSource::Timer1,
        InterruptSource::Timer2,
        InterruptSource::Timer3,
        InterruptSource::Serial,
        InterruptSource::Dma0,
        InterruptSource::Dma1,
        InterruptSource::Dma2,
        InterruptSource::Dma3,
        InterruptSource::Keypad,
        InterruptSource::GamePak,
    ];

    pub const fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

#[derive(Debug, Default)]
pub struct InterruptController {
    enable: u16,
    pending: u16,
    master_enable: bool,
}

impl InterruptController {
    pub fn new() -> Self {
        InterruptController::default()
    }

    pub fn enable_register(&self) -> u16 {
        self.enable
    }

    pub fn set_enable_register(&mut self, value: u16) {
        self.enable = value;
    }

    pub fn pending_register(&self) -> u16 {
        self.pending
    }

    /// Guest writes a 1 to clear the corresponding pending bit; bits written
    /// as 0 are left untouched.
    pub fn acknowledge(&mut self, written: u16) {
        self.pending &= !written;
    }

    pub fn master_enable(&self) -> bool {
        self.master_enable
    }

    pub fn set_master_enable(&mut self, value: bool) {
        self.master_enable = value;
    }

    pub fn raise(&mut self, source: InterruptSource) {
        self.pending |= source.bit();
        log::trace!("interrupt raised: {source:?}");
    }

    /// Whether an interrupt is currently eligible for delivery, ignoring
    /// the processor's own disable-interrupts bit (the caller checks that).
    pub fn has_deliverable(&self) -> bool {
        self.master_enable && (self.enable & self.pending) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raising_a_source_sets_its_pending_bit() {
        let mut ic = InterruptController::new();
        ic.raise(InterruptSource::VBlank);
        assert_eq!(ic.pending_register() & InterruptSource::VBlank.bit(), InterruptSource::VBlank.bit());
    }

    #[test]
    fn acknowledge_clears_only_the_written_bits() {
        let mut ic = InterruptController::new();
        ic.raise(InterruptSource::VBlank);
        ic.raise(InterruptSource::HBlank);
        ic.acknowledge(InterruptSource::VBlank.bit());
        assert_eq!(ic.pending_register(), InterruptSource::HBlank.bit());
    }

    #[test]
    fn delivery_requires_master_enable_and_unmasked_pending_bit() {
        let mut ic = InterruptController::new();
        ic.raise(InterruptSource::Timer0);
        assert!(!ic.has_deliverable(), "enable mask is still zero");

        ic.set_enable_register(InterruptSource::Timer0.bit());
        assert!(!ic.has_deliverable(), "master enable is still off");

        ic.set_master_enable(true);
        assert!(ic.has_deliverable());
    }
}
