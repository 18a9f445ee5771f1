// DMA engine: four independent channels that steal processor cycles to
// copy memory on immediate, VBlank, HBlank, or special triggers. The engine
// runs synchronously -- `fire` performs the whole transfer inline using the
// bus's bypassing accessors, so it never needs its own scheduling state.

use crate::interrupt::{InterruptController, InterruptSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressStep {
    Increment,
    Decrement,
    Fixed,
    /// Destination-only: behaves as increment during the run, then the
    /// destination is restored to its original value afterward.
    IncrementReload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkSize {
    Halfword,
    Word,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    Immediate,
    VBlank,
    HBlank,
    Special,
}

#[derive(Debug, Clone, Copy)]
pub struct DmaChannel {
    pub source: u32,
    pub destination: u32,
    pub count: u32,
    pub source_step: AddressStep,
    pub destination_step: AddressStep,
    pub chunk_size: ChunkSize,
    pub repeat: bool,
    pub trigger: TriggerMode,
    pub irq_on_complete: bool,
    pub enabled: bool,
    original_destination: u32,
}

impl Default for DmaChannel {
    fn default() -> Self {
        DmaChannel {
            source: 0,
            destination: 0,
            count: 0,
            source_step: AddressStep::Increment,
            destination_step: AddressStep::Increment,
            chunk_size: ChunkSize::Halfword,
            repeat: false,
            trigger: TriggerMode::Immediate,
            irq_on_complete: false,
            enabled: false,
            original_destination: 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct DmaController {
    channels: [DmaChannel; 4],
}

fn source(channel: usize) -> InterruptSource {
    match channel {
        0 => InterruptSource::Dma0,
        1 => InterruptSource::Dma1,
        2 => InterruptSource::Dma2,
        _ => InterruptSource::Dma3,
    }
}

impl DmaController {
    pub fn new() -> Self {
        DmaController::default()
    }

    pub fn channel(&self, index: usize) -> &DmaChannel {
        &self.channels[index]
    }

    pub fn set_source(&mut self, index: usize, address: u32) {
        self.channels[index].source = address;
    }

    pub fn set_destination(&mut self, index: usize, address: u32) {
        self.channels[index].destination = address;
        self.channels[index].original_destination = address;
    }

    pub fn set_count(&mut self, index: usize, count: u32) {
        self.channels[index].count = count;
    }

    /// Decodes a control word and arms the channel. Returns `true` when the
    /// trigger is immediate, meaning the caller must invoke `fire` now.
    pub fn arm(&mut self, index: usize, control: u16) -> bool {
        let channel = &mut self.channels[index];
        channel.destination_step = match (control >> 5) & 0x3 {
            0 => AddressStep::Increment,
            1 => AddressStep::Decrement,
            2 => AddressStep::Fixed,
            _ => AddressStep::IncrementReload,
        };
        channel.source_step = match (control >> 7) & 0x3 {
            0 => AddressStep::Increment,
            1 => AddressStep::Decrement,
            _ => AddressStep::Fixed,
        };
        channel.repeat = control & (1 << 9) != 0;
        channel.chunk_size = if control & (1 << 10) != 0 {
            ChunkSize::Word
        } else {
            ChunkSize::Halfword
        };
        channel.trigger = match (control >> 12) & 0x3 {
            0 => TriggerMode::Immediate,
            1 => TriggerMode::VBlank,
            2 => TriggerMode::HBlank,
            _ => TriggerMode::Special,
        };
        channel.irq_on_complete = control & (1 << 14) != 0;
        channel.enabled = control & (1 << 15) != 0;
        channel.original_destination = channel.destination;

        channel.enabled && channel.trigger == TriggerMode::Immediate
    }

    /// Called by the pixel pipeline on frame events; fires every armed
    /// channel whose trigger matches, in channel-index order.
    pub fn on_event(&self, kind: TriggerMode) -> Vec<usize> {
        (0..4)
            .filter(|&i| self.channels[i].enabled && self.channels[i].trigger == kind)
            .collect()
    }

    /// Runs one full transfer for `index` using `copy` to move one chunk at
    /// a time (the caller supplies the bus's bypassing read/write so the
    /// controller itself never touches memory directly).
    pub fn fire(
        &mut self,
        index: usize,
        interrupts: &mut InterruptController,
        mut copy: impl FnMut(u32, u32, ChunkSize),
    ) {
        let (mut src, mut dst, count, src_step, dst_step, chunk_size) = {
            let ch = &self.channels[index];
            (ch.source, ch.destination, ch.count, ch.source_step, ch.destination_step, ch.chunk_size)
        };

        let step_size = match chunk_size {
            ChunkSize::Halfword => 2,
            ChunkSize::Word => 4,
        };

        for _ in 0..count.max(1) {
            copy(src, dst, chunk_size);
            src = apply_step(src, src_step, step_size);
            dst = apply_step(dst, dst_step, step_size);
        }

        let channel = &mut self.channels[index];
        channel.source = src;
        channel.destination = if dst_step == AddressStep::IncrementReload {
            channel.original_destination
        } else {
            dst
        };
        if !channel.repeat {
            channel.enabled = false;
        }
        if channel.irq_on_complete {
            interrupts.raise(source(index));
        }
    }
}

fn apply_step(address: u32, step: AddressStep, size: u32) -> u32 {
    match step {
        AddressStep::Increment | AddressStep::IncrementReload => address.wrapping_add(size),
        AddressStep::Decrement => address.wrapping_sub(size),
        AddressStep::Fixed => address,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_trigger_requests_a_synchronous_fire() {
        let mut dma = DmaController::new();
        let fire_now = dma.arm(0, 1 << 15);
        assert!(fire_now);
    }

    #[test]
    fn non_repeating_channel_clears_enable_after_one_run() {
        let mut dma = DmaController::new();
        dma.set_count(0, 4);
        dma.arm(0, 1 << 15);
        let mut interrupts = InterruptController::new();
        dma.fire(0, &mut interrupts, |_, _, _| {});
        assert!(!dma.channel(0).enabled);
    }

    #[test]
    fn repeating_channel_stays_armed() {
        let mut dma = DmaController::new();
        dma.set_count(0, 1);
        dma.arm(0, (1 << 15) | (1 << 9));
        let mut interrupts = InterruptController::new();
        dma.fire(0, &mut interrupts, |_, _, _| {});
        assert!(dma.channel(0).enabled);
    }

    #[test]
    fn increment_reload_restores_destination_after_the_run() {
        let mut dma = DmaController::new();
        dma.set_destination(0, 0x1000);
        dma.set_count(0, 3);
        dma.arm(0, (1 << 15) | (3 << 5)); // dest step = increment-and-reload
        let mut interrupts = InterruptController::new();
        dma.fire(0, &mut interrupts, |_, _, _| {});
        assert_eq!(dma.channel(0).destination, 0x1000);
    }

    #[test]
    fn enabling_then_disabling_without_a_trigger_leaves_memory_untouched() {
        let mut dma = DmaController::new();
        dma.arm(0, (1 << 15) | (1 << 12)); // VBlank-triggered, not immediate
        dma.arm(0, 0); // disable
        assert!(dma.on_event(TriggerMode::VBlank).is_empty());
    }
}
