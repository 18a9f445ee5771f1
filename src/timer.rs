// Timer block: four cascadable countdown counters driven by prescaled
// processor cycles. Overflow-reload-cascade chaining follows the reference
// implementation's channel-tick routine: a channel only cascades into its
// successor when that successor is both enabled and cascade-flagged, and
// the chain recurses through further overflows.

use crate::interrupt::{InterruptController, InterruptSource};

const PRESCALERS: [u32; 4] = [1, 64, 256, 1024];
const OVERFLOW: u32 = 0x1_0000;

#[derive(Debug, Default, Clone, Copy)]
pub struct TimerChannel {
    initial: u16,
    counter: u32,
    prescaler_select: u8,
    cascade: bool,
    irq_on_overflow: bool,
    enabled: bool,
}

impl TimerChannel {
    fn prescaler(self) -> u32 {
        PRESCALERS[self.prescaler_select as usize]
    }
}

#[derive(Debug, Default)]
pub struct TimerBlock {
    channels: [TimerChannel; 4],
    /// Free-running tick counter used to time each channel's prescaler.
    ticks: u32,
}

impl TimerBlock {
    pub fn new() -> Self {
        TimerBlock::default()
    }

    pub fn read(&self, channel: usize) -> u16 {
        self.channels[channel].counter as u16
    }

    pub fn write_data(&mut self, channel: usize, value: u16) {
        self.channels[channel].initial = value;
        self.channels[channel].counter = value as u32;
    }

    pub fn write_control(&mut self, channel: usize, value: u16) {
        let ch = &mut self.channels[channel];
        ch.prescaler_select = (value & 0x3) as u8;
        ch.cascade = value & (1 << 2) != 0;
        ch.irq_on_overflow = value & (1 << 6) != 0;
        let was_enabled = ch.enabled;
        ch.enabled = value & (1 << 7) != 0;
        if ch.enabled && !was_enabled {
            ch.counter = ch.initial as u32;
        }
    }

    /// Advances the whole block by `delta` processor cycles and raises any
    /// overflow interrupts through `interrupts`.
    pub fn tick(&mut self, delta: u32, interrupts: &mut InterruptController) {
        for _ in 0..delta {
            self.ticks = self.ticks.wrapping_add(1);
            for channel in 0..4 {
                if self.channels[channel].cascade || !self.channels[channel].enabled {
                    continue;
                }
                let prescaler = self.channels[channel].prescaler();
                if self.ticks % prescaler == 0 {
                    self.step_channel(channel, interrupts);
                }
            }
        }
    }

    fn step_channel(&mut self, channel: usize, interrupts: &mut InterruptController) {
        self.channels[channel].counter += 1;
        if self.channels[channel].counter >= OVERFLOW {
            self.channels[channel].counter = self.channels[channel].initial as u32;
            if self.channels[channel].irq_on_overflow {
                interrupts.raise(timer_source(channel));
            }
            self.cascade(channel, interrupts);
        }
    }

    fn cascade(&mut self, channel: usize, interrupts: &mut InterruptController) {
        if channel == 3 {
            return;
        }
        let next = channel + 1;
        if self.channels[next].enabled && self.channels[next].cascade {
            self.step_channel(next, interrupts);
        }
    }
}

fn timer_source(channel: usize) -> InterruptSource {
    match channel {
        0 => InterruptSource::Timer0,
        1 => InterruptSource::Timer1,
        2 => InterruptSource::Timer2,
        _ => InterruptSource::Timer3,
    }
}
