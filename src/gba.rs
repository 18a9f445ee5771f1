//! The top-level aggregate: owns the processor, the bus (which in turn
//! owns the peripheral record blocks), the pixel pipeline, and whatever
//! audio mixer the host wired in. No component holds a back-pointer to
//! its owner; everything flows through `&mut Bus` passed as a call
//! parameter.

use std::fs;
use std::path::Path;

use crate::audio::{AudioMixer, SilentMixer};
use crate::bus::{Bus, SnapshotPoint};
use crate::cartridge::Cartridge;
use crate::cpu::Cpu;
use crate::error::BootError;
use crate::ppu::Ppu;

const KEY_A: u16 = 1 << 0;
const KEY_B: u16 = 1 << 1;
const KEY_SELECT: u16 = 1 << 2;
const KEY_START: u16 = 1 << 3;
const KEY_RIGHT: u16 = 1 << 4;
const KEY_LEFT: u16 = 1 << 5;
const KEY_UP: u16 = 1 << 6;
const KEY_DOWN: u16 = 1 << 7;
const KEY_R: u16 = 1 << 8;
const KEY_L: u16 = 1 << 9;

#[derive(Debug, Clone, Copy, Default)]
pub struct KeypadState {
    pub a: bool,
    pub b: bool,
    pub select: bool,
    pub start: bool,
    pub right: bool,
    pub left: bool,
    pub up: bool,
    pub down: bool,
    pub r: bool,
    pub l: bool,
}

impl KeypadState {
    /// Packs the state into the keypad register's active-low bit layout.
    fn active_low_bits(self) -> u16 {
        let mut pressed = 0u16;
        if self.a {
            pressed |= KEY_A;
        }
        if self.b {
            pressed |= KEY_B;
        }
        if self.select {
            pressed |= KEY_SELECT;
        }
        if self.start {
            pressed |= KEY_START;
        }
        if self.right {
            pressed |= KEY_RIGHT;
        }
        if self.left {
            pressed |= KEY_LEFT;
        }
        if self.up {
            pressed |= KEY_UP;
        }
        if self.down {
            pressed |= KEY_DOWN;
        }
        if self.r {
            pressed |= KEY_R;
        }
        if self.l {
            pressed |= KEY_L;
        }
        !pressed
    }
}

pub struct Gba<M: AudioMixer = SilentMixer> {
    cpu: Cpu,
    bus: Bus,
    ppu: Ppu,
    mixer: M,
}

impl Gba<SilentMixer> {
    /// Boots with the given boot ROM and no cartridge loaded yet.
    pub fn new(boot_rom: Vec<u8>) -> Self {
        Gba::with_mixer(boot_rom, SilentMixer)
    }

    pub fn from_files(boot_rom_path: &Path, cartridge_path: Option<&Path>) -> Result<Self, BootError> {
        let boot_rom = fs::read(boot_rom_path).map_err(|source| BootError::BootRomUnreadable {
            path: boot_rom_path.to_path_buf(),
            source,
        })?;
        let mut gba = Gba::new(boot_rom);

        if let Some(path) = cartridge_path {
            let rom = fs::read(path).map_err(|source| BootError::CartridgeUnreadable {
                path: path.to_path_buf(),
                source,
            })?;
            if rom.is_empty() {
                return Err(BootError::EmptyCartridge { path: path.to_path_buf() });
            }
            gba.load_cartridge(Cartridge::load(rom));
        }

        Ok(gba)
    }
}

impl<M: AudioMixer> Gba<M> {
    pub fn with_mixer(boot_rom: Vec<u8>, mixer: M) -> Self {
        let mut bus = Bus::new();
        bus.load_bios(&boot_rom);
        Gba {
            cpu: Cpu::new(),
            bus,
            ppu: Ppu::new(),
            mixer,
        }
    }

    pub fn load_cartridge(&mut self, cartridge: Cartridge) {
        self.bus.load_cartridge(cartridge);
    }

    pub fn set_keys(&mut self, keys: KeypadState) {
        self.bus.set_keys(keys.active_low_bits());
    }

    pub fn framebuffer(&self) -> &[u32] {
        self.ppu.framebuffer()
    }

    /// Retires one processor instruction and advances every other
    /// cycle-driven component (timers, pixel pipeline, audio mixer) by the
    /// same number of cycles it cost.
    pub fn step(&mut self) -> u32 {
        let cycles = self.cpu.step(&mut self.bus);
        self.bus.timers.tick(cycles, &mut self.bus.interrupts);
        self.ppu.tick(cycles, &mut self.bus);
        self.mixer.on_cycles(cycles);

        if self.bus.pc_in_bios
            && crate::bus::regions::Region::from_address(self.cpu.pc()) != crate::bus::regions::Region::BootRom
        {
            self.bus.pc_in_bios = false;
            self.bus.record_boot_snapshot(SnapshotPoint::PostStartup);
        }

        cycles
    }

    /// Runs instructions until one full frame (one VBlank-to-VBlank pass)
    /// has been produced.
    pub fn run_frame(&mut self) {
        let was_vblank = self.bus.lcd.display_status.vblank();
        loop {
            self.step();
            if self.bus.lcd.display_status.vblank() && !was_vblank {
                break;
            }
        }
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_fresh_machine_boots_at_the_reset_vector() {
        let gba = Gba::new(vec![0u8; 0x4000]);
        assert_eq!(gba.cpu().pc(), crate::cpu::VECTOR_RESET);
    }

    #[test]
    fn stepping_advances_the_scanline_counter() {
        let mut gba = Gba::new(vec![0u8; 0x4000]);
        for _ in 0..2000 {
            gba.step();
        }
        assert!(gba.bus().lcd.vcount > 0 || gba.bus().lcd.display_status.hblank());
    }

    #[test]
    fn keypad_state_packs_into_the_active_low_register() {
        let mut gba = Gba::new(vec![0u8; 0x4000]);
        gba.set_keys(KeypadState {
            a: true,
            ..Default::default()
        });
        assert_eq!(gba.bus().read16(0x0400_0130, false) & 1, 0);
    }
}
