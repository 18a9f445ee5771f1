// Integration tests exercising the literal scenarios and cross-cutting
// invariants that don't belong to any single module's unit tests.

use pocketdmi::cartridge::Cartridge;
use pocketdmi::{Bus, Cpu, Gba};

#[test]
fn reverse_subtract_with_shifted_operand_matches_expected_result_and_flags() {
    let mut bus = Bus::new();
    let mut cpu = Cpu::new();
    // RSBS r0, r1, r2, LSL #2  (r0 = (r2 << 2) - r1)
    cpu.write_register(1, 4);
    cpu.write_register(2, 10);
    bus.bypass_write32(0x00, 0xE071_0102);
    for _ in 0..4 {
        cpu.step(&mut bus);
    }
    assert_eq!(cpu.read_register(0), 36);
}

#[test]
fn branch_exchange_into_narrow_mode_then_back_to_wide() {
    let mut bus = Bus::new();
    let mut cpu = Cpu::new();
    cpu.write_register(0, 0x100 | 1); // target address, low bit set selects narrow
    bus.bypass_write32(0x00, 0xE12F_FF10); // BX r0
    bus.bypass_write16(0x100, 0x2000); // MOV r0, #0 (narrow format 3)
    for _ in 0..4 {
        cpu.step(&mut bus);
    }
    assert_eq!(cpu.instruction_set(), pocketdmi::cpu::psr::InstructionSet::Narrow);
}

#[test]
fn immediate_dma_copies_a_word_between_ram_regions() {
    let mut bus = Bus::new();
    bus.write32(0x0300_0000, 0x1234_5678);
    bus.write16(0x0400_00B0, 0x0000); // source lo
    bus.write16(0x0400_00B2, 0x0300); // source hi -> 0x03000000
    bus.write16(0x0400_00B4, 0x1000); // dest lo
    bus.write16(0x0400_00B6, 0x0300); // dest hi -> 0x03001000
    bus.write16(0x0400_00B8, 1); // count
    bus.write16(0x0400_00BA, (1 << 15) | (1 << 10)); // enable, 32-bit, immediate trigger
    assert_eq!(bus.read32(0x0300_1000, false), 0x1234_5678);
}

#[test]
fn misaligned_word_load_rotates_by_the_byte_offset() {
    let mut bus = Bus::new();
    bus.write32(0x0200_0000, 0xAABBCCDD);
    let rotated = bus.read32(0x0200_0002, true);
    assert_eq!(rotated, 0xAABBCCDDu32.rotate_right(16));
}

#[test]
fn ram_write_then_read_round_trips_exactly() {
    let mut bus = Bus::new();
    for address in (0x0200_0000..0x0200_1000).step_by(4) {
        bus.write32(address, address ^ 0xDEAD_BEEF);
    }
    for address in (0x0200_0000..0x0200_1000).step_by(4) {
        assert_eq!(bus.read32(address, false), address ^ 0xDEAD_BEEF);
    }
}

#[test]
fn dma_enable_then_disable_without_trigger_leaves_memory_untouched() {
    let mut bus = Bus::new();
    bus.write32(0x0300_2000, 0x1111_1111);
    bus.write16(0x0400_00BA, (1 << 15) | (1 << 12)); // enable, VBlank trigger
    bus.write16(0x0400_00BA, 0); // disable before the trigger ever fires
    assert_eq!(bus.read32(0x0300_2000, false), 0x1111_1111);
}

#[test]
fn a_machine_with_no_cartridge_still_produces_frames() {
    let mut gba = Gba::new(vec![0u8; 0x4000]);
    let before = gba.framebuffer().to_vec();
    for _ in 0..50_000 {
        gba.step();
    }
    // The frame buffer is a plain Vec<u32> the pipeline writes into; just
    // assert it is still the expected size and the machine didn't panic.
    assert_eq!(gba.framebuffer().len(), before.len());
}

#[test]
fn cartridge_with_no_recognized_signature_has_no_backup() {
    let cartridge = Cartridge::load(vec![0xFFu8; 1024]);
    assert!(matches!(cartridge.backup, pocketdmi::Backup::None));
}
