// Execute stage: a single `match` dispatch over the decoded instruction
// enum. Every side effect (register writes, memory writes, mode changes)
// happens here, after the caller has already checked the condition
// predicate -- `Cpu::execute` is the only place instructions are retired.

use crate::bus::{Bus, SnapshotPoint};

use super::condition::Condition;
use super::decode::{HalfwordTransferKind, Instruction, Offset, Operand2, ShiftAmount, TransferSize};
use super::opcode::{self, DataOpcode};
use super::pipeline::Pipeline;
use super::psr::{InstructionSet, Mode, Psr};
use super::registers::{RegisterFile, LR, PC};
use super::shifter::{self, ShiftKind};
use super::tick;

/// PC reads during operand fetch observe the value eight bytes past the
/// currently executing wide instruction, reflecting the three-stage
/// pipeline's prefetch depth.
const WIDE_PC_READ_AHEAD: u32 = 8;
const NARROW_PC_READ_AHEAD: u32 = 4;

pub struct ExecuteContext<'a> {
    pub regs: &'a mut RegisterFile,
    pub pipeline: &'a mut Pipeline,
}

fn pc_read_ahead(set: InstructionSet) -> u32 {
    match set {
        InstructionSet::Wide => WIDE_PC_READ_AHEAD,
        InstructionSet::Narrow => NARROW_PC_READ_AHEAD,
    }
}

fn read_operand(regs: &RegisterFile, index: usize) -> u32 {
    if index == PC {
        regs.pc().wrapping_add(pc_read_ahead(regs.cpsr().instruction_set()))
    } else {
        regs.read(index)
    }
}

fn resolve_operand2(regs: &RegisterFile, operand2: Operand2) -> (u32, bool) {
    match operand2 {
        Operand2::Immediate { value, rotate } => {
            if rotate == 0 {
                (value, regs.cpsr().carry())
            } else {
                let result = shifter::shift(ShiftKind::RotateRight, value, rotate * 2, false, false);
                (result.value, result.carry_out)
            }
        }
        Operand2::Register { rm, shift, amount } => {
            let value = read_operand(regs, rm);
            let carry_in = regs.cpsr().carry();
            match amount {
                ShiftAmount::Immediate(amount) => {
                    let result = shifter::shift(shift, value, amount, carry_in, false);
                    (result.value, result.carry_out)
                }
                ShiftAmount::Register(rs) => {
                    let amount = regs.read(rs) & 0xFF;
                    let result = shifter::shift(shift, value, amount, carry_in, true);
                    (result.value, result.carry_out)
                }
            }
        }
    }
}

/// Executes one already condition-checked instruction and returns its
/// internal-cycle contribution (bus-cycle costs are added by the caller
/// from the `Bus` accesses performed here).
pub fn execute(ctx: &mut ExecuteContext, bus: &mut Bus, instr: &Instruction) -> u32 {
    match instr {
        Instruction::BranchExchange { rn, .. } => {
            let target = read_operand(ctx.regs, *rn);
            let narrow = target & 1 != 0;
            let mut cpsr = ctx.regs.cpsr();
            cpsr.set_instruction_set(if narrow {
                InstructionSet::Narrow
            } else {
                InstructionSet::Wide
            });
            ctx.regs.set_cpsr(cpsr);
            ctx.regs.set_pc(target & !1);
            ctx.pipeline.flush();
            1
        }
        Instruction::Branch { link, offset, .. } => {
            let pc = ctx.regs.pc();
            if *link {
                ctx.regs.write(LR, pc.wrapping_sub(pc_read_ahead(ctx.regs.cpsr().instruction_set())).wrapping_add(4));
            }
            ctx.regs.set_pc(pc.wrapping_add(*offset as u32).wrapping_sub(pc_read_ahead(ctx.regs.cpsr().instruction_set())));
            ctx.pipeline.flush();
            1
        }
        Instruction::DataProcessing {
            op, set_flags, rd, rn, operand2, ..
        } => {
            let operand1 = if op.is_unary() { 0 } else { read_operand(ctx.regs, *rn) };
            let (operand2_value, shifter_carry) = resolve_operand2(ctx.regs, *operand2);
            let mut cpsr = ctx.regs.cpsr();
            let carry_in = cpsr.carry();
            let result = opcode::apply(
                *op,
                operand1,
                operand2_value,
                carry_in,
                shifter_carry,
                *set_flags,
                &mut cpsr,
            );
            if *set_flags && *rd == PC {
                // Privileged return: restore CPSR from the current mode's SPSR.
                match ctx.regs.cpsr().mode() {
                    Mode::Irq => bus.record_boot_snapshot(SnapshotPoint::IrqExit),
                    Mode::Supervisor => bus.record_boot_snapshot(SnapshotPoint::SwiExit),
                    _ => {}
                }
                cpsr = ctx.regs.spsr();
            }
            ctx.regs.set_cpsr(cpsr);
            if !op.is_test() {
                ctx.regs.write(*rd, result);
                if *rd == PC {
                    ctx.pipeline.flush();
                }
            }
            1
        }
        Instruction::Multiply {
            accumulate,
            set_flags,
            rd,
            rn,
            rs,
            rm,
            ..
        } => {
            let product = ctx.regs.read(*rm).wrapping_mul(ctx.regs.read(*rs));
            let result = if *accumulate {
                product.wrapping_add(ctx.regs.read(*rn))
            } else {
                product
            };
            ctx.regs.write(*rd, result);
            if *set_flags {
                let mut cpsr = ctx.regs.cpsr();
                cpsr.set_negative(result & 0x8000_0000 != 0);
                cpsr.set_zero(result == 0);
                ctx.regs.set_cpsr(cpsr);
            }
            multiply_cycles(ctx.regs.read(*rs)) + if *accumulate { 1 } else { 0 }
        }
        Instruction::LongMultiply {
            signed,
            accumulate,
            set_flags,
            rd_hi,
            rd_lo,
            rs,
            rm,
            ..
        } => {
            let product: u64 = if *signed {
                (ctx.regs.read(*rm) as i32 as i64).wrapping_mul(ctx.regs.read(*rs) as i32 as i64) as u64
            } else {
                ctx.regs.read(*rm) as u64 * ctx.regs.read(*rs) as u64
            };
            let product = if *accumulate {
                let existing = ((ctx.regs.read(*rd_hi) as u64) << 32) | ctx.regs.read(*rd_lo) as u64;
                product.wrapping_add(existing)
            } else {
                product
            };
            ctx.regs.write(*rd_hi, (product >> 32) as u32);
            ctx.regs.write(*rd_lo, product as u32);
            if *set_flags {
                let mut cpsr = ctx.regs.cpsr();
                cpsr.set_negative(product & 0x8000_0000_0000_0000 != 0);
                cpsr.set_zero(product == 0);
                ctx.regs.set_cpsr(cpsr);
            }
            multiply_cycles(ctx.regs.read(*rs)) + 1 + if *accumulate { 1 } else { 0 }
        }
        Instruction::StatusTransferToRegister { rd, spsr, .. } => {
            let value = if *spsr { ctx.regs.spsr() } else { ctx.regs.cpsr() };
            ctx.regs.write(*rd, value.bits());
            1
        }
        Instruction::StatusTransferFromRegister {
            spsr, flags_only, operand, ..
        } => {
            let (value, _) = resolve_operand2(ctx.regs, *operand);
            if *spsr {
                let mut current = ctx.regs.spsr();
                apply_status_write(&mut current, value, *flags_only);
                ctx.regs.set_spsr(current);
            } else {
                let from_mode = ctx.regs.cpsr().mode();
                let mut current = ctx.regs.cpsr();
                apply_status_write(&mut current, value, *flags_only);
                if !*flags_only && from_mode != current.mode() {
                    ctx.regs.switch_mode(from_mode, current.mode());
                }
                ctx.regs.set_cpsr(current);
            }
            1
        }
        Instruction::SingleDataTransfer {
            load,
            size,
            pre_index,
            add,
            write_back,
            rn,
            rd,
            offset,
            shift,
            ..
        } => {
            let base = read_operand(ctx.regs, *rn);
            let delta = resolve_offset(ctx.regs, *offset, *shift);
            let transfer_address = if *add { base.wrapping_add(delta) } else { base.wrapping_sub(delta) };
            let effective = if *pre_index { transfer_address } else { base };

            let cost = if *load {
                let value = match size {
                    TransferSize::Word => bus.read32(effective, true),
                    TransferSize::Byte => bus.read8(effective, true) as u32,
                };
                ctx.regs.write(*rd, value);
                if *rd == PC {
                    ctx.pipeline.flush();
                }
                tick(bus, effective, 1, 0, 1)
            } else {
                let value = read_operand(ctx.regs, *rd);
                match size {
                    TransferSize::Word => bus.write32(effective, value),
                    TransferSize::Byte => bus.write8(effective, value as u8),
                }
                tick(bus, effective, 1, 0, 0)
            };

            if !*pre_index || *write_back {
                ctx.regs.write(*rn, transfer_address);
            }
            cost
        }
        Instruction::HalfwordTransfer {
            load,
            kind,
            pre_index,
            add,
            write_back,
            rn,
            rd,
            offset,
            ..
        } => {
            let base = read_operand(ctx.regs, *rn);
            let delta = match offset {
                Offset::Immediate(v) => *v,
                Offset::Register(r) => ctx.regs.read(*r),
            };
            let transfer_address = if *add { base.wrapping_add(delta) } else { base.wrapping_sub(delta) };
            let effective = if *pre_index { transfer_address } else { base };

            let cost = if *load {
                let value = match kind {
                    HalfwordTransferKind::UnsignedHalfword => bus.read16(effective, true) as u32,
                    HalfwordTransferKind::SignedByte => bus.read8(effective, true) as i8 as i32 as u32,
                    HalfwordTransferKind::SignedHalfword => bus.read16(effective, true) as i16 as i32 as u32,
                };
                ctx.regs.write(*rd, value);
                if *rd == PC {
                    ctx.pipeline.flush();
                }
                tick(bus, effective, 1, 0, 1)
            } else {
                bus.write16(effective, ctx.regs.read(*rd) as u16);
                tick(bus, effective, 1, 0, 0)
            };

            if !*pre_index || *write_back {
                ctx.regs.write(*rn, transfer_address);
            }
            cost
        }
        Instruction::BlockTransfer {
            load,
            pre_index,
            add,
            write_back,
            user_bank,
            rn,
            register_list,
            ..
        } => execute_block_transfer(ctx, bus, *load, *pre_index, *add, *write_back, *user_bank, *rn, *register_list),
        Instruction::Swap { byte, rn, rd, rm, .. } => {
            let address = ctx.regs.read(*rn);
            if *byte {
                let old = bus.read8(address, true);
                bus.write8(address, ctx.regs.read(*rm) as u8);
                ctx.regs.write(*rd, old as u32);
            } else {
                let old = bus.read32(address, true);
                bus.write32(address, ctx.regs.read(*rm));
                ctx.regs.write(*rd, old);
            }
            // Read and write are both non-sequential data accesses, with one
            // internal cycle to latch the old value between them.
            tick(bus, address, 2, 0, 1)
        }
        Instruction::SoftwareInterrupt { .. } => {
            enter_exception(ctx.regs, ctx.pipeline, Mode::Supervisor, super::VECTOR_SWI, 4);
            1
        }
        Instruction::Undefined { .. } => {
            enter_exception(ctx.regs, ctx.pipeline, Mode::Undefined, super::VECTOR_UNDEFINED, 4);
            1
        }
    }
}

fn resolve_offset(regs: &RegisterFile, offset: Offset, shift: Option<(ShiftKind, u32)>) -> u32 {
    match offset {
        Offset::Immediate(v) => v,
        Offset::Register(r) => {
            let value = regs.read(r);
            match shift {
                Some((kind, amount)) => shifter::shift(kind, value, amount, regs.cpsr().carry(), false).value,
                None => value,
            }
        }
    }
}

fn apply_status_write(psr: &mut Psr, value: u32, flags_only: bool) {
    if flags_only {
        let flags_mask = 0xF000_0000u32;
        *psr = Psr::from_bits((psr.bits() & !flags_mask) | (value & flags_mask));
    } else {
        *psr = Psr::from_bits(value);
    }
}

#[allow(clippy::too_many_arguments)]
fn execute_block_transfer(
    ctx: &mut ExecuteContext,
    bus: &mut Bus,
    load: bool,
    pre_index: bool,
    add: bool,
    write_back: bool,
    user_bank: bool,
    rn: usize,
    register_list: u16,
) -> u32 {
    let base = ctx.regs.read(rn);
    let count = register_list.count_ones().max(1);
    let step: u32 = 4;
    let span = count * step;

    let start = if add { base } else { base.wrapping_sub(span) };
    let mut address = if add {
        if pre_index {
            start.wrapping_add(step)
        } else {
            start
        }
    } else if pre_index {
        start
    } else {
        start.wrapping_add(step)
    };

    if register_list == 0 {
        // Empty-mask edge case: still transfers one word for r15 at +-0x40.
        let effective = if add { base.wrapping_add(0x40) } else { base.wrapping_sub(0x40) };
        let cost = if load {
            let value = bus.read32(effective, true);
            ctx.regs.write(PC, value & !3);
            ctx.pipeline.flush();
            tick(bus, effective, 1, 0, 1)
        } else {
            bus.write32(effective, ctx.regs.pc().wrapping_add(4));
            tick(bus, effective, 1, 0, 0)
        };
        if write_back {
            let new_base = if add { base.wrapping_add(0x40) } else { base.wrapping_sub(0x40) };
            ctx.regs.write(rn, new_base);
        }
        return cost;
    }

    let base_is_first_listed = register_list.trailing_zeros() as usize == rn;
    let pre_update_base = base;

    if !load && write_back && register_list & (1 << rn) != 0 && !base_is_first_listed {
        // Non-first occurrences of the base store the updated value; handled
        // naturally below since we write back only after the loop for stores
        // other than the first-listed case.
    }

    let first_address = address;
    let mut transferred = 0u32;
    for index in 0..16usize {
        if register_list & (1 << index) == 0 {
            continue;
        }
        if load {
            let value = bus.read32(address, true);
            if !user_bank {
                ctx.regs.write(index, value);
            } else {
                ctx.regs.write_in_mode(index, Mode::User, value);
            }
            if index == PC {
                ctx.pipeline.flush();
            }
        } else {
            let value = if index == rn && index == register_list.trailing_zeros() as usize {
                pre_update_base
            } else if !user_bank {
                ctx.regs.read(index)
            } else {
                ctx.regs.read_in_mode(index, Mode::User)
            };
            bus.write32(address, value);
        }
        address = address.wrapping_add(step);
        transferred += 1;
    }

    let final_base = if add { base.wrapping_add(span) } else { base.wrapping_sub(span) };
    let base_in_list = register_list & (1 << rn) != 0;
    if write_back && !(load && base_in_list) {
        ctx.regs.write(rn, final_base);
    }

    // First register transferred is a non-sequential access, the rest are
    // sequential; a load also spends one internal cycle moving the last
    // value into its register.
    let internal = if load { 1 } else { 0 };
    tick(bus, first_address, 1, transferred - 1, internal)
}

fn multiply_cycles(multiplier: u32) -> u32 {
    if multiplier & 0xFFFF_FF00 == 0 || multiplier & 0xFFFF_FF00 == 0xFFFF_FF00 {
        1
    } else if multiplier & 0xFFFF_0000 == 0 || multiplier & 0xFFFF_0000 == 0xFFFF_0000 {
        2
    } else if multiplier & 0xFF00_0000 == 0 || multiplier & 0xFF00_0000 == 0xFF00_0000 {
        3
    } else {
        4
    }
}

/// Shared exception entry sequence: saves CPSR, sets the return address
/// (offset for the prefetch), switches mode and instruction set, masks
/// interrupts, and redirects the program counter to a fixed vector.
pub fn enter_exception(regs: &mut RegisterFile, pipeline: &mut Pipeline, mode: Mode, vector: u32, pc_offset: u32) {
    let from_mode = regs.cpsr().mode();
    let return_address = regs.pc().wrapping_sub(pc_read_ahead(regs.cpsr().instruction_set())).wrapping_add(pc_offset);
    let saved = regs.cpsr();

    regs.switch_mode(from_mode, mode);
    let mut cpsr = regs.cpsr();
    cpsr.set_mode(mode);
    cpsr.set_instruction_set(InstructionSet::Wide);
    cpsr.set_irq_disable(true);
    if mode == Mode::Fiq {
        cpsr.set_fiq_disable(true);
    }
    regs.set_cpsr(cpsr);
    regs.set_spsr(saved);
    regs.write(LR, return_address);
    regs.set_pc(vector);
    pipeline.flush();
}

pub fn condition_met(cond: Condition, psr: Psr) -> bool {
    cond.is_met(psr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;
    use crate::cpu::decode::decode_wide;

    fn fresh() -> (RegisterFile, Pipeline, Bus) {
        (RegisterFile::new(), Pipeline::new(), Bus::new())
    }

    #[test]
    fn data_processing_and_scenario_matches_literal_example() {
        // ANDS r0, r1, #0xFF with r1 = 0xFFFF_FFFF should yield 0xFF, Z clear, N clear.
        let (mut regs, mut pipeline, mut bus) = fresh();
        regs.write(1, 0xFFFF_FFFF);
        let instr = decode_wide(0xE201_00FF);
        let mut ctx = ExecuteContext {
            regs: &mut regs,
            pipeline: &mut pipeline,
        };
        execute(&mut ctx, &mut bus, &instr);
        assert_eq!(regs.read(0), 0xFF);
        assert!(!regs.cpsr().zero());
        assert!(!regs.cpsr().negative());
    }

    #[test]
    fn branch_exchange_switches_instruction_set_on_low_bit() {
        let (mut regs, mut pipeline, mut bus) = fresh();
        regs.write(3, 0x1001);
        let instr = Instruction::BranchExchange {
            cond: Condition::Al,
            rn: 3,
        };
        let mut ctx = ExecuteContext {
            regs: &mut regs,
            pipeline: &mut pipeline,
        };
        execute(&mut ctx, &mut bus, &instr);
        assert_eq!(regs.pc(), 0x1000);
        assert_eq!(regs.cpsr().instruction_set(), InstructionSet::Narrow);
        assert!(!pipeline.is_valid());
    }

    #[test]
    fn empty_register_list_block_transfer_still_moves_one_word_for_pc() {
        let (mut regs, mut pipeline, mut bus) = fresh();
        regs.write(0, 0x0300_0000);
        let mut ctx = ExecuteContext {
            regs: &mut regs,
            pipeline: &mut pipeline,
        };
        execute_block_transfer(&mut ctx, &mut bus, false, true, true, true, false, 0, 0);
        assert_eq!(regs.read(0), 0x0300_0040);
    }
}
