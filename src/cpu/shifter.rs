// Barrel shifter: every data-processing operand-2 and every shifted memory
// address index passes through one of these four modes.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftKind {
    LogicalLeft,
    LogicalRight,
    ArithmeticRight,
    RotateRight,
}

impl ShiftKind {
    pub const fn decode(bits: u32) -> ShiftKind {
        match bits & 0x3 {
            0 => ShiftKind::LogicalLeft,
            1 => ShiftKind::LogicalRight,
            2 => ShiftKind::ArithmeticRight,
            _ => ShiftKind::RotateRight,
        }
    }
}

/// Result of running the barrel shifter: the shifted value plus the
/// carry-out it produces for the flag updater.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShifterResult {
    pub value: u32,
    pub carry_out: bool,
}

/// Applies `kind` to `value` by `amount`, given the carry-in flag that
/// governs the register-specified special cases.
///
/// `by_register` distinguishes an immediate shift amount of 0 (the
/// "pass-through" / "shift-by-32" encodings) from a register-specified
/// shift amount of 0 (which always passes the value through unchanged with
/// the existing carry, for all four shift kinds).
pub fn shift(kind: ShiftKind, value: u32, amount: u32, carry_in: bool, by_register: bool) -> ShifterResult {
    if by_register && amount == 0 {
        return ShifterResult {
            value,
            carry_out: carry_in,
        };
    }

    if amount == 0 {
        // Immediate-encoded shift amount of 0: LSL passes through untouched,
        // the other three modes mean "shift by 32" (with ROR#0 meaning
        // rotate-through-carry by one instead).
        return match kind {
            ShiftKind::LogicalLeft => ShifterResult {
                value,
                carry_out: carry_in,
            },
            ShiftKind::LogicalRight => ShifterResult {
                value: 0,
                carry_out: value & 0x8000_0000 != 0,
            },
            ShiftKind::ArithmeticRight => {
                let carry_out = value & 0x8000_0000 != 0;
                let value = if carry_out { u32::MAX } else { 0 };
                ShifterResult { value, carry_out }
            }
            ShiftKind::RotateRight => {
                let carry_out = value & 1 != 0;
                let rotated = ((value >> 1) & 0x7FFF_FFFF) | ((carry_in as u32) << 31);
                ShifterResult {
                    value: rotated,
                    carry_out,
                }
            }
        };
    }

    match kind {
        ShiftKind::LogicalLeft => {
            if amount < 32 {
                ShifterResult {
                    value: value << amount,
                    carry_out: (value >> (32 - amount)) & 1 != 0,
                }
            } else if amount == 32 {
                ShifterResult {
                    value: 0,
                    carry_out: value & 1 != 0,
                }
            } else {
                ShifterResult {
                    value: 0,
                    carry_out: false,
                }
            }
        }
        ShiftKind::LogicalRight => {
            if amount < 32 {
                ShifterResult {
                    value: value >> amount,
                    carry_out: (value >> (amount - 1)) & 1 != 0,
                }
            } else if amount == 32 {
                ShifterResult {
                    value: 0,
                    carry_out: value & 0x8000_0000 != 0,
                }
            } else {
                ShifterResult {
                    value: 0,
                    carry_out: false,
                }
            }
        }
        ShiftKind::ArithmeticRight => {
            let signed = value as i32;
            if amount < 32 {
                ShifterResult {
                    value: (signed >> amount) as u32,
                    carry_out: (value >> (amount - 1)) & 1 != 0,
                }
            } else {
                let carry_out = value & 0x8000_0000 != 0;
                let value = if carry_out { u32::MAX } else { 0 };
                ShifterResult { value, carry_out }
            }
        }
        ShiftKind::RotateRight => {
            let amount = amount % 32;
            if amount == 0 {
                ShifterResult {
                    value,
                    carry_out: carry_in,
                }
            } else {
                ShifterResult {
                    value: value.rotate_right(amount),
                    carry_out: (value >> (amount - 1)) & 1 != 0,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsl_immediate_zero_passes_through_with_preserved_carry() {
        let result = shift(ShiftKind::LogicalLeft, 0x1234, 0, true, false);
        assert_eq!(result.value, 0x1234);
        assert!(result.carry_out);
    }

    #[test]
    fn lsr_immediate_zero_means_shift_by_32() {
        let result = shift(ShiftKind::LogicalRight, 0x8000_0000, 0, false, false);
        assert_eq!(result.value, 0);
        assert!(result.carry_out);
    }

    #[test]
    fn asr_immediate_zero_means_shift_by_32_sign_filled() {
        let result = shift(ShiftKind::ArithmeticRight, 0x8000_0001, 0, false, false);
        assert_eq!(result.value, u32::MAX);
        assert!(result.carry_out);

        let result = shift(ShiftKind::ArithmeticRight, 0x0000_0001, 0, false, false);
        assert_eq!(result.value, 0);
        assert!(!result.carry_out);
    }

    #[test]
    fn ror_immediate_zero_is_rotate_through_carry_by_one() {
        let result = shift(ShiftKind::RotateRight, 0b10, 0, true, false);
        assert_eq!(result.value, 0x8000_0001);
        assert!(!result.carry_out);
    }

    #[test]
    fn register_specified_zero_amount_always_passes_through() {
        for kind in [
            ShiftKind::LogicalLeft,
            ShiftKind::LogicalRight,
            ShiftKind::ArithmeticRight,
            ShiftKind::RotateRight,
        ] {
            let result = shift(kind, 0xDEAD_BEEF, 0, true, true);
            assert_eq!(result.value, 0xDEAD_BEEF);
            assert!(result.carry_out);
        }
    }

    #[test]
    fn shifts_of_32_or_more_zero_out_logical_modes() {
        assert_eq!(shift(ShiftKind::LogicalLeft, 0xFF, 40, false, true).value, 0);
        assert_eq!(shift(ShiftKind::LogicalRight, 0xFF, 40, false, true).value, 0);
    }

    #[test]
    fn arithmetic_right_of_32_or_more_sign_fills() {
        let result = shift(ShiftKind::ArithmeticRight, 0x8000_0000, 40, false, true);
        assert_eq!(result.value, u32::MAX);
        let result = shift(ShiftKind::ArithmeticRight, 0x7FFF_FFFF, 40, false, true);
        assert_eq!(result.value, 0);
    }

    #[test]
    fn rotate_right_wraps_modulo_32() {
        let result = shift(ShiftKind::RotateRight, 0x0000_0001, 32, true, true);
        assert_eq!(result.value, 0x0000_0001);
        assert_eq!(result.carry_out, true);
    }

    #[test]
    fn ror_by_4_matches_rotate_right_intrinsic() {
        let result = shift(ShiftKind::RotateRight, 0x1234_5678, 4, false, true);
        assert_eq!(result.value, 0x1234_5678_u32.rotate_right(4));
    }
}
