// src/arch/arm.rs
//! ARM (32-bit) architecture support
//! Register file and calling convention rules for ARM and Thumb2. Native code
//! follows AAPCS soft-float for JNI; managed code is entered with the
//! hard-float quick ABI.

use crate::arch::{
    core_spill_mask, fp_spill_mask, Architecture, ManagedRegister, NativeAbi, Register,
    RegisterClass, STACK_ALIGNMENT,
};
use crate::jni::JniArgs;
use crate::managed::{is_non_reference_long, EntrySpill, ManagedRuntimeCallingConvention};
use crate::primitive::{Primitive, Shorty};

pub const R0: u8 = 0;
pub const R1: u8 = 1;
pub const R2: u8 = 2;
pub const R3: u8 = 3;
pub const R5: u8 = 5;
pub const R6: u8 = 6;
pub const R7: u8 = 7;
pub const R8: u8 = 8;
pub const R10: u8 = 10;
pub const R11: u8 = 11;
/// Intra-procedure-call scratch register
pub const R12: u8 = 12;
pub const SP: u8 = 13;
pub const LR: u8 = 14;
pub const PC: u8 = 15;

const fn core(number: u8) -> ManagedRegister {
    ManagedRegister::core(Architecture::Arm, number)
}

const fn single(number: u8) -> ManagedRegister {
    ManagedRegister::single(Architecture::Arm, number)
}

const fn double(number: u8) -> ManagedRegister {
    ManagedRegister::double(Architecture::Arm, number)
}

const fn pair(low: u8) -> ManagedRegister {
    ManagedRegister::pair(Architecture::Arm, low)
}

/// Native argument registers
const JNI_ARGUMENT_REGISTERS: [ManagedRegister; 4] = [core(R0), core(R1), core(R2), core(R3)];

/// The first `N` registers of one class
const fn bank<const N: usize>(class: RegisterClass) -> [Register; N] {
    let mut registers = [Register::new(Architecture::Arm, class, 0); N];
    let mut i = 0;
    while i < N {
        registers[i].number = i as u8;
        i += 1;
    }
    registers
}

// Managed hard-float argument registers. R0 carries the ArtMethod*.
const HF_CORE_ARGUMENT_REGISTERS: [Register; 4] = bank(RegisterClass::Core);
const HF_S_ARGUMENT_REGISTERS: [Register; 16] = bank(RegisterClass::Single);
const HF_D_ARGUMENT_REGISTERS: [Register; 8] = bank(RegisterClass::Double);

const CALLEE_SAVE_REGISTERS: [ManagedRegister; 22] = [
    // Core registers.
    core(R5), core(R6), core(R7), core(R8), core(R10), core(R11),
    // Hard float registers.
    single(16), single(17), single(18), single(19), single(20), single(21), single(22),
    single(23), single(24), single(25), single(26), single(27), single(28), single(29),
    single(30), single(31),
];

/// ABI constants for ARM
pub static ABI: NativeAbi = NativeAbi {
    name: "ARM AAPCS",
    callee_save_registers: &CALLEE_SAVE_REGISTERS,
    // LR is pushed alongside the callee saves.
    core_spill_mask: core_spill_mask(&CALLEE_SAVE_REGISTERS, 1 << LR),
    fp_spill_mask: fp_spill_mask(&CALLEE_SAVE_REGISTERS),
    method_register: core(R0),
    interprocedural_scratch_register: core(R12),
    return_scratch_register: core(R2),
    int_return_register: core(R0),
    requires_small_result_type_extension: false,
    return_address_size: 4,
    out_arg_home_area: 0,
    managed_stack_slot_size: 4,
    aligns_wide_arguments: true,
    max_int_like_register_arguments: 4,
    max_float_or_double_register_arguments: 0,
    stack_alignment: STACK_ALIGNMENT,
};

pub fn register_name(class: RegisterClass, number: u8) -> String {
    match class {
        RegisterClass::Core | RegisterClass::CoreHalf => core_name(number),
        RegisterClass::CorePair => format!("{}_{}", core_name(number), core_name(number + 1)),
        RegisterClass::Single => format!("s{}", number),
        RegisterClass::Double => format!("d{}", number),
    }
}

fn core_name(number: u8) -> String {
    match number {
        SP => "sp".to_string(),
        LR => "lr".to_string(),
        PC => "pc".to_string(),
        n => format!("r{}", n),
    }
}

/// Managed return values use the hard-float registers
pub fn managed_return_register(shorty: &Shorty) -> ManagedRegister {
    match shorty.return_type() {
        Primitive::Void => ManagedRegister::NoRegister,
        Primitive::Double => double(0),
        Primitive::Float => single(0),
        Primitive::Long => pair(R0),
        _ => core(R0),
    }
}

/// Native return values are soft-float: wide values come back in R0/R1
pub fn jni_return_register(shorty: &Shorty) -> ManagedRegister {
    match shorty.return_type() {
        Primitive::Void => ManagedRegister::NoRegister,
        Primitive::Double | Primitive::Long => pair(R0),
        _ => core(R0),
    }
}

pub(crate) fn current_param_register(args: &JniArgs<'_>) -> ManagedRegister {
    let slot = args.cursor().slots();
    if args.is_current_param_a_long_or_double() {
        match slot {
            0 => pair(R0),
            2 => pair(R2),
            _ => panic!("wide argument in odd register slot {}", slot),
        }
    } else {
        JNI_ARGUMENT_REGISTERS[slot]
    }
}

/// Stack slot index of the current argument in the outgoing area
pub(crate) fn current_param_stack_slot(args: &JniArgs<'_>) -> usize {
    args.cursor().slots() - JNI_ARGUMENT_REGISTERS.len()
}

pub(crate) fn entry_spills(conv: &ManagedRuntimeCallingConvention) -> Vec<EntrySpill> {
    let mut spills = Vec::new();
    let mut gpr_index = 1; // R0 holds the ArtMethod*.
    let mut fpr_index = 0; // S0 ~ S15.
    let mut fpr_double_index = 0; // D0 ~ D7.
    let last_gpr = HF_CORE_ARGUMENT_REGISTERS.len() - 1;

    let mut args = conv.args(Default::default());
    while args.has_next() {
        if args.is_current_param_a_float_or_double() {
            if args.is_current_param_a_double() {
                // Doubles must not overlap a float already placed.
                fpr_double_index = (fpr_double_index * 2).max(fpr_index + (fpr_index & 1)) / 2;
                if fpr_double_index < HF_D_ARGUMENT_REGISTERS.len() {
                    spills.push(EntrySpill::register(
                        HF_D_ARGUMENT_REGISTERS[fpr_double_index],
                    ));
                    fpr_double_index += 1;
                } else {
                    spills.push(EntrySpill::placeholder(8));
                }
            } else {
                // Floats back-fill the odd half of a double pair only.
                if fpr_index % 2 == 0 {
                    fpr_index = (fpr_double_index * 2).max(fpr_index);
                }
                if fpr_index < HF_S_ARGUMENT_REGISTERS.len() {
                    spills.push(EntrySpill::register(HF_S_ARGUMENT_REGISTERS[fpr_index]));
                    fpr_index += 1;
                } else {
                    spills.push(EntrySpill::placeholder(4));
                }
            }
        } else {
            if is_non_reference_long(&args) {
                // A leading long skips R1 and takes R2/R3.
                if gpr_index < last_gpr && gpr_index == 1 {
                    gpr_index += 1;
                }
                if gpr_index < last_gpr {
                    spills.push(EntrySpill::register(HF_CORE_ARGUMENT_REGISTERS[gpr_index]));
                    gpr_index += 1;
                } else if gpr_index == last_gpr {
                    // Split between R3 and the stack: read both halves from memory.
                    gpr_index += 1;
                    spills.push(EntrySpill::placeholder(4));
                } else {
                    spills.push(EntrySpill::placeholder(4));
                }
            }
            // High half of a long, or a 32-bit value.
            if gpr_index < HF_CORE_ARGUMENT_REGISTERS.len() {
                spills.push(EntrySpill::register(HF_CORE_ARGUMENT_REGISTERS[gpr_index]));
                gpr_index += 1;
            } else {
                spills.push(EntrySpill::placeholder(4));
            }
        }
        args.advance();
    }
    spills
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::InstructionSet;
    use pretty_assertions::assert_eq;

    fn spills(is_static: bool, shorty: &str) -> Vec<EntrySpill> {
        ManagedRuntimeCallingConvention::create(is_static, false, shorty, InstructionSet::Arm)
            .unwrap()
            .entry_spills()
            .to_vec()
    }

    #[test]
    fn test_spill_masks() {
        assert_eq!(ABI.core_spill_mask, 0x4DE0);
        assert_eq!(ABI.fp_spill_mask, 0xFFFF_0000);
        assert_eq!(ABI.callee_save_registers.len(), 22);
    }

    #[test]
    fn test_register_names() {
        assert_eq!(register_name(RegisterClass::Core, 12), "r12");
        assert_eq!(register_name(RegisterClass::Core, LR), "lr");
        assert_eq!(register_name(RegisterClass::CorePair, R2), "r2_r3");
        assert_eq!(register_name(RegisterClass::Double, 7), "d7");
    }

    #[test]
    fn test_return_registers_differ_for_floats() {
        let shorty = Shorty::parse("DD").unwrap();
        assert_eq!(managed_return_register(&shorty), double(0));
        assert_eq!(jni_return_register(&shorty), pair(R0));
        let shorty = Shorty::parse("F").unwrap();
        assert_eq!(managed_return_register(&shorty), single(0));
        assert_eq!(jni_return_register(&shorty), core(R0));
    }

    #[test]
    fn test_leading_long_skips_r1() {
        assert_eq!(
            spills(true, "VJI"),
            vec![
                EntrySpill::register(Register::core(Architecture::Arm, R2)),
                EntrySpill::register(Register::core(Architecture::Arm, R3)),
                EntrySpill::placeholder(4),
            ]
        );
    }

    #[test]
    fn test_long_split_across_r3_goes_to_memory() {
        assert_eq!(
            spills(false, "VIJI"),
            vec![
                EntrySpill::register(Register::core(Architecture::Arm, R1)),
                EntrySpill::register(Register::core(Architecture::Arm, R2)),
                EntrySpill::placeholder(4),
                EntrySpill::placeholder(4),
                EntrySpill::placeholder(4),
            ]
        );
    }

    #[test]
    fn test_float_backfills_after_double() {
        // F -> s0, D -> d1 (s2/s3), F -> s1
        assert_eq!(
            spills(true, "VFDF"),
            vec![
                EntrySpill::register(Register::single(Architecture::Arm, 0)),
                EntrySpill::register(Register::double(Architecture::Arm, 1)),
                EntrySpill::register(Register::single(Architecture::Arm, 1)),
            ]
        );
    }

    #[test]
    fn test_spill_sizes() {
        let all = spills(true, "VDFJ");
        let sizes: Vec<_> = all.iter().map(EntrySpill::size).collect();
        assert_eq!(sizes, vec![8, 4, 4, 4]);
    }
}
