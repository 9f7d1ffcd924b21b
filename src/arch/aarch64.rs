// src/arch/aarch64.rs
//! ARM64 (AArch64) architecture support
//! Register file and AAPCS64 calling convention rules. Integer and floating
//! point arguments draw from independent banks of eight registers each.

use crate::arch::{
    core_spill_mask, fp_spill_mask, Architecture, ManagedRegister, NativeAbi, Register,
    RegisterClass, STACK_ALIGNMENT,
};
use crate::jni::{JniArgs, JniCallingConvention};
use crate::managed::{is_non_reference_long, EntrySpill, ManagedRuntimeCallingConvention};
use crate::primitive::{Primitive, Shorty};

pub const X0: u8 = 0;
pub const X19: u8 = 19;
pub const X20: u8 = 20;
pub const FP: u8 = 29;
pub const LR: u8 = 30;
pub const SP: u8 = 31;

const MAX_INT_LIKE_REGISTER_ARGUMENTS: usize = 8;
const MAX_FLOAT_OR_DOUBLE_REGISTER_ARGUMENTS: usize = 8;

const fn x(number: u8) -> ManagedRegister {
    ManagedRegister::core(Architecture::Arm64, number)
}

const fn w(number: u8) -> ManagedRegister {
    ManagedRegister::core_half(Architecture::Arm64, number)
}

const fn s(number: u8) -> ManagedRegister {
    ManagedRegister::single(Architecture::Arm64, number)
}

const fn d(number: u8) -> ManagedRegister {
    ManagedRegister::double(Architecture::Arm64, number)
}

const CALLEE_SAVE_REGISTERS: [ManagedRegister; 20] = [
    // Core registers. The stub frame can become the top quick frame during a
    // suspend, so it saves the same set as a refs-only callee save frame.
    x(19), x(20), x(21), x(22), x(23), x(24), x(25), x(26), x(27), x(28), x(FP), x(LR),
    // Hard float registers.
    d(8), d(9), d(10), d(11), d(12), d(13), d(14), d(15),
];

/// ABI constants for ARM64
pub static ABI: NativeAbi = NativeAbi {
    name: "AAPCS64",
    callee_save_registers: &CALLEE_SAVE_REGISTERS,
    core_spill_mask: core_spill_mask(&CALLEE_SAVE_REGISTERS, 0),
    fp_spill_mask: fp_spill_mask(&CALLEE_SAVE_REGISTERS),
    method_register: x(X0),
    // IP0/IP1 are clobbered by the read barrier marking entrypoints.
    interprocedural_scratch_register: x(X20),
    return_scratch_register: ManagedRegister::NoRegister,
    int_return_register: w(X0),
    requires_small_result_type_extension: true,
    // LR is already part of the callee saves.
    return_address_size: 0,
    out_arg_home_area: 0,
    managed_stack_slot_size: 4,
    aligns_wide_arguments: false,
    max_int_like_register_arguments: MAX_INT_LIKE_REGISTER_ARGUMENTS,
    max_float_or_double_register_arguments: MAX_FLOAT_OR_DOUBLE_REGISTER_ARGUMENTS,
    stack_alignment: STACK_ALIGNMENT,
};

pub fn register_name(class: RegisterClass, number: u8) -> String {
    match (class, number) {
        (RegisterClass::Core, LR) => "lr".to_string(),
        (RegisterClass::Core, SP) => "sp".to_string(),
        (RegisterClass::Core | RegisterClass::CorePair, n) => format!("x{}", n),
        (RegisterClass::CoreHalf, SP) => "wsp".to_string(),
        (RegisterClass::CoreHalf, n) => format!("w{}", n),
        (RegisterClass::Single, n) => format!("s{}", n),
        (RegisterClass::Double, n) => format!("d{}", n),
    }
}

/// Same registers for managed and native returns
pub fn return_register(shorty: &Shorty) -> ManagedRegister {
    match shorty.return_type() {
        Primitive::Float => s(0),
        Primitive::Double => d(0),
        Primitive::Long => x(X0),
        Primitive::Void => ManagedRegister::NoRegister,
        _ => w(X0),
    }
}

pub(crate) fn is_current_param_in_register(args: &JniArgs<'_>) -> bool {
    let cursor = args.cursor();
    if args.is_current_param_a_float_or_double() {
        cursor.float_and_doubles() < MAX_FLOAT_OR_DOUBLE_REGISTER_ARGUMENTS
    } else {
        cursor.args() - cursor.float_and_doubles() < MAX_INT_LIKE_REGISTER_ARGUMENTS
    }
}

pub(crate) fn current_param_register(args: &JniArgs<'_>) -> ManagedRegister {
    let cursor = args.cursor();
    if args.is_current_param_a_float_or_double() {
        let index = cursor.float_and_doubles() as u8;
        if args.is_current_param_a_double() {
            d(index)
        } else {
            s(index)
        }
    } else {
        let index = (cursor.args() - cursor.float_and_doubles()) as u8;
        if args.is_current_param_a_long()
            || args.is_current_param_a_reference()
            || args.is_current_param_jni_env()
        {
            x(index)
        } else {
            w(index)
        }
    }
}

/// Arguments before this one that also missed their register bank
pub(crate) fn current_param_stack_slot(args: &JniArgs<'_>) -> usize {
    let cursor = args.cursor();
    let fp_args = cursor.float_and_doubles();
    cursor.args()
        - fp_args.min(MAX_FLOAT_OR_DOUBLE_REGISTER_ARGUMENTS)
        - (cursor.args() - fp_args).min(MAX_INT_LIKE_REGISTER_ARGUMENTS)
}

pub(crate) fn number_of_outgoing_stack_args(conv: &JniCallingConvention) -> usize {
    // All arguments including the JNI ones.
    let all_args = conv.num_args() + conv.number_of_extra_arguments_for_jni();
    let fp_args = conv.num_float_or_double_args();
    all_args
        - fp_args.min(MAX_FLOAT_OR_DOUBLE_REGISTER_ARGUMENTS)
        - (all_args - fp_args).min(MAX_INT_LIKE_REGISTER_ARGUMENTS)
}

fn spill(class: RegisterClass, number: u8) -> EntrySpill {
    EntrySpill::register(Register::new(Architecture::Arm64, class, number))
}

pub(crate) fn entry_spills(conv: &ManagedRuntimeCallingConvention) -> Vec<EntrySpill> {
    let mut spills = Vec::new();
    let mut gp_reg_index: u8 = 1; // X0 holds the ArtMethod*.
    let mut fp_reg_index: u8 = 0;

    // The managed stack uses 32-bit slots, so pick W or X by the value width.
    let mut args = conv.args(Default::default());
    while args.has_next() {
        if args.is_current_param_a_float_or_double() {
            if usize::from(fp_reg_index) < MAX_FLOAT_OR_DOUBLE_REGISTER_ARGUMENTS {
                if args.is_current_param_a_double() {
                    spills.push(spill(RegisterClass::Double, fp_reg_index));
                } else {
                    spills.push(spill(RegisterClass::Single, fp_reg_index));
                }
                fp_reg_index += 1;
            } else if args.is_current_param_a_double() {
                spills.push(EntrySpill::placeholder(8));
            } else {
                spills.push(EntrySpill::placeholder(4));
            }
        } else if usize::from(gp_reg_index) < MAX_INT_LIKE_REGISTER_ARGUMENTS {
            if is_non_reference_long(&args) {
                spills.push(spill(RegisterClass::Core, gp_reg_index));
            } else {
                spills.push(spill(RegisterClass::CoreHalf, gp_reg_index));
            }
            gp_reg_index += 1;
        } else if is_non_reference_long(&args) {
            spills.push(EntrySpill::placeholder(8));
        } else {
            spills.push(EntrySpill::placeholder(4));
        }
        args.advance();
    }
    spills
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::InstructionSet;
    use crate::calling_convention::{ArgPlacement, FrameOffset};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_spill_masks() {
        assert_eq!(ABI.core_spill_mask, 0x7FF8_0000);
        assert_eq!(ABI.fp_spill_mask, 0xFF00);
    }

    #[test]
    fn test_register_names() {
        assert_eq!(register_name(RegisterClass::Core, 20), "x20");
        assert_eq!(register_name(RegisterClass::CoreHalf, 0), "w0");
        assert_eq!(register_name(RegisterClass::Core, LR), "lr");
    }

    #[test]
    fn test_banks_are_independent() {
        let conv =
            JniCallingConvention::create(true, false, false, "VFIDJ", InstructionSet::Arm64)
                .unwrap();
        let placements: Vec<_> = conv
            .locations(FrameOffset(conv.out_arg_size()))
            .map(|loc| loc.placement)
            .collect();
        assert_eq!(
            placements,
            vec![
                ArgPlacement::Register(x(0)),
                ArgPlacement::Register(x(1)),
                ArgPlacement::Register(s(0)),
                ArgPlacement::Register(w(2)),
                ArgPlacement::Register(d(1)),
                ArgPlacement::Register(x(3)),
            ]
        );
        assert_eq!(conv.out_arg_size(), 0);
    }

    #[test]
    fn test_ninth_int_goes_to_stack() {
        // JNIEnv, jclass and seven ints fill x0-x7 and spill one int.
        let conv =
            JniCallingConvention::create(true, false, false, "VIIIIIII", InstructionSet::Arm64)
                .unwrap();
        assert_eq!(conv.number_of_outgoing_stack_args(), 1);
        assert_eq!(conv.out_arg_size(), 16);
        let last = conv.locations(FrameOffset(16)).last().unwrap();
        assert_eq!(last.placement, ArgPlacement::Stack(FrameOffset(0)));
    }

    #[test]
    fn test_entry_spills_pick_width() {
        let conv =
            ManagedRuntimeCallingConvention::create(false, false, "VJFL", InstructionSet::Arm64)
                .unwrap();
        assert_eq!(
            conv.entry_spills(),
            &[
                spill(RegisterClass::CoreHalf, 1),
                spill(RegisterClass::Core, 2),
                spill(RegisterClass::Single, 0),
                spill(RegisterClass::CoreHalf, 3),
            ]
        );
    }

    #[test]
    fn test_entry_spills_run_out_of_registers() {
        let conv = ManagedRuntimeCallingConvention::create(
            true,
            false,
            "VIIIIIIIJ",
            InstructionSet::Arm64,
        )
        .unwrap();
        let spills = conv.entry_spills();
        assert_eq!(spills.len(), 8);
        assert_eq!(spills[7], EntrySpill::placeholder(8));
        assert!(spills[..7].iter().all(|spill| !spill.is_placeholder()));
    }
}
