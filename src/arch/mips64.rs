// src/arch/mips64.rs
//! MIPS64 architecture support
//! Register file and n64 calling convention rules. Argument positions share a
//! single index across the integer (a0-a7) and floating point (f12-f19) files.

use crate::arch::{
    core_spill_mask, fp_spill_mask, Architecture, ManagedRegister, NativeAbi, Register,
    RegisterClass, STACK_ALIGNMENT,
};
use crate::jni::{JniArgs, JniCallingConvention};
use crate::managed::{is_non_reference_long, EntrySpill, ManagedRuntimeCallingConvention};
use crate::primitive::{Primitive, Shorty};

pub const AT: u8 = 1;
pub const V0: u8 = 2;
pub const A0: u8 = 4;
pub const S2: u8 = 18;
pub const S7: u8 = 23;
pub const T9: u8 = 25;
pub const GP: u8 = 28;
pub const S8: u8 = 30;
pub const RA: u8 = 31;
/// First floating point argument register
pub const F12: u8 = 12;

const MAX_REGISTER_ARGUMENTS: usize = 8;

const CORE_NAMES: [&str; 32] = [
    "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", "a4", "a5", "a6", "a7", "t0", "t1", "t2",
    "t3", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1", "gp", "sp",
    "s8", "ra",
];

const fn gpr(number: u8) -> ManagedRegister {
    ManagedRegister::core(Architecture::Mips64, number)
}

const fn fpr(number: u8, is_double: bool) -> Register {
    if is_double {
        Register::double(Architecture::Mips64, number)
    } else {
        Register::single(Architecture::Mips64, number)
    }
}

const CALLEE_SAVE_REGISTERS: [ManagedRegister; 8] = [
    gpr(S2),
    gpr(S2 + 1),
    gpr(S2 + 2),
    gpr(S2 + 3),
    gpr(S2 + 4),
    gpr(S7),
    gpr(GP),
    gpr(S8),
    // No hard float callee saves.
];

/// ABI constants for MIPS64
pub static ABI: NativeAbi = NativeAbi {
    name: "MIPS n64",
    callee_save_registers: &CALLEE_SAVE_REGISTERS,
    core_spill_mask: core_spill_mask(&CALLEE_SAVE_REGISTERS, 1 << RA),
    fp_spill_mask: fp_spill_mask(&CALLEE_SAVE_REGISTERS),
    method_register: gpr(A0),
    interprocedural_scratch_register: gpr(T9),
    return_scratch_register: gpr(AT),
    int_return_register: gpr(V0),
    requires_small_result_type_extension: true,
    return_address_size: 8,
    out_arg_home_area: 0,
    managed_stack_slot_size: 4,
    aligns_wide_arguments: false,
    max_int_like_register_arguments: MAX_REGISTER_ARGUMENTS,
    max_float_or_double_register_arguments: MAX_REGISTER_ARGUMENTS,
    stack_alignment: STACK_ALIGNMENT,
};

pub fn register_name(class: RegisterClass, number: u8) -> String {
    match class {
        RegisterClass::Core | RegisterClass::CoreHalf | RegisterClass::CorePair => {
            CORE_NAMES[usize::from(number) % CORE_NAMES.len()].to_string()
        }
        // FPU registers are 64 bits wide; both views share a name.
        RegisterClass::Single | RegisterClass::Double => format!("f{}", number),
    }
}

/// Same registers for managed and native returns
pub fn return_register(shorty: &Shorty) -> ManagedRegister {
    match shorty.return_type() {
        Primitive::Float | Primitive::Double => ManagedRegister::Physical(fpr(0, true)),
        Primitive::Void => ManagedRegister::NoRegister,
        _ => gpr(V0),
    }
}

pub(crate) fn is_current_param_in_register(args: &JniArgs<'_>) -> bool {
    args.cursor().args() < MAX_REGISTER_ARGUMENTS
}

pub(crate) fn current_param_register(args: &JniArgs<'_>) -> ManagedRegister {
    let index = args.cursor().args() as u8;
    if args.is_current_param_a_float_or_double() {
        ManagedRegister::Physical(fpr(F12 + index, args.is_current_param_a_double()))
    } else {
        gpr(A0 + index)
    }
}

pub(crate) fn current_param_stack_slot(args: &JniArgs<'_>) -> usize {
    args.cursor().args() - MAX_REGISTER_ARGUMENTS
}

pub(crate) fn number_of_outgoing_stack_args(conv: &JniCallingConvention) -> usize {
    let all_args = conv.num_args() + conv.number_of_extra_arguments_for_jni();
    all_args.saturating_sub(MAX_REGISTER_ARGUMENTS)
}

// Arguments past the eighth position are already in memory and get no record.
pub(crate) fn entry_spills(conv: &ManagedRuntimeCallingConvention) -> Vec<EntrySpill> {
    let mut spills = Vec::new();
    let mut reg_index: u8 = 1; // A0 holds the ArtMethod*.

    // The managed stack uses 32-bit slots, so each record carries the value width.
    // e.g. A1, A2, F3, A4, F5, F6, A7
    let mut args = conv.args(Default::default());
    while args.has_next() {
        if usize::from(reg_index) < MAX_REGISTER_ARGUMENTS {
            if args.is_current_param_a_float_or_double() {
                let is_double = args.is_current_param_a_double();
                spills.push(EntrySpill::sized(
                    fpr(F12 + reg_index, is_double),
                    if is_double { 8 } else { 4 },
                ));
            } else {
                spills.push(EntrySpill::sized(
                    Register::core(Architecture::Mips64, A0 + reg_index),
                    if is_non_reference_long(&args) { 8 } else { 4 },
                ));
            }
            reg_index += 1;
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
        assert_eq!(ABI.core_spill_mask, 0xD0FC_0000);
        assert_eq!(ABI.fp_spill_mask, 0);
        assert_eq!(ABI.callee_save_registers.len(), 8);
    }

    #[test]
    fn test_return_register_names() {
        let shorty = Shorty::parse("D").unwrap();
        assert_eq!(return_register(&shorty).to_string(), "f0");
        let shorty = Shorty::parse("J").unwrap();
        assert_eq!(return_register(&shorty).to_string(), "v0");
    }

    #[test]
    fn test_shared_argument_index() {
        let conv =
            JniCallingConvention::create(true, false, false, "VIFJD", InstructionSet::Mips64)
                .unwrap();
        let placements: Vec<_> = conv
            .locations(FrameOffset(0))
            .map(|loc| loc.placement.to_string())
            .collect();
        assert_eq!(placements, vec!["a0", "a1", "a2", "f15", "a4", "f17"]);
    }

    #[test]
    fn test_stack_args_after_eight() {
        let conv = JniCallingConvention::create(
            false,
            false,
            false,
            "VIIIIIIII",
            InstructionSet::Mips64,
        )
        .unwrap();
        assert_eq!(conv.number_of_outgoing_stack_args(), 2);
        assert_eq!(conv.out_arg_size(), 16);
        let offsets: Vec<_> = conv
            .locations(FrameOffset(16))
            .filter_map(|loc| match loc.placement {
                ArgPlacement::Stack(offset) => Some(offset),
                ArgPlacement::Register(_) => None,
            })
            .collect();
        assert_eq!(offsets, vec![FrameOffset(0), FrameOffset(8)]);
    }

    #[test]
    fn test_entry_spills_stop_without_placeholders() {
        let conv = ManagedRuntimeCallingConvention::create(
            true,
            false,
            "VIJFDIIIII",
            InstructionSet::Mips64,
        )
        .unwrap();
        let spills = conv.entry_spills();
        assert_eq!(spills.len(), 7);
        assert_eq!(spills[0], EntrySpill::sized(Register::core(Architecture::Mips64, 5), 4));
        assert_eq!(spills[1], EntrySpill::sized(Register::core(Architecture::Mips64, 6), 8));
        assert_eq!(spills[2], EntrySpill::sized(fpr(15, false), 4));
        assert_eq!(spills[3], EntrySpill::sized(fpr(16, true), 8));
        assert!(spills.iter().all(|spill| !spill.is_placeholder()));
    }
}
