// src/arch/mips.rs
//! MIPS32 architecture support
//! Register file and o32 calling convention rules. Native calls reserve a
//! 16-byte home area for the four argument registers; wide values use
//! even/odd register pairs.

use crate::arch::{
    core_spill_mask, fp_spill_mask, Architecture, ManagedRegister, NativeAbi, Register,
    RegisterClass, STACK_ALIGNMENT,
};
use crate::jni::{JniArgs, JniCallingConvention};
use crate::managed::{is_non_reference_long, EntrySpill, ManagedRuntimeCallingConvention};
use crate::primitive::{Primitive, Shorty};

pub const ZERO: u8 = 0;
pub const AT: u8 = 1;
pub const V0: u8 = 2;
pub const V1: u8 = 3;
pub const A0: u8 = 4;
pub const A1: u8 = 5;
pub const A2: u8 = 6;
pub const A3: u8 = 7;
pub const T0: u8 = 8;
pub const T1: u8 = 9;
pub const S2: u8 = 18;
pub const S3: u8 = 19;
pub const S4: u8 = 20;
pub const S5: u8 = 21;
pub const S6: u8 = 22;
pub const S7: u8 = 23;
pub const T9: u8 = 25;
pub const FP: u8 = 30;
pub const RA: u8 = 31;

const CORE_NAMES: [&str; 32] = [
    "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5", "t6",
    "t7", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1", "gp", "sp",
    "fp", "ra",
];

const fn core(number: u8) -> ManagedRegister {
    ManagedRegister::core(Architecture::Mips, number)
}

const fn pair(low: u8) -> ManagedRegister {
    ManagedRegister::pair(Architecture::Mips, low)
}

const fn f(number: u8) -> ManagedRegister {
    ManagedRegister::single(Architecture::Mips, number)
}

/// Double register `d<n>` overlaps `f<2n>` and `f<2n+1>`
const fn d(number: u8) -> ManagedRegister {
    ManagedRegister::double(Architecture::Mips, number)
}

const fn managed_core(number: u8) -> Register {
    Register::core(Architecture::Mips, number)
}

const fn managed_f(number: u8) -> Register {
    Register::single(Architecture::Mips, number)
}

const fn managed_d(number: u8) -> Register {
    Register::double(Architecture::Mips, number)
}

// Managed argument registers. A0 carries the ArtMethod*.
const CORE_ARGUMENT_REGISTERS: [Register; 6] = [
    managed_core(A0),
    managed_core(A1),
    managed_core(A2),
    managed_core(A3),
    managed_core(T0),
    managed_core(T1),
];
const F_ARGUMENT_REGISTERS: [Register; 6] = [
    managed_f(8),
    managed_f(10),
    managed_f(12),
    managed_f(14),
    managed_f(16),
    managed_f(18),
];
const D_ARGUMENT_REGISTERS: [Register; 6] = [
    managed_d(4),
    managed_d(5),
    managed_d(6),
    managed_d(7),
    managed_d(8),
    managed_d(9),
];

// Native argument registers.
const JNI_CORE_ARGUMENT_REGISTERS: [ManagedRegister; 4] = [core(A0), core(A1), core(A2), core(A3)];
const JNI_F_ARGUMENT_REGISTERS: [ManagedRegister; 2] = [f(12), f(14)];
const JNI_D_ARGUMENT_REGISTERS: [ManagedRegister; 2] = [d(6), d(7)];

const CALLEE_SAVE_REGISTERS: [ManagedRegister; 7] = [
    core(S2),
    core(S3),
    core(S4),
    core(S5),
    core(S6),
    core(S7),
    core(FP),
    // No hard float callee saves.
];

/// ABI constants for MIPS32
pub static ABI: NativeAbi = NativeAbi {
    name: "MIPS o32",
    callee_save_registers: &CALLEE_SAVE_REGISTERS,
    core_spill_mask: core_spill_mask(&CALLEE_SAVE_REGISTERS, 1 << RA),
    fp_spill_mask: fp_spill_mask(&CALLEE_SAVE_REGISTERS),
    method_register: core(A0),
    interprocedural_scratch_register: core(T9),
    return_scratch_register: core(AT),
    int_return_register: core(V0),
    requires_small_result_type_extension: true,
    return_address_size: 4,
    // Argument home area, allocated even when every argument is in a register.
    out_arg_home_area: 16,
    managed_stack_slot_size: 4,
    aligns_wide_arguments: true,
    max_int_like_register_arguments: 4,
    max_float_or_double_register_arguments: 2,
    stack_alignment: STACK_ALIGNMENT,
};

pub fn register_name(class: RegisterClass, number: u8) -> String {
    let core_name = |n: u8| CORE_NAMES[usize::from(n) % CORE_NAMES.len()];
    match class {
        RegisterClass::Core | RegisterClass::CoreHalf => core_name(number).to_string(),
        RegisterClass::CorePair => format!("{}_{}", core_name(number), core_name(number + 1)),
        RegisterClass::Single => format!("f{}", number),
        RegisterClass::Double => format!("d{}", number),
    }
}

pub fn return_register(shorty: &Shorty) -> ManagedRegister {
    match shorty.return_type() {
        Primitive::Float => f(0),
        Primitive::Double => d(0),
        Primitive::Long => pair(V0),
        Primitive::Void => ManagedRegister::NoRegister,
        _ => core(V0),
    }
}

/// o32 puts leading floating point arguments in FP registers only when no
/// integer argument precedes them, which for JNI means critical natives.
pub(crate) fn uses_fp_arg_registers(conv: &JniCallingConvention) -> bool {
    conv.is_critical_native() && conv.num_args() > 0 && conv.is_param_a_float_or_double(0)
}

pub(crate) fn current_param_register(args: &JniArgs<'_>) -> ManagedRegister {
    let cursor = args.cursor();
    let conv = args.convention();
    if conv.uses_fp_arg_registers()
        && cursor.args() < conv.abi().max_float_or_double_register_arguments
        && args.is_current_param_a_float_or_double()
    {
        return if args.is_current_param_a_double() {
            JNI_D_ARGUMENT_REGISTERS[cursor.args()]
        } else {
            JNI_F_ARGUMENT_REGISTERS[cursor.args()]
        };
    }
    if args.is_current_param_a_long_or_double() {
        match cursor.slots() {
            0 => pair(A0),
            2 => pair(A2),
            slot => panic!("wide argument in odd register slot {}", slot),
        }
    } else {
        JNI_CORE_ARGUMENT_REGISTERS[cursor.slots()]
    }
}

/// The home area covers the register slots, so the slot index maps directly
pub(crate) fn current_param_stack_slot(args: &JniArgs<'_>) -> usize {
    args.cursor().slots()
}

pub(crate) fn entry_spills(conv: &ManagedRuntimeCallingConvention) -> Vec<EntrySpill> {
    let mut spills = Vec::new();
    let mut gpr_index = 1; // A0 holds the ArtMethod*.
    let mut fpr_index = 0;
    let last_gpr = CORE_ARGUMENT_REGISTERS.len() - 1;

    let mut args = conv.args(Default::default());
    while args.has_next() {
        if args.is_current_param_a_float_or_double() {
            if args.is_current_param_a_double() {
                if fpr_index < D_ARGUMENT_REGISTERS.len() {
                    spills.push(EntrySpill::register(D_ARGUMENT_REGISTERS[fpr_index]));
                    fpr_index += 1;
                } else {
                    spills.push(EntrySpill::placeholder(8));
                }
            } else if fpr_index < F_ARGUMENT_REGISTERS.len() {
                spills.push(EntrySpill::register(F_ARGUMENT_REGISTERS[fpr_index]));
                fpr_index += 1;
            } else {
                spills.push(EntrySpill::placeholder(4));
            }
        } else {
            if is_non_reference_long(&args) {
                // A1/A2 and A3/T0 are not valid pairs; move to A2/A3 or T0/T1.
                if gpr_index == 1 || gpr_index == 3 {
                    gpr_index += 1;
                }
                if gpr_index < last_gpr {
                    spills.push(EntrySpill::register(CORE_ARGUMENT_REGISTERS[gpr_index]));
                    gpr_index += 1;
                } else if gpr_index == last_gpr {
                    gpr_index += 1;
                    spills.push(EntrySpill::placeholder(4));
                } else {
                    spills.push(EntrySpill::placeholder(4));
                }
            }
            if gpr_index < CORE_ARGUMENT_REGISTERS.len() {
                spills.push(EntrySpill::register(CORE_ARGUMENT_REGISTERS[gpr_index]));
                gpr_index += 1;
            } else {
                spills.push(EntrySpill::placeholder(4));
            }
        }
        args.advance();
    }
    spills
}
