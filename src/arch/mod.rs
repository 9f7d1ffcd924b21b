// src/arch/mod.rs
//! Architecture-specific definitions
//! Register files, callee-save sets and the native ABI constants for every
//! instruction set a JNI or managed calling convention can be built for.

pub mod aarch64; // ARM64
pub mod arm; // ARM (32-bit, Thumb2)
pub mod mips; // MIPS32 o32
pub mod mips64; // MIPS64 n64

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Stack alignment required at call boundaries, identical on every modelled ISA
pub const STACK_ALIGNMENT: usize = 16;

/// Instruction set a method is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstructionSet {
    Arm,
    Thumb2,
    Arm64,
    Mips,
    Mips64,
    X86,
    X86_64,
}

impl fmt::Display for InstructionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstructionSet::Arm => "arm",
            InstructionSet::Thumb2 => "thumb2",
            InstructionSet::Arm64 => "arm64",
            InstructionSet::Mips => "mips",
            InstructionSet::Mips64 => "mips64",
            InstructionSet::X86 => "x86",
            InstructionSet::X86_64 => "x86_64",
        };
        f.write_str(name)
    }
}

impl FromStr for InstructionSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "arm" | "armv7" => Ok(InstructionSet::Arm),
            "thumb2" | "thumb" => Ok(InstructionSet::Thumb2),
            "arm64" | "aarch64" => Ok(InstructionSet::Arm64),
            "mips" | "mips32" => Ok(InstructionSet::Mips),
            "mips64" => Ok(InstructionSet::Mips64),
            "x86" | "i386" => Ok(InstructionSet::X86),
            "x86_64" | "x86-64" | "amd64" => Ok(InstructionSet::X86_64),
            _ => Err(Error::UnknownInstructionSet(s.to_string())),
        }
    }
}

/// Architectures with a calling convention implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Architecture {
    /// ARM 32-bit, AAPCS soft-float for JNI, hard-float for managed code
    Arm,
    /// AArch64, AAPCS64
    Arm64,
    /// MIPS32, o32
    Mips,
    /// MIPS64, n64
    Mips64,
}

impl Architecture {
    /// Pointer size, which is also the size of a frame slot
    pub fn pointer_size(self) -> PointerSize {
        match self {
            Architecture::Arm | Architecture::Mips => PointerSize::K32,
            Architecture::Arm64 | Architecture::Mips64 => PointerSize::K64,
        }
    }

    /// ABI constants for this architecture
    pub fn abi(self) -> &'static NativeAbi {
        match self {
            Architecture::Arm => &arm::ABI,
            Architecture::Arm64 => &aarch64::ABI,
            Architecture::Mips => &mips::ABI,
            Architecture::Mips64 => &mips64::ABI,
        }
    }
}

impl TryFrom<InstructionSet> for Architecture {
    type Error = Error;

    fn try_from(isa: InstructionSet) -> Result<Self, Self::Error> {
        match isa {
            InstructionSet::Arm | InstructionSet::Thumb2 => Ok(Architecture::Arm),
            InstructionSet::Arm64 => Ok(Architecture::Arm64),
            InstructionSet::Mips => Ok(Architecture::Mips),
            InstructionSet::Mips64 => Ok(Architecture::Mips64),
            InstructionSet::X86 | InstructionSet::X86_64 => {
                Err(Error::UnsupportedInstructionSet(isa))
            }
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::Arm => write!(f, "arm"),
            Architecture::Arm64 => write!(f, "arm64"),
            Architecture::Mips => write!(f, "mips"),
            Architecture::Mips64 => write!(f, "mips64"),
        }
    }
}

/// Size of a native pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PointerSize {
    K32,
    K64,
}

impl PointerSize {
    pub const fn bytes(self) -> usize {
        match self {
            PointerSize::K32 => 4,
            PointerSize::K64 => 8,
        }
    }
}

/// Register classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RegisterClass {
    /// General purpose register at its full width
    Core,
    /// 32-bit view of a 64-bit general purpose register (arm64 `w`)
    CoreHalf,
    /// Two consecutive 32-bit general purpose registers, named by the low one
    CorePair,
    /// Single precision floating point register
    Single,
    /// Double precision floating point register
    Double,
}

/// Physical register of a given architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    pub arch: Architecture,
    pub class: RegisterClass,
    /// Register number within its class
    pub number: u8,
}

impl Register {
    pub const fn new(arch: Architecture, class: RegisterClass, number: u8) -> Self {
        Self {
            arch,
            class,
            number,
        }
    }

    pub const fn core(arch: Architecture, number: u8) -> Self {
        Self::new(arch, RegisterClass::Core, number)
    }

    pub const fn core_half(arch: Architecture, number: u8) -> Self {
        Self::new(arch, RegisterClass::CoreHalf, number)
    }

    pub const fn pair(arch: Architecture, low: u8) -> Self {
        Self::new(arch, RegisterClass::CorePair, low)
    }

    pub const fn single(arch: Architecture, number: u8) -> Self {
        Self::new(arch, RegisterClass::Single, number)
    }

    pub const fn double(arch: Architecture, number: u8) -> Self {
        Self::new(arch, RegisterClass::Double, number)
    }

    pub const fn is_floating_point(&self) -> bool {
        matches!(self.class, RegisterClass::Single | RegisterClass::Double)
    }

    /// Width of the value the register holds, in bytes
    pub fn size(&self) -> usize {
        match self.class {
            RegisterClass::Core => self.arch.pointer_size().bytes(),
            RegisterClass::CoreHalf | RegisterClass::Single => 4,
            RegisterClass::CorePair | RegisterClass::Double => 8,
        }
    }

    pub fn name(&self) -> String {
        match self.arch {
            Architecture::Arm => arm::register_name(self.class, self.number),
            Architecture::Arm64 => aarch64::register_name(self.class, self.number),
            Architecture::Mips => mips::register_name(self.class, self.number),
            Architecture::Mips64 => mips64::register_name(self.class, self.number),
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl Serialize for Register {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

/// A register handed to the code generator, or the absence of one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagedRegister {
    NoRegister,
    Physical(Register),
}

impl ManagedRegister {
    pub const fn core(arch: Architecture, number: u8) -> Self {
        ManagedRegister::Physical(Register::core(arch, number))
    }

    pub const fn core_half(arch: Architecture, number: u8) -> Self {
        ManagedRegister::Physical(Register::core_half(arch, number))
    }

    pub const fn pair(arch: Architecture, low: u8) -> Self {
        ManagedRegister::Physical(Register::pair(arch, low))
    }

    pub const fn single(arch: Architecture, number: u8) -> Self {
        ManagedRegister::Physical(Register::single(arch, number))
    }

    pub const fn double(arch: Architecture, number: u8) -> Self {
        ManagedRegister::Physical(Register::double(arch, number))
    }

    pub fn is_no_register(&self) -> bool {
        matches!(self, ManagedRegister::NoRegister)
    }

    pub fn register(&self) -> Option<Register> {
        match self {
            ManagedRegister::NoRegister => None,
            ManagedRegister::Physical(reg) => Some(*reg),
        }
    }
}

impl fmt::Display for ManagedRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagedRegister::NoRegister => f.write_str("none"),
            ManagedRegister::Physical(reg) => reg.fmt(f),
        }
    }
}

impl Serialize for ManagedRegister {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ManagedRegister::NoRegister => serializer.serialize_none(),
            ManagedRegister::Physical(reg) => serializer.serialize_some(reg),
        }
    }
}

/// OR together the bit of every core callee save, plus `extra` for registers
/// saved implicitly (the link register) and not listed.
pub const fn core_spill_mask(callee_saves: &[ManagedRegister], extra: u32) -> u32 {
    let mut result = extra;
    let mut i = 0;
    while i < callee_saves.len() {
        if let ManagedRegister::Physical(reg) = callee_saves[i] {
            if matches!(reg.class, RegisterClass::Core) {
                result |= 1 << reg.number;
            }
        }
        i += 1;
    }
    result
}

/// OR together the bit of every floating point callee save
pub const fn fp_spill_mask(callee_saves: &[ManagedRegister]) -> u32 {
    let mut result = 0;
    let mut i = 0;
    while i < callee_saves.len() {
        if let ManagedRegister::Physical(reg) = callee_saves[i] {
            if reg.is_floating_point() {
                result |= 1 << reg.number;
            }
        }
        i += 1;
    }
    result
}

/// Native ABI constants shared by the managed and JNI conventions
#[derive(Debug)]
pub struct NativeAbi {
    /// Name of the native calling convention, shown in reports
    pub name: &'static str,
    /// Registers saved around the native call, in save order
    pub callee_save_registers: &'static [ManagedRegister],
    pub core_spill_mask: u32,
    pub fp_spill_mask: u32,
    /// Register holding the ArtMethod* on managed entry
    pub method_register: ManagedRegister,
    pub interprocedural_scratch_register: ManagedRegister,
    /// Extra scratch register live after the native call
    pub return_scratch_register: ManagedRegister,
    pub int_return_register: ManagedRegister,
    /// Whether the caller must sign/zero extend small return types
    pub requires_small_result_type_extension: bool,
    /// Return address slot not already covered by the callee saves
    pub return_address_size: usize,
    /// Stack reserved for the callee to home register arguments
    pub out_arg_home_area: usize,
    /// Size of a managed incoming stack slot
    pub managed_stack_slot_size: usize,
    /// Longs and doubles start on an even slot (AAPCS, o32)
    pub aligns_wide_arguments: bool,
    /// Native integer-like argument registers
    pub max_int_like_register_arguments: usize,
    /// Native floating point argument registers
    pub max_float_or_double_register_arguments: usize,
    /// Stack alignment in bytes
    pub stack_alignment: usize,
}

pub(crate) fn round_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_thumb2_routes_to_arm() {
        assert_eq!(
            Architecture::try_from(InstructionSet::Thumb2),
            Ok(Architecture::Arm)
        );
        assert_eq!(
            Architecture::try_from(InstructionSet::X86_64),
            Err(Error::UnsupportedInstructionSet(InstructionSet::X86_64))
        );
    }

    #[test]
    fn test_instruction_set_from_str() {
        assert_eq!("AArch64".parse::<InstructionSet>(), Ok(InstructionSet::Arm64));
        assert_eq!("mips".parse::<InstructionSet>(), Ok(InstructionSet::Mips));
        assert!("sparc".parse::<InstructionSet>().is_err());
    }

    #[test]
    fn test_round_up() {
        assert_eq!(round_up(0, 16), 0);
        assert_eq!(round_up(1, 16), 16);
        assert_eq!(round_up(112, 16), 112);
    }

    #[test]
    fn test_register_sizes() {
        assert_eq!(Register::new(Architecture::Arm, RegisterClass::Core, 0).size(), 4);
        assert_eq!(Register::new(Architecture::Arm64, RegisterClass::Core, 0).size(), 8);
        assert_eq!(Register::new(Architecture::Arm64, RegisterClass::CoreHalf, 0).size(), 4);
        assert_eq!(Register::new(Architecture::Mips, RegisterClass::CorePair, 4).size(), 8);
    }

    #[test]
    fn test_fp_spill_mask_ignores_core_registers() {
        let saves = [
            ManagedRegister::core(Architecture::Arm, 5),
            ManagedRegister::single(Architecture::Arm, 16),
            ManagedRegister::NoRegister,
            ManagedRegister::double(Architecture::Arm64, 8),
        ];
        assert!(Register::double(Architecture::Arm64, 8).is_floating_point());
        assert!(!Register::pair(Architecture::Mips, 4).is_floating_point());
        assert_eq!(fp_spill_mask(&saves), (1 << 16) | (1 << 8));
        assert_eq!(core_spill_mask(&saves, 1 << 14), (1 << 14) | (1 << 5));
    }
}
