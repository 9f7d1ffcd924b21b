// src/managed.rs
//! Managed runtime calling convention.
//!
//! On every modelled architecture the caller has already materialised all
//! managed arguments on the stack, so the walk below only ever reports stack
//! offsets. The argument registers the quick ABI used on entry are recorded as
//! entry spills so the JNI stub can free them for scratch use.

use std::ops::Deref;

use once_cell::unsync::OnceCell;
use serde::Serialize;

use crate::arch::{self, Architecture, InstructionSet, ManagedRegister, NativeAbi, Register};
use crate::calling_convention::{
    ArgCursor, ArgKind, ArgLocation, ArgPlacement, CallingConvention, FrameOffset,
};
use crate::error::Result;
use crate::primitive::Shorty;

/// A register to spill on entry, or a stack-only placeholder of a given size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntrySpill {
    register: ManagedRegister,
    size: usize,
}

impl EntrySpill {
    /// Spill of a register at its natural width
    pub fn register(register: Register) -> Self {
        Self::sized(register, register.size())
    }

    /// Spill of a register with an explicit width
    pub const fn sized(register: Register, size: usize) -> Self {
        Self {
            register: ManagedRegister::Physical(register),
            size,
        }
    }

    /// No register left, the value stays in memory
    pub const fn placeholder(size: usize) -> Self {
        Self {
            register: ManagedRegister::NoRegister,
            size,
        }
    }

    pub fn managed_register(&self) -> ManagedRegister {
        self.register
    }

    pub fn is_placeholder(&self) -> bool {
        self.register.is_no_register()
    }

    /// Bytes this record covers in the managed stack
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Calling convention for code entered with the managed (quick) ABI
#[derive(Debug)]
pub struct ManagedRuntimeCallingConvention {
    base: CallingConvention,
    arch: Architecture,
    entry_spills: OnceCell<Vec<EntrySpill>>,
}

impl Deref for ManagedRuntimeCallingConvention {
    type Target = CallingConvention;

    fn deref(&self) -> &CallingConvention {
        &self.base
    }
}

impl ManagedRuntimeCallingConvention {
    pub fn create(
        is_static: bool,
        is_synchronized: bool,
        shorty: &str,
        instruction_set: InstructionSet,
    ) -> Result<Self> {
        let arch = Architecture::try_from(instruction_set)?;
        let shorty = Shorty::parse(shorty)?;
        log::debug!(
            "managed calling convention for {} (static={}, synchronized={}) on {}",
            shorty,
            is_static,
            is_synchronized,
            arch
        );
        Ok(Self {
            base: CallingConvention::new(
                is_static,
                is_synchronized,
                shorty,
                arch.pointer_size(),
            ),
            arch,
            entry_spills: OnceCell::new(),
        })
    }

    pub fn architecture(&self) -> Architecture {
        self.arch
    }

    pub fn abi(&self) -> &'static NativeAbi {
        self.arch.abi()
    }

    /// Register that holds the incoming ArtMethod*
    pub fn method_register(&self) -> ManagedRegister {
        self.abi().method_register
    }

    /// Register that holds the result of this method invocation
    pub fn return_register(&self) -> ManagedRegister {
        let shorty = self.shorty();
        match self.arch {
            Architecture::Arm => arch::arm::managed_return_register(shorty),
            Architecture::Arm64 => arch::aarch64::return_register(shorty),
            Architecture::Mips => arch::mips::return_register(shorty),
            Architecture::Mips64 => arch::mips64::return_register(shorty),
        }
    }

    pub fn interprocedural_scratch_register(&self) -> ManagedRegister {
        self.abi().interprocedural_scratch_register
    }

    /// Offset of the ArtMethod* within the frame
    pub fn method_stack_offset(&self, displacement: FrameOffset) -> FrameOffset {
        displacement
    }

    /// Start a parameter walk
    pub fn args(&self, displacement: FrameOffset) -> ManagedArgs<'_> {
        ManagedArgs {
            conv: self,
            cursor: ArgCursor::new(displacement),
        }
    }

    /// Location of every parameter, in order
    pub fn locations(&self, displacement: FrameOffset) -> ManagedLocations<'_> {
        self.args(displacement).into_iter()
    }

    /// Argument registers to spill to the caller's out area on entry
    pub fn entry_spills(&self) -> &[EntrySpill] {
        self.entry_spills.get_or_init(|| {
            if self.num_args() == 0 {
                return Vec::new();
            }
            let spills = match self.arch {
                Architecture::Arm => arch::arm::entry_spills(self),
                Architecture::Arm64 => arch::aarch64::entry_spills(self),
                Architecture::Mips => arch::mips::entry_spills(self),
                Architecture::Mips64 => arch::mips64::entry_spills(self),
            };
            log::debug!(
                "{} entry spills for {} on {}",
                spills.len(),
                self.shorty(),
                self.arch
            );
            spills
        })
    }
}

/// Cursor over the parameters of a managed convention
#[derive(Debug, Clone)]
pub struct ManagedArgs<'a> {
    conv: &'a ManagedRuntimeCallingConvention,
    cursor: ArgCursor,
}

impl<'a> ManagedArgs<'a> {
    pub fn reset(&mut self, displacement: FrameOffset) {
        self.cursor.reset(displacement);
    }

    pub fn cursor(&self) -> &ArgCursor {
        &self.cursor
    }

    pub fn has_next(&self) -> bool {
        self.cursor.args < self.conv.num_args()
    }

    /// Step to the next parameter
    pub fn advance(&mut self) {
        assert!(self.has_next(), "advanced past the last managed argument");
        // Don't query the parameter type of implicit args.
        if self.is_current_arg_explicit() && self.conv.is_param_a_long_or_double(self.cursor.args)
        {
            self.cursor.longs_and_doubles += 1;
            self.cursor.slots += 1;
        }
        if self.conv.is_param_a_float_or_double(self.cursor.args) {
            self.cursor.float_and_doubles += 1;
        }
        if self.is_current_param_a_reference() {
            self.cursor.refs += 1;
        }
        self.cursor.args += 1;
        self.cursor.slots += 1;
    }

    pub fn is_current_param_a_reference(&self) -> bool {
        self.conv.is_param_a_reference(self.cursor.args)
    }

    pub fn is_current_param_a_float_or_double(&self) -> bool {
        self.conv.is_param_a_float_or_double(self.cursor.args)
    }

    pub fn is_current_param_a_double(&self) -> bool {
        self.conv.is_param_a_double(self.cursor.args)
    }

    pub fn is_current_param_a_long(&self) -> bool {
        self.conv.is_param_a_long(self.cursor.args)
    }

    pub fn is_current_param_a_long_or_double(&self) -> bool {
        self.conv.is_param_a_long_or_double(self.cursor.args)
    }

    /// False only for the implicit `this`
    pub fn is_current_arg_explicit(&self) -> bool {
        self.conv.is_static() || self.cursor.args != 0
    }

    /// Any user parameter may be null
    pub fn is_current_arg_possibly_null(&self) -> bool {
        self.is_current_arg_explicit()
    }

    pub fn current_param_size(&self) -> usize {
        self.conv.param_size(self.cursor.args)
    }

    pub fn current_kind(&self) -> ArgKind {
        if self.is_current_arg_explicit() {
            let index = self.cursor.args + if self.conv.is_static() { 1 } else { 0 };
            ArgKind::Param(self.conv.shorty().type_at(index))
        } else {
            ArgKind::This
        }
    }

    /// Everything was moved to the stack on entry
    pub fn is_current_param_in_register(&self) -> bool {
        false
    }

    pub fn is_current_param_on_stack(&self) -> bool {
        true
    }

    pub fn current_param_register(&self) -> ManagedRegister {
        unreachable!(
            "managed argument {} of {} is never in a register",
            self.cursor.args,
            self.conv.shorty()
        );
    }

    pub fn current_param_stack_offset(&self) -> FrameOffset {
        assert!(self.is_current_param_on_stack());
        let abi = self.conv.abi();
        FrameOffset(
            self.cursor.displacement.0
                + self.conv.frame_pointer_size().bytes() // ArtMethod*
                + self.cursor.slots * abi.managed_stack_slot_size,
        )
    }

    pub fn method_stack_offset(&self) -> FrameOffset {
        self.cursor.displacement
    }
}

/// Iterator adapter over a managed parameter walk
#[derive(Debug, Clone)]
pub struct ManagedLocations<'a> {
    args: ManagedArgs<'a>,
}

impl<'a> IntoIterator for ManagedArgs<'a> {
    type Item = ArgLocation;
    type IntoIter = ManagedLocations<'a>;

    fn into_iter(self) -> ManagedLocations<'a> {
        ManagedLocations { args: self }
    }
}

impl Iterator for ManagedLocations<'_> {
    type Item = ArgLocation;

    fn next(&mut self) -> Option<ArgLocation> {
        if !self.args.has_next() {
            return None;
        }
        let location = ArgLocation {
            position: self.args.cursor.args,
            kind: self.args.current_kind(),
            size: self.args.current_param_size(),
            slot: self.args.cursor.slots,
            placement: ArgPlacement::Stack(self.args.current_param_stack_offset()),
            handle_scope_entry: None,
        };
        self.args.advance();
        Some(location)
    }
}

// Longs take a register pair (or an X register); references never do.
pub(crate) fn is_non_reference_long(args: &ManagedArgs<'_>) -> bool {
    args.is_current_param_a_long() && !args.is_current_param_a_reference()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::Primitive;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_walk_visits_every_param_on_stack() {
        let conv =
            ManagedRuntimeCallingConvention::create(false, false, "VIJL", InstructionSet::Arm)
                .unwrap();
        let offsets: Vec<_> = conv
            .locations(FrameOffset(0))
            .map(|loc| (loc.kind, loc.placement))
            .collect();
        assert_eq!(
            offsets,
            vec![
                (ArgKind::This, ArgPlacement::Stack(FrameOffset(4))),
                (ArgKind::Param(Primitive::Int), ArgPlacement::Stack(FrameOffset(8))),
                (ArgKind::Param(Primitive::Long), ArgPlacement::Stack(FrameOffset(12))),
                (ArgKind::Param(Primitive::Not), ArgPlacement::Stack(FrameOffset(20))),
            ]
        );
    }

    #[test]
    fn test_arm64_uses_32bit_slots_after_64bit_method() {
        let conv =
            ManagedRuntimeCallingConvention::create(true, false, "VJI", InstructionSet::Arm64)
                .unwrap();
        let mut args = conv.args(FrameOffset(32));
        assert_eq!(args.current_param_stack_offset(), FrameOffset(40));
        args.advance();
        assert_eq!(args.current_param_stack_offset(), FrameOffset(48));
        args.advance();
        assert!(!args.has_next());
    }

    #[test]
    fn test_reset_moves_every_offset() {
        let conv =
            ManagedRuntimeCallingConvention::create(false, false, "VIJL", InstructionSet::Arm)
                .unwrap();
        let mut args = conv.args(FrameOffset(0));
        args.advance();
        args.advance();
        args.reset(FrameOffset(8));
        assert_eq!(args.method_stack_offset(), FrameOffset(8));
        let offsets: Vec<_> = args.into_iter().map(|loc| loc.placement).collect();
        assert_eq!(
            offsets,
            vec![
                ArgPlacement::Stack(FrameOffset(12)),
                ArgPlacement::Stack(FrameOffset(16)),
                ArgPlacement::Stack(FrameOffset(20)),
                ArgPlacement::Stack(FrameOffset(28)),
            ]
        );
    }

    #[test]
    fn test_entry_spill_sizes() {
        let x1 = Register::core(Architecture::Arm64, 1);
        assert_eq!(EntrySpill::register(x1).size(), 8);
        assert_eq!(EntrySpill::register(Register::core_half(Architecture::Arm64, 1)).size(), 4);
        assert_eq!(EntrySpill::register(Register::pair(Architecture::Mips, 6)).size(), 8);
        assert_eq!(EntrySpill::sized(x1, 4).size(), 4);
        assert_eq!(EntrySpill::register(x1).managed_register(), ManagedRegister::Physical(x1));

        let memory = EntrySpill::placeholder(8);
        assert!(memory.is_placeholder());
        assert_eq!(memory.size(), 8);
        assert_eq!(memory.managed_register(), ManagedRegister::NoRegister);
    }

    #[test]
    fn test_entry_spills_are_cached() {
        let conv =
            ManagedRuntimeCallingConvention::create(true, false, "VI", InstructionSet::Mips)
                .unwrap();
        let first = conv.entry_spills().as_ptr();
        assert_eq!(conv.entry_spills().as_ptr(), first);
    }

    #[test]
    fn test_no_args_no_spills() {
        let conv =
            ManagedRuntimeCallingConvention::create(true, false, "V", InstructionSet::Arm64)
                .unwrap();
        assert!(conv.entry_spills().is_empty());
    }

    #[test]
    #[should_panic(expected = "never in a register")]
    fn test_current_param_register_panics() {
        let conv =
            ManagedRuntimeCallingConvention::create(true, false, "VI", InstructionSet::Arm)
                .unwrap();
        conv.args(FrameOffset(0)).current_param_register();
    }

    #[test]
    fn test_unsupported_isa() {
        assert!(
            ManagedRuntimeCallingConvention::create(true, false, "V", InstructionSet::X86)
                .is_err()
        );
    }
}
