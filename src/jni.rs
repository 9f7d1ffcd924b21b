// src/jni.rs
//! JNI calling convention.
//!
//! Describes the native side of a managed to native transition: where every
//! argument handed to the native function lives, including the injected
//! `JNIEnv*` and `jclass`/`jobject`, and the shape of the transition frame.
//!
//! ```text
//! | incoming stack args |  <-- caller frame
//! | return address      |
//! | callee saves        |
//! | return value spill  |
//! | local ref cookie    |
//! | handle scope        |  link, number of references, references[]
//! | ArtMethod*          |  <-- displacement
//! | outgoing stack args |
//! ```

use std::ops::Deref;

use crate::arch::{self, round_up, Architecture, InstructionSet, ManagedRegister, NativeAbi};
use crate::calling_convention::{
    ArgCursor, ArgKind, ArgLocation, ArgPlacement, CallingConvention, FrameOffset,
};
use crate::error::{Error, Result};
use crate::handle_scope::HandleScope;
use crate::method::MethodDescriptor;
use crate::primitive::Shorty;

/// Iterator position of the `JNIEnv*`
pub const JNI_ENV: usize = 0;
/// Iterator position of the `jobject`/`jclass`
pub const OBJECT_OR_CLASS: usize = 1;

/// Size of the saved local reference segment state
const SEGMENT_STATE_SIZE: usize = 4;

/// Calling convention for the native side of a JNI transition
#[derive(Debug, Clone)]
pub struct JniCallingConvention {
    base: CallingConvention,
    arch: Architecture,
    is_critical_native: bool,
    /// Stack padding inserted to keep longs and doubles 8-byte aligned
    padding: usize,
    /// Leading floating point arguments travel in FP registers (MIPS o32)
    use_fp_arg_registers: bool,
}

impl Deref for JniCallingConvention {
    type Target = CallingConvention;

    fn deref(&self) -> &CallingConvention {
        &self.base
    }
}

impl JniCallingConvention {
    pub fn create(
        is_static: bool,
        is_synchronized: bool,
        is_critical_native: bool,
        shorty: &str,
        instruction_set: InstructionSet,
    ) -> Result<Self> {
        let arch = Architecture::try_from(instruction_set)?;
        let shorty = Shorty::parse(shorty)?;
        let mut conv = Self {
            base: CallingConvention::new(
                is_static,
                is_synchronized,
                shorty,
                arch.pointer_size(),
            ),
            arch,
            is_critical_native,
            padding: 0,
            use_fp_arg_registers: false,
        };
        if arch.abi().aligns_wide_arguments {
            conv.padding = conv.compute_wide_argument_padding();
        }
        if arch == Architecture::Mips {
            conv.use_fp_arg_registers = arch::mips::uses_fp_arg_registers(&conv);
        }
        log::debug!(
            "jni calling convention for {} (static={}, synchronized={}, critical={}) on {}: \
             padding={} fp_args={}",
            conv.shorty(),
            is_static,
            is_synchronized,
            is_critical_native,
            arch,
            conv.padding,
            conv.use_fp_arg_registers
        );
        Ok(conv)
    }

    pub fn for_method(method: &MethodDescriptor, instruction_set: InstructionSet) -> Result<Self> {
        Self::create(
            method.flags.is_static(),
            method.flags.is_synchronized(),
            method.flags.is_critical_native(),
            &method.shorty,
            instruction_set,
        )
    }

    // AAPCS and o32 want longs and doubles in an even register pair or an
    // 8-byte aligned stack slot. Walk a logical register file
    //
    //   | r0 | r1 | r2 | r3 | SP | SP+4 | SP+8 | ... |
    //
    // and add 4 bytes each time a wide value would start at an odd position.
    // If everything still fits in the four registers no stack padding is needed.
    fn compute_wide_argument_padding(&self) -> usize {
        let abi = self.abi();
        let mut shift = 0;
        let (mut cur_arg, mut cur_reg) = if self.has_extra_arguments_for_jni() {
            // JNIEnv and jobject/jclass take the first two registers, skip `this`.
            (self.num_implicit_args(), 2)
        } else {
            (0, 0)
        };
        while cur_arg < self.num_args() {
            if self.is_param_a_long_or_double(cur_arg) {
                if cur_reg & 1 != 0 {
                    shift += 4;
                    cur_reg += 1;
                }
                cur_reg += 2;
            } else {
                cur_reg += 1;
            }
            cur_arg += 1;
        }
        if cur_reg < abi.max_int_like_register_arguments {
            0
        } else {
            shift
        }
    }

    pub fn architecture(&self) -> Architecture {
        self.arch
    }

    pub fn abi(&self) -> &'static NativeAbi {
        self.arch.abi()
    }

    pub fn is_critical_native(&self) -> bool {
        self.is_critical_native
    }

    /// Stack padding added for AAPCS/o32 alignment, always 0 on 64-bit targets
    pub fn padding(&self) -> usize {
        self.padding
    }

    pub fn uses_fp_arg_registers(&self) -> bool {
        self.use_fp_arg_registers
    }

    pub fn has_handle_scope(&self) -> bool {
        !self.is_critical_native
    }

    pub fn has_local_reference_segment_state(&self) -> bool {
        !self.is_critical_native
    }

    pub fn has_jni_env(&self) -> bool {
        self.has_extra_arguments_for_jni()
    }

    /// Static methods receive a `jclass` unless they are critical natives
    pub fn has_self_class(&self) -> bool {
        self.is_static() && self.has_extra_arguments_for_jni()
    }

    pub fn has_extra_arguments_for_jni(&self) -> bool {
        !self.is_critical_native
    }

    pub fn number_of_extra_arguments_for_jni(&self) -> usize {
        if self.has_extra_arguments_for_jni() {
            if self.is_static() {
                2
            } else {
                1
            }
        } else {
            0
        }
    }

    /// Number of references held in the handle scope
    pub fn reference_count(&self) -> usize {
        self.num_reference_args() + if self.is_static() { 1 } else { 0 }
    }

    /// Frame size excluding outgoing arguments, aligned to the stack alignment
    pub fn frame_size(&self) -> usize {
        let abi = self.abi();
        let pointer_size = self.frame_pointer_size();
        let frame_slot = pointer_size.bytes();
        let method_ptr_size = frame_slot;
        let callee_save_area_size = abi.callee_save_registers.len() * frame_slot;
        let mut total_size = method_ptr_size + abi.return_address_size + callee_save_area_size;
        if self.has_local_reference_segment_state() {
            total_size += SEGMENT_STATE_SIZE;
        }
        if self.has_handle_scope() {
            total_size += HandleScope::size_of(pointer_size, self.reference_count());
        }
        total_size += self.size_of_return_value();
        round_up(total_size, abi.stack_alignment)
    }

    /// Stack bytes for arguments not passed in registers, aligned
    pub fn out_arg_size(&self) -> usize {
        let abi = self.abi();
        let stack_args = self.number_of_outgoing_stack_args();
        round_up(
            abi.out_arg_home_area
                + stack_args * self.frame_pointer_size().bytes()
                + self.padding,
            abi.stack_alignment,
        )
    }

    /// Outgoing arguments that do not fit in argument registers
    pub fn number_of_outgoing_stack_args(&self) -> usize {
        match self.arch {
            Architecture::Arm | Architecture::Mips => {
                let abi = self.abi();
                let static_args = if self.has_self_class() { 1 } else { 0 };
                // Longs and doubles count twice.
                let param_args = self.num_args() + self.num_long_or_double_args();
                let internal_args = if self.has_jni_env() { 1 } else { 0 };
                let total_args = static_args + param_args + internal_args;
                total_args - total_args.min(abi.max_int_like_register_arguments)
            }
            Architecture::Arm64 => arch::aarch64::number_of_outgoing_stack_args(self),
            Architecture::Mips64 => arch::mips64::number_of_outgoing_stack_args(self),
        }
    }

    pub fn callee_save_registers(&self) -> &'static [ManagedRegister] {
        self.abi().callee_save_registers
    }

    pub fn core_spill_mask(&self) -> u32 {
        self.abi().core_spill_mask
    }

    pub fn fp_spill_mask(&self) -> u32 {
        self.abi().fp_spill_mask
    }

    pub fn return_register(&self) -> ManagedRegister {
        let shorty = self.shorty();
        match self.arch {
            Architecture::Arm => arch::arm::jni_return_register(shorty),
            Architecture::Arm64 => arch::aarch64::return_register(shorty),
            Architecture::Mips => arch::mips::return_register(shorty),
            Architecture::Mips64 => arch::mips64::return_register(shorty),
        }
    }

    pub fn int_return_register(&self) -> ManagedRegister {
        self.abi().int_return_register
    }

    pub fn interprocedural_scratch_register(&self) -> ManagedRegister {
        self.abi().interprocedural_scratch_register
    }

    pub fn return_scratch_register(&self) -> ManagedRegister {
        self.abi().return_scratch_register
    }

    pub fn requires_small_result_type_extension(&self) -> bool {
        self.abi().requires_small_result_type_extension
    }

    /// Offset of the ArtMethod* within the frame
    pub fn method_stack_offset(&self, displacement: FrameOffset) -> FrameOffset {
        displacement
    }

    /// Handle scope sits right above the ArtMethod*
    pub fn handle_scope_offset(&self, displacement: FrameOffset) -> FrameOffset {
        FrameOffset(displacement.0 + self.frame_pointer_size().bytes())
    }

    pub fn handle_scope_link_offset(&self, displacement: FrameOffset) -> FrameOffset {
        FrameOffset(
            self.handle_scope_offset(displacement).0
                + HandleScope::link_offset(self.frame_pointer_size()),
        )
    }

    pub fn handle_scope_num_refs_offset(&self, displacement: FrameOffset) -> FrameOffset {
        FrameOffset(
            self.handle_scope_offset(displacement).0
                + HandleScope::number_of_references_offset(self.frame_pointer_size()),
        )
    }

    pub fn handle_references_offset(&self, displacement: FrameOffset) -> FrameOffset {
        FrameOffset(
            self.handle_scope_offset(displacement).0
                + HandleScope::references_offset(self.frame_pointer_size()),
        )
    }

    /// Where the local reference segment state is saved, right after the references
    pub fn saved_local_reference_cookie_offset(&self, displacement: FrameOffset) -> FrameOffset {
        let references_size = self.handle_scope_pointer_size() * self.reference_count();
        FrameOffset(self.handle_references_offset(displacement).0 + references_size)
    }

    /// Where the native return value is parked across a second call
    pub fn return_value_save_location(&self, displacement: FrameOffset) -> FrameOffset {
        if self.has_handle_scope() {
            FrameOffset(
                self.saved_local_reference_cookie_offset(displacement).0 + SEGMENT_STATE_SIZE,
            )
        } else {
            FrameOffset(displacement.0 + self.frame_pointer_size().bytes())
        }
    }

    /// Turn a count of stack slots into an offset in the outgoing area
    pub(crate) fn outgoing_stack_offset(&self, displacement: FrameOffset, slot: usize) -> FrameOffset {
        let out_arg_size = self.out_arg_size();
        let offset = (displacement.0 + slot * self.frame_pointer_size().bytes())
            .checked_sub(out_arg_size)
            .unwrap_or_else(|| {
                panic!(
                    "displacement {} below outgoing area of {} bytes",
                    displacement.0, out_arg_size
                )
            });
        assert!(
            offset < out_arg_size,
            "stack offset {} outside outgoing area of {} bytes",
            offset,
            out_arg_size
        );
        FrameOffset(offset)
    }

    /// Accept a caller supplied displacement only when every stack argument
    /// still lands inside the outgoing area. Walks take the displacement as
    /// trusted and panic otherwise.
    pub fn check_displacement(&self, displacement: FrameOffset) -> Result<FrameOffset> {
        let out_arg_size = self.out_arg_size();
        let last_stack_offset = self
            .locations(FrameOffset(out_arg_size))
            .filter_map(|loc| match loc.placement {
                ArgPlacement::Stack(offset) => Some(offset.0),
                ArgPlacement::Register(_) => None,
            })
            .last();
        let Some(last) = last_stack_offset else {
            return Ok(displacement);
        };
        let max = 2 * out_arg_size - last - 1;
        if (out_arg_size..=max).contains(&displacement.0) {
            Ok(displacement)
        } else {
            Err(Error::Displacement {
                given: displacement.0,
                min: out_arg_size,
                max,
            })
        }
    }

    /// Start an argument walk
    pub fn args(&self, displacement: FrameOffset) -> JniArgs<'_> {
        JniArgs {
            conv: self,
            cursor: ArgCursor::new(displacement),
        }
    }

    /// Location of every native argument, in order
    pub fn locations(&self, displacement: FrameOffset) -> JniLocations<'_> {
        self.args(displacement).into_iter()
    }

    /// `Some(case)` when `position` is one of the injected JNI arguments
    fn switch_extra_jni_arguments(
        &self,
        position: usize,
        case_jni_env: bool,
        case_object_or_class: bool,
    ) -> Option<bool> {
        if !self.has_extra_arguments_for_jni() {
            return None;
        }
        match position {
            JNI_ENV => Some(case_jni_env),
            OBJECT_OR_CLASS => Some(case_object_or_class),
            _ => None,
        }
    }
}

/// Cursor over the native arguments of a JNI convention
#[derive(Debug, Clone)]
pub struct JniArgs<'a> {
    conv: &'a JniCallingConvention,
    pub(crate) cursor: ArgCursor,
}

impl<'a> JniArgs<'a> {
    pub fn convention(&self) -> &'a JniCallingConvention {
        self.conv
    }

    pub fn cursor(&self) -> &ArgCursor {
        &self.cursor
    }

    pub fn reset(&mut self, displacement: FrameOffset) {
        self.cursor.reset(displacement);
    }

    pub fn has_next(&self) -> bool {
        self.is_current_arg_extra_for_jni()
            || self.iterator_position_within_shorty() < self.conv.num_args()
    }

    /// Step to the next argument
    pub fn advance(&mut self) {
        assert!(self.has_next(), "advanced past the last jni argument");
        if self.is_current_param_a_long_or_double() {
            self.cursor.longs_and_doubles += 1;
            self.cursor.slots += 1;
        }
        if self.is_current_param_a_float_or_double() {
            self.cursor.float_and_doubles += 1;
        }
        if self.is_current_param_a_reference() {
            self.cursor.refs += 1;
        }
        // Also covers the JNIEnv* and every other single slot value.
        self.cursor.args += 1;
        self.cursor.slots += 1;

        if self.conv.abi().aligns_wide_arguments
            && self.has_next()
            && self.is_current_param_a_long_or_double()
            && self.cursor.slots & 1 != 0
        {
            self.cursor.slots += 1;
        }
    }

    /// Position in the managed parameter list, without the injected arguments
    pub fn iterator_position_within_shorty(&self) -> usize {
        let extra = self.conv.number_of_extra_arguments_for_jni();
        assert!(
            self.cursor.args >= extra,
            "iterator at {} is still on an injected jni argument",
            self.cursor.args
        );
        self.cursor.args - extra
    }

    pub fn is_current_arg_extra_for_jni(&self) -> bool {
        self.conv.has_extra_arguments_for_jni() && self.cursor.args <= OBJECT_OR_CLASS
    }

    pub fn is_current_param_a_reference(&self) -> bool {
        match self
            .conv
            .switch_extra_jni_arguments(self.cursor.args, false, true)
        {
            Some(value) => value,
            None => self
                .conv
                .is_param_a_reference(self.iterator_position_within_shorty()),
        }
    }

    pub fn is_current_param_jni_env(&self) -> bool {
        self.conv.has_jni_env() && self.cursor.args == JNI_ENV
    }

    pub fn is_current_param_a_float_or_double(&self) -> bool {
        match self
            .conv
            .switch_extra_jni_arguments(self.cursor.args, false, false)
        {
            Some(value) => value,
            None => self
                .conv
                .is_param_a_float_or_double(self.iterator_position_within_shorty()),
        }
    }

    pub fn is_current_param_a_double(&self) -> bool {
        match self
            .conv
            .switch_extra_jni_arguments(self.cursor.args, false, false)
        {
            Some(value) => value,
            None => self
                .conv
                .is_param_a_double(self.iterator_position_within_shorty()),
        }
    }

    pub fn is_current_param_a_long(&self) -> bool {
        match self
            .conv
            .switch_extra_jni_arguments(self.cursor.args, false, false)
        {
            Some(value) => value,
            None => self
                .conv
                .is_param_a_long(self.iterator_position_within_shorty()),
        }
    }

    pub fn is_current_param_a_long_or_double(&self) -> bool {
        self.is_current_param_a_long() || self.is_current_param_a_double()
    }

    pub fn current_param_size(&self) -> usize {
        if self.is_current_arg_extra_for_jni() {
            self.conv.frame_pointer_size().bytes()
        } else {
            self.conv.param_size(self.iterator_position_within_shorty())
        }
    }

    pub fn current_kind(&self) -> ArgKind {
        if self.is_current_param_jni_env() {
            return ArgKind::JniEnv;
        }
        if self.conv.has_self_class() && self.cursor.args == OBJECT_OR_CLASS {
            return ArgKind::JClass;
        }
        let pos = self.iterator_position_within_shorty();
        if self.conv.is_static() {
            ArgKind::Param(self.conv.shorty().type_at(pos + 1))
        } else if pos == 0 {
            ArgKind::This
        } else {
            ArgKind::Param(self.conv.shorty().type_at(pos))
        }
    }

    pub fn is_current_param_in_register(&self) -> bool {
        match self.conv.arch {
            Architecture::Arm | Architecture::Mips => {
                self.cursor.slots < self.conv.abi().max_int_like_register_arguments
            }
            Architecture::Arm64 => arch::aarch64::is_current_param_in_register(self),
            Architecture::Mips64 => arch::mips64::is_current_param_in_register(self),
        }
    }

    pub fn is_current_param_on_stack(&self) -> bool {
        !self.is_current_param_in_register()
    }

    pub fn current_param_register(&self) -> ManagedRegister {
        assert!(
            self.is_current_param_in_register(),
            "jni argument {} of {} is passed on the stack",
            self.cursor.args,
            self.conv.shorty()
        );
        match self.conv.arch {
            Architecture::Arm => arch::arm::current_param_register(self),
            Architecture::Arm64 => arch::aarch64::current_param_register(self),
            Architecture::Mips => arch::mips::current_param_register(self),
            Architecture::Mips64 => arch::mips64::current_param_register(self),
        }
    }

    pub fn current_param_stack_offset(&self) -> FrameOffset {
        assert!(
            self.is_current_param_on_stack(),
            "jni argument {} of {} is passed in a register",
            self.cursor.args,
            self.conv.shorty()
        );
        let slot = match self.conv.arch {
            Architecture::Arm => arch::arm::current_param_stack_slot(self),
            Architecture::Arm64 => arch::aarch64::current_param_stack_slot(self),
            Architecture::Mips => arch::mips::current_param_stack_slot(self),
            Architecture::Mips64 => arch::mips64::current_param_stack_slot(self),
        };
        self.conv.outgoing_stack_offset(self.cursor.displacement, slot)
    }

    /// Handle scope entry holding the reference at the current position
    pub fn current_param_handle_scope_entry_offset(&self) -> FrameOffset {
        assert!(self.is_current_param_a_reference());
        let displacement = self.cursor.displacement;
        let num_refs_offset = self.conv.handle_scope_num_refs_offset(displacement);
        assert!(self.conv.handle_scope_link_offset(displacement) < num_refs_offset);
        let result = self.conv.handle_references_offset(displacement).0
            + self.cursor.refs * self.conv.handle_scope_pointer_size();
        assert!(result > num_refs_offset.0);
        FrameOffset(result)
    }

    pub fn handle_scope_offset(&self) -> FrameOffset {
        self.conv.handle_scope_offset(self.cursor.displacement)
    }

    pub fn method_stack_offset(&self) -> FrameOffset {
        self.cursor.displacement
    }
}

/// Iterator adapter over a JNI argument walk
#[derive(Debug, Clone)]
pub struct JniLocations<'a> {
    args: JniArgs<'a>,
}

/// Continue the walk from wherever the cursor stands
impl<'a> IntoIterator for JniArgs<'a> {
    type Item = ArgLocation;
    type IntoIter = JniLocations<'a>;

    fn into_iter(self) -> JniLocations<'a> {
        JniLocations { args: self }
    }
}

impl Iterator for JniLocations<'_> {
    type Item = ArgLocation;

    fn next(&mut self) -> Option<ArgLocation> {
        if !self.args.has_next() {
            return None;
        }
        let args = &self.args;
        let placement = if args.is_current_param_in_register() {
            ArgPlacement::Register(args.current_param_register())
        } else {
            ArgPlacement::Stack(args.current_param_stack_offset())
        };
        let handle_scope_entry = if args.conv.has_handle_scope() && args.is_current_param_a_reference()
        {
            Some(args.current_param_handle_scope_entry_offset())
        } else {
            None
        };
        let location = ArgLocation {
            position: args.cursor.args,
            kind: args.current_kind(),
            size: args.current_param_size(),
            slot: args.cursor.slots,
            placement,
            handle_scope_entry,
        };
        log::trace!(
            "{} arg {} ({}) -> {}",
            args.conv.arch,
            location.position,
            location.kind,
            location.placement
        );
        self.args.advance();
        Some(location)
    }
}
