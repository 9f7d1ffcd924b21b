// src/calling_convention.rs
//! Signature classification shared by the managed and JNI conventions.
//!
//! Parameter indices used here are positions in the *managed* parameter list:
//! index 0 is the implicit `this` for instance methods and is never read from
//! the shorty; for static methods index 0 is the first declared parameter.

use std::fmt;

use serde::Serialize;

use crate::arch::PointerSize;
use crate::handle_scope::STACK_REFERENCE_SIZE;
use crate::primitive::{Primitive, Shorty, HEAP_REFERENCE_SIZE};

/// Byte offset from the stack pointer of the frame being built
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct FrameOffset(pub usize);

impl FrameOffset {
    pub fn value(self) -> usize {
        self.0
    }
}

impl fmt::Display for FrameOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sp+{}", self.0)
    }
}

/// Classified method signature
#[derive(Debug, Clone)]
pub struct CallingConvention {
    shorty: Shorty,
    is_static: bool,
    is_synchronized: bool,
    frame_pointer_size: PointerSize,
    num_args: usize,
    num_ref_args: usize,
    num_long_or_double_args: usize,
    num_float_or_double_args: usize,
}

impl CallingConvention {
    pub fn new(
        is_static: bool,
        is_synchronized: bool,
        shorty: Shorty,
        frame_pointer_size: PointerSize,
    ) -> Self {
        let implicit = if is_static { 0 } else { 1 };
        let mut num_ref_args = implicit;
        let mut num_long_or_double_args = 0;
        let mut num_float_or_double_args = 0;
        for ty in shorty.params() {
            match ty {
                Primitive::Not => num_ref_args += 1,
                Primitive::Long => num_long_or_double_args += 1,
                Primitive::Double => {
                    num_long_or_double_args += 1;
                    num_float_or_double_args += 1;
                }
                Primitive::Float => num_float_or_double_args += 1,
                _ => {}
            }
        }
        Self {
            num_args: implicit + shorty.len() - 1,
            shorty,
            is_static,
            is_synchronized,
            frame_pointer_size,
            num_ref_args,
            num_long_or_double_args,
            num_float_or_double_args,
        }
    }

    pub fn shorty(&self) -> &Shorty {
        &self.shorty
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn is_synchronized(&self) -> bool {
        self.is_synchronized
    }

    pub fn frame_pointer_size(&self) -> PointerSize {
        self.frame_pointer_size
    }

    /// Size of a handle scope slot
    pub fn handle_scope_pointer_size(&self) -> usize {
        STACK_REFERENCE_SIZE
    }

    /// Parameter count including the implicit `this`
    pub fn num_args(&self) -> usize {
        self.num_args
    }

    /// 1 for instance methods, 0 for static methods
    pub fn num_implicit_args(&self) -> usize {
        if self.is_static {
            0
        } else {
            1
        }
    }

    pub fn num_reference_args(&self) -> usize {
        self.num_ref_args
    }

    pub fn num_long_or_double_args(&self) -> usize {
        self.num_long_or_double_args
    }

    pub fn num_float_or_double_args(&self) -> usize {
        self.num_float_or_double_args
    }

    pub fn return_type(&self) -> Primitive {
        self.shorty.return_type()
    }

    pub fn is_return_a_reference(&self) -> bool {
        self.return_type() == Primitive::Not
    }

    /// Bytes needed to hold the return value, widened to 4, 0 for void
    pub fn size_of_return_value(&self) -> usize {
        self.return_type().slot_size()
    }

    /// Type of the managed parameter at `param`, `None` for the implicit `this`
    fn param_type(&self, param: usize) -> Option<Primitive> {
        assert!(
            param < self.num_args,
            "parameter {} out of range for shorty {} ({} args)",
            param,
            self.shorty,
            self.num_args
        );
        if self.is_static {
            // Skip the return type at the start of the shorty.
            Some(self.shorty.type_at(param + 1))
        } else if param == 0 {
            None
        } else {
            Some(self.shorty.type_at(param))
        }
    }

    pub fn is_param_a_reference(&self, param: usize) -> bool {
        match self.param_type(param) {
            None => true,
            Some(ty) => ty == Primitive::Not,
        }
    }

    pub fn is_param_a_long(&self, param: usize) -> bool {
        self.param_type(param) == Some(Primitive::Long)
    }

    pub fn is_param_a_double(&self, param: usize) -> bool {
        self.param_type(param) == Some(Primitive::Double)
    }

    pub fn is_param_a_float_or_double(&self, param: usize) -> bool {
        matches!(self.param_type(param), Some(ty) if ty.is_floating_point())
    }

    pub fn is_param_a_long_or_double(&self, param: usize) -> bool {
        matches!(self.param_type(param), Some(ty) if ty.is_wide())
    }

    /// Managed size of a parameter: 4 for `this`, else the widened component size
    pub fn param_size(&self, param: usize) -> usize {
        match self.param_type(param) {
            None => HEAP_REFERENCE_SIZE,
            Some(ty) => ty.slot_size(),
        }
    }
}

/// Iterator cursor over the parameters of a convention.
///
/// Kept apart from the convention so several walks can run over the same
/// signature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArgCursor {
    /// 32-bit slot of the current argument; wide values take two
    pub(crate) slots: usize,
    pub(crate) refs: usize,
    pub(crate) args: usize,
    pub(crate) longs_and_doubles: usize,
    pub(crate) float_and_doubles: usize,
    pub(crate) displacement: FrameOffset,
}

impl ArgCursor {
    pub fn new(displacement: FrameOffset) -> Self {
        Self {
            displacement,
            ..Self::default()
        }
    }

    pub fn reset(&mut self, displacement: FrameOffset) {
        *self = Self::new(displacement);
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn refs(&self) -> usize {
        self.refs
    }

    pub fn args(&self) -> usize {
        self.args
    }

    pub fn longs_and_doubles(&self) -> usize {
        self.longs_and_doubles
    }

    pub fn float_and_doubles(&self) -> usize {
        self.float_and_doubles
    }

    pub fn displacement(&self) -> FrameOffset {
        self.displacement
    }
}

/// What an argument position holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArgKind {
    /// The `JNIEnv*` injected ahead of native arguments
    JniEnv,
    /// The `jclass` injected for static native methods
    JClass,
    /// Implicit receiver
    This,
    Param(Primitive),
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgKind::JniEnv => f.write_str("JNIEnv*"),
            ArgKind::JClass => f.write_str("jclass"),
            ArgKind::This => f.write_str("this"),
            ArgKind::Param(ty) => ty.fmt(f),
        }
    }
}

/// Where an argument lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgPlacement {
    Register(crate::arch::ManagedRegister),
    Stack(FrameOffset),
}

impl fmt::Display for ArgPlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgPlacement::Register(reg) => reg.fmt(f),
            ArgPlacement::Stack(offset) => offset.fmt(f),
        }
    }
}

/// One step of a parameter walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArgLocation {
    /// Iterator position, including injected JNI arguments
    pub position: usize,
    pub kind: ArgKind,
    pub size: usize,
    /// Slot cursor value at this position
    pub slot: usize,
    pub placement: ArgPlacement,
    /// Handle scope entry for references passed to native code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle_scope_entry: Option<FrameOffset>,
}
