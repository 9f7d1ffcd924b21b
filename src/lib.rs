// src/lib.rs
//! Calling convention engine for JNI transition stubs.
//!
//! Given a method shorty, its access flags and a target instruction set this
//! crate answers where every argument lives on entry through the managed ABI,
//! where it must be placed for the native call, and how the transition frame
//! (callee saves, handle scope, local reference cookie, return value spill and
//! outgoing argument area) is laid out.
//!
//! ```
//! use jni_callconv::{FrameOffset, InstructionSet, JniCallingConvention};
//!
//! let conv = JniCallingConvention::create(true, false, false, "V", InstructionSet::Arm)?;
//! assert_eq!(conv.frame_size(), 112);
//! let regs: Vec<String> = conv
//!     .locations(FrameOffset(conv.out_arg_size()))
//!     .map(|loc| loc.placement.to_string())
//!     .collect();
//! assert_eq!(regs, ["r0", "r1"]);
//! # Ok::<(), jni_callconv::Error>(())
//! ```

pub mod arch;
pub mod calling_convention;
pub mod error;
pub mod handle_scope;
pub mod jni;
pub mod managed;
pub mod method;
pub mod primitive;
pub mod report;

pub use arch::{Architecture, InstructionSet, ManagedRegister, PointerSize, Register, RegisterClass};
pub use calling_convention::{ArgKind, ArgLocation, ArgPlacement, CallingConvention, FrameOffset};
pub use error::{Error, Result};
pub use handle_scope::HandleScope;
pub use jni::{JniArgs, JniCallingConvention};
pub use managed::{EntrySpill, ManagedArgs, ManagedRuntimeCallingConvention};
pub use method::{MethodDescriptor, MethodFlags};
pub use primitive::{Primitive, Shorty};
pub use report::{JniFrameReport, ManagedFrameReport};
