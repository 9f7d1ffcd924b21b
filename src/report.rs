// src/report.rs
//! Frame reports for display and JSON output.

use std::fmt;

use serde::Serialize;

use crate::arch::{Architecture, ManagedRegister};
use crate::calling_convention::{ArgLocation, FrameOffset};
use crate::jni::JniCallingConvention;
use crate::managed::{EntrySpill, ManagedRuntimeCallingConvention};

/// Handle scope placement within a JNI frame
#[derive(Debug, Clone, Serialize)]
pub struct HandleScopeReport {
    pub offset: FrameOffset,
    pub link_offset: FrameOffset,
    pub num_refs_offset: FrameOffset,
    pub references_offset: FrameOffset,
    pub reference_count: usize,
    pub saved_cookie_offset: FrameOffset,
}

/// Everything a stub generator needs to know about a native transition frame
#[derive(Debug, Clone, Serialize)]
pub struct JniFrameReport {
    pub architecture: Architecture,
    pub abi: &'static str,
    pub shorty: String,
    pub is_static: bool,
    pub is_synchronized: bool,
    pub is_critical_native: bool,
    pub frame_size: usize,
    pub out_arg_size: usize,
    pub padding: usize,
    pub core_spill_mask: u32,
    pub fp_spill_mask: u32,
    pub callee_saves: Vec<ManagedRegister>,
    pub return_register: ManagedRegister,
    pub int_return_register: ManagedRegister,
    pub return_scratch_register: ManagedRegister,
    pub interprocedural_scratch_register: ManagedRegister,
    pub requires_small_result_type_extension: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle_scope: Option<HandleScopeReport>,
    pub return_value_save_location: FrameOffset,
    pub arguments: Vec<ArgLocation>,
}

impl JniFrameReport {
    /// Build a report with the frame pointer placed right above the outgoing arguments
    pub fn new(conv: &JniCallingConvention) -> Self {
        Self::with_displacement(conv, FrameOffset(conv.out_arg_size()))
    }

    pub fn with_displacement(conv: &JniCallingConvention, displacement: FrameOffset) -> Self {
        let handle_scope = conv.has_handle_scope().then(|| HandleScopeReport {
            offset: conv.handle_scope_offset(displacement),
            link_offset: conv.handle_scope_link_offset(displacement),
            num_refs_offset: conv.handle_scope_num_refs_offset(displacement),
            references_offset: conv.handle_references_offset(displacement),
            reference_count: conv.reference_count(),
            saved_cookie_offset: conv.saved_local_reference_cookie_offset(displacement),
        });
        Self {
            architecture: conv.architecture(),
            abi: conv.abi().name,
            shorty: conv.shorty().to_string(),
            is_static: conv.is_static(),
            is_synchronized: conv.is_synchronized(),
            is_critical_native: conv.is_critical_native(),
            frame_size: conv.frame_size(),
            out_arg_size: conv.out_arg_size(),
            padding: conv.padding(),
            core_spill_mask: conv.core_spill_mask(),
            fp_spill_mask: conv.fp_spill_mask(),
            callee_saves: conv.callee_save_registers().to_vec(),
            return_register: conv.return_register(),
            int_return_register: conv.int_return_register(),
            return_scratch_register: conv.return_scratch_register(),
            interprocedural_scratch_register: conv.interprocedural_scratch_register(),
            requires_small_result_type_extension: conv.requires_small_result_type_extension(),
            handle_scope,
            return_value_save_location: conv.return_value_save_location(displacement),
            arguments: conv.locations(displacement).collect(),
        }
    }
}

impl fmt::Display for JniFrameReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "jni {} {}{}{}{}",
            self.architecture,
            self.shorty,
            if self.is_static { " static" } else { "" },
            if self.is_synchronized { " synchronized" } else { "" },
            if self.is_critical_native { " @CriticalNative" } else { "" },
        )?;
        writeln!(f, "  abi:             {}", self.abi)?;
        writeln!(f, "  frame size:      {}", self.frame_size)?;
        writeln!(f, "  out arg size:    {} (padding {})", self.out_arg_size, self.padding)?;
        writeln!(
            f,
            "  spill masks:     core {:#010x} fp {:#010x}",
            self.core_spill_mask, self.fp_spill_mask
        )?;
        writeln!(f, "  callee saves:    {}", join(&self.callee_saves))?;
        writeln!(
            f,
            "  return:          {} (int {}, scratch {})",
            self.return_register, self.int_return_register, self.return_scratch_register
        )?;
        if let Some(scope) = &self.handle_scope {
            writeln!(
                f,
                "  handle scope:    {} link {} count {} refs {} ({} entries)",
                scope.offset,
                scope.link_offset,
                scope.num_refs_offset,
                scope.references_offset,
                scope.reference_count
            )?;
            writeln!(f, "  cookie:          {}", scope.saved_cookie_offset)?;
        }
        writeln!(f, "  return save:     {}", self.return_value_save_location)?;
        write_arguments(f, &self.arguments)
    }
}

/// Layout of a frame entered through the managed ABI
#[derive(Debug, Clone, Serialize)]
pub struct ManagedFrameReport {
    pub architecture: Architecture,
    pub abi: &'static str,
    pub shorty: String,
    pub is_static: bool,
    pub is_synchronized: bool,
    pub method_register: ManagedRegister,
    pub return_register: ManagedRegister,
    pub interprocedural_scratch_register: ManagedRegister,
    pub method_stack_offset: FrameOffset,
    pub arguments: Vec<ArgLocation>,
    pub entry_spills: Vec<EntrySpill>,
}

impl ManagedFrameReport {
    pub fn new(conv: &ManagedRuntimeCallingConvention, displacement: FrameOffset) -> Self {
        Self {
            architecture: conv.architecture(),
            abi: conv.abi().name,
            shorty: conv.shorty().to_string(),
            is_static: conv.is_static(),
            is_synchronized: conv.is_synchronized(),
            method_register: conv.method_register(),
            return_register: conv.return_register(),
            interprocedural_scratch_register: conv.interprocedural_scratch_register(),
            method_stack_offset: conv.method_stack_offset(displacement),
            arguments: conv.locations(displacement).collect(),
            entry_spills: conv.entry_spills().to_vec(),
        }
    }
}

impl fmt::Display for ManagedFrameReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "managed {} {}{}{}",
            self.architecture,
            self.shorty,
            if self.is_static { " static" } else { "" },
            if self.is_synchronized { " synchronized" } else { "" },
        )?;
        writeln!(f, "  abi:             {}", self.abi)?;
        writeln!(
            f,
            "  method:          {} at {}",
            self.method_register, self.method_stack_offset
        )?;
        writeln!(f, "  return:          {}", self.return_register)?;
        writeln!(f, "  scratch:         {}", self.interprocedural_scratch_register)?;
        write_arguments(f, &self.arguments)?;
        writeln!(f, "  entry spills:")?;
        for spill in &self.entry_spills {
            if spill.is_placeholder() {
                writeln!(f, "    <memory> {} bytes", spill.size())?;
            } else {
                writeln!(f, "    {} {} bytes", spill.managed_register(), spill.size())?;
            }
        }
        Ok(())
    }
}

fn write_arguments(f: &mut fmt::Formatter<'_>, arguments: &[ArgLocation]) -> fmt::Result {
    writeln!(f, "  arguments:")?;
    for arg in arguments {
        write!(
            f,
            "    #{:<2} {:<10} {} bytes  {}",
            arg.position, arg.kind, arg.size, arg.placement
        )?;
        if let Some(entry) = arg.handle_scope_entry {
            write!(f, "  (handle {})", entry)?;
        }
        writeln!(f)?;
    }
    Ok(())
}

fn join(registers: &[ManagedRegister]) -> String {
    registers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
