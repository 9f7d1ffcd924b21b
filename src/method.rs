// src/method.rs
//! Method access flags and the descriptor a convention is built from.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Subset of method access flags that influence the calling convention
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct MethodFlags: u32 {
        const STATIC          = 0x0000_0008;
        const SYNCHRONIZED    = 0x0000_0020;
        const NATIVE          = 0x0000_0100;
        const FAST_NATIVE     = 0x0008_0000;
        const CRITICAL_NATIVE = 0x0020_0000;
    }
}

impl MethodFlags {
    pub fn is_static(self) -> bool {
        self.contains(MethodFlags::STATIC)
    }

    pub fn is_synchronized(self) -> bool {
        self.contains(MethodFlags::SYNCHRONIZED)
    }

    pub fn is_critical_native(self) -> bool {
        self.contains(MethodFlags::CRITICAL_NATIVE)
    }
}

/// A method as handed to the convention factories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub shorty: String,
    #[serde(default = "MethodFlags::empty")]
    pub flags: MethodFlags,
}

impl MethodDescriptor {
    pub fn new(shorty: impl Into<String>, flags: MethodFlags) -> Self {
        Self {
            shorty: shorty.into(),
            flags,
        }
    }
}
