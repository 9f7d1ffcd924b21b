// src/handle_scope.rs
//! Byte layout of a handle scope as embedded in a JNI transition frame.
//!
//! The layout is packed:
//!
//! ```text
//! | link (pointer) | number_of_references (u32) | references[n] (u32 each) |
//! ```

use crate::arch::PointerSize;

/// Size of one stack reference slot. Always a compressed 32-bit reference.
pub const STACK_REFERENCE_SIZE: usize = 4;

/// Size of the `number_of_references` field.
const NUMBER_OF_REFERENCES_SIZE: usize = 4;

pub struct HandleScope;

impl HandleScope {
    /// Offset of the link to the enclosing scope
    pub const fn link_offset(_pointer_size: PointerSize) -> usize {
        0
    }

    /// Offset of the reference count
    pub const fn number_of_references_offset(pointer_size: PointerSize) -> usize {
        pointer_size.bytes()
    }

    /// Offset of the first reference slot
    pub const fn references_offset(pointer_size: PointerSize) -> usize {
        Self::number_of_references_offset(pointer_size) + NUMBER_OF_REFERENCES_SIZE
    }

    /// Header size, everything before the reference array
    pub const fn header_size(pointer_size: PointerSize) -> usize {
        pointer_size.bytes() + NUMBER_OF_REFERENCES_SIZE
    }

    pub const fn size_of(pointer_size: PointerSize, num_references: usize) -> usize {
        Self::header_size(pointer_size) + STACK_REFERENCE_SIZE * num_references
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_field_offsets_are_ordered() {
        for ps in [PointerSize::K32, PointerSize::K64] {
            assert!(HandleScope::link_offset(ps) < HandleScope::number_of_references_offset(ps));
            assert!(
                HandleScope::number_of_references_offset(ps) < HandleScope::references_offset(ps)
            );
            assert_eq!(HandleScope::references_offset(ps), HandleScope::header_size(ps));
        }
    }

    #[test]
    fn test_size_of() {
        assert_eq!(HandleScope::size_of(PointerSize::K32, 0), 8);
        assert_eq!(HandleScope::size_of(PointerSize::K32, 3), 20);
        assert_eq!(HandleScope::size_of(PointerSize::K64, 1), 16);
    }
}
