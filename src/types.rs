//! Type data model (spec §3): `Integer`, `Byte`, `String`, arrays of a
//! homogeneous element type, and function signatures. Types are heap
//! objects like everything else, so two uses of `INTEGER` in source
//! text resolve to the same handle; `CommonTypes` caches the three
//! scalar singletons the way `db_compiler.c`'s `InitCompiler` builds
//! `c->integerType`/`byteType`/`stringType` once and reuses them.

use crate::error::HeapError;
use crate::heap::{Handle, ObjectHeap, TypeData};

/// The three always-present scalar types, built once per compilation
/// unit and handed out by handle thereafter.
#[derive(Copy, Clone, Debug)]
pub struct CommonTypes {
    pub integer: Handle,
    pub byte: Handle,
    pub string: Handle,
}

impl CommonTypes {
    pub fn install(heap: &mut ObjectHeap) -> Result<Self, HeapError> {
        Ok(CommonTypes {
            integer: heap.new_type(TypeData::Integer)?,
            byte: heap.new_type(TypeData::Byte)?,
            string: heap.new_type(TypeData::String)?,
        })
    }
}

/// Looks up (or creates) the array-of-`element` type, mirroring
/// `db_compiler.c`'s on-demand array type construction at each `DIM`.
pub fn array_of(heap: &mut ObjectHeap, element: Handle) -> Result<Handle, HeapError> {
    heap.new_type(TypeData::Array(element))
}

pub fn function_of(
    heap: &mut ObjectHeap,
    arguments: Vec<Handle>,
    return_type: Handle,
) -> Result<Handle, HeapError> {
    heap.new_type(TypeData::Function { arguments, return_type })
}

/// Structural equality between two type handles (spec §4.3: type
/// checking compares structure, not identity, since arrays/functions
/// are rebuilt per declaration).
pub fn types_equal(heap: &ObjectHeap, a: Handle, b: Handle) -> bool {
    if a == b {
        return true;
    }
    match (heap.type_data(a), heap.type_data(b)) {
        (Ok(ta), Ok(tb)) => match (ta, tb) {
            (TypeData::Integer, TypeData::Integer) => true,
            (TypeData::Byte, TypeData::Byte) => true,
            (TypeData::String, TypeData::String) => true,
            (TypeData::Array(ea), TypeData::Array(eb)) => types_equal(heap, *ea, *eb),
            (
                TypeData::Function { arguments: aa, return_type: ra },
                TypeData::Function { arguments: ab, return_type: rb },
            ) => {
                aa.len() == ab.len()
                    && aa.iter().zip(ab.iter()).all(|(x, y)| types_equal(heap, *x, *y))
                    && types_equal(heap, *ra, *rb)
            }
            _ => false,
        },
        _ => false,
    }
}

/// Whether a type is passed/returned by handle (string or array) as
/// opposed to by value (integer or byte) — this is what selects the
/// `H`-suffixed opcode family (spec §4.5).
pub fn is_handle_type(heap: &ObjectHeap, t: Handle) -> bool {
    matches!(heap.type_data(t), Ok(TypeData::String) | Ok(TypeData::Array(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::HeapLimits;

    #[test]
    fn scalar_types_are_distinct() {
        let mut heap = ObjectHeap::new(HeapLimits::default());
        let common = CommonTypes::install(&mut heap).unwrap();
        assert!(!types_equal(&heap, common.integer, common.string));
        assert!(types_equal(&heap, common.integer, common.integer));
    }

    #[test]
    fn arrays_compare_structurally() {
        let mut heap = ObjectHeap::new(HeapLimits::default());
        let common = CommonTypes::install(&mut heap).unwrap();
        let a1 = array_of(&mut heap, common.integer).unwrap();
        let a2 = array_of(&mut heap, common.integer).unwrap();
        assert_ne!(a1, a2);
        assert!(types_equal(&heap, a1, a2));
    }

    #[test]
    fn handle_type_classification() {
        let mut heap = ObjectHeap::new(HeapLimits::default());
        let common = CommonTypes::install(&mut heap).unwrap();
        assert!(is_handle_type(&heap, common.string));
        assert!(!is_handle_type(&heap, common.integer));
    }
}
