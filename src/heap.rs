//! The managed object heap (spec §4.1).
//!
//! Every live object is reached through a `Handle`, a stable,
//! opaque index that survives `compact()`. The handle table is an
//! append-only `Vec` of slots with an intrusive free list for reuse,
//! mirroring the original C implementation's first-free-slot handle
//! allocator (see `db_symbols.c`'s linked symbol tables, which assume
//! handles never move) and `scostello-monty`'s `Heap` arena
//! (`src/heap.rs`: `Vec<Option<HeapObject>>`, explicit `get`/`get_mut`,
//! a refcount used for liveness, panics on bad handles since a bad
//! handle is a compiler bug, not a BASIC-program-triggerable error).
//!
//! Unlike the C source, payloads here are never addressed by raw
//! pointer, so `compact()` has nothing to slide: Rust's `Vec<Option<T>>`
//! already gives every live object an address-independent identity.
//! `compact()` therefore reduces to a mark/sweep that frees handles
//! unreachable from the caller's roots, which is exactly the operation
//! callers need (relief from `HandleExhausted`/`HeapFull`) without the
//! manual pointer-fixup bookkeeping the original needs to avoid
//! invalidating literal operands embedded in bytecode. See DESIGN.md.

use crate::error::HeapError;
use std::fmt;

/// Opaque, stable identifier for a heap object. Handle `0` is never
/// allocated and stands for "no object" (spec §4.5 `StartCode`'s
/// `if (!object) Abort(...)` check on a null Code/Intrinsic handle).
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Handle(u32);

impl Handle {
    pub const NULL: Handle = Handle(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    /// Reconstructs a handle from its raw id, as decoded from a
    /// bytecode operand (spec §6: `GREF`/`LITH`/`CALL` operands are
    /// raw handle ids baked in at compile time).
    pub fn from_raw(id: u32) -> Handle {
        Handle(id)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Tag distinguishing the payload layout of a live object (spec §3).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Code,
    Intrinsic,
    HostIntrinsic,
    String,
    ByteVector,
    IntegerVector,
    StringVector,
    Symbol,
    Local,
    Type,
}

/// Storage class of a `Symbol` (spec §3).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StorageClass {
    Constant,
    Global,
    Local,
    Argument,
}

/// The value a `Symbol` holds, tagged by its declared type (spec §3:
/// "one of {integer value, handle value} in a union tagged by the
/// symbol's type").
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SymbolValue {
    Integer(i32),
    Handle(Handle),
}

#[derive(Clone, Debug)]
pub struct SymbolData {
    pub name: String,
    pub storage_class: StorageClass,
    pub type_handle: Handle,
    pub value: SymbolValue,
    /// Next symbol in the insertion-ordered table this belongs to.
    pub next: Option<Handle>,
}

#[derive(Clone, Debug)]
pub struct LocalData {
    pub name: String,
    pub type_handle: Handle,
    pub offset: i32,
    pub next: Option<Handle>,
}

/// A `Type` object (spec §3): Integer, Byte, String, Array(element),
/// or Function(argument table handle, return type handle).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeData {
    Integer,
    Byte,
    String,
    Array(Handle),
    Function { arguments: Vec<Handle>, return_type: Handle },
}

/// The payload stored behind a handle. `String` and `ByteVector`
/// share the `Bytes` representation; the distinguishing `ObjectKind`
/// lives alongside in `Entry`.
/// A compiled function body plus the argument counts the VM needs to
/// compute the new frame's base pointers on `CALL` (spec §4.5 calling
/// convention: arguments are pushed by the caller before `CALL`, so
/// the callee's frame pointer must back up past them).
#[derive(Clone, Debug)]
pub struct CodeObject {
    pub bytes: Vec<u8>,
    pub value_params: usize,
    pub handle_params: usize,
}

#[derive(Clone, Debug)]
enum Payload {
    Code(CodeObject),
    Intrinsic(usize),
    HostIntrinsic(usize),
    Bytes(Vec<u8>),
    Integers(Vec<i32>),
    Handles(Vec<Handle>),
    Symbol(SymbolData),
    Local(LocalData),
    Type(TypeData),
}

impl Payload {
    fn byte_len(&self) -> usize {
        match self {
            Payload::Code(c) => c.bytes.len(),
            Payload::Bytes(v) => v.len(),
            Payload::Integers(v) => v.len() * std::mem::size_of::<i32>(),
            Payload::Handles(v) => v.len() * std::mem::size_of::<Handle>(),
            Payload::Intrinsic(_) | Payload::HostIntrinsic(_) => 0,
            Payload::Symbol(_) | Payload::Local(_) | Payload::Type(_) => {
                std::mem::size_of::<SymbolData>()
            }
        }
    }
}

struct Entry {
    kind: ObjectKind,
    /// Liveness counter used only during `compact()`, per spec §3
    /// ("not as the primary GC scheme") — we run an explicit
    /// mark/sweep from caller-supplied roots instead of refcounting.
    marked: bool,
    payload: Payload,
}

/// Tunable limits, analogous to the fixed `heap_space[4096]` buffer
/// and `maxObjects` table size in `db_compiler.c`'s `InitCompiler`.
#[derive(Copy, Clone, Debug)]
pub struct HeapLimits {
    pub max_objects: usize,
    pub max_bytes: usize,
}

impl Default for HeapLimits {
    fn default() -> Self {
        HeapLimits { max_objects: 4096, max_bytes: 1 << 20 }
    }
}

/// The object heap: a fixed-capacity handle table plus a soft byte
/// budget standing in for the data arena.
pub struct ObjectHeap {
    limits: HeapLimits,
    table: Vec<Option<Entry>>,
    free_list: Vec<u32>,
    bytes_used: usize,
    intrinsics: Vec<(&'static str, crate::intrinsics::IntrinsicFn)>,
    host_intrinsics: Vec<(&'static str, crate::intrinsics::HostIntrinsicFn)>,
}

impl ObjectHeap {
    pub fn new(limits: HeapLimits) -> Self {
        ObjectHeap {
            limits,
            table: Vec::new(),
            free_list: Vec::new(),
            bytes_used: 0,
            intrinsics: Vec::new(),
            host_intrinsics: Vec::new(),
        }
    }

    fn alloc_slot(&mut self, kind: ObjectKind, payload: Payload) -> Result<Handle, HeapError> {
        let size = payload.byte_len();
        if self.bytes_used + size > self.limits.max_bytes {
            return Err(HeapError::HeapFull);
        }
        let entry = Entry { kind, marked: false, payload };
        let handle = if let Some(index) = self.free_list.pop() {
            self.table[index as usize] = Some(entry);
            Handle(index + 1)
        } else {
            if self.table.len() >= self.limits.max_objects {
                return Err(HeapError::HandleExhausted);
            }
            self.table.push(Some(entry));
            Handle(self.table.len() as u32)
        };
        self.bytes_used += size;
        Ok(handle)
    }

    fn entry(&self, handle: Handle) -> &Entry {
        self.table[handle.index()]
            .as_ref()
            .expect("dangling handle: object already freed")
    }

    fn entry_mut(&mut self, handle: Handle) -> &mut Entry {
        self.table[handle.index()]
            .as_mut()
            .expect("dangling handle: object already freed")
    }

    pub fn get_kind(&self, handle: Handle) -> ObjectKind {
        self.entry(handle).kind
    }

    pub fn get_size(&self, handle: Handle) -> usize {
        match &self.entry(handle).payload {
            Payload::Code(c) => c.bytes.len(),
            Payload::Bytes(v) => v.len(),
            Payload::Integers(v) => v.len(),
            Payload::Handles(v) => v.len(),
            Payload::Intrinsic(_) | Payload::HostIntrinsic(_) => 0,
            Payload::Symbol(_) | Payload::Local(_) | Payload::Type(_) => 0,
        }
    }

    // --- constructors -----------------------------------------------

    pub fn new_code(&mut self, bytes: Vec<u8>) -> Result<Handle, HeapError> {
        self.new_code_with_params(bytes, 0, 0)
    }

    pub fn new_code_with_params(
        &mut self,
        bytes: Vec<u8>,
        value_params: usize,
        handle_params: usize,
    ) -> Result<Handle, HeapError> {
        self.alloc_slot(ObjectKind::Code, Payload::Code(CodeObject { bytes, value_params, handle_params }))
    }

    pub fn new_intrinsic(
        &mut self,
        signature: &'static str,
        handler: crate::intrinsics::IntrinsicFn,
    ) -> Result<Handle, HeapError> {
        let id = self.intrinsics.len();
        self.intrinsics.push((signature, handler));
        self.alloc_slot(ObjectKind::Intrinsic, Payload::Intrinsic(id))
    }

    /// Registers an intrinsic that needs access to the embedder's
    /// `Host` (spec §6's `printStr`/`printInt`/`printTab`/`printNL`/
    /// `printFlush`), kept as a distinct kind from `Intrinsic` since
    /// ordinary intrinsics (`ABS`, `LEN`, ...) are pure heap functions.
    pub fn new_host_intrinsic(
        &mut self,
        signature: &'static str,
        handler: crate::intrinsics::HostIntrinsicFn,
    ) -> Result<Handle, HeapError> {
        let id = self.host_intrinsics.len();
        self.host_intrinsics.push((signature, handler));
        self.alloc_slot(ObjectKind::HostIntrinsic, Payload::HostIntrinsic(id))
    }

    pub fn new_string(&mut self, bytes: &[u8]) -> Result<Handle, HeapError> {
        self.alloc_slot(ObjectKind::String, Payload::Bytes(bytes.to_vec()))
    }

    pub fn new_byte_vector(&mut self, len: usize) -> Result<Handle, HeapError> {
        self.alloc_slot(ObjectKind::ByteVector, Payload::Bytes(vec![0; len]))
    }

    pub fn new_integer_vector(&mut self, len: usize) -> Result<Handle, HeapError> {
        self.alloc_slot(ObjectKind::IntegerVector, Payload::Integers(vec![0; len]))
    }

    pub fn new_string_vector(&mut self, len: usize) -> Result<Handle, HeapError> {
        self.alloc_slot(ObjectKind::StringVector, Payload::Handles(vec![Handle::NULL; len]))
    }

    pub fn new_symbol(
        &mut self,
        name: &str,
        storage_class: StorageClass,
        type_handle: Handle,
    ) -> Result<Handle, HeapError> {
        let data = SymbolData {
            name: name.to_string(),
            storage_class,
            type_handle,
            value: SymbolValue::Integer(0),
            next: None,
        };
        self.alloc_slot(ObjectKind::Symbol, Payload::Symbol(data))
    }

    pub fn new_local(&mut self, name: &str, type_handle: Handle, offset: i32) -> Result<Handle, HeapError> {
        let data = LocalData { name: name.to_string(), type_handle, offset, next: None };
        self.alloc_slot(ObjectKind::Local, Payload::Local(data))
    }

    pub fn new_type(&mut self, type_data: TypeData) -> Result<Handle, HeapError> {
        self.alloc_slot(ObjectKind::Type, Payload::Type(type_data))
    }

    // --- accessors ----------------------------------------------------

    /// Returns an intrinsic's argument/return signature string
    /// (`"s=si"`-shaped, spec §4.6) together with its handler, so the
    /// VM's `CALL` handling knows which stack each argument comes off
    /// without the heap or the handler needing to know about stacks.
    pub fn intrinsic_signature_and_handler(
        &self,
        handle: Handle,
    ) -> Result<(&'static str, crate::intrinsics::IntrinsicFn), HeapError> {
        match &self.entry(handle).payload {
            Payload::Intrinsic(id) => Ok(self.intrinsics[*id]),
            _ => Err(HeapError::WrongKind),
        }
    }

    /// The `Host`-aware counterpart of [`intrinsic_signature_and_handler`].
    pub fn host_intrinsic_signature_and_handler(
        &self,
        handle: Handle,
    ) -> Result<(&'static str, crate::intrinsics::HostIntrinsicFn), HeapError> {
        match &self.entry(handle).payload {
            Payload::HostIntrinsic(id) => Ok(self.host_intrinsics[*id]),
            _ => Err(HeapError::WrongKind),
        }
    }

    pub fn code_bytes(&self, handle: Handle) -> Result<&[u8], HeapError> {
        match &self.entry(handle).payload {
            Payload::Code(c) => Ok(&c.bytes),
            _ => Err(HeapError::WrongKind),
        }
    }

    /// Argument counts the VM uses to compute `(fp, hfp)` on `CALL`.
    pub fn code_param_counts(&self, handle: Handle) -> Result<(usize, usize), HeapError> {
        match &self.entry(handle).payload {
            Payload::Code(c) => Ok((c.value_params, c.handle_params)),
            _ => Err(HeapError::WrongKind),
        }
    }

    pub fn store_code(&mut self, handle: Handle, bytes: &[u8]) -> Result<(), HeapError> {
        match &mut self.entry_mut(handle).payload {
            Payload::Code(c) => {
                self.bytes_used = self.bytes_used + bytes.len() - c.bytes.len();
                c.bytes = bytes.to_vec();
                Ok(())
            }
            _ => Err(HeapError::WrongKind),
        }
    }

    pub fn bytes(&self, handle: Handle) -> Result<&[u8], HeapError> {
        match &self.entry(handle).payload {
            Payload::Bytes(v) => Ok(v),
            _ => Err(HeapError::WrongKind),
        }
    }

    /// Copies `data` into the handle's payload, resizing as needed
    /// (spec §4.1 `StoreByteVectorData`).
    pub fn store_byte_vector_data(&mut self, handle: Handle, data: &[u8]) -> Result<(), HeapError> {
        match &mut self.entry_mut(handle).payload {
            Payload::Bytes(v) => {
                self.bytes_used = self.bytes_used + data.len() - v.len();
                *v = data.to_vec();
                Ok(())
            }
            _ => Err(HeapError::WrongKind),
        }
    }

    pub fn integers(&self, handle: Handle) -> Result<&[i32], HeapError> {
        match &self.entry(handle).payload {
            Payload::Integers(v) => Ok(v),
            _ => Err(HeapError::WrongKind),
        }
    }

    pub fn integers_mut(&mut self, handle: Handle) -> Result<&mut [i32], HeapError> {
        match &mut self.entry_mut(handle).payload {
            Payload::Integers(v) => Ok(v),
            _ => Err(HeapError::WrongKind),
        }
    }

    pub fn handles(&self, handle: Handle) -> Result<&[Handle], HeapError> {
        match &self.entry(handle).payload {
            Payload::Handles(v) => Ok(v),
            _ => Err(HeapError::WrongKind),
        }
    }

    pub fn handles_mut(&mut self, handle: Handle) -> Result<&mut [Handle], HeapError> {
        match &mut self.entry_mut(handle).payload {
            Payload::Handles(v) => Ok(v),
            _ => Err(HeapError::WrongKind),
        }
    }

    pub fn symbol(&self, handle: Handle) -> Result<&SymbolData, HeapError> {
        match &self.entry(handle).payload {
            Payload::Symbol(s) => Ok(s),
            _ => Err(HeapError::WrongKind),
        }
    }

    pub fn symbol_mut(&mut self, handle: Handle) -> Result<&mut SymbolData, HeapError> {
        match &mut self.entry_mut(handle).payload {
            Payload::Symbol(s) => Ok(s),
            _ => Err(HeapError::WrongKind),
        }
    }

    pub fn local(&self, handle: Handle) -> Result<&LocalData, HeapError> {
        match &self.entry(handle).payload {
            Payload::Local(l) => Ok(l),
            _ => Err(HeapError::WrongKind),
        }
    }

    pub fn local_mut(&mut self, handle: Handle) -> Result<&mut LocalData, HeapError> {
        match &mut self.entry_mut(handle).payload {
            Payload::Local(l) => Ok(l),
            _ => Err(HeapError::WrongKind),
        }
    }

    pub fn type_data(&self, handle: Handle) -> Result<&TypeData, HeapError> {
        match &self.entry(handle).payload {
            Payload::Type(t) => Ok(t),
            _ => Err(HeapError::WrongKind),
        }
    }

    /// Two-phase mark-and-sweep reclamation (spec §4.1 `Compact`).
    /// Phase 1 marks everything reachable from `roots`, following
    /// `StringVector` elements, a `Symbol`'s handle-typed value, and a
    /// `Local`/`Type`'s referenced type handles. Phase 2 frees every
    /// unmarked slot. Payloads never move, so no literal bytecode
    /// operand is ever invalidated (see module doc comment).
    pub fn compact(&mut self, roots: &[Handle]) {
        for slot in self.table.iter_mut().flatten() {
            slot.marked = false;
        }

        let mut stack: Vec<Handle> = roots.iter().copied().filter(|h| !h.is_null()).collect();
        while let Some(h) = stack.pop() {
            if h.index() >= self.table.len() {
                continue;
            }
            let already_marked = match &self.table[h.index()] {
                Some(e) => e.marked,
                None => continue,
            };
            if already_marked {
                continue;
            }
            let children = {
                let entry = self.table[h.index()].as_mut().unwrap();
                entry.marked = true;
                match &entry.payload {
                    Payload::Handles(v) => v.clone(),
                    Payload::Symbol(s) => {
                        let mut v = vec![s.type_handle];
                        if let SymbolValue::Handle(h) = s.value {
                            v.push(h);
                        }
                        v
                    }
                    Payload::Local(l) => vec![l.type_handle],
                    Payload::Type(TypeData::Array(elem)) => vec![*elem],
                    Payload::Type(TypeData::Function { arguments, return_type }) => {
                        let mut v = arguments.clone();
                        v.push(*return_type);
                        v
                    }
                    _ => Vec::new(),
                }
            };
            stack.extend(children.into_iter().filter(|h| !h.is_null()));
        }

        for (index, slot) in self.table.iter_mut().enumerate() {
            let free = match slot {
                Some(e) if !e.marked => true,
                _ => false,
            };
            if free {
                self.bytes_used -= slot.as_ref().unwrap().payload.byte_len();
                *slot = None;
                self.free_list.push(index as u32);
            }
        }
        log::trace!("heap compact: {} live of {} slots", self.live_count(), self.table.len());
    }

    pub fn live_count(&self) -> usize {
        self.table.iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_size_round_trip() {
        let mut heap = ObjectHeap::new(HeapLimits::default());
        let h = heap.new_string(b"hello").unwrap();
        assert_eq!(heap.get_kind(h), ObjectKind::String);
        assert_eq!(heap.get_size(h), 5);
        assert_eq!(heap.bytes(h).unwrap(), b"hello");
    }

    #[test]
    fn zero_length_payload_consumes_only_a_handle() {
        let mut heap = ObjectHeap::new(HeapLimits::default());
        let h = heap.new_string(b"").unwrap();
        assert_eq!(heap.get_size(h), 0);
    }

    #[test]
    fn compact_preserves_reachable_and_frees_unreachable() {
        let mut heap = ObjectHeap::new(HeapLimits::default());
        let kept = heap.new_string(b"kept").unwrap();
        let _garbage = heap.new_string(b"garbage").unwrap();
        let before = heap.live_count();
        heap.compact(&[kept]);
        assert!(heap.live_count() < before);
        assert_eq!(heap.bytes(kept).unwrap(), b"kept");
    }

    #[test]
    fn handle_exhaustion_is_reported() {
        let mut heap = ObjectHeap::new(HeapLimits { max_objects: 2, max_bytes: 1 << 20 });
        heap.new_string(b"a").unwrap();
        heap.new_string(b"b").unwrap();
        assert_eq!(heap.new_string(b"c").unwrap_err(), HeapError::HandleExhausted);
    }

    #[test]
    fn compact_reclaims_handle_slots_for_reuse() {
        let mut heap = ObjectHeap::new(HeapLimits { max_objects: 1, max_bytes: 1 << 20 });
        let h = heap.new_string(b"a").unwrap();
        heap.compact(&[]);
        assert_eq!(heap.live_count(), 0);
        let h2 = heap.new_string(b"b").unwrap();
        assert_eq!(h2, h);
    }
}
