//! Symbol tables (spec §2/§4.1), grounded on `db_symbols.c`: an
//! insertion-ordered, case-insensitive linked list of symbol handles.
//! Globals persist for the whole compilation; arguments and locals are
//! cleared at the start of each function (`db_symbols.c`'s
//! `InitSymbolTable` resets `c->arguments`/`c->locals` per `StartCode`,
//! leaving `c->globals` untouched).

use crate::error::{HeapError, ParseError};
use crate::heap::{Handle, LocalData, ObjectHeap, StorageClass, SymbolValue};

/// Head/tail of one insertion-ordered chain of symbol handles.
#[derive(Default)]
struct Chain {
    head: Option<Handle>,
    tail: Option<Handle>,
}

impl Chain {
    fn clear(&mut self) {
        self.head = None;
        self.tail = None;
    }
}

/// Globals, the current function's arguments, and the current
/// function's locals — three independent chains, exactly the three
/// tables `db_symbols.c` maintains on its `ParseContext`.
#[derive(Default)]
pub struct SymbolTable {
    globals: Chain,
    arguments: Chain,
    locals: Chain,
}

fn names_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Clears arguments and locals between functions (`db_symbols.c`'s
    /// per-function reset); globals are untouched.
    pub fn enter_function(&mut self) {
        self.arguments.clear();
        self.locals.clear();
    }

    pub fn add_global(
        &mut self,
        heap: &mut ObjectHeap,
        name: &str,
        storage_class: StorageClass,
        type_handle: Handle,
    ) -> Result<Handle, ParseError> {
        if self.find_global(heap, name).is_some() {
            return Err(ParseError::Redefined(name.to_string()));
        }
        let handle = heap.new_symbol(name, storage_class, type_handle)?;
        Self::append(heap, &mut self.globals, handle);
        Ok(handle)
    }

    pub fn find_global(&self, heap: &ObjectHeap, name: &str) -> Option<Handle> {
        Self::find_in_chain(heap, &self.globals, name)
    }

    pub fn add_argument(
        &mut self,
        heap: &mut ObjectHeap,
        name: &str,
        type_handle: Handle,
        offset: i32,
    ) -> Result<Handle, ParseError> {
        if self.find_argument(heap, name).is_some() {
            return Err(ParseError::Redefined(name.to_string()));
        }
        let handle = heap.new_local(name, type_handle, offset)?;
        Self::append_local(heap, &mut self.arguments, handle);
        Ok(handle)
    }

    pub fn find_argument(&self, heap: &ObjectHeap, name: &str) -> Option<Handle> {
        Self::find_local_in_chain(heap, &self.arguments, name)
    }

    pub fn add_local(
        &mut self,
        heap: &mut ObjectHeap,
        name: &str,
        type_handle: Handle,
        offset: i32,
    ) -> Result<Handle, ParseError> {
        if self.find_local(heap, name).is_some() || self.find_argument(heap, name).is_some() {
            return Err(ParseError::Redefined(name.to_string()));
        }
        let handle = heap.new_local(name, type_handle, offset)?;
        Self::append_local(heap, &mut self.locals, handle);
        Ok(handle)
    }

    pub fn find_local(&self, heap: &ObjectHeap, name: &str) -> Option<Handle> {
        Self::find_local_in_chain(heap, &self.locals, name)
    }

    /// Looks up `name` across arguments, then locals, then globals, the
    /// order `db_compiler.c`'s identifier resolution uses (innermost
    /// scope first).
    pub fn resolve(&self, heap: &ObjectHeap, name: &str) -> Option<Lookup> {
        if let Some(h) = self.find_argument(heap, name) {
            return Some(Lookup::Local(h));
        }
        if let Some(h) = self.find_local(heap, name) {
            return Some(Lookup::Local(h));
        }
        if let Some(h) = self.find_global(heap, name) {
            return Some(Lookup::Global(h));
        }
        None
    }

    pub fn is_constant(&self, heap: &ObjectHeap, name: &str) -> bool {
        match self.find_global(heap, name) {
            Some(h) => heap.symbol(h).map(|s| s.storage_class == StorageClass::Constant).unwrap_or(false),
            None => false,
        }
    }

    fn append(heap: &mut ObjectHeap, chain: &mut Chain, handle: Handle) {
        if let Some(tail) = chain.tail {
            if let Ok(sym) = heap.symbol_mut(tail) {
                sym.next = Some(handle);
            }
        } else {
            chain.head = Some(handle);
        }
        chain.tail = Some(handle);
        log::trace!("symtab: appended global/constant symbol {:?}", handle);
    }

    fn append_local(heap: &mut ObjectHeap, chain: &mut Chain, handle: Handle) {
        if let Some(tail) = chain.tail {
            if let Ok(local) = heap.local_mut(tail) {
                local.next = Some(handle);
            }
        } else {
            chain.head = Some(handle);
        }
        chain.tail = Some(handle);
    }

    fn find_in_chain(heap: &ObjectHeap, chain: &Chain, name: &str) -> Option<Handle> {
        let mut cur = chain.head;
        while let Some(h) = cur {
            let sym = heap.symbol(h).ok()?;
            if names_match(&sym.name, name) {
                return Some(h);
            }
            cur = sym.next;
        }
        None
    }

    fn find_local_in_chain(heap: &ObjectHeap, chain: &Chain, name: &str) -> Option<Handle> {
        let mut cur = chain.head;
        while let Some(h) = cur {
            let local = heap.local(h).ok()?;
            if names_match(&local.name, name) {
                return Some(h);
            }
            cur = local.next;
        }
        None
    }

    /// Debug dump mirroring `db_symbols.c`'s `DumpGlobals`.
    pub fn trace_globals(&self, heap: &ObjectHeap) {
        if !log::log_enabled!(log::Level::Trace) {
            return;
        }
        let mut cur = self.globals.head;
        while let Some(h) = cur {
            if let Ok(sym) = heap.symbol(h) {
                log::trace!("global {} : {:?}", sym.name, sym.type_handle);
                cur = sym.next;
            } else {
                break;
            }
        }
    }

    pub fn globals_iter<'a>(&'a self, heap: &'a ObjectHeap) -> impl Iterator<Item = Handle> + 'a {
        std::iter::successors(self.globals.head, move |h| heap.symbol(*h).ok().and_then(|s| s.next))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    Global(Handle),
    Local(Handle),
}

pub fn set_symbol_value(heap: &mut ObjectHeap, handle: Handle, value: SymbolValue) -> Result<(), HeapError> {
    heap.symbol_mut(handle)?.value = value;
    Ok(())
}

pub fn local_offset(heap: &ObjectHeap, handle: Handle) -> Result<i32, HeapError> {
    Ok(heap.local(handle)?.offset)
}

pub fn local_type(heap: &ObjectHeap, handle: Handle) -> Result<Handle, HeapError> {
    Ok(heap.local(handle)?.type_handle)
}

pub fn symbol_type(heap: &ObjectHeap, handle: Handle) -> Result<Handle, HeapError> {
    Ok(heap.symbol(handle)?.type_handle)
}

// LocalData is re-exported so compiler/mod.rs can build offsets without
// reaching into heap.rs internals directly.
pub type Local = LocalData;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{HeapLimits, ObjectHeap};
    use crate::types::CommonTypes;

    #[test]
    fn globals_are_case_insensitive() {
        let mut heap = ObjectHeap::new(HeapLimits::default());
        let common = CommonTypes::install(&mut heap).unwrap();
        let mut table = SymbolTable::new();
        table.add_global(&mut heap, "Count", StorageClass::Global, common.integer).unwrap();
        assert!(table.find_global(&heap, "COUNT").is_some());
        assert!(table.find_global(&heap, "count").is_some());
    }

    #[test]
    fn redefining_a_global_is_an_error() {
        let mut heap = ObjectHeap::new(HeapLimits::default());
        let common = CommonTypes::install(&mut heap).unwrap();
        let mut table = SymbolTable::new();
        table.add_global(&mut heap, "X", StorageClass::Global, common.integer).unwrap();
        assert!(table.add_global(&mut heap, "x", StorageClass::Global, common.integer).is_err());
    }

    #[test]
    fn locals_reset_between_functions_but_globals_persist() {
        let mut heap = ObjectHeap::new(HeapLimits::default());
        let common = CommonTypes::install(&mut heap).unwrap();
        let mut table = SymbolTable::new();
        table.add_global(&mut heap, "G", StorageClass::Global, common.integer).unwrap();
        table.add_local(&mut heap, "tmp", common.integer, 0).unwrap();
        table.enter_function();
        assert!(table.find_local(&heap, "tmp").is_none());
        assert!(table.find_global(&heap, "G").is_some());
    }

    #[test]
    fn resolve_prefers_locals_over_globals() {
        let mut heap = ObjectHeap::new(HeapLimits::default());
        let common = CommonTypes::install(&mut heap).unwrap();
        let mut table = SymbolTable::new();
        table.add_global(&mut heap, "X", StorageClass::Global, common.integer).unwrap();
        table.add_local(&mut heap, "X", common.integer, 0).unwrap();
        match table.resolve(&heap, "x") {
            Some(Lookup::Local(_)) => {}
            other => panic!("expected local, got {:?}", other),
        }
    }
}
