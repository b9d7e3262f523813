//! The bytecode interpreter (spec §4.5), grounded on the teacher's
//! `vm.rs` (`Opcode` dispatch loop, a small `step` function threading
//! a `Result`, an `Error` enum shared with the rest of the crate) and
//! on `db_vmint.c`'s `Execute`/`PopFrame`/`StringCat`, which this
//! module follows opcode-for-opcode.
//!
//! Two stacks: an integer value stack and a handle stack, each a
//! plain `Vec` sized against a configured capacity rather than the
//! original's single shared buffer with stacks growing toward each
//! other from opposite ends — overflow is detected against that
//! capacity instead of a pointer crossover, the natural Rust rendition
//! of the same invariant (see DESIGN.md).

use crate::error::RuntimeAbort;
use crate::heap::{Handle, ObjectHeap, ObjectKind, SymbolValue};
use crate::host::Host;
use crate::intrinsics::{Arg, Return};
use crate::opcode::{decode, Opcode};

/// One activation record, pushed by `CALL` and popped by the
/// `RETURN`/`RETURNH`/`RETURNV` family (`db_vmint.c`'s `PopFrame`).
struct Frame {
    caller_fp: usize,
    caller_hfp: usize,
    return_pc: usize,
    caller_code: Handle,
}

pub struct Interpreter {
    stack: Vec<i32>,
    hstack: Vec<Handle>,
    call_stack: Vec<Frame>,
    fp: usize,
    hfp: usize,
    pc: usize,
    code: Handle,
    stack_capacity: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Halted,
}

impl Interpreter {
    pub fn new(stack_capacity: usize) -> Self {
        Interpreter {
            stack: Vec::new(),
            hstack: Vec::new(),
            call_stack: Vec::new(),
            fp: 0,
            hfp: 0,
            pc: 0,
            code: Handle::NULL,
            stack_capacity,
        }
    }

    fn check_capacity(&self) -> Result<(), RuntimeAbort> {
        if self.stack.len() + self.hstack.len() >= self.stack_capacity {
            return Err(RuntimeAbort::StackOverflow);
        }
        Ok(())
    }

    fn push(&mut self, v: i32) -> Result<(), RuntimeAbort> {
        self.check_capacity()?;
        self.stack.push(v);
        Ok(())
    }

    fn pop(&mut self) -> Result<i32, RuntimeAbort> {
        self.stack.pop().ok_or(RuntimeAbort::StackOverflow)
    }

    fn push_h(&mut self, h: Handle) -> Result<(), RuntimeAbort> {
        self.check_capacity()?;
        self.hstack.push(h);
        Ok(())
    }

    fn pop_h(&mut self) -> Result<Handle, RuntimeAbort> {
        self.hstack.pop().ok_or(RuntimeAbort::StackOverflow)
    }

    /// Runs `entry_code` to completion, i.e. until `HALT` at the
    /// top-level frame (spec §4.4: the compiler always terminates the
    /// main program with `HALT`).
    pub fn execute(
        &mut self,
        heap: &mut ObjectHeap,
        host: &mut dyn Host,
        entry_code: Handle,
    ) -> Result<Outcome, RuntimeAbort> {
        self.code = entry_code;
        self.pc = 0;
        self.fp = self.stack.len();
        self.hfp = self.hstack.len();
        loop {
            let code_bytes = heap.code_bytes(self.code)?;
            let (instr, next_pc) = decode(code_bytes, self.pc)?;
            self.pc = next_pc;
            log::trace!("exec pc={} op={:?} operand={}", self.pc, instr.opcode, instr.operand);
            if let Some(outcome) = self.step(heap, host, instr.opcode, instr.operand)? {
                return Ok(outcome);
            }
        }
    }

    fn branch(&mut self, target: i32) {
        self.pc = target as usize;
    }

    fn step(
        &mut self,
        heap: &mut ObjectHeap,
        host: &mut dyn Host,
        op: Opcode,
        operand: i32,
    ) -> Result<Option<Outcome>, RuntimeAbort> {
        use Opcode::*;
        match op {
            Br => self.branch(operand),
            Brt => {
                if self.pop()? != 0 {
                    self.branch(operand);
                }
            }
            Brf => {
                if self.pop()? == 0 {
                    self.branch(operand);
                }
            }
            // short-circuit AND/OR: peek, branch without popping on
            // the deciding value (db_vmint.c's OP_BRTSC/OP_BRFSC).
            Brtsc => {
                let top = *self.stack.last().ok_or(RuntimeAbort::StackOverflow)?;
                if top != 0 {
                    self.branch(operand);
                } else {
                    self.pop()?;
                }
            }
            Brfsc => {
                let top = *self.stack.last().ok_or(RuntimeAbort::StackOverflow)?;
                if top == 0 {
                    self.branch(operand);
                } else {
                    self.pop()?;
                }
            }
            Neg => {
                let a = self.pop()?;
                self.push(a.wrapping_neg())?;
            }
            Add => self.binop(|a, b| a.wrapping_add(b))?,
            Sub => self.binop(|a, b| a.wrapping_sub(b))?,
            Mul => self.binop(|a, b| a.wrapping_mul(b))?,
            Div => self.binop(|a, b| if b == 0 { 0 } else { a.wrapping_div(b) })?,
            Rem => self.binop(|a, b| if b == 0 { 0 } else { a.wrapping_rem(b) })?,
            Bnot => {
                let a = self.pop()?;
                self.push(!a)?;
            }
            Band => self.binop(|a, b| a & b)?,
            Bor => self.binop(|a, b| a | b)?,
            Bxor => self.binop(|a, b| a ^ b)?,
            Shl => self.binop(|a, b| a.wrapping_shl(b as u32))?,
            Shr => self.binop(|a, b| a.wrapping_shr(b as u32))?,
            Lt => self.cmp(|a, b| a < b)?,
            Le => self.cmp(|a, b| a <= b)?,
            Eq => self.cmp(|a, b| a == b)?,
            Ne => self.cmp(|a, b| a != b)?,
            Ge => self.cmp(|a, b| a >= b)?,
            Gt => self.cmp(|a, b| a > b)?,
            Cat => {
                let b = self.pop_h()?;
                let a = self.pop_h()?;
                let mut joined = heap.bytes(a)?.to_vec();
                joined.extend_from_slice(heap.bytes(b)?);
                let h = heap.new_string(&joined)?;
                self.push_h(h)?;
            }
            Lit => self.push(operand)?,
            Lith => self.push_h(Handle::from_raw(operand as u32))?,
            Greg => {
                let sym = Handle::from_raw(operand as u32);
                match heap.symbol(sym)?.value {
                    SymbolValue::Integer(v) => self.push(v)?,
                    SymbolValue::Handle(_) => return Err(RuntimeAbort::WrongType),
                }
            }
            Gset => {
                let sym = Handle::from_raw(operand as u32);
                let v = self.pop()?;
                heap.symbol_mut(sym)?.value = SymbolValue::Integer(v);
            }
            Grefh => {
                let sym = Handle::from_raw(operand as u32);
                match heap.symbol(sym)?.value {
                    SymbolValue::Handle(h) => self.push_h(h)?,
                    SymbolValue::Integer(_) => return Err(RuntimeAbort::WrongType),
                }
            }
            Gseth => {
                let sym = Handle::from_raw(operand as u32);
                let v = self.pop_h()?;
                heap.symbol_mut(sym)?.value = SymbolValue::Handle(v);
            }
            Lref => {
                let idx = (self.fp as i32 + operand) as usize;
                self.push(*self.stack.get(idx).ok_or(RuntimeAbort::StackOverflow)?)?;
            }
            Lset => {
                let idx = (self.fp as i32 + operand) as usize;
                let v = self.pop()?;
                *self.stack.get_mut(idx).ok_or(RuntimeAbort::StackOverflow)? = v;
            }
            Lrefh => {
                let idx = (self.hfp as i32 + operand) as usize;
                self.push_h(*self.hstack.get(idx).ok_or(RuntimeAbort::StackOverflow)?)?;
            }
            Lseth => {
                let idx = (self.hfp as i32 + operand) as usize;
                let v = self.pop_h()?;
                *self.hstack.get_mut(idx).ok_or(RuntimeAbort::StackOverflow)? = v;
            }
            Vref => {
                let index = self.pop()?;
                let array = self.pop_h()?;
                let data = heap.integers(array)?;
                let v = *data.get(index as usize).ok_or(RuntimeAbort::ArraySubscript(index))?;
                self.push(v)?;
            }
            Vset => {
                let value = self.pop()?;
                let index = self.pop()?;
                let array = self.pop_h()?;
                let len = heap.get_size(array);
                if index < 0 || index as usize >= len {
                    return Err(RuntimeAbort::ArraySubscript(index));
                }
                heap.integers_mut(array)?[index as usize] = value;
            }
            Vrefh => {
                let index = self.pop()?;
                let array = self.pop_h()?;
                let data = heap.handles(array)?;
                let v = *data.get(index as usize).ok_or(RuntimeAbort::ArraySubscript(index))?;
                self.push_h(v)?;
            }
            Vseth => {
                let value = self.pop_h()?;
                let index = self.pop()?;
                let array = self.pop_h()?;
                let len = heap.get_size(array);
                if index < 0 || index as usize >= len {
                    return Err(RuntimeAbort::ArraySubscript(index));
                }
                heap.handles_mut(array)?[index as usize] = value;
            }
            Reserve => {
                for _ in 0..operand {
                    self.push(0)?;
                }
            }
            Call => {
                let callee = Handle::from_raw(operand as u32);
                match heap.get_kind(callee) {
                    ObjectKind::Code => {
                        let (value_params, handle_params) = heap.code_param_counts(callee)?;
                        if value_params > self.stack.len() || handle_params > self.hstack.len() {
                            return Err(RuntimeAbort::ArgumentCount);
                        }
                        self.call_stack.push(Frame {
                            caller_fp: self.fp,
                            caller_hfp: self.hfp,
                            return_pc: self.pc,
                            caller_code: self.code,
                        });
                        self.fp = self.stack.len() - value_params;
                        self.hfp = self.hstack.len() - handle_params;
                        self.code = callee;
                        self.pc = 0;
                    }
                    ObjectKind::Intrinsic => self.call_intrinsic(heap, callee)?,
                    ObjectKind::HostIntrinsic => self.call_host_intrinsic(heap, host, callee)?,
                    _ => return Err(RuntimeAbort::NotCodeObject(callee)),
                }
            }
            Return => self.do_return(false, false)?,
            Returnh => self.do_return(true, false)?,
            Returnv => self.do_return(false, true)?,
            Drop => {
                for _ in 0..operand {
                    self.pop()?;
                }
            }
            Halt => return Ok(Some(Outcome::Halted)),
        }
        Ok(None)
    }

    fn binop(&mut self, f: impl Fn(i32, i32) -> i32) -> Result<(), RuntimeAbort> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(f(a, b))
    }

    fn cmp(&mut self, f: impl Fn(i32, i32) -> bool) -> Result<(), RuntimeAbort> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(if f(a, b) { 1 } else { 0 })
    }

    /// Pops arguments according to the callee's registered signature
    /// string (`"<return>=<args>"`, spec §4.6 / `db_compiler.c`'s
    /// `AddIntrinsic`), `i`/`b` reading the value stack and `s`/`#`
    /// reading the handle stack, then pushes the single result back
    /// onto whichever stack matches the return-type character.
    fn call_intrinsic(&mut self, heap: &mut ObjectHeap, callee: Handle) -> Result<(), RuntimeAbort> {
        let (signature, handler) = heap.intrinsic_signature_and_handler(callee)?;
        let mut parts = signature.splitn(2, '=');
        let return_char = parts.next().and_then(|s| s.chars().next()).ok_or(RuntimeAbort::WrongType)?;
        let arg_chars: Vec<char> = parts.next().map(|s| s.chars().collect()).unwrap_or_default();

        let mut args = Vec::with_capacity(arg_chars.len());
        for &c in arg_chars.iter().rev() {
            let arg = match c {
                'i' | 'b' => Arg::Integer(self.pop()?),
                's' | '#' => Arg::Handle(self.pop_h()?),
                _ => return Err(RuntimeAbort::WrongType),
            };
            args.push(arg);
        }
        args.reverse();

        match handler(heap, &args)? {
            Return::Integer(v) => {
                if return_char != 'i' && return_char != 'b' {
                    return Err(RuntimeAbort::WrongType);
                }
                self.push(v)?;
            }
            Return::Handle(h) => {
                if return_char != 's' && return_char != '#' {
                    return Err(RuntimeAbort::WrongType);
                }
                self.push_h(h)?;
            }
        }
        Ok(())
    }

    /// `Host`-aware counterpart of [`call_intrinsic`](Self::call_intrinsic),
    /// for the `printStr`/`printInt`/`printTab`/`printNL`/`printFlush`
    /// family (spec §6).
    fn call_host_intrinsic(&mut self, heap: &mut ObjectHeap, host: &mut dyn Host, callee: Handle) -> Result<(), RuntimeAbort> {
        let (signature, handler) = heap.host_intrinsic_signature_and_handler(callee)?;
        let mut parts = signature.splitn(2, '=');
        let return_char = parts.next().and_then(|s| s.chars().next()).ok_or(RuntimeAbort::WrongType)?;
        let arg_chars: Vec<char> = parts.next().map(|s| s.chars().collect()).unwrap_or_default();

        let mut args = Vec::with_capacity(arg_chars.len());
        for &c in arg_chars.iter().rev() {
            let arg = match c {
                'i' | 'b' => Arg::Integer(self.pop()?),
                's' | '#' => Arg::Handle(self.pop_h()?),
                _ => return Err(RuntimeAbort::WrongType),
            };
            args.push(arg);
        }
        args.reverse();

        match handler(heap, host, &args)? {
            Return::Integer(v) => {
                if return_char != 'i' && return_char != 'b' {
                    return Err(RuntimeAbort::WrongType);
                }
                self.push(v)?;
            }
            Return::Handle(h) => {
                if return_char != 's' && return_char != '#' {
                    return Err(RuntimeAbort::WrongType);
                }
                self.push_h(h)?;
            }
        }
        Ok(())
    }

    fn do_return(&mut self, is_handle: bool, drop_value: bool) -> Result<(), RuntimeAbort> {
        let ret_int = if !is_handle && !drop_value { Some(self.pop()?) } else { None };
        let ret_handle = if is_handle { Some(self.pop_h()?) } else { None };
        let frame = self.call_stack.pop().ok_or(RuntimeAbort::StackOverflow)?;
        self.stack.truncate(self.fp);
        self.hstack.truncate(self.hfp);
        self.fp = frame.caller_fp;
        self.hfp = frame.caller_hfp;
        self.pc = frame.return_pc;
        self.code = frame.caller_code;
        if let Some(v) = ret_int {
            self.push(v)?;
        }
        if let Some(h) = ret_handle {
            self.push_h(h)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::HeapLimits;
    use crate::host::BufferHost;
    use crate::opcode::{emit, emit_operand};

    fn run(code: Vec<u8>) -> (Interpreter, ObjectHeap) {
        let mut heap = ObjectHeap::new(HeapLimits::default());
        let entry = heap.new_code(code).unwrap();
        let mut vm = Interpreter::new(1024);
        let mut host = BufferHost::default();
        vm.execute(&mut heap, &mut host, entry).unwrap();
        (vm, heap)
    }

    #[test]
    fn literal_add_then_halt() {
        let mut code = Vec::new();
        emit_operand(&mut code, Opcode::Lit, 2);
        emit_operand(&mut code, Opcode::Lit, 3);
        emit(&mut code, Opcode::Add);
        emit(&mut code, Opcode::Halt);
        let (vm, _heap) = run(code);
        assert_eq!(vm.stack, vec![5]);
    }

    #[test]
    fn division_by_zero_yields_zero_not_a_trap() {
        let mut code = Vec::new();
        emit_operand(&mut code, Opcode::Lit, 7);
        emit_operand(&mut code, Opcode::Lit, 0);
        emit(&mut code, Opcode::Div);
        emit(&mut code, Opcode::Halt);
        let (vm, _heap) = run(code);
        assert_eq!(vm.stack, vec![0]);
    }

    #[test]
    fn string_concatenation() {
        let mut heap = ObjectHeap::new(HeapLimits::default());
        let a = heap.new_string(b"foo").unwrap();
        let b = heap.new_string(b"bar").unwrap();
        let mut code = Vec::new();
        emit_operand(&mut code, Opcode::Lith, a.raw() as i32);
        emit_operand(&mut code, Opcode::Lith, b.raw() as i32);
        emit(&mut code, Opcode::Cat);
        emit(&mut code, Opcode::Halt);
        let entry = heap.new_code(code).unwrap();
        let mut vm = Interpreter::new(1024);
        let mut host = BufferHost::default();
        vm.execute(&mut heap, &mut host, entry).unwrap();
        let result = *vm.hstack.last().unwrap();
        assert_eq!(heap.bytes(result).unwrap(), b"foobar");
    }

    #[test]
    fn negative_array_index_aborts() {
        let mut heap = ObjectHeap::new(HeapLimits::default());
        let array = heap.new_integer_vector(3).unwrap();
        let mut code = Vec::new();
        emit_operand(&mut code, Opcode::Lith, array.raw() as i32);
        emit_operand(&mut code, Opcode::Lit, -1);
        emit(&mut code, Opcode::Vref);
        emit(&mut code, Opcode::Halt);
        let entry = heap.new_code(code).unwrap();
        let mut vm = Interpreter::new(1024);
        let mut host = BufferHost::default();
        let err = vm.execute(&mut heap, &mut host, entry).unwrap_err();
        assert_eq!(err, RuntimeAbort::ArraySubscript(-1));
    }

    #[test]
    fn print_intrinsic_writes_through_the_host() {
        let mut heap = ObjectHeap::new(HeapLimits::default());
        let s = heap.new_string(b"hi").unwrap();
        let print_str = heap.new_host_intrinsic("i=s", crate::intrinsics::host_library()[0].handler).unwrap();
        let mut code = Vec::new();
        emit_operand(&mut code, Opcode::Lith, s.raw() as i32);
        emit_operand(&mut code, Opcode::Call, print_str.raw() as i32);
        emit_operand(&mut code, Opcode::Drop, 1);
        emit(&mut code, Opcode::Halt);
        let entry = heap.new_code(code).unwrap();
        let mut vm = Interpreter::new(1024);
        let mut host = BufferHost::default();
        vm.execute(&mut heap, &mut host, entry).unwrap();
        assert_eq!(host.output_string(), "hi");
    }
}
