//! Statement compiling (spec §4.4), mirrored on `db_compiler.c`'s
//! `ParseStatement` dispatch: one function per keyword, each emitting
//! bytecode directly against the shared `Compiler` state `mod.rs`
//! holds (the fixup-chain `blocks` stack, frame offsets, the label
//! table). There is no statement AST — by the time a statement is
//! fully parsed it is fully compiled.

use super::{Block, Compiler};
use crate::error::ParseError;
use crate::heap::{Handle, StorageClass};
use crate::opcode::Opcode;
use crate::scanner::{Keyword, Token};
use crate::symtab::Lookup;
use crate::types::{is_handle_type, types_equal};

/// Where a scalar variable's storage lives: a global symbol (its value
/// carried directly on the `Symbol`, spec §3) or a frame-relative slot
/// on the value/handle stack (spec §4.5's `L*` opcode family).
enum VarLoc {
    Global(Handle),
    Local(i32),
}

impl Compiler {
    /// Dispatches one statement. `at_line_start` gates label
    /// recognition (spec §4.4: a bare `name:` is only a label
    /// definition at the start of a logical line — mid-line, after a
    /// `:` statement separator, the same shape would be ambiguous with
    /// the separator itself, so labels are restricted to column one).
    pub(super) fn compile_statement(&mut self, at_line_start: bool) -> Result<(), ParseError> {
        let tok = self.next_token()?;
        if at_line_start {
            if let Token::Identifier(name) = &tok {
                let name = name.clone();
                let after = self.next_token()?;
                if after == Token::Colon {
                    return self.define_label(&name);
                }
                self.push_back(after);
                if self.function.is_none() {
                    self.mark_main_statement();
                }
                return self.compile_assignment_body(name);
            }
        }
        if self.function.is_none() && !matches!(tok, Token::Keyword(Keyword::Fn)) {
            self.mark_main_statement();
        }
        match tok {
            Token::Keyword(Keyword::Let) => self.compile_assignment(),
            Token::Keyword(Keyword::Dim) => self.compile_dim(),
            Token::Keyword(Keyword::If) => self.compile_if(),
            Token::Keyword(Keyword::Else) => self.compile_else(),
            Token::Keyword(Keyword::EndIf) => self.compile_end_if(),
            Token::Keyword(Keyword::For) => self.compile_for(),
            Token::Keyword(Keyword::Next) => self.compile_next(),
            Token::Keyword(Keyword::Do) => self.compile_do(),
            Token::Keyword(Keyword::Loop) => self.compile_loop(),
            Token::Keyword(Keyword::Fn) => self.compile_fn_header(),
            Token::Keyword(Keyword::EndFn) => self.end_function(),
            Token::Keyword(Keyword::Return) => self.compile_return(),
            Token::Keyword(Keyword::Print) => self.compile_print(),
            Token::Keyword(Keyword::Input) => self.compile_input(),
            Token::Keyword(Keyword::Goto) => self.compile_goto(),
            Token::Keyword(Keyword::Gosub) => {
                Err(ParseError::Syntax("GOSUB is not supported; use GOTO and a matching label".to_string()))
            }
            Token::Identifier(name) => self.compile_assignment_body(name),
            Token::Colon => {
                self.push_back(Token::Colon);
                Ok(())
            }
            other => Err(ParseError::Expected(format!("statement, found {:?}", other))),
        }
    }

    fn at_statement_end(&mut self) -> Result<bool, ParseError> {
        if self.scanner.at_eol() {
            return Ok(true);
        }
        self.peek_is(&Token::Colon)
    }

    // --- LET / assignment ---------------------------------------------

    fn compile_assignment(&mut self) -> Result<(), ParseError> {
        self.expect_keyword(Keyword::Let)?;
        let name = self.expect_identifier()?;
        self.compile_assignment_body(name)
    }

    /// Handles both the `LET`-prefixed and bare forms, and both scalar
    /// (`X = expr`) and array-element (`X(i) = expr`) targets (spec
    /// §4.4). An unresolved scalar name is auto-declared as a new
    /// global the first time it is assigned at the top level — the
    /// `$`-suffix convention decides its type if present, otherwise it
    /// takes the right-hand side's type (spec §8's `A$ = "HI"` with no
    /// prior `DIM`). Inside a function body, undeclared names are an
    /// error: locals and arguments must be declared explicitly.
    fn compile_assignment_body(&mut self, name: String) -> Result<(), ParseError> {
        if self.peek_is(&Token::LParen)? {
            return self.compile_array_assignment(&name);
        }
        self.expect(&Token::Eq)?;
        if let Some((loc, ty)) = self.resolve_var(&name) {
            let value_ty = self.compile_expr()?;
            if !types_equal(&self.heap, ty, value_ty) {
                return Err(ParseError::TypeMismatch);
            }
            self.store_var(&loc, ty);
            return Ok(());
        }
        if self.function.is_some() {
            return Err(ParseError::UnknownIdentifier(name));
        }
        let value_ty = self.compile_expr()?;
        let declared_ty = if name.ends_with('$') { self.common.string } else { value_ty };
        if !types_equal(&self.heap, declared_ty, value_ty) {
            return Err(ParseError::TypeMismatch);
        }
        let loc = self.declare_global_scalar(&name, declared_ty)?;
        self.store_var(&loc, declared_ty);
        Ok(())
    }

    fn compile_array_assignment(&mut self, name: &str) -> Result<(), ParseError> {
        let (load_op, operand, elem_ty) = match self.symtab.resolve(&self.heap, name) {
            Some(Lookup::Global(sym)) => {
                let ty = crate::symtab::symbol_type(&self.heap, sym)?;
                (Opcode::Grefh, sym.raw() as i32, self.array_elem_type(ty)?)
            }
            Some(Lookup::Local(local)) => {
                let ty = crate::symtab::local_type(&self.heap, local)?;
                let offset = crate::symtab::local_offset(&self.heap, local)?;
                (Opcode::Lrefh, offset, self.array_elem_type(ty)?)
            }
            None => return Err(ParseError::UnknownIdentifier(name.to_string())),
        };
        self.emit_operand(load_op, operand);
        self.expect(&Token::LParen)?;
        let idx_ty = self.compile_expr()?;
        self.require_integer(idx_ty)?;
        self.expect(&Token::RParen)?;
        self.expect(&Token::Eq)?;
        let value_ty = self.compile_expr()?;
        if !types_equal(&self.heap, value_ty, elem_ty) {
            return Err(ParseError::TypeMismatch);
        }
        if is_handle_type(&self.heap, elem_ty) {
            self.emit(Opcode::Vseth);
        } else {
            self.emit(Opcode::Vset);
        }
        Ok(())
    }

    fn array_elem_type(&self, ty: Handle) -> Result<Handle, ParseError> {
        match self.heap.type_data(ty)? {
            crate::heap::TypeData::Array(elem) => Ok(*elem),
            _ => Err(ParseError::TypeMismatch),
        }
    }

    // --- DIM -------------------------------------------------------------

    /// `DIM name AS type` or `DIM name(size) AS type` (spec §4.1/§4.4).
    /// Array sizes must be positive integer literals: the backing
    /// vector object is allocated once, here, at compile time (arrays
    /// are fixed-size for the program's whole run), not through any
    /// runtime allocation opcode. Only `INTEGER`/`STRING` element types
    /// are supported; the VM's `VREF`/`VSET` family has no byte-vector
    /// counterpart (see DESIGN.md).
    fn compile_dim(&mut self) -> Result<(), ParseError> {
        self.expect_keyword(Keyword::Dim)?;
        let name = self.expect_identifier()?;
        if self.peek_is(&Token::LParen)? {
            self.next_token()?;
            let size = match self.next_token()? {
                Token::IntegerLiteral(n) if n > 0 => n as usize,
                other => return Err(ParseError::Expected(format!("positive array size literal, found {:?}", other))),
            };
            self.expect(&Token::RParen)?;
            self.expect_keyword(Keyword::As)?;
            let elem_ty = self.parse_type_name()?;
            let array_ty = crate::types::array_of(&mut self.heap, elem_ty)?;
            let array_handle = if types_equal(&self.heap, elem_ty, self.common.string) {
                self.heap.new_string_vector(size)?
            } else if types_equal(&self.heap, elem_ty, self.common.integer) {
                self.heap.new_integer_vector(size)?
            } else {
                return Err(ParseError::TypeMismatch);
            };
            if self.function.is_some() {
                self.alloc_array_local(array_ty, &name, array_handle)?;
            } else {
                let sym = self.symtab.add_global(&mut self.heap, &name, StorageClass::Global, array_ty)?;
                crate::symtab::set_symbol_value(&mut self.heap, sym, crate::heap::SymbolValue::Handle(array_handle))?;
            }
            return Ok(());
        }
        self.expect_keyword(Keyword::As)?;
        let ty = self.parse_type_name()?;
        if self.function.is_some() {
            self.alloc_local(ty, &name, false)?;
        } else {
            let sym = self.symtab.add_global(&mut self.heap, &name, StorageClass::Global, ty)?;
            if is_handle_type(&self.heap, ty) {
                let empty = self.heap.new_string(b"")?;
                crate::symtab::set_symbol_value(&mut self.heap, sym, crate::heap::SymbolValue::Handle(empty))?;
            }
        }
        Ok(())
    }

    fn parse_type_name(&mut self) -> Result<Handle, ParseError> {
        match self.next_token()? {
            Token::Keyword(Keyword::Integer) => Ok(self.common.integer),
            Token::Keyword(Keyword::Byte) => Ok(self.common.byte),
            Token::Keyword(Keyword::String) => Ok(self.common.string),
            other => Err(ParseError::Expected(format!("type name, found {:?}", other))),
        }
    }

    // --- IF / ELSE / ENDIF ----------------------------------------------

    fn compile_if(&mut self) -> Result<(), ParseError> {
        self.expect_keyword(Keyword::If)?;
        let cond_ty = self.compile_expr()?;
        self.require_integer(cond_ty)?;
        self.expect_keyword(Keyword::Then)?;
        let fixup = self.emit_operand(Opcode::Brf, 0);
        self.push_block(Block::If { else_fixup: Some(fixup), end_fixups: Vec::new() });
        Ok(())
    }

    fn compile_else(&mut self) -> Result<(), ParseError> {
        let block = self.pop_block().ok_or_else(|| ParseError::Syntax("ELSE without IF".to_string()))?;
        match block {
            Block::If { else_fixup: Some(fixup), mut end_fixups } => {
                let skip = self.emit_operand(Opcode::Br, 0);
                end_fixups.push(skip);
                let here = self.here() as i32;
                self.patch(fixup, here);
                self.push_block(Block::If { else_fixup: None, end_fixups });
                Ok(())
            }
            Block::If { else_fixup: None, end_fixups } => {
                self.push_block(Block::If { else_fixup: None, end_fixups });
                Err(ParseError::Syntax("multiple ELSE clauses".to_string()))
            }
            other => {
                self.push_block(other);
                Err(ParseError::Syntax("ELSE without IF".to_string()))
            }
        }
    }

    fn compile_end_if(&mut self) -> Result<(), ParseError> {
        let block = self.pop_block().ok_or(ParseError::ExpectingEndIf)?;
        match block {
            Block::If { else_fixup, end_fixups } => {
                let here = self.here() as i32;
                if let Some(fixup) = else_fixup {
                    self.patch(fixup, here);
                }
                for fixup in end_fixups {
                    self.patch(fixup, here);
                }
                Ok(())
            }
            other => {
                self.push_block(other);
                Err(ParseError::ExpectingEndIf)
            }
        }
    }

    // --- FOR / NEXT -------------------------------------------------------

    /// `FOR name = start TO limit [STEP n]` (spec §4.4). The loop
    /// counter is always bound as a frame-local slot, matching
    /// `Block::For`'s frame-relative `var_offset` — at the top level
    /// this is the main program's own frame (`fp == 0` for its whole
    /// run), so the distinction between "local" and "global" storage
    /// doesn't apply to loop counters the way it does to `LET`
    /// targets. `STEP` must be a literal (positive or negative): its
    /// sign decides at compile time whether the loop tests `>` or `<`
    /// against the limit, so a runtime-computed step is not supported.
    fn compile_for(&mut self) -> Result<(), ParseError> {
        self.expect_keyword(Keyword::For)?;
        let name = self.expect_identifier()?;
        let var_offset = self.resolve_or_declare_local_integer(&name)?;
        self.expect(&Token::Eq)?;
        let start_ty = self.compile_expr()?;
        self.require_integer(start_ty)?;
        self.emit_operand(Opcode::Lset, var_offset);
        self.expect_keyword(Keyword::To)?;
        let limit_ty = self.compile_expr()?;
        self.require_integer(limit_ty)?;
        let limit_local = self.alloc_hidden_local()?;
        let limit_offset = crate::symtab::local_offset(&self.heap, limit_local)?;
        self.emit_operand(Opcode::Lset, limit_offset);
        let step = if self.peek_keyword(Keyword::Step)? {
            self.next_token()?;
            self.parse_signed_integer_literal()?
        } else {
            1
        };
        let top = self.here();
        // STEP 0 is documented (spec §8 boundary test) to run the body
        // exactly once regardless of start/limit: there is no value
        // that would ever make the loop-continuation test false, so we
        // skip the test (and, symmetrically, the backward branch in
        // `compile_next`) rather than emit a comparison that can never
        // terminate.
        let test_fixup = if step != 0 {
            self.emit_operand(Opcode::Lref, var_offset);
            self.emit_operand(Opcode::Lref, limit_offset);
            if step > 0 {
                self.emit(Opcode::Gt);
            } else {
                self.emit(Opcode::Lt);
            }
            Some(self.emit_operand(Opcode::Brt, 0))
        } else {
            None
        };
        self.push_block(Block::For { var_offset, step, top, test_fixup });
        Ok(())
    }

    fn compile_next(&mut self) -> Result<(), ParseError> {
        match self.next_token()? {
            Token::Identifier(_) => {}
            other => self.push_back(other),
        }
        let block = self.pop_block().ok_or(ParseError::ExpectingNext)?;
        match block {
            Block::For { var_offset, step, top, test_fixup } => {
                self.emit_operand(Opcode::Lref, var_offset);
                self.emit_operand(Opcode::Lit, step);
                self.emit(Opcode::Add);
                self.emit_operand(Opcode::Lset, var_offset);
                if let Some(test_fixup) = test_fixup {
                    self.emit_operand(Opcode::Br, top as i32);
                    let end = self.here() as i32;
                    self.patch(test_fixup, end);
                }
                Ok(())
            }
            other => {
                self.push_block(other);
                Err(ParseError::ExpectingNext)
            }
        }
    }

    fn resolve_or_declare_local_integer(&mut self, name: &str) -> Result<i32, ParseError> {
        if let Some(Lookup::Local(local)) = self.symtab.resolve(&self.heap, name) {
            let ty = crate::symtab::local_type(&self.heap, local)?;
            self.require_integer(ty)?;
            return Ok(crate::symtab::local_offset(&self.heap, local)?);
        }
        let local = self.alloc_local(self.common.integer, name, false)?;
        Ok(crate::symtab::local_offset(&self.heap, local)?)
    }

    fn alloc_hidden_local(&mut self) -> Result<Handle, ParseError> {
        let name = format!("__for_limit_{}", self.next_hidden_id());
        self.alloc_local(self.common.integer, &name, false)
    }

    fn parse_signed_integer_literal(&mut self) -> Result<i32, ParseError> {
        match self.next_token()? {
            Token::Minus => match self.next_token()? {
                Token::IntegerLiteral(n) => Ok(-n),
                other => Err(ParseError::Expected(format!("integer literal, found {:?}", other))),
            },
            Token::IntegerLiteral(n) => Ok(n),
            other => Err(ParseError::Expected(format!("integer literal, found {:?}", other))),
        }
    }

    fn peek_keyword(&mut self, kw: Keyword) -> Result<bool, ParseError> {
        let tok = self.next_token()?;
        let is_match = matches!(&tok, Token::Keyword(k) if *k == kw);
        self.push_back(tok);
        Ok(is_match)
    }

    // --- DO / LOOP --------------------------------------------------------

    /// `DO [WHILE|UNTIL expr] ... LOOP [WHILE|UNTIL expr]` (spec §4.4):
    /// either the entry test, the exit test, both, or neither may be
    /// present, matching `db_compiler.c`'s `ParseDo`/`ParseLoop`.
    fn compile_do(&mut self) -> Result<(), ParseError> {
        self.expect_keyword(Keyword::Do)?;
        let top = self.here();
        let mut until_fixups = Vec::new();
        let is_pretest = match self.next_token()? {
            Token::Keyword(Keyword::While) => {
                let ty = self.compile_expr()?;
                self.require_integer(ty)?;
                until_fixups.push(self.emit_operand(Opcode::Brf, 0));
                true
            }
            Token::Keyword(Keyword::Until) => {
                let ty = self.compile_expr()?;
                self.require_integer(ty)?;
                until_fixups.push(self.emit_operand(Opcode::Brt, 0));
                true
            }
            other => {
                self.push_back(other);
                false
            }
        };
        self.push_block(Block::Do { top, until_fixups, is_pretest });
        Ok(())
    }

    fn compile_loop(&mut self) -> Result<(), ParseError> {
        let block = self.pop_block().ok_or(ParseError::ExpectingLoop)?;
        match block {
            Block::Do { top, until_fixups, .. } => {
                match self.next_token()? {
                    Token::Keyword(Keyword::While) => {
                        let ty = self.compile_expr()?;
                        self.require_integer(ty)?;
                        self.emit_operand(Opcode::Brt, top as i32);
                    }
                    Token::Keyword(Keyword::Until) => {
                        let ty = self.compile_expr()?;
                        self.require_integer(ty)?;
                        self.emit_operand(Opcode::Brf, top as i32);
                    }
                    other => {
                        self.push_back(other);
                        self.emit_operand(Opcode::Br, top as i32);
                    }
                }
                let end = self.here() as i32;
                for fixup in until_fixups {
                    self.patch(fixup, end);
                }
                Ok(())
            }
            other => {
                self.push_block(other);
                Err(ParseError::ExpectingLoop)
            }
        }
    }

    // --- PRINT -------------------------------------------------------------

    /// `PRINT [expr (","|";" expr)* [";"]]` (spec §4.4/§6). `,` emits a
    /// tab between items; `;` emits nothing. A trailing separator with
    /// nothing after it (including a bare trailing `,`) suppresses the
    /// statement's closing newline — a deliberate simplification over
    /// classic BASIC, where only `;` does that (see DESIGN.md).
    fn compile_print(&mut self) -> Result<(), ParseError> {
        self.expect_keyword(Keyword::Print)?;
        let mut suppress_newline = false;
        loop {
            if self.at_statement_end()? {
                break;
            }
            let ty = self.compile_expr()?;
            self.emit_print_value(ty)?;
            suppress_newline = false;
            match self.next_token()? {
                Token::Comma => {
                    self.emit_print_call("printTab")?;
                    suppress_newline = true;
                }
                Token::Semicolon => {
                    suppress_newline = true;
                }
                other => {
                    self.push_back(other);
                    break;
                }
            }
        }
        if !suppress_newline {
            self.emit_print_call("printNL")?;
        }
        Ok(())
    }

    fn emit_print_value(&mut self, ty: Handle) -> Result<(), ParseError> {
        if types_equal(&self.heap, ty, self.common.string) {
            self.emit_print_call("printStr")
        } else if types_equal(&self.heap, ty, self.common.integer) || types_equal(&self.heap, ty, self.common.byte) {
            self.emit_print_call("printInt")
        } else {
            Err(ParseError::TypeMismatch)
        }
    }

    fn emit_print_call(&mut self, name: &str) -> Result<(), ParseError> {
        self.emit_call_by_name(name)?;
        self.emit_operand(Opcode::Drop, 1);
        Ok(())
    }

    /// Emits a `CALL` to the global intrinsic/host-intrinsic registered
    /// under `name` (`ABS`, `VAL`, `printStr`, `inputLine`, ...),
    /// leaving its return value on whichever stack its signature puts
    /// it on. Used for statement-level calls that aren't reached
    /// through the expression grammar (`expr.rs`'s
    /// `compile_intrinsic_call` handles the expression-position case).
    fn emit_call_by_name(&mut self, name: &str) -> Result<(), ParseError> {
        let sym = self.symtab.find_global(&self.heap, name).ok_or_else(|| ParseError::UnknownIdentifier(name.to_string()))?;
        let callee = match self.heap.symbol(sym)?.value {
            crate::heap::SymbolValue::Handle(h) => h,
            _ => return Err(ParseError::TypeMismatch),
        };
        self.emit_operand(Opcode::Call, callee.raw() as i32);
        Ok(())
    }

    // --- INPUT ---------------------------------------------------------

    /// `INPUT name` (spec §4.4/§6): reads one line via the host, then
    /// either stores it directly (a `STRING` target) or runs it
    /// through `VAL` (an `INTEGER`/`BYTE` target). An undeclared target
    /// is auto-declared the same way `LET` does, defaulting to
    /// `INTEGER` unless the `$` suffix says otherwise (there is no
    /// right-hand side to infer a type from here).
    fn compile_input(&mut self) -> Result<(), ParseError> {
        self.expect_keyword(Keyword::Input)?;
        let name = self.expect_identifier()?;
        let (loc, ty) = match self.resolve_var(&name) {
            Some(pair) => pair,
            None => {
                if self.function.is_some() {
                    return Err(ParseError::UnknownIdentifier(name));
                }
                let ty = if name.ends_with('$') { self.common.string } else { self.common.integer };
                (self.declare_global_scalar(&name, ty)?, ty)
            }
        };
        self.emit_call_by_name("inputLine")?;
        if types_equal(&self.heap, ty, self.common.string) {
            self.store_var(&loc, ty);
        } else if types_equal(&self.heap, ty, self.common.integer) || types_equal(&self.heap, ty, self.common.byte) {
            self.emit_call_by_name("VAL")?;
            self.store_var(&loc, ty);
        } else {
            return Err(ParseError::TypeMismatch);
        }
        Ok(())
    }

    // --- GOTO / GOSUB ----------------------------------------------------

    fn compile_goto(&mut self) -> Result<(), ParseError> {
        self.expect_keyword(Keyword::Goto)?;
        let label = self.expect_identifier()?;
        self.emit_goto(&label);
        Ok(())
    }

    // --- RETURN / FN header ----------------------------------------------

    /// `RETURN expr` (spec §4.3's resolution of the type-agreement
    /// Open Question: a function's every `RETURN` must yield a value
    /// whose type matches its declared return type exactly).
    fn compile_return(&mut self) -> Result<(), ParseError> {
        self.expect_keyword(Keyword::Return)?;
        let ret_ty = self.current_return_type().ok_or_else(|| ParseError::Syntax("RETURN outside FN".to_string()))?;
        if self.at_statement_end()? {
            return Err(ParseError::ReturnTypeMismatch);
        }
        let value_ty = self.compile_expr()?;
        if !types_equal(&self.heap, value_ty, ret_ty) {
            return Err(ParseError::ReturnTypeMismatch);
        }
        if is_handle_type(&self.heap, ret_ty) {
            self.emit(Opcode::Returnh);
        } else {
            self.emit(Opcode::Return);
        }
        Ok(())
    }

    /// `FN name(param AS type, ...) AS type` (spec §4.3). Parameters
    /// become arguments in the new function's frame; their types feed
    /// `record_param_type` so `end_function` can build a real `Function`
    /// type for call-site checking.
    fn compile_fn_header(&mut self) -> Result<(), ParseError> {
        self.expect_keyword(Keyword::Fn)?;
        let name = self.expect_identifier()?;
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        if !self.peek_is(&Token::RParen)? {
            loop {
                let pname = self.expect_identifier()?;
                self.expect_keyword(Keyword::As)?;
                let ty = self.parse_type_name()?;
                params.push((pname, ty));
                match self.next_token()? {
                    Token::Comma => continue,
                    other => {
                        self.push_back(other);
                        break;
                    }
                }
            }
        }
        self.expect(&Token::RParen)?;
        self.expect_keyword(Keyword::As)?;
        let return_type = self.parse_type_name()?;
        self.begin_function(name, return_type)?;
        for (pname, ty) in params {
            self.alloc_local(ty, &pname, true)?;
            self.record_param_type(ty);
        }
        Ok(())
    }

    // --- shared variable resolution --------------------------------------

    fn resolve_var(&mut self, name: &str) -> Option<(VarLoc, Handle)> {
        match self.symtab.resolve(&self.heap, name) {
            Some(Lookup::Global(sym)) => {
                let ty = crate::symtab::symbol_type(&self.heap, sym).ok()?;
                Some((VarLoc::Global(sym), ty))
            }
            Some(Lookup::Local(local)) => {
                let ty = crate::symtab::local_type(&self.heap, local).ok()?;
                let offset = crate::symtab::local_offset(&self.heap, local).ok()?;
                Some((VarLoc::Local(offset), ty))
            }
            None => None,
        }
    }

    fn declare_global_scalar(&mut self, name: &str, ty: Handle) -> Result<VarLoc, ParseError> {
        let sym = self.symtab.add_global(&mut self.heap, name, StorageClass::Global, ty)?;
        if is_handle_type(&self.heap, ty) {
            let empty = self.heap.new_string(b"")?;
            crate::symtab::set_symbol_value(&mut self.heap, sym, crate::heap::SymbolValue::Handle(empty))?;
        }
        Ok(VarLoc::Global(sym))
    }

    fn store_var(&mut self, loc: &VarLoc, ty: Handle) {
        let is_handle = is_handle_type(&self.heap, ty);
        match (loc, is_handle) {
            (VarLoc::Global(sym), true) => {
                self.emit_operand(Opcode::Gseth, sym.raw() as i32);
            }
            (VarLoc::Global(sym), false) => {
                self.emit_operand(Opcode::Gset, sym.raw() as i32);
            }
            (VarLoc::Local(offset), true) => {
                self.emit_operand(Opcode::Lseth, *offset);
            }
            (VarLoc::Local(offset), false) => {
                self.emit_operand(Opcode::Lset, *offset);
            }
        }
    }
}
