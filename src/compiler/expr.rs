//! Expression compiling: precedence-climbing recursive descent that
//! emits bytecode directly, no intermediate tree (spec §4.3), mirrored
//! on `db_compiler.c`'s `ParseExpr`/`ParseExpr2`.../`ParsePrimary`
//! chain of precedence levels.

use super::Compiler;
use crate::error::ParseError;
use crate::heap::Handle;
use crate::intrinsics::{host_library, standard_library};
use crate::opcode::Opcode;
use crate::scanner::{Keyword, Token};
use crate::symtab::Lookup;
use crate::types::{is_handle_type, types_equal};

impl Compiler {
    /// Entry point: the lowest-precedence level, `OR`/`AND`.
    pub(super) fn compile_expr(&mut self) -> Result<Handle, ParseError> {
        self.compile_or()
    }

    fn compile_or(&mut self) -> Result<Handle, ParseError> {
        let mut ty = self.compile_and()?;
        loop {
            match self.next_token()? {
                Token::Keyword(Keyword::Or) => {
                    self.require_integer(ty)?;
                    let fixup = self.emit_operand(Opcode::Brtsc, 0);
                    let rhs = self.compile_and()?;
                    self.require_integer(rhs)?;
                    let end = self.here() as i32;
                    self.patch(fixup, end);
                    ty = self.common.integer;
                }
                other => {
                    self.push_back(other);
                    return Ok(ty);
                }
            }
        }
    }

    fn compile_and(&mut self) -> Result<Handle, ParseError> {
        let mut ty = self.compile_not()?;
        loop {
            match self.next_token()? {
                Token::Keyword(Keyword::And) => {
                    self.require_integer(ty)?;
                    let fixup = self.emit_operand(Opcode::Brfsc, 0);
                    let rhs = self.compile_not()?;
                    self.require_integer(rhs)?;
                    let end = self.here() as i32;
                    self.patch(fixup, end);
                    ty = self.common.integer;
                }
                other => {
                    self.push_back(other);
                    return Ok(ty);
                }
            }
        }
    }

    fn compile_not(&mut self) -> Result<Handle, ParseError> {
        match self.next_token()? {
            Token::Not => {
                let ty = self.compile_not()?;
                self.require_integer(ty)?;
                self.emit_operand(Opcode::Lit, 0);
                self.emit(Opcode::Eq);
                Ok(self.common.integer)
            }
            other => {
                self.push_back(other);
                self.compile_comparison()
            }
        }
    }

    fn compile_comparison(&mut self) -> Result<Handle, ParseError> {
        let lhs_ty = self.compile_additive()?;
        let op = match self.next_token()? {
            Token::Eq => Some(Opcode::Eq),
            Token::Ne => Some(Opcode::Ne),
            Token::Lt => Some(Opcode::Lt),
            Token::Le => Some(Opcode::Le),
            Token::Gt => Some(Opcode::Gt),
            Token::Ge => Some(Opcode::Ge),
            other => {
                self.push_back(other);
                None
            }
        };
        match op {
            None => Ok(lhs_ty),
            Some(opcode) => {
                let rhs_ty = self.compile_additive()?;
                if !types_equal(&self.heap, lhs_ty, rhs_ty) {
                    return Err(ParseError::TypeMismatch);
                }
                if is_handle_type(&self.heap, lhs_ty) && opcode != Opcode::Eq && opcode != Opcode::Ne {
                    return Err(ParseError::TypeMismatch);
                }
                self.emit(opcode);
                Ok(self.common.integer)
            }
        }
    }

    fn compile_additive(&mut self) -> Result<Handle, ParseError> {
        let mut ty = self.compile_multiplicative()?;
        loop {
            match self.next_token()? {
                Token::Plus => {
                    let rhs = self.compile_multiplicative()?;
                    if is_handle_type(&self.heap, ty) || is_handle_type(&self.heap, rhs) {
                        if !types_equal(&self.heap, ty, self.common.string) || !types_equal(&self.heap, rhs, self.common.string) {
                            return Err(ParseError::TypeMismatch);
                        }
                        self.emit(Opcode::Cat);
                        ty = self.common.string;
                    } else {
                        self.emit(Opcode::Add);
                    }
                }
                Token::Minus => {
                    self.require_integer(ty)?;
                    let rhs = self.compile_multiplicative()?;
                    self.require_integer(rhs)?;
                    self.emit(Opcode::Sub);
                }
                Token::Amp => {
                    self.require_integer(ty)?;
                    let rhs = self.compile_multiplicative()?;
                    self.require_integer(rhs)?;
                    self.emit(Opcode::Band);
                }
                Token::Pipe2 => {
                    self.require_integer(ty)?;
                    let rhs = self.compile_multiplicative()?;
                    self.require_integer(rhs)?;
                    self.emit(Opcode::Bor);
                }
                other => {
                    self.push_back(other);
                    return Ok(ty);
                }
            }
        }
    }

    fn compile_multiplicative(&mut self) -> Result<Handle, ParseError> {
        let mut ty = self.compile_unary()?;
        loop {
            let op = match self.next_token()? {
                Token::Star => Some(Opcode::Mul),
                Token::Slash => Some(Opcode::Div),
                Token::Percent => Some(Opcode::Rem),
                Token::Keyword(Keyword::Mod) => Some(Opcode::Rem),
                other => {
                    self.push_back(other);
                    None
                }
            };
            match op {
                None => return Ok(ty),
                Some(opcode) => {
                    self.require_integer(ty)?;
                    let rhs = self.compile_unary()?;
                    self.require_integer(rhs)?;
                    self.emit(opcode);
                }
            }
        }
    }

    fn compile_unary(&mut self) -> Result<Handle, ParseError> {
        match self.next_token()? {
            Token::Minus => {
                let ty = self.compile_unary()?;
                self.require_integer(ty)?;
                self.emit(Opcode::Neg);
                Ok(ty)
            }
            other => {
                self.push_back(other);
                self.compile_primary()
            }
        }
    }

    fn compile_primary(&mut self) -> Result<Handle, ParseError> {
        match self.next_token()? {
            Token::IntegerLiteral(v) => {
                self.emit_operand(Opcode::Lit, v);
                Ok(self.common.integer)
            }
            Token::StringLiteral(s) => {
                let h = self.heap.new_string(s.as_bytes())?;
                self.emit_operand(Opcode::Lith, h.raw() as i32);
                Ok(self.common.string)
            }
            Token::LParen => {
                let ty = self.compile_expr()?;
                self.expect(&Token::RParen)?;
                Ok(ty)
            }
            Token::Identifier(name) => self.compile_identifier_expr(&name),
            other => Err(ParseError::Expected(format!("expression, found {:?}", other))),
        }
    }

    fn compile_identifier_expr(&mut self, name: &str) -> Result<Handle, ParseError> {
        if self.peek_is(&Token::LParen)? {
            return self.compile_call_or_index(name);
        }
        self.compile_variable_load(name)
    }

    pub(super) fn peek_is(&mut self, want: &Token) -> Result<bool, ParseError> {
        let tok = self.next_token()?;
        let matches = &tok == want;
        self.push_back(tok);
        Ok(matches)
    }

    fn compile_variable_load(&mut self, name: &str) -> Result<Handle, ParseError> {
        match self.symtab.resolve(&self.heap, name) {
            Some(Lookup::Global(sym)) => {
                let ty = crate::symtab::symbol_type(&self.heap, sym)?;
                if is_handle_type(&self.heap, ty) {
                    self.emit_operand(Opcode::Grefh, sym.raw() as i32);
                } else {
                    self.emit_operand(Opcode::Greg, sym.raw() as i32);
                }
                Ok(ty)
            }
            Some(Lookup::Local(local)) => {
                let ty = crate::symtab::local_type(&self.heap, local)?;
                let offset = crate::symtab::local_offset(&self.heap, local)?;
                if is_handle_type(&self.heap, ty) {
                    self.emit_operand(Opcode::Lrefh, offset);
                } else {
                    self.emit_operand(Opcode::Lref, offset);
                }
                Ok(ty)
            }
            None => Err(ParseError::UnknownIdentifier(name.to_string())),
        }
    }

    /// `name(...)`: either an array index or an intrinsic/user
    /// function call, disambiguated by what `name` resolves to (spec
    /// §4.3: arrays and functions share call syntax).
    fn compile_call_or_index(&mut self, name: &str) -> Result<Handle, ParseError> {
        if let Some(def) = standard_library().into_iter().find(|d| d.name.eq_ignore_ascii_case(name)) {
            return self.compile_intrinsic_call(name, &def.signature);
        }
        if let Some(def) = host_library().into_iter().find(|d| d.name.eq_ignore_ascii_case(name)) {
            return self.compile_intrinsic_call(name, &def.signature);
        }
        match self.symtab.resolve(&self.heap, name) {
            Some(Lookup::Global(sym)) => {
                let ty = crate::symtab::symbol_type(&self.heap, sym)?;
                if let Ok(crate::heap::TypeData::Array(elem)) = self.heap.type_data(ty).map(|t| t.clone()) {
                    return self.compile_array_index(Opcode::Grefh, sym.raw() as i32, elem);
                }
                self.compile_user_call(sym, ty)
            }
            Some(Lookup::Local(local)) => {
                let ty = crate::symtab::local_type(&self.heap, local)?;
                let offset = crate::symtab::local_offset(&self.heap, local)?;
                if let Ok(crate::heap::TypeData::Array(elem)) = self.heap.type_data(ty).map(|t| t.clone()) {
                    return self.compile_array_index(Opcode::Lrefh, offset, elem);
                }
                Err(ParseError::TypeMismatch)
            }
            None => Err(ParseError::UnknownIdentifier(name.to_string())),
        }
    }

    fn compile_array_index(&mut self, load_op: Opcode, operand: i32, elem_type: Handle) -> Result<Handle, ParseError> {
        self.emit_operand(load_op, operand);
        self.expect(&Token::LParen)?;
        let idx_ty = self.compile_expr()?;
        self.require_integer(idx_ty)?;
        self.expect(&Token::RParen)?;
        if is_handle_type(&self.heap, elem_type) {
            self.emit(Opcode::Vrefh);
        } else {
            self.emit(Opcode::Vref);
        }
        Ok(elem_type)
    }

    fn compile_user_call(&mut self, sym: Handle, fn_type: Handle) -> Result<Handle, ParseError> {
        let (param_types, return_type) = match self.heap.type_data(fn_type)? {
            crate::heap::TypeData::Function { arguments, return_type } => (arguments.clone(), *return_type),
            _ => return Err(ParseError::TypeMismatch),
        };
        let code_handle = match self.heap.symbol(sym)?.value {
            crate::heap::SymbolValue::Handle(h) => h,
            _ => return Err(ParseError::TypeMismatch),
        };
        self.expect(&Token::LParen)?;
        let mut arg_count = 0;
        if !self.peek_is(&Token::RParen)? {
            loop {
                let arg_ty = self.compile_expr()?;
                if let Some(&want) = param_types.get(arg_count) {
                    if !types_equal(&self.heap, arg_ty, want) {
                        return Err(ParseError::TypeMismatch);
                    }
                }
                arg_count += 1;
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
        if arg_count != param_types.len() {
            return Err(ParseError::ArgumentCount);
        }
        self.emit_operand(Opcode::Call, code_handle.raw() as i32);
        Ok(return_type)
    }

    fn compile_intrinsic_call(&mut self, name: &str, signature: &str) -> Result<Handle, ParseError> {
        let sym = self.symtab.find_global(&self.heap, name).ok_or_else(|| ParseError::UnknownIdentifier(name.to_string()))?;
        let callee = match self.heap.symbol(sym)?.value {
            crate::heap::SymbolValue::Handle(h) => h,
            _ => return Err(ParseError::TypeMismatch),
        };
        self.expect(&Token::LParen)?;
        let mut parts = signature.splitn(2, '=');
        let return_char = parts.next().and_then(|s| s.chars().next()).unwrap_or('i');
        let arg_chars: Vec<char> = parts.next().map(|s| s.chars().collect()).unwrap_or_default();
        for (i, &c) in arg_chars.iter().enumerate() {
            if i > 0 {
                self.expect(&Token::Comma)?;
            }
            let ty = self.compile_expr()?;
            let wants_handle = c == 's' || c == '#';
            if wants_handle != is_handle_type(&self.heap, ty) {
                return Err(ParseError::TypeMismatch);
            }
        }
        self.expect(&Token::RParen)?;
        self.emit_operand(Opcode::Call, callee.raw() as i32);
        Ok(if return_char == 's' || return_char == '#' { self.common.string } else { self.common.integer })
    }

    pub(super) fn require_integer(&self, ty: Handle) -> Result<(), ParseError> {
        if types_equal(&self.heap, ty, self.common.integer) || types_equal(&self.heap, ty, self.common.byte) {
            Ok(())
        } else {
            Err(ParseError::TypeMismatch)
        }
    }
}
