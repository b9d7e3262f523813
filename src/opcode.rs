//! Bytecode opcodes and their on-the-wire encoding (spec §4.5/§6).
//!
//! Every opcode is one byte; a subset carry a little-endian `i32`
//! operand (branch targets, literals, frame offsets, global/local
//! indices). `Opcode` mirrors the teacher's `vm.rs::Opcode` in shape
//! (a flat enum the VM matches on in its dispatch loop) but the
//! variant set and operand layout come from spec §4.5's table, not
//! from the teacher's stack-machine ISA.

use crate::error::RuntimeAbort;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Opcode {
    Br,
    Brt,
    Brf,
    Brtsc,
    Brfsc,
    Neg,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Bnot,
    Band,
    Bor,
    Bxor,
    Shl,
    Shr,
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
    Cat,
    Lit,
    Greg,
    Gset,
    Lref,
    Lset,
    Vref,
    Vset,
    Lith,
    Grefh,
    Gseth,
    Lrefh,
    Lseth,
    Vrefh,
    Vseth,
    Reserve,
    Call,
    Return,
    Returnh,
    Returnv,
    Drop,
    Halt,
}

impl Opcode {
    /// Whether this opcode is followed by a 4-byte little-endian
    /// operand in the instruction stream (spec §6).
    pub fn has_operand(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Br | Brt | Brf | Brtsc | Brfsc | Lit | Greg | Gset | Lref | Lset | Vref | Vset
                | Lith | Grefh | Gseth | Lrefh | Lseth | Vrefh | Vseth | Reserve | Call | Drop
        )
    }

    fn from_byte(byte: u8) -> Option<Opcode> {
        use Opcode::*;
        Some(match byte {
            0 => Br,
            1 => Brt,
            2 => Brf,
            3 => Brtsc,
            4 => Brfsc,
            5 => Neg,
            6 => Add,
            7 => Sub,
            8 => Mul,
            9 => Div,
            10 => Rem,
            11 => Bnot,
            12 => Band,
            13 => Bor,
            14 => Bxor,
            15 => Shl,
            16 => Shr,
            17 => Lt,
            18 => Le,
            19 => Eq,
            20 => Ne,
            21 => Ge,
            22 => Gt,
            23 => Cat,
            24 => Lit,
            25 => Greg,
            26 => Gset,
            27 => Lref,
            28 => Lset,
            29 => Vref,
            30 => Vset,
            31 => Lith,
            32 => Grefh,
            33 => Gseth,
            34 => Lrefh,
            35 => Lseth,
            36 => Vrefh,
            37 => Vseth,
            38 => Reserve,
            39 => Call,
            40 => Return,
            41 => Returnh,
            42 => Returnv,
            43 => Drop,
            44 => Halt,
            _ => return None,
        })
    }

    fn to_byte(self) -> u8 {
        use Opcode::*;
        match self {
            Br => 0,
            Brt => 1,
            Brf => 2,
            Brtsc => 3,
            Brfsc => 4,
            Neg => 5,
            Add => 6,
            Sub => 7,
            Mul => 8,
            Div => 9,
            Rem => 10,
            Bnot => 11,
            Band => 12,
            Bor => 13,
            Bxor => 14,
            Shl => 15,
            Shr => 16,
            Lt => 17,
            Le => 18,
            Eq => 19,
            Ne => 20,
            Ge => 21,
            Gt => 22,
            Cat => 23,
            Lit => 24,
            Greg => 25,
            Gset => 26,
            Lref => 27,
            Lset => 28,
            Vref => 29,
            Vset => 30,
            Lith => 31,
            Grefh => 32,
            Gseth => 33,
            Lrefh => 34,
            Lseth => 35,
            Vrefh => 36,
            Vseth => 37,
            Reserve => 38,
            Call => 39,
            Return => 40,
            Returnh => 41,
            Returnv => 42,
            Drop => 43,
            Halt => 44,
        }
    }
}

/// One decoded instruction: its opcode plus operand, if any.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: i32,
}

/// Appends `op` (with no operand) to `code`.
pub fn emit(code: &mut Vec<u8>, op: Opcode) {
    code.push(op.to_byte());
}

/// Appends `op` followed by its little-endian `i32` operand.
pub fn emit_operand(code: &mut Vec<u8>, op: Opcode, operand: i32) {
    code.push(op.to_byte());
    code.extend_from_slice(&operand.to_le_bytes());
}

/// Patches a previously emitted operand in place (used to resolve
/// forward branches once their target address is known — spec §4.4's
/// fixup chains).
pub fn patch_operand(code: &mut [u8], at: usize, operand: i32) {
    code[at..at + 4].copy_from_slice(&operand.to_le_bytes());
}

/// Decodes the instruction at `pc`, returning it plus the address of
/// the next instruction.
pub fn decode(code: &[u8], pc: usize) -> Result<(Instruction, usize), RuntimeAbort> {
    let byte = *code.get(pc).ok_or(RuntimeAbort::Opcode(0))?;
    let opcode = Opcode::from_byte(byte).ok_or(RuntimeAbort::Opcode(byte))?;
    if opcode.has_operand() {
        let bytes: [u8; 4] = code
            .get(pc + 1..pc + 5)
            .and_then(|s| s.try_into().ok())
            .ok_or(RuntimeAbort::Opcode(byte))?;
        let operand = i32::from_le_bytes(bytes);
        Ok((Instruction { opcode, operand }, pc + 5))
    } else {
        Ok((Instruction { opcode, operand: 0 }, pc + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_operand_free_opcode() {
        let mut code = Vec::new();
        emit(&mut code, Opcode::Halt);
        let (instr, next) = decode(&code, 0).unwrap();
        assert_eq!(instr.opcode, Opcode::Halt);
        assert_eq!(next, 1);
    }

    #[test]
    fn round_trips_operand_opcode() {
        let mut code = Vec::new();
        emit_operand(&mut code, Opcode::Lit, -7);
        let (instr, next) = decode(&code, 0).unwrap();
        assert_eq!(instr.opcode, Opcode::Lit);
        assert_eq!(instr.operand, -7);
        assert_eq!(next, 5);
    }

    #[test]
    fn patch_operand_rewrites_branch_target() {
        let mut code = Vec::new();
        emit_operand(&mut code, Opcode::Br, 0);
        patch_operand(&mut code, 1, 42);
        let (instr, _) = decode(&code, 0).unwrap();
        assert_eq!(instr.operand, 42);
    }

    #[test]
    fn unknown_opcode_byte_is_reported() {
        let code = vec![255];
        assert!(decode(&code, 0).is_err());
    }
}
