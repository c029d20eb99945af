use serde::Serialize;

use crate::opcode::{op, opcode, special_opcode, Opcode};
use crate::{Result, ScriptError};

/// One decoded script instruction. `offset` is relative to the start of the
/// script code buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: u8,
    pub mnemonic: &'static str,
    /// Operand bytes following the opcode. For SPCAL the first one is the
    /// sub-opcode, for KAWAI the size byte.
    pub operands: Vec<u8>,
}

/// How control leaves an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Exit,
    /// Unconditional jump to the given code offset.
    Jump(usize),
    /// Conditional branch: the given code offset or the next instruction.
    Branch(usize),
    Next,
}

fn nearby_bytes(code: &[u8], offset: usize) -> Vec<u8> {
    let end = (offset + 8).min(code.len());
    code.get(offset..end).map(<[u8]>::to_vec).unwrap_or_default()
}

/// Decode the instruction at `offset` of the script code.
pub fn decode(code: &[u8], offset: usize) -> Result<Instruction> {
    let available = code.len().saturating_sub(offset);
    let op_byte = match code.get(offset) {
        Some(&b) => b,
        None => {
            return Err(ScriptError::ControlFlowOverrun {
                offset,
                target: offset as i64,
            })
        }
    };

    let (mnemonic, size) = match opcode(op_byte) {
        Opcode::Fixed { mnemonic, operands } => (mnemonic, operands as usize + 1),
        Opcode::Special => {
            let sub = *code.get(offset + 1).ok_or(ScriptError::Truncated {
                offset,
                opcode: op_byte,
                needed: 2,
                available,
            })?;
            match special_opcode(sub) {
                Some((mnemonic, operands)) => (mnemonic, operands as usize + 2),
                None => {
                    return Err(ScriptError::UnknownSubOpcode {
                        offset,
                        sub_opcode: sub,
                    })
                }
            }
        }
        Opcode::SelfSized { mnemonic } => {
            // The size byte counts the opcode byte too.
            let size = code.get(offset + 1).copied().unwrap_or(0) as usize;
            if size < 2 || size > available {
                return Err(ScriptError::MalformedSize {
                    offset,
                    size,
                    available,
                });
            }
            (mnemonic, size)
        }
        Opcode::Illegal => {
            return Err(ScriptError::UnknownOpcode {
                offset,
                opcode: op_byte,
                context: nearby_bytes(code, offset),
            })
        }
    };

    if size > available {
        return Err(ScriptError::Truncated {
            offset,
            opcode: op_byte,
            needed: size,
            available,
        });
    }

    Ok(Instruction {
        offset,
        opcode: op_byte,
        mnemonic,
        operands: code[offset + 1..offset + size].to_vec(),
    })
}

/// Jump target of the instruction at `offset`, if it is a jump or branch.
pub fn target_offset(code: &[u8], offset: usize) -> Result<Option<usize>> {
    decode(code, offset)?.target()
}

impl Instruction {
    pub fn size(&self) -> usize {
        1 + self.operands.len()
    }

    pub fn next_offset(&self) -> usize {
        self.offset + self.size()
    }

    /// Key used by instruction filters: the opcode, or `0x0F00 | sub` for
    /// SPCAL instructions.
    pub fn filter_key(&self) -> u16 {
        if self.opcode == op::SPCAL {
            ((self.opcode as u16) << 8) | self.operands[0] as u16
        } else {
            self.opcode as u16
        }
    }

    pub fn is_exit(&self) -> bool {
        matches!(self.opcode, op::RET | op::RETTO | op::GMOVR)
    }

    pub fn is_jump(&self) -> bool {
        matches!(self.opcode, op::SKIP | op::LSKIP | op::BACK | op::LBACK)
    }

    pub fn is_branch(&self) -> bool {
        matches!(
            self.opcode,
            op::IF
                | op::LIF
                | op::IF2
                | op::LIF2
                | op::IF2U
                | op::LIF2U
                | op::KEYQ
                | op::KEYON
                | op::KEYOFF
                | op::PRTYQ
                | op::MEMBQ
        )
    }

    fn operand_u8(&self, at: usize) -> usize {
        self.operands[at] as usize
    }

    fn operand_u16(&self, at: usize) -> usize {
        u16::from_le_bytes([self.operands[at], self.operands[at + 1]]) as usize
    }

    /// Jump target as a code offset. Displacements are counted from the
    /// position of the displacement field; BACK/LBACK count from the opcode.
    pub fn target(&self) -> Result<Option<usize>> {
        let off = self.offset;
        let forward = match self.opcode {
            op::SKIP => Some(self.operand_u8(0) + 1),
            op::LSKIP => Some(self.operand_u16(0) + 1),
            op::IF => Some(self.operand_u8(4) + 5),
            op::LIF => Some(self.operand_u16(4) + 5),
            op::IF2 | op::IF2U => Some(self.operand_u8(6) + 7),
            op::LIF2 | op::LIF2U => Some(self.operand_u16(6) + 7),
            op::KEYQ | op::KEYON | op::KEYOFF => Some(self.operand_u8(2) + 3),
            op::PRTYQ | op::MEMBQ => Some(self.operand_u8(1) + 2),
            _ => None,
        };
        if let Some(delta) = forward {
            return Ok(Some(off + delta));
        }

        let backward = match self.opcode {
            op::BACK => self.operand_u8(0),
            op::LBACK => self.operand_u16(0),
            _ => return Ok(None),
        };
        off.checked_sub(backward)
            .map(Some)
            .ok_or(ScriptError::ControlFlowOverrun {
                offset: off,
                target: off as i64 - backward as i64,
            })
    }

    pub fn flow(&self) -> Result<Flow> {
        if self.is_exit() {
            return Ok(Flow::Exit);
        }
        match self.target()? {
            Some(t) if self.is_jump() => Ok(Flow::Jump(t)),
            Some(t) => Ok(Flow::Branch(t)),
            None => Ok(Flow::Next),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_instruction_is_one_byte() {
        let insn = decode(&[op::RET], 0).unwrap();
        assert_eq!(insn.size(), 1);
        assert!(insn.is_exit());
        assert_eq!(insn.flow().unwrap(), Flow::Exit);

        let gmovr = decode(&[op::GMOVR], 0).unwrap();
        assert_eq!(gmovr.flow().unwrap(), Flow::Exit);
    }

    #[test]
    fn spcal_size_is_sub_operands_plus_two() {
        // SPCNM has two operand bytes.
        let code = [op::SPCAL, 0xFD, 0x01, 0x02, op::RET];
        let insn = decode(&code, 0).unwrap();
        assert_eq!(insn.size(), 4);
        assert_eq!(insn.mnemonic, "spcnm");
        assert_eq!(insn.filter_key(), op::SPCNM);

        let code = [op::SPCAL, 0xF9];
        assert_eq!(decode(&code, 0).unwrap().size(), 2);
    }

    #[test]
    fn unknown_spcal_sub_opcode() {
        let err = decode(&[op::SPCAL, 0x10], 0).unwrap_err();
        assert!(matches!(err, ScriptError::UnknownSubOpcode { offset: 0, sub_opcode: 0x10 }));
    }

    #[test]
    fn kawai_size_includes_opcode() {
        let code = [op::KAWAI, 0x05, 0x00, 0x01, 0x02, op::RET];
        let insn = decode(&code, 0).unwrap();
        assert_eq!(insn.size(), 5);
        assert_eq!(insn.operands, vec![0x05, 0x00, 0x01, 0x02]);
    }

    #[test]
    fn kawai_size_past_end_is_malformed() {
        let code = [op::KAWAI, 0x09, 0x00];
        assert!(matches!(
            decode(&code, 0),
            Err(ScriptError::MalformedSize { size: 9, available: 3, .. })
        ));
        assert!(matches!(
            decode(&[op::KAWAI, 0x00], 0),
            Err(ScriptError::MalformedSize { size: 0, .. })
        ));
    }

    #[test]
    fn illegal_opcode_reports_context() {
        let code = [op::NOP, 0x1C, 0xAA, 0xBB];
        match decode(&code, 1) {
            Err(ScriptError::UnknownOpcode {
                offset,
                opcode,
                context,
            }) => {
                assert_eq!(offset, 1);
                assert_eq!(opcode, 0x1C);
                assert_eq!(context, vec![0x1C, 0xAA, 0xBB]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn truncated_fixed_instruction() {
        // MES needs three bytes.
        assert!(matches!(
            decode(&[op::MES, 0x00], 0),
            Err(ScriptError::Truncated { needed: 3, available: 2, .. })
        ));
    }

    #[test]
    fn short_forward_jump_target() {
        let code = [op::SKIP, 0x02, op::RET];
        let base = 0x100usize;
        let target = target_offset(&code, 0).unwrap().unwrap();
        assert_eq!(base + target, 0x103);
    }

    #[test]
    fn long_and_backward_targets() {
        let code = [op::NOP, op::NOP, op::LSKIP, 0x10, 0x01];
        assert_eq!(target_offset(&code, 2).unwrap(), Some(2 + 0x0110 + 1));

        let code = [op::NOP, op::NOP, op::NOP, op::BACK, 0x03];
        assert_eq!(target_offset(&code, 3).unwrap(), Some(0));

        let code = [op::NOP, op::LBACK, 0x01, 0x00];
        assert_eq!(target_offset(&code, 1).unwrap(), Some(0));
    }

    #[test]
    fn backward_jump_before_start_overruns() {
        let code = [op::BACK, 0x04];
        assert!(matches!(
            target_offset(&code, 0),
            Err(ScriptError::ControlFlowOverrun { .. })
        ));
    }

    #[test]
    fn conditional_targets() {
        // IF: banks, lhs, rhs, op, skip
        let code = [op::IF, 0x00, 0x01, 0x02, 0x00, 0x03];
        let insn = decode(&code, 0).unwrap();
        assert_eq!(insn.flow().unwrap(), Flow::Branch(5 + 3));

        let code = [op::LIF2U, 0, 0, 0, 0, 0, 0, 0x00, 0x01];
        assert_eq!(target_offset(&code, 0).unwrap(), Some(7 + 0x100));

        let code = [op::KEYON, 0x00, 0x00, 0x04];
        assert_eq!(target_offset(&code, 0).unwrap(), Some(3 + 4));

        let code = [op::MEMBQ, 0x01, 0x02];
        assert_eq!(target_offset(&code, 0).unwrap(), Some(2 + 2));
    }

    #[test]
    fn plain_instruction_falls_through() {
        let code = [op::MES, 0x00, 0x05];
        let insn = decode(&code, 0).unwrap();
        assert_eq!(insn.flow().unwrap(), Flow::Next);
        assert_eq!(insn.target().unwrap(), None);
        assert_eq!(insn.next_offset(), 3);
    }
}
