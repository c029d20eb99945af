use std::fmt::Write;

use crate::opcode::{op, opcode, special_opcode, Opcode};
use crate::Address;

/// Plain-text listing of `code`, one instruction per line as
/// `"addr: mnemonic op op ..."`. Each label whose address matches an
/// instruction is printed on its own line before it, the first one preceded
/// by a blank line.
///
/// Never fails: illegal opcodes print as `<xx>` and operands running past
/// the end of the buffer are cut short.
pub fn disassemble(code: &[u8], base: Address, labels: &[(String, Address)]) -> String {
    let mut out = String::new();
    let mut offset = 0;

    while offset < code.len() {
        let addr = base + offset as Address;

        let mut first = true;
        for (text, _) in labels.iter().filter(|(_, at)| *at == addr) {
            if first {
                out.push('\n');
                first = false;
            }
            out.push_str(text);
            out.push_str(":\n");
        }

        let op_byte = code[offset];
        offset += 1;

        let (mnemonic, operands) = match opcode(op_byte) {
            Opcode::Fixed { mnemonic, operands } => (mnemonic.to_string(), operands as usize),
            Opcode::Special => {
                // The sub-opcode stands in for the mnemonic.
                match code.get(offset).and_then(|&sub| special_opcode(sub)) {
                    Some((mnemonic, operands)) => {
                        offset += 1;
                        (mnemonic.to_string(), operands as usize)
                    }
                    None => (format!("<{:02x}>", op::SPCAL), 1),
                }
            }
            Opcode::SelfSized { mnemonic } => match code.get(offset) {
                Some(&size) if size >= 1 => (mnemonic.to_string(), size as usize - 1),
                _ => (format!("<{:02x}>", op_byte), 0),
            },
            Opcode::Illegal => (format!("<{:02x}>", op_byte), 0),
        };

        let end = (offset + operands).min(code.len());
        let _ = write!(out, "{:04x}: {}", addr, mnemonic);
        for b in &code[offset..end] {
            let _ = write!(out, " {:02x}", b);
        }
        out.push('\n');

        offset = end;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_listing() {
        let code = [op::MES, 0x01, 0x02, op::RET];
        assert_eq!(disassemble(&code, 0x100, &[]), "0100: mes 01 02\n0103: ret\n");
    }

    #[test]
    fn labels_are_grouped_before_their_instruction() {
        let code = [op::NOP, op::RET];
        let labels = vec![
            ("main".to_string(), 0x21),
            ("init".to_string(), 0x20),
            ("also_main".to_string(), 0x21),
        ];
        assert_eq!(
            disassemble(&code, 0x20, &labels),
            "\ninit:\n0020: wait\n\nmain:\nalso_main:\n0021: ret\n"
        );
    }

    #[test]
    fn spcal_prints_the_sub_opcode_mnemonic() {
        let code = [op::SPCAL, 0xFD, 0x05, 0x06, op::SPCAL, 0x42, op::RET];
        assert_eq!(
            disassemble(&code, 0, &[]),
            "0000: spcnm 05 06\n0004: <0f> 42\n0006: ret\n"
        );
    }

    #[test]
    fn kawai_operands_include_the_size_byte() {
        let code = [op::KAWAI, 0x04, 0xAA, 0xBB, op::RET];
        assert_eq!(disassemble(&code, 0, &[]), "0000: kawai 04 aa bb\n0004: ret\n");
    }

    #[test]
    fn illegal_and_truncated_never_fail() {
        let code = [0x1C, op::MES, 0x01];
        assert_eq!(disassemble(&code, 0, &[]), "0000: <1c>\n0001: mes 01\n");
    }
}
