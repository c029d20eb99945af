// Test doubles for the external codecs plus small section and graph
// builders.

use crate::cfg::{BasicBlock, ControlFlowGraph};
use crate::{Address, Compressor, Result, ScriptError, TextCodec};

/// Leaves data untouched.
pub(crate) struct StoredCompressor;

impl Compressor for StoredCompressor {
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Printable ASCII only: the field charset starts at 0x20 (space = 0x00)
/// and strings end with 0xFF.
pub(crate) struct AsciiFieldText;

impl TextCodec for AsciiFieldText {
    fn decode(&self, data: &[u8], _japanese: bool) -> Result<String> {
        let mut out = String::with_capacity(data.len());
        for &b in data {
            if b == 0xFF {
                break;
            }
            if b > 0x5E {
                return Err(ScriptError::Codec(format!("unsupported field character {:#04x}", b)));
            }
            out.push((b + 0x20) as char);
        }
        Ok(out)
    }

    fn encode(&self, text: &str, _japanese: bool) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(text.len() + 1);
        for ch in text.chars() {
            let c = if ch.is_ascii() { ch as u8 } else { b'?' };
            let code = if (0x20..=0x7E).contains(&c) {
                c - 0x20
            } else {
                b'?' - 0x20
            };
            out.push(code);
        }
        out.push(0xFF);
        Ok(out)
    }
}

/// Graph with one single-instruction block per entry.
pub(crate) fn graph_of(edges: &[(Address, Vec<Address>)]) -> ControlFlowGraph {
    let mut graph = ControlFlowGraph::default();
    for (addr, succ) in edges {
        graph.blocks.insert(
            *addr,
            BasicBlock {
                instructions: vec![*addr],
                successors: succ.iter().copied().collect(),
            },
        );
    }
    graph
}

/// Script base of a section built by [`event_bytes`]: header, one actor
/// name and one script table.
pub(crate) const SCRIPT_BASE: Address = 32 + 8 + 64;

/// Event section with one actor, no strings and no extra blocks. Unused
/// script slots repeat the last given one.
pub(crate) fn event_bytes(code: &[u8], slots: &[u16]) -> Vec<u8> {
    let string_table = SCRIPT_BASE as usize + code.len();

    let mut data = vec![0u8; 32];
    data[0..2].copy_from_slice(&0x0502u16.to_le_bytes());
    data[2] = 1;
    data[4..6].copy_from_slice(&(string_table as u16).to_le_bytes());
    data.extend_from_slice(b"actor\0\0\0");

    let last = slots.last().copied().unwrap_or(SCRIPT_BASE as u16);
    for slot in 0..32 {
        let entry = slots.get(slot).copied().unwrap_or(last);
        data.extend_from_slice(&entry.to_le_bytes());
    }

    data.extend_from_slice(code);
    // Empty string table: count 0, first offset right after the count.
    data.extend_from_slice(&[0x00, 0x00, 0x02, 0x00]);
    data
}
