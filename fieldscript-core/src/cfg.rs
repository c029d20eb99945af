use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::instruction::{decode, Flow};
use crate::{Address, Result, ScriptError};

/// Basic block of the control flow graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BasicBlock {
    /// Addresses of the instructions making up the block.
    pub instructions: Vec<Address>,
    /// Addresses of succeeding blocks: none for exit blocks, one for
    /// sequential flow or jumps, two (or more after reduction) for branches.
    pub successors: BTreeSet<Address>,
}

impl BasicBlock {
    pub fn is_terminal(&self) -> bool {
        self.successors.is_empty()
    }
}

/// Control flow graph keyed by block leader address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ControlFlowGraph {
    pub base_address: Address,
    pub blocks: BTreeMap<Address, BasicBlock>,
}

impl ControlFlowGraph {
    pub fn get(&self, address: Address) -> Option<&BasicBlock> {
        self.blocks.get(&address)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Offset of an address within the script code.
    pub fn offset_of(&self, address: Address) -> Option<usize> {
        address.checked_sub(self.base_address).map(|o| o as usize)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn to_address(base: Address, offset: usize) -> Address {
    base + offset as Address
}

/// Build the control flow graph of a script code block whose first byte
/// sits at `base` within the event section.
pub fn build_cfg<I>(code: &[u8], base: Address, entries: I) -> Result<ControlFlowGraph>
where
    I: IntoIterator<Item = Address>,
{
    let mut leaders: BTreeSet<Address> = entries.into_iter().collect();

    // Linear sweep: exits end a block, jumps and branches end one and start
    // one at their target.
    let mut offset = 0usize;
    while offset < code.len() {
        let insn = decode(code, offset)?;
        let next = insn.next_offset();

        match insn.flow()? {
            Flow::Exit => {
                if next < code.len() {
                    leaders.insert(to_address(base, next));
                }
            }
            Flow::Jump(target) | Flow::Branch(target) => {
                leaders.insert(to_address(base, target));
                leaders.insert(to_address(base, next));
            }
            Flow::Next => {}
        }

        offset = next;
    }
    log::debug!("{} leaders in {} bytes of script code", leaders.len(), code.len());

    let mut graph = ControlFlowGraph {
        base_address: base,
        blocks: BTreeMap::new(),
    };

    for &leader in &leaders {
        // A trailing jump leaves a leader right after the code.
        let mut offset = match leader.checked_sub(base) {
            Some(o) if (o as usize) < code.len() => o as usize,
            _ => {
                if leader < base {
                    log::warn!("dropping leader {:#06x} before script base {:#06x}", leader, base);
                }
                continue;
            }
        };

        let mut block = BasicBlock::default();
        let last = loop {
            let insn = decode(code, offset)?;
            block.instructions.push(to_address(base, offset));
            offset = insn.next_offset();
            if offset >= code.len() || leaders.contains(&to_address(base, offset)) {
                break insn;
            }
        };
        let next = to_address(base, offset);
        let overrun = || ScriptError::ControlFlowOverrun {
            offset: last.offset,
            target: offset as i64,
        };

        block.successors = match last.flow()? {
            Flow::Jump(target) => {
                if target >= code.len() {
                    return Err(ScriptError::ControlFlowOverrun {
                        offset: last.offset,
                        target: target as i64,
                    });
                }
                BTreeSet::from([to_address(base, target)])
            }
            Flow::Branch(target) => {
                if offset >= code.len() || target >= code.len() {
                    return Err(overrun());
                }
                BTreeSet::from([to_address(base, target), next])
            }
            Flow::Exit => BTreeSet::new(),
            Flow::Next => {
                if offset >= code.len() {
                    return Err(overrun());
                }
                BTreeSet::from([next])
            }
        };

        graph.blocks.insert(leader, block);
    }

    log::debug!("built control flow graph with {} blocks", graph.len());
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::op;

    #[test]
    fn single_exit_block() {
        let code = [op::RET];
        let graph = build_cfg(&code, 0x100, [0x100]).unwrap();
        assert_eq!(graph.len(), 1);
        let block = graph.get(0x100).unwrap();
        assert_eq!(block.instructions, vec![0x100]);
        assert!(block.is_terminal());
    }

    #[test]
    fn branch_has_target_and_fallthrough() {
        // IF ... skip 3 -> target = 0 + 5 + 3 = 8; fallthrough at 6.
        let code = [op::IF, 0x00, 0x01, 0x02, 0x00, 0x03, op::NOP, op::NOP, op::RET];
        let graph = build_cfg(&code, 0x40, [0x40]).unwrap();
        let entry = graph.get(0x40).unwrap();
        assert_eq!(entry.successors, BTreeSet::from([0x40 + 8, 0x40 + 6]));
        assert_eq!(graph.get(0x46).unwrap().successors, BTreeSet::from([0x48]));
        assert!(graph.get(0x48).unwrap().is_terminal());
    }

    #[test]
    fn forward_jump_and_trailing_leader() {
        // skip over a NOP, then a RET; a trailing jump at the end leaves a
        // leader past the code which must be dropped.
        let code = [op::SKIP, 0x02, op::NOP, op::RET, op::BACK, 0x01];
        let graph = build_cfg(&code, 0, [0]).unwrap();
        assert_eq!(graph.get(0).unwrap().successors, BTreeSet::from([3]));
        assert_eq!(graph.get(3).unwrap().instructions, vec![3]);
        // NOP after the jump is its own (unreachable) block.
        assert_eq!(graph.get(2).unwrap().successors, BTreeSet::from([3]));
        assert_eq!(graph.get(4).unwrap().successors, BTreeSet::from([3]));
        assert!(graph.get(6).is_none());
    }

    #[test]
    fn fallthrough_past_end_is_an_error() {
        let code = [op::NOP, op::NOP];
        assert!(matches!(
            build_cfg(&code, 0, [0]),
            Err(ScriptError::ControlFlowOverrun { .. })
        ));
    }

    #[test]
    fn jump_past_the_end_overruns() {
        // SKIP +5 lands at offset 6 of a 3-byte script.
        let code = [op::SKIP, 0x05, op::RET];
        assert!(matches!(
            build_cfg(&code, 0, [0]),
            Err(ScriptError::ControlFlowOverrun { offset: 0, target: 6 })
        ));
    }

    #[test]
    fn branch_as_last_instruction_overruns() {
        let code = [op::MEMBQ, 0x00, 0x00];
        assert!(matches!(
            build_cfg(&code, 0, [0]),
            Err(ScriptError::ControlFlowOverrun { .. })
        ));
    }

    #[test]
    fn illegal_opcode_aborts_the_scan() {
        let code = [op::NOP, 0x0C, op::RET];
        assert!(matches!(
            build_cfg(&code, 0, [0]),
            Err(ScriptError::UnknownOpcode { offset: 1, .. })
        ));
    }

    #[test]
    fn entries_split_blocks() {
        let code = [op::NOP, op::NOP, op::RET];
        let graph = build_cfg(&code, 0x10, [0x10, 0x11]).unwrap();
        assert_eq!(graph.get(0x10).unwrap().instructions, vec![0x10]);
        assert_eq!(graph.get(0x10).unwrap().successors, BTreeSet::from([0x11]));
        assert_eq!(graph.get(0x11).unwrap().instructions, vec![0x11, 0x12]);
    }

    #[test]
    fn result_does_not_depend_on_entry_order() {
        let code = [op::NOP, op::SKIP, 0x01, op::RET, op::NOP, op::RET];
        let a = build_cfg(&code, 0, [0, 4, 3]).unwrap();
        let b = build_cfg(&code, 0, [3, 0, 4]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn graph_serializes_to_json() {
        let graph = build_cfg(&[op::RET], 0x20, [0x20]).unwrap();
        let json = graph.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["base_address"].as_u64(), Some(0x20));
        assert_eq!(value["blocks"]["32"]["instructions"][0].as_u64(), Some(0x20));
    }
}
