// Filtering and reduction of control flow graphs.
//
// When only the order of a few instruction kinds matters (e.g. which
// dialogs a script can show, and in which order), most blocks become empty
// after filtering and most conditionals stop mattering. `reduce` collapses
// such graphs so that path enumeration stays tractable. The result is not
// control-flow equivalent to the script; it keeps every reachable sequence
// of kept instructions.

use std::collections::{BTreeSet, HashSet};

use crate::cfg::ControlFlowGraph;
use crate::instruction::decode;
use crate::{Address, Result};

/// Drop every instruction whose filter key (opcode, or `0x0F00 | sub` for
/// SPCAL) is not in `keep`. Successors are left alone.
pub fn filter_instructions(
    graph: &mut ControlFlowGraph,
    code: &[u8],
    keep: &HashSet<u16>,
) -> Result<()> {
    let base = graph.base_address;
    for block in graph.blocks.values_mut() {
        let mut kept = Vec::with_capacity(block.instructions.len());
        for &addr in &block.instructions {
            let insn = decode(code, (addr - base) as usize)?;
            if keep.contains(&insn.filter_key()) {
                kept.push(addr);
            }
        }
        block.instructions = kept;
    }
    Ok(())
}

/// Every successor address reachable from the block at `start` that lies
/// outside `[min, max)`, following only edges that stay inside the range.
pub fn possible_exits_from(
    graph: &ControlFlowGraph,
    start: Address,
    min: Address,
    max: Address,
) -> BTreeSet<Address> {
    let mut exits = BTreeSet::new();
    let mut seen = BTreeSet::new();
    let mut stack = vec![start];

    while let Some(addr) = stack.pop() {
        if !seen.insert(addr) {
            continue;
        }
        let block = match graph.get(addr) {
            Some(b) => b,
            None => {
                exits.insert(addr);
                continue;
            }
        };
        for &succ in &block.successors {
            if succ >= min && succ < max {
                stack.push(succ);
            } else {
                exits.insert(succ);
            }
        }
    }

    exits
}

/// Simplify a (filtered) graph in place. Blocks at `entries` are never
/// removed.
pub fn reduce(graph: &mut ControlFlowGraph, entries: &BTreeSet<Address>) {
    let before = graph.len();

    let absorbed = absorb_branches(graph);
    remove_orphans(graph, entries);

    let spliced = splice_empty_blocks(graph);
    remove_orphans(graph, entries);

    log::debug!(
        "reduced graph from {} to {} blocks ({} branches absorbed, {} blocks spliced)",
        before,
        graph.len(),
        absorbed,
        spliced
    );
}

// 'if c then b' constructs: when everything leaving the inner block ends up
// at the join point, assume the inner block always runs.
fn absorb_branches(graph: &mut ControlFlowGraph) -> usize {
    let mut count = 0;
    loop {
        let mut changed = false;
        let keys: Vec<Address> = graph.blocks.keys().copied().collect();

        for addr in keys {
            let (inner, exit) = match graph.get(addr) {
                Some(block) if block.successors.len() == 2 => {
                    let mut succ = block.successors.iter().copied();
                    match (succ.next(), succ.next()) {
                        (Some(inner), Some(exit)) => (inner, exit),
                        _ => continue,
                    }
                }
                _ => continue,
            };

            if possible_exits_from(graph, inner, inner, exit) == BTreeSet::from([exit]) {
                if let Some(block) = graph.blocks.get_mut(&addr) {
                    block.successors = BTreeSet::from([inner]);
                    changed = true;
                    count += 1;
                }
            }
        }

        if !changed {
            return count;
        }
    }
}

// Skip over blocks left without instructions, as long as that does not
// make the graph branchier.
fn splice_empty_blocks(graph: &mut ControlFlowGraph) -> usize {
    let mut count = 0;
    loop {
        let mut changed = false;
        let keys: Vec<Address> = graph.blocks.keys().copied().collect();

        for addr in keys {
            let current = match graph.get(addr) {
                Some(block) => block.successors.clone(),
                None => continue,
            };

            let mut spliced = BTreeSet::new();
            for succ in &current {
                match graph.get(*succ) {
                    Some(target) if target.instructions.is_empty() => {
                        spliced.extend(target.successors.iter().copied());
                    }
                    _ => {
                        spliced.insert(*succ);
                    }
                }
            }
            spliced.remove(&addr);

            if spliced != current && spliced.len() < 3 {
                if let Some(block) = graph.blocks.get_mut(&addr) {
                    block.successors = spliced;
                    changed = true;
                    count += 1;
                }
            }
        }

        if !changed {
            return count;
        }
    }
}

fn remove_orphans(graph: &mut ControlFlowGraph, entries: &BTreeSet<Address>) {
    loop {
        let mut referenced = entries.clone();
        for block in graph.blocks.values() {
            referenced.extend(block.successors.iter().copied());
        }

        let before = graph.len();
        graph.blocks.retain(|addr, _| referenced.contains(addr));
        if graph.len() == before {
            return;
        }
    }
}
