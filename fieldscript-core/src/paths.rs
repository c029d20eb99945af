use std::collections::BTreeSet;

use crate::cfg::ControlFlowGraph;
use crate::{Address, Result, ScriptError};

/// Default cap on the number of paths returned by [`find_paths`].
pub const DEFAULT_PATH_LIMIT: usize = 100_000;

/// All paths through the graph starting at `entry`, each a list of block
/// addresses. Cycles are cut by never revisiting a block already on the
/// current path.
pub fn find_paths(graph: &ControlFlowGraph, entry: Address) -> Result<Vec<Vec<Address>>> {
    find_paths_with_limit(graph, entry, DEFAULT_PATH_LIMIT)
}

pub fn find_paths_with_limit(
    graph: &ControlFlowGraph,
    entry: Address,
    limit: usize,
) -> Result<Vec<Vec<Address>>> {
    let mut walk = PathWalk {
        graph,
        entry,
        limit,
        path: Vec::new(),
        on_path: BTreeSet::new(),
        found: Vec::new(),
    };
    walk.visit(entry)?;
    log::debug!("{} paths from entry {:#06x}", walk.found.len(), entry);
    Ok(walk.found)
}

struct PathWalk<'a> {
    graph: &'a ControlFlowGraph,
    entry: Address,
    limit: usize,
    // Current path; every visit pushes one address and pops it on return,
    // so sibling branches never see each other's blocks.
    path: Vec<Address>,
    on_path: BTreeSet<Address>,
    found: Vec<Vec<Address>>,
}

impl PathWalk<'_> {
    fn visit(&mut self, address: Address) -> Result<()> {
        let graph = self.graph;
        let block = graph
            .get(address)
            .ok_or(ScriptError::DanglingSuccessor { address })?;

        self.path.push(address);
        self.on_path.insert(address);

        let result = self.extend(&block.successors);

        self.on_path.remove(&address);
        self.path.pop();
        result
    }

    fn extend(&mut self, successors: &BTreeSet<Address>) -> Result<()> {
        let mut extended = false;
        for &next in successors {
            if !self.on_path.contains(&next) {
                self.visit(next)?;
                extended = true;
            }
        }

        // Exit reached, or every successor closes a cycle.
        if !extended {
            if self.found.len() >= self.limit {
                return Err(ScriptError::PathLimitExceeded {
                    entry: self.entry,
                    limit: self.limit,
                });
            }
            self.found.push(self.path.clone());
        }
        Ok(())
    }
}
