use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::cfg::build_cfg;
use crate::event::EventSection;
use crate::opcode::op;
use crate::paths::{find_paths_with_limit, DEFAULT_PATH_LIMIT};
use crate::reduce::{filter_instructions, reduce};
use crate::{Address, Result};

/// Filter keys of the instructions that show or shape dialog text.
pub const TEXT_OPCODES: [u16; 8] = [
    op::MES as u16,
    op::ASK as u16,
    op::MPNAM as u16,
    op::WSIZE as u16,
    op::WSIZW as u16,
    op::WSPCL as u16,
    op::WREST as u16,
    op::SPCNM,
];

pub fn text_filter() -> HashSet<u16> {
    TEXT_OPCODES.iter().copied().collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Cap on the paths enumerated per entry point.
    pub max_paths: usize,
    /// Also analyse the implicit entry points, not just the script tables.
    pub synthetic_entries: bool,
    /// Run the graph reducer after filtering.
    pub reduce: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        AnalysisSettings {
            max_paths: DEFAULT_PATH_LIMIT,
            synthetic_entries: true,
            reduce: true,
        }
    }
}

impl AnalysisSettings {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// For every entry point of the section, the distinct sequences of kept
/// instruction addresses along its paths. Entries whose paths keep nothing
/// are left out.
pub fn instruction_sequences(
    section: &EventSection,
    keep: &HashSet<u16>,
    settings: &AnalysisSettings,
) -> Result<BTreeMap<Address, Vec<Vec<Address>>>> {
    let entries = if settings.synthetic_entries {
        section.entry_addresses().clone()
    } else {
        section.table_entries()
    };
    let code = section.script_code();

    let mut graph = build_cfg(code, section.script_base_address(), entries.iter().copied())?;
    filter_instructions(&mut graph, code, keep)?;
    if settings.reduce {
        reduce(&mut graph, &entries);
    }

    let mut result = BTreeMap::new();
    for &entry in &entries {
        // Entries past the end of the code have no block.
        if graph.get(entry).is_none() {
            continue;
        }

        let mut seen = BTreeSet::new();
        let mut sequences = Vec::new();
        for path in find_paths_with_limit(&graph, entry, settings.max_paths)? {
            let sequence: Vec<Address> = path
                .iter()
                .filter_map(|addr| graph.get(*addr))
                .flat_map(|block| block.instructions.iter().copied())
                .collect();
            if !sequence.is_empty() && seen.insert(sequence.clone()) {
                sequences.push(sequence);
            }
        }

        if !sequences.is_empty() {
            result.insert(entry, sequences);
        }
    }

    log::debug!(
        "{} of {} entries keep instructions ({} sequences)",
        result.len(),
        entries.len(),
        result.values().map(Vec::len).sum::<usize>()
    );
    Ok(result)
}
