// Implicit script entry points.
//
// The script tables only name the start of each script, but the engine
// also runs code that is only reachable through conventions:
//
// - An actor's default script (slot 0) runs its init part up to the first
//   RET, and the code after that RET runs on every frame. It gets an entry
//   of its own.
// - Some scripts end with two RETs in a row, and the code after them is
//   reached from elsewhere. Each such spot gets an entry.
//
// Both rules were derived from the shipped field maps and are not proven
// complete.

use std::collections::BTreeSet;

use crate::event::ScriptTable;
use crate::instruction::decode;
use crate::opcode::op;
use crate::{Address, Result};

fn code_offset(code: &[u8], base: Address, address: Address) -> Option<usize> {
    let offset = address.checked_sub(base)? as usize;
    if offset < code.len() {
        Some(offset)
    } else {
        None
    }
}

/// Add the synthetic entries of every actor to its table and to `known`.
/// Returns the number of addresses that were not known before.
pub fn discover_entries(
    code: &[u8],
    base: Address,
    tables: &mut [ScriptTable],
    known: &mut BTreeSet<Address>,
) -> Result<usize> {
    let mut added = 0;

    for (actor, table) in tables.iter_mut().enumerate() {
        if let Some(entry) = tail_after_default(code, base, table.entries[0] as Address, actor)? {
            table.synthetic.push(entry);
            if known.insert(entry) {
                added += 1;
            }
        }
    }

    for (actor, table) in tables.iter_mut().enumerate() {
        for slot in 1..table.entries.len() {
            let start = table.entries[slot] as Address;
            for entry in split_double_exits(code, base, start, known, actor)? {
                table.synthetic.push(entry);
                added += 1;
            }
        }
    }

    log::debug!("discovered {} implicit script entries", added);
    Ok(added)
}

fn tail_after_default(
    code: &[u8],
    base: Address,
    start: Address,
    actor: usize,
) -> Result<Option<Address>> {
    let mut offset = match code_offset(code, base, start) {
        Some(o) => o,
        None => {
            log::warn!("actor {} default script {:#06x} lies outside the script code", actor, start);
            return Ok(None);
        }
    };

    while offset < code.len() {
        if code[offset] == op::RET {
            return Ok(Some(base + offset as Address + 1));
        }
        offset = decode(code, offset)?.next_offset();
    }
    Ok(None)
}

fn split_double_exits(
    code: &[u8],
    base: Address,
    start: Address,
    known: &mut BTreeSet<Address>,
    actor: usize,
) -> Result<Vec<Address>> {
    let mut found = Vec::new();
    let mut offset = match code_offset(code, base, start) {
        Some(o) => o,
        None => {
            log::warn!("actor {} script {:#06x} lies outside the script code", actor, start);
            return Ok(found);
        }
    };

    while offset + 2 < code.len() {
        if code[offset] == op::RET && code[offset + 1] == op::RET {
            let entry = base + offset as Address + 2;
            if known.insert(entry) {
                found.push(entry);
            }
            offset += 2;
        } else {
            offset = decode(code, offset)?.next_offset();
            // Start of the next script.
            if known.contains(&(base + offset as Address)) {
                break;
            }
        }
    }
    Ok(found)
}
