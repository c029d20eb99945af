// Event section of a field map: actors, their script tables, the script
// code, the dialog strings and the music/tutorial "extra" blocks.
//
// Layout (little-endian):
//
//   0: u16 version
//   2: u8  actor count
//   3: u8  model count
//   4: u16 string table offset
//   6: u16 extra block count
//   8: u16 scale
//  10: 6 bytes reserved
//  16: char[8] creator
//  24: char[8] map name
//  32: char[8] per actor name
//      u32 per extra block offset
//      u16[32] per actor script table
//      script code up to the string table
//      string table, then the extra blocks

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::cfg::{build_cfg, ControlFlowGraph};
use crate::entry::discover_entries;
use crate::opcode::op;
use crate::{read_u16, read_u32, Address, Result, ScriptError, TextCodec};

const HEADER_SIZE: usize = 32;
const NAME_SIZE: usize = 8;
const SCRIPTS_PER_ACTOR: usize = 32;
const STRING_TERMINATOR: u8 = 0xFF;
/// String IDs in MES/ASK/MPNAM are one byte.
const MAX_STRINGS: usize = 256;

/// Script entry table of one actor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScriptTable {
    pub entries: [u16; SCRIPTS_PER_ACTOR],
    /// Entries found by entry discovery. The first one, if any, is the
    /// code following the first RET of the default script.
    pub synthetic: Vec<Address>,
}

impl ScriptTable {
    /// Table entries followed by the synthetic ones.
    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.entries
            .iter()
            .map(|&e| e as Address)
            .chain(self.synthetic.iter().copied())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSection {
    pub version: u16,
    pub actor_names: Vec<String>,
    pub num_models: u8,
    pub scale: u16,
    pub creator: String,
    pub map_name: String,
    pub actor_scripts: Vec<ScriptTable>,
    entry_addresses: BTreeSet<Address>,
    script_base_address: Address,
    script_code: Vec<u8>,
    string_data: Vec<Vec<u8>>,
    extras: Vec<Vec<u8>>,
}

fn malformed(what: impl Into<String>) -> ScriptError {
    ScriptError::MalformedContainer(what.into())
}

// Names are read one char per byte so that any byte value survives a
// round trip.
fn fixed_str(bytes: &[u8]) -> String {
    let len = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    bytes[..len].iter().map(|&b| b as char).collect()
}

fn put_fixed_str(out: &mut Vec<u8>, s: &str, what: &'static str) -> Result<()> {
    let bytes = s
        .chars()
        .map(u8::try_from)
        .collect::<std::result::Result<Vec<u8>, _>>()
        .map_err(|_| ScriptError::Codec(format!("{} {:?} has a char above U+00FF", what, s)))?;
    if bytes.len() > NAME_SIZE {
        return Err(ScriptError::SectionTooLarge {
            what,
            value: bytes.len(),
        });
    }

    let mut field = [0u8; NAME_SIZE];
    field[..bytes.len()].copy_from_slice(&bytes);
    out.extend_from_slice(&field);
    Ok(())
}

impl EventSection {
    /// Parse a decompressed event section and discover the implicit script
    /// entry points.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(malformed(format!(
                "event section header needs {} bytes, have {}",
                HEADER_SIZE,
                data.len()
            )));
        }

        let version = u16::from_le_bytes([data[0], data[1]]);
        let num_actors = data[2] as usize;
        let num_models = data[3];
        let string_table_offset = u16::from_le_bytes([data[4], data[5]]) as usize;
        let num_extras = u16::from_le_bytes([data[6], data[7]]) as usize;
        let scale = u16::from_le_bytes([data[8], data[9]]);
        let creator = fixed_str(&data[16..24]);
        let map_name = fixed_str(&data[24..32]);

        let tables_end = HEADER_SIZE
            + num_actors * NAME_SIZE
            + num_extras * 4
            + num_actors * SCRIPTS_PER_ACTOR * 2;
        if tables_end > data.len() {
            return Err(malformed(format!(
                "{} actors and {} extra blocks need {} bytes, section has {}",
                num_actors,
                num_extras,
                tables_end,
                data.len()
            )));
        }

        let mut offset = HEADER_SIZE;
        let mut actor_names = Vec::with_capacity(num_actors);
        for _ in 0..num_actors {
            actor_names.push(fixed_str(&data[offset..offset + NAME_SIZE]));
            offset += NAME_SIZE;
        }

        let mut extra_offsets = Vec::with_capacity(num_extras + 1);
        for _ in 0..num_extras {
            extra_offsets.push(read_u32(data, offset).unwrap_or_default() as usize);
            offset += 4;
        }
        // End of the last extra block.
        extra_offsets.push(data.len());

        let mut actor_scripts = Vec::with_capacity(num_actors);
        let mut entry_addresses = BTreeSet::new();
        for _ in 0..num_actors {
            let mut table = ScriptTable::default();
            for entry in table.entries.iter_mut() {
                *entry = read_u16(data, offset).unwrap_or_default();
                offset += 2;
            }
            entry_addresses.extend(table.addresses());
            actor_scripts.push(table);
        }

        // The script code is assumed to run from the end of the tables up to
        // the string table.
        let script_base_address = offset as Address;
        if string_table_offset < offset || string_table_offset > data.len() {
            return Err(malformed(format!(
                "string table offset {:#06x} outside [{:#06x}, {:#06x}]",
                string_table_offset,
                offset,
                data.len()
            )));
        }
        let mut script_code = data[offset..string_table_offset].to_vec();

        // Some maps have script table entries pointing just past the code,
        // and expect to run into a RET there.
        if entry_addresses.contains(&(script_base_address + script_code.len() as Address)) {
            script_code.push(op::RET);
        }

        let added = discover_entries(
            &script_code,
            script_base_address,
            &mut actor_scripts,
            &mut entry_addresses,
        )?;
        log::debug!(
            "event section {:?}: {} actors, {} script bytes, {} entries ({} implicit)",
            map_name,
            num_actors,
            script_code.len(),
            entry_addresses.len(),
            added
        );

        // The string table runs up to the first extra block.
        let strings_end = extra_offsets[0].min(data.len());
        if strings_end < string_table_offset {
            return Err(malformed(format!(
                "first extra block at {:#06x} lies before the string table at {:#06x}",
                strings_end, string_table_offset
            )));
        }
        let string_data = read_strings(&data[..strings_end], string_table_offset)?;

        let mut extras = Vec::with_capacity(num_extras);
        for pair in extra_offsets.windows(2) {
            let (start, end) = (pair[0], pair[1]);
            if start > end || end > data.len() {
                return Err(malformed(format!(
                    "extra block at {:#06x}..{:#06x} in a section of {} bytes",
                    start,
                    end,
                    data.len()
                )));
            }
            extras.push(data[start..end].to_vec());
        }

        Ok(EventSection {
            version,
            actor_names,
            num_models,
            scale,
            creator,
            map_name,
            actor_scripts,
            entry_addresses,
            script_base_address,
            script_code,
            string_data,
            extras,
        })
    }

    /// Serialize the section. Every offset is recomputed; the script code is
    /// written as is, so jump targets are not relocated.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let num_actors = self.actor_names.len();
        if num_actors != self.actor_scripts.len() {
            return Err(malformed(format!(
                "{} actor names but {} script tables",
                num_actors,
                self.actor_scripts.len()
            )));
        }
        if num_actors > u8::MAX as usize {
            return Err(ScriptError::SectionTooLarge {
                what: "actor count",
                value: num_actors,
            });
        }
        if self.extras.len() > u16::MAX as usize {
            return Err(ScriptError::SectionTooLarge {
                what: "extra block count",
                value: self.extras.len(),
            });
        }

        let string_table_offset = HEADER_SIZE
            + num_actors * NAME_SIZE
            + self.extras.len() * 4
            + num_actors * SCRIPTS_PER_ACTOR * 2
            + self.script_code.len();
        if string_table_offset > u16::MAX as usize {
            return Err(ScriptError::SectionTooLarge {
                what: "string table offset",
                value: string_table_offset,
            });
        }

        let mut string_table = build_string_table(&self.string_data)?;
        let unaligned = string_table_offset + string_table.len();
        if unaligned % 4 != 0 {
            string_table.resize(string_table.len() + 4 - unaligned % 4, 0);
        }

        let mut out = Vec::with_capacity(string_table_offset + string_table.len());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.push(num_actors as u8);
        out.push(self.num_models);
        out.extend_from_slice(&(string_table_offset as u16).to_le_bytes());
        out.extend_from_slice(&(self.extras.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.scale.to_le_bytes());
        out.extend_from_slice(&[0u8; 6]);
        put_fixed_str(&mut out, &self.creator, "creator name")?;
        put_fixed_str(&mut out, &self.map_name, "map name")?;

        for name in &self.actor_names {
            put_fixed_str(&mut out, name, "actor name")?;
        }

        let mut extra_offset = string_table_offset + string_table.len();
        for extra in &self.extras {
            let value = u32::try_from(extra_offset).map_err(|_| ScriptError::SectionTooLarge {
                what: "extra block offset",
                value: extra_offset,
            })?;
            out.extend_from_slice(&value.to_le_bytes());
            extra_offset += extra.len();
        }

        for table in &self.actor_scripts {
            for entry in &table.entries {
                out.extend_from_slice(&entry.to_le_bytes());
            }
        }

        out.extend_from_slice(&self.script_code);
        out.extend_from_slice(&string_table);
        for extra in &self.extras {
            out.extend_from_slice(extra);
        }

        Ok(out)
    }

    /// All strings decoded to text.
    pub fn strings(&self, codec: &dyn TextCodec, japanese: bool) -> Result<Vec<String>> {
        self.string_data
            .iter()
            .map(|s| codec.decode(s, japanese))
            .collect()
    }

    /// Replace the entire string list.
    pub fn set_strings<I>(&mut self, codec: &dyn TextCodec, strings: I, japanese: bool) -> Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.string_data = strings
            .into_iter()
            .map(|s| codec.encode(s.as_ref(), japanese))
            .collect::<Result<_>>()?;
        Ok(())
    }

    /// Raw encoded strings, terminator included.
    pub fn string_data(&self) -> &[Vec<u8>] {
        &self.string_data
    }

    pub fn set_string_data(&mut self, data: Vec<Vec<u8>>) {
        self.string_data = data;
    }

    pub fn extras(&self) -> &[Vec<u8>] {
        &self.extras
    }

    /// Replace one extra block.
    pub fn set_extra(&mut self, index: usize, data: Vec<u8>) -> Result<()> {
        let len = self.extras.len();
        match self.extras.get_mut(index) {
            Some(extra) => {
                *extra = data;
                Ok(())
            }
            None => Err(ScriptError::IndexOutOfRange {
                what: "extra block",
                index,
                len,
            }),
        }
    }

    pub fn script_code(&self) -> &[u8] {
        &self.script_code
    }

    /// Replace the script code. Entry addresses are kept; the caller is
    /// responsible for relocating jumps and table entries.
    pub fn set_script_code(&mut self, code: Vec<u8>) {
        self.script_code = code;
    }

    pub fn script_base_address(&self) -> Address {
        self.script_base_address
    }

    /// Every known entry point, implicit ones included.
    pub fn entry_addresses(&self) -> &BTreeSet<Address> {
        &self.entry_addresses
    }

    /// Entry points named by the script tables alone.
    pub fn table_entries(&self) -> BTreeSet<Address> {
        self.actor_scripts
            .iter()
            .flat_map(|t| t.entries.iter().map(|&e| e as Address))
            .collect()
    }

    pub fn control_flow_graph(&self) -> Result<ControlFlowGraph> {
        build_cfg(
            &self.script_code,
            self.script_base_address,
            self.entry_addresses.iter().copied(),
        )
    }
}

// `data` ends where the string table ends. The leading count is unreliable,
// so the number of strings is derived from the first offset; an offset table
// that does not fit means there are no strings. Strings are read up to their
// terminator rather than the next offset since they may overlap and are not
// necessarily in order.
fn read_strings(data: &[u8], table_offset: usize) -> Result<Vec<Vec<u8>>> {
    let first = match read_u16(data, table_offset + 2) {
        Some(o) => o as usize,
        None => return Ok(Vec::new()),
    };
    let count = (first / 2).saturating_sub(1);
    if table_offset + 2 + count * 2 > data.len() {
        return Ok(Vec::new());
    }

    let mut strings = Vec::with_capacity(count);
    for i in 0..count {
        let at = table_offset + 2 + i * 2;
        let rel = read_u16(data, at).unwrap_or_default();
        let start = table_offset + rel as usize;
        let end = data
            .get(start..)
            .and_then(|rest| rest.iter().position(|&b| b == STRING_TERMINATOR))
            .ok_or(ScriptError::StringExtraction {
                offset: start,
                end: data.len(),
            })?;
        strings.push(data[start..start + end + 1].to_vec());
    }
    Ok(strings)
}

// Count, offsets, then the strings. Identical strings share one copy.
fn build_string_table(strings: &[Vec<u8>]) -> Result<Vec<u8>> {
    if strings.len() > MAX_STRINGS {
        return Err(ScriptError::TooManyStrings {
            count: strings.len(),
        });
    }

    let mut offsets = Vec::with_capacity(strings.len() * 2);
    let mut body = Vec::new();
    let mut seen: HashMap<&[u8], u16> = HashMap::new();
    let header = 2 + strings.len() * 2;

    for s in strings {
        let offset = match seen.get(s.as_slice()) {
            Some(&o) => o,
            None => {
                let o = header + body.len();
                let o = u16::try_from(o).map_err(|_| ScriptError::SectionTooLarge {
                    what: "string offset",
                    value: o,
                })?;
                seen.insert(s.as_slice(), o);
                body.extend_from_slice(s);
                o
            }
        };
        offsets.extend_from_slice(&offset.to_le_bytes());
    }

    let mut table = Vec::with_capacity(header + body.len() + 3);
    // Only the low byte of the count survives; readers ignore it anyway.
    table.extend_from_slice(&((strings.len() & 0xFF) as u16).to_le_bytes());
    table.extend_from_slice(&offsets);
    table.extend_from_slice(&body);
    Ok(table)
}
