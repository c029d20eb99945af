//! Control-flow analysis and editing of Final Fantasy VII field event scripts.
//!
//! A field map holds a compressed set of sections; the event section carries
//! the actor table, the per-actor script entry tables, the script bytecode,
//! the dialog string table and the music/tutorial "extra" blocks. This crate
//! parses and rebuilds that section, decodes the bytecode, discovers every
//! script entry point (including the implicit ones the engine relies on),
//! builds a control-flow graph over the code and offers path enumeration,
//! filtering/reduction for text extraction and a plain-text disassembler.
//! [`Lzss`] implements the field file compression.

use thiserror::Error;

pub mod analysis;
pub mod cfg;
pub mod disasm;
pub mod entry;
pub mod event;
pub mod instruction;
pub mod lzss;
pub mod map;
pub mod opcode;
pub mod paths;
pub mod reduce;

#[cfg(test)]
pub(crate) mod testutil;

pub use analysis::{instruction_sequences, text_filter, AnalysisSettings, TEXT_OPCODES};
pub use cfg::{build_cfg, BasicBlock, ControlFlowGraph};
pub use disasm::disassemble;
pub use entry::discover_entries;
pub use event::{EventSection, ScriptTable};
pub use instruction::{decode, target_offset, Flow, Instruction};
pub use lzss::Lzss;
pub use map::{MapData, Section};
pub use paths::{find_paths, find_paths_with_limit, DEFAULT_PATH_LIMIT};
pub use reduce::{filter_instructions, possible_exits_from, reduce};

/// Offset of a script instruction relative to the start of the event
/// section.
pub type Address = u32;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("unknown opcode {opcode:#04x} at offset {offset:#06x} (bytes {context:02x?})")]
    UnknownOpcode {
        offset: usize,
        opcode: u8,
        context: Vec<u8>,
    },

    #[error("unknown SPCAL sub-opcode {sub_opcode:#04x} at offset {offset:#06x}")]
    UnknownSubOpcode { offset: usize, sub_opcode: u8 },

    #[error("KAWAI at offset {offset:#06x} claims size {size}, but {available} bytes remain")]
    MalformedSize {
        offset: usize,
        size: usize,
        available: usize,
    },

    #[error("instruction {opcode:#04x} at offset {offset:#06x} needs {needed} bytes, but {available} remain")]
    Truncated {
        offset: usize,
        opcode: u8,
        needed: usize,
        available: usize,
    },

    #[error("control flow from offset {offset:#06x} leaves the script code (target offset {target})")]
    ControlFlowOverrun { offset: usize, target: i64 },

    #[error("string at offset {offset:#06x} has no terminator before {end:#06x}")]
    StringExtraction { offset: usize, end: usize },

    #[error("successor {address:#06x} has no block in the graph")]
    DanglingSuccessor { address: Address },

    #[error("more than {limit} paths from entry {entry:#06x}")]
    PathLimitExceeded { entry: Address, limit: usize },

    #[error("{count} strings exceed the 256 addressable by one-byte string IDs")]
    TooManyStrings { count: usize },

    #[error("{what} at {value:#x} does not fit the event section layout")]
    SectionTooLarge { what: &'static str, value: usize },

    #[error("malformed container: {0}")]
    MalformedContainer(String),

    #[error("{what} index {index} out of range (have {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("codec error: {0}")]
    Codec(String),

    #[error("settings error: {0}")]
    Settings(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ScriptError>;

/// Compression codec wrapped around whole field map files.
pub trait Compressor {
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Converts between the game's field text encoding and Unicode.
pub trait TextCodec {
    fn decode(&self, data: &[u8], japanese: bool) -> Result<String>;
    fn encode(&self, text: &str, japanese: bool) -> Result<Vec<u8>>;
}

pub(crate) fn read_u16(buf: &[u8], at: usize) -> Option<u16> {
    let b = buf.get(at..at + 2)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

pub(crate) fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    let b = buf.get(at..at + 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}
