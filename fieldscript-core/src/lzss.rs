// LZSS as used by FF7 PC field files: a 4096-byte ring buffer starting out
// zeroed with the write head at 0xFEE, 12-bit absolute ring offsets and
// 4-bit lengths (3..=18). Each group of up to eight units is preceded by a
// flag byte, bit set for a literal.

use std::collections::HashMap;

use crate::{Compressor, Result, ScriptError};

const RING_SIZE: usize = 4096;
const RING_MASK: usize = RING_SIZE - 1;
const RING_START: usize = 0xFEE;
const MIN_MATCH: usize = 3;
const MAX_MATCH: usize = 18;
// Matches must not reach bytes the copy itself is about to overwrite.
const MAX_DISTANCE: usize = RING_SIZE - MAX_MATCH;
const MAX_CHAIN: usize = 256;

/// The field file LZSS codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lzss;

impl Compressor for Lzss {
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        decompress(data)
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(compress(data))
    }
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len().saturating_mul(4));
    let mut ring = [0u8; RING_SIZE];
    let mut head = RING_START;
    let mut pos = 0;

    while pos < data.len() {
        let flags = data[pos];
        pos += 1;

        for bit in 0..8 {
            if pos >= data.len() {
                break;
            }

            if flags & (1 << bit) != 0 {
                let c = data[pos];
                pos += 1;
                out.push(c);
                ring[head] = c;
                head = (head + 1) & RING_MASK;
                continue;
            }

            if pos + 1 >= data.len() {
                return Err(ScriptError::Codec(format!(
                    "LZSS reference at {:#x} cut off by the end of the stream",
                    pos
                )));
            }
            let lo = data[pos] as usize;
            let hi = data[pos + 1] as usize;
            pos += 2;

            let offset = lo | ((hi & 0xF0) << 4);
            let length = (hi & 0x0F) + MIN_MATCH;
            for i in 0..length {
                let c = ring[(offset + i) & RING_MASK];
                out.push(c);
                ring[head] = c;
                head = (head + 1) & RING_MASK;
            }
        }
    }

    Ok(out)
}

fn prefix(input: &[u8], at: usize) -> Option<[u8; MIN_MATCH]> {
    let b = input.get(at..at + MIN_MATCH)?;
    Some([b[0], b[1], b[2]])
}

// Greedy encoder over hash chains of 3-byte prefixes. It only references
// earlier input, never the zeroed ring the decoder starts with.
pub fn compress(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() / 2 + 1);
    let mut latest: HashMap<[u8; MIN_MATCH], usize> = HashMap::new();
    let mut previous = vec![usize::MAX; input.len()];

    let mut group = Vec::with_capacity(1 + 8 * 2);
    let mut flags = 0u8;
    let mut bit = 0;
    let mut i = 0;

    while i < input.len() {
        let (length, source) = longest_match(input, i, &latest, |at| previous[at]);

        if length >= MIN_MATCH {
            let offset = (RING_START + source) & RING_MASK;
            group.push(offset as u8);
            group.push((((offset >> 4) & 0xF0) | (length - MIN_MATCH)) as u8);
            for at in i..i + length {
                insert(input, at, &mut latest, &mut previous);
            }
            i += length;
        } else {
            flags |= 1 << bit;
            group.push(input[i]);
            insert(input, i, &mut latest, &mut previous);
            i += 1;
        }

        bit += 1;
        if bit == 8 {
            out.push(flags);
            out.append(&mut group);
            flags = 0;
            bit = 0;
        }
    }

    if bit > 0 {
        out.push(flags);
        out.append(&mut group);
    }

    out
}

fn insert(
    input: &[u8],
    at: usize,
    latest: &mut HashMap<[u8; MIN_MATCH], usize>,
    previous: &mut [usize],
) {
    if let Some(key) = prefix(input, at) {
        if let Some(prev) = latest.insert(key, at) {
            previous[at] = prev;
        }
    }
}

fn longest_match<F>(
    input: &[u8],
    at: usize,
    latest: &HashMap<[u8; MIN_MATCH], usize>,
    previous: F,
) -> (usize, usize)
where
    F: Fn(usize) -> usize,
{
    let key = match prefix(input, at) {
        Some(k) => k,
        None => return (0, 0),
    };
    let limit = MAX_MATCH.min(input.len() - at);

    let mut best = (0, 0);
    let mut candidate = latest.get(&key).copied().unwrap_or(usize::MAX);
    let mut steps = 0;

    while candidate != usize::MAX && at - candidate <= MAX_DISTANCE && steps < MAX_CHAIN {
        // Overlapping copies are fine: the decoder reads bytes it has just
        // written.
        let length = (0..limit)
            .take_while(|&k| input[candidate + k] == input[at + k])
            .count();
        if length > best.0 {
            best = (length, candidate);
            if length == limit {
                break;
            }
        }
        candidate = previous(candidate);
        steps += 1;
    }

    best
}
