// Field map container: a u32 compressed size followed by the compressed
// body. The body starts with a table of seven u32 section pointers, all
// relative to the first one, and the sections follow in pointer order.

use crate::event::EventSection;
use crate::{read_u32, Compressor, Result, ScriptError};

const NUM_SECTIONS: usize = 7;
const TABLE_SIZE: usize = NUM_SECTIONS * 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Event = 0,
    Walkmesh = 1,
    Tilemap = 2,
    Camera = 3,
    Trigger = 4,
    Encounter = 5,
    Model = 6,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapData {
    /// Value of the first section pointer. The game stores absolute
    /// addresses here; only differences matter for parsing.
    pub base_pointer: u32,
    sections: Vec<Vec<u8>>,
}

impl MapData {
    /// Parse a complete field map file.
    pub fn parse(file: &[u8], compressor: &dyn Compressor) -> Result<Self> {
        let compressed_size = read_u32(file, 0)
            .ok_or_else(|| ScriptError::MalformedContainer("missing compressed size".to_string()))?
            as usize;
        let payload = file.get(4..4 + compressed_size).ok_or_else(|| {
            ScriptError::MalformedContainer(format!(
                "compressed size {} exceeds the {} bytes after the size field",
                compressed_size,
                file.len() - 4
            ))
        })?;
        let data = compressor.decompress(payload)?;

        if data.len() < TABLE_SIZE {
            return Err(ScriptError::MalformedContainer(format!(
                "section table needs {} bytes, map has {}",
                TABLE_SIZE,
                data.len()
            )));
        }

        let mut pointers = Vec::with_capacity(NUM_SECTIONS + 1);
        for i in 0..NUM_SECTIONS {
            pointers.push(read_u32(&data, i * 4).unwrap_or_default() as usize);
        }
        let base_pointer = pointers[0];
        // End of the last section.
        pointers.push(base_pointer + data.len() - TABLE_SIZE);

        // Pointers are assumed ascending, each section running up to the next.
        let mut sections = Vec::with_capacity(NUM_SECTIONS);
        for (i, pair) in pointers.windows(2).enumerate() {
            let start = pair[0].checked_sub(base_pointer).map(|o| o + TABLE_SIZE);
            let end = pair[1].checked_sub(base_pointer).map(|o| o + TABLE_SIZE);
            match (start, end) {
                (Some(start), Some(end)) if start <= end && end <= data.len() => {
                    sections.push(data[start..end].to_vec());
                }
                _ => {
                    return Err(ScriptError::MalformedContainer(format!(
                        "section {} pointers {:#x}..{:#x} do not fit base {:#x} and {} bytes",
                        i,
                        pair[0],
                        pair[1],
                        base_pointer,
                        data.len()
                    )))
                }
            }
        }

        log::debug!(
            "field map: {} compressed bytes, {} decompressed, section sizes {:?}",
            compressed_size,
            data.len(),
            sections.iter().map(Vec::len).collect::<Vec<_>>()
        );

        Ok(MapData {
            base_pointer: base_pointer as u32,
            sections,
        })
    }

    pub fn section(&self, which: Section) -> &[u8] {
        &self.sections[which as usize]
    }

    pub fn event_section(&self) -> Result<EventSection> {
        EventSection::parse(self.section(Section::Event))
    }

    /// Replace the event section, padded to a multiple of four bytes.
    pub fn set_event_section(&mut self, event: &EventSection) -> Result<()> {
        let mut data = event.to_bytes()?;
        if data.len() % 4 != 0 {
            data.resize(data.len() + 4 - data.len() % 4, 0);
        }
        self.sections[Section::Event as usize] = data;
        Ok(())
    }

    /// Serialize and compress the map into file form.
    pub fn to_bytes(&self, compressor: &dyn Compressor) -> Result<Vec<u8>> {
        let total: usize = self.sections.iter().map(Vec::len).sum();
        let mut body = Vec::with_capacity(TABLE_SIZE + total);

        let mut pointer = self.base_pointer as usize;
        for section in &self.sections {
            let value = u32::try_from(pointer).map_err(|_| ScriptError::SectionTooLarge {
                what: "section pointer",
                value: pointer,
            })?;
            body.extend_from_slice(&value.to_le_bytes());
            pointer += section.len();
        }
        for section in &self.sections {
            body.extend_from_slice(section);
        }

        let packed = compressor.compress(&body)?;
        let size = u32::try_from(packed.len()).map_err(|_| ScriptError::SectionTooLarge {
            what: "compressed map size",
            value: packed.len(),
        })?;

        let mut out = Vec::with_capacity(4 + packed.len());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&packed);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lzss::Lzss;
    use crate::opcode::op;
    use crate::testutil::{AsciiFieldText, StoredCompressor};

    const BASE: u32 = 0x8010_0000;

    fn event_bytes() -> Vec<u8> {
        let mut data = vec![0u8; 32 + 8 + 64];
        data[0..2].copy_from_slice(&0x0502u16.to_le_bytes());
        data[2] = 1;
        let string_table = (data.len() + 1) as u16;
        data[4..6].copy_from_slice(&string_table.to_le_bytes());
        data[32..37].copy_from_slice(b"actor");
        let base = 32 + 8;
        for slot in 0..32 {
            let at = base + slot * 2;
            data[at..at + 2].copy_from_slice(&(104u16).to_le_bytes());
        }
        data.push(op::RET);
        // one string "A"
        data.extend_from_slice(&[0x01, 0x00, 0x04, 0x00, 0x21, 0xFF]);
        data
    }

    fn map_file(sections: &[Vec<u8>], compressor: &dyn Compressor) -> Vec<u8> {
        let mut body = Vec::new();
        let mut pointer = BASE;
        for s in sections {
            body.extend_from_slice(&pointer.to_le_bytes());
            pointer += s.len() as u32;
        }
        for s in sections {
            body.extend_from_slice(s);
        }
        let packed = compressor.compress(&body).unwrap();
        let mut file = (packed.len() as u32).to_le_bytes().to_vec();
        file.extend_from_slice(&packed);
        file
    }

    fn sections() -> Vec<Vec<u8>> {
        let mut sections = vec![event_bytes()];
        for i in 1..NUM_SECTIONS {
            sections.push(vec![i as u8; i * 4]);
        }
        sections
    }

    #[test]
    fn sections_are_split_by_pointers() {
        let file = map_file(&sections(), &StoredCompressor);
        let map = MapData::parse(&file, &StoredCompressor).unwrap();

        assert_eq!(map.base_pointer, BASE);
        assert_eq!(map.section(Section::Event), event_bytes().as_slice());
        assert_eq!(map.section(Section::Walkmesh), &[1, 1, 1, 1]);
        assert_eq!(map.section(Section::Model), vec![6u8; 24].as_slice());
    }

    #[test]
    fn unchanged_map_writes_back_identically() {
        let file = map_file(&sections(), &StoredCompressor);
        let map = MapData::parse(&file, &StoredCompressor).unwrap();
        assert_eq!(map.to_bytes(&StoredCompressor).unwrap(), file);
    }

    #[test]
    fn edited_event_section_is_padded_and_relinked() {
        let file = map_file(&sections(), &Lzss);
        let mut map = MapData::parse(&file, &Lzss).unwrap();

        let mut event = map.event_section().unwrap();
        assert_eq!(event.actor_names, vec!["actor"]);
        event
            .set_strings(&AsciiFieldText, ["Hello there"], false)
            .unwrap();
        map.set_event_section(&event).unwrap();
        assert_eq!(map.section(Section::Event).len() % 4, 0);

        let reread = MapData::parse(&map.to_bytes(&Lzss).unwrap(), &Lzss).unwrap();
        assert_eq!(reread.section(Section::Walkmesh), &[1, 1, 1, 1]);
        assert_eq!(
            reread.event_section().unwrap().strings(&AsciiFieldText, false).unwrap(),
            vec!["Hello there"]
        );
    }

    #[test]
    fn truncated_file_is_malformed() {
        assert!(matches!(
            MapData::parse(&[0x10, 0, 0, 0, 1, 2], &StoredCompressor),
            Err(ScriptError::MalformedContainer(_))
        ));
        assert!(matches!(
            MapData::parse(&[4, 0, 0, 0, 1, 2, 3, 4], &StoredCompressor),
            Err(ScriptError::MalformedContainer(_))
        ));
    }

    #[test]
    fn descending_pointers_are_malformed() {
        let mut body = Vec::new();
        for p in [BASE, BASE + 8, BASE + 4, BASE + 8, BASE + 8, BASE + 8, BASE + 8] {
            body.extend_from_slice(&p.to_le_bytes());
        }
        body.extend_from_slice(&[0u8; 8]);
        let mut file = (body.len() as u32).to_le_bytes().to_vec();
        file.extend_from_slice(&body);
        assert!(matches!(
            MapData::parse(&file, &StoredCompressor),
            Err(ScriptError::MalformedContainer(_))
        ));
    }
}
