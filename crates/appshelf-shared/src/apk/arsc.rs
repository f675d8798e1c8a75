//! Decoder for `resources.arsc`, reduced to what the parser needs: resolving
//! a resource id to its per-configuration values so that labels and launcher
//! icons referenced from the manifest can be looked up.

use std::collections::HashMap;

use super::res::{
    child_chunks, u16_at, u32_at, u8_at, ChunkHeader, ResValue, Result, StringPool, NO_ENTRY,
    RES_STRING_POOL_TYPE, RES_TABLE_PACKAGE_TYPE, RES_TABLE_TYPE, RES_TABLE_TYPE_TYPE,
    TYPE_REFERENCE, TYPE_STRING,
};

const FLAG_SPARSE: u8 = 0x01;
const FLAG_OFFSET16: u8 = 0x02;

const ENTRY_FLAG_COMPLEX: u16 = 0x0001;
const ENTRY_FLAG_COMPACT: u16 = 0x0008;

/// References are followed at most this many hops.
const MAX_REFERENCE_DEPTH: usize = 8;

/// The parts of `ResTable_config` the parser cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Config {
    pub language: [u8; 2],
    pub density: u16,
}

#[derive(Debug, Clone, Copy)]
struct TableEntry {
    config: Config,
    data_type: u8,
    data: u32,
}

#[derive(Debug, Default)]
pub(crate) struct ResourceTable {
    strings: StringPool,
    entries: HashMap<u32, Vec<TableEntry>>,
}

impl ResourceTable {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let root = ChunkHeader::read(data, 0)?.expect(RES_TABLE_TYPE)?;
        let mut table = ResourceTable::default();

        for chunk in child_chunks(data, root.body_start(), root.end())? {
            match chunk.kind {
                RES_STRING_POOL_TYPE => table.strings = StringPool::parse(data, chunk)?,
                RES_TABLE_PACKAGE_TYPE => table.read_package(data, chunk)?,
                _ => {}
            }
        }

        Ok(table)
    }

    fn read_package(&mut self, data: &[u8], package: ChunkHeader) -> Result<()> {
        let package_id = u32_at(data, package.offset + 8)?;

        for chunk in child_chunks(data, package.body_start(), package.end())? {
            if chunk.kind == RES_TABLE_TYPE_TYPE {
                self.read_type(data, chunk, package_id)?;
            }
        }
        Ok(())
    }

    fn read_type(&mut self, data: &[u8], chunk: ChunkHeader, package_id: u32) -> Result<()> {
        let base = chunk.offset;
        let type_id = u8_at(data, base + 8)? as u32;
        let flags = u8_at(data, base + 9)?;
        let entry_count = u32_at(data, base + 12)? as usize;
        let entries_start = base + u32_at(data, base + 16)? as usize;

        let config_start = base + 20;
        let config_size = u32_at(data, config_start)? as usize;
        let config = Config {
            language: [
                u8_at(data, config_start + 8)?,
                u8_at(data, config_start + 9)?,
            ],
            density: if config_size >= 16 {
                u16_at(data, config_start + 14)?
            } else {
                0
            },
        };

        let offsets_start = chunk.body_start();
        for i in 0..entry_count {
            let (index, offset) = if flags & FLAG_SPARSE != 0 {
                let at = offsets_start + i * 4;
                (u16_at(data, at)? as u32, u16_at(data, at + 2)? as usize * 4)
            } else if flags & FLAG_OFFSET16 != 0 {
                match u16_at(data, offsets_start + i * 2)? {
                    0xFFFF => continue,
                    off => (i as u32, off as usize * 4),
                }
            } else {
                match u32_at(data, offsets_start + i * 4)? {
                    NO_ENTRY => continue,
                    off => (i as u32, off as usize),
                }
            };

            let Some((data_type, value)) = read_entry_value(data, entries_start + offset)? else {
                continue;
            };

            let id = (package_id << 24) | (type_id << 16) | index;
            self.entries.entry(id).or_default().push(TableEntry {
                config,
                data_type,
                data: value,
            });
        }
        Ok(())
    }

    /// Resolve `id` to text, preferring the default-locale value.
    pub fn resolve_string(&self, id: u32) -> Option<String> {
        self.resolve_string_at(id, 0)
    }

    fn resolve_string_at(&self, id: u32, depth: usize) -> Option<String> {
        if depth > MAX_REFERENCE_DEPTH {
            return None;
        }
        let candidates = self.entries.get(&id)?;
        let entry = candidates
            .iter()
            .find(|e| e.config.language == [0, 0])
            .or_else(|| candidates.first())?;

        match ResValue::decode(entry.data_type, entry.data, &self.strings) {
            ResValue::String(s) => Some(s),
            ResValue::Int(i) => Some(i.to_string()),
            ResValue::Bool(b) => Some(b.to_string()),
            ResValue::Reference(next) => self.resolve_string_at(next, depth + 1),
            ResValue::Other { .. } => None,
        }
    }

    /// Every file path `id` resolves to, with the density of its configuration.
    pub fn resolve_files(&self, id: u32) -> Vec<(u16, String)> {
        let mut files = Vec::new();
        self.collect_files(id, None, 0, &mut files);
        files
    }

    fn collect_files(
        &self,
        id: u32,
        density: Option<u16>,
        depth: usize,
        files: &mut Vec<(u16, String)>,
    ) {
        if depth > MAX_REFERENCE_DEPTH {
            return;
        }
        let Some(candidates) = self.entries.get(&id) else {
            return;
        };

        for entry in candidates {
            // an alias keeps the density of the configuration that points at it
            let density = density.unwrap_or(entry.config.density);
            match entry.data_type {
                TYPE_STRING => {
                    if let Some(path) = self.strings.get(entry.data) {
                        files.push((density, path.to_string()));
                    }
                }
                TYPE_REFERENCE => self.collect_files(entry.data, Some(density), depth + 1, files),
                _ => {}
            }
        }
    }
}

/// The `(data_type, data)` of a simple entry; `None` for map entries.
fn read_entry_value(data: &[u8], at: usize) -> Result<Option<(u8, u32)>> {
    let size = u16_at(data, at)? as usize;
    let flags = u16_at(data, at + 2)?;

    if flags & ENTRY_FLAG_COMPACT != 0 {
        return Ok(Some(((flags >> 8) as u8, u32_at(data, at + 4)?)));
    }
    if flags & ENTRY_FLAG_COMPLEX != 0 {
        return Ok(None);
    }

    let value = at + size;
    Ok(Some((u8_at(data, value + 3)?, u32_at(data, value + 4)?)))
}
