//! Little-endian readers for Android's chunked binary resource formats
//! (compiled XML and the resource table share the same chunk framing and
//! string pool layout).

use thiserror::Error;

pub(crate) const RES_STRING_POOL_TYPE: u16 = 0x0001;
pub(crate) const RES_TABLE_TYPE: u16 = 0x0002;
pub(crate) const RES_XML_TYPE: u16 = 0x0003;
pub(crate) const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;
pub(crate) const RES_XML_RESOURCE_MAP_TYPE: u16 = 0x0180;
pub(crate) const RES_TABLE_PACKAGE_TYPE: u16 = 0x0200;
pub(crate) const RES_TABLE_TYPE_TYPE: u16 = 0x0201;

/// Marks an absent string reference or entry offset.
pub(crate) const NO_ENTRY: u32 = 0xFFFF_FFFF;

// Res_value data types
pub(crate) const TYPE_REFERENCE: u8 = 0x01;
pub(crate) const TYPE_STRING: u8 = 0x03;
pub(crate) const TYPE_INT_DEC: u8 = 0x10;
pub(crate) const TYPE_INT_HEX: u8 = 0x11;
pub(crate) const TYPE_INT_BOOLEAN: u8 = 0x12;

const UTF8_FLAG: u32 = 1 << 8;

#[derive(Error, Debug)]
pub enum ResError {
    #[error("truncated resource data at offset {0}")]
    Truncated(usize),

    #[error("unexpected chunk type {found:#06x} (expected {expected:#06x})")]
    UnexpectedChunk { expected: u16, found: u16 },

    #[error("malformed chunk at offset {0}")]
    MalformedChunk(usize),
}

pub(crate) type Result<T> = std::result::Result<T, ResError>;

pub(crate) fn u8_at(data: &[u8], off: usize) -> Result<u8> {
    data.get(off).copied().ok_or(ResError::Truncated(off))
}

pub(crate) fn u16_at(data: &[u8], off: usize) -> Result<u16> {
    let bytes = data.get(off..off + 2).ok_or(ResError::Truncated(off))?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn u32_at(data: &[u8], off: usize) -> Result<u32> {
    let bytes = data.get(off..off + 4).ok_or(ResError::Truncated(off))?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// The `ResChunk_header` every chunk starts with.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChunkHeader {
    pub offset: usize,
    pub kind: u16,
    pub header_size: usize,
    pub size: usize,
}

impl ChunkHeader {
    pub fn read(data: &[u8], offset: usize) -> Result<Self> {
        let kind = u16_at(data, offset)?;
        let header_size = u16_at(data, offset + 2)? as usize;
        let size = u32_at(data, offset + 4)? as usize;

        if size < 8 || header_size < 8 || header_size > size || offset + size > data.len() {
            return Err(ResError::MalformedChunk(offset));
        }

        Ok(Self {
            offset,
            kind,
            header_size,
            size,
        })
    }

    pub fn expect(self, expected: u16) -> Result<Self> {
        if self.kind != expected {
            return Err(ResError::UnexpectedChunk {
                expected,
                found: self.kind,
            });
        }
        Ok(self)
    }

    pub fn body_start(&self) -> usize {
        self.offset + self.header_size
    }

    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Read the consecutive chunks in `data[start..end]`.
pub(crate) fn child_chunks(data: &[u8], start: usize, end: usize) -> Result<Vec<ChunkHeader>> {
    let mut chunks = Vec::new();
    let mut offset = start;
    while offset + 8 <= end {
        let chunk = ChunkHeader::read(data, offset)?;
        offset = chunk.end();
        chunks.push(chunk);
    }
    Ok(chunks)
}

/// A decoded `ResStringPool`.
#[derive(Debug, Default)]
pub(crate) struct StringPool {
    strings: Vec<String>,
}

impl StringPool {
    pub fn parse(data: &[u8], chunk: ChunkHeader) -> Result<Self> {
        let chunk = chunk.expect(RES_STRING_POOL_TYPE)?;
        let base = chunk.offset;

        let count = u32_at(data, base + 8)? as usize;
        let flags = u32_at(data, base + 16)?;
        let strings_start = base + u32_at(data, base + 20)? as usize;
        let utf8 = flags & UTF8_FLAG != 0;

        let offsets_start = chunk.body_start();
        if offsets_start + count * 4 > chunk.end() {
            return Err(ResError::MalformedChunk(base));
        }

        let mut strings = Vec::with_capacity(count);
        for i in 0..count {
            let at = strings_start + u32_at(data, offsets_start + i * 4)? as usize;
            let value = if utf8 {
                read_utf8(data, at)?
            } else {
                read_utf16(data, at)?
            };
            strings.push(value);
        }

        Ok(Self { strings })
    }

    pub fn get(&self, index: u32) -> Option<&str> {
        if index == NO_ENTRY {
            return None;
        }
        self.strings.get(index as usize).map(String::as_str)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.strings.len()
    }
}

fn read_utf8(data: &[u8], at: usize) -> Result<String> {
    // character count first, then byte count
    let (_, at) = utf8_length(data, at)?;
    let (len, at) = utf8_length(data, at)?;
    let bytes = data.get(at..at + len).ok_or(ResError::Truncated(at))?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn utf8_length(data: &[u8], at: usize) -> Result<(usize, usize)> {
    let first = u8_at(data, at)? as usize;
    if first & 0x80 != 0 {
        let second = u8_at(data, at + 1)? as usize;
        Ok((((first & 0x7F) << 8) | second, at + 2))
    } else {
        Ok((first, at + 1))
    }
}

fn read_utf16(data: &[u8], at: usize) -> Result<String> {
    let first = u16_at(data, at)? as usize;
    let (len, at) = if first & 0x8000 != 0 {
        let second = u16_at(data, at + 2)? as usize;
        (((first & 0x7FFF) << 16) | second, at + 4)
    } else {
        (first, at + 2)
    };

    let units = (0..len)
        .map(|i| u16_at(data, at + i * 2))
        .collect::<Result<Vec<u16>>>()?;
    Ok(String::from_utf16_lossy(&units))
}

/// A typed `Res_value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ResValue {
    String(String),
    Reference(u32),
    Int(i64),
    Bool(bool),
    Other { data_type: u8, data: u32 },
}

impl ResValue {
    pub fn decode(data_type: u8, data: u32, pool: &StringPool) -> Self {
        match data_type {
            TYPE_STRING => match pool.get(data) {
                Some(s) => ResValue::String(s.to_string()),
                None => ResValue::Other { data_type, data },
            },
            TYPE_REFERENCE => ResValue::Reference(data),
            TYPE_INT_DEC | TYPE_INT_HEX => ResValue::Int(i64::from(data as i32)),
            TYPE_INT_BOOLEAN => ResValue::Bool(data != 0),
            _ => ResValue::Other { data_type, data },
        }
    }
}
