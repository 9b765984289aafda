//! RIFF chunk tree and serializer
//!
//! Chunks are assembled in memory and written in one pass. Large payloads
//! are declared as reserved chunks: the serializer writes their header,
//! zero-fills the body and reports where the body starts so it can be
//! filled in afterwards.

use std::io::{self, Read, Seek, Write};

/// A four character chunk identifier.
pub type FourCC = [u8; 4];

pub const RIFF_ID: FourCC = *b"RIFF";
pub const LIST_ID: FourCC = *b"LIST";

/// Bytes taken by a chunk header (id + size).
pub const CHUNK_HEADER_SIZE: u64 = 8;

#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    Data { id: FourCC, body: Vec<u8> },
    Reserved { id: FourCC, len: u32 },
    List { kind: FourCC, children: Vec<Chunk> },
}

/// Location of a reserved chunk body in the written stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservedSpan {
    pub id: FourCC,
    pub offset: u64,
    pub len: u32,
}

impl Chunk {
    pub fn data(id: &FourCC, body: Vec<u8>) -> Self {
        Chunk::Data { id: *id, body }
    }

    pub fn list(kind: &FourCC, children: Vec<Chunk>) -> Self {
        Chunk::List { kind: *kind, children }
    }

    /// NUL-terminated string chunk as used in INFO lists.
    pub fn zstr(id: &FourCC, text: &str) -> Self {
        let mut body: Vec<u8> = text
            .chars()
            .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
            .collect();
        body.push(0);
        Chunk::data(id, body)
    }

    /// Size field value: body length without header or pad byte.
    pub fn size(&self) -> u64 {
        match self {
            Chunk::Data { body, .. } => body.len() as u64,
            Chunk::Reserved { len, .. } => *len as u64,
            Chunk::List { children, .. } => 4 + children.iter().map(Chunk::stored_len).sum::<u64>(),
        }
    }

    /// Bytes the chunk takes in the stream, header and pad byte included.
    pub fn stored_len(&self) -> u64 {
        let size = self.size();
        CHUNK_HEADER_SIZE + size + (size & 1)
    }

    fn header_id(&self) -> &FourCC {
        match self {
            Chunk::Data { id, .. } | Chunk::Reserved { id, .. } => id,
            Chunk::List { .. } => &LIST_ID,
        }
    }
}

/// Write a complete `RIFF` form and return every reserved body location.
pub fn write_form<W: Write + Seek>(out: &mut W, form: &FourCC, children: &[Chunk]) -> io::Result<Vec<ReservedSpan>> {
    let size = 4 + children.iter().map(Chunk::stored_len).sum::<u64>();
    let size = checked_size(size)?;

    let mut pos = out.stream_position()?;
    out.write_all(&RIFF_ID)?;
    out.write_all(&size.to_le_bytes())?;
    out.write_all(form)?;
    pos += CHUNK_HEADER_SIZE + 4;

    let mut spans = Vec::new();
    for chunk in children {
        pos = write_chunk(out, chunk, pos, &mut spans)?;
    }
    Ok(spans)
}

fn write_chunk<W: Write>(out: &mut W, chunk: &Chunk, mut pos: u64, spans: &mut Vec<ReservedSpan>) -> io::Result<u64> {
    let size = checked_size(chunk.size())?;
    out.write_all(chunk.header_id())?;
    out.write_all(&size.to_le_bytes())?;
    pos += CHUNK_HEADER_SIZE;

    match chunk {
        Chunk::Data { body, .. } => {
            out.write_all(body)?;
            pos += body.len() as u64;
        }
        Chunk::Reserved { id, len } => {
            spans.push(ReservedSpan { id: *id, offset: pos, len: *len });
            io::copy(&mut io::repeat(0).take(*len as u64), out)?;
            pos += *len as u64;
        }
        Chunk::List { kind, children } => {
            out.write_all(kind)?;
            pos += 4;
            for child in children {
                pos = write_chunk(out, child, pos, spans)?;
            }
        }
    }

    if size & 1 == 1 {
        out.write_all(&[0])?;
        pos += 1;
    }
    Ok(pos)
}

fn checked_size(size: u64) -> io::Result<u32> {
    u32::try_from(size).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("chunk of {} bytes exceeds the RIFF size limit", size))
    })
}

/// Little-endian field packing for chunk bodies
#[derive(Debug, Default)]
pub struct Body(Vec<u8>);

impl Body {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.0.push(v);
        self
    }

    pub fn u16(mut self, v: u16) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i16(mut self, v: i16) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i32(mut self, v: i32) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn zeros(mut self, n: usize) -> Self {
        self.0.resize(self.0.len() + n, 0);
        self
    }

    /// Fixed width text field, NUL padded and truncated to `width`.
    pub fn fixed_str(mut self, text: &str, width: usize) -> Self {
        let start = self.0.len();
        self.0.extend(text.bytes().take(width));
        self.0.resize(start + width, 0);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.0
    }
}
