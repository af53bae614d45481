// Chunk reader: cuts a memory-mapped dump into byte ranges that each end on a
// statement terminator, so every INSERT lands whole in exactly one chunk.

use crate::error::{IngestError, Result};
use encoding_rs::Encoding;
use memmap2::Mmap;
use std::borrow::Cow;
use std::fs::File;
use std::path::Path;

pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy)]
pub struct RawChunk<'a> {
    pub index: usize,
    pub offset: u64,
    pub bytes: &'a [u8],
}

pub struct ChunkReader {
    mmap: Option<Mmap>,
    chunk_size: usize,
}

impl ChunkReader {
    pub fn open(path: &Path, chunk_size: usize) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        // Zero-length maps are rejected on some platforms; an empty file has no chunks anyway.
        let mmap = if len > 0 {
            unsafe { Some(Mmap::map(&file)?) }
        } else {
            None
        };
        tracing::debug!(path = %path.display(), bytes = len, "mapped dump");
        Ok(Self { mmap, chunk_size })
    }

    pub fn len(&self) -> u64 {
        self.data().len() as u64
    }

    pub fn data(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    // Every call starts again from the first byte.
    pub fn chunks(&self) -> Chunks<'_> {
        chunks_of(self.data(), self.chunk_size)
    }
}

pub fn chunks_of(data: &[u8], chunk_size: usize) -> Chunks<'_> {
    Chunks {
        data,
        chunk_size: chunk_size.max(1),
        pos: 0,
        index: 0,
    }
}

pub struct Chunks<'a> {
    data: &'a [u8],
    chunk_size: usize,
    pos: usize,
    index: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = RawChunk<'a>;

    fn next(&mut self) -> Option<RawChunk<'a>> {
        let len = self.data.len();
        if self.pos >= len {
            return None;
        }
        let start = self.pos;
        let cutoff = start.saturating_add(self.chunk_size).min(len);
        let end = if cutoff == len {
            len
        } else {
            terminator_before(self.data, start, cutoff)
                .or_else(|| terminator_after(self.data, cutoff))
                .unwrap_or(len)
        };

        let chunk = RawChunk {
            index: self.index,
            offset: start as u64,
            bytes: &self.data[start..end],
        };
        self.pos = end;
        self.index += 1;
        Some(chunk)
    }
}

// A ';' closes a statement only at end of line; a ';' inside a quoted key
// is almost never followed by a line break.
fn is_terminator(data: &[u8], i: usize) -> bool {
    data[i] == b';' && matches!(data.get(i + 1), None | Some(b'\n') | Some(b'\r'))
}

// Boundary (exclusive end) of the last terminator in data[start..cutoff].
fn terminator_before(data: &[u8], start: usize, cutoff: usize) -> Option<usize> {
    (start..cutoff).rev().find(|&i| is_terminator(data, i)).map(|i| i + 1)
}

fn terminator_after(data: &[u8], from: usize) -> Option<usize> {
    (from..data.len()).find(|&i| is_terminator(data, i)).map(|i| i + 1)
}

// Ordered list of encodings tried per chunk; the first strict decode wins.
#[derive(Debug, Clone)]
pub struct ChunkDecoder {
    encodings: Vec<&'static Encoding>,
}

impl ChunkDecoder {
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        let mut encodings = Vec::with_capacity(labels.len());
        for label in labels {
            let label = label.as_ref();
            let enc = Encoding::for_label(label.trim().as_bytes())
                .ok_or_else(|| IngestError::Config(format!("unknown encoding '{}'", label)))?;
            encodings.push(enc);
        }
        if encodings.is_empty() {
            return Err(IngestError::Config("no encodings configured".into()));
        }
        Ok(Self { encodings })
    }

    pub fn decode<'a>(&self, chunk: &RawChunk<'a>) -> Result<Cow<'a, str>> {
        let mut bytes = chunk.bytes;
        if chunk.offset == 0 && bytes.starts_with(UTF8_BOM) {
            bytes = &bytes[UTF8_BOM.len()..];
        }
        for enc in &self.encodings {
            if let Some(text) = enc.decode_without_bom_handling_and_without_replacement(bytes) {
                return Ok(text);
            }
        }
        Err(IngestError::Decode {
            offset: chunk.offset,
            tried: self
                .encodings
                .iter()
                .map(|e| e.name())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self {
            encodings: vec![
                encoding_rs::UTF_8,
                encoding_rs::WINDOWS_1251,
                encoding_rs::WINDOWS_1252,
            ],
        }
    }
}
