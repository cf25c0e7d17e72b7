use bzip2::{Decompress, Status};

use crate::domain::Compression;
use crate::error::FetchError;

/// Streaming, per-artifact decompression.
pub trait Decompressor: Send {
    fn feed(&mut self, chunk: &[u8]) -> Result<Vec<u8>, FetchError>;

    /// Errors if the stream ended before the compressed payload did.
    fn finish(&mut self) -> Result<(), FetchError>;
}

pub fn decompressor_for(compression: Compression) -> Box<dyn Decompressor> {
    match compression {
        Compression::Bzip2 => Box::new(Bzip2Stream::new()),
    }
}

pub struct Bzip2Stream {
    raw: Decompress,
    done: bool,
}

impl Bzip2Stream {
    pub fn new() -> Self {
        Self {
            raw: Decompress::new(false),
            done: false,
        }
    }
}

impl Default for Bzip2Stream {
    fn default() -> Self {
        Self::new()
    }
}

impl Decompressor for Bzip2Stream {
    fn feed(&mut self, mut chunk: &[u8]) -> Result<Vec<u8>, FetchError> {
        let mut out: Vec<u8> = Vec::with_capacity(chunk.len().saturating_mul(4).max(4096));

        // Bytes after the end-of-stream marker are ignored.
        while !chunk.is_empty() && !self.done {
            if out.len() == out.capacity() {
                out.reserve(out.capacity().max(4096));
            }
            let in_before = self.raw.total_in();
            let out_before = out.len();

            let status = self
                .raw
                .decompress_vec(chunk, &mut out)
                .map_err(|e| FetchError::Decompression(format!("bzip2: {e}")))?;

            let consumed = (self.raw.total_in() - in_before) as usize;
            chunk = &chunk[consumed..];

            if matches!(status, Status::StreamEnd) {
                self.done = true;
            } else if consumed == 0 && out.len() == out_before && out.len() < out.capacity() {
                return Err(FetchError::Decompression("bzip2: decoder made no progress".into()));
            }
        }

        Ok(out)
    }

    fn finish(&mut self) -> Result<(), FetchError> {
        if self.done {
            Ok(())
        } else {
            Err(FetchError::Decompression("bzip2: truncated stream".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use bzip2::Compression as Level;
    use bzip2::write::BzEncoder;

    use super::*;

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut enc = BzEncoder::new(Vec::new(), Level::best());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn decodes_across_small_chunks() {
        let payload: Vec<u8> = (0..50_000u32).flat_map(|i| (i % 251).to_le_bytes()).collect();
        let packed = compress(&payload);

        let mut d = Bzip2Stream::new();
        let mut out = Vec::new();
        for chunk in packed.chunks(97) {
            out.extend(d.feed(chunk).unwrap());
        }
        d.finish().unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let packed = compress(b"GRIB payload that will be cut short, and then cut short again");
        let mut d = Bzip2Stream::new();
        let _ = d.feed(&packed[..packed.len() / 2]).unwrap();
        assert!(matches!(d.finish(), Err(FetchError::Decompression(_))));
    }

    #[test]
    fn garbage_is_an_error() {
        let mut d = decompressor_for(Compression::Bzip2);
        assert!(d.feed(b"definitely not bzip2 data at all").is_err());
    }
}
