use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::errors::{Result, TrimError};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A byte stream read in bounded chunks.
///
/// `reached_end` becomes true the first time a read comes back short and stays true.
pub struct ChunkSource<R> {
    reader: R,
    /// Named in read errors; `-` unless set.
    path: PathBuf,
    reached_end: bool,
}

/// Boxed reader used for files and stdin.
pub type DynSource = ChunkSource<Box<dyn Read + Send>>;

impl DynSource {
    /// Opens a path (`-` for stdin), transparently decompressing gzip input.
    pub fn open(path: &Path) -> Result<Self> {
        let unavailable = |source: io::Error| TrimError::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        };
        let raw: Box<dyn Read + Send> = if path.as_os_str() == "-" {
            Box::new(io::stdin())
        } else {
            Box::new(File::open(path).map_err(unavailable)?)
        };
        let mut buffered = BufReader::with_capacity(1 << 16, raw);
        let is_gzip = buffered.fill_buf().map_err(unavailable)?.starts_with(&GZIP_MAGIC);
        let reader: Box<dyn Read + Send> = if is_gzip {
            Box::new(MultiGzDecoder::new(buffered))
        } else {
            Box::new(buffered)
        };
        Ok(ChunkSource::new(reader).with_path(path))
    }
}

impl<R: Read> ChunkSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, path: PathBuf::from("-"), reached_end: false }
    }

    pub fn with_path(mut self, path: &Path) -> Self {
        self.path = path.to_path_buf();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends up to `max_bytes` to `dst`, returning how many were appended.
    ///
    /// Fewer than `max_bytes` are only returned once the stream is exhausted.
    pub fn read_chunk(&mut self, max_bytes: usize, dst: &mut Vec<u8>) -> io::Result<usize> {
        if self.reached_end {
            return Ok(0);
        }
        let start = dst.len();
        dst.resize(start + max_bytes, 0);
        let mut filled = 0;
        while filled < max_bytes {
            match self.reader.read(&mut dst[start + filled..]) {
                Ok(0) => {
                    self.reached_end = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    dst.truncate(start);
                    return Err(e);
                }
            }
        }
        dst.truncate(start + filled);
        Ok(filled)
    }

    pub fn reached_end(&self) -> bool {
        self.reached_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    /// Reader that hands out at most `step` bytes per call.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_fills_chunk_across_short_reads() {
        let mut source = ChunkSource::new(Trickle { data: b"0123456789", step: 3 });
        let mut buf = Vec::new();
        assert_eq!(source.read_chunk(8, &mut buf).unwrap(), 8);
        assert!(!source.reached_end());
        assert_eq!(source.read_chunk(8, &mut buf).unwrap(), 2);
        assert!(source.reached_end());
        assert_eq!(buf, b"0123456789");
        assert_eq!(source.read_chunk(8, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_open_detects_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.fq.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        enc.write_all(b"@r1\nACGT\n+\nIIII\n").unwrap();
        enc.finish().unwrap();

        let mut source = DynSource::open(&path).unwrap();
        let mut buf = Vec::new();
        source.read_chunk(1024, &mut buf).unwrap();
        assert_eq!(buf, b"@r1\nACGT\n+\nIIII\n");
        assert!(source.reached_end());
    }

    #[test]
    fn test_open_missing_file() {
        let err = DynSource::open(Path::new("/definitely/not/here.fq")).err().unwrap();
        assert!(matches!(err, TrimError::SourceUnavailable { .. }));
    }
}
