use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;

use crate::error::{CartaError, Result};
use crate::geom::GeoCoord;

/// Access strategy for an opened dataset file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerMode {
    /// Buffered sequential reads; cheapest for one front-to-back pass.
    Sequential,
    /// Positioned reads against a shared file handle; no resident buffer.
    LowMemRandom,
    /// Whole file mapped read-only into memory.
    MemoryMapped,
}

#[derive(Debug, Clone)]
enum StickyError {
    Io(io::ErrorKind, String),
    Corrupt(String),
}

impl StickyError {
    fn capture(err: &CartaError) -> Self {
        match err {
            CartaError::Io(inner) => StickyError::Io(inner.kind(), inner.to_string()),
            CartaError::Corrupt(msg) => StickyError::Corrupt(msg.clone()),
            other => StickyError::Corrupt(other.to_string()),
        }
    }

    fn replay(&self) -> CartaError {
        match self {
            StickyError::Io(kind, msg) => CartaError::Io(io::Error::new(*kind, msg.clone())),
            StickyError::Corrupt(msg) => CartaError::Corrupt(msg.clone()),
        }
    }
}

enum Backend {
    Buffered(BufReader<File>),
    Random(Arc<File>),
    Mapped(Arc<Mmap>),
}

#[cfg(unix)]
fn read_at_exact(file: &File, mut off: u64, mut dst: &mut [u8]) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    while !dst.is_empty() {
        let read = file.read_at(dst, off)?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read_at reached EOF",
            ));
        }
        let (_, tail) = dst.split_at_mut(read);
        dst = tail;
        off += read as u64;
    }
    Ok(())
}

#[cfg(windows)]
fn read_at_exact(file: &File, mut off: u64, mut dst: &mut [u8]) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !dst.is_empty() {
        let read = file.seek_read(dst, off)?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "seek_read reached EOF",
            ));
        }
        let (_, tail) = dst.split_at_mut(read);
        dst = tail;
        off += read as u64;
    }
    Ok(())
}

/// Read-only cursor over one dataset file with the primitive decoders of the
/// binary format: fixed-width little-endian integers, 7-bit variable-length
/// integers, length-prefixed UTF-8 strings and scaled coordinate pairs.
///
/// The first failed read latches; every following read short-circuits with
/// the captured failure until [`close`](Self::close) clears it.
pub struct FileScanner {
    path: PathBuf,
    mode: ScannerMode,
    backend: Option<Backend>,
    len: u64,
    pos: u64,
    error: Option<StickyError>,
}

impl FileScanner {
    pub fn open(path: impl AsRef<Path>, mode: ScannerMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let len = file.metadata()?.len();

        let backend = match mode {
            ScannerMode::Sequential => Backend::Buffered(BufReader::new(file)),
            ScannerMode::LowMemRandom => Backend::Random(Arc::new(file)),
            ScannerMode::MemoryMapped => {
                if len == 0 {
                    // Zero-length files cannot be mapped.
                    Backend::Random(Arc::new(file))
                } else {
                    Backend::Mapped(Arc::new(unsafe { Mmap::map(&file)? }))
                }
            }
        };

        Ok(Self {
            path,
            mode,
            backend: Some(backend),
            len,
            pos: 0,
            error: None,
        })
    }

    /// Independent scanner over the same file, positioned at the start.
    /// Random and mapped scanners share the underlying handle; sequential
    /// scanners are reopened from the path.
    pub fn duplicate(&self) -> Result<Self> {
        match &self.backend {
            Some(Backend::Random(file)) => Ok(Self {
                path: self.path.clone(),
                mode: self.mode,
                backend: Some(Backend::Random(Arc::clone(file))),
                len: self.len,
                pos: 0,
                error: None,
            }),
            Some(Backend::Mapped(map)) => Ok(Self {
                path: self.path.clone(),
                mode: self.mode,
                backend: Some(Backend::Mapped(Arc::clone(map))),
                len: self.len,
                pos: 0,
                error: None,
            }),
            _ => Self::open(&self.path, self.mode),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn close(&mut self) {
        self.backend = None;
        self.error = None;
        self.pos = 0;
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn pos(&self) -> u64 {
        self.pos
    }

    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.pos)
    }

    pub fn set_pos(&mut self, pos: u64) -> Result<()> {
        self.check()?;
        if let Some(Backend::Buffered(reader)) = self.backend.as_mut() {
            if let Err(err) = reader.seek(SeekFrom::Start(pos)) {
                return Err(self.latch(CartaError::Io(err)));
            }
        }
        self.pos = pos;
        Ok(())
    }

    fn check(&self) -> Result<()> {
        if let Some(sticky) = &self.error {
            return Err(sticky.replay());
        }
        if self.backend.is_none() {
            return Err(CartaError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "scanner is closed",
            )));
        }
        Ok(())
    }

    fn latch(&mut self, err: CartaError) -> CartaError {
        self.error = Some(StickyError::capture(&err));
        err
    }

    fn fill(&mut self, out: &mut [u8]) -> Result<()> {
        self.check()?;
        let result = match self.backend.as_mut().expect("checked above") {
            Backend::Buffered(reader) => reader.read_exact(out).map_err(CartaError::Io),
            Backend::Random(file) => {
                read_at_exact(file, self.pos, out).map_err(CartaError::Io)
            }
            Backend::Mapped(map) => {
                let start = self.pos as usize;
                let end = start + out.len();
                if end > map.len() {
                    Err(CartaError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "read past end of mapped file",
                    )))
                } else {
                    out.copy_from_slice(&map[start..end]);
                    Ok(())
                }
            }
        };
        match result {
            Ok(()) => {
                self.pos += out.len() as u64;
                Ok(())
            }
            Err(err) => Err(self.latch(err)),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.fill(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.fill(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.fill(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(self.latch(CartaError::Corrupt(format!(
                "invalid boolean encoding: 0x{other:02X}"
            )))),
        }
    }

    pub fn read_var_u64(&mut self) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift > 63 || (shift == 63 && byte & 0x7F > 1) {
                return Err(self.latch(CartaError::Corrupt(
                    "variable-length integer exceeds 64 bits".into(),
                )));
            }
            result |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    pub fn read_var_u32(&mut self) -> Result<u32> {
        let value = self.read_var_u64()?;
        u32::try_from(value).map_err(|_| {
            self.latch(CartaError::Corrupt(format!(
                "value {value} exceeds u32 range"
            )))
        })
    }

    pub fn read_var_u16(&mut self) -> Result<u16> {
        let value = self.read_var_u64()?;
        u16::try_from(value).map_err(|_| {
            self.latch(CartaError::Corrupt(format!(
                "value {value} exceeds u16 range"
            )))
        })
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_var_u64()?;
        if len > self.remaining() {
            return Err(self.latch(CartaError::Corrupt(format!(
                "string length {len} exceeds remaining file size"
            ))));
        }
        let mut buf = vec![0u8; len as usize];
        self.fill(&mut buf)?;
        String::from_utf8(buf)
            .map_err(|_| self.latch(CartaError::Corrupt("invalid UTF-8 string".into())))
    }

    pub fn read_coord(&mut self) -> Result<GeoCoord> {
        let lat = self.read_u32()?;
        let lon = self.read_u32()?;
        Ok(GeoCoord::from_scaled(lat, lon))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::writer::{put_coord, put_string, put_var_u64};
    use std::io::Write;
    use tempfile::tempdir;

    fn fixture(payload: &[u8]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("scan.bin");
        let mut file = File::create(&path).expect("create");
        file.write_all(payload).expect("write");
        (dir, path)
    }

    fn sample_payload() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(0x2A);
        buf.extend_from_slice(&0xBEEF_u16.to_le_bytes());
        buf.extend_from_slice(&0xDEAD_BEEF_u32.to_le_bytes());
        put_var_u64(&mut buf, 300);
        put_string(&mut buf, "Isar");
        buf.push(0x01);
        put_coord(&mut buf, GeoCoord::new(48.25, 11.5));
        buf
    }

    fn read_sample(scanner: &mut FileScanner) {
        assert_eq!(scanner.read_u8().expect("u8"), 0x2A);
        assert_eq!(scanner.read_u16().expect("u16"), 0xBEEF);
        assert_eq!(scanner.read_u32().expect("u32"), 0xDEAD_BEEF);
        assert_eq!(scanner.read_var_u64().expect("varuint"), 300);
        assert_eq!(scanner.read_string().expect("string"), "Isar");
        assert!(scanner.read_bool().expect("bool"));
        let coord = scanner.read_coord().expect("coord");
        assert_eq!(coord.lat, 48.25);
        assert_eq!(coord.lon, 11.5);
    }

    #[test]
    fn all_modes_decode_identically() {
        let (_dir, path) = fixture(&sample_payload());
        for mode in [
            ScannerMode::Sequential,
            ScannerMode::LowMemRandom,
            ScannerMode::MemoryMapped,
        ] {
            let mut scanner = FileScanner::open(&path, mode).expect("open");
            read_sample(&mut scanner);
            assert_eq!(scanner.remaining(), 0);
        }
    }

    #[test]
    fn set_pos_rewinds() {
        let (_dir, path) = fixture(&sample_payload());
        let mut scanner = FileScanner::open(&path, ScannerMode::Sequential).expect("open");
        read_sample(&mut scanner);
        scanner.set_pos(0).expect("rewind");
        read_sample(&mut scanner);
    }

    #[test]
    fn error_latches_until_close() {
        let (_dir, path) = fixture(&[0x01]);
        let mut scanner = FileScanner::open(&path, ScannerMode::LowMemRandom).expect("open");
        assert_eq!(scanner.read_u8().expect("first byte"), 1);

        let err = scanner.read_u32().unwrap_err();
        assert!(matches!(err, CartaError::Io(_)));
        assert!(scanner.has_error());

        // Even a read that would succeed on its own short-circuits now.
        scanner.set_pos(0).unwrap_err();
        let err = scanner.read_u8().unwrap_err();
        assert!(matches!(err, CartaError::Io(_)));

        scanner.close();
        assert!(!scanner.has_error());
        assert!(!scanner.is_open());
    }

    #[test]
    fn oversized_string_is_corrupt_not_io() {
        let mut payload = Vec::new();
        put_var_u64(&mut payload, 1_000);
        payload.extend_from_slice(b"abc");
        let (_dir, path) = fixture(&payload);
        let mut scanner = FileScanner::open(&path, ScannerMode::MemoryMapped).expect("open");
        let err = scanner.read_string().unwrap_err();
        assert!(matches!(err, CartaError::Corrupt(_)));
    }

    #[test]
    fn duplicate_starts_at_origin() {
        let (_dir, path) = fixture(&sample_payload());
        let mut scanner = FileScanner::open(&path, ScannerMode::LowMemRandom).expect("open");
        read_sample(&mut scanner);
        let mut dup = scanner.duplicate().expect("duplicate");
        read_sample(&mut dup);
        assert_eq!(scanner.remaining(), 0);
    }
}
