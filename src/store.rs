use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::info;

use crate::error::{CartaError, Result};
use crate::io::scanner::{FileScanner, ScannerMode};
use crate::model::{FileOffset, RefType};

const DEFAULT_CACHE_SIZE: usize = 1000;

/// A decodable entity stored in one of the blob data files.
pub trait BlobRecord: Send + Sync + Sized + 'static {
    const KIND: RefType;

    /// Decodes one record payload. `file_offset` is the record's identity
    /// (the position of its length prefix).
    fn read(file_offset: FileOffset, scanner: &mut FileScanner) -> Result<Self>;
}

impl BlobRecord for crate::model::Node {
    const KIND: RefType = RefType::Node;

    fn read(file_offset: FileOffset, scanner: &mut FileScanner) -> Result<Self> {
        crate::model::Node::read(file_offset, scanner)
    }
}

impl BlobRecord for crate::model::Way {
    const KIND: RefType = RefType::Way;

    fn read(file_offset: FileOffset, scanner: &mut FileScanner) -> Result<Self> {
        crate::model::Way::read(file_offset, scanner)
    }
}

impl BlobRecord for crate::model::Area {
    const KIND: RefType = RefType::Area;

    fn read(file_offset: FileOffset, scanner: &mut FileScanner) -> Result<Self> {
        crate::model::Area::read(file_offset, scanner)
    }
}

/// Cache hit/miss counters of one blob store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheState<T> {
    entries: LruCache<FileOffset, Arc<T>>,
    stats: CacheStats,
}

/// One blob data file (`nodes.dat`, `ways.dat`, `areas.dat`) fronted by a
/// fixed-capacity LRU cache keyed by file offset.
///
/// The mutex guards only the cache map; record decoding runs outside the
/// critical section on a duplicated scanner (a positioned read against the
/// shared handle, or a shared memory map). Decoded entities are immutable and
/// shared between the cache and all callers.
pub struct DataFile<T: BlobRecord> {
    filename: String,
    scanner: FileScanner,
    cache: Mutex<CacheState<T>>,
}

impl<T: BlobRecord> DataFile<T> {
    pub fn open(
        dir: &Path,
        filename: &str,
        mode: ScannerMode,
        cache_size: usize,
    ) -> Result<Self> {
        let scanner = FileScanner::open(dir.join(filename), mode)?;
        let capacity = NonZeroUsize::new(cache_size)
            .unwrap_or_else(|| NonZeroUsize::new(DEFAULT_CACHE_SIZE).expect("nonzero default"));
        Ok(Self {
            filename: filename.to_owned(),
            scanner,
            cache: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
        })
    }

    /// Resolves one entity, decoding on cache miss. The entry becomes the
    /// most recently used one.
    pub fn get_by_offset(&self, offset: FileOffset) -> Result<Arc<T>> {
        {
            let mut cache = self.cache.lock();
            if let Some(entry) = cache.entries.get(&offset) {
                let entry = Arc::clone(entry);
                cache.stats.hits += 1;
                return Ok(entry);
            }
            cache.stats.misses += 1;
        }

        let value = Arc::new(self.decode(offset)?);

        let mut cache = self.cache.lock();
        if let Some((evicted, _)) = cache.entries.push(offset, Arc::clone(&value)) {
            if evicted != offset {
                cache.stats.evictions += 1;
            }
        }
        Ok(value)
    }

    /// Batch lookup returning entities in the same order as `offsets`. Reads
    /// are issued in ascending offset order for locality, then reordered.
    pub fn get_by_offsets(&self, offsets: &[FileOffset]) -> Result<Vec<Arc<T>>> {
        let mut order: Vec<usize> = (0..offsets.len()).collect();
        order.sort_by_key(|&idx| offsets[idx]);

        let mut results: Vec<Option<Arc<T>>> = vec![None; offsets.len()];
        for idx in order {
            results[idx] = Some(self.get_by_offset(offsets[idx])?);
        }
        Ok(results
            .into_iter()
            .map(|entry| entry.expect("every slot filled above"))
            .collect())
    }

    /// Unordered batch lookup keyed by offset.
    pub fn get_by_offset_set(
        &self,
        offsets: impl IntoIterator<Item = FileOffset>,
    ) -> Result<FxHashMap<FileOffset, Arc<T>>> {
        let mut sorted: Vec<FileOffset> = offsets.into_iter().collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut map = FxHashMap::default();
        for offset in sorted {
            map.insert(offset, self.get_by_offset(offset)?);
        }
        Ok(map)
    }

    fn decode(&self, offset: FileOffset) -> Result<T> {
        if offset >= self.scanner.len() {
            return Err(CartaError::IndexMiss {
                kind: T::KIND,
                offset,
            });
        }

        let mut scanner = self.scanner.duplicate()?;
        scanner.set_pos(offset)?;
        let payload_len = scanner.read_var_u64()?;
        let payload_start = scanner.pos();
        if payload_len > scanner.remaining() {
            return Err(CartaError::Corrupt(format!(
                "{} record at offset {offset} overruns the file",
                self.filename
            )));
        }

        let value = T::read(offset, &mut scanner)?;
        if scanner.pos() - payload_start != payload_len {
            return Err(CartaError::Corrupt(format!(
                "{} record at offset {offset} has inconsistent length",
                self.filename
            )));
        }
        Ok(value)
    }

    /// Empties the cache without closing the file. Statistics survive.
    pub fn flush_cache(&self) {
        self.cache.lock().entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.lock().stats
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.lock().entries.len()
    }

    pub fn dump_statistics(&self) {
        let cache = self.cache.lock();
        info!(
            file = %self.filename,
            entries = cache.entries.len(),
            hits = cache.stats.hits,
            misses = cache.stats.misses,
            evictions = cache.stats.evictions,
            hit_rate = cache.stats.hit_rate(),
            "blob cache statistics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::GeoCoord;
    use crate::io::writer::put_var_u64;
    use crate::model::Node;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_nodes(dir: &Path, nodes: &[Node]) -> Vec<FileOffset> {
        let mut buf = Vec::new();
        let mut offsets = Vec::new();
        for node in nodes {
            offsets.push(buf.len() as FileOffset);
            let payload = node.encode();
            put_var_u64(&mut buf, payload.len() as u64);
            buf.extend_from_slice(&payload);
        }
        let mut file = std::fs::File::create(dir.join("nodes.dat")).expect("create");
        file.write_all(&buf).expect("write");
        offsets
    }

    fn sample_nodes(count: usize) -> Vec<Node> {
        (0..count)
            .map(|i| Node {
                file_offset: 0,
                type_id: 1,
                coord: GeoCoord::new(48.0 + i as f64 * 0.01, 11.0),
                tags: Vec::new(),
            })
            .collect()
    }

    #[test]
    fn decode_and_cache_round_trip() {
        let dir = tempdir().expect("temp dir");
        let offsets = write_nodes(dir.path(), &sample_nodes(3));
        let data =
            DataFile::<Node>::open(dir.path(), "nodes.dat", ScannerMode::LowMemRandom, 10)
                .expect("open");

        let first = data.get_by_offset(offsets[1]).expect("decode");
        assert_eq!(first.file_offset, offsets[1]);

        let again = data.get_by_offset(offsets[1]).expect("cached");
        assert!(Arc::ptr_eq(&first, &again));

        let stats = data.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn batch_preserves_input_order() {
        let dir = tempdir().expect("temp dir");
        let offsets = write_nodes(dir.path(), &sample_nodes(4));
        let data =
            DataFile::<Node>::open(dir.path(), "nodes.dat", ScannerMode::MemoryMapped, 10)
                .expect("open");

        let shuffled = vec![offsets[2], offsets[0], offsets[3], offsets[1]];
        let nodes = data.get_by_offsets(&shuffled).expect("batch");
        let resolved: Vec<FileOffset> = nodes.iter().map(|n| n.file_offset).collect();
        assert_eq!(resolved, shuffled);
    }

    #[test]
    fn strict_lru_eviction_bounds_the_cache() {
        let dir = tempdir().expect("temp dir");
        let offsets = write_nodes(dir.path(), &sample_nodes(3));
        let data =
            DataFile::<Node>::open(dir.path(), "nodes.dat", ScannerMode::LowMemRandom, 2)
                .expect("open");

        for &offset in &offsets {
            data.get_by_offset(offset).expect("decode");
        }
        assert_eq!(data.cached_entries(), 2);

        // Offset 0 was evicted, so fetching it again is a second miss.
        data.get_by_offset(offsets[0]).expect("decode");
        let stats = data.stats();
        assert_eq!(stats.misses, 4);
        assert_eq!(stats.hits, 0);
        assert!(stats.evictions >= 2);
    }

    #[test]
    fn miss_beyond_file_end_is_index_miss() {
        let dir = tempdir().expect("temp dir");
        write_nodes(dir.path(), &sample_nodes(1));
        let data =
            DataFile::<Node>::open(dir.path(), "nodes.dat", ScannerMode::LowMemRandom, 2)
                .expect("open");
        let err = data.get_by_offset(10_000).unwrap_err();
        assert!(matches!(err, CartaError::IndexMiss { .. }));
    }

    #[test]
    fn flush_cache_keeps_statistics() {
        let dir = tempdir().expect("temp dir");
        let offsets = write_nodes(dir.path(), &sample_nodes(2));
        let data =
            DataFile::<Node>::open(dir.path(), "nodes.dat", ScannerMode::LowMemRandom, 4)
                .expect("open");
        data.get_by_offset(offsets[0]).expect("decode");
        data.flush_cache();
        assert_eq!(data.cached_entries(), 0);
        assert_eq!(data.stats().misses, 1);

        data.get_by_offset(offsets[0]).expect("decode again");
        assert_eq!(data.stats().misses, 2);
    }
}
