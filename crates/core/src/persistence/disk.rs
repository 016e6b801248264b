//! Binary snapshot file per cache.
//!
//! Layout (big-endian):
//!
//! ```text
//! u32 entry count
//! per entry:
//!   u8  key tag        1 = UTF-8 string, 2 = bincode
//!   u32 key length, key bytes
//!   i64 milliseconds since last access
//!   u64 usage counter  (LFU caches only)
//!   u32 value length, bincode value bytes
//! ```
//!
//! The file lives at `<directory>/<cache name>.bin`. It is written to a
//! temporary sibling and renamed into place, and deleted once loaded so a
//! crash after startup never restores stale data twice.

use std::any::Any;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::PersistentCacheRepository;
use crate::config::EvictionPolicy;
use crate::entry::{CacheKey, CacheValue, MemCacheEntry};
use crate::error::{CacheError, CacheResult};
use crate::metadata::EntryMetadataFactory;
use crate::store::EntriesView;

const STRING_KEY: u8 = 1;
const SERIALIZED_KEY: u8 = 2;

/// Reasons a snapshot cannot be decoded
#[derive(Debug, Error)]
enum CodecError {
    #[error("snapshot truncated at byte {0}")]
    Truncated(usize),
    #[error("unknown key tag {0}")]
    UnknownKeyTag(u8),
    #[error("string key is not valid UTF-8")]
    InvalidUtf8,
    #[error("string key stored for a non-string key type")]
    KeyTypeMismatch,
    #[error("bincode: {0}")]
    Bincode(String),
    #[error("{0} trailing bytes after last entry")]
    TrailingBytes(usize),
    #[error("block of {0} bytes exceeds the u32 length prefix")]
    BlockTooLarge(usize),
}

/// Disk-backed [`PersistentCacheRepository`]
pub struct DiskPersistentCacheRepository<K, V> {
    cache_name: String,
    path: PathBuf,
    factory: Arc<EntryMetadataFactory>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> std::fmt::Debug for DiskPersistentCacheRepository<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskPersistentCacheRepository")
            .field("cache_name", &self.cache_name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl<K: CacheKey, V: CacheValue> DiskPersistentCacheRepository<K, V> {
    /// Repository for `cache_name` storing its file under `directory`
    pub fn new(cache_name: &str, directory: &Path, factory: Arc<EntryMetadataFactory>) -> Self {
        Self {
            cache_name: cache_name.to_string(),
            path: directory.join(format!("{cache_name}.bin")),
            factory,
            _marker: PhantomData,
        }
    }

    /// Snapshot file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persistence_error(&self, operation: &str, err: impl std::fmt::Display) -> CacheError {
        CacheError::persistence(
            &self.cache_name,
            format!("{operation} {} failed: {err}", self.path.display()),
        )
    }

    fn encode(&self, entries: &EntriesView<'_, K, V>) -> Result<Vec<u8>, CodecError> {
        let lfu = self.factory.policy() == EvictionPolicy::Lfu;
        let now = self.factory.now();
        let mut body = Vec::new();
        let mut count: u32 = 0;

        // Count what is actually written; the view is live and may change.
        for entry in entries.iter() {
            write_key(&mut body, entry.key())?;
            let metadata = entry.metadata();
            body.extend_from_slice(&now.saturating_sub(metadata.last_accessed()).to_be_bytes());
            if lfu {
                body.extend_from_slice(&metadata.usage_count().unwrap_or(0).to_be_bytes());
            }
            write_block(&mut body, &to_bincode(entry.value())?)?;
            count = count.saturating_add(1);
        }

        let mut out = Vec::with_capacity(body.len() + 4);
        out.extend_from_slice(&count.to_be_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<MemCacheEntry<K, V>>, CodecError> {
        let lfu = self.factory.policy() == EvictionPolicy::Lfu;
        let now = self.factory.now();
        let mut reader = Reader::new(bytes);
        let count = reader.u32()?;
        let mut entries = Vec::with_capacity(count.min(65_536) as usize);

        for _ in 0..count {
            let key = read_key::<K>(&mut reader)?;
            let since_access = reader.i64()?;
            let usage = if lfu { reader.u64()? } else { 0 };
            let value: V = from_bincode(reader.block()?)?;

            let metadata = self.factory.restore(key, now.saturating_sub(since_access), usage);
            entries.push(MemCacheEntry::new(value, Arc::new(metadata)));
        }

        match reader.remaining() {
            0 => Ok(entries),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }

    fn write_file(&self, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("bin.tmp");
        {
            let mut writer = BufWriter::new(fs::File::create(&tmp)?);
            writer.write_all(bytes)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)
    }
}

impl<K: CacheKey, V: CacheValue> PersistentCacheRepository<K, V>
    for DiskPersistentCacheRepository<K, V>
{
    fn load(&self) -> CacheResult<Vec<MemCacheEntry<K, V>>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(cache = %self.cache_name, "No snapshot to restore");
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.persistence_error("reading", e)),
        };

        let entries = self.decode(&bytes).unwrap_or_else(|e| {
            warn!(
                cache = %self.cache_name,
                path = %self.path.display(),
                error = %e,
                "Snapshot is corrupt; starting empty"
            );
            Vec::new()
        });

        fs::remove_file(&self.path).map_err(|e| self.persistence_error("removing", e))?;
        info!(cache = %self.cache_name, entries = entries.len(), "Snapshot restored");
        Ok(entries)
    }

    fn save(&self, entries: &EntriesView<'_, K, V>) -> CacheResult<()> {
        let bytes = self.encode(entries).map_err(|e| self.persistence_error("encoding", e))?;
        self.write_file(&bytes).map_err(|e| self.persistence_error("writing", e))?;
        info!(
            cache = %self.cache_name,
            path = %self.path.display(),
            bytes = bytes.len(),
            "Snapshot saved"
        );
        Ok(())
    }
}

fn block_len(len: usize) -> Result<u32, CodecError> {
    u32::try_from(len).map_err(|_| CodecError::BlockTooLarge(len))
}

fn write_block(out: &mut Vec<u8>, bytes: &[u8]) -> Result<(), CodecError> {
    out.extend_from_slice(&block_len(bytes.len())?.to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

fn write_key<K: CacheKey>(out: &mut Vec<u8>, key: &K) -> Result<(), CodecError> {
    if let Some(text) = (key as &dyn Any).downcast_ref::<String>() {
        out.push(STRING_KEY);
        write_block(out, text.as_bytes())?;
    } else {
        out.push(SERIALIZED_KEY);
        write_block(out, &to_bincode(key)?)?;
    }
    Ok(())
}

fn read_key<K: CacheKey>(reader: &mut Reader<'_>) -> Result<K, CodecError> {
    match reader.u8()? {
        STRING_KEY => {
            let text = std::str::from_utf8(reader.block()?)
                .map_err(|_| CodecError::InvalidUtf8)?
                .to_string();
            let boxed: Box<dyn Any> = Box::new(text);
            boxed.downcast::<K>().map(|key| *key).map_err(|_| CodecError::KeyTypeMismatch)
        }
        SERIALIZED_KEY => from_bincode(reader.block()?),
        tag => Err(CodecError::UnknownKeyTag(tag)),
    }
}

fn to_bincode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| CodecError::Bincode(e.to_string()))
}

fn from_bincode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    let (value, read) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| CodecError::Bincode(e.to_string()))?;
    if read == bytes.len() {
        Ok(value)
    } else {
        Err(CodecError::Bincode(format!("{} unread bytes in block", bytes.len() - read)))
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    const fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(n).filter(|end| *end <= self.bytes.len());
        let end = end.ok_or(CodecError::Truncated(self.pos))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.array::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    fn block(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.u32()? as usize;
        self.take(len)
    }
}
