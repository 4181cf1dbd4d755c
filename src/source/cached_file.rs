//! Immutable in-memory copies of source files.

use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use sha2::{Digest, Sha256};

use crate::error::IntegrityError;

pub type ContentHash = [u8; 32];

/// An original resource that can be materialized into the cache.
pub trait SourceFile: Send + Sync {
    /// Path the resource is served under.
    fn virtual_path(&self) -> &str;

    /// Opens the full content for reading.
    fn open(&self) -> io::Result<Box<dyn Read + Send>>;

    /// SHA-256 of the content, if the source already knows it.
    fn content_hash(&self) -> Option<ContentHash> {
        None
    }
}

/// A [`SourceFile`] backed by a file on disk.
#[derive(Debug, Clone)]
pub struct FsSourceFile {
    virtual_path: String,
    physical_path: PathBuf,
}

impl FsSourceFile {
    pub fn new(virtual_path: impl Into<String>, physical_path: impl Into<PathBuf>) -> Self {
        Self {
            virtual_path: virtual_path.into(),
            physical_path: physical_path.into(),
        }
    }
}

impl SourceFile for FsSourceFile {
    fn virtual_path(&self) -> &str {
        &self.virtual_path
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(&self.physical_path)?))
    }
}

/// Read-only bytes of a source file held in memory.
///
/// Clones share the buffer. The SHA-256 of the content is computed on
/// first request, unless the source supplied it up front, in which case
/// [`verify`](Self::verify) checks the bytes against it.
#[derive(Clone)]
pub struct CachedFile {
    virtual_path: Arc<str>,
    bytes: Arc<[u8]>,
    hash: OnceLock<ContentHash>,
}

impl CachedFile {
    pub fn new(virtual_path: impl Into<Arc<str>>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            virtual_path: virtual_path.into(),
            bytes: bytes.into(),
            hash: OnceLock::new(),
        }
    }

    /// Creates a file whose content is expected to hash to `expected`.
    pub fn with_expected_hash(
        virtual_path: impl Into<Arc<str>>,
        bytes: impl Into<Arc<[u8]>>,
        expected: ContentHash,
    ) -> Self {
        let file = Self::new(virtual_path, bytes);
        let _ = file.hash.set(expected);
        file
    }

    /// Reads `source` to the end and keeps the bytes.
    pub fn materialize(source: &dyn SourceFile) -> io::Result<Self> {
        let mut reader = source.open()?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(match source.content_hash() {
            Some(expected) => Self::with_expected_hash(source.virtual_path(), bytes, expected),
            None => Self::new(source.virtual_path(), bytes),
        })
    }

    pub fn virtual_path(&self) -> &str {
        &self.virtual_path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn content_hash(&self) -> &ContentHash {
        self.hash.get_or_init(|| hash_bytes(&self.bytes))
    }

    /// Recomputes the content hash and compares it with the recorded one.
    pub fn verify(&self) -> Result<(), IntegrityError> {
        if hash_bytes(&self.bytes) == *self.content_hash() {
            Ok(())
        } else {
            Err(IntegrityError {
                path: self.virtual_path.to_string(),
            })
        }
    }

    /// Verifies the content, then returns a reader over it.
    pub fn reader(&self) -> Result<Cursor<Arc<[u8]>>, IntegrityError> {
        self.verify()?;
        Ok(Cursor::new(Arc::clone(&self.bytes)))
    }
}

impl fmt::Debug for CachedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedFile")
            .field("virtual_path", &self.virtual_path)
            .field("len", &self.bytes.len())
            .finish()
    }
}

pub(crate) fn hash_bytes(bytes: &[u8]) -> ContentHash {
    Sha256::digest(bytes).into()
}
