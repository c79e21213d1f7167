//! Filesystem collaborator.
//!
//! The engine only opens files and reads them sequentially. `DirFileSystem`
//! serves a directory tree; `MemoryFileSystem` serves pages compiled into the
//! firmware image (and doubles as the test fixture).

use crate::error::WebError;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

/// An open content source. Dropping it closes the file.
pub trait ContentFile {
    /// Reads up to `buf.len()` bytes; `Ok(0)` means end of file.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, WebError>;

    /// Total length when known up front.
    fn len(&self) -> Option<u64>;
}

pub trait FileSystem {
    /// Opens `path` (a request path such as `/index.html`).
    ///
    /// Fails with `NoFile`, `Permission` or `BadFile`; no read is attempted
    /// on failure.
    fn open(&mut self, path: &str) -> Result<Box<dyn ContentFile>, WebError>;
}

/// Rejects request paths that would escape the document root.
fn relative_path(path: &str) -> Result<PathBuf, WebError> {
    let rel = Path::new(path.trim_start_matches('/'));
    let mut out = PathBuf::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return Err(WebError::Permission),
        }
    }
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct DirFileSystem {
    root: PathBuf,
}

impl DirFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

struct DiskFile {
    file: File,
    len: u64,
}

impl ContentFile for DiskFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, WebError> {
        self.file.read(buf).map_err(WebError::BadFile)
    }

    fn len(&self) -> Option<u64> {
        Some(self.len)
    }
}

impl FileSystem for DirFileSystem {
    fn open(&mut self, path: &str) -> Result<Box<dyn ContentFile>, WebError> {
        let full = self.root.join(relative_path(path)?);
        let file = File::open(&full).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => WebError::NoFile,
            io::ErrorKind::PermissionDenied => WebError::Permission,
            _ => WebError::BadFile(e),
        })?;
        let meta = file.metadata().map_err(WebError::BadFile)?;
        if meta.is_dir() {
            return Err(WebError::NoFile);
        }
        Ok(Box::new(DiskFile {
            file,
            len: meta.len(),
        }))
    }
}

/// Files held in memory, keyed by request path.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), contents.into());
    }

    pub fn with_file(mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }
}

struct MemoryFile {
    data: Vec<u8>,
    pos: usize,
}

impl ContentFile for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, WebError> {
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn len(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}

impl FileSystem for MemoryFileSystem {
    fn open(&mut self, path: &str) -> Result<Box<dyn ContentFile>, WebError> {
        let rel = relative_path(path)?;
        let key = format!("/{}", rel.to_string_lossy());
        let data = self.files.get(&key).ok_or(WebError::NoFile)?;
        Ok(Box::new(MemoryFile {
            data: data.clone(),
            pos: 0,
        }))
    }
}
