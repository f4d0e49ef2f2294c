use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{self, BoxFuture};

/// A source of book resources addressed by slash-separated relative paths.
///
/// Each call to [`ResourceLoader::open`] is a single-shot request: the
/// returned future resolves once with the resource bytes or an error. A
/// request cannot be cancelled; callers drop results they no longer want.
pub trait ResourceLoader: Send + Sync {
    fn open(&self, path: &str) -> BoxFuture<'static, io::Result<Vec<u8>>>;
}

impl<T: ResourceLoader + ?Sized> ResourceLoader for Arc<T> {
    fn open(&self, path: &str) -> BoxFuture<'static, io::Result<Vec<u8>>> {
        (**self).open(path)
    }
}

// --- Implementation: In-Memory ---

/// Resources held in memory, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    resources: HashMap<String, Arc<[u8]>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource, builder style.
    pub fn with(mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.insert(path, data);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) {
        let data: Vec<u8> = data.into();
        self.resources.insert(path.into(), Arc::from(data));
    }

    pub fn contains(&self, path: &str) -> bool {
        self.resources.contains_key(path)
    }
}

impl ResourceLoader for MemoryLoader {
    fn open(&self, path: &str) -> BoxFuture<'static, io::Result<Vec<u8>>> {
        let result = match self.resources.get(path) {
            Some(data) => Ok(data.to_vec()),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no resource at {path}"),
            )),
        };
        future::ready(result).boxed()
    }
}

// --- Implementation: Local Directory ---

/// Resources read from a directory on disk with tokio's filesystem API.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a book path onto the filesystem, refusing paths that leave the root.
    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || path.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path outside book directory: {path}"),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl ResourceLoader for DirectoryLoader {
    fn open(&self, path: &str) -> BoxFuture<'static, io::Result<Vec<u8>>> {
        match self.resolve(path) {
            Ok(full) => async move { tokio::fs::read(full).await }.boxed(),
            Err(e) => future::ready(Err(e)).boxed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_loader() {
        let loader = MemoryLoader::new().with("smil/a.smil", b"<smil/>".to_vec());
        assert_eq!(loader.open("smil/a.smil").await.unwrap(), b"<smil/>");
        let err = loader.open("missing.smil").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_directory_loader_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("audio")).unwrap();
        std::fs::write(dir.path().join("audio/a.mp3"), b"ID3").unwrap();

        let loader = Arc::new(DirectoryLoader::new(dir.path()));
        assert_eq!(loader.open("audio/a.mp3").await.unwrap(), b"ID3");
        assert!(loader.open("audio/missing.mp3").await.is_err());
    }

    #[tokio::test]
    async fn test_directory_loader_rejects_escaping_paths() {
        let loader = DirectoryLoader::new("/tmp/book");
        for bad in ["../secret", "/etc/passwd", "a/../../b", ""] {
            let err = loader.open(bad).await.unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "{bad}");
        }
    }
}
