//! Streaming XXH64 checksum.

use std::io;
use std::path::Path;
use tokio::io::AsyncReadExt;
use xxhash_rust::xxh64::Xxh64;

/// Incremental 64-bit file checksum, fed block by block.
pub struct FileHasher {
    inner: Xxh64,
    bytes: u64,
}

impl Default for FileHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl FileHasher {
    pub fn new() -> Self {
        Self {
            inner: Xxh64::new(0),
            bytes: 0,
        }
    }

    pub fn update(&mut self, block: &[u8]) {
        self.inner.update(block);
        self.bytes += block.len() as u64;
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn finish(&self) -> u64 {
        self.inner.digest()
    }
}

/// Hash a file from disk, streaming in `block_size` chunks.
pub async fn hash_file(path: &Path, block_size: usize) -> io::Result<(u64, u64)> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = FileHasher::new();
    let mut buffer = vec![0u8; block_size.max(1)];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok((hasher.finish(), hasher.bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_incremental_matches_one_shot() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

        let mut hasher = FileHasher::new();
        for chunk in data.chunks(333) {
            hasher.update(chunk);
        }

        assert_eq!(hasher.finish(), xxhash_rust::xxh64::xxh64(&data, 0));
        assert_eq!(hasher.bytes(), data.len() as u64);
    }

    #[test]
    fn test_known_empty_digest() {
        assert_eq!(FileHasher::new().finish(), 0xef46db3751d8e999);
    }

    #[tokio::test]
    async fn test_hash_file_matches_in_memory() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("clip.bin");
        let data = vec![0x5Au8; 70_000];
        std::fs::write(&path, &data).unwrap();

        let (hash, size) = hash_file(&path, 4096).await.unwrap();
        assert_eq!(hash, xxhash_rust::xxh64::xxh64(&data, 0));
        assert_eq!(size, 70_000);
    }
}
