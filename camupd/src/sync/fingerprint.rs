use std::fmt;
use std::path::Path;

use camup_core::{Resource, ResourceType};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

const READ_CHUNK: usize = 64 * 1024;

/// Content identity of a file: SHA-256 of the bytes plus the byte length.
///
/// The remote API reports both values for every stored file, so a local file
/// can be matched against the account without downloading anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    sha256: String,
    size: u64,
}

impl Fingerprint {
    pub fn new(sha256: impl Into<String>, size: u64) -> Self {
        Self {
            sha256: sha256.into().to_ascii_lowercase(),
            size,
        }
    }

    pub async fn of_file(path: &Path) -> std::io::Result<Self> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; READ_CHUNK];
        let mut size = 0u64;
        loop {
            let read = file.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
            size = size.saturating_add(read as u64);
        }
        Ok(Self {
            sha256: format!("{:x}", hasher.finalize()),
            size,
        })
    }

    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self {
            sha256: format!("{:x}", Sha256::digest(bytes)),
            size: bytes.len() as u64,
        }
    }

    /// Folders and files the server has not hashed yet carry no fingerprint.
    pub fn from_resource(resource: &Resource) -> Option<Self> {
        if resource.resource_type != ResourceType::File {
            return None;
        }
        let sha256 = resource.sha256.as_deref().filter(|s| !s.is_empty())?;
        Some(Self::new(sha256, resource.size?))
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.sha256, self.size)
    }
}
