//! Local directory source, for out-of-band installs (manual copies, P2P
//! drops, offline bundles)

use super::{ScriptSource, SourceError};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::trace;

pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ScriptSource for DirectorySource {
    async fn fetch(&self, name: &str) -> Result<String, SourceError> {
        // Only plain file names resolve inside the root
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(SourceError::NotFound {
                name: name.to_string(),
                status: 400,
            });
        }

        let path = self.root.join(name);
        trace!("Reading payload from {}", path.display());

        match tokio::fs::read_to_string(&path).await {
            Ok(payload) => Ok(payload),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SourceError::NotFound {
                name: name.to_string(),
                status: 404,
            }),
            Err(e) => Err(SourceError::Network {
                name: name.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "directory"
    }
}
