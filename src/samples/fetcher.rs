// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

/// The future returned by an asset fetch.
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = io::Result<Vec<u8>>> + Send + 'a>>;

/// Fetches raw asset bytes by path, relative to wherever the fetcher keeps its assets.
pub trait AssetFetcher: Send + Sync {
    fn fetch<'a>(&'a self, path: &'a Path) -> FetchFuture<'a>;

    /// A human readable location for the asset, used in errors and logs.
    fn location(&self, path: &Path) -> String;
}

/// Reads assets from the filesystem under a root directory.
#[derive(Debug, Clone)]
pub struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl Into<PathBuf>) -> FsFetcher {
        FsFetcher { root: root.into() }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl AssetFetcher for FsFetcher {
    fn fetch<'a>(&'a self, path: &'a Path) -> FetchFuture<'a> {
        Box::pin(tokio::fs::read(self.resolve(path)))
    }

    fn location(&self, path: &Path) -> String {
        self.resolve(path).display().to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_fs_fetcher() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("a.wav"), b"abc")?;
        let fetcher = FsFetcher::new(dir.path());

        assert_eq!(b"abc".to_vec(), fetcher.fetch(Path::new("a.wav")).await?);
        let missing = fetcher.fetch(Path::new("missing.wav")).await;
        assert_eq!(io::ErrorKind::NotFound, missing.unwrap_err().kind());
        assert!(fetcher
            .location(Path::new("a.wav"))
            .ends_with("a.wav"));
        Ok(())
    }
}
