//! Lazy per-channel handle cache.
//!
//! Each backend keeps one open handle per channel: opened on first
//! reference, reused thereafter, released only by `close_all`. The
//! registry never evicts on its own; channel cardinality is bounded by
//! the host's channel list in practice.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::{Result, StoreError};

/// Cache of open per-channel handles.
///
/// Channel identifiers are compared case-sensitively exactly as given;
/// no normalization happens at this layer.
pub struct ChannelRegistry<H> {
    channels: RwLock<HashMap<String, Arc<H>>>,
}

impl<H> ChannelRegistry<H> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Get the cached handle for a channel, opening it on first use.
    ///
    /// `open` runs at most once per channel per registry lifetime;
    /// concurrent first references serialize on the write lock, and the
    /// loser reuses the winner's handle.
    pub fn get_or_open<F>(&self, channel: &str, open: F) -> Result<Arc<H>>
    where
        F: FnOnce() -> Result<H>,
    {
        {
            let channels = self
                .channels
                .read()
                .map_err(|_| StoreError::Unavailable("registry lock poisoned".to_string()))?;
            if let Some(handle) = channels.get(channel) {
                return Ok(handle.clone());
            }
        }

        let mut channels = self
            .channels
            .write()
            .map_err(|_| StoreError::Unavailable("registry lock poisoned".to_string()))?;
        if let Some(handle) = channels.get(channel) {
            return Ok(handle.clone());
        }

        let handle = Arc::new(open()?);
        channels.insert(channel.to_string(), handle.clone());
        Ok(handle)
    }

    /// Drop every cached handle. Safe to call more than once.
    pub fn close_all(&self) -> Result<()> {
        let mut channels = self
            .channels
            .write()
            .map_err(|_| StoreError::Unavailable("registry lock poisoned".to_string()))?;
        channels.clear();
        Ok(())
    }
}

impl<H> Default for ChannelRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive the on-disk file path for a channel's storage unit.
///
/// Channel identifiers are free text; anything outside
/// `[A-Za-z0-9_-]` is percent-escaped byte-wise, so distinct channels
/// never collide on disk and the identifier round-trips losslessly.
pub fn channel_path(data_dir: &Path, channel: &str, extension: &str) -> PathBuf {
    let mut stem = String::with_capacity(channel.len());
    for byte in channel.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'-' => {
                stem.push(byte as char);
            }
            other => {
                stem.push_str(&format!("%{:02x}", other));
            }
        }
    }
    data_dir.join(format!("{}.{}", stem, extension))
}
