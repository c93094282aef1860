//! On-disk cache of synthesized speech, keyed by text and voice.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::audio::AudioClip;
use crate::error::Result;

/// Default cache location.
///
/// Uses `DUBFIT_CACHE_DIR` if set, otherwise `~/.cache/dubfit/tts`.
pub fn default_cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DUBFIT_CACHE_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".cache").join("dubfit").join("tts")
}

/// SHA-256 of the voice and text, as 64 hex characters.
pub fn cache_key(text: &str, voice: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(voice.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct SpeechCache {
    dir: PathBuf,
}

impl SpeechCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, text: &str, voice: &str) -> PathBuf {
        self.dir.join(format!("{}.wav", cache_key(text, voice)))
    }

    /// Cached audio for this text and voice, if present and non-empty.
    pub fn lookup(&self, text: &str, voice: &str) -> Option<PathBuf> {
        let path = self.path_for(text, voice);
        if path.metadata().map(|m| m.len() > 0).unwrap_or(false) {
            log::debug!("Cache hit: speech ({}...)", &short(&path));
            Some(path)
        } else {
            None
        }
    }

    /// Produce an entry with `write`, which receives a temporary path in the
    /// cache directory. The result is renamed into place only on success,
    /// so readers never see a half-written file.
    pub fn store_with<F>(&self, text: &str, voice: &str, write: F) -> Result<PathBuf>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        std::fs::create_dir_all(&self.dir)?;
        let dest = self.path_for(text, voice);
        let tmp = tempfile::Builder::new()
            .prefix(".speech_")
            .suffix(".wav")
            .tempfile_in(&self.dir)?
            .into_temp_path();
        write(&tmp)?;
        tmp.persist(&dest).map_err(|e| e.error)?;
        log::debug!("Cached speech ({}...)", &short(&dest));
        Ok(dest)
    }

    pub fn store(&self, text: &str, voice: &str, clip: &AudioClip) -> Result<PathBuf> {
        self.store_with(text, voice, |tmp| clip.save(tmp))
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| is_entry(&e.path()))
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delete every cached entry. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut removed = 0;
        for entry in entries {
            let path = entry?.path();
            if is_entry(&path) {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        log::info!("Removed {} cached speech files from {}", removed, self.dir.display());
        Ok(removed)
    }
}

fn is_entry(path: &Path) -> bool {
    let visible = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| !n.starts_with('.'))
        .unwrap_or(false);
    visible && path.extension().map(|e| e == "wav").unwrap_or(false)
}

fn short(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().chars().take(12).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_cache(name: &str) -> SpeechCache {
        let dir = std::env::temp_dir().join(format!("dubfit_cache_{}_{}", name, std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        SpeechCache::new(dir)
    }

    #[test]
    fn test_cache_key_deterministic() {
        let k1 = cache_key("hello", "en");
        assert_eq!(k1, cache_key("hello", "en"));
        assert_eq!(k1.len(), 64);
        assert_ne!(k1, cache_key("hello", "ru"));
        assert_ne!(cache_key("ab", "c"), cache_key("a", "bc"));
    }

    #[test]
    fn test_store_and_lookup() {
        let cache = temp_cache("store");
        assert!(cache.lookup("hi", "en").is_none());

        let clip = AudioClip::new(vec![0.2; 400], 8000);
        let path = cache.store("hi", "en", &clip).unwrap();
        assert_eq!(cache.lookup("hi", "en"), Some(path.clone()));
        assert_eq!(AudioClip::load(&path).unwrap().len(), 400);
        assert!(cache.lookup("hi", "ru").is_none());
        assert_eq!(cache.len(), 1);

        std::fs::remove_dir_all(cache.dir()).ok();
    }

    #[test]
    fn test_failed_write_leaves_nothing() {
        let cache = temp_cache("failed");
        let result = cache.store_with("x", "en", |_| Err(crate::error::Error::EmptyTranscript));
        assert!(result.is_err());
        assert!(cache.lookup("x", "en").is_none());
        let leftovers = std::fs::read_dir(cache.dir()).unwrap().count();
        assert_eq!(leftovers, 0);

        std::fs::remove_dir_all(cache.dir()).ok();
    }

    #[test]
    fn test_empty_file_is_a_miss() {
        let cache = temp_cache("emptyfile");
        std::fs::create_dir_all(cache.dir()).unwrap();
        std::fs::write(cache.path_for("t", "v"), b"").unwrap();
        assert!(cache.lookup("t", "v").is_none());
        std::fs::remove_dir_all(cache.dir()).ok();
    }

    #[test]
    fn test_clear() {
        let cache = temp_cache("clear");
        assert_eq!(cache.clear().unwrap(), 0);

        let clip = AudioClip::new(vec![0.0; 10], 8000);
        cache.store("a", "en", &clip).unwrap();
        cache.store("b", "en", &clip).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.clear().unwrap(), 2);
        assert!(cache.is_empty());

        std::fs::remove_dir_all(cache.dir()).ok();
    }

    #[test]
    fn test_default_cache_dir() {
        let dir = default_cache_dir();
        assert!(!dir.to_string_lossy().is_empty());
    }
}
