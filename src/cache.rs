//! A small file-backed key-value store and the review cache built on it.
//! Each key is one JSON file under `{cache_directory}/{slug(name)}/`, so a
//! repeat build can skip the WordPress round-trip entirely.

use crate::review::{Review, Reviews};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// The store name used when the project doesn't configure one.
pub const DEFAULT_NAME: &str = "Leaflet Review Data";

const EXTENSION: &str = "json";

/// A directory of JSON documents addressed by key.
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Opens (creating if necessary) the store called `name` under
    /// `directory`. `name` must slugify to something, or the store would be
    /// `directory` itself.
    pub fn open(directory: &Path, name: &str) -> Result<Store> {
        let slug = slug::slugify(name);
        if slug.is_empty() {
            return Err(Error::InvalidName(name.to_owned()));
        }
        let root = directory.join(slug);
        fs::create_dir_all(&root).map_err(|err| Error::Io {
            path: root.clone(),
            err,
        })?;
        Ok(Store { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        match valid {
            true => Ok(self.root.join(key).with_extension(EXTENSION)),
            false => Err(Error::InvalidKey(key.to_owned())),
        }
    }

    /// Returns the value stored under `key`, or `None` if there isn't one.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.path(key)?;
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Error::Io { path, err }),
        };
        let value = serde_json::from_reader(BufReader::new(file)).map_err(|err| Error::Json {
            key: key.to_owned(),
            err,
        })?;
        debug!(key, "cache hit");
        Ok(Some(value))
    }

    /// Stores `value` under `key`. The previous value stays readable until
    /// the new one is completely written.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let path = self.path(key)?;
        let tmp = path.with_extension("tmp");
        let io_err = |err| Error::Io {
            path: tmp.clone(),
            err,
        };

        let mut w = BufWriter::new(File::create(&tmp).map_err(io_err)?);
        serde_json::to_writer(&mut w, value).map_err(|err| Error::Json {
            key: key.to_owned(),
            err,
        })?;
        w.flush().map_err(io_err)?;
        drop(w);

        fs::rename(&tmp, &path).map_err(|err| Error::Io { path, err })?;
        debug!(key, "cache write");
        Ok(())
    }

    /// Deletes `key`. Returns whether anything was stored there.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let path = self.path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(Error::Io { path, err }),
        }
    }

    /// Deletes every key in the store.
    pub fn clear(&self) -> Result<()> {
        let io_err = |err| Error::Io {
            path: self.root.clone(),
            err,
        };
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(io_err(err)),
        }
        fs::create_dir_all(&self.root).map_err(io_err)
    }
}

/// Persists processed [`Reviews`] under the `reviewData` and `tags` keys.
pub struct ReviewCache {
    store: Store,
}

impl ReviewCache {
    pub const REVIEW_DATA: &'static str = "reviewData";
    pub const TAGS: &'static str = "tags";

    pub fn new(store: Store) -> ReviewCache {
        ReviewCache { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Loads cached reviews. Both keys must be present; if either is
    /// missing the cache counts as empty.
    pub fn load(&self) -> Result<Option<Reviews>> {
        let reviews: Option<Vec<Review>> = self.store.get(Self::REVIEW_DATA)?;
        let all_tags: Option<Vec<String>> = self.store.get(Self::TAGS)?;
        Ok(match (reviews, all_tags) {
            (Some(reviews), Some(all_tags)) => Some(Reviews { reviews, all_tags }),
            _ => None,
        })
    }

    pub fn save(&self, reviews: &Reviews) -> Result<()> {
        self.store.set(Self::REVIEW_DATA, &reviews.reviews)?;
        self.store.set(Self::TAGS, &reviews.all_tags)
    }
}

/// Represents the result of a cache operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error reading or writing the cache.
#[derive(Debug)]
pub enum Error {
    /// Returned for I/O problems on a cache file or directory.
    Io { path: PathBuf, err: io::Error },

    /// Returned when a cached value can't be (de)serialized.
    Json { key: String, err: serde_json::Error },

    /// Returned for keys that can't be used as file names.
    InvalidKey(String),

    /// Returned for store names with no usable characters.
    InvalidName(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io { path, err } => write!(f, "cache file '{}': {}", path.display(), err),
            Error::Json { key, err } => write!(f, "cache key `{}`: {}", key, err),
            Error::InvalidKey(key) => write!(f, "invalid cache key: {:?}", key),
            Error::InvalidName(name) => write!(f, "invalid cache name: {:?}", name),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { err, .. } => Some(err),
            Error::Json { err, .. } => Some(err),
            Error::InvalidKey(_) | Error::InvalidName(_) => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    fn reviews() -> Reviews {
        Reviews {
            reviews: vec![Review {
                date: "2017-05-03".to_owned(),
                title: "Dune".to_owned(),
                preview_text: "<p>Spice.</p>".to_owned(),
                full_content: "<p>Spice.</p>\n<p>Worms.</p>".to_owned(),
                image: None,
                tags: vec!["sci-fi".to_owned()],
                index: 0,
            }],
            all_tags: vec!["sci-fi".to_owned()],
        }
    }

    #[test]
    fn test_store_layout() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), DEFAULT_NAME)?;
        assert_eq!(dir.path().join("leaflet-review-data"), store.root());

        store.set("currentArticleIndex", &3usize)?;
        assert!(store.root().join("currentArticleIndex.json").is_file());
        assert_eq!(Some(3usize), store.get::<usize>("currentArticleIndex")?);
        Ok(())
    }

    #[test]
    fn test_store_missing_and_remove() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), "x")?;
        assert_eq!(None, store.get::<String>("absent")?);
        assert!(!store.remove("absent")?);

        store.set("k", "v")?;
        assert!(store.remove("k")?);
        assert_eq!(None, store.get::<String>("k")?);
        Ok(())
    }

    #[test]
    fn test_store_rejects_path_keys() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), "x").unwrap();
        assert!(matches!(store.set("../escape", &1), Err(Error::InvalidKey(_))));
        assert!(matches!(store.get::<u8>(""), Err(Error::InvalidKey(_))));
    }

    #[test]
    fn test_store_rejects_empty_name() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("leaflet.yaml"), "title: x").unwrap();
        for name in &["", "!!!", "  "] {
            assert!(matches!(Store::open(dir.path(), name), Err(Error::InvalidName(_))));
        }
        assert!(dir.path().join("leaflet.yaml").is_file());
    }

    #[test]
    fn test_store_corrupt_value() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), "x").unwrap();
        fs::write(store.root().join("bad.json"), "{").unwrap();
        assert!(matches!(store.get::<Vec<u8>>("bad"), Err(Error::Json { .. })));
    }

    #[test]
    fn test_review_cache_round_trip() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let cache = ReviewCache::new(Store::open(dir.path(), DEFAULT_NAME)?);
        assert_eq!(None, cache.load()?);

        cache.save(&reviews())?;
        assert_eq!(Some(reviews()), cache.load()?);
        Ok(())
    }

    #[test]
    fn test_review_cache_needs_both_keys() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let cache = ReviewCache::new(Store::open(dir.path(), DEFAULT_NAME)?);
        cache.save(&reviews())?;

        cache.store().remove(ReviewCache::TAGS)?;
        assert_eq!(None, cache.load()?);

        cache.save(&reviews())?;
        cache.store().clear()?;
        assert_eq!(None, cache.load()?);
        assert!(cache.store().root().is_dir());
        Ok(())
    }
}
