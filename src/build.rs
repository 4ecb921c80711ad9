//! Exports the [`build_site`] function which stitches together the high-level
//! steps of building the output static site: loading reviews from the cache
//! or fetching them from WordPress ([`crate::wordpress`],
//! [`crate::review`]), rendering index, tag, and article pages
//! ([`crate::write`]), copying the static source directory into the static
//! output directory, generating the Atom feed, and finally the service
//! worker, which precaches everything written before it.

use crate::cache::{Error as CacheError, ReviewCache, Store};
use crate::config::Config;
use crate::feed::{Error as FeedError, *};
use crate::review::{process, Reviews};
use crate::serviceworker::{self, Error as ServiceWorkerError};
use crate::wordpress::{fetch_all, Error as FetchError, Source};
use crate::write::{Error as WriteError, *};
use gtmpl::Template;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Switches for a single build.
#[derive(Clone, Copy, Debug, Default)]
pub struct Options {
    /// Ignore cached reviews and fetch from WordPress.
    pub refresh: bool,
}

/// What a build did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Summary {
    pub reviews: usize,
    pub pages: usize,
    pub from_cache: bool,
}

/// Builds the site from a [`Config`] object. Reviews come from the cache
/// when both cache keys are present (and `options.refresh` is unset);
/// otherwise they are fetched through `source`, processed, and cached.
pub fn build_site<S: Source + ?Sized>(config: &Config, source: &S, options: Options) -> Result<Summary> {
    let cache = open_cache(config)?;
    let (reviews, from_cache) = load_or_fetch(config, &cache, source, options)?;

    // Parse the template files.
    let index_template = parse_template(config.index_template.iter())?;
    let article_template = parse_template(config.article_template.iter())?;

    // Blow away the old output so renamed tags and dropped reviews don't
    // leave stale pages behind. Only paths this tool writes are removed.
    clean_output(config)?;
    std::fs::create_dir_all(&config.root_output_directory)?;

    // write the index, tag, and article pages
    let writer = Writer {
        article_template: &article_template,
        index_template: &index_template,
        site_root: &config.site_root,
        output_directory: &config.root_output_directory,
        index_page_size: config.index_page_size,
        home_page: &config.home_page,
        static_url: &config.static_url,
        feed_url: &config.feed_url,
    };
    let pages = writer.write_reviews(&reviews)?;

    // copy static directory
    if config.static_source_directory.is_dir() {
        copy_dir(
            &config.static_source_directory,
            &config.static_output_directory,
        )?;
    }

    // the old single article page now just sends readers home
    std::fs::write(
        config.root_output_directory.join(LEGACY_ARTICLE_PAGE),
        redirect_page(&config.home_page),
    )?;

    // create the atom feed
    write_feed(
        FeedConfig {
            title: config.title.clone(),
            id: config.home_page.to_string(),
            author: config.author.clone(),
            home_page: config.home_page.clone(),
            articles_url: config.articles_url.clone(),
        },
        &reviews.reviews,
        File::create(config.root_output_directory.join(FEED_FILE))?,
    )?;

    write_service_worker(config)?;

    info!(
        "built {} pages for {} reviews in {}",
        pages,
        reviews.reviews.len(),
        config.root_output_directory.display()
    );
    Ok(Summary {
        reviews: reviews.reviews.len(),
        pages,
        from_cache,
    })
}

/// Fetches reviews from WordPress and replaces whatever is cached, without
/// building the site.
pub fn refresh_cache<S: Source + ?Sized>(config: &Config, source: &S) -> Result<Reviews> {
    fetch_and_cache(config, &open_cache(config)?, source)
}

/// Deletes every cached key.
pub fn clear_cache(config: &Config) -> Result<()> {
    let cache = open_cache(config)?;
    cache.store().clear()?;
    info!("cleared {}", cache.store().root().display());
    Ok(())
}

const FEED_FILE: &str = "feed.atom";
const LEGACY_ARTICLE_PAGE: &str = "article.html";

fn open_cache(config: &Config) -> Result<ReviewCache> {
    Ok(ReviewCache::new(Store::open(
        &config.cache_directory,
        &config.cache_name,
    )?))
}

fn load_or_fetch<S: Source + ?Sized>(
    config: &Config,
    cache: &ReviewCache,
    source: &S,
    options: Options,
) -> Result<(Reviews, bool)> {
    if !options.refresh {
        match cache.load() {
            Ok(Some(reviews)) => {
                info!("loaded {} reviews from the cache", reviews.reviews.len());
                return Ok((reviews, true));
            }
            Ok(None) => info!("reviews not found in the cache, fetching"),
            Err(err) => warn!("ignoring unreadable cache: {}", err),
        }
    }
    Ok((fetch_and_cache(config, cache, source)?, false))
}

fn fetch_and_cache<S: Source + ?Sized>(
    config: &Config,
    cache: &ReviewCache,
    source: &S,
) -> Result<Reviews> {
    let (posts, tags) = fetch_all(source)?;
    let reviews = process(&posts, &tags, config.category);
    info!(
        "{} of {} posts are reviews (category {})",
        reviews.reviews.len(),
        posts.len(),
        config.category
    );
    cache.save(&reviews)?;
    Ok(reviews)
}

fn write_service_worker(config: &Config) -> Result<()> {
    use crate::serviceworker::{REGISTRATION_FILE, WORKER_FILE};

    if !serviceworker::registers_on(&config.site_root) {
        warn!(
            "{} is neither https nor localhost; browsers won't register the service worker",
            config.site_root
        );
    }

    let registration = config.root_output_directory.join(REGISTRATION_FILE);
    if let Some(dir) = registration.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(
        &registration,
        serviceworker::registration_script(config.site_root.path()),
    )?;

    // must come last: the precache list is whatever is on disk now
    let assets = serviceworker::asset_list(&config.root_output_directory)?;
    let version = chrono::Utc::now().format("%Y%m%d%H%M%S").to_string();
    std::fs::write(
        config.root_output_directory.join(WORKER_FILE),
        serviceworker::service_worker(&config.cache_name, &version, &assets),
    )?;
    Ok(())
}

fn clean_output(config: &Config) -> Result<()> {
    let root = &config.root_output_directory;
    for dir in &[ARTICLES_DIR, TAGS_DIR, "scripts"] {
        rmdir(&root.join(dir))?;
    }
    rmdir(&config.static_output_directory)?;

    // Index pages (`index.html`, `1.html`, ...) and the other generated files
    // live directly in the root.
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(Error::Clean {
                path: root.to_owned(),
                err: e,
            })
        }
    };
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if entry.file_type()?.is_file() && is_generated_root_file(&name) {
            std::fs::remove_file(entry.path()).map_err(|e| Error::Clean {
                path: entry.path(),
                err: e,
            })?;
        }
    }
    Ok(())
}

fn is_generated_root_file(name: &str) -> bool {
    match name {
        "index.html" | LEGACY_ARTICLE_PAGE | FEED_FILE | serviceworker::WORKER_FILE => true,
        _ => match name.strip_suffix(".html") {
            Some(stem) => !stem.is_empty() && stem.chars().all(|c| c.is_ascii_digit()),
            None => false,
        },
    }
}

fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    for result in WalkDir::new(src) {
        let entry = result.map_err(|e| Error::CopyStatic(e.to_string()))?;
        // strip_prefix() can't fail; WalkDir yields descendants of `src`
        let target = match entry.path().strip_prefix(src) {
            Ok(relative) => dst.join(relative),
            Err(_) => continue,
        };
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

// Loads the template file contents, concatenates them, and parses the result
// into a template.
fn parse_template<P: AsRef<Path>>(template_files: impl Iterator<Item = P>) -> Result<Template> {
    let mut contents = String::new();
    for template_file in template_files {
        use std::io::Read;
        let template_file = template_file.as_ref();
        File::open(&template_file)
            .map_err(|e| Error::OpenTemplateFile {
                path: template_file.to_owned(),
                err: e,
            })?
            .read_to_string(&mut contents)?;
        contents.push(' ');
    }

    let mut template = Template::default();
    template.parse(&contents).map_err(Error::ParseTemplate)?;
    Ok(template)
}

type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site. Errors can be during fetching,
/// caching, writing, cleaning output directories, parsing template files,
/// and other I/O.
#[derive(Debug)]
pub enum Error {
    /// Returned for errors fetching from WordPress.
    Fetch(FetchError),

    /// Returned for errors reading or writing the review cache.
    Cache(CacheError),

    /// Returned for errors writing [`crate::review::Review`]s to disk as HTML
    /// files.
    Write(WriteError),

    /// Returned for I/O problems while cleaning output directories.
    Clean { path: PathBuf, err: std::io::Error },

    /// Returned for I/O problems while opening template files.
    OpenTemplateFile { path: PathBuf, err: std::io::Error },

    /// Returned for errors parsing template files.
    ParseTemplate(String),

    /// Returned for errors walking the static directory.
    CopyStatic(String),

    /// Returned for errors writing the feed.
    Feed(FeedError),

    /// Returned for errors generating the service worker.
    ServiceWorker(ServiceWorkerError),

    /// Returned for other I/O errors.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Fetch(err) => {
                write!(f, "Fetching data from WordPress failed: {}", err)
            }
            Error::Cache(err) => err.fmt(f),
            Error::Write(err) => err.fmt(f),
            Error::Clean { path, err } => {
                write!(f, "Cleaning '{}': {}", path.display(), err)
            }
            Error::OpenTemplateFile { path, err } => {
                write!(f, "Opening template file '{}': {}", path.display(), err)
            }
            Error::ParseTemplate(err) => err.fmt(f),
            Error::CopyStatic(err) => {
                write!(f, "Copying static directory: {}", err)
            }
            Error::Feed(err) => err.fmt(f),
            Error::ServiceWorker(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Fetch(err) => Some(err),
            Error::Cache(err) => Some(err),
            Error::Write(err) => Some(err),
            Error::Clean { path: _, err } => Some(err),
            Error::OpenTemplateFile { path: _, err } => Some(err),
            Error::ParseTemplate(_) => None,
            Error::CopyStatic(_) => None,
            Error::Feed(err) => Some(err),
            Error::ServiceWorker(err) => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    /// Converts [`std::io::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<FetchError> for Error {
    fn from(err: FetchError) -> Error {
        Error::Fetch(err)
    }
}

impl From<CacheError> for Error {
    fn from(err: CacheError) -> Error {
        Error::Cache(err)
    }
}

impl From<WriteError> for Error {
    /// Converts [`WriteError`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: WriteError) -> Error {
        Error::Write(err)
    }
}

impl From<FeedError> for Error {
    /// Converts [`FeedError`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: FeedError) -> Error {
        Error::Feed(err)
    }
}

impl From<ServiceWorkerError> for Error {
    fn from(err: ServiceWorkerError) -> Error {
        Error::ServiceWorker(err)
    }
}

fn rmdir(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(x) => Ok(x),
        Err(e) => match e.kind() {
            std::io::ErrorKind::NotFound => Ok(()),
            _ => Err(Error::Clean {
                path: dir.to_owned(),
                err: e,
            }),
        },
    }
}
