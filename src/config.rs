use crate::cache;
use crate::review::DEFAULT_CATEGORY;
use crate::wordpress::Endpoint;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use url::Url;

/// The project file searched for in the working directory and its parents.
pub const PROJECT_FILE: &str = "leaflet.yaml";

#[derive(Deserialize)]
struct PageSize(usize);
impl Default for PageSize {
    fn default() -> Self {
        PageSize(10)
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Author {
    pub name: String,

    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Deserialize)]
struct WordPress {
    api_root: Url,

    /// Set to route requests through a YQL-style proxy.
    #[serde(default)]
    proxy_url: Option<Url>,

    #[serde(default = "default_category")]
    category: u64,

    #[serde(default = "default_per_page")]
    per_page: usize,

    #[serde(default = "default_max_pages")]
    max_pages: usize,
}

fn default_category() -> u64 {
    DEFAULT_CATEGORY
}

fn default_per_page() -> usize {
    10
}

fn default_max_pages() -> usize {
    10
}

#[derive(Deserialize)]
struct CacheSettings {
    #[serde(default = "default_cache_directory")]
    directory: PathBuf,

    #[serde(default = "default_cache_name")]
    name: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            directory: default_cache_directory(),
            name: default_cache_name(),
        }
    }
}

fn default_cache_directory() -> PathBuf {
    PathBuf::from(".leaflet-cache")
}

fn default_cache_name() -> String {
    cache::DEFAULT_NAME.to_owned()
}

#[derive(Deserialize)]
struct Project {
    pub title: String,
    pub site_root: Url,

    #[serde(default)]
    pub home_page: Option<String>,

    #[serde(default)]
    pub author: Option<Author>,

    #[serde(default)]
    pub index_page_size: PageSize,

    pub wordpress: WordPress,

    #[serde(default)]
    pub cache: CacheSettings,
}

#[derive(Deserialize)]
struct Theme {
    index_template: Vec<PathBuf>,
    article_template: Vec<PathBuf>,
}

pub struct Config {
    pub title: String,
    pub author: Option<Author>,
    pub site_root: Url,
    pub home_page: Url,
    pub static_url: Url,
    pub feed_url: Url,
    pub articles_url: Url,
    pub index_template: Vec<PathBuf>,
    pub article_template: Vec<PathBuf>,
    pub index_page_size: usize,
    pub endpoint: Endpoint,
    pub category: u64,
    pub per_page: usize,
    pub max_pages: usize,
    pub cache_directory: PathBuf,
    pub cache_name: String,
    pub static_source_directory: PathBuf,
    pub root_output_directory: PathBuf,
    pub static_output_directory: PathBuf,
}

impl Config {
    /// Finds `leaflet.yaml` in `dir` or the nearest ancestor that has one.
    pub fn from_directory(dir: &Path, output_directory: &Path) -> Result<Config> {
        let path = dir.join(PROJECT_FILE);
        if path.exists() {
            Config::from_project_file(&path, output_directory)
                .with_context(|| format!("Loading configuration from `{}`", path.display()))
        } else {
            match dir.parent() {
                Some(parent) => Config::from_directory(parent, output_directory),
                None => Err(anyhow!(
                    "Could not find `{}` in any parent directory",
                    PROJECT_FILE
                )),
            }
        }
    }

    pub fn from_project_file(path: &Path, output_directory: &Path) -> Result<Config> {
        let project: Project = serde_yaml::from_reader(open(path, "project")?)?;
        let project_root = path.parent().ok_or_else(|| {
            anyhow!(
                "Can't get parent directory for provided project file path '{:?}'",
                path
            )
        })?;

        let theme_dir = project_root.join("theme");
        let theme: Theme = serde_yaml::from_reader(open(&theme_dir.join("theme.yaml"), "theme")?)?;

        let site_root = with_trailing_slash(project.site_root);
        let endpoint = match project.wordpress.proxy_url {
            Some(proxy_url) => Endpoint::Proxy {
                proxy_url,
                api_root: project.wordpress.api_root,
            },
            None => Endpoint::Direct {
                api_root: project.wordpress.api_root,
            },
        };

        if project.index_page_size.0 < 1 {
            return Err(anyhow!("`index_page_size` must be at least 1"));
        }

        Ok(Config {
            title: project.title,
            author: project.author,
            home_page: site_root.join(project.home_page.as_deref().unwrap_or(""))?,
            static_url: site_root.join("static/")?,
            feed_url: site_root.join("feed.atom")?,
            articles_url: site_root.join("articles/")?,
            index_template: theme
                .index_template
                .iter()
                .map(|relpath| theme_dir.join(relpath))
                .collect(),
            article_template: theme
                .article_template
                .iter()
                .map(|relpath| theme_dir.join(relpath))
                .collect(),
            index_page_size: project.index_page_size.0,
            endpoint,
            category: project.wordpress.category,
            per_page: project.wordpress.per_page,
            max_pages: project.wordpress.max_pages,
            cache_directory: project_root.join(project.cache.directory),
            cache_name: project.cache.name,
            static_source_directory: project_root.join("static"),
            root_output_directory: output_directory.to_owned(),
            static_output_directory: output_directory.join("static"),
            site_root,
        })
    }
}

// Relative joins against the site root only keep its last segment when the
// root ends in a slash.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn open(path: &Path, kind: &str) -> Result<File> {
    File::open(path).map_err(|e| anyhow!("Opening {} file `{}`: {}", kind, path.display(), e))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_project_file() -> Result<()> {
        let config = Config::from_project_file(
            Path::new("./testdata/project/leaflet.yaml"),
            Path::new("/tmp/leaflet-out"),
        )?;

        assert_eq!("https://reviews.example.com/", config.site_root.as_str());
        assert_eq!("https://reviews.example.com/", config.home_page.as_str());
        assert_eq!("https://reviews.example.com/static/", config.static_url.as_str());
        assert_eq!("https://reviews.example.com/feed.atom", config.feed_url.as_str());
        assert_eq!(2, config.index_page_size);
        assert_eq!(DEFAULT_CATEGORY, config.category);
        assert_eq!(
            Endpoint::Direct {
                api_root: Url::parse("http://www.example.com/wp-json/")?
            },
            config.endpoint
        );
        assert_eq!(
            vec![
                PathBuf::from("./testdata/project/theme/base.html"),
                PathBuf::from("./testdata/project/theme/index.html"),
            ],
            config.index_template
        );
        assert_eq!(
            PathBuf::from("./testdata/project/.leaflet-cache"),
            config.cache_directory
        );
        assert_eq!(cache::DEFAULT_NAME, config.cache_name);
        assert_eq!(Path::new("/tmp/leaflet-out/static"), config.static_output_directory);
        Ok(())
    }

    #[test]
    fn test_from_directory_searches_parents() -> Result<()> {
        let config = Config::from_directory(
            Path::new("./testdata/project/static/css"),
            Path::new("/tmp/leaflet-out"),
        )?;
        assert_eq!("Leaflet", config.title);
        Ok(())
    }

    #[test]
    fn test_trailing_slash() -> Result<()> {
        assert_eq!(
            "https://example.com/blog/",
            with_trailing_slash(Url::parse("https://example.com/blog")?).as_str()
        );
        assert_eq!(
            "https://example.com/",
            with_trailing_slash(Url::parse("https://example.com")?).as_str()
        );
        Ok(())
    }
}
