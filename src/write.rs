use crate::review::{Review, Reviews};
use crate::tag::Tag;
use gtmpl::{Template, Value};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

/// Background colours for review-card book covers, cycled by card position.
pub const COVER_COLORS: [&str; 4] = ["#F36A6F", "#65A3F6", "#9FF6B7", "#FECC48"];

/// Subdirectory (and URL path) for article pages.
pub const ARTICLES_DIR: &str = "articles";

/// Subdirectory (and URL path) for tag index pages.
pub const TAGS_DIR: &str = "tags";

/// Returns the book-cover colour for the card at `position` on its page.
pub fn cover_color(position: usize) -> &'static str {
    COVER_COLORS[position % COVER_COLORS.len()]
}

/// Responsible for indexing, templating, and writing HTML pages to disk from
/// [`Reviews`].
pub struct Writer<'a> {
    /// The template for article pages.
    pub article_template: &'a Template,

    /// The template for index pages (the review cards).
    pub index_template: &'a Template,

    /// The site's base URL. The main index pages are located at
    /// `{site_root}/index.html`, `{site_root}/1.html`, etc.; articles at
    /// `{site_root}/articles/{index}.html`; tag index pages at
    /// `{site_root}/tags/{slug}/index.html`, `{site_root}/tags/{slug}/1.html`,
    /// etc. Must end in a slash.
    pub site_root: &'a Url,

    /// The directory in which all pages are written, mirroring the URL
    /// layout under `site_root`.
    pub output_directory: &'a Path,

    /// The number of review cards per index page.
    pub index_page_size: usize,

    /// The URL for the site's home page. This is made available to both
    /// article and index templates, typically as the destination for the
    /// site-header link.
    pub home_page: &'a Url,

    /// The URL for the static assets, typically for the theme's stylesheet.
    pub static_url: &'a Url,

    /// The URL of the Atom feed.
    pub feed_url: &'a Url,
}

impl Writer<'_> {
    /// Takes a single [`Page`], templates it, and writes it to disk.
    fn write_page(&self, page: &Page) -> Result<()> {
        let mut value = page.to_value();
        if let Value::Object(obj) = &mut value {
            for (key, url) in [
                ("home_page", self.home_page),
                ("static_url", self.static_url),
                ("feed_url", self.feed_url),
            ]
            .iter()
            {
                obj.insert(key.to_string(), Value::String(url.to_string()));
            }
        }
        page.template.execute(
            &mut std::fs::File::create(&page.file_path)?,
            &gtmpl::Context::from(value)?,
        )?;
        debug!("wrote {}", page.file_path.display());
        Ok(())
    }

    /// Indexes `reviews` by tag and writes index, tag-index, and article
    /// pages to disk. Returns the number of pages written.
    pub fn write_reviews(&self, reviews: &Reviews) -> Result<usize> {
        use std::collections::HashSet;

        let articles = articles(&reviews.reviews, self.site_root, self.output_directory)?;
        let indices = index_articles(self.site_root, self.output_directory, &articles)?;

        let mut pages = Vec::new();
        for index in &indices {
            pages.extend(index.to_pages(self.index_page_size, self.index_template));
        }
        pages.extend(article_pages(&articles, self.article_template));

        let mut seen_dirs: HashSet<PathBuf> = HashSet::new();
        for page in &pages {
            if let Some(dir) = page.file_path.parent() {
                if seen_dirs.insert(dir.to_owned()) {
                    std::fs::create_dir_all(dir)?;
                }
            }
            self.write_page(page)?;
        }
        Ok(pages.len())
    }
}

/// A small HTML page that sends the browser to `target`. Written for the old
/// single `article.html` entry point, which has no article to show without
/// an index.
pub fn redirect_page(target: &Url) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta http-equiv="refresh" content="0; url={0}">
<link rel="canonical" href="{0}">
<title>Redirecting</title>
</head>
<body><a href="{0}">{0}</a></body>
</html>
"#,
        target
    )
}

/// A review with everything needed to link to and render its article page.
struct Article<'a> {
    review: &'a Review,

    /// The article page's URL.
    url: Url,

    /// The target location on disk for the article page.
    file_path: PathBuf,

    /// The review's tags, resolved to their index pages.
    tags: Vec<Tag>,
}

impl Article<'_> {
    /// Converts an [`Article`] into a [`Value`] for templating. `position`
    /// is the article's place on the page being rendered and picks the
    /// cover colour.
    fn to_value(&self, position: usize) -> Value {
        let review = self.review;
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("date".to_owned(), Value::String(review.date.clone()));
        m.insert("title".to_owned(), Value::String(review.title.clone()));
        m.insert(
            "preview_text".to_owned(),
            Value::String(review.preview_text.clone()),
        );
        m.insert(
            "full_content".to_owned(),
            Value::String(review.full_content.clone()),
        );
        m.insert(
            "image".to_owned(),
            match &review.image {
                Some(image) => Value::String(image.clone()),
                None => Value::Nil,
            },
        );
        m.insert(
            "tags".to_owned(),
            Value::Array(self.tags.iter().map(Value::from).collect()),
        );
        m.insert("index".to_owned(), Value::from(review.index as u64));
        m.insert("url".to_owned(), Value::String(self.url.to_string()));
        m.insert(
            "cover_color".to_owned(),
            Value::String(cover_color(position).to_owned()),
        );
        Value::Object(m)
    }
}

fn articles<'a>(
    reviews: &'a [Review],
    site_root: &Url,
    output_directory: &Path,
) -> Result<Vec<Article<'a>>> {
    let articles_url = site_root.join(&format!("{}/", ARTICLES_DIR))?;
    let tags_url = site_root.join(&format!("{}/", TAGS_DIR))?;
    let articles_directory = output_directory.join(ARTICLES_DIR);

    reviews
        .iter()
        .map(|review| -> Result<Article<'a>> {
            let file_name = format!("{}.html", review.index);
            Ok(Article {
                review,
                url: articles_url.join(&file_name)?,
                file_path: articles_directory.join(&file_name),
                // cached reviews may predate the slug check in `process`
                tags: review
                    .tags
                    .iter()
                    .filter(|name| !slug::slugify(name).is_empty())
                    .map(|name| Tag::new(name, &tags_url))
                    .collect::<std::result::Result<_, _>>()?,
            })
        })
        .collect()
}

/// An object representing an output HTML file. A [`Page`] can be converted to a
/// [`Value`] and thus rendered in a template via [`Page::to_value`].
struct Page<'a> {
    /// The main item for the page.
    item: Value,

    /// The tag for tag index pages; [`Value::Nil`] everywhere else.
    tag: Value,

    /// The target location on disk for the output file.
    file_path: PathBuf,

    /// The URL for the previous page, if any.
    prev: Option<Url>,

    /// The URL for the next page, if any.
    next: Option<Url>,

    /// The template with which the page will be rendered.
    template: &'a Template,
}

impl Page<'_> {
    /// Converts a [`Page`] into a [`Value`]. The result is a [`Value::Object`]
    /// with fields `item`, `tag`, `prev`, and `next` (see [`Page`] for
    /// descriptions).
    fn to_value(&self) -> Value {
        let option_to_value = |opt: &Option<Url>| match opt {
            Some(url) => Value::String(url.to_string()),
            None => Value::Nil,
        };

        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("item".to_owned(), self.item.clone());
        m.insert("tag".to_owned(), self.tag.clone());
        m.insert("prev".to_owned(), option_to_value(&self.prev));
        m.insert("next".to_owned(), option_to_value(&self.next));
        Value::Object(m)
    }
}

/// Creates the article [`Page`]s, each linked to its neighbours.
fn article_pages<'a>(articles: &[Article], template: &'a Template) -> Vec<Page<'a>> {
    articles
        .iter()
        .enumerate()
        .map(|(i, article)| Page {
            item: article.to_value(0),
            tag: Value::Nil,
            file_path: article.file_path.clone(),
            prev: match i < 1 {
                true => None,
                false => Some(articles[i - 1].url.clone()),
            },
            next: articles.get(i + 1).map(|next| next.url.clone()),
            template,
        })
        .collect()
}

/// `Index` represents a collection of [`Article`]s associated with a tag
/// (or with no tag, which is the main index containing every review).
struct Index<'a, 'r> {
    /// The tag this index lists, if any.
    tag: Option<Tag>,

    /// The directory URL for the index's pages. Ends in a slash.
    url: Url,

    /// The output directory for the index's pages.
    output_directory: PathBuf,

    /// The articles listed in the index.
    articles: Vec<&'a Article<'r>>,
}

impl Index<'_, '_> {
    /// Converts the index to a list of index pages. `index_page_size` and
    /// `index_template` represent the number of cards per page and the
    /// template to apply to the pages respectively. An empty index still
    /// gets one (empty) page.
    fn to_pages<'t>(&self, index_page_size: usize, index_template: &'t Template) -> Vec<Page<'t>> {
        let index_page_size = index_page_size.max(1);
        let total_pages = match self.articles.len() % index_page_size {
            0 => self.articles.len() / index_page_size,
            _ => self.articles.len() / index_page_size + 1,
        }
        .max(1);

        let page_url = |i: usize| match i {
            0 => self.url.join("index.html"),
            _ => self.url.join(&format!("{}.html", i)),
        };

        let tag = match &self.tag {
            Some(tag) => Value::from(tag),
            None => Value::Nil,
        };

        (0..total_pages)
            .map(|i| {
                let start = (i * index_page_size).min(self.articles.len());
                let end = (start + index_page_size).min(self.articles.len());
                let chunk = &self.articles[start..end];

                let file_name = match i > 0 {
                    false => String::from("index.html"),
                    true => format!("{}.html", i),
                };

                Page {
                    item: Value::Array(
                        chunk
                            .iter()
                            .enumerate()
                            .map(|(position, a)| a.to_value(position))
                            .collect(),
                    ),
                    tag: tag.clone(),
                    file_path: self.output_directory.join(&file_name),
                    // joining a bare file name onto a directory URL can't fail
                    prev: match i {
                        0 => None,
                        _ => page_url(i - 1).ok(),
                    },
                    next: match i < total_pages - 1 {
                        false => None,
                        true => page_url(i + 1).ok(),
                    },
                    template: index_template,
                }
            })
            .collect()
    }
}

/// Indexes a list of [`Article`]s: the main index first, then one index per
/// tag in order of first appearance.
///
/// Arguments:
///
/// * `site_root` is the base URL for index pages. See [`Writer::site_root`]
///   for more details.
/// * `base_directory` is the base directory for index pages. See
///   [`Writer::output_directory`] for more details.
/// * `articles` is the collection of [`Article`] objects to index.
fn index_articles<'a, 'r>(
    site_root: &Url,
    base_directory: &Path,
    articles: &'a [Article<'r>],
) -> Result<Vec<Index<'a, 'r>>> {
    let tags_url = site_root.join(&format!("{}/", TAGS_DIR))?;
    let tags_directory = base_directory.join(TAGS_DIR);

    let mut indices = vec![Index {
        tag: None,
        url: site_root.to_owned(),
        output_directory: base_directory.to_owned(),
        articles: articles.iter().collect(),
    }];
    let mut by_slug: HashMap<String, usize> = HashMap::new();

    for article in articles {
        for tag in article.tags.iter() {
            match by_slug.get(&tag.slug).copied() {
                // a review can list two tags that share a slug
                Some(i) => {
                    let index = &mut indices[i];
                    if !index.articles.iter().any(|a| std::ptr::eq(*a, article)) {
                        index.articles.push(article);
                    }
                }
                None => {
                    by_slug.insert(tag.slug.clone(), indices.len());
                    indices.push(Index {
                        tag: Some(tag.clone()),
                        url: tags_url.join(&format!("{}/", tag.slug))?,
                        output_directory: tags_directory.join(&tag.slug),
                        articles: vec![article],
                    });
                }
            }
        }
    }

    Ok(indices)
}

/// The result of a fallible page-writing operation.
type Result<T> = std::result::Result<T, Error>;

/// Represents an error in a page-writing operation.
#[derive(Debug)]
pub enum Error {
    /// An error during templating.
    Template(String),

    /// An error building page URLs.
    UrlParse(url::ParseError),

    /// An error writing the output files.
    Io(io::Error),
}

impl From<io::Error> for Error {
    /// Converts an [`io::Error`] into an [`Error`]. This allows us to use the
    /// `?` operator for fallible I/O operations.
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<String> for Error {
    /// Converts a template error message ([`String`]) into an [`Error`]. This
    /// allows us to use the `?` operator for fallible template operations.
    fn from(err: String) -> Error {
        Error::Template(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Error {
        Error::UrlParse(err)
    }
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as presentable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Template(err) => err.fmt(f),
            Error::UrlParse(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Template(_) => None,
            Error::UrlParse(err) => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::review::process;
    use crate::wordpress::{WpPost, WpTag};
    use tempfile::TempDir;

    const INDEX: &str = "{{range .item}}[{{.index}} {{.title}} {{.cover_color}} {{.url}}]{{end}}\
        |{{if .tag}}{{.tag.tag}}{{end}}|{{if .prev}}{{.prev}}{{end}}|{{if .next}}{{.next}}{{end}}";

    const ARTICLE: &str = "{{.item.title}}|{{.item.full_content}}\
        |{{range .item.tags}}{{.tag}}@{{.url}};{{end}}|{{if .item.image}}{{.item.image}}{{end}}\
        |{{.home_page}}|{{if .next}}{{.next}}{{end}}";

    fn template(source: &str) -> Template {
        let mut t = Template::default();
        t.parse(source).unwrap();
        t
    }

    fn fixture() -> Reviews {
        let read = |name: &str| {
            std::fs::read_to_string(format!("./testdata/wordpress/{}", name)).unwrap()
        };
        let posts: Vec<WpPost> = serde_json::from_str(&read("posts.json")).unwrap();
        let tags: Vec<WpTag> = serde_json::from_str(&read("tags.json")).unwrap();
        process(&posts, &tags, crate::review::DEFAULT_CATEGORY)
    }

    fn read(dir: &TempDir, path: &str) -> String {
        std::fs::read_to_string(dir.path().join(path)).unwrap()
    }

    #[test]
    fn test_cover_colors_cycle() {
        assert_eq!("#F36A6F", cover_color(0));
        assert_eq!("#FECC48", cover_color(3));
        assert_eq!("#F36A6F", cover_color(4));
        assert_eq!("#65A3F6", cover_color(5));
    }

    #[test]
    fn test_write_reviews() -> Result<()> {
        let out = TempDir::new().unwrap();
        let site_root = Url::parse("https://example.com/")?;
        let static_url = site_root.join("static/")?;
        let feed_url = site_root.join("feed.atom")?;
        let (index_template, article_template) = (template(INDEX), template(ARTICLE));
        let writer = Writer {
            article_template: &article_template,
            index_template: &index_template,
            site_root: &site_root,
            output_directory: out.path(),
            index_page_size: 2,
            home_page: &site_root,
            static_url: &static_url,
            feed_url: &feed_url,
        };

        // 2 main index pages + sci-fi, classics, cyber-punk + 3 articles
        assert_eq!(8, writer.write_reviews(&fixture())?);

        assert_eq!(
            "[0 Dune #F36A6F https://example.com/articles/0.html]\
             [1 Middlemarch #65A3F6 https://example.com/articles/1.html]\
             |||https://example.com/1.html",
            read(&out, "index.html")
        );
        assert_eq!(
            "[2 Neuromancer #F36A6F https://example.com/articles/2.html]\
             ||https://example.com/index.html|",
            read(&out, "1.html")
        );
        assert_eq!(
            "[0 Dune #F36A6F https://example.com/articles/0.html]\
             [2 Neuromancer #65A3F6 https://example.com/articles/2.html]\
             |sci-fi||",
            read(&out, "tags/sci-fi/index.html")
        );
        assert!(read(&out, "tags/cyber-punk/index.html").contains("Neuromancer"));

        let dune = read(&out, "articles/0.html");
        assert!(dune.starts_with("Dune|<p>A desert planet"));
        assert!(dune.contains(
            "|sci-fi@https://example.com/tags/sci-fi/index.html;\
             Classics@https://example.com/tags/classics/index.html;|"
        ));
        assert!(dune.contains("|https://www.example.com/wp-content/uploads/dune.jpg|"));
        assert!(dune.ends_with("|https://example.com/|https://example.com/articles/1.html"));

        // no featured image, no next article
        let middlemarch = read(&out, "articles/1.html");
        assert!(middlemarch.contains(";||https://example.com/|"));
        assert!(read(&out, "articles/2.html").ends_with("|https://example.com/|"));
        Ok(())
    }

    #[test]
    fn test_empty_index_gets_one_page() -> Result<()> {
        let out = TempDir::new().unwrap();
        let site_root = Url::parse("https://example.com/blog/")?;
        let (index_template, article_template) = (template(INDEX), template(ARTICLE));
        let writer = Writer {
            article_template: &article_template,
            index_template: &index_template,
            site_root: &site_root,
            output_directory: out.path(),
            index_page_size: 10,
            home_page: &site_root,
            static_url: &site_root,
            feed_url: &site_root,
        };

        assert_eq!(1, writer.write_reviews(&Reviews::default())?);
        assert_eq!("|||", read(&out, "index.html"));
        Ok(())
    }

    #[test]
    fn test_tags_without_slug_get_no_page() -> Result<()> {
        let out = TempDir::new().unwrap();
        let site_root = Url::parse("https://example.com/blog/")?;
        let (index_template, article_template) = (template(INDEX), template(ARTICLE));
        let writer = Writer {
            article_template: &article_template,
            index_template: &index_template,
            site_root: &site_root,
            output_directory: out.path(),
            index_page_size: 10,
            home_page: &site_root,
            static_url: &site_root,
            feed_url: &site_root,
        };
        let reviews = Reviews {
            reviews: vec![Review {
                date: "2017-05-03".to_owned(),
                title: "Dune".to_owned(),
                preview_text: "<p>Spice.</p>".to_owned(),
                full_content: "<p>Spice.</p>".to_owned(),
                image: None,
                tags: vec!["???".to_owned(), "sci-fi".to_owned()],
                index: 0,
            }],
            all_tags: vec!["???".to_owned(), "sci-fi".to_owned()],
        };

        // main index + sci-fi + one article
        assert_eq!(3, writer.write_reviews(&reviews)?);
        assert!(read(&out, "articles/0.html")
            .contains("|sci-fi@https://example.com/blog/tags/sci-fi/index.html;|"));
        assert!(!out.path().join("tags/index.html").exists());
        Ok(())
    }

    #[test]
    fn test_redirect_page() {
        let page = redirect_page(&Url::parse("https://example.com/").unwrap());
        assert!(page.contains(r#"content="0; url=https://example.com/""#));
    }
}
