//! Support for creating Atom feeds from a list of reviews.

use crate::config::Author;
use crate::review::Review;
use atom_syndication::{
    Category, Entry, Error as AtomError, Feed, FixedDateTime, Link, Person, Text,
};
use chrono::{NaiveDate, TimeZone, Utc};
use std::fmt;
use std::io::Write;
use tracing::warn;
use url::Url;

/// Bundled configuration for creating a feed.
pub struct FeedConfig {
    pub title: String,
    pub id: String,
    pub author: Option<Author>,
    pub home_page: Url,

    /// The directory URL of the article pages. Entry `n` links to
    /// `{articles_url}/{n}.html`.
    pub articles_url: Url,
}

/// Creates a feed from some configuration ([`FeedConfig`]) and a list of
/// [`Review`]s and writes the result to a [`std::io::Write`]. This function
/// takes ownership of the provided [`FeedConfig`].
pub fn write_feed<W: Write>(config: FeedConfig, reviews: &[Review], w: W) -> Result<()> {
    feed(config, reviews)?.write_to(w)?;
    Ok(())
}

fn feed(config: FeedConfig, reviews: &[Review]) -> Result<Feed> {
    let entries = feed_entries(&config, reviews)?;

    // The newest entry dates the feed; an empty feed is as new as the build.
    let updated = match entries.iter().map(|e| *e.updated()).max() {
        Some(updated) => updated,
        None => Utc::now().into(),
    };

    let mut feed = Feed::default();
    feed.set_title(config.title);
    feed.set_id(config.id);
    feed.set_updated(updated);
    feed.set_authors(author_to_people(config.author));
    feed.set_links(vec![link(config.home_page.to_string())]);
    feed.set_entries(entries);
    Ok(feed)
}

fn link(href: String) -> Link {
    let mut link = Link::default();
    link.set_href(href);
    link.set_rel("alternate");
    link
}

// Reviews only carry a calendar date, so entries are stamped at midnight UTC.
fn midnight_utc(date: &str) -> Option<FixedDateTime> {
    let midnight = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight).into())
}

fn feed_entries(config: &FeedConfig, reviews: &[Review]) -> Result<Vec<Entry>> {
    let mut entries: Vec<Entry> = Vec::with_capacity(reviews.len());

    for review in reviews {
        // WordPress dates can be cut short; such a review still gets its
        // pages but stays out of the feed.
        let date = match midnight_utc(&review.date) {
            Some(date) => date,
            None => {
                warn!(
                    title = %review.title,
                    date = %review.date,
                    "review date isn't YYYY-MM-DD; leaving it out of the feed"
                );
                continue;
            }
        };
        let url = config
            .articles_url
            .join(&format!("{}.html", review.index))?
            .to_string();

        let mut entry = Entry::default();
        entry.set_id(url.clone());
        entry.set_title(review.title.clone());
        entry.set_updated(date);
        entry.set_published(Some(date));
        entry.set_authors(author_to_people(config.author.clone()));
        entry.set_links(vec![link(url)]);
        entry.set_summary(Some(Text::html(review.preview_text.clone())));
        entry.set_categories(
            review
                .tags
                .iter()
                .map(|tag| {
                    let mut category = Category::default();
                    category.set_term(slug::slugify(tag));
                    category.set_label(Some(tag.clone()));
                    category
                })
                .collect::<Vec<_>>(),
        );
        entries.push(entry);
    }
    Ok(entries)
}

fn author_to_people(author: Option<Author>) -> Vec<Person> {
    match author {
        Some(author) => {
            let mut person = Person::default();
            person.set_name(author.name);
            person.set_email(author.email);
            vec![person]
        }
        None => Vec::new(),
    }
}

type Result<T> = std::result::Result<T, Error>;

/// Represents a problem creating a feed. Variants inlude I/O, Atom, and URL
/// issues.
#[derive(Debug)]
pub enum Error {
    /// Returned when there is a generic I/O error.
    Io(std::io::Error),

    /// Returned when there is an Atom-related error.
    Atom(AtomError),

    /// Returned when an article URL can't be built.
    UrlParse(url::ParseError),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(f),
            Error::Atom(err) => err.fmt(f),
            Error::UrlParse(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Atom(err) => Some(err),
            Error::UrlParse(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    /// Converts [`std::io::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator in fallible feed operations.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<AtomError> for Error {
    /// Converts [`AtomError`]s into [`Error`]. This allows us to use the `?`
    /// operator in fallible feed operations.
    fn from(err: AtomError) -> Error {
        Error::Atom(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Error {
        Error::UrlParse(err)
    }
}
