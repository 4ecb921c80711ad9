//! Defines the [`Tag`] type, which represents a [`crate::review::Review`] tag
//! together with the location of its index page.

use gtmpl::Value;
use url::Url;

/// A review tag. Reviews carry tag names as WordPress spells them (e.g.,
/// `Cyber punk`); a [`Tag`] adds the slug used for its index directory and
/// the URL of that index's first page.
#[derive(Clone, Debug)]
pub struct Tag {
    /// The tag's display name.
    pub name: String,

    /// The slugified name, so e.g. `Sci-Fi` and `sci fi` land in the same
    /// directory.
    pub slug: String,

    /// The URL for the tag's first index page:
    /// `{tags_url}/{slug}/index.html`.
    pub url: Url,
}

impl Tag {
    pub fn new(name: &str, tags_url: &Url) -> Result<Tag, url::ParseError> {
        let slug = slug::slugify(name);
        // NOTE: `tags_url.join(slug).join("index.html")` would drop the slug
        // since it has no trailing slash.
        let url = tags_url.join(&format!("{}/index.html", slug))?;
        Ok(Tag {
            name: name.to_owned(),
            slug,
            url,
        })
    }
}

impl PartialEq for Tag {
    /// Implements [`PartialEq`] and [`Eq`] for [`Tag`] by delegating directly
    /// to the `slug` field.
    fn eq(&self, other: &Self) -> bool {
        self.slug == other.slug
    }
}
impl Eq for Tag {}

impl From<&Tag> for Value {
    /// Converts [`Tag`]s into [`Value`]s for templating.
    fn from(t: &Tag) -> Value {
        use std::collections::HashMap;
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("tag".to_owned(), Value::String(t.name.clone()));
        m.insert("slug".to_owned(), Value::String(t.slug.clone()));
        m.insert("url".to_owned(), Value::String(t.url.to_string()));
        Value::Object(m)
    }
}
