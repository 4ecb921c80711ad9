//! Fetches posts and tags from a WordPress REST API. Requests either go
//! straight to the site (`{api_root}/wp/v2/{resource}`) or through a YQL-style
//! JSON proxy for sites that don't serve CORS headers. See [`Endpoint`] for
//! the two request shapes and [`parse_body`] for how responses are unwrapped.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value as Json;
use std::fmt;
use tracing::{debug, info, warn};
use url::Url;

/// The WordPress collections the site is built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    Posts,
    Tags,
}

impl Resource {
    pub fn as_str(self) -> &'static str {
        match self {
            Resource::Posts => "posts",
            Resource::Tags => "tags",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `{ "rendered": ... }` field as WordPress returns titles and content.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Rendered {
    pub rendered: String,
}

/// The `better_featured_image` field added by the plugin of the same name.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct FeaturedImage {
    pub source_url: String,
}

/// The subset of a WordPress post that the site uses.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct WpPost {
    pub date: String,
    pub title: Rendered,
    pub content: Rendered,

    #[serde(default, deserialize_with = "ids")]
    pub categories: Vec<u64>,

    #[serde(default, deserialize_with = "ids")]
    pub tags: Vec<u64>,

    /// `null` or `false` when the post has no featured image.
    #[serde(default, deserialize_with = "featured_image")]
    pub better_featured_image: Option<FeaturedImage>,
}

/// The subset of a WordPress tag that the site uses.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct WpTag {
    #[serde(deserialize_with = "id")]
    pub id: u64,
    pub name: String,
}

// The proxy stringifies numbers and collapses one-element arrays into
// scalars, so ids are accepted as numbers or numeric strings, one or many.
fn json_id<E: serde::de::Error>(value: &Json) -> std::result::Result<u64, E> {
    match value {
        Json::Number(n) => n
            .as_u64()
            .ok_or_else(|| E::custom(format!("invalid id: {}", n))),
        Json::String(s) => s
            .trim()
            .parse()
            .map_err(|_| E::custom(format!("invalid id: {:?}", s))),
        other => Err(E::custom(format!("invalid id: {}", other))),
    }
}

fn id<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    json_id(&Json::deserialize(deserializer)?)
}

fn ids<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<u64>, D::Error> {
    match Json::deserialize(deserializer)? {
        Json::Null => Ok(Vec::new()),
        Json::Array(items) => items.iter().map(json_id).collect(),
        scalar => Ok(vec![json_id(&scalar)?]),
    }
}

fn featured_image<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<FeaturedImage>, D::Error> {
    match Json::deserialize(deserializer)? {
        value @ Json::Object(_) => serde_json::from_value(value)
            .map(Some)
            .map_err(D::Error::custom),
        _ => Ok(None),
    }
}

/// Where and how resources are requested.
#[derive(Clone, Debug, PartialEq)]
pub enum Endpoint {
    /// Request `{api_root}/wp/v2/{resource}` directly.
    Direct { api_root: Url },

    /// Ask a YQL-style proxy to fetch `{api_root}/wp/v2/{resource}` on our
    /// behalf. The proxy wraps the payload in a `query.results` envelope.
    Proxy { proxy_url: Url, api_root: Url },
}

impl Endpoint {
    fn api_root(&self) -> &Url {
        match self {
            Endpoint::Direct { api_root } => api_root,
            Endpoint::Proxy { api_root, .. } => api_root,
        }
    }

    /// The WordPress URL for `resource`, independent of any proxying.
    pub fn resource_url(&self, resource: Resource) -> Result<Url> {
        // `Url::join` drops the last path segment unless the root ends in a
        // slash, so build the path by hand.
        let root = self.api_root().as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{}/wp/v2/{}", root, resource))?)
    }

    /// The URL to actually request for one page of `resource`.
    pub fn request_url(&self, resource: Resource, per_page: usize, page: usize) -> Result<Url> {
        let mut target = self.resource_url(resource)?;
        match self {
            Endpoint::Direct { .. } => {
                target
                    .query_pairs_mut()
                    .append_pair("per_page", &per_page.to_string())
                    .append_pair("page", &page.to_string());
                Ok(target)
            }
            // The proxy only ever fetches the first page, with WordPress's
            // default page size.
            Endpoint::Proxy { proxy_url, .. } => {
                let mut url = proxy_url.clone();
                url.query_pairs_mut()
                    .append_pair("q", &format!("select * from json where url=\"{}\"", target))
                    .append_pair("format", "json")
                    .append_pair("diagnostics", "true")
                    .append_pair("callback", "");
                Ok(url)
            }
        }
    }

    pub fn is_proxied(&self) -> bool {
        matches!(self, Endpoint::Proxy { .. })
    }
}

/// Anything that can produce the raw JSON items of a WordPress collection.
pub trait Source {
    fn fetch(&self, resource: Resource) -> Result<Vec<Json>>;
}

/// A [`Source`] backed by blocking HTTP requests.
pub struct HttpSource {
    client: reqwest::blocking::Client,
    endpoint: Endpoint,

    /// Items requested per page (`per_page`). WordPress caps this at 100.
    per_page: usize,

    /// Upper bound on the number of pages followed via `X-WP-TotalPages`.
    max_pages: usize,
}

const TOTAL_PAGES_HEADER: &str = "X-WP-TotalPages";

impl HttpSource {
    pub fn new(endpoint: Endpoint, per_page: usize, max_pages: usize) -> Result<HttpSource> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("leaflet/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(HttpSource::with_client(client, endpoint, per_page, max_pages))
    }

    /// Like [`HttpSource::new`], but sends requests through `client`.
    pub fn with_client(
        client: reqwest::blocking::Client,
        endpoint: Endpoint,
        per_page: usize,
        max_pages: usize,
    ) -> HttpSource {
        HttpSource {
            client,
            endpoint,
            per_page: per_page.max(1),
            max_pages: max_pages.max(1),
        }
    }

    fn fetch_page(&self, resource: Resource, page: usize) -> Result<(Vec<Json>, usize)> {
        let url = self.endpoint.request_url(resource, self.per_page, page)?;
        debug!(%url, "requesting {} page {}", resource, page);
        let response = self.client.get(url).send()?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(Error::Status { resource, status });
        }

        let total_pages = response
            .headers()
            .get(TOTAL_PAGES_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(1);

        let body = response.text()?;
        Ok((parse_body(resource, &body, self.endpoint.is_proxied())?, total_pages))
    }
}

impl Source for HttpSource {
    fn fetch(&self, resource: Resource) -> Result<Vec<Json>> {
        let (mut items, total_pages) = self.fetch_page(resource, 1)?;

        // The proxy doesn't forward response headers, so only direct requests
        // can paginate.
        if !self.endpoint.is_proxied() {
            let last = total_pages.min(self.max_pages);
            if total_pages > self.max_pages {
                warn!(
                    "{} has {} pages; only the first {} will be fetched",
                    resource, total_pages, self.max_pages
                );
            }
            for page in 2..=last {
                items.extend(self.fetch_page(resource, page)?.0);
            }
        }

        info!("fetched {} {}", items.len(), resource);
        Ok(items)
    }
}

/// Strips a JSONP callback wrapper (`callback({...});`) if there is one.
pub fn strip_jsonp(body: &str) -> &str {
    let body = body.trim();
    if body.starts_with('[') || body.starts_with('{') {
        return body;
    }
    match (body.find('('), body.rfind(')')) {
        (Some(open), Some(close)) if open < close => {
            let callback = &body[..open];
            let is_callback = callback
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.');
            if is_callback {
                body[open + 1..close].trim()
            } else {
                body
            }
        }
        _ => body,
    }
}

/// Parses a response body into the list of items it carries. Proxied bodies
/// are unwrapped from their `query.results.json.json` envelope.
pub fn parse_body(resource: Resource, body: &str, proxied: bool) -> Result<Vec<Json>> {
    let json: Json = serde_json::from_str(strip_jsonp(body))?;
    let payload = if proxied {
        unwrap_envelope(resource, json)?
    } else {
        json
    };

    match payload {
        Json::Array(items) => Ok(items),
        // An empty proxy result comes back as `null`.
        Json::Null if proxied => Ok(Vec::new()),
        // ...and a single-item result as a bare object.
        item @ Json::Object(_) if proxied => Ok(vec![item]),
        other => Err(Error::UnexpectedShape {
            resource,
            found: json_kind(&other),
        }),
    }
}

fn unwrap_envelope(resource: Resource, mut json: Json) -> Result<Json> {
    let results = match json.pointer_mut("/query/results") {
        Some(results) => results.take(),
        None => {
            return Err(Error::UnexpectedShape {
                resource,
                found: "response without `query.results`",
            })
        }
    };

    let mut payload = match results {
        Json::Null => {
            warn!("proxy returned no results for {}", resource);
            return Ok(Json::Null);
        }
        Json::Object(mut map) => map.remove("json").unwrap_or(Json::Null),
        other => other,
    };

    // Top-level arrays are wrapped a second time.
    if let Json::Object(map) = &mut payload {
        if map.len() == 1 {
            if let Some(inner) = map.remove("json") {
                return Ok(inner);
            }
        }
    }
    Ok(payload)
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

/// Requests posts and then tags from `source` and decodes both. This is the
/// join step: the caller receives both collections or neither.
pub fn fetch_all<S: Source + ?Sized>(source: &S) -> Result<(Vec<WpPost>, Vec<WpTag>)> {
    let posts = decode(Resource::Posts, source.fetch(Resource::Posts)?)?;
    let tags = decode(Resource::Tags, source.fetch(Resource::Tags)?)?;
    Ok((posts, tags))
}

fn decode<T: serde::de::DeserializeOwned>(resource: Resource, items: Vec<Json>) -> Result<Vec<T>> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value(item).map_err(|e| {
                Error::Annotated(format!("decoding {} item {}", resource, i), Box::new(e.into()))
            })
        })
        .collect()
}

/// Represents the result of a fetch operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error fetching or decoding WordPress data.
#[derive(Debug)]
pub enum Error {
    /// Returned for transport-level HTTP failures.
    Http(reqwest::Error),

    /// Returned when the server answers with anything but `200 OK`.
    Status { resource: Resource, status: u16 },

    /// Returned when a body isn't valid JSON or an item can't be decoded.
    Json(serde_json::Error),

    /// Returned when a configured URL can't be parsed or extended.
    UrlParse(url::ParseError),

    /// Returned when the JSON is valid but not shaped like a collection.
    UnexpectedShape {
        resource: Resource,
        found: &'static str,
    },

    /// An error with an annotation.
    Annotated(String, Box<Error>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Http(err) => err.fmt(f),
            Error::Status { resource, status } => {
                write!(f, "fetching {}: unexpected status code {}", resource, status)
            }
            Error::Json(err) => err.fmt(f),
            Error::UrlParse(err) => err.fmt(f),
            Error::UnexpectedShape { resource, found } => {
                write!(f, "fetching {}: expected a list, found {}", resource, found)
            }
            Error::Annotated(annotation, err) => write!(f, "{}: {}", annotation, err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(err) => Some(err),
            Error::Status { .. } => None,
            Error::Json(err) => Some(err),
            Error::UrlParse(err) => Some(err),
            Error::UnexpectedShape { .. } => None,
            Error::Annotated(_, err) => Some(err),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Error {
        Error::Http(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Json(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Error {
        Error::UrlParse(err)
    }
}
