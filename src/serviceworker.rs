//! Generates the service worker that gives the site offline support, and the
//! snippet that registers it. Both are emitted as plain JavaScript strings.

use std::fmt;
use std::path::Path;
use url::Url;
use walkdir::WalkDir;

/// File name of the worker, written at the site root so its scope covers
/// every page.
pub const WORKER_FILE: &str = "service-worker.js";

/// Path (relative to the site root) of the registration snippet.
pub const REGISTRATION_FILE: &str = "scripts/sw-register.js";

/// Reports whether `host` is a loopback host the browser treats as a secure
/// origin: `localhost`, `[::1]`, or any `127.x.y.z`.
pub fn is_localhost(host: &str) -> bool {
    if host == "localhost" || host == "[::1]" {
        return true;
    }
    let mut octets = host.split('.');
    if octets.next() != Some("127") {
        return false;
    }
    let rest: Vec<&str> = octets.collect();
    rest.len() == 3
        && rest.iter().all(|octet| {
            !octet.is_empty()
                && octet.len() <= 3
                && octet.chars().all(|c| c.is_ascii_digit())
                && octet.parse::<u16>().map_or(false, |n| n <= 255)
        })
}

/// Reports whether browsers will allow a service worker on `site`.
pub fn registers_on(site: &Url) -> bool {
    site.scheme() == "https" || site.host_str().map_or(false, is_localhost)
}

/// The registration snippet. It registers the worker only on https or
/// localhost origins and reports when an update has been installed.
/// `scope` is the site root's path, e.g. `/` or `/blog/`.
pub fn registration_script(scope: &str) -> String {
    format!(
        r#"/* eslint-env browser */
(function() {{
  'use strict';

  var hostname = window.location.hostname;
  var isLocalhost = Boolean(hostname === 'localhost' ||
      hostname === '[::1]' ||
      hostname.match(
        /^127(?:\.(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)){{3}}$/
      )
    );

  if (!('serviceWorker' in navigator) ||
      (window.location.protocol !== 'https:' && !isLocalhost)) {{
    return;
  }}

  navigator.serviceWorker.register('{scope}{worker}', {{scope: '{scope}'}})
    .then(function(registration) {{
      registration.onupdatefound = function() {{
        // The first install also fires updatefound; only an existing
        // controller means there is older content to replace.
        if (!navigator.serviceWorker.controller) {{
          return;
        }}
        var installingWorker = registration.installing;
        installingWorker.onstatechange = function() {{
          switch (installingWorker.state) {{
            case 'installed':
              console.log('ServiceWorker installed, new content available');
              break;
            case 'redundant':
              throw new Error('The installing service worker became redundant.');
            default:
          }}
        }};
      }};
    }}).catch(function(e) {{
      console.error('Error during service worker registration:', e);
    }});
}})();
"#,
        scope = scope,
        worker = WORKER_FILE,
    )
}

/// A cache-first service worker. Every entry of `assets` (paths relative to
/// the worker) is precached under `{cache_name}-{version}` at install time;
/// caches from other versions are dropped on activation.
pub fn service_worker(cache_name: &str, version: &str, assets: &[String]) -> String {
    let prefix = slug::slugify(cache_name);
    // a JSON array of strings is a valid JS array literal
    let precache = serde_json::to_string_pretty(assets).unwrap_or_else(|_| "[]".to_owned());
    format!(
        r#"'use strict';

var CACHE_PREFIX = '{prefix}-';
var CACHE_NAME = CACHE_PREFIX + '{version}';
var PRECACHE = {precache};

self.addEventListener('install', function(event) {{
  event.waitUntil(
    caches.open(CACHE_NAME)
      .then(function(cache) {{ return cache.addAll(PRECACHE); }})
      .then(function() {{ return self.skipWaiting(); }})
  );
}});

self.addEventListener('activate', function(event) {{
  event.waitUntil(
    caches.keys().then(function(names) {{
      return Promise.all(names
        .filter(function(name) {{
          return name.indexOf(CACHE_PREFIX) === 0 && name !== CACHE_NAME;
        }})
        .map(function(name) {{ return caches.delete(name); }}));
    }}).then(function() {{ return self.clients.claim(); }})
  );
}});

self.addEventListener('fetch', function(event) {{
  if (event.request.method !== 'GET') {{
    return;
  }}
  event.respondWith(
    caches.match(event.request).then(function(response) {{
      return response || fetch(event.request);
    }})
  );
}});
"#,
        prefix = prefix,
        version = version,
        precache = precache,
    )
}

/// Lists every file under `output_directory` as a worker-relative URL path
/// (`./index.html`, `./articles/0.html`, ...), sorted, plus `./` for the
/// root itself. The worker file is left out.
pub fn asset_list(output_directory: &Path) -> Result<Vec<String>> {
    let mut assets = vec!["./".to_owned()];
    for result in WalkDir::new(output_directory).min_depth(1) {
        let entry = result?;
        if !entry.file_type().is_file() {
            continue;
        }
        // strip_prefix() can't fail; WalkDir yields descendants of its root
        let relative = match entry.path().strip_prefix(output_directory) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        if relative == Path::new(WORKER_FILE) {
            continue;
        }
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        assets.push(format!("./{}", parts.join("/")));
    }
    assets[1..].sort();
    Ok(assets)
}

/// Represents the result of walking the output directory.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error collecting the precache list.
#[derive(Debug)]
pub struct Error(walkdir::Error);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "listing service worker assets: {}", self.0)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Error {
        Error(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_localhost() {
        for host in &["localhost", "[::1]", "127.0.0.1", "127.255.10.001"] {
            assert!(is_localhost(host), "{}", host);
        }
        for host in &[
            "example.com",
            "127.0.0",
            "127.0.0.256",
            "127.0.0.1.5",
            "128.0.0.1",
            "127.0.0.",
            "127.0.0.1000",
            "localhost.example.com",
        ] {
            assert!(!is_localhost(host), "{}", host);
        }
    }

    #[test]
    fn test_registers_on() {
        let registers = |s: &str| registers_on(&Url::parse(s).unwrap());
        assert!(registers("https://example.com/"));
        assert!(registers("http://localhost:8080/"));
        assert!(registers("http://127.0.0.1/"));
        assert!(registers("http://[::1]:3000/"));
        assert!(!registers("http://example.com/"));
        assert!(!registers("file:///tmp/site/"));
    }

    #[test]
    fn test_registration_script() {
        let script = registration_script("/blog/");
        assert!(script.contains("register('/blog/service-worker.js', {scope: '/blog/'})"));
        assert!(script.contains("[01]?[0-9][0-9]?)){3}$/"));
    }

    #[test]
    fn test_service_worker() {
        let worker = service_worker(
            "Leaflet Review Data",
            "20170503",
            &["./".to_owned(), "./index.html".to_owned()],
        );
        assert!(worker.contains("var CACHE_PREFIX = 'leaflet-review-data-';"));
        assert!(worker.contains("var CACHE_NAME = CACHE_PREFIX + '20170503';"));
        assert!(worker.contains("\"./index.html\""));
    }

    #[test]
    fn test_asset_list() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("articles")).unwrap();
        std::fs::create_dir_all(root.join("static/css")).unwrap();
        for file in &[
            "index.html",
            "articles/0.html",
            "static/css/main.css",
            WORKER_FILE,
        ] {
            std::fs::write(root.join(file), "").unwrap();
        }

        assert_eq!(
            vec![
                "./",
                "./articles/0.html",
                "./index.html",
                "./static/css/main.css"
            ],
            asset_list(root)?
        );
        Ok(())
    }
}
