//! The library code for the `leaflet` static site generator, which builds a
//! book-review blog out of a WordPress site. The architecture can be
//! generally broken down into two distinct steps:
//!
//! 1. Getting reviews: from the local cache ([`crate::cache`]) when both of
//!    its keys are present, otherwise by fetching posts and tags from
//!    WordPress ([`crate::wordpress`]) and filtering and joining them into
//!    reviews ([`crate::review`]), which are then cached.
//! 2. Converting the reviews into output files on disk ([`crate::write`]).
//!
//! The second step builds the main index of review cards, one index per tag,
//! and one article page per review. Each index is paginated by a
//! configurable number of cards per page. For each page, the index or
//! article template is applied and the result is written to disk.
//!
//! [`crate::build`] ties the steps together and finishes the site with the
//! static assets, an Atom feed ([`crate::feed`]), and a service worker that
//! precaches the result for offline reading ([`crate::serviceworker`]).

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod build;
pub mod cache;
pub mod config;
pub mod feed;
pub mod review;
pub mod serviceworker;
pub mod tag;
pub mod wordpress;
pub mod write;
