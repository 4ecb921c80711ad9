//! Defines the [`Review`] and [`Reviews`] types and [`process`], which turns
//! raw WordPress posts and tags into the records the site is rendered from.

use crate::wordpress::{WpPost, WpTag};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The WordPress category that marks a post as a book review.
pub const DEFAULT_CATEGORY: u64 = 36;

/// A WordPress post adapted for display. Serialized field names match the
/// records stored in the review cache.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    /// Publication date as `YYYY-MM-DD`.
    pub date: String,

    pub title: String,

    /// The first line of the rendered content, shown on the review card.
    pub preview_text: String,

    pub full_content: String,

    /// The featured image URL, if the post has one.
    pub image: Option<String>,

    /// Tag names in the order the post lists them.
    pub tags: Vec<String>,

    /// Position in the filtered review list. Article pages are addressed by
    /// this index.
    pub index: usize,
}

/// The processed site data: every review plus the flat list of tag names
/// across all reviews (duplicates included, in review order).
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Reviews {
    pub reviews: Vec<Review>,
    pub all_tags: Vec<String>,
}

impl Reviews {
    /// Looks up the review for an article page.
    pub fn article(&self, index: usize) -> Option<&Review> {
        self.reviews.get(index)
    }
}

/// Filters `posts` down to reviews (first category == `category`), resolves
/// tag ids through `tags`, and maps each post to a [`Review`].
pub fn process(posts: &[WpPost], tags: &[WpTag], category: u64) -> Reviews {
    let tag_map: HashMap<u64, &str> = tags.iter().map(|t| (t.id, t.name.as_str())).collect();

    let mut all_tags = Vec::new();
    let reviews = posts
        .iter()
        .filter(|post| post.categories.first() == Some(&category))
        .enumerate()
        .map(|(index, post)| {
            let tags: Vec<String> = post
                .tags
                .iter()
                .filter_map(|id| tag_map.get(id))
                // a tag needs a slug for its index page
                .filter(|name| !slug::slugify(name).is_empty())
                .map(|name| name.to_string())
                .collect();
            all_tags.extend(tags.iter().cloned());

            let content = &post.content.rendered;
            Review {
                date: post.date.get(..10).unwrap_or(&post.date).to_owned(),
                title: post.title.rendered.clone(),
                preview_text: preview(content).to_owned(),
                full_content: content.clone(),
                image: post
                    .better_featured_image
                    .as_ref()
                    .map(|image| image.source_url.clone()),
                tags,
                index,
            }
        })
        .collect();

    Reviews { reviews, all_tags }
}

// Rendered content is one block element per line, so the first line is the
// opening paragraph.
fn preview(content: &str) -> &str {
    content.split('\n').next().unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wordpress::{FeaturedImage, Rendered};

    fn fixture() -> (Vec<WpPost>, Vec<WpTag>) {
        let read = |name: &str| {
            std::fs::read_to_string(format!("./testdata/wordpress/{}", name)).unwrap()
        };
        (
            serde_json::from_str(&read("posts.json")).unwrap(),
            serde_json::from_str(&read("tags.json")).unwrap(),
        )
    }

    fn post(date: &str, content: &str, categories: Vec<u64>, tags: Vec<u64>) -> WpPost {
        WpPost {
            date: date.to_owned(),
            title: Rendered {
                rendered: "Title".to_owned(),
            },
            content: Rendered {
                rendered: content.to_owned(),
            },
            categories,
            tags,
            better_featured_image: Some(FeaturedImage {
                source_url: "https://example.com/cover.jpg".to_owned(),
            }),
        }
    }

    #[test]
    fn test_process_fixture() {
        let (posts, tags) = fixture();
        let reviews = process(&posts, &tags, DEFAULT_CATEGORY);

        let titles: Vec<&str> = reviews.reviews.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(vec!["Dune", "Middlemarch", "Neuromancer"], titles);

        let dune = &reviews.reviews[0];
        assert_eq!("2017-05-03", dune.date);
        assert_eq!(
            "<p>A desert planet and the spice that binds it.</p>",
            dune.preview_text
        );
        assert!(dune.full_content.contains("ecology and prophecy"));
        assert_eq!(vec!["sci-fi", "Classics"], dune.tags);
        assert_eq!(0, dune.index);

        let middlemarch = &reviews.reviews[1];
        assert_eq!(None, middlemarch.image);
        // tag 99 isn't in the tag map
        assert_eq!(vec!["Classics"], middlemarch.tags);
        assert_eq!(middlemarch.full_content, middlemarch.preview_text);
        assert_eq!(1, middlemarch.index);

        assert_eq!(
            vec!["sci-fi", "Classics", "Classics", "sci-fi", "Cyber punk"],
            reviews.all_tags
        );
    }

    #[test]
    fn test_process_other_category() {
        let (posts, tags) = fixture();
        let reviews = process(&posts, &tags, 2);
        assert_eq!(1, reviews.reviews.len());
        assert_eq!("Weekend notes", reviews.reviews[0].title);
        assert_eq!(0, reviews.reviews[0].index);
    }

    #[test]
    fn test_process_skips_uncategorized() {
        let posts = vec![post("2017-01-01T00:00:00", "x", Vec::new(), Vec::new())];
        assert!(process(&posts, &[], DEFAULT_CATEGORY).reviews.is_empty());
    }

    #[test]
    fn test_short_date_kept_whole() {
        let posts = vec![post("2017-01", "x", vec![DEFAULT_CATEGORY], Vec::new())];
        assert_eq!("2017-01", process(&posts, &[], DEFAULT_CATEGORY).reviews[0].date);
    }

    #[test]
    fn test_duplicate_tag_ids_last_wins() {
        let tags = vec![
            WpTag {
                id: 1,
                name: "old".to_owned(),
            },
            WpTag {
                id: 1,
                name: "new".to_owned(),
            },
        ];
        let posts = vec![post("2017-01-01", "x", vec![DEFAULT_CATEGORY], vec![1])];
        assert_eq!(vec!["new"], process(&posts, &tags, DEFAULT_CATEGORY).reviews[0].tags);
    }

    #[test]
    fn test_tags_without_slug_dropped() {
        let tags: Vec<WpTag> = vec![(1, ""), (2, "???"), (3, "Sci Fi")]
            .into_iter()
            .map(|(id, name)| WpTag {
                id,
                name: name.to_owned(),
            })
            .collect();
        let posts = vec![post("2017-01-01", "x", vec![DEFAULT_CATEGORY], vec![1, 2, 3])];
        let reviews = process(&posts, &tags, DEFAULT_CATEGORY);
        assert_eq!(vec!["Sci Fi"], reviews.reviews[0].tags);
        assert_eq!(vec!["Sci Fi"], reviews.all_tags);
    }

    #[test]
    fn test_article_lookup() {
        let (posts, tags) = fixture();
        let reviews = process(&posts, &tags, DEFAULT_CATEGORY);
        assert_eq!("Neuromancer", reviews.article(2).unwrap().title);
        assert_eq!(None, reviews.article(3));
    }

    #[test]
    fn test_review_cache_shape() {
        let review = process(
            &[post("2017-01-01T00:00:00", "a\nb", vec![DEFAULT_CATEGORY], Vec::new())],
            &[],
            DEFAULT_CATEGORY,
        )
        .reviews
        .remove(0);
        let json = serde_json::to_value(&review).unwrap();
        assert_eq!("a", json["previewText"]);
        assert_eq!("a\nb", json["fullContent"]);
        assert_eq!(0, json["index"]);
    }
}
