use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context as _;
use serde::Serialize;

use crate::cli::StatsArgs;
use crate::content::{LoadOptions, load_posts};
use crate::document::{Document, plain_text};
use crate::formats::{Category, PostRecord};
use crate::keywords::words;

const WORDS_PER_MINUTE: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkingStats {
    pub total_articles: usize,
    pub with_internal_links: usize,
    pub total_internal_links: usize,
    pub avg_links_per_article: f64,
    /// Percentage of articles with at least one internal link.
    pub link_coverage: f64,
    pub posts_by_category: BTreeMap<Category, usize>,
    /// Minutes.
    pub average_read_time: f64,
}

pub fn linking_stats(posts: &[PostRecord]) -> LinkingStats {
    let mut posts_by_category = Category::ALL
        .iter()
        .map(|category| (*category, 0))
        .collect::<BTreeMap<_, _>>();

    let mut with_internal_links = 0;
    let mut total_internal_links = 0;
    let mut total_read_time = 0;
    for post in posts {
        let links = count_internal_links(post);
        if links > 0 {
            with_internal_links += 1;
        }
        total_internal_links += links;
        total_read_time += read_time_minutes(&post.content);
        *posts_by_category.entry(post.category).or_default() += 1;
    }

    let total_articles = posts.len();
    let per_article = |value: usize| {
        if total_articles == 0 {
            0.0
        } else {
            value as f64 / total_articles as f64
        }
    };

    LinkingStats {
        total_articles,
        with_internal_links,
        total_internal_links,
        avg_links_per_article: per_article(total_internal_links),
        link_coverage: per_article(with_internal_links) * 100.0,
        posts_by_category,
        average_read_time: per_article(total_read_time),
    }
}

/// Links in the post body whose destination is site-relative.
pub fn count_internal_links(post: &PostRecord) -> usize {
    match Document::parse(&post.content) {
        Ok(document) => document
            .links()
            .iter()
            .filter(|link| link.destination.starts_with('/'))
            .count(),
        Err(err) => {
            tracing::warn!(slug = %post.slug, %err, "cannot count links");
            0
        }
    }
}

pub fn read_time_minutes(markdown: &str) -> usize {
    words(&plain_text(markdown)).len().div_ceil(WORDS_PER_MINUTE)
}

pub async fn run(args: StatsArgs) -> anyhow::Result<()> {
    let locale = (!args.locale.eq_ignore_ascii_case("all")).then(|| args.locale.clone());
    let posts = load_posts(
        Path::new(&args.content),
        &LoadOptions {
            include_drafts: false,
            locale,
        },
    )
    .await
    .context("load posts")?;

    let stats = linking_stats(&posts);
    if args.json {
        let json = serde_json::to_string_pretty(&stats).context("serialize stats")?;
        println!("{json}");
        return Ok(());
    }

    println!("Total Articles: {}", stats.total_articles);
    println!("With Internal Links: {}", stats.with_internal_links);
    println!("Total Internal Links: {}", stats.total_internal_links);
    println!("Avg Links per Article: {:.2}", stats.avg_links_per_article);
    println!("Link Coverage: {:.1}%", stats.link_coverage);
    println!("Average Read Time: {:.1} min", stats.average_read_time);
    println!("Posts by Category:");
    for (category, count) in &stats.posts_by_category {
        println!("  {category}: {count}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_corpus_is_all_zeros() {
        let stats = linking_stats(&[]);
        assert_eq!(stats.total_articles, 0);
        assert_eq!(stats.avg_links_per_article, 0.0);
        assert_eq!(stats.link_coverage, 0.0);
        assert_eq!(stats.average_read_time, 0.0);
        assert_eq!(stats.posts_by_category.len(), Category::ALL.len());
        assert!(stats.posts_by_category.values().all(|count| *count == 0));
    }

    #[test]
    fn counts_only_site_relative_links() {
        let posts = vec![
            PostRecord::new("a", "A", Category::Timing).with_content(
                "See [b](/en/blog/b) and [c](/en/blog/c), not [x](https://example.com).\n",
            ),
            PostRecord::new("b", "B", Category::Timing).with_content("No links here.\n"),
            PostRecord::new("c", "C", Category::Events)
                .with_content("```\n[code](/en/blog/a)\n```\n"),
        ];

        let stats = linking_stats(&posts);
        assert_eq!(stats.total_articles, 3);
        assert_eq!(stats.with_internal_links, 1);
        assert_eq!(stats.total_internal_links, 2);
        assert!((stats.link_coverage - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.posts_by_category[&Category::Timing], 2);
        assert_eq!(stats.posts_by_category[&Category::Events], 1);
        assert_eq!(stats.posts_by_category[&Category::Industry], 0);
    }

    #[test]
    fn read_time_rounds_up() {
        assert_eq!(read_time_minutes(""), 0);
        assert_eq!(read_time_minutes("one two three"), 1);
        assert_eq!(read_time_minutes(&"word ".repeat(201)), 2);
    }
}
