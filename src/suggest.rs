use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::Context as _;

use crate::cli::AnalyzeArgs;
use crate::content::{LoadOptions, load_posts};
use crate::document::{Document, excerpt, plain_text};
use crate::formats::{LinkReason, LinkSuggestion, PostRecord};
use crate::keywords::{TextScan, keywords_for, score, words};
use crate::output::write_output;

const CONTEXT_EXCERPT_CHARS: usize = 100;
const FALLBACK_ANCHOR_WORDS: usize = 3;

/// Ranked link suggestions for `current`: same-locale, non-draft posts
/// scored by category, shared tags, and content overlap.
pub fn link_suggestions(
    current: &PostRecord,
    catalog: &[PostRecord],
    limit: usize,
) -> Vec<LinkSuggestion> {
    if limit == 0 {
        return Vec::new();
    }

    let mut related = catalog
        .iter()
        .filter(|post| {
            post.slug != current.slug
                && !post.draft
                && post.locale.eq_ignore_ascii_case(&current.locale)
        })
        .map(|post| (related_score(current, post), post))
        .collect::<Vec<_>>();
    related.sort_by(|a, b| b.0.cmp(&a.0));
    related.truncate(limit.saturating_mul(2));

    let current_words = word_set(&current.content);
    let document = match Document::parse(&current.content) {
        Ok(document) => Some(document),
        Err(err) => {
            tracing::warn!(slug = %current.slug, %err, "cannot scan post for anchors");
            None
        }
    };
    let spans = document
        .as_ref()
        .map(Document::scannable_spans)
        .unwrap_or_default();
    let scan = TextScan::new(
        document.as_ref().map(Document::source).unwrap_or_default(),
        &spans,
    );

    let mut suggestions = related
        .into_iter()
        .map(|(_, post)| {
            let post_words = word_set(&post.content);
            let overlap = keyword_overlap(&current_words, &post_words);
            LinkSuggestion {
                slug: post.slug.clone(),
                title: post.title.clone(),
                score: linking_score(current, post, &current_words, &post_words),
                reason: link_reason(current, post, overlap),
                suggested_anchor: suggested_anchor(&scan, post),
                context_excerpt: excerpt(&post.content, CONTEXT_EXCERPT_CHARS),
            }
        })
        .collect::<Vec<_>>();

    suggestions.sort_by(|a, b| b.score.total_cmp(&a.score));
    suggestions.truncate(limit);
    suggestions
}

fn related_score(current: &PostRecord, post: &PostRecord) -> u32 {
    let mut score = 0u32;
    if post.category == current.category {
        score += 10;
    }
    score += 5 * shared_tags(current, post) as u32;
    if post.featured {
        score += 2;
    }
    score
}

fn shared_tags(current: &PostRecord, post: &PostRecord) -> usize {
    post.tags.iter().filter(|tag| current.has_tag(tag)).count()
}

fn linking_score(
    current: &PostRecord,
    post: &PostRecord,
    current_words: &HashSet<String>,
    post_words: &HashSet<String>,
) -> f64 {
    let category = if current.category == post.category {
        0.3
    } else {
        0.0
    };
    let tags = (shared_tags(current, post) as f64 * 0.1).min(0.3);
    let similarity = content_similarity(current_words, post_words);
    let overlap = keyword_overlap(current_words, post_words);

    (category + tags + similarity + overlap).min(1.0)
}

fn link_reason(current: &PostRecord, post: &PostRecord, overlap: f64) -> LinkReason {
    if current.category == post.category {
        LinkReason::Category
    } else if shared_tags(current, post) > 0 {
        LinkReason::Tag
    } else if overlap > 0.1 {
        LinkReason::Keyword
    } else {
        LinkReason::Semantic
    }
}

/// The target keyword found earliest in the current post, as written there;
/// otherwise the first words of the target title.
fn suggested_anchor(scan: &TextScan<'_>, post: &PostRecord) -> String {
    let matched = score(&keywords_for(post), scan);
    if let Some(occurrence) = matched.occurrences.first() {
        return scan.text(occurrence.span).to_owned();
    }

    words(&post.title)
        .into_iter()
        .take(FALLBACK_ANCHOR_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

fn word_set(markdown: &str) -> HashSet<String> {
    words(&plain_text(markdown)).into_iter().collect()
}

/// Jaccard similarity of two word sets.
fn content_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn keyword_overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let larger = a.len().max(b.len());
    if larger == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / larger as f64
}

pub async fn run(args: AnalyzeArgs) -> anyhow::Result<()> {
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

    let mut results = BTreeMap::new();
    match args.slug.as_deref() {
        Some(slug) => {
            let current = posts
                .iter()
                .find(|post| post.slug == slug)
                .ok_or_else(|| anyhow::anyhow!("post not found: {slug}"))?;
            let suggestions = link_suggestions(current, &posts, args.limit);

            println!("Link suggestions for {slug}:");
            for (idx, suggestion) in suggestions.iter().enumerate() {
                println!("  {}. {}", idx + 1, suggestion.title);
                println!("     Score: {:.1}%", suggestion.score * 100.0);
                println!("     Reason: {:?}", suggestion.reason);
                println!("     Anchor: \"{}\"", suggestion.suggested_anchor);
            }
            results.insert(slug.to_owned(), suggestions);
        }
        None => {
            for post in &posts {
                let suggestions = link_suggestions(post, &posts, args.limit);
                if !suggestions.is_empty() {
                    results.insert(post.slug.clone(), suggestions);
                }
            }
            let total = results.values().map(Vec::len).sum::<usize>();
            println!("Articles analyzed: {}", posts.len());
            println!("Total suggestions: {total}");
        }
    }

    if let Some(export) = args.export.as_deref() {
        let json = serde_json::to_string_pretty(&results).context("serialize suggestions")?;
        write_output(Path::new(export), json.as_bytes(), args.force)
            .context("export suggestions")?;
        tracing::info!(path = export, "exported suggestions");
    }

    Ok(())
}
