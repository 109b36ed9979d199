//! Internal link annotation of blog post content.
//!
//! [`annotate`] scans the prose of a post, scores every catalog entry against
//! it, and turns the best keyword occurrences into links to other posts. It
//! is pure: no I/O, no shared state. Bad options never fail the call; they
//! only disable insertion for it.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use anyhow::Context as _;
use serde::Serialize;

use crate::cli::AnnotateArgs;
use crate::config::{LinkFormat, LinkingConfig};
use crate::content::{LoadOptions, load_posts};
use crate::document::{ContentParseError, Document, InsertedMarkup, Insertion, Reference, Span};
use crate::formats::{Category, DEFAULT_LOCALE, PostRecord};
use crate::keywords::{CandidateMatch, KeywordIndex, TextScan, keywords_for, score};
use crate::output::write_output;

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotateOptions {
    pub enabled: bool,
    /// Signed so that callers can pass through unchecked input.
    pub max_links: i64,
    pub min_relevance_score: f64,
    pub locale: String,
    pub link_format: LinkFormat,
    pub exclude_categories: BTreeSet<Category>,
    pub target_categories: BTreeSet<Category>,
    pub supported_locales: BTreeSet<String>,
    pub include_drafts: bool,
}

impl Default for AnnotateOptions {
    fn default() -> Self {
        Self::from_config(&LinkingConfig::default(), DEFAULT_LOCALE)
    }
}

impl AnnotateOptions {
    pub fn from_config(config: &LinkingConfig, locale: &str) -> Self {
        Self {
            enabled: config.enabled,
            max_links: i64::try_from(config.max_links_per_post).unwrap_or(i64::MAX),
            min_relevance_score: config.min_relevance_score,
            locale: locale.to_owned(),
            link_format: config.link_format,
            exclude_categories: config.exclude_categories.clone(),
            target_categories: config.target_categories.clone(),
            supported_locales: config.locales.clone(),
            include_drafts: false,
        }
    }

    fn plan(&self) -> Plan {
        let mut issues = Vec::new();

        if !self.enabled {
            issues.push(OptionIssue::Disabled);
        }

        let budget = usize::try_from(self.max_links).unwrap_or_else(|_| {
            issues.push(OptionIssue::NegativeMaxLinks {
                value: self.max_links,
            });
            0
        });

        let min_score = if (0.0..=1.0).contains(&self.min_relevance_score) {
            self.min_relevance_score
        } else {
            issues.push(OptionIssue::ScoreOutOfRange {
                value: self.min_relevance_score,
            });
            1.0
        };

        let locale = self.locale.trim().to_ascii_lowercase();
        if !self
            .supported_locales
            .iter()
            .any(|supported| supported.eq_ignore_ascii_case(&locale))
        {
            issues.push(OptionIssue::UnsupportedLocale {
                locale: self.locale.clone(),
            });
        }

        Plan {
            budget: if issues.is_empty() { budget } else { 0 },
            min_score,
            locale,
            issues,
        }
    }

    fn admits_category(&self, category: Category) -> bool {
        !self.exclude_categories.contains(&category)
            && (self.target_categories.is_empty() || self.target_categories.contains(&category))
    }
}

#[derive(Debug)]
struct Plan {
    budget: usize,
    min_score: f64,
    locale: String,
    issues: Vec<OptionIssue>,
}

/// An option value that could not be honored. Any issue disables insertion
/// for the call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptionIssue {
    Disabled,
    NegativeMaxLinks { value: i64 },
    ScoreOutOfRange { value: f64 },
    UnsupportedLocale { locale: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    SelfLink,
    Draft,
    LocaleMismatch,
    CategoryFiltered,
    NoKeywordMatch,
    BelowThreshold,
    DuplicateTarget,
    NoFreeOccurrence,
    BudgetExhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkCandidate {
    pub target_slug: String,
    pub matched_keyword: String,
    pub relevance_score: f64,
    /// Byte offset of the anchor text in the source content.
    pub occurrence_offset: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedCandidate {
    pub target_slug: String,
    pub reason: SkipReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct AnnotationResult {
    pub document: Document,
    pub inserted: Vec<LinkCandidate>,
    pub skipped: Vec<SkippedCandidate>,
    pub option_issues: Vec<OptionIssue>,
}

impl AnnotationResult {
    pub fn inserted_count(&self) -> usize {
        self.inserted.len()
    }

    pub fn content(&self) -> String {
        self.document.render()
    }

    pub fn report(&self, slug: &str) -> AnnotationReport {
        AnnotationReport {
            slug: slug.to_owned(),
            inserted_count: self.inserted_count(),
            inserted: self.inserted.clone(),
            skipped: self.skipped.clone(),
            option_issues: self.option_issues.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationReport {
    pub slug: String,
    pub inserted_count: usize,
    pub inserted: Vec<LinkCandidate>,
    pub skipped: Vec<SkippedCandidate>,
    pub option_issues: Vec<OptionIssue>,
}

pub fn post_url(locale: &str, slug: &str) -> String {
    format!("/{locale}/blog/{slug}")
}

pub fn annotate(
    content: &str,
    current_slug: &str,
    catalog: &[PostRecord],
    options: &AnnotateOptions,
) -> Result<AnnotationResult, ContentParseError> {
    let index = KeywordIndex::build(catalog);
    annotate_with_index(content, current_slug, catalog, &index, options)
}

/// Like [`annotate`], reusing keywords precomputed for `catalog`. Entries the
/// index no longer describes are recomputed on the fly.
pub fn annotate_with_index(
    content: &str,
    current_slug: &str,
    catalog: &[PostRecord],
    index: &KeywordIndex,
    options: &AnnotateOptions,
) -> Result<AnnotationResult, ContentParseError> {
    let document = Document::parse(content)?;
    let plan = options.plan();
    for issue in &plan.issues {
        tracing::debug!(slug = current_slug, ?issue, "link insertion disabled");
    }

    let scan = TextScan::new(document.source(), &document.scannable_spans());
    let mut skipped = Vec::new();
    let mut ranked = Vec::new();

    for (position, post) in catalog.iter().enumerate() {
        if let Some(reason) = exclusion(post, current_slug, &plan, options) {
            skipped.push(SkippedCandidate {
                target_slug: post.slug.clone(),
                reason,
                relevance_score: None,
            });
            continue;
        }

        let keywords = match index.keywords_at(position, &post.slug) {
            Some(keywords) => Cow::Borrowed(keywords),
            None => Cow::Owned(keywords_for(post)),
        };
        ranked.push((post, score(&keywords, &scan)));
    }

    // Stable: equal scores keep catalog order.
    ranked.sort_by(|(_, a), (_, b)| b.score.total_cmp(&a.score));

    let mut realizer = Realizer::new(&plan, options.link_format, &document);
    for (post, matched) in &ranked {
        if let Err(reason) = realizer.realize(post, matched) {
            skipped.push(SkippedCandidate {
                target_slug: post.slug.clone(),
                reason,
                relevance_score: Some(matched.score),
            });
        }
    }

    let Realizer {
        inserted,
        insertions,
        trailer,
        ..
    } = realizer;
    let document = if insertions.is_empty() && trailer.is_empty() {
        document
    } else {
        document.with_insertions(&insertions, trailer)
    };

    tracing::debug!(
        slug = current_slug,
        inserted = inserted.len(),
        skipped = skipped.len(),
        "annotated content"
    );

    Ok(AnnotationResult {
        document,
        inserted,
        skipped,
        option_issues: plan.issues,
    })
}

/// Annotates `content`, falling back to the original text when it cannot be
/// parsed.
pub fn annotate_or_original(
    content: &str,
    current_slug: &str,
    catalog: &[PostRecord],
    options: &AnnotateOptions,
) -> String {
    match annotate(content, current_slug, catalog, options) {
        Ok(result) => result.content(),
        Err(err) => {
            tracing::warn!(
                slug = current_slug,
                %err,
                "content could not be parsed; rendering without internal links"
            );
            content.to_owned()
        }
    }
}

fn exclusion(
    post: &PostRecord,
    current_slug: &str,
    plan: &Plan,
    options: &AnnotateOptions,
) -> Option<SkipReason> {
    if post.slug == current_slug {
        Some(SkipReason::SelfLink)
    } else if post.draft && !options.include_drafts {
        Some(SkipReason::Draft)
    } else if !post.locale.trim().eq_ignore_ascii_case(&plan.locale) {
        Some(SkipReason::LocaleMismatch)
    } else if !options.admits_category(post.category) {
        Some(SkipReason::CategoryFiltered)
    } else {
        None
    }
}

struct Realizer<'p> {
    plan: &'p Plan,
    format: LinkFormat,
    source: &'p str,
    taken_labels: &'p BTreeSet<String>,
    next_footnote: usize,
    linked: HashSet<String>,
    claimed: Vec<Span>,
    inserted: Vec<LinkCandidate>,
    insertions: Vec<Insertion>,
    trailer: Vec<Reference>,
}

impl<'p> Realizer<'p> {
    fn new(plan: &'p Plan, format: LinkFormat, document: &'p Document) -> Self {
        Self {
            plan,
            format,
            source: document.source(),
            taken_labels: document.footnote_labels(),
            next_footnote: 1,
            linked: HashSet::new(),
            claimed: Vec::new(),
            inserted: Vec::new(),
            insertions: Vec::new(),
            trailer: Vec::new(),
        }
    }

    fn realize(&mut self, post: &PostRecord, matched: &CandidateMatch) -> Result<(), SkipReason> {
        if self.inserted.len() >= self.plan.budget {
            return Err(SkipReason::BudgetExhausted);
        }
        if matched.occurrences.is_empty() {
            return Err(SkipReason::NoKeywordMatch);
        }
        if matched.score < self.plan.min_score {
            return Err(SkipReason::BelowThreshold);
        }
        if self.linked.contains(&post.slug) {
            return Err(SkipReason::DuplicateTarget);
        }

        // Sidebar links leave the text alone, so occurrences are never used up.
        let in_text = self.format != LinkFormat::Sidebar;
        let occurrence = matched
            .occurrences
            .iter()
            .find(|o| !in_text || self.is_free(o.span))
            .ok_or(SkipReason::NoFreeOccurrence)?;

        let destination = post_url(&self.plan.locale, &post.slug);
        match self.format {
            LinkFormat::Inline => self.insertions.push(Insertion {
                span: occurrence.span,
                destination,
                title: post.title.clone(),
                markup: InsertedMarkup::Inline,
            }),
            LinkFormat::Footnote => {
                let label = self.footnote_label();
                self.insertions.push(Insertion {
                    span: occurrence.span,
                    destination: destination.clone(),
                    title: post.title.clone(),
                    markup: InsertedMarkup::Footnote {
                        label: label.clone(),
                    },
                });
                self.trailer.push(Reference {
                    label: Some(label),
                    title: post.title.clone(),
                    destination,
                });
            }
            LinkFormat::Sidebar => self.trailer.push(Reference {
                label: None,
                title: post.title.clone(),
                destination,
            }),
        }

        if in_text {
            self.claimed.push(occurrence.span);
        }
        self.linked.insert(post.slug.clone());
        self.inserted.push(LinkCandidate {
            target_slug: post.slug.clone(),
            matched_keyword: occurrence.keyword.clone(),
            relevance_score: matched.score,
            occurrence_offset: occurrence.span.start,
        });

        Ok(())
    }

    fn is_free(&self, span: Span) -> bool {
        if self.claimed.iter().any(|claimed| claimed.overlaps(span)) {
            return false;
        }
        // `![anchor](...)` would read as an image.
        self.format != LinkFormat::Inline || !self.source[..span.start].ends_with('!')
    }

    /// Next `related-N` label not already used by the content.
    fn footnote_label(&mut self) -> String {
        loop {
            let label = format!("related-{}", self.next_footnote);
            self.next_footnote += 1;
            if !self.taken_labels.contains(&label) {
                return label;
            }
        }
    }
}

pub async fn run(args: AnnotateArgs) -> anyhow::Result<()> {
    let config = LinkingConfig::load(args.config.as_deref().map(Path::new))
        .await
        .context("load config")?;

    let posts = load_posts(
        Path::new(&args.content),
        &LoadOptions {
            include_drafts: true,
            locale: None,
        },
    )
    .await
    .context("load posts")?;

    let current = posts
        .iter()
        .find(|post| post.slug == args.slug)
        .ok_or_else(|| anyhow::anyhow!("post not found: {}", args.slug))?;

    let locale = args.locale.as_deref().unwrap_or(&current.locale);
    let mut options = AnnotateOptions::from_config(&config, locale);
    if let Some(max_links) = args.max_links {
        options.max_links = max_links;
    }
    if let Some(min_score) = args.min_score {
        options.min_relevance_score = min_score;
    }
    if let Some(format) = args.format {
        options.link_format = format;
    }
    options.include_drafts = args.include_drafts;

    let (content, report) = match annotate(&current.content, &current.slug, &posts, &options) {
        Ok(result) => {
            tracing::info!(
                slug = %current.slug,
                inserted = result.inserted_count(),
                skipped = result.skipped.len(),
                "annotated post"
            );
            (result.content(), Some(result.report(&current.slug)))
        }
        Err(err) => {
            tracing::warn!(
                slug = %current.slug,
                %err,
                "content could not be parsed; writing it without internal links"
            );
            (current.content.clone(), None)
        }
    };

    match args.out.as_deref() {
        Some(out) => write_output(Path::new(out), content.as_bytes(), args.force)
            .context("write annotated content")?,
        None => print!("{content}"),
    }

    if let Some(report_path) = args.report.as_deref() {
        let report = report.unwrap_or_else(|| AnnotationReport {
            slug: current.slug.clone(),
            inserted_count: 0,
            inserted: Vec::new(),
            skipped: Vec::new(),
            option_issues: Vec::new(),
        });
        let json = serde_json::to_string_pretty(&report).context("serialize annotation report")?;
        write_output(Path::new(report_path), json.as_bytes(), args.force)
            .context("write annotation report")?;
    }

    Ok(())
}
