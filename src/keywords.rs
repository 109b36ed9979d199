//! Keyword extraction and relevance scoring.

use crate::document::Span;
use crate::formats::PostRecord;

pub const TAG_WEIGHT: f64 = 1.0;
pub const TITLE_WORD_WEIGHT: f64 = 0.5;

/// Occurrences of a single keyword beyond this count add nothing.
pub const OCCURRENCE_CAP: usize = 3;

// Raw weight at which the relevance score reaches 0.5.
const SCORE_HALF_POINT: f64 = 2.0;

const MIN_TITLE_WORD_CHARS: usize = 3;

const STOP_WORDS: &[&str] = &[
    "about", "and", "are", "but", "can", "com", "con", "das", "del", "des", "dos", "for", "from",
    "has", "have", "how", "into", "its", "las", "les", "los", "not", "our", "para", "por", "pour",
    "que", "the", "their", "this", "that", "uma", "une", "what", "when", "why", "will", "with",
    "you", "your",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub span: Span,
    pub folded: String,
}

/// Splits `text` into words. Offsets are shifted by `base` so tokens of a
/// slice can refer to the enclosing document.
pub fn tokenize(text: &str, base: usize) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        let inner_apostrophe = matches!(ch, '\'' | '’')
            && start.is_some()
            && chars.peek().is_some_and(|(_, next)| next.is_alphanumeric());
        if ch.is_alphanumeric() || inner_apostrophe {
            start.get_or_insert(idx);
            continue;
        }
        if let Some(word_start) = start.take() {
            tokens.push(token(text, word_start, idx, base));
        }
    }
    if let Some(word_start) = start {
        tokens.push(token(text, word_start, text.len(), base));
    }

    tokens
}

fn token(text: &str, start: usize, end: usize, base: usize) -> Token {
    Token {
        span: Span::new(base + start, base + end),
        folded: text[start..end].to_lowercase(),
    }
}

pub fn words(text: &str) -> Vec<String> {
    tokenize(text, 0).into_iter().map(|t| t.folded).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub phrase: String,
    pub words: Vec<String>,
    pub weight: f64,
}

/// Keywords describing a candidate post: its tags, then the significant
/// words of its title. A phrase appears once, at its highest weight.
pub fn keywords_for(post: &PostRecord) -> Vec<Keyword> {
    let mut keywords: Vec<Keyword> = Vec::new();

    for tag in &post.tags {
        push_keyword(&mut keywords, words(tag), TAG_WEIGHT);
    }
    for word in words(&post.title) {
        if word.chars().count() < MIN_TITLE_WORD_CHARS || STOP_WORDS.contains(&word.as_str()) {
            continue;
        }
        push_keyword(&mut keywords, vec![word], TITLE_WORD_WEIGHT);
    }

    keywords
}

fn push_keyword(keywords: &mut Vec<Keyword>, words: Vec<String>, weight: f64) {
    if words.is_empty() {
        return;
    }
    if let Some(existing) = keywords.iter_mut().find(|k| k.words == words) {
        existing.weight = existing.weight.max(weight);
        return;
    }
    keywords.push(Keyword {
        phrase: words.join(" "),
        words,
        weight,
    });
}

/// Tokenized view of the scannable text of a document. Phrases only match
/// inside a single span.
#[derive(Debug)]
pub struct TextScan<'a> {
    source: &'a str,
    segments: Vec<Vec<Token>>,
}

impl<'a> TextScan<'a> {
    pub fn new(source: &'a str, spans: &[Span]) -> Self {
        let segments = spans
            .iter()
            .map(|span| tokenize(&source[span.start..span.end], span.start))
            .filter(|tokens| !tokens.is_empty())
            .collect();
        Self { source, segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn text(&self, span: Span) -> &'a str {
        &self.source[span.start..span.end]
    }

    /// Spans of every whole-word occurrence of `words`, in document order.
    /// Words of a phrase may be separated by whitespace or hyphens only.
    pub fn find(&self, words: &[String]) -> Vec<Span> {
        let Some(first) = words.first() else {
            return Vec::new();
        };

        let mut found = Vec::new();
        for tokens in &self.segments {
            for (idx, token) in tokens.iter().enumerate() {
                if &token.folded != first {
                    continue;
                }
                let Some(window) = tokens.get(idx..idx + words.len()) else {
                    break;
                };
                let matched = window.iter().zip(words).all(|(t, w)| &t.folded == w)
                    && window.windows(2).all(|pair| self.joinable(&pair[0], &pair[1]));
                if matched && let Some(last) = window.last() {
                    found.push(Span::new(token.span.start, last.span.end));
                }
            }
        }
        found
    }

    fn joinable(&self, left: &Token, right: &Token) -> bool {
        self.source[left.span.end..right.span.start]
            .chars()
            .all(|ch| ch.is_whitespace() || ch == '-')
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeywordOccurrence {
    pub keyword: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateMatch {
    pub score: f64,
    /// Sorted by offset; longer matches first at equal offsets.
    pub occurrences: Vec<KeywordOccurrence>,
}

/// Maps a raw keyword weight into `[0, 1)`. Monotonic in `raw`.
pub fn relevance(raw: f64) -> f64 {
    if raw <= 0.0 || raw.is_nan() {
        return 0.0;
    }
    raw / (raw + SCORE_HALF_POINT)
}

pub fn score(keywords: &[Keyword], scan: &TextScan<'_>) -> CandidateMatch {
    let mut raw = 0.0;
    let mut occurrences = Vec::new();

    for keyword in keywords {
        let spans = scan.find(&keyword.words);
        raw += keyword.weight * spans.len().min(OCCURRENCE_CAP) as f64;
        occurrences.extend(spans.into_iter().map(|span| KeywordOccurrence {
            keyword: keyword.phrase.clone(),
            span,
        }));
    }

    occurrences.sort_by(|a, b| {
        a.span
            .start
            .cmp(&b.span.start)
            .then_with(|| b.span.len().cmp(&a.span.len()))
    });

    CandidateMatch {
        score: relevance(raw),
        occurrences,
    }
}

/// Precomputed keywords for a catalog, aligned with catalog order.
///
/// Read-only once built; rebuild it whenever the catalog changes. It can be
/// shared across concurrent renders behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct KeywordIndex {
    entries: Vec<IndexEntry>,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    slug: String,
    keywords: Vec<Keyword>,
}

impl KeywordIndex {
    pub fn build(catalog: &[PostRecord]) -> Self {
        let entries = catalog
            .iter()
            .map(|post| IndexEntry {
                slug: post.slug.clone(),
                keywords: keywords_for(post),
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keywords of the catalog entry at `position`, if the index still
    /// describes that post.
    pub fn keywords_at(&self, position: usize, slug: &str) -> Option<&[Keyword]> {
        self.entries
            .get(position)
            .filter(|entry| entry.slug == slug)
            .map(|entry| entry.keywords.as_slice())
    }
}
