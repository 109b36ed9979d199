//! Lossless Markdown/MDX document tree.
//!
//! Every node records the byte span it was parsed from, so rendering an
//! unmodified tree reproduces the source exactly. Rewrites produce a new tree
//! that shares every untouched subtree with the original.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::ops::Range;
use std::sync::Arc;

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, other: Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentParseError {
    #[error("content contains a NUL byte at offset {offset}")]
    NulByte { offset: usize },

    #[error("unbalanced markup: closing tag without an open element at offset {offset}")]
    UnbalancedClose { offset: usize },

    #[error("unbalanced markup: {open} element(s) still open at end of content")]
    UnclosedElements { open: usize },

    #[error("markup span {start}..{end} does not fall on character boundaries")]
    InvalidSpan { start: usize, end: usize },
}

#[derive(Debug, Clone)]
pub enum Node {
    /// Prose that may receive links.
    Text(Span),
    /// Inline code spans and fenced/indented code blocks.
    Code(Span),
    /// Markup that is copied through untouched: HTML, images, math, front
    /// matter, footnote references, rules, and text guarded by inline HTML.
    Verbatim(Span),
    Heading {
        span: Span,
        level: u8,
        children: Arc<[Node]>,
    },
    Link(Link),
    Container {
        span: Span,
        children: Arc<[Node]>,
    },
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Text(span) | Node::Code(span) | Node::Verbatim(span) => *span,
            Node::Heading { span, .. } | Node::Container { span, .. } => *span,
            Node::Link(link) => link.span,
        }
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Heading { children, .. } | Node::Container { children, .. } => children,
            Node::Link(link) => &link.children,
            Node::Text(_) | Node::Code(_) | Node::Verbatim(_) => &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Link {
    pub span: Span,
    pub destination: String,
    pub title: String,
    pub origin: LinkOrigin,
    pub children: Arc<[Node]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOrigin {
    Source,
    Inserted(InsertedMarkup),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertedMarkup {
    Inline,
    Footnote { label: String },
}

/// Text range to be turned into a link by [`Document::with_insertions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion {
    pub span: Span,
    pub destination: String,
    pub title: String,
    pub markup: InsertedMarkup,
}

/// Entry appended after the body: a footnote definition when `label` is set,
/// otherwise a line of the "Related posts" list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub label: Option<String>,
    pub title: String,
    pub destination: String,
}

#[derive(Debug, Clone)]
pub struct Document {
    source: Arc<str>,
    nodes: Arc<[Node]>,
    trailer: Arc<[Reference]>,
    footnote_labels: Arc<BTreeSet<String>>,
}

impl Document {
    pub fn parse(source: &str) -> Result<Self, ContentParseError> {
        if let Some(offset) = source.find('\0') {
            return Err(ContentParseError::NulByte { offset });
        }

        let mut builder = TreeBuilder::new(source);
        for (event, range) in Parser::new_ext(source, parse_options()).into_offset_iter() {
            builder.push(event, range)?;
        }
        let (nodes, footnote_labels) = builder.finish()?;

        Ok(Self {
            source: Arc::from(source),
            nodes: Arc::from(nodes),
            trailer: Arc::from(Vec::new()),
            footnote_labels: Arc::new(footnote_labels),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn trailer(&self) -> &[Reference] {
        &self.trailer
    }

    /// Footnote labels referenced or defined in the source, lower-cased.
    pub fn footnote_labels(&self) -> &BTreeSet<String> {
        &self.footnote_labels
    }

    /// Text spans eligible for link insertion, in document order.
    ///
    /// Headings, existing links, code, verbatim markup and MDX `{...}`
    /// expressions are never scanned.
    pub fn scannable_spans(&self) -> Vec<Span> {
        let mut spans = Vec::new();
        for node in self.nodes.iter() {
            let mut depth = 0;
            collect_scannable(&self.source, std::slice::from_ref(node), &mut depth, &mut spans);
        }
        spans
    }

    pub fn links(&self) -> Vec<&Link> {
        let mut links = Vec::new();
        collect_links(&self.nodes, &mut links);
        links
    }

    /// Returns a new document with `insertions` realized as links and
    /// `trailer` appended. Subtrees without insertions are shared.
    pub fn with_insertions(&self, insertions: &[Insertion], trailer: Vec<Reference>) -> Self {
        let mut sorted = insertions.iter().collect::<Vec<_>>();
        sorted.sort_by_key(|insertion| insertion.span.start);

        let mut references = self.trailer.to_vec();
        references.extend(trailer);

        Self {
            source: Arc::clone(&self.source),
            nodes: rewrite_nodes(&self.nodes, &sorted),
            trailer: Arc::from(references),
            footnote_labels: Arc::clone(&self.footnote_labels),
        }
    }

    pub fn shares_nodes_with(&self, other: &Document) -> bool {
        Arc::ptr_eq(&self.nodes, &other.nodes)
    }

    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.source.len());
        let mut cursor = 0usize;
        render_nodes(&self.source, &self.nodes, &mut cursor, &mut out);
        out.push_str(&self.source[cursor..]);
        render_trailer(&self.trailer, &mut out);
        out
    }
}

fn parse_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_YAML_STYLE_METADATA_BLOCKS);
    options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
    options
}

// Inline HTML elements whose text content must not be linked. MDX link
// components lower-case to `link`.
const GUARDED_INLINE_TAGS: &[&str] = &["a", "code", "kbd", "link", "pre", "script", "style"];

const ESM_KEYWORDS: &[&str] = &["import", "export"];

#[derive(Debug)]
enum FrameKind {
    Container,
    Heading(u8),
    Link { destination: String, title: String },
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    span: Span,
    children: Vec<Node>,
}

struct TreeBuilder<'s> {
    source: &'s str,
    root: Vec<Node>,
    stack: Vec<Frame>,
    opaque_depth: usize,
    inline_guard: usize,
    footnote_labels: BTreeSet<String>,
}

impl<'s> TreeBuilder<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            root: Vec::new(),
            stack: Vec::new(),
            opaque_depth: 0,
            inline_guard: 0,
            footnote_labels: BTreeSet::new(),
        }
    }

    fn push(&mut self, event: Event<'_>, range: Range<usize>) -> Result<(), ContentParseError> {
        let span = self.span(range)?;

        if self.opaque_depth > 0 {
            match event {
                Event::Start(_) => self.opaque_depth += 1,
                Event::End(_) => self.opaque_depth -= 1,
                _ => {}
            }
            return Ok(());
        }

        match event {
            Event::Start(tag) => self.open(tag, span),
            Event::End(_) => self.close(span)?,
            Event::Text(_) => {
                if self.inline_guard > 0 {
                    self.push_node(Node::Verbatim(span));
                } else {
                    self.push_text(span);
                }
            }
            Event::Code(_) => self.push_node(Node::Code(span)),
            Event::FootnoteReference(label) => {
                self.footnote_labels.insert(label.to_lowercase());
                self.push_node(Node::Verbatim(span));
            }
            Event::InlineHtml(html) => {
                match guard_transition(&html) {
                    Some(true) => self.inline_guard += 1,
                    Some(false) => self.inline_guard = self.inline_guard.saturating_sub(1),
                    None => {}
                }
                self.push_node(Node::Verbatim(span));
            }
            Event::SoftBreak | Event::HardBreak => {}
            _ => self.push_node(Node::Verbatim(span)),
        }

        Ok(())
    }

    fn span(&self, range: Range<usize>) -> Result<Span, ContentParseError> {
        let valid = range.start <= range.end
            && range.end <= self.source.len()
            && self.source.is_char_boundary(range.start)
            && self.source.is_char_boundary(range.end);
        if !valid {
            return Err(ContentParseError::InvalidSpan {
                start: range.start,
                end: range.end,
            });
        }
        Ok(Span::new(range.start, range.end))
    }

    fn open(&mut self, tag: Tag<'_>, span: Span) {
        let kind = match tag {
            Tag::CodeBlock(_) => return self.open_opaque(Node::Code(span)),
            Tag::HtmlBlock | Tag::MetadataBlock(_) | Tag::Image { .. } => {
                return self.open_opaque(Node::Verbatim(span));
            }
            Tag::Paragraph if self.stack.is_empty() && is_esm(&self.source[span.start..]) => {
                return self.open_opaque(Node::Verbatim(span));
            }
            Tag::FootnoteDefinition(label) => {
                self.footnote_labels.insert(label.to_lowercase());
                FrameKind::Container
            }
            Tag::Heading { level, .. } => FrameKind::Heading(level as u8),
            Tag::Link {
                dest_url, title, ..
            } => FrameKind::Link {
                destination: dest_url.into_string(),
                title: title.into_string(),
            },
            _ => FrameKind::Container,
        };

        self.stack.push(Frame {
            kind,
            span,
            children: Vec::new(),
        });
    }

    fn open_opaque(&mut self, node: Node) {
        self.push_node(node);
        self.opaque_depth = 1;
    }

    fn close(&mut self, span: Span) -> Result<(), ContentParseError> {
        let frame = self
            .stack
            .pop()
            .ok_or(ContentParseError::UnbalancedClose { offset: span.start })?;

        let children = Arc::from(frame.children);
        let node = match frame.kind {
            FrameKind::Container => Node::Container {
                span: frame.span,
                children,
            },
            FrameKind::Heading(level) => Node::Heading {
                span: frame.span,
                level,
                children,
            },
            FrameKind::Link { destination, title } => Node::Link(Link {
                span: frame.span,
                destination,
                title,
                origin: LinkOrigin::Source,
                children,
            }),
        };
        self.push_node(node);

        if self.stack.is_empty() {
            self.inline_guard = 0;
        }
        Ok(())
    }

    fn current_children(&mut self) -> &mut Vec<Node> {
        match self.stack.last_mut() {
            Some(frame) => &mut frame.children,
            None => &mut self.root,
        }
    }

    fn push_node(&mut self, node: Node) {
        self.current_children().push(node);
    }

    fn push_text(&mut self, span: Span) {
        let children = self.current_children();
        if let Some(Node::Text(previous)) = children.last_mut()
            && previous.end == span.start
        {
            previous.end = span.end;
            return;
        }
        children.push(Node::Text(span));
    }

    fn finish(self) -> Result<(Vec<Node>, BTreeSet<String>), ContentParseError> {
        if !self.stack.is_empty() {
            return Err(ContentParseError::UnclosedElements {
                open: self.stack.len(),
            });
        }
        Ok((self.root, self.footnote_labels))
    }
}

/// `Some(true)` opens a guarded inline element, `Some(false)` closes one.
fn guard_transition(html: &str) -> Option<bool> {
    let inner = html.trim().strip_prefix('<')?;
    let (closing, inner) = match inner.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, inner),
    };

    let name = inner
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    if !GUARDED_INLINE_TAGS.contains(&name.as_str()) {
        return None;
    }
    if !closing && inner.trim_end().ends_with("/>") {
        return None;
    }

    Some(!closing)
}

/// MDX module syntax (`import x from 'y'`, `export const ...`).
fn is_esm(block: &str) -> bool {
    let line = block.lines().next().unwrap_or_default();
    ESM_KEYWORDS.iter().any(|keyword| {
        line.strip_prefix(keyword)
            .is_some_and(|rest| rest.starts_with(|ch: char| ch.is_whitespace() || ch == '{'))
    })
}

/// `depth` counts open `{` so that an expression split across text runs
/// stays excluded until its closing brace.
fn collect_scannable(source: &str, nodes: &[Node], depth: &mut usize, out: &mut Vec<Span>) {
    for node in nodes {
        match node {
            Node::Text(span) => push_outside_expressions(source, *span, depth, out),
            Node::Container { children, .. } => collect_scannable(source, children, depth, out),
            Node::Heading { .. } | Node::Link(_) | Node::Code(_) | Node::Verbatim(_) => {}
        }
    }
}

fn push_outside_expressions(source: &str, span: Span, depth: &mut usize, out: &mut Vec<Span>) {
    let mut start = (*depth == 0).then_some(span.start);
    for (idx, byte) in source[span.start..span.end].bytes().enumerate() {
        let offset = span.start + idx;
        match byte {
            b'{' => {
                if *depth == 0
                    && let Some(start) = start.take()
                    && start < offset
                {
                    out.push(Span::new(start, offset));
                }
                *depth += 1;
            }
            b'}' if *depth > 0 => {
                *depth -= 1;
                if *depth == 0 {
                    start = Some(offset + 1);
                }
            }
            _ => {}
        }
    }
    if let Some(start) = start
        && start < span.end
    {
        out.push(Span::new(start, span.end));
    }
}

fn collect_links<'d>(nodes: &'d [Node], out: &mut Vec<&'d Link>) {
    for node in nodes {
        if let Node::Link(link) = node {
            out.push(link);
        }
        collect_links(node.children(), out);
    }
}

fn rewrite_nodes(nodes: &Arc<[Node]>, insertions: &[&Insertion]) -> Arc<[Node]> {
    let touched = nodes
        .iter()
        .any(|node| insertions.iter().any(|i| node.span().contains(i.span)));
    if !touched {
        return Arc::clone(nodes);
    }

    let mut out = Vec::with_capacity(nodes.len() + insertions.len() * 2);
    for node in nodes.iter() {
        let inside = insertions
            .iter()
            .copied()
            .filter(|insertion| node.span().contains(insertion.span))
            .collect::<Vec<_>>();
        if inside.is_empty() {
            out.push(node.clone());
            continue;
        }

        match node {
            Node::Text(span) => split_text(*span, &inside, &mut out),
            Node::Container { span, children } => out.push(Node::Container {
                span: *span,
                children: rewrite_nodes(children, &inside),
            }),
            // Insertions are only ever placed inside scannable text.
            Node::Code(_) | Node::Verbatim(_) | Node::Heading { .. } | Node::Link(_) => {
                out.push(node.clone());
            }
        }
    }

    Arc::from(out)
}

fn split_text(span: Span, insertions: &[&Insertion], out: &mut Vec<Node>) {
    let mut cursor = span.start;
    for insertion in insertions {
        if insertion.span.start > cursor {
            out.push(Node::Text(Span::new(cursor, insertion.span.start)));
        }
        out.push(Node::Link(Link {
            span: insertion.span,
            destination: insertion.destination.clone(),
            title: insertion.title.clone(),
            origin: LinkOrigin::Inserted(insertion.markup.clone()),
            children: Arc::from(vec![Node::Text(insertion.span)]),
        }));
        cursor = insertion.span.end;
    }
    if cursor < span.end {
        out.push(Node::Text(Span::new(cursor, span.end)));
    }
}

fn render_nodes(source: &str, nodes: &[Node], cursor: &mut usize, out: &mut String) {
    for node in nodes {
        match node {
            Node::Link(link) => match &link.origin {
                LinkOrigin::Inserted(markup) => {
                    out.push_str(&source[*cursor..link.span.start]);
                    render_inserted_link(source, link, markup, out);
                    *cursor = link.span.end;
                }
                LinkOrigin::Source => render_nodes(source, &link.children, cursor, out),
            },
            Node::Heading { children, .. } | Node::Container { children, .. } => {
                render_nodes(source, children, cursor, out);
            }
            Node::Text(_) | Node::Code(_) | Node::Verbatim(_) => {}
        }
    }
}

fn render_inserted_link(source: &str, link: &Link, markup: &InsertedMarkup, out: &mut String) {
    let anchor = &source[link.span.start..link.span.end];
    match markup {
        InsertedMarkup::Inline => {
            out.push('[');
            out.push_str(anchor);
            out.push_str("](");
            out.push_str(&escape_destination(&link.destination));
            if !link.title.is_empty() {
                out.push_str(" \"");
                out.push_str(&escape_title(&link.title));
                out.push('"');
            }
            out.push(')');
        }
        InsertedMarkup::Footnote { label } => {
            out.push_str(anchor);
            let _ = write!(out, "[^{label}]");
        }
    }
}

fn render_trailer(trailer: &[Reference], out: &mut String) {
    if trailer.is_empty() {
        return;
    }

    let (footnotes, sidebar): (Vec<&Reference>, Vec<&Reference>) =
        trailer.iter().partition(|reference| reference.label.is_some());

    if !footnotes.is_empty() {
        ensure_blank_line(out);
        for reference in footnotes {
            let label = reference.label.as_deref().unwrap_or_default();
            let _ = writeln!(
                out,
                "[^{label}]: [{}]({})",
                escape_link_text(&reference.title),
                escape_destination(&reference.destination)
            );
        }
    }

    if !sidebar.is_empty() {
        ensure_blank_line(out);
        out.push_str("---\n\n**Related posts**\n\n");
        for reference in sidebar {
            let _ = writeln!(
                out,
                "- [{}]({})",
                escape_link_text(&reference.title),
                escape_destination(&reference.destination)
            );
        }
    }
}

fn ensure_blank_line(out: &mut String) {
    if out.is_empty() {
        return;
    }
    while !out.ends_with("\n\n") {
        out.push('\n');
    }
}

fn escape_link_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '[' | ']' | '|') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Backslash-escapes a double-quoted link title. `|` is escaped too so that
/// links inside table cells do not split the row.
fn escape_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for ch in title.chars() {
        if matches!(ch, '\\' | '"' | '|') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Percent-encodes bytes that would end or split a bare link destination.
fn escape_destination(destination: &str) -> String {
    let mut out = String::with_capacity(destination.len());
    for ch in destination.chars() {
        let unsafe_byte = matches!(ch, ' ' | '"' | '<' | '>' | '(' | ')' | '\\' | '|' | '`');
        if unsafe_byte || ch.is_ascii_control() {
            let _ = write!(out, "%{:02X}", ch as u32);
        } else {
            out.push(ch);
        }
    }
    out
}

/// Markdown with markup removed: text and inline code only, whitespace
/// collapsed. Image alt text and code blocks are dropped.
pub fn plain_text(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut skip_depth = 0usize;

    for event in Parser::new_ext(markdown, parse_options()) {
        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(Tag::Image { .. } | Tag::CodeBlock(_) | Tag::MetadataBlock(_)) => {
                skip_depth = 1;
            }
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push(' '),
            Event::End(end) if is_block_end(&end) => out.push(' '),
            _ => {}
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_block_end(end: &TagEnd) -> bool {
    matches!(
        end,
        TagEnd::Paragraph
            | TagEnd::Heading(_)
            | TagEnd::BlockQuote(_)
            | TagEnd::Item
            | TagEnd::TableCell
            | TagEnd::FootnoteDefinition
    )
}

/// Plain-text excerpt of at most `max_chars` characters, cut at a word
/// boundary and suffixed with `...` when shortened.
pub fn excerpt(markdown: &str, max_chars: usize) -> String {
    let text = plain_text(markdown);
    if text.chars().count() <= max_chars {
        return text;
    }

    let cut = text
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    let head = &text[..cut];
    let head = match head.rfind(char::is_whitespace) {
        Some(idx) if idx > 0 => &head[..idx],
        _ => head,
    };
    format!("{}...", head.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scannable_text(doc: &Document) -> Vec<&str> {
        doc.scannable_spans()
            .into_iter()
            .map(|span| &doc.source()[span.start..span.end])
            .collect()
    }

    #[test]
    fn render_is_lossless_without_insertions() -> anyhow::Result<()> {
        let source = "---\ntitle: x\n---\n\n# Heading\n\nSome *emphasis* and `code`.\n\n\
```rust\nlet timer = 1;\n```\n\n| a | b |\n|---|---|\n| c | d |\n\n<Callout>hi</Callout>\n";
        let doc = Document::parse(source)?;
        assert_eq!(doc.render(), source);
        Ok(())
    }

    #[test]
    fn empty_content_renders_empty() -> anyhow::Result<()> {
        let doc = Document::parse("")?;
        assert!(doc.nodes().is_empty());
        assert_eq!(doc.render(), "");
        Ok(())
    }

    #[test]
    fn scannable_spans_skip_structural_text() -> anyhow::Result<()> {
        let source = "# Timer heading\n\nStart the [timer](/x) with `timer` then <a href=\"/y\">timer</a> plain timer.\n\n```\ntimer\n```\n";
        let doc = Document::parse(source)?;
        let texts = scannable_text(&doc);
        let joined = texts.join("|");

        assert!(!joined.contains("heading"));
        assert_eq!(joined.matches("timer").count(), 1, "{joined}");
        assert!(joined.contains("plain timer"));
        Ok(())
    }

    #[test]
    fn links_are_collected_with_destinations() -> anyhow::Result<()> {
        let doc = Document::parse("See [one](/en/blog/one) and [two](https://example.com).")?;
        let destinations = doc
            .links()
            .into_iter()
            .map(|link| link.destination.as_str())
            .collect::<Vec<_>>();
        assert_eq!(destinations, vec!["/en/blog/one", "https://example.com"]);
        Ok(())
    }

    #[test]
    fn nul_byte_is_a_parse_error() {
        let err = Document::parse("abc\0def").unwrap_err();
        assert_eq!(err, ContentParseError::NulByte { offset: 3 });
    }

    #[test]
    fn insertion_splits_text_and_shares_untouched_blocks() -> anyhow::Result<()> {
        let source = "First paragraph.\n\nSecond timer paragraph.\n";
        let doc = Document::parse(source)?;
        let start = source.find("timer").unwrap();

        let insertion = Insertion {
            span: Span::new(start, start + "timer".len()),
            destination: "/en/blog/timer".to_owned(),
            title: "Timer \"Guide\"".to_owned(),
            markup: InsertedMarkup::Inline,
        };
        let annotated = doc.with_insertions(&[insertion], Vec::new());

        assert_eq!(
            annotated.render(),
            "First paragraph.\n\nSecond [timer](/en/blog/timer \"Timer \\\"Guide\\\"\") paragraph.\n"
        );
        assert_eq!(doc.render(), source);
        assert!(!annotated.shares_nodes_with(&doc));

        let (Node::Container { children: before, .. }, Node::Container { children: after, .. }) =
            (&doc.nodes()[0], &annotated.nodes()[0])
        else {
            panic!("expected paragraphs");
        };
        assert!(Arc::ptr_eq(before, after));
        Ok(())
    }

    #[test]
    fn footnote_and_sidebar_trailers_render_after_body() -> anyhow::Result<()> {
        let source = "Use the timer.";
        let doc = Document::parse(source)?;
        let start = source.find("timer").unwrap();

        let annotated = doc.with_insertions(
            &[Insertion {
                span: Span::new(start, start + 5),
                destination: "/en/blog/timer".to_owned(),
                title: "Timer".to_owned(),
                markup: InsertedMarkup::Footnote {
                    label: "related-1".to_owned(),
                },
            }],
            vec![
                Reference {
                    label: Some("related-1".to_owned()),
                    title: "Timer".to_owned(),
                    destination: "/en/blog/timer".to_owned(),
                },
                Reference {
                    label: None,
                    title: "Events [2025]".to_owned(),
                    destination: "/en/blog/events".to_owned(),
                },
            ],
        );

        assert_eq!(
            annotated.render(),
            "Use the timer[^related-1].\n\n[^related-1]: [Timer](/en/blog/timer)\n\n\
---\n\n**Related posts**\n\n- [Events \\[2025\\]](/en/blog/events)\n"
        );
        Ok(())
    }

    #[test]
    fn mdx_module_lines_and_expressions_are_not_scannable() -> anyhow::Result<()> {
        let source = "import Timer from './timer'\nexport const meta = { timer: 1 }\n\n\
A timer {props.timer} and {nested {timer}} timer.\n";
        let doc = Document::parse(source)?;
        let joined = scannable_text(&doc).join("|");

        assert!(!joined.contains("import"), "{joined}");
        assert!(!joined.contains("props"), "{joined}");
        assert_eq!(joined.matches("timer").count(), 2, "{joined}");
        assert_eq!(doc.render(), source);
        Ok(())
    }

    #[test]
    fn footnote_labels_in_source_are_recorded() -> anyhow::Result<()> {
        let doc = Document::parse("Text[^Related-1].\n\n[^Related-1]: Note.\n")?;
        assert!(doc.footnote_labels().contains("related-1"));
        Ok(())
    }

    #[test]
    fn inserted_link_in_table_cell_keeps_the_row() -> anyhow::Result<()> {
        let source = "| a | b |\n|---|---|\n| timer | x |\n";
        let doc = Document::parse(source)?;
        let start = source.find("timer").unwrap();

        let annotated = doc.with_insertions(
            &[Insertion {
                span: Span::new(start, start + 5),
                destination: "/en/blog/timer-basics".to_owned(),
                title: "Timers | CueTimer".to_owned(),
                markup: InsertedMarkup::Inline,
            }],
            Vec::new(),
        );
        let rendered = annotated.render();
        assert!(rendered.contains("| [timer](/en/blog/timer-basics \"Timers \\| CueTimer\") | x |"));

        let reparsed = Document::parse(&rendered)?;
        assert_eq!(reparsed.links().len(), 1);
        Ok(())
    }

    #[test]
    fn destinations_and_titles_are_escaped() -> anyhow::Result<()> {
        let source = "Read timer.";
        let doc = Document::parse(source)?;
        let start = source.find("timer").unwrap();

        let annotated = doc.with_insertions(
            &[Insertion {
                span: Span::new(start, start + 5),
                destination: "/en/blog/my post".to_owned(),
                title: "Path C:\\".to_owned(),
                markup: InsertedMarkup::Inline,
            }],
            Vec::new(),
        );
        let rendered = annotated.render();
        assert_eq!(rendered, "Read [timer](/en/blog/my%20post \"Path C:\\\\\").");

        let reparsed = Document::parse(&rendered)?;
        let links = reparsed.links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].destination, "/en/blog/my%20post");
        assert_eq!(links[0].title, "Path C:\\");
        Ok(())
    }

    #[test]
    fn excerpt_strips_markup_and_cuts_at_word_boundary() {
        let markdown = "# Title\n\nThe **quick** brown [fox](/fox) jumps over the lazy dog.";
        assert_eq!(
            plain_text(markdown),
            "Title The quick brown fox jumps over the lazy dog."
        );
        assert_eq!(excerpt(markdown, 22), "Title The quick brown...");
        assert_eq!(excerpt("short", 100), "short");
    }
}
