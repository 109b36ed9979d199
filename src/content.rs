use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::{DateTime, NaiveDate, Utc};

use crate::formats::{DEFAULT_LOCALE, PostFrontMatter, PostRecord};

pub const POST_EXTENSIONS: [&str; 2] = ["md", "mdx"];

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub include_drafts: bool,
    /// Only keep posts in this locale (case-insensitive).
    pub locale: Option<String>,
}

/// Loads every post under `<content_dir>/<YYYY>/`. Files that fail to parse
/// are skipped with a warning. Newest posts come first.
pub async fn load_posts(
    content_dir: &Path,
    options: &LoadOptions,
) -> anyhow::Result<Vec<PostRecord>> {
    let exists = tokio::fs::try_exists(content_dir)
        .await
        .with_context(|| format!("stat content dir: {}", content_dir.display()))?;
    if !exists {
        anyhow::bail!("content directory does not exist: {}", content_dir.display());
    }

    let mut year_dirs = Vec::new();
    let mut entries = tokio::fs::read_dir(content_dir)
        .await
        .with_context(|| format!("read content dir: {}", content_dir.display()))?;
    while let Some(entry) = entries.next_entry().await.context("read content dir entry")? {
        let file_type = entry.file_type().await.context("stat content dir entry")?;
        let name = entry.file_name().to_string_lossy().to_string();
        if file_type.is_dir() && is_year(&name) {
            year_dirs.push((name, entry.path()));
        }
    }
    year_dirs.sort_by(|a, b| b.0.cmp(&a.0));

    let mut posts = Vec::new();
    for (_, year_dir) in year_dirs {
        for path in post_files(&year_dir).await? {
            let contents = match tokio::fs::read_to_string(&path).await {
                Ok(contents) => contents,
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "skipping unreadable blog post");
                    continue;
                }
            };

            let post = match parse_post(&path, &contents) {
                Ok(post) => post,
                Err(err) => {
                    tracing::warn!(path = %path.display(), "skipping invalid blog post: {err:#}");
                    continue;
                }
            };

            if post.draft && !options.include_drafts {
                tracing::debug!(slug = %post.slug, "skipping draft");
                continue;
            }
            if let Some(locale) = options.locale.as_deref()
                && !post.locale.eq_ignore_ascii_case(locale)
            {
                continue;
            }
            posts.push(post);
        }
    }

    posts.sort_by(|a, b| {
        b.published_at
            .cmp(&a.published_at)
            .then_with(|| a.slug.cmp(&b.slug))
    });
    tracing::debug!(count = posts.len(), dir = %content_dir.display(), "loaded posts");

    Ok(posts)
}

async fn post_files(year_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(year_dir)
        .await
        .with_context(|| format!("read year dir: {}", year_dir.display()))?;
    while let Some(entry) = entries.next_entry().await.context("read year dir entry")? {
        let path = entry.path();
        let is_post = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| POST_EXTENSIONS.contains(&ext));
        if is_post && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| b.cmp(a));
    Ok(files)
}

fn is_year(name: &str) -> bool {
    name.len() == 4 && name.bytes().all(|b| b.is_ascii_digit())
}

pub fn parse_post(path: &Path, contents: &str) -> anyhow::Result<PostRecord> {
    let (yaml, body) = split_front_matter(contents)?;
    let front: PostFrontMatter =
        serde_yaml::from_str(yaml).context("deserialize blog post front matter")?;

    if front.title.trim().is_empty() {
        anyhow::bail!("front matter title is required");
    }

    let slug = front
        .slug
        .filter(|slug| !slug.trim().is_empty())
        .unwrap_or_else(|| slug_from_file_name(path));
    if slug.is_empty() {
        anyhow::bail!("cannot derive slug from file name: {}", path.display());
    }

    let published_at = front
        .published_at
        .as_deref()
        .map(parse_date)
        .transpose()?;

    Ok(PostRecord {
        slug,
        title: front.title,
        category: front.category,
        tags: front.tags,
        summary: front.summary,
        content: clean_body(body),
        locale: front
            .locale
            .filter(|locale| !locale.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOCALE.to_owned()),
        draft: front.draft,
        featured: front.featured,
        published_at,
        author: front.author,
    })
}

/// Splits a post into its YAML front matter and body.
pub fn split_front_matter(contents: &str) -> anyhow::Result<(&str, &str)> {
    let contents = contents.strip_prefix('\u{feff}').unwrap_or(contents);
    let mut lines = contents.split_inclusive('\n');
    let first = lines
        .next()
        .ok_or_else(|| anyhow::anyhow!("blog post is empty"))?;
    if first.trim_end() != "---" {
        anyhow::bail!("blog post must start with YAML front matter ('---')");
    }

    let yaml_start = first.len();
    let mut offset = yaml_start;
    for line in lines {
        if line.trim_end() == "---" {
            return Ok((&contents[yaml_start..offset], &contents[offset + line.len()..]));
        }
        offset += line.len();
    }

    anyhow::bail!("front matter is not closed with '---'")
}

/// Slug from a file name, dropping an `MM-DD-` date prefix.
pub fn slug_from_file_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let bytes = stem.as_bytes();
    let dated = bytes.len() > 6
        && bytes[..2].iter().all(u8::is_ascii_digit)
        && bytes[2] == b'-'
        && bytes[3..5].iter().all(u8::is_ascii_digit)
        && bytes[5] == b'-';
    if dated {
        return stem[6..].to_owned();
    }
    stem
}

fn parse_date(value: &str) -> anyhow::Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Ok(datetime.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("invalid publishedAt date: {value}"))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("invalid publishedAt date: {value}"))?;
    Ok(midnight.and_utc())
}

fn clean_body(body: &str) -> String {
    let body = body.trim_start_matches(['\r', '\n']);
    let mut out = String::with_capacity(body.len());
    for line in body.split_inclusive('\n') {
        let (text, newline) = match line.strip_suffix('\n') {
            Some(text) => (text, "\n"),
            None => (line, ""),
        };
        out.push_str(text.trim_end_matches('\t'));
        out.push_str(newline);
    }
    out
}
