use clap::{Args, Parser, Subcommand};

use crate::config::LinkFormat;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Insert internal links into one post.
    Annotate(AnnotateArgs),
    /// Suggest related posts to link to.
    Analyze(AnalyzeArgs),
    /// Report internal linking statistics.
    Stats(StatsArgs),
}

#[derive(Debug, Args)]
pub struct AnnotateArgs {
    /// Blog content directory (`<dir>/<YYYY>/<post>.mdx`).
    #[arg(long)]
    pub content: String,

    /// Slug of the post to annotate.
    #[arg(long)]
    pub slug: String,

    /// Locale of the rendered page (defaults to the post's locale).
    #[arg(long)]
    pub locale: Option<String>,

    /// Linking configuration (YAML).
    #[arg(long)]
    pub config: Option<String>,

    /// Override the per-post link budget.
    #[arg(long, allow_negative_numbers = true)]
    pub max_links: Option<i64>,

    /// Override the minimum relevance score (0.0-1.0).
    #[arg(long, allow_negative_numbers = true)]
    pub min_score: Option<f64>,

    /// Override the link format.
    #[arg(long, value_enum)]
    pub format: Option<LinkFormat>,

    /// Allow drafts as link targets.
    #[arg(long)]
    pub include_drafts: bool,

    /// Write the annotated Markdown here instead of stdout.
    #[arg(long)]
    pub out: Option<String>,

    /// Write a JSON report of inserted and skipped candidates.
    #[arg(long)]
    pub report: Option<String>,

    /// Overwrite existing output files.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Blog content directory (`<dir>/<YYYY>/<post>.mdx`).
    #[arg(long)]
    pub content: String,

    /// Only analyze this post.
    #[arg(long)]
    pub slug: Option<String>,

    /// Locale to analyze (`all` for every locale).
    #[arg(long, default_value = "en")]
    pub locale: String,

    /// Maximum suggestions per post.
    #[arg(long, default_value_t = 5)]
    pub limit: usize,

    /// Export suggestions as JSON.
    #[arg(long)]
    pub export: Option<String>,

    /// Overwrite an existing export file.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Blog content directory (`<dir>/<YYYY>/<post>.mdx`).
    #[arg(long)]
    pub content: String,

    /// Locale to count (`all` for every locale).
    #[arg(long, default_value = "all")]
    pub locale: String,

    /// Print JSON instead of text.
    #[arg(long)]
    pub json: bool,
}
