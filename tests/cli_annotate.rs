use std::fs;
use std::path::Path;

use predicates::prelude::*;

const TIMER_GUIDE: &str = "---
title: Timer Guide
category: timing
tags: [timer]
publishedAt: 2025-03-01
summary: Everything about timers.
---
A guide to timers.
";

const EVENT_CHECKLIST: &str = "---
title: Event Checklist
category: events
tags: [events]
publishedAt: 2025-03-02
summary: What to prepare.
---
Every event needs a timer. Start the timer early.
";

fn write_content(root: &Path) -> anyhow::Result<()> {
    let year = root.join("2025");
    fs::create_dir_all(&year)?;
    fs::write(year.join("03-01-timer-guide.mdx"), TIMER_GUIDE)?;
    fs::write(year.join("03-02-event-checklist.mdx"), EVENT_CHECKLIST)?;
    Ok(())
}

#[test]
fn annotate_links_first_keyword_occurrence() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write_content(temp.path())?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("interlink");
    cmd.args(["annotate", "--content"])
        .arg(temp.path())
        .args(["--slug", "event-checklist"])
        .assert()
        .success()
        .stdout(
            "Every event needs a [timer](/en/blog/timer-guide \"Timer Guide\"). \
Start the timer early.\n",
        );
    Ok(())
}

#[test]
fn annotate_writes_output_and_report() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write_content(temp.path())?;
    let out = temp.path().join("out").join("event-checklist.md");
    let report = temp.path().join("out").join("report.json");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("interlink");
    cmd.args(["annotate", "--content"])
        .arg(temp.path())
        .args(["--slug", "event-checklist", "--format", "footnote", "--out"])
        .arg(&out)
        .arg("--report")
        .arg(&report)
        .assert()
        .success()
        .stdout("");

    let annotated = fs::read_to_string(&out)?;
    assert!(annotated.contains("a timer[^related-1]."));
    assert!(annotated.ends_with("[^related-1]: [Timer Guide](/en/blog/timer-guide)\n"));

    let report: serde_json::Value = serde_json::from_str(&fs::read_to_string(&report)?)?;
    assert_eq!(report["slug"], "event-checklist");
    assert_eq!(report["insertedCount"], 1);
    assert_eq!(report["inserted"][0]["targetSlug"], "timer-guide");
    Ok(())
}

#[test]
fn annotate_refuses_to_overwrite_without_force() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write_content(temp.path())?;
    let out = temp.path().join("existing.md");
    fs::write(&out, "keep me")?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("interlink");
    cmd.args(["annotate", "--content"])
        .arg(temp.path())
        .args(["--slug", "event-checklist", "--out"])
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("output already exists"));
    assert_eq!(fs::read_to_string(&out)?, "keep me");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("interlink");
    cmd.args(["annotate", "--content"])
        .arg(temp.path())
        .args(["--slug", "event-checklist", "--force", "--out"])
        .arg(&out)
        .assert()
        .success();
    assert!(fs::read_to_string(&out)?.contains("[timer](/en/blog/timer-guide"));
    Ok(())
}

#[test]
fn negative_link_budget_leaves_content_unchanged() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write_content(temp.path())?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("interlink");
    cmd.args(["annotate", "--content"])
        .arg(temp.path())
        .args(["--slug", "event-checklist", "--max-links", "-1"])
        .assert()
        .success()
        .stdout("Every event needs a timer. Start the timer early.\n");
    Ok(())
}

#[test]
fn disabled_config_leaves_content_unchanged() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write_content(temp.path())?;
    let config = temp.path().join("linking.yaml");
    fs::write(&config, "enabled: false\n")?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("interlink");
    cmd.args(["annotate", "--content"])
        .arg(temp.path())
        .args(["--slug", "event-checklist", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout("Every event needs a timer. Start the timer early.\n");
    Ok(())
}

#[test]
fn annotate_unknown_slug_fails() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write_content(temp.path())?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("interlink");
    cmd.args(["annotate", "--content"])
        .arg(temp.path())
        .args(["--slug", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("post not found: missing"));
    Ok(())
}

#[test]
fn rust_log_debug_emits_debug_line_to_stderr() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write_content(temp.path())?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("interlink");
    cmd.env("RUST_LOG", "debug")
        .args(["annotate", "--content"])
        .arg(temp.path())
        .args(["--slug", "event-checklist"])
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"));
    Ok(())
}
