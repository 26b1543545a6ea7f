//! Research artifact files: `content/<category>/<topic>.md` with front matter.

use crate::error::Result;
use crate::research::SourceRef;
use crate::store::Task;
use crate::sync::DataRepo;
use chrono::{DateTime, SecondsFormat, Utc};

const MAX_SLUG_LEN: usize = 80;

/// Lowercase, collapse non-alphanumeric runs to `-`, trim dashes, cap length.
pub fn slugify(input: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for ch in input.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }
    // ASCII-only, so byte truncation is safe.
    slug.truncate(max_len);
    slug.trim_end_matches('-').to_owned()
}

/// Repository-relative artifact path for a task.
pub fn topic_output_path(task: &Task) -> String {
    let category = match slugify(&task.category, MAX_SLUG_LEN) {
        s if s.is_empty() => "general".to_owned(),
        s => s,
    };
    let topic = match slugify(&task.title, MAX_SLUG_LEN) {
        s if s.is_empty() => task.id.clone(),
        s => s,
    };
    format!("content/{category}/{topic}.md")
}

/// Site route for an artifact path (`content/a/b.md` → `a/b`).
pub fn page_route(output_path: &str) -> String {
    let route = output_path.strip_prefix("content/").unwrap_or(output_path);
    match route.len().checked_sub(3) {
        Some(cut) if route.is_char_boundary(cut) && route[cut..].eq_ignore_ascii_case(".md") => {
            route[..cut].to_owned()
        }
        _ => route.to_owned(),
    }
}

/// Public page URL for an artifact.
pub fn page_url(site_url: &str, output_path: &str) -> String {
    let base = site_url.trim_end_matches('/');
    let route = page_route(output_path);
    format!("{base}/{}", route.trim_start_matches('/'))
}

fn yaml_string(value: &str) -> String {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    let escaped = normalized.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// YAML front matter block (without a trailing newline).
pub fn front_matter(
    title: &str,
    category: &str,
    sources: &[SourceRef],
    researched_at: DateTime<Utc>,
) -> String {
    let mut lines = vec![
        "---".to_owned(),
        format!("title: {}", yaml_string(title)),
        format!("category: {}", yaml_string(category)),
    ];
    if sources.is_empty() {
        lines.push("sources: []".to_owned());
    } else {
        lines.push("sources:".to_owned());
        for source in sources {
            lines.push(format!("  - url: {}", yaml_string(&source.url)));
            lines.push(format!("    title: {}", yaml_string(&source.title)));
        }
    }
    let stamp = researched_at.to_rfc3339_opts(SecondsFormat::Millis, true);
    lines.push(format!("researchedAt: {}", yaml_string(&stamp)));
    lines.push("---".to_owned());
    lines.join("\n")
}

/// Write the artifact for `task` and return its repository-relative path.
pub async fn write_content_file(
    repo: &DataRepo,
    task: &Task,
    markdown: &str,
    sources: &[SourceRef],
    researched_at: DateTime<Utc>,
) -> Result<String> {
    let output_path = topic_output_path(task);
    let header = front_matter(&task.title, &task.category, sources, researched_at);
    let body = markdown.trim();
    repo.write_file(&output_path, format!("{header}\n\n{body}\n"))
        .await?;
    Ok(output_path)
}
