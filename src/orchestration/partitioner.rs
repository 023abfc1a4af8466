//! # Batch Partitioner
//!
//! Splits the ordered work list into fixed-size batches. Concatenating the
//! batches in order reproduces the input exactly; only the last batch may be
//! short. Every batch gets a correlation token that is unique across calls.

use tracing::{debug, info};

use crate::error::{OrchestratorError, Result};
use crate::models::{Batch, CorrelationToken, JobMetadata, WorkItem};

/// Partition `items` into batches of at most `batch_size`
pub fn partition(
    items: &[WorkItem],
    batch_size: usize,
    metadata: &JobMetadata,
) -> Result<Vec<Batch>> {
    if batch_size == 0 {
        return Err(OrchestratorError::invalid_input(
            "batch size must be greater than 0",
        ));
    }

    let total_batches = items.len().div_ceil(batch_size);
    let stamp = CorrelationToken::next_stamp();

    let batches: Vec<Batch> = items
        .chunks(batch_size)
        .enumerate()
        .map(|(index, chunk)| {
            let batch_number = index + 1;
            Batch {
                batch_number,
                repositories: chunk.to_vec(),
                correlation_token: CorrelationToken::new(batch_number, stamp),
                total_batches,
                total_repos: items.len(),
                metadata: metadata.clone(),
            }
        })
        .collect();

    info!(
        total_repos = items.len(),
        batch_size = batch_size,
        total_batches = total_batches,
        "Created {} batches for {} repositories",
        total_batches,
        items.len()
    );

    Ok(batches)
}

/// Parse a work list given either as a JSON array of strings or as free text
///
/// Free text is what requesters paste into an issue: collapsible `<details>`
/// wrappers and HTML comments are stripped, then only lines that look like
/// repository URLs are kept.
pub fn parse_work_items(raw: &str) -> Result<Vec<WorkItem>> {
    let input = raw.trim();

    if input.starts_with('[') {
        debug!("Parsing work items from JSON array");
        let values: Vec<String> = serde_json::from_str(input).map_err(|e| {
            OrchestratorError::invalid_input(format!("work list is not a JSON array of strings: {e}"))
        })?;
        return Ok(values.into_iter().map(WorkItem::new).collect());
    }

    debug!("Parsing work items from text");
    let mut cleaned = strip_html_comments(input);
    for tag in ["details", "summary"] {
        cleaned = strip_tag(&cleaned, tag);
    }

    Ok(cleaned
        .lines()
        .map(str::trim)
        .filter(|line| is_work_item_line(line))
        .map(WorkItem::new)
        .collect())
}

fn is_work_item_line(line: &str) -> bool {
    if line.is_empty() {
        return false;
    }
    if line.contains('<') && line.contains('>') {
        return false;
    }
    if line.starts_with('#') && !line.contains("://") {
        return false;
    }
    line.contains("://") || line.contains("github.")
}

/// Remove `<!-- ... -->` blocks; an unterminated comment is left untouched
fn strip_html_comments(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("<!--") {
        match rest[start + 4..].find("-->") {
            Some(end) => {
                output.push_str(&rest[..start]);
                rest = &rest[start + 4 + end + 3..];
            }
            None => break,
        }
    }

    output.push_str(rest);
    output
}

/// Remove `<tag ...>` and `</tag>` occurrences, ignoring ASCII case
fn strip_tag(input: &str, tag: &str) -> String {
    // ASCII lowercasing keeps byte offsets identical to the original
    let lowered = input.to_ascii_lowercase();
    let open = format!("<{tag}");
    let close = format!("</{tag}>");

    let mut output = String::with_capacity(input.len());
    let mut cursor = 0;

    while cursor < input.len() {
        let rest = &lowered[cursor..];
        let next_open = rest.find(&open);
        let next_close = rest.find(&close);

        let (start, end) = match (next_open, next_close) {
            (Some(o), Some(c)) if c < o => (c, c + close.len()),
            (Some(o), _) => match rest[o..].find('>') {
                Some(gt) => (o, o + gt + 1),
                None => break,
            },
            (None, Some(c)) => (c, c + close.len()),
            (None, None) => break,
        };

        output.push_str(&input[cursor..cursor + start]);
        cursor += end;
    }

    if cursor < input.len() {
        output.push_str(&input[cursor..]);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<WorkItem> {
        (1..=n)
            .map(|i| WorkItem::new(format!("https://github.com/acme/repo-{i}")))
            .collect()
    }

    #[test]
    fn test_seven_items_in_batches_of_three() {
        let batches = partition(&items(7), 3, &JobMetadata::default()).unwrap();

        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(
            batches.iter().map(|b| b.batch_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(batches.iter().all(|b| b.total_batches == 3 && b.total_repos == 7));
        assert!(batches[2].is_last());

        let rejoined: Vec<WorkItem> = batches
            .into_iter()
            .flat_map(|b| b.repositories)
            .collect();
        assert_eq!(rejoined, items(7));
    }

    #[test]
    fn test_zero_batch_size_is_invalid_input() {
        let result = partition(&items(2), 0, &JobMetadata::default());
        assert!(matches!(result, Err(OrchestratorError::InvalidInput(_))));
    }

    #[test]
    fn test_empty_work_list_has_no_batches() {
        let batches = partition(&[], 5, &JobMetadata::default()).unwrap();
        assert!(batches.is_empty());
    }

    #[test]
    fn test_metadata_is_copied_onto_every_batch() {
        let metadata = JobMetadata {
            migration_type: "production".to_string(),
            target_organization: "acme-new".to_string(),
            target_instance: "ghec-prod".to_string(),
            ..Default::default()
        };
        let batches = partition(&items(4), 2, &metadata).unwrap();
        assert!(batches.iter().all(|b| b.metadata == metadata));
    }

    #[test]
    fn test_tokens_unique_across_calls() {
        let first = partition(&items(3), 1, &JobMetadata::default()).unwrap();
        let second = partition(&items(3), 1, &JobMetadata::default()).unwrap();

        let mut tokens: Vec<String> = first
            .iter()
            .chain(second.iter())
            .map(|b| b.correlation_token.to_string())
            .collect();
        tokens.sort();
        tokens.dedup();
        assert_eq!(tokens.len(), 6);
    }

    #[test]
    fn test_parse_json_array() {
        let parsed =
            parse_work_items(r#" ["https://github.com/acme/a", "https://github.com/acme/b"] "#)
                .unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].as_str(), "https://github.com/acme/b");

        assert!(matches!(
            parse_work_items("[not json"),
            Err(OrchestratorError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_parse_free_text_from_issue_body() {
        let raw = r#"
<details open>
<summary>Repositories</summary>

# Repositories to migrate
https://github.com/acme/api
  https://github.com/acme/web
<!-- https://github.com/acme/hidden -->
github.example.com/acme/tools
<a href="https://github.com/acme/link">link</a>
just some prose
</details>
"#;
        let parsed: Vec<String> = parse_work_items(raw)
            .unwrap()
            .into_iter()
            .map(|w| w.to_string())
            .collect();

        assert_eq!(
            parsed,
            vec![
                "https://github.com/acme/api",
                "https://github.com/acme/web",
                "github.example.com/acme/tools",
            ]
        );
    }

    #[test]
    fn test_heading_with_url_is_kept() {
        let parsed = parse_work_items("# https://github.com/acme/api").unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_strip_helpers() {
        assert_eq!(strip_html_comments("a<!-- x -->b<!-- y"), "ab<!-- y");
        assert_eq!(
            strip_tag("<DETAILS class=\"x\">in</Details>out", "details"),
            "inout"
        );
    }
}
