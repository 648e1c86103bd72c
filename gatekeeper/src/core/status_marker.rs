//! Single-line `status: <value>` markers embedded in artifact content.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::ArtifactStatus;

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^[ \t>*\-]*\**status\**[ \t]*:[ \t]*\**[ \t]*([A-Za-z][A-Za-z _\-]*?)[ \t]*\**[ \t\r]*$")
        .expect("status marker pattern should compile")
});

/// Extract the artifact status from its first marker line.
///
/// Returns `None` when there is no marker or its value is unknown; callers
/// treat that as `draft`.
pub fn extract_status(content: &str) -> Option<ArtifactStatus> {
    let caps = MARKER.captures(content)?;
    ArtifactStatus::parse_marker(caps.get(1)?.as_str())
}

/// Replace the first marker line with `status: <status>`, or prepend one.
pub fn set_status(content: &str, status: ArtifactStatus) -> String {
    let line = format!("status: {status}");
    match MARKER.find(content) {
        Some(found) => {
            let mut out = String::with_capacity(content.len() + line.len() + 1);
            out.push_str(&content[..found.start()]);
            out.push_str(&line);
            // CRLF documents keep their line ending.
            if found.as_str().ends_with('\r') {
                out.push('\r');
            }
            out.push_str(&content[found.end()..]);
            out
        }
        None if content.is_empty() => format!("{line}\n"),
        None => format!("{line}\n\n{content}"),
    }
}

/// Count marker lines; a well-formed artifact has exactly one.
pub fn marker_count(content: &str) -> usize {
    MARKER.find_iter(content).count()
}
