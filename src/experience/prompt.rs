//! Dream prompt template.

use super::Observation;
use crate::explore::DiscoveryKind;

/// Shown in place of the observation list when nothing was found.
pub const NO_DISCOVERIES: &str = "(No recent discoveries)";

const PREAMBLE: &str = "Digital sleepwalking. These files trigger dream memories:";

const INSTRUCTION: &str = "Write 2 tiny paragraphs. Each 2-3 sentences max. Use content previews for surreal\nconnections.";

/// Render the dream prompt for `observations`.
pub fn format_dream_prompt(observations: &[Observation]) -> String {
    let body = if observations.is_empty() {
        NO_DISCOVERIES.to_string()
    } else {
        observations
            .iter()
            .map(observation_line)
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!("{PREAMBLE}\n\n{body}\n\n{INSTRUCTION}")
}

fn observation_line(obs: &Observation) -> String {
    let label = match obs.kind {
        DiscoveryKind::File => "File",
        DiscoveryKind::Directory => "Directory",
    };
    let mut line = format!("- {label}: {}", obs.name);
    if let Some(size) = obs.size_bytes {
        line.push_str(&format!(" ({size} bytes)"));
    }
    let when = obs.modified_at.unwrap_or(obs.timestamp);
    line.push_str(&format!(" modified {}", when.format("%Y-%m-%d")));
    if let Some(preview) = &obs.preview {
        line.push_str(&format!("\n  Content preview: {preview}"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    fn obs(kind: DiscoveryKind, size: Option<u64>, preview: Option<&str>) -> Observation {
        Observation {
            timestamp: Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap(),
            path: PathBuf::from("/tmp/root/notes.txt"),
            name: "notes.txt".into(),
            kind,
            size_bytes: size,
            preview: preview.map(str::to_string),
            modified_at: Some(Utc.with_ymd_and_hms(2024, 11, 2, 8, 30, 0).unwrap()),
            brief_note: String::new(),
        }
    }

    #[test]
    fn empty_list_uses_placeholder_body() {
        let prompt = format_dream_prompt(&[]);
        assert!(prompt.starts_with(PREAMBLE));
        assert!(prompt.contains(NO_DISCOVERIES));
        assert!(prompt.ends_with("surreal\nconnections."));
    }

    #[test]
    fn file_line_has_size_date_and_preview() {
        let prompt = format_dream_prompt(&[obs(DiscoveryKind::File, Some(11), Some("hello world"))]);
        assert!(prompt.contains(
            "- File: notes.txt (11 bytes) modified 2024-11-02\n  Content preview: hello world"
        ));
    }

    #[test]
    fn directory_line_has_no_size() {
        let mut o = obs(DiscoveryKind::Directory, None, None);
        o.name = "photos".into();
        o.modified_at = None;
        let prompt = format_dream_prompt(&[o]);
        assert!(prompt.contains("- Directory: photos modified 2025-03-09\n\nWrite"));
    }
}
