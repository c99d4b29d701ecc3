//! Destination file names for promoted uploads.

use chrono::{DateTime, Utc};
use regex::Regex;
use shelfguard_core::constants::{
    MAX_FILE_NAME_BYTES, RENAME_FIELD_MAX_CHARS, RENAME_TIMESTAMP_FORMAT,
};
use shelfguard_core::UploadRecord;
use std::path::Path;
use std::sync::OnceLock;

const UNKNOWN: &str = "unknown";

fn forbidden_chars() -> &'static Regex {
    static FORBIDDEN: OnceLock<Regex> = OnceLock::new();
    FORBIDDEN.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("static pattern"))
}

fn pattern_tokens() -> &'static Regex {
    static TOKENS: OnceLock<Regex> = OnceLock::new();
    TOKENS.get_or_init(|| {
        Regex::new(r"\{(title|author|name|timestamp|ext)\}").expect("static pattern")
    })
}

fn strip_forbidden(value: &str) -> String {
    forbidden_chars().replace_all(value, "").trim().to_string()
}

/// Strip characters that are unsafe in file names, trim, and cap the length.
pub fn sanitize_component(value: &str) -> String {
    strip_forbidden(value)
        .chars()
        .take(RENAME_FIELD_MAX_CHARS)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Longest prefix of `value` that fits in `max_bytes` without splitting a char.
fn truncate_bytes(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Render `pattern` for a name-conflicted upload.
///
/// Tokens: `{title}`, `{author}`, `{timestamp}`, `{ext}`, `{name}`.
pub fn render_rename(pattern: &str, record: &UploadRecord, now: DateTime<Utc>) -> String {
    let field = |value: Option<&str>| {
        let cleaned = sanitize_component(value.unwrap_or_default());
        if cleaned.is_empty() {
            UNKNOWN.to_string()
        } else {
            cleaned
        }
    };

    // Single pass: substituted values are never scanned for tokens again.
    let rendered = pattern_tokens().replace_all(pattern, |caps: &regex::Captures<'_>| {
        match &caps[1] {
            "title" => field(record.title.as_deref()),
            "author" => field(record.author.as_deref()),
            "name" => field(Some(record.file_stem())),
            "timestamp" => now.format(RENAME_TIMESTAMP_FORMAT).to_string(),
            _ => record.file_extension.clone(),
        }
    });

    // The pattern itself must not introduce directories.
    rendered.replace(['/', '\\'], "_")
}

/// File name to promote an upload under when it is not renamed.
///
/// Only the stem is cleaned and shortened; the extension is always kept.
pub fn safe_file_name(record: &UploadRecord) -> String {
    let stem = Path::new(&record.original_filename)
        .file_name()
        .and_then(|name| Path::new(name).file_stem())
        .and_then(|stem| stem.to_str())
        .map(strip_forbidden)
        .unwrap_or_default();
    let budget = MAX_FILE_NAME_BYTES.saturating_sub(record.file_extension.len());
    let stem = truncate_bytes(&stem, budget).trim_end();

    if stem.is_empty() || stem.starts_with('.') {
        format!("{}{}", record.id.simple(), record.file_extension)
    } else {
        format!("{stem}{}", record.file_extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shelfguard_core::NewUpload;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap()
    }

    #[test]
    fn default_pattern_renders_all_tokens() {
        let record = NewUpload::new("dune.epub", 1, "/q/x")
            .with_metadata("Dune", "Frank Herbert")
            .into_record();
        let name = render_rename("{title} - {author} (duplicate_{timestamp}){ext}", &record, at());
        assert_eq!(name, "Dune - Frank Herbert (duplicate_20260314_150926).epub");
    }

    #[test]
    fn unsafe_characters_are_stripped() {
        let record = NewUpload::new("x.pdf", 1, "/q/x")
            .with_metadata("What?: A <Guide>", "A/B \"C\"")
            .into_record();
        let name = render_rename("{title} - {author}{ext}", &record, at());
        assert_eq!(name, "What A Guide - AB C.pdf");
    }

    #[test]
    fn missing_metadata_renders_unknown() {
        let record = NewUpload::new("notes.txt", 1, "/q/x").into_record();
        let name = render_rename("{title} by {author} [{name}]{ext}", &record, at());
        assert_eq!(name, "unknown by unknown [notes].txt");
    }

    #[test]
    fn long_titles_are_truncated() {
        let record = NewUpload::new("a.epub", 1, "/q/x")
            .with_metadata("t".repeat(300), "me")
            .into_record();
        let name = render_rename("{title}{ext}", &record, at());
        assert_eq!(name, format!("{}.epub", "t".repeat(100)));
    }

    #[test]
    fn pattern_cannot_escape_directory() {
        let record = NewUpload::new("a.epub", 1, "/q/x")
            .with_metadata("t", "a")
            .into_record();
        assert_eq!(render_rename("../{title}{ext}", &record, at()), ".._t.epub");
    }

    #[test]
    fn safe_file_name_drops_directories() {
        let record = NewUpload::new("../../etc/passwd.txt", 1, "/q/x").into_record();
        assert_eq!(safe_file_name(&record), "passwd.txt");

        let hidden = NewUpload::new(".bashrc", 1, "/q/x").into_record();
        assert!(!safe_file_name(&hidden).starts_with('.'));
    }

    #[test]
    fn long_names_keep_their_extension() {
        let original = format!("{}.epub", "s".repeat(120));
        let record = NewUpload::new(original.clone(), 1, "/q/x").into_record();
        assert_eq!(safe_file_name(&record), original);

        let oversized =
            NewUpload::new(format!("{}.epub", "é".repeat(200)), 1, "/q/x").into_record();
        let name = safe_file_name(&oversized);
        assert!(name.ends_with(".epub"));
        assert!(name.len() <= MAX_FILE_NAME_BYTES);
    }

    #[test]
    fn metadata_containing_tokens_is_taken_literally() {
        let record = NewUpload::new("a.epub", 1, "/q/x")
            .with_metadata("Notes on {author}", "Ann {ext}")
            .into_record();
        let name = render_rename("{title} - {author}{ext}", &record, at());
        assert_eq!(name, "Notes on {author} - Ann {ext}.epub");
    }
}
