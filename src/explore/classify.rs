//! File classification: which discoveries deserve a content preview.
//!
//! Textuality is decided by extension alone. Binary detection combines an
//! extension list with a sniff of the first 512 bytes. Unreadable files count
//! as binary so they are never previewed.

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Bytes inspected when sniffing for binary content.
pub const SNIFF_BYTES: usize = 512;

/// Share of control bytes above which a sample is considered binary.
pub const BINARY_RATIO_THRESHOLD: f64 = 0.30;

/// Longest preview returned, in characters, before the ellipsis marker.
pub const PREVIEW_MAX_CHARS: usize = 300;

/// Appended to previews that were cut at [`PREVIEW_MAX_CHARS`].
pub const ELLIPSIS: &str = "...";

/// Lines kept in a preview.
pub const PREVIEW_MAX_LINES: usize = 5;

const COMMENT_MARKERS: &[&str] = &["#", "//", "/*", "*", "<!"];

const TEXT_EXTENSIONS: &[&str] = &[
    // prose and notes
    "txt", "text", "md", "markdown", "rst", "org", "adoc", "tex", "rtf",
    // data and config
    "json", "jsonl", "yaml", "yml", "toml", "ini", "cfg", "conf", "env", "properties", "xml",
    "csv", "tsv", "plist", "lock",
    // web
    "html", "htm", "css", "scss", "sass", "less", "svg", "vue", "svelte",
    // code
    "py", "rs", "js", "mjs", "cjs", "ts", "tsx", "jsx", "go", "java", "kt", "kts", "scala",
    "c", "h", "cc", "cpp", "hpp", "cs", "swift", "m", "rb", "php", "pl", "lua", "r", "jl",
    "hs", "ml", "ex", "exs", "erl", "clj", "dart", "zig", "nim", "sql", "graphql", "proto",
    // shell and build
    "sh", "bash", "zsh", "fish", "ps1", "bat", "cmd", "mk", "cmake", "gradle", "dockerfile",
    // logs
    "log", "out",
];

const BINARY_EXTENSIONS: &[&str] = &[
    // images
    "jpg", "jpeg", "png", "gif", "bmp", "ico", "icns", "webp", "tif", "tiff", "heic", "psd",
    // documents
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "epub",
    // archives
    "zip", "tar", "gz", "tgz", "bz2", "xz", "7z", "rar", "zst", "dmg", "iso", "pkg", "deb",
    "rpm",
    // executables and objects
    "exe", "bin", "dll", "so", "dylib", "app", "o", "a", "lib", "class", "jar", "pyc", "wasm",
    // media
    "mp3", "mp4", "m4a", "mov", "avi", "mkv", "wav", "flac", "ogg", "webm",
    // fonts and databases
    "ttf", "otf", "woff", "woff2", "sqlite", "db",
];

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Is the file a text candidate, judged purely by extension?
pub fn looks_textual(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext.as_str()))
}

/// Is the file binary, by extension or by sniffing its first bytes?
pub fn looks_binary(path: &Path) -> bool {
    if extension_of(path).is_some_and(|ext| BINARY_EXTENSIONS.contains(&ext.as_str())) {
        return true;
    }
    let mut sample = Vec::with_capacity(SNIFF_BYTES);
    let read = File::open(path).and_then(|f| f.take(SNIFF_BYTES as u64).read_to_end(&mut sample));
    match read {
        Ok(_) => sample_is_binary(&sample),
        Err(_) => true,
    }
}

/// Control bytes other than tab, newline, and carriage return.
fn is_non_printable(byte: u8) -> bool {
    (byte < 0x20 && !matches!(byte, b'\t' | b'\n' | b'\r')) || byte == 0x7f
}

/// Does the sample's share of non-printable bytes exceed the threshold?
pub fn sample_is_binary(sample: &[u8]) -> bool {
    if sample.is_empty() {
        return false;
    }
    let non_printable = sample.iter().filter(|b| is_non_printable(**b)).count();
    non_printable as f64 / sample.len() as f64 > BINARY_RATIO_THRESHOLD
}

/// Read up to `max_bytes` and condense them into a short preview.
///
/// Returns `None` on I/O failure or when nothing printable remains.
pub fn make_preview(path: &Path, max_bytes: usize) -> Option<String> {
    let mut buf = Vec::with_capacity(max_bytes.min(64 * 1024));
    File::open(path)
        .and_then(|f| f.take(max_bytes as u64).read_to_end(&mut buf))
        .ok()?;
    condense(&String::from_utf8_lossy(&buf))
}

/// Keep the first meaningful lines of `text`, skipping blanks and comments.
pub fn condense(text: &str) -> Option<String> {
    let non_empty = || text.lines().map(str::trim).filter(|l| !l.is_empty());

    let mut lines: Vec<&str> = non_empty()
        .filter(|l| !COMMENT_MARKERS.iter().any(|m| l.starts_with(m)))
        .take(PREVIEW_MAX_LINES)
        .collect();
    if lines.is_empty() {
        lines = non_empty().take(PREVIEW_MAX_LINES).collect();
    }

    let joined = lines.join("\n");
    let joined = joined.trim();
    if joined.is_empty() {
        return None;
    }
    Some(truncate_chars(joined, PREVIEW_MAX_CHARS))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{ELLIPSIS}", &text[..cut]),
        None => text.to_string(),
    }
}

/// Size window and read cap for previews.
#[derive(Debug, Clone, Copy)]
pub struct FileClassifier {
    /// Files smaller than this are too trivial to preview.
    pub min_size: u64,
    /// Files larger than this are skipped for preview.
    pub max_size: u64,
    /// Bytes read when building a preview.
    pub preview_max_bytes: usize,
}

impl Default for FileClassifier {
    fn default() -> Self {
        Self {
            min_size: 50,
            max_size: 1024 * 1024,
            preview_max_bytes: 2048,
        }
    }
}

impl FileClassifier {
    /// Would a file of `size` bytes at `path` get a preview?
    ///
    /// Cheap checks run first; the binary sniff opens the file.
    pub fn qualifies(&self, path: &Path, size: u64) -> bool {
        (self.min_size..=self.max_size).contains(&size) && looks_textual(path) && !looks_binary(path)
    }

    /// Preview a file that [`qualifies`](Self::qualifies).
    pub fn preview(&self, path: &Path, size: u64) -> Option<String> {
        if self.qualifies(path, size) {
            make_preview(path, self.preview_max_bytes)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn textual_by_extension_only() {
        assert!(looks_textual(Path::new("notes.TXT")));
        assert!(looks_textual(Path::new("src/main.rs")));
        assert!(!looks_textual(Path::new("photo.png")));
        assert!(!looks_textual(Path::new("Makefile")));
        assert!(!looks_textual(Path::new("archive.unknownext")));
    }

    #[test]
    fn binary_extension_wins_without_reading() {
        // The file does not exist; the extension alone decides.
        assert!(looks_binary(Path::new("/definitely/not/here.png")));
    }

    #[test]
    fn unreadable_files_are_binary() {
        assert!(looks_binary(Path::new("/definitely/not/here.txt")));
    }

    #[test]
    fn sniffing_detects_control_bytes() {
        let dir = tempfile::TempDir::new().unwrap();
        let text = dir.path().join("plain.dat");
        fs::write(&text, "line one\n\tline two\r\n").unwrap();
        assert!(!looks_binary(&text));

        let blob = dir.path().join("blob.dat");
        fs::write(&blob, [0u8, 1, 2, 3, 4, 5, b'a', b'b', b'c', b'd']).unwrap();
        assert!(looks_binary(&blob));
    }

    #[test]
    fn ratio_threshold_is_exclusive() {
        // 3 of 10 bytes are control bytes: exactly 30%, not above it.
        let sample = [1u8, 2, 3, b'a', b'b', b'c', b'd', b'e', b'f', b'g'];
        assert!(!sample_is_binary(&sample));
        let sample = [1u8, 2, 3, 4, b'b', b'c', b'd', b'e', b'f', b'g'];
        assert!(sample_is_binary(&sample));
        assert!(!sample_is_binary(&[]));
    }

    #[test]
    fn utf8_text_is_not_binary() {
        assert!(!sample_is_binary("über café ☕ naïve".as_bytes()));
    }

    #[test]
    fn condense_skips_comments_and_blanks() {
        let text = "#!/bin/sh\n\n# setup\nexport A=1\n// note\nrun --fast\n/* block */\n* bullet\n<!-- html -->\nstep three\n";
        assert_eq!(condense(text).unwrap(), "export A=1\nrun --fast\nstep three");
    }

    #[test]
    fn condense_keeps_at_most_five_lines() {
        let text = (1..=9).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let preview = condense(&text).unwrap();
        assert_eq!(preview.lines().count(), 5);
        assert!(preview.ends_with("line 5"));
    }

    #[test]
    fn condense_falls_back_to_raw_lines_when_all_comments() {
        let text = "# one\n# two\n\n// three\n";
        assert_eq!(condense(text).unwrap(), "# one\n# two\n// three");
    }

    #[test]
    fn condense_empty_is_none() {
        assert!(condense("   \n\n\t\n").is_none());
    }

    #[test]
    fn preview_is_truncated_to_limit() {
        let long = "x".repeat(1000);
        let preview = condense(&long).unwrap();
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS + ELLIPSIS.len());
        assert!(preview.ends_with(ELLIPSIS));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "é".repeat(400);
        let preview = condense(&long).unwrap();
        assert!(preview.starts_with("éé"));
        assert_eq!(preview.chars().filter(|c| *c == 'é').count(), PREVIEW_MAX_CHARS);
    }

    #[test]
    fn make_preview_reads_at_most_max_bytes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "alpha\nbeta\ngamma\n").unwrap();
        assert_eq!(make_preview(&path, 8).unwrap(), "alpha\nbe");
        assert_eq!(make_preview(&path, 2048), make_preview(&path, 2048));
        assert!(make_preview(&dir.path().join("missing.txt"), 2048).is_none());
    }

    #[test]
    fn classifier_enforces_size_window() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notes.md");
        fs::write(&path, "a real line of notes, comfortably longer than the fifty byte floor\n").unwrap();
        let classifier = FileClassifier::default();
        let size = fs::metadata(&path).unwrap().len();
        assert!(classifier.qualifies(&path, size));
        assert!(!classifier.qualifies(&path, 10));
        assert!(!classifier.qualifies(&path, 2 * 1024 * 1024));
        assert!(classifier.preview(&path, size).is_some());
        assert!(classifier.preview(&path, 10).is_none());
    }
}
