use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Configuration for splitting long scripts into processable chunks.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Inputs longer than this (bytes) are chunked at all.
    pub max_single_pass: usize,
    /// Nominal chunk size.
    pub chunk_size: usize,
    /// Overlap carried into the next chunk.
    pub overlap: usize,
    /// Hard cap on the number of chunks produced.
    pub max_chunks: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_single_pass: 8_000,
            chunk_size: 4_000,
            overlap: 500,
            max_chunks: 20,
        }
    }
}

/// How far back from the nominal window end we search for a sentence end.
const BOUNDARY_WINDOW: usize = 300;

/// A contiguous piece of a script with its `[start, end)` byte range in the
/// original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

pub fn needs_chunking(text: &str, config: &ChunkConfig) -> bool {
    text.len() > config.max_single_pass
}

fn sentence_endings() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]+\s+").expect("Invalid regex"))
}

fn paragraph_breaks() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n").expect("Invalid regex"))
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Retreat to the beginning of the line containing `index`, so an overlap
/// window never opens mid-line. Timestamp tokens sit at line starts, so this
/// also guarantees no token is ever split.
fn align_to_line_start(text: &str, index: usize) -> usize {
    match text[..index].rfind('\n') {
        Some(newline) => newline + 1,
        None => 0,
    }
}

/// Split text into overlapping chunks, preferring sentence boundaries.
///
/// Short inputs come back as a single chunk covering the whole text. Empty
/// input yields no chunks.
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Vec<Chunk> {
    if text.is_empty() {
        return Vec::new();
    }

    if !needs_chunking(text, config) {
        return vec![Chunk {
            text: text.to_string(),
            start: 0,
            end: text.len(),
        }];
    }

    let mut chunks = Vec::new();
    let text_len = text.len();
    let mut start = 0usize;

    while start < text_len && chunks.len() < config.max_chunks {
        let mut end = floor_char_boundary(text, (start + config.chunk_size).min(text_len));

        if end < text_len {
            // Look for a sentence ending within the trailing window.
            let search_start =
                floor_char_boundary(text, end.saturating_sub(BOUNDARY_WINDOW).max(start + 100));
            let window = &text[search_start..end];

            if let Some(last) = sentence_endings().find_iter(window).last() {
                end = search_start + last.end();
            } else if let Some(last) = paragraph_breaks().find_iter(window).last() {
                end = search_start + last.start();
            }
        }

        let body = text[start..end].trim();
        if !body.is_empty() {
            chunks.push(Chunk {
                text: body.to_string(),
                start,
                end,
            });
        }

        if end >= text_len {
            break;
        }

        let nominal = floor_char_boundary(text, end.saturating_sub(config.overlap));
        start = align_to_line_start(text, nominal).max(ceil_char_boundary(text, start + 1));
    }

    debug!("Chunked {} bytes into {} chunks", text_len, chunks.len());
    chunks
}

/// Prefixes of per-chunk header/footer decoration that processing sometimes
/// re-emits; these lines are dropped during reassembly.
const DECORATION_PREFIXES: &[&str] = &["📹", "📅", "🤖", "📊", "=", "[---"];

fn is_decoration(line: &str) -> bool {
    DECORATION_PREFIXES.iter().any(|p| line.starts_with(p))
}

/// Reassemble processed chunks into a single text.
///
/// Per-chunk decoration lines are stripped, and the overlap region between
/// adjacent chunks is deduplicated by matching the leading lines of each
/// chunk against the tail of the output so far. Processing that rewrote the
/// overlap inconsistently leaves both versions in place; chunk boundaries
/// land on sentence endings precisely to keep that case rare.
pub fn reassemble(processed: &[String], original_chunks: &[Chunk]) -> String {
    let _ = original_chunks;
    let mut merged: Vec<String> = Vec::new();

    for (i, result) in processed.iter().enumerate() {
        let lines: Vec<&str> = result
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !is_decoration(l))
            .collect();

        if lines.is_empty() {
            continue;
        }

        let skip = if i == 0 {
            0
        } else {
            longest_overlap(&merged, &lines)
        };

        merged.extend(lines[skip..].iter().map(|l| l.to_string()));
    }

    merged.join("\n")
}

/// Largest k such that the last k lines of `merged` equal the first k lines
/// of `next`.
fn longest_overlap(merged: &[String], next: &[&str]) -> usize {
    let max_k = merged.len().min(next.len());
    for k in (1..=max_k).rev() {
        let tail = &merged[merged.len() - k..];
        if tail.iter().map(String::as_str).eq(next[..k].iter().copied()) {
            return k;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timed_script(lines: usize) -> String {
        let mut out = String::new();
        for i in 0..lines {
            let h = i / 3600;
            let m = (i % 3600) / 60;
            let s = i % 60;
            out.push_str(&format!(
                "[{:02}:{:02}:{:02}] This is sentence number {} of the running commentary track.\n",
                h, m, s, i
            ));
        }
        out
    }

    #[test]
    fn test_empty_input() {
        let config = ChunkConfig::default();
        assert!(chunk_text("", &config).is_empty());
    }

    #[test]
    fn test_short_input_single_chunk() {
        let config = ChunkConfig::default();
        let text = "[00:00:01] Short script.";
        let chunks = chunk_text(text, &config);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].end, text.len());
    }

    #[test]
    fn test_needs_chunking_boundary() {
        let config = ChunkConfig {
            max_single_pass: 10,
            ..Default::default()
        };
        assert!(!needs_chunking("0123456789", &config));
        assert!(needs_chunking("0123456789x", &config));
    }

    #[test]
    fn test_chunk_count_for_long_input() {
        let config = ChunkConfig::default();
        // ~30k characters of timestamped sentences.
        let text = timed_script(400);
        assert!(text.len() >= 28_000, "got {}", text.len());

        let chunks = chunk_text(&text, &config);
        assert!(
            (6..=12).contains(&chunks.len()),
            "unexpected chunk count {}",
            chunks.len()
        );
    }

    #[test]
    fn test_chunk_boundaries_follow_sentence_end() {
        let config = ChunkConfig::default();
        let text = timed_script(400);
        let chunks = chunk_text(&text, &config);

        for chunk in &chunks[..chunks.len() - 1] {
            let body = chunk.text.trim_end();
            let last = body.chars().last().unwrap();
            assert!(
                matches!(last, '.' | '!' | '?'),
                "chunk does not end at sentence boundary: ...{:?}",
                &body[body.len().saturating_sub(40)..]
            );
        }
    }

    #[test]
    fn test_overlap_never_splits_timestamp() {
        let config = ChunkConfig::default();
        let text = timed_script(400);
        let chunks = chunk_text(&text, &config);

        for chunk in &chunks {
            // Every chunk starts at a line start, so its first line carries
            // an intact timestamp token.
            let first = chunk.text.lines().next().unwrap();
            assert!(
                crate::script::timestamp::parse_line(first).unwrap().is_some(),
                "chunk starts mid-line: {first:?}"
            );
        }
    }

    #[test]
    fn test_max_chunks_cap() {
        let config = ChunkConfig {
            max_single_pass: 100,
            chunk_size: 120,
            overlap: 20,
            max_chunks: 3,
        };
        let text = timed_script(100);
        let chunks = chunk_text(&text, &config);
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn test_identity_reassembly_roundtrip() {
        let config = ChunkConfig::default();
        let text = timed_script(400);
        let chunks = chunk_text(&text, &config);
        assert!(chunks.len() > 1);

        let processed: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let reassembled = reassemble(&processed, &chunks);

        let normalize = |s: &str| {
            s.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        };
        assert_eq!(normalize(&reassembled), normalize(&text));
    }

    #[test]
    fn test_reassembly_strips_decoration() {
        let chunks = vec![
            Chunk {
                text: "[00:00:01] One.".into(),
                start: 0,
                end: 15,
            },
            Chunk {
                text: "[00:00:02] Two.".into(),
                start: 10,
                end: 25,
            },
        ];
        let processed = vec![
            "📊 Stats header\n[00:00:01] One.".to_string(),
            "[--- Chunk 2 ---]\n[00:00:02] Two.".to_string(),
        ];
        let merged = reassemble(&processed, &chunks);
        assert_eq!(merged, "[00:00:01] One.\n[00:00:02] Two.");
    }

    #[test]
    fn test_reassembly_drops_duplicated_overlap() {
        let chunks = vec![
            Chunk {
                text: String::new(),
                start: 0,
                end: 0,
            },
            Chunk {
                text: String::new(),
                start: 0,
                end: 0,
            },
        ];
        let processed = vec![
            "[00:00:01] a\n[00:00:02] b\n[00:00:03] c".to_string(),
            "[00:00:02] b\n[00:00:03] c\n[00:00:04] d".to_string(),
        ];
        let merged = reassemble(&processed, &chunks);
        assert_eq!(
            merged,
            "[00:00:01] a\n[00:00:02] b\n[00:00:03] c\n[00:00:04] d"
        );
    }
}
