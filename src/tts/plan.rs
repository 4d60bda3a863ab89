//! Segment planning for synthesis: turn a timed script into ordered,
//! non-marker segments with derived end times, and group them into
//! bounded synthesis requests.

use crate::error::Result;
use crate::script::timestamp::{parse_script, LineBody};
use regex::Regex;
use std::sync::OnceLock;

/// Speaking-rate estimate: ~150 words per minute.
const WORDS_PER_SECOND: f64 = 2.5;

/// Gap left before the next segment's start.
const SEGMENT_GAP_SECONDS: f64 = 0.1;

/// Bounds for one synthesis request in chunked mode.
pub const MAX_CHUNK_CHARS: usize = 500;
pub const MAX_CHUNK_SEGMENTS: usize = 20;

/// One synthesizable segment with its placement on the timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedSegment {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub text: String,
}

/// A group of consecutive segments synthesized in one request.
#[derive(Debug, Clone)]
pub struct SegmentGroup {
    pub segments: Vec<PlannedSegment>,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub char_count: usize,
}

impl SegmentGroup {
    pub fn joined_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Estimate spoken duration of a text from its word count.
pub fn estimate_duration_seconds(text: &str) -> f64 {
    text.split_whitespace().count() as f64 / WORDS_PER_SECOND
}

fn tts_unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\[\]{}•]").expect("Invalid regex"))
}

/// Strip characters that confuse TTS engines (brackets, braces, pause
/// glyphs) and drop contentless lines.
fn clean_text_for_tts(text: &str) -> Option<String> {
    let cleaned = tts_unsafe_chars().replace_all(text, "");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.len() < 3 {
        return None;
    }
    Some(cleaned)
}

/// Parse a timed script into planned segments.
///
/// Pause markers are skipped entirely; the silence they stand for falls out
/// of the gap to the next timestamp during assembly. End times are derived:
/// segment i ends at `min(start[i+1] - 100 ms, start[i] + estimate)`, the
/// last segment at `start + max(estimate, 1 s)`.
pub fn plan_segments(script: &str) -> Result<Vec<PlannedSegment>> {
    let parsed = parse_script(script)?;

    let mut segments: Vec<PlannedSegment> = Vec::new();
    for seg in &parsed {
        let LineBody::Text(text) = &seg.body else {
            continue;
        };
        let Some(text) = clean_text_for_tts(text) else {
            continue;
        };
        segments.push(PlannedSegment {
            start_seconds: seg.start.as_seconds() as f64,
            end_seconds: 0.0,
            text,
        });
    }

    let count = segments.len();
    for i in 0..count {
        let estimate = estimate_duration_seconds(&segments[i].text);
        segments[i].end_seconds = if i + 1 < count {
            let next_start = segments[i + 1].start_seconds;
            (next_start - SEGMENT_GAP_SECONDS).min(segments[i].start_seconds + estimate)
        } else {
            segments[i].start_seconds + estimate.max(1.0)
        };
        // A segment squeezed below zero length still occupies its start.
        if segments[i].end_seconds < segments[i].start_seconds {
            segments[i].end_seconds = segments[i].start_seconds;
        }
    }

    Ok(segments)
}

/// Group consecutive segments into synthesis requests bounded by
/// `MAX_CHUNK_CHARS` and `MAX_CHUNK_SEGMENTS`.
pub fn group_segments(segments: &[PlannedSegment]) -> Vec<SegmentGroup> {
    let mut groups: Vec<SegmentGroup> = Vec::new();
    let mut current: Vec<PlannedSegment> = Vec::new();
    let mut current_chars = 0usize;

    let flush = |current: &mut Vec<PlannedSegment>, groups: &mut Vec<SegmentGroup>| {
        if current.is_empty() {
            return;
        }
        let start = current.first().map(|s| s.start_seconds).unwrap_or(0.0);
        let end = current.last().map(|s| s.end_seconds).unwrap_or(start);
        let chars = current.iter().map(|s| s.text.len()).sum();
        groups.push(SegmentGroup {
            segments: std::mem::take(current),
            start_seconds: start,
            end_seconds: end,
            char_count: chars,
        });
    };

    for segment in segments {
        let fits = current_chars + segment.text.len() <= MAX_CHUNK_CHARS
            && current.len() < MAX_CHUNK_SEGMENTS;
        if !fits {
            flush(&mut current, &mut groups);
            current_chars = 0;
        }
        current_chars += segment.text.len();
        current.push(segment.clone());
    }
    flush(&mut current, &mut groups);

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_skips_pause_markers() {
        let script = "[00:00:01] Hello there everyone.\n\
                      [00:00:03] [breath]\n\
                      [00:00:05] Welcome back to the show.";
        let segments = plan_segments(script).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start_seconds, 1.0);
        assert_eq!(segments[1].start_seconds, 5.0);
    }

    #[test]
    fn test_end_time_bounded_by_next_start() {
        let script = "[00:00:00] one two three four five six seven eight nine ten eleven twelve\n\
                      [00:00:02] short";
        let segments = plan_segments(script).unwrap();
        // Twelve words estimate ~4.8 s, but the next segment starts at 2 s.
        assert!((segments[0].end_seconds - 1.9).abs() < 1e-9);
    }

    #[test]
    fn test_last_segment_uses_estimate() {
        let script = "[00:00:10] one two three four five";
        let segments = plan_segments(script).unwrap();
        assert!((segments[0].end_seconds - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_last_segment_minimum_duration() {
        let script = "[00:00:10] hi.";
        let segments = plan_segments(script).unwrap();
        assert!((segments[0].end_seconds - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_script_plans_no_segments() {
        assert!(plan_segments("").unwrap().is_empty());
        assert!(plan_segments("[00:00:01] [breath]").unwrap().is_empty());
    }

    #[test]
    fn test_clean_text_strips_brackets() {
        assert_eq!(
            clean_text_for_tts("Hello [aside] world"),
            Some("Hello aside world".to_string())
        );
        assert_eq!(clean_text_for_tts("[]"), None);
    }

    #[test]
    fn test_grouping_respects_char_bound() {
        let segments: Vec<PlannedSegment> = (0..10)
            .map(|i| PlannedSegment {
                start_seconds: i as f64 * 5.0,
                end_seconds: i as f64 * 5.0 + 4.0,
                text: "x".repeat(200),
            })
            .collect();
        let groups = group_segments(&segments);
        for group in &groups {
            assert!(group.char_count <= MAX_CHUNK_CHARS);
        }
        let total: usize = groups.iter().map(|g| g.segments.len()).sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn test_grouping_respects_segment_bound() {
        let segments: Vec<PlannedSegment> = (0..45)
            .map(|i| PlannedSegment {
                start_seconds: i as f64,
                end_seconds: i as f64 + 0.9,
                text: "ab".to_string(),
            })
            .collect();
        // Tiny texts, so the segment cap is the binding constraint.
        let groups = group_segments(&segments);
        assert_eq!(groups.len(), 3);
        assert!(groups.iter().all(|g| g.segments.len() <= MAX_CHUNK_SEGMENTS));
    }

    #[test]
    fn test_group_timeline_bounds() {
        let segments: Vec<PlannedSegment> = (0..5)
            .map(|i| PlannedSegment {
                start_seconds: i as f64 * 10.0,
                end_seconds: i as f64 * 10.0 + 2.0,
                text: "hello world".to_string(),
            })
            .collect();
        let groups = group_segments(&segments);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].start_seconds, 0.0);
        assert_eq!(groups[0].end_seconds, 42.0);
    }
}
