use crate::error::{DubberError, Result};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// A `[HH:MM:SS]` clock position within a timed script.
///
/// Stored as whole seconds; formatting is canonical two-digit form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    total_seconds: u32,
}

impl Timestamp {
    pub fn from_parts(hours: u32, minutes: u32, seconds: u32) -> Result<Self> {
        if minutes >= 60 {
            return Err(DubberError::InvalidInput(format!(
                "Timestamp minutes out of range: {minutes}"
            )));
        }
        if seconds >= 60 {
            return Err(DubberError::InvalidInput(format!(
                "Timestamp seconds out of range: {seconds}"
            )));
        }
        Ok(Self {
            total_seconds: hours * 3600 + minutes * 60 + seconds,
        })
    }

    pub fn from_seconds(total_seconds: u32) -> Self {
        Self { total_seconds }
    }

    pub fn as_seconds(&self) -> u32 {
        self.total_seconds
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = self.total_seconds / 3600;
        let m = (self.total_seconds % 3600) / 60;
        let s = self.total_seconds % 60;
        write!(f, "[{:02}:{:02}:{:02}]", h, m, s)
    }
}

/// Bracketed pause markers carried through translation and consumed as
/// silence by synthesis. Both the English canonical forms and the original
/// Hungarian spellings are recognized on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseMarker {
    Breath,
    ShortPause,
    LongPause,
    TopicChange,
}

impl PauseMarker {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "[breath]" | "[levegővétel]" => Some(PauseMarker::Breath),
            "[short pause]" | "[rövid szünet]" => Some(PauseMarker::ShortPause),
            "[long pause]" | "[hosszú szünet]" => Some(PauseMarker::LongPause),
            "[TOPIC CHANGE]" | "[TÉMAVÁLTÁS]" => Some(PauseMarker::TopicChange),
            _ => None,
        }
    }

    pub fn canonical(&self) -> &'static str {
        match self {
            PauseMarker::Breath => "[breath]",
            PauseMarker::ShortPause => "[short pause]",
            PauseMarker::LongPause => "[long pause]",
            PauseMarker::TopicChange => "[TOPIC CHANGE]",
        }
    }

    /// Output glyph used in finalized transcript files.
    pub fn glyph(&self) -> &'static str {
        match self {
            PauseMarker::Breath | PauseMarker::ShortPause => "•",
            PauseMarker::LongPause | PauseMarker::TopicChange => "••",
        }
    }
}

/// Body of a timestamped line: prose text or a recognized pause marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineBody {
    Text(String),
    Pause(PauseMarker),
}

/// A timestamped segment extracted from a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSegment {
    pub start: Timestamp,
    pub body: LineBody,
}

impl ScriptSegment {
    pub fn is_pause(&self) -> bool {
        matches!(self.body, LineBody::Pause(_))
    }

    pub fn text(&self) -> Option<&str> {
        match &self.body {
            LineBody::Text(t) => Some(t),
            LineBody::Pause(_) => None,
        }
    }
}

fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[(\d{1,2}):(\d{2}):(\d{2})\]\s*(.*)$").expect("Invalid regex"))
}

/// Parse a single line. Returns `None` for blank separator lines and lines
/// without a leading timestamp; `Err` for malformed timestamps (out-of-range
/// fields, non-ASCII digits, missing closing bracket).
pub fn parse_line(line: &str) -> Result<Option<ScriptSegment>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    // A line that opens a digit-bearing bracket must be a valid timestamp.
    let looks_timestamped = trimmed.starts_with('[')
        && trimmed[1..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit());

    let Some(caps) = timestamp_re().captures(trimmed) else {
        if looks_timestamped {
            return Err(DubberError::InvalidInput(format!(
                "Malformed timestamp in line: {trimmed}"
            )));
        }
        return Ok(None);
    };

    let hours: u32 = caps[1].parse().map_err(|_| {
        DubberError::InvalidInput(format!("Non-numeric timestamp hours in line: {trimmed}"))
    })?;
    let minutes: u32 = caps[2].parse().map_err(|_| {
        DubberError::InvalidInput(format!("Non-numeric timestamp minutes in line: {trimmed}"))
    })?;
    let seconds: u32 = caps[3].parse().map_err(|_| {
        DubberError::InvalidInput(format!("Non-numeric timestamp seconds in line: {trimmed}"))
    })?;

    let start = Timestamp::from_parts(hours, minutes, seconds)?;
    let rest = caps[4].trim();

    let body = match PauseMarker::parse(rest) {
        Some(marker) => LineBody::Pause(marker),
        None => LineBody::Text(rest.to_string()),
    };

    Ok(Some(ScriptSegment { start, body }))
}

/// Parse a whole timed script into its timestamped segments, skipping blank
/// separators and non-timestamped preamble lines.
pub fn parse_script(script: &str) -> Result<Vec<ScriptSegment>> {
    let mut segments = Vec::new();
    for line in script.lines() {
        if let Some(segment) = parse_line(line)? {
            segments.push(segment);
        }
    }
    Ok(segments)
}

/// Validate the script-level invariant: timestamps parse and are
/// monotonically non-decreasing.
pub fn validate_script(script: &str) -> Result<()> {
    let segments = parse_script(script)?;
    for pair in segments.windows(2) {
        if pair[1].start < pair[0].start {
            return Err(DubberError::InvalidInput(format!(
                "Timestamps out of order: {} follows {}",
                pair[1].start, pair[0].start
            )));
        }
    }
    Ok(())
}

/// Extract the raw timestamp tokens in order of appearance. Translation
/// validation compares these bit-exactly between input and output.
pub fn extract_timestamps(text: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\[\d{1,2}:\d{2}:\d{2}\]").expect("Invalid regex"));
    re.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_line() {
        let seg = parse_line("[00:01:05] Hello world.").unwrap().unwrap();
        assert_eq!(seg.start.as_seconds(), 65);
        assert_eq!(seg.text(), Some("Hello world."));
    }

    #[test]
    fn test_parse_pause_markers() {
        let seg = parse_line("[00:00:03] [breath]").unwrap().unwrap();
        assert_eq!(seg.body, LineBody::Pause(PauseMarker::Breath));

        let seg = parse_line("[00:00:09] [rövid szünet]").unwrap().unwrap();
        assert_eq!(seg.body, LineBody::Pause(PauseMarker::ShortPause));

        let seg = parse_line("[00:00:26] [TÉMAVÁLTÁS]").unwrap().unwrap();
        assert_eq!(seg.body, LineBody::Pause(PauseMarker::TopicChange));
    }

    #[test]
    fn test_blank_and_preamble_lines() {
        assert!(parse_line("").unwrap().is_none());
        assert!(parse_line("   ").unwrap().is_none());
        assert!(parse_line("Some preamble text").unwrap().is_none());
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(parse_line("[00:61:00] bad").is_err());
        assert!(parse_line("[00:00:75] bad").is_err());
    }

    #[test]
    fn test_rejects_missing_bracket() {
        assert!(parse_line("[00:01:05 no closing").is_err());
    }

    #[test]
    fn test_format_roundtrip() {
        for line in ["[00:00:01] Hello.", "[01:02:03] Text here", "[12:59:59] x"] {
            let seg = parse_line(line).unwrap().unwrap();
            let formatted = format!("{} {}", seg.start, seg.text().unwrap());
            assert_eq!(formatted, line);
        }
    }

    #[test]
    fn test_validate_monotonic() {
        let script = "[00:00:01] a\n[00:00:05] b\n[00:00:05] c\n";
        assert!(validate_script(script).is_ok());

        let bad = "[00:00:05] a\n[00:00:01] b\n";
        assert!(validate_script(bad).is_err());
    }

    #[test]
    fn test_extract_timestamps() {
        let script = "[00:00:01] a\n\n[00:00:05] b\n[00:00:10] [breath]\n";
        let stamps = extract_timestamps(script);
        assert_eq!(stamps, vec!["[00:00:01]", "[00:00:05]", "[00:00:10]"]);
    }

    #[test]
    fn test_glyphs() {
        assert_eq!(PauseMarker::ShortPause.glyph(), "•");
        assert_eq!(PauseMarker::LongPause.glyph(), "••");
    }

    #[test]
    fn test_marker_canonical_forms() {
        for marker in [
            PauseMarker::Breath,
            PauseMarker::ShortPause,
            PauseMarker::LongPause,
            PauseMarker::TopicChange,
        ] {
            assert_eq!(PauseMarker::parse(marker.canonical()), Some(marker));
        }
    }
}
