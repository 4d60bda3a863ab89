//! Transcript file rendering: preamble, timed script body with pause
//! glyphs, and the trailing statistics block.

use crate::error::Result;
use crate::script::timestamp::Timestamp;
use crate::transcribe::segment::{PauseKind, TimedSegment};
use std::path::{Path, PathBuf};
use tracing::info;

const RULE_LINE_WIDTH: usize = 70;

/// Render segments as a timed script body.
///
/// Each segment becomes a timestamped line. With breath marking enabled,
/// short pauses append `•`, long pauses `••`, and paragraph breaks become
/// blank lines.
pub fn render_script_body(segments: &[TimedSegment], breath_marking: bool) -> String {
    let mut lines: Vec<String> = Vec::new();

    for segment in segments {
        if segment.text.is_empty() {
            continue;
        }

        let stamp = Timestamp::from_seconds(segment.start as u32);
        let mut line = format!("{} {}", stamp, segment.text);

        if breath_marking {
            match segment.pause_after {
                Some(PauseKind::ShortBreath) => line.push_str(" •"),
                Some(PauseKind::LongBreath) => line.push_str(" ••"),
                Some(PauseKind::Paragraph) | None => {}
            }
        }
        lines.push(line);

        if breath_marking && segment.pause_after == Some(PauseKind::Paragraph) {
            lines.push(String::new());
        }
    }

    lines.join("\n")
}

/// Count the pause glyphs in a script body. Used for the statistics block.
fn count_pauses(body: &str) -> (usize, usize, usize) {
    let mut short = 0;
    let mut long = 0;
    let mut paragraphs = 0;
    for line in body.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            paragraphs += 1;
        } else if trimmed.ends_with("••") {
            long += 1;
        } else if trimmed.ends_with('•') {
            short += 1;
        }
    }
    (short, long, paragraphs)
}

/// Extract the timed-script body from a finalized transcript file,
/// dropping the preamble, rule line, and statistics block.
pub fn script_body(file_text: &str) -> String {
    file_text
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !(trimmed.starts_with('📹')
                || trimmed.starts_with('📅')
                || trimmed.starts_with('🤖')
                || trimmed.starts_with('📊')
                || trimmed.starts_with('=')
                || trimmed.starts_with("• "))
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Write the finalized transcript file: preamble, body, statistics.
pub fn write_transcript(
    data_dir: &Path,
    job_id: &str,
    video_title: &str,
    body: &str,
    postprocess_model: Option<String>,
    duration_seconds: f64,
) -> Result<PathBuf> {
    std::fs::create_dir_all(data_dir)?;
    let path = data_dir.join(format!("transcript_{job_id}.txt"));

    let word_count = body
        .lines()
        .flat_map(|l| l.split_whitespace())
        .filter(|w| !w.starts_with('[') && *w != "•" && *w != "••")
        .count();
    let line_count = body.lines().filter(|l| !l.trim().is_empty()).count();
    let (short, long, paragraphs) = count_pauses(body);
    let speaking_rate = if duration_seconds > 0.0 {
        word_count as f64 / (duration_seconds / 60.0)
    } else {
        0.0
    };

    let mut out = String::new();
    out.push_str(&format!("📹 Video: {video_title}\n"));
    out.push_str(&format!(
        "📅 Processed: {}\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M")
    ));
    if let Some(model) = postprocess_model {
        out.push_str(&format!("🤖 Postprocess: Vertex AI ({model})\n"));
    }
    out.push_str(&"=".repeat(RULE_LINE_WIDTH));
    out.push_str("\n\n");
    out.push_str(body);
    out.push_str("\n\n");
    out.push_str("📊 Script statistics:\n");
    out.push_str(&format!("   • Lines: {line_count}\n"));
    out.push_str(&format!("   • Words: {word_count}\n"));
    out.push_str(&format!(
        "   • Detected pauses: {} short, {} long, {} paragraph\n",
        short, long, paragraphs
    ));
    out.push_str(&format!(
        "   • Speaking rate: {speaking_rate:.0} words/min\n"
    ));

    std::fs::write(&path, out)?;
    info!("Wrote transcript to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: f64, text: &str, pause: Option<PauseKind>) -> TimedSegment {
        TimedSegment {
            start,
            end: start + 1.0,
            text: text.to_string(),
            pause_after: pause,
        }
    }

    #[test]
    fn test_render_basic_lines() {
        let segments = vec![
            segment(1.0, "Hello there.", None),
            segment(65.0, "Second line.", None),
        ];
        let body = render_script_body(&segments, true);
        assert_eq!(body, "[00:00:01] Hello there.\n[00:01:05] Second line.");
    }

    #[test]
    fn test_render_pause_glyphs() {
        let segments = vec![
            segment(0.0, "One", Some(PauseKind::ShortBreath)),
            segment(2.0, "Two", Some(PauseKind::LongBreath)),
            segment(5.0, "Three", None),
        ];
        let body = render_script_body(&segments, true);
        assert!(body.contains("One •\n"));
        assert!(body.contains("Two ••\n"));
    }

    #[test]
    fn test_render_paragraph_blank_line() {
        let segments = vec![
            segment(0.0, "End of thought.", Some(PauseKind::Paragraph)),
            segment(10.0, "New thought.", None),
        ];
        let body = render_script_body(&segments, true);
        assert!(body.contains("End of thought.\n\n[00:00:10]"));
    }

    #[test]
    fn test_render_without_breath_marking() {
        let segments = vec![segment(0.0, "One", Some(PauseKind::ShortBreath))];
        let body = render_script_body(&segments, false);
        assert!(!body.contains('•'));
    }

    #[test]
    fn test_rendered_body_parses_as_timed_script() {
        let segments = vec![
            segment(1.0, "Hello.", Some(PauseKind::Paragraph)),
            segment(10.0, "World.", None),
        ];
        let body = render_script_body(&segments, true);
        let parsed = crate::script::timestamp::parse_script(&body).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_write_transcript_structure() {
        let dir = tempfile::tempdir().unwrap();
        let body = "[00:00:01] Hello world. •\n\n[00:00:10] Next paragraph.";
        let path = write_transcript(
            dir.path(),
            "job123",
            "My Video",
            body,
            Some("gemini-2.0-flash".to_string()),
            60.0,
        )
        .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy() == "transcript_job123.txt");
        assert!(contents.starts_with("📹 Video: My Video\n"));
        assert!(contents.contains("🤖 Postprocess: Vertex AI (gemini-2.0-flash)"));
        assert!(contents.contains(&"=".repeat(70)));
        assert!(contents.contains(body));
        assert!(contents.contains("📊 Script statistics:"));
        assert!(contents.contains("• Words: 4"));
    }

    #[test]
    fn test_script_body_strips_decoration() {
        let dir = tempfile::tempdir().unwrap();
        let body = "[00:00:01] Hello world. •\n\n[00:00:10] Next paragraph.";
        let path = write_transcript(dir.path(), "j", "Title", body, None, 60.0).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let extracted = script_body(&contents);
        assert_eq!(extracted, body);
    }

    #[test]
    fn test_count_pauses() {
        let body = "[00:00:01] a •\n[00:00:02] b ••\n\n[00:00:05] c";
        let (short, long, paragraphs) = count_pauses(body);
        assert_eq!(short, 1);
        assert_eq!(long, 1);
        assert_eq!(paragraphs, 1);
    }
}
