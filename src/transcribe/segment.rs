//! Pause detection over word timings. Gaps between consecutive words are
//! classified into breath, long-pause, and paragraph breaks, and words are
//! folded into timed segments at those boundaries.

use crate::transcribe::speech::WordInfo;

/// Pause thresholds in seconds.
const PAUSE_MIN: f64 = 0.3;
const PAUSE_SHORT: f64 = 0.6;
const PAUSE_LONG: f64 = 1.5;
const PAUSE_PARAGRAPH: f64 = 3.0;

/// A sentence end followed by at least this much silence starts a new
/// paragraph even below the paragraph threshold.
const SENTENCE_END_PARAGRAPH: f64 = 1.0;

/// Classified pause following a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseKind {
    ShortBreath,
    LongBreath,
    Paragraph,
}

/// A run of words with the pause that ended it.
#[derive(Debug, Clone)]
pub struct TimedSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub pause_after: Option<PauseKind>,
}

fn ends_sentence(word: &str) -> bool {
    word.ends_with('.') || word.ends_with('!') || word.ends_with('?')
}

fn classify_pause(gap: f64, word: &str) -> Option<PauseKind> {
    if gap < PAUSE_MIN {
        return None;
    }
    if ends_sentence(word) && gap >= SENTENCE_END_PARAGRAPH {
        return Some(PauseKind::Paragraph);
    }
    if gap >= PAUSE_PARAGRAPH {
        Some(PauseKind::Paragraph)
    } else if gap >= PAUSE_LONG {
        Some(PauseKind::LongBreath)
    } else if gap >= PAUSE_SHORT {
        Some(PauseKind::ShortBreath)
    } else {
        None
    }
}

/// Fold words into segments, breaking wherever a classifiable pause occurs.
pub fn segment_words(words: &[WordInfo]) -> Vec<TimedSegment> {
    let mut segments = Vec::new();
    let mut current: Vec<&WordInfo> = Vec::new();

    for (i, word) in words.iter().enumerate() {
        current.push(word);

        let pause = words
            .get(i + 1)
            .and_then(|next| classify_pause(next.start - word.end, &word.word));

        let is_last = i + 1 == words.len();
        if pause.is_some() || is_last {
            let start = current.first().map(|w| w.start).unwrap_or(0.0);
            let end = current.last().map(|w| w.end).unwrap_or(start);
            let text = current
                .iter()
                .map(|w| w.word.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            segments.push(TimedSegment {
                start,
                end,
                text,
                pause_after: if is_last { None } else { pause },
            });
            current.clear();
        }
    }

    segments
}
