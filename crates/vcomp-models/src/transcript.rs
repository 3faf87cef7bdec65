//! SRT transcript generation and parsing.
//!
//! Timecodes use the `HH:MM:SS,mmm` form; blocks are numbered from 1 and
//! separated by a blank line.

use crate::caption::Caption;
use crate::error::{ModelError, ModelResult};

/// One transcript block.
#[derive(Debug, Clone, PartialEq)]
pub struct SrtEntry {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Format seconds as an SRT timecode, rounded to the nearest millisecond.
///
/// # Examples
/// ```
/// use vcomp_models::transcript::format_srt_timestamp;
/// assert_eq!(format_srt_timestamp(0.0), "00:00:00,000");
/// assert_eq!(format_srt_timestamp(3725.5), "01:02:05,500");
/// ```
pub fn format_srt_timestamp(seconds: f64) -> String {
    let total_ms = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    };
    let hours = total_ms / 3_600_000;
    let mins = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, mins, secs, millis)
}

/// Parse an `HH:MM:SS,mmm` timecode (a `.` separator is tolerated).
pub fn parse_srt_timestamp(ts: &str) -> ModelResult<f64> {
    let ts = ts.trim();
    let invalid = || ModelError::InvalidTimecode(ts.to_string());

    let (clock, millis) = ts.split_once([',', '.']).ok_or_else(invalid)?;
    let parts: Vec<&str> = clock.split(':').collect();
    if parts.len() != 3 || millis.len() != 3 {
        return Err(invalid());
    }

    let field = |s: &str| s.parse::<u64>().map_err(|_| invalid());
    let hours = field(parts[0])?;
    let mins = field(parts[1])?;
    let secs = field(parts[2])?;
    let ms = field(millis)?;
    if mins >= 60 || secs >= 60 {
        return Err(invalid());
    }

    let total_ms = hours * 3_600_000 + mins * 60_000 + secs * 1000 + ms;
    Ok(total_ms as f64 / 1000.0)
}

/// Build an SRT document from captions, ordered by start time.
///
/// Captions with equal start times keep their request order. Blank lines
/// inside a caption are dropped, since a blank line ends an SRT block.
pub fn generate_srt(captions: &[Caption]) -> String {
    let mut ordered: Vec<&Caption> = captions.iter().collect();
    ordered.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

    ordered
        .iter()
        .enumerate()
        .map(|(i, caption)| {
            format!(
                "{}\n{} --> {}\n{}\n",
                i + 1,
                format_srt_timestamp(caption.start_time),
                format_srt_timestamp(caption.end_time),
                srt_text(&caption.text)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn srt_text(text: &str) -> String {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse an SRT document back into entries.
pub fn parse_srt(content: &str) -> ModelResult<Vec<SrtEntry>> {
    let normalized = content.replace("\r\n", "\n");
    let mut entries = Vec::new();

    for (block_no, block) in normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .enumerate()
    {
        let malformed = |message: &str| ModelError::MalformedTranscript {
            block: block_no + 1,
            message: message.to_string(),
        };

        let mut lines = block.lines();
        let index = lines
            .next()
            .and_then(|l| l.trim().parse::<usize>().ok())
            .ok_or_else(|| malformed("missing block number"))?;
        let timing = lines.next().ok_or_else(|| malformed("missing timing line"))?;
        let (start, end) = timing
            .split_once("-->")
            .ok_or_else(|| malformed("timing line has no arrow"))?;
        let text = lines.collect::<Vec<_>>().join("\n");

        entries.push(SrtEntry {
            index,
            start: parse_srt_timestamp(start)?,
            end: parse_srt_timestamp(end)?,
            text,
        });
    }

    Ok(entries)
}
