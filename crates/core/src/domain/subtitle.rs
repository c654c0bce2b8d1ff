//! SRT 字幕の簡易リーダー。
//!
//! 完了した文字起こし結果のキュー数と時間順序を確認するためだけに使う。
//! 書式の変換は行わない。

/// 字幕キュー 1 件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    pub index: u32,
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubtitleError {
    #[error("cue {block}: invalid index line: {line}")]
    InvalidIndex { block: usize, line: String },
    #[error("cue {block}: invalid timing line: {line}")]
    InvalidTiming { block: usize, line: String },
    #[error("cue {block}: missing timing line")]
    MissingTiming { block: usize },
}

/// パース済みの字幕
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubtitleDocument {
    pub cues: Vec<Cue>,
}

impl SubtitleDocument {
    pub fn parse(input: &str) -> Result<Self, SubtitleError> {
        let normalized = input.replace("\r\n", "\n");
        let mut cues = Vec::new();

        for (block_no, block) in normalized
            .split("\n\n")
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .enumerate()
        {
            let block_no = block_no + 1;
            let mut lines = block.lines();

            let index_line = lines.next().unwrap_or_default().trim();
            let index = index_line
                .trim_start_matches('\u{feff}')
                .parse::<u32>()
                .map_err(|_| SubtitleError::InvalidIndex {
                    block: block_no,
                    line: index_line.to_string(),
                })?;

            let timing_line = lines
                .next()
                .ok_or(SubtitleError::MissingTiming { block: block_no })?;
            let (start_ms, end_ms) =
                parse_timing(timing_line).ok_or_else(|| SubtitleError::InvalidTiming {
                    block: block_no,
                    line: timing_line.to_string(),
                })?;

            let text = lines.collect::<Vec<_>>().join("\n");
            cues.push(Cue {
                index,
                start_ms,
                end_ms,
                text,
            });
        }

        Ok(Self { cues })
    }

    pub fn cue_count(&self) -> usize {
        self.cues.len()
    }

    /// 各キューの開始が前のキューの開始以降で、終了が開始以降か
    pub fn is_time_ordered(&self) -> bool {
        self.cues.iter().all(|c| c.end_ms >= c.start_ms)
            && self
                .cues
                .windows(2)
                .all(|pair| pair[1].start_ms >= pair[0].start_ms)
    }

    /// 最後のキューの終了時刻
    pub fn duration_ms(&self) -> u64 {
        self.cues.iter().map(|c| c.end_ms).max().unwrap_or(0)
    }
}

fn parse_timing(line: &str) -> Option<(u64, u64)> {
    let (start, end) = line.split_once("-->")?;
    // 終了側の後ろに位置指定が付く場合がある
    let end = end.split_whitespace().next()?;
    Some((parse_timestamp(start.trim())?, parse_timestamp(end)?))
}

/// `HH:MM:SS,mmm`（`.` 区切りも許容）
fn parse_timestamp(ts: &str) -> Option<u64> {
    let (hms, millis) = ts.split_once([',', '.'])?;
    let mut parts = hms.split(':');
    let h: u64 = parts.next()?.parse().ok()?;
    let m: u64 = parts.next()?.parse().ok()?;
    let s: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || m >= 60 || s >= 60 {
        return None;
    }
    let ms: u64 = millis.parse().ok()?;
    Some(((h * 60 + m) * 60 + s) * 1000 + ms)
}

/// エクスポート用の既定ファイル名
pub fn default_file_name(stem: &str, language: Option<&str>) -> String {
    let stem = stem.trim();
    let stem = if stem.is_empty() { "subtitles" } else { stem };
    let stem = stem.strip_suffix(".srt").unwrap_or(stem);
    match language.map(str::trim).filter(|l| !l.is_empty()) {
        Some(lang) => format!("{stem}_{lang}.srt"),
        None => format!("{stem}.srt"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "1\n00:00:00,000 --> 00:00:01,000\nHi\n\n2\n00:00:01,500 --> 00:00:03,250\nsecond line\nwrapped\n";

    #[test]
    fn parses_cues() {
        let doc = SubtitleDocument::parse(SAMPLE).unwrap();
        assert_eq!(doc.cue_count(), 2);
        assert_eq!(doc.cues[0].text, "Hi");
        assert_eq!(doc.cues[1].start_ms, 1_500);
        assert_eq!(doc.cues[1].end_ms, 3_250);
        assert_eq!(doc.cues[1].text, "second line\nwrapped");
        assert!(doc.is_time_ordered());
        assert_eq!(doc.duration_ms(), 3_250);
    }

    #[test]
    fn accepts_crlf_and_position_suffix() {
        let doc = SubtitleDocument::parse(
            "1\r\n01:02:03.004 --> 01:02:04.000 X1:0\r\nA\r\n",
        )
        .unwrap();
        assert_eq!(doc.cues[0].start_ms, 3_723_004);
    }

    #[test]
    fn detects_out_of_order_cues() {
        let doc = SubtitleDocument::parse(
            "1\n00:00:05,000 --> 00:00:06,000\nB\n\n2\n00:00:01,000 --> 00:00:02,000\nA\n",
        )
        .unwrap();
        assert!(!doc.is_time_ordered());
    }

    #[test]
    fn rejects_bad_timing() {
        let err = SubtitleDocument::parse("1\n00:00 --> later\nA\n").unwrap_err();
        assert!(matches!(err, SubtitleError::InvalidTiming { block: 1, .. }));

        let err = SubtitleDocument::parse("x\n00:00:00,000 --> 00:00:01,000\n").unwrap_err();
        assert!(matches!(err, SubtitleError::InvalidIndex { .. }));
    }

    #[test]
    fn empty_input_has_no_cues() {
        assert_eq!(SubtitleDocument::parse("  \n").unwrap().cue_count(), 0);
    }

    #[test]
    fn file_names() {
        assert_eq!(default_file_name("talk", None), "talk.srt");
        assert_eq!(default_file_name("talk.srt", Some("de")), "talk_de.srt");
        assert_eq!(default_file_name(" ", Some(" ")), "subtitles.srt");
    }
}
