use tracing::{debug, info};

use crate::completion::Completer;
use crate::compliance;
use crate::error::AppError;
use crate::model::CharRange;
use crate::style::Tone;

/// Rewrite attempts before falling back to a hard cap.
pub const MAX_REWRITES: usize = 3;

const SENTENCE_ENDS: &[char] = &['。', '！', '？', '.'];

pub fn char_count(s: &str) -> usize {
    s.chars().count()
}

/// Cut `s` to at most `max` characters, preferring the last sentence end
/// inside the limit.
pub fn hard_cap(s: &str, max: usize) -> String {
    let cut = match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => return s.trim().to_string(),
    };
    let cut = match cut.rfind(SENTENCE_ENDS) {
        Some(idx) => {
            let end = cut[idx..].chars().next().map_or(0, char::len_utf8);
            &cut[..idx + end]
        }
        None => cut,
    };
    cut.trim().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthStatus {
    WithinRange,
    /// Still too long after every rewrite; cut at a sentence boundary.
    HardCapped,
    /// Still too short after every rewrite; returned as is.
    Short,
}

#[derive(Debug, Clone)]
pub struct LengthOutcome {
    pub text: String,
    pub rewrites: usize,
    pub status: LengthStatus,
}

/// Inputs for one length enforcement run.
pub struct LengthJob<'a> {
    pub text: String,
    pub context: &'a str,
    pub tone: Tone,
    pub style: &'a str,
    pub range: CharRange,
}

/// Ask the model to expand or condense until the text fits `range`.
/// Every rewrite is passed back through the compliance filter.
pub async fn enforce_length(
    completer: &Completer,
    job: LengthJob<'_>,
) -> Result<LengthOutcome, AppError> {
    let LengthJob {
        mut text,
        context,
        tone,
        style,
        range,
    } = job;

    let mut rewrites = 0;
    while rewrites < MAX_REWRITES {
        let count = char_count(&text);
        if range.contains(count) {
            return Ok(LengthOutcome {
                text,
                rewrites,
                status: LengthStatus::WithinRange,
            });
        }
        let expand = count < range.min;
        debug!(count, min = range.min, max = range.max, expand, "resizing copy");
        let resized = completer
            .resize(&text, context, tone, style, range, expand)
            .await?;
        text = compliance::enforce(&resized);
        rewrites += 1;
    }

    let count = char_count(&text);
    let status = if range.contains(count) {
        LengthStatus::WithinRange
    } else if count > range.max {
        info!(count, max = range.max, "length still over range, hard capping");
        text = hard_cap(&text, range.max);
        LengthStatus::HardCapped
    } else {
        info!(count, min = range.min, "length still under range after rewrites");
        LengthStatus::Short
    };
    Ok(LengthOutcome {
        text,
        rewrites,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockCompletion, MockReply};
    use proptest::prelude::*;

    #[test]
    fn counts_scalar_values() {
        assert_eq!(char_count("徒歩5分"), 4);
        assert_eq!(char_count(""), 0);
    }

    #[test]
    fn hard_cap_backtracks_to_sentence_end() {
        assert_eq!(hard_cap("一文目です。二文目が長く続きます", 10), "一文目です。");
        assert_eq!(hard_cap("短い。", 10), "短い。");
    }

    #[test]
    fn hard_cap_without_boundary_cuts_raw() {
        assert_eq!(hard_cap("あいうえおかきくけこ", 4), "あいうえ");
    }

    #[test]
    fn hard_cap_keeps_ascii_period() {
        assert_eq!(hard_cap("Open 2025. Then more text", 12), "Open 2025.");
    }

    proptest! {
        #[test]
        fn hard_cap_never_exceeds_max(s in "[あ-ん。！？ a-z.]{0,120}", max in 1usize..80) {
            prop_assert!(char_count(&hard_cap(&s, max)) <= max);
        }
    }

    fn range() -> CharRange {
        CharRange { min: 5, max: 10 }
    }

    #[tokio::test]
    async fn in_range_text_needs_no_calls() {
        let mock = MockCompletion::start(vec![]).await;
        let out = enforce_length(
            &mock.completer(),
            LengthJob {
                text: "ちょうど良い長さ".to_string(),
                context: "",
                tone: Tone::Elegant,
                style: "",
                range: range(),
            },
        )
        .await
        .unwrap();
        assert_eq!(out.status, LengthStatus::WithinRange);
        assert_eq!(out.rewrites, 0);
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn short_text_is_expanded_and_filtered() {
        let mock = MockCompletion::start(vec![MockReply::text("駅から徒歩5分の住まい")]).await;
        let out = enforce_length(
            &mock.completer(),
            LengthJob {
                text: "短文".to_string(),
                context: "ctx",
                tone: Tone::General,
                style: "",
                range: CharRange { min: 5, max: 20 },
            },
        )
        .await
        .unwrap();
        assert_eq!(out.rewrites, 1);
        assert_eq!(out.text, "駅から徒歩5~7分の住まい");
        assert_eq!(out.status, LengthStatus::WithinRange);
        assert_eq!(mock.user_payload(0)["action"], "expand");
    }

    #[tokio::test]
    async fn stubborn_long_text_is_hard_capped() {
        let long = "長い文章です。さらに長い文章が続きます。".to_string();
        let mock = MockCompletion::start(vec![
            MockReply::text(&long),
            MockReply::text(&long),
            MockReply::text(&long),
        ])
        .await;
        let out = enforce_length(
            &mock.completer(),
            LengthJob {
                text: long.clone(),
                context: "",
                tone: Tone::Elegant,
                style: "",
                range: range(),
            },
        )
        .await
        .unwrap();
        assert_eq!(out.rewrites, MAX_REWRITES);
        assert_eq!(out.status, LengthStatus::HardCapped);
        assert_eq!(out.text, "長い文章です。");
    }

    #[tokio::test]
    async fn unusable_reply_keeps_previous_text() {
        let mock = MockCompletion::start(vec![
            MockReply::raw("oops"),
            MockReply::raw("oops"),
            MockReply::raw("oops"),
        ])
        .await;
        let out = enforce_length(
            &mock.completer(),
            LengthJob {
                text: "短".to_string(),
                context: "",
                tone: Tone::Elegant,
                style: "",
                range: range(),
            },
        )
        .await
        .unwrap();
        assert_eq!(out.text, "短");
        assert_eq!(out.status, LengthStatus::Short);
    }
}
