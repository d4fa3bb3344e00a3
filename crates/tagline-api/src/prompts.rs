//! System prompts for every completion stage.
//!
//! Each prompt opens with a JSON contract line so the service answers with a
//! single JSON object (`response_format: json_object` also requires the word
//! "json" to appear in the prompt).

use crate::compliance::BANNED_TERMS;
use crate::model::CharRange;
use crate::style::{beautify_goal, Tone};

const TEXT_CONTRACT: &str = "Return ONLY a json object of the form {\"text\": string}.";

/// Fields the draft should mention when the source page provides them.
pub const MUST_INCLUDE_FIELDS: &[&str] = &[
    "階建",
    "総戸数",
    "建物構造",
    "分譲会社",
    "施工会社",
    "管理会社",
];

/// Topics the draft must never cover.
pub const DO_NOT_INCLUDE: &[&str] = &["リフォーム内容", "方位", "面積", "お問い合わせ文言", "価格"];

/// The tone's style guide followed by the reference-example summary, if any.
pub fn style_block(style: &str, anchors: &str) -> String {
    if anchors.is_empty() {
        style.to_string()
    } else {
        format!("{style}\n---\n【Style Anchors】\n{anchors}\n---")
    }
}

pub fn draft_system(tone: Tone, style: &str, anchors: &str, range: CharRange) -> String {
    [
        TEXT_CONTRACT.to_string(),
        "あなたは日本語の不動産コピーライターです。".to_string(),
        format!("トーン: {}。次のスタイルガイドに従う。", tone.label()),
        style_block(style, anchors),
        format!("文字数は【厳守】{}〜{}字（全角）。", range.min, range.max),
        "事実ベースで書く。価格・金額・円・万円・電話番号・外部URLは書かない。".to_string(),
        "住戸の部屋番号・方位・間取り・専有面積・リフォーム内容は書かない。建物全体の説明に留める。".to_string(),
        format!("禁止語を使わない: {}", BANNED_TERMS.join("、")),
        "物件名（name）は2回程度自然に含める。過度な連呼は禁止。".to_string(),
        "must_words の語はすべて自然に含める。".to_string(),
    ]
    .join("\n")
}

pub fn anchors_system() -> String {
    "Return ONLY a json object of the form {\"rules\": string}. 日本語で、例文に共通するスタイルを要約する: \
1) 段落構成 2) 文長 3) 言い回し 4) 語彙のトーン 5) 接続詞 6) 体言止めの頻度 7) 避けている表現"
        .to_string()
}

pub fn resize_system(tone: Tone, style: &str, range: CharRange, expand: bool) -> String {
    let goal = if expand { "増やす" } else { "収める" };
    [
        TEXT_CONTRACT.to_string(),
        format!("日本語・トーン: {}。次のスタイルガイドを守る。", tone.label()),
        style.to_string(),
        format!("目的: 文字数を{}〜{}字（全角）に{goal}。", range.min, range.max),
        "事実が足りない場合は一般的で安全な叙述で補い、固有の事実を創作しない。".to_string(),
        "幼稚な接続は禁止。価格・金額・URL・電話番号は書かない。".to_string(),
    ]
    .join("\n")
}

pub fn polish_system(tone: Tone, style: &str) -> String {
    [
        TEXT_CONTRACT.to_string(),
        format!("以下の日本語を校正する。幼稚な接続を避ける。トーン: {}", tone.label()),
        style.to_string(),
        "文末は原則「です」「ます」。体言止めや「〜を実現」「〜を提供します」も許容する。".to_string(),
        "意味と事実は変えない。新しい事実を足さない。".to_string(),
    ]
    .join("\n")
}

pub fn beautify_system(tone: Tone) -> String {
    [TEXT_CONTRACT, beautify_goal(tone), "事実は変えず、禁止語・価格・住戸固有の情報は書かない。"].join("\n")
}

pub fn conformance_system() -> String {
    "Return ONLY a json object of the form {\"score\": number, \"rewrite\": string}. 日本語。\
current_text が examples のスタイルにどれだけ適合しているかを1〜5点で採点する。\
4点未満なら、style_guide・anchors・banned・range を守って rewrite に書き直した全文を入れる。\
4点以上なら rewrite は空文字列にする。"
        .to_string()
}

pub fn revision_system() -> String {
    [
        TEXT_CONTRACT,
        "revision_notes の修正要望を current_text に反映する。",
        "誇張は禁止。建物全体の説明に留め、室内・専有部・個別の改装・間取り・価格は書かない。",
        "幼稚な接続は禁止。要望と関係のない部分はできるだけ保つ。",
    ]
    .join("\n")
}
