/// Tone labels and the writing instructions attached to each.
///
/// Both the English identifiers used by API clients and the Japanese labels
/// shown in the UI are accepted. Anything unrecognized falls back to
/// `Elegant`, which carries the strictest guide.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tone {
    Friendly,
    General,
    #[default]
    Elegant,
}

impl Tone {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.to_ascii_lowercase().as_str() {
            "friendly" => return Tone::Friendly,
            "general" => return Tone::General,
            "elegant" => return Tone::Elegant,
            _ => {}
        }
        if raw.contains("親しみ") {
            Tone::Friendly
        } else if raw.contains("一般") {
            Tone::General
        } else {
            Tone::Elegant
        }
    }

    /// Japanese label used inside prompts.
    pub fn label(self) -> &'static str {
        match self {
            Tone::Friendly => "親しみやすい",
            Tone::General => "一般的",
            Tone::Elegant => "上品・落ち着いた",
        }
    }
}

pub fn style_guide(tone: Tone) -> &'static str {
    match tone {
        Tone::Friendly => concat!(
            "文体: やわらかく親しみのある丁寧語。専門用語は噛み砕き、誇張や感嘆記号は控える。\n",
            "構成: ①立地と街の雰囲気 ②建物の印象 ③交通アクセス ④共用施設・サービス ⑤暮らしの情景で結ぶ。\n",
            "語彙例: 「〜がうれしい」「〜を感じられます」「〜にも便利」「〜に寄り添う」。\n",
            "文長: 30〜60字を中心にする。\n",
            "禁止: 子どもっぽい接続（「〜で、〜で」「〜だから〜です」）。文末は「です」「ます」で統一する。",
        ),
        Tone::General => concat!(
            "文体: 中立的で説明的な丁寧語。事実に基づき、過不足なく読みやすく書く。\n",
            "構成: ①物件の概要 ②規模・デザイン ③交通アクセス ④共用施設・管理 ⑤まとめ。\n",
            "語彙例: 「〜に位置します」「〜を採用」「〜が整う」「〜を提供します」。\n",
            "文長: 40〜70字を中心にする。\n",
            "禁止: 子どもっぽい接続や曖昧な断定。文末は「です」「ます」で統一する。",
        ),
        Tone::Elegant => concat!(
            "文体: 上品で端正、落ち着いた調子。余白と品位を感じさせる事実ベースの表現。\n",
            "構成: ①全体コンセプトと立地 ②敷地規模・ランドスケープ ③建築デザイン ④交通アクセス ⑤共用施設・サービス ⑥結び。\n",
            "語彙例: 「〜という全体コンセプトのもと」「〜を実現」「〜に相応しい」「〜がひろがる」。\n",
            "文長: 40〜70字を中心にする。体言止めは1〜2文までに留める。\n",
            "禁止: 子どもっぽい接続、誇張的な最上級、感嘆記号。文末は「です」「ます」を基本とする。",
        ),
    }
}

/// Goal statement for the tone-specific finishing pass.
pub fn beautify_goal(tone: Tone) -> &'static str {
    match tone {
        Tone::Friendly => {
            "目標: 親しみやすくやわらかな文章に整える。暮らしの情景が浮かぶように。誇張と幼稚な接続は禁止。"
        }
        Tone::General => "目標: 中立的で説明的な、読みやすい文章に整える。誇張は禁止。体言止めは控えめに。",
        Tone::Elegant => {
            "目標: 高級不動産広告のように自然で美しい日本語に整える。上品で端正な文体。体言止めも可。誇張と幼稚な接続は禁止。"
        }
    }
}
