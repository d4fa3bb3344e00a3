/// Advertising-compliance filter for generated property copy.
///
/// The filter is an ordered list of passes, each an ordered list of regex
/// rules. Order matters: every rule sees the string produced by the previous
/// one. Passes:
///
/// 1. unit-specific scrubbing (sentence-scoped)
/// 2. hard-banned vocabulary
/// 3. unsubstantiated newness (`新築`)
/// 4. residual floor-plan tokens
/// 5. walking-time widening (`徒歩5分` -> `徒歩5~7分`)
/// 6. phrase softening
/// 7. whitespace / punctuation normalization
///
/// The rule tables are compiled once and shared read-only.
use once_cell::sync::Lazy;
use regex::{Captures, NoExpand, Regex};
use tracing::trace;

/// Characters that end a sentence.
const ENDER: &str = "[。．.！？!?]";

/// One character of sentence body. A dot between digits (`3.5`) is not a
/// sentence end.
const BODY: &str = "(?:[0-9]\\.[0-9]|[^。．.！？!?\\n])";

const DIRECTIONS: &str = "(?:南東|南西|北東|北西|東南|西南|東北|西北|南|東|西|北)";

/// Vocabulary that is deleted wherever it appears.
pub const BANNED_TERMS: &[&str] = &[
    "完全",
    "完ぺき",
    "完璧",
    "絶対",
    "万全",
    "100％",
    "100%",
    "理想",
    "日本一",
    "日本初",
    "業界一",
    "業界初",
    "No.1",
    "NO.1",
    "No1",
    "地域でナンバーワン",
    "ナンバーワン",
    "一流",
    "最高級",
    "最高",
    "最上級",
    "極上",
    "抜群",
    "特選",
    "厳選",
    "正統",
    "由緒正しい",
    "由緒ある",
    "歴史ある",
    "歴史的",
    "特級",
    "屈指",
    "秀逸",
    "羨望",
    "最新",
    "最適",
    "至近",
    "至便",
    "絶好",
    "最安値",
    "最安",
    "格安",
    "激安",
    "特安",
    "破格",
    "掘り出し物",
    "掘出し物",
    "掘出",
    "土地値",
    "投げ売り",
    "投売り",
    "バーゲンセール",
    "買得",
    "安値",
    "他に類を見ない",
    "当社だけ",
    "フルリフォーム",
];

/// Emphatic prefixes, deleted except inside the descriptive compounds listed
/// in `keep`.
const EMPHATIC_PREFIX: &str = "(?P<keep>超高層|超高速|一級建築士|一級河川|積極|究極|北極|南極|極力|極め)|超|極|一級";

/// Compound claims that contain a banned term but are rewritten as a whole by
/// the softening pass. The banned-vocabulary pass leaves them intact.
const SOFTENED_COMPOUNDS: &str =
    "日当たり(?:良好|抜群)|通風(?:良好|抜群)|眺望(?:良好|抜群)|抜群の利便性|利便性(?:が高い|最高)|アクセス(?:至便|抜群)";

/// Hedged replacements for absolute environment / convenience claims.
const SOFTENING_TABLE: &[(&str, &str)] = &[
    ("日当たり(?:良好|抜群)", "日当たりに配慮"),
    ("通風(?:良好|抜群)", "通風に配慮"),
    ("眺望(?:良好|抜群)", "眺望に配慮"),
    ("静寂", "静けさに配慮"),
    ("閑静な", "落ち着きのある"),
    ("閑静", "落ち着きのある環境"),
    ("騒音なし", "騒音対策に配慮"),
    ("抜群の利便性", "利便性に配慮"),
    ("利便性(?:が高い|最高)", "利便性に配慮"),
    ("アクセス(?:至便|抜群)", "アクセスしやすい立地"),
    ("トップクラス", "適切な水準"),
    ("必ず|間違いなく|保証", "配慮されています"),
];

static FILTER: Lazy<ComplianceFilter> = Lazy::new(ComplianceFilter::standard);

/// Apply the standard filter.
pub fn enforce(text: &str) -> String {
    FILTER.apply(text)
}

enum Action {
    Replace(&'static str),
    Rewrite(fn(&Captures<'_>) -> String),
}

struct Rule {
    name: &'static str,
    re: Regex,
    action: Action,
}

impl Rule {
    fn new(name: &'static str, pattern: &str, action: Action) -> Self {
        let re = Regex::new(pattern)
            .unwrap_or_else(|e| panic!("compliance rule {name} has an invalid pattern: {e}"));
        Self { name, re, action }
    }

    /// Delete every match.
    fn strip(name: &'static str, pattern: &str) -> Self {
        Self::new(name, pattern, Action::Replace(""))
    }

    fn replace(name: &'static str, pattern: &str, with: &'static str) -> Self {
        Self::new(name, pattern, Action::Replace(with))
    }

    fn rewrite(name: &'static str, pattern: &str, f: fn(&Captures<'_>) -> String) -> Self {
        Self::new(name, pattern, Action::Rewrite(f))
    }

    /// Delete the whole sentence containing `key`, terminator included.
    fn sentence(name: &'static str, key: &str) -> Self {
        let pattern = [BODY, "*(?:", key, ")", BODY, "*", ENDER, "?"].concat();
        Self::strip(name, &pattern)
    }

    /// Delete from `key` through the end of its sentence. An unterminated
    /// trailing fragment is deleted through the end of the text.
    fn to_sentence_end(name: &'static str, key: &str) -> Self {
        let pattern = ["(?:", key, ")", BODY, "*", ENDER, "?"].concat();
        Self::strip(name, &pattern)
    }

    fn apply(&self, text: &str) -> String {
        let out = match &self.action {
            Action::Replace(with) => self.re.replace_all(text, NoExpand(with)),
            Action::Rewrite(f) => self.re.replace_all(text, |caps: &Captures<'_>| f(caps)),
        };
        if out != text {
            trace!(rule = self.name, "compliance rule rewrote text");
        }
        out.into_owned()
    }
}

struct Pass {
    name: &'static str,
    rules: Vec<Rule>,
    until_stable: bool,
}

impl Pass {
    fn once(name: &'static str, rules: Vec<Rule>) -> Self {
        Self {
            name,
            rules,
            until_stable: false,
        }
    }

    /// Every rule in a repeating pass deletes, shortens or widens a bare
    /// walking time that is then a range, so the loop terminates.
    fn repeating(name: &'static str, rules: Vec<Rule>) -> Self {
        Self {
            name,
            rules,
            until_stable: true,
        }
    }

    fn run(&self, text: String) -> String {
        let mut current = text;
        loop {
            let next = self
                .rules
                .iter()
                .fold(current.clone(), |acc, rule| rule.apply(&acc));
            if !self.until_stable || next == current {
                return next;
            }
            trace!(pass = self.name, "repeating pass");
            current = next;
        }
    }
}

pub struct ComplianceFilter {
    passes: Vec<Pass>,
}

impl ComplianceFilter {
    pub fn standard() -> Self {
        let banned = banned_alternation();
        Self {
            passes: vec![
                Pass::once("unit-specific", unit_specific_rules()),
                Pass::repeating(
                    "banned-vocabulary",
                    vec![
                        Rule::rewrite(
                            "banned-term",
                            &format!("(?P<keep>{SOFTENED_COMPOUNDS})|(?:{banned})"),
                            keep_named_group,
                        ),
                        Rule::rewrite("emphatic-prefix", EMPHATIC_PREFIX, keep_named_group),
                    ],
                ),
                Pass::once("newness", vec![Rule::strip("new-build", "新築")]),
                Pass::once(
                    "floor-plan",
                    vec![Rule::strip(
                        "floor-plan-token",
                        "ワン\\s?ルーム|スタジオ\\s?タイプ|メゾネット(?:タイプ)?|ロフト(?:付き)?|間取り|間取|S?LDK|S?DK|ＳＬＤＫ|ＬＤＫ|ＤＫ",
                    )],
                ),
                Pass::once("walking-time", vec![walking_time_rule()]),
                Pass::once(
                    "softening",
                    SOFTENING_TABLE
                        .iter()
                        .map(|&(pattern, with)| Rule::replace("soften", pattern, with))
                        .collect(),
                ),
                Pass::repeating("normalize", normalization_rules(&banned)),
            ],
        }
    }

    pub fn apply(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let out = self
            .passes
            .iter()
            .fold(text.to_string(), |acc, pass| pass.run(acc));
        out.trim().to_string()
    }
}

fn unit_specific_rules() -> Vec<Rule> {
    let orientation_label = ["(?:方位|方角|主要採光面)\\s*[:：]?\\s*", DIRECTIONS].concat();
    let orientation_claim = [DIRECTIONS, "向き"].concat();
    vec![
        Rule::strip("room-number", "[0-9０-９]{1,4}\\s*号室"),
        Rule::strip("room-number", "号室\\s*[0-9０-９]{1,4}"),
        Rule::strip(
            "unit-floor",
            "(?:所在|当該)?(?:地上)?[0-9０-９]{1,3}\\s*階(?:部分|住戸|の住戸)",
        ),
        Rule::sentence("orientation", &orientation_label),
        Rule::sentence("orientation", &orientation_claim),
        Rule::strip(
            "floor-plan-code",
            "[0-9０-９]\\s*(?:S?LDK|S?DK|LK|K|ＳＬＤＫ|ＬＤＫ|ＤＫ|Ｋ)",
        ),
        Rule::to_sentence_end("area-label", "専有面積|内法面積|壁芯面積|バルコニー面積|テラス面積"),
        Rule::strip(
            "area-figure",
            "[0-9０-９][0-9０-９,，]*(?:[.．][0-9０-９]+)?\\s*(?:㎡|m²|m2|平米|平方メートル)",
        ),
        Rule::sentence("balcony", "ルーフバルコニー|バルコニー|ルーフテラス|テラス|専用庭"),
        Rule::sentence(
            "renovation",
            "(?:[0-9０-９]{2,4}年(?:[0-9０-９]{1,2}月)?に?)?(?:フルリフォーム|リフォーム|リノベーション|改装|改修|内装)",
        ),
        Rule::sentence(
            "interior-replacement",
            "(?:室内|居室|専有部|フローリング|クロス|建具|サッシ|キッチン|浴室|トイレ|洗面|給湯器|食洗機|浄水器)[^。．.！？!?\\n]*(?:新規|交換|張替|貼替|取替|取換|新調|補修|クリーニング)",
        ),
        Rule::to_sentence_end(
            "price",
            "販売価格|価格|税込|消費税|管理費|修繕積立金|ローン|返済|頭金|ボーナス払い|月々",
        ),
        Rule::strip(
            "price-figure",
            "[0-9０-９一二三四五六七八九十百千万億][0-9０-９一二三四五六七八九十百千万億,，.．]*円",
        ),
        Rule::strip("price", "金額"),
        Rule::sentence(
            "call-to-action",
            "お問い合わせ|お問合せ|お問い合せ|問い合わせ|ご見学|見学会|内覧|オープンルーム|ご来場|お申し込み|お申込み|資料請求|お気軽に",
        ),
        Rule::sentence(
            "parking",
            "(?:駐車場|駐車スペース|駐車区画)[^。．.！？!?\\n]*(?:空き|空有|あり|有り|完備|確保|利用可|付き)",
        ),
    ]
}

fn normalization_rules(banned: &str) -> Vec<Rule> {
    vec![
        Rule::replace("spaces", "[ \\t\\u{3000}]{2,}", " "),
        Rule::replace("blank-lines", "\\n{3,}", "\n\n"),
        Rule::replace("double-period", "。(?:\\s*。)+", "。"),
        Rule::replace("double-exclamation", "！(?:\\s*！)+", "！"),
        Rule::replace("double-question", "？(?:\\s*？)+", "？"),
        Rule::replace("double-comma", "、(?:\\s*、)+", "、"),
        Rule::rewrite("comma-before-end", "、\\s*([。！？])", first_group),
        Rule::strip("empty-brackets", "[「『（(【]\\s*[」』）)】]"),
        Rule::strip("leading-punctuation", "(?m)^[ \\t、，。]+"),
        Rule::strip("trailing-comma", "(?m)[ \\t、，]+$"),
        Rule::strip("exposed-banned-term", banned),
        // Deletions above can join `徒歩` to a bare minute count.
        walking_time_rule(),
    ]
}

fn walking_time_rule() -> Rule {
    Rule::rewrite(
        "walking-minutes",
        "徒歩([0-9０-９]{1,2})分([~〜～][0-9０-９])?",
        widen_walking_minutes,
    )
}

/// Alternation of every banned term, longest first so `最高級` wins over `最高`.
fn banned_alternation() -> String {
    let mut terms: Vec<&str> = BANNED_TERMS.to_vec();
    terms.sort_by_key(|t| std::cmp::Reverse(t.chars().count()));
    terms
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|")
}

fn keep_named_group(caps: &Captures<'_>) -> String {
    caps.name("keep")
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

fn first_group(caps: &Captures<'_>) -> String {
    caps[1].to_string()
}

fn widen_walking_minutes(caps: &Captures<'_>) -> String {
    if caps.get(2).is_some() {
        return caps[0].to_string();
    }
    match parse_digits(&caps[1]) {
        Some(base) => format!("徒歩{}~{}分", base, base + 2),
        None => caps[0].to_string(),
    }
}

/// Parses ASCII or full-width decimal digits.
fn parse_digits(s: &str) -> Option<u32> {
    s.chars().try_fold(0u32, |acc, c| {
        let digit = match c {
            '0'..='9' => c as u32 - '0' as u32,
            '０'..='９' => c as u32 - '０' as u32,
            _ => return None,
        };
        acc.checked_mul(10)?.checked_add(digit)
    })
}
