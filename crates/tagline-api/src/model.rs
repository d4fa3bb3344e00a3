use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::style::Tone;

pub const DEFAULT_MIN_CHARS: usize = 450;
pub const DEFAULT_MAX_CHARS: usize = 550;
pub const MAX_REFERENCE_EXAMPLES: usize = 5;

/// Inclusive character-count target, counted in Unicode scalar values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CharRange {
    pub min: usize,
    pub max: usize,
}

impl CharRange {
    pub fn new(min: Option<usize>, max: Option<usize>) -> Result<Self, AppError> {
        let min = min.unwrap_or(DEFAULT_MIN_CHARS);
        let max = max.unwrap_or(DEFAULT_MAX_CHARS);
        if max == 0 {
            return Err(AppError::InvalidRequest("maxChars must be greater than 0".to_string()));
        }
        if min > max {
            return Err(AppError::InvalidRequest(format!(
                "minChars ({min}) must not exceed maxChars ({max})"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, count: usize) -> bool {
        (self.min..=self.max).contains(&count)
    }
}

/// A field that clients send either as one string or as a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<Value>),
}

impl StringOrList {
    fn items(&self) -> Vec<String> {
        match self {
            StringOrList::One(s) => vec![s.clone()],
            StringOrList::Many(values) => values
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect(),
        }
    }
}

/// Must-words are split on whitespace, commas and slashes.
pub fn normalize_must_words(src: Option<&StringOrList>) -> Vec<String> {
    let Some(src) = src else {
        return Vec::new();
    };
    src.items()
        .join(" ")
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | '、' | '，' | '/' | '／'))
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Revision notes: list entries as given, or one note per line of a string.
pub fn normalize_revision_notes(src: Option<&StringOrList>) -> Vec<String> {
    let lines: Vec<String> = match src {
        None => return Vec::new(),
        Some(StringOrList::One(s)) => s.lines().map(str::to_string).collect(),
        Some(list) => list.items(),
    };
    lines
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

fn normalize_reference_examples(src: Option<&StringOrList>) -> Vec<String> {
    src.map(StringOrList::items)
        .unwrap_or_default()
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .take(MAX_REFERENCE_EXAMPLES)
        .collect()
}

/// Accepts `450`, `450.0` or `"450"`; `null` is treated as absent.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .map(|n| Some(n as usize))
            .ok_or_else(|| D::Error::custom(format!("invalid character count: {n}"))),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid character count: {s:?}"))),
        other => Err(D::Error::custom(format!("invalid character count: {other}"))),
    }
}

/// Options shared by every endpoint once the request has been validated.
#[derive(Debug, Clone)]
pub struct CopyOptions {
    pub tone: Tone,
    pub range: CharRange,
    pub reference_examples: Vec<String>,
    pub revision_notes: Vec<String>,
    pub beautify: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub must_words: Option<StringOrList>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub min_chars: Option<usize>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub max_chars: Option<usize>,
    #[serde(default)]
    pub reference_examples: Option<StringOrList>,
    #[serde(default)]
    pub revision_notes: Option<StringOrList>,
    #[serde(default)]
    pub beautify: Option<bool>,
}

/// A validated generate request.
#[derive(Debug, Clone)]
pub struct GenerateJob {
    pub name: String,
    pub url: String,
    pub must_words: Vec<String>,
    pub options: CopyOptions,
}

impl GenerateRequest {
    pub fn validate(self) -> Result<GenerateJob, AppError> {
        let name = non_empty(self.name);
        let url = non_empty(self.url);
        let (Some(name), Some(url)) = (name, url) else {
            return Err(AppError::InvalidRequest("name and url are required".to_string()));
        };
        Ok(GenerateJob {
            name,
            url,
            must_words: normalize_must_words(self.must_words.as_ref()),
            options: CopyOptions {
                tone: Tone::parse(self.tone.as_deref().unwrap_or_default()),
                range: CharRange::new(self.min_chars, self.max_chars)?,
                reference_examples: normalize_reference_examples(self.reference_examples.as_ref()),
                revision_notes: normalize_revision_notes(self.revision_notes.as_ref()),
                beautify: self.beautify.unwrap_or(true),
            },
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub min_chars: Option<usize>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub max_chars: Option<usize>,
    #[serde(default)]
    pub reference_examples: Option<StringOrList>,
    #[serde(default)]
    pub revision_notes: Option<StringOrList>,
    #[serde(default)]
    pub beautify: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ReviewJob {
    pub text: String,
    pub options: CopyOptions,
}

impl ReviewRequest {
    pub fn validate(self) -> Result<ReviewJob, AppError> {
        let text = non_empty(self.text)
            .ok_or_else(|| AppError::InvalidRequest("text is required".to_string()))?;
        Ok(ReviewJob {
            text,
            options: CopyOptions {
                tone: Tone::parse(self.tone.as_deref().unwrap_or_default()),
                range: CharRange::new(self.min_chars, self.max_chars)?,
                reference_examples: normalize_reference_examples(self.reference_examples.as_ref()),
                revision_notes: normalize_revision_notes(self.revision_notes.as_ref()),
                beautify: self.beautify.unwrap_or(true),
            },
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviseRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub min_chars: Option<usize>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub max_chars: Option<usize>,
    #[serde(default)]
    pub revision_notes: Option<StringOrList>,
}

#[derive(Debug, Clone)]
pub struct ReviseJob {
    pub text: String,
    pub tone: Tone,
    pub range: CharRange,
    pub revision_notes: Vec<String>,
}

impl ReviseRequest {
    pub fn validate(self) -> Result<ReviseJob, AppError> {
        let text = non_empty(self.text)
            .ok_or_else(|| AppError::InvalidRequest("text is required".to_string()))?;
        Ok(ReviseJob {
            text,
            tone: Tone::parse(self.tone.as_deref().unwrap_or_default()),
            range: CharRange::new(self.min_chars, self.max_chars)?,
            revision_notes: normalize_revision_notes(self.revision_notes.as_ref()),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Every stage of the document, returned for caller inspection.
#[derive(Debug, Clone, Serialize)]
pub struct CopyResponse {
    pub text: String,
    pub draft: String,
    pub checked: String,
    #[serde(rename = "final")]
    pub final_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviseResponse {
    pub text: String,
}
