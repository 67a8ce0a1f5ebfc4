//! Response sanitizer: raw model output to user-facing text.
//!
//! A [`Sanitizer`] is an ordered list of [`SanitizeStep`]s, each a pure
//! `text -> text` transformation with its own tests:
//!
//! | # | Step | Effect |
//! |---|------|--------|
//! | 1 | [`StripThroughLastMarker`] | drop everything up to and including the last terminal marker |
//! | 2 | [`StripEchoPrefixes`] | drop known instruction echoes at the start (case-insensitive) |
//! | 3 | [`TruncateAtEcho`] | cut at the first echoed prompt section marker |
//! | 4 | [`CollapseWhitespace`] | single spaces, trimmed |
//! | 5 | [`NormalizePunctuation`] | no space before `. , ; ? !`, one space after when followed by a letter or digit |
//! | 6 | [`RemoveArtifacts`] | remove `**` and dangling reference fragments, then tidy again |
//!
//! [`Sanitizer::sanitize`] repeats the steps until the text stops changing.
//! Every step that changes the text either removes non-whitespace
//! characters or only rearranges whitespace, so the repetition terminates,
//! and the result is a fixed point: sanitizing it again returns it
//! unchanged. Nothing here can fail.

use std::sync::OnceLock;

use regex::Regex;

use crate::prompt::{
    topic_echo_prefixes, PromptTemplate, ANSWER_MARKER, CONTEXT_MARKER, CONVERSATION_MARKER,
    QUESTION_MARKER, TOPICS_MARKER,
};

/// One named text transformation.
pub trait SanitizeStep: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, text: &str) -> String;
}

pub struct StripThroughLastMarker {
    marker: String,
}

impl StripThroughLastMarker {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl SanitizeStep for StripThroughLastMarker {
    fn name(&self) -> &'static str {
        "strip_through_last_marker"
    }

    fn apply(&self, text: &str) -> String {
        if self.marker.is_empty() {
            return text.to_string();
        }
        match text.rfind(&self.marker) {
            Some(pos) => text[pos + self.marker.len()..].to_string(),
            None => text.to_string(),
        }
    }
}

pub struct StripEchoPrefixes {
    /// Longest first, so a full heading wins over its own opening words.
    prefixes: Vec<String>,
}

impl StripEchoPrefixes {
    pub fn new(prefixes: impl IntoIterator<Item = String>) -> Self {
        let mut prefixes: Vec<String> = prefixes
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        prefixes.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
        prefixes.dedup();
        Self { prefixes }
    }
}

impl SanitizeStep for StripEchoPrefixes {
    fn name(&self) -> &'static str {
        "strip_echo_prefixes"
    }

    fn apply(&self, text: &str) -> String {
        let mut rest = text.trim_start();
        'outer: loop {
            for prefix in &self.prefixes {
                if let Some(stripped) = strip_prefix_ignore_case(rest, prefix) {
                    rest = stripped.trim_start();
                    continue 'outer;
                }
            }
            break;
        }
        rest.to_string()
    }
}

/// `text` without `prefix`, comparing lowercase forms per character.
fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut chars = text.char_indices();
    for p in prefix.chars() {
        let (_, c) = chars.next()?;
        if !c.to_lowercase().eq(p.to_lowercase()) {
            return None;
        }
    }
    let offset = chars.next().map(|(i, _)| i).unwrap_or(text.len());
    Some(&text[offset..])
}

pub struct TruncateAtEcho {
    markers: Vec<String>,
}

impl TruncateAtEcho {
    pub fn new(markers: impl IntoIterator<Item = String>) -> Self {
        Self {
            markers: markers.into_iter().filter(|m| !m.is_empty()).collect(),
        }
    }
}

impl SanitizeStep for TruncateAtEcho {
    fn name(&self) -> &'static str {
        "truncate_at_echo"
    }

    fn apply(&self, text: &str) -> String {
        let cut = self.markers.iter().filter_map(|m| text.find(m.as_str())).min();
        match cut {
            Some(pos) => text[..pos].to_string(),
            None => text.to_string(),
        }
    }
}

pub struct CollapseWhitespace;

impl SanitizeStep for CollapseWhitespace {
    fn name(&self) -> &'static str {
        "collapse_whitespace"
    }

    fn apply(&self, text: &str) -> String {
        collapse_whitespace(text)
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct NormalizePunctuation;

impl SanitizeStep for NormalizePunctuation {
    fn name(&self) -> &'static str {
        "normalize_punctuation"
    }

    fn apply(&self, text: &str) -> String {
        normalize_punctuation(text)
    }
}

fn space_before_punct() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+([.,;?!])").expect("valid regex"))
}

fn punct_then_alnum() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([.,;?!])\s*([\p{L}\p{N}])").expect("valid regex"))
}

fn dangling_reference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\S*/[a-zA-Z]\.alt(/[a-zA-Z]\.alt)*l?").expect("valid regex"))
}

fn normalize_punctuation(text: &str) -> String {
    let tight = space_before_punct().replace_all(text, "$1");
    punct_then_alnum().replace_all(&tight, "$1 $2").into_owned()
}

pub struct RemoveArtifacts;

impl SanitizeStep for RemoveArtifacts {
    fn name(&self) -> &'static str {
        "remove_artifacts"
    }

    fn apply(&self, text: &str) -> String {
        let without_emphasis = text.replace("**", "");
        let without_refs = dangling_reference().replace_all(&without_emphasis, "");
        normalize_punctuation(&collapse_whitespace(&without_refs))
    }
}

/// Ordered sanitization pipeline.
pub struct Sanitizer {
    steps: Vec<Box<dyn SanitizeStep>>,
}

impl Sanitizer {
    pub fn new(steps: Vec<Box<dyn SanitizeStep>>) -> Self {
        Self { steps }
    }

    /// Sanitizer for answers produced from `template`'s QA prompt.
    pub fn for_answers(template: &PromptTemplate) -> Self {
        Self::new(vec![
            Box::new(StripThroughLastMarker::new(ANSWER_MARKER)),
            Box::new(StripEchoPrefixes::new(template.echo_prefixes())),
            Box::new(TruncateAtEcho::new([
                CONTEXT_MARKER.to_string(),
                QUESTION_MARKER.to_string(),
            ])),
            Box::new(CollapseWhitespace),
            Box::new(NormalizePunctuation),
            Box::new(RemoveArtifacts),
        ])
    }

    /// Sanitizer for topic lists produced from the topic prompt.
    pub fn for_topics() -> Self {
        Self::new(vec![
            Box::new(StripThroughLastMarker::new(TOPICS_MARKER)),
            Box::new(StripEchoPrefixes::new(topic_echo_prefixes())),
            Box::new(TruncateAtEcho::new([CONVERSATION_MARKER.to_string()])),
            Box::new(CollapseWhitespace),
            Box::new(NormalizePunctuation),
            Box::new(RemoveArtifacts),
        ])
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step once, in order.
    pub fn apply_once(&self, text: &str) -> String {
        self.steps
            .iter()
            .fold(text.to_string(), |acc, step| step.apply(&acc))
    }

    /// Run the steps until the text is stable.
    pub fn sanitize(&self, raw: &str) -> String {
        // a pass either removes a non-whitespace character or only retidies,
        // and two retidy passes in a row are a fixed point
        let max_passes = 2 * raw.chars().count() + 4;
        let mut current = self.apply_once(raw);
        for _ in 0..max_passes {
            let next = self.apply_once(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }
}
