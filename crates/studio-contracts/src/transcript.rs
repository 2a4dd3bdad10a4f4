const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";
const ANSWER_OPEN: &str = "<answer>";
const ANSWER_CLOSE: &str = "</answer>";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThinkingSplit {
    pub thinking: String,
    pub answer: String,
}

/// Splits an analysis response into its reasoning and its answer.
///
/// - the first `<think>…</think>` pair is the thinking segment and is cut
///   out of the answer; an unterminated `<think>` (still streaming) makes
///   everything after it thinking
/// - the first `<answer>…</answer>` pair is the answer; without one, stray
///   answer tags are stripped from the residue
pub fn split_thinking(text: &str) -> ThinkingSplit {
    let mut thinking = String::new();
    let mut residue = text.to_string();

    if let Some(open) = text.find(THINK_OPEN) {
        let body_start = open + THINK_OPEN.len();
        match text[body_start..].find(THINK_CLOSE) {
            Some(close_offset) => {
                let body_end = body_start + close_offset;
                thinking = text[body_start..body_end].trim().to_string();
                residue = format!(
                    "{}{}",
                    &text[..open],
                    &text[body_end + THINK_CLOSE.len()..]
                );
            }
            None => {
                return ThinkingSplit {
                    thinking: text[body_start..].trim().to_string(),
                    answer: text[..open].trim().to_string(),
                };
            }
        }
    }

    let residue = residue.trim();
    let answer = match extract_answer_block(residue) {
        Some(inner) => inner.trim().to_string(),
        None => residue
            .replace(ANSWER_OPEN, "")
            .replace(ANSWER_CLOSE, "")
            .trim()
            .to_string(),
    };
    ThinkingSplit { thinking, answer }
}

fn extract_answer_block(text: &str) -> Option<&str> {
    let open = text.find(ANSWER_OPEN)?;
    let body_start = open + ANSWER_OPEN.len();
    let close = text[body_start..].find(ANSWER_CLOSE)?;
    Some(&text[body_start..body_start + close])
}

/// Accumulated `TXT` deltas of one analysis session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    text: String,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_delta(&mut self, delta: &str) -> ThinkingSplit {
        self.text.push_str(delta);
        self.text.push('\n');
        self.split()
    }

    pub fn split(&self) -> ThinkingSplit {
        split_thinking(&self.text)
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}
