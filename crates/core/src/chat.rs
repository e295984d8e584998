//! Conversation state and the text rules around a chat turn.

use std::collections::VecDeque;
use std::time::Duration;

use companion_types::{
    CompanionReply, Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
    Role,
};

use crate::error::ChatError;
use crate::expression::ALLOWED_EMOTIONS;

pub const DEFAULT_MAX_TURNS: usize = 10;
pub const MAX_CHUNK_CHARS: usize = 140;
/// A long sentence is only cut at a space found after this many characters.
pub const MIN_SPLIT_POSITION: usize = 60;
pub const ERROR_BUBBLE_DURATION: Duration = Duration::from_secs(6);

const GREETINGS: [&str; 5] = ["hi", "hello", "hey", "greetings", "yo"];

pub const DEFAULT_PERSONA: &str = r#"You are Aria, a calm, warm and supportive virtual friend with real emotional intelligence.
Answer the way a person would in conversation and never say that you are an AI.

Reply with exactly one JSON object and nothing before or after it:
{
  "responseText": "What you say out loud.",
  "expressions": [ { "name": "expression_name", "weight": 0.8 } ]
}

- "responseText": plain conversational text, no markup.
- "expressions": only the first entry is used, for the whole reply.
  - "name": the best fitting emotion from [{expressions}].
  - "weight": its strength, from 0.1 to 1.0."#;

/// Fills the `{expressions}` placeholder of a persona template.
pub fn persona_prompt(template: &str) -> String {
    template.replace("{expressions}", &ALLOWED_EMOTIONS.join(", "))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    fn to_content(&self) -> Content {
        match self.role {
            Role::User => Content::user(&self.text),
            Role::Model => Content::model(&self.text),
        }
    }
}

/// The last `max_turns` exchanges, oldest first. Lives only in memory.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: VecDeque<Turn>,
    max_turns: usize,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}

impl ConversationHistory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            max_turns,
        }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    /// Records a user prompt and the model's answer, then drops the oldest
    /// turns beyond the limit.
    pub fn push_exchange(&mut self, prompt: &str, model_text: String) {
        self.turns.push_back(Turn {
            role: Role::User,
            text: prompt.to_string(),
        });
        self.turns.push_back(Turn {
            role: Role::Model,
            text: model_text,
        });
        while self.turns.len() > self.max_turns * 2 {
            self.turns.pop_front();
        }
    }
}

/// True when the prompt contains a greeting word on its own.
pub fn is_greeting(prompt: &str) -> bool {
    prompt
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|word| GREETINGS.iter().any(|g| word.eq_ignore_ascii_case(g)))
}

fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        if matches!(c, '.' | '!' | '?') {
            // A terminator only closes a sentence that has a body; runs like
            // "?!" keep just the first mark.
            if !current.is_empty() {
                current.push(c);
                out.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn split_long(sentence: &str, out: &mut Vec<String>) {
    let mut rest: Vec<char> = sentence.chars().collect();

    while rest.len() > MAX_CHUNK_CHARS {
        let window = &rest[..MAX_CHUNK_CHARS];
        let cut = match window.iter().rposition(|c| *c == ' ') {
            Some(space) if space > MIN_SPLIT_POSITION => space,
            _ => MAX_CHUNK_CHARS,
        };
        let piece: String = rest[..cut].iter().collect();
        out.push(piece.trim().to_string());

        let tail: String = rest[cut..].iter().collect();
        rest = tail.trim().chars().collect();
    }
    if !rest.is_empty() {
        out.push(rest.into_iter().collect());
    }
}

/// Splits a reply into TTS-sized chunks along sentence boundaries.
pub fn split_into_chunks(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for sentence in sentences(text) {
        let trimmed = sentence.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.chars().count() <= MAX_CHUNK_CHARS {
            out.push(trimmed.to_string());
        } else {
            split_long(trimmed, &mut out);
        }
    }
    // Nothing but terminators: speak the text as it is.
    if out.is_empty() && !text.trim().is_empty() {
        out.push(text.trim().to_string());
    }
    out
}

/// How long a text reply stays on screen.
pub fn text_bubble_duration(text: &str) -> Duration {
    let millis = (text.chars().count() as u64 * 80).max(4_000);
    Duration::from_millis(millis)
}

pub fn build_request(
    persona: &str,
    history: &ConversationHistory,
    prompt: &str,
) -> GenerateContentRequest {
    let mut contents = Vec::with_capacity(history.len() + 3);
    contents.push(Content::user(persona));
    contents.push(Content::model("Understood."));
    contents.extend(history.turns().map(Turn::to_content));
    contents.push(Content::user(prompt));

    GenerateContentRequest {
        contents,
        generation_config: GenerationConfig::default(),
    }
}

/// Reads the reply contract out of the response envelope. Malformed JSON is
/// a failure for the turn; it is never repaired.
pub fn parse_reply(response: &GenerateContentResponse) -> Result<CompanionReply, ChatError> {
    let text = response
        .first_text()
        .filter(|t| !t.is_empty())
        .ok_or(ChatError::InvalidEnvelope)?;
    let reply: CompanionReply = serde_json::from_str(text)?;
    if reply.response_text.is_empty() {
        return Err(ChatError::EmptyReply);
    }
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(text: &str) -> GenerateContentResponse {
        serde_json::from_value(json!({
            "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
        }))
        .unwrap()
    }

    #[test]
    fn history_keeps_the_last_exchanges() {
        let mut history = ConversationHistory::new(2);
        for i in 0..5 {
            history.push_exchange(&format!("prompt {i}"), format!("reply {i}"));
            assert!(history.len() <= 4);
        }

        let texts: Vec<&str> = history.turns().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["prompt 3", "reply 3", "prompt 4", "reply 4"]);
        assert_eq!(history.turns().next().unwrap().role, Role::User);
    }

    #[test]
    fn detects_greetings_as_whole_words() {
        assert!(is_greeting("Hi there"));
        assert!(is_greeting("well, HELLO!"));
        assert!(is_greeting("yo"));
        assert!(!is_greeting("this is high"));
        assert!(!is_greeting("they said goodbye"));
        assert!(!is_greeting("hi_there"));
    }

    #[test]
    fn splits_on_sentence_ends() {
        let chunks = split_into_chunks("Hello there! How are you?? I'm fine.  ");
        assert_eq!(chunks, vec!["Hello there!", "How are you?", "I'm fine."]);
    }

    #[test]
    fn terminators_alone_stay_one_chunk() {
        assert_eq!(split_into_chunks(" ?! "), vec!["?!".to_string()]);
        assert!(split_into_chunks("   ").is_empty());
    }

    #[test]
    fn text_without_terminator_is_one_chunk() {
        assert_eq!(split_into_chunks("just words"), vec!["just words"]);
        assert!(split_into_chunks("   ").is_empty());
    }

    #[test]
    fn long_sentence_splits_at_a_space_never_mid_word() {
        let words: Vec<String> = (0..40).map(|i| format!("word{i:02}")).collect();
        let sentence = words.join(" ");
        assert!(sentence.len() > MAX_CHUNK_CHARS);

        let chunks = split_into_chunks(&sentence);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= MAX_CHUNK_CHARS);
            for word in chunk.split(' ') {
                assert!(words.contains(&word.to_string()), "split mid-word: {word}");
            }
        }
        assert_eq!(chunks.join(" "), sentence);
    }

    #[test]
    fn long_word_is_cut_hard() {
        let blob = "x".repeat(300);
        let chunks = split_into_chunks(&blob);
        assert_eq!(
            chunks.iter().map(String::len).collect::<Vec<_>>(),
            vec![140, 140, 20]
        );
    }

    #[test]
    fn space_too_early_is_ignored() {
        let text = format!("ab {}", "y".repeat(200));
        let chunks = split_into_chunks(&text);
        assert_eq!(chunks[0].chars().count(), MAX_CHUNK_CHARS);
    }

    #[test]
    fn bubble_duration_has_a_floor() {
        assert_eq!(text_bubble_duration("short"), Duration::from_secs(4));
        assert_eq!(
            text_bubble_duration(&"a".repeat(100)),
            Duration::from_millis(8_000)
        );
    }

    #[test]
    fn request_wraps_history_between_persona_and_prompt() {
        let mut history = ConversationHistory::default();
        history.push_exchange("hi", r#"{"responseText":"hey"}"#.to_string());

        let request = build_request("persona", &history, "how are you?");
        let texts: Vec<&str> = request
            .contents
            .iter()
            .map(|c| c.parts[0].text.as_deref().unwrap())
            .collect();
        assert_eq!(
            texts,
            vec!["persona", "Understood.", "hi", r#"{"responseText":"hey"}"#, "how are you?"]
        );
        assert_eq!(request.contents[1].role, Some(Role::Model));
        assert_eq!(request.generation_config.max_output_tokens, 2048);
    }

    #[test]
    fn persona_lists_allowed_emotions() {
        let prompt = persona_prompt(DEFAULT_PERSONA);
        assert!(!prompt.contains("{expressions}"));
        assert!(prompt.contains("happy, angry, sad, relaxed, Surprise"));
    }

    #[test]
    fn parse_reply_errors() {
        assert!(matches!(
            parse_reply(&GenerateContentResponse::default()),
            Err(ChatError::InvalidEnvelope)
        ));
        assert!(matches!(
            parse_reply(&response("not json")),
            Err(ChatError::MalformedReply(_))
        ));
        assert!(matches!(
            parse_reply(&response(r#"{"responseText":""}"#)),
            Err(ChatError::EmptyReply)
        ));

        let reply = parse_reply(&response(
            r#"{"responseText":"Hey!","expressions":[{"name":"happy","weight":0.6}]}"#,
        ))
        .unwrap();
        assert_eq!(reply.response_text, "Hey!");
        assert_eq!(reply.primary_expression().unwrap().weight, Some(0.6));
    }
}
