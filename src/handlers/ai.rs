//! AI-generated content: `ai-text` and `ai-multiple-choice`.
//!
//! Generation failures never abort a compile. When the generator errors,
//! returns nothing, or returns something unparseable, the handler emits a
//! clearly labelled fragment of its own library carrying the prompt so an
//! author can finish it by hand.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::question::{check_answers, multi_choice_fragment, multi_choice_library, Answer};
use super::text::{advanced_text_library, escape_html, paragraphs, text_fragment};
use super::{optional_str, require_str, ContentHandler, ProcessContext};
use crate::domain::{ContentFragment, ContentNode, LibraryIdentifier};
use crate::error::{FieldError, Result};

/// Prefix marking content that generation failed to produce
pub const FALLBACK_MARKER: &str = "[AI generation failed]";

const DEFAULT_ANSWER_COUNT: u64 = 4;
const ANSWER_COUNT_RANGE: std::ops::RangeInclusive<u64> = 2..=6;

fn log_fallback(ctx: &ProcessContext, reason: &str) {
    warn!(
        path = %ctx.path(),
        generator = ctx.generator_name(),
        error = %reason,
        "AI generation failed, inserting fallback content"
    );
}

fn fallback_html(prompt: &str) -> String {
    format!(
        "<p>{} Write this content by hand.</p><p>Prompt: {}</p>",
        FALLBACK_MARKER,
        escape_html(prompt)
    )
}

/// Labelled text placeholder emitted in place of generated text
fn fallback_fragment(
    ctx: &mut ProcessContext,
    title: &str,
    prompt: &str,
    reason: &str,
) -> ContentFragment {
    log_fallback(ctx, reason);
    text_fragment(ctx, &format!("{} {}", FALLBACK_MARKER, title), fallback_html(prompt))
}

/// Labelled MultiChoice placeholder with two answers for the author to replace
fn fallback_question(
    ctx: &mut ProcessContext,
    title: &str,
    prompt: &str,
    reason: &str,
) -> ContentFragment {
    log_fallback(ctx, reason);
    let answers = [
        Answer {
            text: "Correct answer".to_string(),
            correct: true,
        },
        Answer {
            text: "Wrong answer".to_string(),
            correct: false,
        },
    ];
    let mut fragment = multi_choice_fragment(
        ctx,
        &format!("{} {}", FALLBACK_MARKER, title),
        "",
        &answers,
    );
    fragment.params["question"] = Value::String(fallback_html(prompt));
    fragment
}

/// Free text written by the generator
pub struct AiTextHandler;

#[async_trait]
impl ContentHandler for AiTextHandler {
    fn type_tag(&self) -> &str {
        "ai-text"
    }

    fn validate(&self, node: &ContentNode) -> std::result::Result<(), FieldError> {
        require_str(node, "prompt")?;
        optional_str(node, "title")?;
        Ok(())
    }

    async fn process(&self, ctx: &mut ProcessContext, node: &ContentNode) -> Result<()> {
        let prompt = node.str_field("prompt").unwrap_or_default();
        let title = node.str_field("title").unwrap_or("Generated text");

        let fragment = match ctx.generate(prompt).await {
            Ok(text) if !text.trim().is_empty() => {
                debug!(path = %ctx.path(), chars = text.len(), "Generated text");
                text_fragment(ctx, title, paragraphs(&text))
            }
            Ok(_) => fallback_fragment(ctx, title, prompt, "generator returned no text"),
            Err(err) => fallback_fragment(ctx, title, prompt, &format!("{:#}", err)),
        };
        ctx.emit(fragment);
        Ok(())
    }

    fn main_library(&self) -> LibraryIdentifier {
        advanced_text_library()
    }
}

/// Question shape requested from the generator
#[derive(Debug, Deserialize)]
struct GeneratedQuestion {
    question: String,
    answers: Vec<Answer>,
}

/// Pull the first JSON object out of generator output and check it
fn parse_generated_question(raw: &str) -> std::result::Result<GeneratedQuestion, String> {
    let start = raw.find('{').ok_or("output contains no JSON object")?;
    let end = raw.rfind('}').ok_or("output contains no JSON object")?;
    if end < start {
        return Err("output contains no JSON object".to_string());
    }

    let parsed: GeneratedQuestion = serde_json::from_str(&raw[start..=end])
        .map_err(|e| format!("output is not a question object: {}", e))?;

    if parsed.question.trim().is_empty() {
        return Err("generated question is empty".to_string());
    }
    check_answers(&parsed.answers).map_err(|e| format!("generated {}", e))?;
    Ok(parsed)
}

/// Multiple-choice question written by the generator
pub struct AiMultipleChoiceHandler;

impl AiMultipleChoiceHandler {
    fn answer_count(node: &ContentNode) -> u64 {
        node.field("answers")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_ANSWER_COUNT)
    }

    fn request(prompt: &str, answers: u64) -> String {
        format!(
            "{}\n\nWrite one multiple-choice question with exactly {} answer options, \
             at least one of them correct. Respond with JSON only, in the form \
             {{\"question\": \"...\", \"answers\": [{{\"text\": \"...\", \"correct\": true}}]}}.",
            prompt.trim(),
            answers
        )
    }
}

#[async_trait]
impl ContentHandler for AiMultipleChoiceHandler {
    fn type_tag(&self) -> &str {
        "ai-multiple-choice"
    }

    fn validate(&self, node: &ContentNode) -> std::result::Result<(), FieldError> {
        require_str(node, "prompt")?;
        optional_str(node, "title")?;
        match node.field("answers") {
            None => Ok(()),
            Some(value) => match value.as_u64() {
                Some(n) if ANSWER_COUNT_RANGE.contains(&n) => Ok(()),
                _ => Err(FieldError::new(
                    "answers",
                    format!(
                        "must be a whole number from {} to {}",
                        ANSWER_COUNT_RANGE.start(),
                        ANSWER_COUNT_RANGE.end()
                    ),
                )),
            },
        }
    }

    async fn process(&self, ctx: &mut ProcessContext, node: &ContentNode) -> Result<()> {
        let prompt = node.str_field("prompt").unwrap_or_default();
        let request = Self::request(prompt, Self::answer_count(node));

        let generated = match ctx.generate(&request).await {
            Ok(raw) => parse_generated_question(&raw),
            Err(err) => Err(format!("{:#}", err)),
        };

        let fragment = match generated {
            Ok(q) => {
                let title = node.str_field("title").unwrap_or(&q.question);
                multi_choice_fragment(ctx, title, &q.question, &q.answers)
            }
            Err(reason) => {
                let title = node.str_field("title").unwrap_or("Generated question");
                fallback_question(ctx, title, prompt, &reason)
            }
        };
        ctx.emit(fragment);
        Ok(())
    }

    fn main_library(&self) -> LibraryIdentifier {
        multi_choice_library()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::adapters::{DisabledGenerator, Generator};
    use crate::domain::{Document, GenerationConfig};

    /// Generator returning a canned reply and echoing prompts into it
    struct CannedGenerator(String);

    #[async_trait]
    impl Generator for CannedGenerator {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String> {
            Ok(self
                .0
                .replace("{system}", system_prompt)
                .replace("{user}", user_prompt))
        }
    }

    fn context(generator: Arc<dyn Generator>) -> ProcessContext {
        let doc = Document::new("AI course");
        let mut ctx = ProcessContext::new(&doc, generator, reqwest::Client::new());
        ctx.begin_node("content[0]", None);
        ctx
    }

    #[test]
    fn test_ai_multiple_choice_validation() {
        let handler = AiMultipleChoiceHandler;
        let node = ContentNode::new("ai-multiple-choice").with_field("prompt", "Planets");
        assert!(handler.validate(&node).is_ok());
        assert!(handler.validate(&node.clone().with_field("answers", 6)).is_ok());

        let err = handler
            .validate(&node.clone().with_field("answers", 7))
            .unwrap_err();
        assert_eq!(err.field, "answers");

        let err = handler
            .validate(&ContentNode::new("ai-multiple-choice"))
            .unwrap_err();
        assert_eq!(err.field, "prompt");
    }

    #[tokio::test]
    async fn test_ai_text_uses_prompt_settings() {
        let mut ctx = context(Arc::new(CannedGenerator("{system}|{user}".into())));
        let node_generation = GenerationConfig {
            system_prompt: Some("Be terse.".into()),
            instructions: Some("One line.".into()),
        };
        ctx.begin_node("content[0]", Some(&node_generation));

        let node = ContentNode::new("ai-text").with_field("prompt", "Explain tides");
        AiTextHandler.process(&mut ctx, &node).await.unwrap();

        let fragment = ctx.finish_node().0.unwrap();
        let text = fragment.params["text"].as_str().unwrap();
        assert!(text.contains("Be terse.|Explain tides"));
        assert!(text.contains("One line."));
        assert!(!text.contains(FALLBACK_MARKER));
    }

    #[tokio::test]
    async fn test_ai_text_falls_back_on_failure() {
        let mut ctx = context(Arc::new(DisabledGenerator));
        let node = ContentNode::new("ai-text")
            .with_field("prompt", "Explain <tides>")
            .with_field("title", "Tides");
        AiTextHandler.process(&mut ctx, &node).await.unwrap();

        let fragment = ctx.finish_node().0.unwrap();
        let text = fragment.params["text"].as_str().unwrap();
        assert!(text.starts_with(&format!("<p>{}", FALLBACK_MARKER)));
        assert!(text.contains("Explain &lt;tides&gt;"));
        assert_eq!(fragment.title, "[AI generation failed] Tides");
        assert_eq!(fragment.library, advanced_text_library());
    }

    #[tokio::test]
    async fn test_ai_multiple_choice_parses_json_reply() {
        let reply = json!({
            "question": "Largest planet?",
            "answers": [
                {"text": "Jupiter", "correct": true},
                {"text": "Mars", "correct": false}
            ]
        });
        let mut ctx = context(Arc::new(CannedGenerator(format!(
            "Sure! Here it is:\n```json\n{}\n```",
            reply
        ))));

        let node = ContentNode::new("ai-multiple-choice").with_field("prompt", "Planets");
        AiMultipleChoiceHandler.process(&mut ctx, &node).await.unwrap();

        let fragment = ctx.finish_node().0.unwrap();
        assert_eq!(fragment.library, multi_choice_library());
        assert_eq!(fragment.title, "Largest planet?");
        assert_eq!(fragment.params["answers"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_ai_multiple_choice_falls_back_on_bad_reply() {
        let mut ctx = context(Arc::new(CannedGenerator(
            r#"{"question": "Largest planet?", "answers": [{"text": "Jupiter"}]}"#.into(),
        )));

        let node = ContentNode::new("ai-multiple-choice").with_field("prompt", "Planets");
        AiMultipleChoiceHandler.process(&mut ctx, &node).await.unwrap();

        let fragment = ctx.finish_node().0.unwrap();
        assert_eq!(fragment.library, multi_choice_library());
        assert_eq!(fragment.title, "[AI generation failed] Generated question");
        let question = fragment.params["question"].as_str().unwrap();
        assert!(question.starts_with(&format!("<p>{}", FALLBACK_MARKER)));
        assert!(question.contains("Prompt: Planets"));

        // Placeholder still satisfies MultiChoice: two options, one correct
        let answers = fragment.params["answers"].as_array().unwrap();
        assert_eq!(answers.len(), 2);
        assert_eq!(answers.iter().filter(|a| a["correct"] == true).count(), 1);
        assert_eq!(fragment.params["behaviour"]["type"], "single");
    }

    #[test]
    fn test_parse_generated_question_errors() {
        assert!(parse_generated_question("no json here").is_err());
        assert!(parse_generated_question("} backwards {").is_err());
        assert!(parse_generated_question(r#"{"question": "", "answers": []}"#).is_err());
    }
}
