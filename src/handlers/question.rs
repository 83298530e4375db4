//! Question content: `multiple-choice` and `true-false`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::text::paragraphs;
use super::{optional_str, require_str, ContentHandler, ProcessContext};
use crate::domain::{ContentFragment, ContentNode, LibraryIdentifier};
use crate::error::{FieldError, Result};

pub fn multi_choice_library() -> LibraryIdentifier {
    LibraryIdentifier::new("H5P.MultiChoice", 1, 16)
}

/// One answer option
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Answer {
    pub text: String,
    #[serde(default)]
    pub correct: bool,
}

/// Check an answer list: at least two options, at least one correct
pub fn check_answers(answers: &[Answer]) -> std::result::Result<(), FieldError> {
    if answers.len() < 2 {
        return Err(FieldError::new("answers", "must list at least 2 options"));
    }
    if let Some(i) = answers.iter().position(|a| a.text.trim().is_empty()) {
        return Err(FieldError::new(
            format!("answers[{}].text", i),
            "must be a non-empty string",
        ));
    }
    if !answers.iter().any(|a| a.correct) {
        return Err(FieldError::new("answers", "must mark at least one option correct"));
    }
    Ok(())
}

fn parse_answers(value: Option<&Value>) -> std::result::Result<Vec<Answer>, FieldError> {
    let items = value
        .and_then(Value::as_array)
        .ok_or_else(|| FieldError::new("answers", "must be a list of {text, correct} entries"))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let text = item
                .get("text")
                .and_then(Value::as_str)
                .ok_or_else(|| FieldError::new(format!("answers[{}].text", i), "must be a string"))?;
            let correct = match item.get("correct") {
                None => false,
                Some(v) => v.as_bool().ok_or_else(|| {
                    FieldError::new(format!("answers[{}].correct", i), "must be true or false")
                })?,
            };
            Ok(Answer {
                text: text.to_string(),
                correct,
            })
        })
        .collect()
}

/// MultiChoice fragment for a question and its answers
pub fn multi_choice_fragment(
    ctx: &mut ProcessContext,
    title: &str,
    question: &str,
    answers: &[Answer],
) -> ContentFragment {
    let answer_type = if answers.iter().filter(|a| a.correct).count() == 1 {
        "single"
    } else {
        "multi"
    };
    let answers: Vec<Value> = answers
        .iter()
        .map(|a| {
            json!({
                "text": format!("<div>{}</div>", super::text::escape_html(a.text.trim())),
                "correct": a.correct,
                "tipsAndFeedback": { "tip": "", "chosenFeedback": "", "notChosenFeedback": "" },
            })
        })
        .collect();

    ContentFragment {
        library: multi_choice_library(),
        params: json!({
            "question": paragraphs(question),
            "answers": answers,
            "behaviour": {
                "enableRetry": true,
                "enableSolutionsButton": true,
                "singlePoint": false,
                "randomAnswers": true,
                "showSolutionsRequiresInput": true,
                "type": answer_type,
            },
        }),
        title: title.to_string(),
        content_type: "Multiple Choice".to_string(),
        sub_content_id: ctx.next_sub_content_id(),
    }
}

/// Multiple-choice question with author-supplied answers
pub struct MultipleChoiceHandler;

#[async_trait]
impl ContentHandler for MultipleChoiceHandler {
    fn type_tag(&self) -> &str {
        "multiple-choice"
    }

    fn validate(&self, node: &ContentNode) -> std::result::Result<(), FieldError> {
        require_str(node, "question")?;
        optional_str(node, "title")?;
        check_answers(&parse_answers(node.field("answers"))?)
    }

    async fn process(&self, ctx: &mut ProcessContext, node: &ContentNode) -> Result<()> {
        let question = node.str_field("question").unwrap_or_default();
        let title = node.str_field("title").unwrap_or(question);
        let answers = parse_answers(node.field("answers")).unwrap_or_default();

        let fragment = multi_choice_fragment(ctx, title, question, &answers);
        ctx.emit(fragment);
        Ok(())
    }

    fn main_library(&self) -> LibraryIdentifier {
        multi_choice_library()
    }
}

/// True/false statement
pub struct TrueFalseHandler;

#[async_trait]
impl ContentHandler for TrueFalseHandler {
    fn type_tag(&self) -> &str {
        "true-false"
    }

    fn validate(&self, node: &ContentNode) -> std::result::Result<(), FieldError> {
        require_str(node, "question")?;
        optional_str(node, "title")?;
        match node.field("correct") {
            Some(Value::Bool(_)) => Ok(()),
            _ => Err(FieldError::new("correct", "must be true or false")),
        }
    }

    async fn process(&self, ctx: &mut ProcessContext, node: &ContentNode) -> Result<()> {
        let question = node.str_field("question").unwrap_or_default();
        let title = node.str_field("title").unwrap_or(question);
        let correct = node
            .field("correct")
            .and_then(Value::as_bool)
            .unwrap_or_default();

        let fragment = ContentFragment {
            library: self.main_library(),
            params: json!({
                "question": paragraphs(question),
                // TrueFalse stores the answer as a string
                "correct": correct.to_string(),
                "behaviour": {
                    "enableRetry": true,
                    "enableSolutionsButton": true,
                    "enableCheckButton": true,
                },
            }),
            title: title.to_string(),
            content_type: "True/False Question".to_string(),
            sub_content_id: ctx.next_sub_content_id(),
        };
        ctx.emit(fragment);
        Ok(())
    }

    fn main_library(&self) -> LibraryIdentifier {
        LibraryIdentifier::new("H5P.TrueFalse", 1, 8)
    }
}
