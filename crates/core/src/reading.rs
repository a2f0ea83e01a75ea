//! Prompts and response parsing for the reading-recommendation workflow.

use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

pub const TOPIC_DELIMITER: char = ',';
pub const EXPECTED_TOPIC_COUNT: usize = 5;

const SUMMARY_TEMPLATE: &str = "summary";
const TOPICS_TEMPLATE: &str = "topics";
const RECOMMENDATIONS_TEMPLATE: &str = "recommendations";

const SUMMARY_SOURCE: &str = "Rewrite the following message in plain, simple language for \
{{ reader.display_name }}{% if reader.title %} ({{ reader.title }}){% endif %}. \
Keep the meaning, drop the jargon, and stay under five sentences.\n\nMessage:\n{{ text }}";

const TOPICS_SOURCE: &str = "List exactly {{ count }} short technical topics a reader would \
need to study to fully understand the message below. Reply with one line of topic names \
separated by commas and nothing else.\n\nMessage:\n{{ text }}";

const RECOMMENDATIONS_SOURCE: &str = "Recommend reading material for each of these topics: \
{{ topics }}. For every topic give one or two items (official documentation, articles or \
books) with a one-line reason to read it.";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReaderProfile {
    pub display_name: String,
    pub title: Option<String>,
}

impl ReaderProfile {
    pub fn anonymous() -> Self {
        Self { display_name: "a teammate".to_owned(), title: None }
    }
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template `{name}` failed to render: {source}")]
    Render { name: &'static str, source: tera::Error },
}

pub struct PromptTemplates {
    tera: Tera,
}

impl PromptTemplates {
    pub fn new() -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.autoescape_on(Vec::new());
        for (name, source) in [
            (SUMMARY_TEMPLATE, SUMMARY_SOURCE),
            (TOPICS_TEMPLATE, TOPICS_SOURCE),
            (RECOMMENDATIONS_TEMPLATE, RECOMMENDATIONS_SOURCE),
        ] {
            tera.add_raw_template(name, source)
                .map_err(|source| PromptError::Render { name, source })?;
        }
        Ok(Self { tera })
    }

    pub fn summary(&self, text: &str, reader: &ReaderProfile) -> Result<String, PromptError> {
        let mut context = Context::new();
        context.insert("text", text);
        context.insert("reader", reader);
        self.render(SUMMARY_TEMPLATE, &context)
    }

    pub fn topics(&self, text: &str) -> Result<String, PromptError> {
        let mut context = Context::new();
        context.insert("text", text);
        context.insert("count", &EXPECTED_TOPIC_COUNT);
        self.render(TOPICS_TEMPLATE, &context)
    }

    pub fn recommendations(&self, selected_topics: &[String]) -> Result<String, PromptError> {
        let mut context = Context::new();
        context.insert("topics", &join_topics(selected_topics));
        self.render(RECOMMENDATIONS_TEMPLATE, &context)
    }

    fn render(&self, name: &'static str, context: &Context) -> Result<String, PromptError> {
        self.tera.render(name, context).map_err(|source| PromptError::Render { name, source })
    }
}

/// Splits a model response into checkbox options.
///
/// Each comma-separated item is trimmed and kept as-is: no dedup, no cap, and an
/// empty response yields a single empty option.
pub fn parse_topics(response: &str) -> Vec<String> {
    response.split(TOPIC_DELIMITER).map(|topic| topic.trim().to_owned()).collect()
}

pub fn join_topics(topics: &[String]) -> String {
    topics.join(", ")
}
