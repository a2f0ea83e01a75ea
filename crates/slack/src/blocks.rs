use serde::Serialize;

pub const BUTTON_CLICK_ACTION_ID: &str = "button_click";
pub const TOPICS_BLOCK_ID: &str = "reading.topics.v1";
pub const TOPICS_ACTION_ID: &str = "reading.topics.select.v1";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain { text: String },
    #[serde(rename = "mrkdwn")]
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Plain { text } | Self::Mrkdwn { text } => text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OptionObject {
    pub text: TextObject,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputElement {
    Checkboxes { action_id: String, options: Vec<OptionObject> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Context { block_id: String, elements: Vec<TextObject> },
    Input { block_id: String, label: TextObject, element: InputElement },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

impl MessageTemplate {
    /// A message carrying only fallback text, rendered by Slack as-is.
    pub fn text(text: impl Into<String>) -> Self {
        Self { fallback_text: text.into(), blocks: Vec::new(), thread_ts: None }
    }

    pub fn in_thread(mut self, thread_ts: impl Into<String>) -> Self {
        self.thread_ts = Some(thread_ts.into());
        self
    }
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        self.blocks.push(section_block(block_id, build));
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks, thread_ts: None }
    }
}

fn section_block<F>(block_id: impl Into<String>, build: F) -> Block
where
    F: FnOnce(&mut SectionBuilder),
{
    let mut builder = SectionBuilder::default();
    build(&mut builder);
    Block::Section { block_id: block_id.into(), text: builder.build() }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

/// Modal payload for `views.open` / `views.update`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "modal")]
pub struct ModalView {
    pub title: TextObject,
    pub blocks: Vec<Block>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submit: Option<TextObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close: Option<TextObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_metadata: Option<String>,
}

pub struct ModalBuilder {
    view: ModalView,
}

impl ModalBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            view: ModalView {
                title: TextObject::plain(title),
                blocks: Vec::new(),
                submit: None,
                close: None,
                callback_id: None,
                private_metadata: None,
            },
        }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        self.view.blocks.push(section_block(block_id, build));
        self
    }

    pub fn checkboxes(
        mut self,
        block_id: impl Into<String>,
        action_id: impl Into<String>,
        label: impl Into<String>,
        values: &[String],
    ) -> Self {
        let options = values
            .iter()
            .map(|value| OptionObject { text: TextObject::plain(value.as_str()), value: value.clone() })
            .collect();
        self.view.blocks.push(Block::Input {
            block_id: block_id.into(),
            label: TextObject::plain(label),
            element: InputElement::Checkboxes { action_id: action_id.into(), options },
        });
        self
    }

    pub fn submit(mut self, label: impl Into<String>) -> Self {
        self.view.submit = Some(TextObject::plain(label));
        self
    }

    pub fn close(mut self, label: impl Into<String>) -> Self {
        self.view.close = Some(TextObject::plain(label));
        self
    }

    pub fn callback_id(mut self, callback_id: impl Into<String>) -> Self {
        self.view.callback_id = Some(callback_id.into());
        self
    }

    pub fn private_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.view.private_metadata = Some(metadata.into());
        self
    }

    pub fn build(self) -> ModalView {
        self.view
    }
}

pub fn button_clicked_message(user_id: &str) -> MessageTemplate {
    MessageTemplate::text(format!("<@{user_id}> clicked the button"))
}

pub fn mention_usage_message() -> MessageTemplate {
    MessageBuilder::new("Mention me followed by a question, for example: @briefly what is a pod?")
        .section("mention.usage.v1", |section| {
            section.mrkdwn(
                "Mention me followed by a question, for example: `@briefly what is a pod?`",
            );
        })
        .build()
}

pub fn loading_modal() -> ModalView {
    ModalBuilder::new("Reading list")
        .section("reading.loading.v1", |section| {
            section.plain("Loading...");
        })
        .close("Cancel")
        .build()
}

pub fn topic_selection_modal(
    callback_id: &str,
    workflow_id: &str,
    summary: &str,
    topics: &[String],
) -> ModalView {
    ModalBuilder::new("Reading list")
        .section("reading.summary.v1", |section| {
            section.mrkdwn(format!("*In plain words*\n{summary}"));
        })
        .checkboxes(TOPICS_BLOCK_ID, TOPICS_ACTION_ID, "Pick topics to read up on", topics)
        .submit("Get recommendations")
        .close("Cancel")
        .callback_id(callback_id)
        .private_metadata(workflow_id)
        .build()
}

pub fn processing_modal() -> ModalView {
    ModalBuilder::new("Reading list")
        .section("reading.processing.v1", |section| {
            section.plain("Processing...");
        })
        .close("Close")
        .build()
}

pub fn completed_modal() -> ModalView {
    ModalBuilder::new("Reading list")
        .section("reading.completed.v1", |section| {
            section.plain("Completed. Your reading recommendations were sent as a direct message.");
        })
        .close("Done")
        .build()
}

pub fn error_modal(user_message: &str, correlation_id: &str) -> ModalView {
    ModalBuilder::new("Reading list")
        .section("reading.error.v1", |section| {
            section.mrkdwn(format!("*Error*\n{user_message}"));
        })
        .section("reading.error.reference.v1", |section| {
            section.mrkdwn(format!("Reference: `{correlation_id}`"));
        })
        .close("Close")
        .build()
}

pub fn original_message_dm(text: &str) -> MessageTemplate {
    MessageBuilder::new(format!("Original message: {text}"))
        .section("reading.dm.original.v1", |section| {
            section.mrkdwn(format!("*Original message*\n{text}"));
        })
        .build()
}

pub fn summary_dm(summary: &str) -> MessageTemplate {
    MessageBuilder::new(format!("Summary: {summary}"))
        .section("reading.dm.summary.v1", |section| {
            section.mrkdwn(format!("*Summary*\n{summary}"));
        })
        .build()
}

pub fn recommendations_dm(topics: &str, recommendations: &str) -> MessageTemplate {
    MessageBuilder::new(format!("Reading recommendations: {recommendations}"))
        .section("reading.dm.recommendations.v1", |section| {
            section.mrkdwn(format!("*Reading recommendations*\n{recommendations}"));
        })
        .context("reading.dm.topics.v1", |context| {
            context.mrkdwn(format!("Topics: {topics}"));
        })
        .build()
}
