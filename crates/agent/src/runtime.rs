use async_trait::async_trait;
use briefly_core::gateway::{ensure_prompt, CompletionError, CompletionGateway};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::tools::{Capability, ToolError, ToolRegistry};

pub const DEFAULT_MAX_STEPS: u32 = 4;

/// Gateway decorator that lets the model call tools before answering.
///
/// Each step asks the inner gateway for a JSON decision. The loop ends on a
/// `final` decision, on any reply that is not a decision, or when `max_steps`
/// is spent, in which case one last prompt asks for an answer from the
/// observations gathered so far.
pub struct ToolAgent<G> {
    gateway: G,
    tools: ToolRegistry,
    max_steps: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Step {
    action: String,
    input: String,
    observation: String,
}

#[derive(Debug, PartialEq, Eq)]
enum Decision {
    Final(String),
    Act { action: String, input: String },
}

#[derive(Deserialize)]
struct RawDecision {
    action: String,
    #[serde(default)]
    input: Option<String>,
    #[serde(default)]
    answer: Option<String>,
}

impl<G> ToolAgent<G>
where
    G: CompletionGateway,
{
    pub fn new(gateway: G, tools: ToolRegistry, max_steps: u32) -> Self {
        Self { gateway, tools, max_steps: max_steps.max(1) }
    }

    async fn observe(&self, action: &str, input: &str) -> Result<String, CompletionError> {
        let Some(capability) = Capability::parse(action) else {
            return Ok(format!("Tool `{action}` is unavailable."));
        };
        let Some(tool) = self.tools.get(capability) else {
            return Ok(format!("Tool `{action}` is unavailable."));
        };

        match tool.run(input).await {
            Ok(observation) => Ok(observation),
            Err(ToolError::EmptyInput) => Ok(format!("Tool `{action}` requires a non-empty input.")),
            Err(error) => {
                warn!(
                    event_name = "agent.tool.failed",
                    capability = capability.as_str(),
                    error = %error,
                    "tool call failed"
                );
                Err(CompletionError::Tool(error.to_string()))
            }
        }
    }

    fn decision_prompt(&self, question: &str, steps: &[Step]) -> String {
        let mut prompt = String::from(
            "Answer the request below. You may use one tool per reply before answering.\n\n",
        );

        let mut offered = self.tools.capabilities().peekable();
        if offered.peek().is_none() {
            prompt.push_str("No tools are available.\n");
        } else {
            prompt.push_str("Tools:\n");
            for capability in offered {
                prompt.push_str(&format!("- {}: {}\n", capability.as_str(), capability.description()));
            }
        }

        prompt.push_str(
            "\nReply with JSON only. To use a tool: {\"action\": \"<tool>\", \"input\": \"<text>\"}. \
             To answer: {\"action\": \"final\", \"answer\": \"<text>\"}.\n",
        );
        push_transcript(&mut prompt, steps);
        prompt.push_str(&format!("\nRequest:\n{question}"));
        prompt
    }

    fn answer_now_prompt(&self, question: &str, steps: &[Step]) -> String {
        let mut prompt = String::from(
            "No more tools may be used. Answer the request using the observations below. \
             Reply with the answer text only.\n",
        );
        push_transcript(&mut prompt, steps);
        prompt.push_str(&format!("\nRequest:\n{question}"));
        prompt
    }
}

#[async_trait]
impl<G> CompletionGateway for ToolAgent<G>
where
    G: CompletionGateway,
{
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let question = ensure_prompt(prompt)?;
        let mut steps = Vec::new();

        for step in 1..=self.max_steps {
            let reply = self.gateway.complete(&self.decision_prompt(question, &steps)).await?;

            match parse_decision(&reply) {
                None => {
                    debug!(event_name = "agent.loop.plain_reply", step, "reply was not a decision");
                    return Ok(reply.trim().to_owned());
                }
                Some(Decision::Final(answer)) => {
                    info!(event_name = "agent.loop.completed", step, "agent answered");
                    return Ok(answer);
                }
                Some(Decision::Act { action, input }) => {
                    info!(
                        event_name = "agent.tool.selected",
                        step,
                        action = %action,
                        "agent selected tool"
                    );
                    let observation = self.observe(&action, &input).await?;
                    steps.push(Step { action, input, observation });
                }
            }
        }

        info!(
            event_name = "agent.loop.exhausted",
            max_steps = self.max_steps,
            "step budget spent; requesting final answer"
        );
        self.gateway.complete(&self.answer_now_prompt(question, &steps)).await
    }

    fn describe(&self) -> &'static str {
        "tool_agent"
    }
}

fn push_transcript(prompt: &mut String, steps: &[Step]) {
    if steps.is_empty() {
        return;
    }
    prompt.push_str("\nObservations so far:\n");
    for step in steps {
        prompt.push_str(&format!(
            "- {}({}) returned:\n{}\n",
            step.action, step.input, step.observation
        ));
    }
}

fn parse_decision(reply: &str) -> Option<Decision> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }

    let raw: RawDecision = serde_json::from_str(&reply[start..=end]).ok()?;
    let action = raw.action.trim().to_owned();
    if action == "final" {
        return raw.answer.map(Decision::Final);
    }
    Some(Decision::Act { action, input: raw.input.unwrap_or_default() })
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use briefly_core::gateway::{CompletionError, CompletionGateway};

    use super::{parse_decision, Decision, ToolAgent};
    use crate::retrieval::{DocsQueryTool, DocumentIndex};
    use crate::tech_stack::TechStackTool;
    use crate::tools::{Capability, Tool, ToolError, ToolRegistry};

    #[derive(Default)]
    struct ScriptedGateway {
        replies: Mutex<VecDeque<Result<String, CompletionError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGateway {
        fn with(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|reply| Ok((*reply).to_owned())).collect()),
                prompts: Mutex::default(),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().expect("prompts lock").clone()
        }
    }

    #[async_trait]
    impl CompletionGateway for ScriptedGateway {
        async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
            self.prompts.lock().expect("prompts lock").push(prompt.to_owned());
            self.replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .unwrap_or_else(|| Err(CompletionError::Transport("script exhausted".to_owned())))
        }
    }

    #[async_trait]
    impl CompletionGateway for &ScriptedGateway {
        async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
            (**self).complete(prompt).await
        }
    }

    struct FailingSearch;

    #[async_trait]
    impl Tool for FailingSearch {
        fn capability(&self) -> Capability {
            Capability::WebSearch
        }

        async fn run(&self, _input: &str) -> Result<String, ToolError> {
            Err(ToolError::Transport("connection reset".to_owned()))
        }
    }

    fn tech_stack_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::default();
        registry.register(TechStackTool::new(&BTreeMap::new()));
        registry
    }

    #[test]
    fn decisions_are_extracted_from_fenced_json() {
        assert_eq!(
            parse_decision("```json\n{\"action\": \"tech_stack\", \"input\": \"database\"}\n```"),
            Some(Decision::Act { action: "tech_stack".to_owned(), input: "database".to_owned() })
        );
        assert_eq!(
            parse_decision("{\"action\": \"final\", \"answer\": \"done\"}"),
            Some(Decision::Final("done".to_owned()))
        );
        assert_eq!(parse_decision("Just plain text."), None);
    }

    #[tokio::test]
    async fn tool_observation_is_fed_into_next_step() {
        let gateway = ScriptedGateway::with(&[
            r#"{"action": "tech_stack", "input": "database"}"#,
            r#"{"action": "final", "answer": "We use PostgreSQL."}"#,
        ]);
        let agent = ToolAgent::new(&gateway, tech_stack_registry(), 4);

        let answer = agent.complete("Which database do we use?").await.expect("answer");

        assert_eq!(answer, "We use PostgreSQL.");
        let prompts = gateway.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("- tech_stack:"));
        assert!(!prompts[0].contains("- web_search:"));
        assert!(prompts[1].contains("database: PostgreSQL for transactional data"));
        assert!(prompts[1].ends_with("Which database do we use?"));
    }

    #[tokio::test]
    async fn plain_reply_is_returned_as_final_answer() {
        let gateway = ScriptedGateway::with(&["  Kubernetes orchestrates containers.  "]);
        let agent = ToolAgent::new(&gateway, ToolRegistry::default(), 4);

        let answer = agent.complete("What is Kubernetes?").await.expect("answer");
        assert_eq!(answer, "Kubernetes orchestrates containers.");
        assert!(gateway.prompts()[0].contains("No tools are available."));
    }

    #[tokio::test]
    async fn unregistered_capability_yields_unavailable_observation() {
        let gateway = ScriptedGateway::with(&[
            r#"{"action": "web_search", "input": "rust news"}"#,
            r#"{"action": "final", "answer": "I could not search."}"#,
        ]);
        let agent = ToolAgent::new(&gateway, tech_stack_registry(), 4);

        assert_eq!(agent.complete("news?").await.expect("answer"), "I could not search.");
        assert!(gateway.prompts()[1].contains("Tool `web_search` is unavailable."));
    }

    #[tokio::test]
    async fn exhausted_budget_asks_for_answer_now() {
        let gateway = ScriptedGateway::with(&[
            r#"{"action": "tech_stack", "input": "frontend"}"#,
            r#"{"action": "tech_stack", "input": "backend"}"#,
            "React frontend, FastAPI backend.",
        ]);
        let agent = ToolAgent::new(&gateway, tech_stack_registry(), 2);

        let answer = agent.complete("Describe our stack").await.expect("answer");

        assert_eq!(answer, "React frontend, FastAPI backend.");
        let prompts = gateway.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[2].starts_with("No more tools may be used."));
        assert!(prompts[2].contains("tech_stack(backend) returned"));
    }

    #[tokio::test]
    async fn tool_transport_failure_propagates_as_tool_error() {
        let gateway = ScriptedGateway::with(&[r#"{"action": "web_search", "input": "q"}"#]);
        let mut registry = ToolRegistry::default();
        registry.register(FailingSearch);
        let agent = ToolAgent::new(&gateway, registry, 4);

        let error = agent.complete("search something").await.expect_err("should fail");
        assert_eq!(error.kind(), "tool");
    }

    #[tokio::test]
    async fn gateway_failure_propagates_unchanged() {
        let gateway = ScriptedGateway::default();
        gateway
            .replies
            .lock()
            .expect("replies lock")
            .push_back(Err(CompletionError::RateLimited { retry_after_secs: None }));
        let mut registry = ToolRegistry::default();
        registry.register(DocsQueryTool::new(
            std::sync::Arc::new(DocumentIndex::from_documents([("a.md", "tokio")])),
            3,
        ));
        let agent = ToolAgent::new(&gateway, registry, 4);

        assert_eq!(
            agent.complete("anything").await,
            Err(CompletionError::RateLimited { retry_after_secs: None })
        );
    }
}
