use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

/// The closed set of things the agent may do besides answering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    WebSearch,
    TechStack,
    DocsQuery,
}

impl Capability {
    pub const ALL: [Capability; 3] = [Self::WebSearch, Self::TechStack, Self::DocsQuery];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebSearch => "web_search",
            Self::TechStack => "tech_stack",
            Self::DocsQuery => "docs_query",
        }
    }

    pub fn parse(action: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|capability| capability.as_str() == action.trim())
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::WebSearch => "search the web for current information; input is a search query",
            Self::TechStack => {
                "look up the technologies this team uses; input is a category such as \
                 frontend or database, or `all`"
            }
            Self::DocsQuery => {
                "search the team's documentation pages; input is a question or keywords"
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool input is empty")]
    EmptyInput,
    #[error("tool transport failed: {0}")]
    Transport(String),
    #[error("tool backend returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("tool response could not be decoded: {0}")]
    Decode(String),
    #[error("could not read `{path}`: {message}")]
    Io { path: String, message: String },
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn capability(&self) -> Capability;
    async fn run(&self, input: &str) -> Result<String, ToolError>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<Capability, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.capability(), Box::new(tool));
    }

    pub fn get(&self, capability: Capability) -> Option<&dyn Tool> {
        self.tools.get(&capability).map(Box::as_ref)
    }

    pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.tools.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
