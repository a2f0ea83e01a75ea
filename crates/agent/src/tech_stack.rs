use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::tools::{Capability, Tool, ToolError};

/// Static category → description table answering "what do we use for X?".
pub struct TechStackTool {
    entries: BTreeMap<String, String>,
}

impl TechStackTool {
    /// Uses `overrides` when non-empty, otherwise the built-in table.
    pub fn new(overrides: &BTreeMap<String, String>) -> Self {
        if overrides.is_empty() {
            return Self { entries: default_stack() };
        }
        let entries = overrides
            .iter()
            .map(|(category, description)| (category.to_ascii_lowercase(), description.clone()))
            .collect();
        Self { entries }
    }

    pub fn lookup(&self, query: &str) -> String {
        let query = query.trim().to_ascii_lowercase();
        if query.is_empty() || query == "all" {
            return self.render(self.entries.iter());
        }

        let matches: Vec<_> = self
            .entries
            .iter()
            .filter(|(category, description)| {
                category.contains(&query)
                    || query.contains(category.as_str())
                    || description.to_ascii_lowercase().contains(&query)
            })
            .collect();

        if matches.is_empty() {
            let known = self.entries.keys().map(String::as_str).collect::<Vec<_>>().join(", ");
            return format!("No tech stack entry matches `{query}`. Known categories: {known}.");
        }

        self.render(matches.into_iter())
    }

    fn render<'a>(&self, entries: impl Iterator<Item = (&'a String, &'a String)>) -> String {
        entries
            .map(|(category, description)| format!("{category}: {description}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn default_stack() -> BTreeMap<String, String> {
    [
        ("frontend", "React with TypeScript, built with Vite"),
        ("backend", "Python services on FastAPI and Rust workers on Tokio"),
        ("database", "PostgreSQL for transactional data, Redis for caching"),
        ("infrastructure", "Docker images deployed to Kubernetes on AWS"),
        ("ci", "GitHub Actions running tests and container builds"),
        ("messaging", "Slack for team chat and bot integrations"),
        ("observability", "Grafana dashboards over Prometheus metrics"),
    ]
    .into_iter()
    .map(|(category, description)| (category.to_owned(), description.to_owned()))
    .collect()
}

#[async_trait]
impl Tool for TechStackTool {
    fn capability(&self) -> Capability {
        Capability::TechStack
    }

    async fn run(&self, input: &str) -> Result<String, ToolError> {
        Ok(self.lookup(input))
    }
}
