//! Request routing.
//!
//! Routing is a pure function of the request text and the roster. The
//! keyword policy evaluates its rules in order and the first match wins; when
//! nothing matches, the fallback agent is chosen so a decision is never empty
//! while at least one agent exists.

use serde::{Deserialize, Serialize};

use super::AgentRoster;
use crate::error::RoutingFailure;

/// Outcome of routing one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    /// Agents to run, in order. Never empty.
    pub agents: Vec<String>,
    pub reason: String,
    /// Index of the matching rule, `None` for the fallback.
    pub rule: Option<usize>,
}

/// Pluggable routing policy. Implementations must not perform I/O.
pub trait RoutingPolicy: Send + Sync + std::fmt::Debug {
    fn route(&self, message: &str, roster: &AgentRoster) -> Result<RoutingDecision, RoutingFailure>;
}

/// `keywords` matched case-insensitively as substrings; any one suffices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub keywords: Vec<String>,
    pub agents: Vec<String>,
}

impl RoutingRule {
    pub fn new<K, A>(keywords: K, agents: A) -> Self
    where
        K: IntoIterator,
        K::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            agents: agents.into_iter().map(Into::into).collect(),
        }
    }

    fn matched_keyword(&self, lowered: &str) -> Option<&str> {
        self.keywords
            .iter()
            .find(|k| !k.is_empty() && lowered.contains(&k.to_lowercase()))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct KeywordRouter {
    rules: Vec<RoutingRule>,
    fallback_agent: String,
}

impl KeywordRouter {
    pub fn new(rules: Vec<RoutingRule>, fallback_agent: impl Into<String>) -> Self {
        Self {
            rules,
            fallback_agent: fallback_agent.into(),
        }
    }

    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }
}

impl RoutingPolicy for KeywordRouter {
    fn route(&self, message: &str, roster: &AgentRoster) -> Result<RoutingDecision, RoutingFailure> {
        let lowered = message.to_lowercase();

        for (idx, rule) in self.rules.iter().enumerate() {
            if rule.agents.is_empty() || !rule.agents.iter().all(|a| roster.contains(a)) {
                continue;
            }
            if let Some(keyword) = rule.matched_keyword(&lowered) {
                return Ok(RoutingDecision {
                    agents: rule.agents.clone(),
                    reason: format!("matched keyword '{keyword}'"),
                    rule: Some(idx),
                });
            }
        }

        let fallback = if roster.contains(&self.fallback_agent) {
            self.fallback_agent.clone()
        } else {
            roster
                .first()
                .map(|a| a.name.clone())
                .ok_or(RoutingFailure::NoAgentAvailable)?
        };

        Ok(RoutingDecision {
            agents: vec![fallback],
            reason: "no rule matched, using fallback agent".to_string(),
            rule: None,
        })
    }
}
