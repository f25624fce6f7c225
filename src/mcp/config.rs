use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use url::Url;

/// How a tool server is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// Plain JSON over HTTP: `GET {url}/tools`, `POST {url}/call`.
    #[serde(rename = "http")]
    Http,
    /// MCP streamable HTTP (`tools/list`, `tools/call` over JSON-RPC).
    #[serde(rename = "http+streaming", alias = "streamable-http")]
    HttpStreaming,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::HttpStreaming => "http+streaming",
        }
    }
}

/// A configured remote tool server. Immutable once loaded.
#[derive(Clone, Serialize, Deserialize)]
pub struct ToolServerDefinition {
    pub id: String,
    #[serde(rename = "name", alias = "display_name")]
    pub display_name: String,
    #[serde(rename = "url", alias = "base_url")]
    pub base_url: String,
    #[serde(rename = "type", alias = "transport", default = "default_transport")]
    pub transport: TransportKind,
    #[serde(default, skip_serializing)]
    pub credential: Option<String>,
}

fn default_transport() -> TransportKind {
    TransportKind::Http
}

// Keep the credential OUT of logs.
impl std::fmt::Debug for ToolServerDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolServerDefinition")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("base_url", &self.base_url)
            .field("transport", &self.transport)
            .field("has_credential", &self.credential.is_some())
            .finish()
    }
}

impl ToolServerDefinition {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, transport: TransportKind) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            base_url: base_url.into(),
            transport,
            credential: None,
        }
    }

    #[must_use]
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Expand `${VAR}` placeholders in the URL and credential from `vars`.
    #[must_use]
    pub fn expanded(mut self, vars: &HashMap<String, String>) -> Self {
        self.base_url = expand_placeholders(&self.base_url, vars);
        self.credential = self
            .credential
            .map(|c| expand_placeholders(&c, vars))
            .filter(|c| !c.trim().is_empty());
        self
    }
}

/// Read-only set of tool servers, shared across all requests without locking.
#[derive(Debug, Clone, Default)]
pub struct ToolServerRegistry {
    servers: Arc<Vec<ToolServerDefinition>>,
}

impl ToolServerRegistry {
    /// Build a registry, rejecting duplicate ids.
    pub fn new(servers: Vec<ToolServerDefinition>) -> anyhow::Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for s in &servers {
            if s.id.trim().is_empty() {
                anyhow::bail!("tool server with url '{}' has an empty id", s.base_url);
            }
            if !seen.insert(s.id.as_str()) {
                anyhow::bail!("duplicate tool server id '{}'", s.id);
            }
            let url = Url::parse(&s.base_url)
                .with_context(|| format!("tool server '{}' has an invalid url", s.id))?;
            anyhow::ensure!(
                matches!(url.scheme(), "http" | "https"),
                "tool server '{}' must use http or https, got '{}'",
                s.id,
                url.scheme()
            );
        }
        Ok(Self {
            servers: Arc::new(servers),
        })
    }

    pub fn all(&self) -> &[ToolServerDefinition] {
        &self.servers
    }

    pub fn get(&self, id: &str) -> Option<&ToolServerDefinition> {
        self.servers.iter().find(|s| s.id == id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.servers.iter().map(|s| s.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Servers named in `allow`, in allow-list order. `None` selects every server.
    /// Unknown ids are skipped.
    pub fn select(&self, allow: Option<&[String]>) -> Vec<ToolServerDefinition> {
        match allow {
            None => self.servers.to_vec(),
            Some(ids) => {
                let mut picked: Vec<ToolServerDefinition> = Vec::new();
                for id in ids {
                    if picked.iter().any(|s| &s.id == id) {
                        continue;
                    }
                    match self.get(id) {
                        Some(s) => picked.push(s.clone()),
                        None => tracing::warn!(server_id = %id, "Unknown tool server in allow-list"),
                    }
                }
                picked
            }
        }
    }
}

/// Expand "${VAR}" placeholders from `vars` in a single left-to-right pass.
/// Substituted values are not expanded again. Missing variables leave the
/// placeholder unchanged.
pub fn expand_placeholders(input: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_wire_names() {
        let def: ToolServerDefinition = serde_json::from_str(
            r#"{"id":"echo","name":"Echo","url":"http://localhost:5007","type":"http+streaming"}"#,
        )
        .unwrap();
        assert_eq!(def.transport, TransportKind::HttpStreaming);
        assert_eq!(def.display_name, "Echo");

        let def: ToolServerDefinition =
            serde_json::from_str(r#"{"id":"echo","name":"Echo","url":"http://x"}"#).unwrap();
        assert_eq!(def.transport, TransportKind::Http);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let a = ToolServerDefinition::new("echo", "http://a", TransportKind::Http);
        let b = ToolServerDefinition::new("echo", "http://b", TransportKind::Http);
        assert!(ToolServerRegistry::new(vec![a, b]).is_err());
    }

    #[test]
    fn test_select_keeps_allow_list_order_and_skips_unknown() {
        let reg = ToolServerRegistry::new(vec![
            ToolServerDefinition::new("a", "http://a", TransportKind::Http),
            ToolServerDefinition::new("b", "http://b", TransportKind::Http),
        ])
        .unwrap();
        let allow = vec!["b".to_string(), "zzz".to_string(), "a".to_string()];
        let ids: Vec<_> = reg.select(Some(&allow)).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(reg.select(None).len(), 2);
    }

    #[test]
    fn test_registry_rejects_bad_urls() {
        let relative = ToolServerDefinition::new("a", "/tools", TransportKind::Http);
        assert!(ToolServerRegistry::new(vec![relative]).is_err());

        let ws = ToolServerDefinition::new("b", "ws://host:1", TransportKind::Http);
        let err = ToolServerRegistry::new(vec![ws]).unwrap_err();
        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn test_expanded_values_are_not_rescanned() {
        let vars = HashMap::from([
            ("OUTER".to_string(), "${INNER}".to_string()),
            ("INNER".to_string(), "leak".to_string()),
        ]);
        for _ in 0..16 {
            assert_eq!(expand_placeholders("a/${OUTER}/${INNER}", &vars), "a/${INNER}/leak");
        }
        assert_eq!(expand_placeholders("x${UNSET}y", &vars), "x${UNSET}y");
        assert_eq!(expand_placeholders("open ${INNER", &vars), "open ${INNER");
    }

    #[test]
    fn test_expand_placeholders() {
        let vars = HashMap::from([("ECHO_TOKEN".to_string(), "s3cret".to_string())]);
        let def = ToolServerDefinition::new("echo", "http://${ECHO_HOST}/mcp", TransportKind::Http)
            .with_credential("${ECHO_TOKEN}")
            .expanded(&vars);
        assert_eq!(def.credential.as_deref(), Some("s3cret"));
        assert_eq!(def.base_url, "http://${ECHO_HOST}/mcp");
        assert!(!format!("{def:?}").contains("s3cret"));
    }
}
