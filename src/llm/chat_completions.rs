//! OpenAI-compatible Chat Completions provider.
//!
//! Streams `/v1/chat/completions` and turns the SSE frames into
//! [`DecisionDelta`]s: text immediately, tool calls once fully assembled.

use std::collections::BTreeMap;

use futures::StreamExt;

use super::{
    DecisionDelta, DecisionProvider, DecisionRequest, DecisionStream, HANDOFF_FUNCTION,
    LlmSettings, Provider, ToolCallRequest,
};
use crate::error::ProviderError;

/// Accumulated state for a streaming tool call.
#[derive(Debug, Default)]
struct ToolAccum {
    id: Option<String>,
    name: Option<String>,
    args: String,
}

#[derive(Clone)]
pub struct ChatCompletionsProvider {
    http: reqwest::Client,
    settings: LlmSettings,
    provider: Provider,
}

impl std::fmt::Debug for ChatCompletionsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsProvider")
            .field("settings", &self.settings)
            .field("provider", &self.provider)
            .finish()
    }
}

impl ChatCompletionsProvider {
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        let provider = Provider::detect(
            &settings.base_url,
            settings.azure_deployment.as_deref(),
            settings.azure_api_version.as_deref(),
        );
        Self {
            http: reqwest::Client::new(),
            settings,
            provider,
        }
    }

    fn request_body(&self, req: &DecisionRequest) -> serde_json::Value {
        let mut tools: Vec<serde_json::Value> = req
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters
                    }
                })
            })
            .collect();

        if !req.handoff_targets.is_empty() {
            tools.push(handoff_tool(&req.handoff_targets));
        }

        let mut body = serde_json::json!({
            "model": self.settings.model,
            "stream": true,
            "messages": req.messages,
        });
        if !tools.is_empty() {
            body["tools"] = serde_json::Value::Array(tools);
        }
        body
    }
}

fn handoff_tool(targets: &[String]) -> serde_json::Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": HANDOFF_FUNCTION,
            "description": "Hand the request over to a more suitable agent.",
            "parameters": {
                "type": "object",
                "properties": {
                    "agent": { "type": "string", "enum": targets },
                    "reason": { "type": "string" }
                },
                "required": ["agent"]
            }
        }
    })
}

/// Turn an assembled tool call into a delta, recognising hand-offs.
fn finish_tool_call(acc: ToolAccum) -> Option<DecisionDelta> {
    let name = acc.name?;
    let arguments: serde_json::Value = if acc.args.trim().is_empty() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_str(&acc.args)
            .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()))
    };

    if name == HANDOFF_FUNCTION {
        let agent = arguments.get("agent")?.as_str()?.to_string();
        let reason = arguments
            .get("reason")
            .and_then(|r| r.as_str())
            .map(ToString::to_string);
        return Some(DecisionDelta::Handoff { agent, reason });
    }

    let id = acc
        .id
        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
    Some(DecisionDelta::ToolCall(ToolCallRequest {
        id,
        name,
        arguments,
    }))
}

/// Apply one `data:` payload to the accumulators, returning any text delta.
fn apply_chunk(
    v: &serde_json::Value,
    tool_accum: &mut BTreeMap<usize, ToolAccum>,
) -> Option<String> {
    let delta = &v["choices"][0]["delta"];

    if let Some(arr) = delta.get("tool_calls").and_then(|x| x.as_array()) {
        for tc in arr {
            let idx = tc.get("index").and_then(serde_json::Value::as_u64).unwrap_or(0) as usize;
            let entry = tool_accum.entry(idx).or_default();
            if entry.id.is_none() {
                entry.id = tc.get("id").and_then(|x| x.as_str()).map(ToString::to_string);
            }
            let function = tc.get("function");
            if entry.name.is_none() {
                entry.name = function
                    .and_then(|f| f.get("name"))
                    .and_then(|x| x.as_str())
                    .map(ToString::to_string);
            }
            if let Some(ad) = function
                .and_then(|f| f.get("arguments"))
                .and_then(|x| x.as_str())
            {
                entry.args.push_str(ad);
            }
        }
    }

    delta
        .get("content")
        .and_then(|x| x.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

#[async_trait::async_trait]
impl DecisionProvider for ChatCompletionsProvider {
    fn name(&self) -> &str {
        &self.settings.model
    }

    async fn stream(&self, req: DecisionRequest) -> Result<DecisionStream, ProviderError> {
        let url = self.provider.chat_url(&self.settings.base_url, &self.settings.model);
        let body = self.request_body(&req);

        tracing::debug!(
            correlation_id = %req.correlation_id,
            agent = %req.agent,
            message_count = req.messages.len(),
            tool_count = req.tools.len(),
            "Sending request to decision provider"
        );

        let mut rb = self.http.post(&url).json(&body);
        if let Some(k) = &self.settings.api_key {
            rb = if self.provider.uses_api_key_header() {
                rb.header("api-key", k)
            } else {
                rb.bearer_auth(k)
            };
        }

        let resp = rb
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        let byte_stream = resp.bytes_stream();

        let out = async_stream::try_stream! {
            let mut buf = Vec::<u8>::new();
            let mut tool_accum: BTreeMap<usize, ToolAccum> = BTreeMap::new();

            futures::pin_mut!(byte_stream);
            'read: while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk.map_err(|e| ProviderError::Request(e.to_string()))?;
                buf.extend_from_slice(&chunk);

                while let Some(pos) = find_double_newline(&buf) {
                    let frame = buf.drain(..pos + 2).collect::<Vec<_>>();
                    let text = String::from_utf8_lossy(&frame);

                    for line in text.lines() {
                        let line = line.trim();
                        if !line.starts_with("data:") {
                            continue;
                        }
                        let data = line.trim_start_matches("data:").trim();
                        if data == "[DONE]" {
                            break 'read;
                        }

                        let v: serde_json::Value = serde_json::from_str(data)
                            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
                        if let Some(text) = apply_chunk(&v, &mut tool_accum) {
                            yield DecisionDelta::Text(text);
                        }
                    }
                }
            }

            for acc in std::mem::take(&mut tool_accum).into_values() {
                if let Some(delta) = finish_tool_call(acc) {
                    yield delta;
                }
            }
            yield DecisionDelta::Done;
        };

        Ok(Box::pin(out))
    }
}

/// Find the position of a double newline in the buffer.
fn find_double_newline(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}
