//! Provider-specific URL and authentication differences.

/// Known Chat Completions hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// `OpenAI` (api.openai.com)
    OpenAI,
    /// Azure `OpenAI` Service
    AzureOpenAI {
        deployment_name: String,
        api_version: String,
    },
    /// Any other OpenAI-compatible endpoint (Ollama, GitHub Models, Docker Model Runner, ...).
    Generic,
}

const DEFAULT_AZURE_API_VERSION: &str = "2024-08-01-preview";

impl Provider {
    /// Detect provider from base URL.
    #[must_use]
    pub fn detect(base_url: &str, deployment: Option<&str>, api_version: Option<&str>) -> Self {
        let lower = base_url.to_lowercase();

        if lower.contains("openai.azure.com") || lower.contains("azure.com") {
            Self::AzureOpenAI {
                deployment_name: deployment.unwrap_or_default().to_string(),
                api_version: api_version.unwrap_or(DEFAULT_AZURE_API_VERSION).to_string(),
            }
        } else if lower.contains("openai.com") {
            Self::OpenAI
        } else {
            Self::Generic
        }
    }

    /// Chat completions URL for this provider.
    #[must_use]
    pub fn chat_url(&self, base_url: &str, model: &str) -> String {
        let base = base_url.trim_end_matches('/');

        match self {
            Self::AzureOpenAI {
                deployment_name,
                api_version,
            } => {
                let deployment = if deployment_name.is_empty() {
                    model
                } else {
                    deployment_name
                };
                format!(
                    "{base}/openai/deployments/{deployment}/chat/completions?api-version={api_version}"
                )
            }
            _ if base.ends_with("/v1") => format!("{base}/chat/completions"),
            _ => format!("{base}/v1/chat/completions"),
        }
    }

    /// Azure takes the key in an `api-key` header instead of a bearer token.
    #[must_use]
    pub fn uses_api_key_header(&self) -> bool {
        matches!(self, Self::AzureOpenAI { .. })
    }
}
