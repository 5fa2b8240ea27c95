use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{AppConfig, LlmConfig};
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::provider::{LlmProvider, PlanningModel};
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::{CallConfig, ChatMessage, PlanTextResponse};

/// Engine roles that can be mapped to a provider+model in config.toml.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Planning,
    Vision,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Planning => "planning",
            Role::Vision => "vision",
        }
    }
}

/// Registry of all available LLM providers, keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    active: String,
    /// Kept for role-to-model lookups (does not need to be mutable after init).
    llm_config: LlmConfig,
}

impl ProviderRegistry {
    pub fn new(active: String) -> Self {
        Self {
            providers: HashMap::new(),
            active,
            llm_config: LlmConfig::default(),
        }
    }

    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn get_active(&self) -> DeskPilotResult<Arc<dyn LlmProvider>> {
        self.providers
            .get(&self.active)
            .cloned()
            .ok_or_else(|| DeskPilotError::Config(format!("Active provider '{}' not found in registry", self.active)))
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Return the provider and call configuration for an engine role.
    ///
    /// Role resolution order:
    /// 1. `[llm.roles.<role>]` in config.toml
    /// 2. Fallback: active provider with its default model / temperature, no streaming
    pub fn call_config_for_role(&self, role: Role) -> DeskPilotResult<(Arc<dyn LlmProvider>, CallConfig)> {
        let role_entry = match role {
            Role::Planning => self.llm_config.roles.planning.as_ref(),
            Role::Vision => self.llm_config.roles.vision.as_ref(),
        };

        if let Some(entry) = role_entry {
            let provider = self.providers.get(&entry.provider).cloned().ok_or_else(|| {
                DeskPilotError::Config(format!(
                    "Role '{}' references unknown provider '{}'",
                    role.as_str(),
                    entry.provider
                ))
            })?;
            let temperature = entry.temperature.unwrap_or_else(|| {
                self.llm_config
                    .providers
                    .get(&entry.provider)
                    .map(|p| p.temperature)
                    .unwrap_or(0.1)
            });
            tracing::debug!(
                role = role.as_str(),
                provider = %entry.provider,
                model = %entry.model,
                stream = entry.stream,
                temperature = temperature,
                "resolved role config"
            );
            return Ok((
                provider,
                CallConfig {
                    model: entry.model.clone(),
                    stream: entry.stream,
                    temperature,
                },
            ));
        }

        let provider = self.get_active()?;
        let entry = self.llm_config.providers.get(&self.active);
        let (model, temperature) = entry
            .map(|p| (p.model.clone(), p.temperature))
            .unwrap_or_else(|| (String::new(), 0.1));
        tracing::debug!(
            role = role.as_str(),
            provider = %self.active,
            model = %model,
            "role not configured, using active provider fallback"
        );
        Ok((provider, CallConfig { model, stream: false, temperature }))
    }

    /// Build a registry from the loaded app config.
    /// API keys are read from environment variables named `DESKPILOT_<ID>_API_KEY`.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self {
            providers: HashMap::new(),
            active: config.llm.active_provider.clone(),
            llm_config: config.llm.clone(),
        };
        for (id, entry) in &config.llm.providers {
            let api_key = std::env::var(format!("DESKPILOT_{}_API_KEY", id.to_uppercase()))
                .unwrap_or_else(|_| entry.api_key.clone().unwrap_or_default());
            let timeout = Duration::from_secs(entry.request_timeout_secs.max(1));
            match OpenAiCompatibleProvider::new(id.clone(), entry.api_base.clone(), api_key, timeout) {
                Ok(provider) => registry.register(Arc::new(provider)),
                Err(e) => tracing::error!(provider = %id, error = %e, "failed to build LLM client, provider skipped"),
            }
        }
        registry
    }
}

const PLANNER_SYSTEM_PROMPT: &str = "\
You are the planning component of a desktop automation engine. \
You translate a user's intent into a JSON action plan. \
Respond with a single JSON object and nothing else.";

/// [`PlanningModel`] backed by the registry's `planning` role.
pub struct RolePlanningModel {
    registry: Arc<ProviderRegistry>,
}

impl RolePlanningModel {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl PlanningModel for RolePlanningModel {
    async fn plan_text(&self, prompt: &str) -> PlanTextResponse {
        let (provider, cfg) = match self.registry.call_config_for_role(Role::Planning) {
            Ok(v) => v,
            Err(e) => return PlanTextResponse::failed(e.to_string()),
        };
        let messages = vec![ChatMessage::system(PLANNER_SYSTEM_PROMPT), ChatMessage::user(prompt)];
        match provider.chat(messages, &cfg).await {
            Ok(response) => PlanTextResponse::ok(response.content),
            Err(e) => {
                tracing::warn!(error = %e, provider = provider.name(), "planning model call failed");
                PlanTextResponse::failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderEntry, RoleEntry};
    use crate::llm::types::LlmResponse;

    struct EchoProvider;

    #[async_trait]
    impl LlmProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> DeskPilotResult<LlmResponse> {
            Ok(LlmResponse {
                content: format!("{}:{}", cfg.model, messages.len()),
                reasoning: String::new(),
            })
        }
    }

    fn config_with_roles() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.llm.active_provider = "echo".into();
        cfg.llm.providers.insert(
            "echo".into(),
            ProviderEntry {
                display_name: "Echo".into(),
                api_base: "http://localhost".into(),
                model: "base-model".into(),
                temperature: 0.3,
                api_key: None,
                request_timeout_secs: 30,
            },
        );
        cfg.llm.roles.planning = Some(RoleEntry {
            provider: "echo".into(),
            model: "planner".into(),
            stream: false,
            temperature: None,
        });
        cfg
    }

    #[test]
    fn role_entry_wins_over_active_defaults() {
        let mut registry = ProviderRegistry::from_config(&config_with_roles());
        registry.register(Arc::new(EchoProvider));
        let (_, cfg) = registry.call_config_for_role(Role::Planning).unwrap();
        assert_eq!(cfg.model, "planner");
        assert_eq!(cfg.temperature, 0.3);

        let (_, cfg) = registry.call_config_for_role(Role::Vision).unwrap();
        assert_eq!(cfg.model, "base-model");
        assert!(!cfg.stream);
    }

    #[test]
    fn unknown_role_provider_is_config_error() {
        let mut cfg = config_with_roles();
        cfg.llm.roles.vision = Some(RoleEntry {
            provider: "missing".into(),
            model: "m".into(),
            stream: false,
            temperature: None,
        });
        let registry = ProviderRegistry::from_config(&cfg);
        assert!(matches!(
            registry.call_config_for_role(Role::Vision),
            Err(DeskPilotError::Config(_))
        ));
    }

    #[tokio::test]
    async fn planning_model_reports_failure_as_data() {
        let registry = Arc::new(ProviderRegistry::new("nothing".into()));
        let model = RolePlanningModel::new(registry);
        let response = model.plan_text("open notepad").await;
        assert!(!response.success);
        assert!(response.error.is_some());
        assert!(response.content.is_empty());
    }

    #[tokio::test]
    async fn planning_model_uses_planning_role() {
        let mut registry = ProviderRegistry::from_config(&config_with_roles());
        registry.register(Arc::new(EchoProvider));
        let model = RolePlanningModel::new(Arc::new(registry));
        let response = model.plan_text("open notepad").await;
        assert!(response.success);
        assert_eq!(response.content, "planner:2");
    }
}
