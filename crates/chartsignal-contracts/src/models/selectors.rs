use super::registry::{ModelRegistry, ModelSpec};
use crate::errors::ChartError;

/// The model a request will run on, and why it differs from what was asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_else(|| ModelRegistry::new(None)),
        }
    }

    /// Resolves `requested` to a model that has `capability`, falling back to the first
    /// registered one that does.
    pub fn select(
        &self,
        requested: Option<&str>,
        capability: &str,
    ) -> Result<ModelSelection, ChartError> {
        if let Some(name) = requested {
            if let Some(model) = self.registry.ensure(name, capability) {
                return Ok(ModelSelection {
                    model,
                    requested: Some(name.to_string()),
                    fallback_reason: None,
                });
            }
        }

        let fallback = self.first_capable(capability)?;
        let fallback_reason = match requested {
            Some(name) => format!(
                "Model '{name}' cannot read chart images; falling back to '{}'.",
                fallback.name
            ),
            None => format!("No model configured; reading charts with '{}'.", fallback.name),
        };
        Ok(ModelSelection {
            model: fallback,
            requested: requested.map(str::to_string),
            fallback_reason: Some(fallback_reason),
        })
    }

    fn first_capable(&self, capability: &str) -> Result<ModelSpec, ChartError> {
        self.registry
            .by_capability(capability)
            .into_iter()
            .next()
            .ok_or_else(|| {
                ChartError::Validation(format!(
                    "No chart-reading model is registered (capability '{capability}')."
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::ModelSelector;
    use crate::errors::ChartError;
    use crate::models::{ModelRegistry, ModelSpec, CAPABILITY_VISION};

    fn vision_model(name: &str) -> ModelSpec {
        ModelSpec::new(name, "dryrun", &["vision"], None)
    }

    #[test]
    fn falls_back_when_requested_model_cannot_read_images() -> anyhow::Result<()> {
        let selection = ModelSelector::new(None).select(Some("gpt-3.5-turbo"), CAPABILITY_VISION)?;
        assert_eq!(selection.model.name, "dryrun-vision-1");
        assert_eq!(selection.requested.as_deref(), Some("gpt-3.5-turbo"));
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Model 'gpt-3.5-turbo' cannot read chart images; falling back to 'dryrun-vision-1'.")
        );
        Ok(())
    }

    #[test]
    fn known_vision_model_is_used_as_is() -> anyhow::Result<()> {
        let selection = ModelSelector::new(None).select(Some("gpt-4o"), CAPABILITY_VISION)?;
        assert_eq!(selection.model.provider, "openai");
        assert_eq!(selection.fallback_reason, None);
        Ok(())
    }

    #[test]
    fn no_request_uses_first_registered_model() -> anyhow::Result<()> {
        let mut models = IndexMap::new();
        models.insert("chart-reader".to_string(), vision_model("chart-reader"));
        let selection = ModelSelector::new(Some(ModelRegistry::new(Some(models))))
            .select(None, CAPABILITY_VISION)?;
        assert_eq!(selection.model.name, "chart-reader");
        assert_eq!(selection.requested, None);
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("No model configured; reading charts with 'chart-reader'.")
        );
        Ok(())
    }

    #[test]
    fn errors_when_nothing_can_read_images() {
        let mut models = IndexMap::new();
        models.insert(
            "text-only".to_string(),
            ModelSpec::new("text-only", "dryrun", &["text"], None),
        );
        let result = ModelSelector::new(Some(ModelRegistry::new(Some(models))))
            .select(Some("gpt-4o"), CAPABILITY_VISION);
        assert_eq!(
            result,
            Err(ChartError::Validation(
                "No chart-reading model is registered (capability 'vision').".to_string()
            ))
        );
    }

    #[test]
    fn registered_custom_model_becomes_selectable() -> anyhow::Result<()> {
        let mut registry = ModelRegistry::new(None);
        registry.register(ModelSpec::new("llava-13b", "openai", &["vision"], None));
        let selection = ModelSelector::new(Some(registry)).select(Some("llava-13b"), CAPABILITY_VISION)?;
        assert_eq!(selection.model.name, "llava-13b");
        Ok(())
    }
}
