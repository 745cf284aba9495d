use indexmap::IndexMap;

pub const CAPABILITY_VISION: &str = "vision";
pub const CAPABILITY_JSON: &str = "json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<String>,
    pub context_window: Option<u64>,
}

impl ModelSpec {
    pub fn new(name: &str, provider: &str, capabilities: &[&str], context_window: Option<u64>) -> Self {
        Self {
            name: name.to_string(),
            provider: provider.to_string(),
            capabilities: capabilities
                .iter()
                .map(|item| (*item).to_string())
                .collect(),
            context_window,
        }
    }

    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

/// Chart-reading models, in preference order.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn register(&mut self, model: ModelSpec) {
        self.models.insert(model.name.clone(), model);
    }

    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: &str) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();
    for model in [
        ModelSpec::new("dryrun-vision-1", "dryrun", &["text", "vision", "json"], Some(8192)),
        ModelSpec::new("gpt-4o", "openai", &["text", "vision", "json"], Some(128000)),
        ModelSpec::new("gpt-4o-mini", "openai", &["text", "vision", "json"], Some(128000)),
        ModelSpec::new("gpt-4.1", "openai", &["text", "vision", "json"], Some(1047576)),
        ModelSpec::new("gpt-4.1-mini", "openai", &["text", "vision", "json"], Some(1047576)),
        ModelSpec::new("gpt-3.5-turbo", "openai", &["text", "json"], Some(16385)),
    ] {
        map.insert(model.name.clone(), model);
    }
    map
}
