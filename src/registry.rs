//! Transport Factory Registry (§4.6): a name-keyed map of
//! [`TransportFactory`] implementations callers can extend with their own
//! transports.

use crate::error::ConfigurationError;
#[cfg(any(feature = "openai", feature = "anthropic"))]
use crate::transport::SdkTransport;
#[cfg(feature = "anthropic")]
use crate::transport::sdk::AnthropicAdapter;
#[cfg(feature = "openai")]
use crate::transport::sdk::OpenAiAdapter;
use crate::transport::{HttpTransport, HttpTransportConfig, Transport, TransportFactory};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

struct HttpFactory;

#[async_trait]
impl TransportFactory for HttpFactory {
    async fn create(
        &self,
        config: &BTreeMap<String, String>,
    ) -> Result<Arc<dyn Transport>, ConfigurationError> {
        let base_url = config
            .get("base_url")
            .ok_or_else(|| ConfigurationError::new("http transport requires `base_url`"))?
            .clone();
        let transport = HttpTransport::new(HttpTransportConfig {
            base_url,
            ..Default::default()
        })
        .map_err(|e| ConfigurationError::new(e.to_string()))?;
        Ok(Arc::new(transport))
    }
}

#[cfg(feature = "openai")]
struct OpenAiFactory;

#[cfg(feature = "openai")]
#[async_trait]
impl TransportFactory for OpenAiFactory {
    async fn create(
        &self,
        config: &BTreeMap<String, String>,
    ) -> Result<Arc<dyn Transport>, ConfigurationError> {
        let base_url = config
            .get("base_url")
            .cloned()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let mut adapter = OpenAiAdapter::new(base_url);
        if let Some(key) = config.get("api_key") {
            adapter = adapter.with_api_key(key.clone());
        }
        let transport =
            SdkTransport::new(Box::new(adapter)).map_err(|e| ConfigurationError::new(e.to_string()))?;
        Ok(Arc::new(transport))
    }
}

#[cfg(feature = "anthropic")]
struct AnthropicFactory;

#[cfg(feature = "anthropic")]
#[async_trait]
impl TransportFactory for AnthropicFactory {
    async fn create(
        &self,
        config: &BTreeMap<String, String>,
    ) -> Result<Arc<dyn Transport>, ConfigurationError> {
        let base_url = config
            .get("base_url")
            .cloned()
            .unwrap_or_else(|| "https://api.anthropic.com/v1".to_string());
        let mut adapter = AnthropicAdapter::new(base_url);
        if let Some(key) = config.get("api_key") {
            adapter = adapter.with_api_key(key.clone());
        }
        let transport =
            SdkTransport::new(Box::new(adapter)).map_err(|e| ConfigurationError::new(e.to_string()))?;
        Ok(Arc::new(transport))
    }
}

/// A name-keyed registry of [`TransportFactory`] implementations.
pub struct TransportRegistry {
    factories: RwLock<HashMap<String, Arc<dyn TransportFactory>>>,
}

impl TransportRegistry {
    /// An empty registry with no built-ins installed.
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// A registry pre-populated with `"http"` and, per the enabled Cargo
    /// features, `"openai"`/`"anthropic"`.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry
            .register("http", Arc::new(HttpFactory), false)
            .expect("built-in registration cannot fail");
        #[cfg(feature = "openai")]
        registry
            .register("openai", Arc::new(OpenAiFactory), false)
            .expect("built-in registration cannot fail");
        #[cfg(feature = "anthropic")]
        registry
            .register("anthropic", Arc::new(AnthropicFactory), false)
            .expect("built-in registration cannot fail");
        registry
    }

    /// Register `factory` under `name`. Fails if `name` is already taken
    /// unless `replace` is `true`.
    pub fn register(
        &self,
        name: impl Into<String>,
        factory: Arc<dyn TransportFactory>,
        replace: bool,
    ) -> Result<(), ConfigurationError> {
        let name = name.into();
        let mut factories = self.factories.write().expect("registry lock poisoned");
        if !replace && factories.contains_key(&name) {
            return Err(ConfigurationError::new(format!(
                "transport `{name}` is already registered"
            )));
        }
        factories.insert(name, factory);
        Ok(())
    }

    /// Construct a transport by registered name.
    pub async fn create_transport(
        &self,
        name: &str,
        options: &BTreeMap<String, String>,
    ) -> Result<Arc<dyn Transport>, ConfigurationError> {
        let factory = {
            let factories = self.factories.read().expect("registry lock poisoned");
            factories
                .get(name)
                .cloned()
                .ok_or_else(|| ConfigurationError::new(format!("no transport registered as `{name}`")))?
        };
        factory.create(options).await
    }

    /// Every registered name.
    pub fn names(&self) -> HashSet<String> {
        self.factories
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_builtins_registers_expected_names() {
        let registry = TransportRegistry::with_builtins();
        let names = registry.names();
        assert!(names.contains("http"));
        assert!(names.contains("openai"));
        assert!(names.contains("anthropic"));
    }

    #[tokio::test]
    async fn test_create_transport_unknown_name_errors() {
        let registry = TransportRegistry::new();
        let result = registry.create_transport("nope", &BTreeMap::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_http_factory_requires_base_url() {
        let registry = TransportRegistry::with_builtins();
        let result = registry.create_transport("http", &BTreeMap::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_http_factory_builds_with_base_url() {
        let registry = TransportRegistry::with_builtins();
        let mut options = BTreeMap::new();
        options.insert("base_url".to_string(), "http://example.invalid".to_string());
        let transport = registry.create_transport("http", &options).await.unwrap();
        assert_eq!(transport.name(), "http");
    }

    #[test]
    fn test_register_rejects_duplicate_without_replace() {
        let registry = TransportRegistry::with_builtins();
        let result = registry.register("http", Arc::new(HttpFactory), false);
        assert!(result.is_err());
    }

    #[test]
    fn test_register_allows_duplicate_with_replace() {
        let registry = TransportRegistry::with_builtins();
        let result = registry.register("http", Arc::new(HttpFactory), true);
        assert!(result.is_ok());
    }
}
