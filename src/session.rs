use crate::client::{ApiClient, RetryPolicy};
use crate::config::Config;
use crate::error::ApiError;
use crate::rate_limit::TokenBucket;
use crate::resource::{Resource, ResourceCache};
use crate::types::{ResourceKind, TypeRegistry};
use serde_json::{Map, Value};
use std::sync::Arc;

/// The long-lived context every component works against: configured client,
/// type registry, identity cache and retry policy. Cheap to clone; clones
/// share all state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: Config,
    client: ApiClient,
    registry: TypeRegistry,
    cache: ResourceCache,
    retry: RetryPolicy,
}

impl Session {
    /// Build a session and fetch the remote type catalog. Fails up front when
    /// no API key is configured.
    pub async fn connect(config: Config) -> Result<Self, ApiError> {
        if config.api_key.is_empty() {
            return Err(ApiError::InvalidApiKey("no API key configured".to_string()));
        }
        let bucket = Arc::new(TokenBucket::new(
            config.token_state_path(),
            config.requests_rate,
            config.requests_burst,
        ));
        let client = ApiClient::new(
            config.api_base.clone(),
            config.api_key.clone(),
            config.timeout(),
            bucket,
        )?;
        let retry = RetryPolicy::new(config.retries);
        let registry = retry.run(|| TypeRegistry::fetch(&client)).await?;
        Ok(Self::assemble(config, client, registry, retry))
    }

    /// Build a session around an already constructed registry. Used when the
    /// caller has its own catalog (or the built-in one) and by offline tests.
    pub fn with_registry(config: Config, registry: TypeRegistry) -> Result<Self, ApiError> {
        let bucket = Arc::new(TokenBucket::new(
            config.token_state_path(),
            config.requests_rate,
            config.requests_burst,
        ));
        let client = ApiClient::new(
            config.api_base.clone(),
            config.api_key.clone(),
            config.timeout(),
            bucket,
        )?;
        let retry = RetryPolicy::new(config.retries);
        Ok(Self::assemble(config, client, registry, retry))
    }

    fn assemble(
        config: Config,
        client: ApiClient,
        registry: TypeRegistry,
        retry: RetryPolicy,
    ) -> Self {
        let cache = ResourceCache::new(config.api_base.clone());
        Session {
            inner: Arc::new(SessionInner {
                config,
                client,
                registry,
                cache,
                retry,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn client(&self) -> &ApiClient {
        &self.inner.client
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.inner.registry
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.inner.cache
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.inner.retry
    }

    /// A handle to the entity with this (kind, id), fetching nothing.
    pub fn reference(&self, kind: ResourceKind, id: u64) -> Result<Arc<Resource>, ApiError> {
        let descriptor = self.registry().descriptor(kind)?;
        Ok(self.cache().get_or_create(descriptor, id, None))
    }

    /// Wrap a raw API object (which must carry a numeric `id`) as a shared
    /// resource, merging its fields into the cached instance.
    pub fn adopt(
        &self,
        kind: ResourceKind,
        fields: Map<String, Value>,
    ) -> Result<Arc<Resource>, ApiError> {
        let id = fields
            .get("id")
            .and_then(|value| value.as_u64())
            .ok_or_else(|| ApiError::NotConvertable {
                field: "id".to_string(),
                reason: "object has no numeric id".to_string(),
            })?;
        let descriptor = self.registry().descriptor(kind)?.clone();
        Ok(self.cache().get_or_create(&descriptor, id, Some(fields)))
    }

    /// Fetch an entity by id. An empty field list fetches the full detail
    /// record; otherwise only the still-missing named fields are requested.
    pub async fn fetch(
        &self,
        kind: ResourceKind,
        id: u64,
        fields: &[&str],
    ) -> Result<Arc<Resource>, ApiError> {
        let resource = self.reference(kind, id)?;
        if fields.is_empty() {
            resource.hydrate(self).await?;
        } else {
            resource.ensure_fields(self, fields).await?;
        }
        Ok(resource)
    }
}
