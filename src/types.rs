use crate::client::{ApiClient, Params};
use crate::error::ApiError;
use serde::Deserialize;
use std::collections::HashMap;

/// Locally implemented resource shapes. Catalog types with no counterpart here
/// resolve to `Unknown` and carry raw fields only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Character,
    Concept,
    Issue,
    Location,
    Object,
    Person,
    Publisher,
    StoryArc,
    Team,
    Volume,
    Unknown,
}

impl ResourceKind {
    /// Match a catalog `detail_resource_name` (snake_case) to a local shape.
    pub fn from_detail_name(name: &str) -> ResourceKind {
        match name {
            "character" => ResourceKind::Character,
            "concept" => ResourceKind::Concept,
            "issue" => ResourceKind::Issue,
            "location" => ResourceKind::Location,
            "object" => ResourceKind::Object,
            "person" => ResourceKind::Person,
            "publisher" => ResourceKind::Publisher,
            "story_arc" => ResourceKind::StoryArc,
            "team" => ResourceKind::Team,
            "volume" => ResourceKind::Volume,
            _ => ResourceKind::Unknown,
        }
    }
}

/// One entry of the remote `types/` catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub id: u32,
    pub detail_resource_name: String,
    pub list_resource_name: String,
}

/// Static description of one resource type: the numeric prefix used in detail
/// URLs, the endpoint names, and the local shape it maps to.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub id: u32,
    pub detail_name: String,
    pub list_name: String,
    pub kind: ResourceKind,
}

/// Mapping between API type names and resource shapes, built once per session
/// from the catalog the API publishes. Read-only after construction.
pub struct TypeRegistry {
    by_name: HashMap<String, TypeDescriptor>,
    by_kind: HashMap<ResourceKind, TypeDescriptor>,
}

impl TypeRegistry {
    /// Query the remote `types/` catalog and build the registry.
    pub async fn fetch(client: &ApiClient) -> Result<Self, ApiError> {
        let url = format!("{}types/", client.api_base());
        let envelope = client.execute(&url, &Params::default()).await?;
        let entries: Vec<CatalogEntry> = serde_json::from_value(envelope.results)
            .map_err(|e| ApiError::Json(format!("bad types catalog: {}", e)))?;
        Ok(Self::from_catalog(entries))
    }

    pub fn from_catalog(entries: Vec<CatalogEntry>) -> Self {
        let mut by_name = HashMap::new();
        let mut by_kind = HashMap::new();
        for entry in entries {
            let descriptor = TypeDescriptor {
                id: entry.id,
                detail_name: entry.detail_resource_name.clone(),
                list_name: entry.list_resource_name.clone(),
                kind: ResourceKind::from_detail_name(&entry.detail_resource_name),
            };
            by_name.insert(entry.detail_resource_name, descriptor.clone());
            by_name.insert(entry.list_resource_name, descriptor.clone());
            if descriptor.kind != ResourceKind::Unknown {
                by_kind.entry(descriptor.kind).or_insert(descriptor);
            }
        }
        TypeRegistry { by_name, by_kind }
    }

    /// Catalog entries for the shapes this crate exercises. Used when the
    /// remote catalog is unreachable and by offline tests; the numeric
    /// prefixes are fixed by the API.
    pub fn builtin() -> Self {
        let entries = vec![
            catalog_entry(4000, "issue", "issues"),
            catalog_entry(4005, "character", "characters"),
            catalog_entry(4010, "publisher", "publishers"),
            catalog_entry(4015, "concept", "concepts"),
            catalog_entry(4020, "location", "locations"),
            catalog_entry(4040, "person", "people"),
            catalog_entry(4045, "story_arc", "story_arcs"),
            catalog_entry(4050, "volume", "volumes"),
            catalog_entry(4055, "object", "objects"),
            catalog_entry(4060, "team", "teams"),
        ];
        Self::from_catalog(entries)
    }

    /// Resolve an API type name (detail or list form). Names absent from the
    /// catalog fall back to the unknown-resource sentinel.
    pub fn resolve(&self, name: &str) -> TypeDescriptor {
        self.by_name.get(name).cloned().unwrap_or(TypeDescriptor {
            id: 0,
            detail_name: name.to_string(),
            list_name: name.to_string(),
            kind: ResourceKind::Unknown,
        })
    }

    /// Descriptor for a locally implemented shape.
    pub fn descriptor(&self, kind: ResourceKind) -> Result<&TypeDescriptor, ApiError> {
        self.by_kind.get(&kind).ok_or_else(|| {
            ApiError::IllegalArgument(format!("no catalog entry for resource kind {:?}", kind))
        })
    }
}

fn catalog_entry(id: u32, detail: &str, list: &str) -> CatalogEntry {
    CatalogEntry {
        id,
        detail_resource_name: detail.to_string(),
        list_resource_name: list.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_detail_and_list_names() {
        let registry = TypeRegistry::builtin();
        let by_detail = registry.resolve("issue");
        let by_list = registry.resolve("issues");
        assert_eq!(by_detail.id, 4000);
        assert_eq!(by_list.id, 4000);
        assert_eq!(by_detail.kind, ResourceKind::Issue);
        assert_eq!(by_list.kind, ResourceKind::Issue);
    }

    #[test]
    fn test_unknown_name_gets_sentinel() {
        let registry = TypeRegistry::builtin();
        let descriptor = registry.resolve("video_type");
        assert_eq!(descriptor.kind, ResourceKind::Unknown);
        assert_eq!(descriptor.id, 0);
    }

    #[test]
    fn test_catalog_type_without_local_shape_keeps_its_prefix() {
        let registry = TypeRegistry::from_catalog(vec![
            catalog_entry(4000, "issue", "issues"),
            catalog_entry(2300, "video", "videos"),
        ]);
        let video = registry.resolve("video");
        assert_eq!(video.kind, ResourceKind::Unknown);
        assert_eq!(video.id, 2300);
    }

    #[test]
    fn test_descriptor_by_kind() {
        let registry = TypeRegistry::builtin();
        assert_eq!(registry.descriptor(ResourceKind::Volume).unwrap().id, 4050);
        assert_eq!(
            registry.descriptor(ResourceKind::Person).unwrap().list_name,
            "people"
        );
    }
}
