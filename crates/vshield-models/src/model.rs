//! Model identifiers and the configured model catalog.
//!
//! The set of known models is fixed when the catalog is built. Every
//! incoming model name is resolved against the catalog exactly once, at the
//! request boundary, into a [`ModelId`]. Everything downstream (the detector
//! registry in particular) is keyed by `ModelId`, never by raw strings.

use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Identifier of a configured detection model.
///
/// Only obtainable through [`ModelCatalog`], so holding one proves the name
/// was validated against the configured set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId {
    name: Arc<str>,
}

impl ModelId {
    /// Get the model name.
    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Serialize for ModelId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

impl JsonSchema for ModelId {
    fn schema_name() -> String {
        "ModelId".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

/// A model name that is not part of the configured catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown model '{requested}'. Available: [{}]", .available.join(", "))]
pub struct UnknownModelError {
    pub requested: String,
    pub available: Vec<String>,
}

/// Errors raised while building a catalog from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("model catalog must contain at least one model")]
    Empty,

    #[error("model name must not be blank")]
    BlankName,

    #[error("duplicate model name: {0}")]
    Duplicate(String),
}

/// The fixed, ordered set of models this process may serve.
///
/// The first entry is the default model.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<ModelId>,
}

impl ModelCatalog {
    /// Build a catalog from an ordered list of model names.
    pub fn new<I, S>(names: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut models: Vec<ModelId> = Vec::new();

        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                return Err(CatalogError::BlankName);
            }
            if models.iter().any(|m| m.as_str() == name) {
                return Err(CatalogError::Duplicate(name.to_string()));
            }
            models.push(ModelId {
                name: Arc::from(name),
            });
        }

        if models.is_empty() {
            return Err(CatalogError::Empty);
        }

        Ok(Self { models })
    }

    /// Resolve a model name into a [`ModelId`].
    pub fn resolve(&self, name: &str) -> Result<ModelId, UnknownModelError> {
        self.models
            .iter()
            .find(|m| m.as_str() == name)
            .cloned()
            .ok_or_else(|| UnknownModelError {
                requested: name.to_string(),
                available: self.names(),
            })
    }

    /// Resolve an optional model name, falling back to the default model.
    pub fn resolve_or_default(&self, name: Option<&str>) -> Result<ModelId, UnknownModelError> {
        match name {
            Some(name) => self.resolve(name),
            None => Ok(self.default_model().clone()),
        }
    }

    /// The default model (first configured entry).
    pub fn default_model(&self) -> &ModelId {
        // `new` rejects empty catalogs
        &self.models[0]
    }

    /// All configured models in order.
    pub fn iter(&self) -> impl Iterator<Item = &ModelId> {
        self.models.iter()
    }

    /// All configured model names in order.
    pub fn names(&self) -> Vec<String> {
        self.models.iter().map(|m| m.as_str().to_string()).collect()
    }
}
