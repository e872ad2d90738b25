//! Layer identifiers and the ordered layer catalog of a benchmark session.

use crate::{BenchError, BenchResult};
use serde::{Deserialize, Serialize};

/// Unique identifier for a layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub String);

impl LayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split a workspace-qualified name like "CAS:bkb_2024".
    pub fn parse(s: &str) -> (Option<&str>, &str) {
        match s.split_once(':') {
            Some((workspace, name)) => (Some(workspace), name),
            None => (None, s),
        }
    }

    /// Identifier with characters that are awkward in file names replaced.
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One configured layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub id: LayerId,

    /// Human-readable description used as the report section title
    #[serde(default)]
    pub description: String,
}

impl LayerSpec {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: LayerId::new(id),
            description: description.into(),
        }
    }

    /// Description, falling back to the identifier when none was configured.
    pub fn title(&self) -> &str {
        if self.description.trim().is_empty() {
            self.id.as_str()
        } else {
            &self.description
        }
    }
}

/// Immutable ordered mapping from layer identifier to description.
///
/// The order is the configured order and drives both execution and report
/// section order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<LayerSpec>", into = "Vec<LayerSpec>")]
pub struct LayerCatalog {
    layers: Vec<LayerSpec>,
}

impl LayerCatalog {
    /// Build a catalog, rejecting empty and duplicate identifiers.
    pub fn new(layers: impl IntoIterator<Item = LayerSpec>) -> BenchResult<Self> {
        let layers: Vec<LayerSpec> = layers.into_iter().collect();
        for (i, layer) in layers.iter().enumerate() {
            if layer.id.as_str().trim().is_empty() {
                return Err(BenchError::InvalidCatalog(format!(
                    "layer #{} has an empty identifier",
                    i + 1
                )));
            }
            if layers[..i].iter().any(|l| l.id == layer.id) {
                return Err(BenchError::InvalidCatalog(format!(
                    "layer '{}' is listed more than once",
                    layer.id
                )));
            }
        }
        Ok(Self { layers })
    }

    pub fn get(&self, id: &LayerId) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| &l.id == id)
    }

    pub fn contains(&self, id: &LayerId) -> bool {
        self.get(id).is_some()
    }

    pub fn description_of(&self, id: &LayerId) -> Option<&str> {
        self.get(id).map(|l| l.description.as_str())
    }

    /// Configured index of a layer.
    pub fn position(&self, id: &LayerId) -> Option<usize> {
        self.layers.iter().position(|l| &l.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayerSpec> {
        self.layers.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &LayerId> {
        self.layers.iter().map(|l| &l.id)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl TryFrom<Vec<LayerSpec>> for LayerCatalog {
    type Error = BenchError;

    fn try_from(layers: Vec<LayerSpec>) -> BenchResult<Self> {
        Self::new(layers)
    }
}

impl From<LayerCatalog> for Vec<LayerSpec> {
    fn from(catalog: LayerCatalog) -> Self {
        catalog.layers
    }
}
