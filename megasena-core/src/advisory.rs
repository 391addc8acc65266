use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Source externe de suggestions d'indicateurs (service de conseil, fichier...).
///
/// Les noms proposés ne sont qu'un ensemble candidat : ils sont notés comme
/// les autres et peuvent être rejetés.
pub trait IndicatorAdvisor: Send + Sync {
    fn source(&self) -> &str;

    /// Liste ordonnée de noms d'indicateurs parmi `available`.
    fn suggest(&self, available: &[String]) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AdviceFile {
    indicators: Vec<String>,
}

/// Suggestions figées, lues depuis un fichier JSON `{ "indicators": [...] }`.
pub struct StaticAdvisor {
    path: Option<PathBuf>,
    names: Vec<String>,
}

impl StaticAdvisor {
    pub fn new(names: Vec<String>) -> Self {
        Self { path: None, names }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Impossible de lire les suggestions {:?}", path))?;
        let advice: AdviceFile = serde_json::from_str(&json)
            .with_context(|| format!("Suggestions JSON invalides dans {:?}", path))?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            names: advice.indicators,
        })
    }
}

impl IndicatorAdvisor for StaticAdvisor {
    fn source(&self) -> &str {
        match &self.path {
            Some(p) => p.to_str().unwrap_or("fichier"),
            None => "statique",
        }
    }

    fn suggest(&self, _available: &[String]) -> Result<Vec<String>> {
        Ok(self.names.clone())
    }
}
