use serde::Serialize;
use thiserror::Error;

/// Erreurs du noyau statistique.
///
/// `UnknownIndicator`, `MalformedHistory` et `InvalidConfig` sont fatales pour
/// un run. Les autres sont des préconditions statistiques non remplies : elles
/// sont conservées dans les rapports et traitées comme un risque élevé.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum CoreError {
    #[error("indicateur inconnu : {0}")]
    UnknownIndicator(String),

    #[error("fenêtre insuffisante pour {indicator} : {required} tirages requis, {actual} fournis")]
    InsufficientWindow {
        indicator: String,
        required: usize,
        actual: usize,
    },

    #[error("échantillon insuffisant : n = {n} (minimum 2)")]
    InsufficientSample { n: usize },

    #[error("indicateurs classables insuffisants : {available} pour un sous-ensemble de {required}")]
    InsufficientIndicators { available: usize, required: usize },

    #[error("partition trop petite : train = {train}, test = {test} (minimum {min})")]
    SplitTooSmall { train: usize, test: usize, min: usize },

    #[error("historique malformé : {0}")]
    MalformedHistory(String),

    #[error("configuration invalide : {0}")]
    InvalidConfig(String),

    #[error("distribution indisponible : {0}")]
    Distribution(String),
}

impl CoreError {
    /// Vrai pour les erreurs d'entrée/configuration qui interrompent le run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CoreError::UnknownIndicator(_)
                | CoreError::MalformedHistory(_)
                | CoreError::InvalidConfig(_)
        )
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(CoreError::UnknownIndicator("x".into()).is_fatal());
        assert!(CoreError::MalformedHistory("x".into()).is_fatal());
        assert!(!CoreError::InsufficientSample { n: 1 }.is_fatal());
        assert!(!CoreError::SplitTooSmall { train: 10, test: 2, min: 30 }.is_fatal());
        assert!(!CoreError::InsufficientIndicators { available: 2, required: 6 }.is_fatal());
    }

    #[test]
    fn test_error_serializes_with_kind() {
        let json = serde_json::to_string(&CoreError::InsufficientSample { n: 1 }).unwrap();
        assert!(json.contains("\"kind\":\"InsufficientSample\""));
        assert!(json.contains("\"n\":1"));
    }
}
