// Architectural layer classification and cross-layer aggregation.
// Keyword heuristics: a ranking signal, not ground truth.

use serde::{Deserialize, Serialize};

/// Architectural layer of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Frontend,
    Api,
    Domain,
    Data,
    Database,
    Infrastructure,
    Unknown,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Frontend => "frontend",
            Layer::Api => "api",
            Layer::Domain => "domain",
            Layer::Data => "data",
            Layer::Database => "database",
            Layer::Infrastructure => "infrastructure",
            Layer::Unknown => "unknown",
        }
    }
}

/// Ordered rules; the first whose keyword matches the lowercased path wins.
const LAYER_RULES: &[(Layer, &[&str])] = &[
    (
        Layer::Frontend,
        &[
            "/components/",
            "/pages/",
            "/views/",
            "/ui/",
            "/frontend/",
            ".tsx",
            ".jsx",
            ".vue",
            ".svelte",
            ".css",
            ".html",
        ],
    ),
    (
        Layer::Api,
        &[
            "/api/",
            "/routes/",
            "/controllers/",
            "/handlers/",
            "/endpoints/",
            "controller.",
            "router.",
        ],
    ),
    (
        Layer::Database,
        &["/migrations/", "/schema/", "/db/", ".sql"],
    ),
    (
        Layer::Data,
        &[
            "/repositories/",
            "/repository/",
            "/dao/",
            "/persistence/",
            "/store/",
            "repository.",
        ],
    ),
    (
        Layer::Domain,
        &["/domain/", "/services/", "/usecases/", "/models/", "/core/", "service."],
    ),
    (
        Layer::Infrastructure,
        &[
            "/infrastructure/",
            "/infra/",
            "/config/",
            "/deploy/",
            "/scripts/",
            "dockerfile",
            ".yaml",
            ".yml",
            ".toml",
            ".tf",
        ],
    ),
];

/// Classify a file path into exactly one layer; no match means `Unknown`
pub fn detect_layer(file_path: &str) -> Layer {
    let path = file_path.to_lowercase();
    for (layer, keywords) in LAYER_RULES {
        if keywords.iter().any(|k| path.contains(k)) {
            return *layer;
        }
    }
    Layer::Unknown
}

/// A semantic hit annotated with its architectural layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossLayerHit {
    pub symbol_id: String,
    pub name: String,
    pub file_path: String,
    pub layer: Layer,
    pub confidence: f32,
}

/// Aggregated view of one concept across layers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossLayerMap {
    pub concept: String,
    pub hits: Vec<CrossLayerHit>,
    /// Distinct layers in hit order.
    pub layers: Vec<Layer>,
    /// Mean of per-symbol confidences; 0.0 when there are no hits.
    pub confidence: f32,
    /// Best-effort architectural pattern label; never empty.
    pub pattern: String,
}

/// Keyword-derived pattern label with a generic fallback so consumers never
/// see an absent pattern
pub(crate) fn detect_pattern(hits: &[CrossLayerHit], layers: &[Layer]) -> String {
    let names: Vec<String> = hits.iter().map(|h| h.name.to_lowercase()).collect();
    let any = |needle: &str| names.iter().any(|n| n.contains(needle));

    if any("controller") && any("service") && any("repository") {
        "layered service stack".to_string()
    } else if any("repository") || any("dao") {
        "repository pattern".to_string()
    } else if any("controller") || any("handler") || any("endpoint") {
        "request handling pipeline".to_string()
    } else if layers.len() >= 3 {
        "full-stack concept".to_string()
    } else {
        "cross-layer concept".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_layer_first_match_wins() {
        assert_eq!(detect_layer("/src/components/Button.tsx"), Layer::Frontend);
        assert_eq!(detect_layer("/src/api/users.ts"), Layer::Api);
        // Frontend extension rule precedes the api path rule
        assert_eq!(detect_layer("/src/api/widget.tsx"), Layer::Frontend);
        assert_eq!(detect_layer("/src/services/billing.py"), Layer::Domain);
        assert_eq!(detect_layer("/src/repositories/user_repo.go"), Layer::Data);
        assert_eq!(detect_layer("/migrations/0001_init.sql"), Layer::Database);
        assert_eq!(detect_layer("/deploy/prod.yaml"), Layer::Infrastructure);
    }

    #[test]
    fn test_detect_layer_defaults_to_unknown() {
        assert_eq!(detect_layer("/src/lib.rs"), Layer::Unknown);
        assert_eq!(detect_layer("README.md"), Layer::Unknown);
        assert_eq!(detect_layer(""), Layer::Unknown);
    }

    #[test]
    fn test_detect_layer_is_case_insensitive() {
        assert_eq!(detect_layer("/SRC/Components/App.TSX"), Layer::Frontend);
    }

    #[test]
    fn test_pattern_label_is_never_empty() {
        assert!(!detect_pattern(&[], &[]).is_empty());

        let hit = |name: &str, layer: Layer| CrossLayerHit {
            symbol_id: name.to_string(),
            name: name.to_string(),
            file_path: String::new(),
            layer,
            confidence: 0.5,
        };

        let label = detect_pattern(
            &[
                hit("UserController", Layer::Api),
                hit("UserService", Layer::Domain),
                hit("UserRepository", Layer::Data),
            ],
            &[Layer::Api, Layer::Domain, Layer::Data],
        );
        assert_eq!(label, "layered service stack");

        let label = detect_pattern(&[hit("UserRepository", Layer::Data)], &[Layer::Data]);
        assert_eq!(label, "repository pattern");

        let label = detect_pattern(&[hit("widget", Layer::Unknown)], &[Layer::Unknown]);
        assert_eq!(label, "cross-layer concept");
    }
}
