// Weighted fusion of structural and semantic search results

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::layers::{detect_layer, detect_pattern, CrossLayerHit, CrossLayerMap};
use crate::config::Config;
use crate::error::Result;
use crate::store::{Symbol, SymbolKind, SymbolStore};
use crate::vector::{confidence, VectorIndex};

/// Fusion weights; the three terms are each within [0, 1], so the weighted
/// sum is too.
pub const NAME_WEIGHT: f32 = 0.3;
pub const STRUCTURE_WEIGHT: f32 = 0.3;
pub const SEMANTIC_WEIGHT: f32 = 0.4;

/// Structural score for a symbol the structural path confirmed.
pub const STRUCTURAL_SCORE: f32 = 0.7;
/// Structural score for a symbol found only semantically.
pub const SEMANTIC_ONLY_SCORE: f32 = 0.3;

/// How a result was discovered, kept for explainability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    Structural,
    Semantic,
    Hybrid,
}

impl SearchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMethod::Structural => "structural",
            SearchMethod::Semantic => "semantic",
            SearchMethod::Hybrid => "hybrid",
        }
    }
}

/// A fused search result with its component scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridHit {
    pub symbol_id: String,
    pub name: String,
    pub kind: SymbolKind,
    pub file_path: String,
    pub start_line: u32,
    pub name_score: f32,
    pub structure_score: f32,
    pub semantic_score: f32,
    pub hybrid_score: f32,
    pub method: SearchMethod,
}

/// Name similarity in [0, 1]: exact case-insensitive match 1.0, substring
/// containment in either direction 0.8, otherwise normalized Levenshtein.
pub fn name_similarity(a: &str, b: &str) -> f32 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a.contains(&b) || b.contains(&a) {
        return 0.8;
    }
    let max_len = a.chars().count().max(b.chars().count());
    1.0 - levenshtein(&a, &b) as f32 / max_len as f32
}

/// Edit distance over chars, two-row dynamic programming
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

struct Candidate {
    symbol: Symbol,
    structural: bool,
    distance: Option<f32>,
}

/// Merges the symbol store's structural matches with the vector index's
/// nearest neighbors into one ranked, explainable list
pub struct HybridSearch {
    store: SymbolStore,
    vectors: VectorIndex,
    config: Config,
}

impl HybridSearch {
    pub fn new(store: SymbolStore, vectors: VectorIndex, config: Config) -> Self {
        Self {
            store,
            vectors,
            config,
        }
    }

    /// Ranked fusion of structural matches for `query` and semantic
    /// neighbors of `query_embedding` (when provided).
    ///
    /// `hybrid = 0.3·name + 0.3·structure + 0.4·semantic`; descending score,
    /// ties broken by symbol id, truncated to `limit`.
    pub fn search(
        &self,
        query: &str,
        query_embedding: Option<&[f32]>,
        limit: usize,
    ) -> Result<Vec<HybridHit>> {
        let mut candidates: BTreeMap<String, Candidate> = BTreeMap::new();

        for symbol in self.store.find_symbols_by_name(query, limit)? {
            candidates.insert(
                symbol.id.clone(),
                Candidate {
                    symbol,
                    structural: true,
                    distance: None,
                },
            );
        }
        if !query.trim().is_empty() {
            // Quoted as a phrase so arbitrary concept names cannot produce
            // FTS5 syntax errors.
            let phrase = format!("\"{}\"", query.replace('"', "\"\""));
            for hit in self.store.search_symbols(&phrase, limit)? {
                candidates
                    .entry(hit.symbol.id.clone())
                    .and_modify(|c| c.structural = true)
                    .or_insert(Candidate {
                        symbol: hit.symbol,
                        structural: true,
                        distance: None,
                    });
            }
        }

        if let Some(embedding) = query_embedding {
            let semantic =
                self.vectors
                    .search(embedding, limit, self.config.vectors.max_distance)?;
            for vhit in semantic {
                match self.store.get_symbol(&vhit.symbol_id)? {
                    Some(symbol) => {
                        candidates
                            .entry(symbol.id.clone())
                            .and_modify(|c| c.distance = Some(vhit.distance))
                            .or_insert(Candidate {
                                symbol,
                                structural: false,
                                distance: Some(vhit.distance),
                            });
                    }
                    None => {
                        debug!("dropping stale vector hit {}", vhit.symbol_id);
                    }
                }
            }
        }

        let mut hits: Vec<HybridHit> = candidates
            .into_values()
            .map(|c| score_candidate(query, c))
            .collect();
        hits.sort_by(|x, y| {
            y.hybrid_score
                .partial_cmp(&x.hybrid_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| x.symbol_id.cmp(&y.symbol_id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    /// Symbols across architectural layers that likely represent `concept`.
    ///
    /// Runs semantic search with the looser cross-layer threshold, annotates
    /// each hit with its detected layer, and aggregates a mean confidence
    /// plus a best-effort pattern label (never empty).
    pub fn find_cross_layer_entity(
        &self,
        concept: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<CrossLayerMap> {
        let raw = self.vectors.search(
            embedding,
            limit,
            self.config.vectors.cross_layer_max_distance,
        )?;

        let mut hits = Vec::with_capacity(raw.len());
        for vhit in raw {
            let Some(symbol) = self.store.get_symbol(&vhit.symbol_id)? else {
                debug!("dropping stale vector hit {}", vhit.symbol_id);
                continue;
            };
            hits.push(CrossLayerHit {
                symbol_id: symbol.id,
                name: symbol.name,
                layer: detect_layer(&symbol.file_path),
                file_path: symbol.file_path,
                confidence: vhit.confidence,
            });
        }

        let mut layers = Vec::new();
        for hit in &hits {
            if !layers.contains(&hit.layer) {
                layers.push(hit.layer);
            }
        }
        let confidence = if hits.is_empty() {
            0.0
        } else {
            hits.iter().map(|h| h.confidence).sum::<f32>() / hits.len() as f32
        };
        let pattern = detect_pattern(&hits, &layers);

        Ok(CrossLayerMap {
            concept: concept.to_string(),
            hits,
            layers,
            confidence,
            pattern,
        })
    }
}

fn score_candidate(query: &str, candidate: Candidate) -> HybridHit {
    let name_score = name_similarity(query, &candidate.symbol.name);
    let structure_score = if candidate.structural {
        STRUCTURAL_SCORE
    } else {
        SEMANTIC_ONLY_SCORE
    };
    let semantic_score = candidate.distance.map(confidence).unwrap_or(0.0);
    let method = match (candidate.structural, candidate.distance.is_some()) {
        (true, true) => SearchMethod::Hybrid,
        (true, false) => SearchMethod::Structural,
        (false, _) => SearchMethod::Semantic,
    };
    HybridHit {
        symbol_id: candidate.symbol.id,
        name: candidate.symbol.name,
        kind: candidate.symbol.kind,
        file_path: candidate.symbol.file_path,
        start_line: candidate.symbol.span.start_line,
        name_score,
        structure_score,
        semantic_score,
        hybrid_score: NAME_WEIGHT * name_score
            + STRUCTURE_WEIGHT * structure_score
            + SEMANTIC_WEIGHT * semantic_score,
        method,
    }
}
