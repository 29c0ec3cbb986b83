// Hybrid retrieval and cross-layer mapping

pub mod hybrid;
pub mod layers;

pub use hybrid::{name_similarity, HybridHit, HybridSearch, SearchMethod};
pub use layers::{detect_layer, CrossLayerHit, CrossLayerMap, Layer};
