//! Tile classification against the ranked signature pools.

use std::cmp::Ordering;

use tracing::trace;

use crate::interface::{Frame, Perception};
use crate::signature::{SignatureLibrary, SignaturePool};
use crate::tile::Tile;

/// Minimum confidence for a comparison to count as a match.
pub const ACCEPT_CONFIDENCE: f64 = 0.90;

/// Confidence at which a match ends the scan early.
pub const DEFINITIVE_CONFIDENCE: f64 = 0.99;

/// One accepted signature match.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub tile: Tile,
    /// Name of the matching signature, for logs.
    pub name: String,
    pub confidence: f64,
    pool: SignaturePool,
    index: usize,
}

/// Labels cell images by comparing them against the signature library.
#[derive(Clone, Debug, Default)]
pub struct TileClassifier {
    library: SignatureLibrary,
}

impl TileClassifier {
    pub fn new(library: SignatureLibrary) -> Self {
        Self { library }
    }

    pub fn library(&self) -> &SignatureLibrary {
        &self.library
    }

    /// Classify one cell image. Returns `None` when no signature reaches the
    /// accept threshold.
    ///
    /// All accepted matches across the three pools are collected, then the
    /// lowest-confidence one wins. A match above [`DEFINITIVE_CONFIDENCE`]
    /// ends the scan of its own pool; the remaining pools are still queried
    /// and their candidates still compete.
    pub fn classify<P: Perception>(
        &mut self,
        perception: &mut P,
        region: &Frame,
    ) -> Option<Candidate> {
        let mut candidates: Vec<Candidate> = Vec::new();
        for pool in SignaturePool::ALL {
            for (index, signature) in self.library.pool(pool).iter().enumerate() {
                let confidence = perception.match_confidence(region, &signature.template);
                if confidence < ACCEPT_CONFIDENCE {
                    continue;
                }
                trace!(
                    signature = %signature.name,
                    confidence,
                    "signature matched"
                );
                candidates.push(Candidate {
                    tile: signature.tile,
                    name: signature.name.clone(),
                    confidence,
                    pool,
                    index,
                });
                if confidence > DEFINITIVE_CONFIDENCE {
                    break;
                }
            }
        }
        if candidates.is_empty() {
            return None;
        }
        candidates.sort_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(Ordering::Equal)
        });
        let winner = candidates.remove(0);
        self.library.pool_mut(winner.pool)[winner.index].matches += 1;
        Some(winner)
    }

    /// Re-rank every pool by accumulated match counts.
    pub fn rank_pools(&mut self) {
        self.library.rank();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{Point, Rect};
    use crate::interface::{Charset, ParseError};

    /// Perception stub whose confidence is a linear function of the gap
    /// between the first bytes of region and template.
    struct ScriptedEyes {
        comparisons: usize,
    }

    impl ScriptedEyes {
        fn new() -> Self {
            Self { comparisons: 0 }
        }
    }

    impl Perception for ScriptedEyes {
        fn capture(&mut self) -> Frame {
            Frame::new(1, 1)
        }

        fn extract_text(&mut self, region: Rect, _charset: Charset) -> Result<String, ParseError> {
            Err(ParseError {
                region,
                reason: "not scripted".to_string(),
            })
        }

        fn match_confidence(&mut self, region: &Frame, template: &Frame) -> f64 {
            self.comparisons += 1;
            let gap = (region.as_bytes()[0] as f64 - template.as_bytes()[0] as f64).abs();
            1.0 - gap / 255.0
        }

        fn locate(&mut self, _template: &Frame) -> Option<(Point, f64)> {
            None
        }
    }

    fn patch(value: u8) -> Frame {
        Frame::filled(2, 2, value)
    }

    fn library_of(entries: &[(SignaturePool, &str, Tile, u8)]) -> SignatureLibrary {
        let mut library = SignatureLibrary::new();
        for (pool, name, tile, value) in entries {
            library.register(*pool, *name, *tile, patch(*value)).unwrap();
        }
        library
    }

    // ==================== THRESHOLDS ====================

    #[test]
    fn test_below_accept_threshold_is_no_match() {
        // Gap 50 puts confidence at about 0.80.
        let library = library_of(&[(SignaturePool::Ground, "floor", Tile::Accessible, 150)]);
        let mut classifier = TileClassifier::new(library);
        let mut eyes = ScriptedEyes::new();
        assert!(classifier.classify(&mut eyes, &patch(100)).is_none());
    }

    #[test]
    fn test_accepted_match_labels_cell() {
        // Gap 13 puts confidence at about 0.95.
        let library = library_of(&[(SignaturePool::Blocked, "rock", Tile::Mountain, 113)]);
        let mut classifier = TileClassifier::new(library);
        let mut eyes = ScriptedEyes::new();
        let candidate = classifier.classify(&mut eyes, &patch(100)).unwrap();
        assert_eq!(candidate.tile, Tile::Mountain);
        assert_eq!(candidate.name, "rock");
        assert!(candidate.confidence >= ACCEPT_CONFIDENCE);
        assert!(candidate.confidence < DEFINITIVE_CONFIDENCE);
    }

    #[test]
    fn test_definitive_match_ends_its_own_pool_scan() {
        let library = library_of(&[
            (SignaturePool::Ground, "exact", Tile::Accessible, 100),
            (SignaturePool::Ground, "near", Tile::Gravel, 110),
            (SignaturePool::Blocked, "rock", Tile::Mountain, 113),
        ]);
        let mut classifier = TileClassifier::new(library);
        let mut eyes = ScriptedEyes::new();
        let candidate = classifier.classify(&mut eyes, &patch(100)).unwrap();
        // "near" is never compared: "exact" ended the ground scan. The
        // blocked pool is still queried, and its weaker match still wins
        // under the lowest-confidence selection rule.
        assert_eq!(eyes.comparisons, 2);
        assert_eq!(candidate.name, "rock");
        assert_eq!(candidate.tile, Tile::Mountain);
        assert!(candidate.confidence < DEFINITIVE_CONFIDENCE);
    }

    #[test]
    fn test_definitive_match_wins_when_alone() {
        let library = library_of(&[
            (SignaturePool::Ground, "far", Tile::Accessible, 200),
            (SignaturePool::Ground, "exact", Tile::Gravel, 100),
            (SignaturePool::Ground, "near", Tile::Door, 110),
        ]);
        let mut classifier = TileClassifier::new(library);
        let mut eyes = ScriptedEyes::new();
        let candidate = classifier.classify(&mut eyes, &patch(100)).unwrap();
        assert_eq!(candidate.name, "exact");
        assert_eq!(candidate.tile, Tile::Gravel);
        // "far" missed, "exact" hit definitively, "near" was never tried.
        assert_eq!(eyes.comparisons, 2);
    }

    // ==================== SELECTION ====================

    #[test]
    fn test_weakest_accepted_match_wins() {
        // Both accepted, neither definitive; the weaker match is selected.
        let library = library_of(&[
            (SignaturePool::Ground, "strong", Tile::Accessible, 104),
            (SignaturePool::Blocked, "weak", Tile::Mountain, 113),
        ]);
        let mut classifier = TileClassifier::new(library);
        let mut eyes = ScriptedEyes::new();
        let candidate = classifier.classify(&mut eyes, &patch(100)).unwrap();
        assert_eq!(candidate.name, "weak");
        assert_eq!(candidate.tile, Tile::Mountain);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let library = library_of(&[
            (SignaturePool::Ground, "a", Tile::Accessible, 104),
            (SignaturePool::Ground, "b", Tile::Door, 108),
            (SignaturePool::Blocked, "c", Tile::Inaccessible, 112),
        ]);
        let mut classifier = TileClassifier::new(library);
        let mut eyes = ScriptedEyes::new();
        let first = classifier.classify(&mut eyes, &patch(100)).unwrap();
        for _ in 0..5 {
            let again = classifier.classify(&mut eyes, &patch(100)).unwrap();
            assert_eq!(again.tile, first.tile);
            assert_eq!(again.name, first.name);
            assert_eq!(again.confidence, first.confidence);
        }
    }

    // ==================== RANKING ====================

    #[test]
    fn test_winner_counter_increments_and_reranks() {
        let library = library_of(&[
            (SignaturePool::Ground, "floor", Tile::Accessible, 200),
            (SignaturePool::Ground, "gravel", Tile::Gravel, 100),
        ]);
        let mut classifier = TileClassifier::new(library);
        let mut eyes = ScriptedEyes::new();
        // Only "gravel" matches this patch.
        for _ in 0..3 {
            let candidate = classifier.classify(&mut eyes, &patch(100)).unwrap();
            assert_eq!(candidate.name, "gravel");
        }
        assert_eq!(classifier.library().pool(SignaturePool::Ground)[1].matches, 3);
        classifier.rank_pools();
        let pool = classifier.library().pool(SignaturePool::Ground);
        assert_eq!(pool[0].name, "gravel");
        assert_eq!(pool[0].matches, 3);
        assert_eq!(pool[1].name, "floor");
    }

    #[test]
    fn test_empty_library_never_matches() {
        let mut classifier = TileClassifier::new(SignatureLibrary::new());
        let mut eyes = ScriptedEyes::new();
        assert!(classifier.classify(&mut eyes, &patch(50)).is_none());
        assert_eq!(eyes.comparisons, 0);
    }
}
