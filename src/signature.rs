//! Tile signatures and the ranked pools the classifier scans.
//!
//! A signature is a reference template plus the tile it stands for. Signatures
//! live in three pools (ground, blocked, actors) that are scanned separately
//! and re-ranked by match frequency, so the templates seen most often are
//! compared first on later scans.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::interface::Frame;
use crate::tile::Tile;

/// Reference template bound to the tile it identifies.
#[derive(Clone, Debug)]
pub struct TileSignature {
    pub name: String,
    pub tile: Tile,
    pub template: Frame,
    /// Accepted matches so far; drives pool ranking.
    pub matches: u64,
}

/// Which scan pool a signature belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignaturePool {
    /// Walkable terrain: accessible ground, doors, gravel.
    Ground,
    /// Impassable terrain: walls, water, mountains.
    Blocked,
    /// Non-player characters.
    Actor,
}

impl SignaturePool {
    pub const ALL: [SignaturePool; 3] =
        [SignaturePool::Ground, SignaturePool::Blocked, SignaturePool::Actor];
}

/// A tile was registered into a pool it cannot belong to.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SignatureError {
    #[error("signature {0:?} maps a reserved tile; player and unknown cannot be registered")]
    ReservedTile(String),
    #[error("signature {name:?} maps {tile:?}, which does not belong in the {pool:?} pool")]
    PoolMismatch {
        name: String,
        tile: Tile,
        pool: SignaturePool,
    },
}

fn check_registration(name: &str, tile: Tile, pool: SignaturePool) -> Result<(), SignatureError> {
    if matches!(tile, Tile::Player | Tile::Unknown) {
        return Err(SignatureError::ReservedTile(name.to_string()));
    }
    let fits = match pool {
        SignaturePool::Ground => tile.is_walkable(),
        SignaturePool::Blocked => tile.is_blocking() && !tile.is_actor(),
        SignaturePool::Actor => tile.is_actor(),
    };
    if fits {
        Ok(())
    } else {
        Err(SignatureError::PoolMismatch {
            name: name.to_string(),
            tile,
            pool,
        })
    }
}

/// The classifier's signature cache: three independently ranked pools.
#[derive(Clone, Debug, Default)]
pub struct SignatureLibrary {
    ground: Vec<TileSignature>,
    blocked: Vec<TileSignature>,
    actors: Vec<TileSignature>,
}

impl SignatureLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a signature; the tile must be valid for the pool.
    pub fn register(
        &mut self,
        pool: SignaturePool,
        name: impl Into<String>,
        tile: Tile,
        template: Frame,
    ) -> Result<(), SignatureError> {
        let name = name.into();
        check_registration(&name, tile, pool)?;
        self.pool_mut(pool).push(TileSignature {
            name,
            tile,
            template,
            matches: 0,
        });
        Ok(())
    }

    pub fn pool(&self, pool: SignaturePool) -> &[TileSignature] {
        match pool {
            SignaturePool::Ground => &self.ground,
            SignaturePool::Blocked => &self.blocked,
            SignaturePool::Actor => &self.actors,
        }
    }

    pub(crate) fn pool_mut(&mut self, pool: SignaturePool) -> &mut Vec<TileSignature> {
        match pool {
            SignaturePool::Ground => &mut self.ground,
            SignaturePool::Blocked => &mut self.blocked,
            SignaturePool::Actor => &mut self.actors,
        }
    }

    /// Re-sort every pool so the most-matched signatures are scanned first.
    pub fn rank(&mut self) {
        for pool in SignaturePool::ALL {
            self.pool_mut(pool).sort_by(|a, b| b.matches.cmp(&a.matches));
        }
    }

    pub fn len(&self) -> usize {
        self.ground.len() + self.blocked.len() + self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One manifest entry: a template file and the tile it maps to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureSpec {
    pub name: String,
    pub tile: Tile,
    pub file: PathBuf,
}

/// On-disk description of a signature library, loaded from YAML.
///
/// ```yaml
/// ground:
///   - { name: cave_floor, tile: accessible, file: tiles/cave_floor.png }
/// blocked:
///   - { name: rock_face, tile: mountain, file: tiles/rock_face.png }
/// actors:
///   - { name: smith, tile: blacksmith, file: tiles/smith.png }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureManifest {
    pub ground: Vec<SignatureSpec>,
    pub blocked: Vec<SignatureSpec>,
    pub actors: Vec<SignatureSpec>,
}

impl SignatureManifest {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    fn specs(&self, pool: SignaturePool) -> &[SignatureSpec] {
        match pool {
            SignaturePool::Ground => &self.ground,
            SignaturePool::Blocked => &self.blocked,
            SignaturePool::Actor => &self.actors,
        }
    }

    /// Check every entry's tile against its pool without touching the disk.
    pub fn validate(&self) -> Result<(), SignatureError> {
        for pool in SignaturePool::ALL {
            for spec in self.specs(pool) {
                check_registration(&spec.name, spec.tile, pool)?;
            }
        }
        Ok(())
    }
}

#[cfg(feature = "png")]
/// Failure while materializing a manifest from disk.
#[derive(Debug, Error)]
pub enum ManifestLoadError {
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error("could not load template {path:?}")]
    Template {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

#[cfg(feature = "png")]
impl SignatureManifest {
    /// Load every template relative to `root` and build the library.
    pub fn load(&self, root: &std::path::Path) -> Result<SignatureLibrary, ManifestLoadError> {
        let mut library = SignatureLibrary::new();
        for pool in SignaturePool::ALL {
            for spec in self.specs(pool) {
                let path = root.join(&spec.file);
                let template = Frame::from_png(&path).map_err(|source| {
                    ManifestLoadError::Template {
                        path: path.clone(),
                        source,
                    }
                })?;
                library.register(pool, spec.name.clone(), spec.tile, template)?;
            }
        }
        Ok(library)
    }
}
