//! Seed management for terrain generation
//!
//! Each generation phase gets its own seed, derived from a master seed, so one
//! phase can be varied while the others stay fixed.

/// Seeds for every randomized phase of a generation pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TerrainSeeds {
    /// Master seed (used for display/reference)
    pub master: u64,
    /// Level assignment noise
    pub levels: u64,
    /// POI type rolls and candidate positions
    pub pois: u64,
    /// Surface detail noise applied after the ramp mask exists
    pub detail: u64,
}

impl TerrainSeeds {
    /// Create seeds from a master seed, deriving all sub-seeds deterministically.
    pub fn from_master(master: u64) -> Self {
        Self {
            master,
            levels: derive_seed(master, "levels"),
            pois: derive_seed(master, "pois"),
            detail: derive_seed(master, "detail"),
        }
    }

    /// Create a builder for customizing individual seeds
    pub fn builder(master: u64) -> TerrainSeedsBuilder {
        TerrainSeedsBuilder {
            seeds: Self::from_master(master),
        }
    }
}

impl Default for TerrainSeeds {
    fn default() -> Self {
        Self::from_master(rand::random())
    }
}

/// Builder for overriding individual seeds while deriving the rest from master
pub struct TerrainSeedsBuilder {
    seeds: TerrainSeeds,
}

impl TerrainSeedsBuilder {
    pub fn levels(mut self, seed: u64) -> Self {
        self.seeds.levels = seed;
        self
    }

    pub fn pois(mut self, seed: u64) -> Self {
        self.seeds.pois = seed;
        self
    }

    pub fn detail(mut self, seed: u64) -> Self {
        self.seeds.detail = seed;
        self
    }

    pub fn build(self) -> TerrainSeeds {
        self.seeds
    }
}

/// Derive a sub-seed from a master seed and a phase name.
///
/// FNV-1a over the name folded into a splitmix64 finalizer, so derived seeds are
/// stable across toolchains (std's `DefaultHasher` makes no such promise).
fn derive_seed(master: u64, phase: &str) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in phase.bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x0100_0000_01b3);
    }

    let mut z = master ^ h;
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

impl std::fmt::Display for TerrainSeeds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TerrainSeeds {{ master: {}, levels: {}, pois: {}, detail: {} }}",
            self.master, self.levels, self.pois, self.detail,
        )
    }
}
