use std::collections::HashMap;

use crate::error::Result;
use crate::texture::TextureId;

use super::sampler::SamplerMode;

/// Cache key: the four bound textures (absent slots hold [`TextureId::NULL`])
/// plus the sampler mode.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct DescriptorKey {
    pub textures: [TextureId; 4],
    pub sampler: SamplerMode,
}

/// Pooled, append-only map from [`DescriptorKey`] to a binding object.
///
/// Sets are never updated or evicted individually; a changed texture identity
/// produces a new key. [`clear`](Self::clear) is the only eviction path.
pub struct DescriptorCache<B> {
    index: HashMap<DescriptorKey, usize>,
    sets: Vec<B>,
    pool_size: usize,
    pools: usize,
    created: u64,
}

impl<B> DescriptorCache<B> {
    pub fn new(pool_size: usize) -> Self {
        Self {
            index: HashMap::new(),
            sets: Vec::new(),
            pool_size: pool_size.max(1),
            pools: 0,
            created: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Pools allocated since the last clear.
    #[inline]
    pub fn pool_count(&self) -> usize {
        self.pools
    }

    /// Sets created since construction.
    #[inline]
    pub fn created(&self) -> u64 {
        self.created
    }

    pub fn get(&self, key: &DescriptorKey) -> Option<&B> {
        self.index.get(key).map(|&i| &self.sets[i])
    }

    /// Returns the set for `key`, calling `create` on a miss.
    pub fn get_or_create(
        &mut self,
        key: DescriptorKey,
        create: impl FnOnce(&DescriptorKey) -> Result<B>,
    ) -> Result<&B> {
        if let Some(&i) = self.index.get(&key) {
            return Ok(&self.sets[i]);
        }

        if self.sets.len() == self.pools * self.pool_size {
            self.pools += 1;
            self.sets.reserve_exact(self.pool_size);
            log::debug!(
                "descriptor pool {} allocated ({} sets each)",
                self.pools,
                self.pool_size
            );
        }

        let set = create(&key)?;
        let i = self.sets.len();
        self.sets.push(set);
        self.index.insert(key, i);
        self.created += 1;
        Ok(&self.sets[i])
    }

    /// Drops every set and pool, handing the sets back for retirement.
    pub fn clear(&mut self) -> Vec<B> {
        self.index.clear();
        self.pools = 0;
        std::mem::take(&mut self.sets)
    }
}
