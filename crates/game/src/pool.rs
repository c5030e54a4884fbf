//! The quad instance pool.
//!
//! A dense array of [`QuadData`] records that the render engine copies into
//! the GPU-visible instance buffer once per frame. Identity is positional:
//! a record's index in the dense array is its GPU instance index. Entities
//! hold stable [`QuadHandle`]s that survive removals, which compact the
//! dense array with a swap-remove.

use abrogue_render::QuadData;

/// Stable handle to a quad owned by the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuadHandle(usize);

/// Growable pool of per-instance quad records.
///
/// Explicitly constructed and passed to whoever needs it; the dense slice
/// is what the draw loop consumes.
#[derive(Debug, Default)]
pub struct QuadPool {
    /// Dense instance records, in GPU instance order.
    quads: Vec<QuadData>,
    /// Slot table: handle index -> dense index.
    slots: Vec<Option<usize>>,
    /// Reverse mapping: dense index -> slot index.
    dense_slots: Vec<usize>,
    /// Recycled slot indices.
    free_slots: Vec<usize>,
}

impl QuadPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a quad and returns its stable handle.
    pub fn insert(&mut self, quad: QuadData) -> QuadHandle {
        let dense_index = self.quads.len();
        self.quads.push(quad);

        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot] = Some(dense_index);
                slot
            }
            None => {
                self.slots.push(Some(dense_index));
                self.slots.len() - 1
            }
        };
        self.dense_slots.push(slot);

        QuadHandle(slot)
    }

    /// Overwrites the quad behind `handle`.
    ///
    /// # Panics
    ///
    /// Panics if the handle was removed.
    pub fn set(&mut self, handle: QuadHandle, quad: QuadData) {
        let dense_index = self.slots[handle.0].expect("quad handle was removed");
        self.quads[dense_index] = quad;
    }

    /// Reads the quad behind `handle`, if it still exists.
    pub fn get(&self, handle: QuadHandle) -> Option<QuadData> {
        self.slots.get(handle.0).copied().flatten().map(|i| self.quads[i])
    }

    /// Removes the quad behind `handle`, keeping the array dense.
    ///
    /// The last record is swapped into the vacated position and its slot
    /// entry is updated, so every other handle stays valid.
    pub fn remove(&mut self, handle: QuadHandle) {
        let Some(dense_index) = self.slots.get(handle.0).copied().flatten() else {
            return;
        };

        self.quads.swap_remove(dense_index);
        let moved_slot = self.dense_slots.swap_remove(dense_index);

        if dense_index < self.quads.len() {
            // A record was actually moved into the hole; repoint its slot.
            let last_slot = self.dense_slots[dense_index];
            self.slots[last_slot] = Some(dense_index);
            debug_assert_eq!(moved_slot, handle.0);
        }

        self.slots[handle.0] = None;
        self.free_slots.push(handle.0);
    }

    /// The dense instance records, in GPU instance order.
    pub fn quads(&self) -> &[QuadData] {
        &self.quads
    }

    /// Current instance count.
    pub fn len(&self) -> usize {
        self.quads.len()
    }

    /// Whether the pool holds no quads.
    pub fn is_empty(&self) -> bool {
        self.quads.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(x: f32) -> QuadData {
        QuadData::new([x, 0.0], [0.02, 0.04])
    }

    #[test]
    fn insert_and_set_round_trip() {
        let mut pool = QuadPool::new();
        let a = pool.insert(quad(1.0));
        let b = pool.insert(quad(2.0));

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(a), Some(quad(1.0)));
        assert_eq!(pool.get(b), Some(quad(2.0)));

        pool.set(a, quad(3.0));
        assert_eq!(pool.get(a), Some(quad(3.0)));
        assert_eq!(pool.quads()[0], quad(3.0));
    }

    #[test]
    fn copied_bytes_match_the_pool_contents() {
        // Mirrors the draw loop's per-frame copy: the instance buffer's
        // first N records must bit-match the pool.
        let mut pool = QuadPool::new();
        for i in 0..16 {
            pool.insert(quad(i as f32));
        }

        let bytes: &[u8] = bytemuck::cast_slice(pool.quads());
        let mut gpu_visible = vec![0u8; bytes.len()];
        gpu_visible.copy_from_slice(bytes);

        let round_tripped: &[QuadData] = bytemuck::cast_slice(&gpu_visible);
        assert_eq!(round_tripped, pool.quads());
    }

    #[test]
    fn remove_keeps_the_array_dense_and_handles_valid() {
        let mut pool = QuadPool::new();
        let a = pool.insert(quad(1.0));
        let b = pool.insert(quad(2.0));
        let c = pool.insert(quad(3.0));

        pool.remove(b);

        assert_eq!(pool.len(), 2);
        // c was swapped into b's dense position but its handle still works.
        assert_eq!(pool.get(a), Some(quad(1.0)));
        assert_eq!(pool.get(b), None);
        assert_eq!(pool.get(c), Some(quad(3.0)));
        assert_eq!(pool.quads(), &[quad(1.0), quad(3.0)]);
    }

    #[test]
    fn removed_slots_are_recycled() {
        let mut pool = QuadPool::new();
        let a = pool.insert(quad(1.0));
        pool.remove(a);
        let b = pool.insert(quad(2.0));

        assert_eq!(pool.len(), 1);
        assert_eq!(pool.get(b), Some(quad(2.0)));
        // The recycled slot means the stale handle now aliases `b`.
        assert_eq!(pool.get(a), pool.get(b));
    }

    #[test]
    fn removing_the_last_quad_empties_the_pool() {
        let mut pool = QuadPool::new();
        let a = pool.insert(quad(1.0));
        pool.remove(a);
        assert!(pool.is_empty());
        // Double remove is a no-op.
        pool.remove(a);
        assert!(pool.is_empty());
    }
}
