/*
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! A fixed-size-block allocator with an intrusive free list and
//! chunk-at-a-time growth (spec §4.1). Bucket policies with a variable
//! payload size (`LimP4`, `LimP`, `Lim4`, `UnlimP`) allocate their payload
//! slabs from one of these per size class; the data table allocates row
//! storage from one sized for exactly `total_row_size`.

use crate::{error::Error, settings::Settings};
use core::{alloc::Layout, ptr::NonNull};

/// Abstracts the underlying allocator so a pool's chunk source can be
/// swapped without touching the free-list bookkeeping. Mirrors the split
/// skymap's `RawTable` makes between itself and `mapalloc::Allocator`.
pub unsafe trait Allocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, ()>;
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

#[derive(Clone, Copy, Default)]
pub struct Global;

unsafe impl Allocator for Global {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, ()> {
        NonNull::new(unsafe { std::alloc::alloc(layout) }).ok_or(())
    }
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        std::alloc::dealloc(ptr.as_ptr(), layout)
    }
}

/// A free block, in-place, doubles as this node. Also records the chunk it
/// belongs to so the chunk's live-count can be decremented on free and the
/// chunk released once empty.
struct FreeNode {
    next: Option<NonNull<FreeNode>>,
    chunk: NonNull<ChunkHeader>,
}

pub struct ChunkHeader {
    /// number of blocks in this chunk currently handed out (not on any free
    /// list)
    live_count: usize,
    layout: Layout,
}

/// Per-pool parameters: block size/alignment plus the chunking policy. The
/// original distinguishes "static" pools (one fixed size known at
/// pool-construction time) from "dynamic" ones (size supplied per use
/// site); both map to this one struct here since Rust doesn't need a
/// compile-time/runtime split to get the same layout control the original
/// gets from template specialization.
#[derive(Clone, Copy)]
pub struct PoolParams {
    pub block_size: usize,
    pub block_align: usize,
    pub block_count_per_chunk: usize,
    pub cached_free_block_count: usize,
}

impl PoolParams {
    pub fn new(block_size: usize, block_align: usize) -> Self {
        Self::with_settings(block_size, block_align, &Settings::default())
    }

    pub fn with_settings(block_size: usize, block_align: usize, settings: &Settings) -> Self {
        let min_size = core::mem::size_of::<FreeNode>();
        let min_align = core::mem::align_of::<FreeNode>();
        Self {
            block_size: block_size.max(min_size),
            block_align: block_align.max(min_align),
            block_count_per_chunk: settings.pool_block_count_per_chunk,
            cached_free_block_count: settings.pool_cached_free_block_count,
        }
    }

    fn block_layout(&self) -> Layout {
        Layout::from_size_align(self.block_size, self.block_align).unwrap()
    }

    fn chunk_layout(&self) -> (Layout, usize) {
        let header = Layout::new::<ChunkHeader>();
        let block = self.block_layout();
        let (with_first, first_offset) = header.extend(block).unwrap();
        let mut layout = with_first;
        for _ in 1..self.block_count_per_chunk {
            layout = layout.extend(block).unwrap().0;
        }
        (layout.pad_to_align(), first_offset)
    }

    fn block_offset(&self, first_offset: usize, index: usize) -> usize {
        first_offset + index * self.block_layout().size()
    }
}

/// A pool over blocks of one size and alignment. Does not call item
/// constructors/destructors (spec §4.1): callers write and read raw bytes
/// through the returned pointers.
pub struct MemPool<A: Allocator = Global> {
    params: PoolParams,
    free_list: Option<NonNull<FreeNode>>,
    cached_free_count: usize,
    /// Every chunk currently owned by this pool (allocated, not yet
    /// [`Self::evict_chunk`]ed), so `Drop` can free them all rather than
    /// only the ones that happened to empty out and get evicted while the
    /// pool was in use.
    chunks: Vec<NonNull<ChunkHeader>>,
    allocator: A,
}

// A MemPool only moves blocks it allocated itself around between its own
// free list and chunk headers; nothing here is tied to thread-affinity.
unsafe impl<A: Allocator + Send> Send for MemPool<A> {}

impl MemPool<Global> {
    pub fn new(params: PoolParams) -> Self {
        Self::with_allocator(params, Global)
    }
}

impl<A: Allocator> MemPool<A> {
    pub fn with_allocator(params: PoolParams, allocator: A) -> Self {
        Self {
            params,
            free_list: None,
            cached_free_count: 0,
            chunks: Vec::new(),
            allocator,
        }
    }

    pub fn block_size(&self) -> usize {
        self.params.block_size
    }

    /// Allocate one block, growing by a whole chunk if the free list is
    /// empty. Returns the block together with the chunk header it belongs
    /// to; the caller must retain the chunk pointer and pass it back to
    /// [`Self::deallocate`].
    pub fn allocate(&mut self) -> Result<(NonNull<u8>, NonNull<ChunkHeader>), Error> {
        if let Some(node) = self.free_list {
            unsafe {
                let node_ref = node.as_ref();
                self.free_list = node_ref.next;
                let chunk = node_ref.chunk;
                (*chunk.as_ptr()).live_count += 1;
                self.cached_free_count -= 1;
                return Ok((node.cast(), chunk));
            }
        }
        self.allocate_chunk()
    }

    fn allocate_chunk(&mut self) -> Result<(NonNull<u8>, NonNull<ChunkHeader>), Error> {
        let (layout, first_offset) = self.params.chunk_layout();
        let raw = self
            .allocator
            .allocate(layout)
            .map_err(|_| Error::OutOfMemory)?;
        let chunk_ptr = raw.cast::<ChunkHeader>();
        unsafe {
            chunk_ptr.as_ptr().write(ChunkHeader {
                live_count: 1, // block 0 is handed out immediately, below
                layout,
            });
        }
        // thread every block but the first onto the free list
        for i in (1..self.params.block_count_per_chunk).rev() {
            let block_ptr = unsafe {
                NonNull::new_unchecked(raw.as_ptr().add(self.params.block_offset(first_offset, i)))
            };
            let node_ptr = block_ptr.cast::<FreeNode>();
            unsafe {
                node_ptr.as_ptr().write(FreeNode {
                    next: self.free_list,
                    chunk: chunk_ptr,
                });
            }
            self.free_list = Some(node_ptr);
            self.cached_free_count += 1;
        }
        let block0 = unsafe {
            NonNull::new_unchecked(raw.as_ptr().add(self.params.block_offset(first_offset, 0)))
        };
        self.chunks.push(chunk_ptr);
        Ok((block0, chunk_ptr))
    }

    /// Return a block to the pool.
    ///
    /// # Safety
    /// `ptr` and `chunk` must have been produced together by a prior
    /// [`Self::allocate`] call on this pool, and `ptr` must not already
    /// have been deallocated.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>, chunk: NonNull<ChunkHeader>) {
        let header = unsafe { &mut *chunk.as_ptr() };
        header.live_count -= 1;
        if header.live_count == 0 && self.cached_free_count >= self.params.cached_free_block_count
        {
            // chunk fully empty and we already have enough cached free
            // blocks elsewhere: drop this whole chunk instead of caching it
            self.evict_chunk(chunk);
            return;
        }
        let node_ptr = ptr.cast::<FreeNode>();
        unsafe {
            node_ptr.as_ptr().write(FreeNode {
                next: self.free_list,
                chunk,
            });
        }
        self.free_list = Some(node_ptr);
        self.cached_free_count += 1;
    }

    fn evict_chunk(&mut self, chunk: NonNull<ChunkHeader>) {
        let mut remaining: Option<NonNull<FreeNode>> = None;
        let mut cursor = self.free_list.take();
        let mut removed = 0usize;
        while let Some(node) = cursor {
            let node_ref = unsafe { node.as_ref() };
            let next = node_ref.next;
            if node_ref.chunk == chunk {
                removed += 1;
            } else {
                unsafe {
                    (*node.as_ptr()).next = remaining;
                }
                remaining = Some(node);
            }
            cursor = next;
        }
        self.free_list = remaining;
        self.cached_free_count -= removed;
        self.chunks.retain(|&c| c != chunk);
        let layout = unsafe { (*chunk.as_ptr()).layout };
        unsafe {
            self.allocator.deallocate(chunk.cast(), layout);
        }
    }
}

impl<A: Allocator> Drop for MemPool<A> {
    fn drop(&mut self) {
        // Pools rely on their owner (a bucket `Params` or the table's row
        // pool) having already deallocated every block it handed out
        // before dropping the pool itself; what's left here is chunks that
        // never got evicted because they kept enough cached free blocks to
        // satisfy `cached_free_block_count` (spec §4.1 "freed when fully
        // empty" — at drop, every chunk is fully empty by the caller's
        // contract, evicted or not).
        for chunk in self.chunks.drain(..) {
            let layout = unsafe { (*chunk.as_ptr()).layout };
            unsafe {
                self.allocator.deallocate(chunk.cast(), layout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MemPool, PoolParams};

    #[test]
    fn allocate_and_free_roundtrip() {
        let mut pool = MemPool::new(PoolParams::new(16, 8));
        let (a, ca) = pool.allocate().unwrap();
        let (b, cb) = pool.allocate().unwrap();
        assert_ne!(a, b);
        unsafe {
            pool.deallocate(a, ca);
            pool.deallocate(b, cb);
        }
    }

    #[test]
    fn chunk_growth_beyond_one_block_count() {
        let mut params = PoolParams::new(8, 8);
        params.block_count_per_chunk = 2;
        let mut pool = MemPool::new(params);
        let mut blocks = Vec::new();
        for _ in 0..5 {
            blocks.push(pool.allocate().unwrap());
        }
        for (ptr, chunk) in blocks {
            unsafe { pool.deallocate(ptr, chunk) };
        }
    }
}
