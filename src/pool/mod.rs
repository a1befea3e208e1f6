//! 固定長オブジェクト用のプール.
//!
//! [ObjectPool]は、同じサイズのオブジェクト群の割当と解放を、
//! 汎用アロケータを経由せずに行うためのメモリ管理器.
//!
//! # 構造
//!
//! ```text
//! ObjectPool
//!   └── BlockRing (ブロック参照の循環配列: [front, rear) の範囲に全ての生存ブロックが並ぶ)
//!         ├── ObjectBlock #0 (1024スロット + 空きビットマップ)
//!         ├── ObjectBlock #1
//!         └── ...
//! ```
//!
//! - 割当時には`curr`から前方、次に後方へと走査して、空きのあるブロックを探す
//!   - 見つからなかった場合には、新しいブロックを生成する (必要ならリングを倍の容量に拡張する)
//! - 解放時に全スロットが空いたブロックは、リングの末尾に移されて再利用される
//!   - リングに空きが無い場合の扱いは[OverflowPolicy]に従う
//!
//! [ObjectPool]: ./struct.ObjectPool.html
//! [OverflowPolicy]: ./enum.OverflowPolicy.html
use slog::Logger;
use std::ptr::NonNull;

pub use self::builder::ObjectPoolBuilder;
pub use self::overflow::OverflowPolicy;

use self::arena::BlockArena;
use self::builder::SlotConstructor;
use self::ring::BlockRing;
use crate::block::{self, BlockId, BlockMemory, ObjectBlock, ObjectHeader, BLOCK_CAPACITY};
use crate::metrics::ObjectPoolMetrics;
use crate::page::PageSize;
use crate::{ErrorKind, Result};

mod arena;
mod builder;
mod overflow;
mod ring;

/// 固定長オブジェクト用のプール.
///
/// 内部的な同期は行わないので、複数スレッドから共有する場合には`Mutex`等で保護する必要がある.
///
/// # Examples
///
/// ```
/// use objpool::ObjectPool;
///
/// let mut pool = ObjectPool::new(64).unwrap();
/// let object = pool.get().unwrap();
/// unsafe {
///     std::ptr::write_bytes(object.as_ptr(), 0xFF, 64);
///     pool.release(object.as_ptr());
/// }
/// assert_eq!(pool.used_count(), 0);
/// ```
#[derive(Debug)]
pub struct ObjectPool {
    object_size: usize,
    slot_size: usize,
    ring: BlockRing,
    arena: BlockArena,
    constructor: Option<SlotConstructor>,
    page_size: PageSize,
    overflow_policy: OverflowPolicy,
    logger: Logger,
    metrics: ObjectPoolMetrics,
}
impl ObjectPool {
    /// デフォルト設定で、`object_size`バイトのオブジェクト用のプールを生成する.
    ///
    /// 設定を変更したい場合には`ObjectPoolBuilder`を使用すること.
    pub fn new(object_size: usize) -> Result<Self> {
        track!(ObjectPoolBuilder::new().build(object_size))
    }

    pub(crate) fn with_builder(builder: &ObjectPoolBuilder, object_size: usize) -> Result<Self> {
        track_assert!(object_size > 0, ErrorKind::InvalidInput);
        let slot_size = track_assert_some!(
            block::slot_size(object_size)
                .and_then(|size| size.checked_mul(BLOCK_CAPACITY).map(|_| size)),
            ErrorKind::InvalidInput,
            "Too large object size: {}",
            object_size
        );
        let ring = track!(BlockRing::new(builder.min_ring_capacity))?;
        let metrics = ObjectPoolMetrics::new(&builder.metrics);
        metrics.ring_capacity.set(ring.capacity() as f64);

        let mut pool = ObjectPool {
            object_size,
            slot_size,
            ring,
            arena: BlockArena::new(),
            constructor: builder.constructor.clone(),
            page_size: builder.page_size,
            overflow_policy: builder.overflow_policy,
            logger: builder.logger.clone(),
            metrics,
        };
        for _ in 0..builder.initial_blocks {
            track!(pool.expand())?;
        }
        info!(pool.logger, "Object pool is initialized";
              "object_size" => object_size,
              "slot_size" => slot_size,
              "blocks" => pool.arena.len(),
              "ring_capacity" => pool.ring.capacity(),
              "overflow_policy" => format!("{:?}", pool.overflow_policy));
        Ok(pool)
    }

    /// オブジェクトのサイズ(バイト単位)を返す.
    pub fn object_size(&self) -> usize {
        self.object_size
    }

    /// ヘッダを含めた一スロットあたりのサイズ(バイト単位)を返す.
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// 現在保持しているブロックの数を返す.
    pub fn block_count(&self) -> usize {
        self.arena.len()
    }

    /// ブロック参照用リングの現在の容量を返す.
    pub fn ring_capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// 使用中のオブジェクトの数を返す.
    ///
    /// 全ブロックを走査するので、頻繁に呼び出すことは想定されていない.
    pub fn used_count(&self) -> usize {
        self.arena.iter().map(ObjectBlock::used_count).sum()
    }

    /// 空きブロックがリングに収まらない場合の扱いを返す.
    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow_policy
    }

    /// プールのメトリクスを返す.
    pub fn metrics(&self) -> &ObjectPoolMetrics {
        &self.metrics
    }

    /// オブジェクトを一つ割り当てて、そのデータ領域の先頭を返す.
    ///
    /// 返されたポインタは`object_size()`バイトの領域を指しており、8バイト境界に揃っている.
    /// 領域は`release()`が呼ばれるか、プールが破棄されるまで有効.
    ///
    /// メモリ不足により新しいブロックが確保できなかった場合には`None`が返される.
    /// その際には、プールの状態は呼び出し前のまま維持される.
    ///
    /// # Panics
    ///
    /// 内部状態の不整合が検出された場合には、現在のスレッドがパニックする.
    pub fn get(&mut self) -> Option<NonNull<u8>> {
        let index = match self.find_available_block() {
            Some(index) => index,
            None => match self.expand() {
                Ok(index) => index,
                Err(ref e) if *e.kind() == ErrorKind::OutOfMemory => {
                    warn!(self.logger, "Cannot expand the object pool: {}", e;
                          "blocks" => self.arena.len(),
                          "ring_capacity" => self.ring.capacity());
                    self.metrics.nomemory_failures.increment();
                    return None;
                }
                Err(e) => panic!("Broken object pool: {}", e),
            },
        };
        self.ring.set_curr(index);

        let id = self.ring.get(index);
        let object = match id.and_then(|id| self.arena.get_mut(id)).and_then(|b| b.allocate()) {
            Some(object) => object,
            None => unreachable!("The selected block has no free slot: index={}", index),
        };
        self.metrics.allocated_objects.increment();
        Some(object)
    }

    /// `get()`で割り当てたオブジェクトを解放する.
    ///
    /// `object`がヌルポインタの場合には何も行わない.
    ///
    /// 解放によって全スロットが空いたブロックは、リングの末尾で再利用される
    /// (ただし直近に割当を行ったブロックは対象外).
    ///
    /// # Safety
    ///
    /// `object`は、このプールの`get()`が返したポインタで、かつ未解放である必要がある.
    ///
    /// 二重解放はデバッグビルドでのみ検出される.
    ///
    /// # Panics
    ///
    /// `object`のヘッダが、このプールに存在しないブロックを指している場合には、現在のスレッドがパニックする.
    pub unsafe fn release(&mut self, object: *mut u8) {
        let object = match NonNull::new(object) {
            None => return,
            Some(object) => object,
        };
        let header = ObjectHeader::read_before(object);

        let owner = header.owner();
        let (is_free, ring_index) = {
            let block = match self.arena.get_mut(owner) {
                Some(block) => block,
                None => panic!("Unknown owner block: {:?}", header),
            };
            block.release(header);
            (block.is_completely_free(), block.ring_index())
        };
        self.metrics.released_objects.increment();

        if is_free && ring_index != self.ring.curr() {
            self.recycle_block(owner, ring_index);
        }
    }

    /// 全てのブロックとリングを破棄する.
    ///
    /// 既に破棄済みの場合には何も行わない.
    ///
    /// 破棄後も、プール自体は使用可能で、次の`get()`でリングとブロックが再び確保される.
    /// ただし、破棄前に割り当てられたオブジェクトは全て無効となる.
    ///
    /// `Drop`時にも自動で呼び出される.
    pub fn deinit(&mut self) {
        if self.arena.len() == 0 && self.ring.capacity() == 0 {
            return;
        }
        info!(self.logger, "Object pool is torn down";
              "blocks" => self.arena.len(),
              "used_objects" => self.used_count());
        self.arena.clear();
        self.ring.clear();
        self.metrics.ring_capacity.set(0.0);
    }

    fn find_available_block(&self) -> Option<usize> {
        let arena = &self.arena;
        let is_available = |id: BlockId| arena.get(id).map_or(false, |b| !b.is_full_capacity_used());
        self.ring
            .find_forward(&is_available)
            .or_else(|| self.ring.find_backward(&is_available))
    }

    /// 新しいブロックを生成してリングの末尾に追加し、その位置を返す.
    ///
    /// `ErrorKind::OutOfMemory`が返された場合には、リングもブロック群も変更されていない.
    fn expand(&mut self) -> Result<usize> {
        // リングに手を加える前に、失敗し得る確保は全て済ませておく
        let mut memory = track!(BlockMemory::allocate(self.slot_size * BLOCK_CAPACITY))?;
        let id = track!(self.arena.reserve())?;
        if self.constructor.is_none() {
            memory.warm_up(self.page_size);
        }

        if self.arena.len() >= self.ring.capacity() {
            let old_capacity = self.ring.capacity();
            track!(self.ring.grow(&mut self.arena))?;
            self.metrics.ring_growths.increment();
            self.metrics.ring_capacity.set(self.ring.capacity() as f64);
            info!(self.logger, "Block ring is grown";
                  "old_capacity" => old_capacity,
                  "new_capacity" => self.ring.capacity());
        }
        if self.ring.is_window_full() {
            self.compact();
            track_assert!(!self.ring.is_window_full(), ErrorKind::InconsistentState;
                          self.arena.len(), self.ring.capacity());
        }

        let mut block = ObjectBlock::new(id, self.slot_size, memory, self.ring.rear());
        if let Some(ref constructor) = self.constructor {
            block.for_each_slot(|data| constructor.call(data));
        }
        track!(self.arena.insert(block))?;
        let index = self.ring.push(id);
        debug_assert_eq!(self.ring.len(), self.arena.len());
        self.metrics.created_blocks.increment();
        debug!(self.logger, "New block is created";
               "id" => id.as_u32(), "ring_index" => index, "blocks" => self.arena.len());
        Ok(index)
    }

    fn recycle_block(&mut self, id: BlockId, ring_index: usize) {
        let taken = self.ring.take(ring_index);
        debug_assert_eq!(taken, Some(id));

        if self.ring.is_window_full() {
            match self.overflow_policy {
                OverflowPolicy::Compact => {
                    self.compact();
                    if self.ring.is_window_full() {
                        unreachable!("No room after compaction: ring_index={}", ring_index);
                    }
                }
                OverflowPolicy::Dispose => {
                    self.arena.remove(id);
                    self.metrics.disposed_blocks.increment();
                    debug!(self.logger, "Free block is disposed";
                           "id" => id.as_u32(), "blocks" => self.arena.len());
                    self.ring.advance_front();
                    return;
                }
            }
        }

        let new_index = self.ring.push(id);
        if let Some(block) = self.arena.get_mut(id) {
            block.reset(new_index);
        }
        self.metrics.recycled_blocks.increment();
        debug!(self.logger, "Free block is recycled";
               "id" => id.as_u32(), "old_ring_index" => ring_index, "new_ring_index" => new_index);
        self.ring.advance_front();
    }

    fn compact(&mut self) {
        let front = self.ring.front();
        let rear = self.ring.rear();
        self.ring.make_room(&mut self.arena);
        self.metrics.compactions.increment();
        debug!(self.logger, "Block ring is compacted";
               "old_front" => front, "new_front" => self.ring.front(),
               "old_rear" => rear, "new_rear" => self.ring.rear(),
               "curr" => self.ring.curr());
    }
}
impl Drop for ObjectPool {
    fn drop(&mut self) {
        self.deinit();
    }
}
