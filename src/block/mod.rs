//! オブジェクトブロック(固定数のスロットをまとめて管理する単位)関連の構成要素.
//!
//! 各ブロックは`BLOCK_CAPACITY`個のスロットを持ち、
//! その空き状況をビットマップ(空き=1, 使用中=0)で管理している.
//!
//! スロットのレイアウトは以下の通り:
//!
//! ```text
//! +-----------------------+----------------------------------+
//! | ObjectHeader (8bytes) | object (align8(object_size)bytes) |
//! +-----------------------+----------------------------------+
//! ```
use std::ptr::NonNull;

pub use self::header::{ObjectHeader, HEADER_SIZE};

pub(crate) use self::memory::BlockMemory;

mod header;
mod memory;

/// 一つのブロックが保持するスロットの数.
pub const BLOCK_CAPACITY: usize = 1024;

type BitSet = u64;

const BITSET_BITS: usize = 64;
const BITSET_SCALE: u32 = 6; // 2^6 = 64
const BITMAP_LEN: usize = BLOCK_CAPACITY / BITSET_BITS;

/// プール内のブロックを識別するための番号.
///
/// ヘッダには、ブロックのアドレスではなく、この番号が格納される.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(u32);
impl BlockId {
    /// 新しい`BlockId`インスタンスを生成する.
    pub fn new(id: u32) -> Self {
        BlockId(id)
    }

    /// 識別番号を`u32`として返す.
    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub(crate) fn as_index(self) -> usize {
        self.0 as usize
    }
}

/// `object_size`バイトのオブジェクトを格納するためのスロットのサイズを返す.
///
/// オブジェクト部分は8バイト境界に切り上げられ、その前にヘッダ分のサイズが加算される.
///
/// 計算結果が`usize`の範囲を超える場合には`None`が返される.
///
/// # Examples
///
/// ```
/// use objpool::block::slot_size;
///
/// assert_eq!(slot_size(1), Some(16));
/// assert_eq!(slot_size(8), Some(16));
/// assert_eq!(slot_size(9), Some(24));
/// assert_eq!(slot_size(4096), Some(4104));
/// assert_eq!(slot_size(usize::max_value()), None);
/// ```
pub fn slot_size(object_size: usize) -> Option<usize> {
    object_size
        .checked_add(HEADER_SIZE - 1)
        .map(|size| size & !(HEADER_SIZE - 1))
        .and_then(|size| size.checked_add(HEADER_SIZE))
}

/// 固定数のスロットを保持するブロック.
///
/// 割当は常に「番号が最も小さい空きスロット」から行われる.
/// (ビットマップの先頭のワードから順に走査し、各ワード内では最下位ビットを優先する)
///
/// 不変項: `used_count()`はビットマップ内の`0`の数と等しい.
#[derive(Debug)]
pub struct ObjectBlock {
    id: BlockId,
    used: u16,
    ring_index: usize,
    free_bitmap: [BitSet; BITMAP_LEN],
    slot_size: usize,
    memory: BlockMemory,
}
impl ObjectBlock {
    /// 新しい`ObjectBlock`インスタンスを生成する.
    ///
    /// `memory`は`slot_size * BLOCK_CAPACITY`バイト以上の大きさを持っている必要がある.
    pub(crate) fn new(id: BlockId, slot_size: usize, memory: BlockMemory, ring_index: usize) -> Self {
        debug_assert!(slot_size > HEADER_SIZE);
        debug_assert!(memory.len() >= slot_size * BLOCK_CAPACITY);
        let mut block = ObjectBlock {
            id,
            used: 0,
            ring_index,
            free_bitmap: [0; BITMAP_LEN],
            slot_size,
            memory,
        };
        block.reset(ring_index);
        block
    }

    /// ブロックの識別番号を返す.
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// ブロックのリング内での現在位置を返す.
    pub fn ring_index(&self) -> usize {
        self.ring_index
    }

    /// 使用中のスロットの数を返す.
    pub fn used_count(&self) -> usize {
        usize::from(self.used)
    }

    /// 全てのスロットが使用中かどうかを判定する.
    pub fn is_full_capacity_used(&self) -> bool {
        usize::from(self.used) == BLOCK_CAPACITY
    }

    /// 使用中のスロットが一つも無いかどうかを判定する.
    pub fn is_completely_free(&self) -> bool {
        self.used == 0
    }

    /// `slot_index`番目のスロットが使用中かどうかを判定する.
    pub fn is_allocated(&self, slot_index: u16) -> bool {
        let (word, bit) = bit_position(slot_index);
        self.free_bitmap[word] & (1 << bit) == 0
    }

    /// 全てのスロットを空きにした上で、リング内での位置を更新する.
    ///
    /// 使用中のスロットがあった場合でも、その内容は考慮されない.
    pub(crate) fn reset(&mut self, ring_index: usize) {
        self.used = 0;
        self.ring_index = ring_index;
        self.free_bitmap = [BitSet::max_value(); BITMAP_LEN];
    }

    /// スロットの状態は維持したまま、リング内での位置だけを更新する.
    pub(crate) fn set_ring_index(&mut self, ring_index: usize) {
        self.ring_index = ring_index;
    }

    /// 空きスロットを一つ割り当てて、そのデータ領域の先頭を返す.
    ///
    /// スロットのヘッダは、このブロックとスロット番号で上書きされる.
    ///
    /// 空きスロットが存在しない場合には`None`が返される.
    pub(crate) fn allocate(&mut self) -> Option<NonNull<u8>> {
        for (word, bits) in self.free_bitmap.iter_mut().enumerate() {
            if *bits == 0 {
                continue;
            }

            let bit = bits.trailing_zeros();
            *bits &= !(1 << bit);
            self.used += 1;

            let slot_index = ((word << BITSET_SCALE) as u16) + bit as u16;
            let slot = self.memory.offset_ptr(usize::from(slot_index) * self.slot_size);
            unsafe {
                ObjectHeader::new(slot_index, self.id).write_to(slot);
                return Some(NonNull::new_unchecked(slot.as_ptr().add(HEADER_SIZE)));
            }
        }
        None
    }

    /// `header`が示すスロットを解放する.
    ///
    /// # 事前条件
    ///
    /// - `header`は、このブロックが割り当てた未解放のスロットのもの
    ///
    /// 事前条件のチェックはデバッグビルドでのみ行われる.
    pub(crate) fn release(&mut self, header: ObjectHeader) {
        debug_assert_eq!(header.owner(), self.id);
        debug_assert!(
            self.is_allocated(header.slot_index()),
            "Double release: {:?}",
            header
        );
        let (word, bit) = bit_position(header.slot_index());
        self.free_bitmap[word] |= 1 << bit;
        self.used -= 1;
    }

    /// 全スロットのデータ領域の先頭を、番号順に`f`に渡す.
    pub(crate) fn for_each_slot<F>(&mut self, mut f: F)
    where
        F: FnMut(NonNull<u8>),
    {
        for slot_index in 0..BLOCK_CAPACITY {
            let slot = self.memory.offset_ptr(slot_index * self.slot_size);
            f(unsafe { NonNull::new_unchecked(slot.as_ptr().add(HEADER_SIZE)) });
        }
    }
}

fn bit_position(slot_index: u16) -> (usize, u32) {
    let slot_index = usize::from(slot_index);
    (
        slot_index >> BITSET_SCALE,
        (slot_index & (BITSET_BITS - 1)) as u32,
    )
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;

    fn block(object_size: usize) -> Result<ObjectBlock, crate::Error> {
        let slot_size = slot_size(object_size).unwrap();
        let memory = track!(BlockMemory::allocate(slot_size * BLOCK_CAPACITY))?;
        Ok(ObjectBlock::new(BlockId::new(5), slot_size, memory, 3))
    }

    fn header_of(data: NonNull<u8>) -> ObjectHeader {
        unsafe { ObjectHeader::read_before(data) }
    }

    #[test]
    fn it_works() -> TestResult {
        let mut block = track!(block(10))?;
        assert_eq!(block.id(), BlockId::new(5));
        assert_eq!(block.ring_index(), 3);
        assert_eq!(block.used_count(), 0);
        assert!(block.is_completely_free());
        assert!(!block.is_full_capacity_used());

        let a = block.allocate().unwrap();
        let b = block.allocate().unwrap();
        assert_eq!(block.used_count(), 2);
        assert!(!block.is_completely_free());
        assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 24);

        assert_eq!(header_of(a), ObjectHeader::new(0, BlockId::new(5)));
        assert_eq!(header_of(b), ObjectHeader::new(1, BlockId::new(5)));
        assert!(block.is_allocated(0));
        assert!(block.is_allocated(1));
        assert!(!block.is_allocated(2));

        block.release(header_of(a));
        block.release(header_of(b));
        assert!(block.is_completely_free());
        Ok(())
    }

    #[test]
    fn lowest_free_slot_is_allocated_first() -> TestResult {
        let mut block = track!(block(8))?;
        let slots = (0..130)
            .map(|_| block.allocate().unwrap())
            .collect::<Vec<_>>();
        for (i, slot) in slots.iter().enumerate() {
            assert_eq!(usize::from(header_of(*slot).slot_index()), i);
        }

        block.release(header_of(slots[100]));
        block.release(header_of(slots[3]));
        block.release(header_of(slots[64]));

        let again = block.allocate().unwrap();
        assert_eq!(again, slots[3]);
        let again = block.allocate().unwrap();
        assert_eq!(again, slots[64]);
        let again = block.allocate().unwrap();
        assert_eq!(again, slots[100]);
        let next = block.allocate().unwrap();
        assert_eq!(header_of(next).slot_index(), 130);
        Ok(())
    }

    #[test]
    fn full_block() -> TestResult {
        let mut block = track!(block(8))?;
        let slots = (0..BLOCK_CAPACITY)
            .map(|_| block.allocate().unwrap())
            .collect::<Vec<_>>();
        assert!(block.is_full_capacity_used());
        assert_eq!(block.used_count(), BLOCK_CAPACITY);
        assert_eq!(block.allocate(), None);

        block.release(header_of(slots[1023]));
        assert!(!block.is_full_capacity_used());
        assert_eq!(
            header_of(block.allocate().unwrap()).slot_index(),
            (BLOCK_CAPACITY - 1) as u16
        );
        Ok(())
    }

    #[test]
    fn reset_works() -> TestResult {
        let mut block = track!(block(8))?;
        for _ in 0..100 {
            block.allocate().unwrap();
        }
        block.reset(42);
        assert_eq!(block.ring_index(), 42);
        assert!(block.is_completely_free());
        assert_eq!(header_of(block.allocate().unwrap()).slot_index(), 0);

        block.set_ring_index(7);
        assert_eq!(block.ring_index(), 7);
        assert_eq!(block.used_count(), 1);
        Ok(())
    }

    #[test]
    fn slots_do_not_overlap() -> TestResult {
        let object_size = 20;
        let mut block = track!(block(object_size))?;
        let slots = (0..BLOCK_CAPACITY)
            .map(|_| block.allocate().unwrap())
            .collect::<Vec<_>>();
        for (i, slot) in slots.iter().enumerate() {
            unsafe { std::ptr::write_bytes(slot.as_ptr(), i as u8, object_size) };
        }
        for (i, slot) in slots.iter().enumerate() {
            let bytes = unsafe { std::slice::from_raw_parts(slot.as_ptr(), object_size) };
            assert!(bytes.iter().all(|&b| b == i as u8));
            assert_eq!(usize::from(header_of(*slot).slot_index()), i);
        }
        Ok(())
    }

    #[test]
    fn for_each_slot_visits_every_slot() -> TestResult {
        let mut block = track!(block(8))?;
        let mut visited = Vec::new();
        block.for_each_slot(|data| visited.push(data));
        assert_eq!(visited.len(), BLOCK_CAPACITY);

        let first = block.allocate().unwrap();
        assert_eq!(first, visited[0]);
        assert_eq!(
            visited[1].as_ptr() as usize - visited[0].as_ptr() as usize,
            block.slot_size
        );
        Ok(())
    }

    #[test]
    #[should_panic]
    #[cfg(debug_assertions)]
    fn double_release_is_detected_in_debug_builds() {
        let mut block = block(8).expect("Unexpected panic");
        let slot = block.allocate().unwrap();
        block.release(header_of(slot));
        block.release(header_of(slot));
    }
}
