use super::arena::BlockArena;
use crate::block::BlockId;
use crate::{ErrorKind, Result};

/// ブロック参照用のリングバッファ.
///
/// `[front, rear)`の範囲(リング上で循環)に、全ての生存ブロックへの参照が格納されている.
/// ブロックが順不同で返却されるため、この範囲内には空きスロット(`None`)が含まれることがある.
///
/// `front == rear`の場合には、範囲が空か、リング全体を覆っているかのいずれかとなる.
/// 両者は生存ブロックの数(`len`)で区別する.
///
/// 不変項:
///
/// - 各ブロックの`ring_index()`は、そのブロックが格納されている位置と等しい
/// - `[rear, front)`の範囲には参照が存在しない
#[derive(Debug)]
pub(crate) struct BlockRing {
    slots: Vec<Option<BlockId>>,

    /// 範囲の始端.
    front: usize,

    /// 範囲の終端.
    ///
    /// ここが次のブロックの挿入位置となる.
    rear: usize,

    /// 直近に割当を行ったブロックの位置.
    ///
    /// 探索の開始位置として使われるだけで、範囲の境界ではない.
    curr: usize,

    /// 格納されている参照の数.
    len: usize,

    min_capacity: usize,
}
impl BlockRing {
    /// 容量が`min_capacity`のリングを生成する.
    pub fn new(min_capacity: usize) -> Result<Self> {
        track_assert!(min_capacity > 0, ErrorKind::InvalidInput);
        let mut slots = Vec::new();
        track!(slots.try_reserve_exact(min_capacity).map_err(crate::Error::from))?;
        slots.resize(min_capacity, None);
        Ok(BlockRing {
            slots,
            front: 0,
            rear: 0,
            curr: 0,
            len: 0,
            min_capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn front(&self) -> usize {
        self.front
    }

    pub fn rear(&self) -> usize {
        self.rear
    }

    pub fn curr(&self) -> usize {
        self.curr
    }

    pub fn set_curr(&mut self, index: usize) {
        debug_assert!(index < self.capacity());
        self.curr = index;
    }

    pub fn get(&self, index: usize) -> Option<BlockId> {
        self.slots.get(index).cloned().and_then(|id| id)
    }

    /// 範囲がリング全体を覆っていて、末尾に挿入する余地が無いかどうかを判定する.
    pub fn is_window_full(&self) -> bool {
        self.len > 0 && self.front == self.rear
    }

    /// 範囲に含まれるスロットの数(空きスロットを含む)を返す.
    pub fn window_len(&self) -> usize {
        if self.is_window_full() {
            self.capacity()
        } else {
            self.offset(self.rear)
        }
    }

    /// 前方から`curr`,`curr+1`,...,`rear-1`の順に走査し、`f`を満たす最初のブロックの位置を返す.
    pub fn find_forward<F>(&self, f: F) -> Option<usize>
    where
        F: Fn(BlockId) -> bool,
    {
        let window_len = self.window_len();
        let start = self.offset(self.curr);
        (start..window_len)
            .map(|offset| self.index_at(offset))
            .find(|&i| self.slots[i].map_or(false, |id| f(id)))
    }

    /// 後方へ`curr`,`curr-1`,...,`front`の順に走査し、`f`を満たす最初のブロックの位置を返す.
    pub fn find_backward<F>(&self, f: F) -> Option<usize>
    where
        F: Fn(BlockId) -> bool,
    {
        let window_len = self.window_len();
        if window_len == 0 {
            return None;
        }
        let start = std::cmp::min(self.offset(self.curr), window_len - 1);
        (0..=start)
            .rev()
            .map(|offset| self.index_at(offset))
            .find(|&i| self.slots[i].map_or(false, |id| f(id)))
    }

    /// 末尾にブロックを追加して、その位置を返す.
    ///
    /// 呼び出し前に`is_window_full()`が`false`であることを保証する必要がある.
    pub fn push(&mut self, id: BlockId) -> usize {
        debug_assert!(!self.is_window_full());
        debug_assert_eq!(self.slots[self.rear], None);
        let index = self.rear;
        self.slots[index] = Some(id);
        self.rear = self.next(index);
        self.len += 1;
        index
    }

    /// 指定位置の参照を取り除く.
    pub fn take(&mut self, index: usize) -> Option<BlockId> {
        let id = self.slots[index].take();
        if id.is_some() {
            self.len -= 1;
        }
        id
    }

    /// 先頭側の空きスロットを範囲から外す.
    ///
    /// `front`は`curr`(および`rear`)を越えては進まない.
    pub fn advance_front(&mut self) {
        while self.slots[self.front].is_none() && self.front != self.curr {
            if self.front == self.rear && !self.is_window_full() {
                break;
            }
            self.front = self.next(self.front);
        }
    }

    /// `[front, curr)`の範囲の参照群を`curr`の直前に詰め直す.
    ///
    /// 後方から二つのカーソル(読込用と書込用)を動かす一回の走査で行われる.
    /// 移動したブロックの`ring_index`は新しい位置に更新され、`front`は詰め終わった位置になる.
    ///
    /// 結果として範囲から外れたスロットの数を返す.
    pub fn compact_front(&mut self, arena: &mut BlockArena) -> usize {
        let span = self.offset(self.curr);
        let mut read = self.curr;
        let mut write = self.curr;
        for _ in 0..span {
            read = self.prev(read);
            if let Some(id) = self.slots[read] {
                write = self.prev(write);
                if write != read {
                    self.move_slot(read, write, id, arena);
                }
            }
        }

        let released = self.distance(self.front, write);
        self.front = write;
        released
    }

    /// `(curr, rear)`の範囲の参照群を`curr`の直後に詰め直す.
    ///
    /// `compact_front()`の前後を入れ替えたもので、`rear`は詰め終わった位置の直後になる.
    ///
    /// 結果として範囲から外れたスロットの数を返す.
    pub fn compact_rear(&mut self, arena: &mut BlockArena) -> usize {
        let window_len = self.window_len();
        let curr_offset = self.offset(self.curr);
        if curr_offset >= window_len {
            return 0;
        }

        let span = window_len - curr_offset - 1;
        let mut read = self.curr;
        let mut write = self.curr;
        for _ in 0..span {
            read = self.next(read);
            if let Some(id) = self.slots[read] {
                write = self.next(write);
                if write != read {
                    self.move_slot(read, write, id, arena);
                }
            }
        }

        let new_rear = self.next(write);
        let released = window_len - (self.offset(write) + 1);
        self.rear = new_rear;
        released
    }

    /// 範囲がリング全体を覆っている場合に、コンパクションによって挿入用の空きを作る.
    ///
    /// まず`compact_front()`を試し、それで空きができなかった場合には`compact_rear()`を行う.
    ///
    /// 空きができたかどうかを返す.
    pub fn make_room(&mut self, arena: &mut BlockArena) -> bool {
        if !self.is_window_full() {
            return true;
        }
        if self.compact_front(arena) == 0 {
            self.compact_rear(arena);
        }
        !self.is_window_full()
    }

    /// 容量を倍にした上で、全ての参照をインデックス`0`から順に詰め直す.
    ///
    /// 容量が`0`の場合には、`min_capacity`に拡張される.
    ///
    /// 新しい領域の確保に失敗した場合には、状態は変更されない.
    pub fn grow(&mut self, arena: &mut BlockArena) -> Result<()> {
        let new_capacity = std::cmp::max(self.capacity() * 2, self.min_capacity);
        let mut slots = Vec::new();
        track!(slots.try_reserve_exact(new_capacity).map_err(crate::Error::from))?;

        let window_len = self.window_len();
        for offset in 0..window_len {
            if let Some(id) = self.slots[self.index_at(offset)] {
                if let Some(block) = arena.get_mut(id) {
                    block.set_ring_index(slots.len());
                }
                slots.push(Some(id));
            }
        }
        track_assert_eq!(slots.len(), self.len, ErrorKind::InconsistentState);

        let len = slots.len();
        slots.resize(new_capacity, None);
        self.slots = slots;
        self.front = 0;
        self.curr = 0;
        self.rear = len % new_capacity;
        Ok(())
    }

    /// 全ての参照を破棄して、容量を`0`にする.
    ///
    /// 次の`grow()`で`min_capacity`の容量が確保される.
    pub fn clear(&mut self) {
        self.slots = Vec::new();
        self.front = 0;
        self.rear = 0;
        self.curr = 0;
        self.len = 0;
    }

    fn move_slot(&mut self, from: usize, to: usize, id: BlockId, arena: &mut BlockArena) {
        debug_assert_eq!(self.slots[to], None);
        self.slots[to] = Some(id);
        self.slots[from] = None;
        if let Some(block) = arena.get_mut(id) {
            block.set_ring_index(to);
        }
    }

    fn next(&self, index: usize) -> usize {
        (index + 1) % self.capacity()
    }

    fn prev(&self, index: usize) -> usize {
        (index + self.capacity() - 1) % self.capacity()
    }

    /// `front`から`index`までの距離.
    fn offset(&self, index: usize) -> usize {
        self.distance(self.front, index)
    }

    fn distance(&self, from: usize, to: usize) -> usize {
        if self.capacity() == 0 {
            0
        } else {
            (to + self.capacity() - from) % self.capacity()
        }
    }

    fn index_at(&self, offset: usize) -> usize {
        (self.front + offset) % self.capacity()
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;
    use crate::block::{slot_size, BlockMemory, ObjectBlock, BLOCK_CAPACITY};

    /// `blocks`個のブロックを生成して、リングに順に挿入する.
    fn setup(capacity: usize, blocks: usize) -> Result<(BlockRing, BlockArena)> {
        let mut ring = track!(BlockRing::new(capacity))?;
        let mut arena = BlockArena::new();
        for _ in 0..blocks {
            let id = track!(arena.next_id())?;
            let slot_size = slot_size(8).unwrap();
            let memory = track!(BlockMemory::allocate(slot_size * BLOCK_CAPACITY))?;
            let index = ring.push(id);
            track!(arena.insert(ObjectBlock::new(id, slot_size, memory, index)))?;
        }
        Ok((ring, arena))
    }

    fn ids(ring: &BlockRing) -> Vec<Option<u32>> {
        ring.slots.iter().map(|s| s.map(|id| id.as_u32())).collect()
    }

    fn assert_ring_indices(ring: &BlockRing, arena: &BlockArena) {
        for (i, slot) in ring.slots.iter().enumerate() {
            if let Some(id) = *slot {
                assert_eq!(arena.get(id).map(|b| b.ring_index()), Some(i));
            }
        }
    }

    #[test]
    fn push_and_take() -> TestResult {
        let (mut ring, _arena) = track!(setup(4, 3))?;
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.front(), 0);
        assert_eq!(ring.rear(), 3);
        assert!(!ring.is_window_full());
        assert_eq!(ring.window_len(), 3);

        assert_eq!(ring.push(BlockId::new(9)), 3);
        assert_eq!(ring.rear(), 0);
        assert!(ring.is_window_full());
        assert_eq!(ring.window_len(), 4);

        assert_eq!(ring.take(1), Some(BlockId::new(1)));
        assert_eq!(ring.take(1), None);
        assert_eq!(ring.len(), 3);
        assert!(ring.is_window_full());
        Ok(())
    }

    #[test]
    fn empty_ring() -> TestResult {
        let (mut ring, _arena) = track!(setup(4, 0))?;
        assert!(!ring.is_window_full());
        assert_eq!(ring.window_len(), 0);
        assert_eq!(ring.find_forward(|_| true), None);
        assert_eq!(ring.find_backward(|_| true), None);

        ring.advance_front();
        assert_eq!(ring.front(), 0);
        Ok(())
    }

    #[test]
    fn find_forward_and_backward() -> TestResult {
        let (mut ring, _arena) = track!(setup(8, 6))?;
        ring.set_curr(3);

        assert_eq!(ring.find_forward(|_| true), Some(3));
        assert_eq!(ring.find_forward(|id| id.as_u32() != 3), Some(4));
        assert_eq!(ring.find_forward(|id| id.as_u32() < 3), None);

        assert_eq!(ring.find_backward(|_| true), Some(3));
        assert_eq!(ring.find_backward(|id| id.as_u32() < 3), Some(2));
        assert_eq!(ring.find_backward(|id| id.as_u32() == 0), Some(0));
        assert_eq!(ring.find_backward(|id| id.as_u32() > 3), None);

        ring.take(4);
        assert_eq!(ring.find_forward(|id| id.as_u32() != 3), Some(5));
        Ok(())
    }

    #[test]
    fn find_in_full_window_starting_at_front() -> TestResult {
        let (mut ring, _arena) = track!(setup(4, 4))?;
        assert!(ring.is_window_full());
        ring.set_curr(0);

        // 範囲がリング全体を覆っている場合でも、全てのブロックが走査対象となる
        assert_eq!(ring.find_forward(|id| id.as_u32() == 3), Some(3));
        Ok(())
    }

    #[test]
    fn advance_front_stops_at_curr() -> TestResult {
        let (mut ring, _arena) = track!(setup(8, 6))?;
        ring.set_curr(3);
        ring.take(0);
        ring.take(1);
        ring.take(3);
        ring.advance_front();
        assert_eq!(ring.front(), 2);

        ring.take(2);
        ring.advance_front();
        assert_eq!(ring.front(), 3);
        Ok(())
    }

    #[test]
    fn compact_front_works() -> TestResult {
        let (mut ring, mut arena) = track!(setup(6, 6))?;
        ring.set_curr(4);
        ring.take(1);
        ring.take(3);
        assert!(ring.is_window_full());

        assert_eq!(ring.compact_front(&mut arena), 2);
        assert_eq!(ids(&ring), vec![None, None, Some(0), Some(2), Some(4), Some(5)]);
        assert_eq!(ring.front(), 2);
        assert_eq!(ring.rear(), 0);
        assert_eq!(ring.curr(), 4);
        assert!(!ring.is_window_full());
        assert_ring_indices(&ring, &arena);
        Ok(())
    }

    #[test]
    fn compact_front_without_holes() -> TestResult {
        let (mut ring, mut arena) = track!(setup(4, 4))?;
        ring.set_curr(2);
        assert_eq!(ring.compact_front(&mut arena), 0);
        assert_eq!(ids(&ring), vec![Some(0), Some(1), Some(2), Some(3)]);
        assert_eq!(ring.front(), 0);
        assert_ring_indices(&ring, &arena);
        Ok(())
    }

    #[test]
    fn compact_rear_works() -> TestResult {
        let (mut ring, mut arena) = track!(setup(6, 6))?;
        ring.set_curr(0);
        ring.take(2);
        ring.take(4);
        assert!(ring.is_window_full());

        assert_eq!(ring.compact_front(&mut arena), 0);
        assert!(ring.is_window_full());

        assert_eq!(ring.compact_rear(&mut arena), 2);
        assert_eq!(ids(&ring), vec![Some(0), Some(1), Some(3), Some(5), None, None]);
        assert_eq!(ring.front(), 0);
        assert_eq!(ring.rear(), 4);
        assert!(!ring.is_window_full());
        assert_ring_indices(&ring, &arena);
        Ok(())
    }

    #[test]
    fn make_room_works() -> TestResult {
        let (mut ring, mut arena) = track!(setup(4, 4))?;
        ring.set_curr(1);
        ring.take(3);
        assert!(ring.is_window_full());
        assert!(ring.make_room(&mut arena));
        assert_eq!(ring.front(), 0);
        assert_eq!(ring.rear(), 3);
        assert_eq!(ring.push(BlockId::new(3)), 3);
        Ok(())
    }

    #[test]
    fn compact_wrapped_window() -> TestResult {
        let (mut ring, mut arena) = track!(setup(4, 4))?;

        // front=2, rear=2 となるように範囲を一周させる
        ring.set_curr(1);
        ring.take(0);
        ring.take(1);
        ring.set_curr(2);
        ring.advance_front();
        assert_eq!(ring.front(), 2);
        ring.push(BlockId::new(0));
        ring.push(BlockId::new(1));
        if let Some(block) = arena.get_mut(BlockId::new(0)) {
            block.set_ring_index(0);
        }
        if let Some(block) = arena.get_mut(BlockId::new(1)) {
            block.set_ring_index(1);
        }
        assert!(ring.is_window_full());

        // 範囲の順序: [2, 3, 0, 1]
        ring.set_curr(1);
        ring.take(3);
        assert_eq!(ring.compact_front(&mut arena), 1);
        assert_eq!(ids(&ring), vec![Some(0), Some(1), None, Some(2)]);
        assert_eq!(ring.front(), 3);
        assert_ring_indices(&ring, &arena);
        Ok(())
    }

    #[test]
    fn grow_works() -> TestResult {
        let (mut ring, mut arena) = track!(setup(4, 4))?;
        ring.set_curr(3);
        ring.take(1);
        track!(ring.grow(&mut arena))?;

        assert_eq!(ring.capacity(), 8);
        assert_eq!(
            ids(&ring),
            vec![Some(0), Some(2), Some(3), None, None, None, None, None]
        );
        assert_eq!(ring.front(), 0);
        assert_eq!(ring.curr(), 0);
        assert_eq!(ring.rear(), 3);
        assert_eq!(ring.len(), 3);
        assert_ring_indices(&ring, &arena);
        Ok(())
    }

    #[test]
    fn grow_after_clear() -> TestResult {
        let (mut ring, mut arena) = track!(setup(4, 2))?;
        ring.clear();
        arena.clear();
        assert_eq!(ring.capacity(), 0);
        assert_eq!(ring.window_len(), 0);

        track!(ring.grow(&mut arena))?;
        assert_eq!(ring.capacity(), 4);
        assert_eq!(ring.len(), 0);
        assert_eq!(ring.rear(), 0);
        Ok(())
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert_eq!(
            BlockRing::new(0).err().map(|e| *e.kind()),
            Some(ErrorKind::InvalidInput)
        );
    }
}
