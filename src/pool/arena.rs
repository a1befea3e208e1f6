use crate::block::{BlockId, ObjectBlock};
use crate::{ErrorKind, Result};

/// プールが所有するブロック群の置き場.
///
/// ブロックは`BlockId`を添字として格納される.
/// 破棄されたブロックの番号は、次に生成されるブロックで再利用される.
#[derive(Debug, Default)]
pub(crate) struct BlockArena {
    blocks: Vec<Option<ObjectBlock>>,
    vacant_ids: Vec<BlockId>,
    len: usize,
}
impl BlockArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// 保持しているブロックの数を返す.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn get(&self, id: BlockId) -> Option<&ObjectBlock> {
        self.blocks.get(id.as_index()).and_then(|b| b.as_ref())
    }

    pub fn get_mut(&mut self, id: BlockId) -> Option<&mut ObjectBlock> {
        self.blocks.get_mut(id.as_index()).and_then(|b| b.as_mut())
    }

    /// 次に`insert`されるブロックに割り当てられる番号を返す.
    pub fn next_id(&self) -> Result<BlockId> {
        if let Some(&id) = self.vacant_ids.last() {
            return Ok(id);
        }
        let id = self.blocks.len();
        track_assert!(
            (id as u64) <= u64::from(u32::max_value()),
            ErrorKind::OutOfMemory; id
        );
        Ok(BlockId::new(id as u32))
    }

    /// 次のブロックの追加に必要な領域を事前に確保した上で、そのブロックに割り当てられる番号を返す.
    ///
    /// この呼び出しが成功した後の`insert()`では、メモリ確保は発生しない.
    pub fn reserve(&mut self) -> Result<BlockId> {
        let id = track!(self.next_id())?;
        if self.vacant_ids.is_empty() {
            track!(self.blocks.try_reserve(1).map_err(crate::Error::from))?;
        }
        Ok(id)
    }

    /// ブロックを追加する.
    ///
    /// `block.id()`は、直前の`next_id()`ないし`reserve()`の結果と一致している必要がある.
    pub fn insert(&mut self, block: ObjectBlock) -> Result<()> {
        let id = block.id();
        track_assert_eq!(Some(id), self.next_id().ok(), ErrorKind::InconsistentState);
        if self.vacant_ids.last() == Some(&id) {
            self.vacant_ids.pop();
            self.blocks[id.as_index()] = Some(block);
        } else {
            track!(self.blocks.try_reserve(1).map_err(crate::Error::from))?;
            self.blocks.push(Some(block));
        }
        self.len += 1;
        Ok(())
    }

    /// ブロックを取り除いて返す.
    pub fn remove(&mut self, id: BlockId) -> Option<ObjectBlock> {
        let block = self.blocks.get_mut(id.as_index()).and_then(|b| b.take());
        if block.is_some() {
            self.vacant_ids.push(id);
            self.len -= 1;
        }
        block
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectBlock> {
        self.blocks.iter().filter_map(|b| b.as_ref())
    }

    /// 全てのブロックを破棄する.
    pub fn clear(&mut self) {
        self.blocks = Vec::new();
        self.vacant_ids = Vec::new();
        self.len = 0;
    }
}
