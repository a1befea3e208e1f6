use std::ptr::{self, NonNull};

use super::BlockId;

/// 各スロットの先頭に置かれるヘッダのサイズ(バイト単位).
pub const HEADER_SIZE: usize = 8;

/// スロットの先頭に置かれる、所属ブロックとスロット番号を記録したヘッダ.
///
/// メモリを節約するために、内部的には64bit整数にエンコードして情報を保持している:
///
/// - 下位48bit: 所属ブロックの識別子
/// - 上位16bit: ブロック内でのスロット番号
///
/// 値が意味を持つのは、対応するスロットが割当済みの間だけ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct ObjectHeader(u64);
impl ObjectHeader {
    /// 所属ブロックの識別子用に使えるbit幅.
    pub const OWNER_BITS: u32 = 48;

    const OWNER_MASK: u64 = (1 << Self::OWNER_BITS) - 1;

    /// 新しい`ObjectHeader`インスタンスを生成する.
    pub fn new(slot_index: u16, owner: BlockId) -> Self {
        ObjectHeader(u64::from(owner.as_u32()) | (u64::from(slot_index) << Self::OWNER_BITS))
    }

    /// スロット番号と所属ブロックを上書きする.
    pub fn reset(&mut self, slot_index: u16, owner: BlockId) {
        *self = Self::new(slot_index, owner);
    }

    /// 所属ブロックの識別子を返す.
    pub fn owner(self) -> BlockId {
        BlockId::new((self.0 & Self::OWNER_MASK) as u32)
    }

    /// ブロック内でのスロット番号を返す.
    pub fn slot_index(self) -> u16 {
        (self.0 >> Self::OWNER_BITS) as u16
    }

    /// スロットの先頭にヘッダを書き込む.
    ///
    /// # Safety
    ///
    /// `slot`は8バイト境界に揃った、書き込み可能な`HEADER_SIZE`バイト以上の領域を指している必要がある.
    pub(crate) unsafe fn write_to(self, slot: NonNull<u8>) {
        ptr::write(slot.as_ptr() as *mut u64, self.0);
    }

    /// オブジェクトのデータ領域の直前に置かれたヘッダを読み込む.
    ///
    /// # Safety
    ///
    /// `data`はプールが返したデータ領域の先頭(i.e., ヘッダの直後)を指している必要がある.
    pub(crate) unsafe fn read_before(data: NonNull<u8>) -> Self {
        ObjectHeader(ptr::read(data.as_ptr().sub(HEADER_SIZE) as *const u64))
    }
}
