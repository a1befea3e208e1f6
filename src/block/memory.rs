use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};

use super::HEADER_SIZE;
use crate::page::PageSize;
use crate::{ErrorKind, Result};

/// ブロックが所有するスロット群用のメモリ領域.
///
/// 下位のアロケータ(`std::alloc`)から一括で確保され、ブロックの破棄時に一括で解放される.
///
/// 領域の先頭はヘッダと同じ境界(8バイト)に揃えられている.
/// 確保直後の内容は未定義.
#[derive(Debug)]
pub(crate) struct BlockMemory {
    ptr: NonNull<u8>,
    layout: Layout,
}
unsafe impl Send for BlockMemory {}
impl BlockMemory {
    /// `size`バイトの領域を確保する.
    ///
    /// # Errors
    ///
    /// - `size`が`0`の場合には`ErrorKind::InvalidInput`
    /// - 下位のアロケータが確保に失敗した場合には`ErrorKind::OutOfMemory`
    pub fn allocate(size: usize) -> Result<Self> {
        track_assert!(size > 0, ErrorKind::InvalidInput);
        let layout = track!(Layout::from_size_align(size, HEADER_SIZE).map_err(crate::Error::from))?;

        // ゼロ埋めのコストを省くために`alloc_zeroed`ではなく`alloc`を使う
        let ptr = unsafe { alloc::alloc(layout) };
        track_assert!(!ptr.is_null(), ErrorKind::OutOfMemory; size);
        let ptr = unsafe { NonNull::new_unchecked(ptr) };
        Ok(BlockMemory { ptr, layout })
    }

    /// 領域のサイズ(バイト単位)を返す.
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    /// `offset`バイト目の位置を指すポインタを返す.
    ///
    /// # Panics
    ///
    /// デバッグビルドでは、`offset`が領域外の場合に現在のスレッドがパニックする.
    pub fn offset_ptr(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset < self.len(), "offset={}, len={}", offset, self.len());
        unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(offset)) }
    }

    /// 領域の各ページに一バイトずつ書き込んで、物理メモリの割当を強制する.
    ///
    /// 末尾のバイトにも必ず書き込みが行われる.
    pub fn warm_up(&mut self, page_size: PageSize) {
        let base = self.ptr.as_ptr();
        for page in 0..page_size.pages(self.len()) {
            unsafe { ptr::write_volatile(base.add(page * page_size.as_usize()), 0) };
        }
        unsafe { ptr::write_volatile(base.add(self.len() - 1), 0) };
    }
}
impl Drop for BlockMemory {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}
