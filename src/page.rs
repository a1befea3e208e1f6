//! OSのページサイズ関連の構成要素.
use crate::{ErrorKind, Result};

/// ブロック用メモリのウォームアップ時に使われるページサイズ.
///
/// 新規に確保したブロックのメモリは、このサイズ毎に一バイトずつ書き込まれることで、
/// 物理メモリへの割当が(遅延されずに)その場で行われる.
///
/// 既定値はOSから取得した値だが、テスト等の目的で任意の値を注入することも可能.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageSize(usize);
impl PageSize {
    /// OSからページサイズが取得できなかった場合に使われる値.
    pub const FALLBACK: usize = 4096;

    /// OSのページサイズを持つ`PageSize`インスタンスを返す.
    ///
    /// 取得に失敗した場合には`PageSize::FALLBACK`が使われる.
    ///
    /// # Examples
    ///
    /// ```
    /// use objpool::page::PageSize;
    ///
    /// let page_size = PageSize::system();
    /// assert!(page_size.as_usize().is_power_of_two());
    /// ```
    pub fn system() -> Self {
        let size = system_page_size();
        if size > 0 && size.is_power_of_two() {
            PageSize(size)
        } else {
            PageSize(Self::FALLBACK)
        }
    }

    /// 指定された値のページサイズを表現する`PageSize`インスタンスを生成する.
    ///
    /// # Errors
    ///
    /// `page_size`が二の冪ではない場合には、種類が`ErrorKind::InvalidInput`のエラーが返される.
    ///
    /// # Examples
    ///
    /// ```
    /// use objpool::ErrorKind;
    /// use objpool::page::PageSize;
    ///
    /// assert_eq!(PageSize::new(4096).ok().map(|p| p.as_usize()), Some(4096));
    /// assert_eq!(PageSize::new(65536).ok().map(|p| p.as_usize()), Some(65536));
    ///
    /// assert_eq!(PageSize::new(0).err().map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
    /// assert_eq!(PageSize::new(4000).err().map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
    /// ```
    pub fn new(page_size: usize) -> Result<Self> {
        track_assert!(page_size.is_power_of_two(), ErrorKind::InvalidInput; page_size);
        Ok(PageSize(page_size))
    }

    /// ページサイズ値を`usize`に変換して返す.
    pub fn as_usize(self) -> usize {
        self.0
    }

    /// `len`バイトの領域に含まれるページ数を返す.
    ///
    /// 末尾の半端なページも一ページとして数える.
    ///
    /// # Examples
    ///
    /// ```
    /// use objpool::page::PageSize;
    ///
    /// let page_size = PageSize::new(4096).unwrap();
    /// assert_eq!(page_size.pages(0), 0);
    /// assert_eq!(page_size.pages(1), 1);
    /// assert_eq!(page_size.pages(4096), 1);
    /// assert_eq!(page_size.pages(4097), 2);
    /// ```
    pub fn pages(self, len: usize) -> usize {
        (len + self.0 - 1) / self.0
    }
}
impl Default for PageSize {
    fn default() -> Self {
        Self::system()
    }
}

#[cfg(unix)]
fn system_page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        0
    }
}

#[cfg(not(unix))]
fn system_page_size() -> usize {
    PageSize::FALLBACK
}
