use trackable::error::ErrorKindExt;

/// crate固有のエラー型.
#[derive(Debug, Clone, TrackableError)]
pub struct Error(trackable::error::TrackableError<ErrorKind>);
impl From<std::alloc::LayoutError> for Error {
    fn from(e: std::alloc::LayoutError) -> Self {
        ErrorKind::InvalidInput.cause(e).into()
    }
}
impl From<std::collections::TryReserveError> for Error {
    fn from(e: std::collections::TryReserveError) -> Self {
        ErrorKind::OutOfMemory.cause(e).into()
    }
}

/// 発生し得るエラーの種別.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 入力が不正.
    ///
    /// オブジェクトサイズが`0`の場合や、スロットサイズの計算がオーバーフローする場合等に返される.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側のプログラムを修正して入力を正しくする
    InvalidInput,

    /// 下位のアロケータからメモリを確保できなかった.
    ///
    /// プールの状態は、失敗した操作の直前のまま維持される.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者が不要なオブジェクトを解放する
    /// - 時間をおいてリトライする
    OutOfMemory,

    /// 内部状態が不整合に陥っている.
    ///
    /// プログラムにバグがあることを示している.
    ///
    /// # 典型的な対応策
    ///
    /// - バグ修正を行ってプログラムを更新する
    InconsistentState,
}
impl trackable::error::ErrorKind for ErrorKind {}
