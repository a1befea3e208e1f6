/// 全スロットが空いたブロックを返却しようとした際に、リングに空きが無い場合にどうするか.
///
/// プール毎に一度だけ選択され、その後は変更されない.
///
/// default は `Compact`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// リングをコンパクションして空きを作り、ブロックをリングの末尾で再利用する.
    ///
    /// 一度確保したブロックはプールの破棄まで保持され続ける.
    Compact,

    /// ブロックを破棄して、そのメモリを下位のアロケータに返却する.
    ///
    /// コンパクションは発生しないが、後続の割当でブロックの再確保が必要になることがある.
    Dispose,
}
impl Default for OverflowPolicy {
    fn default() -> Self {
        OverflowPolicy::Compact
    }
}
