use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use super::{ObjectPool, OverflowPolicy};
use crate::page::PageSize;
use crate::Result;

/// 新規ブロックの各スロットに対して一度だけ呼び出される初期化関数.
#[derive(Clone)]
pub(crate) struct SlotConstructor(Arc<dyn Fn(NonNull<u8>) + Send + Sync>);
impl SlotConstructor {
    pub fn call(&self, data: NonNull<u8>) {
        (self.0)(data)
    }
}
impl fmt::Debug for SlotConstructor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SlotConstructor(_)")
    }
}

/// `ObjectPool`のビルダ.
#[derive(Debug, Clone)]
pub struct ObjectPoolBuilder {
    pub(crate) constructor: Option<SlotConstructor>,
    pub(crate) page_size: PageSize,
    pub(crate) overflow_policy: OverflowPolicy,
    pub(crate) initial_blocks: usize,
    pub(crate) min_ring_capacity: usize,
    pub(crate) logger: Logger,
    pub(crate) metrics: MetricBuilder,
}
impl ObjectPoolBuilder {
    /// 新しい`ObjectPoolBuilder`インスタンスを生成する.
    pub fn new() -> Self {
        ObjectPoolBuilder {
            constructor: None,
            page_size: PageSize::default(),
            overflow_policy: OverflowPolicy::default(),
            initial_blocks: 16,
            min_ring_capacity: 128,
            logger: Logger::root(Discard, o!()),
            metrics: MetricBuilder::new(),
        }
    }

    /// スロット用の初期化関数を設定する.
    ///
    /// 初期化関数は、ブロックの生成時に、各スロットのデータ領域の先頭を引数として一度だけ呼び出される.
    /// `get()`や`release()`の度に呼ばれることはない.
    ///
    /// 設定されていない場合には、初期化の代わりに、ブロックのメモリの各ページへの書き込みが行われる.
    /// (物理メモリの割当を前倒しして、メモリ不足を早期に検出するため)
    pub fn constructor<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(NonNull<u8>) + Send + Sync + 'static,
    {
        self.constructor = Some(SlotConstructor(Arc::new(f)));
        self
    }

    /// ブロックのメモリのウォームアップで使うページサイズを設定する.
    ///
    /// 初期化関数が設定されている場合には使われない.
    ///
    /// デフォルト値は`PageSize::system()`.
    pub fn page_size(&mut self, page_size: PageSize) -> &mut Self {
        self.page_size = page_size;
        self
    }

    /// リングに空きが無い場合の、空きブロックの扱いを設定する.
    ///
    /// デフォルト値は`OverflowPolicy::Compact`.
    pub fn overflow_policy(&mut self, policy: OverflowPolicy) -> &mut Self {
        self.overflow_policy = policy;
        self
    }

    /// プールの構築時に事前に生成しておくブロックの数を設定する.
    ///
    /// デフォルト値は`16`.
    pub fn initial_blocks(&mut self, n: usize) -> &mut Self {
        self.initial_blocks = n;
        self
    }

    /// ブロック参照用リングの最小容量を設定する.
    ///
    /// リングは、この容量から始まり、必要に応じて倍々に拡張される.
    /// `0`が指定された場合には、プールの構築時にエラーが返される.
    ///
    /// デフォルト値は`128`.
    pub fn min_ring_capacity(&mut self, capacity: usize) -> &mut Self {
        self.min_ring_capacity = capacity;
        self
    }

    /// プール用の logger を登録する
    pub fn logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    /// メトリクス用の共通設定を登録する.
    ///
    /// デフォルト値は`MetricBuilder::new()`.
    pub fn metrics(&mut self, metrics: MetricBuilder) -> &mut Self {
        self.metrics = metrics;
        self
    }

    /// `object_size`バイトのオブジェクトを扱う`ObjectPool`を構築する.
    ///
    /// # Errors
    ///
    /// - `object_size`が`0`の場合や、スロットサイズが大きすぎる場合には`ErrorKind::InvalidInput`
    /// - 初期ブロック群の確保に失敗した場合には`ErrorKind::OutOfMemory`
    pub fn build(&self, object_size: usize) -> Result<ObjectPool> {
        track!(ObjectPool::with_builder(self, object_size))
    }
}
impl Default for ObjectPoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}
