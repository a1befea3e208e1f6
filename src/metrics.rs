//! [Prometheus][prometheus]用のメトリクス.
//!
//! [prometheus]: https://prometheus.io/
use prometrics::metrics::{Counter, Gauge, MetricBuilder};

/// オブジェクトプールのメトリクス.
#[derive(Debug, Clone)]
pub struct ObjectPoolMetrics {
    pub(crate) allocated_objects: Counter,
    pub(crate) released_objects: Counter,
    pub(crate) created_blocks: Counter,
    pub(crate) recycled_blocks: Counter,
    pub(crate) disposed_blocks: Counter,
    pub(crate) compactions: Counter,
    pub(crate) ring_growths: Counter,
    pub(crate) nomemory_failures: Counter,
    pub(crate) ring_capacity: Gauge,
}
impl ObjectPoolMetrics {
    /// オブジェクトの割当回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// objpool_pool_allocated_objects_total <COUNTER>
    /// ```
    pub fn allocated_objects(&self) -> u64 {
        self.allocated_objects.value() as u64
    }

    /// オブジェクトの解放回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// objpool_pool_released_objects_total <COUNTER>
    /// ```
    pub fn released_objects(&self) -> u64 {
        self.released_objects.value() as u64
    }

    /// 現在使用中のオブジェクトの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// objpool_pool_allocated_objects_total - objpool_pool_released_objects_total
    /// ```
    pub fn in_use_objects(&self) -> u64 {
        // NOTE: 以下の順番で値を取得しないとアンダーフローする可能性がある
        let dec = self.released_objects();
        let inc = self.allocated_objects();
        inc - dec
    }

    /// 生成されたブロックの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// objpool_pool_created_blocks_total <COUNTER>
    /// ```
    pub fn created_blocks(&self) -> u64 {
        self.created_blocks.value() as u64
    }

    /// 全スロットが空いたために、リングの末尾に再配置されたブロックの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// objpool_pool_recycled_blocks_total <COUNTER>
    /// ```
    pub fn recycled_blocks(&self) -> u64 {
        self.recycled_blocks.value() as u64
    }

    /// リングに空きが無かったために、破棄されたブロックの数.
    ///
    /// `OverflowPolicy::Dispose`の場合にのみ増加する.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// objpool_pool_disposed_blocks_total <COUNTER>
    /// ```
    pub fn disposed_blocks(&self) -> u64 {
        self.disposed_blocks.value() as u64
    }

    /// 現在保持しているブロックの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// objpool_pool_created_blocks_total - objpool_pool_disposed_blocks_total
    /// ```
    pub fn blocks(&self) -> u64 {
        // NOTE: 以下の順番で値を取得しないとアンダーフローする可能性がある
        let dec = self.disposed_blocks();
        let inc = self.created_blocks();
        inc - dec
    }

    /// リングのコンパクションの実行回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// objpool_pool_compactions_total <COUNTER>
    /// ```
    pub fn compactions(&self) -> u64 {
        self.compactions.value() as u64
    }

    /// リングの容量が拡張された回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// objpool_pool_ring_growths_total <COUNTER>
    /// ```
    pub fn ring_growths(&self) -> u64 {
        self.ring_growths.value() as u64
    }

    /// メモリ不足による割当失敗回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// objpool_pool_nomemory_failures_total <COUNTER>
    /// ```
    pub fn nomemory_failures(&self) -> u64 {
        self.nomemory_failures.value() as u64
    }

    /// リングの容量(保持可能なブロック参照の数).
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// objpool_pool_ring_capacity <GAUGE>
    /// ```
    pub fn ring_capacity(&self) -> u64 {
        self.ring_capacity.value() as u64
    }

    pub(crate) fn new(builder: &MetricBuilder) -> Self {
        let mut builder = builder.clone();
        builder.namespace("objpool").subsystem("pool");
        ObjectPoolMetrics {
            allocated_objects: builder
                .counter("allocated_objects_total")
                .help("Number of objects handed out by the pool")
                .finish()
                .expect("Never fails"),
            released_objects: builder
                .counter("released_objects_total")
                .help("Number of objects returned to the pool")
                .finish()
                .expect("Never fails"),
            created_blocks: builder
                .counter("created_blocks_total")
                .help("Number of blocks allocated from the underlying allocator")
                .finish()
                .expect("Never fails"),
            recycled_blocks: builder
                .counter("recycled_blocks_total")
                .help("Number of completely free blocks moved to the rear of the ring")
                .finish()
                .expect("Never fails"),
            disposed_blocks: builder
                .counter("disposed_blocks_total")
                .help("Number of blocks returned to the underlying allocator")
                .finish()
                .expect("Never fails"),
            compactions: builder
                .counter("compactions_total")
                .help("Number of ring compactions")
                .finish()
                .expect("Never fails"),
            ring_growths: builder
                .counter("ring_growths_total")
                .help("Number of times the block ring was doubled")
                .finish()
                .expect("Never fails"),
            nomemory_failures: builder
                .counter("nomemory_failures_total")
                .help("Number of allocation failures caused by memory exhaustion")
                .finish()
                .expect("Never fails"),
            ring_capacity: builder
                .gauge("ring_capacity")
                .help("Number of block references the ring can hold")
                .finish()
                .expect("Never fails"),
        }
    }
}
