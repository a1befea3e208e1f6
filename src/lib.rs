//! Fixed-size Object Pool.
//!
//! `objpool`は、同じサイズのオブジェクト群を、汎用アロケータを経由せずに割当・解放するためのメモリプール.
//!
//! # 特徴
//!
//! - オブジェクトは1024個単位の[block]にまとめて確保され、空き状況はビットマップで管理される
//!   - 割当は「最も番号が小さい空きスロット」から行われるので、結果が決定的
//! - 各オブジェクトの直前には8バイトの[ヘッダ][ObjectHeader]が置かれ、解放時の所属ブロックの特定に使われる
//! - ブロック群は[pool]内の循環配列で管理され、必要に応じて倍々に拡張される
//!   - 全スロットが空いたブロックは破棄されずに再利用される([OverflowPolicy]で変更可能)
//! - 割当・解放の処理中にロックやシステムコールは発生しない (ブロックの新規確保時を除く)
//! - 内部的な同期は行わない
//!   - 複数スレッドから使う場合には`Mutex`等で保護すること
//!
//! # モジュールの依存関係
//!
//! ```text
//! pool => block => page
//! ```
//!
//! - [pool]モジュール:
//!   - 主に[ObjectPool]構造体を提供
//!   - 利用者が直接触るのはこの構造体
//! - [block]モジュール:
//!   - スロット群とその空きビットマップを管理する[ObjectBlock]等を提供
//! - [page]モジュール:
//!   - ブロックのメモリのウォームアップに使われるページサイズを提供
//!
//! # Examples
//!
//! ```
//! use objpool::ObjectPoolBuilder;
//!
//! let mut pool = ObjectPoolBuilder::new().initial_blocks(1).build(24).unwrap();
//!
//! let a = pool.get().unwrap();
//! let b = pool.get().unwrap();
//! assert_ne!(a, b);
//! assert_eq!(pool.used_count(), 2);
//!
//! unsafe {
//!     pool.release(a.as_ptr());
//!     pool.release(b.as_ptr());
//! }
//! assert_eq!(pool.used_count(), 0);
//! ```
//!
//! [block]: ./block/index.html
//! [ObjectBlock]: ./block/struct.ObjectBlock.html
//! [ObjectHeader]: ./block/struct.ObjectHeader.html
//! [pool]: ./pool/index.html
//! [ObjectPool]: ./pool/struct.ObjectPool.html
//! [OverflowPolicy]: ./pool/enum.OverflowPolicy.html
//! [page]: ./page/index.html
#![warn(missing_docs)]
extern crate libc;
extern crate prometrics;
#[macro_use]
extern crate trackable;
#[macro_use]
extern crate slog;

pub use crate::error::{Error, ErrorKind};
pub use crate::pool::{ObjectPool, ObjectPoolBuilder, OverflowPolicy};

pub mod block;
pub mod metrics;
pub mod page;
pub mod pool;

mod error;

/// crate固有の`Result`型.
pub type Result<T> = std::result::Result<T, Error>;
