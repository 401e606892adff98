//! Page layout and node algorithms of a copy-on-write B-tree.
//!
//! Every node occupies one fixed-size page:
//!
//! ```text
//! offset 0        u16      kind          (1 = internal, 2 = leaf)
//! offset 2        u16      key_count (n)
//! offset 4        u16[n]   record offsets (absolute, ascending)
//! offset 4 + 2n   record[0] .. record[n-1]
//!                   u16    key_len
//!                   u16    val_len
//!                   [u8]   key
//!                   [u8]   val          (internal: 8-byte child page id)
//! ```
//!
//! All integers are little-endian. Records are packed back to back without
//! padding, in strictly ascending key order.
//!
//! Nodes are never modified in place: insert, replace-children and split all
//! write a brand-new node into a fresh buffer and re-decode it.
pub mod btree;
pub mod cursor;
pub mod file;
pub mod inline_vec;
pub mod kv;
pub mod memory;
pub mod ops;
pub mod pager;
pub mod split;
pub mod writer;

pub use btree::{NodeKind, NodeView};
pub use file::FileStore;
pub use inline_vec::InlineVec;
pub use kv::{Kv, KvView};
pub use memory::MemoryStore;
pub use ops::{insert_or_replace, leaf_upsert, replace_children};
pub use pager::{Page, PageBuf, PageId, PageStore};
pub use split::{split, split2, SplitPages, SplitResult};
pub use writer::NodeWriter;

/// Page size 4 kilobytes because it’s the same size as a page used in
/// the virtual memory systems of most computer architectures.
pub const PAGE_SIZE: usize = 4096;

/// Size of the node header: kind (u16) + key_count (u16).
pub const HEADER_SIZE: usize = 2 * std::mem::size_of::<u16>();

/// Size of one offset-table slot.
pub const OFFSET_SIZE: usize = std::mem::size_of::<u16>();

/// Size of the key_len + val_len prefix of a record.
pub const RECORD_HEADER_SIZE: usize = 2 * std::mem::size_of::<u16>();

/// Size of a child page id stored in an internal record's value.
pub const CHILD_ID_SIZE: usize = std::mem::size_of::<u64>();

/// Maximum number of pages a single split can produce.
pub const MAX_SPLIT: usize = 3;

/// Size of a scratch buffer able to hold a node that grew past one page.
pub const SCRATCH_SIZE: usize = MAX_SPLIT * PAGE_SIZE;

const _: () = assert!(PAGE_SIZE.is_power_of_two());
const _: () = assert!(SCRATCH_SIZE <= u16::MAX as usize);
