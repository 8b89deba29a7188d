//! 用户变更审计轨迹。
//!
//! # 设计目标（Why）
//! - 为每一次擦除留下一条不可修改的记录：谁、何时、从哪里、对哪些业务域的哪些字段做了什么。
//! - 条目以哈希链串联，离线即可校验轨迹未被篡改或截断。
//!
//! # 契约概览（What）
//! - [`AuditTrailStore`]：只暴露 `append` 与查询，不提供更新/删除路径。
//! - [`NewTrailEntry`] → [`UserTrailEntry`]：存储层负责分配 ID、时间戳、来源地址默认值与链式摘要。
//! - [`encode_items`]/[`decode_items`]：`items` 列的 JSON 编码；读到畸形编码时返回 [`CorruptRecordError`](crate::error::CorruptRecordError)。
//! - [`TrailQuery`]：显式查询参数对象。
//!
//! # 风险与注意事项（Trade-offs）
//! - 链式摘要要求单写者；多进程同时写同一个 JSON Lines 文件不在支持范围内。

mod chain;
mod encoding;
mod entry;
mod in_memory;
mod jsonl;
mod query;
mod store;

pub use chain::{GENESIS_DIGEST, entry_digest, verify_chain};
pub use encoding::{decode_items, encode_items};
pub use entry::{EntryId, NewTrailEntry, UserTrailEntry};
pub use in_memory::InMemoryAuditTrail;
pub use jsonl::JsonLinesAuditTrail;
pub use query::TrailQuery;
pub use store::AuditTrailStore;
