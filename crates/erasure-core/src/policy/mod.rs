//! 业务域擦除策略。
//!
//! # 设计目标（Why）
//! - 每个持有个人数据的业务模块在启动期登记“对我的数据做什么”，擦除引擎按登记顺序逐一调用。
//! - 初始化阶段可变、运行阶段冻结：[`PolicyRegistryBuilder`] 只在装配期存在，
//!   [`PolicyRegistry`] 构建后以 `Arc` 共享，读路径无锁。
//!
//! # 契约概览（What）
//! - [`DomainHandler`]：协作方提供的处理能力，必须幂等；无数据时返回空列表。
//! - [`PolicyRegistry::resolve`]：未登记的业务域解析为隐式 `Ignore` 策略并标记为回退，
//!   由调用方显式记录日志与轨迹描述符。

mod handler;
mod registry;

pub use handler::{DomainHandler, HandlerError, HandlerRequest, NoopHandler};
pub use registry::{FieldPolicy, PolicyOrigin, PolicyRegistry, PolicyRegistryBuilder, Resolved};
