//! 事件模块
//!
//! - `bus`: 同步发布/订阅总线
//! - `types`: 上传与管理器事件定义

pub mod bus;
pub mod types;

pub use bus::{BusEvent, DynamicEvent, EventBus, ListenerOptions, Predicate, Subscription};
pub use types::{ManagerEvent, UploadEvent};
