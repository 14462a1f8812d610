// 领域模型
//
// 核心只读取/回写这些实体快照；实体的增删改查由 db 模块的持久化
// 协作方负责。枚举字段一律在构造时解析，未知取值立即报错。

mod host;
mod log;
mod notification;
mod task;
mod storage;

pub use host::Host;
pub use log::{BackupLog, LogStatus};
pub use notification::{NotificationChannel, NotifyKind};
pub use storage::{Storage, StorageKind};
pub use task::{BackupType, CompressionType, ScheduleType, Task};
