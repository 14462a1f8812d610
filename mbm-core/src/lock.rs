use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// 任务锁注册表，保证同一任务同一时刻至多一次执行。
///
/// `try_acquire` 是非阻塞的 test-and-set：拿不到锁立即返回 None，
/// 不排队等待。锁通过 `TaskLockGuard` 的 Drop 释放，任何退出路径
/// （包括 panic 展开）都会归还。
#[derive(Debug, Clone, Default)]
pub struct TaskLockRegistry {
    running: Arc<DashMap<i64, ()>>,
}

impl TaskLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试获取任务锁；已被占用时返回 None
    pub fn try_acquire(&self, task_id: i64) -> Option<TaskLockGuard> {
        match self.running.entry(task_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => {
                entry.insert(());
                Some(TaskLockGuard {
                    running: Arc::clone(&self.running),
                    task_id,
                })
            }
        }
    }

    /// 任务是否正在执行
    pub fn is_running(&self, task_id: i64) -> bool {
        self.running.contains_key(&task_id)
    }
}

/// 任务锁守卫，Drop 时释放
#[derive(Debug)]
pub struct TaskLockGuard {
    running: Arc<DashMap<i64, ()>>,
    task_id: i64,
}

impl Drop for TaskLockGuard {
    fn drop(&mut self) {
        self.running.remove(&self.task_id);
    }
}
