// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 互斥区 (Exclusive section)
//!
//! 所有共享可变状态 (配置、跟踪器实例、计数账本) 都放在同一把锁之后。
//! 只提供作用域式访问: 守卫离开作用域即释放, 包括 `?` 提前返回和 panic 展开。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

/// 可克隆的互斥区句柄, 各组件共享同一个实例
pub struct Locker<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for Locker<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Locker<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    /// 进入互斥区。不可重入: 同一线程持有守卫时再次调用会死锁。
    ///
    /// 上一个持有者在临界区内 panic 时锁会被标记为 poisoned,
    /// 这里直接取回内部数据继续使用, 单帧故障不能拖垮整个运行。
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 非阻塞尝试, 锁被占用时返回 None
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        match self.inner.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// 在互斥区内执行闭包, 返回闭包结果
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    /// 当前是否有人持有锁 (诊断用)
    pub fn is_locked(&self) -> bool {
        matches!(self.inner.try_lock(), Err(TryLockError::WouldBlock))
    }
}

impl<T: Default> Default for Locker<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
