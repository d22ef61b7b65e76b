// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 循环定时器 (Cycling timer)
//!
//! 后台线程每隔 N 分钟进入互斥区执行一次回调 (通常是清零计数)。
//! 睡眠按不超过 1 秒的步长切分, `stop()` 能被及时观察到;
//! 在最后一段睡眠中请求停止会取消尾随的那次触发。

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::{Result, SentinelError};
use crate::locker::Locker;

/// 单次睡眠的最大步长
pub const SLEEP_STEP: Duration = Duration::from_secs(1);
/// 周期上限 (一周)
pub const MAX_PERIOD_MINUTES: f64 = 7.0 * 24.0 * 60.0;

// ========== 时钟 ==========

/// 时间来源, 测试中可替换为手动时钟
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// 手动时钟: `sleep` 只推进虚拟时间 (外加 1ms 真实让步, 避免空转)
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// 虚拟时间起点
    pub fn base(&self) -> Instant {
        self.base
    }

    /// 直接推进虚拟时间
    pub fn advance(&self, duration: Duration) {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner) += duration;
    }

    /// 自起点以来的虚拟时间
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        thread::sleep(Duration::from_millis(1));
    }
}

// ========== 定时器 ==========

/// 定时器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running,
    Stopped,
}

impl TimerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => TimerState::Idle,
            1 => TimerState::Running,
            _ => TimerState::Stopped,
        }
    }
}

/// 剩余时间 (用于进度条显示)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeLeft {
    /// 剩余秒数 (保留一位小数)
    pub seconds: f64,
    /// 本周期剩余的百分比 (100 → 0)
    pub percent_left: f64,
}

type Callback<T> = Box<dyn FnMut(&mut T) + Send>;

pub struct CyclingTimer<T> {
    name: String,
    period: Duration,
    callback: Mutex<Callback<T>>,
    locker: Locker<T>,
    clock: Arc<dyn Clock>,
    stop_requested: AtomicBool,
    state: AtomicU8,
    /// (本周期开始, 截止时间)
    window: Mutex<Option<(Instant, Instant)>>,
    fires: AtomicU64,
}

impl<T: Send + 'static> CyclingTimer<T> {
    /// 创建定时器, `minutes` 必须在 (0, MAX_PERIOD_MINUTES] 内
    pub fn new<F>(name: impl Into<String>, minutes: f64, callback: F, locker: Locker<T>) -> Result<Self>
    where
        F: FnMut(&mut T) + Send + 'static,
    {
        let period = period_from_minutes(minutes)?;

        Ok(Self {
            name: name.into(),
            period,
            callback: Mutex::new(Box::new(callback)),
            locker,
            clock: Arc::new(SystemClock),
            stop_requested: AtomicBool::new(false),
            state: AtomicU8::new(TimerState::Idle as u8),
            window: Mutex::new(None),
            fires: AtomicU64::new(0),
        })
    }

    /// 替换时钟
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn state(&self) -> TimerState {
        TimerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// 已触发次数
    pub fn fire_count(&self) -> u64 {
        self.fires.load(Ordering::SeqCst)
    }

    /// 阻塞运行, 直到 `stop()` 被调用; 停止后可再次启动
    ///
    /// 同一时刻只有一个工作循环: 已在运行时直接返回。
    /// 启动前收到的 `stop()` 会取消这一次启动。
    pub fn start(&self) {
        if !self.claim(TimerState::Idle) && !self.claim(TimerState::Stopped) {
            warn!("⚠️ {} 定时器已在运行, 忽略重复启动", self.name);
            return;
        }
        if self.stop_requested.swap(false, Ordering::SeqCst) {
            self.state.store(TimerState::Stopped as u8, Ordering::SeqCst);
            return;
        }

        info!(
            "⏱️ 启动 {} 定时器, 每 {:.1} 分钟重置一次",
            self.name,
            self.period.as_secs_f64() / 60.0
        );

        while !self.stop_requested.load(Ordering::SeqCst) {
            let start = self.clock.now();
            let deadline = start + self.period;
            *self.window.lock().unwrap_or_else(PoisonError::into_inner) = Some((start, deadline));

            if !self.sleep_until(deadline) {
                break;
            }

            let mut state = self.locker.lock();
            // 等锁期间可能已被停止
            if self.stop_requested.load(Ordering::SeqCst) {
                break;
            }
            let mut callback = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
            (*callback)(&mut state);
            drop(callback);
            drop(state);

            let fired = self.fires.fetch_add(1, Ordering::SeqCst) + 1;
            debug!("⏱️ {} 定时器第 {} 次触发", self.name, fired);
        }

        // 本次停止请求已被消费, 下一次 start() 重新计时
        self.stop_requested.store(false, Ordering::SeqCst);
        *self.window.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.state.store(TimerState::Stopped as u8, Ordering::SeqCst);
        info!("⏱️ {} 定时器已停止", self.name);
    }

    fn claim(&self, from: TimerState) -> bool {
        self.state
            .compare_exchange(
                from as u8,
                TimerState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// 在后台线程运行
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        thread::spawn(move || self.start())
    }

    /// 请求停止 (在下一个睡眠步长或触发前生效)
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// 剩余秒数与已过百分比; `start()` 设置首个截止时间之前返回 None
    pub fn time_left(&self) -> Option<TimeLeft> {
        let (start, deadline) = (*self.window.lock().unwrap_or_else(PoisonError::into_inner))?;
        let now = self.clock.now();
        let total = deadline.saturating_duration_since(start).as_secs_f64();
        let elapsed = now.saturating_duration_since(start).as_secs_f64().min(total);
        let left = (total - elapsed).max(0.0);
        let percent = if total > 0.0 { left / total * 100.0 } else { 0.0 };
        Some(TimeLeft {
            seconds: (left * 10.0).round() / 10.0,
            percent_left: percent,
        })
    }

    /// 分步睡眠直到截止时间; 被停止时返回 false
    fn sleep_until(&self, deadline: Instant) -> bool {
        loop {
            if self.stop_requested.load(Ordering::SeqCst) {
                return false;
            }
            let now = self.clock.now();
            if now >= deadline {
                return true;
            }
            self.clock.sleep((deadline - now).min(SLEEP_STEP));
        }
    }
}

/// 分钟数换算为周期; 非正数、非有限值或超过上限时返回 `InvalidSetting`
pub fn period_from_minutes(minutes: f64) -> Result<Duration> {
    if !minutes.is_finite() || minutes <= 0.0 || minutes > MAX_PERIOD_MINUTES {
        return Err(SentinelError::invalid(
            "reset_stats_min",
            minutes,
            format!("period must be in (0, {}] minutes", MAX_PERIOD_MINUTES),
        ));
    }
    Duration::try_from_secs_f64(minutes * 60.0)
        .map_err(|e| SentinelError::invalid("reset_stats_min", minutes, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Stats {
        resets: u32,
        fired_at: Vec<Duration>,
    }

    #[test]
    fn rejects_non_positive_period() {
        let locker = Locker::new(Stats::default());
        assert!(CyclingTimer::new("bad", 0.0, |_: &mut Stats| {}, locker.clone()).is_err());
        assert!(CyclingTimer::new("bad", -1.0, |_: &mut Stats| {}, locker.clone()).is_err());
        assert!(CyclingTimer::new("bad", f64::NAN, |_: &mut Stats| {}, locker).is_err());
    }

    #[test]
    fn time_left_unavailable_before_start() {
        let locker = Locker::new(Stats::default());
        let timer = CyclingTimer::new("idle", 1.0, |_: &mut Stats| {}, locker).unwrap();
        assert_eq!(timer.state(), TimerState::Idle);
        assert!(timer.time_left().is_none());
    }

    #[test]
    fn fires_once_per_period_under_lock_and_stops() {
        let clock = Arc::new(ManualClock::new());
        let locker = Locker::new(Stats::default());
        let cb_clock = Arc::clone(&clock);
        let timer = Arc::new(
            CyclingTimer::new(
                "reset stats",
                1.0,
                move |s: &mut Stats| {
                    s.resets += 1;
                    s.fired_at.push(cb_clock.elapsed());
                },
                locker.clone(),
            )
            .unwrap()
            .with_clock(clock.clone()),
        );

        let handle = Arc::clone(&timer).spawn();

        // 等待至少三次触发
        let fired = loop {
            let guard = locker.lock();
            if guard.resets >= 3 {
                // 持锁时请求停止, 之后不允许再触发
                timer.stop();
                break guard.resets;
            }
            drop(guard);
            thread::sleep(Duration::from_millis(5));
        };

        handle.join().unwrap();
        let stats = locker.lock();
        assert_eq!(stats.resets, fired);
        assert_eq!(timer.fire_count(), fired as u64);
        assert_eq!(timer.state(), TimerState::Stopped);

        for (i, at) in stats.fired_at.iter().enumerate() {
            assert_eq!(at.as_secs(), 60 * (i as u64 + 1));
        }
    }

    #[test]
    fn stop_during_sleep_suppresses_fire() {
        let clock = Arc::new(ManualClock::new());
        let locker = Locker::new(Stats::default());
        let timer = Arc::new(
            CyclingTimer::new("quiet", 10.0, |s: &mut Stats| s.resets += 1, locker.clone())
                .unwrap()
                .with_clock(clock.clone()),
        );
        let handle = Arc::clone(&timer).spawn();

        while timer.time_left().is_none() {
            thread::sleep(Duration::from_millis(1));
        }
        timer.stop();
        handle.join().unwrap();

        assert_eq!(locker.lock().resets, 0);
        assert_eq!(timer.fire_count(), 0);
    }

    #[test]
    fn stop_before_start_never_runs() {
        let locker = Locker::new(Stats::default());
        let timer = CyclingTimer::new("never", 1.0, |s: &mut Stats| s.resets += 1, locker.clone())
            .unwrap()
            .with_clock(Arc::new(ManualClock::new()));
        timer.stop();
        timer.start();
        assert_eq!(timer.state(), TimerState::Stopped);
        assert_eq!(locker.lock().resets, 0);
    }

    #[test]
    fn restarts_after_stop() {
        let clock = Arc::new(ManualClock::new());
        let locker = Locker::new(Stats::default());
        let timer = Arc::new(
            CyclingTimer::new("restart", 1.0, |s: &mut Stats| s.resets += 1, locker.clone())
                .unwrap()
                .with_clock(clock.clone()),
        );

        let handle = Arc::clone(&timer).spawn();
        while timer.fire_count() < 1 {
            thread::sleep(Duration::from_millis(1));
        }
        timer.stop();
        handle.join().unwrap();
        assert_eq!(timer.state(), TimerState::Stopped);
        let before = timer.fire_count();

        let handle = Arc::clone(&timer).spawn();
        while timer.fire_count() <= before {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(timer.state(), TimerState::Running);
        timer.stop();
        handle.join().unwrap();

        assert_eq!(timer.state(), TimerState::Stopped);
        assert!(timer.fire_count() > before);
        assert_eq!(locker.lock().resets as u64, timer.fire_count());
    }

    #[test]
    fn second_start_while_running_is_ignored() {
        let clock = Arc::new(ManualClock::new());
        let locker = Locker::new(Stats::default());
        let timer = Arc::new(
            CyclingTimer::new("single", 10.0, |s: &mut Stats| s.resets += 1, locker)
                .unwrap()
                .with_clock(clock),
        );
        let handle = Arc::clone(&timer).spawn();
        while timer.state() != TimerState::Running {
            thread::sleep(Duration::from_millis(1));
        }
        // 已有工作循环时立即返回
        timer.start();
        assert_eq!(timer.state(), TimerState::Running);
        timer.stop();
        handle.join().unwrap();
        assert_eq!(timer.state(), TimerState::Stopped);
    }

    #[test]
    fn oversized_period_is_rejected() {
        let locker = Locker::new(Stats::default());
        assert!(CyclingTimer::new("huge", 1e18, |_: &mut Stats| {}, locker.clone()).is_err());
        assert!(CyclingTimer::new("huge", MAX_PERIOD_MINUTES + 1.0, |_: &mut Stats| {}, locker.clone()).is_err());
        let timer = CyclingTimer::new("week", MAX_PERIOD_MINUTES, |_: &mut Stats| {}, locker).unwrap();
        assert_eq!(timer.period(), Duration::from_secs(7 * 24 * 3600));
    }

    #[test]
    fn reports_progress_within_period() {
        let clock = Arc::new(ManualClock::new());
        let locker = Locker::new(Stats::default());
        let timer = CyclingTimer::new("progress", 1.0, |_: &mut Stats| {}, locker)
            .unwrap()
            .with_clock(clock.clone());

        let start = clock.now();
        *timer.window.lock().unwrap() = Some((start, start + timer.period()));
        clock.advance(Duration::from_secs(15));

        let left = timer.time_left().unwrap();
        assert_eq!(left.seconds, 45.0);
        assert!((left.percent_left - 75.0).abs() < 1e-9);
    }
}
