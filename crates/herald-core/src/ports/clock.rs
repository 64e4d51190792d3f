//! Clock port - 時刻とスリープの抽象化
//!
//! # 実装
//! - **SystemClock**: 本番用（`chrono::Utc::now` と `tokio::time::sleep`）
//! - **ManualClock**: テスト用。sleep すると内部時刻が進むだけで実際には待たない

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Clock は現在時刻と待機を提供
///
/// # テスト容易性
/// - trait により時刻を差し替え可能
/// - リトライのバックオフも台帳のレート制限も同じ Clock を見る
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// ManualClock はテスト用の時計
///
/// - `sleep(d)` は時刻を `d` 進めて、要求された待ち時間を記録する
/// - `advance(d)` で外部から時刻を進められる
#[derive(Debug)]
pub struct ManualClock {
    inner: Mutex<ManualClockState>,
}

#[derive(Debug)]
struct ManualClockState {
    now: DateTime<Utc>,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new(ManualClockState {
                now: start,
                sleeps: Vec::new(),
            }),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut state = self.inner.lock().unwrap();
        state.now += to_chrono(duration);
    }

    /// sleep に渡された待ち時間（呼ばれた順）
    pub fn sleeps(&self) -> Vec<Duration> {
        self.inner.lock().unwrap().sleeps.clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.inner.lock().unwrap().now
    }

    async fn sleep(&self, duration: Duration) {
        {
            let mut state = self.inner.lock().unwrap();
            state.now += to_chrono(duration);
            state.sleeps.push(duration);
        }
        // 他のタスク（キャンセル通知など）に実行機会を渡す
        tokio::task::yield_now().await;
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
