use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// セッションごとに一つだけ存在できるタイマーの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    BuildTask,
    GitPull,
}

/// 設定の読み込みごとに作られるデプロイセッション
///
/// リモートディレクトリのキャッシュ、タイマー、実行中の操作のキャンセルトークンを持つ。
/// 設定の再読み込み時には `reload` で丸ごと置き換える。
#[derive(Debug)]
pub struct DeploySession {
    /// 設定を読み込んだ時刻
    config_loaded_at: DateTime<Utc>,

    /// ワークスペース（プロセス）の開始時刻
    workspace_started_at: DateTime<Utc>,

    /// セッション全体のトークン
    root_token: CancellationToken,

    /// 実行中の操作のトークン
    current_operation: Mutex<Option<CancellationToken>>,

    /// 接続ごとの作成済みリモートディレクトリ
    remote_dirs: Mutex<HashMap<String, HashSet<String>>>,

    /// 種類ごとのタイマー
    timers: Mutex<HashMap<TimerKind, JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl DeploySession {
    /// 新しいDeploySessionインスタンスを作成
    pub fn new(workspace_started_at: DateTime<Utc>) -> Self {
        Self {
            config_loaded_at: Utc::now(),
            workspace_started_at,
            root_token: CancellationToken::new(),
            current_operation: Mutex::new(None),
            remote_dirs: Mutex::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// 設定の再読み込み：このセッションを終了し、新しいセッションを返す
    pub fn reload(&self) -> Self {
        self.shutdown();
        Self::new(self.workspace_started_at)
    }

    pub fn config_loaded_at(&self) -> DateTime<Utc> {
        self.config_loaded_at
    }

    pub fn workspace_started_at(&self) -> DateTime<Utc> {
        self.workspace_started_at
    }

    /// 同期判定で使う「セッション開始」時刻
    pub fn sync_reference_time(&self, use_workspace_start_time: bool) -> DateTime<Utc> {
        if use_workspace_start_time {
            self.workspace_started_at
        } else {
            self.config_loaded_at
        }
    }

    /// 新しい操作を開始し、そのキャンセルトークンを返す
    pub fn begin_operation(&self) -> CancellationToken {
        let token = self.root_token.child_token();
        *lock(&self.current_operation) = Some(token.clone());
        token
    }

    /// 実行中の操作をキャンセル
    pub fn cancel_current(&self) -> bool {
        match lock(&self.current_operation).take() {
            Some(token) => {
                debug!("Cancelling current operation");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// セッションが終了済みか
    pub fn is_closed(&self) -> bool {
        self.root_token.is_cancelled()
    }

    /// リモートディレクトリを記録（新規の場合は `true`）
    pub fn remember_remote_dir(&self, connection: &str, dir: &str) -> bool {
        lock(&self.remote_dirs)
            .entry(connection.to_string())
            .or_default()
            .insert(dir.to_string())
    }

    /// リモートディレクトリが作成済みとして記録されているか
    pub fn is_remote_dir_known(&self, connection: &str, dir: &str) -> bool {
        lock(&self.remote_dirs)
            .get(connection)
            .is_some_and(|dirs| dirs.contains(dir))
    }

    /// タイマーを登録する。同じ種類の既存のタイマーは取り消される。
    pub fn schedule_timer<F>(&self, kind: TimerKind, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.root_token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => task.await,
                _ = token.cancelled() => {}
            }
        });

        if let Some(previous) = lock(&self.timers).insert(kind, handle) {
            debug!("Replacing pending {:?} timer", kind);
            previous.abort();
        }
    }

    /// タイマーが待機中または実行中か
    pub fn has_pending_timer(&self, kind: TimerKind) -> bool {
        lock(&self.timers)
            .get(&kind)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// タイマーの完了を待つ（テストと `startup` コマンド用）
    pub async fn wait_for_timer(&self, kind: TimerKind) {
        let handle = lock(&self.timers).remove(&kind);
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// セッションを終了：全ての操作をキャンセルし、タイマーを止める
    pub fn shutdown(&self) {
        self.root_token.cancel();
        for (_, handle) in lock(&self.timers).drain() {
            handle.abort();
        }
        lock(&self.remote_dirs).clear();
    }
}

impl Default for DeploySession {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Drop for DeploySession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_remote_dir_cache() {
        let session = DeploySession::default();
        assert!(session.remember_remote_dir("user@host", "/var/www"));
        assert!(!session.remember_remote_dir("user@host", "/var/www"));
        assert!(session.is_remote_dir_known("user@host", "/var/www"));
        assert!(!session.is_remote_dir_known("other@host", "/var/www"));

        let next = session.reload();
        assert!(!next.is_remote_dir_known("user@host", "/var/www"));
        assert!(session.is_closed());
        assert!(!next.is_closed());
    }

    #[test]
    fn test_operation_tokens_are_children_of_session() {
        let session = DeploySession::default();
        let token = session.begin_operation();
        assert!(!token.is_cancelled());
        assert!(session.cancel_current());
        assert!(token.is_cancelled());
        assert!(!session.cancel_current());

        let token = session.begin_operation();
        session.shutdown();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_sync_reference_time() {
        let started = Utc::now() - chrono::Duration::hours(1);
        let session = DeploySession::new(started);
        assert_eq!(session.sync_reference_time(true), started);
        assert!(session.sync_reference_time(false) > started);
    }

    #[tokio::test]
    async fn test_new_timer_replaces_previous() {
        let session = DeploySession::default();
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let fired = fired.clone();
            session.schedule_timer(TimerKind::GitPull, Duration::from_millis(20), async move {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(session.has_pending_timer(TimerKind::GitPull));

        session.wait_for_timer(TimerKind::GitPull).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_timers() {
        let session = DeploySession::default();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        session.schedule_timer(TimerKind::BuildTask, Duration::from_millis(20), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        session.shutdown();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
