//! アプリケーション層：設定の解決、セッション、ユースケース

pub mod services;
pub mod session;
pub mod use_cases;

pub use session::{DeploySession, TimerKind};
