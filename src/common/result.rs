use crate::common::error::DeployError;
use std::fmt::Display;

/// multideploy全体で使用するResult型のエイリアス
///
/// # Examples
///
/// ```
/// use multideploy::common::result::DeployResult;
/// use multideploy::common::error::DeployError;
///
/// fn find(name: &str) -> DeployResult<String> {
///     Err(DeployError::unknown_target(name))
/// }
/// ```
pub type DeployResult<T> = Result<T, DeployError>;

/// 失敗を警告ログに残して処理を続けるためのヘルパー
pub trait WarnOnError<T> {
    /// 失敗時は `subject` 付きで警告を出し `None` を返す
    fn warn_on_error(self, subject: impl Display) -> Option<T>;
}

impl<T, E: Display> WarnOnError<T> for Result<T, E> {
    fn warn_on_error(self, subject: impl Display) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("{}: {}", subject, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warn_on_error() {
        let ok: DeployResult<u8> = Ok(1);
        assert_eq!(ok.warn_on_error("package 'site'"), Some(1));

        let err: DeployResult<u8> = Err(DeployError::unknown_package("site"));
        assert_eq!(err.warn_on_error("package 'site'"), None);
    }
}
