//! Errors - エラー分類
//!
//! 各エラー型は `kind()` で ErrorKind を返す。
//! リトライ判定は ErrorKind だけを見て行う。

/// ErrorKind は実行エラーの分類
///
/// - Transient: 一時的なエラー（リトライ推奨）
/// - Permanent: 恒久的なエラー（リトライ無意味）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
}

impl ErrorKind {
    pub fn is_retriable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}
