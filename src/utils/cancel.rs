// ============================================================================
// 取消标记：构建周期边界上的协作式取消
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::utils::error::{AppError, AppResult};

/// 可在线程间共享的取消标记，克隆后指向同一个状态
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// 复位，供下一个构建周期使用
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// 已取消时返回 `AppError::Cancelled`
    pub fn check(&self) -> AppResult<()> {
        if self.is_cancelled() {
            Err(AppError::Cancelled)
        } else {
            Ok(())
        }
    }
}
