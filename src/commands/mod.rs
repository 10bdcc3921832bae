// ============================================================================
// 入口层：响应外部构建通知，编排一次部署周期
// ============================================================================

pub mod build_hook;
pub mod orchestrator;
