// ============================================================================
// 业务层：纯 Rust 核心逻辑
// ✅ 特点：不依赖命令行与外部构建工具，保持纯净，方便写 #[test]
// ⛔ 禁止：直接读取命令行参数、决定进程退出码
// ============================================================================

pub mod deployer;
pub mod metadata_client;
pub mod packer;
pub mod path_filter;
pub mod validator;
