pub mod patcher;
pub mod rewriter;
