pub mod discovery;
pub mod output;
pub mod pipeline;
pub mod report;
pub mod rewrite;
pub mod simulate;
