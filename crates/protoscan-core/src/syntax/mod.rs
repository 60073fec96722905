pub mod calls;
pub mod edits;
pub mod literals;
pub mod parser;
