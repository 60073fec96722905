pub mod evaluator;
pub mod heights;
pub mod labware;
pub mod metadata;
pub mod modules;
