pub mod combinations;
pub mod extractor;
