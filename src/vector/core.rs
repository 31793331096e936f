//! Core data structures for the similarity index.

pub mod embedding;
pub mod similarity;
