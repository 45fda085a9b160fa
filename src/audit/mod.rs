//! Heuristic audit classifier.

pub mod classifier;

pub use classifier::{flags, Classification, Classifier, HeuristicClassifier};
