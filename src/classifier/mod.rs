pub mod pipeline;

pub use pipeline::LinearTextPipeline;

/// Batch text classifier: one verdict per input, in input order.
pub trait Classifier {
    fn predict(&self, texts: &[String]) -> Vec<bool>;
}
