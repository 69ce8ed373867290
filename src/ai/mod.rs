mod classifier;
mod parser;
mod summarizer;

pub use classifier::{Classifier, UNCATEGORIZED};
pub use summarizer::{Summarize, Summarizer};
