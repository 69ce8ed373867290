mod article;
mod change;
mod content;
mod summary;

pub use article::*;
pub use change::*;
pub use content::*;
pub use summary::*;
