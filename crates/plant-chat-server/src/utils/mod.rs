pub mod error;
pub mod logger;
pub mod text;

pub use error::{ApiError, ChatError};
pub use text::preview;
