mod error;
mod manager;
mod template;

pub use error::PmError;
pub use manager::{PromptManager, ROAST_SYSTEM, ROAST_USER};
pub use template::PromptTemplate;
