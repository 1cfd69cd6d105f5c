pub mod fake;
pub mod openai;
pub mod traits;

pub use fake::FakeProvider;
pub use openai::OpenAi;
pub use traits::{EmbedAgent, EntityAgent};
