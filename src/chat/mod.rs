pub mod chain;
pub mod session;

pub use chain::{ChainResponse, ChainState, DEFAULT_K, RagChain};
pub use session::{ChatMessage, ConversationSession, MemoryPolicy, Role};
