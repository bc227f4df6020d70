//! Authenticated request pipeline: token persistence, transport seam,
//! refresh exchange and the retry policy tying them together.

pub mod events;
pub mod pipeline;
pub mod refresh;
pub mod tokens;
pub mod transport;

pub use events::{ExpiryReason, SessionEvent, SessionEventBroadcaster};
pub use pipeline::{classify, decide, AuthPipeline, RetryStep, SendOutcome};
pub use tokens::{FileTokenStore, MemoryTokenStore, TokenPair, TokenStore};
pub use transport::{ApiResponse, HttpTransport, ReqwestTransport, RequestDescriptor};
