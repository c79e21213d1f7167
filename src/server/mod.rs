//! Session engine: buffer pool, session registry, content production and the
//! poll loop that drives them.

mod content;
pub mod dynamic;
pub mod engine;
pub mod include;
pub mod listener;
pub mod pool;
pub mod registry;
pub mod session;
pub mod transport;

pub use dynamic::{ExecContext, ExecHook, PushProducer, PushSink, PushStatus};
pub use engine::{Server, ServerStats};
pub use registry::SessionId;
pub use session::{Session, SessionFlags, SessionState};
pub use transport::{ConnHandle, TcpTransport, Transport};
