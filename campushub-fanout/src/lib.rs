pub mod bootstrap;
pub mod broadcast;
pub mod coordinator;
pub mod events;
pub mod registry;
pub mod session;

pub use bootstrap::{init_fanout, FanoutStack};
pub use broadcast::Broadcaster;
pub use coordinator::{DispatchOutcome, DispatchStatus, FanoutCoordinator};
pub use events::{FanoutEvent, NoticeLevel};
pub use registry::{ConnectionRegistry, RegistryLimits, SessionInfo};
pub use session::SessionGateway;
