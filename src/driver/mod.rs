pub mod memory;
pub mod traits;

pub use traits::{
    BrokerError, BrokerMessage, ElementHandle, MessageBroker, SessionState, Surface,
    SurfaceError, Target,
};
