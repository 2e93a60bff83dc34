pub mod battery;
pub mod cart;
pub mod config;
pub mod detector;
pub mod error;
pub mod event;
pub mod fleet;
pub mod lane;
pub mod normalize;
pub mod sink;
pub mod state;
pub mod store;
pub mod sweep;

pub use cart::{Cart, CartMode, CartRecord, CartStatus};
pub use config::EngineConfig;
pub use error::{FleetError, TelemetryFault};
pub use event::ViolationEvent;
pub use fleet::{Fleet, Outcome};
pub use lane::{CartLane, LaneState, LaneStats, Lanes};
pub use sweep::Sweeper;
pub use sink::{EventSink, MemorySink};
