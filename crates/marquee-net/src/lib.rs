// Delivery layer: the transport seam and its timer-driven simulation.

pub mod channel;
pub mod random;
pub mod simulator;
pub mod tasks;

pub use channel::{DeliveryChannel, DeliverySink, InboundMessage};
pub use random::{RandomSource, SeededRandom, ThreadRandom};
pub use simulator::{simulate_inbound, SimulatedChannel, SimulatorConfig};
pub use tasks::TaskSet;
