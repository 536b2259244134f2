/// Application name
pub const APP_NAME: &str = "Marquee";

/// Id of the local user in the demo data set
pub const DEFAULT_LOCAL_USER: &str = "current";

/// Delay before a dispatched message is reported as sent (milliseconds)
pub const DEFAULT_DELIVERY_DELAY_MS: u64 = 500;

/// Period of the simulated remote-peer activity tick (seconds)
pub const DEFAULT_INBOUND_INTERVAL_SECS: u64 = 10;

/// Probability that a tick produces an inbound message
pub const DEFAULT_INBOUND_PROBABILITY: f64 = 0.3;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Canned phrases used for simulated inbound messages
pub const INBOUND_PHRASES: &[&str] = &[
    "How's the project coming along?",
    "Can we schedule a call?",
    "I have some feedback on the latest version.",
    "The client loved the video!",
    "When can we expect the final deliverable?",
];
