//! Timer-driven stand-in for a real transport.
//!
//! [`SimulatedChannel`] acknowledges every dispatched message after a fixed
//! delay and, while open, periodically makes a random remote peer write a
//! canned phrase into one of the local user's conversations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, info, warn};

use marquee_shared::constants::{
    DEFAULT_DELIVERY_DELAY_MS, DEFAULT_INBOUND_INTERVAL_SECS, DEFAULT_INBOUND_PROBABILITY,
    INBOUND_PHRASES,
};
use marquee_shared::{DeliveryStatus, Message, NewMessage, UserId};

use crate::channel::{DeliveryChannel, DeliverySink, InboundMessage};
use crate::random::{RandomSource, ThreadRandom};
use crate::tasks::TaskSet;

/// Simulator timing and content.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Delay before a dispatched message is reported `Sent`.
    pub delivery_delay: Duration,
    /// Period of the remote-activity tick.  The first tick fires one full
    /// period after `open`.  Must be non-zero; a zero period falls back to
    /// the default.
    pub inbound_interval: Duration,
    /// Probability in `[0, 1]` that a tick produces a message.
    pub inbound_probability: f64,
    /// Pool of message bodies for simulated peers.
    pub phrases: Vec<String>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            delivery_delay: Duration::from_millis(DEFAULT_DELIVERY_DELAY_MS),
            inbound_interval: Duration::from_secs(DEFAULT_INBOUND_INTERVAL_SECS),
            inbound_probability: DEFAULT_INBOUND_PROBABILITY,
            phrases: INBOUND_PHRASES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub struct SimulatedChannel {
    config: SimulatorConfig,
    random: Arc<dyn RandomSource>,
    tasks: TaskSet,
    open: AtomicBool,
}

impl SimulatedChannel {
    pub fn new(config: SimulatorConfig) -> Self {
        Self::with_random(config, Arc::new(ThreadRandom))
    }

    pub fn with_random(mut config: SimulatorConfig, random: Arc<dyn RandomSource>) -> Self {
        if config.inbound_interval.is_zero() {
            warn!("Zero inbound interval, using default");
            config.inbound_interval = Duration::from_secs(DEFAULT_INBOUND_INTERVAL_SECS);
        }
        Self {
            config,
            random,
            tasks: TaskSet::new(),
            open: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Deferred tasks still outstanding (deliveries plus the activity loop).
    pub fn pending_tasks(&self) -> usize {
        self.tasks.pending()
    }
}

impl Default for SimulatedChannel {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}

impl DeliveryChannel for SimulatedChannel {
    fn open(&self, local_user: &UserId, sink: Weak<dyn DeliverySink>) {
        if self.open.swap(true, Ordering::SeqCst) {
            debug!(user = %local_user, "Simulated channel already open");
            return;
        }

        let period = self.config.inbound_interval;
        let Some(start) = Instant::now().checked_add(period) else {
            warn!(
                user = %local_user,
                "Inbound interval out of range, simulated activity disabled"
            );
            return;
        };
        let probability = self.config.inbound_probability;
        let phrases = self.config.phrases.clone();
        let random = Arc::clone(&self.random);
        let local_user = local_user.clone();

        info!(
            user = %local_user,
            interval_ms = period.as_millis() as u64,
            probability,
            "Simulated channel opened"
        );

        let scheduled = self.tasks.spawn("inbound-activity", async move {
            let mut ticker = interval_at(start, period);
            loop {
                ticker.tick().await;
                let Some(sink) = sink.upgrade() else {
                    debug!("Delivery sink dropped, stopping simulated activity");
                    break;
                };
                if let Some(inbound) =
                    simulate_inbound(&*sink, &local_user, &*random, probability, &phrases)
                {
                    debug!(
                        conversation = %inbound.conversation_id,
                        sender = %inbound.message.sender_id,
                        "Simulated inbound message"
                    );
                    sink.receive(inbound);
                }
            }
        });

        if !scheduled {
            self.open.store(false, Ordering::SeqCst);
        }
    }

    fn dispatch(&self, message: &Message, sink: Weak<dyn DeliverySink>) {
        let delay = self.config.delivery_delay;
        let conversation_id = message.conversation_id.clone();
        let message_id = message.id.clone();

        self.tasks.spawn("delivery", async move {
            sleep(delay).await;
            if let Some(sink) = sink.upgrade() {
                sink.update_status(&conversation_id, &message_id, DeliveryStatus::Sent);
            }
        });
    }

    fn close(&self) {
        let was_open = self.open.swap(false, Ordering::SeqCst);
        let aborted = self.tasks.abort_all();
        if was_open || aborted > 0 {
            info!(aborted, "Simulated channel closed");
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// One activity tick: with probability `probability`, pick a conversation
/// and its first non-local participant, and produce a canned message from
/// them.
pub fn simulate_inbound(
    sink: &dyn DeliverySink,
    local_user: &UserId,
    random: &dyn RandomSource,
    probability: f64,
    phrases: &[String],
) -> Option<InboundMessage> {
    if random.chance() >= probability || phrases.is_empty() {
        return None;
    }

    let candidates = sink.inbound_candidates();
    if candidates.is_empty() {
        return None;
    }
    let conversation = &candidates[random.pick(candidates.len())];
    let sender = conversation.peer_of(local_user)?;
    let phrase = &phrases[random.pick(phrases.len())];

    let mut message = NewMessage::text(sender.id.clone(), sender.name.clone(), phrase.clone());
    message.sender_avatar = sender.avatar.clone();

    Some(InboundMessage {
        conversation_id: conversation.id.clone(),
        message,
    })
}
