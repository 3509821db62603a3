//! Bounded in-memory port

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use weft_core::port::{PortMetrics, PortStatus, backpressure_ratio};
use weft_core::{Context, Message, Port, PortConfig, PortError, QualityOfService};

/// Message ids an exactly-once port remembers; older ids are forgotten
pub const DEDUP_WINDOW: usize = 4096;

struct Buffer {
    messages: VecDeque<Message>,
    capacity: usize,
    open: bool,
    /// Recently accepted ids; only tracked for exactly-once ports
    delivered: SeenIds,
}

/// Bounded set of ids, evicting the oldest first
#[derive(Default)]
struct SeenIds {
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl SeenIds {
    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn insert(&mut self, id: String) {
        if !self.ids.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        if self.order.len() > DEDUP_WINDOW
            && let Some(oldest) = self.order.pop_front()
        {
            self.ids.remove(&oldest);
        }
    }

    fn clear(&mut self) {
        self.order.clear();
        self.ids.clear();
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
    validation_failures: AtomicU64,
}

/// [`Port`] backed by a mutex-guarded queue.
///
/// Sends never wait: a full buffer either drops the message (best-effort) or
/// fails with [`PortError::BufferFull`]. Receivers wait on a [`Notify`] until
/// a message arrives, the port is closed and drained, or their context ends.
pub struct ChannelPort {
    config: RwLock<PortConfig>,
    buffer: Mutex<Buffer>,
    notify: Notify,
    counters: Counters,
}

impl ChannelPort {
    /// Create a port; fails if the configuration is unusable
    pub fn new(config: PortConfig) -> Result<Self, PortError> {
        config.validate()?;
        let capacity = config.buffer_size;
        Ok(Self {
            config: RwLock::new(config),
            buffer: Mutex::new(Buffer {
                messages: VecDeque::with_capacity(capacity),
                capacity,
                open: true,
                delivered: SeenIds::default(),
            }),
            notify: Notify::new(),
            counters: Counters::default(),
        })
    }

    /// Stop accepting sends. Buffered messages can still be received.
    pub fn close(&self) {
        let mut buffer = self.buffer.lock();
        if !buffer.open {
            return;
        }
        buffer.open = false;
        buffer.delivered.clear();
        drop(buffer);
        tracing::debug!(port = %self.name(), "Port closed");
        self.notify.notify_waiters();
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        !self.buffer.lock().open
    }

    /// Messages waiting in the buffer
    pub fn len(&self) -> usize {
        self.buffer.lock().messages.len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn count(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl Port for ChannelPort {
    async fn send(&self, ctx: &Context, message: Message) -> Result<(), PortError> {
        let (name, qos) = {
            let config = self.config.read();
            if let Some(err) = ctx.err() {
                return Err(PortError::from_context(config.name.clone(), err));
            }
            if let Err(err) = config.check(&message) {
                Self::count(&self.counters.validation_failures);
                return Err(err);
            }
            (config.name.clone(), config.qos)
        };

        let mut buffer = self.buffer.lock();
        if !buffer.open {
            return Err(PortError::Closed { port: name });
        }
        if qos == QualityOfService::ExactlyOnce && buffer.delivered.contains(&message.id) {
            Self::count(&self.counters.rejected);
            return Err(PortError::DuplicateMessage {
                port: name,
                message_id: message.id,
            });
        }
        if buffer.messages.len() >= buffer.capacity {
            if qos.may_drop() {
                Self::count(&self.counters.dropped);
                tracing::debug!(port = %name, message_id = %message.id, "Buffer full, dropping message");
                return Ok(());
            }
            Self::count(&self.counters.rejected);
            return Err(PortError::BufferFull {
                port: name,
                capacity: buffer.capacity,
            });
        }

        if qos == QualityOfService::ExactlyOnce {
            buffer.delivered.insert(message.id.clone());
        }
        buffer.messages.push_back(message);
        drop(buffer);

        Self::count(&self.counters.sent);
        self.notify.notify_one();
        Ok(())
    }

    async fn receive(&self, ctx: &Context) -> Result<Message, PortError> {
        loop {
            // register interest before checking the queue so a send or close
            // between the check and the wait is not missed
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut buffer = self.buffer.lock();
                if let Some(message) = buffer.messages.pop_front() {
                    let more = !buffer.messages.is_empty();
                    drop(buffer);
                    Self::count(&self.counters.received);
                    if more {
                        self.notify.notify_one();
                    }
                    return Ok(message);
                }
                if !buffer.open {
                    return Err(PortError::Closed { port: self.name() });
                }
            }

            ctx.run(notified)
                .await
                .map_err(|err| PortError::from_context(self.name(), err))?;
        }
    }

    fn config(&self) -> PortConfig {
        self.config.read().clone()
    }

    fn set_config(&self, config: PortConfig) -> Result<(), PortError> {
        config.validate()?;
        let mut buffer = self.buffer.lock();
        if config.buffer_size < buffer.messages.len() {
            return Err(PortError::InvalidBufferSize {
                port: config.name,
                requested: config.buffer_size,
                in_flight: buffer.messages.len(),
            });
        }
        buffer.capacity = config.buffer_size;
        if config.qos != QualityOfService::ExactlyOnce {
            buffer.delivered.clear();
        }
        *self.config.write() = config;
        Ok(())
    }

    fn backpressure(&self) -> f64 {
        let buffer = self.buffer.lock();
        backpressure_ratio(buffer.messages.len(), buffer.capacity)
    }

    fn set_buffer_size(&self, size: usize) -> Result<(), PortError> {
        let mut buffer = self.buffer.lock();
        let in_flight = buffer.messages.len();
        if size == 0 || size < in_flight {
            return Err(PortError::InvalidBufferSize {
                port: self.name(),
                requested: size,
                in_flight,
            });
        }
        buffer.capacity = size;
        self.config.write().buffer_size = size;
        Ok(())
    }

    fn metrics(&self) -> PortMetrics {
        PortMetrics {
            sent: self.counters.sent.load(Ordering::Relaxed),
            received: self.counters.received.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            validation_failures: self.counters.validation_failures.load(Ordering::Relaxed),
        }
    }

    fn status(&self) -> PortStatus {
        // buffer before config, matching set_config
        let (open, buffered, capacity) = {
            let buffer = self.buffer.lock();
            (buffer.open, buffer.messages.len(), buffer.capacity)
        };
        let config = self.config.read();
        PortStatus {
            name: config.name.clone(),
            direction: config.direction,
            open,
            buffered,
            capacity,
            backpressure: backpressure_ratio(buffered, capacity),
        }
    }

    fn name(&self) -> String {
        self.config.read().name.clone()
    }
}
