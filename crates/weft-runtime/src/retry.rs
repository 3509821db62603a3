//! Delivery with backoff

use std::time::Duration;

use weft_core::{Context, Message, Port, PortError, RetryPolicy};

/// Shortest wait between sends once the policy's attempts are spent
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Sends a message to a port, retrying while the port reports a retryable
/// failure (a full buffer) and the policy allows another attempt.
///
/// Best-effort ports never report a full buffer, so they get one attempt.
/// [`RetryExecutor::deliver_with_qos`] keeps waiting on ports that must not
/// lose messages.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Executor with an explicit policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Executor using the retry policy configured on `port`
    pub fn for_port(port: &dyn Port) -> Self {
        Self::new(port.config().retry)
    }

    /// Policy in use
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliver `message`, returning the number of attempts made.
    ///
    /// Waits between attempts end early with a cancellation error if `ctx`
    /// finishes.
    pub async fn deliver(
        &self,
        ctx: &Context,
        port: &dyn Port,
        message: Message,
    ) -> Result<u32, PortError> {
        let mut attempt = 0;
        loop {
            let delay = self.policy.delay_for(attempt);
            if !delay.is_zero() {
                ctx.run(tokio::time::sleep(delay))
                    .await
                    .map_err(|err| PortError::from_context(port.name(), err))?;
            }
            attempt += 1;

            match port.send(ctx, message.clone()).await {
                Ok(()) => return Ok(attempt),
                Err(err) if err.is_retryable() && self.policy.should_retry(attempt) => {
                    tracing::debug!(
                        port = %port.name(),
                        message_id = %message.id,
                        attempt,
                        "Delivery failed, retrying: {err}"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Deliver `message` without ever giving up on a full buffer.
    ///
    /// Once the policy's attempts are spent, the send is repeated every
    /// `max_delay` until the port accepts it, fails for another reason, or
    /// `ctx` finishes. The caller stays blocked meanwhile, so backpressure
    /// reaches whoever feeds it.
    pub async fn deliver_until_accepted(
        &self,
        ctx: &Context,
        port: &dyn Port,
        message: Message,
    ) -> Result<u32, PortError> {
        let mut attempts = match self.deliver(ctx, port, message.clone()).await {
            Err(err) if err.is_retryable() => self.policy.max_attempts.max(1),
            other => return other,
        };
        let wait = self.policy.max_delay.max(MIN_WAIT);
        loop {
            ctx.run(tokio::time::sleep(wait))
                .await
                .map_err(|err| PortError::from_context(port.name(), err))?;
            attempts = attempts.saturating_add(1);

            match port.send(ctx, message.clone()).await {
                Ok(()) => return Ok(attempts),
                Err(err) if err.is_retryable() => {
                    tracing::debug!(
                        port = %port.name(),
                        message_id = %message.id,
                        attempts,
                        "Port still full, waiting"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Deliver according to the port's QoS: best-effort ports get
    /// [`deliver`](Self::deliver), the others
    /// [`deliver_until_accepted`](Self::deliver_until_accepted).
    pub async fn deliver_with_qos(
        &self,
        ctx: &Context,
        port: &dyn Port,
        message: Message,
    ) -> Result<u32, PortError> {
        if port.config().qos.may_drop() {
            self.deliver(ctx, port, message).await
        } else {
            self.deliver_until_accepted(ctx, port, message).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::ChannelPort;
    use std::sync::Arc;
    use std::time::Duration;
    use weft_core::{Direction, PortConfig, QualityOfService};

    fn port(capacity: usize, qos: QualityOfService) -> Arc<ChannelPort> {
        Arc::new(
            ChannelPort::new(
                PortConfig::new("out", Direction::Input)
                    .with_buffer_size(capacity)
                    .with_qos(qos),
            )
            .unwrap(),
        )
    }

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(10),
            ..RetryPolicy::with_attempts(attempts)
        }
    }

    #[tokio::test]
    async fn test_first_attempt_succeeds() {
        let port = port(1, QualityOfService::AtLeastOnce);
        let attempts = RetryExecutor::new(policy(3))
            .deliver(&Context::background(), port.as_ref(), Message::new(1i32))
            .await
            .unwrap();
        assert_eq!(attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let port = port(1, QualityOfService::AtLeastOnce);
        let ctx = Context::background();
        port.send(&ctx, Message::new(0i32)).await.unwrap();

        let err = RetryExecutor::new(policy(3))
            .deliver(&ctx, port.as_ref(), Message::new(1i32))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::BufferFull { .. }));
        assert_eq!(port.metrics().rejected, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_once_space_frees() {
        let port = port(1, QualityOfService::AtLeastOnce);
        let ctx = Context::background();
        port.send(&ctx, Message::new(0i32)).await.unwrap();

        let consumer = {
            let port = Arc::clone(&port);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(15)).await;
                port.receive(&Context::background()).await
            })
        };

        let attempts = RetryExecutor::new(policy(5))
            .deliver(&ctx, port.as_ref(), Message::new(1i32))
            .await
            .unwrap();
        assert!(attempts > 1);
        assert!(consumer.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_backoff() {
        let port = port(1, QualityOfService::AtLeastOnce);
        let ctx = Context::background();
        port.send(&ctx, Message::new(0i32)).await.unwrap();

        let slow = RetryPolicy {
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            ..RetryPolicy::with_attempts(5)
        };
        let canceller = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                ctx.cancel();
            })
        };
        let err = RetryExecutor::new(slow)
            .deliver(&ctx, port.as_ref(), Message::new(1i32))
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
        canceller.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_guaranteed_delivery_outlasts_the_policy() {
        let port = port(1, QualityOfService::AtLeastOnce);
        let ctx = Context::background();
        port.send(&ctx, Message::new(0i32)).await.unwrap();

        // frees space long after three attempts would have given up
        let consumer = {
            let port = Arc::clone(&port);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                port.receive(&Context::background()).await
            })
        };

        let attempts = RetryExecutor::new(policy(3))
            .deliver_with_qos(&ctx, port.as_ref(), Message::new(1i32))
            .await
            .unwrap();
        assert!(attempts > 3);
        assert!(consumer.await.unwrap().is_ok());
        assert_eq!(port.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guaranteed_delivery_stops_on_cancellation() {
        let port = port(1, QualityOfService::ExactlyOnce);
        let ctx = Context::background();
        port.send(&ctx, Message::new(0i32)).await.unwrap();

        let canceller = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(120)).await;
                ctx.cancel();
            })
        };
        let err = RetryExecutor::new(policy(2))
            .deliver_with_qos(&ctx, port.as_ref(), Message::new(1i32))
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_best_effort_is_not_held_back() {
        let port = port(1, QualityOfService::BestEffort);
        let ctx = Context::background();
        port.send(&ctx, Message::new(0i32)).await.unwrap();

        let attempts = RetryExecutor::new(policy(3))
            .deliver_with_qos(&ctx, port.as_ref(), Message::new(1i32))
            .await
            .unwrap();
        assert_eq!(attempts, 1);
        assert_eq!(port.metrics().dropped, 1);
    }

    #[tokio::test]
    async fn test_closed_port_is_not_retried() {
        let port = port(1, QualityOfService::AtLeastOnce);
        port.close();
        let err = RetryExecutor::new(policy(5))
            .deliver(&Context::background(), port.as_ref(), Message::new(1i32))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Closed { .. }));
    }

    #[tokio::test]
    async fn test_for_port_uses_port_policy() {
        let port = ChannelPort::new(
            PortConfig::new("p", Direction::Input).with_retry(RetryPolicy::no_retry()),
        )
        .unwrap();
        let executor = RetryExecutor::for_port(&port);
        assert_eq!(executor.policy().max_attempts, 1);
    }
}
