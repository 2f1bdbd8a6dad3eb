//! Send a request and wait for the event that answers it.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bus::{EventBus, EventPayload, Topic};
use crate::error::{Rejection, Result, WaitError};

/// Run `send_action` and wait up to `timeout` for the next event on `topic`.
///
/// The subscription is taken before `send_action` starts, so a reply that
/// arrives before the send future completes is not missed. If the deadline
/// expires (or the reply arrives) while the send is still in flight, its
/// cancellation token is fired and the send future is dropped. A send that
/// fails ends the wait with its own error.
pub async fn wait_on_event<F, Fut>(
    bus: &EventBus,
    topic: Topic,
    timeout: Duration,
    send_action: F,
) -> Result<EventPayload>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut reply = bus.subscribe_to(topic);
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let send = send_action(cancel);
    tokio::pin!(send);
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let mut sent = false;
    let outcome = loop {
        tokio::select! {
            biased;
            event = reply.recv() => break event.map(|event| event.payload),
            result = &mut send, if !sent => {
                sent = true;
                if let Err(err) = result {
                    break Err(err);
                }
            }
            _ = &mut deadline => {
                debug!(%topic, ?timeout, "no reply before deadline");
                break Err(WaitError::Timeout { topic, after: timeout }.into());
            }
        }
    };

    if sent {
        let _ = guard.disarm();
    } else {
        debug!(%topic, "cancelling unfinished send");
    }
    outcome
}

/// [`wait_on_event`] for commands answered with a boolean.
///
/// Succeeds only on `true`. `false` and non-boolean replies fail with
/// [`WaitError::NotSuccessful`].
pub async fn wait_on_bool_result<F, Fut>(
    bus: &EventBus,
    topic: Topic,
    timeout: Duration,
    send_action: F,
) -> Result<()>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let reason = match wait_on_event(bus, topic, timeout, send_action).await? {
        EventPayload::Bool(true) => return Ok(()),
        EventPayload::Bool(false) => Rejection::ExplicitFalse,
        other => {
            debug!(%topic, kind = other.kind(), "non-boolean reply");
            Rejection::NotBoolean
        }
    };
    Err(WaitError::NotSuccessful { topic, reason }.into())
}
