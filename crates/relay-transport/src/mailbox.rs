//! Per-runner mailboxes
//!
//! Delivery is reliable and FIFO per sender. Receipt is selective: a
//! receive names a [`Template`] and only a matching envelope completes it.
//! Envelopes that do not match are deferred in arrival order and are
//! offered again to later receives, so two templates on different
//! conversations never steal each other's messages.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;

use relay_core::{Envelope, RelayError, RelayResult, RunnerId, Template};

/// Sending half of a mailbox
#[derive(Clone, Debug)]
pub struct Postbox {
    owner: RunnerId,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl Postbox {
    /// Owner of the mailbox behind this postbox
    pub fn owner(&self) -> &RunnerId {
        &self.owner
    }

    /// Deliver an envelope
    pub fn send(&self, envelope: Envelope) -> RelayResult<()> {
        self.tx
            .send(envelope)
            .map_err(|_| RelayError::Undeliverable(self.owner.clone()))
    }

    /// Has the receiving runner gone away?
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of a mailbox, owned by exactly one runner
pub struct Mailbox {
    owner: RunnerId,
    rx: mpsc::UnboundedReceiver<Envelope>,
    /// Arrived but not yet matched, oldest first
    deferred: VecDeque<Envelope>,
}

/// Create a mailbox for `owner`
pub fn mailbox(owner: RunnerId) -> (Postbox, Mailbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Postbox {
            owner: owner.clone(),
            tx,
        },
        Mailbox {
            owner,
            rx,
            deferred: VecDeque::new(),
        },
    )
}

impl Mailbox {
    pub fn owner(&self) -> &RunnerId {
        &self.owner
    }

    /// Block until an envelope matching `template` arrives
    pub async fn receive(&mut self, template: &Template) -> RelayResult<Envelope> {
        if let Some(envelope) = self.take_deferred(template) {
            return Ok(envelope);
        }

        loop {
            match self.rx.recv().await {
                Some(envelope) if template.matches(&envelope) => return Ok(envelope),
                Some(envelope) => {
                    tracing::trace!(
                        owner = %self.owner,
                        kind = ?envelope.kind,
                        from = %envelope.sender,
                        "deferring message"
                    );
                    self.deferred.push_back(envelope);
                }
                None => return Err(RelayError::Shutdown(self.owner.clone())),
            }
        }
    }

    /// Like [`Mailbox::receive`] but gives up after `timeout`
    ///
    /// Returns `Ok(None)` on expiry. Nothing is lost when the wait is cut
    /// short: anything pulled off the channel is already deferred.
    pub async fn receive_timeout(
        &mut self,
        template: &Template,
        timeout: Duration,
    ) -> RelayResult<Option<Envelope>> {
        match tokio::time::timeout(timeout, self.receive(template)).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Non-blocking receive
    pub fn try_receive(&mut self, template: &Template) -> Option<Envelope> {
        if let Some(envelope) = self.take_deferred(template) {
            return Some(envelope);
        }
        while let Ok(envelope) = self.rx.try_recv() {
            if template.matches(&envelope) {
                return Some(envelope);
            }
            self.deferred.push_back(envelope);
        }
        None
    }

    /// Number of deferred envelopes
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    fn take_deferred(&mut self, template: &Template) -> Option<Envelope> {
        let pos = self.deferred.iter().position(|e| template.matches(e))?;
        self.deferred.remove(pos)
    }
}
