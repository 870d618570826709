use crate::types::{Batch, Error};
use commonware_cryptography::{Hasher, PublicKey};
use futures::{
    channel::{mpsc, oneshot},
    SinkExt,
};

/// Message types that can be sent to the `Mailbox`.
pub enum Message<P: PublicKey, H: Hasher> {
    /// Submit a batch from a local client.
    ///
    /// The responder is sent `Ok(())` once the batch has been accepted (or
    /// absorbed), or the rejection reason. Completion and expiry are reported
    /// through the engine's [Reporter](crate::Reporter), not the responder.
    Submit {
        batch: Batch<P, H>,
        responder: oneshot::Sender<Result<(), Error>>,
    },

    /// Snapshot the batches currently pending completion.
    Batches {
        responder: oneshot::Sender<Vec<Batch<P, H>>>,
    },
}

/// Ingress mailbox for the [Engine](super::Engine).
#[derive(Clone)]
pub struct Mailbox<P: PublicKey, H: Hasher> {
    sender: mpsc::Sender<Message<P, H>>,
}

impl<P: PublicKey, H: Hasher> Mailbox<P, H> {
    pub(crate) fn new(sender: mpsc::Sender<Message<P, H>>) -> Self {
        Self { sender }
    }

    /// Submits a batch to the local state.
    pub async fn submit(&mut self, batch: Batch<P, H>) -> Result<(), Error> {
        let (responder, receiver) = oneshot::channel();
        self.sender
            .send(Message::Submit { batch, responder })
            .await
            .expect("mailbox closed");
        receiver.await.expect("engine shutdown")
    }

    /// Returns the batches currently pending completion, sorted by identity.
    pub async fn batches(&mut self) -> Vec<Batch<P, H>> {
        let (responder, receiver) = oneshot::channel();
        self.sender
            .send(Message::Batches { responder })
            .await
            .expect("mailbox closed");
        receiver.await.unwrap_or_default()
    }
}
