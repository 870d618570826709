use crate::{
    types::{Activity, Batch},
    Reporter as Z,
};
use commonware_cryptography::{Committable, Hasher, PublicKey};
use futures::{
    channel::{mpsc, oneshot},
    SinkExt, StreamExt,
};
use std::collections::BTreeMap;

enum Message<P: PublicKey, H: Hasher> {
    Activity(Activity<P, H>),
    GetCompleted(H::Digest, oneshot::Sender<Option<Batch<P, H>>>),
    GetExpired(H::Digest, oneshot::Sender<Option<Batch<P, H>>>),
    GetUpdates(oneshot::Sender<usize>),
    GetCounts(oneshot::Sender<(usize, usize)>),
}

/// Records the activity reported by an engine and answers queries about it.
///
/// An identity may complete (or expire) more than once if it is re-observed
/// fresh after leaving the state, so events are counted rather than asserted
/// unique; deduplication past completion belongs to the downstream pipeline.
pub struct Reporter<P: PublicKey, H: Hasher> {
    mailbox: mpsc::Receiver<Message<P, H>>,

    // Completed batches by identity
    completed: BTreeMap<H::Digest, Batch<P, H>>,

    // Expired batches by identity
    expired: BTreeMap<H::Digest, Batch<P, H>>,

    // Number of update notifications observed
    updates: usize,

    // Number of completion and expiry events observed
    completions: usize,
    expiries: usize,
}

impl<P: PublicKey, H: Hasher> Reporter<P, H> {
    pub fn new() -> (Self, Mailbox<P, H>) {
        let (sender, receiver) = mpsc::channel(1024);
        (
            Reporter {
                mailbox: receiver,
                completed: BTreeMap::new(),
                expired: BTreeMap::new(),
                updates: 0,
                completions: 0,
                expiries: 0,
            },
            Mailbox { sender },
        )
    }

    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.next().await {
            match msg {
                Message::Activity(Activity::Completed(batch)) => {
                    self.completions += 1;
                    self.completed.insert(batch.commitment(), batch);
                }
                Message::Activity(Activity::Expired(batch)) => {
                    self.expiries += 1;
                    self.expired.insert(batch.commitment(), batch);
                }
                Message::Activity(Activity::Updated(_)) => {
                    self.updates += 1;
                }
                Message::GetCompleted(id, sender) => {
                    sender.send(self.completed.get(&id).cloned()).unwrap();
                }
                Message::GetExpired(id, sender) => {
                    sender.send(self.expired.get(&id).cloned()).unwrap();
                }
                Message::GetUpdates(sender) => {
                    sender.send(self.updates).unwrap();
                }
                Message::GetCounts(sender) => {
                    sender.send((self.completions, self.expiries)).unwrap();
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct Mailbox<P: PublicKey, H: Hasher> {
    sender: mpsc::Sender<Message<P, H>>,
}

impl<P: PublicKey, H: Hasher> Z for Mailbox<P, H> {
    type Activity = Activity<P, H>;

    async fn report(&mut self, activity: Self::Activity) {
        self.sender
            .send(Message::Activity(activity))
            .await
            .expect("failed to send activity");
    }
}

impl<P: PublicKey, H: Hasher> Mailbox<P, H> {
    /// Returns the completed batch with the given identity, if any.
    pub async fn completed(&mut self, id: H::Digest) -> Option<Batch<P, H>> {
        let (sender, receiver) = oneshot::channel();
        self.sender
            .send(Message::GetCompleted(id, sender))
            .await
            .unwrap();
        receiver.await.unwrap()
    }

    /// Returns the expired batch with the given identity, if any.
    pub async fn expired(&mut self, id: H::Digest) -> Option<Batch<P, H>> {
        let (sender, receiver) = oneshot::channel();
        self.sender
            .send(Message::GetExpired(id, sender))
            .await
            .unwrap();
        receiver.await.unwrap()
    }

    /// Returns the number of update notifications observed.
    pub async fn updates(&mut self) -> usize {
        let (sender, receiver) = oneshot::channel();
        self.sender.send(Message::GetUpdates(sender)).await.unwrap();
        receiver.await.unwrap()
    }

    /// Returns the number of completion and expiry events observed.
    pub async fn counts(&mut self) -> (usize, usize) {
        let (sender, receiver) = oneshot::channel();
        self.sender.send(Message::GetCounts(sender)).await.unwrap();
        receiver.await.unwrap()
    }
}
