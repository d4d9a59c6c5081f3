//! # Bilateral signalling between tasks.
//!
//! [`Signaler`] is a typed, bounded hand-off with a return path: every value
//! sent carries a single-use reply channel, so the receiving task can
//! acknowledge the delivery with a value of its own. It removes the
//! boilerplate of pairing an outbound channel with per-message reply
//! channels by hand.
//!
//! Three delivery modes, one method each:
//!
//! | Mode            | Method                      | Sender observes                       |
//! |-----------------|-----------------------------|---------------------------------------|
//! | Fire-and-forget | [`Signaler::signal`]        | nothing; the reply is discarded       |
//! | Wait            | [`Signaler::signal_wait`]   | blocks until the reply (or ctx fires) |
//! | Promise         | [`Signaler::signal_promise`]| reply forwarded to a channel, later   |
//!
//! Values are delivered point-to-point: many producers and many consumers
//! are fine, but each value reaches exactly one consumer. Deliveries are
//! FIFO per producer; there is no global order across producers.
//!
//! ## Wait mode
//! ```
//! use opskit::{Context, Signaler};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let sig = Signaler::<String, String>::new();
//! let rx = sig.receive();
//!
//! tokio::spawn(async move {
//!     while let Ok(ack) = rx.recv().await {
//!         let greeting = format!("hello, {}", ack.data());
//!         ack.ack(greeting);
//!     }
//! });
//!
//! let ctx = Context::new();
//! let reply = sig.signal_wait(&ctx, "ops".to_string()).await.unwrap();
//! assert_eq!(reply, "hello, ops");
//! # }
//! ```

use tokio::sync::{mpsc, oneshot};

use crate::context::{CancelError, Context};

/// Failures surfaced by the signalling methods.
#[non_exhaustive]
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignalError {
    /// The context fired while enqueueing or waiting for the reply.
    #[error(transparent)]
    Cancelled(#[from] CancelError),

    /// The signaller was closed.
    #[error("signaller is closed")]
    Closed,

    /// The consumer dropped the acker without acknowledging it.
    #[error("acker dropped without acknowledgement")]
    AckDropped,
}

/// A received value plus its single-use reply path.
///
/// Consumers read the payload with [`Acker::data`] and acknowledge exactly
/// once with [`Acker::ack`]. Dropping an acker unacknowledged fails a
/// sender blocked in wait mode with [`SignalError::AckDropped`] and
/// resolves a promise with the zero value.
#[derive(Debug)]
pub struct Acker<S, R> {
    data: S,
    reply: oneshot::Sender<R>,
}

impl<S, R> Acker<S, R> {
    fn new(data: S) -> (Self, oneshot::Receiver<R>) {
        let (reply, rx) = oneshot::channel();
        (Self { data, reply }, rx)
    }

    /// The payload the producer sent.
    pub fn data(&self) -> &S {
        &self.data
    }

    /// Acknowledges the delivery, returning `reply` to the producer.
    ///
    /// If the producer signalled fire-and-forget the reply goes nowhere;
    /// that is fine.
    pub fn ack(self, reply: R) {
        let _ = self.reply.send(reply);
    }

    /// Splits the acker into its payload and raw reply channel for cases
    /// where the payload must be consumed before replying.
    pub fn into_parts(self) -> (S, oneshot::Sender<R>) {
        (self.data, self.reply)
    }
}

/// Typed bilateral signaller; see the [module docs](self).
///
/// Cheap to clone; clones share the same buffer. `S` is the payload sent to
/// consumers, `R` the acknowledgement sent back.
pub struct Signaler<S, R> {
    tx: async_channel::Sender<Acker<S, R>>,
    rx: async_channel::Receiver<Acker<S, R>>,
}

impl<S, R> Clone for Signaler<S, R> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<S, R> std::fmt::Debug for Signaler<S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signaler")
            .field("buffered", &self.rx.len())
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<S, R> Default for Signaler<S, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, R> Signaler<S, R> {
    /// A signaller with a single-slot buffer.
    pub fn new() -> Self {
        Self::with_buffer(1)
    }

    /// A signaller buffering up to `n` undelivered values before
    /// [`Signaler::signal`] blocks. The buffer only smooths throughput; it
    /// never changes delivery semantics. `n` is clamped to at least 1.
    pub fn with_buffer(n: usize) -> Self {
        let (tx, rx) = async_channel::bounded(n.max(1));
        Self { tx, rx }
    }

    /// Enqueues `value` and returns as soon as it is buffered; the
    /// acknowledgement is discarded.
    pub async fn signal(&self, ctx: &Context, value: S) -> Result<(), SignalError> {
        let (acker, _reply) = Acker::new(value);
        self.push(ctx, acker).await
    }

    /// Enqueues `value` and blocks until a consumer acknowledges it,
    /// returning the reply.
    pub async fn signal_wait(&self, ctx: &Context, value: S) -> Result<R, SignalError> {
        let (acker, reply) = Acker::new(value);
        self.push(ctx, acker).await?;

        tokio::select! {
            ack = reply => ack.map_err(|_| SignalError::AckDropped),
            reason = ctx.cancelled() => Err(SignalError::Cancelled(reason)),
        }
    }

    /// Enqueues `value` and forwards the acknowledgement to `promise` once
    /// it arrives. Exactly one value is forwarded: the reply, or `R`'s
    /// default if the context fires (or the acker is dropped) first.
    ///
    /// Must be called inside a tokio runtime; the forwarder is a spawned
    /// task.
    pub async fn signal_promise(
        &self,
        ctx: &Context,
        value: S,
        promise: mpsc::Sender<R>,
    ) -> Result<(), SignalError>
    where
        R: Default + Send + 'static,
    {
        let (acker, reply) = Acker::new(value);
        self.push(ctx, acker).await?;

        let ctx = ctx.clone();
        tokio::spawn(async move {
            let value = tokio::select! {
                ack = reply => ack.unwrap_or_default(),
                _ = ctx.cancelled() => R::default(),
            };
            let _ = promise.send(value).await;
        });
        Ok(())
    }

    /// The consumer side: a stream of [`Acker`]s.
    ///
    /// Each call returns a new handle onto the same queue; every buffered
    /// value is delivered to exactly one of them. Receivers see the end of
    /// the stream after [`Signaler::close`].
    pub fn receive(&self) -> async_channel::Receiver<Acker<S, R>> {
        self.rx.clone()
    }

    /// Closes the signaller. Further signals fail with
    /// [`SignalError::Closed`]; receivers drain what is buffered and then
    /// observe end-of-stream. A closed signaller cannot be reopened.
    pub fn close(&self) {
        self.tx.close();
    }

    async fn push(&self, ctx: &Context, acker: Acker<S, R>) -> Result<(), SignalError> {
        tokio::select! {
            sent = self.tx.send(acker) => sent.map_err(|_| SignalError::Closed),
            reason = ctx.cancelled() => Err(SignalError::Cancelled(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_round_trip() {
        let sig = Signaler::<i32, i32>::new();
        let rx = sig.receive();

        tokio::spawn(async move {
            let ack = rx.recv().await.unwrap();
            let doubled = *ack.data() * 2;
            ack.ack(doubled);
        });

        let reply = sig.signal_wait(&Context::new(), 21).await.unwrap();
        assert_eq!(reply, 42);
    }

    #[tokio::test]
    async fn fire_and_forget_discards_the_reply() {
        let sig = Signaler::<&'static str, ()>::new();
        let ctx = Context::new();

        sig.signal(&ctx, "ping").await.unwrap();

        let ack = sig.receive().recv().await.unwrap();
        assert_eq!(*ack.data(), "ping");
        // The producer is long gone; acking is still fine.
        ack.ack(());
    }

    #[tokio::test]
    async fn deliveries_are_fifo_per_producer() {
        let sig = Signaler::<u32, ()>::with_buffer(8);
        let ctx = Context::new();

        for i in 0..5 {
            sig.signal(&ctx, i).await.unwrap();
        }

        let rx = sig.receive();
        for expected in 0..5 {
            let ack = rx.recv().await.unwrap();
            assert_eq!(*ack.data(), expected);
            ack.ack(());
        }
    }

    #[tokio::test]
    async fn promise_fan_out_round_trips_every_value() {
        let sig = Signaler::<i32, i32>::with_buffer(4);
        let ctx = Context::new();

        // 100 consumers, each doubling whatever it receives.
        for _ in 0..100 {
            let rx = sig.receive();
            tokio::spawn(async move {
                while let Ok(ack) = rx.recv().await {
                    let doubled = *ack.data() * 2;
                    ack.ack(doubled);
                }
            });
        }

        // 50 producers, each with its own promise channel.
        let mut promises = Vec::new();
        for i in 0..50 {
            let (tx, rx) = mpsc::channel(1);
            sig.signal_promise(&ctx, i, tx).await.unwrap();
            promises.push(rx);
        }

        let mut replies = Vec::new();
        for mut rx in promises {
            replies.push(rx.recv().await.unwrap());
        }
        replies.sort_unstable();

        let expected: Vec<i32> = (0..50).map(|i| i * 2).collect();
        assert_eq!(replies, expected);

        sig.close();
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_enqueue_does_not_deliver() {
        let sig = Signaler::<u8, ()>::with_buffer(1);
        let live = Context::new();
        sig.signal(&live, 1).await.unwrap(); // fill the buffer

        let ctx = Context::with_timeout(Duration::from_millis(50));
        let err = sig.signal(&ctx, 2).await.unwrap_err();
        assert_eq!(
            err,
            SignalError::Cancelled(CancelError::DeadlineExceeded)
        );

        // Only the first value was ever enqueued.
        let rx = sig.receive();
        assert_eq!(*rx.recv().await.unwrap().data(), 1);
        assert!(rx.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_gives_up_when_the_context_fires() {
        let sig = Signaler::<u8, u8>::new();
        let rx = sig.receive();

        // A consumer that takes the acker but never acknowledges it.
        let hold = tokio::spawn(async move {
            let ack = rx.recv().await.unwrap();
            tokio::time::sleep(Duration::from_secs(3600)).await;
            drop(ack);
        });

        let ctx = Context::with_timeout(Duration::from_secs(1));
        let err = sig.signal_wait(&ctx, 7).await.unwrap_err();
        assert_eq!(
            err,
            SignalError::Cancelled(CancelError::DeadlineExceeded)
        );
        hold.abort();
    }

    #[tokio::test]
    async fn dropped_acker_fails_a_waiting_sender() {
        let sig = Signaler::<u8, u8>::new();
        let rx = sig.receive();

        tokio::spawn(async move {
            let ack = rx.recv().await.unwrap();
            drop(ack);
        });

        let err = sig.signal_wait(&Context::new(), 7).await.unwrap_err();
        assert_eq!(err, SignalError::AckDropped);
    }

    #[tokio::test(start_paused = true)]
    async fn promise_resolves_to_default_on_cancellation() {
        let sig = Signaler::<u8, u8>::new();
        let ctx = Context::with_timeout(Duration::from_millis(100));

        let (tx, mut promise) = mpsc::channel(1);
        sig.signal_promise(&ctx, 9, tx).await.unwrap();

        // Nobody ever acknowledges; the promise still resolves, with zero.
        assert_eq!(promise.recv().await, Some(0));
    }

    #[tokio::test]
    async fn close_ends_the_receive_stream() {
        let sig = Signaler::<u8, ()>::with_buffer(4);
        let ctx = Context::new();

        sig.signal(&ctx, 1).await.unwrap();
        sig.close();

        assert_eq!(
            sig.signal(&ctx, 2).await.unwrap_err(),
            SignalError::Closed
        );

        // Buffered values drain, then the stream ends.
        let rx = sig.receive();
        assert_eq!(*rx.recv().await.unwrap().data(), 1);
        assert!(rx.recv().await.is_err());
    }
}
