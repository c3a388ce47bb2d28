//! Hand-off of estimates from a filtering loop to a concurrently running consumer.
//!
//! Filters are synchronous; a run that wants to log or export its estimates without stalling
//! the estimation loop spawns an [`EstimateChannel`]. Estimates are delivered in the order
//! they were sent through a bounded `mpsc::sync_channel`, so a slow consumer applies
//! back-pressure to the producer instead of growing a queue without limit.
//!
//! ```no_run
//! use ndarray::{arr1, Array2};
//! use rusty_kalman::filter::{CovarianceEstimate, HybridFilter};
//! use rusty_kalman::noise::Noiseless;
//! use rusty_kalman::pipeline::EstimateChannel;
//! use rusty_kalman::types::identity;
//!
//! let noise = Noiseless::with_covariances(identity(1), identity(1));
//! let mut kf = HybridFilter::new(arr1(&[0.0]), identity(1), noise, 1)?;
//! let channel = EstimateChannel::spawn(Vec::<CovarianceEstimate>::new(), 16);
//! for z in [0.9, 1.1, 1.0] {
//!     kf.prepare(Array2::eye(1), Array2::eye(1))?;
//!     channel.send(kf.update(&arr1(&[z]), &arr1(&[0.0]))?)?;
//! }
//! let estimates = channel.finish()?;
//! assert_eq!(estimates.len(), 3);
//! # Ok::<(), rusty_kalman::error::FilterError>(())
//! ```
use std::any::Any;
use std::sync::mpsc::{self, SyncSender};
use std::thread::{self, JoinHandle};

use tracing::{trace, warn};

use crate::error::{FilterError, Result};

/// Consumer of a stream of estimates, driven on the channel's consumer thread.
pub trait EstimateSink<E>: Send + 'static {
    /// Receives the next estimate. An error stops the consumer.
    fn consume(&mut self, estimate: E) -> Result<()>;

    /// Called once after the producer closed the channel and every estimate was consumed.
    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<E: Send + 'static> EstimateSink<E> for Vec<E> {
    fn consume(&mut self, estimate: E) -> Result<()> {
        self.push(estimate);
        Ok(())
    }
}

/// Producer side of an ordered, bounded estimate channel with its consumer thread.
///
/// Dropping the channel without [`finish`](Self::finish) still closes it and waits for the
/// consumer to drain and finalize the sink; a sink failure is then only logged.
pub struct EstimateChannel<E, S> {
    sender: Option<SyncSender<E>>,
    consumer: Option<JoinHandle<Result<S>>>,
}

impl<E, S> EstimateChannel<E, S>
where
    E: Send + 'static,
    S: EstimateSink<E>,
{
    /// Starts a consumer thread feeding `sink`, with room for `capacity` in-flight estimates.
    pub fn spawn(mut sink: S, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::sync_channel(capacity);
        let consumer = thread::spawn(move || -> Result<S> {
            for (k, estimate) in receiver.iter().enumerate() {
                trace!(k, "consuming estimate");
                sink.consume(estimate)?;
            }
            trace!("estimate channel closed, finalizing sink");
            sink.finalize()?;
            Ok(sink)
        });
        EstimateChannel {
            sender: Some(sender),
            consumer: Some(consumer),
        }
    }

    /// Queues `estimate`, blocking while the channel is full.
    ///
    /// Fails with [`FilterError::SinkClosed`] once the consumer stopped, which happens when
    /// the sink returned an error; [`finish`](Self::finish) then reports that error.
    pub fn send(&self, estimate: E) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(FilterError::SinkClosed)?;
        sender.send(estimate).map_err(|_| FilterError::SinkClosed)
    }

    /// Closes the channel, waits until the consumer drained and finalized the sink, and
    /// returns it.
    pub fn finish(mut self) -> Result<S> {
        self.close().unwrap_or(Err(FilterError::SinkClosed))
    }
}

impl<E, S> EstimateChannel<E, S> {
    /// Drops the sender and joins the consumer; `None` when that already happened.
    fn close(&mut self) -> Option<Result<S>> {
        self.sender.take();
        let consumer = self.consumer.take()?;
        Some(match consumer.join() {
            Ok(result) => result,
            Err(panic) => Err(FilterError::Sink(panic_message(panic.as_ref()))),
        })
    }
}

impl<E, S> Drop for EstimateChannel<E, S> {
    fn drop(&mut self) {
        if let Some(Err(err)) = self.close() {
            warn!(error = %err, "estimate consumer failed");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "consumer thread panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Estimate, HybridFilter};
    use crate::noise::Noiseless;
    use crate::types::identity;
    use ndarray::{arr1, Array2};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct FailingSink {
        seen: usize,
        fail_at: usize,
    }

    impl EstimateSink<usize> for FailingSink {
        fn consume(&mut self, _estimate: usize) -> Result<()> {
            self.seen += 1;
            if self.seen == self.fail_at {
                return Err(FilterError::Sink("disk full".to_string()));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct SummingSink {
        total: f64,
        finalized: bool,
    }

    impl EstimateSink<f64> for SummingSink {
        fn consume(&mut self, estimate: f64) -> Result<()> {
            assert!(!self.finalized);
            self.total += estimate;
            Ok(())
        }

        fn finalize(&mut self) -> Result<()> {
            self.finalized = true;
            Ok(())
        }
    }

    struct SlowSink {
        consumed: Arc<AtomicUsize>,
        finalized: Arc<AtomicBool>,
    }

    impl EstimateSink<u32> for SlowSink {
        fn consume(&mut self, _estimate: u32) -> Result<()> {
            thread::sleep(Duration::from_millis(50));
            self.consumed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn finalize(&mut self) -> Result<()> {
            self.finalized.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn estimates_arrive_in_step_order() {
        let channel = EstimateChannel::spawn(Vec::new(), 4);
        for k in 0..500 {
            channel.send(k).unwrap();
        }
        let received = channel.finish().unwrap();
        assert_eq!(received, (0..500).collect::<Vec<_>>());
    }

    #[test]
    fn zero_capacity_is_a_rendezvous() {
        let channel = EstimateChannel::spawn(Vec::new(), 0);
        for k in 0..10 {
            channel.send(k).unwrap();
        }
        assert_eq!(channel.finish().unwrap().len(), 10);
    }

    #[test]
    fn sink_is_finalized_after_draining() {
        let channel = EstimateChannel::spawn(SummingSink::default(), 2);
        for value in [1.0, 2.0, 3.5] {
            channel.send(value).unwrap();
        }
        let sink = channel.finish().unwrap();
        assert!(sink.finalized);
        assert_eq!(sink.total, 6.5);
    }

    #[test]
    fn dropping_the_channel_waits_for_the_sink() {
        let consumed = Arc::new(AtomicUsize::new(0));
        let finalized = Arc::new(AtomicBool::new(false));
        {
            let sink = SlowSink {
                consumed: Arc::clone(&consumed),
                finalized: Arc::clone(&finalized),
            };
            let channel = EstimateChannel::spawn(sink, 4);
            for k in 0..3 {
                channel.send(k).unwrap();
            }
        }
        assert_eq!(consumed.load(Ordering::SeqCst), 3);
        assert!(finalized.load(Ordering::SeqCst));
    }

    #[test]
    fn dropping_after_a_sink_failure_does_not_panic() {
        let channel = EstimateChannel::spawn(FailingSink { seen: 0, fail_at: 1 }, 1);
        let _ = channel.send(0);
        drop(channel);
    }

    #[test]
    fn sink_errors_close_the_channel() -> std::result::Result<(), String> {
        let channel = EstimateChannel::spawn(FailingSink { seen: 0, fail_at: 3 }, 1);
        let mut closed = false;
        for k in 0..100 {
            match channel.send(k) {
                Ok(()) => {}
                Err(FilterError::SinkClosed) => {
                    closed = true;
                    break;
                }
                Err(other) => return Err(format!("unexpected error {}", other)),
            }
        }
        assert!(closed);
        match channel.finish() {
            Err(FilterError::Sink(message)) => {
                assert_eq!(message, "disk full");
                Ok(())
            }
            Err(other) => Err(format!("unexpected error {}", other)),
            Ok(_) => Err("failing sink finished successfully".to_string()),
        }
    }

    #[test]
    fn consumer_panics_are_reported() {
        struct PanickingSink;
        impl EstimateSink<u8> for PanickingSink {
            fn consume(&mut self, _estimate: u8) -> Result<()> {
                panic!("sink exploded");
            }
        }

        let channel = EstimateChannel::spawn(PanickingSink, 1);
        let _ = channel.send(1);
        match channel.finish() {
            Err(FilterError::Sink(message)) => assert_eq!(message, "sink exploded"),
            _ => panic!("panic was not reported"),
        }
    }

    #[test]
    fn carries_filter_estimates() {
        let noise = Noiseless::with_covariances(identity(1), identity(1));
        let mut kf = HybridFilter::new(arr1(&[0.0]), identity(1), noise, 1).unwrap();
        let channel = EstimateChannel::spawn(Vec::new(), 2);
        let mut sent = Vec::new();
        for z in [1.0, 2.0, 3.0] {
            kf.prepare(Array2::eye(1), Array2::eye(1)).unwrap();
            let estimate = kf.update(&arr1(&[z]), &arr1(&[0.0])).unwrap();
            sent.push(estimate.clone());
            channel.send(estimate).unwrap();
        }
        let received = channel.finish().unwrap();
        assert_eq!(received, sent);
        assert_eq!(received[2].measurement(), &arr1(&[3.0]));
    }
}
