//! Embassy channel backing the breaker input queue.
//!
//! Edge tasks, the user button and the console all feed the breaker task
//! through one channel so every input is applied from a single context.

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender, TryReceiveError, TrySendError};

use breaker_core::queue::{
    BreakerInput, InputDequeueError, InputEnqueueError, InputQueueConsumer, InputQueueProducer,
};

/// Depth of the input queue; one mains half-cycle of edges plus commands.
pub const INPUT_QUEUE_DEPTH: usize = 8;

#[cfg(target_os = "none")]
pub type BreakerMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
pub type BreakerMutex = NoopRawMutex;

pub type InputQueue = Channel<BreakerMutex, BreakerInput, INPUT_QUEUE_DEPTH>;
pub type InputSender<'a> = Sender<'a, BreakerMutex, BreakerInput, INPUT_QUEUE_DEPTH>;
pub type InputReceiver<'a> = Receiver<'a, BreakerMutex, BreakerInput, INPUT_QUEUE_DEPTH>;

/// Exposes the channel sender as a core queue producer.
pub struct InputProducer<'a> {
    sender: InputSender<'a>,
}

impl<'a> InputProducer<'a> {
    pub fn new(sender: InputSender<'a>) -> Self {
        Self { sender }
    }
}

impl InputQueueProducer for InputProducer<'_> {
    type Error = TrySendError<BreakerInput>;

    fn try_enqueue(&mut self, input: BreakerInput) -> Result<(), InputEnqueueError<Self::Error>> {
        match self.sender.try_send(input) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(InputEnqueueError::QueueFull),
        }
    }

    fn capacity(&self) -> Option<usize> {
        Some(INPUT_QUEUE_DEPTH)
    }

    fn len(&self) -> Option<usize> {
        Some(self.sender.len())
    }
}

/// Exposes the channel receiver as a core queue consumer.
pub struct InputConsumer<'a> {
    receiver: InputReceiver<'a>,
}

impl<'a> InputConsumer<'a> {
    pub fn new(receiver: InputReceiver<'a>) -> Self {
        Self { receiver }
    }

    /// Waits until an input is queued and returns it.
    pub async fn receive(&mut self) -> BreakerInput {
        self.receiver.receive().await
    }
}

impl InputQueueConsumer for InputConsumer<'_> {
    type Error = TryReceiveError;

    fn try_dequeue(&mut self) -> Result<Option<BreakerInput>, InputDequeueError<Self::Error>> {
        match self.receiver.try_receive() {
            Ok(input) => Ok(Some(input)),
            Err(TryReceiveError::Empty) => Ok(None),
        }
    }
}

/// Queues `input`, dropping it with a warning when the breaker task lags.
pub fn submit(producer: &mut impl InputQueueProducer, input: BreakerInput) -> bool {
    match producer.try_enqueue(input) {
        Ok(()) => true,
        Err(_) => {
            #[cfg(target_os = "none")]
            defmt::warn!("input queue full, dropping {}", input);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn producer_reports_full_queue() {
        let queue = InputQueue::new();
        let mut producer = InputProducer::new(queue.sender());
        for _ in 0..INPUT_QUEUE_DEPTH {
            assert!(submit(&mut producer, BreakerInput::ZeroCrossing));
        }
        assert_eq!(producer.len(), Some(INPUT_QUEUE_DEPTH));
        assert_eq!(
            producer.try_enqueue(BreakerInput::Open),
            Err(InputEnqueueError::QueueFull)
        );
        assert!(!submit(&mut producer, BreakerInput::Close));
    }

    #[test]
    fn consumer_returns_inputs_in_order() {
        let queue = InputQueue::new();
        let mut producer = InputProducer::new(queue.sender());
        let mut consumer = InputConsumer::new(queue.receiver());

        submit(&mut producer, BreakerInput::Close);
        submit(&mut producer, BreakerInput::SwitchChanged { closed: true });

        assert_eq!(consumer.try_dequeue(), Ok(Some(BreakerInput::Close)));
        assert_eq!(
            consumer.try_dequeue(),
            Ok(Some(BreakerInput::SwitchChanged { closed: true }))
        );
        assert_eq!(consumer.try_dequeue(), Ok(None));
    }
}
