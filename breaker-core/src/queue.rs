//! Input queue between interrupt producers and the breaker task.
//!
//! Edge interrupts and command surfaces never touch the state machines. They
//! push a [`BreakerInput`] into a queue and the single consumer applies the
//! inputs one at a time through
//! [`TripCurve::drain`](crate::trip_curve::TripCurve::drain). Firmware backs
//! the traits with an `embassy-sync` channel; host code can use a
//! [`heapless::Deque`] directly.

use core::fmt;

use heapless::Deque;

/// Inputs accepted by the breaker task.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BreakerInput {
    /// Mains voltage crossed zero.
    ZeroCrossing,
    /// Switch status line changed; the driver has already latched its cause.
    SwitchChanged { closed: bool },
    /// Open command.
    Open,
    /// Close command.
    Close,
}

impl fmt::Display for BreakerInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Error surfaced when an input cannot be enqueued.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InputEnqueueError<E = ()> {
    /// Queue has reached its maximum capacity.
    QueueFull,
    /// Queue has been disconnected from its consumer.
    Disconnected,
    /// Transport-specific failure.
    Other(E),
}

impl<E> InputEnqueueError<E> {
    /// Maps the inner error type.
    pub fn map_other<F, M>(self, mapper: M) -> InputEnqueueError<F>
    where
        M: FnOnce(E) -> F,
    {
        match self {
            InputEnqueueError::QueueFull => InputEnqueueError::QueueFull,
            InputEnqueueError::Disconnected => InputEnqueueError::Disconnected,
            InputEnqueueError::Other(err) => InputEnqueueError::Other(mapper(err)),
        }
    }
}

/// Error surfaced when dequeueing an input fails.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InputDequeueError<E = ()> {
    /// Queue has been disconnected from its producers.
    Disconnected,
    /// Transport-specific failure.
    Other(E),
}

impl<E> InputDequeueError<E> {
    /// Maps the inner error type.
    pub fn map_other<F, M>(self, mapper: M) -> InputDequeueError<F>
    where
        M: FnOnce(E) -> F,
    {
        match self {
            InputDequeueError::Disconnected => InputDequeueError::Disconnected,
            InputDequeueError::Other(err) => InputDequeueError::Other(mapper(err)),
        }
    }
}

/// Producer side of the input queue; must be callable from interrupt context.
pub trait InputQueueProducer {
    /// Transport-specific error type.
    type Error;

    /// Attempts to enqueue an input without blocking.
    fn try_enqueue(&mut self, input: BreakerInput) -> Result<(), InputEnqueueError<Self::Error>>;

    /// Returns the queue capacity if it is known.
    fn capacity(&self) -> Option<usize> {
        None
    }

    /// Returns the current queue depth if it can be observed.
    fn len(&self) -> Option<usize> {
        None
    }

    /// Returns `true` when the queue reports that it currently holds no items.
    fn is_empty(&self) -> Option<bool> {
        self.len().map(|current| current == 0)
    }
}

/// Consumer side of the input queue, owned by the breaker task.
pub trait InputQueueConsumer {
    /// Transport-specific error type.
    type Error;

    /// Returns `Ok(None)` when the queue is currently empty.
    fn try_dequeue(&mut self) -> Result<Option<BreakerInput>, InputDequeueError<Self::Error>>;
}

impl<const N: usize> InputQueueProducer for Deque<BreakerInput, N> {
    type Error = ();

    fn try_enqueue(&mut self, input: BreakerInput) -> Result<(), InputEnqueueError<Self::Error>> {
        self.push_back(input)
            .map_err(|_| InputEnqueueError::QueueFull)
    }

    fn capacity(&self) -> Option<usize> {
        Some(N)
    }

    fn len(&self) -> Option<usize> {
        Some(<Deque<BreakerInput, N>>::len(self))
    }
}

impl<const N: usize> InputQueueConsumer for Deque<BreakerInput, N> {
    type Error = ();

    fn try_dequeue(&mut self) -> Result<Option<BreakerInput>, InputDequeueError<Self::Error>> {
        Ok(self.pop_front())
    }
}
