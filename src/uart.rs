use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;

/// Receive queue between the UART interrupt and [`crate::Cellular::spin`].
///
/// The ISR calls [`RxQueue::push`] for every received byte; the engine drains
/// the queue into its framer at the start of each tick. Use
/// `CriticalSectionRawMutex` when pushing from an interrupt.
pub struct RxQueue<M: RawMutex, const N: usize> {
    channel: Channel<M, u8, N>,
}

impl<M: RawMutex, const N: usize> RxQueue<M, N> {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Returns `false` when the byte was dropped because the queue is full.
    pub fn push(&self, byte: u8) -> bool {
        self.channel.try_send(byte).is_ok()
    }

    pub(crate) fn pop(&self) -> Option<u8> {
        self.channel.try_receive().ok()
    }

    pub fn clear(&self) {
        while self.pop().is_some() {}
    }
}

impl<M: RawMutex, const N: usize> Default for RxQueue<M, N> {
    fn default() -> Self {
        Self::new()
    }
}
