//! Scripted unreliable message delivery.

/// What happens to one message in transit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Delivered once.
    Deliver,
    /// Lost.
    Drop,
    /// Delivered twice.
    Duplicate,
}

/// A channel that follows a fixed delivery schedule.
///
/// Each transmitted message consumes the next schedule entry. Once the
/// schedule is used up every message is delivered.
#[derive(Debug, Clone, Default)]
pub struct LossyChannel {
    schedule: Vec<Delivery>,
    cursor: usize,
    dropped: usize,
}

impl LossyChannel {
    /// Creates a channel that always delivers.
    pub fn reliable() -> Self {
        Self::default()
    }

    /// Creates a channel following `schedule`.
    pub fn new(schedule: Vec<Delivery>) -> Self {
        Self {
            schedule,
            ..Self::default()
        }
    }

    /// Passes a message through the channel, returning what arrives.
    pub fn transmit<T: Clone>(&mut self, message: T) -> Vec<T> {
        let delivery = self
            .schedule
            .get(self.cursor)
            .copied()
            .unwrap_or(Delivery::Deliver);
        self.cursor += 1;
        match delivery {
            Delivery::Deliver => vec![message],
            Delivery::Drop => {
                self.dropped += 1;
                Vec::new()
            }
            Delivery::Duplicate => vec![message.clone(), message],
        }
    }

    /// Returns the number of messages lost so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}
