/// Handle to a scheduled timer, used for cancelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug)]
struct Timer<T> {
    id: TimerId,
    due_ms: f64,
    event: T,
}

/// Coarse timers, fired from the host's tick.
///
/// Nothing fires on its own: due events are only handed out by [Scheduler::drain_due].
#[derive(Debug)]
pub struct Scheduler<T> {
    next_id: u64,
    timers: Vec<Timer<T>>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            timers: Vec::new(),
        }
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due_ms: f64, event: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;

        self.timers.push(Timer { id, due_ms, event });

        id
    }

    /// Cancel a timer. Returns false if it already fired or was already cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.timers.iter().position(|v| v.id == id) {
            Some(i) => {
                self.timers.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.timers.iter().any(|v| v.id == id)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Remove and return every event due at `now_ms`, earliest first. Ties keep scheduling order.
    pub fn drain_due(&mut self, now_ms: f64) -> Vec<T> {
        let (mut due, pending): (Vec<Timer<T>>, Vec<Timer<T>>) = std::mem::take(&mut self.timers)
            .into_iter()
            .partition(|v| v.due_ms <= now_ms);
        self.timers = pending;

        due.sort_by(|a, b| a.due_ms.total_cmp(&b.due_ms).then(a.id.0.cmp(&b.id.0)));

        due.into_iter().map(|v| v.event).collect()
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }
}
