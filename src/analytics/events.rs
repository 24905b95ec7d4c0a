use serde::Serialize;

/// Half-open interval `[start, end)` in seconds with continuous motion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MotionEvent {
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventState {
    Idle,
    InEvent { start: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    Unchanged,
    Opened,
    Closed(MotionEvent),
}

#[derive(Debug)]
pub struct EventAggregator {
    state: EventState,
    events: Vec<MotionEvent>,
}

impl EventAggregator {
    pub fn new() -> Self {
        Self {
            state: EventState::Idle,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> EventState {
        self.state
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn observe(&mut self, timestamp: f64, motion: bool) -> Transition {
        match (self.state, motion) {
            (EventState::Idle, true) => {
                self.state = EventState::InEvent { start: timestamp };
                Transition::Opened
            }
            (EventState::InEvent { start }, false) => {
                let event = MotionEvent {
                    start,
                    end: timestamp,
                };
                self.events.push(event);
                self.state = EventState::Idle;
                Transition::Closed(event)
            }
            _ => Transition::Unchanged,
        }
    }

    pub fn finish(mut self, last_timestamp: f64) -> Vec<MotionEvent> {
        if let EventState::InEvent { start } = self.state {
            self.events.push(MotionEvent {
                start,
                end: last_timestamp,
            });
        }
        self.events
    }
}

impl Default for EventAggregator {
    fn default() -> Self {
        Self::new()
    }
}
