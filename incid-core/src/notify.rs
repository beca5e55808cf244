//! Change notification seam.
//!
//! The editor reports every mutated field or collection through a
//! [`ChangeListener`] so the host can refresh its views. Notifications are
//! coarse: one [`Change`] per field or collection per recompute cycle.

use serde::{Deserialize, Serialize};

/// What changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    /// Primary code and its derived category/NVC hint
    Primary,
    /// Habitat type selection and the scoped primary index
    HabitatType,
    /// Secondary group selection
    SecondaryGroup,
    /// Secondary habitat collection
    Secondaries,
    /// Auto/User priority habitat partitions
    PriorityHabitats,
    Condition,
    Sources,
    /// A scalar field on the incid itself
    Incid,
    /// Whole aggregate replaced (load, reload)
    Loaded,
}

/// Receiver of change notifications.
pub trait ChangeListener {
    fn changed(&mut self, change: Change);
}

impl<F: FnMut(Change)> ChangeListener for F {
    fn changed(&mut self, change: Change) {
        self(change)
    }
}

/// Listener that discards every notification.
#[derive(Debug, Default)]
pub struct NoopListener;

impl ChangeListener for NoopListener {
    fn changed(&mut self, _change: Change) {}
}

/// Listener that records notifications in order.
#[derive(Debug, Default, Clone)]
pub struct RecordingListener {
    changes: Vec<Change>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Take the recorded notifications, leaving the log empty.
    pub fn drain(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.changes)
    }

    pub fn count(&self, change: Change) -> usize {
        self.changes.iter().filter(|c| **c == change).count()
    }
}

impl ChangeListener for RecordingListener {
    fn changed(&mut self, change: Change) {
        self.changes.push(change);
    }
}

/// Holds the active listener and a suspension depth.
///
/// While suspended, notifications are collected instead of delivered and are
/// flushed (deduplicated, in first-seen order) once the outermost suspension
/// ends.
pub(crate) struct Notifier {
    listener: Box<dyn ChangeListener>,
    suspended: usize,
    pending: Vec<Change>,
}

impl Notifier {
    pub(crate) fn new(listener: Box<dyn ChangeListener>) -> Self {
        Self {
            listener,
            suspended: 0,
            pending: Vec::new(),
        }
    }

    pub(crate) fn set_listener(&mut self, listener: Box<dyn ChangeListener>) {
        self.listener = listener;
    }

    pub(crate) fn notify(&mut self, change: Change) {
        if self.suspended > 0 {
            if !self.pending.contains(&change) {
                self.pending.push(change);
            }
        } else {
            self.listener.changed(change);
        }
    }

    pub(crate) fn suspend(&mut self) {
        self.suspended += 1;
    }

    pub(crate) fn resume(&mut self) {
        self.suspended = self.suspended.saturating_sub(1);
        if self.suspended == 0 {
            for change in std::mem::take(&mut self.pending) {
                self.listener.changed(change);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_suspended_notifications_flush_once() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let mut notifier = Notifier::new(Box::new(move |c: Change| sink.borrow_mut().push(c)));

        notifier.suspend();
        notifier.notify(Change::Secondaries);
        notifier.notify(Change::PriorityHabitats);
        notifier.notify(Change::Secondaries);
        assert!(log.borrow().is_empty());

        notifier.resume();
        assert_eq!(*log.borrow(), vec![Change::Secondaries, Change::PriorityHabitats]);

        notifier.notify(Change::Condition);
        assert_eq!(log.borrow().len(), 3);
    }

    #[test]
    fn test_nested_suspension() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let mut notifier = Notifier::new(Box::new(move |c: Change| sink.borrow_mut().push(c)));

        notifier.suspend();
        notifier.suspend();
        notifier.notify(Change::Sources);
        notifier.resume();
        assert!(log.borrow().is_empty());
        notifier.resume();
        assert_eq!(*log.borrow(), vec![Change::Sources]);
    }
}
