use crate::core::manager::IframeManager;
use crate::domain::ports::{CookieJar, Dom, ElementId, EventLoop, IntersectionEntry, ObserverId, TaskId};
use std::collections::BTreeMap;
use std::time::Duration;

/// Synchronous stand-in for the browser's observers and timers. Nothing fires
/// on its own: the harness reads what is observed or due and feeds it back.
#[derive(Debug, Clone)]
pub struct ManualEventLoop {
    supported: bool,
    observers: BTreeMap<usize, Vec<ElementId>>,
    next_observer: usize,
    timers: Vec<(Duration, TaskId)>,
    next_task: usize,
    now: Duration,
}

impl Default for ManualEventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualEventLoop {
    pub fn new() -> Self {
        Self {
            supported: true,
            observers: BTreeMap::new(),
            next_observer: 0,
            timers: Vec::new(),
            next_task: 0,
            now: Duration::ZERO,
        }
    }

    /// A runtime without intersection observation.
    pub fn without_intersection() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    pub fn observed(&self, observer: ObserverId) -> Vec<ElementId> {
        self.observers.get(&observer.0).cloned().unwrap_or_default()
    }

    /// Live observers and their targets, oldest first.
    pub fn observer_targets(&self) -> Vec<(ObserverId, Vec<ElementId>)> {
        self.observers
            .iter()
            .map(|(id, targets)| (ObserverId(*id), targets.clone()))
            .collect()
    }

    pub fn is_observing(&self, target: ElementId) -> bool {
        self.observers.values().any(|targets| targets.contains(&target))
    }

    pub fn pending_timeouts(&self) -> usize {
        self.timers.len()
    }

    /// Moves the clock forward and returns the tasks that became due, in order.
    pub fn advance(&mut self, by: Duration) -> Vec<TaskId> {
        self.now += by;
        let now = self.now;
        let mut due: Vec<(Duration, TaskId)> = Vec::new();
        self.timers.retain(|timer| {
            if timer.0 <= now {
                due.push(*timer);
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(at, task)| (*at, task.0));
        due.into_iter().map(|(_, task)| task).collect()
    }

    /// Runs the clock up to the last registered timeout.
    pub fn advance_all(&mut self) -> Vec<TaskId> {
        let latest = self.timers.iter().map(|(at, _)| *at).max();
        match latest {
            Some(at) => self.advance(at.saturating_sub(self.now)),
            None => Vec::new(),
        }
    }
}

impl EventLoop for ManualEventLoop {
    fn supports_intersection(&self) -> bool {
        self.supported
    }

    fn create_observer(&mut self) -> ObserverId {
        let id = self.next_observer;
        self.next_observer += 1;
        self.observers.insert(id, Vec::new());
        ObserverId(id)
    }

    fn observe(&mut self, observer: ObserverId, target: ElementId) {
        if let Some(targets) = self.observers.get_mut(&observer.0) {
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
    }

    fn unobserve(&mut self, observer: ObserverId, target: ElementId) {
        if let Some(targets) = self.observers.get_mut(&observer.0) {
            targets.retain(|t| *t != target);
        }
    }

    fn disconnect(&mut self, observer: ObserverId) {
        self.observers.remove(&observer.0);
    }

    fn set_timeout(&mut self, delay: Duration) -> TaskId {
        let task = TaskId(self.next_task);
        self.next_task += 1;
        self.timers.push((self.now + delay, task));
        task
    }
}

impl<D: Dom, C: CookieJar> IframeManager<D, C, ManualEventLoop> {
    /// Scrolls every observed placeholder into view and runs the resulting
    /// timeouts until nothing is left to do.
    pub fn reveal_all(&mut self) {
        loop {
            for (observer, targets) in self.event_loop().observer_targets() {
                if targets.is_empty() {
                    continue;
                }
                let entries: Vec<IntersectionEntry> = targets
                    .into_iter()
                    .map(|target| IntersectionEntry {
                        target,
                        is_intersecting: true,
                    })
                    .collect();
                self.handle_intersection(observer, &entries);
            }

            let due = self.event_loop_mut().advance_all();
            let idle = due.is_empty();
            for task in due {
                self.run_task(task);
            }
            self.settle_pending();

            let observing = self
                .event_loop()
                .observer_targets()
                .iter()
                .any(|(_, targets)| !targets.is_empty());
            if idle && !observing {
                break;
            }
        }
    }
}
