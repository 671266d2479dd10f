use crate::core::registry::INDEX_ATTRIBUTE;
use crate::domain::model::PlaceholderRecord;
use crate::domain::ports::{Dom, ElementId, EventLoop, IntersectionEntry, ObserverId, TaskId};
use std::collections::HashMap;
use std::time::Duration;

/// Delay between activations that become visible in the same batch.
pub const ACTIVATION_STAGGER: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Purpose {
    Embeds(String),
    Thumbnails(String),
}

/// A deferred activation waiting for its timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledActivation {
    pub service: String,
    pub target: ElementId,
}

/// A placeholder whose thumbnail should load now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailRequest {
    pub service: String,
    pub index: usize,
}

/// Bookkeeping for viewport observers and the staggered timeouts they spawn.
#[derive(Debug, Default)]
pub struct VisibilityScheduler {
    observers: HashMap<ObserverId, Purpose>,
    tasks: HashMap<TaskId, ScheduledActivation>,
    halted: bool,
}

impl VisibilityScheduler {
    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn resume(&mut self) {
        self.halted = false;
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Drops every observer and timeout.
    pub fn reset<E: EventLoop>(&mut self, events: &mut E) {
        for observer in self.observers.keys() {
            events.disconnect(*observer);
        }
        self.observers.clear();
        self.tasks.clear();
        self.halted = false;
    }

    /// Watches every placeholder without an embed. Returns false when the
    /// runtime cannot observe intersections, in which case nothing happens.
    pub fn schedule_activation<E: EventLoop>(
        &mut self,
        events: &mut E,
        service: &str,
        records: &[PlaceholderRecord],
    ) -> bool {
        if !events.supports_intersection() {
            return false;
        }

        let observer = events.create_observer();
        self.observers
            .insert(observer, Purpose::Embeds(service.to_string()));
        for record in records.iter().filter(|record| !record.has_embed) {
            events.observe(observer, record.element);
        }
        true
    }

    pub fn watch_thumbnails<E: EventLoop>(
        &mut self,
        events: &mut E,
        service: &str,
        records: &[PlaceholderRecord],
    ) -> bool {
        if !events.supports_intersection() {
            return false;
        }

        let observer = events.create_observer();
        self.observers
            .insert(observer, Purpose::Thumbnails(service.to_string()));
        for record in records {
            events.observe(observer, record.element);
        }
        true
    }

    /// Disconnects the service's activation observers and forgets its timeouts.
    pub fn cancel_service<E: EventLoop>(&mut self, events: &mut E, service: &str) {
        self.observers.retain(|observer, purpose| match purpose {
            Purpose::Embeds(name) if name == service => {
                events.disconnect(*observer);
                false
            }
            _ => true,
        });
        self.tasks.retain(|_, task| task.service != service);
    }

    /// Handles one observer callback. Activation targets turn into staggered
    /// timeouts; thumbnail targets are returned for immediate loading.
    pub fn on_intersection<D: Dom, E: EventLoop>(
        &mut self,
        events: &mut E,
        dom: &D,
        observer: ObserverId,
        entries: &[IntersectionEntry],
    ) -> Vec<ThumbnailRequest> {
        let Some(purpose) = self.observers.get(&observer).cloned() else {
            events.disconnect(observer);
            return Vec::new();
        };

        match purpose {
            Purpose::Embeds(service) => {
                if self.halted {
                    tracing::debug!("Activation observer for '{}' halted", service);
                    events.disconnect(observer);
                    self.observers.remove(&observer);
                    return Vec::new();
                }

                for (position, entry) in entries.iter().enumerate() {
                    if !entry.is_intersecting {
                        continue;
                    }
                    let task = events.set_timeout(ACTIVATION_STAGGER * position as u32);
                    self.tasks.insert(
                        task,
                        ScheduledActivation {
                            service: service.clone(),
                            target: entry.target,
                        },
                    );
                    events.unobserve(observer, entry.target);
                }
                Vec::new()
            }
            Purpose::Thumbnails(service) => entries
                .iter()
                .filter(|entry| entry.is_intersecting)
                .filter_map(|entry| {
                    events.unobserve(observer, entry.target);
                    record_index(dom, entry.target).map(|index| ThumbnailRequest {
                        service: service.clone(),
                        index,
                    })
                })
                .collect(),
        }
    }

    /// Claims a fired timeout. Returns the activation with the record index
    /// resolved, or `None` when halted or unknown.
    pub fn take_task<D: Dom>(&mut self, dom: &D, task: TaskId) -> Option<(String, usize)> {
        let scheduled = self.tasks.remove(&task)?;
        if self.halted {
            tracing::debug!("Dropping scheduled activation for '{}' (halted)", scheduled.service);
            return None;
        }
        let index = record_index(dom, scheduled.target)?;
        Some((scheduled.service, index))
    }
}

fn record_index<D: Dom>(dom: &D, element: ElementId) -> Option<usize> {
    dom.attribute(element, INDEX_ATTRIBUTE)
        .and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{ManualEventLoop, MemoryDom};

    fn records(dom: &mut MemoryDom, count: usize) -> Vec<PlaceholderRecord> {
        (0..count)
            .map(|index| {
                let element = dom.add_placeholder("demo", &[]);
                dom.set_attribute(element, INDEX_ATTRIBUTE, &index.to_string());
                PlaceholderRecord::new(index, element)
            })
            .collect()
    }

    fn visible(targets: &[ElementId]) -> Vec<IntersectionEntry> {
        targets
            .iter()
            .map(|target| IntersectionEntry {
                target: *target,
                is_intersecting: true,
            })
            .collect()
    }

    #[test]
    fn test_intersections_become_staggered_tasks() {
        let mut dom = MemoryDom::default();
        let mut events = ManualEventLoop::new();
        let mut scheduler = VisibilityScheduler::default();
        let mut placeholders = records(&mut dom, 3);
        placeholders[1].has_embed = true;

        assert!(scheduler.schedule_activation(&mut events, "demo", &placeholders));
        let (observer, targets) = events.observer_targets().remove(0);
        assert_eq!(targets, vec![placeholders[0].element, placeholders[2].element]);

        scheduler.on_intersection(&mut events, &dom, observer, &visible(&targets));
        assert!(events.observed(observer).is_empty());
        assert_eq!(scheduler.pending_tasks(), 2);

        let first = events.advance(Duration::ZERO);
        assert_eq!(first.len(), 1);
        assert_eq!(scheduler.take_task(&dom, first[0]), Some(("demo".to_string(), 0)));

        let second = events.advance(ACTIVATION_STAGGER);
        assert_eq!(scheduler.take_task(&dom, second[0]), Some(("demo".to_string(), 2)));
    }

    #[test]
    fn test_halt_suppresses_callbacks_and_tasks() {
        let mut dom = MemoryDom::default();
        let mut events = ManualEventLoop::new();
        let mut scheduler = VisibilityScheduler::default();
        let placeholders = records(&mut dom, 2);

        scheduler.schedule_activation(&mut events, "demo", &placeholders);
        let (observer, targets) = events.observer_targets().remove(0);
        scheduler.on_intersection(&mut events, &dom, observer, &visible(&targets[..1]));

        scheduler.halt();
        let due = events.advance_all();
        assert_eq!(scheduler.take_task(&dom, due[0]), None);

        scheduler.on_intersection(&mut events, &dom, observer, &visible(&targets[1..]));
        assert!(events.observer_targets().is_empty());
        assert_eq!(events.pending_timeouts(), 0);
    }

    #[test]
    fn test_unsupported_runtime_is_inert() {
        let mut dom = MemoryDom::default();
        let mut events = ManualEventLoop::without_intersection();
        let mut scheduler = VisibilityScheduler::default();
        let placeholders = records(&mut dom, 1);

        assert!(!scheduler.schedule_activation(&mut events, "demo", &placeholders));
        assert!(events.observer_targets().is_empty());
    }

    #[test]
    fn test_thumbnail_requests_resolve_indices() {
        let mut dom = MemoryDom::default();
        let mut events = ManualEventLoop::new();
        let mut scheduler = VisibilityScheduler::default();
        let placeholders = records(&mut dom, 2);

        scheduler.watch_thumbnails(&mut events, "demo", &placeholders);
        let (observer, targets) = events.observer_targets().remove(0);
        let entries = vec![
            IntersectionEntry {
                target: targets[0],
                is_intersecting: false,
            },
            IntersectionEntry {
                target: targets[1],
                is_intersecting: true,
            },
        ];

        let requests = scheduler.on_intersection(&mut events, &dom, observer, &entries);
        assert_eq!(
            requests,
            vec![ThumbnailRequest {
                service: "demo".to_string(),
                index: 1
            }]
        );
        assert_eq!(events.observed(observer), vec![targets[0]]);
    }

    #[test]
    fn test_cancel_service_disconnects_its_observers() {
        let mut dom = MemoryDom::default();
        let mut events = ManualEventLoop::new();
        let mut scheduler = VisibilityScheduler::default();
        let placeholders = records(&mut dom, 1);

        scheduler.schedule_activation(&mut events, "demo", &placeholders);
        scheduler.watch_thumbnails(&mut events, "demo", &placeholders);
        scheduler.cancel_service(&mut events, "demo");

        assert_eq!(events.observer_targets().len(), 1);
    }
}
