//! The runtime context: owns the host primitives, the placeholder registry
//! and the consent map, and routes host events back into the components.

use crate::config::ManagerConfig;
use crate::core::consent_store::{clear_consent, get_consent, set_consent};
use crate::core::embed::{self, Activation};
use crate::core::notice;
use crate::core::registry::{resolve_language, Registry};
use crate::core::scheduler::VisibilityScheduler;
use crate::core::thumbnail::{ThumbnailLoad, ThumbnailLoader, THUMBNAIL_LOADED_CLASS};
use crate::domain::deferred::Deferred;
use crate::domain::model::{
    ChangeEvent, ConsentAction, ConsentState, EventSource, ServiceDefinition, ServiceSelector,
    StateSnapshot, TriggerKind,
};
use crate::domain::ports::{CookieJar, Dom, ElementId, EventLoop, IntersectionEntry, ObserverId, TaskId};
use crate::utils::error::Result;
use crate::utils::validation::Validate;
use std::collections::HashMap;
use std::rc::Rc;
use std::task::Poll;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ButtonKind {
    LoadOnce,
    LoadAll,
}

#[derive(Debug, Clone)]
struct ClickTarget {
    service: String,
    index: usize,
    kind: ButtonKind,
}

/// One-shot load handlers, removed the first time they fire.
#[derive(Debug, Clone)]
enum LoadListener {
    Iframe { service: String, index: usize },
    Thumbnail { background: ElementId },
}

#[derive(Debug)]
struct PendingEmbed {
    service: String,
    index: usize,
    deferred: Deferred<ElementId>,
}

#[derive(Debug)]
struct PendingThumbnail {
    service: String,
    index: usize,
    deferred: Deferred<String>,
}

pub struct IframeManager<D: Dom, C: CookieJar, E: EventLoop> {
    dom: D,
    cookies: C,
    events: E,
    config: Option<Rc<ManagerConfig>>,
    registry: Registry,
    state: ConsentState,
    current_lang: Option<String>,
    scheduler: VisibilityScheduler,
    thumbnails: ThumbnailLoader,
    clicks: HashMap<ElementId, ClickTarget>,
    listeners: HashMap<ElementId, LoadListener>,
    pending_embeds: Vec<PendingEmbed>,
    pending_thumbnails: Vec<PendingThumbnail>,
}

impl<D: Dom, C: CookieJar, E: EventLoop> IframeManager<D, C, E> {
    pub fn new(dom: D, cookies: C, events: E) -> Self {
        Self {
            dom,
            cookies,
            events,
            config: None,
            registry: Registry::default(),
            state: ConsentState::default(),
            current_lang: None,
            scheduler: VisibilityScheduler::default(),
            thumbnails: ThumbnailLoader::default(),
            clicks: HashMap::new(),
            listeners: HashMap::new(),
            pending_embeds: Vec::new(),
            pending_thumbnails: Vec::new(),
        }
    }

    pub fn dom(&self) -> &D {
        &self.dom
    }

    pub fn dom_mut(&mut self) -> &mut D {
        &mut self.dom
    }

    pub fn cookies(&self) -> &C {
        &self.cookies
    }

    pub fn cookies_mut(&mut self) -> &mut C {
        &mut self.cookies
    }

    pub fn event_loop(&self) -> &E {
        &self.events
    }

    pub fn event_loop_mut(&mut self) -> &mut E {
        &mut self.events
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Discovers placeholders, seeds consent from cookies, renders notices and
    /// schedules activation for services already consented to. Calling it
    /// again replaces everything the previous call set up.
    pub fn run(&mut self, config: ManagerConfig) -> Result<()> {
        config.validate()?;
        let config = Rc::new(config);

        self.teardown();
        let browser_language = self.dom.browser_language();
        self.current_lang = resolve_language(
            &config,
            browser_language.as_deref(),
            self.current_lang.as_deref(),
        );
        self.config = Some(Rc::clone(&config));

        info!(
            "Running iframe manager: {} service(s), language {:?}",
            config.services.len(),
            self.current_lang
        );

        for service in &config.services {
            let accepted = get_consent(&self.cookies, service);
            self.state.seed(&service.name, accepted);

            let count = self.registry.discover(&mut self.dom, service);
            if count == 0 {
                debug!("No placeholders for '{}'", service.name);
                continue;
            }
            debug!(
                "Found {} placeholder(s) for '{}' (accepted: {})",
                count, service.name, accepted
            );

            self.render_notices(service, accepted);
            if accepted {
                self.scheduler
                    .schedule_activation(&mut self.events, &service.name, self.registry.records(&service.name));
            }
            self.watch_thumbnails(service);
        }

        Ok(())
    }

    pub fn accept_service(&mut self, selector: impl Into<ServiceSelector>) {
        self.accept(selector.into(), TriggerKind::Api);
    }

    pub fn reject_service(&mut self, selector: impl Into<ServiceSelector>) {
        self.reject(selector.into(), TriggerKind::Api);
    }

    pub fn get_state(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    pub fn get_config(&self) -> Option<&ManagerConfig> {
        self.config.as_deref()
    }

    pub fn current_language(&self) -> Option<&str> {
        self.current_lang.as_deref()
    }

    /// Routes a click on a notice button. Returns false for unknown elements.
    pub fn handle_click(&mut self, element: ElementId) -> bool {
        let Some(target) = self.clicks.get(&element).cloned() else {
            return false;
        };
        let Some(config) = self.config.clone() else {
            return false;
        };
        let Some(service) = config.service(&target.service) else {
            return false;
        };

        debug!("{:?} clicked on '{}' #{}", target.kind, service.name, target.index);
        self.activate_record(service, target.index);
        if target.kind == ButtonKind::LoadAll {
            self.accept(ServiceSelector::Named(service.name.clone()), TriggerKind::Click);
        }
        true
    }

    /// Delivers a load event. Each listener fires at most once.
    pub fn handle_load(&mut self, element: ElementId) -> bool {
        let Some(listener) = self.listeners.remove(&element) else {
            return false;
        };

        match listener {
            LoadListener::Iframe { service, index } => {
                let Some(config) = self.config.clone() else {
                    return false;
                };
                let (Some(definition), Some(record)) =
                    (config.service(&service), self.registry.record(&service, index))
                else {
                    return false;
                };
                if record.embed != Some(element) {
                    return false;
                }
                embed::finish_load(&mut self.dom, record, definition, element);
            }
            LoadListener::Thumbnail { background } => {
                self.dom.add_class(background, THUMBNAIL_LOADED_CLASS);
            }
        }
        true
    }

    pub fn handle_intersection(&mut self, observer: ObserverId, entries: &[IntersectionEntry]) {
        let requests = self
            .scheduler
            .on_intersection(&mut self.events, &self.dom, observer, entries);
        let Some(config) = self.config.clone() else {
            return;
        };

        for request in requests {
            if let Some(service) = config.service(&request.service) {
                self.load_thumbnail(service, request.index);
            }
        }
    }

    /// Runs a fired timeout scheduled by a visible placeholder.
    pub fn run_task(&mut self, task: TaskId) {
        let Some((service, index)) = self.scheduler.take_task(&self.dom, task) else {
            return;
        };
        if !self.state.is_accepted(&service) {
            debug!("Skipping activation of '{}' #{}: consent withdrawn", service, index);
            return;
        }
        let Some(config) = self.config.clone() else {
            return;
        };
        if let Some(definition) = config.service(&service) {
            self.activate_record(definition, index);
        }
    }

    /// Completes custom activations and async thumbnails whose values have
    /// arrived. Returns how many were applied.
    pub fn settle_pending(&mut self) -> usize {
        let Some(config) = self.config.clone() else {
            return 0;
        };
        let mut settled = 0;

        for mut pending in std::mem::take(&mut self.pending_embeds) {
            match pending.deferred.try_take() {
                Poll::Pending => self.pending_embeds.push(pending),
                Poll::Ready(None) => warn!(
                    "Custom activation for '{}' #{} was abandoned",
                    pending.service, pending.index
                ),
                Poll::Ready(Some(element)) => {
                    let (Some(service), Some(record)) = (
                        config.service(&pending.service),
                        self.registry.record_mut(&pending.service, pending.index),
                    ) else {
                        continue;
                    };
                    embed::settle(&mut self.dom, record, service, element);
                    debug!("Custom embed ready for '{}' #{}", pending.service, pending.index);
                    settled += 1;
                }
            }
        }

        for mut pending in std::mem::take(&mut self.pending_thumbnails) {
            match pending.deferred.try_take() {
                Poll::Pending => self.pending_thumbnails.push(pending),
                Poll::Ready(None) => warn!(
                    "Thumbnail lookup for '{}' #{} was abandoned",
                    pending.service, pending.index
                ),
                Poll::Ready(Some(src)) if src.is_empty() => {}
                Poll::Ready(Some(src)) => {
                    let Some(record) = self.registry.record(&pending.service, pending.index) else {
                        continue;
                    };
                    let background = record.background;
                    if let (ThumbnailLoad::Applied { image }, Some(background)) =
                        (self.thumbnails.apply(&mut self.dom, record, &src, true), background)
                    {
                        self.listeners.insert(image, LoadListener::Thumbnail { background });
                        settled += 1;
                    }
                }
            }
        }

        settled
    }

    /// Custom activations and thumbnail lookups still waiting for a value.
    pub fn pending_count(&self) -> usize {
        self.pending_embeds.len() + self.pending_thumbnails.len()
    }

    fn accept(&mut self, selector: ServiceSelector, trigger: TriggerKind) {
        let Some(config) = self.config.clone() else {
            warn!("accept_service('{}') called before run", selector.label());
            return;
        };

        self.scheduler.resume();
        let mut changed = Vec::new();
        let mut matched = false;

        for service in config.select(&selector) {
            matched = true;
            if self.state.is_accepted(&service.name) {
                continue;
            }

            set_consent(&mut self.cookies, &self.dom.location(), service);
            let records = self.registry.records(&service.name);
            if !records.is_empty() {
                self.scheduler
                    .schedule_activation(&mut self.events, &service.name, records);
            }
            self.state.set(&service.name, true);
            changed.push(service.name.clone());
        }

        if !matched {
            warn!("Unknown service '{}'", selector.label());
        }
        self.notify(&config, trigger, &selector, ConsentAction::Accept, changed);
    }

    fn reject(&mut self, selector: ServiceSelector, trigger: TriggerKind) {
        let Some(config) = self.config.clone() else {
            warn!("reject_service('{}') called before run", selector.label());
            return;
        };

        if selector == ServiceSelector::All {
            self.scheduler.halt();
        }
        let mut changed = Vec::new();
        let mut matched = false;

        for service in config.select(&selector) {
            matched = true;
            clear_consent(&mut self.cookies, &self.dom.location(), service);
            self.scheduler.cancel_service(&mut self.events, &service.name);

            for index in 0..self.registry.len(&service.name) {
                let Some(record) = self.registry.record_mut(&service.name, index) else {
                    continue;
                };
                if record.has_embed {
                    if let Some(removed) = embed::deactivate(&mut self.dom, record, service) {
                        self.listeners.remove(&removed);
                    }
                }
                notice::show_notice(&mut self.dom, record);
            }

            if self.state.set(&service.name, false) {
                changed.push(service.name.clone());
            }
        }

        if !matched {
            warn!("Unknown service '{}'", selector.label());
        }
        self.notify(&config, trigger, &selector, ConsentAction::Reject, changed);
    }

    fn notify(
        &self,
        config: &ManagerConfig,
        trigger: TriggerKind,
        selector: &ServiceSelector,
        action: ConsentAction,
        changed: Vec<String>,
    ) {
        if changed.is_empty() {
            return;
        }
        info!("{:?} via {:?}: {:?}", action, trigger, changed);

        if let Some(callback) = &config.on_change {
            let event = ChangeEvent {
                event_source: EventSource {
                    kind: trigger,
                    service: selector.label().to_string(),
                    action,
                },
                changed_services: changed,
            };
            (callback.0)(&event);
        }
    }

    fn activate_record(&mut self, service: &ServiceDefinition, index: usize) {
        let Some(record) = self.registry.record_mut(&service.name, index) else {
            return;
        };

        notice::hide_notice(&mut self.dom, record);
        match embed::activate(&mut self.dom, record, service) {
            Activation::Attached(iframe) => {
                self.listeners.insert(
                    iframe,
                    LoadListener::Iframe {
                        service: service.name.clone(),
                        index,
                    },
                );
            }
            Activation::Pending(deferred) => self.pending_embeds.push(PendingEmbed {
                service: service.name.clone(),
                index,
                deferred,
            }),
            Activation::Skipped => {}
        }
    }

    fn render_notices(&mut self, service: &ServiceDefinition, hidden: bool) {
        let Some(strings) = service.strings(self.current_lang.as_deref()) else {
            warn!("Service '{}' has no language strings", service.name);
            return;
        };

        for index in 0..self.registry.len(&service.name) {
            let Some(record) = self.registry.record_mut(&service.name, index) else {
                continue;
            };
            let Some(buttons) = notice::create_notice(&mut self.dom, record, service, strings, hidden)
            else {
                continue;
            };

            for (button, kind) in [
                (buttons.load, ButtonKind::LoadOnce),
                (buttons.load_all, ButtonKind::LoadAll),
            ] {
                if let Some(button) = button {
                    self.clicks.insert(
                        button,
                        ClickTarget {
                            service: service.name.clone(),
                            index,
                            kind,
                        },
                    );
                }
            }
        }
    }

    fn watch_thumbnails(&mut self, service: &ServiceDefinition) {
        let records = self.registry.records(&service.name);
        if records.iter().all(|record| record.background.is_none()) {
            return;
        }
        if self
            .scheduler
            .watch_thumbnails(&mut self.events, &service.name, records)
        {
            return;
        }

        debug!("No intersection support, loading '{}' thumbnails now", service.name);
        for index in 0..self.registry.len(&service.name) {
            self.load_thumbnail(service, index);
        }
    }

    fn load_thumbnail(&mut self, service: &ServiceDefinition, index: usize) {
        let Some(record) = self.registry.record(&service.name, index) else {
            return;
        };
        let background = record.background;

        match self.thumbnails.load(&mut self.dom, record, service) {
            ThumbnailLoad::Applied { image } => {
                if let Some(background) = background {
                    self.listeners.insert(image, LoadListener::Thumbnail { background });
                }
            }
            ThumbnailLoad::Pending(deferred) => self.pending_thumbnails.push(PendingThumbnail {
                service: service.name.clone(),
                index,
                deferred,
            }),
            ThumbnailLoad::Skipped => {}
        }
    }

    /// Undoes what a previous `run` put on the page.
    fn teardown(&mut self) {
        self.scheduler.reset(&mut self.events);
        for mut record in self.registry.take_all() {
            if let Some(embed) = record.embed.take() {
                self.dom.remove(embed);
            }
            notice::remove_notice(&mut self.dom, &mut record);
        }
        self.state.clear();
        self.clicks.clear();
        self.listeners.clear();
        self.pending_embeds.clear();
        self.pending_thumbnails.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{ManualEventLoop, MemoryCookieJar, MemoryDom};
    use crate::domain::model::{LanguageStrings, ThumbnailSource};

    type Manager = IframeManager<MemoryDom, MemoryCookieJar, ManualEventLoop>;

    fn service() -> ServiceDefinition {
        ServiceDefinition::new("demo")
            .with_embed_url("https://x.test/{data-id}")
            .with_thumbnail(ThumbnailSource::Template("https://img.test/{data-id}.jpg".into()))
            .with_language("en", LanguageStrings::new("notice").with_load_btn("Load"))
    }

    #[test]
    fn test_calls_before_run_are_ignored() {
        let mut manager = Manager::new(MemoryDom::default(), MemoryCookieJar::new(), ManualEventLoop::new());

        manager.accept_service("demo");
        manager.reject_service("all");

        assert!(manager.cookies().writes().is_empty());
        assert!(!manager.handle_click(ElementId(0)));
        assert_eq!(manager.settle_pending(), 0);
        assert_eq!(manager.get_state(), StateSnapshot::default());
    }

    #[test]
    fn test_thumbnail_image_load_marks_background() {
        let mut dom = MemoryDom::default();
        let placeholder = dom.add_placeholder("demo", &[("data-id", "abc")]);
        let mut manager = Manager::new(dom, MemoryCookieJar::new(), ManualEventLoop::without_intersection());
        manager.run(ManagerConfig::new("en").with_service(service())).unwrap();

        let (image, background) = manager
            .listeners
            .iter()
            .find_map(|(image, listener)| match listener {
                LoadListener::Thumbnail { background } => Some((*image, *background)),
                LoadListener::Iframe { .. } => None,
            })
            .unwrap();
        assert_eq!(manager.dom().find_by_class(placeholder, "c-bg-i"), vec![background]);

        assert!(manager.handle_load(image));
        assert!(manager.dom().has_class(background, THUMBNAIL_LOADED_CLASS));
        assert!(!manager.handle_load(image));
    }

    #[test]
    fn test_reject_drops_iframe_listener() {
        let mut dom = MemoryDom::default();
        let placeholder = dom.add_placeholder("demo", &[("data-id", "abc")]);
        let mut manager = Manager::new(dom, MemoryCookieJar::new(), ManualEventLoop::new());
        manager.run(ManagerConfig::new("en").with_service(service())).unwrap();

        let load = manager.dom().find_by_class(placeholder, "c-l-b")[0];
        manager.handle_click(load);
        let iframe = manager.registry().record("demo", 0).unwrap().embed.unwrap();
        assert!(manager.listeners.contains_key(&iframe));

        manager.reject_service("demo");
        assert!(!manager.listeners.contains_key(&iframe));
        assert!(!manager.handle_load(iframe));
    }

    #[test]
    fn test_task_for_withdrawn_consent_is_skipped() {
        let mut dom = MemoryDom::default();
        let placeholder = dom.add_placeholder("demo", &[("data-id", "abc")]);
        let cookies = MemoryCookieJar::with_header("im_demo=1");
        let mut manager = Manager::new(dom, cookies, ManualEventLoop::new());
        manager.run(ManagerConfig::new("en").with_service(service())).unwrap();

        let (observer, _) = manager
            .event_loop()
            .observer_targets()
            .into_iter()
            .find(|(_, targets)| targets.contains(&placeholder))
            .unwrap();
        manager.handle_intersection(
            observer,
            &[IntersectionEntry {
                target: placeholder,
                is_intersecting: true,
            }],
        );
        // Flip state without going through reject, so the task survives.
        manager.state.set("demo", false);

        for task in manager.event_loop_mut().advance_all() {
            manager.run_task(task);
        }
        assert!(manager.dom().find_by_tag(placeholder, "iframe").is_empty());
    }
}
