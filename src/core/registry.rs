use crate::config::ManagerConfig;
use crate::domain::model::{PlaceholderRecord, ServiceDefinition};
use crate::domain::ports::{Dom, ElementId};
use std::collections::HashMap;

pub const INDEX_ATTRIBUTE: &str = "data-index";
pub const CONTAINER_ATTRIBUTE: &str = "data-placeholder";
const IFRAME_ATTRIBUTE_PREFIX: &str = "data-iframe-";

/// Placeholder records per service, rebuilt from scratch on every `run`.
#[derive(Debug, Default)]
pub struct Registry {
    records: HashMap<String, Vec<PlaceholderRecord>>,
}

impl Registry {
    /// Empties the registry, handing back every record for teardown.
    pub fn take_all(&mut self) -> Vec<PlaceholderRecord> {
        self.records.drain().flat_map(|(_, records)| records).collect()
    }

    /// Scans the document for the service's placeholders, stamps each with its
    /// ordinal index and returns how many were found.
    pub fn discover<D: Dom>(&mut self, dom: &mut D, service: &ServiceDefinition) -> usize {
        let elements = dom.query_placeholders(&service.name);
        let records: Vec<PlaceholderRecord> = elements
            .into_iter()
            .enumerate()
            .map(|(index, element)| {
                dom.set_attribute(element, INDEX_ATTRIBUTE, &index.to_string());
                read_record(dom, index, element)
            })
            .collect();

        let count = records.len();
        self.records.insert(service.name.clone(), records);
        count
    }

    pub fn records(&self, service: &str) -> &[PlaceholderRecord] {
        self.records
            .get(service)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn record(&self, service: &str, index: usize) -> Option<&PlaceholderRecord> {
        self.records.get(service).and_then(|records| records.get(index))
    }

    pub fn record_mut(&mut self, service: &str, index: usize) -> Option<&mut PlaceholderRecord> {
        self.records
            .get_mut(service)
            .and_then(|records| records.get_mut(index))
    }

    pub fn len(&self, service: &str) -> usize {
        self.records(service).len()
    }
}

fn read_record<D: Dom>(dom: &D, index: usize, element: ElementId) -> PlaceholderRecord {
    let mut record = PlaceholderRecord::new(index, element);
    record.id = dom.attribute(element, "data-id");
    record.title = dom.attribute(element, "data-title");
    record.thumbnail = dom.attribute(element, "data-thumbnail");
    record.params = dom.attribute(element, "data-params");
    record.thumbnail_preload = dom.attribute(element, "data-thumbnailpreload").is_some();
    record.iframe_attributes = dom
        .attributes(element)
        .into_iter()
        .filter_map(|(name, value)| {
            name.strip_prefix(IFRAME_ATTRIBUTE_PREFIX)
                .filter(|stripped| !stripped.is_empty())
                .map(|stripped| (stripped.to_string(), value))
        })
        .collect();
    record.container = dom.query_child(element, CONTAINER_ATTRIBUTE);
    record
}

/// Picks the active language against the first service's language table:
/// the requested code, then the browser language (with `auto_lang`), then the
/// previously active one, then the first declared entry.
pub fn resolve_language(
    config: &ManagerConfig,
    browser_language: Option<&str>,
    previous: Option<&str>,
) -> Option<String> {
    let table = config.services.first()?;

    if table.has_language(&config.curr_lang) {
        return Some(config.curr_lang.clone());
    }

    if config.auto_lang {
        if let Some(browser) = browser_language.map(normalize_browser_language) {
            if table.has_language(&browser) {
                return Some(browser);
            }
        }
    }

    if let Some(previous) = previous.filter(|code| table.has_language(code)) {
        return Some(previous.to_string());
    }

    table.languages.first().map(|(code, _)| code.clone())
}

/// `en-US` -> `en`.
pub fn normalize_browser_language(language: &str) -> String {
    language.chars().take(2).collect::<String>().to_lowercase()
}
