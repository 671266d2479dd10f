use crate::core::notice::LOADED_CLASS;
use crate::domain::deferred::Deferred;
use crate::domain::model::{EmbedProvider, PlaceholderRecord, ServiceDefinition};
use crate::domain::ports::{Dom, ElementId};
use crate::utils::validation::DATA_ID_TOKEN;

/// Attributes callers may never set on a generated frame.
pub const RESERVED_ATTRIBUTES: [&str; 3] = ["src", "onload", "onerror"];

#[derive(Debug)]
pub enum Activation {
    /// Already embedded, or nothing to build from.
    Skipped,
    /// A built-in iframe was appended; its load event is still to come.
    Attached(ElementId),
    /// A custom hook is building the embed.
    Pending(Deferred<ElementId>),
}

pub fn activate<D: Dom>(
    dom: &mut D,
    record: &mut PlaceholderRecord,
    service: &ServiceDefinition,
) -> Activation {
    if record.has_embed {
        return Activation::Skipped;
    }

    match &service.embed {
        EmbedProvider::Custom(hook) => {
            record.has_embed = true;
            let target: &mut dyn Dom = dom;
            Activation::Pending((hook.0)(target, record.element))
        }
        EmbedProvider::BuiltinIframe => {
            let Some(template) = &service.embed_url else {
                tracing::warn!("Service '{}' has no embed_url; nothing to activate", service.name);
                return Activation::Skipped;
            };

            let iframe = dom.create_element("iframe");
            dom.set_attribute(iframe, "loading", "lazy");
            if let Some(title) = &record.title {
                dom.set_attribute(iframe, "title", title);
            }
            for (name, value) in iframe_attributes(record, service) {
                dom.set_attribute(iframe, &name, &value);
            }

            let params = record
                .params
                .as_deref()
                .filter(|p| !p.is_empty())
                .or_else(|| service.iframe.params.as_deref().filter(|p| !p.is_empty()));
            let src = embed_src(template, record.id.as_deref(), params);
            dom.set_attribute(iframe, "src", &src);

            record.embed = Some(iframe);
            record.has_embed = true;
            dom.append_child(record.embed_container(), iframe);
            tracing::debug!("Embedded {} for '{}' #{}", src, service.name, record.index);
            Activation::Attached(iframe)
        }
    }
}

/// Completes a custom activation with the element the hook produced.
///
/// A record holds one live embed. When an earlier activation already
/// settled with another element, that element is torn down first so a
/// later reject can still reach whatever is on the page.
pub fn settle<D: Dom>(
    dom: &mut D,
    record: &mut PlaceholderRecord,
    service: &ServiceDefinition,
    element: ElementId,
) {
    if record.embed.is_some_and(|live| live != element) {
        deactivate(dom, record, service);
    }
    record.embed = Some(element);
    record.has_embed = true;

    if dom.tag_name(element).as_deref() == Some("iframe") {
        for (name, value) in iframe_attributes(record, service) {
            dom.set_attribute(element, &name, &value);
        }
    }
    dom.add_class(record.element, LOADED_CLASS);
}

/// One-shot load handling for built-in iframes.
pub fn finish_load<D: Dom>(
    dom: &mut D,
    record: &PlaceholderRecord,
    service: &ServiceDefinition,
    iframe: ElementId,
) {
    dom.add_class(record.element, LOADED_CLASS);
    if let Some(hook) = &service.iframe.onload {
        (hook.0)(record.id.as_deref().unwrap_or_default(), iframe);
    }
}

/// Tears the embed down. Returns the element that was live, if any.
pub fn deactivate<D: Dom>(
    dom: &mut D,
    record: &mut PlaceholderRecord,
    service: &ServiceDefinition,
) -> Option<ElementId> {
    let live = record.embed.take();

    match &service.on_reject {
        Some(hook) => {
            let target: &mut dyn Dom = dom;
            (hook.0)(target, live.unwrap_or(record.element));
        }
        None => {
            if let Some(element) = live {
                dom.remove(element);
            }
        }
    }

    record.has_embed = false;
    live
}

/// `template` with its first `{data-id}` replaced and the query string appended.
pub fn embed_src(template: &str, id: Option<&str>, params: Option<&str>) -> String {
    let mut src = match id {
        Some(id) => template.replacen(DATA_ID_TOKEN, id, 1),
        None => template.to_string(),
    };

    if let Some(params) = params {
        if !params.starts_with('?') {
            src.push('?');
        }
        src.push_str(params);
    }
    src
}

/// Service attributes first, then `data-iframe-*` overrides, minus reserved names.
pub fn iframe_attributes(
    record: &PlaceholderRecord,
    service: &ServiceDefinition,
) -> Vec<(String, String)> {
    service
        .iframe
        .attributes
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .chain(record.iframe_attributes.iter().cloned())
        .filter(|(name, _)| {
            !RESERVED_ATTRIBUTES
                .iter()
                .any(|reserved| name.eq_ignore_ascii_case(reserved))
        })
        .collect()
}
