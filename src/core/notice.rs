//! The "ask for consent" fragment shown in place of an embed.

use crate::domain::model::{LanguageStrings, PlaceholderRecord, ServiceDefinition};
use crate::domain::ports::{Dom, ElementId};

pub const HIDE_NOTICE_CLASS: &str = "c-h-n";
pub const LOADED_CLASS: &str = "c-h-b";

/// Buttons created for one placeholder; absent when the language entry has no text for them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoticeButtons {
    pub load: Option<ElementId>,
    pub load_all: Option<ElementId>,
}

/// Builds the notice once per record. Returns `None` when the record already has one.
pub fn create_notice<D: Dom>(
    dom: &mut D,
    record: &mut PlaceholderRecord,
    service: &ServiceDefinition,
    strings: &LanguageStrings,
    hidden: bool,
) -> Option<NoticeButtons> {
    if record.has_notice {
        return None;
    }

    let notice = element(dom, "div", "c-nt");
    let content = element(dom, "div", "c-n-c");
    let text_container = element(dom, "div", "c-t-cn");
    let text_wrapper = element(dom, "span", "c-n-t");
    let text = element(dom, "span", "cc-text");

    if let Some(title) = &record.title {
        let title_span = element(dom, "span", "c-tl");
        dom.insert_html(title_span, title);
        dom.append_child(text, title_span);
    }
    dom.insert_html(text, &strings.notice);
    dom.append_child(text_wrapper, text);
    dom.append_child(text_container, text_wrapper);

    let mut buttons = NoticeButtons::default();
    if strings.load_btn.is_some() || strings.load_all_btn.is_some() {
        let actions = element(dom, "div", "c-n-a");
        if let Some(label) = &strings.load_btn {
            let button = button(dom, "c-l-b", label);
            dom.append_child(actions, button);
            buttons.load = Some(button);
        }
        if let Some(label) = &strings.load_all_btn {
            let button = button(dom, "c-la-b", label);
            dom.append_child(actions, button);
            buttons.load_all = Some(button);
        }
        dom.append_child(text_container, actions);
    }

    dom.append_child(content, text_container);
    dom.append_child(notice, content);

    // Build everything detached, attach at the end.
    let mut fragment = vec![notice];
    if let Some(outer) = background(dom, record, service) {
        fragment.push(outer);
    }
    fragment.push(element(dom, "div", "c-ld"));

    if hidden {
        dom.add_class(record.element, HIDE_NOTICE_CLASS);
        record.notice_visible = false;
    }
    for node in &fragment {
        dom.append_child(record.element, *node);
    }
    record.fragment = fragment;
    record.has_notice = true;

    Some(buttons)
}

pub fn hide_notice<D: Dom>(dom: &mut D, record: &mut PlaceholderRecord) {
    if record.notice_visible {
        dom.add_class(record.element, HIDE_NOTICE_CLASS);
        record.notice_visible = false;
    }
}

pub fn show_notice<D: Dom>(dom: &mut D, record: &mut PlaceholderRecord) {
    if !record.notice_visible {
        dom.remove_class(record.element, HIDE_NOTICE_CLASS);
        dom.remove_class(record.element, LOADED_CLASS);
        record.notice_visible = true;
    }
}

/// Detaches the fragment and clears every notice-related class and flag.
pub fn remove_notice<D: Dom>(dom: &mut D, record: &mut PlaceholderRecord) {
    for node in record.fragment.drain(..) {
        dom.remove(node);
    }
    dom.remove_class(record.element, HIDE_NOTICE_CLASS);
    dom.remove_class(record.element, LOADED_CLASS);
    record.background = None;
    record.has_notice = false;
    record.notice_visible = true;
}

/// Thumbnail scaffolding, only when a preview can ever be shown.
fn background<D: Dom>(
    dom: &mut D,
    record: &mut PlaceholderRecord,
    service: &ServiceDefinition,
) -> Option<ElementId> {
    let has_thumbnail = match &record.thumbnail {
        Some(url) => !url.is_empty(),
        None => service.thumbnail.is_some(),
    };
    if !has_thumbnail {
        return None;
    }

    let outer = element(dom, "div", "c-bg");
    let inner = element(dom, "div", "c-bg-i");
    dom.append_child(outer, inner);
    record.background = Some(inner);
    Some(outer)
}

fn element<D: Dom>(dom: &mut D, tag: &str, class: &str) -> ElementId {
    let id = dom.create_element(tag);
    dom.add_class(id, class);
    id
}

fn button<D: Dom>(dom: &mut D, class: &str, label: &str) -> ElementId {
    let id = element(dom, "button", class);
    dom.set_attribute(id, "type", "button");
    dom.set_text(id, label);
    id
}
