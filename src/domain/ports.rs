use serde::Serialize;
use std::time::Duration;

/// Opaque handle to a node owned by a [`Dom`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ElementId(pub usize);

/// Handle to an intersection observer created through [`EventLoop::create_observer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub usize);

/// Handle to a timeout registered through [`EventLoop::set_timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub hostname: String,
    /// Scheme including the trailing colon, e.g. `https:`.
    pub protocol: String,
}

impl Location {
    pub fn is_secure(&self) -> bool {
        self.protocol == "https:"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntersectionEntry {
    pub target: ElementId,
    pub is_intersecting: bool,
}

/// The subset of the document, location and navigator APIs the manager drives.
pub trait Dom {
    /// `div[data-service="<service>"]` elements, in document order.
    fn query_placeholders(&self, service: &str) -> Vec<ElementId>;
    /// First descendant of `parent` carrying `attribute`.
    fn query_child(&self, parent: ElementId, attribute: &str) -> Option<ElementId>;
    fn create_element(&mut self, tag: &str) -> ElementId;
    fn tag_name(&self, element: ElementId) -> Option<String>;
    fn attribute(&self, element: ElementId, name: &str) -> Option<String>;
    fn attributes(&self, element: ElementId) -> Vec<(String, String)>;
    fn set_attribute(&mut self, element: ElementId, name: &str, value: &str);
    fn add_class(&mut self, element: ElementId, class: &str);
    fn remove_class(&mut self, element: ElementId, class: &str);
    fn set_text(&mut self, element: ElementId, text: &str);
    /// Inserts trusted markup verbatim at the end of `element`.
    fn insert_html(&mut self, element: ElementId, html: &str);
    fn set_style(&mut self, element: ElementId, property: &str, value: &str);
    fn append_child(&mut self, parent: ElementId, child: ElementId);
    fn remove(&mut self, element: ElementId);
    fn head(&self) -> ElementId;
    fn location(&self) -> Location;
    fn browser_language(&self) -> Option<String>;
}

/// `document.cookie`: reads return the whole header, writes take one
/// `Set-Cookie`-style string.
pub trait CookieJar {
    fn cookie_header(&self) -> String;
    fn write(&mut self, cookie: &str);
}

/// Viewport observation and timers. Callbacks come back through
/// `IframeManager::handle_intersection` and `IframeManager::run_task`.
pub trait EventLoop {
    fn supports_intersection(&self) -> bool;
    fn create_observer(&mut self) -> ObserverId;
    fn observe(&mut self, observer: ObserverId, target: ElementId);
    fn unobserve(&mut self, observer: ObserverId, target: ElementId);
    fn disconnect(&mut self, observer: ObserverId);
    fn set_timeout(&mut self, delay: Duration) -> TaskId;
}
