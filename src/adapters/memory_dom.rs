use crate::domain::ports::{Dom, ElementId, Location};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
struct Node {
    tag: String,
    attributes: BTreeMap<String, String>,
    classes: Vec<String>,
    styles: BTreeMap<String, String>,
    text: String,
    html: String,
    children: Vec<ElementId>,
    parent: Option<ElementId>,
}

/// Headless document: an arena of nodes with a `<head>` and a `<body>`.
#[derive(Debug, Clone)]
pub struct MemoryDom {
    nodes: Vec<Node>,
    head: ElementId,
    body: ElementId,
    location: Location,
    language: Option<String>,
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new("localhost", "http:")
    }
}

impl MemoryDom {
    pub fn new(hostname: impl Into<String>, protocol: impl Into<String>) -> Self {
        let mut dom = Self {
            nodes: Vec::new(),
            head: ElementId(0),
            body: ElementId(0),
            location: Location {
                hostname: hostname.into(),
                protocol: protocol.into(),
            },
            language: None,
        };
        dom.head = dom.create_element("head");
        dom.body = dom.create_element("body");
        dom
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn body(&self) -> ElementId {
        self.body
    }

    /// Appends `<div data-service="..">` with extra attributes to the body.
    pub fn add_placeholder(&mut self, service: &str, attributes: &[(&str, &str)]) -> ElementId {
        let div = self.create_element("div");
        self.set_attribute(div, "data-service", service);
        for (name, value) in attributes {
            self.set_attribute(div, name, value);
        }
        let body = self.body;
        self.append_child(body, div);
        div
    }

    pub fn children(&self, element: ElementId) -> Vec<ElementId> {
        self.node(element)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    pub fn parent(&self, element: ElementId) -> Option<ElementId> {
        self.node(element).and_then(|node| node.parent)
    }

    /// True when the element hangs off `<head>` or `<body>`.
    pub fn is_connected(&self, element: ElementId) -> bool {
        let mut current = Some(element);
        while let Some(id) = current {
            if id == self.head || id == self.body {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    pub fn has_class(&self, element: ElementId, class: &str) -> bool {
        self.node(element)
            .map(|node| node.classes.iter().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn text(&self, element: ElementId) -> String {
        self.node(element)
            .map(|node| node.text.clone())
            .unwrap_or_default()
    }

    pub fn inner_html(&self, element: ElementId) -> String {
        self.node(element)
            .map(|node| node.html.clone())
            .unwrap_or_default()
    }

    pub fn style(&self, element: ElementId, property: &str) -> Option<String> {
        self.node(element)
            .and_then(|node| node.styles.get(property).cloned())
    }

    /// Descendants of `root` (depth first, document order) with `tag`.
    pub fn find_by_tag(&self, root: ElementId, tag: &str) -> Vec<ElementId> {
        self.descendants(root)
            .into_iter()
            .filter(|id| self.node(*id).map(|n| n.tag == tag).unwrap_or(false))
            .collect()
    }

    pub fn find_by_class(&self, root: ElementId, class: &str) -> Vec<ElementId> {
        self.descendants(root)
            .into_iter()
            .filter(|id| self.has_class(*id, class))
            .collect()
    }

    fn descendants(&self, root: ElementId) -> Vec<ElementId> {
        let mut found = Vec::new();
        let mut stack: Vec<ElementId> = self.children(root).into_iter().rev().collect();
        while let Some(id) = stack.pop() {
            found.push(id);
            stack.extend(self.children(id).into_iter().rev());
        }
        found
    }

    fn node(&self, element: ElementId) -> Option<&Node> {
        self.nodes.get(element.0)
    }

    fn node_mut(&mut self, element: ElementId) -> Option<&mut Node> {
        self.nodes.get_mut(element.0)
    }

    fn detach(&mut self, element: ElementId) {
        if let Some(parent) = self.parent(element) {
            if let Some(node) = self.node_mut(parent) {
                node.children.retain(|child| *child != element);
            }
        }
        if let Some(node) = self.node_mut(element) {
            node.parent = None;
        }
    }
}

impl Dom for MemoryDom {
    fn query_placeholders(&self, service: &str) -> Vec<ElementId> {
        self.descendants(self.body)
            .into_iter()
            .filter(|id| {
                self.node(*id)
                    .map(|n| {
                        n.tag == "div"
                            && n.attributes.get("data-service").map(String::as_str) == Some(service)
                    })
                    .unwrap_or(false)
            })
            .collect()
    }

    fn query_child(&self, parent: ElementId, attribute: &str) -> Option<ElementId> {
        self.descendants(parent).into_iter().find(|id| {
            self.node(*id)
                .map(|n| n.attributes.contains_key(attribute))
                .unwrap_or(false)
        })
    }

    fn create_element(&mut self, tag: &str) -> ElementId {
        let id = ElementId(self.nodes.len());
        self.nodes.push(Node {
            tag: tag.to_ascii_lowercase(),
            ..Node::default()
        });
        id
    }

    fn tag_name(&self, element: ElementId) -> Option<String> {
        self.node(element).map(|node| node.tag.clone())
    }

    fn attribute(&self, element: ElementId, name: &str) -> Option<String> {
        self.node(element)
            .and_then(|node| node.attributes.get(name).cloned())
    }

    fn attributes(&self, element: ElementId) -> Vec<(String, String)> {
        self.node(element)
            .map(|node| {
                node.attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn set_attribute(&mut self, element: ElementId, name: &str, value: &str) {
        if let Some(node) = self.node_mut(element) {
            node.attributes.insert(name.to_string(), value.to_string());
        }
    }

    fn add_class(&mut self, element: ElementId, class: &str) {
        if let Some(node) = self.node_mut(element) {
            if !node.classes.iter().any(|c| c == class) {
                node.classes.push(class.to_string());
            }
        }
    }

    fn remove_class(&mut self, element: ElementId, class: &str) {
        if let Some(node) = self.node_mut(element) {
            node.classes.retain(|c| c != class);
        }
    }

    fn set_text(&mut self, element: ElementId, text: &str) {
        if let Some(node) = self.node_mut(element) {
            node.text = text.to_string();
        }
    }

    fn insert_html(&mut self, element: ElementId, html: &str) {
        if let Some(node) = self.node_mut(element) {
            node.html.push_str(html);
        }
    }

    fn set_style(&mut self, element: ElementId, property: &str, value: &str) {
        if let Some(node) = self.node_mut(element) {
            node.styles.insert(property.to_string(), value.to_string());
        }
    }

    fn append_child(&mut self, parent: ElementId, child: ElementId) {
        if self.node(parent).is_none() || self.node(child).is_none() {
            return;
        }
        self.detach(child);
        if let Some(node) = self.node_mut(parent) {
            node.children.push(child);
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
    }

    fn remove(&mut self, element: ElementId) {
        self.detach(element);
    }

    fn head(&self) -> ElementId {
        self.head
    }

    fn location(&self) -> Location {
        self.location.clone()
    }

    fn browser_language(&self) -> Option<String> {
        self.language.clone()
    }
}
