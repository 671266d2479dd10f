use crate::domain::deferred::Deferred;
use crate::domain::model::{PlaceholderRecord, ServiceDefinition, ThumbnailSource};
use crate::domain::ports::{Dom, ElementId};
use crate::utils::validation::DATA_ID_TOKEN;
use std::collections::HashSet;
use url::Url;

pub const THUMBNAIL_LOADED_CLASS: &str = "loaded";

#[derive(Debug)]
pub enum ThumbnailLoad {
    Skipped,
    /// Background set; `image` fires a load event once the picture is in.
    Applied { image: ElementId },
    Pending(Deferred<String>),
}

/// Loads preview images and keeps the preconnect/preload hints unique.
#[derive(Debug, Default)]
pub struct ThumbnailLoader {
    preconnects: HashSet<String>,
    preloads: HashSet<String>,
}

impl ThumbnailLoader {
    pub fn load<D: Dom>(
        &mut self,
        dom: &mut D,
        record: &PlaceholderRecord,
        service: &ServiceDefinition,
    ) -> ThumbnailLoad {
        if record.background.is_none() {
            return ThumbnailLoad::Skipped;
        }

        // A per-placeholder thumbnail wins, and an empty one means none at all.
        if let Some(url) = &record.thumbnail {
            if url.is_empty() {
                return ThumbnailLoad::Skipped;
            }
            return self.apply(dom, record, url, false);
        }

        match &service.thumbnail {
            Some(ThumbnailSource::Template(template)) => {
                let src = match &record.id {
                    Some(id) => template.replacen(DATA_ID_TOKEN, id, 1),
                    None => template.clone(),
                };
                self.apply(dom, record, &src, true)
            }
            Some(ThumbnailSource::Resolver(resolver)) => {
                ThumbnailLoad::Pending((resolver.0)(record.id.as_deref().unwrap_or_default()))
            }
            None => ThumbnailLoad::Skipped,
        }
    }

    pub fn apply<D: Dom>(
        &mut self,
        dom: &mut D,
        record: &PlaceholderRecord,
        src: &str,
        preconnect: bool,
    ) -> ThumbnailLoad {
        let Some(background) = record.background else {
            return ThumbnailLoad::Skipped;
        };

        if preconnect {
            self.preconnect(dom, src);
        }
        if record.thumbnail_preload {
            self.preload(dom, src);
        }

        dom.set_style(background, "background-image", &format!("url('{}')", src));
        let image = dom.create_element("img");
        dom.set_attribute(image, "src", src);
        ThumbnailLoad::Applied { image }
    }

    fn preconnect<D: Dom>(&mut self, dom: &mut D, src: &str) {
        let Ok(url) = Url::parse(src) else {
            return;
        };
        if !matches!(url.scheme(), "http" | "https") {
            return;
        }
        match url.host_str() {
            Some(host) if host != dom.location().hostname => {}
            _ => return,
        }

        let origin = url.origin().ascii_serialization();
        if !self.preconnects.insert(origin.clone()) {
            return;
        }
        let link = dom.create_element("link");
        dom.set_attribute(link, "rel", "preconnect");
        dom.set_attribute(link, "href", &origin);
        let head = dom.head();
        dom.append_child(head, link);
    }

    fn preload<D: Dom>(&mut self, dom: &mut D, src: &str) {
        if src.is_empty() || !self.preloads.insert(src.to_string()) {
            return;
        }
        let link = dom.create_element("link");
        dom.set_attribute(link, "rel", "preload");
        dom.set_attribute(link, "as", "image");
        dom.set_attribute(link, "href", src);
        let head = dom.head();
        dom.append_child(head, link);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryDom;
    use crate::domain::model::ThumbnailResolver;

    fn record_with_background(dom: &mut MemoryDom, id: &str) -> PlaceholderRecord {
        let element = dom.add_placeholder("demo", &[("data-id", id)]);
        let background = dom.create_element("div");
        dom.append_child(element, background);
        let mut record = PlaceholderRecord::new(0, element);
        record.id = Some(id.to_string());
        record.background = Some(background);
        record
    }

    #[test]
    fn test_template_thumbnail_with_preconnect() {
        let mut dom = MemoryDom::new("www.site.test", "https:");
        let record = record_with_background(&mut dom, "abc");
        let service = ServiceDefinition::new("demo")
            .with_thumbnail(ThumbnailSource::Template("https://img.test/vi/{data-id}.jpg".into()));
        let mut loader = ThumbnailLoader::default();

        let image = match loader.load(&mut dom, &record, &service) {
            ThumbnailLoad::Applied { image } => image,
            other => panic!("unexpected load: {:?}", other),
        };
        assert_eq!(dom.attribute(image, "src").as_deref(), Some("https://img.test/vi/abc.jpg"));
        assert_eq!(
            dom.style(record.background.unwrap(), "background-image").as_deref(),
            Some("url('https://img.test/vi/abc.jpg')")
        );

        loader.load(&mut dom, &record, &service);
        let links = dom.find_by_tag(dom.head(), "link");
        assert_eq!(links.len(), 1);
        assert_eq!(dom.attribute(links[0], "href").as_deref(), Some("https://img.test"));
    }

    #[test]
    fn test_same_host_skips_preconnect_and_preload_once() {
        let mut dom = MemoryDom::new("img.test", "https:");
        let mut record = record_with_background(&mut dom, "abc");
        record.thumbnail_preload = true;
        let service = ServiceDefinition::new("demo")
            .with_thumbnail(ThumbnailSource::Template("https://img.test/{data-id}.jpg".into()));
        let mut loader = ThumbnailLoader::default();

        loader.load(&mut dom, &record, &service);
        loader.load(&mut dom, &record, &service);

        let links = dom.find_by_tag(dom.head(), "link");
        assert_eq!(links.len(), 1);
        assert_eq!(dom.attribute(links[0], "rel").as_deref(), Some("preload"));
    }

    #[test]
    fn test_placeholder_thumbnail_wins() {
        let mut dom = MemoryDom::default();
        let mut record = record_with_background(&mut dom, "abc");
        record.thumbnail = Some("/local.png".to_string());
        let service = ServiceDefinition::new("demo")
            .with_thumbnail(ThumbnailSource::Template("https://img.test/{data-id}.jpg".into()));
        let mut loader = ThumbnailLoader::default();

        assert!(matches!(
            loader.load(&mut dom, &record, &service),
            ThumbnailLoad::Applied { .. }
        ));
        assert_eq!(
            dom.style(record.background.unwrap(), "background-image").as_deref(),
            Some("url('/local.png')")
        );
        assert!(dom.find_by_tag(dom.head(), "link").is_empty());
    }

    #[test]
    fn test_resolver_returns_pending() {
        let mut dom = MemoryDom::default();
        let record = record_with_background(&mut dom, "abc");
        let service = ServiceDefinition::new("demo").with_thumbnail(ThumbnailSource::Resolver(
            ThumbnailResolver::new(|id| Deferred::ready(format!("https://api.test/{}.jpg", id))),
        ));
        let mut loader = ThumbnailLoader::default();

        match loader.load(&mut dom, &record, &service) {
            ThumbnailLoad::Pending(mut pending) => assert_eq!(
                pending.try_take(),
                std::task::Poll::Ready(Some("https://api.test/abc.jpg".to_string()))
            ),
            other => panic!("unexpected load: {:?}", other),
        }
    }
}
