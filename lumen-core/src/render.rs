//! The render entry point. A [`RenderRoot`] wraps a container element with a
//! persistent top-level child part; rendering commits a value into it, and
//! repeated renders diff against whatever the previous render left behind.

use lumen_dom::NodeRef;

use crate::error::Error;
use crate::part::ChildPart;
use crate::template::TemplateCache;
use crate::value::Value;

#[derive(Default)]
pub struct RenderOptions {
    /// Renders before this node inside the container instead of at the end,
    /// leaving content after it alone.
    pub render_before: Option<NodeRef>,
}

/// A container's persistent rendering state. Keep it alive across renders;
/// dropping it orphans the rendered content (the DOM stays, the diffing
/// state is gone).
pub struct RenderRoot {
    container: NodeRef,
    cache: TemplateCache,
    part: ChildPart,
}

impl RenderRoot {
    /// Sets up rendering into `container` with a private template cache.
    pub fn new(container: &NodeRef) -> Result<Self, Error> {
        Self::with_options(container, TemplateCache::new(), RenderOptions::default())
    }

    /// Sets up rendering with a shared template cache, so multiple roots pay
    /// for each template call site only once between them.
    pub fn with_cache(container: &NodeRef, cache: TemplateCache) -> Result<Self, Error> {
        Self::with_options(container, cache, RenderOptions::default())
    }

    pub fn with_options(
        container: &NodeRef,
        cache: TemplateCache,
        options: RenderOptions,
    ) -> Result<Self, Error> {
        let doc = container
            .document()
            .ok_or_else(|| Error::Malformed("container has no document".to_string()))?;
        let start = doc.create_comment("");
        let end = doc.create_comment("");
        container.insert_before(&start, options.render_before.as_ref());
        container.insert_before(&end, options.render_before.as_ref());
        log::debug!("render root attached to <{}>", container.tag());
        Ok(Self {
            container: container.clone(),
            part: ChildPart::new(doc, cache.clone(), start, end, true),
            cache,
        })
    }

    /// Commits `value` into the root part. The first render builds the DOM;
    /// subsequent renders update only what changed.
    pub fn render(&self, value: impl Into<Value>) -> Result<(), Error> {
        self.part.commit(value.into())
    }

    pub fn container(&self) -> &NodeRef {
        &self.container
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    /// The root part, for directive helpers and introspection.
    pub fn part(&self) -> &ChildPart {
        &self.part
    }

    pub fn is_connected(&self) -> bool {
        self.part.is_connected()
    }

    /// Marks the whole rendered tree (dis)connected. Every directive below
    /// the root sees each transition exactly once; disconnecting invalidates
    /// outstanding async work.
    pub fn set_connected(&self, connected: bool) {
        self.part.set_connected(connected);
    }
}
