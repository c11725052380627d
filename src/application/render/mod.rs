//! Content rendering plugins.
//!
//! A plugin turns stored node data into its displayable form for one
//! extension. Lookups are keyed by extension; nodes whose extension has no
//! plugin are returned as stored.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::node::Node;
use crate::domain::uri::DEFAULT_EXTENSION;

pub trait Plugin: Send + Sync {
    fn ext(&self) -> &str;

    fn render(&self, data: &str) -> String;
}

/// Plain text, rendered verbatim.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextPlugin;

impl Plugin for TextPlugin {
    fn ext(&self) -> &str {
        DEFAULT_EXTENSION
    }

    fn render(&self, data: &str) -> String {
        data.to_string()
    }
}

#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(TextPlugin));
        registry
    }

    /// Register `plugin`, replacing any plugin for the same extension.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.insert(plugin.ext().to_string(), plugin);
    }

    pub fn get(&self, ext: &str) -> Option<&Arc<dyn Plugin>> {
        self.plugins.get(ext)
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    pub fn render(&self, ext: &str, data: &str) -> Option<String> {
        self.get(ext).map(|plugin| plugin.render(data))
    }

    /// Render through the plugin for `ext`, or return `data` unchanged.
    pub fn render_or_raw(&self, ext: &str, data: &str) -> String {
        self.render(ext, data).unwrap_or_else(|| data.to_string())
    }

    pub fn render_node(&self, node: Node) -> Node {
        let ext = node.uri.extension().unwrap_or(DEFAULT_EXTENSION);
        let content = node
            .content
            .as_deref()
            .map(|data| self.render_or_raw(ext, data));
        Node { content, ..node }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::uri::Uri;

    struct Shout;

    impl Plugin for Shout {
        fn ext(&self) -> &str {
            "md"
        }

        fn render(&self, data: &str) -> String {
            data.to_uppercase()
        }
    }

    #[test]
    fn defaults_ship_text_only() {
        let registry = PluginRegistry::with_defaults();
        assert_eq!(registry.extensions().collect::<Vec<_>>(), vec!["txt"]);
        assert_eq!(registry.render("txt", "Djedi").as_deref(), Some("Djedi"));
        assert_eq!(registry.render("foo", "Djedi"), None);
    }

    #[test]
    fn render_node_uses_extension_plugin() {
        let mut registry = PluginRegistry::with_defaults();
        registry.register(Arc::new(Shout));

        let node = Node {
            uri: Uri::parse("i18n://sv-se@page/title.md#1").expect("uri"),
            content: Some("djedi".to_string()),
            meta: None,
        };
        assert_eq!(registry.render_node(node).content.as_deref(), Some("DJEDI"));
    }

    #[test]
    fn render_node_leaves_unknown_extensions_raw() {
        let registry = PluginRegistry::with_defaults();
        let node = Node {
            uri: Uri::parse("i18n://sv-se@page/logo.img#1").expect("uri"),
            content: Some("{\"url\": \"/logo.png\"}".to_string()),
            meta: None,
        };
        let rendered = registry.render_node(node.clone());
        assert_eq!(rendered, node);
    }
}
