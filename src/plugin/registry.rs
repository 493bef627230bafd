//! Plugin registration and the frozen chain.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use super::{FnPlugin, Plugin, PluginResult};
use crate::core::{Error, RequestContext, Result};

/// A registered plugin and the name its result is bound under.
#[derive(Clone)]
pub struct PluginEntry {
    name: String,
    plugin: Arc<dyn Plugin>,
}

impl PluginEntry {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn plugin(&self) -> &dyn Plugin {
        self.plugin.as_ref()
    }
}

impl fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEntry")
            .field("name", &self.name)
            .finish()
    }
}

/// Append-only list of plugins, built during setup.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    entries: Vec<PluginEntry>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin.
    ///
    /// Named by [`Plugin::name`], or by the implementing type when that is
    /// empty (`RequestId` is bound as `requestId`).
    pub fn register<P: Plugin + 'static>(&mut self, plugin: P) -> Result<&mut Self> {
        let name = match plugin.name() {
            "" => short_type_name(std::any::type_name::<P>()),
            name => name,
        };
        let name = normalize_name(name)?;
        self.push(name, Arc::new(plugin));
        Ok(self)
    }

    /// Register a bare handler function, named after the function itself.
    ///
    /// ```rust,ignore
    /// fn auth(ctx: &mut RequestContext) -> BoxFuture<'_, PluginResult> {
    ///     Box::pin(async move { Ok(Binding::Empty) })
    /// }
    ///
    /// registry.register_fn(auth)?; // bound as "auth"
    /// ```
    ///
    /// Closures have no usable name and fail with
    /// [`Error::InvalidPluginName`]; use [`register_named`](Self::register_named).
    pub fn register_fn<F>(&mut self, handler: F) -> Result<&mut Self>
    where
        F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, PluginResult>
            + Send
            + Sync
            + 'static,
    {
        let name = normalize_name(short_type_name(std::any::type_name::<F>()))?;
        self.push(name, Arc::new(FnPlugin::new(handler)));
        Ok(self)
    }

    /// Register a plugin under an explicit name.
    pub fn register_named<P: Plugin + 'static>(
        &mut self,
        name: &str,
        plugin: P,
    ) -> Result<&mut Self> {
        let name = normalize_name(name)?;
        self.push(name, Arc::new(plugin));
        Ok(self)
    }

    fn push(&mut self, name: String, plugin: Arc<dyn Plugin>) {
        tracing::debug!(plugin = %name, position = self.entries.len(), "plugin registered");
        self.entries.push(PluginEntry { name, plugin });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Plugin names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(PluginEntry::name).collect()
    }

    /// Snapshot the registry into an immutable chain.
    pub fn freeze(&self) -> PluginChain {
        PluginChain {
            entries: self.entries.iter().cloned().collect(),
        }
    }
}

/// Immutable, shared plugin chain.
#[derive(Clone, Debug)]
pub struct PluginChain {
    entries: Arc<[PluginEntry]>,
}

impl PluginChain {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PluginEntry> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(PluginEntry::name).collect()
    }
}

impl Default for PluginChain {
    fn default() -> Self {
        Self {
            entries: Arc::from(Vec::new()),
        }
    }
}

impl<'a> IntoIterator for &'a PluginChain {
    type Item = &'a PluginEntry;
    type IntoIter = std::slice::Iter<'a, PluginEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Last path segment of a type name, generics stripped.
///
/// `my_app::plugins::Auth<u8>` becomes `Auth`.
fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Validate a plugin name and lowercase its first character.
fn normalize_name(name: &str) -> Result<String> {
    let usable = !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '{' | '}'));
    if !usable {
        return Err(Error::InvalidPluginName(name.to_string()));
    }

    let mut chars = name.chars();
    let normalized = match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => return Err(Error::InvalidPluginName(name.to_string())),
    };
    Ok(normalized)
}
