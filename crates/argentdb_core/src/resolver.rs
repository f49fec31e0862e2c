//! Type resolution for stored type tokens.
//!
//! Every stored object carries the type token it was written with. When the
//! object is loaded back, the token may no longer name a type the target
//! table accepts: the type was renamed or moved, or the table declares an
//! abstract type and the token must be mapped to a concrete implementer.
//! A [`TypeResolverChain`] handles these cases.

use crate::error::{CoreError, CoreResult};
use crate::types::TableDefinition;
use argentdb_codec::TypeName;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Maps a stored type token to a loadable type.
pub trait TypeResolver: Send + Sync {
    /// Returns the type `token` should load as, or `None` to defer to the
    /// next resolver in the chain.
    fn resolve(&self, token: &str) -> Option<TypeName>;
}

impl<F> TypeResolver for F
where
    F: Fn(&str) -> Option<TypeName> + Send + Sync,
{
    fn resolve(&self, token: &str) -> Option<TypeName> {
        self(token)
    }
}

/// Resolves explicit renames.
#[derive(Debug, Clone, Default)]
pub struct RenameResolver {
    renames: HashMap<String, TypeName>,
}

impl RenameResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `old` to `new`.
    #[must_use]
    pub fn rename(mut self, old: impl Into<String>, new: impl Into<TypeName>) -> Self {
        self.renames.insert(old.into(), new.into());
        self
    }
}

impl TypeResolver for RenameResolver {
    fn resolve(&self, token: &str) -> Option<TypeName> {
        self.renames.get(token).cloned()
    }
}

/// Rewrites a namespace prefix, e.g. `legacy::Order` to `shop::Order`.
#[derive(Debug, Clone)]
pub struct PrefixResolver {
    from: String,
    to: String,
}

impl PrefixResolver {
    /// Replaces a leading `from` with `to`. An empty `to` strips the prefix.
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl TypeResolver for PrefixResolver {
    fn resolve(&self, token: &str) -> Option<TypeName> {
        token
            .strip_prefix(self.from.as_str())
            .filter(|rest| !rest.is_empty())
            .map(|rest| TypeName::new(format!("{}{rest}", self.to)))
    }
}

/// Ordered, append-only list of resolvers.
///
/// A token the table already accepts resolves to itself without consulting
/// any resolver. Otherwise resolvers run in registration order and the first
/// answer the table accepts wins. Answers the table rejects are skipped, so
/// a broad resolver registered early cannot mask a precise one registered
/// later.
#[derive(Clone, Default)]
pub struct TypeResolverChain {
    resolvers: Vec<Arc<dyn TypeResolver>>,
}

impl TypeResolverChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a resolver.
    pub fn push(&mut self, resolver: Arc<dyn TypeResolver>) {
        self.resolvers.push(resolver);
    }

    /// Number of registered resolvers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    /// Returns whether no resolver is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Resolves `token` to a type `table` accepts.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeResolution`] when the chain is exhausted.
    pub fn resolve_for(&self, token: &str, table: &TableDefinition) -> CoreResult<TypeName> {
        if table.accepts(token) {
            return Ok(TypeName::from(token));
        }
        self.resolvers
            .iter()
            .filter_map(|r| r.resolve(token))
            .find(|resolved| table.accepts(resolved.as_str()))
            .ok_or_else(|| CoreError::TypeResolution {
                token: token.to_string(),
                table: table.name.clone(),
            })
    }
}

impl fmt::Debug for TypeResolverChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeResolverChain")
            .field("resolvers", &self.resolvers.len())
            .finish()
    }
}
