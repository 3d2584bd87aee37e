//! Namespaced cache key derivation.
//!
//! The key insight is that `CacheKey`'s private constructor makes
//! unnamespaced cache access uncompilable: a key cannot be built without
//! going through the type tag, so entries for different entity types
//! sharing one store can never collide.

use std::fmt;

use crate::traits::CacheEntity;

/// Separator between the type tag and the entity id.
const SEPARATOR: char = ':';

/// A cache key scoped to an entity type.
///
/// # Design
///
/// The private inner struct ensures a `CacheKey` can only be constructed
/// via [`CacheKey::for_entity`] or [`CacheKey::from_parts`], both of which
/// require a type tag. The mapping `id -> key` is total and deterministic,
/// and collision-free within a type as long as the id's `Display`
/// rendering is injective.
///
/// # Rendered Format
///
/// `{prefix}{type_tag}:{id}`, e.g. `article:7` with an empty prefix, or
/// `staging/article:7` with a `staging/` prefix. The prefix provides
/// namespace isolation between deployments sharing one cache store; type
/// tags must not contain the separator so that tags cannot collide across
/// types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Private inner data - cannot be constructed externally.
    inner: KeyInner,
}

/// Private inner struct - prevents external construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct KeyInner {
    type_tag: &'static str,
    entity_id: String,
    rendered: String,
}

impl CacheKey {
    /// Derive the cache key for an entity type and id.
    pub fn for_entity<E: CacheEntity>(prefix: &str, id: &E::Id) -> Self {
        Self::from_parts(prefix, E::type_tag(), id)
    }

    /// Build a key from its raw parts.
    ///
    /// `type_tag` must be non-empty and must not contain the separator;
    /// both are programming errors in the entity definition, not runtime
    /// conditions.
    pub fn from_parts(prefix: &str, type_tag: &'static str, id: impl fmt::Display) -> Self {
        debug_assert!(!type_tag.is_empty(), "type tag must not be empty");
        debug_assert!(
            !type_tag.contains(SEPARATOR),
            "type tag must not contain the key separator"
        );

        let entity_id = id.to_string();
        let rendered = format!("{prefix}{type_tag}{SEPARATOR}{entity_id}");
        Self {
            inner: KeyInner {
                type_tag,
                entity_id,
                rendered,
            },
        }
    }

    /// Get the type tag this key is scoped to.
    pub fn type_tag(&self) -> &'static str {
        self.inner.type_tag
    }

    /// Get the rendered entity id component.
    pub fn entity_id(&self) -> &str {
        &self.inner.entity_id
    }

    /// Get the full rendered key addressed into the cache store.
    pub fn as_str(&self) -> &str {
        &self.inner.rendered
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.rendered)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
