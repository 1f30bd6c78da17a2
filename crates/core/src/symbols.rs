//! Symbol registry seam
//!
//! Trace records carry interned integer symbols instead of strings. The
//! registry that owns the interning table is an external collaborator; this
//! module defines the trait the engine calls to render human-readable
//! results, plus an in-memory implementation for embedding and tests.
//!
//! Symbol ids are never used as storage keys, only for display.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Interned symbol identifier (class, method or attribute name).
pub type SymbolId = u32;

/// Resolves interned symbol ids to names and back.
///
/// Ingested trace trees arrive with symbol ids already remapped into the
/// host's local symbol space, so the engine never interns on the write path;
/// `symbol_id` exists for query-side lookups (e.g. a trace-type filter given
/// by name).
pub trait SymbolRegistry: Send + Sync {
    /// Intern `name`, returning its id (allocating one if unknown).
    fn symbol_id(&self, name: &str) -> SymbolId;

    /// Resolve an id back to its name, or `None` if it was never interned.
    fn symbol_name(&self, id: SymbolId) -> Option<String>;
}

/// In-memory symbol registry.
///
/// Ids start at 1; 0 is reserved as "no symbol".
#[derive(Default)]
pub struct MapSymbolRegistry {
    inner: RwLock<Registry>,
}

#[derive(Default)]
struct Registry {
    by_name: HashMap<String, SymbolId>,
    by_id: Vec<String>,
}

impl MapSymbolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SymbolRegistry for MapSymbolRegistry {
    fn symbol_id(&self, name: &str) -> SymbolId {
        if let Some(&id) = self.inner.read().by_name.get(name) {
            return id;
        }
        let mut reg = self.inner.write();
        if let Some(&id) = reg.by_name.get(name) {
            return id;
        }
        reg.by_id.push(name.to_string());
        let id = reg.by_id.len() as SymbolId;
        reg.by_name.insert(name.to_string(), id);
        id
    }

    fn symbol_name(&self, id: SymbolId) -> Option<String> {
        if id == 0 {
            return None;
        }
        self.inner.read().by_id.get(id as usize - 1).cloned()
    }
}

/// Render a method signature as `class.method(signature)`.
///
/// Unknown symbols render as `?` so a stale registry never fails a search.
pub fn render_method(
    symbols: &dyn SymbolRegistry,
    class_id: SymbolId,
    method_id: SymbolId,
    signature_id: SymbolId,
) -> String {
    let name = |id| symbols.symbol_name(id).unwrap_or_else(|| "?".to_string());
    format!(
        "{}.{}{}",
        name(class_id),
        name(method_id),
        name(signature_id)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_stable() {
        let reg = MapSymbolRegistry::new();
        let a = reg.symbol_id("com.example.Foo");
        let b = reg.symbol_id("com.example.Bar");
        assert_ne!(a, b);
        assert_eq!(reg.symbol_id("com.example.Foo"), a);
        assert_eq!(reg.symbol_name(a).as_deref(), Some("com.example.Foo"));
    }

    #[test]
    fn test_zero_is_reserved() {
        let reg = MapSymbolRegistry::new();
        assert_eq!(reg.symbol_name(0), None);
        assert_eq!(reg.symbol_name(42), None);
    }

    #[test]
    fn test_render_method_unknown_symbols() {
        let reg = MapSymbolRegistry::new();
        let c = reg.symbol_id("Foo");
        let m = reg.symbol_id("bar");
        let s = reg.symbol_id("()");
        assert_eq!(render_method(&reg, c, m, s), "Foo.bar()");
        assert_eq!(render_method(&reg, 999, m, s), "?.bar()");
    }
}
