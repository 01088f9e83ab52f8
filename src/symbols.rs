use rustc_hash::FxHashMap;

use crate::error::RuntimeError;

/// How a stored value should be treated when substituted back into an
/// expression. `Any` is the placeholder kind used for declarations made at
/// compile time, before any assignment has executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymbolKind {
    Number,
    String,
    #[default]
    Any,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolEntry {
    pub name: String,
    pub value: String,
    pub kind: SymbolKind,
}

/// One scoped name->value mapping. Every scope-owning tree node (and the
/// tree root) holds exactly one table; tables are never merged or copied.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SymbolTable {
    entries: FxHashMap<String, SymbolEntry>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or resets an entry. Declarations at compile time use an empty
    /// placeholder value.
    pub fn add_entry(&mut self, name: &str, value: impl Into<String>) {
        self.entries.insert(
            name.to_string(),
            SymbolEntry {
                name: name.to_string(),
                value: value.into(),
                kind: SymbolKind::Any,
            },
        );
    }

    /// Lookup never fails; absence is an expected outcome during scope
    /// chain walks.
    pub fn get_entry(&self, name: &str) -> Option<&SymbolEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Overwrites the value of an existing entry.
    pub fn modify_entry(
        &mut self,
        name: &str,
        value: impl Into<String>,
        kind: SymbolKind,
    ) -> Result<(), RuntimeError> {
        match self.entries.get_mut(name) {
            Some(entry) => {
                entry.value = value.into();
                entry.kind = kind;
                Ok(())
            }
            None => Err(RuntimeError::UnknownVariable {
                name: name.to_string(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
