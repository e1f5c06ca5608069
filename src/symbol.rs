use std::collections::HashMap;
use std::fmt;

/// Unique identifier for an interned symbol or keyword name.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolId({})", self.0)
    }
}

/// Interned name table. Each unique name maps to a unique SymbolId, so
/// scope lookups compare integers instead of strings.
pub struct SymbolTable {
    name_to_id: HashMap<String, SymbolId>,
    id_to_name: Vec<String>,
}

/// Well-known symbol IDs, pre-interned at startup.
/// These must match the order of interning in SymbolTable::new().
pub mod sym {
    use super::SymbolId;

    pub const REST: SymbolId = SymbolId(0);
    pub const ADD: SymbolId = SymbolId(1);
    pub const MULTIPLY: SymbolId = SymbolId(2);
    pub const DEFFUN: SymbolId = SymbolId(3);
    pub const LAMBDA: SymbolId = SymbolId(4);
    pub const PROGN: SymbolId = SymbolId(5);
    pub const QUOTE: SymbolId = SymbolId(6);
    pub const IF: SymbolId = SymbolId(7);
    pub const CAR: SymbolId = SymbolId(8);
    pub const CDR: SymbolId = SymbolId(9);
}

impl SymbolTable {
    /// Create a new symbol table with all well-known names pre-interned.
    /// The order MUST match the constants in the `sym` module above.
    pub fn new() -> Self {
        let names = [
            "&rest", "add", "multiply", "deffun", "lambda", "progn", "quote", "if", "car", "cdr",
        ];

        let mut name_to_id = HashMap::new();
        let mut id_to_name = Vec::new();

        for (i, name) in names.iter().enumerate() {
            let id = SymbolId(i as u32);
            name_to_id.insert(name.to_string(), id);
            id_to_name.push(name.to_string());
        }

        SymbolTable {
            name_to_id,
            id_to_name,
        }
    }

    /// Intern a name. Returns the existing ID if already interned,
    /// or creates a new one.
    pub fn intern(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.name_to_id.get(name) {
            return id;
        }
        let id = SymbolId(self.id_to_name.len() as u32);
        self.name_to_id.insert(name.to_string(), id);
        self.id_to_name.push(name.to_string());
        id
    }

    /// Look up a name by its ID.
    pub fn name(&self, id: SymbolId) -> &str {
        &self.id_to_name[id.0 as usize]
    }

    /// Look up an ID by name, without interning.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.name_to_id.get(name).copied()
    }

    /// Total number of interned names.
    pub fn count(&self) -> usize {
        self.id_to_name.len()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
