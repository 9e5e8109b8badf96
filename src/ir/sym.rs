use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::IrError;
use crate::ir::expr::Expr;
use crate::ir::types::DataType;

struct SymData {
    name: String,
    ty: DataType,
}

/// A named, typed reference.
///
/// Symbols are handles: equality and hashing follow identity, not the name.
/// Two `Sym::new("x", ..)` calls produce two distinct symbols, so passes can
/// mint symbols without coordinating on unique names.
#[derive(Clone)]
pub struct Sym(Rc<SymData>);

impl Sym {
    pub fn new(name: impl Into<String>, ty: DataType) -> Self {
        Sym(Rc::new(SymData {
            name: name.into(),
            ty,
        }))
    }

    /// A symbol typed after the expression it will be bound to.
    pub fn typed_like(name: impl Into<String>, expr: &Expr) -> Self {
        Sym::new(name, expr.ty().clone())
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn ty(&self) -> &DataType {
        &self.0.ty
    }

    /// A fresh symbol named after this one, e.g. `t` → `t_idx`.
    pub fn derive(&self, suffix: &str, ty: DataType) -> Sym {
        Sym::new(format!("{}_{}", self.name(), suffix), ty)
    }
}

impl PartialEq for Sym {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Sym {}

impl Hash for Sym {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Rc::as_ptr(&self.0), state);
    }
}

impl std::fmt::Debug for Sym {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}: {}", self.0.name, self.0.ty)
    }
}

impl std::fmt::Display for Sym {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}", self.0.name)
    }
}

/// Mapping from symbols to the expressions they denote.
///
/// Insertion order is preserved: a pass that binds symbols while walking the
/// IR depth-first leaves the table in topological order, so a symbol's
/// dependencies always precede it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymTable {
    entries: IndexMap<Sym, Expr>,
}

impl SymTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `sym` to `expr`. The types must agree and a symbol is bound once.
    pub fn bind(&mut self, sym: Sym, expr: Expr) -> Result<(), IrError> {
        if sym.ty() != expr.ty() {
            return Err(IrError::mismatch(
                format!("binding of '{}'", sym.name()),
                sym.ty(),
                expr.ty(),
            ));
        }
        if self.entries.contains_key(&sym) {
            return Err(IrError::DuplicateBinding {
                name: sym.name().to_owned(),
            });
        }
        self.entries.insert(sym, expr);
        Ok(())
    }

    pub fn get(&self, sym: &Sym) -> Option<&Expr> {
        self.entries.get(sym)
    }

    pub fn contains(&self, sym: &Sym) -> bool {
        self.entries.contains_key(sym)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Sym, &Expr)> {
        self.entries.iter()
    }

    /// Looks a binding up by symbol name. Names are not unique; the first
    /// binding in table order wins.
    pub fn find_by_name(&self, name: &str) -> Option<(&Sym, &Expr)> {
        self.entries.iter().find(|(s, _)| s.name() == name)
    }
}
