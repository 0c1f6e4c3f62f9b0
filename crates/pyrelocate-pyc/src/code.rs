//! Objet code marshalé, vu comme un nœud d’arbre.
//!
//! Seuls `consts` et `filename` sont interprétés ; tout le reste est conservé
//! tel que décodé et ré-encodé à l’identique.

use crate::format::CodeLayout;
use crate::marshal::Object;

/// Objet code (`TYPE_CODE`, `'c'`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    /// Entiers de tête : argcount, (posonly), kwonly, (nlocals), stacksize, flags.
    pub counters: Vec<i32>,
    /// Instructions brutes (`co_code`).
    pub code: Object,
    /// Constantes ; peut contenir d’autres objets code.
    pub consts: Object,
    /// `co_names` puis varnames/freevars/cellvars ou localsplusnames/kinds.
    pub names_and_locals: Vec<Object>,
    /// Chemin source (`co_filename`).
    pub filename: Object,
    /// `co_name` (+ `co_qualname` en 3.11+).
    pub names_after: Vec<Object>,
    /// `co_firstlineno`.
    pub firstlineno: i32,
    /// Table de lignes (+ table d’exceptions en 3.11+).
    pub tables: Vec<Object>,
}

impl Code {
    /// Vérifie que le nombre de champs correspond à la disposition.
    pub fn matches_layout(&self, layout: CodeLayout) -> bool {
        self.counters.len() == layout.counters()
            && self.names_and_locals.len() == layout.names_and_locals()
            && self.names_after.len() == layout.names_after()
            && self.tables.len() == layout.tables()
    }

    /// Objets code directement présents dans les constantes (hors références).
    pub fn nested(&self) -> impl Iterator<Item = &Code> {
        self.consts.items().iter().filter_map(Object::as_code)
    }
}
