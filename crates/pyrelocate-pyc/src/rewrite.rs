//! Réécriture du chemin source des objets code.
//!
//! Transformation ascendante sur l’arbre : un nœud n’est reconstruit que si
//! son `filename` ou l’une de ses constantes a changé ; sinon `None` et
//! l’original est réutilisé tel quel.

use crate::code::Code;
use crate::marshal::{Object, RefTable, StrKind, Value};

pub(crate) struct PathRewriter<'a> {
    target: &'a [u8],
    kind: StrKind,
    refs: &'a mut RefTable,
}

impl<'a> PathRewriter<'a> {
    pub(crate) fn new(target: &'a str, kind: StrKind, refs: &'a mut RefTable) -> Self {
        Self { target: target.as_bytes(), kind, refs }
    }

    /// Nouveau nœud si `code` ou un de ses descendants a changé.
    ///
    /// Les constantes passent avant `filename`, dans l’ordre du flux : quand
    /// le `filename` parent est une référence vers le slot d’un enfant, ce
    /// slot porte déjà la cible et la référence est conservée.
    pub(crate) fn rewrite_code(&mut self, code: &Code) -> Option<Code> {
        let consts = self.rewrite_consts(&code.consts);
        let filename = self.rewrite_filename(&code.filename);
        if consts.is_none() && filename.is_none() {
            return None;
        }
        Some(Code {
            counters: code.counters.clone(),
            code: code.code.clone(),
            consts: consts.unwrap_or_else(|| code.consts.clone()),
            names_and_locals: code.names_and_locals.clone(),
            filename: filename.unwrap_or_else(|| code.filename.clone()),
            names_after: code.names_after.clone(),
            firstlineno: code.firstlineno,
            tables: code.tables.clone(),
        })
    }

    fn rewrite_filename(&mut self, current: &Object) -> Option<Object> {
        if self.refs.resolve_text(current) == Some(self.target) {
            return None;
        }
        // un slot en ligne est conservé pour ne pas décaler la numérotation
        let slot = match current.value {
            Value::Ref(_) => None,
            _ => current.slot,
        };
        if let Some(idx) = slot {
            self.refs.set_text(idx, self.target.to_vec());
        }
        Some(Object { slot, value: Value::Str(self.kind, self.target.to_vec()) })
    }

    fn rewrite_consts(&mut self, consts: &Object) -> Option<Object> {
        let items = match &consts.value {
            Value::Tuple(items) | Value::SmallTuple(items) => items,
            _ => return None,
        };

        let mut changed = false;
        let mut rewritten = Vec::with_capacity(items.len());
        for item in items {
            match item.as_code().and_then(|nested| self.rewrite_code(nested)) {
                Some(nested) => {
                    changed = true;
                    rewritten.push(Object { slot: item.slot, value: Value::Code(Box::new(nested)) });
                }
                None => rewritten.push(item.clone()),
            }
        }
        if !changed {
            return None;
        }

        let value = match &consts.value {
            Value::SmallTuple(_) => Value::SmallTuple(rewritten),
            _ => Value::Tuple(rewritten),
        };
        Some(Object { slot: consts.slot, value })
    }
}
