//! pyrelocate-pyc — conteneur `.pyc` et réécriture des chemins source
//!
//! Format :
//! ```text
//! Header: magic u16 LE + "\r\n" + champs propres à la version (8, 12 ou 16 octets)
//! Corps : objet code marshalé (objets code imbriqués dans `co_consts`)
//! ```
//!
//! API :
//! - `PycFile::from_bytes()` / `to_bytes()`
//! - `PycFile::relocate()` : assigne un même chemin source à tous les objets code
//! - `marshal::{loads, dumps}` pour le codec seul
//!
//! Ce crate est utilisé par `pyrelocate-cli` pour la passe bytecode.

#![deny(missing_docs)]

pub mod code;
pub mod format;
pub mod marshal;
mod rewrite;

use pyrelocate_core::{ByteReader, CoreError, CoreResult};

pub use code::Code;
pub use format::{CodeLayout, PycFormat};
pub use marshal::{Object, RefTable, StrKind, Value};

use marshal::Marshaller;
use rewrite::PathRewriter;

/// Fichier `.pyc` décodé.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PycFile {
    format: PycFormat,
    header: Vec<u8>,
    slot: Option<u32>,
    code: Code,
    refs: RefTable,
}

impl PycFile {
    /// Décode un `.pyc` complet. Les octets après l’objet racine sont ignorés.
    pub fn from_bytes(data: &[u8]) -> CoreResult<Self> {
        let format = PycFormat::detect(data)?;
        let mut r = ByteReader::new(data);
        let header = r.read_bytes(format.header_len)?.to_vec();
        let (root, refs) = marshal::loads(r.rest(), format.layout)?;
        let Object { slot, value } = root;
        let Value::Code(code) = value else {
            return Err(CoreError::NotCode);
        };
        Ok(Self { format, header, slot, code: *code, refs })
    }

    /// Assemble un fichier depuis un en-tête et un objet racine.
    ///
    /// Le résultat est ré-décodé : les slots et références sont ainsi validés.
    pub fn assemble(format: PycFormat, header: &[u8], root: &Object) -> CoreResult<Self> {
        if header.len() != format.header_len {
            return Err(CoreError::InvalidLength { what: "pyc header".into(), len: header.len() as i64 });
        }
        let mut bytes = header.to_vec();
        bytes.extend_from_slice(&marshal::dumps(root));
        Self::from_bytes(&bytes)
    }

    /// Format résolu depuis le magic.
    pub const fn format(&self) -> PycFormat { self.format }

    /// En-tête brut, recopié tel quel à l’écriture.
    pub fn header(&self) -> &[u8] { &self.header }

    /// Objet code racine (module).
    pub const fn code(&self) -> &Code { &self.code }

    /// Table des références du flux.
    pub const fn refs(&self) -> &RefTable { &self.refs }

    /// Chemin source de l’objet racine.
    pub fn source_path(&self) -> Option<String> {
        self.filename_of(&self.code)
    }

    /// Chemin source d’un objet code de ce fichier (résout les références).
    pub fn filename_of(&self, code: &Code) -> Option<String> {
        self.refs.resolve_text(&code.filename).map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Assigne `new_path` comme chemin source de la racine et de tous les
    /// objets code imbriqués. Renvoie `true` si quelque chose a changé.
    pub fn relocate(&mut self, new_path: &str) -> bool {
        let kind = StrKind::for_text(new_path, self.format.ascii_strings());
        let rewritten = PathRewriter::new(new_path, kind, &mut self.refs).rewrite_code(&self.code);
        match rewritten {
            Some(code) => {
                self.code = code;
                true
            }
            None => false,
        }
    }

    /// Sérialise : en-tête d’origine puis graphe ré-encodé.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut m = Marshaller::default();
        m.write_code_object(self.slot, &self.code);
        let body = m.into_vec();
        let mut out = Vec::with_capacity(self.header.len() + body.len());
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&body);
        out
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */
