//! Versions du conteneur `.pyc` : longueur d’en-tête et disposition des objets code.
//!
//! ```text
//! magic u16 LE + b"\r\n"            (toutes versions)
//! mtime u32                         (3.0 – 3.2 : en-tête 8 octets)
//! mtime u32 + taille source u32     (3.3 – 3.6 : 12 octets)
//! flags u32 + mtime/hash 8 octets   (3.7+ : 16 octets, PEP 552)
//! ```

use pyrelocate_core::{ByteReader, CoreError, CoreResult};

/// Octets qui suivent toujours le numéro magique.
pub const MAGIC_TAIL: &[u8; 2] = b"\r\n";

/// Disposition des champs d’un objet code marshalé.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeLayout {
    /// 3.0 – 3.7 : argcount, kwonlyargcount, nlocals, stacksize, flags.
    Legacy,
    /// 3.8 – 3.10 : ajoute posonlyargcount.
    PositionalOnly,
    /// 3.11+ : localsplusnames/kinds, qualname, table d’exceptions.
    LocalsPlus,
}

impl CodeLayout {
    /// Nombre d’entiers en tête d’objet (compteurs + flags).
    pub const fn counters(self) -> usize {
        match self {
            Self::Legacy | Self::LocalsPlus => 5,
            Self::PositionalOnly => 6,
        }
    }

    /// Objets entre `consts` et `filename` (names, varnames…).
    pub const fn names_and_locals(self) -> usize {
        match self {
            Self::Legacy | Self::PositionalOnly => 4,
            Self::LocalsPlus => 3,
        }
    }

    /// Objets entre `filename` et `firstlineno` (name, qualname).
    pub const fn names_after(self) -> usize {
        match self {
            Self::Legacy | Self::PositionalOnly => 1,
            Self::LocalsPlus => 2,
        }
    }

    /// Tables finales (lnotab/linetable, exceptiontable).
    pub const fn tables(self) -> usize {
        match self {
            Self::Legacy | Self::PositionalOnly => 1,
            Self::LocalsPlus => 2,
        }
    }
}

/// Format d’un fichier `.pyc`, résolu une fois par fichier depuis son magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PycFormat {
    /// Numéro magique (2 premiers octets, LE).
    pub magic: u16,
    /// Longueur totale de l’en-tête, magic inclus.
    pub header_len: usize,
    /// Disposition des objets code.
    pub layout: CodeLayout,
}

impl PycFormat {
    /// Résout le format depuis le numéro magique.
    ///
    /// Les plages suivent `Lib/importlib/_bootstrap_external.py` ; les magics
    /// Python 2 et inconnus sont refusés.
    pub fn from_magic(magic: u16) -> CoreResult<Self> {
        let (header_len, layout) = match magic {
            3000..=3189 => (8, CodeLayout::Legacy),
            3190..=3391 => (12, CodeLayout::Legacy),
            3392..=3409 => (16, CodeLayout::Legacy),
            3410..=3449 => (16, CodeLayout::PositionalOnly),
            3450..=3999 => (16, CodeLayout::LocalsPlus),
            _ => return Err(CoreError::UnknownMagic { magic }),
        };
        Ok(Self { magic, header_len, layout })
    }

    /// Lit le magic en tête de `data` et résout le format.
    pub fn detect(data: &[u8]) -> CoreResult<Self> {
        let mut r = ByteReader::new(data);
        let magic = r.read_u16_le()?;
        if r.read_bytes(2)? != MAGIC_TAIL {
            return Err(CoreError::corrupted("magic number not followed by \\r\\n"));
        }
        Self::from_magic(magic)
    }

    /// Marshal v4 (3.4+) : formes ASCII courtes pour les chaînes.
    pub const fn ascii_strings(&self) -> bool { self.magic >= 3250 }

    /// En-tête minimal : magic + `\r\n`, le reste à zéro.
    pub fn blank_header(&self) -> Vec<u8> {
        let mut header = vec![0u8; self.header_len];
        header[..2].copy_from_slice(&self.magic.to_le_bytes());
        header[2..4].copy_from_slice(MAGIC_TAIL);
        header
    }
}
