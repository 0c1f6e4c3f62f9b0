//! pyrelocate-core — primitives partagées
//!
//! Fournit :
//! - IO mémoire (little-endian) : `ByteWriter`, `ByteReader`
//! - Erreurs `CoreError` + alias `CoreResult<T>`
//!
//! Features :
//! - `serde` : derive (dé)sérialisation des erreurs (rapports JSON)

#![deny(missing_docs)]

/* ─────────────────────────── Imports ─────────────────────────── */

use std::borrow::Cow;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/* ─────────────────────────── Résultat commun ─────────────────────────── */

/// Alias résultat commun au core.
pub type CoreResult<T> = core::result::Result<T, CoreError>;

/* ─────────────────────────── Byte Writer (LE) ─────────────────────────── */

/// Buffer d’écriture (croît automatiquement).
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Crée un writer vide.
    pub fn new() -> Self { Self { buf: Vec::new() } }
    /// Accès en lecture au contenu.
    pub fn as_slice(&self) -> &[u8] { &self.buf }
    /// Récupère le buffer (consomme).
    pub fn into_vec(self) -> Vec<u8> { self.buf }
    /// Nombre d’octets écrits.
    pub fn len(&self) -> usize { self.buf.len() }
    /// Vrai si rien n’a été écrit.
    pub fn is_empty(&self) -> bool { self.buf.is_empty() }
    /// Ajoute des octets bruts.
    pub fn write_bytes(&mut self, bytes: &[u8]) { self.buf.extend_from_slice(bytes); }
    /// Écrit un octet.
    pub fn write_u8(&mut self, v: u8) { self.buf.push(v); }
    /// Écrit un u16 little-endian.
    pub fn write_u16_le(&mut self, v: u16) {
        let mut b = [0u8; 2];
        LittleEndian::write_u16(&mut b, v);
        self.write_bytes(&b);
    }
    /// Écrit un u32 little-endian.
    pub fn write_u32_le(&mut self, v: u32) {
        let mut b = [0u8; 4];
        LittleEndian::write_u32(&mut b, v);
        self.write_bytes(&b);
    }
    /// Écrit un i32 little-endian.
    pub fn write_i32_le(&mut self, v: i32) {
        let mut b = [0u8; 4];
        LittleEndian::write_i32(&mut b, v);
        self.write_bytes(&b);
    }
    /// Écrit un u64 little-endian.
    pub fn write_u64_le(&mut self, v: u64) {
        let mut b = [0u8; 8];
        LittleEndian::write_u64(&mut b, v);
        self.write_bytes(&b);
    }
}

/* ─────────────────────────── Byte Reader (LE) ─────────────────────────── */

/// Lecteur séquentiel sur un slice d’octets (helpers LE).
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    off: usize,
}

impl<'a> ByteReader<'a> {
    /// Construit un lecteur.
    pub fn new(data: &'a [u8]) -> Self { Self { data, off: 0 } }
    /// Offset courant.
    pub fn offset(&self) -> usize { self.off }
    /// Taille restante.
    pub fn remaining(&self) -> usize { self.data.len().saturating_sub(self.off) }
    /// Octets non encore consommés.
    pub fn rest(&self) -> &'a [u8] { &self.data[self.off.min(self.data.len())..] }

    /// Lit `n` octets (ou erreur si EOF).
    pub fn read_bytes(&mut self, n: usize) -> CoreResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(CoreError::UnexpectedEof { needed: n as u64, at: self.off as u64 });
        }
        let start = self.off;
        self.off += n;
        Ok(&self.data[start..self.off])
    }

    /// Lit un octet.
    pub fn read_u8(&mut self) -> CoreResult<u8> { Ok(self.read_bytes(1)?[0]) }

    /// Lit un u16 LE.
    pub fn read_u16_le(&mut self) -> CoreResult<u16> { Ok(LittleEndian::read_u16(self.read_bytes(2)?)) }

    /// Lit un u32 LE.
    pub fn read_u32_le(&mut self) -> CoreResult<u32> { Ok(LittleEndian::read_u32(self.read_bytes(4)?)) }

    /// Lit un i32 LE.
    pub fn read_i32_le(&mut self) -> CoreResult<i32> { Ok(LittleEndian::read_i32(self.read_bytes(4)?)) }

    /// Lit un u64 LE.
    pub fn read_u64_le(&mut self) -> CoreResult<u64> { Ok(LittleEndian::read_u64(self.read_bytes(8)?)) }

    /// Lit une longueur i32 LE (erreur si négative).
    pub fn read_len_i32(&mut self, what: &'static str) -> CoreResult<usize> {
        let n = self.read_i32_le()?;
        usize::try_from(n).map_err(|_| CoreError::InvalidLength { what: Cow::Borrowed(what), len: i64::from(n) })
    }
}

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Erreurs de bas niveau communes (décodage `.pyc` / marshal).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CoreError {
    /// Fin de buffer inattendue.
    #[error("unexpected EOF: need {needed} bytes at {at}")]
    UnexpectedEof {
        /// Nombre d’octets manquants.
        needed: u64,
        /// Offset où l’erreur s’est produite.
        at: u64,
    },
    /// Magic `.pyc` inconnu (Python 2, fichier étranger…).
    #[error("unknown bytecode magic number {magic}")]
    UnknownMagic {
        /// Les deux premiers octets, LE.
        magic: u16,
    },
    /// Code de type marshal inconnu.
    #[error("unknown marshal type code 0x{code:02X} at {at}")]
    UnknownTypeCode {
        /// Octet de type (sans FLAG_REF).
        code: u8,
        /// Offset de l’octet.
        at: u64,
    },
    /// Référence arrière vers un slot inexistant.
    #[error("marshal back-reference to missing slot {index} at {at}")]
    DanglingRef {
        /// Index du slot demandé.
        index: u32,
        /// Offset de la référence.
        at: u64,
    },
    /// Longueur invalide (négative, ou hors limites).
    #[error("invalid length for {what}: {len}")]
    InvalidLength {
        /// Élément concerné.
        what: Cow<'static, str>,
        /// Longueur fautive.
        len: i64,
    },
    /// La racine d’un `.pyc` n’est pas un objet code.
    #[error("top-level object is not a code object")]
    NotCode,
    /// Données corrompues (format).
    #[error("corrupted: {0}")]
    Corrupted(Cow<'static, str>),
}

impl CoreError {
    /// Construit une erreur « corrompu ».
    pub fn corrupted(msg: impl Into<Cow<'static, str>>) -> Self { CoreError::Corrupted(msg.into()) }
}

/* ─────────────────────────── Tests ─────────────────────────── */
