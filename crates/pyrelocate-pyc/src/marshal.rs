//! Codec marshal (format de sérialisation de CPython 3).
//!
//! Le décodage produit un arbre d’[`Object`] qui conserve chaque détail
//! d’encodage (code de type, `FLAG_REF`, références arrière `'r'`) : ré-encoder
//! un arbre décodé redonne exactement les octets d’origine.
//!
//! Les slots de références sont numérotés dans l’ordre préfixe des objets
//! marqués `FLAG_REF`, comme le fait `marshal.c`.

use pyrelocate_core::{ByteReader, ByteWriter, CoreError, CoreResult};

use crate::code::Code;
use crate::format::CodeLayout;

/// Bit « cet objet occupe un slot de référence ».
pub const FLAG_REF: u8 = 0x80;

/// Profondeur d’imbrication maximale (`MAX_MARSHAL_STACK_DEPTH`).
pub const MAX_DEPTH: usize = 2000;

const TYPE_NULL: u8 = b'0';
const TYPE_NONE: u8 = b'N';
const TYPE_FALSE: u8 = b'F';
const TYPE_TRUE: u8 = b'T';
const TYPE_STOPITER: u8 = b'S';
const TYPE_ELLIPSIS: u8 = b'.';
const TYPE_INT: u8 = b'i';
const TYPE_INT64: u8 = b'I';
const TYPE_FLOAT: u8 = b'f';
const TYPE_BINARY_FLOAT: u8 = b'g';
const TYPE_COMPLEX: u8 = b'x';
const TYPE_BINARY_COMPLEX: u8 = b'y';
const TYPE_LONG: u8 = b'l';
const TYPE_STRING: u8 = b's';
const TYPE_INTERNED: u8 = b't';
const TYPE_REF: u8 = b'r';
const TYPE_TUPLE: u8 = b'(';
const TYPE_LIST: u8 = b'[';
const TYPE_DICT: u8 = b'{';
const TYPE_CODE: u8 = b'c';
const TYPE_UNICODE: u8 = b'u';
const TYPE_UNKNOWN: u8 = b'?';
const TYPE_SET: u8 = b'<';
const TYPE_FROZENSET: u8 = b'>';
const TYPE_ASCII: u8 = b'a';
const TYPE_ASCII_INTERNED: u8 = b'A';
const TYPE_SMALL_TUPLE: u8 = b')';
const TYPE_SHORT_ASCII: u8 = b'z';
const TYPE_SHORT_ASCII_INTERNED: u8 = b'Z';
const TYPE_SLICE: u8 = b':';

/* ─────────────────────────── Modèle ─────────────────────────── */

/// Encodage d’une chaîne (bytes ou str).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrKind {
    /// `'s'` : bytes.
    Bytes,
    /// `'t'` : str interné (UTF-8).
    Interned,
    /// `'u'` : str (UTF-8).
    Unicode,
    /// `'a'` : str ASCII.
    Ascii,
    /// `'A'` : str ASCII interné.
    AsciiInterned,
    /// `'z'` : str ASCII, longueur sur un octet.
    ShortAscii,
    /// `'Z'` : str ASCII interné, longueur sur un octet.
    ShortAsciiInterned,
}

impl StrKind {
    const fn type_code(self) -> u8 {
        match self {
            Self::Bytes => TYPE_STRING,
            Self::Interned => TYPE_INTERNED,
            Self::Unicode => TYPE_UNICODE,
            Self::Ascii => TYPE_ASCII,
            Self::AsciiInterned => TYPE_ASCII_INTERNED,
            Self::ShortAscii => TYPE_SHORT_ASCII,
            Self::ShortAsciiInterned => TYPE_SHORT_ASCII_INTERNED,
        }
    }

    const fn from_type_code(code: u8) -> Option<Self> {
        Some(match code {
            TYPE_STRING => Self::Bytes,
            TYPE_INTERNED => Self::Interned,
            TYPE_UNICODE => Self::Unicode,
            TYPE_ASCII => Self::Ascii,
            TYPE_ASCII_INTERNED => Self::AsciiInterned,
            TYPE_SHORT_ASCII => Self::ShortAscii,
            TYPE_SHORT_ASCII_INTERNED => Self::ShortAsciiInterned,
            _ => return None,
        })
    }

    const fn is_short(self) -> bool { matches!(self, Self::ShortAscii | Self::ShortAsciiInterned) }

    /// Vrai pour les `str` (tout sauf `'s'`).
    pub const fn is_text(self) -> bool { !matches!(self, Self::Bytes) }

    /// Encodage qu’utiliserait `marshal.dumps` pour un `str` non interné.
    pub fn for_text(text: &str, ascii_forms: bool) -> Self {
        if !ascii_forms || !text.is_ascii() {
            Self::Unicode
        } else if text.len() < 256 {
            Self::ShortAscii
        } else {
            Self::Ascii
        }
    }
}

/// Valeur marshal. Les flottants sont gardés en bits bruts pour l’égalité exacte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `'0'` : terminateur de dict.
    Null,
    /// `None`.
    None,
    /// `False`.
    False,
    /// `True`.
    True,
    /// `StopIteration`.
    StopIteration,
    /// `...`.
    Ellipsis,
    /// `'?'`.
    Unknown,
    /// Entier 32 bits.
    Int(i32),
    /// Entier 64 bits (ancien format).
    Int64(i64),
    /// Entier long : taille signée + chiffres base 2^15.
    Long {
        /// Nombre de chiffres, signe compris.
        size: i32,
        /// Chiffres de poids faible en premier.
        digits: Vec<u16>,
    },
    /// Flottant en texte (`'f'`).
    FloatText(Vec<u8>),
    /// Flottant binaire (`'g'`), bits IEEE.
    Float(u64),
    /// Complexe en texte (`'x'`).
    ComplexText(Vec<u8>, Vec<u8>),
    /// Complexe binaire (`'y'`).
    Complex(u64, u64),
    /// Chaîne (bytes ou str).
    Str(StrKind, Vec<u8>),
    /// Tuple (`'('`).
    Tuple(Vec<Object>),
    /// Tuple court (`')'`, au plus 255 éléments).
    SmallTuple(Vec<Object>),
    /// Liste.
    List(Vec<Object>),
    /// Dict (paires clé/valeur).
    Dict(Vec<(Object, Object)>),
    /// Set.
    Set(Vec<Object>),
    /// Frozenset.
    FrozenSet(Vec<Object>),
    /// Slice (3.14+) : start, stop, step.
    Slice(Box<[Object; 3]>),
    /// Objet code.
    Code(Box<Code>),
    /// Référence arrière vers un slot.
    Ref(u32),
}

impl Value {
    const fn is_singleton(&self) -> bool {
        matches!(
            self,
            Self::Null | Self::None | Self::False | Self::True | Self::StopIteration | Self::Ellipsis | Self::Unknown
        )
    }
}

/// Nœud de l’arbre marshal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    /// Slot de référence (objet écrit avec `FLAG_REF`).
    pub slot: Option<u32>,
    /// Valeur.
    pub value: Value,
}

impl Object {
    /// Objet sans slot.
    pub const fn new(value: Value) -> Self { Self { slot: None, value } }

    /// Objet occupant le slot `slot`.
    pub const fn with_slot(slot: u32, value: Value) -> Self { Self { slot: Some(slot), value } }

    /// Chaîne `str` avec l’encodage choisi.
    pub fn text(kind: StrKind, text: &str) -> Self { Self::new(Value::Str(kind, text.as_bytes().to_vec())) }

    /// Octets de la chaîne si l’objet est une chaîne en ligne.
    pub fn as_str_bytes(&self) -> Option<&[u8]> {
        match &self.value {
            Value::Str(_, data) => Some(data),
            _ => None,
        }
    }

    /// Objet code en ligne.
    pub fn as_code(&self) -> Option<&Code> {
        match &self.value {
            Value::Code(code) => Some(code),
            _ => None,
        }
    }

    /// Éléments d’une séquence (tuple, liste, set) ; vide sinon.
    pub fn items(&self) -> &[Object] {
        match &self.value {
            Value::Tuple(items)
            | Value::SmallTuple(items)
            | Value::List(items)
            | Value::Set(items)
            | Value::FrozenSet(items) => items,
            _ => &[],
        }
    }
}

/* ─────────────────────────── Table des références ─────────────────────────── */

/// Slots de références d’un flux décodé.
///
/// Seul le contenu des chaînes est retenu : c’est tout ce qu’il faut pour
/// résoudre un `co_filename` écrit comme référence arrière.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefTable {
    slots: Vec<Option<Vec<u8>>>,
}

impl RefTable {
    /// Nombre de slots.
    pub fn len(&self) -> usize { self.slots.len() }

    /// Vrai si aucun slot.
    pub fn is_empty(&self) -> bool { self.slots.is_empty() }

    fn reserve(&mut self) -> u32 {
        let idx = self.slots.len() as u32;
        self.slots.push(None);
        idx
    }

    /// Remplace le contenu chaîne d’un slot.
    pub fn set_text(&mut self, slot: u32, data: Vec<u8>) {
        if let Some(s) = self.slots.get_mut(slot as usize) {
            *s = Some(data);
        }
    }

    /// Contenu chaîne d’un slot.
    pub fn text(&self, slot: u32) -> Option<&[u8]> { self.slots.get(slot as usize)?.as_deref() }

    /// Chaîne portée par `obj`, directement ou via une référence.
    pub fn resolve_text<'a>(&'a self, obj: &'a Object) -> Option<&'a [u8]> {
        match &obj.value {
            Value::Str(_, data) => Some(data),
            Value::Ref(slot) => self.text(*slot),
            _ => None,
        }
    }
}

/* ─────────────────────────── Décodage ─────────────────────────── */

/// Décode un objet depuis `data` ; renvoie l’objet et la table des références.
///
/// Les octets qui suivent le premier objet sont ignorés (comme `marshal.loads`).
pub fn loads(data: &[u8], layout: CodeLayout) -> CoreResult<(Object, RefTable)> {
    let mut u = Unmarshaller::new(data, layout);
    let obj = u.read_object()?;
    Ok((obj, u.into_refs()))
}

/// Lecteur marshal.
#[derive(Debug)]
pub struct Unmarshaller<'a> {
    r: ByteReader<'a>,
    layout: CodeLayout,
    refs: RefTable,
    depth: usize,
}

impl<'a> Unmarshaller<'a> {
    /// Construit un lecteur pour la disposition d’objets code donnée.
    pub fn new(data: &'a [u8], layout: CodeLayout) -> Self {
        Self { r: ByteReader::new(data), layout, refs: RefTable::default(), depth: 0 }
    }

    /// Table des références accumulée (consomme).
    pub fn into_refs(self) -> RefTable { self.refs }

    /// Lit un objet complet.
    pub fn read_object(&mut self) -> CoreResult<Object> {
        if self.depth >= MAX_DEPTH {
            return Err(CoreError::corrupted("marshal data nested too deeply"));
        }
        let at = self.r.offset() as u64;
        let byte = self.r.read_u8()?;
        let code = byte & !FLAG_REF;
        // slot réservé avant les enfants : ordre préfixe
        let slot = if byte & FLAG_REF != 0 {
            if matches!(code, TYPE_NULL | TYPE_NONE | TYPE_FALSE | TYPE_TRUE | TYPE_STOPITER | TYPE_ELLIPSIS | TYPE_UNKNOWN | TYPE_REF) {
                return Err(CoreError::corrupted(format!("FLAG_REF set on type {:?} at {at}", code as char)));
            }
            Some(self.refs.reserve())
        } else {
            None
        };

        self.depth += 1;
        let value = self.read_value(code, at);
        self.depth -= 1;
        let value = value?;

        if let (Some(idx), Value::Str(_, data)) = (slot, &value) {
            self.refs.set_text(idx, data.clone());
        }
        Ok(Object { slot, value })
    }

    fn read_value(&mut self, code: u8, at: u64) -> CoreResult<Value> {
        let value = match code {
            TYPE_NULL => Value::Null,
            TYPE_NONE => Value::None,
            TYPE_FALSE => Value::False,
            TYPE_TRUE => Value::True,
            TYPE_STOPITER => Value::StopIteration,
            TYPE_ELLIPSIS => Value::Ellipsis,
            TYPE_UNKNOWN => Value::Unknown,
            TYPE_INT => Value::Int(self.r.read_i32_le()?),
            TYPE_INT64 => Value::Int64(self.r.read_u64_le()? as i64),
            TYPE_LONG => {
                let size = self.r.read_i32_le()?;
                let n = size.unsigned_abs() as usize;
                let mut digits = Vec::with_capacity(n.min(self.r.remaining() / 2));
                for _ in 0..n {
                    digits.push(self.r.read_u16_le()?);
                }
                Value::Long { size, digits }
            }
            TYPE_FLOAT => Value::FloatText(self.read_short_bytes()?),
            TYPE_BINARY_FLOAT => Value::Float(self.r.read_u64_le()?),
            TYPE_COMPLEX => {
                let re = self.read_short_bytes()?;
                let im = self.read_short_bytes()?;
                Value::ComplexText(re, im)
            }
            TYPE_BINARY_COMPLEX => {
                let re = self.r.read_u64_le()?;
                let im = self.r.read_u64_le()?;
                Value::Complex(re, im)
            }
            TYPE_REF => {
                let index = self.r.read_u32_le()?;
                if index as usize >= self.refs.len() {
                    return Err(CoreError::DanglingRef { index, at });
                }
                Value::Ref(index)
            }
            TYPE_TUPLE => {
                let n = self.r.read_len_i32("tuple")?;
                Value::Tuple(self.read_items(n)?)
            }
            TYPE_SMALL_TUPLE => {
                let n = usize::from(self.r.read_u8()?);
                Value::SmallTuple(self.read_items(n)?)
            }
            TYPE_LIST => {
                let n = self.r.read_len_i32("list")?;
                Value::List(self.read_items(n)?)
            }
            TYPE_SET => {
                let n = self.r.read_len_i32("set")?;
                Value::Set(self.read_items(n)?)
            }
            TYPE_FROZENSET => {
                let n = self.r.read_len_i32("frozenset")?;
                Value::FrozenSet(self.read_items(n)?)
            }
            TYPE_DICT => {
                let mut pairs = Vec::new();
                loop {
                    let key = self.read_object()?;
                    if key.value == Value::Null {
                        break;
                    }
                    let val = self.read_object()?;
                    pairs.push((key, val));
                }
                Value::Dict(pairs)
            }
            TYPE_SLICE => {
                let start = self.read_object()?;
                let stop = self.read_object()?;
                let step = self.read_object()?;
                Value::Slice(Box::new([start, stop, step]))
            }
            TYPE_CODE => Value::Code(Box::new(self.read_code()?)),
            other => match StrKind::from_type_code(other) {
                Some(kind) => {
                    let n = if kind.is_short() {
                        usize::from(self.r.read_u8()?)
                    } else {
                        self.r.read_len_i32("string")?
                    };
                    Value::Str(kind, self.r.read_bytes(n)?.to_vec())
                }
                None => return Err(CoreError::UnknownTypeCode { code: other, at }),
            },
        };
        Ok(value)
    }

    fn read_short_bytes(&mut self) -> CoreResult<Vec<u8>> {
        let n = usize::from(self.r.read_u8()?);
        Ok(self.r.read_bytes(n)?.to_vec())
    }

    fn read_items(&mut self, n: usize) -> CoreResult<Vec<Object>> {
        // chaque élément fait au moins un octet
        if n > self.r.remaining() {
            return Err(CoreError::InvalidLength { what: "sequence".into(), len: n as i64 });
        }
        (0..n).map(|_| self.read_object()).collect()
    }

    fn read_objects(&mut self, n: usize) -> CoreResult<Vec<Object>> {
        (0..n).map(|_| self.read_object()).collect()
    }

    fn read_code(&mut self) -> CoreResult<Code> {
        let layout = self.layout;
        let counters = (0..layout.counters()).map(|_| self.r.read_i32_le()).collect::<CoreResult<Vec<_>>>()?;
        let code = self.read_object()?;
        let consts = self.read_object()?;
        let names_and_locals = self.read_objects(layout.names_and_locals())?;
        let filename = self.read_object()?;
        let names_after = self.read_objects(layout.names_after())?;
        let firstlineno = self.r.read_i32_le()?;
        let tables = self.read_objects(layout.tables())?;
        Ok(Code { counters, code, consts, names_and_locals, filename, names_after, firstlineno, tables })
    }
}

/* ─────────────────────────── Encodage ─────────────────────────── */

/// Encode un objet.
pub fn dumps(obj: &Object) -> Vec<u8> {
    let mut m = Marshaller::default();
    m.write_object(obj);
    m.into_vec()
}

/// Écrivain marshal.
#[derive(Debug, Default)]
pub struct Marshaller {
    w: ByteWriter,
}

impl Marshaller {
    /// Octets produits (consomme).
    pub fn into_vec(self) -> Vec<u8> { self.w.into_vec() }

    /// Écrit un objet et ses enfants.
    pub fn write_object(&mut self, obj: &Object) {
        let flag = if obj.slot.is_some() && !obj.value.is_singleton() { FLAG_REF } else { 0 };
        match &obj.value {
            Value::Null => self.w.write_u8(TYPE_NULL),
            Value::None => self.w.write_u8(TYPE_NONE),
            Value::False => self.w.write_u8(TYPE_FALSE),
            Value::True => self.w.write_u8(TYPE_TRUE),
            Value::StopIteration => self.w.write_u8(TYPE_STOPITER),
            Value::Ellipsis => self.w.write_u8(TYPE_ELLIPSIS),
            Value::Unknown => self.w.write_u8(TYPE_UNKNOWN),
            Value::Int(v) => {
                self.w.write_u8(TYPE_INT | flag);
                self.w.write_i32_le(*v);
            }
            Value::Int64(v) => {
                self.w.write_u8(TYPE_INT64 | flag);
                self.w.write_u64_le(*v as u64);
            }
            Value::Long { size, digits } => {
                self.w.write_u8(TYPE_LONG | flag);
                self.w.write_i32_le(*size);
                for d in digits {
                    self.w.write_u16_le(*d);
                }
            }
            Value::FloatText(text) => {
                self.w.write_u8(TYPE_FLOAT | flag);
                self.write_short_bytes(text);
            }
            Value::Float(bits) => {
                self.w.write_u8(TYPE_BINARY_FLOAT | flag);
                self.w.write_u64_le(*bits);
            }
            Value::ComplexText(re, im) => {
                self.w.write_u8(TYPE_COMPLEX | flag);
                self.write_short_bytes(re);
                self.write_short_bytes(im);
            }
            Value::Complex(re, im) => {
                self.w.write_u8(TYPE_BINARY_COMPLEX | flag);
                self.w.write_u64_le(*re);
                self.w.write_u64_le(*im);
            }
            Value::Str(kind, data) => {
                self.w.write_u8(kind.type_code() | flag);
                if kind.is_short() {
                    self.w.write_u8(data.len() as u8);
                } else {
                    self.w.write_i32_le(data.len() as i32);
                }
                self.w.write_bytes(data);
            }
            Value::Tuple(items) => self.write_sequence(TYPE_TUPLE | flag, items),
            Value::SmallTuple(items) => {
                self.w.write_u8(TYPE_SMALL_TUPLE | flag);
                self.w.write_u8(items.len() as u8);
                for item in items {
                    self.write_object(item);
                }
            }
            Value::List(items) => self.write_sequence(TYPE_LIST | flag, items),
            Value::Set(items) => self.write_sequence(TYPE_SET | flag, items),
            Value::FrozenSet(items) => self.write_sequence(TYPE_FROZENSET | flag, items),
            Value::Dict(pairs) => {
                self.w.write_u8(TYPE_DICT | flag);
                for (k, v) in pairs {
                    self.write_object(k);
                    self.write_object(v);
                }
                self.w.write_u8(TYPE_NULL);
            }
            Value::Slice(parts) => {
                self.w.write_u8(TYPE_SLICE | flag);
                for part in parts.iter() {
                    self.write_object(part);
                }
            }
            Value::Code(code) => self.write_code_object(obj.slot, code),
            Value::Ref(idx) => {
                self.w.write_u8(TYPE_REF);
                self.w.write_u32_le(*idx);
            }
        }
    }

    fn write_short_bytes(&mut self, data: &[u8]) {
        self.w.write_u8(data.len() as u8);
        self.w.write_bytes(data);
    }

    fn write_sequence(&mut self, type_byte: u8, items: &[Object]) {
        self.w.write_u8(type_byte);
        self.w.write_i32_le(items.len() as i32);
        for item in items {
            self.write_object(item);
        }
    }

    /// Écrit un objet code (avec `FLAG_REF` s’il occupe un slot).
    pub fn write_code_object(&mut self, slot: Option<u32>, code: &Code) {
        let flag = if slot.is_some() { FLAG_REF } else { 0 };
        self.w.write_u8(TYPE_CODE | flag);
        for c in &code.counters {
            self.w.write_i32_le(*c);
        }
        self.write_object(&code.code);
        self.write_object(&code.consts);
        for obj in &code.names_and_locals {
            self.write_object(obj);
        }
        self.write_object(&code.filename);
        for obj in &code.names_after {
            self.write_object(obj);
        }
        self.w.write_i32_le(code.firstlineno);
        for obj in &code.tables {
            self.write_object(obj);
        }
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */
