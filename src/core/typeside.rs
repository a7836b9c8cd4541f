// =============================================================================
// TYPESIDE — Les types primitifs et les valeurs des cellules
// =============================================================================
//
// Chaque nœud atomique du schéma porte un type de base (String, Int...).
// Les tables matérialisées par le backend contiennent des Value.
//
// CONTRAINTE : le moteur fait des jointures, des dédoublonnages et des tris
// sur les lignes. Il faut donc que Value soit totalement ordonnée et
// hachable, y compris pour les flottants (on compare leurs bits via
// `f64::total_cmp`).
//
// =============================================================================

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Un type de base dans le système.
///
/// Chaque nœud atomique du graphe de schéma est typé par un BaseType.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BaseType {
    /// Chaîne de caractères
    String,
    /// Entier
    Integer,
    /// Nombre à virgule flottante
    Float,
    /// Booléen
    Boolean,
    /// Type personnalisé défini par l'utilisateur
    Custom(std::string::String),
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseType::String => write!(f, "String"),
            BaseType::Integer => write!(f, "Int"),
            BaseType::Float => write!(f, "Float"),
            BaseType::Boolean => write!(f, "Bool"),
            BaseType::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Une valeur concrète dans une cellule de table.
///
/// `Null` apparaît quand une traversée ne trouve aucune correspondance
/// (sémantique de jointure "right").
#[derive(Debug, Clone)]
pub enum Value {
    String(std::string::String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

impl Value {
    /// Retourne le BaseType correspondant à cette valeur
    pub fn get_type(&self) -> BaseType {
        match self {
            Value::String(_) => BaseType::String,
            Value::Integer(_) => BaseType::Integer,
            Value::Float(_) => BaseType::Float,
            Value::Boolean(_) => BaseType::Boolean,
            Value::Null => BaseType::String, // Null est polymorphe, par défaut String
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Rang du variant, pour ordonner des valeurs de types différents.
    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) => 2,
            Value::Float(_) => 3,
            Value::String(_) => 4,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Null, Value::Null) => Ordering::Equal,
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::String(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(fl) => fl.to_bits().hash(state),
            Value::Boolean(b) => b.hash(state),
            Value::Null => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Null => write!(f, "NULL"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}
