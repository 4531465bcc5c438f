//! Base de conocimiento de sólo lectura, versionada.
//!
//! Formato JSON aceptado por `InMemoryKnowledgeBase::from_json_str`:
//!
//! ```json
//! { "version": "kb-2024.1",
//!   "entries": [ { "id": "na", "name": "Sodium", "symbol": "Na",
//!                  "aliases": ["natrium"],
//!                  "attributes": { "atomic_number": 11, "molar_mass": 22.99 },
//!                  "parameters": [ { "name": "moles", "unit": "mol", "min": 0, "required": true } ],
//!                  "notes": { "category": "alkali metal" } } ] }
//! ```
//!
//! Si falta `version`, se deriva del contenido: `sha256:` + 16 hex.
use std::collections::BTreeMap;
use std::path::Path;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::entity::{ParameterSpec, ResolvedEntity};
use crate::term::normalize;
use crate::DomainError;

pub const SEED_VERSION: &str = "periodic-seed-1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KbEntry {
    pub id: String,
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, f64>,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    #[serde(default)]
    pub notes: BTreeMap<String, String>,
}

impl KbEntry {
    /// Coincide si el id, nombre, símbolo o algún alias normalizado es igual
    /// a `normalized`.
    pub fn matches(&self, normalized: &str) -> bool {
        std::iter::once(&self.id).chain(std::iter::once(&self.name))
                                 .chain(std::iter::once(&self.symbol))
                                 .chain(self.aliases.iter())
                                 .any(|k| normalize(k) == normalized)
    }

    pub fn to_entity(&self, kb_version: &str) -> ResolvedEntity {
        ResolvedEntity { id: self.id.clone(),
                         name: self.name.clone(),
                         symbol: self.symbol.clone(),
                         attributes: self.attributes.clone(),
                         parameters: self.parameters.clone(),
                         notes: self.notes.clone(),
                         kb_version: kb_version.to_string() }
    }
}

pub trait KnowledgeBase: Send + Sync {
    fn version(&self) -> &str;
    /// Todas las entradas que coinciden con el término normalizado.
    fn find(&self, normalized: &str) -> Vec<&KbEntry>;
    fn get(&self, id: &str) -> Option<&KbEntry>;
    /// Entradas en orden de carga.
    fn entries(&self) -> Vec<&KbEntry>;
}

#[derive(Debug, Clone)]
pub struct InMemoryKnowledgeBase {
    version: String,
    entries: IndexMap<String, KbEntry>,
}

#[derive(Deserialize)]
struct KbDocument {
    #[serde(default)]
    version: Option<String>,
    entries: Vec<KbEntry>,
}

impl InMemoryKnowledgeBase {
    pub fn from_entries<I>(version: impl Into<String>, entries: I) -> Result<Self, DomainError>
        where I: IntoIterator<Item = KbEntry>
    {
        let version = version.into();
        if version.trim().is_empty() {
            return Err(DomainError::KnowledgeBase("version must not be empty".into()));
        }
        let mut map = IndexMap::new();
        for entry in entries {
            if entry.id.trim().is_empty() {
                return Err(DomainError::KnowledgeBase("entry with empty id".into()));
            }
            if map.contains_key(&entry.id) {
                return Err(DomainError::KnowledgeBase(format!("duplicate entry id '{}'", entry.id)));
            }
            map.insert(entry.id.clone(), entry);
        }
        Ok(Self { version,
                  entries: map })
    }

    pub fn from_json_str(text: &str) -> Result<Self, DomainError> {
        let doc: KbDocument = serde_json::from_str(text)?;
        let version = match doc.version {
            Some(v) => v,
            None => content_version(text),
        };
        Self::from_entries(version, doc.entries)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
                                                   DomainError::KnowledgeBase(format!("cannot read {}: {e}",
                                                                                      path.display()))
                                               })?;
        Self::from_json_str(&text)
    }

    /// Tabla periódica reducida incluida en el binario.
    pub fn seed() -> Self {
        Self { version: SEED_VERSION.to_string(),
               entries: SEED.iter().map(|e| (e.id.clone(), e.clone())).collect() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KnowledgeBase for InMemoryKnowledgeBase {
    fn version(&self) -> &str {
        &self.version
    }

    fn find(&self, normalized: &str) -> Vec<&KbEntry> {
        self.entries.values().filter(|e| e.matches(normalized)).collect()
    }

    fn get(&self, id: &str) -> Option<&KbEntry> {
        self.entries.get(id)
    }

    fn entries(&self) -> Vec<&KbEntry> {
        self.entries.values().collect()
    }
}

fn content_version(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("sha256:{hex}")
}

fn element(z: u32, id: &str, name: &str, symbol: &str, molar_mass: f64, category: &str, aliases: &[&str]) -> KbEntry {
    let mut attributes = BTreeMap::new();
    attributes.insert("atomic_number".to_string(), z as f64);
    attributes.insert("molar_mass".to_string(), molar_mass);
    let mut notes = BTreeMap::new();
    notes.insert("category".to_string(), category.to_string());
    notes.insert("summary".to_string(), format!("Atomic number {z}, standard atomic weight {molar_mass} g/mol."));
    KbEntry { id: id.to_string(),
              name: name.to_string(),
              symbol: symbol.to_string(),
              aliases: aliases.iter().map(|a| a.to_string()).collect(),
              attributes,
              parameters: vec![ParameterSpec { name: "moles".into(),
                                               unit: Some("mol".into()),
                                               min: Some(0.0),
                                               max: Some(1.0e6),
                                               required: true }],
              notes }
}

static SEED: Lazy<Vec<KbEntry>> = Lazy::new(|| {
    vec![element(1, "h", "Hydrogen", "H", 1.008, "nonmetal", &[]),
         element(2, "he", "Helium", "He", 4.0026, "noble gas", &[]),
         element(3, "li", "Lithium", "Li", 6.94, "alkali metal", &[]),
         element(6, "c", "Carbon", "C", 12.011, "nonmetal", &[]),
         element(7, "n", "Nitrogen", "N", 14.007, "nonmetal", &["azote"]),
         element(8, "o", "Oxygen", "O", 15.999, "nonmetal", &[]),
         element(11, "na", "Sodium", "Na", 22.99, "alkali metal", &["natrium"]),
         element(12, "mg", "Magnesium", "Mg", 24.305, "alkaline earth metal", &[]),
         element(17, "cl", "Chlorine", "Cl", 35.45, "halogen", &[]),
         element(19, "k", "Potassium", "K", 39.098, "alkali metal", &["kalium"]),
         element(20, "ca", "Calcium", "Ca", 40.078, "alkaline earth metal", &[]),
         element(26, "fe", "Iron", "Fe", 55.845, "transition metal", &["ferrum"]),
         element(29, "cu", "Copper", "Cu", 63.546, "transition metal", &["cuprum"]),]
});
