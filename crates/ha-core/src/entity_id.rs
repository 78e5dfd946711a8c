//! Entity ids (`<domain>.<object_id>`) and the slug rules deriving them
//! from display names

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityIdError {
    #[error("'{0}' is not of the form <domain>.<object_id>")]
    InvalidFormat(String),

    #[error("domain '{0}' must be a slug without double underscores")]
    InvalidDomain(String),

    #[error("object id '{0}' must be a slug")]
    InvalidObjectId(String),
}

/// e.g. `sensor.pronote_lea_martin_grades`
///
/// Stored as the full id so lookups by `&str` need no allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    full: String,
    dot: usize,
}

impl EntityId {
    pub fn new(domain: &str, object_id: &str) -> Result<Self, EntityIdError> {
        if !is_slug(domain) || domain.contains("__") {
            return Err(EntityIdError::InvalidDomain(domain.to_string()));
        }
        if !is_slug(object_id) {
            return Err(EntityIdError::InvalidObjectId(object_id.to_string()));
        }
        Ok(Self {
            full: format!("{}.{}", domain, object_id),
            dot: domain.len(),
        })
    }

    /// `<domain>.<slug of name>`, `unnamed` when nothing is left of the name
    pub fn from_name(domain: &str, name: &str) -> Result<Self, EntityIdError> {
        match slugify(name) {
            slug if slug.is_empty() => Self::new(domain, "unnamed"),
            slug => Self::new(domain, &slug),
        }
    }

    /// The same id with `_<n>` appended
    pub fn with_suffix(&self, n: usize) -> Self {
        Self {
            full: format!("{}_{}", self.full, n),
            dot: self.dot,
        }
    }

    pub fn domain(&self) -> &str {
        &self.full[..self.dot]
    }

    pub fn object_id(&self) -> &str {
        &self.full[self.dot + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.full
    }
}

/// Non-empty `[a-z0-9_]`, no leading or trailing `_`
fn is_slug(s: &str) -> bool {
    let allowed = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_';
    !s.is_empty() && !s.starts_with('_') && !s.ends_with('_') && s.chars().all(allowed)
}

/// Turn arbitrary text into an object id
///
/// Accented Latin letters are folded to ASCII, every other run of
/// characters outside `[a-z0-9]` collapses into a single `_`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_sep = false;

    for c in text.chars().flat_map(char::to_lowercase) {
        let folded = fold_accent(c);
        for c in folded.chars() {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                if pending_sep && !slug.is_empty() {
                    slug.push('_');
                }
                pending_sep = false;
                slug.push(c);
            } else {
                pending_sep = true;
            }
        }
    }

    slug
}

fn fold_accent(c: char) -> String {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'æ' => "ae",
        'ç' => "c",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => "o",
        'œ' => "oe",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'ý' | 'ÿ' => "y",
        'ß' => "ss",
        other => return other.to_string(),
    };
    folded.to_string()
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (domain, object_id) = s
            .split_once('.')
            .filter(|(_, object_id)| !object_id.contains('.'))
            .ok_or_else(|| EntityIdError::InvalidFormat(s.to_string()))?;
        Self::new(domain, object_id)
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.full
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.full
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts() {
        let id: EntityId = "sensor.pronote_lea_martin_grades".parse().unwrap();
        assert_eq!(id.domain(), "sensor");
        assert_eq!(id.object_id(), "pronote_lea_martin_grades");
        assert_eq!(id.as_str(), "sensor.pronote_lea_martin_grades");
        assert_eq!(id.with_suffix(2).object_id(), "pronote_lea_martin_grades_2");
        assert_eq!(id.with_suffix(2).domain(), "sensor");
    }

    #[test]
    fn test_rejected_ids() {
        for bad in ["no_separator", "too.many.parts"] {
            assert!(matches!(bad.parse::<EntityId>(), Err(EntityIdError::InvalidFormat(_))), "{}", bad);
        }
        for bad in [".object", "my__sensor.x", "Sensor.x"] {
            assert!(matches!(bad.parse::<EntityId>(), Err(EntityIdError::InvalidDomain(_))), "{}", bad);
        }
        for bad in ["sensor.", "sensor._x", "sensor.Upper", "sensor.lea-martin"] {
            assert!(matches!(bad.parse::<EntityId>(), Err(EntityIdError::InvalidObjectId(_))), "{}", bad);
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Emploi du temps de Zoé"), "emploi_du_temps_de_zoe");
        assert_eq!(slugify("  Élève -- Œuvre  "), "eleve_oeuvre");
        assert_eq!(slugify("pronote_lea_martin_timetable_today"), "pronote_lea_martin_timetable_today");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_from_name() {
        let id = EntityId::from_name("calendar", "Emploi du temps de Léa").unwrap();
        assert_eq!(id.to_string(), "calendar.emploi_du_temps_de_lea");
        assert_eq!(EntityId::from_name("sensor", "???").unwrap().object_id(), "unnamed");
    }

    #[test]
    fn test_serialized_as_string() {
        let id = EntityId::new("sensor", "pronote_lea").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"sensor.pronote_lea\"");
        assert_eq!(serde_json::from_str::<EntityId>(&json).unwrap(), id);
        assert!(serde_json::from_str::<EntityId>("\"sensor\"").is_err());
    }
}
