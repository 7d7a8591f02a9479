use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::models::{DocKind, EditLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldId {
    Comuna,
    Direccion,
    Fecha,
    Link,
    Espacios,
    Edicion,
    Embed,
    Urgente,
    Presupuesto,
    Nombre,
    Correo,
    Documento,
    RazonSocial,
    Rut,
    FechaAgendada,
}

pub const INTAKE_FIELDS: [FieldId; 9] = [
    FieldId::Comuna,
    FieldId::Direccion,
    FieldId::Fecha,
    FieldId::Link,
    FieldId::Espacios,
    FieldId::Edicion,
    FieldId::Embed,
    FieldId::Urgente,
    FieldId::Presupuesto,
];

pub const CONTACT_FIELDS: [FieldId; 5] = [
    FieldId::Nombre,
    FieldId::Correo,
    FieldId::Documento,
    FieldId::RazonSocial,
    FieldId::Rut,
];

pub const REQUIRED_FOR_QUOTE: [FieldId; 6] = [
    FieldId::Comuna,
    FieldId::Fecha,
    FieldId::Espacios,
    FieldId::Edicion,
    FieldId::Embed,
    FieldId::Urgente,
];

// Rewind order for "atrás"; the scheduled date is never rewound.
const QUESTION_ORDER: [FieldId; 14] = [
    FieldId::Comuna,
    FieldId::Direccion,
    FieldId::Fecha,
    FieldId::Link,
    FieldId::Espacios,
    FieldId::Edicion,
    FieldId::Embed,
    FieldId::Urgente,
    FieldId::Presupuesto,
    FieldId::Nombre,
    FieldId::Correo,
    FieldId::Documento,
    FieldId::RazonSocial,
    FieldId::Rut,
];

impl FieldId {
    pub fn as_key(self) -> &'static str {
        match self {
            Self::Comuna => "comuna",
            Self::Direccion => "direccion",
            Self::Fecha => "fecha",
            Self::Link => "link",
            Self::Espacios => "espacios",
            Self::Edicion => "edicion",
            Self::Embed => "embed",
            Self::Urgente => "urgente",
            Self::Presupuesto => "presupuesto",
            Self::Nombre => "nombre",
            Self::Correo => "correo",
            Self::Documento => "documento",
            Self::RazonSocial => "razon_social",
            Self::Rut => "rut",
            Self::FechaAgendada => "fecha_agendada",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Comuna => "Comuna/Ciudad",
            Self::Direccion => "Dirección",
            Self::Fecha => "Fecha preferida",
            Self::Link => "Link del lugar",
            Self::Espacios => "N° de espacios",
            Self::Edicion => "Edición",
            Self::Embed => "Embed web",
            Self::Urgente => "Urgencia",
            Self::Presupuesto => "Presupuesto",
            Self::Nombre => "Nombre",
            Self::Correo => "Correo",
            Self::Documento => "Tipo de documento",
            Self::RazonSocial => "Razón social",
            Self::Rut => "RUT",
            Self::FechaAgendada => "Fecha agendada",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Count(u32),
    Flag(bool),
    Edition(EditLevel),
    Document(DocKind),
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => write!(f, "{}", value),
            Self::Count(value) => write!(f, "{}", value),
            Self::Flag(true) => write!(f, "Sí"),
            Self::Flag(false) => write!(f, "No"),
            Self::Edition(level) => write!(f, "{}", level.label()),
            Self::Document(kind) => write!(f, "{}", kind.label()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerSet {
    entries: Vec<(FieldId, AnswerValue)>,
}

impl AnswerSet {
    pub fn set(&mut self, field: FieldId, value: AnswerValue) {
        if let Some(entry) = self.entries.iter_mut().find(|(id, _)| *id == field) {
            entry.1 = value;
        } else {
            self.entries.push((field, value));
        }
    }

    pub fn get(&self, field: FieldId) -> Option<&AnswerValue> {
        self.entries
            .iter()
            .find(|(id, _)| *id == field)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, field: FieldId) -> bool {
        self.entries.iter().any(|(id, _)| *id == field)
    }

    pub fn remove(&mut self, field: FieldId) -> Option<AnswerValue> {
        let index = self.entries.iter().position(|(id, _)| *id == field)?;
        Some(self.entries.remove(index).1)
    }

    // Drops the answered question latest in the declared order and names it.
    pub fn rewind(&mut self) -> Option<FieldId> {
        let field = QUESTION_ORDER
            .into_iter()
            .rev()
            .find(|field| self.contains(*field))?;
        self.remove(field);
        Some(field)
    }

    pub fn text(&self, field: FieldId) -> Option<&str> {
        match self.get(field)? {
            AnswerValue::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn count(&self, field: FieldId) -> Option<u32> {
        match self.get(field)? {
            AnswerValue::Count(value) => Some(*value),
            _ => None,
        }
    }

    pub fn flag(&self, field: FieldId) -> Option<bool> {
        match self.get(field)? {
            AnswerValue::Flag(value) => Some(*value),
            _ => None,
        }
    }

    pub fn edition(&self) -> Option<EditLevel> {
        match self.get(FieldId::Edicion)? {
            AnswerValue::Edition(level) => Some(*level),
            _ => None,
        }
    }

    pub fn document(&self) -> Option<DocKind> {
        match self.get(FieldId::Documento)? {
            AnswerValue::Document(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldId, &AnswerValue)> {
        self.entries.iter().map(|(id, value)| (*id, value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for AnswerSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (field, value) in &self.entries {
            map.serialize_entry(field.as_key(), value)?;
        }
        map.end()
    }
}

pub fn next_intake_field(answers: &AnswerSet) -> Option<FieldId> {
    INTAKE_FIELDS
        .into_iter()
        .find(|field| !answers.contains(*field))
}

pub fn next_contact_field(answers: &AnswerSet) -> Option<FieldId> {
    for field in [FieldId::Nombre, FieldId::Correo, FieldId::Documento] {
        if !answers.contains(field) {
            return Some(field);
        }
    }
    if answers.document() == Some(DocKind::Factura) {
        for field in [FieldId::RazonSocial, FieldId::Rut] {
            if !answers.contains(field) {
                return Some(field);
            }
        }
    }
    None
}

pub fn quote_ready(answers: &AnswerSet) -> bool {
    REQUIRED_FOR_QUOTE
        .into_iter()
        .all(|field| answers.contains(field))
}

pub fn is_contact_field(field: FieldId) -> bool {
    CONTACT_FIELDS.contains(&field)
}
