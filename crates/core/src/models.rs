use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::flow::AnswerSet;
use crate::pricing::Quote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Restaurante,
    VenueEventos,
    AirbnbArriendo,
    Hotel,
    Otro,
}

impl ServiceKind {
    pub fn parse_id(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "restaurante" => Some(Self::Restaurante),
            "venue_eventos" => Some(Self::VenueEventos),
            "airbnb_arriendo" => Some(Self::AirbnbArriendo),
            "hotel" => Some(Self::Hotel),
            "otro" => Some(Self::Otro),
            _ => None,
        }
    }

    pub fn as_id(self) -> &'static str {
        match self {
            Self::Restaurante => "restaurante",
            Self::VenueEventos => "venue_eventos",
            Self::AirbnbArriendo => "airbnb_arriendo",
            Self::Hotel => "hotel",
            Self::Otro => "otro",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Restaurante => "Restaurante",
            Self::VenueEventos => "Venue / Eventos",
            Self::AirbnbArriendo => "Airbnb / Arriendo",
            Self::Hotel => "Hotel",
            Self::Otro => "Otro",
        }
    }

    pub fn all() -> [Self; 5] {
        [
            Self::Restaurante,
            Self::VenueEventos,
            Self::AirbnbArriendo,
            Self::Hotel,
            Self::Otro,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeStep {
    Welcome,
    CollectingInfo,
    ConfirmingData,
    ShowingPricing,
    CollectingContact,
    Scheduling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditLevel {
    #[serde(rename = "Básica")]
    Basica,
    #[serde(rename = "Avanzada")]
    Avanzada,
}

impl EditLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "básica" | "basica" => Some(Self::Basica),
            "avanzada" => Some(Self::Avanzada),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Basica => "Básica",
            Self::Avanzada => "Avanzada",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocKind {
    Boleta,
    Factura,
}

impl DocKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Boleta => "Boleta",
            Self::Factura => "Factura",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Lead {
    pub phone: String,
    pub step: IntakeStep,
    pub service: Option<ServiceKind>,
    pub answers: AnswerSet,
    pub media_urls: Vec<String>,
    pub quote: Option<Quote>,
    pub confirmed: bool,
    pub last_updated: DateTime<Utc>,
}

impl Lead {
    pub fn new(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            step: IntakeStep::Welcome,
            service: None,
            answers: AnswerSet::default(),
            media_urls: Vec::new(),
            quote: None,
            confirmed: false,
            last_updated: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessInfo {
    pub name: String,
    pub phone: String,
    pub website: String,
}

impl Default for BusinessInfo {
    fn default() -> Self {
        Self {
            name: "Vista360".to_string(),
            phone: "+56 9 5555 0360".to_string(),
            website: "https://vista360.cl".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub from: String,
    pub id: String,
    pub payload: InboundPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundPayload {
    Text { body: String },
    Button { id: String, title: String },
    ListReply { id: String, title: String },
    Image { media_id: String, caption: Option<String> },
    Unsupported { kind: String },
}
