use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::ServiceKind;

const RESTAURANT_KEYWORDS: &[&str] = &[
    "restaurante",
    "restaurant",
    "comida",
    "food",
    "cena",
    "dinner",
    "almuerzo",
    "lunch",
    "bar",
    "pub",
    "café",
    "cafe",
    "pizzeria",
    "pizzería",
    "sushi",
    "peruano",
    "chino",
    "italiano",
    "mexicano",
    "gastronomía",
    "gastronomia",
    "chef",
    "cocina",
    "kitchen",
    "comedor",
    "dining",
    "terraza",
    "patio",
    "salón",
    "salon",
    "mesas",
    "tables",
    "aforo",
    "capacidad",
    "clientes",
    "customers",
    "horario",
    "schedule",
];

const VENUE_KEYWORDS: &[&str] = &[
    "venue",
    "evento",
    "event",
    "fiesta",
    "party",
    "boda",
    "wedding",
    "cumpleaños",
    "birthday",
    "corporativo",
    "corporate",
    "conferencia",
    "conference",
    "seminario",
    "seminar",
    "exposición",
    "exposicion",
    "exhibition",
    "galería",
    "galeria",
    "gallery",
    "auditorio",
    "auditorium",
    "salón",
    "salon",
    "hall",
    "espacio",
    "space",
    "área",
    "area",
    "montaje",
    "setup",
    "iluminación",
    "iluminacion",
    "lighting",
    "sonido",
    "audio",
    "escenario",
    "stage",
    "pista",
    "dance floor",
    "decoración",
    "decoracion",
];

const AIRBNB_KEYWORDS: &[&str] = &[
    "airbnb",
    "arriendo",
    "rental",
    "renta",
    "departamento",
    "apartment",
    "casa",
    "house",
    "habitación",
    "habitacion",
    "room",
    "bedroom",
    "living",
    "cocina",
    "kitchen",
    "baño",
    "bano",
    "bathroom",
    "terraza",
    "terrace",
    "balcón",
    "balcon",
    "balcony",
    "piso",
    "floor",
    "edificio",
    "building",
    "conserje",
    "porter",
    "clave",
    "key",
    "check-in",
    "checkin",
    "anfitrión",
    "anfitrion",
    "host",
    "huesped",
    "huespedes",
    "guest",
    "guests",
    "alojamiento",
    "accommodation",
];

const HOTEL_KEYWORDS: &[&str] = &[
    "hotel",
    "hospedaje",
    "lodging",
    "habitación",
    "habitacion",
    "room",
    "suite",
    "lobby",
    "recepción",
    "recepcion",
    "reception",
    "gimnasio",
    "gym",
    "spa",
    "piscina",
    "pool",
    "restaurante",
    "restaurant",
    "bar",
    "concierge",
    "valet",
    "parking",
    "estacionamiento",
    "wifi",
    "internet",
    "tv",
    "television",
    "aire",
    "ac",
    "climatización",
    "climatizacion",
    "servicio",
    "service",
    "limpieza",
    "cleaning",
    "room service",
    "desayuno",
    "breakfast",
    "ocupación",
    "ocupacion",
];

const OTHER_KEYWORDS: &[&str] = &[
    "otro",
    "other",
    "diferente",
    "different",
    "especial",
    "special",
    "único",
    "unico",
    "unique",
    "personalizado",
    "personalized",
    "custom",
    "específico",
    "especifico",
    "particular",
    "especializado",
    "especialista",
    "experto",
    "expert",
    "profesional",
    "professional",
];

// Declaration order doubles as tie-break priority.
const CATEGORY_KEYWORDS: [(ServiceKind, &[&str]); 5] = [
    (ServiceKind::Restaurante, RESTAURANT_KEYWORDS),
    (ServiceKind::VenueEventos, VENUE_KEYWORDS),
    (ServiceKind::AirbnbArriendo, AIRBNB_KEYWORDS),
    (ServiceKind::Hotel, HOTEL_KEYWORDS),
    (ServiceKind::Otro, OTHER_KEYWORDS),
];

const URGENCY_KEYWORDS: &[&str] = &[
    "urgente",
    "urgent",
    "rápido",
    "rapido",
    "fast",
    "inmediato",
    "immediate",
    "hoy",
    "mañana",
];

const TIMEFRAMES: &[&str] = &[
    "esta semana",
    "próxima semana",
    "proxima semana",
    "este mes",
    "próximo mes",
    "proximo mes",
    "pronto",
    "rápido",
    "rapido",
];

static BUDGET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:presupuesto|budget|precio|price|valor|value|cost)\s*(?:de\s*)?(?:aproximadamente\s*)?(?:alrededor\s*de\s*)?(\d+(?:\.\d+)?(?:\s*(?:mil|k|millones|m))?)",
    )
    .unwrap_or_else(|e| panic!("budget regex: {e}"))
});
static LOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:en|ubicado en|situado en|localizado en)\s+([a-zA-ZáéíóúÁÉÍÓÚñÑ\s\-]+?)(?:\s|,|\.|$)",
    )
    .unwrap_or_else(|e| panic!("location regex: {e}"))
});

#[derive(Debug, Clone)]
pub struct Classification {
    pub kind: ServiceKind,
    pub confidence: f64,
    pub matched: Vec<&'static str>,
}

pub fn classify_service(text: &str) -> Classification {
    let lower = text.to_lowercase();
    let mut best_kind = ServiceKind::Otro;
    let mut best_score = 0usize;
    let mut best_list_len = 1usize;
    let mut best_matched: Vec<&'static str> = Vec::new();

    for (kind, keywords) in CATEGORY_KEYWORDS {
        let matched: Vec<&'static str> = keywords
            .iter()
            .copied()
            .filter(|keyword| lower.contains(keyword))
            .collect();
        if matched.len() > best_score {
            best_score = matched.len();
            best_kind = kind;
            best_list_len = keywords.len();
            best_matched = matched;
        }
    }

    let confidence = if best_score == 0 {
        0.0
    } else {
        (best_score as f64 / best_list_len as f64).min(1.0)
    };

    Classification {
        kind: best_kind,
        confidence,
        matched: best_matched,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageContext {
    pub urgent: bool,
    pub budget: Option<String>,
    pub location: Option<String>,
    pub timeframe: Option<&'static str>,
}

pub fn extract_context(text: &str) -> MessageContext {
    let lower = text.to_lowercase();

    let budget = BUDGET
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string());
    let location = LOCATION
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|value| !value.is_empty());
    let timeframe = TIMEFRAMES
        .iter()
        .copied()
        .find(|phrase| lower.contains(phrase));

    MessageContext {
        urgent: contains_any(&lower, URGENCY_KEYWORDS),
        budget,
        location,
        timeframe,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavCommand {
    Menu,
    Back,
    Reset,
    Human,
}

const MENU_WORDS: &[&str] = &["menú", "menu", "inicio", "start", "comenzar", "begin"];
const BACK_WORDS: &[&str] = &["atrás", "atras", "back", "anterior", "previous"];
const RESET_WORDS: &[&str] = &["reiniciar", "reset", "nuevo", "new", "otra vez", "again"];
const HUMAN_WORDS: &[&str] = &[
    "humano",
    "human",
    "persona",
    "person",
    "representante",
    "representative",
];

pub fn nav_command(text: &str) -> Option<NavCommand> {
    let lower = text.trim().to_lowercase();
    // Fixed check order resolves inputs that hit several lists.
    if contains_any(&lower, MENU_WORDS) {
        return Some(NavCommand::Menu);
    }
    if contains_any(&lower, BACK_WORDS) {
        return Some(NavCommand::Back);
    }
    if contains_any(&lower, RESET_WORDS) {
        return Some(NavCommand::Reset);
    }
    if contains_any(&lower, HUMAN_WORDS) {
        return Some(NavCommand::Human);
    }
    None
}

fn contains_any(input: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| input.contains(needle))
}
