use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::models::EditLevel;

pub const BASE_VISIT: i64 = 40_000;
pub const PER_SPACE: i64 = 15_000;
pub const ADVANCED_EDIT_PCT: f64 = 0.25;
pub const EMBED_FLAT: i64 = 20_000;
pub const URGENT_PCT: f64 = 0.20;
pub const HOSTING_ANNUAL: i64 = 250_000;

// Ordered bands; the first matching comuna pattern wins.
static DISPLACEMENT_ZONES: Lazy<Vec<(Regex, f64)>> = Lazy::new(|| {
    [
        (r"(?i)Las Condes|Providencia|Ñuñoa|Santiago", 0.00),
        (
            r"(?i)Maipú|La Florida|Puente Alto|Huechuraba|Quilicura",
            0.05,
        ),
        (r"(?i)Colina|Lampa|Padre Hurtado|Talagante|Peñaflor", 0.08),
        (r"(?i)Valparaíso|Viña del Mar|Rancagua|Quillota", 0.12),
    ]
    .into_iter()
    .map(|(pattern, pct)| {
        (
            Regex::new(pattern).unwrap_or_else(|e| panic!("zone regex: {e}")),
            pct,
        )
    })
    .collect()
});

#[derive(Debug, Clone, Serialize)]
pub struct QuoteRequest {
    pub spaces: u32,
    pub edition: EditLevel,
    pub embed: bool,
    pub urgent: bool,
    pub comuna: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub subtotal: f64,
    pub base_visit: i64,
    pub spaces: u32,
    pub spaces_total: i64,
    pub surcharge_lines: Vec<String>,
    pub displacement_pct: f64,
    pub min: i64,
    pub max: i64,
    pub hosting_annual: i64,
}

pub fn displacement_pct(comuna: &str) -> f64 {
    for (pattern, pct) in DISPLACEMENT_ZONES.iter() {
        if pattern.is_match(comuna) {
            return *pct;
        }
    }
    0.0
}

pub fn calculate_quote(request: &QuoteRequest) -> Quote {
    let spaces_total = PER_SPACE * i64::from(request.spaces);
    let mut subtotal = (BASE_VISIT + spaces_total) as f64;
    let mut surcharge_lines = Vec::new();

    // Order is load-bearing: edition multiplies the base work, the embed fee
    // is flat, urgency multiplies everything accumulated so far and the
    // displacement percentage applies to the final figure.
    if request.edition == EditLevel::Avanzada {
        let extra = subtotal * ADVANCED_EDIT_PCT;
        surcharge_lines.push(format!(
            "• Edición avanzada (+25%): {}",
            format_clp(extra.round() as i64)
        ));
        subtotal += extra;
    }

    if request.embed {
        surcharge_lines.push(format!("• Embed web: {}", format_clp(EMBED_FLAT)));
        subtotal += EMBED_FLAT as f64;
    }

    if request.urgent {
        let extra = subtotal * URGENT_PCT;
        surcharge_lines.push(format!(
            "• Entrega urgente (+20%): {}",
            format_clp(extra.round() as i64)
        ));
        subtotal += extra;
    }

    let pct = displacement_pct(&request.comuna);
    if pct > 0.0 {
        let extra = subtotal * pct;
        surcharge_lines.push(format!(
            "• Desplazamiento (+{}%): {}",
            (pct * 100.0).round() as i64,
            format_clp(extra.round() as i64)
        ));
        subtotal += extra;
    }

    Quote {
        subtotal,
        base_visit: BASE_VISIT,
        spaces: request.spaces,
        spaces_total,
        surcharge_lines,
        displacement_pct: pct,
        min: round_to_thousand(subtotal * 0.95),
        max: round_to_thousand(subtotal * 1.15),
        hosting_annual: HOSTING_ANNUAL,
    }
}

pub fn render_summary(quote: &Quote) -> String {
    let mut lines = vec![
        "💰 *Estimación de tu Tour 360:*".to_string(),
        String::new(),
        format!("• Visita y logística: {}", format_clp(quote.base_visit)),
        format!(
            "• {} espacio(s): {}",
            quote.spaces,
            format_clp(quote.spaces_total)
        ),
    ];
    lines.extend(quote.surcharge_lines.iter().cloned());
    lines.push("---------------------------".to_string());
    lines.push(format!(
        "*Total estimado: entre {} y {} CLP*",
        format_clp(quote.min),
        format_clp(quote.max)
    ));
    lines.push(String::new());
    lines.push(format!(
        "Opcional: hosting y soporte anual del tour: {} CLP",
        format_clp(quote.hosting_annual)
    ));
    lines.push(String::new());
    lines.push("¿Agendamos? Puedo ofrecerte fechas próximas.".to_string());
    lines.join("\n")
}

// Half-up at the thousand mark: $80.500 quotes as $81.000, not $80.000.
// Rounding to whole pesos first keeps float residue out of the boundary.
fn round_to_thousand(value: f64) -> i64 {
    let pesos = value.round() as i64;
    ((pesos + 500) / 1000) * 1000
}

pub fn format_clp(amount: i64) -> String {
    let digits = amount.abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    if amount < 0 {
        format!("-${}", grouped)
    } else {
        format!("${}", grouped)
    }
}
