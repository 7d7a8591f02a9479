use chrono::{Datelike, Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

static DAY_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})[/-](\d{1,2})$").unwrap_or_else(|e| panic!("day/month regex: {e}"))
});
static PLAIN_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+$").unwrap_or_else(|e| panic!("count regex: {e}")));
static COUNT_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)\s*-\s*(\d+)$").unwrap_or_else(|e| panic!("range regex: {e}"))
});
static URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s]+").unwrap_or_else(|e| panic!("url regex: {e}")));
static COMUNA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-ZáéíóúÁÉÍÓÚñÑ\s\-]+$").unwrap_or_else(|e| panic!("comuna regex: {e}"))
});
static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap_or_else(|e| panic!("email regex: {e}"))
});

const NUMBER_WORDS: [(&str, u32); 10] = [
    ("uno", 1),
    ("dos", 2),
    ("tres", 3),
    ("cuatro", 4),
    ("cinco", 5),
    ("seis", 6),
    ("siete", 7),
    ("ocho", 8),
    ("nueve", 9),
    ("diez", 10),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDate {
    pub date: NaiveDate,
    pub display: String,
}

pub fn parse_date(input: &str, today: NaiveDate) -> Option<ParsedDate> {
    let lower = input.trim().to_lowercase();

    let relative_days = match lower.as_str() {
        "hoy" => Some(0),
        "mañana" => Some(1),
        "esta semana" => Some(3),
        "próxima semana" | "proxima semana" => Some(10),
        _ => None,
    };
    if let Some(days) = relative_days {
        return Some(ParsedDate {
            date: today + Duration::days(days),
            display: lower,
        });
    }

    let caps = DAY_MONTH.captures(&lower)?;
    let day: u32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u32 = caps.get(2)?.as_str().parse().ok()?;
    if !(1..=31).contains(&day) || !(1..=12).contains(&month) {
        return None;
    }

    // A date earlier in the current year rolls into next year. Pairs that do
    // not form a real calendar date in either year are rejected.
    let date = NaiveDate::from_ymd_opt(today.year(), month, day)
        .filter(|candidate| *candidate >= today)
        .or_else(|| NaiveDate::from_ymd_opt(today.year() + 1, month, day))?;

    Some(ParsedDate {
        date,
        display: format!("{}/{}", day, month),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountReply {
    Exact(u32),
    Range { min: u32, max: u32 },
}

impl CountReply {
    pub fn effective(self) -> u32 {
        match self {
            Self::Exact(value) => value,
            Self::Range { min, .. } => min,
        }
    }
}

pub fn parse_count(input: &str) -> Option<CountReply> {
    let lower = input.trim().to_lowercase();

    for (word, value) in NUMBER_WORDS {
        if lower == word {
            return Some(CountReply::Exact(value));
        }
    }

    if PLAIN_COUNT.is_match(&lower) {
        let value: u32 = lower.parse().ok()?;
        if value > 0 {
            return Some(CountReply::Exact(value));
        }
        return None;
    }

    if let Some(caps) = COUNT_RANGE.captures(&lower) {
        let min: u32 = caps.get(1)?.as_str().parse().ok()?;
        let max: u32 = caps.get(2)?.as_str().parse().ok()?;
        if min > 0 && max >= min {
            return Some(CountReply::Range { min, max });
        }
    }

    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    GoogleMaps,
    Airbnb,
    Instagram,
    Web,
}

impl LinkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GoogleMaps => "google_maps",
            Self::Airbnb => "airbnb",
            Self::Instagram => "instagram",
            Self::Web => "web",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedUrl {
    pub url: String,
    pub kind: LinkKind,
}

pub fn extract_url(text: &str) -> Option<ExtractedUrl> {
    let url = URL.find(text)?.as_str().to_string();
    let lower = url.to_lowercase();
    let kind = if lower.contains("google.com/maps") || lower.contains("maps.google.com") {
        LinkKind::GoogleMaps
    } else if lower.contains("airbnb.com") || lower.contains("airbnb.cl") {
        LinkKind::Airbnb
    } else if lower.contains("instagram.com") {
        LinkKind::Instagram
    } else {
        LinkKind::Web
    };
    Some(ExtractedUrl { url, kind })
}

pub fn validate_comuna(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.chars().count() < 2 || !COMUNA.is_match(trimmed) {
        return None;
    }
    Some(trimmed.to_string())
}

pub fn validate_email(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if EMAIL.is_match(trimmed) {
        Some(trimmed.to_string())
    } else {
        None
    }
}

pub fn validate_rut(input: &str) -> Option<String> {
    let clean: Vec<char> = input
        .trim()
        .chars()
        .filter(|ch| *ch != '.' && *ch != '-')
        .collect();
    if clean.len() != 9 {
        return None;
    }
    let digits: String = clean[..8].iter().collect();
    if !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    let given = clean[8].to_ascii_uppercase();
    let expected = compute_rut_check_digit(&digits)?;
    if given != expected {
        return None;
    }
    Some(format!("{}-{}", digits, expected))
}

pub fn compute_rut_check_digit(digits: &str) -> Option<char> {
    if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    let mut sum: u32 = 0;
    let mut multiplier = 2;
    for ch in digits.chars().rev() {
        sum += ch.to_digit(10)? * multiplier;
        multiplier = if multiplier == 7 { 2 } else { multiplier + 1 };
    }
    Some(match 11 - (sum % 11) {
        11 => '0',
        10 => 'K',
        value => char::from_digit(value, 10)?,
    })
}
