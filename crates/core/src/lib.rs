pub mod classify;
pub mod flow;
pub mod models;
pub mod pricing;
pub mod validators;

pub use classify::{classify_service, extract_context, nav_command, Classification, NavCommand};
pub use flow::{
    is_contact_field, next_contact_field, next_intake_field, quote_ready, AnswerSet, AnswerValue,
    FieldId,
};
pub use models::*;
pub use pricing::{calculate_quote, format_clp, render_summary, Quote, QuoteRequest};
pub use validators::{
    extract_url, parse_count, parse_date, validate_comuna, validate_email, validate_rut,
    CountReply, ExtractedUrl, LinkKind, ParsedDate,
};
