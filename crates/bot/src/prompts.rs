//! Every message the bot sends, in one place. The conversation logic in
//! `lib.rs` decides *when* to speak; this module owns the wording.

use chrono::{Datelike, NaiveDate};
use vista_core::{BusinessInfo, EditLevel, FieldId, Lead, ServiceKind};
use vista_wa::{ListRow, ListSection, ReplyButton};

pub(crate) const ESPACIOS_QUESTION: &str =
    "¿Cuántos espacios o ambientes necesitas que fotografiemos?";
pub(crate) const EDITION_QUESTION: &str = "¿Qué tipo de edición necesitas?\n\n\
     • Básica: recorrido limpio y navegable\n\
     • Avanzada (+25%): retoques finos y branding";
pub(crate) const EMBED_QUESTION: &str = "¿Necesitas el embed listo para tu web?";
pub(crate) const DELIVERY_QUESTION: &str = "¿Cuál es el plazo de entrega que necesitas?";
pub(crate) const DOCUMENT_QUESTION: &str = "¿Necesitas factura o boleta?";

pub(crate) const INVALID_COMUNA: &str = "Por favor, ingresa una comuna o ciudad válida.";
pub(crate) const INVALID_DATE: &str = "Por favor, ingresa una fecha válida. Puedes usar: \
     \"hoy\", \"mañana\", \"esta semana\", \"próxima semana\" o una fecha como 15/12";
pub(crate) const INVALID_LINK: &str =
    "Por favor, ingresa un link válido o escribe \"no\" si no tienes uno.";
pub(crate) const INVALID_COUNT: &str = "Por favor, ingresa un número válido de espacios.";
pub(crate) const INVALID_EDITION: &str = "Por favor, elige entre \"Básica\" o \"Avanzada\".";
pub(crate) const INVALID_YES_NO: &str = "Por favor, responde \"sí\" o \"no\".";
pub(crate) const INVALID_DELIVERY: &str = "Por favor, elige entre \"Normal\" o \"Urgente\".";
pub(crate) const INVALID_EMAIL: &str = "Por favor, ingresa un correo electrónico válido.";
pub(crate) const INVALID_RUT: &str = "Por favor, ingresa un RUT válido en formato 12345678-9";
pub(crate) const INVALID_SCHEDULE_DATE: &str = "No pude entender esa fecha. \
     Usa una de las opciones que te di o escribe la fecha en formato 15/12.";

pub(crate) const CONFIRM_REPROMPT: &str = "Por favor, responde \"sí\" para continuar \
     con la cotización o \"editar\" si quieres cambiar algo.";
pub(crate) const PRICING_REPROMPT: &str = "Por favor, elige una opción:\n\
     • \"Agendar\" para continuar\n\
     • \"Editar datos\" para cambiar algo\n\
     • \"Hablar con humano\" para contacto directo";
pub(crate) const CONTACT_INTRO: &str = "¡Excelente! Ahora necesito algunos datos de \
     contacto para agendar tu sesión.\n\n¿Cuál es tu nombre y cargo?";
pub(crate) const EDIT_HINT: &str = "Perfecto, vamos a editar los datos.\n\n\
     Escribe \"atrás\" para corregir la última respuesta (puedes repetirlo) \
     o \"reiniciar\" para empezar desde cero.";
pub(crate) const FACTURA_FOLLOWUP: &str =
    "Perfecto. Para la factura necesito:\n\n¿Cuál es la razón social?";
pub(crate) const UNKNOWN_OPTION: &str = "No reconozco esa opción. Por favor, usa los \
     botones disponibles o escribe tu respuesta.";
pub(crate) const IMAGE_ACK: &str =
    "📸 ¡Perfecto! Recibí tu imagen y la agregué a tu solicitud. Continuemos.";
pub(crate) const IMAGE_ERROR: &str = "Hubo un problema al procesar tu imagen. \
     Por favor, continúa con la cotización o envíala nuevamente.";

const WEEKDAYS: [&str; 7] = [
    "lunes",
    "martes",
    "miércoles",
    "jueves",
    "viernes",
    "sábado",
    "domingo",
];
const MONTHS: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

pub(crate) fn welcome_body(business: &BusinessInfo) -> String {
    format!(
        "¡Hola! Soy el asistente de {}. Te ayudo a cotizar tu Tour 360.\n\nElige una opción:",
        business.name
    )
}

pub(crate) fn service_sections() -> Vec<ListSection> {
    let rows = ServiceKind::all()
        .into_iter()
        .map(|kind| ListRow::new(kind.as_id(), kind.label()).with_description(service_hint(kind)))
        .collect();
    vec![ListSection {
        title: "Tipo de espacio".to_string(),
        rows,
    }]
}

fn service_hint(kind: ServiceKind) -> &'static str {
    match kind {
        ServiceKind::Restaurante => "Locales gastronómicos",
        ServiceKind::VenueEventos => "Centros de eventos y salones",
        ServiceKind::AirbnbArriendo => "Propiedades en arriendo",
        ServiceKind::Hotel => "Hoteles y alojamientos",
        ServiceKind::Otro => "Otro tipo de espacio",
    }
}

pub(crate) fn service_selected(kind: ServiceKind) -> String {
    format!(
        "Perfecto, has seleccionado: {}\n\nAhora necesito algunos datos para \
         cotizar tu tour 360. Empecemos con lo básico:",
        kind.label()
    )
}

pub(crate) fn question_text(field: FieldId) -> &'static str {
    match field {
        FieldId::Comuna => "¿En qué comuna o ciudad se encuentra el lugar?",
        FieldId::Direccion => "¿Puedes darme la dirección o una referencia del lugar? (opcional)",
        FieldId::Fecha => {
            "¿Para cuándo necesitas el tour 360?\n\nPuedes decir: \"hoy\", \"mañana\", \
             \"esta semana\", \"próxima semana\" o una fecha específica como \"15/12\""
        }
        FieldId::Link => {
            "¿Tienes algún link del lugar? (web, Google Maps, Airbnb, Instagram)\n\n\
             Si no tienes, escribe \"no\" o \"ninguno\""
        }
        FieldId::Espacios => ESPACIOS_QUESTION,
        FieldId::Edicion => EDITION_QUESTION,
        FieldId::Embed => EMBED_QUESTION,
        FieldId::Urgente => DELIVERY_QUESTION,
        FieldId::Presupuesto => {
            "¿Tienes un presupuesto referencial en mente? (opcional)\n\n\
             Si no tienes uno específico, escribe \"no\" o \"ninguno\""
        }
        FieldId::Nombre => "¿Cuál es tu nombre y cargo?",
        FieldId::Correo => "¿Cuál es tu correo electrónico?",
        FieldId::Documento => DOCUMENT_QUESTION,
        FieldId::RazonSocial => "¿Cuál es la razón social para la factura?",
        FieldId::Rut => "¿Cuál es el RUT de la empresa?",
        FieldId::FechaAgendada => "¿Qué fecha te acomoda para la sesión?",
    }
}

pub(crate) fn edition_buttons() -> Vec<ReplyButton> {
    vec![
        ReplyButton::new("basica", "Básica"),
        ReplyButton::new("avanzada", "Avanzada"),
    ]
}

pub(crate) fn embed_buttons() -> Vec<ReplyButton> {
    vec![
        ReplyButton::new("si_embed", "Sí"),
        ReplyButton::new("no_embed", "No"),
    ]
}

pub(crate) fn delivery_buttons() -> Vec<ReplyButton> {
    vec![
        ReplyButton::new("normal", "Normal (48-72h)"),
        ReplyButton::new("urgente", "Urgente (<24h)"),
    ]
}

pub(crate) fn document_buttons() -> Vec<ReplyButton> {
    vec![
        ReplyButton::new("boleta", "Boleta"),
        ReplyButton::new("factura", "Factura"),
    ]
}

pub(crate) fn pricing_buttons() -> Vec<ReplyButton> {
    vec![
        ReplyButton::new("agendar", "Agendar"),
        ReplyButton::new("editar_datos", "Editar datos"),
        ReplyButton::new("hablar_humano", "Hablar con humano"),
    ]
}

pub(crate) fn espacios_sections() -> Vec<ListSection> {
    let rows = vec![
        ListRow::new("espacios_1", "1 espacio").with_description("Un solo ambiente"),
        ListRow::new("espacios_2", "2 espacios").with_description("Dos ambientes"),
        ListRow::new("espacios_3", "3 espacios").with_description("Tres ambientes"),
        ListRow::new("espacios_4", "4 espacios").with_description("Cuatro ambientes"),
        ListRow::new("espacios_5", "5+ espacios").with_description("Cinco o más ambientes"),
    ];
    vec![ListSection {
        title: "Cantidad de espacios".to_string(),
        rows,
    }]
}

pub(crate) fn data_summary(lead: &Lead) -> String {
    let answers = &lead.answers;
    let service = lead
        .service
        .map(ServiceKind::label)
        .unwrap_or("Sin clasificar");
    let espacios = answers
        .count(FieldId::Espacios)
        .map(|n| n.to_string())
        .unwrap_or_else(|| "-".to_string());

    format!(
        "Perfecto. Resumen:\n\
         • Tipo: {service}\n\
         • Comuna: {comuna}\n\
         • Dirección/ref: {direccion}\n\
         • Fecha tentativa: {fecha}\n\
         • Espacios/ambientes: {espacios}\n\
         • Edición: {edicion}\n\
         • Embed web: {embed}\n\
         • Urgencia: {urgencia}\n\n\
         ¿Está bien? Responde \"sí\" para cotizar o \"editar\" para cambiar algo.",
        comuna = answers.text(FieldId::Comuna).unwrap_or("-"),
        direccion = answers.text(FieldId::Direccion).unwrap_or("No especificada"),
        fecha = answers.text(FieldId::Fecha).unwrap_or("-"),
        edicion = answers.edition().map(EditLevel::label).unwrap_or("Básica"),
        embed = if answers.flag(FieldId::Embed).unwrap_or(false) {
            "Sí"
        } else {
            "No"
        },
        urgencia = if answers.flag(FieldId::Urgente).unwrap_or(false) {
            "Urgente"
        } else {
            "Normal"
        },
    )
}

pub(crate) fn spanish_date_long(date: NaiveDate) -> String {
    let weekday = WEEKDAYS[date.weekday().num_days_from_monday() as usize];
    let month = MONTHS[date.month0() as usize];
    format!("{weekday} {} de {month}", date.day())
}

pub(crate) fn schedule_offer(dates: &[NaiveDate]) -> String {
    let mut lines = vec![
        "¡Perfecto! Ahora vamos a agendar tu sesión.".to_string(),
        String::new(),
        "Te puedo ofrecer estas fechas:".to_string(),
    ];
    for date in dates {
        lines.push(format!(
            "• {} ({}/{})",
            spanish_date_long(*date),
            date.day(),
            date.month()
        ));
    }
    lines.push(String::new());
    lines.push(
        "¿Cuál te funciona mejor? Responde con la fecha en formato día/mes, \
         o escribe \"hoy\" o \"mañana\"."
            .to_string(),
    );
    lines.join("\n")
}

pub(crate) fn scheduled_confirmation(display: &str, business: &BusinessInfo) -> String {
    format!(
        "🎉 ¡Perfecto! Tu sesión ha sido agendada.\n\n\
         📅 Fecha: {display}\n\
         📍 Lugar: te contactaremos para coordinar la dirección exacta\n\
         ⏰ Hora: te enviaremos la hora por WhatsApp\n\n\
         ¡Gracias por elegir {}! Nuestro equipo se pondrá en contacto contigo \
         para confirmar los detalles.",
        business.name
    )
}

pub(crate) fn handoff_text(business: &BusinessInfo) -> String {
    format!(
        "¡Por supuesto! Un representante de {} se pondrá en contacto contigo pronto.\n\n\
         📞 Teléfono: {}\n\
         🌐 Website: {}\n\n\
         Mientras tanto, tu información queda guardada para que no tengas que repetirla.",
        business.name, business.phone, business.website
    )
}

pub(crate) fn unsupported_kind(kind: &str) -> String {
    format!(
        "Recibí un mensaje de tipo \"{kind}\" que aún no puedo procesar. \
         Por favor, envía texto o usa los botones disponibles."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spanish_dates_use_local_names() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 12).unwrap();
        assert_eq!(spanish_date_long(date), "miércoles 12 de marzo");
    }

    #[test]
    fn service_menu_lists_every_kind() {
        let sections = service_sections();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].rows.len(), 5);
        assert_eq!(sections[0].rows[0].id, "restaurante");
        assert_eq!(sections[0].rows[4].id, "otro");
    }

    #[test]
    fn summary_shows_collected_answers() {
        use vista_core::{AnswerValue, Lead};

        let mut lead = Lead::new("56911112222");
        lead.service = Some(ServiceKind::Restaurante);
        lead.answers
            .set(FieldId::Comuna, AnswerValue::Text("Ñuñoa".into()));
        lead.answers
            .set(FieldId::Fecha, AnswerValue::Text("mañana".into()));
        lead.answers.set(FieldId::Espacios, AnswerValue::Count(3));
        lead.answers
            .set(FieldId::Edicion, AnswerValue::Edition(EditLevel::Avanzada));
        lead.answers.set(FieldId::Embed, AnswerValue::Flag(true));
        lead.answers.set(FieldId::Urgente, AnswerValue::Flag(false));

        let summary = data_summary(&lead);
        assert!(summary.contains("Tipo: Restaurante"));
        assert!(summary.contains("Comuna: Ñuñoa"));
        assert!(summary.contains("Dirección/ref: No especificada"));
        assert!(summary.contains("Edición: Avanzada"));
        assert!(summary.contains("Embed web: Sí"));
        assert!(summary.contains("Urgencia: Normal"));
    }
}
