use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Named message templates sent to patients. Values are the
/// notification_type column (smallint).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum TemplateKind {
    AppointmentReminder = 0,
    ConfirmationRequest = 1,
    AppointmentConfirmed = 2,
    PaymentReminder = 3,
    PaymentReceipt = 4,
    PostCareInstructions = 5,
    FaqResponse = 6,
    NoShowNotice = 7,
    GeneralInfo = 8,
}

/// Dates the way the clinic writes them to patients.
pub fn format_date_br(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

pub fn format_time_br(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Money in reais from integer cents.
pub fn format_brl(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

const SIGNATURE: &str = "Unicidental 🦷";

pub fn appointment_reminder(
    patient_name: &str,
    date: NaiveDate,
    time: NaiveTime,
    dentist_name: &str,
) -> String {
    format!(
        "Olá {patient_name}!\n\n\
         Lembrete: Você tem uma consulta agendada!\n\n\
         📅 Data: {}\n\
         ⏰ Hora: {}\n\
         🏥 Dentista: {dentist_name}\n\n\
         Por favor, confirme sua presença respondendo com SIM ou clique aqui para confirmar no nosso portal.\n\n\
         Dúvidas? Fale conosco!\n\
         {SIGNATURE}",
        format_date_br(date),
        format_time_br(time),
    )
}

pub fn confirmation_request(patient_name: &str, date: NaiveDate, time: NaiveTime) -> String {
    format!(
        "Olá {patient_name}!\n\n\
         Confirme sua consulta agendada para:\n\
         📅 {} às {}\n\n\
         Responda SIM para confirmar ou NÃO para cancelar.\n\n\
         Se precisar remarcar, fale conosco pelo WhatsApp.\n\n\
         {SIGNATURE}",
        format_date_br(date),
        format_time_br(time),
    )
}

pub fn appointment_confirmed(
    date: NaiveDate,
    time: NaiveTime,
    location: &str,
    procedure_name: &str,
    dentist_name: &str,
) -> String {
    format!(
        "Olá! Sua consulta foi confirmada!\n\n\
         Detalhes da sua consulta:\n\
         📅 Data: {}\n\
         🕐 Horário: {}\n\
         🏥 Local: {location}\n\
         🦷 Procedimento: {procedure_name}\n\
         👨‍⚕️ Dentista: Dr. {dentist_name}\n\n\
         Chegue 10 minutos antes do horário marcado.\n\
         Dúvidas? Entre em contato conosco!\n\n\
         Unicidental - Clínica Odontológica",
        format_date_br(date),
        format_time_br(time),
    )
}

pub fn payment_reminder(patient_name: &str, amount_cents: i64, due_date: NaiveDate) -> String {
    format!(
        "Olá {patient_name}!\n\n\
         Você tem um pagamento pendente:\n\n\
         💰 Valor: R$ {}\n\
         📅 Vencimento: {}\n\n\
         Clique aqui para pagar ou fale conosco para parcelar.\n\n\
         {SIGNATURE}",
        format_brl(amount_cents),
        format_date_br(due_date),
    )
}

pub fn payment_receipt(patient_name: &str, amount_cents: i64) -> String {
    format!(
        "Olá {patient_name}!\n\n\
         Seu pagamento de R$ {} foi registrado com sucesso!\n\n\
         Obrigado! 🦷\n\
         Unicidental",
        format_brl(amount_cents),
    )
}

pub fn post_care_instructions(patient_name: &str, instructions: &str) -> String {
    format!(
        "Olá {patient_name}!\n\n\
         Cuidados pós-procedimento:\n\n\
         {instructions}\n\n\
         Em caso de dúvidas, nos contacte imediatamente.\n\n\
         {SIGNATURE}"
    )
}

pub fn faq_response(patient_name: &str, question: &str, answer: &str) -> String {
    format!(
        "Olá {patient_name}!\n\n\
         Sua pergunta: \"{question}\"\n\n\
         Resposta:\n\
         {answer}\n\n\
         Tem mais dúvidas? Responda aqui ou visite nosso portal.\n\n\
         {SIGNATURE}"
    )
}

pub fn no_show_notice(patient_name: &str) -> String {
    format!(
        "Olá {patient_name}!\n\n\
         Notamos que você não compareceu à sua consulta.\n\n\
         Para remarcar, por favor:\n\
         1. Visite nosso portal\n\
         2. Ou responda este WhatsApp\n\
         3. Ou ligue para a clínica\n\n\
         Ficamos na espera de seu agendamento!\n\n\
         {SIGNATURE}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    fn nine() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap()
    }

    #[test]
    fn brl_formatting() {
        assert_eq!(format_brl(15000), "150.00");
        assert_eq!(format_brl(509), "5.09");
        assert_eq!(format_brl(0), "0.00");
    }

    #[test]
    fn reminder_carries_slot_details() {
        let msg = appointment_reminder("Ana", monday(), nine(), "Carla Souza");
        assert!(msg.contains("Ana"));
        assert!(msg.contains("10/03/2025"));
        assert!(msg.contains("09:00"));
        assert!(msg.contains("Carla Souza"));
    }

    #[test]
    fn receipt_shows_amount() {
        let msg = payment_receipt("Bruno", 25050);
        assert!(msg.contains("R$ 250.50"));
    }
}
