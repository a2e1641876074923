//! WhatsApp message templates.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::models::{Charge, NotificationType, Profile};
use crate::utils::format::{first_name, format_amount, format_date};

const DEFAULT_SENDER: &str = "o(a) prestador(a)";

/// Values interpolated into a message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageContext<'a> {
    pub client_name: &'a str,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub sender_name: Option<&'a str>,
    pub pix_key: Option<&'a str>,
}

impl<'a> MessageContext<'a> {
    pub fn new(charge: &Charge, client_name: &'a str, sender: Option<&'a Profile>) -> Self {
        Self {
            client_name,
            amount: charge.amount,
            due_date: charge.due_date,
            sender_name: sender
                .and_then(|p| p.full_name.as_deref())
                .map(str::trim)
                .filter(|name| !name.is_empty()),
            pix_key: sender.and_then(Profile::pix_key),
        }
    }
}

pub fn compose(kind: NotificationType, ctx: &MessageContext<'_>) -> String {
    let client = first_name(ctx.client_name);
    let amount = format_amount(ctx.amount);

    match kind {
        NotificationType::Reception => format!(
            "Olá, aqui é da PingPague, plataforma responsável por automatizar as cobranças do(a) {}. \
             Foi registrada uma cobrança no valor de R$ {} em seu nome. \
             Fique tranquilo(a), próximo à data de vencimento lhe enviaremos um lembrete automático.",
            ctx.sender_name.unwrap_or(DEFAULT_SENDER),
            amount,
        ),
        NotificationType::Reminder => format!(
            "Olá {}! Lembrete: sua cobrança de R$ {} vence em 2 dias ({}).{}",
            client,
            amount,
            format_date(ctx.due_date),
            pix_suffix(ctx.pix_key, "Chave PIX para pagamento"),
        ),
        NotificationType::Overdue => format!(
            "Olá {}! Sua cobrança de R$ {} está vencida desde {}. Por favor, regularize seu pagamento.{}",
            client,
            amount,
            format_date(ctx.due_date),
            pix_suffix(ctx.pix_key, "Chave PIX para pagamento"),
        ),
        NotificationType::PaymentConfirmed => format!(
            "Pagamento confirmado! Obrigado, {}! Recebemos seu pagamento de R$ {}.{}",
            client,
            amount,
            pix_suffix(ctx.pix_key, "Chave PIX"),
        ),
    }
}

fn pix_suffix(pix_key: Option<&str>, label: &str) -> String {
    match pix_key {
        Some(key) => format!("\n\n{}: {}", label, key),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn context(pix_key: Option<&'static str>) -> MessageContext<'static> {
        MessageContext {
            client_name: "Maria Souza",
            amount: Decimal::from_str("150.5").unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, 3, 7).unwrap(),
            sender_name: Some("Ana Lima"),
            pix_key,
        }
    }

    #[test]
    fn test_reminder_with_pix_key() {
        let message = compose(NotificationType::Reminder, &context(Some("ana@pix.com")));
        assert_eq!(
            message,
            "Olá Maria! Lembrete: sua cobrança de R$ 150,50 vence em 2 dias (07/03/2024).\
             \n\nChave PIX para pagamento: ana@pix.com"
        );
    }

    #[test]
    fn test_overdue_without_pix_key() {
        let message = compose(NotificationType::Overdue, &context(None));
        assert_eq!(
            message,
            "Olá Maria! Sua cobrança de R$ 150,50 está vencida desde 07/03/2024. \
             Por favor, regularize seu pagamento."
        );
    }

    #[test]
    fn test_payment_confirmed() {
        let message = compose(NotificationType::PaymentConfirmed, &context(Some("123")));
        assert!(message.starts_with("Pagamento confirmado! Obrigado, Maria!"));
        assert!(message.contains("R$ 150,50"));
        assert!(message.ends_with("\n\nChave PIX: 123"));
    }

    #[test]
    fn test_reception_uses_sender_name() {
        let message = compose(NotificationType::Reception, &context(Some("123")));
        assert!(message.contains("cobranças do(a) Ana Lima."));
        assert!(message.contains("R$ 150,50"));
        assert!(!message.contains("Chave PIX"));

        let mut anonymous = context(None);
        anonymous.sender_name = None;
        let message = compose(NotificationType::Reception, &anonymous);
        assert!(message.contains("do(a) o(a) prestador(a)."));
    }
}
