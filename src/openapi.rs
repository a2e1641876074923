use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "PingPague API",
        version = "1.0.0",
        description = "Backend da PingPague - cobranças recorrentes com lembretes automáticos via WhatsApp"
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server")
    ),
    tags(
        (name = "clients", description = "Clientes do prestador"),
        (name = "charges", description = "Cobranças e mudanças de status"),
        (name = "notifications", description = "Envio e histórico de mensagens"),
        (name = "profile", description = "Dados do prestador e chave PIX"),
        (name = "webhooks", description = "Confirmações do provedor de pagamento"),
        (name = "jobs", description = "Tarefas agendadas")
    ),
    paths(
        // Clients
        crate::api::clients::list_clients,
        crate::api::clients::create_client,
        crate::api::clients::get_client,
        crate::api::clients::update_client,
        crate::api::clients::delete_client,
        crate::api::clients::recompute_client,
        // Charges
        crate::api::charges::list_charges,
        crate::api::charges::create_charge,
        crate::api::charges::get_charge,
        crate::api::charges::update_charge,
        crate::api::charges::update_charge_status,
        crate::api::charges::cancel_charge,
        // Notifications
        crate::api::notifications::list_notifications,
        crate::api::notifications::send_notification,
        // Profile
        crate::api::profile::get_profile,
        crate::api::profile::update_profile,
        // Webhooks
        crate::api::webhooks::payment_webhook,
        // Jobs
        crate::api::jobs::check_overdue_charges,
    ),
    components(
        schemas(
            // Clients
            crate::models::Client,
            crate::models::ClientAggregates,
            crate::models::CreateClientRequest,
            crate::models::UpdateClientRequest,
            // Charges
            crate::models::Charge,
            crate::models::ChargeStatus,
            crate::models::RecurrenceInterval,
            crate::models::CreateChargeRequest,
            crate::models::UpdateChargeRequest,
            crate::models::UpdateChargeStatusRequest,
            crate::api::charges::CreateChargeResponse,
            crate::api::charges::StatusChangeResponse,
            // Notifications
            crate::models::Notification,
            crate::models::NotificationType,
            crate::models::NotificationChannel,
            crate::models::DeliveryStatus,
            crate::models::SendNotificationRequest,
            crate::models::SendNotificationResponse,
            // Profile
            crate::models::Profile,
            crate::models::UpdateProfileRequest,
            // Jobs
            crate::services::SweepReport,
            crate::api::jobs::SweepResponse,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            );
            // The scheduler presents SERVICE_ROLE_KEY as a bearer token
            components.add_security_scheme(
                "service_key",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            );
        }
    }
}
