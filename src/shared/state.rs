use crate::config::AppConfig;
use crate::leads::relay::FormRelay;
use crate::marketing::auth::AuthClient;
use crate::marketing::brevo::BrevoClient;
use crate::shared::utils::DbPool;

pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub brevo: BrevoClient,
    pub auth: AuthClient,
    pub relay: FormRelay,
}

impl AppState {
    pub fn new(conn: DbPool, config: AppConfig) -> Self {
        let brevo = BrevoClient::new(config.brevo.clone());
        let auth = AuthClient::new(config.auth.clone());
        let relay = FormRelay::new(config.forms.relay_url.clone());
        Self {
            conn,
            config,
            brevo,
            auth,
            relay,
        }
    }
}
