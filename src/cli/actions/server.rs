use crate::{api, cli::actions::Action, config::AuthConfig};
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            token_secret,
            frontend_url,
        } => {
            let config = AuthConfig::new(token_secret).with_frontend_base_url(frontend_url);
            api::new(port, dsn, config).await?;
        }
    }

    Ok(())
}
