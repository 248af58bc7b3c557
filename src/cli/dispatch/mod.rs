use crate::cli::actions::Action;
use anyhow::Result;
use secrecy::SecretString;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches
            .get_one("dsn")
            .map(|s: &String| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --dsn"))?,
        token_secret: matches
            .get_one("token-secret")
            .map(|s: &String| SecretString::from(s.clone()))
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --token-secret"))?,
        frontend_url: matches
            .get_one("frontend-url")
            .map_or_else(|| "http://localhost:3000".to_string(), |s: &String| s.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    #[test]
    fn handler_builds_the_server_action() {
        let matches = commands::new().get_matches_from(vec![
            "lexauth",
            "--dsn",
            "postgres://localhost/lexauth",
            "--token-secret",
            "not-a-real-secret",
        ]);
        let Action::Server {
            port,
            dsn,
            token_secret,
            frontend_url,
        } = handler(&matches).unwrap();
        assert_eq!(port, 8080);
        assert_eq!(dsn, "postgres://localhost/lexauth");
        assert_eq!(token_secret.expose_secret(), "not-a-real-secret");
        assert_eq!(frontend_url, "http://localhost:3000");
    }
}
