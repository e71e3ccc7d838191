use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(version, about = "Counters that follow you around", long_about = None)]
pub(crate) struct Args {
    /// Where counters are stored when signed in
    #[arg(long, value_enum, default_value_t = Backend::Memory, env = "TALLY_BACKEND")]
    pub backend: Backend,

    /// Firestore project id
    #[arg(long, env = "TALLY_FIRESTORE_PROJECT")]
    pub project_id: Option<String>,

    /// Firebase ID token of the signed-in user, sent as a bearer token
    #[arg(long, env = "TALLY_FIRESTORE_TOKEN", hide_env_values = true)]
    pub id_token: Option<String>,

    /// Web API key, for projects that require one
    #[arg(long, env = "TALLY_FIRESTORE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Override the Firestore REST endpoint (e.g. an emulator)
    #[arg(long, env = "TALLY_FIRESTORE_URL")]
    pub base_url: Option<String>,

    /// Sign in as this user on startup
    #[arg(short, long, env = "TALLY_USER")]
    pub user: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Backend {
    Memory,
    Firestore,
}

#[cfg(feature = "firestore")]
impl Args {
    pub(crate) fn firestore_config(&self) -> anyhow::Result<tally::firestore::FirestoreConfig> {
        let project_id = self
            .project_id
            .clone()
            .ok_or_else(|| anyhow::anyhow!("--project-id is required for the firestore backend"))?;
        let mut config = tally::firestore::FirestoreConfig::new(project_id);
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        config.api_key = self.api_key.clone();
        Ok(config)
    }
}
