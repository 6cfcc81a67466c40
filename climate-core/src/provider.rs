use crate::{
    Config,
    provider::{ncdc::NcdcClient, worldbank::WorldBankClient},
};
use std::convert::TryFrom;

pub mod ncdc;
pub mod worldbank;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    Ncdc,
    WorldBank,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Ncdc => "ncdc",
            ProviderId::WorldBank => "worldbank",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::Ncdc, ProviderId::WorldBank]
    }

    /// Environment variable that overrides the stored API key, if any.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderId::Ncdc => Some("NCDC_API_KEY"),
            ProviderId::WorldBank => None,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(self, ProviderId::Ncdc)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "ncdc" | "noaa" => Ok(ProviderId::Ncdc),
            "worldbank" | "wds" => Ok(ProviderId::WorldBank),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: ncdc, worldbank."
            )),
        }
    }
}

/// Construct the NCDC observations client from config.
pub fn ncdc_from_config(config: &Config) -> anyhow::Result<NcdcClient> {
    let id = ProviderId::Ncdc;
    let token = config.effective_api_key(id).ok_or_else(|| {
        anyhow::anyhow!(
            "No API key configured for provider '{id}'.\n\
                 Hint: run `climate configure {id}` or set NCDC_API_KEY."
        )
    })?;

    let mut client = NcdcClient::new(token)?;
    if let Some(url) = config.provider_base_url(id) {
        client = client.with_base_url(url);
    }
    if let Some(dataset) = config.provider_dataset(id) {
        client = client.with_dataset(dataset);
    }
    Ok(client)
}

/// Construct the World Bank document search client from config.
pub fn worldbank_from_config(config: &Config) -> anyhow::Result<WorldBankClient> {
    let client = WorldBankClient::new()?;
    Ok(match config.provider_base_url(ProviderId::WorldBank) {
        Some(url) => client.with_base_url(url),
        None => client,
    })
}

/// Pick the most useful message out of a provider error body.
///
/// Both providers answer errors with JSON carrying one of a few message
/// fields; anything else is reported as truncated text.
pub(crate) fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["developerMessage", "userMessage", "message"] {
            if let Some(msg) = value.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }

    truncate_body(body)
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut cut = MAX;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &body[..cut])
    } else {
        body.to_string()
    }
}
