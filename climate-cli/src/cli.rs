use anyhow::{Context, anyhow};
use chrono::{Datelike, Utc};
use clap::{Parser, Subcommand};
use climate_core::{
    Config, DocumentQuery, ErrorPayload, ProviderId, RangeChunkingFetcher, TemperatureRequest,
    Units, fetch_temperature,
    provider::{ncdc_from_config, worldbank_from_config},
};
use tracing::info;

use crate::output;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "climate", version, about = "Climate documents and temperature observations")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name, e.g. "ncdc" or "worldbank".
        provider: String,
    },

    /// Daily observations for a location over a date range.
    Temperature {
        /// First day, YYYY-MM-DD.
        #[arg(long)]
        start: String,

        /// Last day, YYYY-MM-DD. Must not be in the future.
        #[arg(long)]
        end: String,

        /// NCDC location id, e.g. "FIPS:37" or "CITY:US370019".
        #[arg(long)]
        location: String,

        /// GHCND datatype id.
        #[arg(long, default_value = "TMAX")]
        datatype: String,

        /// "metric" or "standard".
        #[arg(long, default_value = "metric")]
        units: String,

        /// Override the configured maximum window size in days.
        #[arg(long)]
        window_days: Option<u32>,

        #[arg(long)]
        json: bool,
    },

    /// Search World Bank climate documents.
    Documents {
        #[arg(long, default_value = "climate change")]
        topic: String,

        #[arg(long)]
        region: Option<String>,

        #[arg(long)]
        start_year: Option<i32>,

        #[arg(long)]
        end_year: Option<i32>,

        /// Documents per page.
        #[arg(long, default_value_t = 50)]
        rows: u32,

        /// 1-based page number.
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        page: u32,

        #[arg(long)]
        json: bool,
    },

    /// Recent documents on the economics of climate change.
    Overview {
        #[arg(long)]
        region: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Pass KEY=VALUE parameters straight to the World Bank search API.
    Search {
        #[arg(value_parser = parse_key_value)]
        params: Vec<(String, String)>,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config = Config::load()?;

        match self.command {
            Command::Configure { provider } => configure(config, &provider),
            Command::Temperature {
                start,
                end,
                location,
                datatype,
                units,
                window_days,
                json,
            } => {
                let request = TemperatureRequest {
                    start_date: Some(start),
                    end_date: Some(end),
                    location_id: Some(location),
                    datatype_id: Some(datatype),
                    units: Units::try_from(units.as_str())?,
                };
                let max_window_days = window_days.unwrap_or(config.fetch.max_window_days);

                let fetcher = RangeChunkingFetcher::new(ncdc_from_config(&config)?)
                    .with_max_concurrency(config.fetch.max_concurrency);

                match fetch_temperature(&fetcher, &request, max_window_days).await {
                    Ok(report) if json => output::print_json(&report),
                    Ok(report) => {
                        output::print_temperature(&report);
                        Ok(())
                    }
                    Err(err) => {
                        if json {
                            output::print_json(&ErrorPayload::from_fetch(&err))?;
                        }
                        Err(anyhow!(err))
                    }
                }
            }
            Command::Documents {
                topic,
                region,
                start_year,
                end_year,
                rows,
                page,
                json,
            } => {
                let query = DocumentQuery {
                    topic,
                    region,
                    start_year,
                    end_year,
                    ..DocumentQuery::default()
                }
                .page(page, rows);
                let client = worldbank_from_config(&config)?;

                match client.search(&query).await {
                    Ok(page) if json => output::print_json(&page),
                    Ok(page) => {
                        output::print_documents(&page);
                        Ok(())
                    }
                    Err(err) => {
                        if json {
                            output::print_json(&ErrorPayload::from_provider(
                                "Failed to fetch climate documents",
                                &err,
                            ))?;
                        }
                        Err(anyhow!(err))
                    }
                }
            }
            Command::Overview { region, json } => {
                let client = worldbank_from_config(&config)?;
                let year = Utc::now().year();

                match client.overview(region.as_deref(), year).await {
                    Ok(overview) if json => output::print_json(&overview),
                    Ok(overview) => {
                        println!("Timeframe: {}", overview.metadata.timeframe);
                        output::print_documents(&overview.page);
                        Ok(())
                    }
                    Err(err) => {
                        if json {
                            output::print_json(&ErrorPayload::from_provider(
                                "Failed to fetch overview data",
                                &err,
                            ))?;
                        }
                        Err(anyhow!(err))
                    }
                }
            }
            Command::Search { params } => {
                let client = worldbank_from_config(&config)?;
                let value = client.search_raw(&params).await?;
                output::print_json(&value)
            }
        }
    }
}

fn configure(mut config: Config, provider: &str) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;

    if !id.requires_api_key() {
        println!("Provider '{id}' does not need an API key.");
        return Ok(());
    }

    let key = inquire::Password::new(&format!("API key for {id}:"))
        .without_confirmation()
        .with_help_message("Request a token at https://www.ncdc.noaa.gov/cdo-web/token")
        .prompt()
        .context("Failed to read API key")?;

    config.upsert_provider_api_key(id, key.trim().to_string());
    config.save()?;

    let path = Config::config_file_path()?;
    info!(provider = %id, path = %path.display(), "saved provider key");
    println!("Saved API key for '{id}' to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_temperature_command() {
        let cli = Cli::try_parse_from([
            "climate",
            "temperature",
            "--start",
            "2020-01-01",
            "--end",
            "2022-06-15",
            "--location",
            "FIPS:37",
        ])
        .expect("arguments should parse");

        match cli.command {
            Command::Temperature { datatype, units, window_days, json, .. } => {
                assert_eq!(datatype, "TMAX");
                assert_eq!(units, "metric");
                assert_eq!(window_days, None);
                assert!(!json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn documents_command_pages() {
        let cli = Cli::try_parse_from(["climate", "documents", "--rows", "20", "--page", "3"])
            .expect("arguments should parse");

        match cli.command {
            Command::Documents { rows, page, topic, .. } => {
                assert_eq!((rows, page), (20, 3));
                assert_eq!(topic, "climate change");
            }
            other => panic!("unexpected command {other:?}"),
        }

        assert!(Cli::try_parse_from(["climate", "documents", "--page", "0"]).is_err());
    }

    #[test]
    fn search_params_must_be_key_value() {
        let cli = Cli::try_parse_from(["climate", "search", "qterm=flood", "rows=5"])
            .expect("arguments should parse");
        match cli.command {
            Command::Search { params } => {
                assert_eq!(params[0], ("qterm".to_string(), "flood".to_string()));
                assert_eq!(params.len(), 2);
            }
            other => panic!("unexpected command {other:?}"),
        }

        assert!(Cli::try_parse_from(["climate", "search", "novalue"]).is_err());
        assert!(parse_key_value("=x").is_err());
    }
}
