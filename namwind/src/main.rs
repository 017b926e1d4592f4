use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use config::{Config, HttpSettings};
use extract::Extractor;
use nam_source::NamSource;
use output::RowWriter;

mod cli;
mod config;
mod extract;
mod geo;
mod grib1;
mod grib2;
mod grid;
mod lambert;
mod levels;
mod listing;
mod nam_source;
mod output;
mod retry;
mod wind;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Cli::parse();
    let config = Config::load(&args.config)?;
    let source = NamSource::new(&HttpSettings::from_env()?)?;

    std::fs::create_dir_all(&config.data_path)
        .with_context(|| format!("Failed to create {}", config.data_path.display()))?;

    match args.cmd {
        Command::CollectUrls => {
            collect_urls(&source, &config).await?;
        }
        Command::Extract { urls } => {
            let path = urls.unwrap_or_else(|| config.url_list_path());
            let urls = output::read_url_list(&path)?;
            extract(&source, &config, &urls).await?;
        }
        Command::Run => {
            let urls = collect_urls(&source, &config).await?;
            extract(&source, &config, &urls).await?;
        }
    }

    Ok(())
}

async fn collect_urls(source: &NamSource, config: &Config) -> Result<Vec<String>> {
    let report = listing::collect_urls(source, config).await;
    let path = config.url_list_path();
    output::write_url_list(&path, &report.urls)?;
    log::info!("Wrote {} URLs to {}", report.urls.len(), path.display());
    Ok(report.urls)
}

async fn extract(source: &NamSource, config: &Config, urls: &[String]) -> Result<()> {
    let path = config.output_path();
    log::info!("Extracting winds from {} files into {}", urls.len(), path.display());

    let mut writer = RowWriter::create(&path)?;
    let extractor = Extractor::new(
        source,
        config.site,
        &config.pressure_levels,
        config.data_path.clone(),
    );
    let summary = extractor.run(urls, &mut writer).await?;
    let rows = writer.finish()?;

    summary.log();
    log::info!("Wrote {} rows to {}", rows, path.display());
    Ok(())
}
