//! Enumerates the grid file URLs of the archive for a range of days.

use crate::config::Config;
use crate::nam_source::NamSource;
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::io::{self, Write};

/// Analysis files only: forecast hour 000.
const GRIB1_SUFFIX: &str = "000.grb";
const GRIB2_SUFFIX: &str = "000.grb2";

static HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<a\s[^>]*?href\s*=\s*["']([^"']+)["']"#).unwrap());

#[derive(Debug, Default)]
pub struct CollectReport {
    pub urls: Vec<String>,
    pub days_listed: usize,
    pub days_skipped: usize,
}

/// Days from `start` to `end` inclusive whose month is in `months`.
pub fn dates_in_range(start: NaiveDate, end: NaiveDate, months: &[u32]) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| months.contains(&d.month()))
        .collect()
}

/// `href` targets of all anchors of an HTML page, in page order.
pub fn extract_hrefs(html: &str) -> Vec<String> {
    HREF.captures_iter(html)
        .map(|c| c[1].to_string())
        .collect()
}

/// Keep the forecast hour 000 files, preferring GRIB2 when a cycle has both editions.
pub fn select_grid_files(hrefs: &[String]) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    let mut chosen: HashMap<String, String> = HashMap::new();

    for href in hrefs {
        let name = href.rsplit('/').next().unwrap_or(href);
        let stem = if let Some(stem) = name.strip_suffix(GRIB2_SUFFIX) {
            stem
        } else if let Some(stem) = name.strip_suffix(GRIB1_SUFFIX) {
            stem
        } else {
            continue;
        };

        let is_grib2 = name.ends_with(GRIB2_SUFFIX);
        match chosen.get(stem).map(|existing| existing.ends_with(GRIB2_SUFFIX)) {
            None => {
                order.push(stem.to_string());
                chosen.insert(stem.to_string(), name.to_string());
            }
            Some(false) if is_grib2 => {
                chosen.insert(stem.to_string(), name.to_string());
            }
            Some(_) => {}
        }
    }

    order
        .into_iter()
        .filter_map(|stem| chosen.remove(&stem))
        .collect()
}

/// Scrape the listing of every configured day and return the grid file URLs.
pub async fn collect_urls(source: &NamSource, config: &Config) -> CollectReport {
    let dates = dates_in_range(config.start_date, config.end_date, &config.months);
    let total = dates.len();
    let mut report = CollectReport::default();

    log::info!(
        "Collecting NAM file URLs for {} days from {} to {}",
        total,
        config.start_date,
        config.end_date
    );

    for (i, date) in dates.into_iter().enumerate() {
        print!("\r  Listing {} ({}/{})", date, i + 1, total);
        let _ = io::stdout().flush();

        let page = match source.fetch_listing(date).await {
            Ok(Some(page)) => page,
            Ok(None) => {
                report.days_skipped += 1;
                continue;
            }
            Err(e) => {
                log::warn!("Skipping {}: {:#}", date, e);
                report.days_skipped += 1;
                continue;
            }
        };

        let listing_url = source.listing_url(date);
        let files = select_grid_files(&extract_hrefs(&page));
        log::debug!("{}: {} grid files", date, files.len());

        report
            .urls
            .extend(files.into_iter().map(|f| format!("{}/{}", listing_url, f)));
        report.days_listed += 1;
    }
    if total > 0 {
        println!();
    }

    log::info!(
        "Collected {} URLs ({} days listed, {} skipped)",
        report.urls.len(),
        report.days_listed,
        report.days_skipped
    );
    report
}
