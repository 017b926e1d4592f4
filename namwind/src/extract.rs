//! Nearest grid point wind extraction, per file and per pressure level.

use crate::geo::{distances_to, nearest_indices, Site};
use crate::grid::{self, GridError, GridFile, GridFormat, WindComponent};
use crate::levels::{resolve_field, PressureLevel};
use crate::nam_source::{HttpStatus, NamSource};
use crate::output::RowWriter;
use crate::wind::{wind_direction, wind_speed, OutputRow};
use anyhow::Result;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

/// Why a file, or one level of a file, contributed no rows.
#[derive(Debug, Error)]
pub enum SkipReason {
    #[error("no YYYYMMDD_HHMM timestamp in file name {0:?}")]
    BadFileName(String),

    #[error("unknown grid format for {0:?}")]
    UnknownFormat(String),

    #[error("{0}")]
    HttpStatus(reqwest::StatusCode),

    #[error("download failed: {0:#}")]
    Download(anyhow::Error),

    #[error("decode failed: {0}")]
    Decode(#[from] GridError),

    #[error("no U/V wind fields")]
    NoWindFields,

    #[error("no {component:?} field for {hpa} hPa")]
    MissingLevel { component: WindComponent, hpa: i32 },

    #[error("U and V windows differ ({u} vs {v} points)")]
    GridMismatch { u: usize, v: usize },

    #[error("no grid point near the site")]
    EmptyWindow,
}

impl SkipReason {
    /// Short name used to count skips by cause.
    pub fn kind(&self) -> &'static str {
        match self {
            SkipReason::BadFileName(_) => "bad_file_name",
            SkipReason::UnknownFormat(_) => "unknown_format",
            SkipReason::HttpStatus(_) => "http_status",
            SkipReason::Download(_) => "download",
            SkipReason::Decode(_) => "decode",
            SkipReason::NoWindFields => "no_wind_fields",
            SkipReason::MissingLevel { .. } => "missing_level",
            SkipReason::GridMismatch { .. } => "grid_mismatch",
            SkipReason::EmptyWindow => "empty_window",
        }
    }
}

#[derive(Debug)]
pub struct FileReport {
    pub timestamp: String,
    pub rows: Vec<OutputRow>,
    pub skipped_levels: Vec<(PressureLevel, SkipReason)>,
}

#[derive(Debug)]
pub enum FileOutcome {
    Processed(FileReport),
    Skipped(SkipReason),
}

/// Timestamp label of a NAM file name: `namanl_218_20190101_0000_000.grb2` -> `20190101-0000`.
pub fn timestamp_label(url: &str) -> Option<String> {
    let name = url.rsplit('/').next()?;
    let parts: Vec<&str> = name.split('_').collect();
    let (day, time) = (*parts.get(2)?, *parts.get(3)?);
    NaiveDateTime::parse_from_str(&format!("{}{}", day, time), "%Y%m%d%H%M").ok()?;
    Some(format!("{}-{}", day, time))
}

/// The five grid points nearest the site at one pressure level.
pub fn extract_level(
    grid: &dyn GridFile,
    timestamp: &str,
    site: &Site,
    level: &PressureLevel,
) -> Result<Vec<OutputRow>, SkipReason> {
    let format = grid.format();
    let u_fields = grid.fields(WindComponent::U);
    let v_fields = grid.fields(WindComponent::V);

    let u_field = resolve_field(&u_fields, level, format).ok_or(SkipReason::MissingLevel {
        component: WindComponent::U,
        hpa: level.hpa,
    })?;
    let v_field = resolve_field(&v_fields, level, format).ok_or(SkipReason::MissingLevel {
        component: WindComponent::V,
        hpa: level.hpa,
    })?;

    let window = site.window();
    let u = grid.read_window(u_field, &window)?;
    let v = grid.read_window(v_field, &window)?;

    if u.len() != v.len() {
        return Err(SkipReason::GridMismatch {
            u: u.len(),
            v: v.len(),
        });
    }
    if u.is_empty() {
        return Err(SkipReason::EmptyWindow);
    }

    let distances = distances_to(site, &u.lats, &u.lons);
    let rows = nearest_indices(&distances)
        .into_iter()
        .map(|i| OutputRow {
            time: timestamp.to_string(),
            lat: u.lats[i],
            lon: u.lons[i],
            dist_to_pnt_interest: distances[i],
            pressure_height: level.hpa,
            u: u.values[i],
            v: v.values[i],
            wnd_spd: wind_speed(u.values[i], v.values[i]),
            wnd_dir: wind_direction(u.values[i], v.values[i]),
        })
        .collect();

    Ok(rows)
}

/// Extract every configured level of a decoded grid file.
pub fn extract_grid(
    grid: &dyn GridFile,
    timestamp: &str,
    site: &Site,
    levels: &[PressureLevel],
) -> FileOutcome {
    if grid.fields(WindComponent::U).is_empty() && grid.fields(WindComponent::V).is_empty() {
        return FileOutcome::Skipped(SkipReason::NoWindFields);
    }

    let mut report = FileReport {
        timestamp: timestamp.to_string(),
        rows: Vec::new(),
        skipped_levels: Vec::new(),
    };

    for level in levels {
        match extract_level(grid, timestamp, site, level) {
            Ok(rows) => report.rows.extend(rows),
            Err(reason) => report.skipped_levels.push((level.clone(), reason)),
        }
    }

    FileOutcome::Processed(report)
}

/// Counters of a whole extraction run.
#[derive(Debug, Default)]
pub struct Summary {
    pub files_processed: usize,
    pub files_skipped: usize,
    pub levels_skipped: usize,
    pub rows: usize,
    pub skips_by_kind: BTreeMap<&'static str, usize>,
}

impl Summary {
    pub fn record(&mut self, name: &str, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Processed(report) => {
                log::debug!("{}: {} rows at {}", name, report.rows.len(), report.timestamp);
                self.files_processed += 1;
                self.rows += report.rows.len();
                for (level, reason) in &report.skipped_levels {
                    log::warn!("{}: skipped {}: {}", name, level.label, reason);
                    self.levels_skipped += 1;
                    *self.skips_by_kind.entry(reason.kind()).or_default() += 1;
                }
            }
            FileOutcome::Skipped(reason) => {
                log::warn!("{}: skipped: {}", name, reason);
                self.files_skipped += 1;
                *self.skips_by_kind.entry(reason.kind()).or_default() += 1;
            }
        }
    }

    pub fn log(&self) {
        log::info!(
            "Processed {} files ({} skipped, {} levels skipped), {} rows",
            self.files_processed,
            self.files_skipped,
            self.levels_skipped,
            self.rows
        );
        for (kind, count) in &self.skips_by_kind {
            log::info!("  {}: {}", kind, count);
        }
    }
}

/// Downloads and processes grid files one at a time.
pub struct Extractor<'a> {
    source: &'a NamSource,
    site: Site,
    levels: &'a [PressureLevel],
    work_dir: PathBuf,
}

impl<'a> Extractor<'a> {
    pub fn new(
        source: &'a NamSource,
        site: Site,
        levels: &'a [PressureLevel],
        work_dir: PathBuf,
    ) -> Self {
        Self {
            source,
            site,
            levels,
            work_dir,
        }
    }

    /// Download, decode and extract one file. The download is removed before returning.
    pub async fn process_url(&self, url: &str) -> FileOutcome {
        let Some(timestamp) = timestamp_label(url) else {
            return FileOutcome::Skipped(SkipReason::BadFileName(url.to_string()));
        };
        let Some(format) = GridFormat::from_name(url) else {
            return FileOutcome::Skipped(SkipReason::UnknownFormat(url.to_string()));
        };

        let suffix = format!(".{}", format.extension());
        let tmp = match self
            .source
            .download(url, &self.work_dir, &timestamp, &suffix)
            .await
        {
            Ok(tmp) => tmp,
            Err(err) => {
                let err = err.into_inner();
                let reason = match err.downcast_ref::<HttpStatus>() {
                    Some(status) => SkipReason::HttpStatus(status.0),
                    None => SkipReason::Download(err),
                };
                return FileOutcome::Skipped(reason);
            }
        };

        let outcome = match grid::open(tmp.path(), format) {
            Ok(grid) => extract_grid(grid.as_ref(), &timestamp, &self.site, self.levels),
            Err(err) => FileOutcome::Skipped(SkipReason::Decode(err)),
        };

        if let Err(e) = tmp.close() {
            log::warn!("Failed to remove download of {}: {}", url, e);
        }
        outcome
    }

    /// Process every URL in order, appending rows to `writer`.
    pub async fn run(&self, urls: &[String], writer: &mut RowWriter) -> Result<Summary> {
        let mut summary = Summary::default();
        let total = urls.len();

        for (i, url) in urls.iter().enumerate() {
            let name = url.rsplit('/').next().unwrap_or(url);
            print!("\r  Extracting {} ({}/{})", name, i + 1, total);
            let _ = io::stdout().flush();

            let outcome = self.process_url(url).await;
            if let FileOutcome::Processed(report) = &outcome {
                writer.write_rows(&report.rows)?;
            }
            summary.record(name, &outcome);
        }
        if total > 0 {
            println!();
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::BoundingBox;
    use crate::grib1::tests::latlon_message;
    use crate::grib2::tests::wind_file;
    use crate::nam_source::tests::{local_settings, serve};
    use crate::grid::{FieldInfo, GridWindow};
    use std::io::Write;

    /// Grid file held in memory: a list of (component, description, full grid).
    struct MemoryGrid {
        format: GridFormat,
        fields: Vec<(WindComponent, String, GridWindow)>,
    }

    impl GridFile for MemoryGrid {
        fn format(&self) -> GridFormat {
            self.format
        }

        fn fields(&self, component: WindComponent) -> Vec<FieldInfo> {
            self.fields
                .iter()
                .enumerate()
                .filter(|(_, (c, _, _))| *c == component)
                .map(|(index, (_, description, _))| FieldInfo {
                    index,
                    description: description.clone(),
                })
                .collect()
        }

        fn read_window(
            &self,
            field: &FieldInfo,
            window: &BoundingBox,
        ) -> Result<GridWindow, GridError> {
            let (_, _, grid) = self
                .fields
                .get(field.index)
                .ok_or(GridError::NoSuchField(field.index))?;
            let mut out = GridWindow::default();
            for i in 0..grid.len() {
                if window.contains(grid.lats[i], grid.lons[i]) {
                    out.push(grid.lats[i], grid.lons[i], grid.values[i]);
                }
            }
            Ok(out)
        }
    }

    /// 0.1 degree grid of 11 x 11 points centered on (50, -118), value = row * 100 + column.
    fn full_grid(offset: f64) -> GridWindow {
        let mut grid = GridWindow::default();
        for row in 0..11 {
            for col in 0..11 {
                grid.push(
                    49.5 + row as f64 * 0.1,
                    -118.5 + col as f64 * 0.1,
                    offset + (row * 100 + col) as f64,
                );
            }
        }
        grid
    }

    fn grib2_grid(levels_pa: &[i32]) -> MemoryGrid {
        let mut fields = Vec::new();
        for pa in levels_pa {
            for component in [WindComponent::U, WindComponent::V] {
                let offset = if component == WindComponent::U { 0.0 } else { 0.5 };
                fields.push((
                    component,
                    format!("{}:m s**-1:isobaricInPa:level {} Pa", component.name(), pa),
                    full_grid(offset + *pa as f64),
                ));
            }
        }
        MemoryGrid {
            format: GridFormat::Grib2,
            fields,
        }
    }

    fn levels() -> Vec<PressureLevel> {
        vec![PressureLevel::new("700mb", 700), PressureLevel::new("500mb", 500)]
    }

    fn site() -> Site {
        // closest to the grid point at row 5, column 5
        Site::new(50.01, -117.99)
    }

    #[test]
    fn test_timestamp_label() {
        assert_eq!(
            timestamp_label("https://host/analysis/201901/20190101/namanl_218_20190101_0600_000.grb2"),
            Some("20190101-0600".to_string())
        );
        assert_eq!(
            timestamp_label("nam_218_20061231_1800_000.grb"),
            Some("20061231-1800".to_string())
        );
        assert_eq!(timestamp_label("https://host/a_b.grb2"), None);
        assert_eq!(timestamp_label("namanl_218_20191341_0000_000.grb2"), None);
    }

    #[test]
    fn test_extract_level_picks_five_nearest() {
        let grid = grib2_grid(&[70000, 50000]);
        let rows = extract_level(&grid, "20190101-0000", &site(), &levels()[0]).unwrap();

        assert_eq!(rows.len(), 5);
        for pair in rows.windows(2) {
            assert!(pair[0].dist_to_pnt_interest <= pair[1].dist_to_pnt_interest);
        }
        let first = &rows[0];
        assert!((first.lat - 50.0).abs() < 1e-9);
        assert!((first.lon + 118.0).abs() < 1e-9);
        assert_eq!(first.u, 70000.0 + 505.0);
        assert_eq!(first.v, 70000.5 + 505.0);
        assert_eq!(first.pressure_height, 700);
        assert_eq!(first.time, "20190101-0000");
        assert_eq!(first.wnd_spd, wind_speed(first.u, first.v));
        assert_eq!(first.wnd_dir, wind_direction(first.u, first.v));
        assert!(rows.iter().all(|r| r.u >= 70000.0 && r.u < 71100.0));
    }

    #[test]
    fn test_extract_level_missing() {
        let grid = grib2_grid(&[70000]);
        let err = extract_level(&grid, "t", &site(), &levels()[1]).unwrap_err();
        assert!(matches!(
            err,
            SkipReason::MissingLevel {
                component: WindComponent::U,
                hpa: 500
            }
        ));
    }

    #[test]
    fn test_extract_level_mismatched_components() {
        let mut grid = grib2_grid(&[70000]);
        grid.fields[1].2.values.pop();
        grid.fields[1].2.lats.pop();
        grid.fields[1].2.lons.pop();
        // the dropped point is the north-east corner, which is inside the window
        let err = extract_level(&grid, "t", &site(), &levels()[0]).unwrap_err();
        assert!(matches!(err, SkipReason::GridMismatch { u: 121, v: 120 }));
    }

    #[test]
    fn test_extract_level_site_outside_grid() {
        let grid = grib2_grid(&[70000]);
        let far = Site::new(10.0, 10.0);
        let err = extract_level(&grid, "t", &far, &levels()[0]).unwrap_err();
        assert!(matches!(err, SkipReason::EmptyWindow));
    }

    #[test]
    fn test_extract_grid_without_wind() {
        let grid = MemoryGrid {
            format: GridFormat::Grib2,
            fields: Vec::new(),
        };
        assert!(matches!(
            extract_grid(&grid, "t", &site(), &levels()),
            FileOutcome::Skipped(SkipReason::NoWindFields)
        ));
    }

    #[test]
    fn test_two_files_one_missing_a_level() {
        let complete = grib2_grid(&[70000, 50000]);
        let partial = grib2_grid(&[70000]);
        let mut summary = Summary::default();
        let mut rows = Vec::new();

        for (name, grid) in [("20190101-0000", &complete), ("20190101-0600", &partial)] {
            let outcome = extract_grid(grid, name, &site(), &levels());
            if let FileOutcome::Processed(report) = &outcome {
                rows.extend(report.rows.clone());
            }
            summary.record(name, &outcome);
        }

        assert_eq!(rows.len(), 15);
        let count = |time: &str, hpa: i32| {
            rows.iter()
                .filter(|r| r.time == time && r.pressure_height == hpa)
                .count()
        };
        assert_eq!(count("20190101-0000", 700), 5);
        assert_eq!(count("20190101-0000", 500), 5);
        assert_eq!(count("20190101-0600", 700), 5);
        assert_eq!(count("20190101-0600", 500), 0);

        assert_eq!(summary.files_processed, 2);
        assert_eq!(summary.files_skipped, 0);
        assert_eq!(summary.levels_skipped, 1);
        assert_eq!(summary.rows, 15);
        assert_eq!(summary.skips_by_kind.get("missing_level"), Some(&1));
    }

    #[test]
    fn test_grib1_files_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let packed: Vec<u8> = (0..12).collect();

        let write = |name: &str, levels: &[u16]| {
            let path = dir.path().join(name);
            let mut file = std::fs::File::create(&path).unwrap();
            for level in levels {
                file.write_all(&latlon_message(33, *level, 0, &packed, None)).unwrap();
                file.write_all(&latlon_message(34, *level, 1, &packed, None)).unwrap();
            }
            path
        };
        let complete = write("namanl_218_20190101_0000_000.grb", &[700, 500]);
        let partial = write("namanl_218_20190101_0600_000.grb", &[700]);

        // the 4 x 3 test grid spans 50N..51N, 120W..118.5W
        let site = Site::new(50.5, -119.25);
        let mut summary = Summary::default();
        let mut rows = Vec::new();

        for path in [&complete, &partial] {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            let timestamp = timestamp_label(&name).unwrap();
            let format = GridFormat::from_name(&name).unwrap();
            let grid = grid::open(path, format).unwrap();
            let outcome = extract_grid(grid.as_ref(), &timestamp, &site, &levels());
            if let FileOutcome::Processed(report) = &outcome {
                rows.extend(report.rows.clone());
            }
            summary.record(&name, &outcome);
        }

        assert_eq!(rows.len(), 15);
        assert_eq!(
            rows.iter()
                .filter(|r| r.time == "20190101-0600" && r.pressure_height == 500)
                .count(),
            0
        );
        // nearest point to 50.5N 119.25W is row 1, column 1 or 2 (equidistant in longitude)
        let first = &rows[0];
        assert_eq!(first.lat, 50.5);
        assert!(first.lon == -119.5 || first.lon == -119.0);
        // V was packed with decimal scale 1
        assert!((first.v - first.u / 10.0).abs() < 1e-9);
        assert_eq!(summary.levels_skipped, 1);
    }

    #[test]
    fn test_skip_reason_kinds() {
        assert_eq!(SkipReason::EmptyWindow.kind(), "empty_window");
        assert_eq!(
            SkipReason::HttpStatus(reqwest::StatusCode::NOT_FOUND).to_string(),
            "404 Not Found"
        );
        let mut summary = Summary::default();
        summary.record("x", &FileOutcome::Skipped(SkipReason::NoWindFields));
        assert_eq!(summary.files_skipped, 1);
        assert_eq!(summary.skips_by_kind.get("no_wind_fields"), Some(&1));
    }

    #[tokio::test]
    async fn test_run_downloads_extracts_and_cleans_up() {
        let packed: Vec<u8> = (0..12).collect();
        let mut grib1 = latlon_message(33, 700, 0, &packed, None);
        grib1.extend(latlon_message(34, 700, 0, &packed, None));
        let addr = serve(vec![
            ("/nam/namanl_218_20190101_0000_000.grb".to_string(), grib1),
            (
                "/nam/namanl_218_20190101_0600_000.grb2".to_string(),
                b"<html>temporarily unavailable</html>".to_vec(),
            ),
            (
                "/nam/namanl_218_20190101_1200_000.grb2".to_string(),
                wind_file(&[70000]),
            ),
        ])
        .await;

        let source = NamSource::new(&local_settings(addr)).unwrap();
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let levels = vec![PressureLevel::new("700mb", 700)];
        let extractor = Extractor::new(
            &source,
            Site::new(50.5, -119.25),
            &levels,
            work.path().to_path_buf(),
        );

        // the 1800 cycle is not served and gets a 404
        let urls: Vec<String> = ["0000_000.grb", "0600_000.grb2", "1200_000.grb2", "1800_000.grb2"]
            .iter()
            .map(|f| format!("http://{}/nam/namanl_218_20190101_{}", addr, f))
            .collect();

        let mut writer = RowWriter::create(&out.path().join("nam_data.csv.gz")).unwrap();
        let summary = extractor.run(&urls, &mut writer).await.unwrap();
        assert_eq!(writer.finish().unwrap(), 10);

        assert_eq!(summary.files_processed, 2);
        assert_eq!(summary.files_skipped, 2);
        assert_eq!(summary.rows, 10);
        assert_eq!(summary.skips_by_kind.get("decode"), Some(&1));
        assert_eq!(summary.skips_by_kind.get("http_status"), Some(&1));
        assert_eq!(summary.skips_by_kind.get("no_wind_fields"), None);
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);

        assert!(matches!(
            extractor.process_url(&urls[1]).await,
            FileOutcome::Skipped(SkipReason::Decode(_))
        ));
        assert!(matches!(
            extractor.process_url(&urls[3]).await,
            FileOutcome::Skipped(SkipReason::HttpStatus(reqwest::StatusCode::NOT_FOUND))
        ));
        match extractor.process_url(&urls[2]).await {
            FileOutcome::Processed(report) => {
                assert_eq!(report.timestamp, "20190101-1200");
                assert_eq!(report.rows.len(), 5);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }
}
