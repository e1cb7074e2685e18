//! # loader
//!
//! Decodes AIS position reports from delimited dump files.
//!
//! Accepted inputs: `.csv` (comma), `.dat` (tab or runs of spaces), each
//! optionally wrapped in zstd as `.csv.zst` / `.dat.zst`. The first non-empty
//! row is the header; column names are matched case-insensitively against the
//! alias sets used by the common public AIS exports (MarineCadastre-style
//! `BaseDateTime`/`LAT`/`LON` included).
//!
//! The reader is lazy: callers pull chunks and the file is never buffered
//! whole unless `load_all` is asked for. Rows whose *required* fields fail to
//! parse are skipped and counted, never surfaced individually; optional
//! fields degrade to `None`.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Read};
use std::path::{Path, PathBuf};

use ais_types::{is_valid_mmsi, AisPoint, HEADING_UNAVAILABLE};
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::debug;

use crate::error::SourceError;

/// Chunk size used internally by `load_all`.
const DEFAULT_CHUNK: usize = 10_000;

// ── Column aliases ────────────────────────────────────────────────────────────

/// Resolved column indexes for one input file.
#[derive(Debug, Clone)]
struct ColumnMap {
    mmsi: usize,
    timestamp: usize,
    lat: usize,
    lon: usize,
    sog: Option<usize>,
    cog: Option<usize>,
    heading: Option<usize>,
}

impl ColumnMap {
    fn from_headers<'a>(headers: impl Iterator<Item = &'a str>) -> Result<Self, SourceError> {
        let mut mmsi = None;
        let mut timestamp = None;
        let mut lat = None;
        let mut lon = None;
        let mut sog = None;
        let mut cog = None;
        let mut heading = None;

        for (idx, name) in headers.enumerate() {
            match name.trim().to_ascii_lowercase().as_str() {
                "mmsi" => mmsi = mmsi.or(Some(idx)),
                "timestamp" | "base_date_time" | "basedatetime" | "time" => {
                    timestamp = timestamp.or(Some(idx));
                }
                "lat" | "latitude" => lat = lat.or(Some(idx)),
                "lon" | "longitude" => lon = lon.or(Some(idx)),
                "sog" => sog = sog.or(Some(idx)),
                "cog" => cog = cog.or(Some(idx)),
                "heading" => heading = heading.or(Some(idx)),
                _ => {}
            }
        }

        let mut missing = Vec::new();
        if mmsi.is_none() {
            missing.push("mmsi");
        }
        if timestamp.is_none() {
            missing.push("timestamp");
        }
        if lat.is_none() {
            missing.push("lat");
        }
        if lon.is_none() {
            missing.push("lon");
        }
        if !missing.is_empty() {
            return Err(SourceError::MissingColumns(missing));
        }

        Ok(Self {
            mmsi: mmsi.unwrap_or_default(),
            timestamp: timestamp.unwrap_or_default(),
            lat: lat.unwrap_or_default(),
            lon: lon.unwrap_or_default(),
            sog,
            cog,
            heading,
        })
    }
}

// ── Timestamp forms ───────────────────────────────────────────────────────────

/// ISO-8601 (with offset) or the bare `YYYY-MM-DD HH:MM:SS` / `T`-separated
/// naive forms, naive interpreted as UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

// ── File classification ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InnerFormat {
    Csv,
    Dat,
}

fn classify(path: &Path) -> Result<(InnerFormat, bool), SourceError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if name.ends_with(".csv.zst") {
        Ok((InnerFormat::Csv, true))
    } else if name.ends_with(".dat.zst") {
        Ok((InnerFormat::Dat, true))
    } else if name.ends_with(".csv") {
        Ok((InnerFormat::Csv, false))
    } else if name.ends_with(".dat") {
        Ok((InnerFormat::Dat, false))
    } else {
        Err(SourceError::UnsupportedExtension(path.to_path_buf()))
    }
}

// ── Record sources ────────────────────────────────────────────────────────────

/// `.dat` delimiter, decided by sniffing the header line.
#[derive(Debug, Clone, Copy)]
enum DatDelim {
    Tab,
    Spaces,
}

fn split_dat(line: &str, delim: DatDelim) -> Vec<&str> {
    match delim {
        DatDelim::Tab => line.split('\t').map(str::trim).collect(),
        DatDelim::Spaces => line.split_whitespace().collect(),
    }
}

enum RecordSource {
    /// Comma-delimited, quote-aware
    Csv(csv::Reader<Box<dyn Read + Send>>),
    /// Tab / space-run delimited lines
    Dat {
        lines: Lines<BufReader<Box<dyn Read + Send>>>,
        delim: DatDelim,
    },
}

// ── Point reader ──────────────────────────────────────────────────────────────

/// Lazy reader over one AIS dump file. Not a process-wide resource: one
/// reader per replay session, owned by the driver task.
pub struct PointReader {
    source: RecordSource,
    columns: ColumnMap,
    skipped: u64,
    exhausted: bool,
}

impl std::fmt::Debug for PointReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointReader")
            .field("columns", &self.columns)
            .field("skipped", &self.skipped)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

impl PointReader {
    /// Open `path`, set up decompression, and consume the header row.
    /// Everything that can make the whole source unusable fails here, before
    /// a single point is yielded.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let (format, compressed) = classify(path)?;
        if !path.exists() {
            return Err(SourceError::NotFound(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let raw: Box<dyn Read + Send> = if compressed {
            let decoder = zstd::Decoder::new(file).map_err(|source| SourceError::Decompress {
                path: path.to_path_buf(),
                source,
            })?;
            Box::new(decoder)
        } else {
            Box::new(file)
        };

        let (source, columns) = match format {
            InnerFormat::Csv => {
                let mut rdr = csv::ReaderBuilder::new()
                    .has_headers(false)
                    .flexible(true)
                    .trim(csv::Trim::All)
                    .from_reader(raw);
                // First non-empty record is the header
                let mut record = csv::StringRecord::new();
                let columns = loop {
                    if !rdr.read_record(&mut record)? {
                        return Err(SourceError::EmptyInput);
                    }
                    if record.iter().any(|f| !f.trim().is_empty()) {
                        break ColumnMap::from_headers(record.iter())?;
                    }
                };
                (RecordSource::Csv(rdr), columns)
            }
            InnerFormat::Dat => {
                let mut lines = BufReader::new(raw).lines();
                let header = loop {
                    match lines.next() {
                        None => return Err(SourceError::EmptyInput),
                        Some(line) => {
                            let line = line?;
                            if !line.trim().is_empty() {
                                break line;
                            }
                        }
                    }
                };
                let delim = if header.contains('\t') {
                    DatDelim::Tab
                } else {
                    DatDelim::Spaces
                };
                let columns = ColumnMap::from_headers(split_dat(&header, delim).into_iter())?;
                (RecordSource::Dat { lines, delim }, columns)
            }
        };

        debug!(path = %path.display(), ?format, compressed, "opened AIS source");
        Ok(Self {
            source,
            columns,
            skipped: 0,
            exhausted: false,
        })
    }

    /// Rows skipped so far because a required field failed to parse.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Pull up to `max` points. An empty vector means the source is drained.
    pub fn next_chunk(&mut self, max: usize) -> Result<Vec<AisPoint>, SourceError> {
        let mut out = Vec::with_capacity(max.min(DEFAULT_CHUNK));
        if self.exhausted {
            return Ok(out);
        }
        while out.len() < max {
            match &mut self.source {
                RecordSource::Csv(rdr) => {
                    let mut record = csv::StringRecord::new();
                    match rdr.read_record(&mut record) {
                        Ok(false) => {
                            self.exhausted = true;
                            break;
                        }
                        Ok(true) => {
                            if record.iter().all(|f| f.trim().is_empty()) {
                                continue;
                            }
                            match parse_fields(&self.columns, |i| record.get(i)) {
                                Some(point) => out.push(point),
                                None => self.skipped += 1,
                            }
                        }
                        // Row-level decode trouble (bad UTF-8 and friends) is a
                        // record failure; transport errors kill the source.
                        Err(e) => match e.into_kind() {
                            csv::ErrorKind::Io(io) => return Err(SourceError::Io(io)),
                            _ => self.skipped += 1,
                        },
                    }
                }
                RecordSource::Dat { lines, delim } => match lines.next() {
                    None => {
                        self.exhausted = true;
                        break;
                    }
                    Some(Err(e)) => return Err(SourceError::Io(e)),
                    Some(Ok(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let fields = split_dat(&line, *delim);
                        match parse_fields(&self.columns, |i| fields.get(i).copied()) {
                            Some(point) => out.push(point),
                            None => self.skipped += 1,
                        }
                    }
                },
            }
        }
        Ok(out)
    }

    /// Drain the whole source into memory (buffered mode).
    pub fn load_all(&mut self) -> Result<Vec<AisPoint>, SourceError> {
        let mut out = Vec::new();
        loop {
            let chunk = self.next_chunk(DEFAULT_CHUNK)?;
            if chunk.is_empty() {
                return Ok(out);
            }
            out.extend(chunk);
        }
    }
}

// ── Field parsing ─────────────────────────────────────────────────────────────

fn parse_fields<'a>(
    cols: &ColumnMap,
    get: impl Fn(usize) -> Option<&'a str>,
) -> Option<AisPoint> {
    let required = |idx: usize| get(idx).map(str::trim).filter(|s| !s.is_empty());

    let mmsi = required(cols.mmsi).filter(|s| is_valid_mmsi(s))?;
    let timestamp = parse_timestamp(required(cols.timestamp)?)?;
    let lat = required(cols.lat)?.parse::<f64>().ok().filter(|v| v.is_finite())?;
    let lon = required(cols.lon)?.parse::<f64>().ok().filter(|v| v.is_finite())?;

    let optional = |idx: Option<usize>| {
        idx.and_then(&get)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|v| v.is_finite())
    };

    let sog = optional(cols.sog);
    let cog = optional(cols.cog);
    let heading =
        optional(cols.heading).filter(|h| (h - HEADING_UNAVAILABLE).abs() > f64::EPSILON);

    Some(AisPoint {
        mmsi: mmsi.to_string(),
        timestamp,
        lat,
        lon,
        sog,
        cog,
        heading,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    const CSV_BODY: &str = "\
MMSI,BaseDateTime,LAT,LON,SOG,COG,Heading
200000001,2025-01-01T00:00:00,40.0,-70.0,12.0,90.0,90.0
200000001,2025-01-01 00:01:00,40.1,-70.0,12.5,91.0,511
200000002,2025-01-01T00:00:30,55.0,12.0,,,
";

    #[test]
    fn reads_csv_with_aliases() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "feed.csv", CSV_BODY.as_bytes());
        let mut rdr = PointReader::open(&path).unwrap();
        let points = rdr.load_all().unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].mmsi, "200000001");
        assert_eq!(points[0].sog, Some(12.0));
        // 511 heading becomes unavailable
        assert_eq!(points[1].heading, None);
        // empty optionals become None
        assert_eq!(points[2].sog, None);
        assert_eq!(rdr.skipped(), 0);
    }

    #[test]
    fn reads_zstd_wrapped_csv() {
        let dir = tempfile::tempdir().unwrap();
        let compressed = zstd::encode_all(CSV_BODY.as_bytes(), 0).unwrap();
        let path = write_file(&dir, "feed.csv.zst", &compressed);
        let mut rdr = PointReader::open(&path).unwrap();
        assert_eq!(rdr.load_all().unwrap().len(), 3);
    }

    #[test]
    fn reads_tab_delimited_dat() {
        let dir = tempfile::tempdir().unwrap();
        let body = "mmsi\ttimestamp\tlat\tlon\tsog\n\
                    200000001\t2025-01-01 00:00:00\t40.0\t-70.0\t9.5\n";
        let path = write_file(&dir, "feed.dat", body.as_bytes());
        let mut rdr = PointReader::open(&path).unwrap();
        let points = rdr.load_all().unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].sog, Some(9.5));
    }

    #[test]
    fn reads_space_run_delimited_dat() {
        let dir = tempfile::tempdir().unwrap();
        let body = "mmsi   time              lat    lon\n\
                    200000001  2025-01-01T00:00:00  40.0   -70.0\n";
        let path = write_file(&dir, "feed.dat", body.as_bytes());
        let mut rdr = PointReader::open(&path).unwrap();
        let points = rdr.load_all().unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].lat, 40.0);
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "feed.csv", b"MMSI,LAT,LON\n200000001,1.0,2.0\n");
        match PointReader::open(&path) {
            Err(SourceError::MissingColumns(cols)) => assert_eq!(cols, vec!["timestamp"]),
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn bad_rows_are_skipped_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        let body = "\
mmsi,timestamp,lat,lon
200000001,2025-01-01T00:00:00,40.0,-70.0
badmmsi,2025-01-01T00:00:10,40.0,-70.0
200000001,not-a-time,40.0,-70.0
200000001,2025-01-01T00:00:20,nope,-70.0
12345,2025-01-01T00:00:30,40.0,-70.0
200000001,2025-01-01T00:00:40,40.1,-70.1
";
        let path = write_file(&dir, "feed.csv", body.as_bytes());
        let mut rdr = PointReader::open(&path).unwrap();
        let points = rdr.load_all().unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(rdr.skipped(), 4);
    }

    #[test]
    fn out_of_range_coordinates_are_not_rejected() {
        // Range checks belong to the POSITION_INVALID rule, not the loader
        let dir = tempfile::tempdir().unwrap();
        let body = "mmsi,timestamp,lat,lon\n200000001,2025-01-01T00:00:00,95.0,0.0\n";
        let path = write_file(&dir, "feed.csv", body.as_bytes());
        let points = PointReader::open(&path).unwrap().load_all().unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].lat, 95.0);
    }

    #[test]
    fn header_only_file_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "feed.csv", b"mmsi,timestamp,lat,lon\n");
        let mut rdr = PointReader::open(&path).unwrap();
        assert!(rdr.load_all().unwrap().is_empty());
        assert_eq!(rdr.skipped(), 0);
    }

    #[test]
    fn empty_file_is_a_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "feed.csv", b"");
        assert!(matches!(PointReader::open(&path), Err(SourceError::EmptyInput)));
    }

    #[test]
    fn unsupported_extension_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "feed.txt", b"x");
        assert!(matches!(
            PointReader::open(&path),
            Err(SourceError::UnsupportedExtension(_))
        ));
    }

    #[test]
    fn missing_file_refused() {
        assert!(matches!(
            PointReader::open(Path::new("/nonexistent/feed.csv")),
            Err(SourceError::NotFound(_))
        ));
    }

    #[test]
    fn chunks_are_bounded_and_resumable() {
        let dir = tempfile::tempdir().unwrap();
        let mut body = String::from("mmsi,timestamp,lat,lon\n");
        for i in 0..25 {
            body.push_str(&format!("200000001,2025-01-01T00:00:{i:02},40.0,-70.0\n"));
        }
        let path = write_file(&dir, "feed.csv", body.as_bytes());
        let mut rdr = PointReader::open(&path).unwrap();
        let mut total = 0;
        loop {
            let chunk = rdr.next_chunk(10).unwrap();
            if chunk.is_empty() {
                break;
            }
            assert!(chunk.len() <= 10);
            total += chunk.len();
        }
        assert_eq!(total, 25);
    }

    #[test]
    fn timestamp_forms() {
        assert!(parse_timestamp("2025-01-01T00:00:00Z").is_some());
        assert!(parse_timestamp("2025-01-01T00:00:00+02:00").is_some());
        assert!(parse_timestamp("2025-01-01T00:00:00").is_some());
        assert!(parse_timestamp("2025-01-01 00:00:00").is_some());
        assert!(parse_timestamp("2025-01-01 00:00:00.500").is_some());
        assert!(parse_timestamp("01/01/2025 00:00").is_none());
    }
}
