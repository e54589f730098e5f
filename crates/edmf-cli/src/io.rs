use anyhow::{bail, ensure, Context, Result};
use csv::{ReaderBuilder, StringRecord, Writer};
use edmf::error_source::METADATA_COLUMNS;
use edmf::{
    ActiveSensorMask, CmsTable, EdmfConfig, EdmfInputs, ErrorSourceTable, Measurements, ModelSet,
    RunSummary,
};
use std::fs;
use std::path::{Path, PathBuf};

pub const PREDICTIONS_FILE: &str = "predictions.csv";
pub const MEASUREMENTS_FILE: &str = "measurements.csv";
pub const PREDICTION_ERRORS_FILE: &str = "prediction_errors.csv";
pub const MEASUREMENT_ERRORS_FILE: &str = "measurement_errors.csv";
pub const ACTIVE_SENSORS_FILE: &str = "active_sensors.csv";
pub const CMS_FILE: &str = "cms.csv";
pub const SUMMARY_FILE: &str = "summary.json";

fn reader(path: &Path) -> Result<csv::Reader<fs::File>> {
    ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))
}

fn header(rdr: &mut csv::Reader<fs::File>, path: &Path) -> Result<Vec<String>> {
    let headers = rdr
        .headers()
        .with_context(|| format!("failed to read header of {}", path.display()))?;
    Ok(headers.iter().map(str::to_string).collect())
}

fn records(rdr: &mut csv::Reader<fs::File>, path: &Path) -> Result<Vec<StringRecord>> {
    rdr.records()
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("failed to read records of {}", path.display()))
}

fn parse_row(record: &StringRecord, path: &Path, line: usize) -> Result<Vec<f64>> {
    record
        .iter()
        .enumerate()
        .map(|(col, cell)| {
            cell.parse::<f64>().with_context(|| {
                format!(
                    "{}: row {line}, column {}: {cell:?} is not a number",
                    path.display(),
                    col + 1
                )
            })
        })
        .collect()
}

/// Parameter columns first, then one prediction column per sensor.
pub fn read_model_set(path: &Path, num_parameters: usize) -> Result<ModelSet> {
    let mut rdr = reader(path)?;
    let header = header(&mut rdr, path)?;
    let rows = records(&mut rdr, path)?
        .iter()
        .enumerate()
        .map(|(i, record)| parse_row(record, path, i + 1))
        .collect::<Result<Vec<_>>>()?;

    ModelSet::from_table(num_parameters, header, rows)
        .with_context(|| format!("invalid model set in {}", path.display()))
}

/// A header of sensor names and exactly one row of values.
pub fn read_measurements(path: &Path) -> Result<(Vec<String>, Measurements)> {
    let mut rdr = reader(path)?;
    let names = header(&mut rdr, path)?;
    let rows = records(&mut rdr, path)?;
    ensure!(
        rows.len() == 1,
        "{} must contain exactly one row of measurements, found {}",
        path.display(),
        rows.len()
    );

    let values = parse_row(&rows[0], path, 1)?;
    let measurements = Measurements::new(values)
        .with_context(|| format!("invalid measurements in {}", path.display()))?;
    Ok((names, measurements))
}

/// `low, high, kind` followed by one 0/1 column per sensor.
pub fn read_error_sources(path: &Path, num_sensors: usize) -> Result<ErrorSourceTable> {
    let mut rdr = reader(path)?;
    let header = header(&mut rdr, path)?;
    ensure!(
        header.len() == num_sensors + METADATA_COLUMNS,
        "{} has {} columns, expected {} (low, high, kind and {num_sensors} sensor flags)",
        path.display(),
        header.len(),
        num_sensors + METADATA_COLUMNS
    );

    let rows: Vec<Vec<String>> = records(&mut rdr, path)?
        .iter()
        .map(|record| record.iter().map(str::to_string).collect())
        .collect();

    ErrorSourceTable::from_rows(num_sensors, &rows)
        .with_context(|| format!("invalid error sources in {}", path.display()))
}

/// One row per sensor; the last column holds the 0/1 flag.
pub fn read_active_sensors(path: &Path) -> Result<ActiveSensorMask> {
    let mut rdr = reader(path)?;
    let cells = records(&mut rdr, path)?
        .iter()
        .enumerate()
        .map(|(i, record)| {
            record
                .iter()
                .last()
                .map(str::to_string)
                .with_context(|| format!("{}: row {} is empty", path.display(), i + 1))
        })
        .collect::<Result<Vec<_>>>()?;

    ActiveSensorMask::from_cells(&cells)
        .with_context(|| format!("invalid active-sensor flags in {}", path.display()))
}

/// Loads every table from `dir`. A missing active-sensor table activates all
/// sensors.
pub fn load_inputs(dir: &Path, num_parameters: usize) -> Result<EdmfInputs> {
    let models = read_model_set(&dir.join(PREDICTIONS_FILE), num_parameters)?;
    let num_sensors = models.num_sensors();

    let (names, measurements) = read_measurements(&dir.join(MEASUREMENTS_FILE))?;
    if names.as_slice() != models.sensor_names() {
        log::warn!(
            "measurement columns {:?} do not match prediction sensors {:?}; matching by position",
            names,
            models.sensor_names()
        );
    }

    let measurement_errors = read_error_sources(&dir.join(MEASUREMENT_ERRORS_FILE), num_sensors)?;
    let prediction_errors = read_error_sources(&dir.join(PREDICTION_ERRORS_FILE), num_sensors)?;

    let active_path = dir.join(ACTIVE_SENSORS_FILE);
    let active = if active_path.exists() {
        read_active_sensors(&active_path)?
    } else {
        log::info!(
            "{} not found, all {num_sensors} sensors are active",
            active_path.display()
        );
        ActiveSensorMask::all(num_sensors)
    };

    let inputs = EdmfInputs {
        models,
        measurements,
        measurement_errors,
        prediction_errors,
        active,
    };
    inputs
        .validate()
        .with_context(|| format!("inconsistent input tables in {}", dir.display()))?;
    Ok(inputs)
}

pub fn load_config(path: &Path) -> Result<EdmfConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let config: EdmfConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse TOML config: {}", path.display()))?;
    Ok(config)
}

pub fn ensure_outdir(outdir: &Path) -> Result<()> {
    fs::create_dir_all(outdir)
        .with_context(|| format!("failed to create output directory: {}", outdir.display()))
}

pub fn write_cms_csv(path: &Path, table: &CmsTable) -> Result<()> {
    let mut wtr = Writer::from_path(path)
        .with_context(|| format!("failed to open {} for writing", path.display()))?;
    wtr.write_record(table.header())?;

    for row in &table.rows {
        let record: Vec<String> = std::iter::once(row.id.to_string())
            .chain(row.parameters.iter().map(f64::to_string))
            .chain(row.predictions.iter().map(f64::to_string))
            .collect();
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Reads back the `ID` column of a CMS table.
pub fn read_cms_ids(path: &Path) -> Result<Vec<usize>> {
    let mut rdr = reader(path)?;
    let header = header(&mut rdr, path)?;
    let Some(col) = header.iter().position(|h| h == "ID") else {
        bail!("{} has no ID column", path.display());
    };

    records(&mut rdr, path)?
        .iter()
        .map(|record| {
            let cell = record.get(col).unwrap_or_default();
            cell.parse::<usize>()
                .with_context(|| format!("{}: invalid ID {cell:?}", path.display()))
        })
        .collect()
}

pub fn write_summary_json(path: &Path, summary: &RunSummary) -> Result<PathBuf> {
    let payload = serde_json::to_string_pretty(summary).context("failed to serialize summary")?;
    fs::write(path, payload)
        .with_context(|| format!("failed to write summary: {}", path.display()))?;
    Ok(path.to_path_buf())
}
