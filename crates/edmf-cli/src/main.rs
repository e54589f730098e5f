use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use edmf::EdmfConfig;
use edmf_cli::io::{
    ensure_outdir, load_config, load_inputs, write_cms_csv, write_summary_json, CMS_FILE,
    SUMMARY_FILE,
};

#[derive(Debug, Parser)]
#[command(name = "edmf")]
#[command(about = "Error-domain model falsification over a directory of CSV tables")]
struct Cli {
    /// Directory holding predictions.csv, measurements.csv,
    /// prediction_errors.csv, measurement_errors.csv and optionally
    /// active_sensors.csv
    #[arg(long, default_value = ".")]
    input_dir: PathBuf,

    /// Leading parameter columns in predictions.csv
    #[arg(long)]
    num_parameters: usize,

    /// TOML run configuration (see configs/default.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    samples: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    cutoff: Option<f64>,

    /// Disable the Sidak multiple-comparison correction
    #[arg(long, default_value_t = false)]
    no_sidak: bool,

    #[arg(long, default_value = "output-edmf")]
    outdir: PathBuf,
}

fn resolve_config(cli: &Cli) -> Result<EdmfConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EdmfConfig::default(),
    };

    if let Some(samples) = cli.samples {
        config.n_samples = samples;
    }
    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }
    if let Some(cutoff) = cli.cutoff {
        config.cutoff = cutoff;
    }
    if cli.no_sidak {
        config.sidak = false;
    }

    config.validate().context("invalid run configuration")?;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    let inputs = load_inputs(&cli.input_dir, cli.num_parameters)?;

    let done = edmf::run(inputs, &config).context("falsification run failed")?;
    let summary = done.summary();
    log::info!(
        "{} of {} model instances not falsified ({} of {} sensors active, cutoff {} -> {:.4})",
        summary.size_cms,
        summary.size_ims,
        summary.active_sensors.len(),
        summary.num_sensors,
        summary.cutoff,
        summary.effective_cutoff
    );
    for (name, t) in summary.sensor_names.iter().zip(&summary.thresholds) {
        log::debug!("{name}: T_low {:.6}, T_high {:.6}", t.low, t.high);
    }

    ensure_outdir(&cli.outdir)?;
    write_cms_csv(&cli.outdir.join(CMS_FILE), &done.cms_table()?)?;
    let summary_path = write_summary_json(&cli.outdir.join(SUMMARY_FILE), &summary)?;

    println!("wrote outputs to {}", cli.outdir.display());
    log::debug!("summary: {}", summary_path.display());
    Ok(())
}
