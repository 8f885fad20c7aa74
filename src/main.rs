use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};
use image::GrayImage;
use rt_volume::{Orientation, Session, SliceCorrespondence, ViewerSettings, VolumeLoader};

/// Render one slice of a CT volume, with the matching dose slice and the
/// structures crossing it.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// CT file, or directory holding a series of single-slice files
    #[arg(long)]
    ct: PathBuf,

    /// RT dose file to overlay
    #[arg(long)]
    dose: Option<PathBuf>,

    /// RT structure set file
    #[arg(long)]
    structures: Option<PathBuf>,

    /// Viewer settings (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// View axis: 1 axial, 2 coronal, 3 sagittal
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=3))]
    axis: u8,

    /// Slice index along the view axis; the centre slice when left out
    #[arg(long)]
    slice: Option<usize>,

    /// Output image of the CT slice; the dose slice goes next to it
    #[arg(long, default_value = "slice.png")]
    out: PathBuf,

    /// Log every query
    #[arg(short, long)]
    verbose: bool,
}

fn dose_path(out: &Path) -> PathBuf {
    let stem = out
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("slice");
    out.with_file_name(format!("{stem}-dose.png"))
}

fn save(image: Option<GrayImage>, index: usize, path: &Path) -> Result<()> {
    image
        .with_context(|| format!("slice {index} is outside the volume"))?
        .save(path)
        .with_context(|| format!("could not write {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    simple_logger::SimpleLogger::new().with_level(level).init()?;

    let settings = match &cli.config {
        Some(path) => ViewerSettings::load(path)
            .with_context(|| format!("could not read settings {}", path.display()))?,
        None => ViewerSettings::default(),
    };
    let mut session = Session::new(settings);

    if cli.ct.is_dir() {
        let slices = VolumeLoader::load_series_from_directory(&cli.ct)?;
        session.open_ct_series(slices)?;
    } else {
        session.open_ct(VolumeLoader::load_file(&cli.ct)?)?;
    }
    if let Some(path) = &cli.dose {
        session.import_dose(VolumeLoader::load_file(path)?)?;
    }
    if let Some(path) = &cli.structures {
        session.import_structures(VolumeLoader::load_structures(path)?);
    }

    let Some(orientation) = Orientation::from_axis_number(cli.axis) else {
        bail!("axis must be 1, 2 or 3");
    };
    let Some(ct) = session.ct() else {
        bail!("no CT volume loaded");
    };
    let index = cli
        .slice
        .unwrap_or_else(|| ct.shape()[orientation.index()] / 2);
    save(session.render_ct(orientation, index), index, &cli.out)?;

    match session.dose_slice_for(orientation, index) {
        Some(SliceCorrespondence::Slice(dose_index)) => {
            if let Some(dose) = session.dose() {
                let image = session.render_dose(orientation, dose_index);
                save(image, dose_index, &dose_path(&cli.out))?;
                info!("isodose lines at {:?}", dose.isodose_thresholds());
            }
        }
        Some(outside) => warn!("no dose slice for CT slice {index}: {outside:?}"),
        None => {}
    }

    if let Some(structures) = session.structures() {
        for (i, structure) in structures.structures().iter().enumerate() {
            let shapes = session.contours(i, orientation, index);
            if !shapes.is_empty() {
                info!(
                    "{}: {} contours on slice {}",
                    structure.name(),
                    shapes.len(),
                    index
                );
            }
        }
    }
    Ok(())
}
